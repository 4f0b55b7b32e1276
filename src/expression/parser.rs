//! Recursive-descent parser for pointcut expressions.
//!
//! ```text
//! or      := and ( ("||" | "or" | "OR") and )*
//! and     := unary ( ("&&" | "and" | "AND") unary )*
//! unary   := ("!" | "not" | "NOT") unary | "(" or ")" | primary
//! primary := keyword "(" balanced-text ")" | pointcut-name [ "()" ]
//! ```

use crate::error::{Error, Result};
use crate::pattern::method::parse_parameters;
use crate::pattern::{Abbreviations, ClassPattern, FieldPattern};

use super::ast::{Expr, MemberPattern};

/// Parse `text`, handing every named-pointcut reference to `resolve`.
pub fn parse<R>(text: &str, abbreviations: &Abbreviations, resolve: &mut R) -> Result<Expr>
where
    R: FnMut(&str) -> Result<Expr>,
{
    let mut parser = Parser { text, pos: 0, abbreviations, resolve };
    let expr = parser.parse_or()?;
    parser.skip_ws();
    if parser.pos < text.len() {
        return Err(parser.error("unexpected trailing input"));
    }
    Ok(expr)
}

struct Parser<'a, R> {
    text: &'a str,
    pos: usize,
    abbreviations: &'a Abbreviations,
    resolve: &'a mut R,
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '$' | '.')
}

impl<'a, R> Parser<'a, R>
where
    R: FnMut(&str) -> Result<Expr>,
{
    fn error(&self, reason: &str) -> Error {
        Error::definition(self.text, format!("{reason} at offset {}", self.pos))
    }

    fn rest(&self) -> &'a str {
        &self.text[self.pos..]
    }

    fn skip_ws(&mut self) {
        let rest = self.rest();
        self.pos += rest.len() - rest.trim_start().len();
    }

    fn peek_word(&self) -> &'a str {
        let rest = self.rest();
        let end = rest.find(|c: char| !is_ident_char(c)).unwrap_or(rest.len());
        &rest[..end]
    }

    /// Consume a symbol or one of the keyword spellings of an operator.
    fn eat_operator(&mut self, symbol: &str, words: &[&str]) -> bool {
        self.skip_ws();
        if self.rest().starts_with(symbol) {
            self.pos += symbol.len();
            return true;
        }
        let word = self.peek_word();
        if words.contains(&word) {
            self.pos += word.len();
            return true;
        }
        false
    }

    fn parse_or(&mut self) -> Result<Expr> {
        let mut left = self.parse_and()?;
        while self.eat_operator("||", &["or", "OR"]) {
            let right = self.parse_and()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr> {
        let mut left = self.parse_unary()?;
        while self.eat_operator("&&", &["and", "AND"]) {
            let right = self.parse_unary()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr> {
        if self.eat_operator("!", &["not", "NOT"]) {
            return Ok(Expr::Not(Box::new(self.parse_unary()?)));
        }
        self.skip_ws();
        if self.rest().starts_with('(') {
            self.pos += 1;
            let inner = self.parse_or()?;
            self.skip_ws();
            if !self.rest().starts_with(')') {
                return Err(self.error("expected ')'"));
            }
            self.pos += 1;
            return Ok(inner);
        }
        self.parse_primary()
    }

    /// Text between the parenthesis at `self.pos` and its partner.
    fn balanced(&mut self) -> Result<&'a str> {
        let start = self.pos + 1;
        let mut depth = 0usize;
        for (offset, c) in self.rest().char_indices() {
            match c {
                '(' => depth += 1,
                ')' => {
                    depth -= 1;
                    if depth == 0 {
                        let end = self.pos + offset;
                        self.pos = end + 1;
                        return Ok(&self.text[start..end]);
                    }
                }
                _ => {}
            }
        }
        Err(self.error("unbalanced parentheses"))
    }

    fn parse_primary(&mut self) -> Result<Expr> {
        let word = self.peek_word();
        if word.is_empty() {
            return Err(self.error("expected a pointcut"));
        }
        self.pos += word.len();
        self.skip_ws();
        let has_body = self.rest().starts_with('(');

        let keyword = match word {
            "execution" | "call" | "get" | "set" | "within" | "withincode" | "handler"
            | "staticinitialization" | "args" | "cflow" | "cflowbelow" => word,
            _ => {
                if has_body {
                    let args = self.balanced()?;
                    if !args.trim().is_empty() {
                        return Err(self.error("pointcut references take no arguments"));
                    }
                }
                return (self.resolve)(word);
            }
        };
        if !has_body {
            return Err(self.error("expected '(' after pointcut designator"));
        }
        let body = self.balanced()?;
        let abbr = self.abbreviations;
        let expr = match keyword {
            "execution" => Expr::Execution(MemberPattern::compile(body, abbr)?),
            "call" => Expr::Call(MemberPattern::compile(body, abbr)?),
            "withincode" => Expr::WithinCode(MemberPattern::compile(body, abbr)?),
            "get" => Expr::Get(FieldPattern::compile_with(body, abbr)?),
            "set" => Expr::Set(FieldPattern::compile_with(body, abbr)?),
            "within" => Expr::Within(ClassPattern::compile_with(body, abbr)?),
            "handler" => Expr::Handler(ClassPattern::compile_with(body, abbr)?),
            "staticinitialization" => Expr::StaticInitialization(ClassPattern::compile_with(body, abbr)?),
            "args" => Expr::Args(parse_parameters(body, abbr)?),
            "cflow" => Expr::Cflow(Box::new(self.nested(body)?)),
            _ => Expr::CflowBelow(Box::new(self.nested(body)?)),
        };
        Ok(expr)
    }

    fn nested(&mut self, body: &str) -> Result<Expr> {
        if body.trim().is_empty() {
            return Err(self.error("empty control flow expression"));
        }
        parse(body, self.abbreviations, &mut *self.resolve)
    }
}
