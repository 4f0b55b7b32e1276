//! Method and constructor patterns.
//!
//! `[@Ann] [modifiers] <return> [<class>.]<name>(<params>)` and
//! `[@Ann] [modifiers] [<class>.]new(<params>)`. Parameters are matched by
//! position; `..` stands for any number of parameters and `*` for exactly one.

use std::fmt;
use std::hash::{Hash, Hasher};

use regex::Regex;

use super::{compile_regex, require_subject, Abbreviations, Qualifiers, TypePattern};
use crate::error::{Error, Result};
use crate::reflect::{ClassLookup, ConstructorInfo, MethodInfo};

#[derive(Debug, Clone)]
pub enum ParamPattern {
    /// `..`: zero or more parameters of any type.
    Multiple,
    Type(TypePattern),
}

impl ParamPattern {
    pub fn is_multiple(&self) -> bool {
        matches!(self, ParamPattern::Multiple)
    }
}

/// Parse the text between the parentheses of a signature pattern.
pub fn parse_parameters(text: &str, abbreviations: &Abbreviations) -> Result<Vec<ParamPattern>> {
    let text = text.trim();
    if text.is_empty() {
        return Ok(Vec::new());
    }
    text.split(',')
        .map(str::trim)
        .map(|token| match token {
            "" => Err(Error::definition(text, "empty parameter pattern")),
            ".." => Ok(ParamPattern::Multiple),
            _ => TypePattern::compile(token, abbreviations).map(ParamPattern::Type),
        })
        .collect()
}

/// Left-to-right positional match; stops at the first single-type mismatch.
pub fn match_parameters(patterns: &[ParamPattern], types: &[String], lookup: Option<&dyn ClassLookup>) -> bool {
    match patterns.split_first() {
        None => types.is_empty(),
        Some((ParamPattern::Multiple, rest)) => {
            if rest.is_empty() {
                return true;
            }
            (0..=types.len()).any(|skip| match_parameters(rest, &types[skip..], lookup))
        }
        Some((ParamPattern::Type(pattern), rest)) => match types.split_first() {
            Some((ty, tail)) => pattern.matches_type(ty, lookup) && match_parameters(rest, tail, lookup),
            None => false,
        },
    }
}

struct Signature<'a> {
    qualifiers: Qualifiers,
    head: Vec<&'a str>,
    params: &'a str,
}

fn split_signature(pattern: &str) -> Result<Signature<'_>> {
    let open = pattern.find('(').ok_or_else(|| Error::definition(pattern, "missing parameter list"))?;
    let close = pattern.rfind(')').ok_or_else(|| Error::definition(pattern, "missing ')'"))?;
    if close < open || !pattern[close + 1..].trim().is_empty() {
        return Err(Error::definition(pattern, "malformed parameter list"));
    }
    let params = &pattern[open + 1..close];
    if params.contains('(') || params.contains(')') {
        return Err(Error::definition(pattern, "nested parentheses in parameter list"));
    }
    let mut head: Vec<&str> = pattern[..open].split_whitespace().collect();
    let qualifiers = Qualifiers::take(&mut head);
    qualifiers.validate(pattern)?;
    Ok(Signature { qualifiers, head, params })
}

/// Split `a.b.Type.member` into the class glob and the member glob.
fn split_qualified(name: &str) -> (Option<String>, &str) {
    match name.rfind('.') {
        None => (None, name),
        Some(i) => {
            let class = &name[..i];
            let member = &name[i + 1..];
            if class.ends_with('.') {
                (Some(format!("{class}.")), member)
            } else {
                (Some(class.to_string()), member)
            }
        }
    }
}

fn compile_member_name(pattern: &str, member: &str) -> Result<Regex> {
    if member.is_empty() {
        return Err(Error::definition(pattern, "missing member name"));
    }
    if member.contains('.') || member.contains('+') || member.contains('[') {
        return Err(Error::definition(pattern, format!("invalid member name '{member}'")));
    }
    compile_regex(member)
}

fn compile_declaring(class: Option<String>, abbreviations: &Abbreviations) -> Result<Option<TypePattern>> {
    class.map(|c| TypePattern::compile(&c, abbreviations)).transpose()
}

fn declaring_matches(declaring: &Option<TypePattern>, name: &str, lookup: Option<&dyn ClassLookup>) -> bool {
    declaring.as_ref().map_or(true, |p| p.matches_type(name, lookup))
}

/// Compiled method signature pattern.
#[derive(Debug, Clone)]
pub struct MethodPattern {
    pattern: String,
    abbreviations: Abbreviations,
    qualifiers: Qualifiers,
    return_type: TypePattern,
    declaring: Option<TypePattern>,
    name: Regex,
    params: Vec<ParamPattern>,
}

impl MethodPattern {
    pub fn compile(pattern: &str) -> Result<Self> {
        Self::compile_with(pattern, &Abbreviations::default())
    }

    pub fn compile_with(pattern: &str, abbreviations: &Abbreviations) -> Result<Self> {
        let sig = split_signature(pattern)?;
        let (return_type, qualified) = match sig.head.as_slice() {
            [ret, qualified] => (*ret, *qualified),
            [_] => return Err(Error::definition(pattern, "missing return type")),
            [] => return Err(Error::definition(pattern, "missing method name")),
            _ => return Err(Error::definition(pattern, "unexpected tokens before method name")),
        };
        let (class, member) = split_qualified(qualified);
        if member == "new" {
            return Err(Error::definition(pattern, "constructor patterns take no return type"));
        }
        Ok(Self {
            pattern: pattern.trim().to_string(),
            abbreviations: abbreviations.clone(),
            return_type: TypePattern::compile(return_type, abbreviations)?,
            declaring: compile_declaring(class, abbreviations)?,
            name: compile_member_name(pattern, member)?,
            params: parse_parameters(sig.params, abbreviations)?,
            qualifiers: sig.qualifiers,
        })
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn parameters(&self) -> &[ParamPattern] {
        &self.params
    }

    pub fn matches(&self, method: &MethodInfo) -> Result<bool> {
        self.matches_with(method, None)
    }

    pub fn matches_with(&self, method: &MethodInfo, lookup: Option<&dyn ClassLookup>) -> Result<bool> {
        require_subject(&method.name, "method name must not be empty")?;
        Ok(self.qualifiers.accepts(method.modifiers, |a| method.has_annotation(a))
            && self.name.is_match(&method.name)
            && self.return_type.matches_type(&method.return_type, lookup)
            && declaring_matches(&self.declaring, &method.declaring_type, lookup)
            && match_parameters(&self.params, &method.parameter_types, lookup))
    }

    /// Match a bare signature: no declaring type, modifiers or annotations involved.
    pub fn matches_signature(&self, name: &str, return_type: &str, parameter_types: &[String]) -> Result<bool> {
        require_subject(name, "method name must not be empty")?;
        require_subject(return_type, "return type must not be empty")?;
        Ok(self.qualifiers == Qualifiers::default()
            && self.declaring.as_ref().map_or(true, TypePattern::is_any)
            && self.name.is_match(name)
            && self.return_type.matches_name(return_type)
            && match_parameters(&self.params, parameter_types, None))
    }
}

/// Compiled constructor pattern (`foo.Bar.new(..)`).
#[derive(Debug, Clone)]
pub struct ConstructorPattern {
    pattern: String,
    abbreviations: Abbreviations,
    qualifiers: Qualifiers,
    declaring: Option<TypePattern>,
    params: Vec<ParamPattern>,
}

impl ConstructorPattern {
    pub fn compile(pattern: &str) -> Result<Self> {
        Self::compile_with(pattern, &Abbreviations::default())
    }

    pub fn compile_with(pattern: &str, abbreviations: &Abbreviations) -> Result<Self> {
        let sig = split_signature(pattern)?;
        let qualified = match sig.head.as_slice() {
            [qualified] => *qualified,
            [] => return Err(Error::definition(pattern, "missing constructor name")),
            _ => return Err(Error::definition(pattern, "constructor patterns take no return type")),
        };
        let (class, member) = split_qualified(qualified);
        if member != "new" {
            return Err(Error::definition(pattern, "constructor pattern must name 'new'"));
        }
        Ok(Self {
            pattern: pattern.trim().to_string(),
            abbreviations: abbreviations.clone(),
            declaring: compile_declaring(class, abbreviations)?,
            params: parse_parameters(sig.params, abbreviations)?,
            qualifiers: sig.qualifiers,
        })
    }

    /// Whether `text` looks like a constructor pattern rather than a method pattern.
    pub fn is_constructor_pattern(text: &str) -> bool {
        let head = text.split('(').next().unwrap_or("");
        head.split_whitespace().last().map_or(false, |q| q == "new" || q.ends_with(".new"))
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn matches(&self, constructor: &ConstructorInfo) -> Result<bool> {
        self.matches_with(constructor, None)
    }

    pub fn matches_with(&self, constructor: &ConstructorInfo, lookup: Option<&dyn ClassLookup>) -> Result<bool> {
        require_subject(&constructor.declaring_type, "constructor declaring type must not be empty")?;
        Ok(self.qualifiers.accepts(constructor.modifiers, |a| constructor.has_annotation(a))
            && declaring_matches(&self.declaring, &constructor.declaring_type, lookup)
            && match_parameters(&self.params, &constructor.parameter_types, lookup))
    }
}

macro_rules! pattern_identity {
    ($ty:ty) => {
        impl PartialEq for $ty {
            fn eq(&self, other: &Self) -> bool {
                self.pattern == other.pattern && self.abbreviations == other.abbreviations
            }
        }

        impl Eq for $ty {}

        impl Hash for $ty {
            fn hash<H: Hasher>(&self, state: &mut H) {
                self.pattern.hash(state);
                self.abbreviations.hash(state);
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.pattern)
            }
        }
    };
}

pattern_identity!(MethodPattern);
pattern_identity!(ConstructorPattern);
