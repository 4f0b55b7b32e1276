use crate::error::Result;
use crate::pattern::{
    Abbreviations, ClassPattern, ConstructorPattern, FieldPattern, MethodPattern, ParamPattern,
};
use crate::reflect::ClassLookup;

use super::context::{PointcutType, ReflectInfo};

/// Method-or-constructor pattern used by `execution`, `call` and `withincode`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MemberPattern {
    Method(MethodPattern),
    Constructor(ConstructorPattern),
}

impl MemberPattern {
    pub fn compile(text: &str, abbreviations: &Abbreviations) -> Result<Self> {
        if ConstructorPattern::is_constructor_pattern(text) {
            ConstructorPattern::compile_with(text, abbreviations).map(MemberPattern::Constructor)
        } else {
            MethodPattern::compile_with(text, abbreviations).map(MemberPattern::Method)
        }
    }

    pub fn pattern(&self) -> &str {
        match self {
            MemberPattern::Method(p) => p.pattern(),
            MemberPattern::Constructor(p) => p.pattern(),
        }
    }

    pub fn matches(&self, info: &ReflectInfo, lookup: Option<&dyn ClassLookup>) -> Result<bool> {
        match (self, info) {
            (MemberPattern::Method(p), ReflectInfo::Method(m)) => p.matches_with(m, lookup),
            (MemberPattern::Constructor(p), ReflectInfo::Constructor(c)) => p.matches_with(c, lookup),
            _ => Ok(false),
        }
    }
}

/// Compiled pointcut expression tree. Named pointcut references are inlined
/// during parsing.
#[derive(Debug, Clone)]
pub enum Expr {
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
    Execution(MemberPattern),
    Call(MemberPattern),
    Get(FieldPattern),
    Set(FieldPattern),
    Within(ClassPattern),
    WithinCode(MemberPattern),
    Handler(ClassPattern),
    StaticInitialization(ClassPattern),
    Args(Vec<ParamPattern>),
    Cflow(Box<Expr>),
    CflowBelow(Box<Expr>),
}

impl Expr {
    pub fn has_cflow(&self) -> bool {
        match self {
            Expr::Cflow(_) | Expr::CflowBelow(_) => true,
            Expr::And(l, r) | Expr::Or(l, r) => l.has_cflow() || r.has_cflow(),
            Expr::Not(e) => e.has_cflow(),
            _ => false,
        }
    }

    /// Bodies of every `cflow`/`cflowbelow` node, outermost first.
    pub fn cflow_targets(&self) -> Vec<&Expr> {
        let mut out = Vec::new();
        let mut pending = vec![self];
        while let Some(expr) = pending.pop() {
            match expr {
                Expr::Cflow(inner) | Expr::CflowBelow(inner) => {
                    out.push(inner.as_ref());
                    pending.push(inner);
                }
                Expr::And(l, r) | Expr::Or(l, r) => {
                    pending.push(r);
                    pending.push(l);
                }
                Expr::Not(e) => pending.push(e),
                _ => {}
            }
        }
        out
    }

    /// Join point kinds named by the primitives outside any cflow body.
    pub fn pointcut_types(&self, out: &mut Vec<PointcutType>) {
        let kind = match self {
            Expr::And(l, r) | Expr::Or(l, r) => {
                l.pointcut_types(out);
                r.pointcut_types(out);
                return;
            }
            Expr::Not(e) => return e.pointcut_types(out),
            Expr::Execution(_) => PointcutType::Execution,
            Expr::Call(_) => PointcutType::Call,
            Expr::Get(_) => PointcutType::Get,
            Expr::Set(_) => PointcutType::Set,
            Expr::Handler(_) => PointcutType::Handler,
            Expr::StaticInitialization(_) => PointcutType::StaticInitialization,
            Expr::Within(_) | Expr::WithinCode(_) => PointcutType::Within,
            Expr::Args(_) | Expr::Cflow(_) | Expr::CflowBelow(_) => return,
        };
        if !out.contains(&kind) {
            out.push(kind);
        }
    }
}
