//! Pointcut expressions.
//!
//! An [`Expression`] is compiled once from text such as
//!
//! ```text
//! execution(* foo.bar.*.run(..)) && !cflow(call(void foo.Tx.begin()))
//! ```
//!
//! and evaluated against an [`ExpressionContext`] either definitively with
//! [`Expression::matches`] (runtime, consults the cflow stack) or
//! conservatively with [`Expression::may_match`] (weave time, where `cflow`
//! cannot be decided yet).

pub mod ast;
pub mod context;
pub mod namespace;
pub mod parser;

use std::fmt;
use std::ops::Not;

pub use ast::{Expr, MemberPattern};
pub use context::{ExpressionContext, PointcutType, ReflectInfo};
pub use namespace::ExpressionNamespace;

use crate::cflow::CflowStack;
use crate::error::{Error, Result};
use crate::pattern::method::match_parameters;
use crate::pattern::Abbreviations;
use crate::reflect::ClassLookup;

/// Three-valued result of weave-time matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tri {
    True,
    False,
    Maybe,
}

impl Tri {
    pub fn and(self, other: Tri) -> Tri {
        match (self, other) {
            (Tri::False, _) | (_, Tri::False) => Tri::False,
            (Tri::True, Tri::True) => Tri::True,
            _ => Tri::Maybe,
        }
    }

    pub fn or(self, other: Tri) -> Tri {
        match (self, other) {
            (Tri::True, _) | (_, Tri::True) => Tri::True,
            (Tri::False, Tri::False) => Tri::False,
            _ => Tri::Maybe,
        }
    }

    /// True or Maybe: the join point has to be woven.
    pub fn is_possible(self) -> bool {
        self != Tri::False
    }
}

impl Not for Tri {
    type Output = Tri;

    fn not(self) -> Tri {
        match self {
            Tri::True => Tri::False,
            Tri::False => Tri::True,
            Tri::Maybe => Tri::Maybe,
        }
    }
}

impl From<bool> for Tri {
    fn from(value: bool) -> Self {
        if value {
            Tri::True
        } else {
            Tri::False
        }
    }
}

/// What runtime evaluation may consult besides the context itself.
#[derive(Clone, Copy, Default)]
pub struct MatchEnv<'a> {
    pub lookup: Option<&'a dyn ClassLookup>,
    pub cflow: Option<&'a CflowStack>,
}

impl<'a> MatchEnv<'a> {
    pub fn new(lookup: Option<&'a dyn ClassLookup>, cflow: Option<&'a CflowStack>) -> Self {
        Self { lookup, cflow }
    }
}

/// A compiled pointcut expression.
#[derive(Debug, Clone)]
pub struct Expression {
    source: String,
    root: Expr,
}

impl Expression {
    /// Compile with the default abbreviations; named references are rejected.
    pub fn compile(source: &str) -> Result<Self> {
        Self::compile_with(source, &Abbreviations::default())
    }

    pub fn compile_with(source: &str, abbreviations: &Abbreviations) -> Result<Self> {
        if source.trim().is_empty() {
            return Err(Error::definition(source, "empty expression"));
        }
        let mut unknown = |name: &str| -> Result<Expr> { Err(Error::definition(name, "unknown pointcut")) };
        let root = parser::parse(source, abbreviations, &mut unknown)?;
        Ok(Self::from_parts(source, root))
    }

    /// Compile resolving named pointcuts through `namespace`.
    pub fn compile_in(source: &str, namespace: &ExpressionNamespace) -> Result<Self> {
        if source.trim().is_empty() {
            return Err(Error::definition(source, "empty expression"));
        }
        namespace.compile(source)
    }

    pub(crate) fn from_parts(source: &str, root: Expr) -> Self {
        Self { source: source.trim().to_string(), root }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn root(&self) -> &Expr {
        &self.root
    }

    pub fn has_cflow(&self) -> bool {
        self.root.has_cflow()
    }

    pub fn cflow_targets(&self) -> Vec<&Expr> {
        self.root.cflow_targets()
    }

    pub fn pointcut_types(&self) -> Vec<PointcutType> {
        let mut out = Vec::new();
        self.root.pointcut_types(&mut out);
        out
    }

    /// Definitive match. `cflow` is false when `env` carries no stack.
    pub fn matches(&self, ctx: &ExpressionContext, env: &MatchEnv<'_>) -> Result<bool> {
        eval(&self.root, ctx, env)
    }

    /// Weave-time match; `cflow` sub-expressions are unknown.
    pub fn may_match(&self, ctx: &ExpressionContext, lookup: Option<&dyn ClassLookup>) -> Result<Tri> {
        eval_static(&self.root, ctx, lookup)
    }

    /// Whether `ctx` starts a control flow region some `cflow` body selects.
    pub fn defines_cflow_for(&self, ctx: &ExpressionContext, lookup: Option<&dyn ClassLookup>) -> Result<bool> {
        self.selects_region(ctx, &MatchEnv::new(lookup, None))
    }

    /// Whether the frame `ctx` satisfies one of the `cflow` bodies.
    pub fn selects_region(&self, ctx: &ExpressionContext, env: &MatchEnv<'_>) -> Result<bool> {
        for target in self.cflow_targets() {
            if eval(target, ctx, env)? {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

impl PartialEq for Expression {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

impl Eq for Expression {}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

/// Primitive (non-boolean, non-cflow) evaluation shared by both modes.
fn eval_primitive(expr: &Expr, ctx: &ExpressionContext, lookup: Option<&dyn ClassLookup>) -> Result<bool> {
    let reflect = ctx.reflect();
    match expr {
        Expr::Execution(p) => Ok(ctx.kind() == PointcutType::Execution && p.matches(reflect, lookup)?),
        Expr::Call(p) => Ok(ctx.kind() == PointcutType::Call && p.matches(reflect, lookup)?),
        Expr::Get(p) | Expr::Set(p) => {
            let wanted = if matches!(expr, Expr::Get(_)) { PointcutType::Get } else { PointcutType::Set };
            match reflect {
                ReflectInfo::Field(f) if ctx.kind() == wanted => p.matches_with(f, lookup),
                _ => Ok(false),
            }
        }
        Expr::Within(p) => match ctx.within() {
            Some(ReflectInfo::Class(c)) => p.matches_class(c, lookup),
            _ => p.matches_type(ctx.within_type(), lookup),
        },
        Expr::WithinCode(p) => match ctx.enclosing_member() {
            Some(member) => p.matches(member, lookup),
            None => Ok(false),
        },
        Expr::Handler(p) | Expr::StaticInitialization(p) => {
            let wanted =
                if matches!(expr, Expr::Handler(_)) { PointcutType::Handler } else { PointcutType::StaticInitialization };
            match reflect {
                ReflectInfo::Class(c) if ctx.kind() == wanted => p.matches_class(c, lookup),
                _ => Ok(false),
            }
        }
        Expr::Args(params) => Ok(ctx
            .argument_types()
            .map_or(false, |types| match_parameters(params, &types, lookup))),
        Expr::And(..) | Expr::Or(..) | Expr::Not(_) | Expr::Cflow(_) | Expr::CflowBelow(_) => {
            Err(Error::internal(ctx.signature(), "composite expression evaluated as primitive"))
        }
    }
}

fn eval(expr: &Expr, ctx: &ExpressionContext, env: &MatchEnv<'_>) -> Result<bool> {
    match expr {
        Expr::And(l, r) => Ok(eval(l, ctx, env)? && eval(r, ctx, env)?),
        Expr::Or(l, r) => Ok(eval(l, ctx, env)? || eval(r, ctx, env)?),
        Expr::Not(e) => Ok(!eval(e, ctx, env)?),
        Expr::Cflow(inner) => match env.cflow {
            Some(stack) => stack.any_frame(None, |frame| eval(inner, frame, env)),
            None => Ok(false),
        },
        Expr::CflowBelow(inner) => match env.cflow {
            Some(stack) => stack.any_frame(Some(ctx), |frame| eval(inner, frame, env)),
            None => Ok(false),
        },
        primitive => eval_primitive(primitive, ctx, env.lookup),
    }
}

fn eval_static(expr: &Expr, ctx: &ExpressionContext, lookup: Option<&dyn ClassLookup>) -> Result<Tri> {
    match expr {
        Expr::And(l, r) => {
            let left = eval_static(l, ctx, lookup)?;
            if left == Tri::False {
                return Ok(Tri::False);
            }
            Ok(left.and(eval_static(r, ctx, lookup)?))
        }
        Expr::Or(l, r) => {
            let left = eval_static(l, ctx, lookup)?;
            if left == Tri::True {
                return Ok(Tri::True);
            }
            Ok(left.or(eval_static(r, ctx, lookup)?))
        }
        Expr::Not(e) => Ok(!eval_static(e, ctx, lookup)?),
        Expr::Cflow(_) | Expr::CflowBelow(_) => Ok(Tri::Maybe),
        primitive => eval_primitive(primitive, ctx, lookup).map(Tri::from),
    }
}
