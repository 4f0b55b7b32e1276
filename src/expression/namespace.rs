use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::pattern::{is_name_char, Abbreviations};

use super::ast::Expr;
use super::{parser, Expression};

/// Named pointcuts visible to an expression, with an optional parent scope.
///
/// Aspect namespaces have the system namespace as parent, so aspect-local
/// names shadow system-wide ones.
#[derive(Debug, Clone, Default)]
pub struct ExpressionNamespace {
    name: String,
    pointcuts: BTreeMap<String, String>,
    parent: Option<Arc<ExpressionNamespace>>,
    abbreviations: Abbreviations,
}

impl ExpressionNamespace {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), ..Default::default() }
    }

    pub fn with_parent(mut self, parent: Arc<ExpressionNamespace>) -> Self {
        self.abbreviations = parent.abbreviations.clone();
        self.parent = Some(parent);
        self
    }

    pub fn with_abbreviations(mut self, abbreviations: Abbreviations) -> Self {
        self.abbreviations = abbreviations;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn abbreviations(&self) -> &Abbreviations {
        &self.abbreviations
    }

    /// Register a named pointcut. Redefinition replaces the previous source.
    pub fn define(&mut self, name: &str, source: &str) -> Result<()> {
        let valid = !name.is_empty()
            && !name.starts_with('.')
            && !name.ends_with('.')
            && name.chars().all(|c| is_name_char(c) || c == '.');
        if !valid {
            return Err(Error::definition(name, "invalid pointcut name"));
        }
        if source.trim().is_empty() {
            return Err(Error::definition(name, "pointcut expression is empty"));
        }
        self.pointcuts.insert(name.to_string(), source.trim().to_string());
        Ok(())
    }

    /// Source of `name`, searching parent scopes.
    pub fn get(&self, name: &str) -> Option<&str> {
        match self.pointcuts.get(name) {
            Some(source) => Some(source),
            None => self.parent.as_ref()?.get(name),
        }
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.pointcuts.keys().map(String::as_str)
    }

    pub fn compile(&self, source: &str) -> Result<Expression> {
        let root = self.parse_in(source, &mut Vec::new())?;
        Ok(Expression::from_parts(source, root))
    }

    pub fn compile_pointcut(&self, name: &str) -> Result<Expression> {
        let source = self.get(name).ok_or_else(|| Error::definition(name, "unknown pointcut"))?;
        self.compile(source)
    }

    fn parse_in(&self, source: &str, stack: &mut Vec<String>) -> Result<Expr> {
        let mut resolve = |name: &str| self.resolve(name, stack);
        parser::parse(source, &self.abbreviations, &mut resolve)
    }

    fn resolve(&self, name: &str, stack: &mut Vec<String>) -> Result<Expr> {
        if stack.iter().any(|seen| seen == name) {
            return Err(Error::definition(name, format!("circular pointcut reference via {}", stack.join(" -> "))));
        }
        let source = self.get(name).ok_or_else(|| Error::definition(name, "unknown pointcut"))?.to_string();
        stack.push(name.to_string());
        let expr = self.parse_in(&source, stack);
        stack.pop();
        expr
    }
}
