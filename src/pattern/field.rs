use std::fmt;
use std::hash::{Hash, Hasher};

use regex::Regex;

use super::{compile_regex, require_subject, Abbreviations, Qualifiers, TypePattern};
use crate::error::{Error, Result};
use crate::reflect::{ClassLookup, FieldInfo};

/// Compiled field pattern: `[@Ann] [modifiers] <type> [<class>.]<name>`.
///
/// Type and name are matched independently and both must pass.
#[derive(Debug, Clone)]
pub struct FieldPattern {
    pattern: String,
    abbreviations: Abbreviations,
    qualifiers: Qualifiers,
    field_type: TypePattern,
    declaring: Option<TypePattern>,
    name: Regex,
}

impl FieldPattern {
    pub fn compile(pattern: &str) -> Result<Self> {
        Self::compile_with(pattern, &Abbreviations::default())
    }

    pub fn compile_with(pattern: &str, abbreviations: &Abbreviations) -> Result<Self> {
        if pattern.contains('(') || pattern.contains(')') {
            return Err(Error::definition(pattern, "field patterns take no parameter list"));
        }
        let mut tokens: Vec<&str> = pattern.split_whitespace().collect();
        let qualifiers = Qualifiers::take(&mut tokens);
        qualifiers.validate(pattern)?;
        let (field_type, qualified) = match tokens.as_slice() {
            [ty, qualified] => (*ty, *qualified),
            [_] => return Err(Error::definition(pattern, "missing field type")),
            [] => return Err(Error::definition(pattern, "missing field name")),
            _ => return Err(Error::definition(pattern, "unexpected tokens before field name")),
        };

        let (class, member) = match qualified.rfind('.') {
            None => (None, qualified),
            Some(i) if qualified[..i].ends_with('.') => (Some(format!("{}.", &qualified[..i])), &qualified[i + 1..]),
            Some(i) => (Some(qualified[..i].to_string()), &qualified[i + 1..]),
        };
        if member.is_empty() || member.contains('+') || member.contains('[') {
            return Err(Error::definition(pattern, format!("invalid field name '{member}'")));
        }

        Ok(Self {
            pattern: pattern.trim().to_string(),
            abbreviations: abbreviations.clone(),
            qualifiers,
            field_type: TypePattern::compile(field_type, abbreviations)?,
            declaring: class.map(|c| TypePattern::compile(&c, abbreviations)).transpose()?,
            name: compile_regex(member)?,
        })
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn matches(&self, field: &FieldInfo) -> Result<bool> {
        self.matches_with(field, None)
    }

    pub fn matches_with(&self, field: &FieldInfo, lookup: Option<&dyn ClassLookup>) -> Result<bool> {
        require_subject(&field.name, "field name must not be empty")?;
        Ok(self.qualifiers.accepts(field.modifiers, |a| field.has_annotation(a))
            && self.name.is_match(&field.name)
            && self.field_type.matches_type(&field.type_name, lookup)
            && self.declaring.as_ref().map_or(true, |p| p.matches_type(&field.declaring_type, lookup)))
    }

    /// Match a bare `type name` pair.
    pub fn matches_signature(&self, name: &str, type_name: &str) -> Result<bool> {
        require_subject(name, "field name must not be empty")?;
        require_subject(type_name, "field type must not be empty")?;
        Ok(self.qualifiers == Qualifiers::default()
            && self.declaring.as_ref().map_or(true, TypePattern::is_any)
            && self.name.is_match(name)
            && self.field_type.matches_name(type_name))
    }
}

impl PartialEq for FieldPattern {
    fn eq(&self, other: &Self) -> bool {
        self.pattern == other.pattern && self.abbreviations == other.abbreviations
    }
}

impl Eq for FieldPattern {}

impl Hash for FieldPattern {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.pattern.hash(state);
        self.abbreviations.hash(state);
    }
}

impl fmt::Display for FieldPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.pattern)
    }
}
