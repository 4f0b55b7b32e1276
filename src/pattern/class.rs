use std::fmt;
use std::hash::{Hash, Hasher};

use super::{require_subject, Abbreviations, Qualifiers, TypePattern};
use crate::error::{Error, Result};
use crate::reflect::{ClassInfo, ClassLookup};

/// Compiled class pattern such as `foo.bar.*`, `foo..Service+` or `@Entity *`.
#[derive(Debug, Clone)]
pub struct ClassPattern {
    pattern: String,
    abbreviations: Abbreviations,
    qualifiers: Qualifiers,
    type_pattern: TypePattern,
}

impl ClassPattern {
    pub fn compile(pattern: &str) -> Result<Self> {
        Self::compile_with(pattern, &Abbreviations::default())
    }

    pub fn compile_with(pattern: &str, abbreviations: &Abbreviations) -> Result<Self> {
        let mut tokens: Vec<&str> = pattern.split_whitespace().collect();
        let qualifiers = Qualifiers::take(&mut tokens);
        qualifiers.validate(pattern)?;
        let body = match tokens.as_slice() {
            [body] => *body,
            [] => return Err(Error::definition(pattern, "missing class name pattern")),
            _ => return Err(Error::definition(pattern, "unexpected tokens in class pattern")),
        };
        let type_pattern = TypePattern::compile(body, abbreviations)?;
        Ok(Self {
            pattern: pattern.trim().to_string(),
            abbreviations: abbreviations.clone(),
            qualifiers,
            type_pattern,
        })
    }

    /// The original pattern text.
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn is_hierarchical(&self) -> bool {
        self.type_pattern.is_hierarchical()
    }

    pub fn is_any(&self) -> bool {
        self.type_pattern.is_any() && self.qualifiers == Qualifiers::default()
    }

    /// Match a class by name alone. Annotation qualifiers need [`matches_class`](Self::matches_class).
    pub fn matches(&self, class_name: &str) -> Result<bool> {
        require_subject(class_name, "class name must not be empty")?;
        Ok(self.qualifiers.annotations.is_empty()
            && self.qualifiers.modifiers == 0
            && self.type_pattern.matches_name(class_name))
    }

    pub fn matches_type(&self, class_name: &str, lookup: Option<&dyn ClassLookup>) -> Result<bool> {
        require_subject(class_name, "class name must not be empty")?;
        if let Some(info) = lookup.and_then(|l| l.lookup(class_name)) {
            return self.matches_class(&info, lookup);
        }
        Ok(self.qualifiers == Qualifiers::default() && self.type_pattern.matches_type(class_name, lookup))
    }

    pub fn matches_class(&self, info: &ClassInfo, lookup: Option<&dyn ClassLookup>) -> Result<bool> {
        require_subject(&info.name, "class name must not be empty")?;
        Ok(self.qualifiers.accepts(info.modifiers, |a| info.has_annotation(a))
            && self.type_pattern.matches_class(info, lookup))
    }
}

impl PartialEq for ClassPattern {
    fn eq(&self, other: &Self) -> bool {
        self.pattern == other.pattern && self.abbreviations == other.abbreviations
    }
}

impl Eq for ClassPattern {}

impl Hash for ClassPattern {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.pattern.hash(state);
        self.abbreviations.hash(state);
    }
}

impl fmt::Display for ClassPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.pattern)
    }
}
