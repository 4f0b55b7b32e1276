//! Glob-style patterns over class, method and field metadata.
//!
//! Pattern text is compiled once into anchored regular expressions:
//!
//! | Glob | Meaning |
//! |------|---------|
//! | `*` | any characters within one name segment |
//! | `..` | any sequence of packages (or any parameter list in `(..)`) |
//! | `+` suffix | the type and all of its subtypes |
//! | `@Name` prefix | member or class must carry the annotation |
//!
//! A lone `*` (or `..`) matches every name. Short type names found in the
//! [`Abbreviations`] table are expanded before compilation, so `String` means
//! `java.lang.String`.

pub mod class;
pub mod field;
pub mod method;

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;

use regex::Regex;

pub use class::ClassPattern;
pub use field::FieldPattern;
pub use method::{ConstructorPattern, MethodPattern, ParamPattern};

use crate::error::{Error, Result};
use crate::reflect::{ClassInfo, ClassLookup, Modifiers};

const JAVA_LANG: &[&str] = &[
    "Object", "String", "Class", "Integer", "Long", "Short", "Byte", "Character", "Boolean", "Float",
    "Double", "Number", "Void", "Math", "System", "Thread", "Runnable", "Throwable", "Exception",
    "RuntimeException", "Error", "StringBuffer", "StringBuilder", "CharSequence", "Comparable", "Iterable",
];

/// Short-name to fully-qualified-name table applied to type patterns.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Abbreviations {
    table: BTreeMap<String, String>,
}

impl Default for Abbreviations {
    fn default() -> Self {
        Self::java_lang()
    }
}

impl Abbreviations {
    pub fn empty() -> Self {
        Self { table: BTreeMap::new() }
    }

    /// The commonly used `java.lang` types.
    pub fn java_lang() -> Self {
        let table = JAVA_LANG.iter().map(|s| (s.to_string(), format!("java.lang.{s}"))).collect();
        Self { table }
    }

    pub fn insert(&mut self, short: impl Into<String>, full: impl Into<String>) {
        self.table.insert(short.into(), full.into());
    }

    pub fn with(mut self, short: impl Into<String>, full: impl Into<String>) -> Self {
        self.insert(short, full);
        self
    }

    /// Entries of `other` win over entries of `self`.
    pub fn merged(&self, other: &Abbreviations) -> Abbreviations {
        let mut table = self.table.clone();
        table.extend(other.table.iter().map(|(k, v)| (k.clone(), v.clone())));
        Abbreviations { table }
    }

    pub fn get(&self, short: &str) -> Option<&str> {
        self.table.get(short).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Parse `Short=full.Name,Other=x.Y`.
    pub fn parse_list(text: &str) -> Result<Self> {
        let mut out = Self::empty();
        for entry in text.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            let (short, full) = entry
                .split_once('=')
                .ok_or_else(|| Error::definition(entry, "abbreviation must be `Short=full.Name`"))?;
            let (short, full) = (short.trim(), full.trim());
            if short.is_empty() || full.is_empty() || short.contains('.') {
                return Err(Error::definition(entry, "abbreviation must be `Short=full.Name`"));
            }
            out.insert(short, full);
        }
        Ok(out)
    }

    /// Expand a type token; array suffixes survive.
    pub fn expand<'a>(&self, token: &'a str) -> Cow<'a, str> {
        let base = token.trim_end_matches("[]");
        if base.contains('.') || base.contains('*') {
            return Cow::Borrowed(token);
        }
        match self.table.get(base) {
            Some(full) => Cow::Owned(format!("{full}{}", &token[base.len()..])),
            None => Cow::Borrowed(token),
        }
    }
}

pub(crate) fn is_name_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

const SEGMENT: &str = r"[\w$]*";
const PACKAGES: &str = r"(?:[\w$]+\.)*";

/// Translate a type glob into an anchored regex source.
pub(crate) fn glob_to_regex(glob: &str) -> Result<String> {
    if glob.is_empty() {
        return Err(Error::definition(glob, "empty pattern"));
    }
    if matches!(glob, "*" | ".." | "*..*") {
        return Ok("^.*$".to_string());
    }
    let chars: Vec<char> = glob.chars().collect();
    let mut out = String::from("^(?:");
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match c {
            '.' if chars.get(i + 1) == Some(&'.') => {
                if chars.get(i + 2) == Some(&'.') {
                    return Err(Error::definition(glob, "too many consecutive dots"));
                }
                if i == 0 {
                    out.push_str(PACKAGES);
                } else if i + 2 == chars.len() {
                    out.push_str(r"(?:\.[\w$]+)*");
                } else {
                    out.push_str(r"\.");
                    out.push_str(PACKAGES);
                }
                i += 2;
                continue;
            }
            '.' => {
                if i == 0 || i + 1 == chars.len() {
                    return Err(Error::definition(glob, "dangling '.'"));
                }
                out.push_str(r"\.");
            }
            '*' => out.push_str(SEGMENT),
            '[' => {
                if chars.get(i + 1) != Some(&']') {
                    return Err(Error::definition(glob, "unbalanced array brackets"));
                }
                out.push_str(r"\[\]");
                i += 2;
                continue;
            }
            c if is_name_char(c) => out.push(c),
            c => return Err(Error::definition(glob, format!("unexpected character '{c}'"))),
        }
        i += 1;
    }
    out.push_str(")$");
    Ok(out)
}

pub(crate) fn compile_regex(glob: &str) -> Result<Regex> {
    let source = glob_to_regex(glob)?;
    Regex::new(&source).map_err(|e| Error::definition(glob, e.to_string()))
}

/// A single compiled type glob, optionally hierarchical (`Foo+`).
#[derive(Debug, Clone)]
pub struct TypePattern {
    source: String,
    regex: Regex,
    hierarchical: bool,
    any: bool,
}

impl TypePattern {
    pub fn compile(text: &str, abbreviations: &Abbreviations) -> Result<Self> {
        let text = text.trim();
        let (body, hierarchical) = match text.strip_suffix('+') {
            Some(body) => (body, true),
            None => (text, false),
        };
        let expanded = abbreviations.expand(body);
        let regex = compile_regex(&expanded)?;
        Ok(Self {
            source: text.to_string(),
            any: regex.as_str() == "^.*$",
            regex,
            hierarchical,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn is_any(&self) -> bool {
        self.any
    }

    pub fn is_hierarchical(&self) -> bool {
        self.hierarchical
    }

    /// Name-only match. Subtypes of a `+` pattern need [`matches_type`](Self::matches_type).
    pub fn matches_name(&self, name: &str) -> bool {
        self.regex.is_match(name)
    }

    /// Match a type name, walking supertypes when the pattern is hierarchical.
    pub fn matches_type(&self, name: &str, lookup: Option<&dyn ClassLookup>) -> bool {
        if self.matches_name(name) {
            return true;
        }
        match (self.hierarchical, lookup) {
            (true, Some(lookup)) => lookup.supertypes(name).iter().any(|s| self.matches_name(s)),
            _ => false,
        }
    }

    pub(crate) fn matches_class(&self, info: &ClassInfo, lookup: Option<&dyn ClassLookup>) -> bool {
        if self.matches_name(&info.name) {
            return true;
        }
        if !self.hierarchical {
            return false;
        }
        match lookup {
            Some(lookup) => lookup.supertypes(&info.name).iter().any(|s| self.matches_name(s)),
            None => info.direct_supertypes().any(|s| self.matches_name(s)),
        }
    }
}

/// Leading `@Annotation` and modifier keywords of a member or class pattern.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub(crate) struct Qualifiers {
    pub annotations: Vec<String>,
    pub modifiers: u16,
}

impl Qualifiers {
    /// Split qualifier tokens off the front of `tokens`.
    pub fn take<'a>(tokens: &mut Vec<&'a str>) -> Qualifiers {
        let mut out = Qualifiers::default();
        while let Some(first) = tokens.first() {
            if let Some(name) = first.strip_prefix('@') {
                out.annotations.push(name.to_string());
            } else if let Some(flag) = Modifiers::from_keyword(first) {
                out.modifiers |= flag;
            } else {
                break;
            }
            tokens.remove(0);
        }
        out
    }

    pub fn validate(&self, pattern: &str) -> Result<()> {
        for annotation in &self.annotations {
            if annotation.is_empty() || !annotation.chars().all(|c| is_name_char(c) || c == '.') {
                return Err(Error::definition(pattern, format!("invalid annotation '@{annotation}'")));
            }
        }
        Ok(())
    }

    pub fn accepts(&self, modifiers: Modifiers, has_annotation: impl Fn(&str) -> bool) -> bool {
        modifiers.contains(self.modifiers) && self.annotations.iter().all(|a| has_annotation(a))
    }
}

impl fmt::Display for TypePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

pub(crate) fn require_subject(subject: &str, what: &'static str) -> Result<()> {
    if subject.trim().is_empty() {
        return Err(Error::InvalidArgument(what));
    }
    Ok(())
}
