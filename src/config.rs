//! Weaver configuration.
//!
//! | Variable | Meaning |
//! |----------|---------|
//! | `ASPECTWERKZ_VERBOSE` | `true`/`1` raises the log level of the command-line tool |
//! | `ASPECTWERKZ_ABBREVIATIONS` | extra type abbreviations, `Short=full.Name,...` |
//! | `ASPECTWERKZ_CACHE_CONTROLLERS` | `false`/`0` rebuilds controllers on every call |
//! | `ASPECTWERKZ_DEFINITION` | path of a definition document |

use std::path::PathBuf;

use crate::pattern::Abbreviations;

pub const ENV_VERBOSE: &str = "ASPECTWERKZ_VERBOSE";
pub const ENV_ABBREVIATIONS: &str = "ASPECTWERKZ_ABBREVIATIONS";
pub const ENV_CACHE_CONTROLLERS: &str = "ASPECTWERKZ_CACHE_CONTROLLERS";
pub const ENV_DEFINITION: &str = "ASPECTWERKZ_DEFINITION";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WeaverConfig {
    pub verbose: bool,
    /// Added on top of the built-in `java.lang` table.
    pub abbreviations: Abbreviations,
    pub cache_controllers: bool,
    pub definition_path: Option<PathBuf>,
}

impl Default for WeaverConfig {
    fn default() -> Self {
        Self {
            verbose: false,
            abbreviations: Abbreviations::default(),
            cache_controllers: true,
            definition_path: None,
        }
    }
}

impl WeaverConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn verbose(mut self, value: bool) -> Self {
        self.verbose = value;
        self
    }

    pub fn abbreviation(mut self, short: impl Into<String>, full: impl Into<String>) -> Self {
        self.abbreviations.insert(short, full);
        self
    }

    pub fn cache_controllers(mut self, value: bool) -> Self {
        self.cache_controllers = value;
        self
    }

    pub fn definition_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.definition_path = Some(path.into());
        self
    }

    /// Read the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read settings through `lookup`. Malformed values keep the default and
    /// log a warning.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(value) = lookup(ENV_VERBOSE) {
            config.verbose = parse_flag(ENV_VERBOSE, &value).unwrap_or(config.verbose);
        }
        if let Some(value) = lookup(ENV_CACHE_CONTROLLERS) {
            config.cache_controllers = parse_flag(ENV_CACHE_CONTROLLERS, &value).unwrap_or(config.cache_controllers);
        }
        if let Some(value) = lookup(ENV_ABBREVIATIONS) {
            match Abbreviations::parse_list(&value) {
                Ok(extra) => config.abbreviations = config.abbreviations.merged(&extra),
                Err(err) => tracing::warn!(variable = ENV_ABBREVIATIONS, error = %err, "ignoring abbreviations"),
            }
        }
        if let Some(value) = lookup(ENV_DEFINITION).filter(|v| !v.trim().is_empty()) {
            config.definition_path = Some(PathBuf::from(value.trim()));
        }
        config
    }
}

fn parse_flag(variable: &str, value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" | "" => Some(false),
        other => {
            tracing::warn!(variable, value = other, "expected a boolean, keeping default");
            None
        }
    }
}
