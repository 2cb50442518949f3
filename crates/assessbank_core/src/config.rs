//! Bank configuration: the declared universe of tags and question types.
//!
//! # Responsibility
//! - Load `config.yaml` (`tagOptions`, `questionOptions`).
//! - Resolve tags written in question files to their declared spelling.
//!
//! # Invariants
//! - Tag matching is case-insensitive; the declared spelling wins.
//! - Configuration is passed explicitly; there is no process-global copy.

use crate::model::assignment::AssignmentType;
use serde::Deserialize;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

/// Default config filename looked up in the repository root.
pub const DEFAULT_CONFIG_FILE: &str = "config.yaml";

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BankConfig {
    #[serde(default)]
    pub tag_options: Vec<String>,
    #[serde(default)]
    pub question_options: Vec<String>,
}

#[derive(Debug)]
pub enum ConfigError {
    Io { path: PathBuf, source: std::io::Error },
    Yaml(serde_yaml::Error),
    BlankTag,
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "failed to read config `{}`: {source}", path.display())
            }
            Self::Yaml(err) => write!(f, "invalid config yaml: {err}"),
            Self::BlankTag => write!(f, "config tagOptions must not contain blank tags"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Yaml(err) => Some(err),
            Self::BlankTag => None,
        }
    }
}

impl From<serde_yaml::Error> for ConfigError {
    fn from(value: serde_yaml::Error) -> Self {
        Self::Yaml(value)
    }
}

impl BankConfig {
    pub fn new(tag_options: Vec<String>, question_options: Vec<String>) -> Self {
        Self {
            tag_options,
            question_options,
        }
    }

    /// Reads and validates a YAML config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&text)
    }

    pub fn from_yaml_str(text: &str) -> Result<Self, ConfigError> {
        let config: BankConfig = serde_yaml::from_str(text)?;
        if config.tag_options.iter().any(|tag| tag.trim().is_empty()) {
            return Err(ConfigError::BlankTag);
        }
        Ok(config)
    }

    /// Declared spelling of `tag`, matched case-insensitively.
    pub fn resolve_tag(&self, tag: &str) -> Option<&str> {
        let wanted = tag.trim();
        self.tag_options
            .iter()
            .find(|declared| declared.eq_ignore_ascii_case(wanted))
            .map(String::as_str)
    }

    /// Whether `kind` is allowed. An empty option list allows every type.
    pub fn allows_type(&self, kind: AssignmentType) -> bool {
        self.question_options.is_empty()
            || self
                .question_options
                .iter()
                .any(|option| kind.matches_option(option))
    }
}
