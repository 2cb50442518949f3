//! Question frontmatter parser.
//!
//! # Responsibility
//! - Split a question file into its YAML frontmatter and markdown body.
//! - Validate tags and question type against the bank configuration.
//! - Derive id, section title and base path from the file path.
//!
//! # Invariants
//! - A question file has a non-empty frontmatter block and a non-empty body.
//! - Every returned tag is spelled exactly as declared in the config.

use crate::config::BankConfig;
use crate::model::assignment::{AssignmentId, AssignmentType};
use crate::model::frontmatter::Frontmatter;
use crate::parser::qid;
use serde::Deserialize;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::Path;

const DELIMITER: &str = "---";

#[derive(Debug)]
pub enum FrontmatterError {
    Io(std::io::Error),
    MissingFrontmatter,
    MissingBody,
    InvalidYaml(serde_yaml::Error),
    UnknownTag(String),
    UnsupportedType(String),
    NegativeValue { field: &'static str, value: i64 },
    NoSectionDirectory,
    /// An added file already carries an assignment id.
    UnexpectedQid(AssignmentId),
}

impl Display for FrontmatterError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(err) => write!(f, "failed to read question file: {err}"),
            Self::MissingFrontmatter => write!(
                f,
                "invalid question format: must start with a `---` frontmatter block"
            ),
            Self::MissingBody => write!(
                f,
                "invalid question format: must contain frontmatter and body"
            ),
            Self::InvalidYaml(err) => write!(f, "invalid frontmatter yaml: {err}"),
            Self::UnknownTag(tag) => {
                write!(f, "invalid tag provided: {tag} is not present in config file")
            }
            Self::UnsupportedType(kind) => {
                write!(f, "question type `{kind}` is not allowed by the config file")
            }
            Self::NegativeValue { field, value } => {
                write!(f, "frontmatter field `{field}` must not be negative, got {value}")
            }
            Self::NoSectionDirectory => {
                write!(f, "question files must live inside a section directory")
            }
            Self::UnexpectedQid(id) => write!(
                f,
                "added files should not have a qid in their filename (found qid {id})"
            ),
        }
    }
}

impl Error for FrontmatterError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            Self::InvalidYaml(err) => Some(err),
            _ => None,
        }
    }
}

impl From<serde_yaml::Error> for FrontmatterError {
    fn from(value: serde_yaml::Error) -> Self {
        Self::InvalidYaml(value)
    }
}

/// Parsing failure attributed to one file.
#[derive(Debug)]
pub struct FileParsingError {
    pub path: String,
    pub source: FrontmatterError,
}

impl FileParsingError {
    pub fn new(path: impl Into<String>, source: FrontmatterError) -> Self {
        Self {
            path: path.into(),
            source,
        }
    }
}

impl Display for FileParsingError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.path, self.source)
    }
}

impl Error for FileParsingError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(&self.source)
    }
}

#[derive(Debug, Deserialize)]
struct RawFrontmatter {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    tags: Vec<String>,
    points: i64,
    #[serde(default)]
    seconds: Option<i64>,
}

/// Parser bound to one configuration snapshot.
pub struct FrontmatterParser<'cfg> {
    config: &'cfg BankConfig,
}

impl<'cfg> FrontmatterParser<'cfg> {
    pub fn new(config: &'cfg BankConfig) -> Self {
        Self { config }
    }

    /// Reads `path` from disk and parses it.
    pub fn parse_file(&self, path: &str) -> Result<Frontmatter, FileParsingError> {
        let text = std::fs::read_to_string(path)
            .map_err(|err| FileParsingError::new(path, FrontmatterError::Io(err)))?;
        self.parse(&text, path)
            .map_err(|err| FileParsingError::new(path, err))
    }

    /// Parses question `text` that was read from `path`.
    pub fn parse(&self, text: &str, path: &str) -> Result<Frontmatter, FrontmatterError> {
        let (yaml, _body) = split(text)?;
        let raw: RawFrontmatter = serde_yaml::from_str(yaml)?;

        let assignment_type = AssignmentType::from_label(&raw.kind)
            .filter(|kind| self.config.allows_type(*kind))
            .ok_or_else(|| FrontmatterError::UnsupportedType(raw.kind.clone()))?;

        if raw.points < 0 {
            return Err(FrontmatterError::NegativeValue {
                field: "points",
                value: raw.points,
            });
        }
        if let Some(seconds) = raw.seconds.filter(|seconds| *seconds < 0) {
            return Err(FrontmatterError::NegativeValue {
                field: "seconds",
                value: seconds,
            });
        }

        let mut tags: Vec<String> = Vec::with_capacity(raw.tags.len());
        for tag in &raw.tags {
            let declared = self
                .config
                .resolve_tag(tag)
                .ok_or_else(|| FrontmatterError::UnknownTag(tag.clone()))?;
            if !tags.iter().any(|known| known == declared) {
                tags.push(declared.to_string());
            }
        }

        Ok(Frontmatter {
            id: qid::decode(path),
            tags,
            assignment_type,
            available_points: raw.points,
            available_seconds: raw.seconds,
            section_title: section_title(path)?,
            original_file_path: path.to_string(),
            base_file_path: qid::strip(path),
        })
    }
}

/// Splits question text into `(frontmatter yaml, body)`.
pub fn split(text: &str) -> Result<(&str, &str), FrontmatterError> {
    let trimmed = text.trim_start_matches('\u{feff}').trim_start();
    let rest = trimmed
        .strip_prefix(DELIMITER)
        .ok_or(FrontmatterError::MissingFrontmatter)?;

    let closing = find_closing_delimiter(rest).ok_or(FrontmatterError::MissingBody)?;
    let yaml = rest[..closing].trim();
    let body = rest[closing + DELIMITER.len()..].trim();

    if yaml.is_empty() {
        return Err(FrontmatterError::MissingFrontmatter);
    }
    if body.is_empty() {
        return Err(FrontmatterError::MissingBody);
    }
    Ok((yaml, body))
}

/// Byte offset of the next line consisting of `---` only.
fn find_closing_delimiter(rest: &str) -> Option<usize> {
    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        if offset > 0 && line.trim_end() == DELIMITER {
            return Some(offset);
        }
        offset += line.len();
    }
    None
}

fn section_title(path: &str) -> Result<String, FrontmatterError> {
    Path::new(path)
        .parent()
        .and_then(Path::file_name)
        .and_then(|name| name.to_str())
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .ok_or(FrontmatterError::NoSectionDirectory)
}
