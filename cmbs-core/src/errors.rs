use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// A single problem found while validating per-variable options.
///
/// Issues are collected across every variable and section before being
/// raised together as [`CmbsError::Validation`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationIssue {
    pub variable: String,
    /// Section name, `None` for problems that concern the whole variable file.
    pub section: Option<String>,
    pub message: String,
}

impl ValidationIssue {
    pub fn new(variable: &str, section: Option<&str>, message: impl Into<String>) -> Self {
        Self {
            variable: variable.to_string(),
            section: section.map(str::to_string),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.section {
            Some(section) => write!(f, "{} [{}]: {}", self.variable, section, self.message),
            None => write!(f, "{}: {}", self.variable, self.message),
        }
    }
}

fn join_issues(issues: &[ValidationIssue]) -> String {
    issues
        .iter()
        .map(|issue| format!("  - {issue}"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Error type for configuration loading and preprocessing.
#[derive(Error, Debug)]
pub enum CmbsError {
    /// A malformed line, wrong field count or missing block line.
    #[error("{source_name}:{line}: {message}")]
    StructuralParse {
        source_name: String,
        line: usize,
        message: String,
    },
    /// Every per-variable validation failure found during option loading.
    #[error("There were {count} error(s) in the plot option files:\n{}", join_issues(.issues))]
    Validation {
        count: usize,
        issues: Vec<ValidationIssue>,
    },
    /// An option value outside its allowed set, raised immediately.
    #[error("Invalid value '{value}' for {key}. Expected {expected}")]
    InvalidValue {
        key: String,
        value: String,
        expected: String,
    },
    /// A directory or file that must exist does not.
    #[error("{message}: {}", .path.display())]
    Resource { path: PathBuf, message: String },
    #[error("File not found: {}", .path.display())]
    NotFound { path: PathBuf },
    #[error("Cannot evaluate expression '{expression}': {message}")]
    Expression { expression: String, message: String },
    #[error("Command '{command}' failed: {message}")]
    Command { command: String, message: String },
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl CmbsError {
    pub(crate) fn parse(source_name: &str, line: usize, message: impl Into<String>) -> Self {
        CmbsError::StructuralParse {
            source_name: source_name.to_string(),
            line,
            message: message.into(),
        }
    }
}

/// Convenience type for `Result<T, CmbsError>`.
pub type CmbsResult<T> = Result<T, CmbsError>;
