//! Execution engine: run requests, identities and runner errors.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod javascript;
pub mod python;

/// Languages the playground can run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    JavaScript,
    Python,
}

impl Language {
    pub fn extension(self) -> &'static str {
        match self {
            Language::JavaScript => "js",
            Language::Python => "py",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Language::JavaScript => "JavaScript",
            Language::Python => "Python",
        }
    }

    pub fn toggled(self) -> Self {
        match self {
            Language::JavaScript => Language::Python,
            Language::Python => Language::JavaScript,
        }
    }

    /// Infer the language from a file name's extension.
    pub fn from_path(path: &std::path::Path) -> Option<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(|ext| ext.parse().ok())
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Language::JavaScript => "javascript",
            Language::Python => "python",
        })
    }
}

impl FromStr for Language {
    type Err = ExecutionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "javascript" | "js" | "mjs" => Ok(Language::JavaScript),
            "python" | "py" => Ok(Language::Python),
            other => Err(ExecutionError::UnknownLanguage(other.to_string())),
        }
    }
}

/// Identity of one run. Messages and results are only accepted while their
/// id is the active one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExecutionId(pub uuid::Uuid);

impl ExecutionId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for ExecutionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ExecutionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What the user asked to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunRequest {
    pub language: Language,
    pub source: String,
}

impl RunRequest {
    pub fn new(language: Language, source: impl Into<String>) -> Self {
        Self {
            language,
            source: source.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("unknown language: {0}")]
    UnknownLanguage(String),
    #[error("Failed to start JavaScript sandbox: {0}")]
    SandboxSpawn(#[source] std::io::Error),
    #[error("Failed to start JavaScript sandbox: {0}")]
    SandboxUnavailable(String),
    #[error("Python runtime not available: {0}")]
    EngineUnavailable(String),
    #[error("{0}")]
    Engine(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_language_parse() {
        assert_eq!("JS".parse::<Language>().unwrap(), Language::JavaScript);
        assert_eq!(" python ".parse::<Language>().unwrap(), Language::Python);
        assert_eq!("py".parse::<Language>().unwrap(), Language::Python);
        assert!("ruby".parse::<Language>().is_err());
    }

    #[test]
    fn test_language_from_path() {
        assert_eq!(Language::from_path(Path::new("a/b.py")), Some(Language::Python));
        assert_eq!(Language::from_path(Path::new("x.js")), Some(Language::JavaScript));
        assert_eq!(Language::from_path(Path::new("README")), None);
    }

    #[test]
    fn test_language_serde_is_lowercase() {
        let json = serde_json::to_string(&Language::JavaScript).unwrap();
        assert_eq!(json, "\"javascript\"");
        assert_eq!(Language::JavaScript.to_string(), "javascript");
        assert_eq!(Language::Python.toggled(), Language::JavaScript);
    }
}
