//! Snippet persistence in a JSON file.

use std::{
    fs,
    io::{self, Write},
    path::{Path, PathBuf},
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    config::Config,
    execution::{Language, RunRequest},
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snippet {
    pub title: String,
    pub language: Language,
    #[serde(rename = "code")]
    pub source: String,
    pub created_at: DateTime<Utc>,
}

impl Snippet {
    pub fn new(title: impl Into<String>, language: Language, source: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            language,
            source: source.into(),
            created_at: Utc::now(),
        }
    }

    pub fn to_request(&self) -> RunRequest {
        RunRequest::new(self.language, self.source.clone())
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to access snippet store {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("snippet store {} is corrupt: {source}", path.display())]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone)]
pub struct SnippetStore {
    path: PathBuf,
}

impl SnippetStore {
    pub fn from_config(cfg: &Config) -> Self {
        Self::new(cfg.snippet_store_path())
    }

    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load all snippets in stored order. A missing file is an empty store.
    pub fn load(&self) -> Result<Vec<Snippet>, StoreError> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => return Err(self.io_error(source)),
        };
        if text.trim().is_empty() {
            return Ok(Vec::new());
        }
        serde_json::from_str(&text).map_err(|source| StoreError::Corrupt {
            path: self.path.clone(),
            source,
        })
    }

    /// Replace the stored snippets.
    pub fn save(&self, snippets: &[Snippet]) -> Result<(), StoreError> {
        let dir = match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir).map_err(|e| self.io_error(e))?;

        let json = serde_json::to_string_pretty(snippets).map_err(|source| StoreError::Corrupt {
            path: self.path.clone(),
            source,
        })?;
        // Write next to the target and rename so a crash never leaves half a file.
        let mut tmp = tempfile::NamedTempFile::new_in(&dir).map_err(|e| self.io_error(e))?;
        tmp.write_all(json.as_bytes()).map_err(|e| self.io_error(e))?;
        tmp.persist(&self.path).map_err(|e| self.io_error(e.error))?;
        Ok(())
    }

    /// Insert `snippet` at the front and save.
    pub fn add(&self, snippet: Snippet) -> Result<Vec<Snippet>, StoreError> {
        let mut snippets = self.load()?;
        snippets.insert(0, snippet);
        self.save(&snippets)?;
        Ok(snippets)
    }

    /// Remove the snippet at `index` and save. Out-of-range indices are ignored.
    pub fn delete(&self, index: usize) -> Result<Vec<Snippet>, StoreError> {
        let mut snippets = self.load()?;
        if index < snippets.len() {
            snippets.remove(index);
            self.save(&snippets)?;
        }
        Ok(snippets)
    }

    fn io_error(&self, source: io::Error) -> StoreError {
        StoreError::Io {
            path: self.path.clone(),
            source,
        }
    }
}
