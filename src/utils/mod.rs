//! Utilities (source loading, snippet download).

use std::{
    fs,
    io::{self, Read},
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};

use crate::execution::Language;

pub mod unicode;

/// Read program source from a file, or from stdin when `path` is `-`.
pub fn read_source(path: &Path) -> Result<String> {
    if path.as_os_str() == "-" {
        let mut buf = String::new();
        io::stdin()
            .read_to_string(&mut buf)
            .context("failed to read source from stdin")?;
        return Ok(buf);
    }
    fs::read_to_string(path).with_context(|| format!("failed to read '{}'", path.display()))
}

/// File name used when downloading a snippet.
pub fn download_name(language: Language) -> String {
    format!("snippet.{}", language.extension())
}

/// Write `source` to `dir/snippet.<ext>` and return the written path.
pub fn download_snippet(dir: &Path, source: &str, language: Language) -> Result<PathBuf> {
    fs::create_dir_all(dir).with_context(|| format!("failed to create '{}'", dir.display()))?;
    let path = dir.join(download_name(language));
    fs::write(&path, source).with_context(|| format!("failed to write '{}'", path.display()))?;
    Ok(path)
}
