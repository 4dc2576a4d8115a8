//! Project tree scanning.
//!
//! Walks the root with gitignore semantics, applies the configured ignore
//! globs, and keeps only files whose extension maps to a supported
//! language. Output order is deterministic.

use std::path::{Path, PathBuf};

use globset::{Glob, GlobSet, GlobSetBuilder};
use ignore::WalkBuilder;
use tracing::warn;

use arbor_core::{AnalyzerConfig, AnalyzerError, ConfigError, SourceLanguage};

/// A file selected for analysis. Contents are read later, inside the
/// conversion worker.
#[derive(Debug, Clone)]
pub struct ScannedFile {
    pub absolute_path: PathBuf,
    /// `/`-separated, relative to the scanned root.
    pub relative_path: String,
    pub extension: String,
    pub language: SourceLanguage,
}

fn build_ignore_set(config: &AnalyzerConfig) -> Result<GlobSet, ConfigError> {
    let mut builder = GlobSetBuilder::new();
    for pattern in &config.ignore_patterns {
        let glob = Glob::new(pattern).map_err(|e| ConfigError::BadIgnorePattern {
            pattern: pattern.clone(),
            message: e.to_string(),
        })?;
        builder.add(glob);
    }
    builder.build().map_err(|e| ConfigError::BadIgnorePattern {
        pattern: "<combined>".to_string(),
        message: e.to_string(),
    })
}

pub fn scan_project(
    root: &Path,
    config: &AnalyzerConfig,
) -> Result<Vec<ScannedFile>, AnalyzerError> {
    let ignore_set = build_ignore_set(config)?;
    let mut out = Vec::new();

    for entry in WalkBuilder::new(root).hidden(true).build() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!(error = %e, "skipping unreadable entry");
                continue;
            }
        };
        if !entry.file_type().is_some_and(|t| t.is_file()) {
            continue;
        }
        let absolute = entry.path().to_path_buf();
        let relative = match absolute.strip_prefix(root) {
            Ok(rel) => rel.to_string_lossy().replace('\\', "/"),
            Err(_) => continue,
        };
        if ignore_set.is_match(&relative) || ignore_set.is_match(entry.path()) {
            continue;
        }
        let Some(extension) = absolute
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
        else {
            continue;
        };
        if !config.supports_extension(&extension) {
            continue;
        }
        let language = SourceLanguage::from_extension(&extension);
        if language == SourceLanguage::Unknown {
            continue;
        }
        out.push(ScannedFile {
            absolute_path: absolute,
            relative_path: relative,
            extension,
            language,
        });
    }

    out.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
    Ok(out)
}
