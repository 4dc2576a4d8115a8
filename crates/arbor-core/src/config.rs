//! Analyzer configuration.
//!
//! The config is a plain value handed to the driver; nothing reads it from
//! ambient state. An optional `arbor.toml` can seed it, CLI flags override.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Default extension list, ordered; the order doubles as the import
/// resolution probe order.
pub const DEFAULT_EXTENSIONS: &[&str] = &[
    "ts", "tsx", "js", "jsx", "py", "java", "cs", "go", "c", "h", "cpp", "hpp", "cc", "hh", "sql",
];

/// Directory patterns skipped by default.
pub const DEFAULT_IGNORES: &[&str] = &[
    "**/node_modules/**",
    "**/target/**",
    "**/dist/**",
    "**/build/**",
    "**/.git/**",
    "**/__pycache__/**",
];

/// Cache directory name, relative to the project root unless overridden.
pub const DEFAULT_CACHE_DIR: &str = ".arbor";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AnalyzerConfig {
    /// Identifier embedded in every canonical id.
    pub project_id: String,
    /// Ordered list used both for scanning and import extension probing.
    pub supported_extensions: Vec<String>,
    /// Glob patterns to skip.
    pub ignore_patterns: Vec<String>,
    /// Import prefix -> directory, applied during import resolution.
    pub path_aliases: BTreeMap<String, String>,
    /// Max mutations per batch submitted to the graph store.
    pub batch_size: usize,
    /// Parallelism cap for per-file conversion.
    pub max_workers: usize,
    /// Location of the entity-map document.
    pub cache_dir: PathBuf,
    /// Retry budget for failed emit batches.
    pub emit_retries: u32,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        AnalyzerConfig {
            project_id: "default".to_string(),
            supported_extensions: DEFAULT_EXTENSIONS.iter().map(|s| s.to_string()).collect(),
            ignore_patterns: DEFAULT_IGNORES.iter().map(|s| s.to_string()).collect(),
            path_aliases: BTreeMap::new(),
            batch_size: 500,
            max_workers: default_workers(),
            cache_dir: PathBuf::from(DEFAULT_CACHE_DIR),
            emit_retries: 2,
        }
    }
}

fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get().max(2))
        .unwrap_or(2)
}

impl AnalyzerConfig {
    /// Load configuration from a TOML document, falling back to defaults
    /// for absent fields.
    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Unreadable {
            path: path.to_path_buf(),
            source,
        })?;
        let config: AnalyzerConfig =
            toml::from_str(&raw).map_err(|source| ConfigError::Unparsable {
                path: path.to_path_buf(),
                source,
            })?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the fatal invariants from startup.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.project_id.trim().is_empty() {
            return Err(ConfigError::EmptyProjectId);
        }
        if self.supported_extensions.is_empty() {
            return Err(ConfigError::NoExtensions);
        }
        if self.batch_size == 0 {
            return Err(ConfigError::ZeroBatchSize(self.batch_size));
        }
        if self.max_workers == 0 {
            return Err(ConfigError::ZeroWorkers(self.max_workers));
        }
        for pattern in &self.ignore_patterns {
            if let Err(e) = globset::Glob::new(pattern) {
                return Err(ConfigError::BadIgnorePattern {
                    pattern: pattern.clone(),
                    message: e.to_string(),
                });
            }
        }
        Ok(())
    }

    /// Cache directory resolved against a project root.
    pub fn cache_dir_under(&self, root: &Path) -> PathBuf {
        if self.cache_dir.is_absolute() {
            self.cache_dir.clone()
        } else {
            root.join(&self.cache_dir)
        }
    }

    /// Whether the extension (without dot) is in scope for scanning.
    pub fn supports_extension(&self, ext: &str) -> bool {
        let ext = ext.to_ascii_lowercase();
        self.supported_extensions
            .iter()
            .any(|e| e.trim_start_matches('.').eq_ignore_ascii_case(&ext))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_validate() {
        AnalyzerConfig::default().validate().unwrap();
    }

    #[test]
    fn empty_project_id_is_fatal() {
        let config = AnalyzerConfig {
            project_id: "  ".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::EmptyProjectId)
        ));
    }

    #[test]
    fn zero_batch_size_is_fatal() {
        let config = AnalyzerConfig {
            batch_size: 0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ZeroBatchSize(0))
        ));
    }

    #[test]
    fn toml_roundtrip_with_overrides() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
projectId = "shop"
batchSize = 50

[pathAliases]
"@app/" = "src/app/"
"#
        )
        .unwrap();
        let config = AnalyzerConfig::from_toml_file(file.path()).unwrap();
        assert_eq!(config.project_id, "shop");
        assert_eq!(config.batch_size, 50);
        assert_eq!(config.path_aliases["@app/"], "src/app/");
        // untouched fields keep their defaults
        assert!(config.supports_extension("ts"));
    }

    #[test]
    fn bad_glob_is_rejected() {
        let config = AnalyzerConfig {
            ignore_patterns: vec!["a{b".to_string()],
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
