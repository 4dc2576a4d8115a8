//! CLI command implementations

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;

use arbor_analyzer::{AnalysisSummary, Analyzer};
use arbor_core::{AnalyzerConfig, CancelToken};
use arbor_graph::MemoryGraphStore;

/// Assemble the effective configuration: explicit file, then
/// `<root>/arbor.toml`, then defaults; the CLI project id wins, and an
/// unset project id falls back to the root directory name.
fn load_config(
    root: &PathBuf,
    config_path: Option<PathBuf>,
    project_id: Option<String>,
) -> anyhow::Result<AnalyzerConfig> {
    let mut config = match config_path {
        Some(path) => AnalyzerConfig::from_toml_file(&path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => {
            let default_path = root.join("arbor.toml");
            if default_path.exists() {
                AnalyzerConfig::from_toml_file(&default_path)
                    .with_context(|| format!("loading config from {}", default_path.display()))?
            } else {
                AnalyzerConfig::default()
            }
        }
    };
    if let Some(project_id) = project_id {
        config.project_id = project_id;
    } else if config.project_id == "default" {
        if let Some(name) = root
            .canonicalize()
            .ok()
            .and_then(|p| p.file_name().map(|n| n.to_string_lossy().to_string()))
        {
            config.project_id = name;
        }
    }
    config.validate()?;
    Ok(config)
}

fn cancel_on_ctrl_c() -> CancelToken {
    let cancel = CancelToken::new();
    let handle = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, finishing in-flight work");
            handle.cancel();
        }
    });
    cancel
}

fn report(summary: &AnalysisSummary) {
    tracing::info!(
        "analyzed {} file(s) in {}ms: {} element(s), {} edge(s), {} skipped, {} parse error(s), {} conversion error(s)",
        summary.files_analyzed,
        summary.duration_ms,
        summary.elements,
        summary.edges,
        summary.files_skipped,
        summary.parse_errors,
        summary.conversion_errors
    );
}

pub async fn index(
    root: PathBuf,
    config_path: Option<PathBuf>,
    project_id: Option<String>,
) -> anyhow::Result<()> {
    let config = load_config(&root, config_path, project_id)?;
    tracing::info!("Indexing project: {}", config.project_id);

    let store = Arc::new(MemoryGraphStore::new());
    let analyzer = Analyzer::new(config, Arc::clone(&store) as Arc<dyn arbor_graph::GraphStore>)?;
    let cancel = cancel_on_ctrl_c();

    let summary = analyzer.analyze_project(&root, &cancel).await?;
    report(&summary);
    tracing::info!(
        "graph now holds {} node(s), {} edge(s)",
        store.node_count(),
        store.edge_count()
    );
    Ok(())
}

pub async fn file(
    root: PathBuf,
    path: PathBuf,
    config_path: Option<PathBuf>,
    project_id: Option<String>,
) -> anyhow::Result<()> {
    let config = load_config(&root, config_path, project_id)?;
    tracing::info!("Re-analyzing file: {}", path.display());

    let store = Arc::new(MemoryGraphStore::new());
    let analyzer = Analyzer::new(config, store as Arc<dyn arbor_graph::GraphStore>)?;
    let cancel = cancel_on_ctrl_c();

    let summary = analyzer.analyze_file(&path, &root, &cancel).await?;
    report(&summary);
    Ok(())
}

pub fn clear(root: PathBuf) -> anyhow::Result<()> {
    let config = AnalyzerConfig::default();
    let cache_dir = config.cache_dir_under(&root);
    if cache_dir.exists() {
        std::fs::remove_dir_all(&cache_dir)
            .with_context(|| format!("removing {}", cache_dir.display()))?;
        tracing::info!("Cache cleared: {}", cache_dir.display());
    } else {
        tracing::info!("No cache at {}", cache_dir.display());
    }
    Ok(())
}
