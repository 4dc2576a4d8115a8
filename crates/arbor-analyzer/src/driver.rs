//! Run orchestration: full-project and single-file analysis.
//!
//! Conversion fans out over a semaphore-bounded set of tasks; aggregation,
//! resolution and emission run on the driver task. The entity map is only
//! rewritten after the store acknowledged every batch.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use arbor_core::{
    AnalyzerConfig, AnalyzerError, CancelToken, ConfigError, EntityMap, FileIr, IrCollector,
    IrErrorKind,
};
use arbor_frontends::{
    frontend::{FileSource, FrontendContext, FrontendRegistry},
    parser_pool::ParserPool,
};
use arbor_graph::{emitter::GraphEmitter, GraphStore, Resolver};

use crate::scanner::{scan_project, ScannedFile};

/// What a run did, reported to the caller on success.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AnalysisSummary {
    pub files_analyzed: usize,
    pub files_skipped: usize,
    pub elements: usize,
    pub edges: usize,
    pub parse_errors: usize,
    pub conversion_errors: usize,
    pub duration_ms: u64,
}

enum Converted {
    Ir(Box<FileIr>),
    Skipped,
}

/// Owns the pipeline end to end: scan, convert, collect, resolve, emit,
/// record. The graph store connection lives for the analyzer's lifetime
/// and is released on drop, success or failure alike.
pub struct Analyzer {
    config: AnalyzerConfig,
    store: Arc<dyn GraphStore>,
    registry: Arc<FrontendRegistry>,
    ctx: FrontendContext,
    emitter: GraphEmitter,
}

impl Analyzer {
    pub fn new(config: AnalyzerConfig, store: Arc<dyn GraphStore>) -> Result<Self, ConfigError> {
        config.validate()?;
        let pool = ParserPool::new(config.max_workers);
        let registry = Arc::new(FrontendRegistry::with_defaults(pool));
        let ctx = FrontendContext::new(config.project_id.clone());
        let emitter = GraphEmitter::new(config.batch_size, config.emit_retries);
        Ok(Analyzer {
            config,
            store,
            registry,
            ctx,
            emitter,
        })
    }

    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    /// Analyze a whole project tree and rebuild its entity map.
    pub async fn analyze_project(
        &self,
        root: &Path,
        cancel: &CancelToken,
    ) -> Result<AnalysisSummary, AnalyzerError> {
        let started = Instant::now();
        let files = scan_project(root, &self.config)?;
        info!(files = files.len(), root = %root.display(), "project scan complete");

        let mut entity_map = EntityMap::load(&self.config.cache_dir_under(root))?;
        entity_map.clear();

        let (irs, skipped) = self.convert_all(files, cancel).await?;

        let mut collector = IrCollector::new();
        let mut parse_errors = 0usize;
        for ir in irs {
            if ir
                .errors
                .iter()
                .any(|e| e.kind == IrErrorKind::Parse)
            {
                parse_errors += 1;
            }
            collector.ingest(ir);
        }

        let edges = Resolver::new(&collector, &self.config).resolve(cancel)?;
        let elements: Vec<_> = collector.elements().collect();
        let stats = self
            .emitter
            .emit(self.store.as_ref(), &elements, &edges, cancel)
            .await?;

        let analyzed_paths: Vec<String> = collector.files().cloned().collect();
        for path in analyzed_paths {
            let ids = collector.ids_for_file(&path);
            entity_map.update(&path, &ids);
        }
        entity_map.save()?;

        let summary = AnalysisSummary {
            files_analyzed: collector.files().count(),
            files_skipped: skipped,
            elements: stats.nodes,
            edges: stats.edges,
            parse_errors,
            conversion_errors: collector.conversion_error_count(),
            duration_ms: started.elapsed().as_millis() as u64,
        };
        info!(
            files = summary.files_analyzed,
            elements = summary.elements,
            edges = summary.edges,
            skipped = summary.files_skipped,
            "analysis complete"
        );
        Ok(summary)
    }

    /// Re-analyze one file incrementally: emit its fresh graph, then drop
    /// every node the previous run attributed to it that no longer exists.
    pub async fn analyze_file(
        &self,
        path: &Path,
        root: &Path,
        cancel: &CancelToken,
    ) -> Result<AnalysisSummary, AnalyzerError> {
        let started = Instant::now();
        let absolute = if path.is_absolute() {
            path.to_path_buf()
        } else {
            root.join(path)
        };
        let relative = absolute
            .strip_prefix(root)
            .unwrap_or(&absolute)
            .to_string_lossy()
            .replace('\\', "/");
        let extension = absolute
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();
        let language = arbor_core::SourceLanguage::from_extension(&extension);
        let Some(frontend) = self.registry.get(language) else {
            return Err(AnalyzerError::UnsupportedFile(absolute));
        };

        let mut entity_map = EntityMap::load(&self.config.cache_dir_under(root))?;
        let previous_ids = entity_map.ids_for(&relative);

        let contents =
            tokio::fs::read(&absolute)
                .await
                .map_err(|source| AnalyzerError::Io {
                    path: absolute.clone(),
                    source,
                })?;
        let source = FileSource {
            absolute_path: absolute,
            relative_path: relative.clone(),
            extension,
            contents,
            declared_language: Some(language),
        };
        let ctx = self.ctx.clone();
        let ir = tokio::task::spawn_blocking(move || frontend.convert_to_ir(&source, &ctx))
            .await
            .map_err(|e| AnalyzerError::WorkerLost(e.to_string()))?;

        let parse_errors = usize::from(ir.errors.iter().any(|e| e.kind == IrErrorKind::Parse));
        let mut collector = IrCollector::new();
        collector.ingest(ir);

        let edges = Resolver::new(&collector, &self.config).resolve(cancel)?;
        let elements: Vec<_> = collector.elements().collect();
        let stats = self
            .emitter
            .emit(self.store.as_ref(), &elements, &edges, cancel)
            .await?;

        let new_ids = collector.ids_for_file(&relative);
        let stale: Vec<String> = previous_ids
            .iter()
            .filter(|id| !new_ids.contains(id))
            .map(|id| id.to_string())
            .collect();
        if !stale.is_empty() {
            let removed = self
                .store
                .delete_nodes(&stale)
                .await
                .map_err(|source| AnalyzerError::Emit { attempts: 1, source })?;
            debug!(removed, file = %relative, "stale nodes removed");
        }

        entity_map.update(&relative, &new_ids);
        entity_map.save()?;

        Ok(AnalysisSummary {
            files_analyzed: 1,
            files_skipped: 0,
            elements: stats.nodes,
            edges: stats.edges,
            parse_errors,
            conversion_errors: collector.conversion_error_count(),
            duration_ms: started.elapsed().as_millis() as u64,
        })
    }

    /// Fan conversion out over a bounded worker set. Workers check the
    /// cancel flag at file boundaries.
    async fn convert_all(
        &self,
        files: Vec<ScannedFile>,
        cancel: &CancelToken,
    ) -> Result<(Vec<FileIr>, usize), AnalyzerError> {
        let semaphore = Arc::new(Semaphore::new(self.config.max_workers));
        let mut join_set: JoinSet<Converted> = JoinSet::new();

        for scanned in files {
            let semaphore = Arc::clone(&semaphore);
            let registry = Arc::clone(&self.registry);
            let ctx = self.ctx.clone();
            let cancel = cancel.clone();
            join_set.spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return Converted::Skipped;
                };
                if cancel.is_cancelled() {
                    return Converted::Skipped;
                }
                let Some(frontend) = registry.get(scanned.language) else {
                    return Converted::Skipped;
                };
                let contents = match tokio::fs::read(&scanned.absolute_path).await {
                    Ok(contents) => contents,
                    Err(e) => {
                        warn!(file = %scanned.relative_path, error = %e, "read failed, skipping");
                        return Converted::Skipped;
                    }
                };
                let source = FileSource {
                    absolute_path: scanned.absolute_path,
                    relative_path: scanned.relative_path,
                    extension: scanned.extension,
                    contents,
                    declared_language: Some(scanned.language),
                };
                let converted =
                    tokio::task::spawn_blocking(move || frontend.convert_to_ir(&source, &ctx))
                        .await;
                match converted {
                    Ok(ir) => Converted::Ir(Box::new(ir)),
                    Err(e) => {
                        warn!(error = %e, "conversion worker lost");
                        Converted::Skipped
                    }
                }
            });
        }

        let mut irs = Vec::new();
        let mut skipped = 0usize;
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok(Converted::Ir(ir)) => irs.push(*ir),
                Ok(Converted::Skipped) => skipped += 1,
                Err(e) => {
                    warn!(error = %e, "join failure");
                    skipped += 1;
                }
            }
        }
        if cancel.is_cancelled() {
            return Err(AnalyzerError::Cancelled);
        }

        // worker completion order is nondeterministic; restore path order
        // so downstream aggregation is stable
        irs.sort_by(|a, b| a.file_path.cmp(&b.file_path));
        Ok((irs, skipped))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arbor_graph::MemoryGraphStore;
    use std::fs;
    use tempfile::TempDir;

    fn write(root: &Path, rel: &str, contents: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    fn analyzer(store: Arc<MemoryGraphStore>) -> Analyzer {
        let config = AnalyzerConfig {
            project_id: "demo".to_string(),
            ..Default::default()
        };
        Analyzer::new(config, store).unwrap()
    }

    #[tokio::test]
    async fn full_run_emits_elements_and_entity_map() {
        let dir = TempDir::new().unwrap();
        write(
            dir.path(),
            "src/animal.ts",
            "export class Animal { speak() {} }\n",
        );
        write(
            dir.path(),
            "src/dog.ts",
            "import { Animal } from './animal';\nexport class Dog extends Animal { bark() {} }\n",
        );

        let store = Arc::new(MemoryGraphStore::new());
        let analyzer = analyzer(Arc::clone(&store));
        let summary = analyzer
            .analyze_project(dir.path(), &CancelToken::new())
            .await
            .unwrap();

        assert_eq!(summary.files_analyzed, 2);
        assert!(summary.elements >= 6, "files, classes, methods");
        assert!(summary.edges >= 3, "contains + imports + extends");
        assert_eq!(summary.parse_errors, 0);

        // the EXTENDS edge resolved concretely across files
        let dog_classes = store.node_ids_of_kind("class");
        assert_eq!(dog_classes.len(), 2);

        let entity_map = EntityMap::load(&analyzer.config().cache_dir_under(dir.path())).unwrap();
        assert_eq!(entity_map.len(), 2);
        assert!(!entity_map.ids_for("src/dog.ts").is_empty());
    }

    #[tokio::test]
    async fn incremental_rerun_deletes_stale_nodes() {
        let dir = TempDir::new().unwrap();
        write(
            dir.path(),
            "src/util.ts",
            "export function first() {}\nexport function second() {}\n",
        );

        let store = Arc::new(MemoryGraphStore::new());
        let analyzer = analyzer(Arc::clone(&store));
        analyzer
            .analyze_project(dir.path(), &CancelToken::new())
            .await
            .unwrap();

        let before = EntityMap::load(&analyzer.config().cache_dir_under(dir.path())).unwrap();
        let old_ids = before.ids_for("src/util.ts");
        assert_eq!(old_ids.len(), 3, "file + two functions");

        write(dir.path(), "src/util.ts", "export function first() {}\n");
        analyzer
            .analyze_file(Path::new("src/util.ts"), dir.path(), &CancelToken::new())
            .await
            .unwrap();

        let after = EntityMap::load(&analyzer.config().cache_dir_under(dir.path())).unwrap();
        let new_ids = after.ids_for("src/util.ts");
        assert_eq!(new_ids.len(), 2, "file + one function");

        for stale in old_ids.iter().filter(|id| !new_ids.contains(id)) {
            assert!(
                !store.has_node(stale.as_str()),
                "stale node {stale} should be gone"
            );
        }
        for kept in &new_ids {
            assert!(store.has_node(kept.as_str()));
        }
    }

    #[tokio::test]
    async fn cancelled_run_reports_cancellation() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "src/a.ts", "export const x = 1;\n");

        let store = Arc::new(MemoryGraphStore::new());
        let analyzer = analyzer(store);
        let cancel = CancelToken::new();
        cancel.cancel();
        let result = analyzer.analyze_project(dir.path(), &cancel).await;
        assert!(matches!(result, Err(AnalyzerError::Cancelled)));
    }

    #[tokio::test]
    async fn unreadable_syntax_still_completes() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "src/broken.py", "def broken(:\n");
        write(dir.path(), "src/fine.py", "def fine():\n    pass\n");

        let store = Arc::new(MemoryGraphStore::new());
        let analyzer = analyzer(store);
        let summary = analyzer
            .analyze_project(dir.path(), &CancelToken::new())
            .await
            .unwrap();
        // tree-sitter recovers from most syntax errors; whichever way the
        // broken file lands, the run itself succeeds
        assert_eq!(summary.files_analyzed + summary.files_skipped, 2);
    }
}
