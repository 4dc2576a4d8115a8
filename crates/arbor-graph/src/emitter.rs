//! Translates resolved nodes and edges into batched, idempotent store
//! mutations.
//!
//! Batch layout is deterministic: node upserts sorted by id come first,
//! then edge upserts sorted by id, chunked to the configured batch size.
//! A failed batch is retried whole; acknowledged batches are never
//! re-sent.

use std::collections::BTreeMap;
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, warn};

use arbor_core::{AnalyzerError, CancelToken, IrElement, ResolvedEdge};

use crate::store::{EdgeUpsert, GraphMutation, GraphStore, NodeUpsert};

/// Counts reported back to the driver after a successful emit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EmitStats {
    pub nodes: usize,
    pub edges: usize,
    pub batches: usize,
}

pub struct GraphEmitter {
    batch_size: usize,
    retries: u32,
}

impl GraphEmitter {
    pub fn new(batch_size: usize, retries: u32) -> Self {
        GraphEmitter {
            batch_size: batch_size.max(1),
            retries,
        }
    }

    /// Build the mutation batches without touching the store.
    pub fn plan(&self, elements: &[&IrElement], edges: &[ResolvedEdge]) -> Vec<Vec<GraphMutation>> {
        let mut nodes: Vec<NodeUpsert> = elements.iter().map(|e| node_upsert(e)).collect();
        nodes.sort_by(|a, b| a.id.cmp(&b.id));
        nodes.dedup_by(|a, b| a.id == b.id);

        let mut edge_upserts: Vec<EdgeUpsert> = edges.iter().map(edge_upsert).collect();
        edge_upserts.sort_by(|a, b| a.id.cmp(&b.id));

        let mutations: Vec<GraphMutation> = nodes
            .into_iter()
            .map(GraphMutation::UpsertNode)
            .chain(edge_upserts.into_iter().map(GraphMutation::UpsertEdge))
            .collect();

        mutations
            .chunks(self.batch_size)
            .map(|chunk| chunk.to_vec())
            .collect()
    }

    /// Apply all batches, retrying retryable failures with backoff.
    /// Cancellation is honored between batches; acknowledged batches stay
    /// applied.
    pub async fn emit(
        &self,
        store: &dyn GraphStore,
        elements: &[&IrElement],
        edges: &[ResolvedEdge],
        cancel: &CancelToken,
    ) -> Result<EmitStats, AnalyzerError> {
        let batches = self.plan(elements, edges);
        let stats = EmitStats {
            nodes: batches
                .iter()
                .flatten()
                .filter(|m| m.is_node())
                .count(),
            edges: batches
                .iter()
                .flatten()
                .filter(|m| !m.is_node())
                .count(),
            batches: batches.len(),
        };

        for (index, batch) in batches.iter().enumerate() {
            if cancel.is_cancelled() {
                return Err(AnalyzerError::Cancelled);
            }
            self.apply_with_retry(store, batch, index).await?;
        }
        debug!(
            nodes = stats.nodes,
            edges = stats.edges,
            batches = stats.batches,
            "graph emit complete"
        );
        Ok(stats)
    }

    async fn apply_with_retry(
        &self,
        store: &dyn GraphStore,
        batch: &[GraphMutation],
        index: usize,
    ) -> Result<(), AnalyzerError> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match store.apply(batch).await {
                Ok(()) => return Ok(()),
                Err(e) if e.is_retryable() && attempt <= self.retries => {
                    warn!(batch = index, attempt, error = %e, "batch failed, retrying");
                    tokio::time::sleep(Duration::from_millis(50 * u64::from(attempt))).await;
                }
                Err(e) => {
                    return Err(AnalyzerError::Emit {
                        attempts: attempt,
                        source: e,
                    });
                }
            }
        }
    }
}

/// A node upsert from an element: the kind becomes the label, everything
/// else flattens into properties.
fn node_upsert(element: &IrElement) -> NodeUpsert {
    let mut properties = BTreeMap::new();
    if let Ok(Value::Object(map)) = serde_json::to_value(element) {
        for (key, value) in map {
            match key.as_str() {
                "id" | "kind" => {}
                "location" => {
                    if let Value::Object(span) = value {
                        for (span_key, span_value) in span {
                            properties.insert(span_key, span_value);
                        }
                    }
                }
                _ => {
                    if let Some(clean) = sanitize(value) {
                        properties.insert(key, clean);
                    }
                }
            }
        }
    }
    NodeUpsert {
        id: element.id.to_string(),
        kinds: vec![element.kind().as_str().to_string()],
        properties,
    }
}

fn edge_upsert(edge: &ResolvedEdge) -> EdgeUpsert {
    let mut properties: BTreeMap<String, Value> = edge
        .properties
        .iter()
        .filter_map(|(k, v)| sanitize(v.clone()).map(|clean| (k.clone(), clean)))
        .collect();
    if edge.is_placeholder {
        properties.insert("isPlaceholder".to_string(), Value::Bool(true));
    }
    if let Some(hint) = &edge.resolution_hint {
        properties.insert("resolutionHint".to_string(), Value::from(hint.clone()));
    }
    EdgeUpsert {
        id: edge.id.clone(),
        source_id: edge.source_id.to_string(),
        edge_type: edge.edge_type.as_str().to_string(),
        target_id: edge.target_id.to_string(),
        properties,
    }
}

/// Property hygiene: nulls and literal "undefined" are dropped, arrays of
/// scalars pass through, arrays of objects serialize to opaque strings.
fn sanitize(value: Value) -> Option<Value> {
    match value {
        Value::Null => None,
        Value::String(s) if s == "undefined" => None,
        Value::Array(items) => {
            if items.iter().any(|i| i.is_object() || i.is_array()) {
                serde_json::to_string(&items).ok().map(Value::String)
            } else {
                Some(Value::Array(items))
            }
        }
        other => Some(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryGraphStore;
    use arbor_core::{
        CanonicalId, EdgeType, ElementPayload, IdMinter, ElementKind, Parameter, SourceLanguage,
        SourceSpan,
    };
    use std::sync::atomic::{AtomicU32, Ordering};

    fn sample_function() -> IrElement {
        let minter = IdMinter::new("demo");
        IrElement {
            id: minter.mint(ElementKind::Function, "src/a.ts:go(x)"),
            name: "go".to_string(),
            file_path: "src/a.ts".to_string(),
            location: SourceSpan {
                start_line: 3,
                end_line: 9,
                start_col: 0,
                end_col: 1,
            },
            parent_id: None,
            payload: ElementPayload::Function {
                parameters: vec![Parameter::typed("x", "number")],
                return_type: None,
                is_async: true,
                is_exported: false,
            },
            tags: vec![],
        }
    }

    fn sample_file() -> IrElement {
        let minter = IdMinter::new("demo");
        IrElement {
            id: minter.mint_file("src/a.ts"),
            name: "a.ts".to_string(),
            file_path: "src/a.ts".to_string(),
            location: SourceSpan::line(1),
            parent_id: None,
            payload: ElementPayload::File {
                language: SourceLanguage::TypeScript,
                loc: 10,
                module: None,
            },
            tags: vec![],
        }
    }

    #[test]
    fn nodes_precede_edges_and_batches_split() {
        let emitter = GraphEmitter::new(2, 0);
        let file = sample_file();
        let func = sample_function();
        let edge = ResolvedEdge {
            id: format!("{}:CONTAINS:{}", file.id, func.id),
            source_id: file.id.clone(),
            edge_type: EdgeType::Contains,
            target_id: func.id.clone(),
            properties: BTreeMap::new(),
            is_placeholder: false,
            resolution_hint: None,
        };
        let elements = vec![&file, &func];
        let batches = emitter.plan(&elements, &[edge]);
        assert_eq!(batches.len(), 2);
        assert!(batches[0].iter().all(GraphMutation::is_node));
        assert!(batches[1].iter().all(|m| !m.is_node()));
    }

    #[test]
    fn object_arrays_become_opaque_strings() {
        let func = sample_function();
        let upsert = node_upsert(&func);
        let Value::String(parameters) = &upsert.properties["parameters"] else {
            panic!("parameters should be an opaque string");
        };
        assert!(parameters.contains("\"name\":\"x\""));
        assert_eq!(upsert.properties["isAsync"], Value::Bool(true));
        assert_eq!(upsert.properties["startLine"], Value::from(3));
        assert_eq!(upsert.kinds, vec!["function"]);
        assert!(!upsert.properties.contains_key("returnType"));
    }

    #[test]
    fn placeholder_flag_and_hint_ride_on_edge_properties() {
        let edge = ResolvedEdge {
            id: "a:IMPORTS:b".to_string(),
            source_id: CanonicalId::from("a"),
            edge_type: EdgeType::Imports,
            target_id: CanonicalId::from("b"),
            properties: BTreeMap::new(),
            is_placeholder: true,
            resolution_hint: Some("external module".to_string()),
        };
        let upsert = edge_upsert(&edge);
        assert_eq!(upsert.properties["isPlaceholder"], Value::Bool(true));
        assert_eq!(upsert.properties["resolutionHint"], "external module");
        assert_eq!(upsert.edge_type, "IMPORTS");
    }

    #[tokio::test]
    async fn emit_applies_everything_to_the_store() {
        let emitter = GraphEmitter::new(100, 0);
        let store = MemoryGraphStore::new();
        let file = sample_file();
        let func = sample_function();
        let edge = ResolvedEdge {
            id: format!("{}:CONTAINS:{}", file.id, func.id),
            source_id: file.id.clone(),
            edge_type: EdgeType::Contains,
            target_id: func.id.clone(),
            properties: BTreeMap::new(),
            is_placeholder: false,
            resolution_hint: None,
        };
        let elements = vec![&file, &func];
        let stats = emitter
            .emit(&store, &elements, &[edge], &CancelToken::new())
            .await
            .unwrap();
        assert_eq!(stats.nodes, 2);
        assert_eq!(stats.edges, 1);
        assert_eq!(store.node_count(), 2);
        assert_eq!(store.edge_count(), 1);
    }

    #[tokio::test]
    async fn retryable_failures_consume_the_budget() {
        struct FlakyStore {
            failures: AtomicU32,
            inner: MemoryGraphStore,
        }

        #[async_trait::async_trait]
        impl GraphStore for FlakyStore {
            async fn apply(&self, batch: &[GraphMutation]) -> Result<(), arbor_core::StoreError> {
                if self.failures.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                    if n > 0 { Some(n - 1) } else { None }
                }).is_ok()
                {
                    return Err(arbor_core::StoreError::Retryable("transient".to_string()));
                }
                self.inner.apply(batch).await
            }

            async fn delete_nodes(&self, ids: &[String]) -> Result<usize, arbor_core::StoreError> {
                self.inner.delete_nodes(ids).await
            }
        }

        let store = FlakyStore {
            failures: AtomicU32::new(2),
            inner: MemoryGraphStore::new(),
        };
        let emitter = GraphEmitter::new(10, 3);
        let file = sample_file();
        let elements = vec![&file];
        emitter
            .emit(&store, &elements, &[], &CancelToken::new())
            .await
            .unwrap();
        assert_eq!(store.inner.node_count(), 1);

        // budget exhausted surfaces the emit error
        let store = FlakyStore {
            failures: AtomicU32::new(10),
            inner: MemoryGraphStore::new(),
        };
        let emitter = GraphEmitter::new(10, 1);
        let result = emitter
            .emit(&store, &elements, &[], &CancelToken::new())
            .await;
        assert!(matches!(result, Err(AnalyzerError::Emit { .. })));
    }

    #[test]
    fn sanitize_drops_undefined() {
        assert_eq!(sanitize(Value::String("undefined".to_string())), None);
        assert_eq!(sanitize(Value::Null), None);
        assert_eq!(
            sanitize(Value::Array(vec![Value::from(1), Value::from(2)])),
            Some(Value::Array(vec![Value::from(1), Value::from(2)]))
        );
    }
}
