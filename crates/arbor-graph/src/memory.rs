//! In-memory graph store backed by petgraph.
//!
//! Upserts are keyed through id -> index maps so re-applying a batch is a
//! no-op. An edge may arrive before its endpoints exist (placeholder
//! targets); the store materializes a bare node for the id and later
//! upserts fill it in.

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;
use dashmap::DashMap;
use petgraph::stable_graph::{EdgeIndex, NodeIndex, StableDiGraph};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use serde_json::Value;

use arbor_core::StoreError;

use crate::store::{EdgeUpsert, GraphMutation, GraphStore, NodeUpsert};

/// A stored node: canonical id, labels, properties.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredNode {
    pub id: String,
    pub kinds: Vec<String>,
    pub properties: BTreeMap<String, Value>,
}

/// A stored edge keyed by its identity triple.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredEdge {
    pub id: String,
    pub edge_type: String,
    pub properties: BTreeMap<String, Value>,
}

#[derive(Default)]
struct Inner {
    graph: StableDiGraph<StoredNode, StoredEdge>,
}

/// Thread-safe in-memory store. The id indexes live outside the graph lock
/// so concurrent readers can resolve ids without contention.
pub struct MemoryGraphStore {
    inner: Mutex<Inner>,
    node_index: DashMap<String, NodeIndex>,
    edge_index: DashMap<String, EdgeIndex>,
}

impl MemoryGraphStore {
    pub fn new() -> Self {
        MemoryGraphStore {
            inner: Mutex::new(Inner::default()),
            node_index: DashMap::new(),
            edge_index: DashMap::new(),
        }
    }

    pub fn node_count(&self) -> usize {
        self.inner.lock().expect("store lock").graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.inner.lock().expect("store lock").graph.edge_count()
    }

    /// Snapshot a node by canonical id.
    pub fn node(&self, id: &str) -> Option<StoredNode> {
        let idx = *self.node_index.get(id)?;
        self.inner
            .lock()
            .expect("store lock")
            .graph
            .node_weight(idx)
            .cloned()
    }

    /// Snapshot all edges leaving a node.
    pub fn edges_from(&self, id: &str) -> Vec<(StoredEdge, String)> {
        let Some(idx) = self.node_index.get(id).map(|r| *r) else {
            return vec![];
        };
        let inner = self.inner.lock().expect("store lock");
        inner
            .graph
            .edges_directed(idx, Direction::Outgoing)
            .filter_map(|edge_ref| {
                let target = inner.graph.node_weight(edge_ref.target())?;
                Some((edge_ref.weight().clone(), target.id.clone()))
            })
            .collect()
    }

    /// Ids of all nodes carrying the given kind label.
    pub fn node_ids_of_kind(&self, kind: &str) -> Vec<String> {
        let inner = self.inner.lock().expect("store lock");
        let mut out: Vec<String> = inner
            .graph
            .node_weights()
            .filter(|n| n.kinds.iter().any(|k| k == kind))
            .map(|n| n.id.clone())
            .collect();
        out.sort();
        out
    }

    pub fn has_node(&self, id: &str) -> bool {
        self.node_index.contains_key(id)
    }

    fn ensure_node(&self, inner: &mut Inner, id: &str) -> NodeIndex {
        if let Some(existing) = self.node_index.get(id) {
            return *existing;
        }
        let idx = inner.graph.add_node(StoredNode {
            id: id.to_string(),
            kinds: vec![],
            properties: BTreeMap::new(),
        });
        self.node_index.insert(id.to_string(), idx);
        idx
    }

    fn upsert_node(&self, inner: &mut Inner, upsert: &NodeUpsert) {
        let idx = self.ensure_node(inner, &upsert.id);
        if let Some(node) = inner.graph.node_weight_mut(idx) {
            node.kinds = upsert.kinds.clone();
            node.properties = upsert.properties.clone();
        }
    }

    fn upsert_edge(&self, inner: &mut Inner, upsert: &EdgeUpsert) {
        if let Some(existing) = self.edge_index.get(&upsert.id).map(|r| *r) {
            if let Some(edge) = inner.graph.edge_weight_mut(existing) {
                edge.properties.extend(upsert.properties.clone());
                return;
            }
        }
        let source = self.ensure_node(inner, &upsert.source_id);
        let target = self.ensure_node(inner, &upsert.target_id);
        let idx = inner.graph.add_edge(
            source,
            target,
            StoredEdge {
                id: upsert.id.clone(),
                edge_type: upsert.edge_type.clone(),
                properties: upsert.properties.clone(),
            },
        );
        self.edge_index.insert(upsert.id.clone(), idx);
    }
}

impl Default for MemoryGraphStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl GraphStore for MemoryGraphStore {
    async fn apply(&self, batch: &[GraphMutation]) -> Result<(), StoreError> {
        let mut inner = self
            .inner
            .lock()
            .map_err(|_| StoreError::Fatal("store lock poisoned".to_string()))?;
        for mutation in batch {
            match mutation {
                GraphMutation::UpsertNode(node) => self.upsert_node(&mut inner, node),
                GraphMutation::UpsertEdge(edge) => self.upsert_edge(&mut inner, edge),
            }
        }
        Ok(())
    }

    async fn delete_nodes(&self, ids: &[String]) -> Result<usize, StoreError> {
        let mut inner = self
            .inner
            .lock()
            .map_err(|_| StoreError::Fatal("store lock poisoned".to_string()))?;
        let mut removed = 0usize;
        for id in ids {
            let Some((_, idx)) = self.node_index.remove(id) else {
                continue;
            };
            // incident edges disappear with the node; drop their index
            // entries first
            let incident: Vec<(String, EdgeIndex)> = inner
                .graph
                .edges_directed(idx, Direction::Outgoing)
                .chain(inner.graph.edges_directed(idx, Direction::Incoming))
                .map(|e| (e.weight().id.clone(), e.id()))
                .collect();
            for (edge_id, _) in incident {
                self.edge_index.remove(&edge_id);
            }
            inner.graph.remove_node(idx);
            removed += 1;
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: &str, kind: &str) -> GraphMutation {
        GraphMutation::UpsertNode(NodeUpsert {
            id: id.to_string(),
            kinds: vec![kind.to_string()],
            properties: BTreeMap::new(),
        })
    }

    fn edge(source: &str, edge_type: &str, target: &str) -> GraphMutation {
        GraphMutation::UpsertEdge(EdgeUpsert {
            id: format!("{source}:{edge_type}:{target}"),
            source_id: source.to_string(),
            edge_type: edge_type.to_string(),
            target_id: target.to_string(),
            properties: BTreeMap::new(),
        })
    }

    #[tokio::test]
    async fn applying_a_batch_twice_is_idempotent() {
        let store = MemoryGraphStore::new();
        let batch = vec![
            node("a", "file"),
            node("b", "class"),
            edge("a", "CONTAINS", "b"),
        ];
        store.apply(&batch).await.unwrap();
        store.apply(&batch).await.unwrap();
        assert_eq!(store.node_count(), 2);
        assert_eq!(store.edge_count(), 1);
    }

    #[tokio::test]
    async fn edge_to_missing_target_creates_bare_node() {
        let store = MemoryGraphStore::new();
        store
            .apply(&[node("a", "file"), edge("a", "IMPORTS", "external")])
            .await
            .unwrap();
        assert_eq!(store.node_count(), 2);
        let bare = store.node("external").unwrap();
        assert!(bare.kinds.is_empty());

        // a later node upsert fills the stub in
        store.apply(&[node("external", "module")]).await.unwrap();
        assert_eq!(store.node_count(), 2);
        assert_eq!(store.node("external").unwrap().kinds, vec!["module"]);
    }

    #[tokio::test]
    async fn delete_removes_incident_edges() {
        let store = MemoryGraphStore::new();
        store
            .apply(&[
                node("a", "file"),
                node("b", "class"),
                edge("a", "CONTAINS", "b"),
            ])
            .await
            .unwrap();
        let removed = store
            .delete_nodes(&["b".to_string(), "missing".to_string()])
            .await
            .unwrap();
        assert_eq!(removed, 1);
        assert_eq!(store.node_count(), 1);
        assert_eq!(store.edge_count(), 0);
        assert!(store.edges_from("a").is_empty());
    }

    #[tokio::test]
    async fn node_upsert_replaces_properties() {
        let store = MemoryGraphStore::new();
        let mut props = BTreeMap::new();
        props.insert("loc".to_string(), serde_json::json!(10));
        store
            .apply(&[GraphMutation::UpsertNode(NodeUpsert {
                id: "a".to_string(),
                kinds: vec!["file".to_string()],
                properties: props,
            })])
            .await
            .unwrap();
        let mut props2 = BTreeMap::new();
        props2.insert("loc".to_string(), serde_json::json!(20));
        store
            .apply(&[GraphMutation::UpsertNode(NodeUpsert {
                id: "a".to_string(),
                kinds: vec!["file".to_string()],
                properties: props2,
            })])
            .await
            .unwrap();
        assert_eq!(
            store.node("a").unwrap().properties["loc"],
            serde_json::json!(20)
        );
    }
}
