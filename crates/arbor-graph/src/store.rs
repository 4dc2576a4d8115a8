//! The opaque graph-store contract.
//!
//! The core speaks two idempotent upserts plus a bulk delete; any store
//! honoring these semantics works, whether it writes Cypher, SQL, or an
//! in-process structure.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use arbor_core::StoreError;

/// Ensure a node exists keyed by canonical id, with exactly the given
/// label set and properties.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeUpsert {
    pub id: String,
    pub kinds: Vec<String>,
    pub properties: BTreeMap<String, Value>,
}

/// Ensure a single edge exists keyed by its `(source, type, target)`
/// identity, merging properties.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EdgeUpsert {
    pub id: String,
    pub source_id: String,
    pub edge_type: String,
    pub target_id: String,
    pub properties: BTreeMap<String, Value>,
}

/// One unit of work shipped to the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum GraphMutation {
    UpsertNode(NodeUpsert),
    UpsertEdge(EdgeUpsert),
}

impl GraphMutation {
    pub fn is_node(&self) -> bool {
        matches!(self, GraphMutation::UpsertNode(_))
    }
}

/// Contract every backing store implements.
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Apply one batch. Within a batch, node upserts precede edge upserts.
    /// A failed batch may be re-sent whole; applying the same batch twice
    /// must be equivalent to applying it once.
    async fn apply(&self, batch: &[GraphMutation]) -> Result<(), StoreError>;

    /// Remove nodes by canonical id along with their incident edges.
    /// Returns how many nodes were actually removed.
    async fn delete_nodes(&self, ids: &[String]) -> Result<usize, StoreError>;
}
