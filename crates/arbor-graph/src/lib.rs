//! Arbor Graph — reference resolution and idempotent graph materialization

pub mod emitter;
pub mod memory;
pub mod resolver;
pub mod store;

pub use emitter::GraphEmitter;
pub use memory::MemoryGraphStore;
pub use resolver::Resolver;
pub use store::{EdgeUpsert, GraphMutation, GraphStore, NodeUpsert};
