//! Arbor Core — canonical ids, IR schema, collection, and persistent state

pub mod cancel;
pub mod collector;
pub mod config;
pub mod entity_map;
pub mod error;
pub mod ids;
pub mod model;

pub use cancel::CancelToken;
pub use collector::IrCollector;
pub use config::AnalyzerConfig;
pub use entity_map::{EntityMap, ENTITY_MAP_FILE};
pub use error::{AnalyzerError, ConfigError, EntityMapError, StoreError};
pub use ids::{normalize_fragment, IdMinter, ID_SCHEME};
pub use model::{
    CanonicalId, EdgeType, ElementKind, ElementPayload, FileIr, IrElement, IrError, IrErrorKind,
    Parameter, PotentialRelationship, RelationDetail, RelationKind, ResolvedEdge, SourceLanguage,
    SourceSpan, IR_SCHEMA_VERSION,
};
