//! Per-language lowering of parse trees into the language-agnostic IR

pub mod frontend;
pub mod languages;
pub mod parser_pool;
pub mod walk;

pub use frontend::{FileSource, FrontendContext, FrontendRegistry, LanguageFrontend};
pub use parser_pool::{create_parser_pool, ParseRequest, ParserPool};
pub use walk::FileIrBuilder;
