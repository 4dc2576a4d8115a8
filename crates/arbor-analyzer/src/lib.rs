//! Arbor Analyzer — project scanning and run orchestration

pub mod driver;
pub mod scanner;

pub use driver::{AnalysisSummary, Analyzer};
pub use scanner::{scan_project, ScannedFile};
