pub mod files;
pub mod ingest;

pub use files::{load_dataset, DataPaths};
pub use ingest::{build_compact, ingest, BuildOutcome, BuildReport, IngestError, IngestStats, StreamConfig};
