//! External feed ingestion: XLSX reading and row normalization.

pub mod normalize;
pub mod reader;

pub use normalize::{normalize_rows, ExternalRecord, NormalizationError};
pub use reader::{read_feed, RawRow, REQUIRED_COLUMNS};
