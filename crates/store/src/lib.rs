//! Storage backends for CaseClaw.
//!
//! - [`SqliteStore`] — the relational store of ingested LEAPP reports
//! - [`EmbeddingIndex`] — nearest-neighbour search over artifact rows

pub mod embedding;
pub mod sqlite;
pub mod vector;

pub use embedding::EmbeddingIndex;
pub use sqlite::SqliteStore;
