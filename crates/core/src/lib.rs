//! # CaseClaw Core
//!
//! Domain types, traits, and error definitions for the CaseClaw forensic
//! analysis agent. This crate has **zero framework dependencies**: it defines
//! the domain model that all other crates implement against.
//!
//! ## Design Philosophy
//!
//! Every external collaborator is a trait here:
//! - [`Provider`] — the streaming text-generation backend
//! - [`ForensicStore`] — the relational store holding ingested reports
//! - [`VectorIndex`] — nearest-neighbour search over artifact rows
//!
//! Implementations live in their respective crates, so the agent loop can be
//! driven end-to-end against scripted mocks in tests.

pub mod dataset;
pub mod error;
pub mod event;
pub mod message;
pub mod provider;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use dataset::{
    ArtifactRow, ArtifactSummary, ForensicStore, PatternQuery, ReportSummary, RowQuery,
    SemanticHit, VectorIndex,
};
pub use error::{Error, Result};
pub use event::{DomainEvent, EventBus};
pub use message::{Message, Role};
pub use provider::{Provider, ProviderRequest, ProviderResponse, StreamChunk};
pub use tool::{ToolCall, ToolErrorType, ToolFailure, ToolResult};
