//! Forensic dataset tools for CaseClaw.
//!
//! The model can call five read-only tools against ingested LEAPP reports:
//! list reports, list a report's artifact tables, page through rows, grep
//! for a literal pattern, and (when a vector index is configured) search by
//! meaning. [`ToolDispatcher`] validates every call against its tool's input
//! shape and always answers with a [`ToolResult`](caseclaw_core::ToolResult).

pub mod artifact_data;
pub mod artifact_list;
pub mod dispatcher;
pub mod grep_search;
pub mod input;
pub mod kind;
pub mod report_list;
pub mod semantic_search;

pub use dispatcher::ToolDispatcher;
pub use input::{ToolInput, ToolLimits};
pub use kind::ToolKind;
