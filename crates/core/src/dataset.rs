//! Forensic dataset collaborators.
//!
//! A dataset is one ingested LEAPP report, addressed by its `job_name`.
//! Ingestion is someone else's job; the agent only reads through these
//! traits.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::StoreError;

/// One ingested report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportSummary {
    pub id: i64,
    pub job_name: String,
    pub upload_date: Option<String>,
    pub status: String,
    pub error_message: Option<String>,
}

/// One artifact table inside a report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactSummary {
    pub id: i64,
    pub file_name: String,
    pub row_count: i64,
}

/// A single artifact row. `data_json` is the decoded row object, or the raw
/// stored text with `parse_error` set when it does not decode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactRow {
    pub row_index: i64,
    pub artifact_type_id: i64,
    pub file_name: String,
    pub data_json: Value,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub parse_error: bool,
}

impl ArtifactRow {
    /// Decode a stored row, flagging text that is not valid JSON.
    pub fn decode(row_index: i64, artifact_type_id: i64, file_name: String, raw: String) -> Self {
        match serde_json::from_str::<Value>(&raw) {
            Ok(data_json) => Self {
                row_index,
                artifact_type_id,
                file_name,
                data_json,
                parse_error: false,
            },
            Err(_) => Self {
                row_index,
                artifact_type_id,
                file_name,
                data_json: Value::String(raw),
                parse_error: true,
            },
        }
    }
}

/// Page of rows from one or more artifact tables.
#[derive(Debug, Clone, PartialEq)]
pub struct RowQuery {
    pub job_name: String,
    pub artifact_type_ids: Vec<i64>,
    pub limit: u32,
    pub offset: u32,
}

/// Substring search over row contents.
#[derive(Debug, Clone, PartialEq)]
pub struct PatternQuery {
    pub job_name: String,
    pub pattern: String,
    /// Empty means every artifact table in the report.
    pub artifact_type_ids: Vec<i64>,
    pub limit: u32,
    pub case_sensitive: bool,
}

/// One nearest-neighbour match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SemanticHit {
    pub job_name: String,
    pub artifact_type_id: i64,
    pub file_name: String,
    pub row_index: i64,
    pub content: String,
    /// Cosine distance (`1 - similarity`); lower is closer.
    pub distance: f32,
}

/// Read-only access to ingested reports.
///
/// Every method is idempotent so a tool call can be retried safely.
#[async_trait]
pub trait ForensicStore: Send + Sync {
    /// All reports, newest upload first.
    async fn list_reports(&self) -> Result<Vec<ReportSummary>, StoreError>;

    async fn report_exists(&self, job_name: &str) -> Result<bool, StoreError>;

    /// Artifact tables of one report with their row counts.
    async fn list_artifacts(&self, job_name: &str) -> Result<Vec<ArtifactSummary>, StoreError>;

    async fn artifact_rows(&self, query: &RowQuery) -> Result<Vec<ArtifactRow>, StoreError>;

    async fn search_rows(&self, query: &PatternQuery) -> Result<Vec<ArtifactRow>, StoreError>;
}

/// Nearest-neighbour search over artifact row text.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    async fn query(
        &self,
        text: &str,
        job_name: Option<&str>,
        limit: usize,
    ) -> Result<Vec<SemanticHit>, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decode_valid_row() {
        let row = ArtifactRow::decode(3, 1, "sms.tsv".into(), r#"{"body":"hi"}"#.into());
        assert_eq!(row.data_json, json!({"body": "hi"}));
        assert!(!row.parse_error);
        let value = serde_json::to_value(&row).unwrap();
        assert!(value.get("parse_error").is_none());
    }

    #[test]
    fn decode_flags_invalid_json() {
        let row = ArtifactRow::decode(0, 1, "sms.tsv".into(), "not json".into());
        assert_eq!(row.data_json, json!("not json"));
        assert!(row.parse_error);
        let value = serde_json::to_value(&row).unwrap();
        assert_eq!(value["parse_error"], json!(true));
    }
}
