//! Tool call and tool result values.
//!
//! A [`ToolCall`] is what the model asked for; a [`ToolResult`] is what goes
//! back into the conversation. Failures are values, not errors: the agent
//! loop feeds them to the model so it can correct itself on the next
//! iteration.

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::error::StoreError;

/// Machine-readable category of a failed tool call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolErrorType {
    /// Input failed the tool's declared schema.
    ValidationError,
    /// The requested tool is not part of the registry.
    ToolNotFound,
    /// The requested dataset (report) does not exist.
    ReportNotFound,
    /// One or more artifact type ids do not exist in the dataset.
    ArtifactNotFound,
    /// The backing store rejected the query.
    DatabaseError,
    /// Anything else that went wrong inside a handler.
    ExecutionError,
}

impl ToolErrorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ValidationError => "validation_error",
            Self::ToolNotFound => "tool_not_found",
            Self::ReportNotFound => "report_not_found",
            Self::ArtifactNotFound => "artifact_not_found",
            Self::DatabaseError => "database_error",
            Self::ExecutionError => "execution_error",
        }
    }

    /// Domain lookup failures get a targeted remediation message instead of
    /// the raw result.
    pub fn needs_remediation(&self) -> bool {
        matches!(
            self,
            Self::ValidationError | Self::ReportNotFound | Self::ArtifactNotFound
        )
    }
}

impl std::fmt::Display for ToolErrorType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failed tool call.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolFailure {
    pub error_type: ToolErrorType,
    pub message: String,
    /// One entry per violation (validation failures only).
    pub details: Vec<String>,
    /// Extra diagnostic fields, e.g. `available_reports`.
    pub hints: Map<String, Value>,
}

impl ToolFailure {
    pub fn new(error_type: ToolErrorType, message: impl Into<String>) -> Self {
        Self {
            error_type,
            message: message.into(),
            details: Vec::new(),
            hints: Map::new(),
        }
    }

    /// Attach a diagnostic field.
    pub fn with_hint(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.hints.insert(key.into(), value.into());
        self
    }

    pub fn validation(tool: &str, details: Vec<String>) -> Self {
        let mut failure = Self::new(
            ToolErrorType::ValidationError,
            format!("Invalid input for {tool}: {}", details.join("; ")),
        );
        failure.details = details;
        failure
    }

    pub fn tool_not_found(name: &str, valid: &[&str]) -> Self {
        Self::new(
            ToolErrorType::ToolNotFound,
            format!("Tool '{name}' not found"),
        )
        .with_hint("valid_tools", valid.iter().map(|s| Value::from(*s)).collect::<Vec<_>>())
    }

    pub fn report_not_found(job_name: &str, available: Vec<String>) -> Self {
        Self::new(
            ToolErrorType::ReportNotFound,
            format!("Report '{job_name}' not found"),
        )
        .with_hint("available_reports", available)
    }

    pub fn artifact_not_found(job_name: &str, missing: &[i64], available: Vec<i64>) -> Self {
        let ids: Vec<String> = missing.iter().map(|id| id.to_string()).collect();
        Self::new(
            ToolErrorType::ArtifactNotFound,
            format!(
                "Artifact type id(s) {} not found in report '{job_name}'",
                ids.join(", ")
            ),
        )
        .with_hint("available_artifact_type_ids", available)
    }

    pub fn execution(message: impl Into<String>) -> Self {
        Self::new(ToolErrorType::ExecutionError, message)
    }
}

impl From<StoreError> for ToolFailure {
    fn from(err: StoreError) -> Self {
        Self::new(ToolErrorType::DatabaseError, format!("Database error: {err}"))
    }
}

/// Outcome of a dispatched tool call.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolResult {
    /// Tool-specific payload; serialized with `"success": true` merged in.
    Success(Map<String, Value>),
    Failure(ToolFailure),
}

impl ToolResult {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    pub fn failure(&self) -> Option<&ToolFailure> {
        match self {
            Self::Failure(f) => Some(f),
            Self::Success(_) => None,
        }
    }

    pub fn error_type(&self) -> Option<ToolErrorType> {
        self.failure().map(|f| f.error_type)
    }

    /// The normalized JSON object fed back to the model.
    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

impl From<Result<Map<String, Value>, ToolFailure>> for ToolResult {
    fn from(result: Result<Map<String, Value>, ToolFailure>) -> Self {
        match result {
            Ok(payload) => Self::Success(payload),
            Err(failure) => Self::Failure(failure),
        }
    }
}

impl Serialize for ToolResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Success(payload) => {
                let mut map = serializer.serialize_map(Some(payload.len() + 1))?;
                map.serialize_entry("success", &true)?;
                for (k, v) in payload.iter().filter(|(k, _)| k.as_str() != "success") {
                    map.serialize_entry(k, v)?;
                }
                map.end()
            }
            Self::Failure(f) => {
                let mut map = serializer.serialize_map(None)?;
                map.serialize_entry("success", &false)?;
                map.serialize_entry("error", &format!("{}: {}", f.error_type, f.message))?;
                map.serialize_entry("error_type", &f.error_type)?;
                if !f.details.is_empty() {
                    map.serialize_entry("details", &f.details)?;
                }
                for (k, v) in &f.hints {
                    map.serialize_entry(k, v)?;
                }
                map.end()
            }
        }
    }
}

/// A request to execute a tool, as decoded from the model's `action` field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Name of the tool to execute
    pub name: String,

    /// Declared input, always a JSON object after normalization
    pub input: Value,

    /// Dataset the caller scoped the request to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dataset_id: Option<String>,
}

impl ToolCall {
    pub fn new(name: impl Into<String>, input: Value) -> Self {
        Self {
            name: name.into(),
            input: normalize_input(input),
            dataset_id: None,
        }
    }

    pub fn with_dataset(mut self, dataset_id: Option<String>) -> Self {
        self.dataset_id = dataset_id;
        self
    }

    /// Input with the caller's dataset injected as `job_name` when the tool
    /// takes one and the model omitted it.
    pub fn resolved_input(&self, accepts_dataset: bool) -> Value {
        let mut input = self.input.clone();
        if let (true, Some(dataset), Value::Object(map)) =
            (accepts_dataset, &self.dataset_id, &mut input)
        {
            if !map.contains_key("job_name") {
                map.insert("job_name".into(), Value::String(dataset.clone()));
            }
        }
        input
    }
}

/// Models sometimes send `input` as an encoded string. Decode it when it is
/// JSON, otherwise treat it as a free-text query. `null` becomes `{}`.
pub fn normalize_input(input: Value) -> Value {
    match input {
        Value::String(s) => match serde_json::from_str::<Value>(&s) {
            Ok(Value::Object(map)) => Value::Object(map),
            _ => {
                let mut map = Map::new();
                map.insert("query".into(), Value::String(s));
                Value::Object(map)
            }
        },
        Value::Null => Value::Object(Map::new()),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn success_merges_flag_into_payload() {
        let mut payload = Map::new();
        payload.insert("count".into(), json!(2));
        let value = ToolResult::Success(payload).to_json();
        assert_eq!(value, json!({"success": true, "count": 2}));
    }

    #[test]
    fn failure_serializes_type_and_hints() {
        let failure = ToolFailure::report_not_found("case-9", vec!["case-1".into()]);
        let value = ToolResult::Failure(failure).to_json();
        assert_eq!(value["success"], json!(false));
        assert_eq!(value["error_type"], json!("report_not_found"));
        assert_eq!(value["error"], json!("report_not_found: Report 'case-9' not found"));
        assert_eq!(value["available_reports"], json!(["case-1"]));
        assert!(value.get("details").is_none());
    }

    #[test]
    fn validation_failure_lists_every_detail() {
        let failure = ToolFailure::validation(
            "viewArtifactData",
            vec!["job_name: field required".into(), "limit: must be <= 200".into()],
        );
        let value = ToolResult::Failure(failure).to_json();
        assert_eq!(value["details"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn string_input_is_decoded_or_wrapped() {
        let call = ToolCall::new("viewArtifactList", json!(r#"{"job_name":"a"}"#));
        assert_eq!(call.input, json!({"job_name": "a"}));

        let call = ToolCall::new("semanticSearch", json!("deleted messages"));
        assert_eq!(call.input, json!({"query": "deleted messages"}));

        let call = ToolCall::new("viewReportList", Value::Null);
        assert_eq!(call.input, json!({}));
    }

    #[test]
    fn dataset_injected_only_when_missing_and_accepted() {
        let call = ToolCall::new("viewArtifactList", json!({}))
            .with_dataset(Some("case-1".into()));
        assert_eq!(call.resolved_input(true), json!({"job_name": "case-1"}));
        assert_eq!(call.resolved_input(false), json!({}));

        let call = ToolCall::new("viewArtifactList", json!({"job_name": "other"}))
            .with_dataset(Some("case-1".into()));
        assert_eq!(call.resolved_input(true), json!({"job_name": "other"}));
    }

    #[test]
    fn remediation_categories() {
        assert!(ToolErrorType::ReportNotFound.needs_remediation());
        assert!(ToolErrorType::ValidationError.needs_remediation());
        assert!(!ToolErrorType::DatabaseError.needs_remediation());
    }
}
