//! Typed tool inputs, validated at the dispatch boundary.
//!
//! Validation never stops at the first problem: every field is checked and
//! each violation becomes one entry in the failure's `details`.

use caseclaw_core::tool::ToolFailure;
use serde_json::{Map, Value};

use crate::kind::ToolKind;

/// Numeric bounds applied during validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToolLimits {
    /// Largest `limit` accepted by row-returning tools
    pub max_page_size: u32,
    /// Largest `n_results` accepted by semantic search
    pub max_semantic_results: u32,
}

impl Default for ToolLimits {
    fn default() -> Self {
        Self {
            max_page_size: 200,
            max_semantic_results: 50,
        }
    }
}

/// `viewArtifactList` input.
#[derive(Debug, Clone, PartialEq)]
pub struct ArtifactListInput {
    pub job_name: String,
}

/// `viewArtifactData` input.
#[derive(Debug, Clone, PartialEq)]
pub struct ArtifactDataInput {
    pub job_name: String,
    pub artifact_type_ids: ArtifactIds,
    pub limit: u32,
    pub offset: u32,
}

/// `grepSearch` input.
#[derive(Debug, Clone, PartialEq)]
pub struct GrepSearchInput {
    pub pattern: String,
    pub job_name: String,
    pub artifact_type_ids: Option<ArtifactIds>,
    pub limit: u32,
    pub case_sensitive: bool,
}

/// `semanticSearch` input.
#[derive(Debug, Clone, PartialEq)]
pub struct SemanticSearchInput {
    pub query: String,
    pub job_name: Option<String>,
    pub n_results: u32,
}

/// One artifact id or several, kept as the model sent it so results can
/// echo the same shape back.
#[derive(Debug, Clone, PartialEq)]
pub enum ArtifactIds {
    One(i64),
    Many(Vec<i64>),
}

impl ArtifactIds {
    pub fn to_vec(&self) -> Vec<i64> {
        match self {
            Self::One(id) => vec![*id],
            Self::Many(ids) => ids.clone(),
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            Self::One(id) => Value::from(*id),
            Self::Many(ids) => Value::from(ids.clone()),
        }
    }
}

/// A validated call, one variant per tool.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolInput {
    ReportList,
    ArtifactList(ArtifactListInput),
    ArtifactData(ArtifactDataInput),
    GrepSearch(GrepSearchInput),
    SemanticSearch(SemanticSearchInput),
}

impl ToolInput {
    /// Validate raw JSON against the tool's declared shape.
    pub fn parse(kind: ToolKind, raw: &Value, limits: &ToolLimits) -> Result<Self, ToolFailure> {
        let empty = Map::new();
        let map = match raw {
            Value::Object(map) => map,
            Value::Null => &empty,
            other => {
                return Err(ToolFailure::validation(
                    kind.name(),
                    vec![format!("input: expected an object, got {}", type_name(other))],
                ));
            }
        };

        let mut fields = Fields::new(map);
        let input = match kind {
            // Accepts no parameters; anything extra is ignored
            ToolKind::ReportList => Some(ToolInput::ReportList),
            ToolKind::ArtifactList => {
                fields.deny_unknown(&["job_name"]);
                let job_name = fields.required_str("job_name");
                job_name.map(|job_name| ToolInput::ArtifactList(ArtifactListInput { job_name }))
            }
            ToolKind::ArtifactData => {
                fields.deny_unknown(&["job_name", "artifact_type_id", "limit", "offset"]);
                let job_name = fields.required_str("job_name");
                let ids = fields.required_ids("artifact_type_id");
                let limit = fields.bounded_int("limit", 100, 1, limits.max_page_size);
                let offset = fields.bounded_int("offset", 0, 0, u32::MAX);
                match (job_name, ids, limit, offset) {
                    (Some(job_name), Some(artifact_type_ids), Some(limit), Some(offset)) => {
                        Some(ToolInput::ArtifactData(ArtifactDataInput {
                            job_name,
                            artifact_type_ids,
                            limit,
                            offset,
                        }))
                    }
                    _ => None,
                }
            }
            ToolKind::GrepSearch => {
                fields.deny_unknown(&[
                    "pattern",
                    "job_name",
                    "artifact_type_id",
                    "limit",
                    "case_sensitive",
                ]);
                let pattern = fields.required_str("pattern");
                let job_name = fields.required_str("job_name");
                let ids = fields.optional_ids("artifact_type_id");
                let limit = fields.bounded_int("limit", 50, 1, limits.max_page_size);
                let case_sensitive = fields.bool_or("case_sensitive", false);
                match (pattern, job_name, ids, limit, case_sensitive) {
                    (Some(pattern), Some(job_name), Some(artifact_type_ids), Some(limit), Some(case_sensitive)) => {
                        Some(ToolInput::GrepSearch(GrepSearchInput {
                            pattern,
                            job_name,
                            artifact_type_ids,
                            limit,
                            case_sensitive,
                        }))
                    }
                    _ => None,
                }
            }
            ToolKind::SemanticSearch => {
                fields.deny_unknown(&["query", "job_name", "n_results"]);
                let query = fields.required_str("query");
                let job_name = fields.optional_str("job_name");
                let n_results =
                    fields.bounded_int("n_results", 10, 1, limits.max_semantic_results);
                match (query, job_name, n_results) {
                    (Some(query), Some(job_name), Some(n_results)) => {
                        Some(ToolInput::SemanticSearch(SemanticSearchInput {
                            query,
                            job_name,
                            n_results,
                        }))
                    }
                    _ => None,
                }
            }
        };

        match (input, fields.errors.is_empty()) {
            (Some(input), true) => Ok(input),
            _ => Err(ToolFailure::validation(kind.name(), fields.errors)),
        }
    }
}

/// Field reader that records every violation.
///
/// Required accessors return `None` when the field is missing or invalid.
/// Optional accessors return `Some(None)` when the field is absent and
/// `None` when it is invalid.
struct Fields<'a> {
    map: &'a Map<String, Value>,
    errors: Vec<String>,
}

impl<'a> Fields<'a> {
    fn new(map: &'a Map<String, Value>) -> Self {
        Self {
            map,
            errors: Vec::new(),
        }
    }

    fn deny_unknown(&mut self, allowed: &[&str]) {
        let mut unknown: Vec<&String> = self
            .map
            .keys()
            .filter(|k| !allowed.contains(&k.as_str()))
            .collect();
        unknown.sort();
        for key in unknown {
            self.errors.push(format!("{key}: unexpected field"));
        }
    }

    fn required_str(&mut self, name: &str) -> Option<String> {
        match self.map.get(name) {
            None | Some(Value::Null) => {
                self.errors.push(format!("{name}: field required"));
                None
            }
            Some(value) => self.non_empty_str(name, value),
        }
    }

    fn optional_str(&mut self, name: &str) -> Option<Option<String>> {
        match self.map.get(name) {
            None | Some(Value::Null) => Some(None),
            Some(value) => self.non_empty_str(name, value).map(Some),
        }
    }

    fn non_empty_str(&mut self, name: &str, value: &Value) -> Option<String> {
        match value {
            Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
            Value::String(_) => {
                self.errors.push(format!("{name}: must not be empty"));
                None
            }
            other => {
                self.errors
                    .push(format!("{name}: expected a string, got {}", type_name(other)));
                None
            }
        }
    }

    fn required_ids(&mut self, name: &str) -> Option<ArtifactIds> {
        match self.map.get(name) {
            None | Some(Value::Null) => {
                self.errors.push(format!("{name}: field required"));
                None
            }
            Some(value) => self.ids(name, value),
        }
    }

    fn optional_ids(&mut self, name: &str) -> Option<Option<ArtifactIds>> {
        match self.map.get(name) {
            None | Some(Value::Null) => Some(None),
            Some(value) => self.ids(name, value).map(Some),
        }
    }

    fn ids(&mut self, name: &str, value: &Value) -> Option<ArtifactIds> {
        match value {
            Value::Array(items) if items.is_empty() => {
                self.errors.push(format!("{name}: list must not be empty"));
                None
            }
            Value::Array(items) => {
                let parsed: Vec<Option<i64>> = items.iter().map(as_integer).collect();
                if parsed.iter().all(Option::is_some) {
                    Some(ArtifactIds::Many(parsed.into_iter().flatten().collect()))
                } else {
                    self.errors
                        .push(format!("{name}: every list item must be an integer"));
                    None
                }
            }
            other => match as_integer(other) {
                Some(id) => Some(ArtifactIds::One(id)),
                None => {
                    self.errors.push(format!(
                        "{name}: expected an integer or a list of integers, got {}",
                        type_name(other)
                    ));
                    None
                }
            },
        }
    }

    fn bounded_int(&mut self, name: &str, default: u32, min: u32, max: u32) -> Option<u32> {
        let value = match self.map.get(name) {
            None | Some(Value::Null) => return Some(default),
            Some(value) => value,
        };

        match as_integer(value) {
            Some(n) if n < i64::from(min) => {
                self.errors.push(format!("{name}: must be >= {min}"));
                None
            }
            Some(n) if n > i64::from(max) => {
                self.errors.push(format!("{name}: must be <= {max}"));
                None
            }
            Some(n) => u32::try_from(n).ok(),
            None => {
                self.errors
                    .push(format!("{name}: expected an integer, got {}", type_name(value)));
                None
            }
        }
    }

    fn bool_or(&mut self, name: &str, default: bool) -> Option<bool> {
        match self.map.get(name) {
            None | Some(Value::Null) => Some(default),
            Some(Value::Bool(b)) => Some(*b),
            Some(Value::String(s)) if s.eq_ignore_ascii_case("true") => Some(true),
            Some(Value::String(s)) if s.eq_ignore_ascii_case("false") => Some(false),
            Some(other) => {
                self.errors
                    .push(format!("{name}: expected a boolean, got {}", type_name(other)));
                None
            }
        }
    }
}

/// Integers, integral floats and numeric strings all count; models are not
/// consistent about quoting ids.
fn as_integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use caseclaw_core::tool::ToolErrorType;
    use serde_json::json;

    fn parse(kind: ToolKind, raw: Value) -> Result<ToolInput, ToolFailure> {
        ToolInput::parse(kind, &raw, &ToolLimits::default())
    }

    #[test]
    fn report_list_ignores_extra_fields() {
        let input = parse(ToolKind::ReportList, json!({"job_name": "x", "foo": 1})).unwrap();
        assert_eq!(input, ToolInput::ReportList);
        assert_eq!(parse(ToolKind::ReportList, Value::Null).unwrap(), ToolInput::ReportList);
    }

    #[test]
    fn artifact_data_defaults() {
        let input = parse(
            ToolKind::ArtifactData,
            json!({"job_name": "pixel-7", "artifact_type_id": 3}),
        )
        .unwrap();
        assert_eq!(
            input,
            ToolInput::ArtifactData(ArtifactDataInput {
                job_name: "pixel-7".into(),
                artifact_type_ids: ArtifactIds::One(3),
                limit: 100,
                offset: 0,
            })
        );
    }

    #[test]
    fn artifact_data_accepts_id_list_and_numeric_strings() {
        let input = parse(
            ToolKind::ArtifactData,
            json!({"job_name": "pixel-7", "artifact_type_id": [1, "2"], "limit": "20"}),
        )
        .unwrap();
        match input {
            ToolInput::ArtifactData(data) => {
                assert_eq!(data.artifact_type_ids, ArtifactIds::Many(vec![1, 2]));
                assert_eq!(data.limit, 20);
            }
            other => panic!("unexpected input: {other:?}"),
        }
    }

    #[test]
    fn every_violation_is_reported() {
        let failure = parse(
            ToolKind::ArtifactData,
            json!({"limit": 500, "offset": -1, "verbose": true}),
        )
        .unwrap_err();
        assert_eq!(failure.error_type, ToolErrorType::ValidationError);
        assert_eq!(
            failure.details,
            vec![
                "verbose: unexpected field".to_string(),
                "job_name: field required".to_string(),
                "artifact_type_id: field required".to_string(),
                "limit: must be <= 200".to_string(),
                "offset: must be >= 0".to_string(),
            ]
        );
    }

    #[test]
    fn page_size_follows_limits() {
        let limits = ToolLimits {
            max_page_size: 10,
            max_semantic_results: 5,
        };
        let raw = json!({"job_name": "a", "artifact_type_id": 1, "limit": 11});
        assert!(ToolInput::parse(ToolKind::ArtifactData, &raw, &limits).is_err());

        let raw = json!({"query": "gps", "n_results": 6});
        let failure = ToolInput::parse(ToolKind::SemanticSearch, &raw, &limits).unwrap_err();
        assert_eq!(failure.details, vec!["n_results: must be <= 5".to_string()]);
    }

    #[test]
    fn grep_search_validation() {
        let input = parse(
            ToolKind::GrepSearch,
            json!({"pattern": "dock", "job_name": "pixel-7", "case_sensitive": true}),
        )
        .unwrap();
        match input {
            ToolInput::GrepSearch(grep) => {
                assert!(grep.case_sensitive);
                assert_eq!(grep.limit, 50);
                assert_eq!(grep.artifact_type_ids, None);
            }
            other => panic!("unexpected input: {other:?}"),
        }

        let failure = parse(
            ToolKind::GrepSearch,
            json!({"pattern": "  ", "job_name": 7, "artifact_type_id": []}),
        )
        .unwrap_err();
        assert_eq!(failure.details.len(), 3);
    }

    #[test]
    fn blank_grep_pattern_rejected_before_the_store() {
        let failure = parse(
            ToolKind::GrepSearch,
            json!({"pattern": " \t ", "job_name": "pixel-7"}),
        )
        .unwrap_err();
        assert_eq!(failure.details, vec!["pattern: must not be empty".to_string()]);
    }

    #[test]
    fn semantic_search_optional_job() {
        let input = parse(ToolKind::SemanticSearch, json!({"query": "meeting location"})).unwrap();
        assert_eq!(
            input,
            ToolInput::SemanticSearch(SemanticSearchInput {
                query: "meeting location".into(),
                job_name: None,
                n_results: 10,
            })
        );
    }

    #[test]
    fn non_object_input_rejected() {
        let failure = parse(ToolKind::ArtifactList, json!([1, 2])).unwrap_err();
        assert_eq!(failure.details, vec!["input: expected an object, got array".to_string()]);
    }
}
