//! `grepSearch`: literal substring search over row contents.

use caseclaw_core::dataset::{ForensicStore, PatternQuery};
use caseclaw_core::tool::ToolFailure;
use serde_json::{Map, Value, json};

use crate::artifact_data::require_artifacts;
use crate::input::GrepSearchInput;
use crate::report_list::require_report;

pub async fn run(
    store: &dyn ForensicStore,
    input: GrepSearchInput,
) -> Result<Map<String, Value>, ToolFailure> {
    require_report(store, &input.job_name).await?;

    let pattern = input.pattern.trim();

    let ids = input
        .artifact_type_ids
        .as_ref()
        .map(|ids| ids.to_vec())
        .unwrap_or_default();
    if !ids.is_empty() {
        require_artifacts(store, &input.job_name, &ids).await?;
    }

    let matches = store
        .search_rows(&PatternQuery {
            job_name: input.job_name.clone(),
            pattern: pattern.to_string(),
            artifact_type_ids: ids,
            limit: input.limit,
            case_sensitive: input.case_sensitive,
        })
        .await?;

    let mut payload = Map::new();
    payload.insert("job_name".into(), json!(input.job_name));
    payload.insert("pattern".into(), json!(pattern));
    payload.insert(
        "artifact_type_id".into(),
        input
            .artifact_type_ids
            .as_ref()
            .map(|ids| ids.to_json())
            .unwrap_or(Value::Null),
    );
    payload.insert("count".into(), json!(matches.len()));
    payload.insert(
        "matches".into(),
        serde_json::to_value(&matches).map_err(|e| ToolFailure::execution(e.to_string()))?,
    );
    Ok(payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::seeded_store;
    use crate::input::ArtifactIds;
    use caseclaw_core::tool::ToolErrorType;

    fn grep(pattern: &str, job_name: &str) -> GrepSearchInput {
        GrepSearchInput {
            pattern: pattern.into(),
            job_name: job_name.into(),
            artifact_type_ids: None,
            limit: 50,
            case_sensitive: false,
        }
    }

    #[tokio::test]
    async fn finds_across_tables() {
        let (store, _) = seeded_store().await;
        let payload = run(&store, grep(" +15551234 ", "pixel-7")).await.unwrap();
        assert_eq!(payload["count"], json!(2));
        assert_eq!(payload["pattern"], json!("+15551234"));
        assert_eq!(payload["artifact_type_id"], Value::Null);
    }

    #[tokio::test]
    async fn restricts_to_artifact() {
        let (store, ids) = seeded_store().await;
        let mut input = grep("+15551234", "pixel-7");
        input.artifact_type_ids = Some(ArtifactIds::One(ids.calls));
        let payload = run(&store, input).await.unwrap();
        assert_eq!(payload["count"], json!(1));
        assert_eq!(payload["matches"][0]["file_name"], json!("call_logs.tsv"));
    }

    #[tokio::test]
    async fn case_sensitivity() {
        let (store, _) = seeded_store().await;
        let payload = run(&store, grep("dock 4", "pixel-7")).await.unwrap();
        assert_eq!(payload["count"], json!(1));

        let mut input = grep("dock 4", "pixel-7");
        input.case_sensitive = true;
        let payload = run(&store, input).await.unwrap();
        assert_eq!(payload["count"], json!(0));
    }

    #[tokio::test]
    async fn unknown_report_is_not_searched() {
        let (store, _) = seeded_store().await;
        let failure = run(&store, grep("dock", "nope")).await.unwrap_err();
        assert_eq!(failure.error_type, ToolErrorType::ReportNotFound);
    }
}
