//! `viewArtifactData`: paginated rows from one or more artifact tables.

use caseclaw_core::dataset::{ForensicStore, RowQuery};
use caseclaw_core::tool::ToolFailure;
use serde_json::{Map, Value, json};

use crate::input::ArtifactDataInput;
use crate::report_list::require_report;

pub async fn run(
    store: &dyn ForensicStore,
    input: ArtifactDataInput,
) -> Result<Map<String, Value>, ToolFailure> {
    require_report(store, &input.job_name).await?;

    let requested = input.artifact_type_ids.to_vec();
    require_artifacts(store, &input.job_name, &requested).await?;

    let rows = store
        .artifact_rows(&RowQuery {
            job_name: input.job_name.clone(),
            artifact_type_ids: requested,
            limit: input.limit,
            offset: input.offset,
        })
        .await?;

    // A full page means there may be more behind it
    let has_more = rows.len() == input.limit as usize;

    let mut payload = Map::new();
    payload.insert("job_name".into(), json!(input.job_name));
    payload.insert("artifact_type_id".into(), input.artifact_type_ids.to_json());
    payload.insert("count".into(), json!(rows.len()));
    payload.insert("limit".into(), json!(input.limit));
    payload.insert("offset".into(), json!(input.offset));
    payload.insert("has_more".into(), json!(has_more));
    payload.insert(
        "data".into(),
        serde_json::to_value(&rows).map_err(|e| ToolFailure::execution(e.to_string()))?,
    );
    Ok(payload)
}

/// Every requested id must name an artifact table of the report.
pub(crate) async fn require_artifacts(
    store: &dyn ForensicStore,
    job_name: &str,
    requested: &[i64],
) -> Result<(), ToolFailure> {
    let available: Vec<i64> = store
        .list_artifacts(job_name)
        .await?
        .into_iter()
        .map(|a| a.id)
        .collect();
    let missing: Vec<i64> = requested
        .iter()
        .copied()
        .filter(|id| !available.contains(id))
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(ToolFailure::artifact_not_found(job_name, &missing, available))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::seeded_store;
    use crate::input::ArtifactIds;
    use caseclaw_core::tool::ToolErrorType;

    fn input(ids: ArtifactIds, limit: u32, offset: u32) -> ArtifactDataInput {
        ArtifactDataInput {
            job_name: "pixel-7".into(),
            artifact_type_ids: ids,
            limit,
            offset,
        }
    }

    #[tokio::test]
    async fn pages_through_rows() {
        let (store, ids) = seeded_store().await;

        let first = run(&store, input(ArtifactIds::One(ids.sms), 2, 0)).await.unwrap();
        assert_eq!(first["count"], json!(2));
        assert_eq!(first["has_more"], json!(true));
        assert_eq!(first["data"][0]["row_index"], json!(0));

        let second = run(&store, input(ArtifactIds::One(ids.sms), 2, 2)).await.unwrap();
        assert_eq!(second["count"], json!(1));
        assert_eq!(second["has_more"], json!(false));
        assert_eq!(second["data"][0]["parse_error"], json!(true));
    }

    #[tokio::test]
    async fn echoes_id_list_shape() {
        let (store, ids) = seeded_store().await;
        let payload = run(&store, input(ArtifactIds::Many(vec![ids.sms, ids.calls]), 100, 0))
            .await
            .unwrap();
        assert_eq!(payload["count"], json!(4));
        assert_eq!(payload["artifact_type_id"], json!([ids.sms, ids.calls]));
    }

    #[tokio::test]
    async fn unknown_artifact_lists_available_ids() {
        let (store, ids) = seeded_store().await;
        let failure = run(&store, input(ArtifactIds::Many(vec![ids.sms, 999]), 10, 0))
            .await
            .unwrap_err();
        assert_eq!(failure.error_type, ToolErrorType::ArtifactNotFound);
        assert!(failure.message.contains("999"));
        let available = failure.hints["available_artifact_type_ids"].as_array().unwrap();
        assert_eq!(available.len(), 2);
    }

    #[tokio::test]
    async fn artifact_from_other_report_is_rejected() {
        let (store, ids) = seeded_store().await;
        let failure = run(&store, input(ArtifactIds::One(ids.galaxy_sms), 10, 0))
            .await
            .unwrap_err();
        assert_eq!(failure.error_type, ToolErrorType::ArtifactNotFound);
    }
}
