//! `viewReportList`: every ingested report.

use caseclaw_core::dataset::ForensicStore;
use caseclaw_core::tool::ToolFailure;
use serde_json::{Map, Value, json};

pub async fn run(store: &dyn ForensicStore) -> Result<Map<String, Value>, ToolFailure> {
    let reports = store.list_reports().await?;

    let mut payload = Map::new();
    payload.insert("count".into(), json!(reports.len()));
    payload.insert(
        "reports".into(),
        serde_json::to_value(&reports).map_err(|e| ToolFailure::execution(e.to_string()))?,
    );
    Ok(payload)
}

/// Fail with `report_not_found` (listing the reports that do exist) unless
/// `job_name` is present.
pub(crate) async fn require_report(
    store: &dyn ForensicStore,
    job_name: &str,
) -> Result<(), ToolFailure> {
    if store.report_exists(job_name).await? {
        return Ok(());
    }
    let available = store
        .list_reports()
        .await?
        .into_iter()
        .map(|r| r.job_name)
        .collect();
    Err(ToolFailure::report_not_found(job_name, available))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::seeded_store;
    use caseclaw_core::tool::ToolErrorType;

    #[tokio::test]
    async fn lists_reports_with_count() {
        let (store, _) = seeded_store().await;
        let payload = run(&store).await.unwrap();
        assert_eq!(payload["count"], json!(2));
        let names: Vec<&str> = payload["reports"]
            .as_array()
            .unwrap()
            .iter()
            .map(|r| r["job_name"].as_str().unwrap())
            .collect();
        assert!(names.contains(&"pixel-7"));
        assert!(names.contains(&"galaxy-s21"));
    }

    #[tokio::test]
    async fn missing_report_lists_alternatives() {
        let (store, _) = seeded_store().await;
        require_report(&store, "pixel-7").await.unwrap();

        let failure = require_report(&store, "iphone-x").await.unwrap_err();
        assert_eq!(failure.error_type, ToolErrorType::ReportNotFound);
        let available = failure.hints["available_reports"].as_array().unwrap();
        assert_eq!(available.len(), 2);
    }
}
