//! `semanticSearch`: nearest-neighbour lookup through the vector index.

use caseclaw_core::dataset::{ForensicStore, VectorIndex};
use caseclaw_core::error::StoreError;
use caseclaw_core::tool::ToolFailure;
use serde_json::{Map, Value, json};

use crate::input::SemanticSearchInput;
use crate::report_list::require_report;

pub async fn run(
    store: &dyn ForensicStore,
    index: &dyn VectorIndex,
    input: SemanticSearchInput,
) -> Result<Map<String, Value>, ToolFailure> {
    if let Some(job_name) = &input.job_name {
        require_report(store, job_name).await?;
    }

    let hits = index
        .query(&input.query, input.job_name.as_deref(), input.n_results as usize)
        .await
        .map_err(|e| match e {
            StoreError::EmbeddingFailed(msg) => {
                ToolFailure::execution(format!("Embedding failed: {msg}"))
            }
            other => ToolFailure::from(other),
        })?;

    let mut payload = Map::new();
    payload.insert("query".into(), json!(input.query));
    payload.insert("job_name".into(), json!(input.job_name));
    payload.insert("count".into(), json!(hits.len()));
    payload.insert(
        "results".into(),
        serde_json::to_value(&hits).map_err(|e| ToolFailure::execution(e.to_string()))?,
    );
    Ok(payload)
}
