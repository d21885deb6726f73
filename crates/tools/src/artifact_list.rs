//! `viewArtifactList`: artifact tables of one report.

use caseclaw_core::dataset::ForensicStore;
use caseclaw_core::tool::ToolFailure;
use serde_json::{Map, Value, json};

use crate::input::ArtifactListInput;
use crate::report_list::require_report;

pub async fn run(
    store: &dyn ForensicStore,
    input: ArtifactListInput,
) -> Result<Map<String, Value>, ToolFailure> {
    require_report(store, &input.job_name).await?;
    let artifacts = store.list_artifacts(&input.job_name).await?;

    let mut payload = Map::new();
    payload.insert("job_name".into(), json!(input.job_name));
    payload.insert("count".into(), json!(artifacts.len()));
    payload.insert(
        "artifacts".into(),
        serde_json::to_value(&artifacts).map_err(|e| ToolFailure::execution(e.to_string()))?,
    );
    Ok(payload)
}
