//! `caseclaw index` — Embed a report's rows for semantic search.

use anyhow::{Context, bail};
use caseclaw_core::dataset::ForensicStore;

use crate::runtime::Runtime;

pub async fn run(job_name: &str) -> anyhow::Result<()> {
    let runtime = Runtime::build().await?;
    let Some(index) = &runtime.index else {
        bail!("No embedding model configured; set tools.embedding_model in config.toml");
    };
    if !runtime.store.report_exists(job_name).await? {
        bail!("Report '{job_name}' not found; run `caseclaw reports` to list them");
    }

    let indexed = index
        .index_report(job_name)
        .await
        .with_context(|| format!("Failed to index {job_name}"))?;
    println!("Indexed {indexed} row(s) from {job_name}");
    Ok(())
}
