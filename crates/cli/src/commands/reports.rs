//! `caseclaw reports` — List ingested reports.

use caseclaw_core::dataset::ForensicStore;

use crate::runtime::Runtime;

pub async fn run() -> anyhow::Result<()> {
    let config = Runtime::load_config()?;
    let store = Runtime::open_store(&config).await?;
    let reports = store.list_reports().await?;

    if reports.is_empty() {
        println!("No reports ingested in {}", config.store.database_path);
        return Ok(());
    }

    println!("{:<32} {:<12} {}", "JOB NAME", "STATUS", "UPLOADED");
    for report in &reports {
        println!(
            "{:<32} {:<12} {}",
            report.job_name,
            report.status,
            report.upload_date.as_deref().unwrap_or("-")
        );
        if let Some(error) = &report.error_message {
            println!("    error: {error}");
        }
    }
    println!("\n{} report(s)", reports.len());
    Ok(())
}
