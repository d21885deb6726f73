//! `caseclaw chat` — Interactive session with history.

use std::io::Write;

use caseclaw_agent::ChatRequest;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::render;
use crate::runtime::Runtime;

pub async fn run(dataset: Option<String>) -> anyhow::Result<()> {
    let runtime = Runtime::build().await?;
    let agent = runtime.agent();
    let session_id = uuid::Uuid::new_v4().to_string();

    println!();
    println!("  CaseClaw — Interactive Mode");
    println!();
    println!("  Provider:  {}", runtime.config.provider);
    println!("  Model:     {}", runtime.config.model);
    println!("  Report:    {}", dataset.as_deref().unwrap_or("(ask the agent)"));
    let tools: Vec<&str> = agent.dispatcher().valid_names();
    println!("  Tools:     {}", tools.join(", "));
    println!("  Session:   {session_id}");
    println!();
    println!("  Type your question and press Enter.");
    println!("  Type 'exit' or Ctrl+C to quit.");
    println!();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("  You > ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let prompt = line.trim();
        if prompt.is_empty() {
            continue;
        }
        if matches!(prompt, "exit" | "quit") {
            break;
        }

        let mut request = ChatRequest::new(prompt).with_session(&session_id);
        request.dataset_id = dataset.clone();

        println!();
        let mut rx = agent.run_stream(request);
        render::print_stream(&mut rx, false).await?;
        println!();
    }

    println!();
    println!("  Goodbye!");
    Ok(())
}
