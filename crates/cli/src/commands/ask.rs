//! `caseclaw ask` — One question, streamed answer.

use caseclaw_agent::ChatRequest;

use crate::render;
use crate::runtime::Runtime;

pub async fn run(
    prompt: String,
    session: Option<String>,
    dataset: Option<String>,
    raw: bool,
) -> anyhow::Result<()> {
    let runtime = Runtime::build().await?;
    let agent = runtime.agent();

    let mut request = ChatRequest::new(prompt);
    request.session_id = session;
    request.dataset_id = dataset;

    let mut rx = agent.run_stream(request);
    render::print_stream(&mut rx, raw).await?;
    Ok(())
}
