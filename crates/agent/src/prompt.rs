//! Prompt text: the system prompt and the fixed messages the loop injects.

use caseclaw_core::tool::ToolFailure;
use caseclaw_tools::ToolKind;
use serde::Serialize;
use serde_json::Value;

/// Appended as a system message on every iteration past `reinforce_after`.
pub const REINFORCEMENT: &str = "REMEMBER: JSON format only - {'thought': '...', 'action': {...}} or {'thought': '...', 'finish': '...'}";

/// Answer used when the ceiling is hit.
pub const TRUNCATION_NOTICE: &str =
    "I've reached the maximum number of steps. Please try a more specific question.";

/// Answer used when the backend sent nothing at all.
pub const EMPTY_RESPONSE_APOLOGY: &str =
    "I'm sorry, I didn't receive a response from the model. Please try again.";

const BASE_RULES: &[&str] = &[
    "Always answer in English.",
    "If the request can be answered without tools, reply with the finish shape immediately.",
    "If the request is unclear, ask for clarification in the finish field.",
    "Only call a tool when it is required to answer.",
    "Never put text, keys or formatting outside the JSON object.",
    "Keep the final answer concise and make sure it fully answers the question.",
    "viewArtifactData returns at most 200 rows per call; page through larger tables with offset.",
    "Format the final answer in markdown: tables for multi-column data, bullet points for lists, short paragraphs.",
    "Every statement in the final answer must be backed by evidence from the tools; do not include assumptions.",
    "Be objective and precise. No filler.",
    "If you do not know the job_name, call viewReportList first. If exactly one report exists, use it; if several exist, ask which one.",
];

/// Build the system prompt for the given tools and operator rules.
pub fn system_prompt(tools: &[ToolKind], rules: &[String]) -> String {
    let mut prompt = String::from(
        "You are a forensic analyst agent. You investigate LEAPP reports using the tools below \
         and give the operator accurate, evidence-based answers.\n\n",
    );

    prompt.push_str("RESPONSE FORMAT:\n");
    prompt.push_str("Every reply is exactly one JSON object in one of two shapes:\n");
    prompt.push_str(
        "- Tool call: {\"thought\": \"...\", \"action\": {\"name\": \"...\", \"input\": {...}}}\n",
    );
    prompt.push_str("- Final answer: {\"thought\": \"...\", \"finish\": \"...\"}\n");
    prompt.push_str(
        "\"finish\" is never an action name. It only appears as a field of the final answer.\n\n",
    );

    prompt.push_str("TOOLS:\n");
    for (i, tool) in tools.iter().enumerate() {
        prompt.push_str(&format!(
            "{}. {}: {} Input: {}\n",
            i + 1,
            tool.name(),
            tool.description(),
            tool.signature()
        ));
    }

    prompt.push_str("\nRULES:\n");
    for rule in BASE_RULES
        .iter()
        .copied()
        .chain(rules.iter().map(String::as_str))
        .filter(|rule| !rule.trim().is_empty())
    {
        prompt.push_str("- ");
        prompt.push_str(rule.trim());
        prompt.push('\n');
    }
    prompt
}

/// Final answer after hitting the ceiling, keeping any partial answer text.
pub fn truncated_answer(partial: &str) -> String {
    if partial.is_empty() {
        TRUNCATION_NOTICE.to_string()
    } else {
        format!("{partial}\n\n{TRUNCATION_NOTICE}")
    }
}

/// User message carrying a tool result back to the model.
pub fn tool_result_message<T: Serialize + ?Sized>(result: &T) -> String {
    let json = serde_json::to_string(result).unwrap_or_else(|_| "null".to_string());
    format!("Tool result: {json}")
}

/// Corrective system message for an action naming a tool that does not exist.
pub fn unknown_tool_message(name: &str, valid: &[&str]) -> String {
    format!(
        "Tool '{name}' does not exist. Valid tools are: {}. Reply again using one of them, \
         or give your final answer with the finish field.",
        valid.join(", ")
    )
}

/// Corrective system message for an action without a usable tool name.
pub fn malformed_action_message(valid: &[&str]) -> String {
    format!(
        "Your action could not be read. It must be {{\"name\": \"<tool>\", \"input\": {{...}}}} \
         with one of: {}.",
        valid.join(", ")
    )
}

/// Targeted guidance for failures the model can fix by changing its input.
pub fn remediation_message(tool: &str, failure: &ToolFailure) -> String {
    use caseclaw_core::tool::ToolErrorType;

    let listed = |key: &str| -> String {
        match failure.hints.get(key) {
            Some(Value::Array(items)) if !items.is_empty() => items
                .iter()
                .map(|v| match v {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .collect::<Vec<_>>()
                .join(", "),
            _ => "none".to_string(),
        }
    };

    match failure.error_type {
        ToolErrorType::ReportNotFound => format!(
            "Tool result: {tool} failed: {}. Available reports: {}. \
             Use one of these job_name values, or call viewReportList.",
            failure.message,
            listed("available_reports")
        ),
        ToolErrorType::ArtifactNotFound => format!(
            "Tool result: {tool} failed: {}. Valid artifact_type_id values for this report: {}. \
             Call viewArtifactList to see what each id holds.",
            failure.message,
            listed("available_artifact_type_ids")
        ),
        ToolErrorType::ValidationError => format!(
            "Tool result: {tool} rejected its input: {}. Fix these fields and call it again.",
            failure.details.join("; ")
        ),
        _ => tool_result_message(&serde_json::json!({
            "success": false,
            "error_type": failure.error_type,
            "error": failure.message,
        })),
    }
}
