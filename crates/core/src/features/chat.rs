//! General assistant chat with declared (but never executed) tools.

use studio_llm::provider::ToolDefinition;
use tokio_util::sync::CancellationToken;

use crate::error::StudioError;
use crate::gateway::CallOptions;
use crate::interpret::Interpreted;
use crate::prompt::personas;
use crate::studio::Studio;
use crate::types::MemoryKind;

/// Tools the model may ask for. Requests come back as
/// [`crate::types::FunctionCall`]s for the caller to act on.
pub fn studio_tools() -> Vec<ToolDefinition> {
    vec![
        ToolDefinition {
            name: "create_project".into(),
            description: "Create a new story or video project.".into(),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "title": { "type": "string" },
                    "logline": { "type": "string" },
                    "format": { "type": "string", "description": "short, long, series, ad" }
                },
                "required": ["title"]
            }),
        },
        ToolDefinition {
            name: "schedule_task".into(),
            description: "Add a publishing task to the calendar.".into(),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "date": { "type": "string", "description": "YYYY-MM-DD" },
                    "channelName": { "type": "string" },
                    "action": { "type": "string" }
                },
                "required": ["date", "action"]
            }),
        },
        ToolDefinition {
            name: "create_character".into(),
            description: "Create a recurring character for the studio's stories.".into(),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "name": { "type": "string" },
                    "description": { "type": "string" }
                },
                "required": ["name"]
            }),
        },
    ]
}

pub async fn chat(
    studio: &Studio,
    message: &str,
    cancel: &CancellationToken,
) -> Result<Interpreted<()>, StudioError> {
    let reply = studio
        .ask_text(
            &personas::chat(),
            &[MemoryKind::ExecutionLearning, MemoryKind::MarketDna],
            message,
            CallOptions::with_tools(studio_tools()),
            cancel,
        )
        .await?;

    if !reply.function_calls.is_empty() {
        let names: Vec<&str> = reply.function_calls.iter().map(|c| c.name.as_str()).collect();
        tracing::info!(calls = ?names, "model requested tool calls; left to the caller");
    }
    Ok(reply)
}
