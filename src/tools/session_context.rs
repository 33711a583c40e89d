//! Read-only view of the session for the agent

use super::{Tool, ToolContext, ToolOutput};
use crate::engine::EngineError;
use async_trait::async_trait;
use serde_json::{json, Value};

pub struct SessionContextTool;

#[async_trait]
impl Tool for SessionContextTool {
    fn name(&self) -> &'static str {
        "get_session_context"
    }

    fn description(&self) -> String {
        "Show everything recorded for this return so far, including answers the customer gave by clicking options, and the current step.".to_string()
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {}
        })
    }

    async fn run(&self, _input: Value, ctx: ToolContext) -> Result<ToolOutput, EngineError> {
        let text = ctx.bridge().session_context(&ctx.thread_id).await?;
        Ok(ToolOutput::success(text))
    }
}
