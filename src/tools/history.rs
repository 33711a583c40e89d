//! Earlier returns filed by the identified customer

use super::{Tool, ToolContext, ToolOutput};
use crate::engine::EngineError;
use async_trait::async_trait;
use serde_json::{json, Value};

pub struct ReturnHistoryTool;

#[async_trait]
impl Tool for ReturnHistoryTool {
    fn name(&self) -> &'static str {
        "get_return_history"
    }

    fn description(&self) -> String {
        "List the returns this customer filed before, newest first, with their status and refund.".to_string()
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {}
        })
    }

    async fn run(&self, _input: Value, ctx: ToolContext) -> Result<ToolOutput, EngineError> {
        let text = ctx.bridge().return_history(&ctx.thread_id).await?;
        Ok(ToolOutput::success(text))
    }
}
