//! Create the return once every selection is in

use super::{Tool, ToolContext, ToolOutput};
use crate::engine::EngineError;
use async_trait::async_trait;
use serde_json::{json, Value};

pub struct FinalizeTool;

#[async_trait]
impl Tool for FinalizeTool {
    fn name(&self) -> &'static str {
        "finalize"
    }

    fn description(&self) -> String {
        "Create the return from the recorded selections. Only succeeds once items, reason, resolution and shipping are all recorded; otherwise reports what is still missing.".to_string()
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {}
        })
    }

    async fn run(&self, _input: Value, ctx: ToolContext) -> Result<ToolOutput, EngineError> {
        let text = ctx
            .bridge()
            .finalize_return(&ctx.thread_id, ctx.cancel.clone())
            .await?;
        Ok(ToolOutput::success(text))
    }
}
