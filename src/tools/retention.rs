//! Retention offer response

use super::{parse_input, Tool, ToolContext, ToolOutput};
use crate::engine::EngineError;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

pub struct RespondToRetentionTool;

#[derive(Debug, Deserialize)]
struct RespondInput {
    accepted: bool,
}

#[async_trait]
impl Tool for RespondToRetentionTool {
    fn name(&self) -> &'static str {
        "respond_to_retention"
    }

    fn description(&self) -> String {
        "Record whether the customer accepts the retention offer that was presented. Accepting ends the request without creating a return; declining continues to the resolution step.".to_string()
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "required": ["accepted"],
            "properties": {
                "accepted": {
                    "type": "boolean",
                    "description": "true if the customer keeps the item with the offer"
                }
            }
        })
    }

    async fn run(&self, input: Value, ctx: ToolContext) -> Result<ToolOutput, EngineError> {
        let input: RespondInput = match parse_input(input) {
            Ok(input) => input,
            Err(output) => return Ok(output),
        };
        let text = ctx
            .bridge()
            .respond_to_retention(&ctx.thread_id, input.accepted)
            .await?;
        Ok(ToolOutput::success(text))
    }
}
