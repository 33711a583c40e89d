//! Policy previews over the selected items: eligibility and refund quote

use super::{parse_input, Tool, ToolContext, ToolOutput};
use crate::engine::EngineError;
use crate::flow::{ReasonCode, ResolutionCode, SelectionCode};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

pub struct CheckEligibilityTool;

#[async_trait]
impl Tool for CheckEligibilityTool {
    fn name(&self) -> &'static str {
        "check_eligibility"
    }

    fn description(&self) -> String {
        "Check whether the selected items can be returned under the return policy (order status, category, and the return window for the customer's tier). Changes nothing.".to_string()
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {}
        })
    }

    async fn run(&self, _input: Value, ctx: ToolContext) -> Result<ToolOutput, EngineError> {
        let text = ctx.bridge().check_eligibility(&ctx.thread_id).await?;
        Ok(ToolOutput::success(text))
    }
}

pub struct QuoteRefundTool;

#[derive(Debug, Default, Deserialize)]
struct QuoteRefundInput {
    #[serde(default)]
    reason: Option<String>,
    #[serde(default)]
    resolution: Option<String>,
}

/// Parse an optional code, or the `Invalid input` reply for an unknown one
fn optional_code<C: SelectionCode>(input: Option<&str>) -> Result<Option<C>, ToolOutput> {
    match input {
        None => Ok(None),
        Some(raw) => C::parse(raw).map(Some).ok_or_else(|| {
            ToolOutput::error(format!(
                "Invalid input: unknown code '{raw}'. Valid codes: {}",
                C::valid_codes()
            ))
        }),
    }
}

#[async_trait]
impl Tool for QuoteRefundTool {
    fn name(&self) -> &'static str {
        "quote_refund"
    }

    fn description(&self) -> String {
        "Estimate the refund for the selected items, including any restocking fee and store credit bonus. Uses the recorded reason and resolution unless others are given, so the customer can compare options before choosing. Changes nothing.".to_string()
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "reason": {
                    "type": "string",
                    "description": format!("One of {}", ReasonCode::valid_codes())
                },
                "resolution": {
                    "type": "string",
                    "description": format!("One of {}", ResolutionCode::valid_codes())
                }
            }
        })
    }

    async fn run(&self, input: Value, ctx: ToolContext) -> Result<ToolOutput, EngineError> {
        let input: QuoteRefundInput = if input.is_null() {
            QuoteRefundInput::default()
        } else {
            match parse_input(input) {
                Ok(input) => input,
                Err(output) => return Ok(output),
            }
        };
        let reason = match optional_code::<ReasonCode>(input.reason.as_deref()) {
            Ok(reason) => reason,
            Err(output) => return Ok(output),
        };
        let resolution = match optional_code::<ResolutionCode>(input.resolution.as_deref()) {
            Ok(resolution) => resolution,
            Err(output) => return Ok(output),
        };
        let text = ctx
            .bridge()
            .quote_refund(&ctx.thread_id, reason, resolution)
            .await?;
        Ok(ToolOutput::success(text))
    }
}
