//! Selection tools: items, codes, and going back to change an answer

use super::{parse_input, Tool, ToolContext, ToolOutput};
use crate::engine::EngineError;
use crate::flow::{
    ItemRef, ReasonCode, ResolutionCode, SelectionCode, SelectionKind, ShippingCode,
};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

// ============================================================================
// set_items
// ============================================================================

pub struct SetItemsTool;

#[derive(Debug, Deserialize)]
struct SetItemsInput {
    items: Vec<ItemRef>,
}

#[async_trait]
impl Tool for SetItemsTool {
    fn name(&self) -> &'static str {
        "set_items"
    }

    fn description(&self) -> String {
        "Record which of the displayed order items the customer wants to return. Only items already shown to the customer can be selected. Call this once the customer has named the items.".to_string()
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "required": ["items"],
            "properties": {
                "items": {
                    "type": "array",
                    "minItems": 1,
                    "items": {
                        "type": "object",
                        "required": ["order_id", "product_id"],
                        "properties": {
                            "order_id": { "type": "string" },
                            "product_id": { "type": "string" }
                        }
                    }
                }
            }
        })
    }

    async fn run(&self, input: Value, ctx: ToolContext) -> Result<ToolOutput, EngineError> {
        let input: SetItemsInput = match parse_input(input) {
            Ok(input) => input,
            Err(output) => return Ok(output),
        };
        let text = ctx.bridge().set_items(&ctx.thread_id, input.items).await?;
        Ok(ToolOutput::success(text))
    }
}

// ============================================================================
// set_selection
// ============================================================================

pub struct SetSelectionTool;

#[derive(Debug, Deserialize)]
struct SetSelectionInput {
    kind: String,
    code: String,
}

fn code_list<C: SelectionCode>() -> Vec<&'static str> {
    C::ALL.iter().map(|code| code.as_str()).collect()
}

#[async_trait]
impl Tool for SetSelectionTool {
    fn name(&self) -> &'static str {
        "set_selection"
    }

    fn description(&self) -> String {
        format!(
            "Record the customer's answer for one step of the return. kind=\"reason\" takes one of {}; kind=\"resolution\" takes one of {}; kind=\"shipping\" takes one of {}. Answers must be given in order: reason, then resolution, then shipping.",
            ReasonCode::valid_codes(),
            ResolutionCode::valid_codes(),
            ShippingCode::valid_codes()
        )
    }

    fn input_schema(&self) -> Value {
        let mut codes = code_list::<ReasonCode>();
        codes.extend(code_list::<ResolutionCode>());
        codes.extend(code_list::<ShippingCode>());
        json!({
            "type": "object",
            "required": ["kind", "code"],
            "properties": {
                "kind": {
                    "type": "string",
                    "enum": ["reason", "resolution", "shipping"]
                },
                "code": {
                    "type": "string",
                    "description": "Code for the chosen option",
                    "examples": codes
                }
            }
        })
    }

    async fn run(&self, input: Value, ctx: ToolContext) -> Result<ToolOutput, EngineError> {
        let input: SetSelectionInput = match parse_input(input) {
            Ok(input) => input,
            Err(output) => return Ok(output),
        };
        let Some(kind) = SelectionKind::parse(&input.kind) else {
            return Ok(ToolOutput::error(format!(
                "Invalid input: unknown kind '{}'",
                input.kind
            )));
        };
        let text = ctx
            .bridge()
            .set_selection(&ctx.thread_id, kind, &input.code)
            .await?;
        Ok(ToolOutput::success(text))
    }
}

// ============================================================================
// change_selection
// ============================================================================

pub struct ChangeSelectionTool;

#[derive(Debug, Deserialize)]
struct ChangeSelectionInput {
    kind: String,
}

#[async_trait]
impl Tool for ChangeSelectionTool {
    fn name(&self) -> &'static str {
        "change_selection"
    }

    fn description(&self) -> String {
        "Go back and change an earlier answer. Clears the named selection and everything after it, so the customer answers those steps again.".to_string()
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "required": ["kind"],
            "properties": {
                "kind": {
                    "type": "string",
                    "enum": ["items", "reason", "resolution", "shipping"]
                }
            }
        })
    }

    async fn run(&self, input: Value, ctx: ToolContext) -> Result<ToolOutput, EngineError> {
        let input: ChangeSelectionInput = match parse_input(input) {
            Ok(input) => input,
            Err(output) => return Ok(output),
        };
        let Some(kind) = SelectionKind::parse(&input.kind) else {
            return Ok(ToolOutput::error(format!(
                "Invalid input: unknown kind '{}'",
                input.kind
            )));
        };
        let text = ctx.bridge().change_selection(&ctx.thread_id, kind).await?;
        Ok(ToolOutput::success(text))
    }
}
