//! API request and response types

use crate::db::StoredReturn;
use crate::flow::{CustomerTier, ItemDescriptor};
use crate::tools::ToolDefinition;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A widget click forwarded by the chat transport
#[derive(Debug, Deserialize)]
pub struct ActionRequest {
    #[serde(rename = "type")]
    pub action_type: String,
    #[serde(default)]
    pub payload: Value,
}

/// Identity resolved by the customer lookup
#[derive(Debug, Deserialize)]
pub struct CustomerRequest {
    pub customer_id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub tier: Option<CustomerTier>,
}

/// Items the transport rendered for the customer
#[derive(Debug, Deserialize)]
pub struct DisplayedItemsRequest {
    pub items: Vec<ItemDescriptor>,
}

/// Result of an agent tool call
#[derive(Debug, Serialize)]
pub struct ToolCallResponse {
    pub success: bool,
    pub result: String,
}

/// Response for the tool catalog
#[derive(Debug, Serialize)]
pub struct ToolsResponse {
    pub tools: Vec<ToolDefinition>,
}

/// Session state rendered for the agent
#[derive(Debug, Serialize)]
pub struct ContextResponse {
    pub summary: String,
    pub preamble: Option<String>,
}

/// Returns created in a conversation
#[derive(Debug, Serialize)]
pub struct ReturnsResponse {
    pub returns: Vec<StoredReturn>,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
        }
    }
}
