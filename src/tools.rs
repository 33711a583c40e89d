//! Agent tools
//!
//! JSON face of the tool-call bridge. Tools are stateless singletons; the
//! conversation, the bridge and the cancellation signal arrive per call in
//! a `ToolContext`.

mod eligibility;
mod finalize;
mod history;
mod retention;
mod selection;
mod session_context;

pub use eligibility::{CheckEligibilityTool, QuoteRefundTool};
pub use finalize::FinalizeTool;
pub use history::ReturnHistoryTool;
pub use retention::RespondToRetentionTool;
pub use selection::{ChangeSelectionTool, SetItemsTool, SetSelectionTool};
pub use session_context::SessionContextTool;

use crate::engine::{EngineError, ToolBridge};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Result from tool execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolOutput {
    pub success: bool,
    pub output: String,
}

impl ToolOutput {
    pub fn success(output: impl Into<String>) -> Self {
        Self {
            success: true,
            output: output.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            output: message.into(),
        }
    }
}

/// Tool description handed to the agent runtime
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

/// All context needed for a tool invocation.
///
/// Created fresh for each call.
#[derive(Clone)]
pub struct ToolContext {
    /// Cancellation signal, honored by `finalize`
    pub cancel: CancellationToken,

    /// The conversation this tool is executing within
    pub thread_id: String,

    bridge: Arc<dyn ToolBridge>,
}

impl ToolContext {
    pub fn new(cancel: CancellationToken, thread_id: String, bridge: Arc<dyn ToolBridge>) -> Self {
        Self {
            cancel,
            thread_id,
            bridge,
        }
    }

    pub fn bridge(&self) -> &dyn ToolBridge {
        self.bridge.as_ref()
    }
}

/// Trait for tools that can be executed by the agent
#[async_trait]
pub trait Tool: Send + Sync {
    /// Tool name
    fn name(&self) -> &str;

    /// Tool description for the agent
    fn description(&self) -> String;

    /// JSON schema for tool input
    fn input_schema(&self) -> Value;

    /// Execute the tool. Flow rejections come back as successful output
    /// explaining what happened; only backend failures and cancellation
    /// are errors.
    async fn run(&self, input: Value, ctx: ToolContext) -> Result<ToolOutput, EngineError>;
}

/// Deserialize tool input, or the `Invalid input` reply to send instead
fn parse_input<T: DeserializeOwned>(input: Value) -> Result<T, ToolOutput> {
    serde_json::from_value(input).map_err(|e| ToolOutput::error(format!("Invalid input: {e}")))
}

/// Collection of tools available to the agent
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
}

impl ToolRegistry {
    /// The returns workflow tool set
    pub fn standard() -> Self {
        Self {
            tools: vec![
                Arc::new(SetItemsTool),
                Arc::new(SetSelectionTool),
                Arc::new(RespondToRetentionTool),
                Arc::new(FinalizeTool),
                Arc::new(SessionContextTool),
                Arc::new(ChangeSelectionTool),
                Arc::new(CheckEligibilityTool),
                Arc::new(QuoteRefundTool),
                Arc::new(ReturnHistoryTool),
            ],
        }
    }

    /// Get all tool definitions for the agent
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools
            .iter()
            .map(|t| ToolDefinition {
                name: t.name().to_string(),
                description: t.description(),
                input_schema: t.input_schema(),
            })
            .collect()
    }

    /// Execute a tool by name with context
    pub async fn execute(
        &self,
        name: &str,
        input: Value,
        ctx: ToolContext,
    ) -> Result<ToolOutput, EngineError> {
        let Some(tool) = self.tools.iter().find(|tool| tool.name() == name) else {
            tracing::warn!(thread_id = %ctx.thread_id, tool = %name, "Unknown tool requested");
            return Ok(ToolOutput::error(format!("Unknown tool: {name}")));
        };
        tool.run(input, ctx).await
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::standard()
    }
}
