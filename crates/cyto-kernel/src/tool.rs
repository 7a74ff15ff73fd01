//! Tool trait and registration

use async_trait::async_trait;
use cyto_core::{FunctionSpec, Result};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Trait for executable tools.
///
/// Tools return a structured JSON payload on success. Failures are
/// ordinary [`cyto_core::Error`] values; the kernel converts them into
/// `{error, detail}` function messages rather than aborting the turn.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Tool name (used in tool calls)
    fn name(&self) -> &str;

    /// Tool description for the LLM
    fn description(&self) -> &str;

    /// JSON Schema for parameters
    fn parameters_schema(&self) -> serde_json::Value;

    /// Execute the tool with the given arguments
    async fn execute(
        &self,
        arguments: serde_json::Value,
        cancel: CancellationToken,
    ) -> Result<serde_json::Value>;
}

/// Type alias for a shared tool
pub type BoxedTool = Arc<dyn Tool>;

/// Convert a Tool into the schema entry exposed to the model
pub fn to_function_spec(tool: &dyn Tool) -> FunctionSpec {
    FunctionSpec::new(tool.name(), tool.description(), tool.parameters_schema())
}
