//! Transport abstraction over the LLM

use async_trait::async_trait;
use cyto_core::{FunctionSpec, Message, Result};
use std::pin::Pin;
use tokio_stream::Stream;
use tokio_util::sync::CancellationToken;

/// Per-call generation options forwarded to the transport
#[derive(Debug, Clone, Default)]
pub struct GenerateConfig {
    /// Response language hint
    pub lang: String,
    /// Optional sampling seed
    pub seed: Option<u64>,
}

/// A stream of cumulative assistant outputs within one LLM call.
///
/// Each yielded value is the whole output so far; the final item is the
/// complete output for the call.
pub type AssistantStream = Pin<Box<dyn Stream<Item = Vec<Message>> + Send>>;

/// A tool invocation detected on an assistant message
#[derive(Debug, Clone)]
pub struct ToolCall {
    pub name: String,
    /// Arguments as emitted by the model, JSON-encoded
    pub arguments: String,
    /// Pairing id copied onto the function reply
    pub function_id: Option<String>,
}

/// The external LLM collaborator.
///
/// The kernel never speaks to a provider directly; it hands the current
/// working context and the registered function schemas to a transport
/// and consumes a stream of cumulative snapshots. Transport failures
/// propagate to the kernel's caller.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn call_llm(
        &self,
        messages: Vec<Message>,
        functions: Vec<FunctionSpec>,
        config: &GenerateConfig,
        cancel: CancellationToken,
    ) -> Result<AssistantStream>;

    /// Detect a tool invocation on an assistant output. The default reads
    /// the structured `function_call` field; transports that parse tool
    /// calls out of raw model text can override.
    fn detect_tool(&self, message: &Message) -> Option<ToolCall> {
        message.function_call.as_ref().map(|call| ToolCall {
            name: call.name.clone(),
            arguments: call.arguments.clone(),
            function_id: message.extra.function_id.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cyto_core::Message;

    struct NullTransport;

    #[async_trait]
    impl Transport for NullTransport {
        async fn call_llm(
            &self,
            _messages: Vec<Message>,
            _functions: Vec<FunctionSpec>,
            _config: &GenerateConfig,
            _cancel: CancellationToken,
        ) -> Result<AssistantStream> {
            Ok(Box::pin(tokio_stream::empty()))
        }
    }

    #[test]
    fn test_detect_tool_reads_function_call() {
        let transport = NullTransport;
        let msg = Message::assistant_call("describe_file", r#"{"path": "/x.json"}"#, "call_1");
        let call = transport.detect_tool(&msg).expect("detected");
        assert_eq!(call.name, "describe_file");
        assert_eq!(call.arguments, r#"{"path": "/x.json"}"#);
        assert_eq!(call.function_id.as_deref(), Some("call_1"));
    }

    #[test]
    fn test_detect_tool_ignores_plain_text() {
        let transport = NullTransport;
        assert!(transport.detect_tool(&Message::assistant("hello")).is_none());
    }
}
