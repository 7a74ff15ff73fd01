//! Kernel event types

use cyto_core::Message;
use serde::{Deserialize, Serialize};

use crate::state::Stage;

/// Events emitted while the kernel loop runs.
///
/// `ResponseUpdate` carries the cumulative response so far; each emitted
/// snapshot is a monotonic prefix-extension of the previous one.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum KernelEvent {
    /// A run started
    RunStart,

    /// A new LLM call started
    CallStart { call_index: u64 },

    /// Cumulative response snapshot (streaming or after tool dispatch)
    ResponseUpdate { messages: Vec<Message> },

    /// Tool dispatch started
    ToolExecutionStart {
        tool_name: String,
        arguments: serde_json::Value,
    },

    /// Tool dispatch completed
    ToolExecutionEnd {
        tool_name: String,
        result: serde_json::Value,
        is_error: bool,
    },

    /// The reintegration stage changed
    StageChanged { stage: Stage },

    /// Expired ephemera were pruned at the start of a call
    ContextPruned { expired_entries: usize },

    /// The run finished
    RunEnd { calls_used: u32 },
}

impl KernelEvent {
    /// Check if this is a terminal event
    pub fn is_terminal(&self) -> bool {
        matches!(self, KernelEvent::RunEnd { .. })
    }
}
