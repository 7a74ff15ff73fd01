//! cyto-kernel: the context-metabolism kernel
//!
//! A turn scheduler that drives LLM calls and tool dispatch under a
//! metabolic discipline: every intermediate artifact (tool output,
//! assistant reasoning) is born ephemeral and decays unless promoted,
//! and reintegration of external state must flow through the pipeline
//! `outline → select → summarize → load`.

pub mod builtins;
pub mod events;
pub mod kernel;
pub mod state;
pub mod tool;
pub mod transport;

pub use events::KernelEvent;
pub use kernel::{Kernel, MAX_LLM_CALL_PER_RUN, RunOptions, SYSTEM_PROMPT};
pub use state::{EphemeralEntry, EphemeralKind, KernelConfig, KernelState, Stage, TurnRecord};
pub use tool::{BoxedTool, Tool, to_function_spec};
pub use transport::{AssistantStream, GenerateConfig, ToolCall, Transport};
