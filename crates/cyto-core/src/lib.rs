//! cyto-core: message model and shared error types
//!
//! This crate defines the conversational data model used by the kernel
//! loop and its tools: typed messages with stable identities, content
//! that may be plain text, multimodal items, or structured payloads,
//! and the wire-level error kinds tools report back to the model.

pub mod error;
pub mod types;

pub use error::{Error, Result};
pub use types::{
    Content, ContentItem, Extra, FunctionCall, FunctionSpec, Message, MessageId, Role,
};
