//! Error types shared across the kernel and its tools

use thiserror::Error;

/// Result type alias using the shared Error
pub type Result<T> = std::result::Result<T, Error>;

/// The sentence returned to the model whenever a reintegration step is
/// attempted out of order.
pub const STAGE_VIOLATION_MESSAGE: &str =
    "Reintegration requires outline → select → summarize → load.";

/// Errors surfaced by tools and the kernel.
///
/// Tool failures are caught at dispatch and delivered back to the model
/// as function messages shaped `{error, detail}` (see [`Error::wire`]);
/// they never abort the turn. Transport errors propagate to the caller.
#[derive(Error, Debug)]
pub enum Error {
    /// A selector string or path does not fit the target shape
    #[error("{0}")]
    InvalidSelector(String),

    /// File extension has no registered handler
    #[error("{0}")]
    UnsupportedFileType(String),

    /// Operation is not supported by the handler kind
    #[error("{0}")]
    UnsupportedOperation(String),

    /// Selector resolved to nothing
    #[error("{0}")]
    KeyNotFound(String),

    /// Required tool argument absent or malformed
    #[error("{0}")]
    MissingArgument(String),

    /// A pipeline step was invoked out of stage order
    #[error("{STAGE_VIOLATION_MESSAGE} {detail}")]
    StageViolation { detail: String },

    /// Erase targeted a role that is not erasable
    #[error("{0}")]
    RoleNotErasable(String),

    /// Content exceeds the configured import cap
    #[error("{0}")]
    CapExceeded(String),

    /// File contents could not be parsed in the handler's format
    #[error("{0}")]
    Parse(String),

    /// Error propagated from the LLM transport
    #[error("transport error: {0}")]
    Transport(String),

    /// Filesystem I/O failure
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// JSON encode/decode failure
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Wire-level kind identifier for this error
    pub fn kind(&self) -> &'static str {
        match self {
            Error::InvalidSelector(_) => "invalid_selector",
            Error::UnsupportedFileType(_) => "unsupported_file_type",
            Error::UnsupportedOperation(_) => "unsupported_operation",
            Error::KeyNotFound(_) => "key_not_found",
            Error::MissingArgument(_) => "missing_argument",
            Error::StageViolation { .. } => "stage_violation",
            Error::RoleNotErasable(_) => "role_not_erasable",
            Error::CapExceeded(_) => "cap_exceeded",
            Error::Parse(_) => "parse_error",
            Error::Transport(_) => "transport_error",
            Error::Io(_) => "io_error",
            Error::Json(_) => "parse_error",
        }
    }

    /// The `{error, detail}` payload delivered to the model on the
    /// function-message channel.
    ///
    /// Stage violations carry the pipeline sentence in `error`; every
    /// other kind carries its identifier there and the display string in
    /// `detail`.
    pub fn wire(&self) -> serde_json::Value {
        match self {
            Error::StageViolation { detail } => serde_json::json!({
                "error": STAGE_VIOLATION_MESSAGE,
                "detail": detail,
            }),
            other => serde_json::json!({
                "error": other.kind(),
                "detail": other.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_violation_wire_shape() {
        let err = Error::StageViolation {
            detail: "Select step \"extract_section\" called before outline.".to_string(),
        };
        let wire = err.wire();
        assert_eq!(wire["error"], STAGE_VIOLATION_MESSAGE);
        assert_eq!(
            wire["detail"],
            "Select step \"extract_section\" called before outline."
        );
    }

    #[test]
    fn test_kind_identifiers() {
        assert_eq!(Error::InvalidSelector("x".into()).kind(), "invalid_selector");
        assert_eq!(Error::KeyNotFound("x".into()).kind(), "key_not_found");
        assert_eq!(
            Error::UnsupportedFileType("x".into()).kind(),
            "unsupported_file_type"
        );
    }

    #[test]
    fn test_generic_wire_shape() {
        let err = Error::KeyNotFound("no section found at [\"a\"]".to_string());
        let wire = err.wire();
        assert_eq!(wire["error"], "key_not_found");
        assert_eq!(wire["detail"], "no section found at [\"a\"]");
    }
}
