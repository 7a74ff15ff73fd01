//! Blob summary for files no handler recognizes

use cyto_core::Result;
use serde_json::{Value, json};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::Path;

/// Summarize an opaque file: byte size and content digest.
///
/// Used as the `describe_file` fallback for extensions outside the
/// registry; blobs support no other operation.
pub fn blob_outline(path: &Path) -> Result<Value> {
    let bytes = fs::read(path)?;
    let digest = Sha256::digest(&bytes);
    Ok(json!({
        "summary": "blob",
        "size": bytes.len(),
        "sha256": format!("{digest:x}"),
    }))
}
