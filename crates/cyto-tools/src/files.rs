//! Shape-aware file tools

use async_trait::async_trait;
use cyto_core::{Error, Result};
use cyto_kernel::tool::Tool;
use cyto_shape::{
    DEFAULT_PAGE_SIZE, Selector, blob_outline, handler_for, unsupported_type_error,
};
use serde_json::{Value, json};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

fn require_path(arguments: &Value) -> Result<PathBuf> {
    arguments
        .get("path")
        .and_then(Value::as_str)
        .map(PathBuf::from)
        .ok_or_else(|| Error::MissingArgument("Missing 'path' argument".to_string()))
}

fn require_selector(arguments: &Value) -> Result<Selector> {
    let raw = arguments
        .get("selector")
        .ok_or_else(|| Error::MissingArgument("Missing 'selector' argument".to_string()))?;
    Selector::parse(raw)
}

fn page_params(arguments: &Value) -> (usize, usize) {
    let page = arguments
        .get("page")
        .and_then(Value::as_u64)
        .map(|p| p as usize)
        .unwrap_or(1);
    let page_size = arguments
        .get("page_size")
        .and_then(Value::as_u64)
        .map(|p| p as usize)
        .unwrap_or(DEFAULT_PAGE_SIZE);
    (page, page_size)
}

const SELECTOR_DOC: &str = "Tree: \"function:<name>\" or \"class:<name>\". \
Map: [\"a\", 0, \"b\"] or \"a[0].b\". Table: [row, col].";

/// Structural summary of a file (a lightweight, shape-aware `cat`)
pub struct DescribeFileTool;

#[async_trait]
impl Tool for DescribeFileTool {
    fn name(&self) -> &str {
        "describe_file"
    }

    fn description(&self) -> &str {
        "Describe a file structure (like a lightweight, shape-aware cat). Accepts absolute local paths."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Path to the file."
                },
                "page": {
                    "type": "integer",
                    "description": "Optional page number (1-based) for long outlines."
                },
                "page_size": {
                    "type": "integer",
                    "description": "Optional page size for long outlines."
                },
            },
            "required": ["path"],
        })
    }

    async fn execute(&self, arguments: Value, _cancel: CancellationToken) -> Result<Value> {
        let path = require_path(&arguments)?;
        let (page, page_size) = page_params(&arguments);
        match handler_for(&path) {
            Some(handler) => {
                let outline = handler.outline(&path, page, page_size)?;
                Ok(json!({"kind": handler.kind().as_str(), "outline": outline}))
            }
            None if path.is_file() => {
                // No handler knows this extension; at least identify the
                // artifact.
                let outline = blob_outline(&path)?;
                Ok(json!({"kind": "blob", "outline": outline}))
            }
            None => Err(unsupported_type_error(&path)),
        }
    }
}

/// Extract one addressed section of a file
pub struct ExtractSectionTool;

#[async_trait]
impl Tool for ExtractSectionTool {
    fn name(&self) -> &str {
        "extract_section"
    }

    fn description(&self) -> &str {
        "Extract a specific section of a file using a shape-aware selector. Accepts absolute local paths."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Path to the file."
                },
                "selector": {
                    "description": SELECTOR_DOC
                },
                "page": {
                    "type": "integer",
                    "description": "Optional page number (1-based) for large values."
                },
                "page_size": {
                    "type": "integer",
                    "description": "Optional page size for large values."
                },
            },
            "required": ["path", "selector"],
        })
    }

    async fn execute(&self, arguments: Value, _cancel: CancellationToken) -> Result<Value> {
        let path = require_path(&arguments)?;
        let selector = require_selector(&arguments)?;
        let (page, page_size) = page_params(&arguments);
        let handler = handler_for(&path).ok_or_else(|| unsupported_type_error(&path))?;
        let mut result = handler.select(&path, &selector, page, page_size)?;
        if let Some(obj) = result.as_object_mut() {
            obj.insert("kind".into(), handler.kind().as_str().into());
        }
        Ok(result)
    }
}

/// Replace one addressed section of a file in place
pub struct ReplaceSectionTool;

#[async_trait]
impl Tool for ReplaceSectionTool {
    fn name(&self) -> &str {
        "replace_section"
    }

    fn description(&self) -> &str {
        "Replace a specific section of a file using a shape-aware selector. Accepts absolute local paths."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Path to the file."
                },
                "selector": {
                    "description": SELECTOR_DOC
                },
                "value": {
                    "description": "Replacement value or source code (for tree)."
                },
            },
            "required": ["path", "selector", "value"],
        })
    }

    async fn execute(&self, arguments: Value, _cancel: CancellationToken) -> Result<Value> {
        let path = require_path(&arguments)?;
        let selector = require_selector(&arguments)?;
        let value = arguments
            .get("value")
            .ok_or_else(|| Error::MissingArgument("Missing 'value' argument".to_string()))?;
        let handler = handler_for(&path).ok_or_else(|| unsupported_type_error(&path))?;
        handler.replace(&path, &selector, value)
    }
}

/// Registry entry point: the three file tools in registration order
pub fn file_tools() -> Vec<cyto_kernel::BoxedTool> {
    vec![
        std::sync::Arc::new(DescribeFileTool),
        std::sync::Arc::new(ExtractSectionTool),
        std::sync::Arc::new(ReplaceSectionTool),
    ]
}
