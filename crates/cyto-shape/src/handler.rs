//! Handler trait and the static extension registry

use cyto_core::{Error, Result};
use serde_json::Value;
use std::path::Path;
use std::sync::LazyLock;

use crate::selector::Selector;

/// Structural family of a file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShapeKind {
    Tree,
    Map,
    Table,
    Text,
    Blob,
}

impl ShapeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ShapeKind::Tree => "tree",
            ShapeKind::Map => "map",
            ShapeKind::Table => "table",
            ShapeKind::Text => "text",
            ShapeKind::Blob => "blob",
        }
    }
}

/// A format-specific inspector exposing `outline`, `select`, and
/// `replace` with pagination.
pub trait ShapeHandler: Send + Sync {
    /// The structural family this handler produces
    fn kind(&self) -> ShapeKind;

    /// Extensions (with leading dot, lowercase) this handler accepts
    fn extensions(&self) -> &'static [&'static str];

    /// Structural summary of the file
    fn outline(&self, path: &Path, page: usize, page_size: usize) -> Result<Value>;

    /// Extract the section addressed by `selector`
    fn select(&self, path: &Path, selector: &Selector, page: usize, page_size: usize)
    -> Result<Value>;

    /// Replace the section addressed by `selector` in place
    fn replace(&self, path: &Path, selector: &Selector, value: &Value) -> Result<Value>;
}

static HANDLERS: LazyLock<Vec<Box<dyn ShapeHandler>>> = LazyLock::new(|| {
    vec![
        Box::new(crate::tree::SourceHandler),
        Box::new(crate::map::MapHandler),
        Box::new(crate::table::TableHandler),
        Box::new(crate::text::TextHandler),
    ]
});

/// Lowercased extension of `path`, with leading dot
fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{}", e.to_ascii_lowercase()))
}

/// Find the handler registered for this path's extension
pub fn handler_for(path: &Path) -> Option<&'static dyn ShapeHandler> {
    let ext = extension_of(path)?;
    HANDLERS
        .iter()
        .find(|h| h.extensions().contains(&ext.as_str()))
        .map(|h| h.as_ref())
}

/// All registered extensions, sorted
pub fn supported_extensions() -> Vec<&'static str> {
    let mut exts: Vec<&'static str> = HANDLERS.iter().flat_map(|h| h.extensions()).copied().collect();
    exts.sort_unstable();
    exts
}

/// The error returned when no handler accepts a path's extension
pub fn unsupported_type_error(path: &Path) -> Error {
    let ext = extension_of(path).unwrap_or_else(|| "<no extension>".to_string());
    Error::UnsupportedFileType(format!(
        "Unsupported file type \"{}\" for path \"{}\". Supported extensions: {}.",
        ext,
        path.display(),
        supported_extensions().join(", ")
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dispatch_by_extension() {
        assert_eq!(
            handler_for(Path::new("/x.json")).map(|h| h.kind()),
            Some(ShapeKind::Map)
        );
        assert_eq!(
            handler_for(Path::new("/x.PY")).map(|h| h.kind()),
            Some(ShapeKind::Tree)
        );
        assert_eq!(
            handler_for(Path::new("/x.tsv")).map(|h| h.kind()),
            Some(ShapeKind::Table)
        );
        assert_eq!(
            handler_for(Path::new("/x.log")).map(|h| h.kind()),
            Some(ShapeKind::Text)
        );
        assert!(handler_for(Path::new("/x.exe")).is_none());
        assert!(handler_for(Path::new("/noext")).is_none());
    }

    #[test]
    fn test_supported_extensions_complete() {
        let exts = supported_extensions();
        for expected in [
            ".py", ".js", ".ts", ".jsx", ".tsx", ".json", ".yaml", ".yml", ".toml", ".ini",
            ".cfg", ".csv", ".tsv", ".txt", ".log", ".md", ".markdown",
        ] {
            assert!(exts.contains(&expected), "missing {expected}");
        }
    }

    #[test]
    fn test_unsupported_type_error_lists_extensions() {
        let err = unsupported_type_error(Path::new("/a/b.xyz"));
        assert_eq!(err.kind(), "unsupported_file_type");
        let text = err.to_string();
        assert!(text.contains("\".xyz\""));
        assert!(text.contains(".json"));
        assert!(text.contains(".csv"));
    }
}
