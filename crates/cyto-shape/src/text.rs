//! Free-text handler for `.txt`/`.log`, with a heading outline for
//! Markdown

use cyto_core::{Error, Result};
use serde_json::{Map, Value};
use std::path::Path;

use crate::handler::{ShapeHandler, ShapeKind};
use crate::page::{PageInfo, paginate_slice, paginate_text, read_text};
use crate::selector::Selector;

fn is_markdown(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some(ext) if ext.eq_ignore_ascii_case("md") || ext.eq_ignore_ascii_case("markdown")
    )
}

fn with_note(mut obj: Map<String, Value>, info: PageInfo, what: &str, tool: &str) -> Value {
    info.extend(&mut obj);
    if info.truncated {
        obj.insert(
            "note".into(),
            format!(
                "{what} truncated. Call {tool} with page={} to continue.",
                info.next_page.unwrap_or(info.page + 1)
            )
            .into(),
        );
    }
    Value::Object(obj)
}

pub struct TextHandler;

impl ShapeHandler for TextHandler {
    fn kind(&self) -> ShapeKind {
        ShapeKind::Text
    }

    fn extensions(&self) -> &'static [&'static str] {
        &[".txt", ".log", ".md", ".markdown"]
    }

    fn outline(&self, path: &Path, page: usize, page_size: usize) -> Result<Value> {
        let text = read_text(path)?;
        if is_markdown(path) {
            let headings: Vec<String> = text
                .lines()
                .filter(|line| line.trim_start().starts_with('#'))
                .map(|line| line.trim().to_string())
                .collect();
            let (page_headings, info) = paginate_slice(&headings, page, page_size);
            let mut obj = Map::new();
            obj.insert("summary".into(), "markdown".into());
            obj.insert("headings".into(), page_headings.into());
            return Ok(with_note(obj, info, "Headings", "describe_file"));
        }
        let (preview, info) = paginate_text(&text, page, page_size);
        let mut obj = Map::new();
        obj.insert("summary".into(), "text".into());
        obj.insert("preview".into(), preview.into());
        Ok(with_note(obj, info, "Text", "describe_file"))
    }

    fn select(
        &self,
        path: &Path,
        _selector: &Selector,
        page: usize,
        page_size: usize,
    ) -> Result<Value> {
        let text = read_text(path)?;
        let (page_text, info) = paginate_text(&text, page, page_size);
        let mut obj = Map::new();
        obj.insert("value".into(), page_text.into());
        Ok(with_note(obj, info, "Text", "extract_section"))
    }

    fn replace(&self, _path: &Path, _selector: &Selector, _value: &Value) -> Result<Value> {
        Err(Error::UnsupportedOperation(
            "replace not supported for text".to_string(),
        ))
    }
}
