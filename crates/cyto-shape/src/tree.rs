//! Source-tree handler for `.py` and the JS/TS family
//!
//! Outlines list top-level functions and classes; selection and
//! replacement address whole blocks. Python blocks span the declaration
//! line through the last indented line; curly-brace languages span the
//! declaration through its matched closing brace.

use cyto_core::{Error, Result};
use regex::Regex;
use serde_json::{Map, Value, json};
use std::path::Path;
use std::sync::LazyLock;

use crate::handler::{ShapeHandler, ShapeKind};
use crate::page::{PageInfo, paginate_text, read_text, write_text};
use crate::selector::{BlockKind, Selector};

static PY_FN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^(?:async\s+)?def\s+([A-Za-z_][A-Za-z0-9_]*)\s*\(").unwrap());
static PY_CLASS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^class\s+([A-Za-z_][A-Za-z0-9_]*)\b").unwrap());
static JS_FN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\s*function\s+([A-Za-z_][A-Za-z0-9_$]*)\s*\(").unwrap()
});
static JS_CLASS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*class\s+([A-Za-z_][A-Za-z0-9_$]*)\b").unwrap());
static JS_ARROW: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\s*(?:const|let|var)\s+([A-Za-z_][A-Za-z0-9_$]*)\s*=\s*(?:async\s*)?\([^)]*\)\s*=>")
        .unwrap()
});

const PY_EXTENSIONS: &[&str] = &[".py"];

pub struct SourceHandler;

impl SourceHandler {
    fn is_python(path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| PY_EXTENSIONS.contains(&format!(".{}", e.to_ascii_lowercase()).as_str()))
            .unwrap_or(false)
    }

    fn block_selector(selector: &Selector) -> Result<(BlockKind, &str)> {
        match selector {
            Selector::Block { kind, name } => Ok((*kind, name.as_str())),
            Selector::Path(_) => Err(Error::InvalidSelector(
                "Tree selector must be \"function:<name>\" or \"class:<name>\"".to_string(),
            )),
        }
    }

    /// Locate a Python block as a line range `[start, end)`.
    ///
    /// The block runs from the declaration line through the last
    /// following line that is blank or indented, with trailing blank
    /// lines excluded.
    fn find_py_block(source: &str, kind: BlockKind, name: &str) -> Option<(usize, usize)> {
        let pattern = match kind {
            BlockKind::Function => format!(
                r"^(?:async\s+)?def\s+{}\s*\(",
                regex::escape(name)
            ),
            BlockKind::Class => format!(r"^class\s+{}\b", regex::escape(name)),
        };
        let decl = Regex::new(&pattern).ok()?;
        let lines: Vec<&str> = source.lines().collect();
        let start = lines.iter().position(|line| decl.is_match(line))?;
        let mut end = start + 1;
        let mut last_body = start;
        while end < lines.len() {
            let line = lines[end];
            if line.trim().is_empty() {
                end += 1;
                continue;
            }
            if line.starts_with(' ') || line.starts_with('\t') {
                last_body = end;
                end += 1;
                continue;
            }
            break;
        }
        Some((start, last_body + 1))
    }

    /// Locate a JS/TS block as a byte range `[start, end)`, matching
    /// braces from the declaration. Declarations without a brace span to
    /// the end of their line.
    fn find_js_block(source: &str, kind: BlockKind, name: &str) -> Option<(usize, usize)> {
        let pattern = match kind {
            BlockKind::Function => format!(r"(?m)^\s*function\s+{}\s*\(", regex::escape(name)),
            BlockKind::Class => format!(r"(?m)^\s*class\s+{}\b", regex::escape(name)),
        };
        let decl = Regex::new(&pattern).ok()?;
        let m = decl.find(source)?;
        let start = m.start();
        match source[m.end()..].find('{') {
            Some(offset) => {
                let brace_start = m.end() + offset;
                Some((start, match_brace(source, brace_start)))
            }
            None => match source[m.end()..].find('\n') {
                Some(offset) => Some((start, m.end() + offset + 1)),
                None => Some((start, source.len())),
            },
        }
    }

    fn paged_response(text: String, info: PageInfo) -> Value {
        let mut obj = Map::new();
        obj.insert("value".into(), text.into());
        info.extend(&mut obj);
        if info.truncated {
            obj.insert(
                "note".into(),
                format!(
                    "Text truncated. Call extract_section with page={} to continue.",
                    info.next_page.unwrap_or(info.page + 1)
                )
                .into(),
            );
        }
        Value::Object(obj)
    }
}

/// Scan forward from an opening brace to its matching close.
/// Unbalanced input spans to the end of the source.
fn match_brace(source: &str, brace_start: usize) -> usize {
    let mut depth = 0usize;
    for (offset, ch) in source[brace_start..].char_indices() {
        match ch {
            '{' => depth += 1,
            '}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return brace_start + offset + ch.len_utf8();
                }
            }
            _ => {}
        }
    }
    source.len()
}

impl ShapeHandler for SourceHandler {
    fn kind(&self) -> ShapeKind {
        ShapeKind::Tree
    }

    fn extensions(&self) -> &'static [&'static str] {
        &[".py", ".js", ".ts", ".jsx", ".tsx"]
    }

    fn outline(&self, path: &Path, _page: usize, _page_size: usize) -> Result<Value> {
        let source = read_text(path)?;
        let (functions, classes) = if Self::is_python(path) {
            let functions: Vec<String> = PY_FN
                .captures_iter(&source)
                .map(|c| c[1].to_string())
                .collect();
            let classes: Vec<String> = PY_CLASS
                .captures_iter(&source)
                .map(|c| c[1].to_string())
                .collect();
            (functions, classes)
        } else {
            let mut functions: Vec<String> = JS_FN
                .captures_iter(&source)
                .chain(JS_ARROW.captures_iter(&source))
                .map(|c| c[1].to_string())
                .collect();
            functions.sort_unstable();
            functions.dedup();
            let mut classes: Vec<String> = JS_CLASS
                .captures_iter(&source)
                .map(|c| c[1].to_string())
                .collect();
            classes.sort_unstable();
            classes.dedup();
            (functions, classes)
        };
        Ok(json!({
            "summary": "tree",
            "functions": functions,
            "classes": classes,
        }))
    }

    fn select(
        &self,
        path: &Path,
        selector: &Selector,
        page: usize,
        page_size: usize,
    ) -> Result<Value> {
        let (kind, name) = Self::block_selector(selector)?;
        let source = read_text(path)?;
        let segment = if Self::is_python(path) {
            let (start, end) = Self::find_py_block(&source, kind, name)
                .ok_or_else(|| Error::KeyNotFound(format!("{selector} not found")))?;
            source
                .lines()
                .skip(start)
                .take(end - start)
                .collect::<Vec<_>>()
                .join("\n")
        } else {
            let (start, end) = Self::find_js_block(&source, kind, name)
                .ok_or_else(|| Error::KeyNotFound(format!("{selector} not found")))?;
            source[start..end].to_string()
        };
        let (text, info) = paginate_text(&segment, page, page_size);
        Ok(Self::paged_response(text, info))
    }

    fn replace(&self, path: &Path, selector: &Selector, value: &Value) -> Result<Value> {
        let (kind, name) = Self::block_selector(selector)?;
        let replacement = value.as_str().ok_or_else(|| {
            Error::InvalidSelector("Tree replacement value must be source code".to_string())
        })?;
        let source = read_text(path)?;
        let replacement = if replacement.ends_with('\n') {
            replacement.to_string()
        } else {
            format!("{replacement}\n")
        };

        if Self::is_python(path) {
            let (start, end) = Self::find_py_block(&source, kind, name)
                .ok_or_else(|| Error::KeyNotFound(format!("{selector} not found")))?;
            let lines: Vec<&str> = source.split_inclusive('\n').collect();
            let mut rebuilt = String::new();
            rebuilt.extend(lines.iter().take(start).copied());
            rebuilt.push_str(&replacement);
            rebuilt.extend(lines.iter().skip(end).copied());
            write_text(path, &rebuilt)?;
        } else {
            let (start, end) = Self::find_js_block(&source, kind, name)
                .ok_or_else(|| Error::KeyNotFound(format!("{selector} not found")))?;
            let rebuilt = format!("{}{}{}", &source[..start], replacement, &source[end..]);
            write_text(path, &rebuilt)?;
        }
        Ok(json!({"changed": true, "kind": self.kind().as_str()}))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn temp_source(suffix: &str, content: &str) -> NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    const PY_SOURCE: &str = "\
import os

def alpha(x):
    return x + 1

def beta():
    if True:
        return 2

class Gamma:
    def method(self):
        return 3

CONSTANT = 4
";

    #[test]
    fn test_py_outline_top_level_only() {
        let file = temp_source(".py", PY_SOURCE);
        let outline = SourceHandler.outline(file.path(), 1, 50).unwrap();
        assert_eq!(outline["summary"], "tree");
        assert_eq!(outline["functions"], json!(["alpha", "beta"]));
        assert_eq!(outline["classes"], json!(["Gamma"]));
    }

    #[test]
    fn test_py_select_function_block() {
        let file = temp_source(".py", PY_SOURCE);
        let sel = Selector::parse_str("function:beta").unwrap();
        let result = SourceHandler.select(file.path(), &sel, 1, 50).unwrap();
        let value = result["value"].as_str().unwrap();
        assert!(value.starts_with("def beta():"));
        assert!(value.contains("return 2"));
        assert!(!value.contains("class Gamma"));
    }

    #[test]
    fn test_py_select_class_block() {
        let file = temp_source(".py", PY_SOURCE);
        let sel = Selector::parse_str("class:Gamma").unwrap();
        let result = SourceHandler.select(file.path(), &sel, 1, 50).unwrap();
        let value = result["value"].as_str().unwrap();
        assert!(value.starts_with("class Gamma:"));
        assert!(value.contains("return 3"));
        assert!(!value.contains("CONSTANT"));
    }

    #[test]
    fn test_py_replace_round_trip() {
        let file = temp_source(".py", PY_SOURCE);
        let sel = Selector::parse_str("function:alpha").unwrap();
        let new_code = "def alpha(x):\n    return x * 10\n";
        let result = SourceHandler
            .replace(file.path(), &sel, &json!(new_code))
            .unwrap();
        assert_eq!(result["changed"], true);

        let selected = SourceHandler.select(file.path(), &sel, 1, 50).unwrap();
        assert_eq!(selected["value"].as_str().unwrap(), new_code.trim_end());

        // Everything else survives
        let rewritten = std::fs::read_to_string(file.path()).unwrap();
        assert!(rewritten.contains("def beta():"));
        assert!(rewritten.contains("class Gamma:"));
        assert!(rewritten.contains("CONSTANT = 4"));
    }

    const JS_SOURCE: &str = "\
const helper = (x) => x + 1;

function outer(a, b) {
    if (a) {
        return { b };
    }
    return null;
}

class Widget {
    render() {
        return '<div>';
    }
}
";

    #[test]
    fn test_js_outline_sorted_unique() {
        let file = temp_source(".ts", JS_SOURCE);
        let outline = SourceHandler.outline(file.path(), 1, 50).unwrap();
        assert_eq!(outline["functions"], json!(["helper", "outer"]));
        assert_eq!(outline["classes"], json!(["Widget"]));
    }

    #[test]
    fn test_js_select_matches_nested_braces() {
        let file = temp_source(".js", JS_SOURCE);
        let sel = Selector::parse_str("function:outer").unwrap();
        let result = SourceHandler.select(file.path(), &sel, 1, 50).unwrap();
        let value = result["value"].as_str().unwrap();
        assert!(value.starts_with("function outer(a, b) {"));
        assert!(value.trim_end().ends_with('}'));
        assert!(value.contains("return { b };"));
        assert!(!value.contains("class Widget"));
    }

    #[test]
    fn test_js_replace_round_trip() {
        let file = temp_source(".js", JS_SOURCE);
        let sel = Selector::parse_str("class:Widget").unwrap();
        let new_code = "class Widget {\n    render() {\n        return '<span>';\n    }\n}";
        SourceHandler
            .replace(file.path(), &sel, &json!(new_code))
            .unwrap();
        let rewritten = std::fs::read_to_string(file.path()).unwrap();
        assert!(rewritten.contains("'<span>'"));
        assert!(!rewritten.contains("'<div>'"));
        assert!(rewritten.contains("function outer(a, b) {"));
    }

    #[test]
    fn test_select_missing_block_is_key_not_found() {
        let file = temp_source(".py", PY_SOURCE);
        let sel = Selector::parse_str("function:missing").unwrap();
        let err = SourceHandler.select(file.path(), &sel, 1, 50).unwrap_err();
        assert_eq!(err.kind(), "key_not_found");
        assert!(err.to_string().contains("function:missing"));
    }

    #[test]
    fn test_path_selector_rejected() {
        let file = temp_source(".py", PY_SOURCE);
        let sel = Selector::parse_str("a.b").unwrap();
        let err = SourceHandler.select(file.path(), &sel, 1, 50).unwrap_err();
        assert_eq!(err.kind(), "invalid_selector");
    }

    #[test]
    fn test_replace_requires_source_text() {
        let file = temp_source(".py", PY_SOURCE);
        let sel = Selector::parse_str("function:alpha").unwrap();
        let err = SourceHandler
            .replace(file.path(), &sel, &json!(42))
            .unwrap_err();
        assert_eq!(err.kind(), "invalid_selector");
    }

    #[test]
    fn test_long_block_paginates() {
        let body: String = (0..80).map(|i| format!("    x{i} = {i}\n")).collect();
        let source = format!("def big():\n{body}");
        let file = temp_source(".py", &source);
        let sel = Selector::parse_str("function:big").unwrap();
        let result = SourceHandler.select(file.path(), &sel, 1, 50).unwrap();
        assert_eq!(result["truncated"], true);
        assert_eq!(result["next_page"], 2);
        assert!(result["note"].as_str().unwrap().contains("page=2"));
    }
}
