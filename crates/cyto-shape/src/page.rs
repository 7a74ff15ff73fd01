//! Pagination shared by all shape handlers
//!
//! Pages are 1-based. Every paginated response carries `page`,
//! `page_size`, `total`, `truncated`, and `next_page`; when truncated, a
//! human-readable `note` tells the model how to continue.

use cyto_core::Result;
use serde::Serialize;
use serde_json::Value;
use std::fs;
use std::path::Path;

/// Default page size when the caller does not pass one
pub const DEFAULT_PAGE_SIZE: usize = 50;

/// Dict/list selections at most this many serialized JSON characters
/// (and at most one page of entries) are returned whole
pub const WHOLE_VALUE_MAX_CHARS: usize = 4000;

/// Position of one page within a larger sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PageInfo {
    pub page: usize,
    pub page_size: usize,
    pub total: usize,
    pub truncated: bool,
    pub next_page: Option<usize>,
}

impl PageInfo {
    /// Insert the pagination fields into a JSON object
    pub fn extend(&self, obj: &mut serde_json::Map<String, Value>) {
        obj.insert("page".into(), self.page.into());
        obj.insert("page_size".into(), self.page_size.into());
        obj.insert("total".into(), self.total.into());
        obj.insert("truncated".into(), self.truncated.into());
        obj.insert(
            "next_page".into(),
            match self.next_page {
                Some(p) => p.into(),
                None => Value::Null,
            },
        );
    }
}

fn clamp(page: usize, page_size: usize) -> (usize, usize) {
    let page = page.max(1);
    let page_size = if page_size < 1 {
        DEFAULT_PAGE_SIZE
    } else {
        page_size
    };
    (page, page_size)
}

/// Slice one page out of `items`
pub fn paginate_slice<T: Clone>(items: &[T], page: usize, page_size: usize) -> (Vec<T>, PageInfo) {
    let (page, page_size) = clamp(page, page_size);
    let total = items.len();
    let start = (page - 1).saturating_mul(page_size).min(total);
    let end = start.saturating_add(page_size).min(total);
    let truncated = end < total;
    let info = PageInfo {
        page,
        page_size,
        total,
        truncated,
        next_page: truncated.then(|| page + 1),
    };
    (items[start..end].to_vec(), info)
}

/// Page through `text` by lines; `total` counts lines.
///
/// Over all valid pages the line windows partition the text disjointly
/// with no loss.
pub fn paginate_text(text: &str, page: usize, page_size: usize) -> (String, PageInfo) {
    let lines: Vec<&str> = text.lines().collect();
    let (sliced, info) = paginate_slice(&lines, page, page_size);
    (sliced.join("\n"), info)
}

/// Serialized JSON length of a value, used for the whole-value cap
pub fn json_char_size(value: &Value) -> usize {
    serde_json::to_string(value).map(|s| s.len()).unwrap_or(0)
}

/// Read a file as UTF-8 text
pub fn read_text(path: &Path) -> Result<String> {
    Ok(fs::read_to_string(path)?)
}

/// Write UTF-8 text to a file
pub fn write_text(path: &Path, content: &str) -> Result<()> {
    Ok(fs::write(path, content)?)
}
