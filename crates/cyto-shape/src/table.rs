//! Table handler for `.csv` and `.tsv`
//!
//! The first record is the header. Cells are addressed `[row, column]`
//! where the column is an index or a header name; rewrites keep the
//! original delimiter.

use cyto_core::{Error, Result};
use serde_json::{Map, Value, json};
use std::path::Path;

use crate::handler::{ShapeHandler, ShapeKind};
use crate::page::paginate_slice;
use crate::selector::{Segment, Selector};

fn delimiter_for(path: &Path) -> u8 {
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("tsv") => b'\t',
        _ => b',',
    }
}

fn read_table(path: &Path) -> Result<(Vec<String>, Vec<Vec<String>>)> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter_for(path))
        .has_headers(false)
        .flexible(true)
        .from_path(path)
        .map_err(|e| Error::Parse(e.to_string()))?;
    let mut records = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| Error::Parse(e.to_string()))?;
        records.push(record.iter().map(str::to_string).collect::<Vec<String>>());
    }
    if records.is_empty() {
        return Ok((Vec::new(), Vec::new()));
    }
    let header = records.remove(0);
    Ok((header, records))
}

fn write_table(path: &Path, header: &[String], rows: &[Vec<String>]) -> Result<()> {
    let mut writer = csv::WriterBuilder::new()
        .delimiter(delimiter_for(path))
        .from_path(path)
        .map_err(|e| Error::Parse(e.to_string()))?;
    writer
        .write_record(header)
        .map_err(|e| Error::Parse(e.to_string()))?;
    for row in rows {
        writer
            .write_record(row)
            .map_err(|e| Error::Parse(e.to_string()))?;
    }
    writer.flush().map_err(|e| Error::Parse(e.to_string()))?;
    Ok(())
}

/// Resolve a table selector to `(row, column)` indices
fn cell_selector(
    selector: &Selector,
    header: &[String],
) -> Result<(usize, usize)> {
    let segments = match selector {
        Selector::Path(segments) if segments.len() == 2 => segments,
        _ => {
            return Err(Error::InvalidSelector(
                "Table selector must be [row_index, column]".to_string(),
            ));
        }
    };
    let row = match &segments[0] {
        Segment::Index(idx) => *idx,
        Segment::Key(_) => {
            return Err(Error::InvalidSelector(
                "Table selector must be [row_index, column]".to_string(),
            ));
        }
    };
    let col = match &segments[1] {
        Segment::Index(idx) => *idx,
        Segment::Key(name) => header
            .iter()
            .position(|column| column == name)
            .ok_or_else(|| Error::KeyNotFound(format!("No section found at {selector}")))?,
    };
    Ok((row, col))
}

fn row_record(header: &[String], row: &[String]) -> Value {
    let mut obj = Map::new();
    for (column, cell) in header.iter().zip(row.iter()) {
        obj.insert(column.clone(), Value::String(cell.clone()));
    }
    Value::Object(obj)
}

pub struct TableHandler;

impl ShapeHandler for TableHandler {
    fn kind(&self) -> ShapeKind {
        ShapeKind::Table
    }

    fn extensions(&self) -> &'static [&'static str] {
        &[".csv", ".tsv"]
    }

    fn outline(&self, path: &Path, page: usize, page_size: usize) -> Result<Value> {
        let (header, rows) = read_table(path)?;
        let (page_rows, info) = paginate_slice(&rows, page, page_size);
        let head: Vec<Value> = page_rows
            .iter()
            .map(|row| row_record(&header, row))
            .collect();
        let mut obj = Map::new();
        obj.insert("summary".into(), "table".into());
        obj.insert("row_count".into(), rows.len().into());
        obj.insert("columns".into(), json!(header));
        obj.insert("head".into(), Value::Array(head));
        info.extend(&mut obj);
        if info.truncated {
            obj.insert(
                "note".into(),
                format!(
                    "Rows truncated. Call describe_file with page={} to continue.",
                    info.next_page.unwrap_or(info.page + 1)
                )
                .into(),
            );
        }
        Ok(Value::Object(obj))
    }

    fn select(
        &self,
        path: &Path,
        selector: &Selector,
        _page: usize,
        _page_size: usize,
    ) -> Result<Value> {
        let (header, rows) = read_table(path)?;
        let (row, col) = cell_selector(selector, &header)?;
        let cell = rows
            .get(row)
            .and_then(|r| r.get(col))
            .ok_or_else(|| Error::KeyNotFound(format!("No section found at {selector}")))?;
        Ok(json!({"value": cell}))
    }

    fn replace(&self, path: &Path, selector: &Selector, value: &Value) -> Result<Value> {
        let (header, mut rows) = read_table(path)?;
        let (row, col) = cell_selector(selector, &header)?;
        let cell = rows
            .get_mut(row)
            .and_then(|r| r.get_mut(col))
            .ok_or_else(|| Error::KeyNotFound(format!("No section found at {selector}")))?;
        // Cells render the way a CSV writer prints scalars: capitalized
        // booleans, empty field for null
        *cell = match value {
            Value::String(s) => s.clone(),
            Value::Bool(true) => "True".to_string(),
            Value::Bool(false) => "False".to_string(),
            Value::Null => String::new(),
            other => other.to_string(),
        };
        write_table(path, &header, &rows)?;
        Ok(json!({"changed": true, "kind": self.kind().as_str()}))
    }
}
