//! Hierarchical-map handler: JSON, YAML, TOML, and INI
//!
//! All four formats load into a `serde_json::Value` tree; selection and
//! replacement traverse it by path segments and write back in the
//! original format.

use cyto_core::{Error, Result};
use serde_json::{Map, Value, json};
use std::path::Path;

use crate::handler::{ShapeHandler, ShapeKind};
use crate::page::{
    DEFAULT_PAGE_SIZE, PageInfo, WHOLE_VALUE_MAX_CHARS, json_char_size, paginate_slice,
    paginate_text, read_text, write_text,
};
use crate::selector::{Segment, Selector};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MapFormat {
    Json,
    Yaml,
    Toml,
    Ini,
}

fn format_for(path: &Path) -> Result<MapFormat> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "json" => Ok(MapFormat::Json),
        "yaml" | "yml" => Ok(MapFormat::Yaml),
        "toml" => Ok(MapFormat::Toml),
        "ini" | "cfg" => Ok(MapFormat::Ini),
        other => Err(Error::UnsupportedFileType(format!(
            "Unsupported map format \".{other}\""
        ))),
    }
}

fn load_map(path: &Path) -> Result<Value> {
    let content = read_text(path)?;
    match format_for(path)? {
        MapFormat::Json => serde_json::from_str(&content).map_err(|e| Error::Parse(e.to_string())),
        MapFormat::Yaml => serde_yaml::from_str(&content).map_err(|e| Error::Parse(e.to_string())),
        MapFormat::Toml => {
            let value: toml::Value =
                toml::from_str(&content).map_err(|e| Error::Parse(e.to_string()))?;
            serde_json::to_value(value).map_err(|e| Error::Parse(e.to_string()))
        }
        MapFormat::Ini => Ok(parse_ini(&content)),
    }
}

fn write_map(path: &Path, data: &Value) -> Result<()> {
    let content = match format_for(path)? {
        MapFormat::Json => {
            serde_json::to_string_pretty(data).map_err(|e| Error::Parse(e.to_string()))?
        }
        MapFormat::Yaml => serde_yaml::to_string(data).map_err(|e| Error::Parse(e.to_string()))?,
        MapFormat::Toml => {
            let value: toml::Value =
                serde_json::from_value(data.clone()).map_err(|e| Error::Parse(e.to_string()))?;
            toml::to_string_pretty(&value).map_err(|e| Error::Parse(e.to_string()))?
        }
        MapFormat::Ini => dump_ini(data)?,
    };
    write_text(path, &content)
}

/// Parse INI text into `{section: {key: value}}`. Keys that appear
/// before any section header land under `DEFAULT`.
fn parse_ini(content: &str) -> Value {
    let mut root = Map::new();
    let mut section = "DEFAULT".to_string();
    for raw in content.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with(';') || line.starts_with('#') {
            continue;
        }
        if let Some(name) = line.strip_prefix('[').and_then(|r| r.strip_suffix(']')) {
            section = name.trim().to_string();
            root.entry(section.clone())
                .or_insert_with(|| Value::Object(Map::new()));
            continue;
        }
        let (key, value) = match line.split_once('=').or_else(|| line.split_once(':')) {
            Some((k, v)) => (k.trim(), v.trim()),
            None => continue,
        };
        let entry = root
            .entry(section.clone())
            .or_insert_with(|| Value::Object(Map::new()));
        if let Value::Object(map) = entry {
            map.insert(key.to_string(), Value::String(value.to_string()));
        }
    }
    Value::Object(root)
}

fn ini_scalar(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn dump_ini(data: &Value) -> Result<String> {
    let root = data
        .as_object()
        .ok_or_else(|| Error::Parse("INI documents must be a map of sections".to_string()))?;
    fn write_section(name: &str, value: &Value, out: &mut String) {
        out.push('[');
        out.push_str(name);
        out.push_str("]\n");
        match value {
            Value::Object(map) => {
                for (key, item) in map {
                    out.push_str(&format!("{key} = {}\n", ini_scalar(item)));
                }
            }
            other => out.push_str(&format!("value = {}\n", ini_scalar(other))),
        }
        out.push('\n');
    }

    let mut out = String::new();
    if let Some(defaults) = root.get("DEFAULT") {
        write_section("DEFAULT", defaults, &mut out);
    }
    for (name, value) in root {
        if name == "DEFAULT" {
            continue;
        }
        write_section(name, value, &mut out);
    }
    Ok(out)
}

fn path_segments<'a>(selector: &'a Selector) -> Result<&'a [Segment]> {
    match selector {
        Selector::Path(segments) => Ok(segments),
        Selector::Block { .. } => Err(Error::InvalidSelector(
            "Map selector must be a list path".to_string(),
        )),
    }
}

fn not_found(selector: &Selector) -> Error {
    Error::KeyNotFound(format!("No section found at {selector}"))
}

fn descend<'a>(mut value: &'a Value, segments: &[Segment], selector: &Selector) -> Result<&'a Value> {
    for segment in segments {
        value = match (segment, value) {
            (Segment::Key(key), Value::Object(map)) => {
                map.get(key).ok_or_else(|| not_found(selector))?
            }
            (Segment::Index(idx), Value::Array(items)) => {
                items.get(*idx).ok_or_else(|| not_found(selector))?
            }
            _ => return Err(not_found(selector)),
        };
    }
    Ok(value)
}

fn descend_mut<'a>(
    mut value: &'a mut Value,
    segments: &[Segment],
    selector: &Selector,
) -> Result<&'a mut Value> {
    for segment in segments {
        value = match (segment, value) {
            (Segment::Key(key), Value::Object(map)) => {
                map.get_mut(key).ok_or_else(|| not_found(selector))?
            }
            (Segment::Index(idx), Value::Array(items)) => {
                items.get_mut(*idx).ok_or_else(|| not_found(selector))?
            }
            _ => return Err(not_found(selector)),
        };
    }
    Ok(value)
}

fn scalar_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "map",
    }
}

fn paged(info: PageInfo, value: Value, note: Option<String>) -> Value {
    let mut obj = Map::new();
    obj.insert("value".into(), value);
    info.extend(&mut obj);
    if let Some(note) = note {
        obj.insert("note".into(), note.into());
    }
    Value::Object(obj)
}

pub struct MapHandler;

impl ShapeHandler for MapHandler {
    fn kind(&self) -> ShapeKind {
        ShapeKind::Map
    }

    fn extensions(&self) -> &'static [&'static str] {
        &[".json", ".yaml", ".yml", ".toml", ".ini", ".cfg"]
    }

    fn outline(&self, path: &Path, page: usize, page_size: usize) -> Result<Value> {
        let data = load_map(path)?;
        match &data {
            Value::Object(map) => {
                let keys: Vec<String> = map.keys().cloned().collect();
                let (page_keys, info) = paginate_slice(&keys, page, page_size);
                let mut obj = Map::new();
                obj.insert("summary".into(), "map".into());
                obj.insert("keys".into(), json!(page_keys));
                info.extend(&mut obj);
                if info.truncated {
                    obj.insert(
                        "note".into(),
                        format!(
                            "Keys truncated. Call describe_file with page={} to continue.",
                            info.next_page.unwrap_or(info.page + 1)
                        )
                        .into(),
                    );
                }
                Ok(Value::Object(obj))
            }
            Value::Array(items) => Ok(json!({"summary": "map-list", "length": items.len()})),
            other => Ok(json!({"summary": "map-scalar", "type": scalar_type_name(other)})),
        }
    }

    fn select(
        &self,
        path: &Path,
        selector: &Selector,
        page: usize,
        page_size: usize,
    ) -> Result<Value> {
        let segments = path_segments(selector)?;
        let data = load_map(path)?;
        let target = descend(&data, segments, selector)?;
        let effective_page_size = if page_size < 1 {
            DEFAULT_PAGE_SIZE
        } else {
            page_size
        };
        match target {
            Value::Object(map) => {
                if map.len() <= effective_page_size
                    && json_char_size(target) <= WHOLE_VALUE_MAX_CHARS
                {
                    return Ok(json!({"value": target}));
                }
                let keys: Vec<String> = map.keys().cloned().collect();
                let (page_keys, info) = paginate_slice(&keys, page, page_size);
                let note = info.truncated.then(|| {
                    format!(
                        "Keys truncated. Call extract_section with page={} to continue, or select a deeper path.",
                        info.next_page.unwrap_or(info.page + 1)
                    )
                });
                Ok(paged(info, json!(page_keys), note))
            }
            Value::Array(items) => {
                if items.len() <= effective_page_size
                    && json_char_size(target) <= WHOLE_VALUE_MAX_CHARS
                {
                    return Ok(json!({"value": target}));
                }
                let (page_items, info) = paginate_slice(items, page, page_size);
                let note = info.truncated.then(|| {
                    format!(
                        "List truncated. Call extract_section with page={} to continue.",
                        info.next_page.unwrap_or(info.page + 1)
                    )
                });
                Ok(paged(info, json!(page_items), note))
            }
            Value::String(text) => {
                let (page_text, info) = paginate_text(text, page, page_size);
                let note = info.truncated.then(|| {
                    format!(
                        "Text truncated. Call extract_section with page={} to continue.",
                        info.next_page.unwrap_or(info.page + 1)
                    )
                });
                Ok(paged(info, page_text.into(), note))
            }
            other => Ok(json!({"value": other})),
        }
    }

    fn replace(&self, path: &Path, selector: &Selector, value: &Value) -> Result<Value> {
        let segments = path_segments(selector)?;
        let Some((leaf, parents)) = segments.split_last() else {
            return Err(Error::InvalidSelector(
                "Map selector cannot be empty".to_string(),
            ));
        };
        let mut data = load_map(path)?;
        let parent = descend_mut(&mut data, parents, selector)?;
        match (leaf, parent) {
            (Segment::Key(key), Value::Object(map)) => {
                map.insert(key.clone(), value.clone());
            }
            (Segment::Index(idx), Value::Array(items)) => {
                if *idx >= items.len() {
                    return Err(not_found(selector));
                }
                items[*idx] = value.clone();
            }
            _ => return Err(not_found(selector)),
        }
        write_map(path, &data)?;
        Ok(json!({"changed": true, "kind": self.kind().as_str()}))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn temp_map(suffix: &str, content: &str) -> NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_json_outline_lists_keys() {
        let file = temp_map(".json", r#"{"alpha": 1, "beta": {"x": 2}}"#);
        let outline = MapHandler.outline(file.path(), 1, 50).unwrap();
        assert_eq!(outline["summary"], "map");
        assert_eq!(outline["keys"], json!(["alpha", "beta"]));
        assert_eq!(outline["truncated"], false);
    }

    #[test]
    fn test_outline_paginates_many_keys() {
        let entries: Vec<String> = (0..70).map(|i| format!("\"k{i:03}\": {i}")).collect();
        let file = temp_map(".json", &format!("{{{}}}", entries.join(",")));
        let outline = MapHandler.outline(file.path(), 1, 50).unwrap();
        assert_eq!(outline["total"], 70);
        assert_eq!(outline["truncated"], true);
        assert_eq!(outline["next_page"], 2);
        assert!(outline["note"].as_str().unwrap().contains("page=2"));
        assert_eq!(outline["keys"].as_array().unwrap().len(), 50);

        let rest = MapHandler.outline(file.path(), 2, 50).unwrap();
        assert_eq!(rest["keys"].as_array().unwrap().len(), 20);
        assert_eq!(rest["truncated"], false);
    }

    #[test]
    fn test_list_and_scalar_outlines() {
        let list = temp_map(".json", "[1, 2, 3]");
        assert_eq!(
            MapHandler.outline(list.path(), 1, 50).unwrap(),
            json!({"summary": "map-list", "length": 3})
        );
        let scalar = temp_map(".json", "42");
        assert_eq!(
            MapHandler.outline(scalar.path(), 1, 50).unwrap(),
            json!({"summary": "map-scalar", "type": "number"})
        );
    }

    #[test]
    fn test_select_small_value_returned_whole() {
        let file = temp_map(".json", r#"{"a": {"b": [1, 2, 3]}}"#);
        let sel = Selector::parse(&json!(["a", "b"])).unwrap();
        let result = MapHandler.select(file.path(), &sel, 1, 50).unwrap();
        assert_eq!(result, json!({"value": [1, 2, 3]}));
    }

    #[test]
    fn test_select_scalar_leaf() {
        let file = temp_map(".json", r#"{"a": {"b": true}}"#);
        let sel = Selector::parse_str("a.b").unwrap();
        let result = MapHandler.select(file.path(), &sel, 1, 50).unwrap();
        assert_eq!(result, json!({"value": true}));
    }

    #[test]
    fn test_select_long_string_paginates() {
        let text: String = (0..60)
            .map(|i| format!("row {i}"))
            .collect::<Vec<_>>()
            .join("\\n");
        let file = temp_map(".json", &format!(r#"{{"doc": "{text}"}}"#));
        let sel = Selector::parse_str("doc").unwrap();
        let result = MapHandler.select(file.path(), &sel, 1, 50).unwrap();
        assert_eq!(result["truncated"], true);
        assert!(result["note"].as_str().unwrap().contains("extract_section"));
        assert_eq!(result["total"], 60);
    }

    #[test]
    fn test_select_large_list_paginates() {
        let items: Vec<String> = (0..120).map(|i| i.to_string()).collect();
        let file = temp_map(".json", &format!("{{\"xs\": [{}]}}", items.join(",")));
        let sel = Selector::parse_str("xs").unwrap();
        let result = MapHandler.select(file.path(), &sel, 2, 50).unwrap();
        assert_eq!(result["page"], 2);
        assert_eq!(result["value"].as_array().unwrap().len(), 50);
        assert_eq!(result["value"][0], 50);
    }

    #[test]
    fn test_select_missing_key() {
        let file = temp_map(".json", r#"{"a": 1}"#);
        let sel = Selector::parse_str("a.b.c").unwrap();
        let err = MapHandler.select(file.path(), &sel, 1, 50).unwrap_err();
        assert_eq!(err.kind(), "key_not_found");
        assert!(err.to_string().contains("a.b.c"));
    }

    #[test]
    fn test_block_selector_rejected() {
        let file = temp_map(".json", r#"{"a": 1}"#);
        let sel = Selector::parse_str("function:a").unwrap();
        let err = MapHandler.select(file.path(), &sel, 1, 50).unwrap_err();
        assert_eq!(err.kind(), "invalid_selector");
    }

    #[test]
    fn test_replace_nested_round_trip() {
        let file = temp_map(".json", r#"{"a": {"b": [1, 2, 3]}}"#);
        let sel = Selector::parse_str("a.b[1]").unwrap();
        let result = MapHandler.replace(file.path(), &sel, &json!(99)).unwrap();
        assert_eq!(result, json!({"changed": true, "kind": "map"}));

        let check = Selector::parse(&json!(["a", "b"])).unwrap();
        let value = MapHandler.select(file.path(), &check, 1, 50).unwrap();
        assert_eq!(value, json!({"value": [1, 99, 3]}));
    }

    #[test]
    fn test_replace_inserts_new_key() {
        let file = temp_map(".json", r#"{"a": {}}"#);
        let sel = Selector::parse_str("a.fresh").unwrap();
        MapHandler.replace(file.path(), &sel, &json!("v")).unwrap();
        let check = Selector::parse_str("a.fresh").unwrap();
        assert_eq!(
            MapHandler.select(file.path(), &check, 1, 50).unwrap(),
            json!({"value": "v"})
        );
    }

    #[test]
    fn test_replace_list_index_out_of_range() {
        let file = temp_map(".json", r#"{"a": [1]}"#);
        let sel = Selector::parse_str("a[5]").unwrap();
        let err = MapHandler.replace(file.path(), &sel, &json!(0)).unwrap_err();
        assert_eq!(err.kind(), "key_not_found");
    }

    #[test]
    fn test_yaml_round_trip() {
        let file = temp_map(".yaml", "server:\n  port: 8080\n  host: localhost\n");
        let sel = Selector::parse_str("server.port").unwrap();
        MapHandler.replace(file.path(), &sel, &json!(9090)).unwrap();
        let result = MapHandler.select(file.path(), &sel, 1, 50).unwrap();
        assert_eq!(result, json!({"value": 9090}));
        // Sibling keys survive the rewrite
        let host = Selector::parse_str("server.host").unwrap();
        assert_eq!(
            MapHandler.select(file.path(), &host, 1, 50).unwrap(),
            json!({"value": "localhost"})
        );
    }

    #[test]
    fn test_toml_round_trip() {
        let file = temp_map(".toml", "[package]\nname = \"demo\"\nversion = \"0.1.0\"\n");
        let sel = Selector::parse_str("package.version").unwrap();
        MapHandler
            .replace(file.path(), &sel, &json!("0.2.0"))
            .unwrap();
        assert_eq!(
            MapHandler.select(file.path(), &sel, 1, 50).unwrap(),
            json!({"value": "0.2.0"})
        );
    }

    #[test]
    fn test_ini_parse_select_replace() {
        let file = temp_map(".ini", "top = 1\n[server]\nport = 8080\n; comment\nhost = local\n");
        let outline = MapHandler.outline(file.path(), 1, 50).unwrap();
        assert_eq!(outline["keys"], json!(["DEFAULT", "server"]));

        let sel = Selector::parse_str("server.port").unwrap();
        assert_eq!(
            MapHandler.select(file.path(), &sel, 1, 50).unwrap(),
            json!({"value": "8080"})
        );

        MapHandler.replace(file.path(), &sel, &json!("9090")).unwrap();
        assert_eq!(
            MapHandler.select(file.path(), &sel, 1, 50).unwrap(),
            json!({"value": "9090"})
        );
        // DEFAULT section survives
        let top = Selector::parse_str("DEFAULT.top").unwrap();
        assert_eq!(
            MapHandler.select(file.path(), &top, 1, 50).unwrap(),
            json!({"value": "1"})
        );
    }

    #[test]
    fn test_malformed_json_is_parse_error() {
        let file = temp_map(".json", "{not json");
        let err = MapHandler.outline(file.path(), 1, 50).unwrap_err();
        assert_eq!(err.kind(), "parse_error");
    }
}
