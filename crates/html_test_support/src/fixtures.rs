use std::fs;
use std::path::Path;

use core_types::ChunkKind;
use html::AttrValue;
use serde::{Deserialize, Serialize};

/// Golden serialization cases, one TOML file per topic.
#[derive(Debug, Default, Deserialize)]
pub struct GoldenFile {
    #[serde(default)]
    pub escape: Vec<EscapeCase>,
    #[serde(default)]
    pub attribute: Vec<AttributeCase>,
}

#[derive(Debug, Deserialize)]
pub struct EscapeCase {
    pub input: String,
    pub expected: String,
}

#[derive(Debug, Deserialize)]
pub struct AttributeCase {
    pub name: String,
    /// Absent means null; a table is a style object.
    pub value: Option<toml::Value>,
    #[serde(default = "default_tag")]
    pub tag: String,
    pub expected: String,
}

fn default_tag() -> String {
    "div".to_string()
}

impl AttributeCase {
    pub fn attr_value(&self) -> AttrValue {
        match &self.value {
            None => AttrValue::Null,
            Some(toml::Value::String(text)) => AttrValue::Str(text.clone()),
            Some(toml::Value::Boolean(flag)) => AttrValue::Bool(*flag),
            Some(toml::Value::Integer(n)) => AttrValue::Number(*n as f64),
            Some(toml::Value::Float(n)) => AttrValue::Number(*n),
            Some(toml::Value::Table(entries)) => AttrValue::style(entries.iter().map(|(k, v)| {
                let value = match v {
                    toml::Value::String(text) => text.clone(),
                    other => other.to_string(),
                };
                (k.clone(), value)
            })),
            Some(other) => AttrValue::Str(other.to_string()),
        }
    }
}

pub fn load_golden(path: &Path) -> GoldenFile {
    let content = fs::read_to_string(path)
        .unwrap_or_else(|err| panic!("failed to read golden file {path:?}: {err}"));
    toml::from_str(&content).unwrap_or_else(|err| panic!("invalid golden file {path:?}: {err}"))
}

#[derive(Serialize)]
struct TraceEntry<'a> {
    kind: &'static str,
    text: &'a str,
}

/// Pretty JSON of a chunk stream for failure messages.
pub fn trace_json(chunks: &[(ChunkKind, String)]) -> String {
    let entries: Vec<TraceEntry<'_>> = chunks
        .iter()
        .map(|(kind, text)| TraceEntry {
            kind: match kind {
                ChunkKind::Document => "document",
                ChunkKind::Bootstrap => "bootstrap",
                ChunkKind::Patch => "patch",
            },
            text,
        })
        .collect();
    serde_json::to_string_pretty(&entries).unwrap_or_else(|err| format!("<trace error: {err}>"))
}
