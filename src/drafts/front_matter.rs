//! Front matter model and (de)serialization.
//!
//! Markdown files carry an optional leading `---` delimited YAML block; YAML
//! files are front matter in their entirety. Values are restricted to a closed
//! set so that comparing a draft against the remote copy is well defined.

use crate::error::{utils, StaticmsResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::warn;

/// File formats the editor knows how to split into front matter and body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentFormat {
    Markdown,
    Yaml,
}

impl ContentFormat {
    pub fn from_path(path: &str) -> Self {
        let ext = path
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "yml" | "yaml" => ContentFormat::Yaml,
            _ => ContentFormat::Markdown,
        }
    }
}

/// A single front matter value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

pub type Fields = BTreeMap<String, Value>;

/// Structured metadata of a content file: a mapping, or a list of mappings
/// for YAML data files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FrontMatter {
    Object(Fields),
    List(Vec<Fields>),
}

impl Default for FrontMatter {
    fn default() -> Self {
        FrontMatter::Object(Fields::new())
    }
}

impl FrontMatter {
    pub fn is_empty(&self) -> bool {
        match self {
            FrontMatter::Object(fields) => fields.is_empty(),
            FrontMatter::List(items) => items.is_empty(),
        }
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        match self {
            FrontMatter::Object(fields) => fields.get(field),
            FrontMatter::List(_) => None,
        }
    }

    /// Set a field; a list front matter is replaced by an object.
    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<Value>) {
        if let FrontMatter::List(_) = self {
            *self = FrontMatter::default();
        }
        if let FrontMatter::Object(fields) = self {
            fields.insert(field.into(), value.into());
        }
    }

    /// Serialized form used for equality checks. Keys are ordered, so two
    /// structurally equal front matters always produce the same string.
    pub fn canonical(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }

    fn from_yaml(value: serde_yaml::Value) -> Result<Self, String> {
        match value {
            serde_yaml::Value::Null => Ok(FrontMatter::default()),
            serde_yaml::Value::Mapping(map) => Ok(FrontMatter::Object(mapping_to_fields(map)?)),
            serde_yaml::Value::Sequence(items) => items
                .into_iter()
                .map(|item| match item {
                    serde_yaml::Value::Mapping(map) => mapping_to_fields(map),
                    other => Err(format!("list entries must be mappings, got {:?}", other)),
                })
                .collect::<Result<Vec<_>, _>>()
                .map(FrontMatter::List),
            serde_yaml::Value::Tagged(tagged) => Self::from_yaml(tagged.value),
            other => Err(format!("expected a mapping or a list, got {:?}", other)),
        }
    }
}

fn mapping_to_fields(map: serde_yaml::Mapping) -> Result<Fields, String> {
    let mut fields = Fields::new();
    for (key, value) in map {
        let key = match key {
            serde_yaml::Value::String(s) => s,
            serde_yaml::Value::Bool(b) => b.to_string(),
            serde_yaml::Value::Number(n) => n.to_string(),
            other => return Err(format!("unsupported key {:?}", other)),
        };
        fields.insert(key, yaml_to_value(value)?);
    }
    Ok(fields)
}

fn yaml_to_value(value: serde_yaml::Value) -> Result<Value, String> {
    Ok(match value {
        serde_yaml::Value::Null => Value::Null,
        serde_yaml::Value::Bool(b) => Value::Bool(b),
        serde_yaml::Value::Number(n) => match n.as_i64() {
            Some(i) => Value::Int(i),
            None => Value::Float(n.as_f64().ok_or_else(|| format!("number {} out of range", n))?),
        },
        serde_yaml::Value::String(s) => Value::String(s),
        serde_yaml::Value::Sequence(items) => Value::List(
            items
                .into_iter()
                .map(yaml_to_value)
                .collect::<Result<Vec<_>, _>>()?,
        ),
        serde_yaml::Value::Mapping(map) => Value::Map(mapping_to_fields(map)?),
        serde_yaml::Value::Tagged(tagged) => yaml_to_value(tagged.value)?,
    })
}

/// Front matter and body of a content file.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ParsedContent {
    pub front_matter: FrontMatter,
    pub body: String,
}

/// Split a leading `---` block off `raw`, returning the YAML and the rest.
fn split_front_block(raw: &str) -> Option<(&str, &str)> {
    let rest = raw.strip_prefix("---")?;
    let rest = rest
        .strip_prefix("\r\n")
        .or_else(|| rest.strip_prefix('\n'))?;

    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        if line.trim_end_matches(['\r', '\n']) == "---" {
            return Some((&rest[..offset], &rest[offset + line.len()..]));
        }
        offset += line.len();
    }
    None
}

fn parse_yaml(yaml: &str) -> StaticmsResult<FrontMatter> {
    if yaml.trim().is_empty() {
        return Ok(FrontMatter::default());
    }
    let value: serde_yaml::Value =
        serde_yaml::from_str(yaml).map_err(|e| utils::parse_error("front matter", e))?;
    FrontMatter::from_yaml(value).map_err(|e| utils::parse_error("front matter", e))
}

/// Strict parse; errors when the front matter cannot be read.
pub fn try_parse(raw: &str, format: ContentFormat) -> StaticmsResult<ParsedContent> {
    match format {
        ContentFormat::Yaml => Ok(ParsedContent {
            front_matter: parse_yaml(raw)?,
            body: String::new(),
        }),
        ContentFormat::Markdown => {
            if !raw.starts_with("---") {
                return Ok(ParsedContent {
                    front_matter: FrontMatter::default(),
                    body: raw.to_string(),
                });
            }
            let (yaml, body) = split_front_block(raw)
                .ok_or_else(|| utils::parse_error("front matter", "unterminated --- block"))?;
            Ok(ParsedContent {
                front_matter: parse_yaml(yaml)?,
                body: body.trim_start_matches(['\r', '\n']).to_string(),
            })
        }
    }
}

/// Lenient parse: unreadable front matter yields an empty mapping and the raw
/// text as body.
pub fn parse(raw: &str, format: ContentFormat) -> ParsedContent {
    try_parse(raw, format).unwrap_or_else(|e| {
        warn!("Falling back to raw content: {}", e);
        ParsedContent {
            front_matter: FrontMatter::default(),
            body: raw.to_string(),
        }
    })
}

/// Render front matter and body back into file content.
pub fn serialize(front_matter: &FrontMatter, body: &str, format: ContentFormat) -> StaticmsResult<String> {
    // Only an empty mapping may be omitted; an empty list must keep its shape.
    let yaml = if *front_matter == FrontMatter::default() {
        String::new()
    } else {
        serde_yaml::to_string(front_matter)?
    };

    match format {
        ContentFormat::Yaml => Ok(yaml),
        ContentFormat::Markdown => {
            if yaml.is_empty() && !body.starts_with("---") {
                return Ok(body.to_string());
            }
            Ok(format!("---\n{}---\n\n{}", yaml, body))
        }
    }
}
