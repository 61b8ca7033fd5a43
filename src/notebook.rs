use std::collections::HashSet;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

pub type Dict = serde_json::Map<String, Value>;

/// An nbformat v4 notebook.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Notebook {
    #[serde(default)]
    pub metadata: Dict,
    pub nbformat: i64,
    pub nbformat_minor: i64,
    pub cells: Vec<Cell>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct CellMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(flatten)]
    pub additional: Dict,
}

/// nbformat stores source as either a string or a list of lines
/// (with trailing newlines). Both forms deserialize to one string.
fn concatenate_deserialize<'de, D>(input: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Lines {
        One(String),
        Many(Vec<String>),
    }
    Ok(match Lines::deserialize(input)? {
        Lines::One(s) => s,
        Lines::Many(v) => v.concat(),
    })
}

fn concatenate_serialize<S>(value: &str, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.collect_seq(value.split_inclusive('\n'))
}

fn opt_concatenate_deserialize<'de, D>(input: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Lines {
        One(String),
        Many(Vec<String>),
    }
    Ok(Option::<Lines>::deserialize(input)?.map(|l| match l {
        Lines::One(s) => s,
        Lines::Many(v) => v.concat(),
    }))
}

fn opt_concatenate_serialize<S>(value: &Option<String>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    match value {
        Some(text) => serializer.collect_seq(text.split_inclusive('\n')),
        None => serializer.serialize_none(),
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct CellCommon {
    #[serde(default)]
    pub metadata: CellMeta,
    #[serde(
        deserialize_with = "concatenate_deserialize",
        serialize_with = "concatenate_serialize"
    )]
    pub source: String,
}

/// One entry of a code cell's output list.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct CellOutput {
    pub output_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(
        default,
        deserialize_with = "opt_concatenate_deserialize",
        serialize_with = "opt_concatenate_serialize",
        skip_serializing_if = "Option::is_none"
    )]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Dict>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub traceback: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_count: Option<i64>,
    #[serde(flatten)]
    pub extra: Dict,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(tag = "cell_type")]
pub enum Cell {
    #[serde(rename = "markdown")]
    Markdown {
        #[serde(flatten)]
        common: CellCommon,
    },
    #[serde(rename = "code")]
    Code {
        #[serde(flatten)]
        common: CellCommon,
        #[serde(default)]
        execution_count: Option<i64>,
        #[serde(default)]
        outputs: Vec<CellOutput>,
    },
    #[serde(rename = "raw")]
    Raw {
        #[serde(flatten)]
        common: CellCommon,
    },
}

impl Cell {
    /// Build a markdown cell, e.g. for the generated references section.
    pub fn markdown(source: String) -> Cell {
        Cell::Markdown {
            common: CellCommon {
                metadata: CellMeta::default(),
                source,
            },
        }
    }

    pub fn common(&self) -> &CellCommon {
        match self {
            Cell::Markdown { common } | Cell::Raw { common } | Cell::Code { common, .. } => common,
        }
    }

    pub fn common_mut(&mut self) -> &mut CellCommon {
        match self {
            Cell::Markdown { common } | Cell::Raw { common } | Cell::Code { common, .. } => common,
        }
    }

    pub fn source(&self) -> &str {
        &self.common().source
    }

    pub fn set_source(&mut self, source: String) {
        self.common_mut().source = source;
    }

    pub fn is_markdown(&self) -> bool {
        matches!(self, Cell::Markdown { .. })
    }

    pub fn is_code(&self) -> bool {
        matches!(self, Cell::Code { .. })
    }

    pub fn tags(&self) -> HashSet<String> {
        self.common()
            .metadata
            .tags
            .iter()
            .flatten()
            .cloned()
            .collect()
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.common()
            .metadata
            .tags
            .iter()
            .flatten()
            .any(|t| t == tag)
    }

    pub fn add_tag(&mut self, tag: &str) {
        let tags = self.common_mut().metadata.tags.get_or_insert_with(Vec::new);
        if !tags.iter().any(|t| t == tag) {
            tags.push(tag.to_string());
        }
    }

    /// Record a key under the cell's `smart_exporter` metadata block.
    pub fn annotate(&mut self, key: &str, value: Value) {
        let additional = &mut self.common_mut().metadata.additional;
        let entry = additional
            .entry("smart_exporter".to_string())
            .or_insert_with(|| Value::Object(Dict::new()));
        if let Value::Object(map) = entry {
            map.insert(key.to_string(), value);
        }
    }
}

impl Notebook {
    /// Load a notebook file.
    pub fn load(path: &Path) -> Result<Notebook> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Notebook file not found: {}", path.display()))?;
        let nb: Notebook = serde_json::from_str(&raw)
            .with_context(|| format!("Invalid notebook JSON: {}", path.display()))?;
        Ok(nb)
    }

    /// The notebook-level `smart_exporter` metadata block, if present.
    pub fn exporter_metadata(&self) -> Option<&Dict> {
        self.metadata.get("smart_exporter").and_then(Value::as_object)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r##"{
        "nbformat": 4,
        "nbformat_minor": 5,
        "metadata": {"kernelspec": {"name": "python3"}},
        "cells": [
            {
                "cell_type": "markdown",
                "metadata": {"tags": ["intro"]},
                "source": ["# Title\n", "\n", "Body text.\n"]
            },
            {
                "cell_type": "code",
                "metadata": {},
                "execution_count": 2,
                "source": "print('hi')",
                "outputs": [
                    {"output_type": "stream", "name": "stdout", "text": ["hi\n"]}
                ]
            }
        ]
    }"##;

    #[test]
    fn list_source_concatenates() {
        let nb: Notebook = serde_json::from_str(SAMPLE).unwrap();
        assert_eq!(nb.cells[0].source(), "# Title\n\nBody text.\n");
        assert_eq!(nb.cells[1].source(), "print('hi')");
    }

    #[test]
    fn output_text_concatenates() {
        let nb: Notebook = serde_json::from_str(SAMPLE).unwrap();
        let Cell::Code { outputs, .. } = &nb.cells[1] else {
            panic!("expected code cell");
        };
        assert_eq!(outputs[0].text.as_deref(), Some("hi\n"));
        assert_eq!(outputs[0].name.as_deref(), Some("stdout"));
    }

    #[test]
    fn source_serializes_as_line_list() {
        let nb: Notebook = serde_json::from_str(SAMPLE).unwrap();
        let json = serde_json::to_value(&nb).unwrap();
        assert_eq!(
            json["cells"][0]["source"],
            serde_json::json!(["# Title\n", "\n", "Body text.\n"])
        );
        // Round trip preserves the concatenated text.
        let again: Notebook = serde_json::from_value(json).unwrap();
        assert_eq!(again.cells[0].source(), nb.cells[0].source());
    }

    #[test]
    fn tags_and_annotations() {
        let mut nb: Notebook = serde_json::from_str(SAMPLE).unwrap();
        assert!(nb.cells[0].has_tag("intro"));
        nb.cells[0].add_tag("hidden");
        nb.cells[0].add_tag("hidden");
        assert_eq!(
            nb.cells[0].common().metadata.tags.as_deref(),
            Some(&["intro".to_string(), "hidden".to_string()][..])
        );
        nb.cells[0].annotate("hidden_reason", Value::String("rule".into()));
        let meta = &nb.cells[0].common().metadata.additional;
        assert_eq!(meta["smart_exporter"]["hidden_reason"], "rule");
    }
}
