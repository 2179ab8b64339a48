//! Selection input loading
//!
//! Input values come from an inline list or from a JSON or CSV file. Each
//! value is normalized through [`SelectionType::criterion`].

use gcusers_engine::{SearchCriterion, SelectionType};
use serde::Deserialize;
use serde_json::Value;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::debug;

use crate::error::{CliError, CliResult};

/// Layout of a selection input file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub enum InputFormat {
    /// Array of objects.
    Json,
    /// Array of objects.
    JsonArray,
    /// Object of objects keyed by any id.
    JsonMap,
    /// Header row, one record per line.
    Csv,
}

impl FromStr for InputFormat {
    type Err = CliError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "json" => Ok(Self::Json),
            "jsonArray" => Ok(Self::JsonArray),
            "jsonMap" => Ok(Self::JsonMap),
            "csv" => Ok(Self::Csv),
            other => Err(CliError::Validation(format!(
                "Unsupported input file format '{}'. Valid formats: json, jsonArray, jsonMap, csv",
                other
            ))),
        }
    }
}

impl TryFrom<String> for InputFormat {
    type Error = CliError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl fmt::Display for InputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Json => "json",
            Self::JsonArray => "jsonArray",
            Self::JsonMap => "jsonMap",
            Self::Csv => "csv",
        })
    }
}

/// Where selection values come from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputSource {
    /// `all` and `custom` selections take no values.
    Unfiltered,
    Inline {
        value: String,
        separator: char,
    },
    File {
        path: PathBuf,
        format: InputFormat,
        attribute: String,
        delimiter: u8,
    },
}

/// Load and normalize the selection input
///
/// Returns an empty list for unfiltered sources.
pub fn load_criteria(
    selection_type: SelectionType,
    source: &InputSource,
) -> CliResult<Vec<SearchCriterion>> {
    let raw = match source {
        InputSource::Unfiltered => return Ok(Vec::new()),
        InputSource::Inline { value, separator } => {
            value.split(*separator).map(str::to_string).collect()
        }
        InputSource::File {
            path,
            format,
            attribute,
            delimiter,
        } => match format {
            InputFormat::Csv => read_csv_column(path, attribute, *delimiter)?,
            InputFormat::Json | InputFormat::JsonArray | InputFormat::JsonMap => {
                read_json_attribute(path, *format, attribute)?
            }
        },
    };

    let criteria: Vec<SearchCriterion> = raw
        .iter()
        .filter_map(|value| selection_type.criterion(value))
        .collect();

    if criteria.is_empty() {
        return Err(CliError::Config(format!(
            "Empty input list for users selection by {}",
            selection_type
        )));
    }
    debug!(count = criteria.len(), "Selection input loaded");
    Ok(criteria)
}

fn read_json_attribute(path: &Path, format: InputFormat, attribute: &str) -> CliResult<Vec<String>> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| CliError::Io(format!("Failed to read {}: {}", path.display(), e)))?;
    let document: Value = serde_json::from_str(&content).map_err(|e| {
        CliError::Validation(format!("Invalid JSON in {}: {}", path.display(), e))
    })?;

    let entities: Vec<&Value> = match (format, &document) {
        (InputFormat::JsonMap, Value::Object(map)) => map.values().collect(),
        (InputFormat::Json | InputFormat::JsonArray, Value::Array(items)) => items.iter().collect(),
        _ => {
            return Err(CliError::Validation(format!(
                "{} does not contain a {} document",
                path.display(),
                format
            )))
        }
    };

    Ok(entities
        .into_iter()
        .filter_map(|entity| match entity.get(attribute)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
        .collect())
}

fn read_csv_column(path: &Path, column: &str, delimiter: u8) -> CliResult<Vec<String>> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| CliError::Io(format!("Failed to read {}: {}", path.display(), e)))?;

    let index = reader
        .headers()?
        .iter()
        .position(|header| header == column)
        .ok_or_else(|| {
            CliError::Validation(format!(
                "Column '{}' not found in {}",
                column,
                path.display()
            ))
        })?;

    let mut values = Vec::new();
    for record in reader.records() {
        let record = record?;
        if let Some(value) = record.get(index) {
            values.push(value.to_string());
        }
    }
    Ok(values)
}
