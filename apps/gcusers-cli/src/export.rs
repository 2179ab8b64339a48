//! Export of selected users to JSON or CSV
//!
//! - `json`: transformed records as an array
//! - `csv`: header plus one transformed row per record
//! - `jsonArray`: raw records as an array
//! - `jsonMap`: raw records keyed by user id

use serde::Deserialize;
use serde_json::{Map, Value};
use std::ffi::OsString;
use std::fmt;
use std::io::Write;
use std::path::PathBuf;
use std::str::FromStr;
use tracing::{debug, info};

use crate::error::{CliError, CliResult};

/// Default export file base name
pub const DEFAULT_EXPORT_FILE: &str = "./GCExportUsersTool_Export_001";

/// Output format of an export
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(try_from = "String")]
pub enum ExportFormat {
    #[default]
    Json,
    Csv,
    JsonArray,
    JsonMap,
}

impl ExportFormat {
    /// File extension for this format
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Json | Self::JsonArray | Self::JsonMap => "json",
        }
    }
}

impl FromStr for ExportFormat {
    type Err = CliError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "json" => Ok(Self::Json),
            "csv" => Ok(Self::Csv),
            "jsonArray" => Ok(Self::JsonArray),
            "jsonMap" => Ok(Self::JsonMap),
            other => Err(CliError::Validation(format!(
                "Unsupported export format '{}'. Valid formats: json, csv, jsonArray, jsonMap",
                other
            ))),
        }
    }
}

impl TryFrom<String> for ExportFormat {
    type Error = CliError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Json => "json",
            Self::Csv => "csv",
            Self::JsonArray => "jsonArray",
            Self::JsonMap => "jsonMap",
        })
    }
}

/// Validated export parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportOptions {
    pub format: ExportFormat,
    /// File name without extension.
    pub file_base: PathBuf,
    pub delimiter: u8,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            format: ExportFormat::default(),
            file_base: PathBuf::from(DEFAULT_EXPORT_FILE),
            delimiter: b',',
        }
    }
}

impl ExportOptions {
    /// Output path: base name plus the format extension
    pub fn path(&self) -> PathBuf {
        let mut path = OsString::from(self.file_base.as_os_str());
        path.push(".");
        path.push(self.format.extension());
        PathBuf::from(path)
    }
}

/// Outcome of an export
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportSummary {
    pub written: usize,
    pub skipped: usize,
    pub path: PathBuf,
}

/// Per-record transformation applied by the `json` and `csv` formats
///
/// Returning `None` skips the record.
pub trait RecordTransform {
    fn to_json(&self, user: &Value) -> Option<Value>;

    fn csv_header(&self) -> Vec<String>;

    fn to_csv_row(&self, user: &Value) -> Option<Vec<String>>;
}

/// Pass-through JSON and a fixed set of CSV columns
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultTransform;

const DEFAULT_COLUMNS: [(&str, &str); 7] = [
    ("id", "/id"),
    ("email", "/email"),
    ("name", "/name"),
    ("title", "/title"),
    ("department", "/department"),
    ("state", "/state"),
    ("autoAnswer", "/acdAutoAnswer"),
];

impl RecordTransform for DefaultTransform {
    fn to_json(&self, user: &Value) -> Option<Value> {
        Some(user.clone())
    }

    fn csv_header(&self) -> Vec<String> {
        DEFAULT_COLUMNS
            .iter()
            .map(|(name, _)| name.to_string())
            .collect()
    }

    /// Rows need an id and an auto-answer value.
    fn to_csv_row(&self, user: &Value) -> Option<Vec<String>> {
        user.get("id")?;
        user.get("acdAutoAnswer")?;
        Some(
            DEFAULT_COLUMNS
                .iter()
                .map(|(_, pointer)| cell(user.pointer(pointer)))
                .collect(),
        )
    }
}

fn cell(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

/// Write `users` to the file named by `options`
pub fn export_users(
    users: &[Value],
    options: &ExportOptions,
    transform: &dyn RecordTransform,
) -> CliResult<ExportSummary> {
    let path = options.path();
    let file = std::fs::File::create(&path)
        .map_err(|e| CliError::Io(format!("Failed to create {}: {}", path.display(), e)))?;
    let mut writer = std::io::BufWriter::new(file);

    let (written, skipped) = write_users(users, options, transform, &mut writer)?;
    writer
        .flush()
        .map_err(|e| CliError::Io(format!("Failed to flush {}: {}", path.display(), e)))?;

    info!(
        format = %options.format,
        written = written,
        skipped = skipped,
        path = %path.display(),
        "Export completed"
    );
    Ok(ExportSummary {
        written,
        skipped,
        path,
    })
}

/// Write `users` in the configured format, returning (written, skipped)
pub fn write_users<W: Write>(
    users: &[Value],
    options: &ExportOptions,
    transform: &dyn RecordTransform,
    writer: W,
) -> CliResult<(usize, usize)> {
    match options.format {
        ExportFormat::Json => {
            let records: Vec<Value> = users.iter().filter_map(|u| transform.to_json(u)).collect();
            let counts = (records.len(), users.len() - records.len());
            write_json(&Value::Array(records), writer)?;
            Ok(counts)
        }
        ExportFormat::JsonArray => {
            write_json(&Value::Array(users.to_vec()), writer)?;
            Ok((users.len(), 0))
        }
        ExportFormat::JsonMap => {
            let map: Map<String, Value> = users
                .iter()
                .filter_map(|u| Some((u.get("id")?.as_str()?.to_string(), u.clone())))
                .collect();
            let counts = (map.len(), users.len() - map.len());
            write_json(&Value::Object(map), writer)?;
            Ok(counts)
        }
        ExportFormat::Csv => write_csv(users, options.delimiter, transform, writer),
    }
}

fn write_json<W: Write>(document: &Value, writer: W) -> CliResult<()> {
    serde_json::to_writer_pretty(writer, document)
        .map_err(|e| CliError::Io(format!("Failed to write JSON: {}", e)))
}

fn write_csv<W: Write>(
    users: &[Value],
    delimiter: u8,
    transform: &dyn RecordTransform,
    writer: W,
) -> CliResult<(usize, usize)> {
    let mut wtr = csv::WriterBuilder::new()
        .delimiter(delimiter)
        .from_writer(writer);
    wtr.write_record(transform.csv_header())?;

    let (mut written, mut skipped) = (0, 0);
    for user in users {
        match transform.to_csv_row(user) {
            Some(row) => {
                wtr.write_record(&row)?;
                written += 1;
            }
            None => {
                debug!("Record skipped by transform");
                skipped += 1;
            }
        }
    }

    wtr.flush()
        .map_err(|e| CliError::Io(format!("Failed to flush CSV: {}", e)))?;
    Ok((written, skipped))
}
