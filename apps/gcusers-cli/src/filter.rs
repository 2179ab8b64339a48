//! Post-selection attribute filter
//!
//! Keeps the selected users whose attribute matches one of a set of glob
//! patterns. The attribute is a JSON pointer (`/division/name`) or a dotted
//! path (`division.name`).

use gcusers_engine::SelectionFilter;
use serde::Deserialize;
use serde_json::Value;

use crate::error::{CliError, CliResult};

/// Filter as written in the settings file.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct FilterSettings {
    pub attribute: String,
    pub values: Vec<String>,
    /// Drop matching users instead of keeping them.
    pub exclude: bool,
}

/// Filter on one user attribute
#[derive(Debug, Clone)]
pub struct AttributeFilter {
    pointer: String,
    patterns: Vec<String>,
    exclude: bool,
}

impl AttributeFilter {
    /// Build a filter from its settings
    pub fn from_settings(settings: &FilterSettings) -> CliResult<Self> {
        let attribute = settings.attribute.trim();
        if attribute.is_empty() {
            return Err(CliError::Validation(
                "postSelectionFilter.attribute cannot be empty".to_string(),
            ));
        }

        let patterns: Vec<String> = settings
            .values
            .iter()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .collect();
        if patterns.is_empty() {
            return Err(CliError::Validation(format!(
                "postSelectionFilter on '{}' has no values",
                attribute
            )));
        }

        Ok(Self {
            pointer: to_pointer(attribute),
            patterns,
            exclude: settings.exclude,
        })
    }

    pub fn pointer(&self) -> &str {
        &self.pointer
    }

    /// Check if an attribute value matches any pattern
    fn matches(&self, value: &Value) -> bool {
        match value {
            Value::String(s) => self.patterns.iter().any(|p| glob_match(p, s)),
            Value::Number(n) => self.matches_text(&n.to_string()),
            Value::Bool(b) => self.matches_text(&b.to_string()),
            Value::Array(items) => items.iter().any(|item| self.matches(item)),
            Value::Null | Value::Object(_) => false,
        }
    }

    fn matches_text(&self, text: &str) -> bool {
        self.patterns.iter().any(|p| glob_match(p, text))
    }
}

impl SelectionFilter for AttributeFilter {
    fn accept(&self, user: &Value) -> bool {
        let matched = user
            .pointer(&self.pointer)
            .is_some_and(|value| self.matches(value));
        matched != self.exclude
    }
}

/// Convert a dotted path into a JSON pointer
fn to_pointer(attribute: &str) -> String {
    if attribute.starts_with('/') {
        attribute.to_string()
    } else {
        attribute
            .split('.')
            .fold(String::new(), |mut pointer, segment| {
                pointer.push('/');
                pointer.push_str(segment);
                pointer
            })
    }
}

/// Simple glob pattern matching
///
/// Supports:
/// - `*` matches any sequence of characters
/// - `?` matches any single character
/// - Exact match otherwise
fn glob_match(pattern: &str, value: &str) -> bool {
    if !pattern.contains('*') && !pattern.contains('?') {
        return pattern == value;
    }

    let pattern: Vec<char> = pattern.chars().collect();
    let value: Vec<char> = value.chars().collect();

    let (mut pi, mut vi) = (0, 0);
    // Backtrack point for the last star
    let mut star: Option<(usize, usize)> = None;

    while vi < value.len() {
        if pi < pattern.len() && (pattern[pi] == '?' || pattern[pi] == value[vi]) {
            pi += 1;
            vi += 1;
        } else if pi < pattern.len() && pattern[pi] == '*' {
            star = Some((pi, vi));
            pi += 1;
        } else if let Some((star_pi, star_vi)) = star {
            pi = star_pi + 1;
            vi = star_vi + 1;
            star = Some((star_pi, star_vi + 1));
        } else {
            return false;
        }
    }

    pattern[pi..].iter().all(|c| *c == '*')
}
