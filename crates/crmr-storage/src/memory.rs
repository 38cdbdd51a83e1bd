//! In-process store over fixture rows. Used for demos, local runs and tests.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};

use anyhow::{bail, Context};
use async_trait::async_trait;
use crmr_core::{value_number, value_text, ColumnType, DataSource, EntitySchema, Row};
use serde_json::Value as JsonValue;
use tracing::debug;

use crate::{Comparison, Condition, DataStore, Query, QueryError};

#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: HashMap<DataSource, Vec<Row>>,
    calls: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rows(mut self, data_source: DataSource, rows: Vec<Row>) -> Self {
        self.insert_rows(data_source, rows);
        self
    }

    pub fn insert_rows(&mut self, data_source: DataSource, rows: Vec<Row>) {
        self.tables.entry(data_source).or_default().extend(rows);
    }

    /// Load `<dir>/<data_source>.json` for every data source that has a file.
    /// Each file holds a JSON array of objects.
    pub fn load_dir(dir: impl AsRef<Path>) -> anyhow::Result<Self> {
        let dir = dir.as_ref();
        let mut store = Self::new();
        for data_source in DataSource::ALL {
            let path = dir.join(format!("{data_source}.json"));
            if !path.exists() {
                continue;
            }
            let text = fs::read_to_string(&path)
                .with_context(|| format!("reading {}", path.display()))?;
            let values: Vec<JsonValue> = serde_json::from_str(&text)
                .with_context(|| format!("parsing {}", path.display()))?;
            let mut rows = Vec::with_capacity(values.len());
            for (idx, value) in values.into_iter().enumerate() {
                match value {
                    JsonValue::Object(row) => rows.push(row),
                    other => bail!(
                        "{}: entry {idx} is not an object ({other})",
                        path.display()
                    ),
                }
            }
            store.insert_rows(data_source, rows);
        }
        Ok(store)
    }

    /// Number of queries executed so far.
    pub fn call_count(&self) -> usize {
        self.calls.load(AtomicOrdering::SeqCst)
    }
}

#[async_trait]
impl DataStore for MemoryStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn execute(&self, query: &Query) -> Result<Vec<Row>, QueryError> {
        self.calls.fetch_add(1, AtomicOrdering::SeqCst);
        query.check_columns()?;

        let Some(rows) = self.tables.get(&query.data_source) else {
            return Ok(Vec::new());
        };
        let schema = query.schema();
        let out: Vec<Row> = rows
            .iter()
            .filter(|row| query.conditions.iter().all(|c| matches(schema, row, c)))
            .map(|row| project(row, &query.fields))
            .collect();
        debug!(
            data_source = %query.data_source,
            scanned = rows.len(),
            matched = out.len(),
            "memory store query"
        );
        Ok(out)
    }
}

fn project(row: &Row, fields: &[String]) -> Row {
    fields
        .iter()
        .map(|f| (f.clone(), row.get(f).cloned().unwrap_or(JsonValue::Null)))
        .collect()
}

/// SQL semantics: a null on either side never matches.
fn matches(schema: &EntitySchema, row: &Row, condition: &Condition) -> bool {
    let Some(column) = schema.column(&condition.field) else {
        return false;
    };
    let Some(actual) = row.get(&condition.field).filter(|v| !v.is_null()) else {
        return false;
    };
    if condition.value.is_null() {
        return false;
    }
    let expected = &condition.value;
    let ordering = || compare(column.column_type, actual, expected);
    match condition.comparison {
        Comparison::Eq => ordering() == Some(Ordering::Equal),
        Comparison::Neq => ordering().is_some_and(|o| o != Ordering::Equal),
        Comparison::Ilike => match (value_text(actual), value_text(expected)) {
            (Some(text), Some(pattern)) => like_ignore_case(&text, &pattern),
            _ => false,
        },
        Comparison::Gt => ordering() == Some(Ordering::Greater),
        Comparison::Lt => ordering() == Some(Ordering::Less),
        Comparison::Gte => matches!(ordering(), Some(Ordering::Greater | Ordering::Equal)),
        Comparison::Lte => matches!(ordering(), Some(Ordering::Less | Ordering::Equal)),
    }
}

/// Compare as the column's type would in Postgres. `None` when either side
/// cannot be read as that type.
fn compare(column_type: ColumnType, actual: &JsonValue, expected: &JsonValue) -> Option<Ordering> {
    match column_type {
        ColumnType::Numeric | ColumnType::Integer => {
            value_number(actual)?.partial_cmp(&value_number(expected)?)
        }
        ColumnType::Boolean => Some(value_bool(actual)?.cmp(&value_bool(expected)?)),
        ColumnType::Uuid => Some(
            value_text(actual)?
                .to_lowercase()
                .cmp(&value_text(expected)?.to_lowercase()),
        ),
        ColumnType::Text | ColumnType::Date | ColumnType::Timestamp => {
            Some(value_text(actual)?.cmp(&value_text(expected)?))
        }
    }
}

fn value_bool(value: &JsonValue) -> Option<bool> {
    match value {
        JsonValue::Bool(b) => Some(*b),
        JsonValue::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "t" | "yes" | "y" | "on" | "1" => Some(true),
            "false" | "f" | "no" | "n" | "off" | "0" => Some(false),
            _ => None,
        },
        JsonValue::Number(n) => match n.as_i64() {
            Some(1) => Some(true),
            Some(0) => Some(false),
            _ => None,
        },
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum LikeToken {
    AnyRun,
    AnyOne,
    Literal(char),
}

/// `%` matches any run of characters, `_` exactly one, `\` escapes the next
/// character. A trailing backslash is literal.
fn like_tokens(pattern: &str) -> Vec<LikeToken> {
    let mut tokens = Vec::new();
    let mut chars = pattern.chars();
    while let Some(ch) = chars.next() {
        tokens.push(match ch {
            '\\' => LikeToken::Literal(chars.next().unwrap_or('\\')),
            '%' => LikeToken::AnyRun,
            '_' => LikeToken::AnyOne,
            other => LikeToken::Literal(other),
        });
    }
    tokens
}

fn like_ignore_case(text: &str, pattern: &str) -> bool {
    let text: Vec<char> = text.to_lowercase().chars().collect();
    let pattern = like_tokens(&pattern.to_lowercase());

    // dp[j]: pattern[..j] matches text[..i]
    let mut dp = vec![false; pattern.len() + 1];
    dp[0] = true;
    for j in 1..=pattern.len() {
        dp[j] = dp[j - 1] && pattern[j - 1] == LikeToken::AnyRun;
    }
    for ch in &text {
        let mut prev_diag = dp[0];
        dp[0] = false;
        for j in 1..=pattern.len() {
            let above = dp[j];
            dp[j] = match pattern[j - 1] {
                LikeToken::AnyRun => dp[j - 1] || above,
                LikeToken::AnyOne => prev_diag,
                LikeToken::Literal(p) => prev_diag && p == *ch,
            };
            prev_diag = above;
        }
    }
    dp[pattern.len()]
}
