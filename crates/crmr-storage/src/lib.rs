//! Data-source abstraction for CRMR: composable read queries and the stores that run them.

use async_trait::async_trait;
use crmr_core::{schema_for, DataSource, EntitySchema, Row};
use serde::Serialize;
use serde_json::Value as JsonValue;
use thiserror::Error;

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::{render_sql, PgStore, SqlStatement};

pub const CRATE_NAME: &str = "crmr-storage";

/// Narrowing operation applied by a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Comparison {
    Eq,
    Neq,
    Ilike,
    Gt,
    Lt,
    Gte,
    Lte,
}

impl Comparison {
    pub fn sql_operator(&self) -> &'static str {
        match self {
            Comparison::Eq => "=",
            Comparison::Neq => "<>",
            Comparison::Ilike => "ILIKE",
            Comparison::Gt => ">",
            Comparison::Lt => "<",
            Comparison::Gte => ">=",
            Comparison::Lte => "<=",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Condition {
    pub field: String,
    pub comparison: Comparison,
    pub value: JsonValue,
}

/// Read-only projection over one data source, narrowed by ANDed conditions.
///
/// Built functionally: every narrowing call consumes the query and returns the
/// extended one.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Query {
    pub data_source: DataSource,
    pub fields: Vec<String>,
    pub conditions: Vec<Condition>,
}

pub fn select<I, S>(data_source: DataSource, fields: I) -> Query
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    Query {
        data_source,
        fields: fields.into_iter().map(Into::into).collect(),
        conditions: Vec::new(),
    }
}

/// Escape `\`, `%` and `_` so `text` matches literally inside an ILIKE pattern.
pub fn like_escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        if matches!(ch, '\\' | '%' | '_') {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

impl Query {
    pub fn eq(self, field: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.narrow(Comparison::Eq, field, value)
    }

    pub fn neq(self, field: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.narrow(Comparison::Neq, field, value)
    }

    /// Case-insensitive LIKE; `value` is the full pattern including `%` wildcards.
    /// A backslash makes the next pattern character literal.
    pub fn ilike(self, field: impl Into<String>, pattern: impl Into<JsonValue>) -> Self {
        self.narrow(Comparison::Ilike, field, pattern)
    }

    pub fn gt(self, field: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.narrow(Comparison::Gt, field, value)
    }

    pub fn lt(self, field: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.narrow(Comparison::Lt, field, value)
    }

    pub fn gte(self, field: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.narrow(Comparison::Gte, field, value)
    }

    pub fn lte(self, field: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.narrow(Comparison::Lte, field, value)
    }

    fn narrow(
        mut self,
        comparison: Comparison,
        field: impl Into<String>,
        value: impl Into<JsonValue>,
    ) -> Self {
        self.conditions.push(Condition {
            field: field.into(),
            comparison,
            value: value.into(),
        });
        self
    }

    pub fn schema(&self) -> &'static EntitySchema {
        schema_for(self.data_source)
    }

    /// Reject projections or conditions naming columns the entity does not have.
    pub fn check_columns(&self) -> Result<(), QueryError> {
        let schema = self.schema();
        let referenced = self
            .fields
            .iter()
            .chain(self.conditions.iter().map(|c| &c.field));
        for field in referenced {
            if !schema.has_column(field) {
                return Err(QueryError::UnknownField {
                    data_source: self.data_source,
                    field: field.clone(),
                });
            }
        }
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("field `{field}` does not exist on {data_source}")]
    UnknownField {
        data_source: DataSource,
        field: String,
    },
    #[error("database error: {0}")]
    Backend(#[from] sqlx::Error),
    #[error("malformed row from {data_source}: {message}")]
    MalformedRow {
        data_source: DataSource,
        message: String,
    },
}

/// A backend able to run a [`Query`] and return matching rows.
///
/// Row order is whatever the backend yields.
#[async_trait]
pub trait DataStore: Send + Sync {
    fn name(&self) -> &'static str;

    async fn execute(&self, query: &Query) -> Result<Vec<Row>, QueryError>;
}
