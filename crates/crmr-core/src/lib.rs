//! Core report model for CRMR: data sources, report configs and their validation.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;

pub mod schema;

pub use schema::{schema_for, ColumnDef, ColumnType, EntitySchema, TENANT_COLUMN};

pub const CRATE_NAME: &str = "crmr-core";

/// A single record returned by a data source.
pub type Row = serde_json::Map<String, JsonValue>;

/// Logical entity collections a report can be built over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataSource {
    Leads,
    Accounts,
    Contacts,
    Projects,
    Tasks,
    Quotes,
    Invoices,
}

impl DataSource {
    pub const ALL: [DataSource; 7] = [
        DataSource::Leads,
        DataSource::Accounts,
        DataSource::Contacts,
        DataSource::Projects,
        DataSource::Tasks,
        DataSource::Quotes,
        DataSource::Invoices,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DataSource::Leads => "leads",
            DataSource::Accounts => "accounts",
            DataSource::Contacts => "contacts",
            DataSource::Projects => "projects",
            DataSource::Tasks => "tasks",
            DataSource::Quotes => "quotes",
            DataSource::Invoices => "invoices",
        }
    }
}

impl fmt::Display for DataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DataSource {
    type Err = ConfigValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        DataSource::ALL
            .into_iter()
            .find(|ds| ds.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| ConfigValidationError::UnknownDataSource(s.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterOperator {
    Equals,
    NotEquals,
    Contains,
    GreaterThan,
    LessThan,
    GreaterThanOrEqual,
    LessThanOrEqual,
}

impl FilterOperator {
    pub const ALL: [FilterOperator; 7] = [
        FilterOperator::Equals,
        FilterOperator::NotEquals,
        FilterOperator::Contains,
        FilterOperator::GreaterThan,
        FilterOperator::LessThan,
        FilterOperator::GreaterThanOrEqual,
        FilterOperator::LessThanOrEqual,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FilterOperator::Equals => "equals",
            FilterOperator::NotEquals => "not_equals",
            FilterOperator::Contains => "contains",
            FilterOperator::GreaterThan => "greater_than",
            FilterOperator::LessThan => "less_than",
            FilterOperator::GreaterThanOrEqual => "greater_than_or_equal",
            FilterOperator::LessThanOrEqual => "less_than_or_equal",
        }
    }
}

impl fmt::Display for FilterOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FilterOperator {
    type Err = ConfigValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        FilterOperator::ALL
            .into_iter()
            .find(|op| op.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| ConfigValidationError::UnknownOperator(s.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregationType {
    Count,
    Sum,
    Avg,
    Min,
    Max,
}

impl AggregationType {
    pub const ALL: [AggregationType; 5] = [
        AggregationType::Count,
        AggregationType::Sum,
        AggregationType::Avg,
        AggregationType::Min,
        AggregationType::Max,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AggregationType::Count => "count",
            AggregationType::Sum => "sum",
            AggregationType::Avg => "avg",
            AggregationType::Min => "min",
            AggregationType::Max => "max",
        }
    }

    /// Whether the aggregation reads the per-row amount rather than counting rows.
    pub fn is_numeric(&self) -> bool {
        !matches!(self, AggregationType::Count)
    }
}

impl fmt::Display for AggregationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AggregationType {
    type Err = ConfigValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        AggregationType::ALL
            .into_iter()
            .find(|agg| agg.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| ConfigValidationError::UnknownAggregationType(s.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterPredicate {
    pub field: String,
    pub operator: FilterOperator,
    #[serde(default)]
    pub value: JsonValue,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grouping {
    pub field: String,
    pub aggregation_type: AggregationType,
}

/// Validated, normalized description of one report run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportConfig {
    pub data_source: DataSource,
    pub selected_fields: Vec<String>,
    #[serde(default)]
    pub filters: Vec<FilterPredicate>,
    #[serde(default)]
    pub grouping: Option<Grouping>,
}

/// Wire form of a report config as sent by clients and stored in templates.
///
/// Names are kept as plain strings so unknown data sources, operators and
/// aggregation types are reported as [`ConfigValidationError`] rather than as
/// deserialization failures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportConfigRequest {
    pub data_source: String,
    #[serde(default)]
    pub selected_fields: Vec<String>,
    #[serde(default)]
    pub filters: Vec<FilterPredicateRequest>,
    #[serde(default)]
    pub grouping: Option<GroupingRequest>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterPredicateRequest {
    pub field: String,
    pub operator: String,
    #[serde(default)]
    pub value: JsonValue,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupingRequest {
    pub field: String,
    pub aggregation_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigValidationError {
    #[error("report must select at least one field")]
    EmptySelectedFields,
    #[error("unknown data source `{0}`")]
    UnknownDataSource(String),
    #[error("unknown filter operator `{0}`")]
    UnknownOperator(String),
    #[error("unknown aggregation type `{0}`")]
    UnknownAggregationType(String),
    #[error("blank field name in {0}")]
    BlankField(&'static str),
    /// The request could not be decoded into a report config at all.
    #[error("malformed report config: {0}")]
    Malformed(String),
}

impl ReportConfigRequest {
    /// Validate and normalize into a [`ReportConfig`].
    ///
    /// Field names are trimmed and selected fields are deduplicated keeping the
    /// first occurrence. The grouping field is not required to be selected.
    pub fn validate(&self) -> Result<ReportConfig, ConfigValidationError> {
        let data_source: DataSource = self.data_source.parse()?;

        let mut seen = HashSet::new();
        let mut selected_fields = Vec::with_capacity(self.selected_fields.len());
        for field in &self.selected_fields {
            let field = non_blank(field, "selected fields")?;
            if seen.insert(field.clone()) {
                selected_fields.push(field);
            }
        }
        if selected_fields.is_empty() {
            return Err(ConfigValidationError::EmptySelectedFields);
        }

        let filters = self
            .filters
            .iter()
            .map(|filter| -> Result<FilterPredicate, ConfigValidationError> {
                Ok(FilterPredicate {
                    field: non_blank(&filter.field, "filters")?,
                    operator: filter.operator.parse()?,
                    value: filter.value.clone(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let grouping = match &self.grouping {
            Some(grouping) => Some(Grouping {
                field: non_blank(&grouping.field, "grouping")?,
                aggregation_type: grouping.aggregation_type.parse()?,
            }),
            None => None,
        };

        Ok(ReportConfig {
            data_source,
            selected_fields,
            filters,
            grouping,
        })
    }
}

fn non_blank(field: &str, context: &'static str) -> Result<String, ConfigValidationError> {
    let trimmed = field.trim();
    if trimmed.is_empty() {
        return Err(ConfigValidationError::BlankField(context));
    }
    Ok(trimmed.to_string())
}

impl From<&ReportConfig> for ReportConfigRequest {
    fn from(config: &ReportConfig) -> Self {
        Self {
            data_source: config.data_source.as_str().to_string(),
            selected_fields: config.selected_fields.clone(),
            filters: config
                .filters
                .iter()
                .map(|f| FilterPredicateRequest {
                    field: f.field.clone(),
                    operator: f.operator.as_str().to_string(),
                    value: f.value.clone(),
                })
                .collect(),
            grouping: config.grouping.as_ref().map(|g| GroupingRequest {
                field: g.field.clone(),
                aggregation_type: g.aggregation_type.as_str().to_string(),
            }),
        }
    }
}

/// One aggregated group. `value` may be NaN for numeric aggregations over a
/// group without usable amounts; JSON output renders that as `null`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupedValue {
    pub group_key: String,
    pub value: f64,
}

/// Textual form of a scalar JSON value, as used for group keys, LIKE patterns
/// and SQL parameters. Returns `None` for null.
pub fn value_text(value: &JsonValue) -> Option<String> {
    match value {
        JsonValue::Null => None,
        JsonValue::String(s) => Some(s.clone()),
        JsonValue::Bool(b) => Some(b.to_string()),
        JsonValue::Number(n) => Some(match n.as_f64() {
            Some(f) if n.is_f64() && f.is_finite() && f.fract() == 0.0 && f.abs() < 1e15 => {
                format!("{}", f as i64)
            }
            _ => n.to_string(),
        }),
        other => Some(other.to_string()),
    }
}

/// Numeric reading of a JSON value: numbers directly, strings parsed after trimming.
pub fn value_number(value: &JsonValue) -> Option<f64> {
    match value {
        JsonValue::Number(n) => n.as_f64(),
        JsonValue::String(s) => s.trim().parse::<f64>().ok().filter(|f| !f.is_nan()),
        _ => None,
    }
}
