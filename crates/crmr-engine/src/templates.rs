//! Named starter reports that clients clone into fresh configs.

use std::path::Path;

use anyhow::Context;
use crmr_core::{
    ConfigValidationError, FilterPredicateRequest, GroupingRequest, ReportConfig,
    ReportConfigRequest,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChartHint {
    Table,
    Bar,
    Line,
    Pie,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportTemplate {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub chart_hint: Option<ChartHint>,
    pub config: ReportConfigRequest,
}

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("report template `{0}` not found")]
    NotFound(String),
    #[error("report template `{id}` is invalid: {source}")]
    Invalid {
        id: String,
        #[source]
        source: ConfigValidationError,
    },
}

#[derive(Debug, Clone, Deserialize)]
struct TemplatesFile {
    #[allow(dead_code)]
    version: u32,
    #[serde(default)]
    templates: Vec<ReportTemplate>,
}

/// Immutable set of templates, looked up by id.
#[derive(Debug, Clone, Default)]
pub struct TemplateCatalog {
    templates: Vec<ReportTemplate>,
}

impl TemplateCatalog {
    pub fn builtin() -> Self {
        Self {
            templates: builtin_templates(),
        }
    }

    pub fn from_yaml_str(text: &str) -> anyhow::Result<Self> {
        let file: TemplatesFile = serde_yaml::from_str(text).context("parsing report templates")?;
        for template in &file.templates {
            template.config.validate().map_err(|source| TemplateError::Invalid {
                id: template.id.clone(),
                source,
            })?;
        }
        Ok(Self {
            templates: file.templates,
        })
    }

    pub fn load_yaml(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        Self::from_yaml_str(&text).with_context(|| format!("loading {}", path.display()))
    }

    /// Add `other`'s templates; an id already present is replaced in place.
    pub fn merge(mut self, other: TemplateCatalog) -> Self {
        for template in other.templates {
            match self.templates.iter_mut().find(|t| t.id == template.id) {
                Some(existing) => *existing = template,
                None => self.templates.push(template),
            }
        }
        self
    }

    pub fn list(&self) -> &[ReportTemplate] {
        &self.templates
    }

    pub fn get(&self, id: &str) -> Option<&ReportTemplate> {
        self.templates.iter().find(|t| t.id == id)
    }

    /// Clone a template's config into a fresh, validated [`ReportConfig`].
    pub fn instantiate(&self, id: &str) -> Result<ReportConfig, TemplateError> {
        let template = self
            .get(id)
            .ok_or_else(|| TemplateError::NotFound(id.to_string()))?;
        template
            .config
            .validate()
            .map_err(|source| TemplateError::Invalid {
                id: template.id.clone(),
                source,
            })
    }
}

#[allow(clippy::too_many_arguments)]
fn starter(
    id: &str,
    name: &str,
    description: &str,
    category: &str,
    chart_hint: ChartHint,
    data_source: &str,
    fields: &[&str],
    filters: Vec<FilterPredicateRequest>,
    grouping: Option<(&str, &str)>,
) -> ReportTemplate {
    ReportTemplate {
        id: id.to_string(),
        name: name.to_string(),
        description: description.to_string(),
        category: Some(category.to_string()),
        chart_hint: Some(chart_hint),
        config: ReportConfigRequest {
            data_source: data_source.to_string(),
            selected_fields: fields.iter().map(|f| f.to_string()).collect(),
            filters,
            grouping: grouping.map(|(field, aggregation_type)| GroupingRequest {
                field: field.to_string(),
                aggregation_type: aggregation_type.to_string(),
            }),
        },
    }
}

fn filter(field: &str, operator: &str, value: serde_json::Value) -> FilterPredicateRequest {
    FilterPredicateRequest {
        field: field.to_string(),
        operator: operator.to_string(),
        value,
    }
}

fn builtin_templates() -> Vec<ReportTemplate> {
    vec![
        starter(
            "leads-by-status",
            "Leads by status",
            "Number of leads in each pipeline stage.",
            "sales",
            ChartHint::Pie,
            "leads",
            &["name", "status", "source"],
            vec![],
            Some(("status", "count")),
        ),
        starter(
            "pipeline-by-source",
            "Pipeline value by lead source",
            "Total lead amount per acquisition channel, excluding lost leads.",
            "sales",
            ChartHint::Bar,
            "leads",
            &["source", "amount"],
            vec![filter("status", "not_equals", json!("lost"))],
            Some(("source", "sum")),
        ),
        starter(
            "revenue-by-invoice-status",
            "Revenue by invoice status",
            "Invoiced totals split by payment status.",
            "finance",
            ChartHint::Bar,
            "invoices",
            &["status", "total_amount"],
            vec![],
            Some(("status", "sum")),
        ),
        starter(
            "paid-invoices",
            "Paid invoices",
            "All invoices marked as paid.",
            "finance",
            ChartHint::Table,
            "invoices",
            &["invoice_number", "status", "total_amount", "paid_at"],
            vec![filter("status", "equals", json!("paid"))],
            None,
        ),
        starter(
            "avg-quote-by-status",
            "Average quote value by status",
            "Mean quote total for each quote status.",
            "finance",
            ChartHint::Bar,
            "quotes",
            &["status", "total"],
            vec![],
            Some(("status", "avg")),
        ),
        starter(
            "projects-by-status",
            "Projects by status",
            "Project count per delivery status.",
            "operations",
            ChartHint::Pie,
            "projects",
            &["name", "status"],
            vec![],
            Some(("status", "count")),
        ),
        starter(
            "open-tasks-by-assignee",
            "Open tasks by assignee",
            "Tasks not yet done, counted per assignee.",
            "operations",
            ChartHint::Bar,
            "tasks",
            &["title", "assigned_to", "status"],
            vec![filter("status", "not_equals", json!("done"))],
            Some(("assigned_to", "count")),
        ),
    ]
}
