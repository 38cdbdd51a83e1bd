//! Turns a validated [`ReportConfig`] into a store [`Query`].

use crmr_core::{value_text, FilterOperator, FilterPredicate, ReportConfig};
use crmr_storage::{like_escape, select, Query, QueryError};

/// Build the query for `config`, scoped to `tenant` when one is given.
///
/// Conditions are ANDed: tenant first, then filters in config order. When the
/// config groups by a known column that was not selected, the projection is
/// widened with that column so group keys are observable.
pub fn compile(config: &ReportConfig, tenant: Option<&str>) -> Result<Query, QueryError> {
    let schema = crmr_core::schema_for(config.data_source);

    let mut fields = config.selected_fields.clone();
    if let Some(grouping) = &config.grouping {
        if schema.has_column(&grouping.field) && !fields.contains(&grouping.field) {
            fields.push(grouping.field.clone());
        }
    }

    let mut query = select(config.data_source, fields);
    if let Some(tenant) = tenant.map(str::trim).filter(|t| !t.is_empty()) {
        query = query.eq(schema.tenant_column, tenant);
    }
    for predicate in &config.filters {
        query = apply_predicate(query, predicate);
    }

    query.check_columns()?;
    Ok(query)
}

fn apply_predicate(query: Query, predicate: &FilterPredicate) -> Query {
    let field = predicate.field.as_str();
    let value = predicate.value.clone();
    match predicate.operator {
        FilterOperator::Equals => query.eq(field, value),
        FilterOperator::NotEquals => query.neq(field, value),
        FilterOperator::Contains => {
            let needle = value_text(&value).unwrap_or_default();
            query.ilike(field, format!("%{}%", like_escape(&needle)))
        }
        FilterOperator::GreaterThan => query.gt(field, value),
        FilterOperator::LessThan => query.lt(field, value),
        FilterOperator::GreaterThanOrEqual => query.gte(field, value),
        FilterOperator::LessThanOrEqual => query.lte(field, value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crmr_core::{AggregationType, DataSource, Grouping};
    use serde_json::json;

    fn config(data_source: DataSource, fields: &[&str]) -> ReportConfig {
        ReportConfig {
            data_source,
            selected_fields: fields.iter().map(|f| f.to_string()).collect(),
            filters: vec![],
            grouping: None,
        }
    }

    fn predicate(field: &str, operator: FilterOperator, value: serde_json::Value) -> FilterPredicate {
        FilterPredicate {
            field: field.into(),
            operator,
            value,
        }
    }

    #[test]
    fn paid_invoices_compile_to_a_single_equality() {
        let mut cfg = config(DataSource::Invoices, &["invoice_number", "status", "total_amount"]);
        cfg.filters
            .push(predicate("status", FilterOperator::Equals, json!("paid")));

        let query = compile(&cfg, None).unwrap();
        let expected = select(DataSource::Invoices, ["invoice_number", "status", "total_amount"])
            .eq("status", "paid");
        assert_eq!(query, expected);
    }

    #[test]
    fn every_operator_maps_to_one_builder_call() {
        let mut cfg = config(DataSource::Quotes, &["id"]);
        cfg.filters = vec![
            predicate("status", FilterOperator::NotEquals, json!("draft")),
            predicate("quote_number", FilterOperator::Contains, json!("Q-26")),
            predicate("total", FilterOperator::GreaterThan, json!(10)),
            predicate("total", FilterOperator::LessThan, json!(900)),
            predicate("valid_until", FilterOperator::GreaterThanOrEqual, json!("2026-01-01")),
            predicate("valid_until", FilterOperator::LessThanOrEqual, json!("2026-12-31")),
        ];

        let query = compile(&cfg, None).unwrap();
        let expected = select(DataSource::Quotes, ["id"])
            .neq("status", "draft")
            .ilike("quote_number", "%Q-26%")
            .gt("total", 10)
            .lt("total", 900)
            .gte("valid_until", "2026-01-01")
            .lte("valid_until", "2026-12-31");
        assert_eq!(query, expected);
    }

    #[test]
    fn tenant_scope_comes_before_filters() {
        let mut cfg = config(DataSource::Leads, &["name"]);
        cfg.filters
            .push(predicate("status", FilterOperator::Equals, json!("new")));

        let query = compile(&cfg, Some("tenant-1")).unwrap();
        let expected = select(DataSource::Leads, ["name"])
            .eq("company_id", "tenant-1")
            .eq("status", "new");
        assert_eq!(query, expected);

        let unscoped = compile(&cfg, Some("  ")).unwrap();
        assert_eq!(unscoped.conditions.len(), 1);
    }

    #[test]
    fn contains_escapes_like_wildcards_in_the_value() {
        let mut cfg = config(DataSource::Leads, &["name"]);
        cfg.filters
            .push(predicate("name", FilterOperator::Contains, json!("a_c 100%")));
        let query = compile(&cfg, None).unwrap();
        assert_eq!(query.conditions[0].value, json!(r"%a\_c 100\%%"));
    }

    #[test]
    fn filters_on_unknown_fields_are_query_errors() {
        let mut cfg = config(DataSource::Leads, &["name"]);
        cfg.filters
            .push(predicate("total_amount", FilterOperator::GreaterThan, json!(1)));
        let err = compile(&cfg, None).unwrap_err();
        assert!(matches!(err, QueryError::UnknownField { field, .. } if field == "total_amount"));
    }

    #[test]
    fn grouping_field_widens_projection_only_when_known() {
        let mut cfg = config(DataSource::Leads, &["name"]);
        cfg.grouping = Some(Grouping {
            field: "status".into(),
            aggregation_type: AggregationType::Count,
        });
        assert_eq!(compile(&cfg, None).unwrap().fields, vec!["name", "status"]);

        cfg.grouping = Some(Grouping {
            field: "region".into(),
            aggregation_type: AggregationType::Count,
        });
        assert_eq!(compile(&cfg, None).unwrap().fields, vec!["name"]);
    }
}
