//! In-memory grouping and aggregation over returned rows.

use std::collections::HashMap;

use crmr_core::{value_number, value_text, AggregationType, GroupedValue, Grouping, Row};
use serde::Serialize;
use serde_json::Value as JsonValue;

/// Fields consulted, in order, for the per-row amount.
pub const AMOUNT_FIELDS: [&str; 3] = ["amount", "total", "total_amount"];

/// Group key used for rows whose grouping field is null or missing.
pub const UNKNOWN_GROUP: &str = "Unknown";

/// Non-fatal note attached to a grouped result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregationWarning {
    pub group_key: String,
    pub aggregation_type: AggregationType,
    pub message: String,
}

pub fn group_key(row: &Row, field: &str) -> String {
    row.get(field)
        .and_then(value_text)
        .unwrap_or_else(|| UNKNOWN_GROUP.to_string())
}

/// Amount of one row. Null and blank-string fields count as absent, and a row
/// with none of [`AMOUNT_FIELDS`] present counts as `0`. `None` means the first
/// present field could not be read as a number.
pub fn row_amount(row: &Row) -> Option<f64> {
    match AMOUNT_FIELDS
        .iter()
        .find_map(|f| row.get(*f).filter(|v| !is_absent(v)))
    {
        Some(value) => value_number(value),
        None => Some(0.0),
    }
}

fn is_absent(value: &JsonValue) -> bool {
    match value {
        JsonValue::Null => true,
        JsonValue::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

struct Bucket {
    key: String,
    rows: usize,
    amounts: Vec<f64>,
}

/// Group `rows` by `grouping.field` and aggregate each group.
///
/// Groups come out in first-seen order. Numeric aggregations skip rows whose
/// amount is unreadable; a group with no readable amount sums to `0` and
/// yields NaN for avg, min and max.
pub fn aggregate(rows: &[Row], grouping: &Grouping) -> Vec<GroupedValue> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut buckets: Vec<Bucket> = Vec::new();

    for row in rows {
        let key = group_key(row, &grouping.field);
        let slot = *index.entry(key.clone()).or_insert_with(|| {
            buckets.push(Bucket {
                key,
                rows: 0,
                amounts: Vec::new(),
            });
            buckets.len() - 1
        });
        let bucket = &mut buckets[slot];
        bucket.rows += 1;
        if grouping.aggregation_type.is_numeric() {
            if let Some(amount) = row_amount(row) {
                bucket.amounts.push(amount);
            }
        }
    }

    buckets
        .into_iter()
        .map(|bucket| GroupedValue {
            value: bucket_value(&bucket, grouping.aggregation_type),
            group_key: bucket.key,
        })
        .collect()
}

fn bucket_value(bucket: &Bucket, aggregation: AggregationType) -> f64 {
    let amounts = &bucket.amounts;
    match aggregation {
        AggregationType::Count => bucket.rows as f64,
        AggregationType::Sum => amounts.iter().sum(),
        AggregationType::Avg if amounts.is_empty() => f64::NAN,
        AggregationType::Avg => amounts.iter().sum::<f64>() / amounts.len() as f64,
        AggregationType::Min if amounts.is_empty() => f64::NAN,
        AggregationType::Min => amounts.iter().copied().fold(f64::INFINITY, f64::min),
        AggregationType::Max if amounts.is_empty() => f64::NAN,
        AggregationType::Max => amounts.iter().copied().fold(f64::NEG_INFINITY, f64::max),
    }
}

/// One warning per group whose aggregated value is NaN.
pub fn nan_warnings(groups: &[GroupedValue], aggregation: AggregationType) -> Vec<AggregationWarning> {
    groups
        .iter()
        .filter(|g| g.value.is_nan())
        .map(|g| AggregationWarning {
            group_key: g.group_key.clone(),
            aggregation_type: aggregation,
            message: format!(
                "no numeric value in {} for group `{}`",
                AMOUNT_FIELDS.join("/"),
                g.group_key
            ),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value as JsonValue};

    fn rows(values: JsonValue) -> Vec<Row> {
        values
            .as_array()
            .expect("array")
            .iter()
            .map(|v| v.as_object().expect("object").clone())
            .collect()
    }

    fn grouping(field: &str, aggregation_type: AggregationType) -> Grouping {
        Grouping {
            field: field.into(),
            aggregation_type,
        }
    }

    fn pairs(groups: &[GroupedValue]) -> Vec<(&str, f64)> {
        groups.iter().map(|g| (g.group_key.as_str(), g.value)).collect()
    }

    #[test]
    fn count_by_status_keeps_first_seen_order() {
        let input = rows(json!([
            {"status": "new"},
            {"status": "new"},
            {"status": "qualified"}
        ]));
        let out = aggregate(&input, &grouping("status", AggregationType::Count));
        assert_eq!(pairs(&out), vec![("new", 2.0), ("qualified", 1.0)]);
    }

    #[test]
    fn counts_always_add_up_to_row_count() {
        let input = rows(json!([
            {"status": "won"},
            {"status": null},
            {},
            {"status": "lost"},
            {"status": "won"},
            {"status": 3}
        ]));
        let out = aggregate(&input, &grouping("status", AggregationType::Count));
        let total: f64 = out.iter().map(|g| g.value).sum();
        assert_eq!(total as usize, input.len());
        assert_eq!(
            pairs(&out),
            vec![("won", 2.0), ("Unknown", 2.0), ("lost", 1.0), ("3", 1.0)]
        );
    }

    #[test]
    fn sum_reads_string_amounts() {
        let input = rows(json!([
            {"kind": "all", "total_amount": "100"},
            {"kind": "all", "total_amount": "50"}
        ]));
        let out = aggregate(&input, &grouping("kind", AggregationType::Sum));
        assert_eq!(pairs(&out), vec![("all", 150.0)]);
    }

    #[test]
    fn amount_precedence_and_absence() {
        let input = rows(json!([
            {"g": "x", "amount": 5, "total": 100, "total_amount": 1000},
            {"g": "x", "amount": null, "total": 7},
            {"g": "x"}
        ]));
        assert_eq!(row_amount(&input[0]), Some(5.0));
        assert_eq!(row_amount(&input[1]), Some(7.0));
        assert_eq!(row_amount(&input[2]), Some(0.0));

        let out = aggregate(&input, &grouping("g", AggregationType::Avg));
        assert_eq!(pairs(&out), vec![("x", 4.0)]);
        let out = aggregate(&input, &grouping("g", AggregationType::Min));
        assert_eq!(pairs(&out), vec![("x", 0.0)]);
        let out = aggregate(&input, &grouping("g", AggregationType::Max));
        assert_eq!(pairs(&out), vec![("x", 7.0)]);
    }

    #[test]
    fn blank_string_amounts_count_as_absent() {
        let input = rows(json!([
            {"g": "x", "amount": "", "total": "12.5"},
            {"g": "x", "total_amount": "   "},
            {"g": "x", "amount": 4}
        ]));
        assert_eq!(row_amount(&input[0]), Some(12.5));
        assert_eq!(row_amount(&input[1]), Some(0.0));

        let out = aggregate(&input, &grouping("g", AggregationType::Avg));
        assert_eq!(pairs(&out), vec![("x", 16.5 / 3.0)]);
        let out = aggregate(&input, &grouping("g", AggregationType::Min));
        assert_eq!(pairs(&out), vec![("x", 0.0)]);
        assert!(nan_warnings(&out, AggregationType::Min).is_empty());
    }

    #[test]
    fn unreadable_amounts_yield_nan_and_warnings() {
        let input = rows(json!([
            {"status": "draft", "total": "n/a"},
            {"status": "sent", "total": "10"},
            {"status": "sent", "total": "tbd"}
        ]));
        for aggregation in [AggregationType::Avg, AggregationType::Min, AggregationType::Max] {
            let out = aggregate(&input, &grouping("status", aggregation));
            assert!(out[0].value.is_nan());
            assert_eq!(out[1].value, 10.0);
            let warnings = nan_warnings(&out, aggregation);
            assert_eq!(warnings.len(), 1);
            assert_eq!(warnings[0].group_key, "draft");
        }

        let out = aggregate(&input, &grouping("status", AggregationType::Sum));
        assert_eq!(pairs(&out), vec![("draft", 0.0), ("sent", 10.0)]);
        assert!(nan_warnings(&out, AggregationType::Sum).is_empty());
    }

    #[test]
    fn empty_input_gives_empty_output() {
        for aggregation in AggregationType::ALL {
            assert!(aggregate(&[], &grouping("status", aggregation)).is_empty());
        }
    }

    #[test]
    fn aggregation_is_repeatable() {
        let input = rows(json!([
            {"source": "web", "amount": 10},
            {"source": "referral", "amount": 30},
            {"source": "web", "amount": 5},
            {"source": "event", "amount": "2.5"}
        ]));
        let by_source = grouping("source", AggregationType::Sum);
        let first = aggregate(&input, &by_source);
        let second = aggregate(&input, &by_source);
        assert_eq!(first, second);
        assert_eq!(
            pairs(&first),
            vec![("web", 15.0), ("referral", 30.0), ("event", 2.5)]
        );
    }
}
