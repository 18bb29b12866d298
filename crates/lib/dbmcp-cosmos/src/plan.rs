//! Client-side execution of cross-partition queries.
//!
//! The gateway refuses to run ORDER BY, TOP, OFFSET/LIMIT, DISTINCT and
//! aggregates across partitions on its own. It hands back a query plan
//! instead: a rewritten query to run on every partition key range plus the
//! steps needed to combine the per-range results. This module decodes that
//! plan and performs the combining steps.

use std::cmp::Ordering;
use std::collections::HashSet;

use serde::Deserialize;
use serde_json::Value;

use crate::client::CosmosError;

/// Plan features this client can finish locally.
pub(crate) const SUPPORTED_QUERY_FEATURES: &str =
    "Aggregate, Distinct, MultipleOrderBy, OffsetAndLimit, OrderBy, Top";

pub(crate) const QUERY_VERSION: &str = "1.4";

const ORDER_BY_FILTER: &str = "{documentdb-formattableorderbyquery-filter}";

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct QueryPlan {
    #[serde(default)]
    query_info: QueryInfo,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct QueryInfo {
    distinct_type: DistinctType,
    top: Option<u64>,
    offset: Option<u64>,
    limit: Option<u64>,
    order_by: Vec<SortOrder>,
    group_by_expressions: Vec<Value>,
    aggregates: Vec<Aggregate>,
    has_select_value: bool,
    rewritten_query: String,
    d_count_info: Option<Value>,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Deserialize)]
enum DistinctType {
    #[default]
    None,
    Ordered,
    Unordered,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
enum SortOrder {
    Ascending,
    Descending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
enum Aggregate {
    Count,
    Sum,
    Min,
    Max,
    Average,
    #[serde(other)]
    Other,
}

impl QueryPlan {
    /// Whether results need combining beyond plain concatenation.
    pub(crate) fn needs_pipeline(&self) -> bool {
        let info = &self.query_info;
        info.distinct_type != DistinctType::None
            || info.top.is_some()
            || info.offset.is_some()
            || info.limit.is_some()
            || !info.order_by.is_empty()
            || !info.aggregates.is_empty()
            || !info.group_by_expressions.is_empty()
            || info.d_count_info.is_some()
    }

    /// Rejects plans whose combining steps are not implemented here.
    ///
    /// # Errors
    /// Returns `CosmosError::UnsupportedQuery` naming the feature.
    pub(crate) fn check_supported(&self) -> Result<(), CosmosError> {
        let info = &self.query_info;
        let feature = if !info.group_by_expressions.is_empty() {
            Some("GROUP BY")
        } else if info.d_count_info.is_some() {
            Some("COUNT(DISTINCT ...)")
        } else if !info.aggregates.is_empty() && !info.has_select_value {
            Some("aggregates without SELECT VALUE")
        } else if info.aggregates.len() > 1 || info.aggregates.contains(&Aggregate::Other) {
            Some("this aggregate")
        } else {
            None
        };
        feature.map_or(Ok(()), |feature| Err(CosmosError::UnsupportedQuery { feature }))
    }

    /// Query text to run on each partition key range.
    pub(crate) fn partition_query(&self, original: &str) -> String {
        let rewritten = self.query_info.rewritten_query.trim();
        if rewritten.is_empty() {
            original.to_string()
        } else {
            rewritten.replace(ORDER_BY_FILTER, "true")
        }
    }

    /// Combines per-range results in plan order: sort, aggregate, distinct,
    /// then offset and limit.
    pub(crate) fn merge(&self, partitions: Vec<Vec<Value>>) -> Vec<Value> {
        let info = &self.query_info;
        let mut rows: Vec<Value> = partitions.into_iter().flatten().collect();

        if !info.order_by.is_empty() {
            rows.sort_by(|left, right| compare_order_by_items(left, right, &info.order_by));
            rows = rows.into_iter().map(take_payload).collect();
        }
        if let Some(&aggregate) = info.aggregates.first() {
            rows = fold_aggregate(aggregate, rows).into_iter().collect();
        }
        if info.distinct_type != DistinctType::None {
            let mut seen = HashSet::new();
            rows.retain(|row| seen.insert(row.to_string()));
        }

        let offset = info.offset.map_or(0, saturating_usize);
        let limit = [info.limit, info.top]
            .into_iter()
            .flatten()
            .map(saturating_usize)
            .min()
            .unwrap_or(usize::MAX);
        rows.into_iter().skip(offset).take(limit).collect()
    }
}

fn saturating_usize(value: u64) -> usize {
    usize::try_from(value).unwrap_or(usize::MAX)
}

fn take_payload(row: Value) -> Value {
    match row {
        Value::Object(mut fields) => fields.remove("payload").unwrap_or(Value::Null),
        other => other,
    }
}

fn compare_order_by_items(left: &Value, right: &Value, orders: &[SortOrder]) -> Ordering {
    for (index, order) in orders.iter().enumerate() {
        let ordering = compare_undefined(sort_key(left, index), sort_key(right, index));
        let ordering = match order {
            SortOrder::Ascending => ordering,
            SortOrder::Descending => ordering.reverse(),
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

fn sort_key(row: &Value, index: usize) -> Option<&Value> {
    row.get("orderByItems")?.get(index)?.get("item")
}

/// Absent values sort before everything else.
fn compare_undefined(left: Option<&Value>, right: Option<&Value>) -> Ordering {
    match (left, right) {
        (Some(left), Some(right)) => compare_values(left, right),
        (left, right) => left.is_some().cmp(&right.is_some()),
    }
}

/// Cross-type ordering: null, booleans, numbers, strings, arrays, objects.
fn compare_values(left: &Value, right: &Value) -> Ordering {
    const fn rank(value: &Value) -> u8 {
        match value {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Number(_) => 2,
            Value::String(_) => 3,
            Value::Array(_) => 4,
            Value::Object(_) => 5,
        }
    }

    match (left, right) {
        (Value::Bool(left), Value::Bool(right)) => left.cmp(right),
        (Value::Number(left), Value::Number(right)) => {
            let left = left.as_f64().unwrap_or_default();
            let right = right.as_f64().unwrap_or_default();
            left.total_cmp(&right)
        }
        (Value::String(left), Value::String(right)) => left.cmp(right),
        _ => rank(left).cmp(&rank(right)),
    }
}

/// Unwraps one partition's partial aggregate. Rewritten value aggregates
/// return `[{"item": partial}]`; an empty object means the partition had
/// nothing to aggregate.
fn partial_values(rows: Vec<Value>) -> impl Iterator<Item = Value> {
    rows.into_iter()
        .flat_map(|row| match row {
            Value::Array(items) => items,
            other => vec![other],
        })
        .filter_map(|item| match item {
            Value::Object(mut fields) if fields.contains_key("item") || fields.is_empty() => {
                fields.remove("item")
            }
            other => Some(other),
        })
}

fn fold_aggregate(aggregate: Aggregate, rows: Vec<Value>) -> Option<Value> {
    let partials = partial_values(rows);
    match aggregate {
        Aggregate::Count | Aggregate::Sum => partials
            .filter(Value::is_number)
            .reduce(|total, next| add_numbers(&total, &next))
            .or_else(|| (aggregate == Aggregate::Count).then(|| Value::from(0))),
        Aggregate::Average => {
            let (sum, count) = partials.fold((0.0, 0.0), |(sum, count), partial| {
                let part_sum = partial.get("sum").and_then(Value::as_f64);
                let part_count = partial.get("count").and_then(Value::as_f64);
                match (part_sum, part_count) {
                    (Some(part_sum), Some(part_count)) if part_count > 0.0 => {
                        (sum + part_sum, count + part_count)
                    }
                    _ => (sum, count),
                }
            });
            (count > 0.0).then(|| Value::from(sum / count))
        }
        Aggregate::Min => extremum(partials, "min", Ordering::Less),
        Aggregate::Max => extremum(partials, "max", Ordering::Greater),
        Aggregate::Other => None,
    }
}

/// Keeps the partial that compares as `wanted` against the others. Partials
/// may arrive as `{"min": v, "count": n}` when a partition mixes types.
fn extremum(
    partials: impl Iterator<Item = Value>,
    field: &str,
    wanted: Ordering,
) -> Option<Value> {
    partials
        .filter_map(|partial| match partial {
            Value::Object(mut fields) if fields.contains_key(field) => {
                let empty = fields.get("count").and_then(Value::as_u64) == Some(0);
                if empty {
                    None
                } else {
                    fields.remove(field)
                }
            }
            other => Some(other),
        })
        .reduce(|best, next| {
            if compare_values(&next, &best) == wanted {
                next
            } else {
                best
            }
        })
}

fn add_numbers(left: &Value, right: &Value) -> Value {
    let exact = left
        .as_i64()
        .zip(right.as_i64())
        .and_then(|(left, right)| left.checked_add(right));
    if let Some(total) = exact {
        return Value::from(total);
    }
    let left = left.as_f64().unwrap_or_default();
    let right = right.as_f64().unwrap_or_default();
    Value::from(left + right)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn plan(query_info: Value) -> QueryPlan {
        serde_json::from_value(json!({
            "partitionedQueryExecutionInfoVersion": 2,
            "queryInfo": query_info,
            "queryRanges": [{"min": "", "max": "FF", "isMinInclusive": true, "isMaxInclusive": false}]
        }))
        .unwrap()
    }

    #[test]
    fn plain_filters_pass_through() {
        let plan = plan(json!({
            "distinctType": "None",
            "top": null,
            "orderBy": [],
            "aggregates": [],
            "rewrittenQuery": "",
            "hasSelectValue": false,
            "dCountInfo": null
        }));
        assert!(!plan.needs_pipeline());
        assert_eq!(plan.partition_query("SELECT * FROM c"), "SELECT * FROM c");
    }

    #[test]
    fn value_count_sums_partition_counts() {
        let plan = plan(json!({
            "aggregates": ["Count"],
            "hasSelectValue": true,
            "rewrittenQuery": "SELECT VALUE [{\"item\": COUNT(1)}]\nFROM c"
        }));
        assert!(plan.needs_pipeline());
        plan.check_supported().unwrap();

        let merged = plan.merge(vec![
            vec![json!([{"item": 4}])],
            vec![json!([{"item": 0}])],
            vec![json!([{"item": 7}])],
        ]);
        assert_eq!(merged, vec![json!(11)]);
    }

    #[test]
    fn average_combines_sums_and_counts() {
        let plan = plan(json!({"aggregates": ["Average"], "hasSelectValue": true}));
        let merged = plan.merge(vec![
            vec![json!([{"item": {"sum": 10.0, "count": 2}}])],
            vec![json!([{"item": {"sum": 20.0, "count": 3}}])],
            vec![json!([{"item": {"sum": null, "count": 0}}])],
        ]);
        assert_eq!(merged, vec![json!(6.0)]);
    }

    #[test]
    fn max_over_empty_partitions_is_empty() {
        let plan = plan(json!({"aggregates": ["Max"], "hasSelectValue": true}));
        assert!(plan.merge(vec![vec![json!([{}])], vec![json!([{}])]]).is_empty());

        let merged = plan.merge(vec![vec![json!([{"item": 3}])], vec![json!([{"item": 9}])]]);
        assert_eq!(merged, vec![json!(9)]);
    }

    #[test]
    fn order_by_merges_partitions_and_applies_top() {
        let plan = plan(json!({
            "orderBy": ["Descending"],
            "top": 3,
            "rewrittenQuery": "SELECT TOP 3 c._rid, [{\"item\": c.ts}] AS orderByItems, c AS payload\nFROM c\nWHERE ({documentdb-formattableorderbyquery-filter})\nORDER BY c.ts DESC"
        }));
        assert!(plan.partition_query("ignored").contains("WHERE (true)"));

        let row = |ts: i64| json!({"_rid": "r", "orderByItems": [{"item": ts}], "payload": {"ts": ts}});
        let merged = plan.merge(vec![vec![row(9), row(4), row(1)], vec![row(8), row(7)]]);
        assert_eq!(merged, vec![json!({"ts": 9}), json!({"ts": 8}), json!({"ts": 7})]);
    }

    #[test]
    fn order_by_puts_missing_values_first() {
        let plan = plan(json!({"orderBy": ["Ascending"]}));
        let merged = plan.merge(vec![vec![
            json!({"orderByItems": [{"item": "b"}], "payload": "b"}),
            json!({"orderByItems": [{}], "payload": "undefined"}),
            json!({"orderByItems": [{"item": 5}], "payload": 5}),
        ]]);
        assert_eq!(merged, vec![json!("undefined"), json!(5), json!("b")]);
    }

    #[test]
    fn distinct_then_offset_limit() {
        let plan = plan(json!({"distinctType": "Unordered", "offset": 1, "limit": 2}));
        let merged = plan.merge(vec![
            vec![json!("a"), json!("b")],
            vec![json!("a"), json!("c"), json!("d")],
        ]);
        assert_eq!(merged, vec![json!("b"), json!("c")]);
    }

    #[test]
    fn group_by_is_reported_by_name() {
        let plan = plan(json!({
            "groupByExpressions": ["c.status"],
            "aggregates": ["Count"],
            "hasSelectValue": false
        }));
        let err = plan.check_supported().err().unwrap();
        assert!(err.to_string().contains("GROUP BY"));
    }

    #[test]
    fn non_value_aggregates_are_reported() {
        let plan = plan(json!({"aggregates": ["Count"], "hasSelectValue": false}));
        let err = plan.check_supported().err().unwrap();
        assert!(err.to_string().contains("SELECT VALUE"));
    }
}
