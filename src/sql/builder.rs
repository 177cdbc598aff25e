//! Builds parameterized SELECT, COUNT, INSERT, UPDATE, DELETE from table settings.

use crate::config::{ColumnDescriptor, ColumnType, TableSettings};
use crate::error::AppError;
use crate::filter::{compile, FilterGroup};
use crate::pagination::PaginationRequest;
use crate::service::{Record, RecordId};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::str::FromStr;

/// Quote identifier for PostgreSQL. Identifiers come from validated settings only.
pub(crate) fn quoted(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}

fn qualified_table(settings: &TableSettings) -> String {
    match settings.source.schema.as_deref() {
        Some(schema) => format!("{}.{}", quoted(schema), quoted(settings.table_name())),
        None => quoted(settings.table_name()),
    }
}

#[derive(Debug, Default)]
pub struct QueryBuf {
    pub sql: String,
    pub params: Vec<Value>,
}

impl QueryBuf {
    fn new() -> Self {
        QueryBuf {
            sql: String::new(),
            params: Vec::new(),
        }
    }

    fn push_param(&mut self, v: Value) -> usize {
        self.params.push(v);
        self.params.len()
    }

    /// Push a value for `column` and return its cast placeholder.
    fn push_column_value(&mut self, column: &ColumnDescriptor, v: &Value) -> String {
        let n = self.push_param(v.clone());
        if column.type_ == ColumnType::Json && !matches!(v, Value::Array(_) | Value::Object(_) | Value::Null) {
            format!("to_jsonb(${})", n)
        } else {
            format!("${}::{}", n, column.type_.pg_type())
        }
    }
}

/// SELECT list in configured column order. numeric is read back as text.
fn select_column_list(settings: &TableSettings) -> String {
    settings
        .columns
        .iter()
        .map(|c| {
            let q = quoted(&c.name);
            let pg = match c.type_ {
                ColumnType::Decimal => "text",
                other => other.pg_type(),
            };
            format!("{}::{} AS {}", q, pg, q)
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// Primary key expression in RETURNING lists: bigint for integer keys, text otherwise.
fn returning_primary(settings: &TableSettings) -> String {
    let pk = quoted(settings.primary());
    let integer = settings.primary_column().map(|c| c.type_.is_integer()).unwrap_or(false);
    if integer {
        format!("{}::bigint AS {}", pk, pk)
    } else {
        format!("{}::text AS {}", pk, pk)
    }
}

fn primary_placeholder(settings: &TableSettings, q: &mut QueryBuf, id: &RecordId) -> Result<String, AppError> {
    let pk = settings
        .primary_column()
        .ok_or_else(|| AppError::validation(format!("primary column '{}' not configured", settings.primary())))?;
    Ok(q.push_column_value(pk, &id.to_value()))
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortKey {
    pub column: String,
    #[serde(default)]
    pub direction: SortDirection,
}

impl SortKey {
    pub fn asc(column: impl Into<String>) -> Self {
        SortKey {
            column: column.into(),
            direction: SortDirection::Asc,
        }
    }

    pub fn desc(column: impl Into<String>) -> Self {
        SortKey {
            column: column.into(),
            direction: SortDirection::Desc,
        }
    }
}

/// Parses `"col"`, `"col asc"` or `"col desc"`.
impl FromStr for SortKey {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split_whitespace();
        let column = parts
            .next()
            .ok_or_else(|| AppError::validation("empty sort key"))?
            .to_string();
        let direction = match parts.next().map(str::to_ascii_lowercase).as_deref() {
            None | Some("asc") => SortDirection::Asc,
            Some("desc") => SortDirection::Desc,
            Some(other) => return Err(AppError::validation(format!("invalid sort direction '{}'", other))),
        };
        if parts.next().is_some() {
            return Err(AppError::validation(format!("invalid sort key '{}'", s)));
        }
        Ok(SortKey { column, direction })
    }
}

/// ORDER BY for deterministic paging: the requested key (if any), then the primary key.
pub fn order_clause(settings: &TableSettings, sort: Option<&SortKey>) -> Result<String, AppError> {
    let pk = settings.primary();
    let mut parts = Vec::with_capacity(2);
    if let Some(key) = sort {
        if settings.column(&key.column).is_none() {
            return Err(AppError::validation(format!("unknown sort column '{}'", key.column)));
        }
        let dir = match key.direction {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        };
        parts.push(format!("{} {}", quoted(&key.column), dir));
        if key.column == pk {
            return Ok(format!(" ORDER BY {}", parts.join(", ")));
        }
    }
    parts.push(format!("{} ASC", quoted(pk)));
    Ok(format!(" ORDER BY {}", parts.join(", ")))
}

/// Paged SELECT with the compiled filter, stable order and LIMIT/OFFSET.
pub fn build_search(
    settings: &TableSettings,
    group: &FilterGroup,
    pagination: &PaginationRequest,
    sort: Option<&SortKey>,
) -> Result<QueryBuf, AppError> {
    let predicate = compile(settings, group)?;
    let order = order_clause(settings, sort)?;
    let mut q = QueryBuf::new();
    let where_clause = predicate
        .clause
        .map(|c| format!(" WHERE {}", c))
        .unwrap_or_default();
    q.params = predicate.params;
    q.sql = format!(
        "SELECT {} FROM {}{}{} LIMIT {} OFFSET {}",
        select_column_list(settings),
        qualified_table(settings),
        where_clause,
        order,
        pagination.limit(),
        pagination.offset()
    );
    Ok(q)
}

/// COUNT(*) over the same filter, independent of paging.
pub fn build_count(settings: &TableSettings, group: &FilterGroup) -> Result<QueryBuf, AppError> {
    let predicate = compile(settings, group)?;
    let mut q = QueryBuf::new();
    let where_clause = predicate
        .clause
        .map(|c| format!(" WHERE {}", c))
        .unwrap_or_default();
    q.params = predicate.params;
    q.sql = format!("SELECT COUNT(*) FROM {}{}", qualified_table(settings), where_clause);
    Ok(q)
}

/// SELECT by primary key.
pub fn build_find(settings: &TableSettings, id: &RecordId) -> Result<QueryBuf, AppError> {
    let mut q = QueryBuf::new();
    let ph = primary_placeholder(settings, &mut q, id)?;
    q.sql = format!(
        "SELECT {} FROM {} WHERE {} = {}",
        select_column_list(settings),
        qualified_table(settings),
        quoted(settings.primary()),
        ph
    );
    Ok(q)
}

/// Row-locking existence probe used inside save.
pub fn build_exists(settings: &TableSettings, id: &RecordId) -> Result<QueryBuf, AppError> {
    let mut q = QueryBuf::new();
    let ph = primary_placeholder(settings, &mut q, id)?;
    q.sql = format!(
        "SELECT 1 FROM {} WHERE {} = {} FOR UPDATE",
        qualified_table(settings),
        quoted(settings.primary()),
        ph
    );
    Ok(q)
}

/// INSERT the configured columns present in `record`. The primary key is only
/// written when `include_primary` is set.
pub fn build_insert(settings: &TableSettings, record: &Record, include_primary: bool) -> QueryBuf {
    let mut q = QueryBuf::new();
    let pk = settings.primary();
    let mut cols = Vec::new();
    let mut placeholders = Vec::new();
    for c in &settings.columns {
        if c.name == pk && !include_primary {
            continue;
        }
        let Some(v) = record.get(&c.name) else { continue };
        placeholders.push(q.push_column_value(c, v));
        cols.push(quoted(&c.name));
    }
    let table = qualified_table(settings);
    let returning = returning_primary(settings);
    q.sql = if cols.is_empty() {
        format!("INSERT INTO {} DEFAULT VALUES RETURNING {}", table, returning)
    } else {
        format!(
            "INSERT INTO {} ({}) VALUES ({}) RETURNING {}",
            table,
            cols.join(", "),
            placeholders.join(", "),
            returning
        )
    };
    q
}

/// UPDATE by primary key: SET only configured columns present in `record`.
/// With nothing to set, degrades to a primary-key SELECT.
pub fn build_update(settings: &TableSettings, id: &RecordId, record: &Record) -> Result<QueryBuf, AppError> {
    let mut q = QueryBuf::new();
    let pk = settings.primary();
    let table = qualified_table(settings);
    let returning = returning_primary(settings);
    let mut sets = Vec::new();
    for c in &settings.columns {
        if c.name == pk {
            continue;
        }
        let Some(v) = record.get(&c.name) else { continue };
        let rhs = q.push_column_value(c, v);
        sets.push(format!("{} = {}", quoted(&c.name), rhs));
    }
    let id_ph = primary_placeholder(settings, &mut q, id)?;
    q.sql = if sets.is_empty() {
        format!("SELECT {} FROM {} WHERE {} = {}", returning, table, quoted(pk), id_ph)
    } else {
        format!(
            "UPDATE {} SET {} WHERE {} = {} RETURNING {}",
            table,
            sets.join(", "),
            quoted(pk),
            id_ph,
            returning
        )
    };
    Ok(q)
}

/// DELETE by primary key.
pub fn build_delete(settings: &TableSettings, id: &RecordId) -> Result<QueryBuf, AppError> {
    let mut q = QueryBuf::new();
    let ph = primary_placeholder(settings, &mut q, id)?;
    q.sql = format!(
        "DELETE FROM {} WHERE {} = {} RETURNING {}",
        qualified_table(settings),
        quoted(settings.primary()),
        ph,
        returning_primary(settings)
    );
    Ok(q)
}

/// Move the primary key's owned sequence past an explicitly inserted key, so
/// later generated keys do not collide with it. `None` unless the key is an
/// integer; a no-op in the store when the column owns no sequence or the
/// sequence is already ahead.
pub fn build_advance_sequence(settings: &TableSettings, id: &RecordId) -> Option<QueryBuf> {
    let integer = settings.primary_column().map(|c| c.type_.is_integer()).unwrap_or(false);
    let RecordId::Int(n) = id else { return None };
    if !integer {
        return None;
    }
    let mut q = QueryBuf::new();
    q.params.push(Value::String(qualified_table(settings)));
    q.params.push(Value::String(settings.primary().to_string()));
    q.params.push(Value::from(*n));
    q.sql = "SELECT setval(s.seq, $3::bigint, true) \
             FROM (SELECT pg_get_serial_sequence($1::text, $2::text)::regclass AS seq) s \
             WHERE s.seq IS NOT NULL AND COALESCE(pg_sequence_last_value(s.seq), 0) < $3::bigint"
        .to_string();
    Some(q)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::{FilterCondition, Operator};
    use serde_json::json;

    fn settings() -> TableSettings {
        serde_json::from_str(include_str!("../../tests/fixtures/service.json")).unwrap()
    }

    const COLS: &str = "\"id\"::bigint AS \"id\", \"name\"::text AS \"name\", \"short_name\"::text AS \"short_name\", \
        \"kind_id\"::integer AS \"kind_id\", \"manu_id\"::integer AS \"manu_id\", \"status\"::text AS \"status\", \
        \"price_options\"::jsonb AS \"price_options\", \"score\"::text AS \"score\", \
        \"created_at\"::timestamptz AS \"created_at\"";

    #[test]
    fn test_quoted_escapes_quotes() {
        assert_eq!(quoted("a\"b"), "\"a\"\"b\"");
    }

    #[test]
    fn test_search_with_filter_and_paging() {
        let group = FilterGroup::and(vec![FilterCondition::eq("status", json!("enabled")).into()]);
        let q = build_search(&settings(), &group, &PaginationRequest::new(2, 10, 100), None).unwrap();
        assert_eq!(
            q.sql,
            format!(
                "SELECT {} FROM \"service\" WHERE (\"status\" = $1::text) ORDER BY \"id\" ASC LIMIT 10 OFFSET 10",
                COLS
            )
        );
        assert_eq!(q.params, vec![json!("enabled")]);
    }

    #[test]
    fn test_search_without_filter_orders_by_primary() {
        let q = build_search(&settings(), &FilterGroup::default(), &PaginationRequest::new(1, 5, 100), None).unwrap();
        assert!(q.sql.ends_with("FROM \"service\" ORDER BY \"id\" ASC LIMIT 5 OFFSET 0"));
        assert!(q.params.is_empty());
    }

    #[test]
    fn test_explicit_sort_gets_primary_tiebreaker() {
        let order = order_clause(&settings(), Some(&SortKey::desc("created_at"))).unwrap();
        assert_eq!(order, " ORDER BY \"created_at\" DESC, \"id\" ASC");
        let by_pk = order_clause(&settings(), Some(&SortKey::desc("id"))).unwrap();
        assert_eq!(by_pk, " ORDER BY \"id\" DESC");
    }

    #[test]
    fn test_unknown_sort_column_rejected() {
        let err = order_clause(&settings(), Some(&SortKey::asc("nope"))).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn test_sort_key_from_str() {
        assert_eq!("name".parse::<SortKey>().unwrap(), SortKey::asc("name"));
        assert_eq!("name DESC".parse::<SortKey>().unwrap(), SortKey::desc("name"));
        assert!("name sideways".parse::<SortKey>().is_err());
        assert!("".parse::<SortKey>().is_err());
    }

    #[test]
    fn test_count_shares_the_predicate() {
        let group = FilterGroup::and(vec![FilterCondition::new("kind_id", Operator::In, json!([1, 2])).into()]);
        let q = build_count(&settings(), &group).unwrap();
        assert_eq!(
            q.sql,
            "SELECT COUNT(*) FROM \"service\" WHERE (\"kind_id\" IN ($1::integer, $2::integer))"
        );
        assert_eq!(q.params, vec![json!(1), json!(2)]);
    }

    #[test]
    fn test_find_by_primary() {
        let q = build_find(&settings(), &RecordId::Int(7)).unwrap();
        assert_eq!(q.sql, format!("SELECT {} FROM \"service\" WHERE \"id\" = $1::bigint", COLS));
        assert_eq!(q.params, vec![json!(7)]);
    }

    #[test]
    fn test_advance_sequence_for_integer_keys_only() {
        let q = build_advance_sequence(&settings(), &RecordId::Int(8)).unwrap();
        assert!(q.sql.starts_with("SELECT setval(s.seq, $3::bigint, true)"));
        assert!(q.sql.contains("pg_get_serial_sequence($1::text, $2::text)"));
        assert_eq!(q.params, vec![json!("\"service\""), json!("id"), json!(8)]);
        assert!(build_advance_sequence(&settings(), &RecordId::Text("8".into())).is_none());

        let mut s = settings();
        s.columns[0] = serde_json::from_value(json!({ "name": "id", "type": "uuid" })).unwrap();
        assert!(build_advance_sequence(&s, &RecordId::Int(8)).is_none());
    }

    #[test]
    fn test_schema_qualified_table() {
        let mut s = settings();
        s.source.schema = Some("catalog".into());
        let q = build_delete(&s, &RecordId::Int(1)).unwrap();
        assert_eq!(
            q.sql,
            "DELETE FROM \"catalog\".\"service\" WHERE \"id\" = $1::bigint RETURNING \"id\"::bigint AS \"id\""
        );
    }

    #[test]
    fn test_insert_skips_primary_and_absent_columns() {
        let record: Record = serde_json::from_value(json!({
            "id": 0,
            "name": "X",
            "kind_id": 3,
            "price_options": ["按月订阅"]
        }))
        .unwrap();
        let q = build_insert(&settings(), &record, false);
        assert_eq!(
            q.sql,
            "INSERT INTO \"service\" (\"name\", \"kind_id\", \"price_options\") VALUES ($1::text, $2::integer, $3::jsonb) RETURNING \"id\"::bigint AS \"id\""
        );
        assert_eq!(q.params, vec![json!("X"), json!(3), json!(["按月订阅"])]);
    }

    #[test]
    fn test_insert_with_primary_and_json_scalar() {
        let record: Record = serde_json::from_value(json!({ "id": 42, "price_options": "monthly" })).unwrap();
        let q = build_insert(&settings(), &record, true);
        assert_eq!(
            q.sql,
            "INSERT INTO \"service\" (\"id\", \"price_options\") VALUES ($1::bigint, to_jsonb($2)) RETURNING \"id\"::bigint AS \"id\""
        );
    }

    #[test]
    fn test_insert_empty_record_uses_defaults() {
        let q = build_insert(&settings(), &Record::new(), false);
        assert_eq!(q.sql, "INSERT INTO \"service\" DEFAULT VALUES RETURNING \"id\"::bigint AS \"id\"");
    }

    #[test]
    fn test_update_sets_present_columns_only() {
        let record: Record = serde_json::from_value(json!({ "id": 5, "name": "Y", "status": "disabled" })).unwrap();
        let q = build_update(&settings(), &RecordId::Int(5), &record).unwrap();
        assert_eq!(
            q.sql,
            "UPDATE \"service\" SET \"name\" = $1::text, \"status\" = $2::text WHERE \"id\" = $3::bigint RETURNING \"id\"::bigint AS \"id\""
        );
        assert_eq!(q.params, vec![json!("Y"), json!("disabled"), json!(5)]);
    }

    #[test]
    fn test_update_with_nothing_to_set_selects() {
        let record: Record = serde_json::from_value(json!({ "id": 5 })).unwrap();
        let q = build_update(&settings(), &RecordId::Int(5), &record).unwrap();
        assert_eq!(q.sql, "SELECT \"id\"::bigint AS \"id\" FROM \"service\" WHERE \"id\" = $1::bigint");
    }

    #[test]
    fn test_exists_locks_row() {
        let q = build_exists(&settings(), &RecordId::Int(9)).unwrap();
        assert_eq!(q.sql, "SELECT 1 FROM \"service\" WHERE \"id\" = $1::bigint FOR UPDATE");
    }
}
