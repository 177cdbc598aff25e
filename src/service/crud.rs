//! Generic table CRUD against PostgreSQL.

use crate::config::{ColumnType, TableSettings};
use crate::error::AppError;
use crate::filter;
use crate::pagination::{paginate, PaginationRequest, PaginationResult};
use crate::service::{DeleteRequest, FindRequest, Record, RecordId, SaveRequest, SearchRequest};
use crate::sql::{
    bind_params, build_advance_sequence, build_count, build_delete, build_exists, build_find, build_insert, build_search,
    build_update, QueryBuf,
};
use crate::state::EngineState;
use serde_json::Value;
use sqlx::postgres::PgRow;
use sqlx::{PgExecutor, Row};
use std::sync::Arc;

pub struct CrudService;

impl CrudService {
    /// Filtered, paged rows plus page metadata. Count and page fetch run concurrently.
    pub async fn search(state: &EngineState, req: &SearchRequest) -> Result<PaginationResult, AppError> {
        let settings = state.settings.resolve(&req.table).await?;
        filter::validate(&settings, &req.filter)?;
        let page_size = req.page_size.unwrap_or(state.default_page_size as i64);
        let pagination = PaginationRequest::new(req.page.unwrap_or(1), page_size, state.max_page_size);
        let count_q = build_count(&settings, &req.filter)?;
        let page_q = build_search(&settings, &req.filter, &pagination, req.sort.as_ref())?;

        let (total, rows) = tokio::try_join!(
            Self::count(&state.pool, &count_q),
            Self::fetch_all(&state.pool, &page_q),
        )?;
        let data = rows
            .iter()
            .map(|r| row_to_record(&settings, r))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(paginate(total, &pagination).with_data(data))
    }

    /// One row by primary key, projected to the configured columns.
    pub async fn find(state: &EngineState, req: &FindRequest) -> Result<Record, AppError> {
        let settings = state.settings.resolve(&req.table).await?;
        let id = typed_id(&settings, &req.table, req.id.clone())?;
        let q = build_find(&settings, &id)?;
        let row = Self::fetch_optional(&state.pool, &q)
            .await?
            .ok_or_else(|| not_found(&req.table, &id))?;
        row_to_record(&settings, &row)
    }

    /// Insert or update in one transaction; returns the row's identifier.
    pub async fn save(state: &EngineState, req: &SaveRequest) -> Result<RecordId, AppError> {
        let settings = state.settings.resolve(&req.table).await?;
        if let Some(key) = req.record.keys().find(|k| settings.column(k).is_none()) {
            return Err(AppError::validation(format!("unknown column '{}' for table '{}'", key, req.table)));
        }
        let id = save_identifier(&settings, &req.record)?;

        let mut tx = state.pool.begin().await?;
        let row = match id {
            Some(id) => {
                let exists = Self::fetch_optional(&mut *tx, &build_exists(&settings, &id)?).await?.is_some();
                if exists {
                    Self::fetch_optional(&mut *tx, &build_update(&settings, &id, &req.record)?).await?
                } else {
                    let row = Self::fetch_optional(&mut *tx, &build_insert(&settings, &req.record, true)).await?;
                    if let Some(q) = build_advance_sequence(&settings, &id) {
                        Self::fetch_optional(&mut *tx, &q).await?;
                    }
                    row
                }
            }
            None => Self::fetch_optional(&mut *tx, &build_insert(&settings, &req.record, false)).await?,
        };
        let row = row.ok_or(AppError::Store(sqlx::Error::RowNotFound))?;
        let saved = decode_id(&settings, &row)?;
        tx.commit().await?;
        tracing::debug!(table = %req.table, id = %saved, "saved");
        Ok(saved)
    }

    /// Delete by primary key. Missing rows are reported, not ignored.
    pub async fn delete(state: &EngineState, req: &DeleteRequest) -> Result<(), AppError> {
        let settings = state.settings.resolve(&req.table).await?;
        let id = typed_id(&settings, &req.table, req.id.clone())?;
        let mut tx = state.pool.begin().await?;
        let deleted = Self::fetch_optional(&mut *tx, &build_delete(&settings, &id)?).await?;
        if deleted.is_none() {
            return Err(not_found(&req.table, &id));
        }
        tx.commit().await?;
        tracing::debug!(table = %req.table, id = %id, "deleted");
        Ok(())
    }

    /// Settings exactly as configured.
    pub async fn settings(state: &EngineState, table: &str) -> Result<Arc<TableSettings>, AppError> {
        Ok(state.settings.resolve(table).await?)
    }

    async fn count<'e>(executor: impl PgExecutor<'e>, q: &QueryBuf) -> Result<u64, AppError> {
        tracing::debug!(sql = %q.sql, params = ?q.params, "query");
        let row = bind_params(sqlx::query(&q.sql), &q.params).fetch_one(executor).await?;
        let n: i64 = row.try_get(0)?;
        Ok(n.max(0) as u64)
    }

    async fn fetch_all<'e>(executor: impl PgExecutor<'e>, q: &QueryBuf) -> Result<Vec<PgRow>, AppError> {
        tracing::debug!(sql = %q.sql, params = ?q.params, "query");
        Ok(bind_params(sqlx::query(&q.sql), &q.params).fetch_all(executor).await?)
    }

    async fn fetch_optional<'e>(executor: impl PgExecutor<'e>, q: &QueryBuf) -> Result<Option<PgRow>, AppError> {
        tracing::debug!(sql = %q.sql, params = ?q.params, "query");
        Ok(bind_params(sqlx::query(&q.sql), &q.params).fetch_optional(executor).await?)
    }
}

fn not_found(table: &str, id: &RecordId) -> AppError {
    AppError::NotFound(format!("{} #{}", table, id))
}

/// Boundary id, reinterpreted for the primary column. Absent or ill-typed ids
/// cannot match a row and are reported as not found.
fn typed_id(settings: &TableSettings, table: &str, id: Option<RecordId>) -> Result<RecordId, AppError> {
    let pk = settings
        .primary_column()
        .ok_or_else(|| AppError::validation(format!("primary column '{}' not configured", settings.primary())))?;
    match id {
        Some(raw) => {
            let shown = raw.to_string();
            raw.coerce(pk)
                .ok_or_else(|| AppError::NotFound(format!("{} #{}", table, shown)))
        }
        None => Err(AppError::NotFound(format!("{}: missing id", table))),
    }
}

/// Identifier carried by a record being saved. `None` means insert.
fn save_identifier(settings: &TableSettings, record: &Record) -> Result<Option<RecordId>, AppError> {
    let Some(raw) = record.get(settings.primary()) else { return Ok(None) };
    if raw.is_null() {
        return Ok(None);
    }
    if raw.as_str().map(|s| s.trim().is_empty()).unwrap_or(false) {
        return Ok(None);
    }
    let pk = settings
        .primary_column()
        .ok_or_else(|| AppError::validation(format!("primary column '{}' not configured", settings.primary())))?;
    let id = RecordId::from_json(raw)
        .and_then(|id| id.coerce(pk))
        .ok_or_else(|| AppError::validation(format!("invalid identifier {} for '{}'", raw, settings.primary())))?;
    Ok(if id.is_blank() { None } else { Some(id) })
}

fn decode_id(settings: &TableSettings, row: &PgRow) -> Result<RecordId, AppError> {
    let integer = settings.primary_column().map(|c| c.type_.is_integer()).unwrap_or(false);
    Ok(if integer {
        RecordId::Int(row.try_get(0)?)
    } else {
        RecordId::Text(row.try_get(0)?)
    })
}

/// Decode a row using the configured column types. The SELECT list casts each
/// column to that type, so a mismatch here is a store fault.
fn row_to_record(settings: &TableSettings, row: &PgRow) -> Result<Record, AppError> {
    let mut record = Record::new();
    for c in &settings.columns {
        let name = c.name.as_str();
        let v = match c.type_ {
            ColumnType::Integer => row.try_get::<Option<i32>, _>(name)?.map(Value::from),
            ColumnType::Bigint => row.try_get::<Option<i64>, _>(name)?.map(Value::from),
            ColumnType::Float => row
                .try_get::<Option<f64>, _>(name)?
                .and_then(serde_json::Number::from_f64)
                .map(Value::Number),
            ColumnType::String | ColumnType::Text | ColumnType::Decimal => {
                row.try_get::<Option<String>, _>(name)?.map(Value::String)
            }
            ColumnType::Boolean => row.try_get::<Option<bool>, _>(name)?.map(Value::Bool),
            ColumnType::Uuid => row
                .try_get::<Option<uuid::Uuid>, _>(name)?
                .map(|u| Value::String(u.to_string())),
            ColumnType::Date => row
                .try_get::<Option<chrono::NaiveDate>, _>(name)?
                .map(|d| Value::String(d.format("%Y-%m-%d").to_string())),
            ColumnType::Datetime => row
                .try_get::<Option<chrono::NaiveDateTime>, _>(name)?
                .map(|d| Value::String(d.format("%Y-%m-%dT%H:%M:%S%.f").to_string())),
            ColumnType::Timestamp => row
                .try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(name)?
                .map(|d| Value::String(d.to_rfc3339())),
            ColumnType::Json => row.try_get::<Option<Value>, _>(name)?,
        };
        record.insert(name.to_string(), v.unwrap_or(Value::Null));
    }
    Ok(record)
}
