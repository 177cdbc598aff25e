//! Typed inputs to the table operations, one per operation.

use crate::filter::FilterGroup;
use crate::service::{Record, RecordId};
use crate::sql::SortKey;

#[derive(Clone, Debug, PartialEq)]
pub struct SearchRequest {
    pub table: String,
    pub filter: FilterGroup,
    pub page: Option<i64>,
    pub page_size: Option<i64>,
    pub sort: Option<SortKey>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct FindRequest {
    pub table: String,
    /// `None` when the caller passed nothing usable as an id.
    pub id: Option<RecordId>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SaveRequest {
    pub table: String,
    pub record: Record,
}

#[derive(Clone, Debug, PartialEq)]
pub struct DeleteRequest {
    pub table: String,
    pub id: Option<RecordId>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SettingsRequest {
    pub table: String,
}
