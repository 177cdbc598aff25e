//! Declarative table settings as read from `<table>.json`.

use crate::filter::Operator;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Physical location of a table in the store. Every key is optional and
/// serialized only when configured.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TableSource {
    /// Physical table name; the settings key when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,
    /// Primary key column; `id` when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
}

pub const DEFAULT_PRIMARY: &str = "id";

impl TableSource {
    pub fn is_unset(&self) -> bool {
        self.table.is_none() && self.primary.is_none() && self.schema.is_none()
    }

    pub fn primary(&self) -> &str {
        self.primary.as_deref().unwrap_or(DEFAULT_PRIMARY)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    String,
    Text,
    Integer,
    #[serde(alias = "bigInteger")]
    Bigint,
    #[serde(alias = "double")]
    Float,
    Decimal,
    Boolean,
    Date,
    Datetime,
    Timestamp,
    Json,
    Uuid,
}

impl ColumnType {
    /// PostgreSQL type used when casting bound parameters.
    pub fn pg_type(self) -> &'static str {
        match self {
            ColumnType::String | ColumnType::Text => "text",
            ColumnType::Integer => "integer",
            ColumnType::Bigint => "bigint",
            ColumnType::Float => "double precision",
            ColumnType::Decimal => "numeric",
            ColumnType::Boolean => "boolean",
            ColumnType::Date => "date",
            ColumnType::Datetime => "timestamp",
            ColumnType::Timestamp => "timestamptz",
            ColumnType::Json => "jsonb",
            ColumnType::Uuid => "uuid",
        }
    }

    pub fn is_numeric(self) -> bool {
        matches!(
            self,
            ColumnType::Integer | ColumnType::Bigint | ColumnType::Float | ColumnType::Decimal
        )
    }

    pub fn is_integer(self) -> bool {
        matches!(self, ColumnType::Integer | ColumnType::Bigint)
    }

    pub fn is_temporal(self) -> bool {
        matches!(self, ColumnType::Date | ColumnType::Datetime | ColumnType::Timestamp)
    }

    pub fn is_textual(self) -> bool {
        matches!(self, ColumnType::String | ColumnType::Text)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(rename = "type")]
    pub type_: ColumnType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nullable: Option<bool>,
    /// UI keys (components, formatting) kept verbatim.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ColumnDescriptor {
    /// Columns are nullable unless configured otherwise.
    pub fn is_nullable(&self) -> bool {
        self.nullable.unwrap_or(true)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FilterDescriptor {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Column the filter applies to; defaults to `name`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operators: Option<Vec<Operator>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl FilterDescriptor {
    pub fn column_name(&self) -> &str {
        self.column.as_deref().unwrap_or(&self.name)
    }
}

/// Per-view layout (list/edit/view/insert). Opaque to the engine.
pub type ViewLayout = Map<String, Value>;

/// Settings for one table. Serializing yields the configured keys only:
/// defaults are applied through accessors, never written back.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TableSettings {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, rename = "decription", alias = "description", skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "TableSource::is_unset")]
    pub source: TableSource,
    pub columns: Vec<ColumnDescriptor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filters: Option<Vec<FilterDescriptor>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub list: Option<ViewLayout>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edit: Option<ViewLayout>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub view: Option<ViewLayout>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub insert: Option<ViewLayout>,
    /// Key the settings were resolved under.
    #[serde(skip)]
    pub key: String,
}

impl TableSettings {
    pub fn column(&self, name: &str) -> Option<&ColumnDescriptor> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn filters(&self) -> &[FilterDescriptor] {
        self.filters.as_deref().unwrap_or(&[])
    }

    pub fn filter_for_column(&self, column: &str) -> Option<&FilterDescriptor> {
        self.filters().iter().find(|f| f.column_name() == column)
    }

    /// Physical table: `source.table`, else the settings key.
    pub fn table_name(&self) -> &str {
        self.source.table.as_deref().unwrap_or(&self.key)
    }

    pub fn primary(&self) -> &str {
        self.source.primary()
    }

    pub fn primary_column(&self) -> Option<&ColumnDescriptor> {
        self.column(self.primary())
    }
}
