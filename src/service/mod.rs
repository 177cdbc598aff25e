//! CrudService: generic table operations using the safe SQL builder.

mod crud;
mod id;
mod request;
pub use crud::CrudService;
pub use id::RecordId;
pub use request::{DeleteRequest, FindRequest, SaveRequest, SearchRequest, SettingsRequest};

/// A row as column name to value.
pub type Record = serde_json::Map<String, serde_json::Value>;
