//! Table engine: configuration-driven search, find, save, delete and
//! settings over PostgreSQL tables.

pub mod config;
pub mod error;
pub mod filter;
pub mod pagination;
pub mod process;
pub mod response;
pub mod service;
pub mod sql;
pub mod state;

pub use config::{DirectorySource, EngineConfig, MemorySource, SettingsResolver, SettingsSource, TableSettings};
pub use error::{AppError, ConfigError};
pub use filter::{Connective, FilterCondition, FilterGroup, FilterNode, Operator};
pub use pagination::{paginate, PaginationRequest, PaginationResult};
pub use process::{dispatch, ProcessRequest};
pub use response::{failure, reply};
pub use service::{
    CrudService, DeleteRequest, FindRequest, Record, RecordId, SaveRequest, SearchRequest, SettingsRequest,
};
pub use sql::SortKey;
pub use state::EngineState;
