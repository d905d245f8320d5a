//! Project-scoped tabular datasets: CSV import, paged/sorted/filtered row queries and
//! value-count charts over a pluggable row store.

pub mod chart;
pub mod collation;
pub mod commands;
pub mod config;
pub mod csv_source;
pub mod error;
pub mod models;
pub mod normalize;
pub mod projects;
pub mod query;
pub mod session;
pub mod state;
pub mod store;
pub mod value_utils;

pub use chart::{aggregate, Bucket};
pub use config::EngineConfig;
pub use error::AppError;
pub use models::{Dataset, ProjectRecord, Row};
pub use normalize::normalize;
pub use query::{execute, FilterMode, QueryRequest, QueryResult, SortDirection};
pub use state::AppState;
pub use store::{BackendKind, ColumnarStore, KvStore, MemoryStore, ReplaceOutcome, RowStore};
