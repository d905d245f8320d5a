use std::sync::Arc;

use log::info;

use crate::{
    config::EngineConfig,
    error::{AppError, Result},
    projects::ProjectsStore,
    query::FilterMode,
    session::RequestTracker,
    store::{BackendKind, ColumnarStore, KvStore, MemoryStore, RowStore},
};

pub struct AppState {
    pub config: EngineConfig,
    pub projects: ProjectsStore,
    pub rows: Arc<dyn RowStore>,
    pub requests: RequestTracker,
}

impl AppState {
    pub fn new(config: EngineConfig) -> Result<Self> {
        let projects = ProjectsStore::new(config.data_dir.clone()).map_err(AppError::from)?;
        let rows = open_row_store(&config)?;
        info!(
            "[state] opened data dir {:?} with {} backend",
            config.data_dir, config.backend
        );
        Ok(Self {
            config,
            projects,
            rows,
            requests: RequestTracker::new(),
        })
    }

    pub fn filter_mode(&self) -> FilterMode {
        self.config.filter_mode
    }
}

pub fn open_row_store(config: &EngineConfig) -> Result<Arc<dyn RowStore>> {
    Ok(match config.backend {
        BackendKind::Memory => Arc::new(MemoryStore::new()),
        BackendKind::Kv => Arc::new(KvStore::open(&config.data_dir.join("rows.db"))?),
        BackendKind::Columnar => Arc::new(ColumnarStore::open(&config.data_dir.join("columns"))?),
    })
}
