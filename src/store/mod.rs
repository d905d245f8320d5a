//! Persistence of one dataset per project.
//!
//! A project is either absent or holds exactly one schema generation. Imports stage the new
//! rows beside the current generation and make them current in a single step, so readers
//! never observe a mixture of two imports.

use std::{collections::HashMap, fmt, ops::Deref, sync::Arc};

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};

use crate::{error::Result, models::Row, query::SortDirection};

mod columnar;
mod kv;
mod memory;

pub use columnar::ColumnarStore;
pub use kv::KvStore;
pub use memory::MemoryStore;

/// Which storage engine backs the row store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    Memory,
    #[default]
    Kv,
    Columnar,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Memory => write!(f, "memory"),
            BackendKind::Kv => write!(f, "kv"),
            BackendKind::Columnar => write!(f, "columnar"),
        }
    }
}

/// What `replace_all` had to do to install the new rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ReplaceOutcome {
    /// The project had no store yet.
    Created,
    /// Same field list as before; contents were swapped without a schema change.
    Rewritten,
    /// The field list changed and the old structure was torn down.
    Migrated,
}

impl ReplaceOutcome {
    pub(crate) fn between(previous: Option<&[String]>, next: &[String]) -> Self {
        match previous {
            None => ReplaceOutcome::Created,
            Some(fields) if fields == next => ReplaceOutcome::Rewritten,
            Some(_) => ReplaceOutcome::Migrated,
        }
    }
}

pub trait RowStore: Send + Sync {
    /// Replaces everything stored for `project` with `rows`, indexed by `fields`.
    fn replace_all(&self, project: &str, fields: &[String], rows: &[Row])
        -> Result<ReplaceOutcome>;

    /// All rows in storage order, without internal ids. Empty when no store exists.
    fn read_all(&self, project: &str) -> Result<Vec<Row>>;

    fn exists(&self, project: &str) -> Result<bool>;

    /// Field list of the current generation.
    fn schema(&self, project: &str) -> Result<Option<Vec<String>>>;

    /// Removes rows and schema. Clearing an absent project is a no-op.
    fn clear(&self, project: &str) -> Result<()>;

    /// Rows ordered by `field` through a stored index, ties in storage order.
    ///
    /// `None` means the backend keeps no index for the field and the caller has to sort.
    fn scan_ordered(
        &self,
        project: &str,
        field: &str,
        direction: SortDirection,
    ) -> Result<Option<Vec<Row>>> {
        let _ = (project, field, direction);
        Ok(None)
    }
}

/// Reader/writer guard per project. Writers of one project never block another project.
///
/// Entries live only while a [`ProjectLock`] for the project is held, so ids that were
/// queried once or cleared do not accumulate.
#[derive(Default)]
pub struct ProjectLocks {
    inner: Mutex<HashMap<String, Arc<RwLock<()>>>>,
}

impl ProjectLocks {
    pub fn handle(&self, project: &str) -> ProjectLock<'_> {
        let mut guard = self.inner.lock();
        let lock = guard
            .entry(project.to_string())
            .or_insert_with(|| Arc::new(RwLock::new(())))
            .clone();
        ProjectLock {
            locks: self,
            project: project.to_string(),
            lock,
        }
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.inner.lock().len()
    }
}

/// Shared handle on one project's lock. Take guards with `read()` / `write()`.
pub struct ProjectLock<'a> {
    locks: &'a ProjectLocks,
    project: String,
    lock: Arc<RwLock<()>>,
}

impl Deref for ProjectLock<'_> {
    type Target = RwLock<()>;

    fn deref(&self) -> &RwLock<()> {
        &self.lock
    }
}

impl Drop for ProjectLock<'_> {
    fn drop(&mut self) {
        // New handles are only cloned under the map mutex, so a count of two (the map and
        // this handle) cannot grow while we decide.
        let mut guard = self.locks.inner.lock();
        let idle = guard.get(&self.project).is_some_and(|current| {
            Arc::ptr_eq(current, &self.lock) && Arc::strong_count(current) == 2
        });
        if idle {
            guard.remove(&self.project);
        }
    }
}

/// Internal id key used by the persistent backends to keep storage order.
pub(crate) const ROW_ID_KEY: &str = "__rowid";

pub(crate) fn encode_row_key(row_index: usize) -> [u8; 8] {
    (row_index as u64).to_be_bytes()
}

pub(crate) fn decode_row_key(bytes: &[u8]) -> Option<usize> {
    if bytes.len() != 8 {
        return None;
    }
    let mut buf = [0u8; 8];
    buf.copy_from_slice(bytes);
    Some(u64::from_be_bytes(buf) as usize)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_tracks_schema_changes() {
        let fields = vec!["a".to_string(), "b".to_string()];
        assert_eq!(ReplaceOutcome::between(None, &fields), ReplaceOutcome::Created);
        assert_eq!(
            ReplaceOutcome::between(Some(&fields), &fields),
            ReplaceOutcome::Rewritten
        );
        let reordered = vec!["b".to_string(), "a".to_string()];
        assert_eq!(
            ReplaceOutcome::between(Some(&fields), &reordered),
            ReplaceOutcome::Migrated
        );
    }

    #[test]
    fn row_keys_sort_by_ordinal() {
        assert!(encode_row_key(2) < encode_row_key(10));
        assert_eq!(decode_row_key(&encode_row_key(42)), Some(42));
        assert_eq!(decode_row_key(&[1, 2, 3]), None);
    }

    #[test]
    fn locks_are_shared_per_project() {
        let locks = ProjectLocks::default();
        let first = locks.handle("p1");
        let again = locks.handle("p1");
        let other = locks.handle("p2");
        assert!(Arc::ptr_eq(&first.lock, &again.lock));
        assert!(!Arc::ptr_eq(&first.lock, &other.lock));
        let _write = first.write();
        assert!(other.try_write().is_some());
        assert!(again.try_read().is_none());
    }

    #[test]
    fn idle_projects_leave_no_entry() {
        let locks = ProjectLocks::default();
        {
            let first = locks.handle("p1");
            let _read = first.read();
            let second = locks.handle("p1");
            drop(second);
            assert_eq!(locks.len(), 1);
        }
        assert_eq!(locks.len(), 0);

        for id in ["a", "b", "c"] {
            let handle = locks.handle(id);
            let _write = handle.write();
        }
        assert_eq!(locks.len(), 0);
    }
}
