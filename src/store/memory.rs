use std::{collections::HashMap, sync::Arc};

use log::debug;
use parking_lot::RwLock;

use crate::{
    collation::{collation_key, descending_stable},
    error::Result,
    models::Row,
    query::SortDirection,
};

use super::{ReplaceOutcome, RowStore};

/// Sorted ordinals of one field plus the key each row sorted under.
struct FieldIndex {
    keys: Vec<Vec<u8>>,
    ascending: Vec<usize>,
}

impl FieldIndex {
    fn build(rows: &[Row], field: &str) -> Self {
        let keys: Vec<Vec<u8>> = rows.iter().map(|row| collation_key(row.text(field))).collect();
        let mut ascending: Vec<usize> = (0..rows.len()).collect();
        ascending.sort_by(|a, b| keys[*a].cmp(&keys[*b]));
        Self { keys, ascending }
    }

    fn ordered(&self, direction: SortDirection) -> Vec<usize> {
        match direction {
            SortDirection::Asc => self.ascending.clone(),
            SortDirection::Desc => descending_stable(
                self.ascending
                    .iter()
                    .map(|&idx| (&self.keys[idx], idx))
                    .collect(),
            ),
        }
    }
}

struct CachedDataset {
    fields: Vec<String>,
    rows: Vec<Row>,
    indexes: HashMap<String, FieldIndex>,
}

/// Process-local store. Each import builds a complete snapshot and swaps it in.
#[derive(Default)]
pub struct MemoryStore {
    datasets: RwLock<HashMap<String, Arc<CachedDataset>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn snapshot(&self, project: &str) -> Option<Arc<CachedDataset>> {
        self.datasets.read().get(project).cloned()
    }
}

impl RowStore for MemoryStore {
    fn replace_all(
        &self,
        project: &str,
        fields: &[String],
        rows: &[Row],
    ) -> Result<ReplaceOutcome> {
        let indexes = fields
            .iter()
            .map(|field| (field.clone(), FieldIndex::build(rows, field)))
            .collect();
        let dataset = Arc::new(CachedDataset {
            fields: fields.to_vec(),
            rows: rows.to_vec(),
            indexes,
        });

        let mut guard = self.datasets.write();
        let outcome = ReplaceOutcome::between(
            guard.get(project).map(|current| current.fields.as_slice()),
            fields,
        );
        guard.insert(project.to_string(), dataset);
        debug!(
            "[memory] replaced project={} rows={} outcome={:?}",
            project,
            rows.len(),
            outcome
        );
        Ok(outcome)
    }

    fn read_all(&self, project: &str) -> Result<Vec<Row>> {
        Ok(self
            .snapshot(project)
            .map(|dataset| dataset.rows.clone())
            .unwrap_or_default())
    }

    fn exists(&self, project: &str) -> Result<bool> {
        Ok(self.datasets.read().contains_key(project))
    }

    fn schema(&self, project: &str) -> Result<Option<Vec<String>>> {
        Ok(self.snapshot(project).map(|dataset| dataset.fields.clone()))
    }

    fn clear(&self, project: &str) -> Result<()> {
        self.datasets.write().remove(project);
        Ok(())
    }

    fn scan_ordered(
        &self,
        project: &str,
        field: &str,
        direction: SortDirection,
    ) -> Result<Option<Vec<Row>>> {
        let Some(dataset) = self.snapshot(project) else {
            return Ok(Some(Vec::new()));
        };
        let Some(index) = dataset.indexes.get(field) else {
            return Ok(None);
        };
        Ok(Some(
            index
                .ordered(direction)
                .into_iter()
                .map(|idx| dataset.rows[idx].clone())
                .collect(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows(values: &[&str]) -> Vec<Row> {
        values
            .iter()
            .enumerate()
            .map(|(idx, value)| {
                [("k", value.to_string()), ("n", idx.to_string())]
                    .into_iter()
                    .collect()
            })
            .collect()
    }

    fn fields() -> Vec<String> {
        vec!["k".to_string(), "n".to_string()]
    }

    #[test]
    fn replace_reports_outcome() {
        let store = MemoryStore::new();
        assert_eq!(
            store.replace_all("p", &fields(), &rows(&["a"])).unwrap(),
            ReplaceOutcome::Created
        );
        assert_eq!(
            store.replace_all("p", &fields(), &rows(&["b"])).unwrap(),
            ReplaceOutcome::Rewritten
        );
        let migrated: Vec<Row> = vec![[("x", "1")].into_iter().collect()];
        assert_eq!(
            store
                .replace_all("p", &["x".to_string()], &migrated)
                .unwrap(),
            ReplaceOutcome::Migrated
        );
        assert_eq!(store.schema("p").unwrap(), Some(vec!["x".to_string()]));
    }

    #[test]
    fn index_scan_is_stable_both_ways() {
        let store = MemoryStore::new();
        store
            .replace_all("p", &fields(), &rows(&["b", "A", "b", "10", "2"]))
            .unwrap();
        let order = |direction| -> Vec<String> {
            store
                .scan_ordered("p", "k", direction)
                .unwrap()
                .unwrap()
                .iter()
                .map(|row| row.text("n").to_string())
                .collect()
        };
        assert_eq!(order(SortDirection::Asc), vec!["4", "3", "1", "0", "2"]);
        assert_eq!(order(SortDirection::Desc), vec!["0", "2", "1", "3", "4"]);
    }

    #[test]
    fn unknown_field_has_no_index() {
        let store = MemoryStore::new();
        store.replace_all("p", &fields(), &rows(&["a"])).unwrap();
        assert!(store
            .scan_ordered("p", "missing", SortDirection::Asc)
            .unwrap()
            .is_none());
    }

    #[test]
    fn clear_is_idempotent() {
        let store = MemoryStore::new();
        store.clear("nothing").unwrap();
        store.replace_all("p", &fields(), &rows(&["a"])).unwrap();
        store.clear("p").unwrap();
        store.clear("p").unwrap();
        assert!(!store.exists("p").unwrap());
        assert!(store.read_all("p").unwrap().is_empty());
    }
}
