use std::{fs, path::PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use parking_lot::Mutex;
use uuid::Uuid;

use crate::models::{ChartDefinition, ProjectRecord};

/// Project records persisted as one JSON document.
pub struct ProjectsStore {
    meta_path: PathBuf,
    inner: Mutex<Vec<ProjectRecord>>,
}

impl ProjectsStore {
    pub fn new(root_dir: PathBuf) -> Result<Self> {
        fs::create_dir_all(&root_dir)
            .with_context(|| format!("failed to create data dir at {:?}", root_dir))?;

        let meta_path = root_dir.join("projects.json");
        let projects: Vec<ProjectRecord> = if meta_path.exists() {
            let data = fs::read(&meta_path)
                .with_context(|| format!("failed to read metadata file {:?}", meta_path))?;
            serde_json::from_slice(&data)
                .with_context(|| format!("failed to parse metadata file {:?}", meta_path))?
        } else {
            Vec::new()
        };

        Ok(Self {
            meta_path,
            inner: Mutex::new(projects),
        })
    }

    /// All records, newest first.
    pub fn all(&self) -> Vec<ProjectRecord> {
        let mut projects = self.inner.lock().clone();
        projects.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        projects
    }

    pub fn create(&self, name: &str, description: Option<String>) -> Result<ProjectRecord> {
        let now = Utc::now();
        let record = ProjectRecord {
            id: Uuid::new_v4(),
            name: name.trim().to_string(),
            description: description
                .map(|text| text.trim().to_string())
                .filter(|text| !text.is_empty()),
            created_at: now,
            updated_at: now,
            charts: Vec::new(),
        };
        self.insert(record.clone())?;
        Ok(record)
    }

    pub fn insert(&self, project: ProjectRecord) -> Result<()> {
        let mut guard = self.inner.lock();
        guard.push(project);
        self.persist_locked(&guard)
    }

    pub fn update_details(
        &self,
        id: &Uuid,
        name: Option<String>,
        description: Option<String>,
    ) -> Result<Option<ProjectRecord>> {
        self.modify(id, |meta| {
            if let Some(name) = name.map(|text| text.trim().to_string()) {
                if !name.is_empty() {
                    meta.name = name;
                }
            }
            if let Some(description) = description {
                let trimmed = description.trim();
                meta.description = if trimmed.is_empty() {
                    None
                } else {
                    Some(trimmed.to_string())
                };
            }
        })
    }

    /// Bumps `updated_at`, used after an import.
    pub fn touch(&self, id: &Uuid) -> Result<Option<ProjectRecord>> {
        self.modify(id, |_| {})
    }

    pub fn add_chart(&self, id: &Uuid, field: &str) -> Result<Option<ChartDefinition>> {
        let chart = ChartDefinition {
            id: Uuid::new_v4(),
            field: field.to_string(),
        };
        let updated = self.modify(id, |meta| meta.charts.push(chart.clone()))?;
        Ok(updated.map(|_| chart))
    }

    pub fn remove_chart(&self, id: &Uuid, chart_id: &Uuid) -> Result<Option<ProjectRecord>> {
        self.modify(id, |meta| meta.charts.retain(|chart| &chart.id != chart_id))
    }

    pub fn remove(&self, id: &Uuid) -> Result<()> {
        let mut guard = self.inner.lock();
        guard.retain(|meta| &meta.id != id);
        self.persist_locked(&guard)
    }

    pub fn find(&self, id: &Uuid) -> Option<ProjectRecord> {
        self.inner
            .lock()
            .iter()
            .find(|meta| &meta.id == id)
            .cloned()
    }

    fn modify(
        &self,
        id: &Uuid,
        change: impl FnOnce(&mut ProjectRecord),
    ) -> Result<Option<ProjectRecord>> {
        let mut guard = self.inner.lock();
        let Some(meta) = guard.iter_mut().find(|meta| &meta.id == id) else {
            return Ok(None);
        };
        change(meta);
        meta.updated_at = Utc::now();
        let updated = meta.clone();
        self.persist_locked(&guard)?;
        Ok(Some(updated))
    }

    fn persist_locked(&self, guard: &[ProjectRecord]) -> Result<()> {
        let data = serde_json::to_vec_pretty(guard)?;
        fs::write(&self.meta_path, data)
            .with_context(|| format!("failed to write metadata file {:?}", self.meta_path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_persist_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let store = ProjectsStore::new(dir.path().to_path_buf()).unwrap();
        let record = store.create(" Sales ", Some("  ".into())).unwrap();
        assert_eq!(record.name, "Sales");
        assert_eq!(record.description, None);
        store.add_chart(&record.id, "region").unwrap().unwrap();

        let reopened = ProjectsStore::new(dir.path().to_path_buf()).unwrap();
        let found = reopened.find(&record.id).unwrap();
        assert_eq!(found.charts.len(), 1);
        assert_eq!(found.charts[0].field, "region");
    }

    #[test]
    fn record_json_uses_camel_case() {
        let dir = tempfile::tempdir().unwrap();
        let store = ProjectsStore::new(dir.path().to_path_buf()).unwrap();
        store.create("A", Some("desc".into())).unwrap();
        let raw = fs::read_to_string(dir.path().join("projects.json")).unwrap();
        assert!(raw.contains("\"createdAt\""));
        assert!(raw.contains("\"updatedAt\""));
        assert!(raw.contains("\"charts\""));
    }

    #[test]
    fn updates_on_unknown_project_are_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = ProjectsStore::new(dir.path().to_path_buf()).unwrap();
        let ghost = Uuid::new_v4();
        assert!(store.touch(&ghost).unwrap().is_none());
        assert!(store.add_chart(&ghost, "x").unwrap().is_none());
    }

    #[test]
    fn details_and_charts_can_change() {
        let dir = tempfile::tempdir().unwrap();
        let store = ProjectsStore::new(dir.path().to_path_buf()).unwrap();
        let record = store.create("Old", None).unwrap();
        let chart = store.add_chart(&record.id, "status").unwrap().unwrap();
        let updated = store
            .update_details(&record.id, Some("New".into()), Some("notes".into()))
            .unwrap()
            .unwrap();
        assert_eq!(updated.name, "New");
        assert_eq!(updated.description.as_deref(), Some("notes"));
        assert!(updated.updated_at >= record.updated_at);

        let without = store.remove_chart(&record.id, &chart.id).unwrap().unwrap();
        assert!(without.charts.is_empty());
        store.remove(&record.id).unwrap();
        assert!(store.all().is_empty());
    }
}
