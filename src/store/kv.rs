use std::{fs, path::Path};

use anyhow::Context;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use sled::{Batch, Db, IVec, Tree};

use crate::{
    collation::{collation_key, descending_stable, KEY_TERMINATOR},
    error::{AppError, Result},
    models::Row,
    query::SortDirection,
};

use super::{decode_row_key, encode_row_key, ProjectLocks, ReplaceOutcome, RowStore};

const SCHEMAS_TREE: &[u8] = b"schemas";

/// Pointer to the live generation of a project.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
struct SchemaRecord {
    fields: Vec<String>,
    generation: u64,
    row_count: usize,
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredRow {
    #[serde(rename = "__rowid")]
    id: u64,
    cells: Vec<(String, String)>,
}

fn rows_tree_name(project: &str, generation: u64) -> String {
    format!("rows/{}/{}", project, generation)
}

fn index_tree_name(project: &str, generation: u64, position: usize) -> String {
    format!("index/{}/{}/{}", project, generation, position)
}

fn index_entry(value: &str, ordinal: usize) -> Vec<u8> {
    let mut key = collation_key(value);
    key.push(KEY_TERMINATOR);
    key.extend_from_slice(&encode_row_key(ordinal));
    key
}

fn split_index_entry(entry: &[u8]) -> Option<(&[u8], usize)> {
    let split = entry.len().checked_sub(9)?;
    if entry[split] != KEY_TERMINATOR {
        return None;
    }
    Some((&entry[..split], decode_row_key(&entry[split + 1..])?))
}

fn decode_row(bytes: &[u8]) -> anyhow::Result<Row> {
    let stored: StoredRow =
        serde_json::from_slice(bytes).context("failed to deserialize stored row")?;
    Ok(Row::from(stored.cells))
}

/// Row store on an embedded `sled` database.
///
/// Layout: the `schemas` tree maps a project to its [`SchemaRecord`]; rows of a generation
/// live in `rows/<project>/<generation>` keyed by big-endian ordinal; every field gets an
/// `index/<project>/<generation>/<position>` tree keyed by collation key and ordinal.
pub struct KvStore {
    db: Db,
    locks: ProjectLocks,
}

impl KvStore {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create row store dir {:?}", parent))
                .map_err(AppError::unavailable)?;
        }
        let db = sled::open(path).map_err(|err| {
            warn!("[kv] failed to open row store at {:?}: {}", path, err);
            AppError::unavailable(err)
        })?;
        debug!("[kv] opened row store at {:?}", path);
        Ok(Self {
            db,
            locks: ProjectLocks::default(),
        })
    }

    fn schemas(&self) -> Result<Tree> {
        self.db.open_tree(SCHEMAS_TREE).map_err(AppError::unavailable)
    }

    fn read_schema(&self, schemas: &Tree, project: &str) -> Result<Option<SchemaRecord>> {
        let bytes = match schemas.get(project.as_bytes()) {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return Ok(None),
            Err(err) => return Err(AppError::unavailable(err)),
        };
        serde_json::from_slice(&bytes).map(Some).map_err(|err| {
            AppError::unavailable(format!(
                "schema record for project {} is unreadable: {}",
                project, err
            ))
        })
    }

    fn stage(&self, project: &str, schema: &SchemaRecord, rows: &[Row]) -> anyhow::Result<()> {
        let rows_tree = self
            .db
            .open_tree(rows_tree_name(project, schema.generation))
            .with_context(|| format!("failed to open rows tree for project {}", project))?;
        let mut batch = Batch::default();
        for (ordinal, row) in rows.iter().enumerate() {
            let stored = StoredRow {
                id: ordinal as u64,
                cells: row.cells().to_vec(),
            };
            let value = serde_json::to_vec(&stored)
                .with_context(|| format!("failed to serialize row {}", ordinal))?;
            batch.insert(encode_row_key(ordinal).to_vec(), value);
        }
        rows_tree
            .apply_batch(batch)
            .with_context(|| format!("failed to write rows for project {}", project))?;

        for (position, field) in schema.fields.iter().enumerate() {
            let index = self
                .db
                .open_tree(index_tree_name(project, schema.generation, position))
                .with_context(|| format!("failed to open index tree for field {}", field))?;
            let mut batch = Batch::default();
            for (ordinal, row) in rows.iter().enumerate() {
                batch.insert(index_entry(row.text(field), ordinal), Vec::<u8>::new());
            }
            index
                .apply_batch(batch)
                .with_context(|| format!("failed to write index for field {}", field))?;
        }
        Ok(())
    }

    fn drop_generation(&self, project: &str, schema: &SchemaRecord) -> anyhow::Result<()> {
        self.db
            .drop_tree(rows_tree_name(project, schema.generation))
            .with_context(|| format!("failed to drop rows of generation {}", schema.generation))?;
        for position in 0..schema.fields.len() {
            self.db
                .drop_tree(index_tree_name(project, schema.generation, position))
                .with_context(|| {
                    format!("failed to drop index of generation {}", schema.generation)
                })?;
        }
        Ok(())
    }

    fn fetch_rows(&self, tree: &Tree, ordinals: Vec<usize>) -> anyhow::Result<Vec<Row>> {
        let mut rows = Vec::with_capacity(ordinals.len());
        for ordinal in ordinals {
            let value: IVec = tree
                .get(encode_row_key(ordinal))
                .with_context(|| format!("failed to read row {}", ordinal))?
                .with_context(|| format!("index points at missing row {}", ordinal))?;
            rows.push(decode_row(&value)?);
        }
        Ok(rows)
    }
}

impl RowStore for KvStore {
    fn replace_all(
        &self,
        project: &str,
        fields: &[String],
        rows: &[Row],
    ) -> Result<ReplaceOutcome> {
        let handle = self.locks.handle(project);
        let _guard = handle.write();

        let schemas = self.schemas()?;
        let previous = self.read_schema(&schemas, project)?;
        let outcome = ReplaceOutcome::between(
            previous.as_ref().map(|schema| schema.fields.as_slice()),
            fields,
        );
        let next = SchemaRecord {
            fields: fields.to_vec(),
            generation: self
                .db
                .generate_id()
                .context("failed to allocate a store generation")?,
            row_count: rows.len(),
        };

        if let Err(err) = self.stage(project, &next, rows) {
            if let Err(cleanup) = self.drop_generation(project, &next) {
                warn!(
                    "[kv] failed to discard staged generation {} for project {}: {:?}",
                    next.generation, project, cleanup
                );
            }
            return Err(err.into());
        }

        let encoded = serde_json::to_vec(&next).context("failed to serialize schema record")?;
        schemas
            .insert(project.as_bytes(), encoded)
            .with_context(|| format!("failed to publish schema for project {}", project))?;
        self.db.flush().context("failed to flush row store")?;

        if let Some(previous) = previous {
            if outcome == ReplaceOutcome::Migrated {
                info!(
                    "[kv] migrated project={} fields {:?} -> {:?}",
                    project, previous.fields, next.fields
                );
            }
            if let Err(err) = self.drop_generation(project, &previous) {
                warn!(
                    "[kv] failed to drop superseded generation {} for project {}: {:?}",
                    previous.generation, project, err
                );
            }
        }
        debug!(
            "[kv] replaced project={} generation={} rows={}",
            project,
            next.generation,
            rows.len()
        );
        Ok(outcome)
    }

    fn read_all(&self, project: &str) -> Result<Vec<Row>> {
        let handle = self.locks.handle(project);
        let _guard = handle.read();

        let schemas = self.schemas()?;
        let Some(schema) = self.read_schema(&schemas, project)? else {
            return Ok(Vec::new());
        };
        let tree = self
            .db
            .open_tree(rows_tree_name(project, schema.generation))
            .map_err(AppError::unavailable)?;
        let mut rows = Vec::with_capacity(schema.row_count);
        for result in tree.iter() {
            let (_, value) = result.context("failed to iterate stored rows")?;
            rows.push(decode_row(&value)?);
        }
        Ok(rows)
    }

    fn exists(&self, project: &str) -> Result<bool> {
        let handle = self.locks.handle(project);
        let _guard = handle.read();
        self.schemas()?
            .contains_key(project.as_bytes())
            .map_err(AppError::unavailable)
    }

    fn schema(&self, project: &str) -> Result<Option<Vec<String>>> {
        let handle = self.locks.handle(project);
        let _guard = handle.read();
        let schemas = self.schemas()?;
        Ok(self
            .read_schema(&schemas, project)?
            .map(|schema| schema.fields))
    }

    fn clear(&self, project: &str) -> Result<()> {
        let handle = self.locks.handle(project);
        let _guard = handle.write();

        let schemas = self.schemas()?;
        let Some(bytes) = schemas
            .remove(project.as_bytes())
            .with_context(|| format!("failed to remove schema for project {}", project))?
        else {
            return Ok(());
        };
        match serde_json::from_slice::<SchemaRecord>(&bytes) {
            Ok(schema) => self.drop_generation(project, &schema)?,
            Err(err) => warn!(
                "[kv] cleared unreadable schema for project {}, its trees are left behind: {}",
                project, err
            ),
        }
        self.db.flush().context("failed to flush row store")?;
        debug!("[kv] cleared project={}", project);
        Ok(())
    }

    fn scan_ordered(
        &self,
        project: &str,
        field: &str,
        direction: SortDirection,
    ) -> Result<Option<Vec<Row>>> {
        let handle = self.locks.handle(project);
        let _guard = handle.read();

        let schemas = self.schemas()?;
        let Some(schema) = self.read_schema(&schemas, project)? else {
            return Ok(Some(Vec::new()));
        };
        let Some(position) = schema.fields.iter().position(|name| name == field) else {
            return Ok(None);
        };
        let index = self
            .db
            .open_tree(index_tree_name(project, schema.generation, position))
            .map_err(AppError::unavailable)?;
        let mut ascending: Vec<(Vec<u8>, usize)> = Vec::with_capacity(schema.row_count);
        for result in index.iter() {
            let (entry, _) = result.context("failed to iterate index entries")?;
            let (key, ordinal) =
                split_index_entry(&entry).context("malformed index entry in row store")?;
            ascending.push((key.to_vec(), ordinal));
        }
        let ordinals = match direction {
            SortDirection::Asc => ascending.into_iter().map(|(_, ordinal)| ordinal).collect(),
            SortDirection::Desc => descending_stable(ascending),
        };
        let rows_tree = self
            .db
            .open_tree(rows_tree_name(project, schema.generation))
            .map_err(AppError::unavailable)?;
        Ok(Some(self.fetch_rows(&rows_tree, ordinals)?))
    }
}
