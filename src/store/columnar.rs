use std::{
    fs::{self, File},
    path::{Path, PathBuf},
};

use anyhow::{Context, Result as AnyResult};
use log::{debug, info, warn};
use polars::prelude::{DataFrame, NamedFrom, ParquetReader, ParquetWriter, SerReader, Series};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    error::{AppError, Result},
    models::Row,
    value_utils::anyvalue_to_text,
};

use super::{ProjectLocks, ReplaceOutcome, RowStore, ROW_ID_KEY};

const SCHEMA_FILE: &str = "schema.json";

/// Current-generation pointer of a project directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ColumnarSchema {
    fields: Vec<String>,
    /// Every key seen in the rows, schema fields first. Stored as positional columns.
    columns: Vec<String>,
    data_file: String,
    generation: u64,
}

fn column_name(position: usize) -> String {
    format!("c{}", position)
}

/// Directory name for an opaque project id: keeps `[A-Za-z0-9-]`, hex-escapes the rest.
fn project_dir_name(project: &str) -> String {
    let mut name = String::with_capacity(project.len());
    for byte in project.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' {
            name.push(byte as char);
        } else {
            name.push_str(&format!("_{:02x}", byte));
        }
    }
    name
}

fn stored_columns(fields: &[String], rows: &[Row]) -> Vec<String> {
    let mut columns: Vec<String> = fields.to_vec();
    for row in rows {
        for field in row.fields() {
            if !columns.iter().any(|existing| existing == field) {
                columns.push(field.to_string());
            }
        }
    }
    columns
}

fn build_frame(columns: &[String], rows: &[Row]) -> AnyResult<DataFrame> {
    let mut series = Vec::with_capacity(columns.len() + 1);
    let row_ids: Vec<i64> = (0..rows.len()).map(|idx| idx as i64).collect();
    series.push(Series::new(ROW_ID_KEY, row_ids));
    for (position, column) in columns.iter().enumerate() {
        let values: Vec<Option<String>> = rows
            .iter()
            .map(|row| row.get(column).map(str::to_string))
            .collect();
        series.push(Series::new(&column_name(position), values));
    }
    DataFrame::new(series).context("failed to assemble dataset frame")
}

fn read_frame(path: &Path) -> AnyResult<DataFrame> {
    let file =
        File::open(path).with_context(|| format!("failed to open parquet file {:?}", path))?;
    ParquetReader::new(file)
        .finish()
        .context("failed to read parquet file")
}

fn write_frame(path: &Path, df: &mut DataFrame) -> AnyResult<()> {
    let file =
        File::create(path).with_context(|| format!("failed to create parquet file {:?}", path))?;
    ParquetWriter::new(file)
        .finish(df)
        .context("failed to write parquet file")?;
    Ok(())
}

fn frame_rows(df: &DataFrame, columns: &[String]) -> AnyResult<Vec<Row>> {
    let ids = df
        .column(ROW_ID_KEY)
        .and_then(|series| series.i64())
        .context("stored dataset has no row ids")?;
    let series: Vec<&Series> = (0..columns.len())
        .map(|position| df.column(&column_name(position)))
        .collect::<Result<_, _>>()
        .context("stored dataset is missing a column")?;

    let mut order: Vec<(i64, usize)> = (0..df.height())
        .map(|idx| (ids.get(idx).unwrap_or(i64::MAX), idx))
        .collect();
    order.sort();

    let mut rows = Vec::with_capacity(order.len());
    for (_, idx) in order {
        let mut row = Row::with_capacity(columns.len());
        for (name, column) in columns.iter().zip(&series) {
            if let Ok(value) = column.get(idx) {
                if let Some(text) = anyvalue_to_text(&value) {
                    row.insert(name.clone(), text);
                }
            }
        }
        rows.push(row);
    }
    Ok(rows)
}

/// Row store on parquet files, one directory per project.
///
/// `schema.json` names the live data file. Imports write a fresh data file and then
/// replace the pointer with a rename, so a reader holding the old pointer still finds a
/// complete file.
pub struct ColumnarStore {
    root_dir: PathBuf,
    locks: ProjectLocks,
}

impl ColumnarStore {
    pub fn open(root_dir: &Path) -> Result<Self> {
        fs::create_dir_all(root_dir)
            .with_context(|| format!("failed to create columnar store dir {:?}", root_dir))
            .map_err(AppError::unavailable)?;
        Ok(Self {
            root_dir: root_dir.to_path_buf(),
            locks: ProjectLocks::default(),
        })
    }

    fn project_dir(&self, project: &str) -> PathBuf {
        self.root_dir.join(project_dir_name(project))
    }

    fn read_schema(&self, project: &str) -> Result<Option<ColumnarSchema>> {
        let path = self.project_dir(project).join(SCHEMA_FILE);
        if !path.exists() {
            return Ok(None);
        }
        let data = fs::read(&path)
            .with_context(|| format!("failed to read schema file {:?}", path))
            .map_err(AppError::unavailable)?;
        serde_json::from_slice(&data).map(Some).map_err(|err| {
            AppError::unavailable(format!("schema file {:?} is unreadable: {}", path, err))
        })
    }

    fn write_schema(&self, project_dir: &Path, schema: &ColumnarSchema) -> AnyResult<()> {
        let path = project_dir.join(SCHEMA_FILE);
        let staging = project_dir.join(format!("{}.tmp", SCHEMA_FILE));
        let data = serde_json::to_vec_pretty(schema).context("failed to serialize schema")?;
        fs::write(&staging, data)
            .with_context(|| format!("failed to write schema file {:?}", staging))?;
        fs::rename(&staging, &path)
            .with_context(|| format!("failed to publish schema file {:?}", path))
    }

    fn load_rows(&self, project: &str, schema: &ColumnarSchema) -> Result<Vec<Row>> {
        let path = self.project_dir(project).join(&schema.data_file);
        let df = read_frame(&path)?;
        Ok(frame_rows(&df, &schema.columns)?)
    }
}

impl RowStore for ColumnarStore {
    fn replace_all(
        &self,
        project: &str,
        fields: &[String],
        rows: &[Row],
    ) -> Result<ReplaceOutcome> {
        let handle = self.locks.handle(project);
        let _guard = handle.write();

        let project_dir = self.project_dir(project);
        fs::create_dir_all(&project_dir)
            .with_context(|| format!("failed to create project dir {:?}", project_dir))?;
        let previous = self.read_schema(project)?;
        let outcome = ReplaceOutcome::between(
            previous.as_ref().map(|schema| schema.fields.as_slice()),
            fields,
        );

        let columns = stored_columns(fields, rows);
        let next = ColumnarSchema {
            fields: fields.to_vec(),
            data_file: format!("data-{}.parquet", Uuid::new_v4()),
            generation: previous.as_ref().map_or(1, |schema| schema.generation + 1),
            columns,
        };
        let data_path = project_dir.join(&next.data_file);
        let staged = build_frame(&next.columns, rows)
            .and_then(|mut df| write_frame(&data_path, &mut df))
            .and_then(|_| self.write_schema(&project_dir, &next));
        if let Err(err) = staged {
            if data_path.exists() {
                let _ = fs::remove_file(&data_path);
            }
            return Err(err.into());
        }

        if let Some(previous) = previous {
            if outcome == ReplaceOutcome::Migrated {
                info!(
                    "[columnar] migrated project={} fields {:?} -> {:?}",
                    project, previous.fields, next.fields
                );
            }
            let stale = project_dir.join(&previous.data_file);
            if let Err(err) = fs::remove_file(&stale) {
                warn!("[columnar] failed to remove superseded file {:?}: {}", stale, err);
            }
        }
        debug!(
            "[columnar] replaced project={} generation={} rows={}",
            project,
            next.generation,
            rows.len()
        );
        Ok(outcome)
    }

    fn read_all(&self, project: &str) -> Result<Vec<Row>> {
        let handle = self.locks.handle(project);
        let _guard = handle.read();
        match self.read_schema(project)? {
            Some(schema) => self.load_rows(project, &schema),
            None => Ok(Vec::new()),
        }
    }

    fn exists(&self, project: &str) -> Result<bool> {
        let handle = self.locks.handle(project);
        let _guard = handle.read();
        Ok(self.project_dir(project).join(SCHEMA_FILE).exists())
    }

    fn schema(&self, project: &str) -> Result<Option<Vec<String>>> {
        let handle = self.locks.handle(project);
        let _guard = handle.read();
        Ok(self.read_schema(project)?.map(|schema| schema.fields))
    }

    fn clear(&self, project: &str) -> Result<()> {
        let handle = self.locks.handle(project);
        let _guard = handle.write();
        let project_dir = self.project_dir(project);
        if project_dir.exists() {
            fs::remove_dir_all(&project_dir)
                .with_context(|| format!("failed to remove project dir {:?}", project_dir))?;
            debug!("[columnar] cleared project={}", project);
        }
        Ok(())
    }
}
