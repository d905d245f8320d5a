use std::fs;
use std::path::PathBuf;

use anyhow::Context;
use csv::WriterBuilder;
use log::info;
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    error::AppError,
    models::Row,
    query::{matching_rows, QueryRequest, SortDirection},
    state::AppState,
};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportRowsPayload {
    pub project_id: Uuid,
    pub destination: String,
    #[serde(default)]
    pub sort_field: Option<String>,
    #[serde(default)]
    pub sort_direction: Option<SortDirection>,
    #[serde(default)]
    pub filter_field: Option<String>,
    #[serde(default)]
    pub filter_value: Option<String>,
}

fn export_header(schema: Option<Vec<String>>, rows: &[Row]) -> Vec<String> {
    let mut header = schema.unwrap_or_default();
    for row in rows {
        for field in row.fields() {
            if !header.iter().any(|known| known == field) {
                header.push(field.to_string());
            }
        }
    }
    header
}

/// Writes every row of the current view (filter and sort applied, no paging) to a CSV file.
/// Returns the number of data rows written.
pub fn export_project_rows(state: &AppState, payload: ExportRowsPayload) -> Result<usize, String> {
    let store_key = payload.project_id.to_string();
    if !state.rows.exists(&store_key)? {
        return Err(AppError::Message("Project has no imported data.".into()).into());
    }
    let request = QueryRequest {
        sort_field: payload.sort_field,
        sort_direction: payload.sort_direction,
        filter_field: payload.filter_field,
        filter_value: payload.filter_value,
        ..QueryRequest::default()
    };
    let rows = matching_rows(state.rows.as_ref(), &store_key, &request, state.filter_mode())?;
    let header = export_header(state.rows.schema(&store_key)?, &rows);

    let destination = PathBuf::from(&payload.destination);
    if let Some(parent) = destination.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create export dir {:?}", parent))
            .map_err(AppError::from)?;
    }
    let mut writer = WriterBuilder::new()
        .has_headers(true)
        .from_path(&destination)
        .with_context(|| format!("failed to create export CSV {:?}", destination))
        .map_err(AppError::from)?;
    if !header.is_empty() {
        writer
            .write_record(&header)
            .context("failed to write export CSV header")
            .map_err(AppError::from)?;
    }
    for row in &rows {
        writer
            .write_record(header.iter().map(|field| row.text(field)))
            .context("failed to write export CSV row")
            .map_err(AppError::from)?;
    }
    writer
        .flush()
        .context("failed to flush export CSV")
        .map_err(AppError::from)?;
    info!(
        "[export] wrote {} rows of project {} to {:?}",
        rows.len(),
        payload.project_id,
        destination
    );
    Ok(rows.len())
}
