use std::path::PathBuf;

use log::{info, warn};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    csv_source::{parse_csv_str, read_csv_file, ParsedInput},
    error::AppError,
    models::ProjectRecord,
    normalize::normalize,
    state::AppState,
    store::ReplaceOutcome,
};

#[derive(Debug, Deserialize)]
pub struct CreateProjectPayload {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ProjectRequest {
    #[serde(rename = "projectId")]
    pub project_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct UpdateProjectPayload {
    #[serde(rename = "projectId")]
    pub project_id: Uuid,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ImportFilePayload {
    #[serde(rename = "projectId")]
    pub project_id: Uuid,
    pub path: String,
}

#[derive(Debug, Deserialize)]
pub struct ImportTextPayload {
    #[serde(rename = "projectId")]
    pub project_id: Uuid,
    pub text: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportSummary {
    pub project: ProjectRecord,
    pub fields: Vec<String>,
    pub total_rows: usize,
    pub outcome: ReplaceOutcome,
}

fn find_project(state: &AppState, id: &Uuid) -> Result<ProjectRecord, AppError> {
    state
        .projects
        .find(id)
        .ok_or_else(|| AppError::Message("Project not found.".into()))
}

/// Lists saved projects ordered by creation time (newest first).
pub fn list_projects(state: &AppState) -> Result<Vec<ProjectRecord>, String> {
    Ok(state.projects.all())
}

pub fn create_project(
    state: &AppState,
    payload: CreateProjectPayload,
) -> Result<ProjectRecord, String> {
    if payload.name.trim().is_empty() {
        return Err(AppError::Message("Project name is required.".into()).into());
    }
    let record = state
        .projects
        .create(&payload.name, payload.description)
        .map_err(AppError::from)?;
    info!("[projects] created project id={} name={:?}", record.id, record.name);
    Ok(record)
}

pub fn update_project(
    state: &AppState,
    payload: UpdateProjectPayload,
) -> Result<ProjectRecord, String> {
    let updated = state
        .projects
        .update_details(&payload.project_id, payload.name, payload.description)
        .map_err(AppError::from)?
        .ok_or_else(|| AppError::Message("Project not found.".into()))?;
    Ok(updated)
}

/// Removes a project's stored rows and then its record. Unknown ids are ignored.
pub fn delete_project(state: &AppState, request: ProjectRequest) -> Result<(), String> {
    let store_key = request.project_id.to_string();
    state.rows.clear(&store_key)?;
    if state.projects.find(&request.project_id).is_none() {
        warn!(
            "[projects] delete requested for unknown project id={}",
            request.project_id
        );
        return Ok(());
    }
    state
        .projects
        .remove(&request.project_id)
        .map_err(AppError::from)?;
    info!("[projects] deleted project id={}", request.project_id);
    Ok(())
}

/// Replaces a project's dataset with the contents of a CSV file.
pub fn import_project_file(
    state: &AppState,
    payload: ImportFilePayload,
) -> Result<ImportSummary, String> {
    let record = find_project(state, &payload.project_id)?;
    let source_path = PathBuf::from(&payload.path);
    if !source_path.exists() {
        return Err(AppError::Message("Selected file no longer exists.".into()).into());
    }
    let parsed = read_csv_file(&source_path).map_err(AppError::from)?;
    Ok(import_parsed(state, &record, parsed)?)
}

/// Replaces a project's dataset with CSV text already in memory.
pub fn import_project_text(
    state: &AppState,
    payload: ImportTextPayload,
) -> Result<ImportSummary, String> {
    let record = find_project(state, &payload.project_id)?;
    Ok(import_parsed(state, &record, parse_csv_str(&payload.text))?)
}

fn import_parsed(
    state: &AppState,
    record: &ProjectRecord,
    parsed: ParsedInput,
) -> Result<ImportSummary, AppError> {
    let dataset = normalize(parsed).map_err(|err| {
        warn!("[projects] import into id={} rejected: {}", record.id, err);
        err
    })?;
    let outcome = state
        .rows
        .replace_all(&record.store_key(), &dataset.fields, &dataset.rows)?;
    let project = state
        .projects
        .touch(&record.id)?
        .unwrap_or_else(|| record.clone());
    info!(
        "[projects] imported id={} rows={} fields={} outcome={:?}",
        record.id,
        dataset.rows.len(),
        dataset.fields.len(),
        outcome
    );
    Ok(ImportSummary {
        project,
        total_rows: dataset.rows.len(),
        fields: dataset.fields,
        outcome,
    })
}
