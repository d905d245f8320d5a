use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    chart::{aggregate, Bucket},
    error::AppError,
    models::{ChartDefinition, ProjectRecord, Row},
    query::{filter_rows, QueryRequest},
    state::AppState,
};

#[derive(Debug, Deserialize)]
pub struct AddChartPayload {
    #[serde(rename = "projectId")]
    pub project_id: Uuid,
    pub field: String,
}

#[derive(Debug, Deserialize)]
pub struct RemoveChartPayload {
    #[serde(rename = "projectId")]
    pub project_id: Uuid,
    #[serde(rename = "chartId")]
    pub chart_id: Uuid,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartDataPayload {
    pub project_id: Uuid,
    #[serde(default)]
    pub filter_field: Option<String>,
    #[serde(default)]
    pub filter_value: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartBucketsPayload {
    pub project_id: Uuid,
    pub field: String,
    #[serde(default)]
    pub filter_field: Option<String>,
    #[serde(default)]
    pub filter_value: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChartData {
    pub chart: ChartDefinition,
    pub buckets: Vec<Bucket>,
}

/// Every row passing the filter, unsorted and unpaginated.
fn filtered_rows(
    state: &AppState,
    project_id: &Uuid,
    filter_field: Option<String>,
    filter_value: Option<String>,
) -> Result<Vec<Row>, AppError> {
    let request = QueryRequest {
        filter_field,
        filter_value,
        ..QueryRequest::default()
    };
    let rows = state.rows.read_all(&project_id.to_string())?;
    Ok(filter_rows(rows, &request, state.filter_mode()))
}

pub fn add_chart(state: &AppState, payload: AddChartPayload) -> Result<ChartDefinition, String> {
    let field = payload.field.trim();
    if field.is_empty() {
        return Err(AppError::Message("Choose a field for the chart.".into()).into());
    }
    let chart = state
        .projects
        .add_chart(&payload.project_id, field)
        .map_err(AppError::from)?
        .ok_or_else(|| AppError::Message("Project not found.".into()))?;
    Ok(chart)
}

pub fn remove_chart(
    state: &AppState,
    payload: RemoveChartPayload,
) -> Result<ProjectRecord, String> {
    let record = state
        .projects
        .remove_chart(&payload.project_id, &payload.chart_id)
        .map_err(AppError::from)?
        .ok_or_else(|| AppError::Message("Project not found.".into()))?;
    Ok(record)
}

/// Aggregates every saved chart of a project over the same filtered rows.
pub fn load_chart_data(
    state: &AppState,
    payload: ChartDataPayload,
) -> Result<Vec<ChartData>, String> {
    let record = state
        .projects
        .find(&payload.project_id)
        .ok_or_else(|| AppError::Message("Project not found.".into()))?;
    if record.charts.is_empty() {
        return Ok(Vec::new());
    }
    let rows = filtered_rows(
        state,
        &record.id,
        payload.filter_field,
        payload.filter_value,
    )?;
    Ok(record
        .charts
        .into_iter()
        .map(|chart| ChartData {
            buckets: aggregate(&rows, &chart.field),
            chart,
        })
        .collect())
}

/// Aggregates one field without saving a chart definition.
pub fn chart_buckets(
    state: &AppState,
    payload: ChartBucketsPayload,
) -> Result<Vec<Bucket>, String> {
    let rows = filtered_rows(
        state,
        &payload.project_id,
        payload.filter_field,
        payload.filter_value,
    )?;
    Ok(aggregate(&rows, payload.field.trim()))
}
