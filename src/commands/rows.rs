use log::debug;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    models::Row,
    query::{execute, QueryRequest, SortDirection},
    state::AppState,
};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryRowsPayload {
    pub project_id: Uuid,
    #[serde(default)]
    pub page: Option<i64>,
    #[serde(default)]
    pub page_size: Option<i64>,
    #[serde(default)]
    pub sort_field: Option<String>,
    #[serde(default)]
    pub sort_direction: Option<SortDirection>,
    #[serde(default)]
    pub filter_field: Option<String>,
    #[serde(default)]
    pub filter_value: Option<String>,
}

impl QueryRowsPayload {
    /// Builds the engine request, clamping page numbers and sizes below 1.
    pub fn to_request(&self, default_page_size: usize) -> QueryRequest {
        QueryRequest {
            page: self.page.unwrap_or(1).max(1) as usize,
            page_size: self
                .page_size
                .map(|size| size.max(1) as usize)
                .unwrap_or(default_page_size),
            sort_field: self.sort_field.clone(),
            sort_direction: self.sort_direction,
            filter_field: self.filter_field.clone(),
            filter_value: self.filter_value.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryRowsResponse {
    /// Compare with the latest id before rendering; older responses are stale.
    pub request_id: u64,
    pub rows: Vec<Row>,
    pub fields: Vec<String>,
    pub total: usize,
    pub page: usize,
    pub page_size: usize,
    pub query_description: String,
}

/// Reads one page of a project's rows with the requested filter and sort.
pub fn query_project_rows(
    state: &AppState,
    payload: QueryRowsPayload,
) -> Result<QueryRowsResponse, String> {
    let ticket = state.requests.begin();
    let request = payload.to_request(state.config.default_page_size);
    let result = execute(
        state.rows.as_ref(),
        &payload.project_id.to_string(),
        &request,
        state.filter_mode(),
    )?;
    debug!(
        "[rows] request={} project={} total={} page_rows={}",
        ticket.id(),
        payload.project_id,
        result.total,
        result.rows.len()
    );
    Ok(QueryRowsResponse {
        request_id: ticket.id(),
        rows: result.rows,
        fields: result.fields,
        total: result.total,
        page: request.page_number(),
        page_size: request.limit(),
        query_description: result.query_description,
    })
}

pub fn is_current_request(state: &AppState, request_id: u64) -> bool {
    state.requests.is_current(request_id)
}
