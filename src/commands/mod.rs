//! Entry points a UI shell invokes. Payloads and responses use camelCase JSON; failures
//! come back as display strings.

mod charts;
mod export;
mod projects;
mod rows;

pub use charts::{
    add_chart, chart_buckets, load_chart_data, remove_chart, AddChartPayload,
    ChartBucketsPayload, ChartData, ChartDataPayload, RemoveChartPayload,
};
pub use export::{export_project_rows, ExportRowsPayload};
pub use projects::{
    create_project, delete_project, import_project_file, import_project_text, list_projects,
    update_project, CreateProjectPayload, ImportFilePayload, ImportSummary, ImportTextPayload,
    ProjectRequest, UpdateProjectPayload,
};
pub use rows::{is_current_request, query_project_rows, QueryRowsPayload, QueryRowsResponse};
