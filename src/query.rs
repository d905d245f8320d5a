//! Filter, sort and paginate one project's rows.
//!
//! `execute` picks between two retrieval strategies. When the sort field is the only field
//! involved (or the filter is on that same field) the rows come pre-ordered from the
//! store's index and are filtered in a single pass; otherwise all rows are read, filtered
//! and sorted in memory. Both strategies produce identical results.

use std::fmt;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::{collation::collation_key, error::Result, models::Row, store::RowStore};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SortDirection {
    #[default]
    #[serde(rename = "asc", alias = "ascending", alias = "ASC")]
    Asc,
    #[serde(rename = "desc", alias = "descending", alias = "DESC")]
    Desc,
}

impl fmt::Display for SortDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SortDirection::Asc => write!(f, "ASC"),
            SortDirection::Desc => write!(f, "DESC"),
        }
    }
}

/// How filter text is matched against a field value. Fixed per deployment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterMode {
    #[default]
    Contains,
    StartsWith,
}

impl FilterMode {
    /// `needle` must already be lowercase.
    pub fn matches(self, value: &str, needle: &str) -> bool {
        let value = value.to_lowercase();
        match self {
            FilterMode::Contains => value.contains(needle),
            FilterMode::StartsWith => value.starts_with(needle),
        }
    }

    fn like_pattern(self, value: &str) -> String {
        match self {
            FilterMode::Contains => format!("%{}%", value),
            FilterMode::StartsWith => format!("{}%", value),
        }
    }
}

/// Parameters of one read. Out-of-range values are coerced, never rejected.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct QueryRequest {
    pub page: usize,
    pub page_size: usize,
    pub sort_field: Option<String>,
    pub sort_direction: Option<SortDirection>,
    pub filter_field: Option<String>,
    pub filter_value: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortSpec<'a> {
    pub field: &'a str,
    pub direction: SortDirection,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterSpec<'a> {
    pub field: &'a str,
    /// Trimmed filter text as typed.
    pub text: &'a str,
    /// Lowercased `text`, used for matching.
    pub needle: String,
}

impl FilterSpec<'_> {
    pub fn matches(&self, row: &Row, mode: FilterMode) -> bool {
        mode.matches(row.text(self.field), &self.needle)
    }
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|text| !text.trim().is_empty())
}

impl QueryRequest {
    pub fn page(page: usize, page_size: usize) -> Self {
        Self {
            page,
            page_size,
            ..Self::default()
        }
    }

    pub fn sorted_by(mut self, field: impl Into<String>, direction: SortDirection) -> Self {
        self.sort_field = Some(field.into());
        self.sort_direction = Some(direction);
        self
    }

    pub fn filtered_by(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.filter_field = Some(field.into());
        self.filter_value = Some(value.into());
        self
    }

    pub fn page_number(&self) -> usize {
        self.page.max(1)
    }

    pub fn limit(&self) -> usize {
        self.page_size.max(1)
    }

    pub fn offset(&self) -> usize {
        (self.page_number() - 1).saturating_mul(self.limit())
    }

    pub fn sort(&self) -> Option<SortSpec<'_>> {
        present(&self.sort_field).map(|field| SortSpec {
            field,
            direction: self.sort_direction.unwrap_or_default(),
        })
    }

    /// Active filter; blank filter text means no filter.
    pub fn filter(&self) -> Option<FilterSpec<'_>> {
        let field = present(&self.filter_field)?;
        let text = self.filter_value.as_deref()?.trim();
        if text.is_empty() {
            return None;
        }
        Some(FilterSpec {
            field,
            text,
            needle: text.to_lowercase(),
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResult {
    pub rows: Vec<Row>,
    /// Fields present on the returned rows. Empty whenever `rows` is empty.
    pub fields: Vec<String>,
    pub total: usize,
    /// Display-only rendering of the request as SQL. Never executed.
    pub query_description: String,
}

/// Retrieval strategy chosen for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryPlan {
    Scan,
    Filter,
    Sort,
    FilterThenSort,
    /// Ordered index scan on the sort field, filtering in the same pass.
    IndexScan,
}

pub fn plan(request: &QueryRequest) -> QueryPlan {
    match (request.filter(), request.sort()) {
        (None, None) => QueryPlan::Scan,
        (Some(_), None) => QueryPlan::Filter,
        (None, Some(_)) => QueryPlan::IndexScan,
        (Some(filter), Some(sort)) if filter.field == sort.field => QueryPlan::IndexScan,
        (Some(_), Some(_)) => QueryPlan::FilterThenSort,
    }
}

pub fn describe(project: &str, request: &QueryRequest, mode: FilterMode) -> String {
    let mut sql = format!("SELECT * FROM \"{}\"", project);
    if let Some(filter) = request.filter() {
        sql.push_str(&format!(
            " WHERE \"{}\" LIKE '{}'",
            filter.field,
            mode.like_pattern(&filter.text.replace('\'', "''"))
        ));
    }
    if let Some(sort) = request.sort() {
        sql.push_str(&format!(" ORDER BY \"{}\" {}", sort.field, sort.direction));
    }
    sql.push_str(&format!(
        " LIMIT {} OFFSET {}",
        request.limit(),
        request.offset()
    ));
    sql
}

/// Rows matching the request's filter, in storage order. Sorting and paging are ignored.
pub fn filter_rows(rows: Vec<Row>, request: &QueryRequest, mode: FilterMode) -> Vec<Row> {
    match request.filter() {
        Some(filter) => rows
            .into_iter()
            .filter(|row| filter.matches(row, mode))
            .collect(),
        None => rows,
    }
}

/// Stable sort by the collation key of `sort.field`.
pub fn sort_rows(rows: Vec<Row>, sort: SortSpec<'_>) -> Vec<Row> {
    let keys: Vec<Vec<u8>> = rows
        .iter()
        .map(|row| collation_key(row.text(sort.field)))
        .collect();
    let mut order: Vec<usize> = (0..rows.len()).collect();
    match sort.direction {
        SortDirection::Asc => order.sort_by(|a, b| keys[*a].cmp(&keys[*b])),
        SortDirection::Desc => order.sort_by(|a, b| keys[*b].cmp(&keys[*a])),
    }
    let mut slots: Vec<Option<Row>> = rows.into_iter().map(Some).collect();
    order
        .into_iter()
        .filter_map(|idx| slots[idx].take())
        .collect()
}

fn observed_fields(rows: &[Row]) -> Vec<String> {
    let mut fields: Vec<String> = Vec::new();
    for row in rows {
        for field in row.fields() {
            if !fields.iter().any(|known| known == field) {
                fields.push(field.to_string());
            }
        }
    }
    fields
}

fn filter_then_sort(
    store: &dyn RowStore,
    project: &str,
    request: &QueryRequest,
    mode: FilterMode,
) -> Result<Vec<Row>> {
    let matched = filter_rows(store.read_all(project)?, request, mode);
    Ok(match request.sort() {
        Some(sort) => sort_rows(matched, sort),
        None => matched,
    })
}

/// Matching rows in final order, before pagination.
pub fn matching_rows(
    store: &dyn RowStore,
    project: &str,
    request: &QueryRequest,
    mode: FilterMode,
) -> Result<Vec<Row>> {
    let plan = plan(request);
    debug!("[query] project={} plan={:?}", project, plan);
    if plan == QueryPlan::IndexScan {
        if let Some(sort) = request.sort() {
            if let Some(ordered) = store.scan_ordered(project, sort.field, sort.direction)? {
                return Ok(filter_rows(ordered, request, mode));
            }
            debug!(
                "[query] no index on {:?} for project={}, sorting in memory",
                sort.field, project
            );
        }
    }
    filter_then_sort(store, project, request, mode)
}

/// Runs `request` against `project`. A project without a store yields an empty result.
pub fn execute(
    store: &dyn RowStore,
    project: &str,
    request: &QueryRequest,
    mode: FilterMode,
) -> Result<QueryResult> {
    let query_description = describe(project, request, mode);
    if !store.exists(project)? {
        return Ok(QueryResult {
            query_description,
            ..QueryResult::default()
        });
    }

    let matched = matching_rows(store, project, request, mode)?;
    let total = matched.len();
    let rows: Vec<Row> = matched
        .into_iter()
        .skip(request.offset())
        .take(request.limit())
        .collect();
    Ok(QueryResult {
        fields: observed_fields(&rows),
        rows,
        total,
        query_description,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn people() -> (Vec<String>, Vec<Row>) {
        let rows: Vec<Row> = vec![
            [("name", "Bob"), ("age", "30")].into_iter().collect(),
            [("name", "Ann"), ("age", "25")].into_iter().collect(),
        ];
        (vec!["name".into(), "age".into()], rows)
    }

    fn store_with_people() -> MemoryStore {
        let store = MemoryStore::new();
        let (fields, rows) = people();
        store.replace_all("p", &fields, &rows).unwrap();
        store
    }

    #[test]
    fn request_values_are_coerced() {
        let request = QueryRequest::page(0, 0);
        assert_eq!(request.page_number(), 1);
        assert_eq!(request.limit(), 1);
        assert_eq!(request.offset(), 0);
        assert_eq!(QueryRequest::page(3, 20).offset(), 40);
        assert_eq!(QueryRequest::page(usize::MAX, usize::MAX).offset(), usize::MAX);
    }

    #[test]
    fn blank_filter_text_is_no_filter() {
        let request = QueryRequest::page(1, 10).filtered_by("name", "   ");
        assert!(request.filter().is_none());
        let request = QueryRequest::page(1, 10).filtered_by("", "x");
        assert!(request.filter().is_none());
        let request = QueryRequest::page(1, 10).filtered_by("name", "  Ab ");
        let filter = request.filter().unwrap();
        assert_eq!(filter.text, "Ab");
        assert_eq!(filter.needle, "ab");
    }

    #[test]
    fn sort_direction_defaults_to_ascending() {
        let mut request = QueryRequest::page(1, 10);
        request.sort_field = Some("age".into());
        assert_eq!(request.sort().unwrap().direction, SortDirection::Asc);
    }

    #[test]
    fn plans_follow_field_overlap() {
        let base = QueryRequest::page(1, 10);
        assert_eq!(plan(&base), QueryPlan::Scan);
        assert_eq!(plan(&base.clone().filtered_by("a", "x")), QueryPlan::Filter);
        assert_eq!(
            plan(&base.clone().sorted_by("a", SortDirection::Asc)),
            QueryPlan::IndexScan
        );
        assert_eq!(
            plan(
                &base
                    .clone()
                    .filtered_by("a", "x")
                    .sorted_by("a", SortDirection::Desc)
            ),
            QueryPlan::IndexScan
        );
        assert_eq!(
            plan(
                &base
                    .filtered_by("a", "x")
                    .sorted_by("b", SortDirection::Desc)
            ),
            QueryPlan::FilterThenSort
        );
    }

    #[test]
    fn description_reflects_request() {
        let request = QueryRequest::page(3, 25)
            .filtered_by("name", " O'Brien ")
            .sorted_by("age", SortDirection::Desc);
        assert_eq!(
            describe("proj-1", &request, FilterMode::Contains),
            "SELECT * FROM \"proj-1\" WHERE \"name\" LIKE '%O''Brien%' ORDER BY \"age\" DESC LIMIT 25 OFFSET 50"
        );
        assert_eq!(
            describe("p", &QueryRequest::page(1, 10).filtered_by("name", "a"), FilterMode::StartsWith),
            "SELECT * FROM \"p\" WHERE \"name\" LIKE 'a%' LIMIT 10 OFFSET 0"
        );
    }

    #[test]
    fn contains_filter_matches_case_insensitively() {
        let store = store_with_people();
        let request = QueryRequest::page(1, 10).filtered_by("name", "a");
        let result = execute(&store, "p", &request, FilterMode::Contains).unwrap();
        assert_eq!(result.total, 1);
        assert_eq!(result.rows[0].get("name"), Some("Ann"));
    }

    #[test]
    fn starts_with_mode_is_stricter() {
        let store = store_with_people();
        let request = QueryRequest::page(1, 10).filtered_by("name", "n");
        let contains = execute(&store, "p", &request, FilterMode::Contains).unwrap();
        let prefix = execute(&store, "p", &request, FilterMode::StartsWith).unwrap();
        assert_eq!(contains.total, 1);
        assert_eq!(prefix.total, 0);
    }

    #[test]
    fn sort_by_age_ascending() {
        let store = store_with_people();
        let request = QueryRequest::page(1, 10).sorted_by("age", SortDirection::Asc);
        let result = execute(&store, "p", &request, FilterMode::Contains).unwrap();
        let names: Vec<&str> = result.rows.iter().map(|row| row.text("name")).collect();
        assert_eq!(names, vec!["Ann", "Bob"]);
        assert_eq!(result.fields, vec!["name", "age"]);
    }

    #[test]
    fn missing_store_is_an_empty_result() {
        let store = MemoryStore::new();
        let request = QueryRequest::page(2, 5);
        let result = execute(&store, "nobody", &request, FilterMode::Contains).unwrap();
        assert!(result.rows.is_empty());
        assert!(result.fields.is_empty());
        assert_eq!(result.total, 0);
        assert_eq!(
            result.query_description,
            "SELECT * FROM \"nobody\" LIMIT 5 OFFSET 5"
        );
    }

    #[test]
    fn empty_page_reports_no_fields() {
        let store = store_with_people();
        let request = QueryRequest::page(9, 10);
        let result = execute(&store, "p", &request, FilterMode::Contains).unwrap();
        assert!(result.rows.is_empty());
        assert!(result.fields.is_empty());
        assert_eq!(result.total, 2);
    }

    #[test]
    fn missing_filter_field_reads_as_empty() {
        let store = MemoryStore::new();
        let rows: Vec<Row> = vec![
            [("name", "Bob")].into_iter().collect(),
            [("name", "Ann"), ("team", "red")].into_iter().collect(),
        ];
        store
            .replace_all("p", &["name".to_string()], &rows)
            .unwrap();
        let request = QueryRequest::page(1, 10).filtered_by("team", "re");
        let result = execute(&store, "p", &request, FilterMode::Contains).unwrap();
        assert_eq!(result.total, 1);
        assert_eq!(result.fields, vec!["name", "team"]);
    }

    #[test]
    fn sort_rows_is_stable() {
        let rows: Vec<Row> = ["b", "a", "B", "a"]
            .iter()
            .enumerate()
            .map(|(idx, key)| [("k", key.to_string()), ("i", idx.to_string())].into_iter().collect())
            .collect();
        let ids = |rows: Vec<Row>| -> Vec<String> {
            rows.iter().map(|row| row.text("i").to_string()).collect()
        };
        let asc = sort_rows(rows.clone(), SortSpec { field: "k", direction: SortDirection::Asc });
        let desc = sort_rows(rows, SortSpec { field: "k", direction: SortDirection::Desc });
        assert_eq!(ids(asc), vec!["1", "3", "0", "2"]);
        assert_eq!(ids(desc), vec!["0", "2", "1", "3"]);
    }
}
