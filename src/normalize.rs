use serde_json::Value;

use crate::{
    csv_source::ParsedInput,
    error::{AppError, Result},
    models::{Dataset, Row},
    value_utils::value_to_text,
};

/// Turns parsed records into uniform text rows.
///
/// Any parser issue aborts the import with the first issue's message. Records that are not
/// objects, keys that are blank after trimming and records left without keys are dropped.
/// The field list comes from the first surviving row.
pub fn normalize(input: ParsedInput) -> Result<Dataset> {
    if let Some(issue) = input.issues.first() {
        return Err(AppError::Parse(issue.message.clone()));
    }

    let rows: Vec<Row> = input
        .records
        .iter()
        .filter_map(normalize_record)
        .collect();
    let fields = rows
        .first()
        .map(|row| row.fields().map(str::to_string).collect())
        .unwrap_or_default();
    Ok(Dataset { fields, rows })
}

fn normalize_record(record: &Value) -> Option<Row> {
    let object = record.as_object()?;
    let mut row = Row::with_capacity(object.len());
    for (key, value) in object {
        let key = key.trim();
        if key.is_empty() {
            continue;
        }
        row.insert(key, value_to_text(value));
    }
    if row.is_empty() {
        None
    } else {
        Some(row)
    }
}
