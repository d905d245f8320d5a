use std::collections::HashMap;

use serde::Serialize;

use crate::{collation::compare_text, models::Row};

/// Label used for blank values.
pub const EMPTY_BUCKET_LABEL: &str = "(Empty)";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Bucket {
    pub value: String,
    pub count: usize,
}

/// Counts distinct trimmed values of `field`, most frequent first.
///
/// Ties are ordered by value, case-insensitively and numbers by magnitude, then by exact
/// text. Callers pass rows that are already filtered; nothing is paginated here.
pub fn aggregate(rows: &[Row], field: &str) -> Vec<Bucket> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    for row in rows {
        let value = row.text(field).trim();
        let label = if value.is_empty() {
            EMPTY_BUCKET_LABEL
        } else {
            value
        };
        *counts.entry(label.to_string()).or_insert(0) += 1;
    }

    let mut buckets: Vec<Bucket> = counts
        .into_iter()
        .map(|(value, count)| Bucket { value, count })
        .collect();
    buckets.sort_by(|a, b| {
        b.count
            .cmp(&a.count)
            .then_with(|| compare_text(&a.value, &b.value))
            .then_with(|| a.value.cmp(&b.value))
    });
    buckets
}
