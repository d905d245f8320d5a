use chrono::{DateTime, Utc};
use serde::{ser::SerializeMap, Deserialize, Serialize, Serializer};
use uuid::Uuid;

/// One record of a dataset: field name to text, in the order the fields were read.
#[derive(Debug, Clone, Default, Eq)]
pub struct Row {
    cells: Vec<(String, String)>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            cells: Vec::with_capacity(capacity),
        }
    }

    /// Sets `field`, replacing an existing value in place so the key keeps its position.
    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<String>) {
        let field = field.into();
        let value = value.into();
        if let Some(cell) = self.cells.iter_mut().find(|(name, _)| *name == field) {
            cell.1 = value;
        } else {
            self.cells.push((field, value));
        }
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.cells
            .iter()
            .find(|(name, _)| name == field)
            .map(|(_, value)| value.as_str())
    }

    /// Value used for matching and ordering; a missing field reads as "".
    pub fn text(&self, field: &str) -> &str {
        self.get(field).unwrap_or("")
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.cells.iter().map(|(name, _)| name.as_str())
    }

    pub fn cells(&self) -> &[(String, String)] {
        &self.cells
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

impl PartialEq for Row {
    fn eq(&self, other: &Self) -> bool {
        self.cells.len() == other.cells.len()
            && self
                .cells
                .iter()
                .all(|(name, value)| other.get(name) == Some(value.as_str()))
    }
}

impl From<Vec<(String, String)>> for Row {
    fn from(cells: Vec<(String, String)>) -> Self {
        let mut row = Row::with_capacity(cells.len());
        for (field, value) in cells {
            row.insert(field, value);
        }
        row
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Row {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut row = Row::new();
        for (field, value) in iter {
            row.insert(field, value);
        }
        row
    }
}

impl Serialize for Row {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.cells.len()))?;
        for (name, value) in &self.cells {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

/// Normalized rows of one import plus the field list taken from the first row.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Dataset {
    pub fields: Vec<String>,
    pub rows: Vec<Row>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChartDefinition {
    pub id: Uuid,
    pub field: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProjectRecord {
    pub id: Uuid,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub charts: Vec<ChartDefinition>,
}

impl ProjectRecord {
    /// Namespace the row store uses for this project.
    pub fn store_key(&self) -> String {
        self.id.to_string()
    }
}
