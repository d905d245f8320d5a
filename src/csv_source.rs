use std::{fs, io::Read, path::Path};

use anyhow::{Context, Result};
use csv::ReaderBuilder;
use serde_json::{Map, Value};

/// Structural problem found on one line of the input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseIssue {
    pub line: Option<u64>,
    pub message: String,
}

/// Raw records handed to the normalizer together with everything the parser complained about.
#[derive(Debug, Clone, Default)]
pub struct ParsedInput {
    pub records: Vec<Value>,
    pub issues: Vec<ParseIssue>,
}

impl ParsedInput {
    pub fn from_records(records: Vec<Value>) -> Self {
        Self {
            records,
            issues: Vec::new(),
        }
    }

    pub fn has_issues(&self) -> bool {
        !self.issues.is_empty()
    }
}

pub fn read_csv_file(path: &Path) -> Result<ParsedInput> {
    let mut file =
        fs::File::open(path).with_context(|| format!("failed to open CSV file {:?}", path))?;
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes)
        .with_context(|| format!("failed to read CSV file {:?}", path))?;
    let text = String::from_utf8_lossy(&bytes);
    Ok(parse_csv_str(&text))
}

/// Parses comma separated text whose first non-empty line holds the field names.
pub fn parse_csv_str(text: &str) -> ParsedInput {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(text.as_bytes());

    let open_quote_line = unterminated_quote_line(text);
    let mut parsed = ParsedInput::default();
    let headers: Vec<String> = match reader.headers() {
        Ok(headers) => headers.iter().map(str::to_string).collect(),
        Err(err) => {
            parsed.issues.push(ParseIssue {
                line: err.position().map(|pos| pos.line()),
                message: err.to_string(),
            });
            return parsed;
        }
    };
    if headers.is_empty() {
        return parsed;
    }

    let mut last_record_line = None;
    for result in reader.records() {
        let record = match result {
            Ok(record) => record,
            Err(err) => {
                parsed.issues.push(ParseIssue {
                    line: err.position().map(|pos| pos.line()),
                    message: err.to_string(),
                });
                continue;
            }
        };
        let line = record.position().map(|pos| pos.line());
        last_record_line = line;
        if record.len() < headers.len() {
            parsed.issues.push(ParseIssue {
                line,
                message: format!(
                    "Too few fields: expected {} fields but parsed {}",
                    headers.len(),
                    record.len()
                ),
            });
        } else if record.len() > headers.len() {
            parsed.issues.push(ParseIssue {
                line,
                message: format!(
                    "Too many fields: expected {} fields but parsed {}",
                    headers.len(),
                    record.len()
                ),
            });
        }

        let mut object = Map::new();
        for (header, cell) in headers.iter().zip(record.iter()) {
            object.insert(header.clone(), Value::String(cell.to_string()));
        }
        parsed.records.push(Value::Object(object));
    }

    if let Some(line) = open_quote_line {
        // The open quote swallowed the rest of the input into the last record, so its
        // field count says nothing.
        if let Some(last) = last_record_line {
            parsed.issues.retain(|issue| issue.line.map_or(true, |l| l < last));
        }
        parsed.issues.push(ParseIssue {
            line: Some(line),
            message: "Quoted field unterminated".to_string(),
        });
    }
    parsed
}

/// Line of a quoted field that is still open at the end of `text`.
///
/// The reader accepts such input and returns everything up to the end as one cell. Quotes
/// count only at the start of a field, and `""` inside a quoted field is an escape.
fn unterminated_quote_line(text: &str) -> Option<u64> {
    let mut line = 1u64;
    let mut field_start = true;
    let mut open_line: Option<u64> = None;
    let mut bytes = text.bytes().peekable();
    while let Some(byte) = bytes.next() {
        if open_line.is_some() {
            match byte {
                b'"' if bytes.peek() == Some(&b'"') => {
                    bytes.next();
                }
                b'"' => open_line = None,
                b'\n' => line += 1,
                _ => {}
            }
            continue;
        }
        match byte {
            b'"' if field_start => open_line = Some(line),
            b',' | b'\r' => field_start = true,
            b'\n' => {
                line += 1;
                field_start = true;
            }
            _ => field_start = false,
        }
    }
    open_line
}
