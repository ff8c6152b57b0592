//! Input loading for verification runs
//!
//! Reads the source spreadsheet (or a CSV export of it), checks that the key
//! column and every requested auxiliary column exist, and yields the rows in
//! file order.
//! Rows with an empty key are skipped. The column layout is resolved once here
//! so later stages never look columns up by name per record.

use std::io::Cursor;

use calamine::{open_workbook_auto_from_rs, Data, Reader};
use chrono::NaiveTime;
use serde::Serialize;
use tracing::{debug, info};

use crate::error::VerifyError;

/// Placeholder rendered for snapshot fields that have no value.
pub const NOT_AVAILABLE: &str = "N/A";

/// Columns a run asks for.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordSchema {
    /// Column holding the external identifier
    pub key_column: String,
    /// Extra columns carried through to the reports, in report order
    pub auxiliary_columns: Vec<String>,
    /// Fields shown for each matched record in the browsable summary.
    /// The first one doubles as the entry title.
    pub snapshot_fields: Vec<String>,
}

impl RecordSchema {
    pub fn new(key_column: impl Into<String>, auxiliary_columns: Vec<String>) -> Self {
        Self {
            key_column: key_column.into(),
            auxiliary_columns,
            snapshot_fields: Vec::new(),
        }
    }

    pub fn with_snapshot_fields(mut self, fields: Vec<String>) -> Self {
        self.snapshot_fields = fields;
        self
    }

    /// Key column followed by the auxiliary columns.
    pub fn required_columns(&self) -> Vec<String> {
        std::iter::once(self.key_column.clone())
            .chain(self.auxiliary_columns.iter().cloned())
            .collect()
    }
}

/// Schema after it has been checked against the file header.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedSchema {
    pub key_column: String,
    pub auxiliary_columns: Vec<String>,
    /// (label, index into `InputRecord::values`); `None` when the field is not
    /// one of the loaded auxiliary columns
    snapshot: Vec<(String, Option<usize>)>,
}

impl ResolvedSchema {
    fn resolve(schema: &RecordSchema) -> Self {
        let snapshot = schema
            .snapshot_fields
            .iter()
            .map(|field| {
                let idx = schema.auxiliary_columns.iter().position(|c| c == field);
                (field.clone(), idx)
            })
            .collect();

        Self {
            key_column: schema.key_column.clone(),
            auxiliary_columns: schema.auxiliary_columns.clone(),
            snapshot,
        }
    }

    /// Header row for every report sheet: key column, then auxiliary columns.
    pub fn columns(&self) -> Vec<&str> {
        std::iter::once(self.key_column.as_str())
            .chain(self.auxiliary_columns.iter().map(String::as_str))
            .collect()
    }

    pub fn snapshot_fields(&self) -> impl Iterator<Item = (&str, Option<usize>)> {
        self.snapshot.iter().map(|(label, idx)| (label.as_str(), *idx))
    }

    fn auxiliary_index(&self, name: &str) -> Option<usize> {
        self.auxiliary_columns.iter().position(|c| c == name)
    }
}

/// One input row. Immutable once loaded.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InputRecord {
    /// 0-based position among the rows that survived filtering
    pub position: usize,
    /// Identifier appended to the portal base URL
    pub key: String,
    /// Auxiliary values, aligned with `ResolvedSchema::auxiliary_columns`
    pub values: Vec<Option<String>>,
}

impl InputRecord {
    /// Value of an auxiliary column by name.
    pub fn field(&self, schema: &ResolvedSchema, name: &str) -> Option<&str> {
        schema
            .auxiliary_index(name)
            .and_then(|idx| self.value_at(idx))
    }

    pub fn value_at(&self, idx: usize) -> Option<&str> {
        self.values.get(idx).and_then(|v| v.as_deref())
    }

    /// Key followed by auxiliary values, empty cells as empty strings.
    pub fn row(&self) -> Vec<&str> {
        std::iter::once(self.key.as_str())
            .chain(self.values.iter().map(|v| v.as_deref().unwrap_or("")))
            .collect()
    }
}

/// Records loaded from one input file.
#[derive(Debug, Clone)]
pub struct LoadedInput {
    pub schema: ResolvedSchema,
    pub records: Vec<InputRecord>,
    /// Rows discarded because the key cell was empty
    pub skipped_rows: usize,
}

/// Split a comma-separated column list, trimming names and dropping blanks.
pub fn parse_column_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|c| c.trim())
        .filter(|c| !c.is_empty())
        .map(str::to_string)
        .collect()
}

/// Leading bytes of a zip container (xlsx, xlsm, ods)
const ZIP_MAGIC: &[u8] = b"PK\x03\x04";
/// Leading bytes of an OLE compound file (legacy xls)
const OLE_MAGIC: &[u8] = &[0xD0, 0xCF, 0x11, 0xE0];

/// Header plus data rows, cells trimmed.
struct Table {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

fn is_spreadsheet(content: &[u8]) -> bool {
    content.starts_with(ZIP_MAGIC) || content.starts_with(OLE_MAGIC)
}

fn read_csv(content: &[u8]) -> Result<Table, VerifyError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(content);

    let headers = reader
        .headers()
        .map_err(|e| VerifyError::MalformedInput(e.to_string()))?
        .iter()
        .map(str::to_string)
        .collect();

    let rows = reader
        .records()
        .map(|row| {
            row.map(|r| r.iter().map(str::to_string).collect())
                .map_err(|e| VerifyError::MalformedInput(e.to_string()))
        })
        .collect::<Result<_, _>>()?;

    Ok(Table { headers, rows })
}

fn cell_text(cell: &Data) -> String {
    match cell {
        Data::DateTime(dt) => match dt.as_datetime() {
            Some(value) if value.time() == NaiveTime::MIN => value.format("%d/%m/%Y").to_string(),
            Some(value) => value.format("%d/%m/%Y %H:%M:%S").to_string(),
            None => cell.to_string(),
        },
        other => other.to_string().trim().to_string(),
    }
}

/// Read the first worksheet; its first row is the header.
fn read_spreadsheet(content: &[u8]) -> Result<Table, VerifyError> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(content))
        .map_err(|e| VerifyError::MalformedInput(e.to_string()))?;

    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| VerifyError::MalformedInput("workbook has no worksheets".to_string()))?
        .map_err(|e| VerifyError::MalformedInput(e.to_string()))?;

    let mut rows = range.rows().map(|row| row.iter().map(cell_text).collect::<Vec<_>>());
    let headers = rows.next().unwrap_or_default();
    debug!("Read worksheet with {} data rows", range.height().saturating_sub(1));

    Ok(Table {
        headers,
        rows: rows.collect(),
    })
}

/// Parse spreadsheet or CSV bytes into ordered input records.
///
/// Workbooks (xlsx, xls, ods) are recognised by their signature and read from
/// the first worksheet; anything else is parsed as CSV.
pub fn load_records(content: &[u8], schema: &RecordSchema) -> Result<LoadedInput, VerifyError> {
    if schema.key_column.trim().is_empty() {
        return Err(VerifyError::EmptyKeyColumn);
    }

    let table = if is_spreadsheet(content) {
        read_spreadsheet(content)?
    } else {
        read_csv(content)?
    };
    let headers = &table.headers;

    let missing: Vec<String> = schema
        .required_columns()
        .into_iter()
        .filter(|col| !headers.contains(col))
        .collect();

    if !missing.is_empty() {
        debug!("Available columns: {:?}", headers);
        return Err(VerifyError::MissingColumns(missing));
    }

    let column = |name: &String| {
        headers
            .iter()
            .position(|h| h == name)
            .ok_or_else(|| VerifyError::MissingColumns(vec![name.clone()]))
    };
    let key_idx = column(&schema.key_column)?;
    let aux_idx: Vec<usize> = schema
        .auxiliary_columns
        .iter()
        .map(column)
        .collect::<Result<_, _>>()?;

    let mut records = Vec::new();
    let mut skipped_rows = 0;

    for row in &table.rows {
        let cell = |idx: usize| row.get(idx).map(String::as_str).filter(|s| !s.is_empty());

        let key = match cell(key_idx) {
            Some(key) => key.to_string(),
            None => {
                skipped_rows += 1;
                continue;
            }
        };

        let values = aux_idx.iter().map(|&idx| cell(idx).map(str::to_string)).collect();

        records.push(InputRecord {
            position: records.len(),
            key,
            values,
        });
    }

    if records.is_empty() {
        return Err(VerifyError::NoRecords(schema.key_column.clone()));
    }

    info!(
        "Loaded {} records from input ({} rows without '{}' skipped)",
        records.len(),
        skipped_rows,
        schema.key_column
    );

    Ok(LoadedInput {
        schema: ResolvedSchema::resolve(schema),
        records,
        skipped_rows,
    })
}
