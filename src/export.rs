//! Report generation: a tabular workbook (zip of CSV sheets) and a standalone
//! HTML summary of matched records.
//!
//! Both renderers take the generation time as an argument; rendering the same
//! results at the same instant yields identical bytes.

use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};

use askama::Template;
use base64::Engine;
use chrono::NaiveDateTime;
use csv::Writer;
use serde::{Serialize, Serializer};
use tracing::{debug, info};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::error::VerifyError;
use crate::input::ResolvedSchema;
use crate::results::{ResultSet, VerificationOutcome};

pub const ALL_RESULTS_SHEET: &str = "all_results.csv";
pub const MATCHED_SHEET: &str = "matched.csv";
pub const UNMATCHED_SHEET: &str = "unmatched.csv";

const URL_COLUMN: &str = "Full URL";
const MATCHED_COLUMN: &str = "Matched";

const TABULAR_ARTIFACT: &str = "tabular report";
const BROWSABLE_ARTIFACT: &str = "HTML summary";

/// A rendered report, ready to be written or transmitted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Artifact {
    pub filename: String,
    pub content_type: &'static str,
    #[serde(rename = "content_base64", serialize_with = "serialize_base64")]
    pub bytes: Vec<u8>,
}

fn serialize_base64<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&base64::engine::general_purpose::STANDARD.encode(bytes))
}

impl Artifact {
    /// Payload encoded for opaque transmission.
    pub fn base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(&self.bytes)
    }

    /// Write the artifact into `dir` under its own filename.
    pub fn write_to(&self, dir: &Path) -> std::io::Result<PathBuf> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(&self.filename);
        std::fs::write(&path, &self.bytes)?;
        Ok(path)
    }
}

fn file_stamp(generated_at: NaiveDateTime) -> String {
    generated_at.format("%Y%m%d_%H%M%S").to_string()
}

pub fn tabular_filename(generated_at: NaiveDateTime) -> String {
    format!("verification_results_{}.zip", file_stamp(generated_at))
}

pub fn summary_filename(generated_at: NaiveDateTime) -> String {
    format!("verified_records_{}.html", file_stamp(generated_at))
}

fn render_error(artifact: &'static str) -> impl Fn(String) -> VerifyError {
    move |reason| VerifyError::Render { artifact, reason }
}

/// Write one CSV sheet. `full` adds the URL and match columns.
fn write_sheet<'a>(
    schema: &ResolvedSchema,
    outcomes: impl Iterator<Item = &'a VerificationOutcome>,
    full: bool,
) -> Result<Vec<u8>, csv::Error> {
    let mut wtr = Writer::from_writer(Vec::new());

    let mut header = schema.columns();
    if full {
        header.push(URL_COLUMN);
        header.push(MATCHED_COLUMN);
    }
    wtr.write_record(&header)?;

    for outcome in outcomes {
        let mut row = outcome.record.row();
        if full {
            row.push(outcome.url.as_str());
            row.push(if outcome.verdict.is_match() { "true" } else { "false" });
        }
        wtr.write_record(&row)?;
    }

    wtr.into_inner().map_err(|e| csv::Error::from(e.into_error()))
}

/// Render the tabular report: one archive holding the full, matched and
/// unmatched sheets. All three sheets are always present.
pub fn render_tabular(
    results: &ResultSet,
    schema: &ResolvedSchema,
    generated_at: NaiveDateTime,
) -> Result<Artifact, VerifyError> {
    debug!("Rendering tabular report for {} outcomes", results.len());
    let fail = render_error(TABULAR_ARTIFACT);

    let sheets = [
        (ALL_RESULTS_SHEET, write_sheet(schema, results.ordered().iter(), true)),
        (MATCHED_SHEET, write_sheet(schema, results.matched(), false)),
        (UNMATCHED_SHEET, write_sheet(schema, results.unmatched(), false)),
    ];

    // Fixed entry timestamps keep the archive byte-stable
    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .last_modified_time(zip::DateTime::default());

    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    for (name, sheet) in sheets {
        let sheet = sheet.map_err(|e| fail(e.to_string()))?;
        zip.start_file(name, options).map_err(|e| fail(e.to_string()))?;
        zip.write_all(&sheet).map_err(|e| fail(e.to_string()))?;
    }
    let bytes = zip.finish().map_err(|e| fail(e.to_string()))?.into_inner();

    info!("Rendered tabular report ({} bytes)", bytes.len());

    Ok(Artifact {
        filename: tabular_filename(generated_at),
        content_type: "application/zip",
        bytes,
    })
}

struct SummaryField {
    label: String,
    value: String,
}

struct SummaryEntry {
    title: String,
    url: String,
    fields: Vec<SummaryField>,
}

#[derive(Template)]
#[template(path = "summary.html")]
struct SummaryTemplate<'a> {
    title: &'a str,
    verified_count: usize,
    generated_at: String,
    entries: Vec<SummaryEntry>,
}

/// Render the HTML summary: a header with the matched count and generation
/// time, then one entry per matched record.
pub fn render_summary(
    results: &ResultSet,
    title: &str,
    generated_at: NaiveDateTime,
) -> Result<Artifact, VerifyError> {
    let entries: Vec<SummaryEntry> = results
        .matched()
        .filter_map(|outcome| {
            outcome.snapshot.as_ref().map(|snapshot| SummaryEntry {
                title: snapshot.title.clone(),
                url: outcome.url.clone(),
                fields: snapshot
                    .fields
                    .iter()
                    .map(|(label, value)| SummaryField {
                        label: label.clone(),
                        value: value.clone(),
                    })
                    .collect(),
            })
        })
        .collect();

    let template = SummaryTemplate {
        title,
        verified_count: entries.len(),
        generated_at: generated_at.format("%d/%m/%Y %H:%M:%S").to_string(),
        entries,
    };

    let html = template
        .render()
        .map_err(|e| render_error(BROWSABLE_ARTIFACT)(e.to_string()))?;

    info!("Rendered HTML summary with {} entries", template.verified_count);

    Ok(Artifact {
        filename: summary_filename(generated_at),
        content_type: "text/html; charset=utf-8",
        bytes: html.into_bytes(),
    })
}
