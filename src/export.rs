//! Export stage: turns datasets into spreadsheet and text artifacts on disk.
//!
//! Every export creates the destination's parent directory and overwrites an
//! existing file. Writes are not atomic: a failure part way through leaves
//! the destination in an undefined state.

use std::fs;
use std::path::Path;

use tracing::{info, instrument};

use crate::error::Result;
use crate::flatten::{build_multi_sheet_workbook, build_workbook, records_table};
use crate::io::{csv_write, excel_write, text};
use crate::model::Dataset;

/// Writes the records as the first sheet and the summary as a second
/// `Metric`/`Value` sheet.
#[instrument(level = "info", skip_all, fields(destination = %destination.display(), sheet = %dataset.sheet_name))]
pub fn export(dataset: &Dataset, destination: &Path) -> Result<()> {
    ensure_parent(destination)?;
    let workbook = build_workbook(dataset);
    excel_write::write_workbook(destination, &workbook)?;
    info!(
        record_count = dataset.records.len(),
        summary_count = dataset.summary.len(),
        "dataset exported"
    );
    Ok(())
}

/// Writes the record sheet of every dataset into one workbook, in order.
#[instrument(level = "info", skip_all, fields(destination = %destination.display(), sheets = datasets.len()))]
pub fn export_workbook(datasets: &[Dataset], destination: &Path) -> Result<()> {
    ensure_parent(destination)?;
    let workbook = build_multi_sheet_workbook(datasets);
    excel_write::write_workbook(destination, &workbook)?;
    info!("workbook exported");
    Ok(())
}

/// Writes the records as CSV under the dataset's columns. The summary is
/// not part of the CSV artifact.
#[instrument(level = "info", skip_all, fields(destination = %destination.display(), sheet = %dataset.sheet_name))]
pub fn export_csv(dataset: &Dataset, destination: &Path) -> Result<()> {
    ensure_parent(destination)?;
    let table = records_table(dataset.sheet_name.clone(), &dataset.columns, &dataset.records);
    csv_write::write_csv(destination, &table)?;
    info!(record_count = dataset.records.len(), "dataset exported as CSV");
    Ok(())
}

/// Writes research text (markdown or plain).
#[instrument(level = "info", skip_all, fields(destination = %destination.display()))]
pub fn export_text(content: &str, destination: &Path) -> Result<()> {
    ensure_parent(destination)?;
    text::write_text(destination, content)?;
    info!(bytes = content.len(), "text exported");
    Ok(())
}

fn ensure_parent(destination: &Path) -> Result<()> {
    if let Some(parent) = destination.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}
