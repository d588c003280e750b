use std::collections::HashSet;

use crate::model::{Dataset, Record, ScalarValue, Summary};

/// Sheet name used for the summary attributes of a dataset.
pub const SUMMARY_SHEET: &str = "Summary";
/// Header of the metric-name column in the summary sheet.
pub const METRIC_COLUMN: &str = "Metric";
/// Header of the value column in the summary sheet.
pub const VALUE_COLUMN: &str = "Value";

/// Excel rejects sheet names longer than this.
const MAX_SHEET_NAME_LEN: usize = 31;

/// A table that will be materialised as an Excel sheet.
#[derive(Debug, Clone, PartialEq)]
pub struct SheetTable {
    pub sheet_name: String,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<ScalarValue>>,
}

/// Represents all tables required to materialise the Excel workbook.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkbookData {
    pub tables: Vec<SheetTable>,
}

/// Flattens a dataset into its record sheet followed by its summary sheet.
pub fn build_workbook(dataset: &Dataset) -> WorkbookData {
    let mut sheet_names = SheetNameRegistry::default();
    let records = records_table(
        sheet_names.assign(&dataset.sheet_name),
        &dataset.columns,
        &dataset.records,
    );
    let summary = summary_table(sheet_names.assign(SUMMARY_SHEET), &dataset.summary);

    WorkbookData {
        tables: vec![records, summary],
    }
}

/// Flattens several datasets into one workbook, one record sheet each. Their
/// summaries are not written.
pub fn build_multi_sheet_workbook(datasets: &[Dataset]) -> WorkbookData {
    let mut sheet_names = SheetNameRegistry::default();
    let tables = datasets
        .iter()
        .map(|dataset| {
            records_table(
                sheet_names.assign(&dataset.sheet_name),
                &dataset.columns,
                &dataset.records,
            )
        })
        .collect();

    WorkbookData { tables }
}

/// Lays records out under the given columns. When `columns` is empty the
/// field order of the first record is used. Fields a record lacks become
/// empty cells.
pub fn records_table(sheet_name: String, columns: &[String], records: &[Record]) -> SheetTable {
    let columns: Vec<String> = if columns.is_empty() {
        records
            .first()
            .map(|record| record.field_names().map(str::to_string).collect())
            .unwrap_or_default()
    } else {
        columns.to_vec()
    };

    let rows = records
        .iter()
        .map(|record| {
            columns
                .iter()
                .map(|column| record.get(column).cloned().unwrap_or(ScalarValue::Null))
                .collect()
        })
        .collect();

    SheetTable {
        sheet_name,
        columns,
        rows,
    }
}

fn summary_table(sheet_name: String, summary: &Summary) -> SheetTable {
    let rows = summary
        .iter()
        .map(|(metric, value)| vec![ScalarValue::from(metric), value.clone()])
        .collect();

    SheetTable {
        sheet_name,
        columns: vec![METRIC_COLUMN.to_string(), VALUE_COLUMN.to_string()],
        rows,
    }
}

#[derive(Debug, Default)]
struct SheetNameRegistry {
    used: HashSet<String>,
}

impl SheetNameRegistry {
    fn assign(&mut self, raw: &str) -> String {
        let base = sanitize_sheet_name(raw);
        if self.used.insert(base.to_lowercase()) {
            return base;
        }

        let mut counter = 1;
        loop {
            let suffix = format!("_{counter}");
            let prefix = truncate_chars(&base, MAX_SHEET_NAME_LEN - suffix.len());
            let candidate = format!("{prefix}{suffix}");
            if self.used.insert(candidate.to_lowercase()) {
                return candidate;
            }
            counter += 1;
        }
    }
}

/// Replaces characters Excel forbids in sheet names and enforces the length
/// limit.
pub fn sanitize_sheet_name(raw: &str) -> String {
    let invalid = [':', '\\', '/', '?', '*', '[', ']', '\'', '"'];
    let sanitized: String = raw
        .chars()
        .map(|ch| {
            if invalid.contains(&ch) || ch.is_control() {
                '_'
            } else {
                ch
            }
        })
        .collect();

    let sanitized = sanitized.trim();
    if sanitized.is_empty() {
        return "Sheet".to_string();
    }

    truncate_chars(sanitized, MAX_SHEET_NAME_LEN)
}

fn truncate_chars(value: &str, max_chars: usize) -> String {
    value.chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dataset_becomes_record_and_summary_sheets() {
        let dataset = Dataset::new(
            "Reviews",
            &["author", "rating"],
            vec![Record::new().with("author", "Ann").with("rating", 5.0)],
        )
        .with_summary([("overall_rating", 4.4)].into_iter().collect());

        let workbook = build_workbook(&dataset);

        assert_eq!(workbook.tables.len(), 2);
        assert_eq!(workbook.tables[0].sheet_name, "Reviews");
        assert_eq!(workbook.tables[0].columns, ["author", "rating"]);
        assert_eq!(
            workbook.tables[0].rows,
            vec![vec![ScalarValue::from("Ann"), ScalarValue::Number(5.0)]]
        );
        assert_eq!(workbook.tables[1].sheet_name, SUMMARY_SHEET);
        assert_eq!(
            workbook.tables[1].rows,
            vec![vec![ScalarValue::from("overall_rating"), ScalarValue::Number(4.4)]]
        );
    }

    #[test]
    fn primary_sheet_named_summary_gets_a_suffix() {
        let dataset = Dataset::new("Summary", &["Field"], Vec::new());
        let workbook = build_workbook(&dataset);

        assert_eq!(workbook.tables[0].sheet_name, "Summary");
        assert_eq!(workbook.tables[1].sheet_name, "Summary_1");
    }

    #[test]
    fn missing_fields_become_empty_cells() {
        let table = records_table(
            "Loans".to_string(),
            &["a".to_string(), "b".to_string()],
            &[Record::new().with("a", 1.0)],
        );

        assert_eq!(table.rows, vec![vec![ScalarValue::Number(1.0), ScalarValue::Null]]);
    }

    #[test]
    fn sheet_names_are_sanitized_and_truncated() {
        assert_eq!(sanitize_sheet_name("Loans/MA: 2024?"), "Loans_MA_ 2024_");
        assert_eq!(sanitize_sheet_name("   "), "Sheet");
        assert_eq!(sanitize_sheet_name(&"x".repeat(40)).len(), MAX_SHEET_NAME_LEN);
    }
}
