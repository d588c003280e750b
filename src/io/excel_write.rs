use std::path::Path;

use rust_xlsxwriter::{Table, Workbook, Worksheet};

use crate::error::Result;
use crate::flatten::WorkbookData;
use crate::model::ScalarValue;

/// Writes the provided workbook data to the given path, replacing any file
/// already there.
pub fn write_workbook(path: &Path, workbook: &WorkbookData) -> Result<()> {
    let mut workbook_writer = Workbook::new();

    for table in &workbook.tables {
        let worksheet = workbook_writer.add_worksheet();
        worksheet.set_name(&table.sheet_name)?;

        for (col_idx, header) in table.columns.iter().enumerate() {
            worksheet.write_string(0, col_idx as u16, header)?;
        }

        for (row_idx, row) in table.rows.iter().enumerate() {
            for (col_idx, cell) in row.iter().enumerate() {
                write_cell(worksheet, (row_idx + 1) as u32, col_idx as u16, cell)?;
            }
        }

        // Excel tables need at least one data row and one column.
        if !table.rows.is_empty() && !table.columns.is_empty() {
            let mut excel_table = Table::new();
            excel_table.set_autofilter(true);
            let col_end = (table.columns.len() as u16).saturating_sub(1);
            worksheet.add_table(0, 0, table.rows.len() as u32, col_end, &excel_table)?;
        }
    }

    workbook_writer.save(path)?;
    Ok(())
}

fn write_cell(worksheet: &mut Worksheet, row: u32, col: u16, cell: &ScalarValue) -> Result<()> {
    match cell {
        ScalarValue::String(value) => {
            worksheet.write_string(row, col, value)?;
        }
        ScalarValue::Number(value) if value.is_finite() => {
            worksheet.write_number(row, col, *value)?;
        }
        ScalarValue::Number(value) => {
            worksheet.write_string(row, col, value.to_string())?;
        }
        ScalarValue::Boolean(value) => {
            worksheet.write_boolean(row, col, *value)?;
        }
        ScalarValue::Null => {}
    }
    Ok(())
}
