use std::path::Path;

use calamine::{DataType, Reader, Xlsx, open_workbook};

use crate::error::{Result, ToolError};
use crate::flatten::SheetTable;
use crate::model::ScalarValue;

/// Reads one sheet back into a table: the first row becomes the column list,
/// every following row a list of typed cells padded to the header width.
pub fn read_sheet(path: &Path, name: &str) -> Result<SheetTable> {
    let mut workbook: Xlsx<_> = open_workbook(path)?;
    let range = read_required_sheet(&mut workbook, name)?;

    let mut rows = range.rows();
    let columns: Vec<String> = match rows.next() {
        Some(header) => header.iter().map(|cell| cell_to_string(Some(cell))).collect(),
        None => Vec::new(),
    };

    let rows = rows
        .map(|row| {
            (0..columns.len())
                .map(|idx| cell_to_scalar(row.get(idx)))
                .collect()
        })
        .collect();

    Ok(SheetTable {
        sheet_name: name.to_string(),
        columns,
        rows,
    })
}

/// Lists the sheet names of a workbook in order.
pub fn sheet_names(path: &Path) -> Result<Vec<String>> {
    let workbook: Xlsx<_> = open_workbook(path)?;
    Ok(workbook.sheet_names().to_vec())
}

fn read_required_sheet<R: std::io::Read + std::io::Seek>(
    workbook: &mut Xlsx<R>,
    name: &str,
) -> Result<calamine::Range<DataType>> {
    let range_result = workbook
        .worksheet_range(name)
        .ok_or_else(|| ToolError::InvalidWorkbook(format!("missing sheet '{name}'")))?;
    let range = range_result.map_err(ToolError::from)?;
    Ok(range)
}

fn cell_to_string(cell: Option<&DataType>) -> String {
    match cell {
        Some(DataType::String(value)) => value.clone(),
        Some(DataType::Float(value)) => value.to_string(),
        Some(DataType::Int(value)) => value.to_string(),
        Some(DataType::Bool(value)) => value.to_string(),
        Some(DataType::Empty) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

fn cell_to_scalar(cell: Option<&DataType>) -> ScalarValue {
    match cell {
        Some(DataType::String(value)) => ScalarValue::String(value.clone()),
        Some(DataType::Float(value)) => ScalarValue::Number(*value),
        Some(DataType::Int(value)) => ScalarValue::Number(*value as f64),
        Some(DataType::Bool(value)) => ScalarValue::Boolean(*value),
        Some(DataType::Empty) | None => ScalarValue::Null,
        Some(other) => ScalarValue::String(other.to_string()),
    }
}
