use std::path::Path;

use csv::Writer;

use crate::error::Result;
use crate::flatten::SheetTable;
use crate::model::ScalarValue;

/// Writes one table as CSV: a header row, then one line per row. Null cells
/// become empty fields.
pub fn write_csv(path: &Path, table: &SheetTable) -> Result<()> {
    let mut writer = Writer::from_path(path)?;
    writer.write_record(&table.columns)?;
    for row in &table.rows {
        writer.write_record(row.iter().map(ScalarValue::display))?;
    }
    writer.flush()?;
    Ok(())
}
