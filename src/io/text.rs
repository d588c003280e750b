use std::fs;
use std::path::Path;

use crate::error::Result;

/// Writes UTF-8 text, replacing any file already at `path`.
pub fn write_text(path: &Path, content: &str) -> Result<()> {
    fs::write(path, content)?;
    Ok(())
}
