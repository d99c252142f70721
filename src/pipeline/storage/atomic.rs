//! Write-to-temp-then-rename persistence.
//!
//! The temporary file lives in the destination's directory so the final
//! rename stays on one filesystem. If the write closure fails or the process
//! dies first, the destination keeps its previous contents and the temporary
//! file is removed on drop.

use crate::common::error::{EnricherError, Result};
use std::fs;
use std::io::{BufWriter, Write};
use std::path::Path;
use tempfile::NamedTempFile;

pub fn write_atomically<F>(path: &Path, write: F) -> Result<()>
where
    F: FnOnce(&mut BufWriter<NamedTempFile>) -> Result<()>,
{
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent)?;

    let temp = NamedTempFile::new_in(parent).map_err(|e| EnricherError::Persist {
        path: path.display().to_string(),
        message: format!("failed to create temporary file: {}", e),
    })?;
    let mut writer = BufWriter::new(temp);
    write(&mut writer)?;
    writer.flush()?;

    let temp = writer.into_inner().map_err(|e| EnricherError::Persist {
        path: path.display().to_string(),
        message: format!("failed to flush buffer: {}", e.error()),
    })?;
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|e| EnricherError::Persist {
        path: path.display().to_string(),
        message: e.error.to_string(),
    })?;
    Ok(())
}
