//! Durable, atomic output.

use std::io::Write;
use std::path::Path;

use crate::error::Result;

/// Prefix of temporary files created next to outputs.
pub const TEMP_PREFIX: &str = ".fillpdf-";

/// Write `bytes` to `path` atomically.
///
/// The parent directory is created if needed. Data goes to a temporary file
/// in the same directory, is synced, then renamed over `path`, so readers
/// see either the old file or the complete new one. On failure the
/// temporary file is removed.
pub fn write_atomic(bytes: &[u8], path: &Path) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;

    let mut file = tempfile::Builder::new()
        .prefix(TEMP_PREFIX)
        .suffix(".tmp")
        .tempfile_in(dir)?;
    file.write_all(bytes)?;
    file.as_file().sync_all()?;
    file.persist(path)?;

    log::debug!("Wrote {} bytes to {}", bytes.len(), path.display());
    Ok(())
}
