//! PDF header detection for templates.

use crate::error::{Error, Result};

/// PDF format information.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PdfFormat {
    /// PDF version (e.g., "1.7", "2.0")
    pub version: String,
    /// Byte offset of the `%PDF-` marker (non-zero when the file has leading junk)
    pub header_offset: usize,
}

impl std::fmt::Display for PdfFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PDF {}", self.version)
    }
}

/// PDF magic bytes: %PDF-
const PDF_MAGIC: &[u8] = b"%PDF-";
const VERSION_LEN: usize = 3; // e.g., "1.7"

/// Readers accept the header anywhere in the first 1024 bytes.
const HEADER_WINDOW: usize = 1024;

/// Detect PDF format from the leading bytes of a file.
///
/// # Returns
/// * `Ok(PdfFormat)` if a valid `%PDF-x.y` header is present
/// * `Err(Error::TemplateCorrupt)` otherwise
pub fn detect_format_from_bytes(data: &[u8]) -> Result<PdfFormat> {
    let window = &data[..data.len().min(HEADER_WINDOW)];
    let offset = window
        .windows(PDF_MAGIC.len())
        .position(|w| w == PDF_MAGIC)
        .ok_or_else(|| Error::TemplateCorrupt("missing %PDF- header".into()))?;

    let start = offset + PDF_MAGIC.len();
    if data.len() < start + VERSION_LEN {
        return Err(Error::TemplateCorrupt("truncated PDF header".into()));
    }

    let version = String::from_utf8_lossy(&data[start..start + VERSION_LEN]).to_string();
    if !is_valid_version(&version) {
        return Err(Error::TemplateCorrupt(format!(
            "unsupported PDF version: {}",
            version
        )));
    }

    Ok(PdfFormat {
        version,
        header_offset: offset,
    })
}

/// Check if a version string is valid.
fn is_valid_version(version: &str) -> bool {
    let bytes = version.as_bytes();
    bytes.len() == 3 && bytes[0].is_ascii_digit() && bytes[1] == b'.' && bytes[2].is_ascii_digit()
}
