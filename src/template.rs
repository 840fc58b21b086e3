//! Template loading.

use std::path::{Path, PathBuf};

use lopdf::Document;

use crate::detect::{detect_format_from_bytes, PdfFormat};
use crate::error::{Error, Result};
use crate::form::objects::{acroform, get_array};
use crate::form::{FieldInfo, Form};

/// A parsed form template.
///
/// The raw bytes are kept so that a document nobody changed can be written
/// back unaltered.
#[derive(Debug)]
pub struct Template {
    path: Option<PathBuf>,
    source: Vec<u8>,
    document: Document,
    format: PdfFormat,
}

impl Template {
    /// Load a template from disk.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => Error::TemplateNotFound(path.to_path_buf()),
            _ => Error::Io(e),
        })?;
        if bytes.is_empty() {
            return Err(Error::TemplateCorrupt(format!("{} is empty", path.display())));
        }
        let mut template = Self::from_bytes(bytes)?;
        template.path = Some(path.to_path_buf());
        log::debug!(
            "Loaded template {} ({})",
            path.display(),
            template.format
        );
        Ok(template)
    }

    /// Parse a template held in memory.
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        let format = detect_format_from_bytes(&bytes)?;
        let document = Document::load_mem(&bytes)?;
        if document.is_encrypted() {
            return Err(Error::TemplateCorrupt("document is encrypted".into()));
        }

        let form = acroform(&document)?;
        if get_array(&document, form, b"Fields").is_none() {
            return Err(Error::TemplateCorrupt(
                "interactive form has no /Fields array".into(),
            ));
        }

        Ok(Self {
            path: None,
            source: bytes,
            document,
            format,
        })
    }

    /// Path the template was loaded from.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Original file bytes.
    pub fn source(&self) -> &[u8] {
        &self.source
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn format(&self) -> &PdfFormat {
        &self.format
    }

    /// Read the form field tree.
    pub fn form(&self) -> Result<Form> {
        Form::read(&self.document)
    }

    /// Summaries of the value-holding fields.
    pub fn fields(&self) -> Result<Vec<FieldInfo>> {
        Ok(self.form()?.info(&self.document))
    }

    /// Split into the document and the original bytes.
    pub fn into_parts(self) -> (Document, Vec<u8>) {
        (self.document, self.source)
    }
}

/// Load a template from disk.
pub fn load(path: impl AsRef<Path>) -> Result<Template> {
    Template::load(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::TemplateBuilder;
    use tempfile::tempdir;

    #[test]
    fn test_load_from_disk() {
        let dir = tempdir().unwrap();
        let path = TemplateBuilder::new()
            .text("customer_name")
            .checkbox("paid")
            .write(dir.path(), "order.pdf");

        let template = load(&path).unwrap();
        assert_eq!(template.path(), Some(path.as_path()));
        assert_eq!(template.format().version, "1.7");
        assert_eq!(template.source(), std::fs::read(&path).unwrap().as_slice());
        assert_eq!(template.form().unwrap().names(), vec!["customer_name", "paid"]);
    }

    #[test]
    fn test_missing_template() {
        let err = load("/definitely/missing/template.pdf").unwrap_err();
        assert!(matches!(err, Error::TemplateNotFound(_)));
    }

    #[test]
    fn test_not_a_pdf() {
        let err = Template::from_bytes(b"<html></html>".to_vec()).unwrap_err();
        assert!(matches!(err, Error::TemplateCorrupt(_)));

        let err = Template::from_bytes(b"%PDF-1.7\ngarbage".to_vec()).unwrap_err();
        assert!(matches!(err, Error::TemplateCorrupt(_)));
    }

    #[test]
    fn test_pdf_without_form() {
        let bytes = TemplateBuilder::new().without_form().bytes();
        let err = Template::from_bytes(bytes).unwrap_err();
        assert!(matches!(err, Error::TemplateCorrupt(ref m) if m.contains("interactive form")));
    }

    #[test]
    fn test_empty_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("empty.pdf");
        std::fs::write(&path, b"").unwrap();
        assert!(matches!(load(&path), Err(Error::TemplateCorrupt(_))));
    }
}
