//! Field model: typed descriptions of the slots a caller wants filled.

use std::borrow::Cow;
use std::path::{Path, PathBuf};

use base64::{engine::general_purpose::STANDARD as BASE64_STD, Engine as _};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// How a field value is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    /// Literal display text
    #[default]
    Text,
    /// Image source (data URI or file path)
    Image,
    /// Boolean state
    Checkbox,
}

impl std::fmt::Display for FieldKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FieldKind::Text => f.write_str("text"),
            FieldKind::Image => f.write_str("image"),
            FieldKind::Checkbox => f.write_str("checkbox"),
        }
    }
}

/// One fillable slot addressed by its form field name.
///
/// The JSON shape is `{"name": .., "value": .., "bold": .., "type": ..}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    /// Fully-qualified form field name (case-sensitive).
    pub name: String,

    /// Value; meaning depends on `kind`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,

    /// Render with the bold font of the job's font set.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub bold: bool,

    /// Field kind.
    #[serde(default, rename = "type")]
    pub kind: FieldKind,
}

impl Field {
    /// A text field.
    pub fn text(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: Some(value.into()),
            bold: false,
            kind: FieldKind::Text,
        }
    }

    /// A checkbox field.
    pub fn checkbox(name: impl Into<String>, checked: bool) -> Self {
        Self {
            name: name.into(),
            value: Some(checked.to_string()),
            bold: false,
            kind: FieldKind::Checkbox,
        }
    }

    /// An image field. `source` is a `data:` URI or a file path.
    pub fn image(name: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: Some(source.into()),
            bold: false,
            kind: FieldKind::Image,
        }
    }

    /// A field of the given kind with no value.
    pub fn blank(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            value: None,
            bold: false,
            kind,
        }
    }

    /// Request the bold font.
    pub fn with_bold(mut self, bold: bool) -> Self {
        self.bold = bold;
        self
    }

    /// Value as a string slice, empty when absent.
    pub fn value_str(&self) -> &str {
        self.value.as_deref().unwrap_or("")
    }

    /// Checkbox state: any non-empty value other than `"false"` is checked.
    pub fn is_checked(&self) -> bool {
        !matches!(self.value.as_deref(), None | Some("") | Some("false"))
    }

    /// Parsed image source, `None` when the value is absent or blank.
    pub fn image_source(&self) -> Result<Option<ImageSource>> {
        match self.value.as_deref().map(str::trim) {
            None | Some("") => Ok(None),
            Some(v) => ImageSource::parse(v).map(Some),
        }
    }

    /// Validate the field before it enters a pipeline.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::InvalidField("field name is empty".into()));
        }
        if self.kind == FieldKind::Image {
            self.image_source()
                .map_err(|e| Error::InvalidField(format!("{}: {}", self.name, e)))?;
        }
        Ok(())
    }
}

/// Where the bytes of an image field come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageSource {
    /// Bytes decoded from a base64 `data:` URI
    Data {
        mime_type: Option<String>,
        bytes: Vec<u8>,
    },
    /// An image file on disk
    File(PathBuf),
}

impl ImageSource {
    /// Parse a field value into an image source.
    pub fn parse(value: &str) -> Result<Self> {
        if let Some(rest) = value.strip_prefix("data:") {
            let (meta, payload) = rest
                .split_once(',')
                .ok_or_else(|| Error::InvalidField("data URI has no payload".into()))?;
            let mime = meta
                .strip_suffix(";base64")
                .ok_or_else(|| Error::InvalidField("only base64 data URIs are supported".into()))?;
            let cleaned: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
            let bytes = BASE64_STD
                .decode(cleaned)
                .map_err(|e| Error::InvalidField(format!("invalid base64 payload: {}", e)))?;
            return Ok(ImageSource::Data {
                mime_type: (!mime.is_empty()).then(|| mime.to_string()),
                bytes,
            });
        }

        let path = value.strip_prefix("file://").unwrap_or(value);
        Ok(ImageSource::File(PathBuf::from(path)))
    }

    /// Read the raw image bytes.
    pub fn bytes(&self) -> Result<Cow<'_, [u8]>> {
        match self {
            ImageSource::Data { bytes, .. } => Ok(Cow::Borrowed(bytes)),
            ImageSource::File(path) => std::fs::read(path)
                .map(Cow::Owned)
                .map_err(|e| Error::Image(format!("{}: {}", path.display(), e))),
        }
    }
}

/// Weight of an embedded appearance font.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FontWeight {
    Regular,
    Bold,
}

impl std::fmt::Display for FontWeight {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FontWeight::Regular => f.write_str("regular"),
            FontWeight::Bold => f.write_str("bold"),
        }
    }
}

/// Regular and bold TrueType programs used for text appearances.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FontSet {
    pub regular: PathBuf,
    pub bold: PathBuf,
}

impl FontSet {
    pub fn new(regular: impl Into<PathBuf>, bold: impl Into<PathBuf>) -> Self {
        Self {
            regular: regular.into(),
            bold: bold.into(),
        }
    }

    /// Path of the program for `weight`.
    pub fn path(&self, weight: FontWeight) -> &Path {
        match weight {
            FontWeight::Regular => &self.regular,
            FontWeight::Bold => &self.bold,
        }
    }
}
