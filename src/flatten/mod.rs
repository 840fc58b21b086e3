//! Flattening: baking form fields into page content with an external tool.
//!
//! The tool sits behind the narrow [`Flattener`] trait so it can be swapped,
//! pooled or mocked. Failures are reported as [`Error::Flatten`], which the
//! pipeline treats as recoverable.

pub mod ghostscript;
pub mod pool;

use std::path::Path;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::writer::write_atomic;

pub use ghostscript::GhostscriptFlattener;
pub use pool::FlattenPool;

/// Turns a PDF with interactive fields into one without.
pub trait Flattener: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &str;

    /// Flatten an in-memory PDF.
    fn flatten(&self, input: &[u8]) -> Result<Vec<u8>>;

    /// Flatten `input` into `output`.
    fn flatten_file(&self, input: &Path, output: &Path) -> Result<()> {
        let bytes = std::fs::read(input)?;
        let flattened = self.flatten(&bytes)?;
        write_atomic(&flattened, output)
    }
}

impl<F: Flattener + ?Sized> Flattener for Arc<F> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn flatten(&self, input: &[u8]) -> Result<Vec<u8>> {
        (**self).flatten(input)
    }

    fn flatten_file(&self, input: &Path, output: &Path) -> Result<()> {
        (**self).flatten_file(input, output)
    }
}

impl<F: Flattener + ?Sized> Flattener for Box<F> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn flatten(&self, input: &[u8]) -> Result<Vec<u8>> {
        (**self).flatten(input)
    }

    fn flatten_file(&self, input: &Path, output: &Path) -> Result<()> {
        (**self).flatten_file(input, output)
    }
}

/// Flatten a file, reporting success as a plain flag.
///
/// Returns `true` only when the tool succeeded and `output` exists and is
/// non-empty. Failures are logged.
pub fn flatten_file(flattener: &dyn Flattener, input: &Path, output: &Path) -> bool {
    match flattener.flatten_file(input, output) {
        Ok(()) => {
            let written = std::fs::metadata(output).map(|m| m.len()).unwrap_or(0);
            if written == 0 {
                log::warn!("{} left no output at {}", flattener.name(), output.display());
            }
            written > 0
        }
        Err(e) => {
            log::warn!("Flattening {} failed: {}", input.display(), e);
            false
        }
    }
}

/// A flattener that always fails; used when flattening is disabled.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopFlattener;

impl Flattener for NoopFlattener {
    fn name(&self) -> &str {
        "noop"
    }

    fn flatten(&self, _input: &[u8]) -> Result<Vec<u8>> {
        Err(Error::Flatten("flattening disabled".into()))
    }
}
