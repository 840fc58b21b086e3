//! # fillpdf
//!
//! Document generation from PDF form templates.
//!
//! A template is an ordinary PDF with an interactive form. `fillpdf` writes
//! text, checkbox and image values into its fields, removes fields the
//! caller no longer wants, flattens the result with Ghostscript and writes
//! the file atomically.
//!
//! ## Quick Start
//!
//! ```no_run
//! use fillpdf::{ExportJob, Field};
//!
//! fn main() -> fillpdf::Result<()> {
//!     let job = ExportJob::new(
//!         "templates/order.pdf",
//!         "out",
//!         "pedido_42.pdf",
//!         vec![
//!             Field::text("customer_name", "Maria Souza"),
//!             Field::text("total", "R$ 26,00").with_bold(true),
//!             Field::checkbox("paid", true),
//!         ],
//!     )?
//!     .with_fields_to_delete(vec!["validity".into()]);
//!
//!     let saved = fillpdf::export(&job)?;
//!     println!("{} (flattened: {})", saved.path.display(), saved.flattened);
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - **Appearance generation**: text is laid out and drawn into each widget,
//!   so the output reads the same with or without flattening
//! - **Embedded fonts**: optional regular/bold TrueType set per job
//! - **Images**: PNG/JPEG from data URIs or files, fitted into the widget
//! - **Soft flatten failure**: a missing or failing Ghostscript still
//!   produces the filled document
//! - **Parallel export**: independent jobs run on Rayon, flattening is
//!   capped by a worker pool

pub mod detect;
pub mod error;
pub mod field;
pub mod fill;
pub mod flatten;
pub mod form;
pub mod options;
pub mod order;
pub mod pipeline;
pub mod template;
pub mod writer;

#[cfg(feature = "ffi")]
pub mod ffi;

#[cfg(test)]
#[path = "../tests/common/mod.rs"]
mod testing;

// Re-export commonly used types
pub use detect::{detect_format_from_bytes, PdfFormat};
pub use error::{Error, ErrorKind, Result};
pub use field::{Field, FieldKind, FontSet, FontWeight, ImageSource};
pub use fill::{fill_document, FillReport, FillWarning};
pub use flatten::{
    flatten_file, FlattenPool, Flattener, GhostscriptFlattener, NoopFlattener,
};
pub use form::{FieldInfo, FieldValue, Form, FormField, FormFieldType};
pub use options::{ExportSettings, FlattenOptions};
pub use order::{Attachment, Customer, Item, Order, OrderType};
pub use pipeline::{export_all, ExportJob, Saved};
pub use template::Template;
pub use writer::write_atomic;

use std::path::Path;
use std::sync::{Arc, OnceLock};

/// Process-wide flattener: Ghostscript configured from the environment,
/// behind a bounded worker pool.
///
/// Falls back to [`NoopFlattener`] when the pool cannot be started, in which
/// case every export is saved unflattened.
pub fn default_flattener() -> Arc<dyn Flattener> {
    static DEFAULT: OnceLock<Arc<dyn Flattener>> = OnceLock::new();
    DEFAULT
        .get_or_init(|| {
            let options = FlattenOptions::from_env();
            let gs: Arc<dyn Flattener> = Arc::new(GhostscriptFlattener::from_options(&options));
            match FlattenPool::new(gs, &options) {
                Ok(pool) => Arc::new(pool),
                Err(e) => {
                    log::warn!("Flatten pool unavailable ({}), output stays unflattened", e);
                    Arc::new(NoopFlattener)
                }
            }
        })
        .clone()
}

/// Run a job with the [`default_flattener`].
///
/// # Example
///
/// ```no_run
/// use fillpdf::{export, ExportJob};
///
/// let job = ExportJob::new("t.pdf", "out", "copy.pdf", vec![]).unwrap();
/// let saved = export(&job).unwrap();
/// assert!(saved.path.ends_with("copy.pdf"));
/// ```
pub fn export(job: &ExportJob) -> Result<Saved> {
    job.run(default_flattener().as_ref())
}

/// Export an order with the [`default_flattener`] and return the output path.
pub fn export_order(order: &Order, settings: &ExportSettings) -> Result<std::path::PathBuf> {
    order.export_pdf(settings, default_flattener().as_ref())
}

/// List the value-holding fields of a template.
///
/// # Example
///
/// ```no_run
/// for field in fillpdf::list_fields("templates/order.pdf").unwrap() {
///     println!("{} ({})", field.name, field.field_type);
/// }
/// ```
pub fn list_fields<P: AsRef<Path>>(path: P) -> Result<Vec<FieldInfo>> {
    Template::load(path)?.fields()
}
