//! Stage-typed export pipeline.
//!
//! Each stage value is produced only by consuming its predecessor:
//!
//! ```text
//! ExportJob --load--> Loaded --fill--> Filled --flatten--> Flatten --save--> Saved
//!                                        \------------------save---------/
//! ```
//!
//! so an out-of-order call does not compile, and a loaded document can never
//! be shared between two jobs.

use std::fmt;
use std::path::{Path, PathBuf};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::field::{Field, FontSet};
use crate::fill::{fill_document, FillReport};
use crate::flatten::Flattener;
use crate::template::Template;
use crate::writer::write_atomic;

/// Pipeline position, for logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Created,
    Loaded,
    Filled,
    Flattened,
    Saved,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Created => "created",
            Stage::Loaded => "loaded",
            Stage::Filled => "filled",
            Stage::Flattened => "flattened",
            Stage::Saved => "saved",
        };
        f.write_str(name)
    }
}

#[derive(Deserialize)]
struct JobSpec {
    template_path: PathBuf,
    output_dir: PathBuf,
    filename: String,
    #[serde(default)]
    font: Option<FontSet>,
    #[serde(default)]
    fields: Vec<Field>,
    #[serde(default)]
    fields_to_delete: Vec<String>,
}

impl TryFrom<JobSpec> for ExportJob {
    type Error = Error;

    fn try_from(spec: JobSpec) -> Result<Self> {
        Ok(ExportJob::new(spec.template_path, spec.output_dir, spec.filename, spec.fields)?
            .with_font(spec.font)
            .with_fields_to_delete(spec.fields_to_delete))
    }
}

/// One document to produce.
///
/// Immutable once built; the output path is fixed at construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "JobSpec")]
pub struct ExportJob {
    template_path: PathBuf,
    output_dir: PathBuf,
    filename: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    font: Option<FontSet>,
    fields: Vec<Field>,
    fields_to_delete: Vec<String>,
    #[serde(skip_serializing)]
    fullpath: PathBuf,
}

impl ExportJob {
    /// Create a job, validating the file name and every field.
    pub fn new(
        template_path: impl Into<PathBuf>,
        output_dir: impl Into<PathBuf>,
        filename: impl Into<String>,
        fields: Vec<Field>,
    ) -> Result<Self> {
        let filename = filename.into();
        validate_filename(&filename)?;
        for field in &fields {
            field.validate()?;
        }

        let output_dir = output_dir.into();
        let fullpath = output_dir.join(&filename);
        Ok(Self {
            template_path: template_path.into(),
            output_dir,
            filename,
            font: None,
            fields,
            fields_to_delete: Vec::new(),
            fullpath,
        })
    }

    /// Set the font set.
    pub fn with_font(mut self, font: Option<FontSet>) -> Self {
        self.font = font;
        self
    }

    /// Set the names removed from the form after filling.
    pub fn with_fields_to_delete(mut self, names: Vec<String>) -> Self {
        self.fields_to_delete = names;
        self
    }

    pub fn template_path(&self) -> &Path {
        &self.template_path
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn font(&self) -> Option<&FontSet> {
        self.font.as_ref()
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn fields_to_delete(&self) -> &[String] {
        &self.fields_to_delete
    }

    /// `output_dir` joined with `filename`.
    pub fn fullpath(&self) -> &Path {
        &self.fullpath
    }

    fn transition(&self, from: Stage, to: Stage) {
        log::debug!("[{}] {} -> {}", self.filename, from, to);
    }

    /// Load the template.
    pub fn load(&self) -> Result<Loaded<'_>> {
        let template = Template::load(&self.template_path)?;
        self.transition(Stage::Created, Stage::Loaded);
        Ok(Loaded {
            job: self,
            template,
        })
    }

    /// Run every stage. A flatten failure is logged and the filled,
    /// unflattened document is saved instead.
    pub fn run(&self, flattener: &dyn Flattener) -> Result<Saved> {
        let saved = self.load()?.fill()?.flatten(flattener).save()?;
        log::info!(
            "Exported {} ({} bytes, flattened: {})",
            saved.path.display(),
            saved.bytes_written,
            saved.flattened
        );
        Ok(saved)
    }

    /// [`run`](Self::run) on tokio's blocking pool.
    #[cfg(feature = "async")]
    pub async fn run_async(
        self,
        flattener: std::sync::Arc<dyn Flattener>,
    ) -> Result<Saved> {
        tokio::task::spawn_blocking(move || self.run(flattener.as_ref()))
            .await
            .map_err(|e| Error::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))?
    }
}

fn validate_filename(filename: &str) -> Result<()> {
    if filename.trim().is_empty() {
        return Err(Error::InvalidJob("filename is empty".into()));
    }
    if filename.contains(['/', '\\']) || filename == "." || filename == ".." {
        return Err(Error::InvalidJob(format!(
            "filename '{}' must not contain path separators",
            filename
        )));
    }
    Ok(())
}

/// A job with its template parsed.
#[derive(Debug)]
pub struct Loaded<'j> {
    job: &'j ExportJob,
    template: Template,
}

impl<'j> Loaded<'j> {
    pub fn template(&self) -> &Template {
        &self.template
    }

    /// Fill and delete fields.
    ///
    /// A document nobody changed keeps the exact template bytes.
    pub fn fill(self) -> Result<Filled<'j>> {
        let job = self.job;
        let (mut document, source) = self.template.into_parts();
        let report = fill_document(
            &mut document,
            &job.fields,
            &job.fields_to_delete,
            job.font.as_ref(),
        )?;

        let bytes = if report.is_mutated() {
            let mut out = Vec::new();
            document.save_to(&mut out)?;
            out
        } else {
            log::debug!("[{}] nothing changed, keeping template bytes", job.filename);
            source
        };

        job.transition(Stage::Loaded, Stage::Filled);
        Ok(Filled { job, bytes, report })
    }
}

/// A filled document, still interactive.
#[derive(Debug)]
pub struct Filled<'j> {
    job: &'j ExportJob,
    bytes: Vec<u8>,
    report: FillReport,
}

impl<'j> Filled<'j> {
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn report(&self) -> &FillReport {
        &self.report
    }

    /// Flatten with `flattener`. Failure keeps the filled document.
    pub fn flatten(self, flattener: &dyn Flattener) -> Flatten<'j> {
        let reason = match flattener.flatten(&self.bytes) {
            Ok(bytes) if !bytes.is_empty() => {
                self.job.transition(Stage::Filled, Stage::Flattened);
                return Flatten::Flattened(Flattened {
                    job: self.job,
                    bytes,
                    report: self.report,
                });
            }
            Ok(_) => format!("{} produced no output", flattener.name()),
            Err(e) => e.to_string(),
        };
        log::warn!(
            "[{}] {}, saving unflattened document",
            self.job.filename,
            reason
        );
        Flatten::Unflattened {
            filled: self,
            reason,
        }
    }

    /// Save without flattening.
    pub fn save(self) -> Result<Saved> {
        save(self.job, &self.bytes, false, self.report)
    }
}

/// A flattened document.
#[derive(Debug)]
pub struct Flattened<'j> {
    job: &'j ExportJob,
    bytes: Vec<u8>,
    report: FillReport,
}

impl Flattened<'_> {
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn save(self) -> Result<Saved> {
        save(self.job, &self.bytes, true, self.report)
    }
}

/// Outcome of the flatten stage.
#[derive(Debug)]
pub enum Flatten<'j> {
    Flattened(Flattened<'j>),
    /// Flattening failed; the filled document is kept with the reason.
    Unflattened { filled: Filled<'j>, reason: String },
}

impl Flatten<'_> {
    pub fn is_flattened(&self) -> bool {
        matches!(self, Flatten::Flattened(_))
    }

    /// Save whichever document this stage holds.
    pub fn save(self) -> Result<Saved> {
        match self {
            Flatten::Flattened(flattened) => flattened.save(),
            Flatten::Unflattened { filled, .. } => filled.save(),
        }
    }
}

/// A document on disk.
#[derive(Debug, Clone, Serialize)]
pub struct Saved {
    pub path: PathBuf,
    pub flattened: bool,
    pub bytes_written: u64,
    pub report: FillReport,
}

fn save(job: &ExportJob, bytes: &[u8], flattened: bool, report: FillReport) -> Result<Saved> {
    write_atomic(bytes, &job.fullpath)?;
    job.transition(
        if flattened {
            Stage::Flattened
        } else {
            Stage::Filled
        },
        Stage::Saved,
    );
    Ok(Saved {
        path: job.fullpath.clone(),
        flattened,
        bytes_written: bytes.len() as u64,
        report,
    })
}

/// Run jobs in parallel. Results are in job order.
pub fn export_all(jobs: &[ExportJob], flattener: &dyn Flattener) -> Vec<Result<Saved>> {
    jobs.par_iter().map(|job| job.run(flattener)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flatten::NoopFlattener;
    use crate::testing::TemplateBuilder;
    use tempfile::tempdir;

    struct Identity;

    impl Flattener for Identity {
        fn name(&self) -> &str {
            "identity"
        }

        fn flatten(&self, input: &[u8]) -> Result<Vec<u8>> {
            Ok(input.to_vec())
        }
    }

    #[test]
    fn test_fullpath_fixed() {
        let job = ExportJob::new("t.pdf", "/out", "pedido_1.pdf", vec![]).unwrap();
        assert_eq!(job.fullpath(), Path::new("/out/pedido_1.pdf"));
    }

    #[test]
    fn test_invalid_jobs() {
        assert!(matches!(
            ExportJob::new("t.pdf", "/out", "", vec![]),
            Err(Error::InvalidJob(_))
        ));
        assert!(matches!(
            ExportJob::new("t.pdf", "/out", "../x.pdf", vec![]),
            Err(Error::InvalidJob(_))
        ));
        assert!(matches!(
            ExportJob::new("t.pdf", "/out", "x.pdf", vec![Field::text("", "v")]),
            Err(Error::InvalidField(_))
        ));
    }

    #[test]
    fn test_job_json() {
        let job: ExportJob = serde_json::from_str(
            r#"{
                "template_path": "t.pdf",
                "output_dir": "out",
                "filename": "orcamento_7.pdf",
                "fields": [{"name": "number", "value": "7", "bold": true}],
                "fields_to_delete": ["validity"]
            }"#,
        )
        .unwrap();
        assert_eq!(job.fullpath(), Path::new("out/orcamento_7.pdf"));
        assert_eq!(job.fields().len(), 1);
        assert_eq!(job.fields_to_delete(), ["validity".to_string()]);

        let bad: std::result::Result<ExportJob, _> = serde_json::from_str(
            r#"{"template_path": "t.pdf", "output_dir": "out", "filename": "a/b.pdf"}"#,
        );
        assert!(bad.is_err());
    }

    #[test]
    fn test_stages_in_order() {
        let dir = tempdir().unwrap();
        let template = TemplateBuilder::new()
            .text("customer_name")
            .write(dir.path(), "t.pdf");
        let job = ExportJob::new(
            &template,
            dir.path().join("out"),
            "pedido_3.pdf",
            vec![Field::text("customer_name", "Ana")],
        )
        .unwrap();

        let loaded = job.load().unwrap();
        let filled = loaded.fill().unwrap();
        assert_eq!(filled.report().filled, vec!["customer_name"]);
        let flatten = filled.flatten(&NoopFlattener);
        assert!(!flatten.is_flattened());
        let saved = flatten.save().unwrap();

        assert!(!saved.flattened);
        assert_eq!(saved.path, job.fullpath());
        assert_eq!(std::fs::metadata(&saved.path).unwrap().len(), saved.bytes_written);
    }

    #[test]
    fn test_unmutated_keeps_template_bytes() {
        let dir = tempdir().unwrap();
        let template = TemplateBuilder::new().text("a").write(dir.path(), "t.pdf");
        let job = ExportJob::new(&template, dir.path(), "copy.pdf", vec![]).unwrap();

        let saved = job.run(&Identity).unwrap();
        assert!(saved.flattened);
        assert_eq!(
            std::fs::read(&saved.path).unwrap(),
            std::fs::read(&template).unwrap()
        );
    }

    #[test]
    fn test_missing_template_is_terminal() {
        let dir = tempdir().unwrap();
        let job = ExportJob::new(dir.path().join("none.pdf"), dir.path(), "x.pdf", vec![]).unwrap();
        let err = job.run(&Identity).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::TemplateNotFound);
        assert!(!job.fullpath().exists());
    }
}
