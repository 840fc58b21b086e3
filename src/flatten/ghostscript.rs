//! Ghostscript `pdfwrite` flattener.

use std::ffi::OsString;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use crate::error::{Error, Result};
use crate::options::FlattenOptions;

use super::Flattener;

const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Runs `gs -sDEVICE=pdfwrite` with annotations rendered into page content.
#[derive(Debug, Clone)]
pub struct GhostscriptFlattener {
    binary: PathBuf,
    timeout: Duration,
    extra_args: Vec<String>,
}

impl GhostscriptFlattener {
    /// Flattener using `gs` from `PATH` with default options.
    pub fn new() -> Self {
        Self::from_options(&FlattenOptions::default())
    }

    pub fn from_options(options: &FlattenOptions) -> Self {
        Self {
            binary: options.binary.clone(),
            timeout: options.timeout,
            extra_args: options.extra_args.clone(),
        }
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }

    /// Command line arguments for flattening `input` into `output`.
    pub fn args(&self, input: &Path, output: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = [
            "-dSAFER",
            "-dBATCH",
            "-dNOPAUSE",
            "-dQUIET",
            "-sDEVICE=pdfwrite",
            "-dPreserveAnnots=false",
            "-dShowAnnots=true",
        ]
        .iter()
        .map(OsString::from)
        .collect();

        // '%' in OutputFile is a page-number template
        let mut out = OsString::from("-sOutputFile=");
        out.push(output.to_string_lossy().replace('%', "%%"));
        args.push(out);
        args.extend(self.extra_args.iter().map(OsString::from));

        if input.to_string_lossy().starts_with('-') {
            args.push(Path::new(".").join(input).into_os_string());
        } else {
            args.push(input.as_os_str().to_owned());
        }
        args
    }

    fn run(&self, input: &Path, output: &Path) -> Result<()> {
        let mut child = Command::new(&self.binary)
            .args(self.args(input, output))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => {
                    Error::Flatten(format!("{} not found", self.binary.display()))
                }
                _ => Error::Flatten(format!("cannot start {}: {}", self.binary.display(), e)),
            })?;

        let stderr = child.stderr.take().map(|mut pipe| {
            thread::spawn(move || {
                let mut text = String::new();
                let _ = pipe.read_to_string(&mut text);
                text
            })
        });

        let started = Instant::now();
        let status = loop {
            let polled = child
                .try_wait()
                .map_err(|e| Error::Flatten(format!("cannot wait for {}: {}", self.binary.display(), e)))?;
            match polled {
                Some(status) => break Some(status),
                None if started.elapsed() >= self.timeout => {
                    let _ = child.kill();
                    let _ = child.wait();
                    break None;
                }
                None => thread::sleep(POLL_INTERVAL),
            }
        };
        let stderr = stderr
            .and_then(|reader| reader.join().ok())
            .unwrap_or_default();

        let Some(status) = status else {
            return Err(Error::Flatten(format!(
                "{} timed out after {:?}",
                self.binary.display(),
                self.timeout
            )));
        };
        if !status.success() {
            return Err(Error::Flatten(format!(
                "{} exited with {}: {}",
                self.binary.display(),
                status,
                stderr.trim()
            )));
        }

        match std::fs::metadata(output) {
            Ok(meta) if meta.len() > 0 => Ok(()),
            _ => Err(Error::Flatten(format!(
                "{} produced no output",
                self.binary.display()
            ))),
        }
    }
}

impl Default for GhostscriptFlattener {
    fn default() -> Self {
        Self::new()
    }
}

impl Flattener for GhostscriptFlattener {
    fn name(&self) -> &str {
        "ghostscript"
    }

    fn flatten(&self, input: &[u8]) -> Result<Vec<u8>> {
        let dir = tempfile::Builder::new().prefix("fillpdf-gs-").tempdir()?;
        let input_path = dir.path().join("input.pdf");
        let output_path = dir.path().join("output.pdf");
        std::fs::write(&input_path, input)?;

        self.run(&input_path, &output_path)?;
        Ok(std::fs::read(&output_path)?)
    }

    fn flatten_file(&self, input: &Path, output: &Path) -> Result<()> {
        if !input.is_file() {
            return Err(Error::Flatten(format!("input {} does not exist", input.display())));
        }
        if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        // a leftover file would pass the non-empty output check
        match std::fs::remove_file(output) {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => return Err(e.into()),
            _ => {}
        }
        self.run(input, output)
    }
}
