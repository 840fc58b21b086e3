//! Integration tests for the flatten stage.

mod common;

use std::process::Command;
use std::sync::Arc;
use std::time::Duration;

use common::TemplateBuilder;
use fillpdf::error::{Error, Result};
use fillpdf::{
    flatten_file, ExportJob, Field, FlattenOptions, FlattenPool, Flattener,
    GhostscriptFlattener, Template,
};
use tempfile::tempdir;

fn ghostscript_available() -> bool {
    Command::new("gs")
        .arg("--version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

struct Failing;

impl Flattener for Failing {
    fn name(&self) -> &str {
        "failing"
    }

    fn flatten(&self, _input: &[u8]) -> Result<Vec<u8>> {
        Err(Error::Flatten("exit status 1".into()))
    }
}

#[test]
fn test_missing_binary_reports_false() {
    let dir = tempdir().unwrap();
    let input = TemplateBuilder::new().text("a").write(dir.path(), "in.pdf");
    let output = dir.path().join("out.pdf");
    let gs = GhostscriptFlattener::from_options(
        &FlattenOptions::new().with_binary("/definitely/not/gs"),
    );

    assert!(!flatten_file(&gs, &input, &output));
    assert!(!output.exists());

    let err = gs.flatten(&std::fs::read(&input).unwrap()).unwrap_err();
    assert!(matches!(err, Error::Flatten(_)));
    assert!(!err.is_fatal());
}

#[test]
fn test_pool_propagates_failures() {
    let pool = FlattenPool::new(
        Arc::new(Failing),
        &FlattenOptions::new()
            .with_max_concurrent(2)
            .with_timeout(Duration::from_secs(5)),
    )
    .unwrap();
    assert_eq!(pool.workers(), 2);
    assert!(matches!(pool.flatten(b"%PDF-1.7"), Err(Error::Flatten(_))));
}

#[test]
fn test_failing_flattener_keeps_filled_document() {
    let dir = tempdir().unwrap();
    let template = TemplateBuilder::new().text("number").write(dir.path(), "t.pdf");
    let job = ExportJob::new(
        &template,
        dir.path(),
        "pedido_5.pdf",
        vec![Field::text("number", "5")],
    )
    .unwrap();

    let flatten = job.load().unwrap().fill().unwrap().flatten(&Failing);
    assert!(!flatten.is_flattened());
    let saved = flatten.save().unwrap();
    assert!(!saved.flattened);

    let output = Template::load(&saved.path).unwrap();
    assert_eq!(
        output
            .form()
            .unwrap()
            .text_value(output.document(), "number")
            .as_deref(),
        Some("5")
    );
}

#[test]
fn test_ghostscript_removes_fields() {
    if !ghostscript_available() {
        eprintln!("gs not found, skipping");
        return;
    }

    let dir = tempdir().unwrap();
    let template = TemplateBuilder::new()
        .text("customer_name")
        .checkbox("paid")
        .write(dir.path(), "t.pdf");
    let job = ExportJob::new(
        &template,
        dir.path().join("out"),
        "pedido_100%.pdf",
        vec![
            Field::text("customer_name", "Maria"),
            Field::checkbox("paid", true),
        ],
    )
    .unwrap();

    let gs = GhostscriptFlattener::new();
    let saved = job.run(&gs).unwrap();
    assert!(saved.flattened);
    assert!(saved.path.ends_with("pedido_100%.pdf"));

    // no interactive form is left
    let doc = lopdf::Document::load(&saved.path).unwrap();
    let has_fields = fillpdf::Form::read(&doc)
        .map(|form| !form.is_empty())
        .unwrap_or(false);
    assert!(!has_fields);
}
