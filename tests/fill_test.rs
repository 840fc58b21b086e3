//! Integration tests for filling and deleting form fields.

mod common;

use common::{png_bytes, png_data_uri, TemplateBuilder};
use fillpdf::{fill_document, Field, FieldKind, FillWarning, FontWeight, FontSet, Form, Template};
use lopdf::{Document, Object};

fn reload(doc: &mut Document) -> Template {
    let mut out = Vec::new();
    doc.save_to(&mut out).unwrap();
    Template::from_bytes(out).unwrap()
}

fn widget_has_appearance(doc: &Document, form: &Form, name: &str) -> bool {
    let field = form.get(name).unwrap();
    !field.widgets.is_empty()
        && field.widgets.iter().all(|&id| {
            doc.get_dictionary(id)
                .and_then(|d| d.get(b"AP"))
                .and_then(Object::as_dict)
                .map(|ap| ap.has(b"N"))
                .unwrap_or(false)
        })
}

#[test]
fn test_fill_text_and_checkbox() {
    let template = Template::from_bytes(
        TemplateBuilder::new()
            .text("customer_name")
            .multiline("notes")
            .checkbox("paid")
            .checkbox("shipped")
            .bytes(),
    )
    .unwrap();
    let (mut doc, _) = template.into_parts();

    let report = fill_document(
        &mut doc,
        &[
            Field::text("customer_name", "João da Silva"),
            Field::text("notes", "Entregar na portaria. Ligar antes de sair para a entrega."),
            Field::checkbox("paid", true),
            Field::checkbox("shipped", false),
        ],
        &[],
        None,
    )
    .unwrap();
    assert_eq!(report.filled.len(), 4);
    assert!(report.warnings.is_empty());

    let reloaded = reload(&mut doc);
    let form = reloaded.form().unwrap();
    let doc = reloaded.document();
    assert_eq!(
        form.text_value(doc, "customer_name").as_deref(),
        Some("João da Silva")
    );
    assert_eq!(form.is_checked(doc, "paid"), Some(true));
    assert_eq!(form.is_checked(doc, "shipped"), Some(false));
    assert!(widget_has_appearance(doc, &form, "customer_name"));
    assert!(widget_has_appearance(doc, &form, "notes"));
}

#[test]
fn test_fill_image_from_data_uri() {
    let (mut doc, _) = Template::from_bytes(
        TemplateBuilder::new()
            .image_button("signature_image")
            .image_button("logo")
            .bytes(),
    )
    .unwrap()
    .into_parts();

    let uri = png_data_uri(40, 20);
    let report = fill_document(
        &mut doc,
        &[
            Field::image("signature_image", uri.clone()),
            Field::image("logo", uri),
        ],
        &[],
        None,
    )
    .unwrap();
    assert_eq!(report.filled, vec!["signature_image", "logo"]);

    let reloaded = reload(&mut doc);
    let form = reloaded.form().unwrap();
    assert!(widget_has_appearance(reloaded.document(), &form, "signature_image"));

    // identical bytes are embedded once
    let images = reloaded
        .document()
        .objects
        .values()
        .filter(|o| match o {
            Object::Stream(s) => s
                .dict
                .get(b"Subtype")
                .and_then(Object::as_name)
                .map(|n| n == b"Image")
                .unwrap_or(false),
            _ => false,
        })
        .count();
    assert_eq!(images, 1);
}

#[test]
fn test_image_from_file_and_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let png = dir.path().join("alpha.png");
    std::fs::write(&png, png_bytes(8, 8, true)).unwrap();

    let (mut doc, _) = Template::from_bytes(
        TemplateBuilder::new()
            .image_button("photo")
            .image_button("attachment_1")
            .bytes(),
    )
    .unwrap()
    .into_parts();

    let report = fill_document(
        &mut doc,
        &[
            Field::image("photo", png.to_string_lossy()),
            Field::image("attachment_1", dir.path().join("missing.png").to_string_lossy()),
        ],
        &[],
        None,
    )
    .unwrap();
    assert_eq!(report.filled, vec!["photo"]);
    assert!(matches!(
        report.warnings.as_slice(),
        [FillWarning::ImageUnavailable { name, .. }] if name == "attachment_1"
    ));
}

#[test]
fn test_blank_image_left_untouched() {
    let (mut doc, _) = Template::from_bytes(TemplateBuilder::new().image_button("signature_image").bytes())
        .unwrap()
        .into_parts();
    let report = fill_document(
        &mut doc,
        &[Field::blank("signature_image", FieldKind::Image)],
        &[],
        None,
    )
    .unwrap();
    assert!(!report.is_mutated());
    assert!(report.warnings.is_empty());
}

#[test]
fn test_unmapped_and_mismatched_fields() {
    let (mut doc, _) = Template::from_bytes(
        TemplateBuilder::new().text("customer_name").checkbox("paid").bytes(),
    )
    .unwrap()
    .into_parts();

    let report = fill_document(
        &mut doc,
        &[
            Field::text("Customer_Name", "case matters"),
            Field::checkbox("customer_name", true),
            Field::text("paid", "yes"),
        ],
        &[],
        None,
    )
    .unwrap();
    assert!(report.filled.is_empty());
    assert_eq!(report.warnings.len(), 3);
    assert!(matches!(report.warnings[0], FillWarning::UnmappedField { .. }));
    assert!(matches!(report.warnings[1], FillWarning::KindMismatch { .. }));
    assert!(matches!(report.warnings[2], FillWarning::KindMismatch { .. }));
}

#[test]
fn test_delete_fields() {
    let (mut doc, _) = Template::from_bytes(
        TemplateBuilder::new()
            .text("number")
            .text("validity")
            .group("address", &["street", "city"])
            .bytes(),
    )
    .unwrap()
    .into_parts();

    let report = fill_document(
        &mut doc,
        &[Field::text("number", "42"), Field::text("validity", "01/01/2024")],
        &["validity".to_string(), "address".to_string(), "nope".to_string()],
        None,
    )
    .unwrap();
    assert_eq!(report.filled, vec!["number"]);
    assert_eq!(report.deleted, vec!["validity", "address"]);
    assert!(report
        .warnings
        .iter()
        .any(|w| matches!(w, FillWarning::FilledThenDeleted { name } if name == "validity")));

    let reloaded = reload(&mut doc);
    let form = reloaded.form().unwrap();
    assert_eq!(form.names(), vec!["number"]);

    // widgets are gone from the page too
    let page = *reloaded.document().get_pages().values().next().unwrap();
    let annots = reloaded
        .document()
        .get_dictionary(page)
        .unwrap()
        .get(b"Annots")
        .and_then(Object::as_array)
        .map(Vec::len)
        .unwrap_or(0);
    assert_eq!(annots, 1);
}

#[test]
fn test_unreadable_font_set_falls_back() {
    let (mut doc, _) = Template::from_bytes(TemplateBuilder::new().text("a").text("b").bytes())
        .unwrap()
        .into_parts();
    let fonts = FontSet::new("/definitely/missing-regular.ttf", "/definitely/missing-bold.ttf");

    let report = fill_document(
        &mut doc,
        &[
            Field::text("a", "one"),
            Field::text("b", "two"),
            Field::text("a", "three").with_bold(true),
        ],
        &[],
        Some(&fonts),
    )
    .unwrap();
    assert_eq!(report.filled, vec!["a", "b"]);

    let weights: Vec<FontWeight> = report
        .warnings
        .iter()
        .filter_map(|w| match w {
            FillWarning::FontUnavailable { weight, .. } => Some(*weight),
            _ => None,
        })
        .collect();
    assert_eq!(weights, vec![FontWeight::Regular, FontWeight::Bold]);

    let reloaded = reload(&mut doc);
    let form = reloaded.form().unwrap();
    assert_eq!(form.text_value(reloaded.document(), "a").as_deref(), Some("three"));
}

#[test]
fn test_bold_font_embedded_once() {
    let font = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures/demo.ttf");
    let fonts = FontSet::new(font, font);
    let (mut doc, _) = Template::from_bytes(
        TemplateBuilder::new().text("number").text("total").bytes(),
    )
    .unwrap()
    .into_parts();

    let report = fill_document(
        &mut doc,
        &[
            Field::text("number", "AAA").with_bold(true),
            Field::text("total", "A").with_bold(true),
        ],
        &[],
        Some(&fonts),
    )
    .unwrap();
    assert_eq!(report.filled, vec!["number", "total"]);
    assert!(report.warnings.is_empty(), "{:?}", report.warnings);

    let truetype: Vec<&lopdf::Dictionary> = doc
        .objects
        .values()
        .filter_map(|o| o.as_dict().ok())
        .filter(|d| {
            d.get(b"Subtype")
                .and_then(Object::as_name)
                .map(|n| n == b"TrueType")
                .unwrap_or(false)
        })
        .collect();
    assert_eq!(truetype.len(), 1);
    // the fixture's only glyph is 'A', 540 units wide
    let widths = truetype[0].get(b"Widths").and_then(Object::as_array).unwrap();
    assert_eq!(widths[(b'A' - 32) as usize].as_float().unwrap(), 540.0);

    let reloaded = reload(&mut doc);
    let form = reloaded.form().unwrap();
    for name in ["number", "total"] {
        let id = form.get(name).unwrap().id;
        let da = reloaded
            .document()
            .get_dictionary(id)
            .and_then(|d| d.get(b"DA"))
            .and_then(Object::as_str)
            .unwrap();
        assert!(da.starts_with(b"/FPBold "), "{}", String::from_utf8_lossy(da));
        assert!(widget_has_appearance(reloaded.document(), &form, name));
    }
    assert_eq!(form.text_value(reloaded.document(), "number").as_deref(), Some("AAA"));
}
