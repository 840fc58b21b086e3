//! Order documents exported end to end.

mod common;

use common::{png_bytes, TemplateBuilder};
use fillpdf::order::names;
use fillpdf::{
    Attachment, Customer, ExportSettings, Item, NoopFlattener, Order, OrderType, Template,
};
use tempfile::tempdir;

fn order(kind: OrderType) -> Order {
    serde_json::from_value(serde_json::json!({
        "id": "ord-77",
        "number": "77",
        "order_date": 1_700_006_400_000_i64,
        "validity": 1_702_598_400_000_i64,
        "discount": 1.0,
        "additional_charges": 2.0,
        "type": kind,
        "items": [
            {"id": "1", "description": "Parafuso sextavado", "quantity": 2, "unit_price": 10.0},
            {"id": "2", "description": "Porca", "quantity": 1, "unit_price": 5.0}
        ],
        "customer": {"id": "c1", "name": "Maria Souza", "city": "Curitiba"}
    }))
    .unwrap()
}

fn template(dir: &std::path::Path) -> std::path::PathBuf {
    let mut builder = TemplateBuilder::new();
    for name in [
        names::TYPE,
        names::NUMBER,
        names::ORDER_DATE,
        names::VALIDITY,
        names::CUSTOMER_NAME,
        names::CUSTOMER_CITY,
        names::SUBTOTAL,
        names::DISCOUNT,
        names::ADDITIONAL_CHARGES,
        names::TOTAL,
    ] {
        builder = builder.text(name);
    }
    for n in 1..=3 {
        builder = builder
            .text(&names::item_description(n))
            .text(&names::item_quantity(n))
            .text(&names::item_unit_price(n))
            .text(&names::item_total(n));
    }
    builder
        .image_button(&names::attachment(1))
        .write(dir, "order_template.pdf")
}

#[test]
fn test_budget_export() {
    let dir = tempdir().unwrap();
    let settings = ExportSettings::new(template(dir.path()), dir.path().join("out"));

    let path = order(OrderType::Budget)
        .export_pdf(&settings, &NoopFlattener)
        .unwrap();
    assert_eq!(path, dir.path().join("out/orcamento_77.pdf"));

    let output = Template::load(&path).unwrap();
    let form = output.form().unwrap();
    let doc = output.document();
    let value = |name: &str| form.text_value(doc, name);

    assert_eq!(value(names::TYPE).as_deref(), Some("ORÇAMENTO"));
    assert_eq!(value(names::TOTAL).as_deref(), Some("R$ 26,00"));
    assert_eq!(value(names::SUBTOTAL).as_deref(), Some("R$ 25,00"));
    assert_eq!(value(names::ORDER_DATE).as_deref(), Some("14/11/2023"));
    assert_eq!(value(&names::item_description(1)).as_deref(), Some("Parafuso sextavado"));
    assert_eq!(value(&names::item_total(1)).as_deref(), Some("R$ 20,00"));
    // unused item rows stay as authored
    assert_eq!(value(&names::item_description(3)), None);
    assert!(form.contains(names::VALIDITY));
}

#[test]
fn test_firm_order_removes_validity() {
    let dir = tempdir().unwrap();
    let settings = ExportSettings::new(template(dir.path()), dir.path())
        .with_utc_offset(0);

    let path = order(OrderType::Order)
        .export_pdf(&settings, &NoopFlattener)
        .unwrap();
    assert!(path.ends_with("pedido_77.pdf"));

    let output = Template::load(&path).unwrap();
    let form = output.form().unwrap();
    assert!(!form.contains(names::VALIDITY));
    assert_eq!(
        form.text_value(output.document(), names::TYPE).as_deref(),
        Some("PEDIDO")
    );
    assert_eq!(
        form.text_value(output.document(), names::ORDER_DATE).as_deref(),
        Some("15/11/2023")
    );
}

#[test]
fn test_local_attachment_embedded() {
    let dir = tempdir().unwrap();
    let photo = dir.path().join("photo.png");
    std::fs::write(&photo, png_bytes(16, 12, false)).unwrap();

    let mut order = order(OrderType::Budget);
    order.attachments.push(Attachment {
        id: "a1".into(),
        filename: "photo.png".into(),
        url: photo.to_string_lossy().into_owned(),
        width: 16,
        height: 12,
    });

    let settings = ExportSettings::new(template(dir.path()), dir.path().join("out"));
    let job = order.export_job(&settings).unwrap();
    let saved = job.run(&NoopFlattener).unwrap();
    assert!(saved
        .report
        .filled
        .contains(&names::attachment(1)));
    assert!(saved.report.warnings.is_empty(), "{:?}", saved.report.warnings);
}

#[test]
fn test_unknown_template_fields_warn_only() {
    let dir = tempdir().unwrap();
    let sparse = TemplateBuilder::new()
        .text(names::TOTAL)
        .write(dir.path(), "sparse.pdf");

    let order = Order {
        items: vec![Item {
            id: "1".into(),
            description: "Serviço".into(),
            quantity: 1.5,
            unit_price: 100.0,
        }],
        discount: 0.0,
        additional_charges: 0.0,
        customer: Customer {
            id: "c".into(),
            name: "Ana".into(),
            email: None,
            cpf_cnpj: None,
            rg_ie: None,
            address: None,
            neighborhood: None,
            city: None,
            state: None,
            phone: None,
            cep: None,
        },
        ..order(OrderType::Budget)
    };

    let settings = ExportSettings::new(&sparse, dir.path());
    let saved = order.export_job(&settings).unwrap().run(&NoopFlattener).unwrap();
    assert_eq!(saved.report.filled, vec![names::TOTAL]);
    assert!(!saved.report.warnings.is_empty());

    let output = Template::load(&saved.path).unwrap();
    assert_eq!(
        output
            .form()
            .unwrap()
            .text_value(output.document(), names::TOTAL)
            .as_deref(),
        Some("R$ 150,00")
    );
}
