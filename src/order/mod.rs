//! Sales orders and budgets, and how they map onto a form template.

pub mod format;

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::field::Field;
use crate::flatten::Flattener;
use crate::options::ExportSettings;
use crate::pipeline::ExportJob;

pub use format::{format_currency, format_date, format_date_with_offset, format_quantity, to_cents};

/// Form field names filled from an order.
pub mod names {
    pub const TYPE: &str = "type";
    pub const NUMBER: &str = "number";
    pub const ORDER_DATE: &str = "order_date";
    pub const VALIDITY: &str = "validity";

    pub const CUSTOMER_NAME: &str = "customer_name";
    pub const CUSTOMER_EMAIL: &str = "customer_email";
    pub const CUSTOMER_CPF_CNPJ: &str = "customer_cpf_cnpj";
    pub const CUSTOMER_RG_IE: &str = "customer_rg_ie";
    pub const CUSTOMER_ADDRESS: &str = "customer_address";
    pub const CUSTOMER_NEIGHBORHOOD: &str = "customer_neighborhood";
    pub const CUSTOMER_CITY: &str = "customer_city";
    pub const CUSTOMER_STATE: &str = "customer_state";
    pub const CUSTOMER_PHONE: &str = "customer_phone";
    pub const CUSTOMER_CEP: &str = "customer_cep";

    pub const SUBTOTAL: &str = "subtotal";
    pub const DISCOUNT: &str = "discount";
    pub const ADDITIONAL_CHARGES: &str = "additional_charges";
    pub const TOTAL: &str = "total";
    pub const NOTES: &str = "notes";
    pub const PAYMENT_TERMS: &str = "payment_terms";

    /// Description of the `n`th item (1-based).
    pub fn item_description(n: usize) -> String {
        format!("item_{}_description", n)
    }

    pub fn item_quantity(n: usize) -> String {
        format!("item_{}_quantity", n)
    }

    pub fn item_unit_price(n: usize) -> String {
        format!("item_{}_unit_price", n)
    }

    pub fn item_total(n: usize) -> String {
        format!("item_{}_total", n)
    }

    /// Image field of the `n`th attachment (1-based).
    pub fn attachment(n: usize) -> String {
        format!("attachment_{}", n)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Customer {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub cpf_cnpj: Option<String>,
    #[serde(default)]
    pub rg_ie: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub neighborhood: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub cep: Option<String>,
}

/// One line of an order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub id: String,
    pub description: String,
    pub quantity: f64,
    pub unit_price: f64,
}

impl Item {
    /// `quantity × unit_price`, in cents.
    pub fn total_cents(&self) -> i64 {
        to_cents(self.quantity * self.unit_price)
    }
}

/// A file attached to an order. `url` is used as an image source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    pub id: String,
    pub filename: String,
    pub url: String,
    #[serde(default)]
    pub width: u32,
    #[serde(default)]
    pub height: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderType {
    /// A quote with a validity date
    #[default]
    Budget,
    /// A firm order
    Order,
}

impl OrderType {
    /// Heading printed on the document.
    pub fn label(&self) -> &'static str {
        match self {
            OrderType::Budget => "ORÇAMENTO",
            OrderType::Order => "PEDIDO",
        }
    }

    /// Output file name prefix.
    pub fn file_prefix(&self) -> &'static str {
        match self {
            OrderType::Budget => "orcamento",
            OrderType::Order => "pedido",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: String,
    pub number: String,
    /// Epoch milliseconds
    pub order_date: i64,
    /// Epoch milliseconds, budgets only
    #[serde(default)]
    pub validity: Option<i64>,
    #[serde(default)]
    pub discount: f64,
    #[serde(default)]
    pub additional_charges: f64,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub payment_terms: Option<String>,
    #[serde(rename = "type", default)]
    pub kind: OrderType,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    #[serde(default)]
    pub items: Vec<Item>,
    pub customer: Customer,
}

impl Order {
    /// Sum of item totals, in cents.
    pub fn subtotal_cents(&self) -> i64 {
        self.items.iter().map(Item::total_cents).sum()
    }

    /// Subtotal minus discount plus additional charges, in cents.
    pub fn total_cents(&self) -> i64 {
        self.subtotal_cents() - to_cents(self.discount) + to_cents(self.additional_charges)
    }

    pub fn subtotal(&self) -> f64 {
        self.subtotal_cents() as f64 / 100.0
    }

    pub fn total(&self) -> f64 {
        self.total_cents() as f64 / 100.0
    }

    /// Form fields for this order, with dates shown at `utc_offset_minutes`.
    ///
    /// Optional values that are absent produce no field, leaving the
    /// template's own content.
    pub fn fields(&self, utc_offset_minutes: i32) -> Vec<Field> {
        let date = |millis: i64| format_date_with_offset(millis, utc_offset_minutes);

        let mut fields = vec![
            Field::text(names::TYPE, self.kind.label()).with_bold(true),
            Field::text(names::NUMBER, self.number.as_str()).with_bold(true),
        ];
        if let Some(order_date) = date(self.order_date) {
            fields.push(Field::text(names::ORDER_DATE, order_date));
        }
        if self.kind == OrderType::Budget {
            if let Some(validity) = self.validity.and_then(date) {
                fields.push(Field::text(names::VALIDITY, validity));
            }
        }

        let customer = &self.customer;
        fields.push(Field::text(names::CUSTOMER_NAME, customer.name.as_str()));
        let optional = [
            (names::CUSTOMER_EMAIL, &customer.email),
            (names::CUSTOMER_CPF_CNPJ, &customer.cpf_cnpj),
            (names::CUSTOMER_RG_IE, &customer.rg_ie),
            (names::CUSTOMER_ADDRESS, &customer.address),
            (names::CUSTOMER_NEIGHBORHOOD, &customer.neighborhood),
            (names::CUSTOMER_CITY, &customer.city),
            (names::CUSTOMER_STATE, &customer.state),
            (names::CUSTOMER_PHONE, &customer.phone),
            (names::CUSTOMER_CEP, &customer.cep),
            (names::NOTES, &self.notes),
            (names::PAYMENT_TERMS, &self.payment_terms),
        ];
        fields.extend(
            optional
                .into_iter()
                .filter_map(|(name, value)| value.as_deref().map(|v| Field::text(name, v))),
        );

        for (i, item) in self.items.iter().enumerate() {
            let n = i + 1;
            fields.push(Field::text(names::item_description(n), item.description.as_str()));
            fields.push(Field::text(names::item_quantity(n), format_quantity(item.quantity)));
            fields.push(Field::text(
                names::item_unit_price(n),
                format_currency(to_cents(item.unit_price)),
            ));
            fields.push(Field::text(
                names::item_total(n),
                format_currency(item.total_cents()),
            ));
        }

        fields.push(Field::text(names::SUBTOTAL, format_currency(self.subtotal_cents())));
        fields.push(Field::text(names::DISCOUNT, format_currency(to_cents(self.discount))));
        fields.push(Field::text(
            names::ADDITIONAL_CHARGES,
            format_currency(to_cents(self.additional_charges)),
        ));
        fields.push(Field::text(names::TOTAL, format_currency(self.total_cents())).with_bold(true));

        for (i, attachment) in self.attachments.iter().enumerate() {
            let url = attachment.url.trim();
            if url.starts_with("http://") || url.starts_with("https://") {
                log::debug!("Skipping remote attachment {}", attachment.filename);
                continue;
            }
            fields.push(Field::image(names::attachment(i + 1), url));
        }

        fields
    }

    /// Fields removed from the template for this order type.
    pub fn fields_to_delete(&self) -> Vec<String> {
        match self.kind {
            OrderType::Order => vec![names::VALIDITY.to_string()],
            OrderType::Budget => Vec::new(),
        }
    }

    /// Output file name: `orcamento_<number>.pdf` or `pedido_<number>.pdf`.
    pub fn filename(&self) -> String {
        let mut number: String = self
            .number
            .trim()
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
            .collect();
        if number.is_empty() {
            number = self.id.chars().filter(char::is_ascii_alphanumeric).collect();
        }
        format!("{}_{}.pdf", self.kind.file_prefix(), number)
    }

    /// The export job producing this order's document.
    pub fn export_job(&self, settings: &ExportSettings) -> Result<ExportJob> {
        Ok(ExportJob::new(
            &settings.template_path,
            &settings.output_dir,
            self.filename(),
            self.fields(settings.utc_offset_minutes),
        )?
        .with_font(settings.font.clone())
        .with_fields_to_delete(self.fields_to_delete()))
    }

    /// Produce the order document and return its path.
    pub fn export_pdf(&self, settings: &ExportSettings, flattener: &dyn Flattener) -> Result<PathBuf> {
        let saved = self.export_job(settings)?.run(flattener)?;
        Ok(saved.path)
    }
}
