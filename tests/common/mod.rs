//! Synthetic form templates for tests.
//!
//! Shared by the integration tests and, through a `#[path]` include, by the
//! library's unit tests.

#![allow(dead_code)]

use std::io::Cursor;
use std::path::{Path, PathBuf};

use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::{DynamicImage, ImageFormat, Rgb, RgbImage, Rgba, RgbaImage};
use lopdf::{dictionary, Document, Object, ObjectId, Stream};

const FIELD_DA: &str = "/Helv 0 Tf 0 g";

#[derive(Debug, Clone)]
enum Entry {
    Text {
        name: String,
        value: Option<String>,
        flags: i64,
    },
    Checkbox(String),
    ImageButton(String),
    Group(String, Vec<String>),
}

/// Builds a one-page document with an AcroForm.
#[derive(Debug, Clone)]
pub struct TemplateBuilder {
    entries: Vec<Entry>,
    with_form: bool,
}

impl Default for TemplateBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TemplateBuilder {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            with_form: true,
        }
    }

    pub fn text(mut self, name: &str) -> Self {
        self.entries.push(Entry::Text {
            name: name.to_string(),
            value: None,
            flags: 0,
        });
        self
    }

    pub fn text_with_value(mut self, name: &str, value: &str) -> Self {
        self.entries.push(Entry::Text {
            name: name.to_string(),
            value: Some(value.to_string()),
            flags: 0,
        });
        self
    }

    pub fn multiline(mut self, name: &str) -> Self {
        self.entries.push(Entry::Text {
            name: name.to_string(),
            value: None,
            flags: 1 << 12,
        });
        self
    }

    pub fn checkbox(mut self, name: &str) -> Self {
        self.entries.push(Entry::Checkbox(name.to_string()));
        self
    }

    pub fn image_button(mut self, name: &str) -> Self {
        self.entries.push(Entry::ImageButton(name.to_string()));
        self
    }

    /// A non-terminal text field `name` with one text child per entry of `kids`.
    pub fn group(mut self, name: &str, kids: &[&str]) -> Self {
        self.entries.push(Entry::Group(
            name.to_string(),
            kids.iter().map(|k| k.to_string()).collect(),
        ));
        self
    }

    /// Leave the catalog without an `/AcroForm`.
    pub fn without_form(mut self) -> Self {
        self.with_form = false;
        self
    }

    pub fn document(&self) -> Document {
        let mut doc = Document::with_version("1.7");
        let pages_id = doc.new_object_id();
        let page_id = doc.new_object_id();
        let helv = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
            "Encoding" => "WinAnsiEncoding",
        });

        let mut annots = Vec::new();
        let mut fields = Vec::new();
        let mut top = 760.0_f32;
        let mut next_rect = |height: f32, width: f32| {
            let rect = vec![
                Object::Real(72.0),
                Object::Real(top - height),
                Object::Real(72.0 + width),
                Object::Real(top),
            ];
            top -= height + 10.0;
            rect
        };

        for entry in &self.entries {
            match entry {
                Entry::Text { name, value, flags } => {
                    let mut dict = widget(name, page_id, next_rect(20.0, 240.0));
                    dict.set("FT", "Tx");
                    if *flags != 0 {
                        dict.set("Ff", *flags);
                    }
                    if let Some(value) = value {
                        dict.set("V", Object::string_literal(value.as_str()));
                    }
                    let id = doc.add_object(dict);
                    annots.push(Object::Reference(id));
                    fields.push(Object::Reference(id));
                }
                Entry::Checkbox(name) => {
                    let on = doc.add_object(Stream::new(
                        dictionary! {
                            "Type" => "XObject",
                            "Subtype" => "Form",
                            "BBox" => vec![0.into(), 0.into(), 14.into(), 14.into()],
                        },
                        b"0 g 2 2 10 10 re f".to_vec(),
                    ));
                    let off = doc.add_object(Stream::new(
                        dictionary! {
                            "Type" => "XObject",
                            "Subtype" => "Form",
                            "BBox" => vec![0.into(), 0.into(), 14.into(), 14.into()],
                        },
                        Vec::new(),
                    ));
                    let mut dict = widget(name, page_id, next_rect(14.0, 14.0));
                    dict.set("FT", "Btn");
                    dict.set("V", Object::Name(b"Off".to_vec()));
                    dict.set("AS", Object::Name(b"Off".to_vec()));
                    dict.set(
                        "AP",
                        dictionary! {
                            "N" => dictionary! {
                                "Yes" => Object::Reference(on),
                                "Off" => Object::Reference(off),
                            },
                        },
                    );
                    let id = doc.add_object(dict);
                    annots.push(Object::Reference(id));
                    fields.push(Object::Reference(id));
                }
                Entry::ImageButton(name) => {
                    let mut dict = widget(name, page_id, next_rect(60.0, 200.0));
                    dict.set("FT", "Btn");
                    dict.set("Ff", 1_i64 << 16);
                    dict.set("MK", dictionary! {});
                    let id = doc.add_object(dict);
                    annots.push(Object::Reference(id));
                    fields.push(Object::Reference(id));
                }
                Entry::Group(name, kids) => {
                    let parent_id = doc.new_object_id();
                    let mut kid_refs = Vec::new();
                    for kid in kids {
                        let mut dict = widget(kid, page_id, next_rect(20.0, 240.0));
                        dict.set("Parent", Object::Reference(parent_id));
                        let id = doc.add_object(dict);
                        annots.push(Object::Reference(id));
                        kid_refs.push(Object::Reference(id));
                    }
                    doc.objects.insert(
                        parent_id,
                        Object::Dictionary(dictionary! {
                            "T" => Object::string_literal(name.as_str()),
                            "FT" => "Tx",
                            "Kids" => kid_refs,
                        }),
                    );
                    fields.push(Object::Reference(parent_id));
                }
            }
        }

        let contents = doc.add_object(Stream::new(dictionary! {}, Vec::new()));
        doc.objects.insert(
            page_id,
            Object::Dictionary(dictionary! {
                "Type" => "Page",
                "Parent" => Object::Reference(pages_id),
                "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
                "Contents" => Object::Reference(contents),
                "Resources" => dictionary! {},
                "Annots" => annots,
            }),
        );
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![Object::Reference(page_id)],
                "Count" => 1,
            }),
        );

        let mut catalog = dictionary! {
            "Type" => "Catalog",
            "Pages" => Object::Reference(pages_id),
        };
        if self.with_form {
            let acroform = doc.add_object(dictionary! {
                "Fields" => fields,
                "DA" => Object::string_literal(FIELD_DA),
                "DR" => dictionary! {
                    "Font" => dictionary! { "Helv" => Object::Reference(helv) },
                },
            });
            catalog.set("AcroForm", Object::Reference(acroform));
        }
        let catalog_id = doc.add_object(catalog);
        doc.trailer.set("Root", Object::Reference(catalog_id));
        doc
    }

    /// Serialized template.
    pub fn bytes(&self) -> Vec<u8> {
        let mut doc = self.document();
        let mut out = Vec::new();
        doc.save_to(&mut out).expect("serialize template");
        out
    }

    /// Write the template into `dir` and return its path.
    pub fn write(&self, dir: &Path, filename: &str) -> PathBuf {
        let path = dir.join(filename);
        std::fs::write(&path, self.bytes()).expect("write template");
        path
    }
}

fn widget(name: &str, page: ObjectId, rect: Vec<Object>) -> lopdf::Dictionary {
    dictionary! {
        "Type" => "Annot",
        "Subtype" => "Widget",
        "T" => Object::string_literal(name),
        "Rect" => rect,
        "P" => Object::Reference(page),
        "F" => 4,
    }
}

/// A solid PNG, half-transparent when `alpha` is set.
pub fn png_bytes(width: u32, height: u32, alpha: bool) -> Vec<u8> {
    let image = if alpha {
        DynamicImage::ImageRgba8(RgbaImage::from_pixel(width, height, Rgba([200, 30, 30, 128])))
    } else {
        DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb([30, 30, 200])))
    };
    let mut out = Cursor::new(Vec::new());
    image
        .write_to(&mut out, ImageFormat::Png)
        .expect("encode png");
    out.into_inner()
}

pub fn png_data_uri(width: u32, height: u32) -> String {
    format!(
        "data:image/png;base64,{}",
        STANDARD.encode(png_bytes(width, height, false))
    )
}
