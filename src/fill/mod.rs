//! Form filling: maps caller fields onto a document's form.
//!
//! Filling never fails on a single field. Names that do not resolve, values
//! of the wrong kind and unreadable images become [`FillWarning`]s; only a
//! structurally broken form tree aborts with [`Error::FieldFill`].

pub(crate) mod resources;

use std::collections::HashSet;
use std::fmt;

use lopdf::content::Content;
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream};
use serde::Serialize;

use crate::error::{Error, Result};
use crate::field::{Field, FieldKind, FontSet, FontWeight};
use crate::form::appearance::{check_content, image_content, text_content, TextLayout};
use crate::form::encoding::encode_text_string;
use crate::form::{
    objects, on_state, widget_rect, DefaultAppearance, Form, FormField, FormFieldType,
    FALLBACK_DA, FLAG_PASSWORD,
};
use resources::{form_xobject, ResourceCache, ZAPF_RESOURCE};

const IMAGE_RESOURCE: &[u8] = b"Im0";

/// A per-field problem that did not stop the fill.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "warning", rename_all = "snake_case")]
pub enum FillWarning {
    /// No form field has this exact name.
    UnmappedField { name: String },
    /// The form field cannot hold a value of this kind.
    KindMismatch {
        name: String,
        kind: FieldKind,
        found: FormFieldType,
    },
    /// The name addresses a field group, not a value-holding field.
    NotTerminal { name: String },
    /// The image source could not be read or decoded.
    ImageUnavailable { name: String, reason: String },
    /// A font of the font set could not be embedded.
    FontUnavailable { weight: FontWeight, reason: String },
    /// The field was filled and then removed by the delete list.
    FilledThenDeleted { name: String },
}

impl fmt::Display for FillWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FillWarning::UnmappedField { name } => write!(f, "no form field named '{}'", name),
            FillWarning::KindMismatch { name, kind, found } => {
                write!(f, "field '{}' is a {} field, cannot fill as {}", name, found, kind)
            }
            FillWarning::NotTerminal { name } => {
                write!(f, "field '{}' is a group, address one of its children", name)
            }
            FillWarning::ImageUnavailable { name, reason } => {
                write!(f, "image for field '{}' unavailable: {}", name, reason)
            }
            FillWarning::FontUnavailable { weight, reason } => {
                write!(f, "{} font unavailable, using the form font: {}", weight, reason)
            }
            FillWarning::FilledThenDeleted { name } => {
                write!(f, "field '{}' was filled and then deleted", name)
            }
        }
    }
}

/// Outcome of filling one document.
#[derive(Debug, Clone, Default, Serialize)]
pub struct FillReport {
    /// Names whose value and appearance were set
    pub filled: Vec<String>,
    /// Names removed from the form
    pub deleted: Vec<String>,
    pub warnings: Vec<FillWarning>,
}

impl FillReport {
    /// Whether the document differs from the template.
    pub fn is_mutated(&self) -> bool {
        !self.filled.is_empty() || !self.deleted.is_empty()
    }

    fn warn(&mut self, warning: FillWarning) {
        log::warn!("{}", warning);
        self.warnings.push(warning);
    }
}

/// Fill `fields` into `doc`, then delete `fields_to_delete`.
///
/// With a font set, text appearances use its regular or bold program
/// (embedded once per weight); otherwise the field's `/DA` font is used.
pub fn fill_document(
    doc: &mut Document,
    fields: &[Field],
    fields_to_delete: &[String],
    fonts: Option<&FontSet>,
) -> Result<FillReport> {
    let form = Form::read(doc)?;
    let mut filler = Filler {
        form: &form,
        cache: ResourceCache::new(fonts),
        report: FillReport::default(),
        warned_fonts: HashSet::new(),
        deleted: HashSet::new(),
    };

    for field in fields {
        filler.fill_field(doc, field)?;
    }
    for name in fields_to_delete {
        filler.delete_field(doc, name)?;
    }

    if !filler.report.deleted.is_empty() {
        let pruned = doc.prune_objects();
        log::debug!("Pruned {} unreachable objects", pruned.len());
    }

    let report = filler.report;
    log::debug!(
        "Filled {} fields, deleted {}, {} warnings",
        report.filled.len(),
        report.deleted.len(),
        report.warnings.len()
    );
    Ok(report)
}

struct Filler<'a> {
    form: &'a Form,
    cache: ResourceCache<'a>,
    report: FillReport,
    warned_fonts: HashSet<FontWeight>,
    deleted: HashSet<ObjectId>,
}

impl Filler<'_> {
    fn fill_field(&mut self, doc: &mut Document, field: &Field) -> Result<()> {
        let form = self.form;
        let Some(target) = form.get(&field.name) else {
            self.report.warn(FillWarning::UnmappedField {
                name: field.name.clone(),
            });
            return Ok(());
        };
        if !target.is_terminal() {
            self.report.warn(FillWarning::NotTerminal {
                name: field.name.clone(),
            });
            return Ok(());
        }

        let filled = match field.kind {
            FieldKind::Text => self.fill_text(doc, target, field)?,
            FieldKind::Checkbox => self.fill_checkbox(doc, target, field)?,
            FieldKind::Image => self.fill_image(doc, target, field)?,
        };

        if filled {
            log::debug!("Filled {} field '{}'", field.kind, field.name);
            if !self.report.filled.contains(&field.name) {
                self.report.filled.push(field.name.clone());
            }
        }
        Ok(())
    }

    fn mismatch(&mut self, field: &Field, found: FormFieldType) -> Result<bool> {
        self.report.warn(FillWarning::KindMismatch {
            name: field.name.clone(),
            kind: field.kind,
            found,
        });
        Ok(false)
    }

    fn fill_text(&mut self, doc: &mut Document, target: &FormField, field: &Field) -> Result<bool> {
        if target.field_type != FormFieldType::Text {
            return self.mismatch(field, target.field_type);
        }

        let value = field.value_str();
        objects::dict_mut(doc, target.id)?.set("V", encode_text_string(value));

        let shown = if target.flags & FLAG_PASSWORD != 0 {
            "*".repeat(value.chars().count())
        } else {
            value.to_string()
        };

        let da = DefaultAppearance::parse(target.default_appearance.as_deref().unwrap_or(FALLBACK_DA));
        let weight = if field.bold {
            FontWeight::Bold
        } else {
            FontWeight::Regular
        };

        let embedded = match self.cache.font(doc, weight) {
            Some(Ok(font)) => Some(font.clone()),
            Some(Err(reason)) => {
                let reason = reason.to_string();
                if self.warned_fonts.insert(weight) {
                    self.report.warn(FillWarning::FontUnavailable { weight, reason });
                }
                None
            }
            None => None,
        };

        let (da, metrics, font_id) = match embedded {
            Some(font) => {
                let da = da.with_font(&font.resource);
                set_default_appearance(doc, target, &da.to_da_string())?;
                (da, font.metrics, font.id)
            }
            None => {
                let (id, metrics) = self.cache.form_font(doc, &da.font)?;
                (da, metrics, id)
            }
        };

        let layout = TextLayout {
            quadding: target.quadding,
            multiline: target.is_multiline(),
        };
        for &widget in &target.widgets {
            let Some(rect) = widget_rect(doc, widget) else {
                log::debug!("Widget of '{}' has no /Rect, skipping appearance", field.name);
                continue;
            };
            let (content, _) = text_content(&shown, &rect, &da, &metrics, layout);
            let mut fonts = Dictionary::new();
            fonts.set(da.font.clone(), Object::Reference(font_id));
            let stream = form_xobject(&rect, dictionary! { "Font" => fonts }, &content)?;
            set_normal_appearance(doc, widget, stream)?;
        }
        Ok(true)
    }

    fn fill_checkbox(
        &mut self,
        doc: &mut Document,
        target: &FormField,
        field: &Field,
    ) -> Result<bool> {
        if target.field_type != FormFieldType::Checkbox {
            return self.mismatch(field, target.field_type);
        }

        let checked = field.is_checked();
        let mut field_state = None;
        for &widget in &target.widgets {
            let on = match on_state(doc, widget) {
                Some(on) => on,
                None => {
                    self.build_check_appearance(doc, widget)?;
                    b"Yes".to_vec()
                }
            };
            let state = if checked { on } else { b"Off".to_vec() };
            field_state.get_or_insert_with(|| state.clone());
            objects::dict_mut(doc, widget)?.set("AS", Object::Name(state));
        }

        let value = field_state.unwrap_or_else(|| {
            if checked {
                b"Yes".to_vec()
            } else {
                b"Off".to_vec()
            }
        });
        objects::dict_mut(doc, target.id)?.set("V", Object::Name(value));
        Ok(true)
    }

    /// Give a checkbox widget without appearances a `Yes`/`Off` pair.
    fn build_check_appearance(&mut self, doc: &mut Document, widget: ObjectId) -> Result<()> {
        let Some(rect) = widget_rect(doc, widget) else {
            return Ok(());
        };
        let zapf = self.cache.zapf_dingbats(doc);
        let mut fonts = Dictionary::new();
        fonts.set(ZAPF_RESOURCE.to_vec(), Object::Reference(zapf));

        let on = form_xobject(
            &rect,
            dictionary! { "Font" => fonts },
            &check_content(&rect, ZAPF_RESOURCE),
        )?;
        let off = form_xobject(&rect, Dictionary::new(), &Content { operations: vec![] })?;
        let on_id = doc.add_object(on);
        let off_id = doc.add_object(off);

        objects::dict_mut(doc, widget)?.set(
            "AP",
            dictionary! {
                "N" => dictionary! {
                    "Yes" => Object::Reference(on_id),
                    "Off" => Object::Reference(off_id),
                },
            },
        );
        Ok(())
    }

    fn fill_image(&mut self, doc: &mut Document, target: &FormField, field: &Field) -> Result<bool> {
        if !matches!(
            target.field_type,
            FormFieldType::PushButton | FormFieldType::Text
        ) {
            return self.mismatch(field, target.field_type);
        }

        let loaded = field.image_source().and_then(|source| match source {
            Some(source) => source
                .bytes()
                .and_then(|bytes| self.cache.image(doc, &bytes))
                .map(Some),
            None => Ok(None),
        });
        let image = match loaded {
            Ok(Some(image)) => image,
            Ok(None) => {
                log::debug!("Image field '{}' has no value, left as authored", field.name);
                return Ok(false);
            }
            Err(e) => {
                self.report.warn(FillWarning::ImageUnavailable {
                    name: field.name.clone(),
                    reason: e.to_string(),
                });
                return Ok(false);
            }
        };

        for &widget in &target.widgets {
            let Some(rect) = widget_rect(doc, widget) else {
                continue;
            };
            let content = image_content(&rect, image.width, image.height, IMAGE_RESOURCE);
            let mut xobjects = Dictionary::new();
            xobjects.set(IMAGE_RESOURCE.to_vec(), Object::Reference(image.id));
            let stream = form_xobject(&rect, dictionary! { "XObject" => xobjects }, &content)?;
            set_normal_appearance(doc, widget, stream)?;
        }
        Ok(true)
    }

    fn delete_field(&mut self, doc: &mut Document, name: &str) -> Result<()> {
        let form = self.form;
        let Some(target) = form.get(name) else {
            self.report.warn(FillWarning::UnmappedField {
                name: name.to_string(),
            });
            return Ok(());
        };
        if self.is_deleted(target) {
            return Ok(());
        }

        let widgets = form.subtree_widgets(target);
        self.detach(doc, target)?;

        let pages: Vec<ObjectId> = doc.get_pages().into_values().collect();
        for page in pages {
            for &widget in &widgets {
                objects::remove_reference(doc, page, b"Annots", widget)?;
            }
        }

        let prefix = format!("{}.", name);
        let mut conflicts = Vec::new();
        self.report.filled.retain(|filled| {
            let hit = filled == name || filled.starts_with(&prefix);
            if hit {
                conflicts.push(filled.clone());
            }
            !hit
        });
        for conflict in conflicts {
            self.report
                .warn(FillWarning::FilledThenDeleted { name: conflict });
        }

        log::debug!("Deleted field '{}' ({} widgets)", name, widgets.len());
        self.deleted.insert(target.id);
        self.report.deleted.push(name.to_string());
        Ok(())
    }

    fn is_deleted(&self, field: &FormField) -> bool {
        let mut current = Some(field.id);
        while let Some(id) = current {
            if self.deleted.contains(&id) {
                return true;
            }
            current = self.form.by_id(id).and_then(|f| f.parent);
        }
        false
    }

    /// Unlink a field from the tree, dropping ancestors left without kids.
    fn detach(&mut self, doc: &mut Document, field: &FormField) -> Result<()> {
        let mut current = field.id;
        let mut parent = field.parent;
        loop {
            match parent {
                Some(parent_id) => {
                    let left = objects::remove_reference(doc, parent_id, b"Kids", current)?;
                    match (left, self.form.by_id(parent_id)) {
                        (Some(0), Some(parent_field)) => {
                            current = parent_id;
                            parent = parent_field.parent;
                        }
                        _ => return Ok(()),
                    }
                }
                None => {
                    let catalog = objects::catalog_id(doc)?;
                    let acroform = objects::ensure_indirect(doc, catalog, b"AcroForm")?;
                    objects::remove_reference(doc, acroform, b"Fields", current)?
                        .ok_or_else(|| Error::FieldFill("/AcroForm /Fields is not an array".into()))?;
                    return Ok(());
                }
            }
        }
    }
}

fn set_normal_appearance(doc: &mut Document, widget: ObjectId, stream: Stream) -> Result<()> {
    let id = doc.add_object(stream);
    objects::dict_mut(doc, widget)?.set("AP", dictionary! { "N" => Object::Reference(id) });
    Ok(())
}

/// Rewrite `/DA` on a field and on any of its widgets that carry their own.
fn set_default_appearance(doc: &mut Document, field: &FormField, da: &str) -> Result<()> {
    let value = Object::string_literal(da);
    objects::dict_mut(doc, field.id)?.set("DA", value.clone());
    for &widget in &field.widgets {
        let dict = objects::dict_mut(doc, widget)?;
        if dict.has(b"DA") {
            dict.set("DA", value.clone());
        }
    }
    Ok(())
}
