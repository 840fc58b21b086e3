//! Interactive form (AcroForm) model.
//!
//! [`Form`] is a read-only snapshot of the field tree of a document: every
//! named node with its fully-qualified name, inherited attributes and widget
//! annotations. Mutation goes through the filler, which re-reads nothing and
//! addresses objects by the ids recorded here.

pub mod appearance;
pub mod encoding;
pub(crate) mod objects;

use std::collections::{HashMap, HashSet};

use lopdf::{Dictionary, Document, Object, ObjectId};
use serde::Serialize;

use crate::error::{Error, Result};
use objects::{get, get_array, get_bytes, get_dict, get_int, get_name, number};

pub use appearance::{DefaultAppearance, FontMetrics, Quadding, Rect};

/// Default appearance used when neither the field nor the form provides one.
pub const FALLBACK_DA: &str = "/Helv 0 Tf 0 g";

/// Field flag: multi-line text (bit 13).
pub const FLAG_MULTILINE: u32 = 1 << 12;
/// Field flag: password text (bit 14).
pub const FLAG_PASSWORD: u32 = 1 << 13;
/// Field flag: radio button (bit 16).
pub const FLAG_RADIO: u32 = 1 << 15;
/// Field flag: push button (bit 17).
pub const FLAG_PUSHBUTTON: u32 = 1 << 16;

const MAX_DEPTH: usize = 32;

/// Type of a form field, derived from `/FT` and `/Ff`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FormFieldType {
    Text,
    Checkbox,
    Radio,
    PushButton,
    Choice,
    Signature,
    Unknown,
}

impl FormFieldType {
    fn from_entries(ft: Option<&[u8]>, flags: u32) -> Self {
        match ft {
            Some(b"Tx") => FormFieldType::Text,
            Some(b"Btn") if flags & FLAG_PUSHBUTTON != 0 => FormFieldType::PushButton,
            Some(b"Btn") if flags & FLAG_RADIO != 0 => FormFieldType::Radio,
            Some(b"Btn") => FormFieldType::Checkbox,
            Some(b"Ch") => FormFieldType::Choice,
            Some(b"Sig") => FormFieldType::Signature,
            _ => FormFieldType::Unknown,
        }
    }
}

impl std::fmt::Display for FormFieldType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            FormFieldType::Text => "text",
            FormFieldType::Checkbox => "checkbox",
            FormFieldType::Radio => "radio",
            FormFieldType::PushButton => "pushbutton",
            FormFieldType::Choice => "choice",
            FormFieldType::Signature => "signature",
            FormFieldType::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// One named node of the field tree.
#[derive(Debug, Clone)]
pub struct FormField {
    /// Field dictionary object
    pub id: ObjectId,
    /// Fully-qualified name (`parent.child`)
    pub name: String,
    /// Parent field, `None` for entries of `/AcroForm /Fields`
    pub parent: Option<ObjectId>,
    /// Field type
    pub field_type: FormFieldType,
    /// `/Ff` flags, inherited
    pub flags: u32,
    /// `/DA` default appearance, inherited from ancestors or the form
    pub default_appearance: Option<String>,
    /// `/Q` quadding, inherited
    pub quadding: Quadding,
    /// Widget annotations that belong directly to this field
    pub widgets: Vec<ObjectId>,
    /// Child fields (non-empty for field groups)
    pub children: Vec<ObjectId>,
}

impl FormField {
    /// Whether this field holds a value (has no child fields).
    pub fn is_terminal(&self) -> bool {
        self.children.is_empty()
    }

    pub fn is_multiline(&self) -> bool {
        self.flags & FLAG_MULTILINE != 0
    }

    /// Current value, looked up through inherited `/V` entries.
    pub fn value(&self, doc: &Document) -> FieldValue {
        let mut current = Some(self.id);
        let mut hops = 0;
        while let Some(id) = current {
            let Ok(dict) = doc.get_dictionary(id) else {
                break;
            };
            if let Some(value) = get(doc, dict, b"V") {
                return FieldValue::from_object(value);
            }
            current = dict.get(b"Parent").ok().and_then(|p| p.as_reference().ok());
            hops += 1;
            if hops > MAX_DEPTH {
                break;
            }
        }
        FieldValue::None
    }
}

/// Value of a form field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    None,
    /// Text string value (text and choice fields)
    Text(String),
    /// Name value (button states)
    Name(String),
}

impl FieldValue {
    fn from_object(obj: &Object) -> Self {
        match obj {
            Object::String(bytes, _) => FieldValue::Text(encoding::decode_text_string(bytes)),
            Object::Name(name) => FieldValue::Name(String::from_utf8_lossy(name).into_owned()),
            _ => FieldValue::None,
        }
    }

    /// Text of a string value.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Whether a button value is in an "on" state.
    pub fn is_on(&self) -> bool {
        matches!(self, FieldValue::Name(n) if n != "Off")
    }
}

/// Serializable summary of a field, for listings.
#[derive(Debug, Clone, Serialize)]
pub struct FieldInfo {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FormFieldType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    pub widgets: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub pages: Vec<u32>,
}

#[derive(Debug, Clone, Default)]
struct Inherited {
    field_type: Option<Vec<u8>>,
    flags: Option<u32>,
    default_appearance: Option<String>,
    quadding: Option<i64>,
}

impl Inherited {
    fn merge(&self, doc: &Document, dict: &Dictionary) -> Self {
        Inherited {
            field_type: get_name(doc, dict, b"FT")
                .map(<[u8]>::to_vec)
                .or_else(|| self.field_type.clone()),
            flags: get_int(doc, dict, b"Ff")
                .map(|f| f as u32)
                .or(self.flags),
            default_appearance: get_bytes(doc, dict, b"DA")
                .map(|b| String::from_utf8_lossy(b).into_owned())
                .or_else(|| self.default_appearance.clone()),
            quadding: get_int(doc, dict, b"Q").or(self.quadding),
        }
    }
}

/// Snapshot of a document's field tree.
#[derive(Debug, Clone, Default)]
pub struct Form {
    fields: Vec<FormField>,
    by_name: HashMap<String, usize>,
    by_id: HashMap<ObjectId, usize>,
}

impl Form {
    /// Read the field tree of `doc`.
    ///
    /// Returns [`Error::TemplateCorrupt`] when the document has no form and
    /// [`Error::FieldFill`] when the tree references missing objects.
    pub fn read(doc: &Document) -> Result<Self> {
        let acroform = objects::acroform(doc)?;
        let roots: Vec<ObjectId> = get_array(doc, acroform, b"Fields")
            .ok_or_else(|| Error::FieldFill("/AcroForm /Fields is not an array".into()))?
            .iter()
            .filter_map(|o| match o {
                Object::Reference(id) => Some(*id),
                _ => {
                    log::warn!("Skipping inline field dictionary in /AcroForm /Fields");
                    None
                }
            })
            .collect();

        let defaults = Inherited {
            default_appearance: get_bytes(doc, acroform, b"DA")
                .map(|b| String::from_utf8_lossy(b).into_owned()),
            quadding: get_int(doc, acroform, b"Q"),
            ..Inherited::default()
        };

        let mut form = Form::default();
        let mut visited = HashSet::new();
        for id in roots {
            form.walk(doc, id, None, "", &defaults, &mut visited, 0)?;
        }
        log::debug!("Read form with {} fields", form.fields.len());
        Ok(form)
    }

    #[allow(clippy::too_many_arguments)]
    fn walk(
        &mut self,
        doc: &Document,
        id: ObjectId,
        parent: Option<ObjectId>,
        prefix: &str,
        inherited: &Inherited,
        visited: &mut HashSet<ObjectId>,
        depth: usize,
    ) -> Result<()> {
        if depth > MAX_DEPTH {
            return Err(Error::FieldFill("field tree is nested too deeply".into()));
        }
        if !visited.insert(id) {
            log::warn!("Field object {} {} R is referenced twice", id.0, id.1);
            return Ok(());
        }

        let dict = doc
            .get_dictionary(id)
            .map_err(|_| objects::corrupt(id, "is referenced by the form but missing"))?;

        let name = match get_bytes(doc, dict, b"T").map(encoding::decode_text_string) {
            Some(partial) if prefix.is_empty() => partial,
            Some(partial) => format!("{}.{}", prefix, partial),
            None => prefix.to_string(),
        };
        let inherited = inherited.merge(doc, dict);

        let mut widgets = Vec::new();
        let mut children = Vec::new();
        if let Some(kids) = get_array(doc, dict, b"Kids") {
            for kid in kids {
                let Object::Reference(kid_id) = kid else {
                    continue;
                };
                let kid_dict = doc
                    .get_dictionary(*kid_id)
                    .map_err(|_| objects::corrupt(*kid_id, "is a missing /Kids entry"))?;
                if kid_dict.has(b"T") || kid_dict.has(b"Kids") {
                    children.push(*kid_id);
                } else {
                    widgets.push(*kid_id);
                }
            }
        } else if is_widget(doc, dict) {
            widgets.push(id);
        }

        let flags = inherited.flags.unwrap_or(0);
        let field = FormField {
            id,
            name: name.clone(),
            parent,
            field_type: FormFieldType::from_entries(inherited.field_type.as_deref(), flags),
            flags,
            default_appearance: inherited.default_appearance.clone(),
            quadding: Quadding::from_value(inherited.quadding.unwrap_or(0)),
            widgets,
            children: children.clone(),
        };
        self.insert(field);

        for child in children {
            self.walk(doc, child, Some(id), &name, &inherited, visited, depth + 1)?;
        }
        Ok(())
    }

    fn insert(&mut self, field: FormField) {
        let index = self.fields.len();
        self.by_id.insert(field.id, index);
        if !field.name.is_empty() {
            if self.by_name.contains_key(&field.name) {
                log::warn!("Duplicate form field name '{}', keeping the first", field.name);
            } else {
                self.by_name.insert(field.name.clone(), index);
            }
        }
        self.fields.push(field);
    }

    /// Look up a field by exact fully-qualified name.
    pub fn get(&self, name: &str) -> Option<&FormField> {
        self.by_name.get(name).map(|&i| &self.fields[i])
    }

    /// Look up a field by object id.
    pub fn by_id(&self, id: ObjectId) -> Option<&FormField> {
        self.by_id.get(&id).map(|&i| &self.fields[i])
    }

    /// Whether a field with this exact name exists.
    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    /// Fields that hold values, in document order.
    pub fn fields(&self) -> impl Iterator<Item = &FormField> {
        self.fields
            .iter()
            .filter(|f| f.is_terminal() && !f.name.is_empty())
    }

    /// Names of the value-holding fields.
    pub fn names(&self) -> Vec<&str> {
        self.fields().map(|f| f.name.as_str()).collect()
    }

    /// Number of value-holding fields.
    pub fn len(&self) -> usize {
        self.fields().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Widgets of a field and of all its descendants.
    pub fn subtree_widgets(&self, field: &FormField) -> Vec<ObjectId> {
        let mut out = field.widgets.clone();
        let mut stack = field.children.clone();
        while let Some(id) = stack.pop() {
            if let Some(child) = self.by_id(id) {
                out.extend_from_slice(&child.widgets);
                stack.extend_from_slice(&child.children);
            }
        }
        out
    }

    /// Text value of a field by name.
    pub fn text_value(&self, doc: &Document, name: &str) -> Option<String> {
        match self.get(name)?.value(doc) {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Checked state of a checkbox by name.
    pub fn is_checked(&self, doc: &Document, name: &str) -> Option<bool> {
        self.get(name).map(|f| f.value(doc).is_on())
    }

    /// Summaries of the value-holding fields.
    pub fn info(&self, doc: &Document) -> Vec<FieldInfo> {
        let pages: HashMap<ObjectId, u32> = doc
            .get_pages()
            .into_iter()
            .flat_map(|(number, page_id)| {
                page_annotations(doc, page_id)
                    .into_iter()
                    .map(move |annot| (annot, number))
            })
            .collect();

        self.fields()
            .map(|f| {
                let mut on_pages: Vec<u32> =
                    f.widgets.iter().filter_map(|w| pages.get(w).copied()).collect();
                on_pages.sort_unstable();
                on_pages.dedup();
                FieldInfo {
                    name: f.name.clone(),
                    field_type: f.field_type,
                    value: match f.value(doc) {
                        FieldValue::None => None,
                        FieldValue::Text(s) | FieldValue::Name(s) => Some(s),
                    },
                    widgets: f.widgets.len(),
                    pages: on_pages,
                }
            })
            .collect()
    }
}

fn is_widget(doc: &Document, dict: &Dictionary) -> bool {
    get_name(doc, dict, b"Subtype") == Some(b"Widget".as_slice()) || dict.has(b"Rect")
}

/// Annotation references of a page.
pub(crate) fn page_annotations(doc: &Document, page_id: ObjectId) -> Vec<ObjectId> {
    doc.get_dictionary(page_id)
        .ok()
        .and_then(|page| get_array(doc, page, b"Annots"))
        .map(|annots| {
            annots
                .iter()
                .filter_map(|a| a.as_reference().ok())
                .collect()
        })
        .unwrap_or_default()
}

/// Rectangle of a widget annotation.
pub(crate) fn widget_rect(doc: &Document, widget: ObjectId) -> Option<Rect> {
    let dict = doc.get_dictionary(widget).ok()?;
    let values: Vec<f32> = get_array(doc, dict, b"Rect")?
        .iter()
        .filter_map(|o| objects::resolve(doc, o).and_then(number))
        .collect();
    Rect::from_slice(&values)
}

/// Name of the "on" appearance state of a checkbox widget.
pub(crate) fn on_state(doc: &Document, widget: ObjectId) -> Option<Vec<u8>> {
    let dict = doc.get_dictionary(widget).ok()?;
    let ap = get_dict(doc, dict, b"AP")?;
    let normal = match get(doc, ap, b"N")? {
        Object::Dictionary(states) => states,
        _ => return None,
    };
    normal
        .iter()
        .map(|(key, _)| key)
        .find(|key| key.as_slice() != b"Off")
        .cloned()
}
