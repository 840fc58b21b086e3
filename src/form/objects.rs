//! Small helpers over the lopdf object model.
//!
//! Templates in the wild store the same entry either inline or behind an
//! indirect reference; everything here accepts both.

use lopdf::{Dictionary, Document, Object, ObjectId};

use crate::error::{Error, Result};

/// Follow one level of indirection.
pub(crate) fn resolve<'a>(doc: &'a Document, obj: &'a Object) -> Option<&'a Object> {
    match obj {
        Object::Reference(id) => doc.get_object(*id).ok(),
        other => Some(other),
    }
}

/// Look up `key` in `dict` and resolve it.
pub(crate) fn get<'a>(doc: &'a Document, dict: &'a Dictionary, key: &[u8]) -> Option<&'a Object> {
    dict.get(key).ok().and_then(|o| resolve(doc, o))
}

pub(crate) fn get_dict<'a>(
    doc: &'a Document,
    dict: &'a Dictionary,
    key: &[u8],
) -> Option<&'a Dictionary> {
    match get(doc, dict, key)? {
        Object::Dictionary(d) => Some(d),
        Object::Stream(s) => Some(&s.dict),
        _ => None,
    }
}

pub(crate) fn get_array<'a>(
    doc: &'a Document,
    dict: &'a Dictionary,
    key: &[u8],
) -> Option<&'a Vec<Object>> {
    match get(doc, dict, key)? {
        Object::Array(a) => Some(a),
        _ => None,
    }
}

pub(crate) fn get_name<'a>(doc: &'a Document, dict: &'a Dictionary, key: &[u8]) -> Option<&'a [u8]> {
    match get(doc, dict, key)? {
        Object::Name(n) => Some(n.as_slice()),
        _ => None,
    }
}

pub(crate) fn get_int(doc: &Document, dict: &Dictionary, key: &[u8]) -> Option<i64> {
    match get(doc, dict, key)? {
        Object::Integer(i) => Some(*i),
        Object::Real(r) => Some(*r as i64),
        _ => None,
    }
}

pub(crate) fn get_bytes<'a>(doc: &'a Document, dict: &'a Dictionary, key: &[u8]) -> Option<&'a [u8]> {
    match get(doc, dict, key)? {
        Object::String(bytes, _) => Some(bytes.as_slice()),
        _ => None,
    }
}

/// Numeric value of an object, integer or real.
pub(crate) fn number(obj: &Object) -> Option<f32> {
    match obj {
        Object::Integer(i) => Some(*i as f32),
        Object::Real(r) => Some(*r),
        _ => None,
    }
}

/// Object id of the document catalog.
pub(crate) fn catalog_id(doc: &Document) -> Result<ObjectId> {
    doc.trailer
        .get(b"Root")
        .ok()
        .and_then(|o| o.as_reference().ok())
        .ok_or_else(|| Error::TemplateCorrupt("missing document catalog".into()))
}

/// The interactive form dictionary.
pub(crate) fn acroform(doc: &Document) -> Result<&Dictionary> {
    let catalog = doc
        .get_dictionary(catalog_id(doc)?)
        .map_err(|_| Error::TemplateCorrupt("document catalog is not a dictionary".into()))?;
    get_dict(doc, catalog, b"AcroForm")
        .ok_or_else(|| Error::TemplateCorrupt("document has no interactive form".into()))
}

/// Make `owner[key]` an indirect dictionary and return its id.
///
/// Inline dictionaries are moved into their own object, a missing entry is
/// created empty.
pub(crate) fn ensure_indirect(doc: &mut Document, owner: ObjectId, key: &[u8]) -> Result<ObjectId> {
    let current = doc
        .get_dictionary(owner)
        .map_err(|_| corrupt(owner, "is not a dictionary"))?
        .get(key)
        .ok()
        .cloned();

    let id = match current {
        Some(Object::Reference(id)) => return Ok(id),
        Some(Object::Dictionary(dict)) => doc.add_object(dict),
        Some(_) => {
            return Err(Error::FieldFill(format!(
                "/{} of object {} {} R is not a dictionary",
                String::from_utf8_lossy(key),
                owner.0,
                owner.1
            )))
        }
        None => doc.add_object(Dictionary::new()),
    };

    doc.get_dictionary_mut(owner)
        .map_err(|_| corrupt(owner, "is not a dictionary"))?
        .set(key.to_vec(), Object::Reference(id));
    Ok(id)
}

/// Remove every reference to `target` from the array at `owner[key]`.
///
/// Returns the number of entries left, or `None` when there is no such array.
pub(crate) fn remove_reference(
    doc: &mut Document,
    owner: ObjectId,
    key: &[u8],
    target: ObjectId,
) -> Result<Option<usize>> {
    let holder = match doc.get_dictionary(owner) {
        Ok(dict) => dict.get(key).ok().cloned(),
        Err(_) => return Ok(None),
    };

    let array = match holder {
        Some(Object::Reference(array_id)) => match doc.get_object_mut(array_id) {
            Ok(Object::Array(array)) => array,
            _ => return Ok(None),
        },
        Some(Object::Array(_)) => match doc
            .get_dictionary_mut(owner)
            .map_err(|_| corrupt(owner, "is not a dictionary"))?
            .get_mut(key)
        {
            Ok(Object::Array(array)) => array,
            _ => return Ok(None),
        },
        _ => return Ok(None),
    };

    array.retain(|o| !matches!(o, Object::Reference(r) if *r == target));
    Ok(Some(array.len()))
}

/// Mutable access to a dictionary object, reporting a broken form tree otherwise.
pub(crate) fn dict_mut(doc: &mut Document, id: ObjectId) -> Result<&mut Dictionary> {
    doc.get_dictionary_mut(id)
        .map_err(|_| corrupt(id, "is missing or not a dictionary"))
}

pub(crate) fn corrupt(id: ObjectId, what: &str) -> Error {
    Error::FieldFill(format!("object {} {} R {}", id.0, id.1, what))
}
