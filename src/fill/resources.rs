//! Per-document cache of embedded fonts and images.
//!
//! Each font weight and each distinct image is written into the document at
//! most once, however many widgets use it.

use std::collections::HashMap;
use std::io::Write;

use flate2::write::ZlibEncoder;
use flate2::Compression;
use image::{GenericImageView, ImageFormat};
use lopdf::content::Content;
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream};

use crate::error::{Error, Result};
use crate::field::{FontSet, FontWeight};
use crate::form::encoding::win_ansi_char;
use crate::form::objects::{self, get_dict};
use crate::form::{FontMetrics, Rect};

/// Resource name of the ZapfDingbats font in appearance streams.
pub(crate) const ZAPF_RESOURCE: &[u8] = b"ZaDb";

/// A TrueType program embedded as a simple WinAnsi font.
#[derive(Debug, Clone)]
pub(crate) struct EmbeddedFont {
    /// Name under `/AcroForm /DR /Font`
    pub resource: Vec<u8>,
    pub id: ObjectId,
    pub metrics: FontMetrics,
}

/// An embedded image XObject.
#[derive(Debug, Clone, Copy)]
pub(crate) struct EmbeddedImage {
    pub id: ObjectId,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug)]
pub(crate) struct ResourceCache<'f> {
    font_set: Option<&'f FontSet>,
    fonts: HashMap<FontWeight, std::result::Result<EmbeddedFont, String>>,
    images: HashMap<Vec<u8>, EmbeddedImage>,
    form_fonts: HashMap<Vec<u8>, (ObjectId, FontMetrics)>,
    zapf: Option<ObjectId>,
}

impl<'f> ResourceCache<'f> {
    pub fn new(font_set: Option<&'f FontSet>) -> Self {
        Self {
            font_set,
            fonts: HashMap::new(),
            images: HashMap::new(),
            form_fonts: HashMap::new(),
            zapf: None,
        }
    }

    /// Embedded font for `weight`, `None` when no font set was supplied.
    ///
    /// A font that failed to load stays failed for the rest of the document.
    pub fn font(
        &mut self,
        doc: &mut Document,
        weight: FontWeight,
    ) -> Option<std::result::Result<&EmbeddedFont, &str>> {
        let font_set = self.font_set?;
        let entry = self.fonts.entry(weight).or_insert_with(|| {
            let resource = match weight {
                FontWeight::Regular => b"FPRegular".as_slice(),
                FontWeight::Bold => b"FPBold".as_slice(),
            };
            let path = font_set.path(weight);
            std::fs::read(path)
                .map_err(|e| Error::Font(format!("{}: {}", path.display(), e)))
                .and_then(|program| embed_truetype(doc, &program, resource))
                .map_err(|e| e.to_string())
        });
        Some(entry.as_ref().map_err(String::as_str))
    }

    /// Font registered under `name` in the form's default resources.
    ///
    /// A name the template references but never defines is bound to
    /// Helvetica.
    pub fn form_font(&mut self, doc: &mut Document, name: &[u8]) -> Result<(ObjectId, FontMetrics)> {
        if let Some(found) = self.form_fonts.get(name) {
            return Ok(found.clone());
        }

        let acroform = objects::acroform(doc)?;
        let existing = get_dict(doc, acroform, b"DR")
            .and_then(|dr| get_dict(doc, dr, b"Font"))
            .and_then(|fonts| fonts.get(name).ok())
            .cloned();

        let found = match existing {
            Some(Object::Reference(id)) => {
                let metrics = doc
                    .get_dictionary(id)
                    .map(|font| FontMetrics::from_font_dict(doc, font))
                    .unwrap_or_else(|_| FontMetrics::helvetica());
                (id, metrics)
            }
            Some(Object::Dictionary(font)) => {
                let metrics = FontMetrics::from_font_dict(doc, &font);
                let id = doc.add_object(font);
                register_form_font(doc, name, id)?;
                (id, metrics)
            }
            _ => {
                log::debug!(
                    "Font /{} is not in the form resources, binding it to Helvetica",
                    String::from_utf8_lossy(name)
                );
                let id = doc.add_object(dictionary! {
                    "Type" => "Font",
                    "Subtype" => "Type1",
                    "BaseFont" => "Helvetica",
                    "Encoding" => "WinAnsiEncoding",
                });
                register_form_font(doc, name, id)?;
                (id, FontMetrics::helvetica())
            }
        };
        self.form_fonts.insert(name.to_vec(), found.clone());
        Ok(found)
    }

    /// The ZapfDingbats font used for generated check marks.
    pub fn zapf_dingbats(&mut self, doc: &mut Document) -> ObjectId {
        *self.zapf.get_or_insert_with(|| {
            doc.add_object(dictionary! {
                "Type" => "Font",
                "Subtype" => "Type1",
                "BaseFont" => "ZapfDingbats",
            })
        })
    }

    /// Embed an image, reusing an earlier copy with the same bytes.
    ///
    /// Keyed on the bytes themselves, so equal hashes never alias two images.
    pub fn image(&mut self, doc: &mut Document, bytes: &[u8]) -> Result<EmbeddedImage> {
        if let Some(image) = self.images.get(bytes) {
            return Ok(*image);
        }
        let image = embed_image(doc, bytes)?;
        self.images.insert(bytes.to_vec(), image);
        Ok(image)
    }
}

/// Add `name -> id` to `/AcroForm /DR /Font`.
fn register_form_font(doc: &mut Document, name: &[u8], id: ObjectId) -> Result<()> {
    let catalog = objects::catalog_id(doc)?;
    let acroform = objects::ensure_indirect(doc, catalog, b"AcroForm")?;
    let dr = objects::ensure_indirect(doc, acroform, b"DR")?;
    let fonts = objects::ensure_indirect(doc, dr, b"Font")?;
    objects::dict_mut(doc, fonts)?.set(name.to_vec(), Object::Reference(id));
    Ok(())
}

/// Zlib-compress stream data for `/FlateDecode`.
pub(crate) fn deflate(data: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

/// Wrap appearance content in a form XObject sized to `rect`.
pub(crate) fn form_xobject(rect: &Rect, resources: Dictionary, content: &Content) -> Result<Stream> {
    let data = content
        .encode()
        .map_err(|e| Error::FieldFill(format!("cannot encode appearance: {}", e)))?;
    let dict = dictionary! {
        "Type" => "XObject",
        "Subtype" => "Form",
        "BBox" => vec![
            Object::Integer(0),
            Object::Integer(0),
            Object::Real(rect.width()),
            Object::Real(rect.height()),
        ],
        "Resources" => resources,
        "Filter" => "FlateDecode",
    };
    Ok(Stream::new(dict, deflate(&data)?))
}

/// Embed a TrueType program as a WinAnsi simple font and register it in
/// the form resources under `resource`.
fn embed_truetype(doc: &mut Document, program: &[u8], resource: &[u8]) -> Result<EmbeddedFont> {
    let face = ttf_parser::Face::parse(program, 0).map_err(|e| Error::Font(e.to_string()))?;
    let scale = 1000.0 / face.units_per_em().max(1) as f32;
    let to_pdf = |v: i16| (v as f32 * scale).round();

    let widths: Vec<f32> = (32u8..=255)
        .map(|code| {
            win_ansi_char(code)
                .and_then(|c| face.glyph_index(c))
                .and_then(|glyph| face.glyph_hor_advance(glyph))
                .map(|advance| (advance as f32 * scale).round())
                .unwrap_or(0.0)
        })
        .collect();
    let missing_width = face
        .glyph_hor_advance(ttf_parser::GlyphId(0))
        .map(|advance| (advance as f32 * scale).round())
        .unwrap_or(500.0);

    let ascent = to_pdf(face.ascender());
    let descent = to_pdf(face.descender());
    let bbox = face.global_bounding_box();
    let base_font: String = face
        .names()
        .into_iter()
        .find(|name| name.name_id == ttf_parser::name_id::POST_SCRIPT_NAME)
        .and_then(|name| name.to_string())
        .unwrap_or_else(|| String::from_utf8_lossy(resource).into_owned())
        .chars()
        .filter(|c| c.is_ascii_graphic() && !"()<>[]{}/%#".contains(*c))
        .collect();

    let file = Stream::new(
        dictionary! {
            "Length1" => program.len() as i64,
            "Filter" => "FlateDecode",
        },
        deflate(program)?,
    );
    let file_id = doc.add_object(file);

    let descriptor_id = doc.add_object(dictionary! {
        "Type" => "FontDescriptor",
        "FontName" => Object::Name(base_font.clone().into_bytes()),
        "Flags" => 32,
        "FontBBox" => vec![
            Object::Real(to_pdf(bbox.x_min)),
            Object::Real(to_pdf(bbox.y_min)),
            Object::Real(to_pdf(bbox.x_max)),
            Object::Real(to_pdf(bbox.y_max)),
        ],
        "ItalicAngle" => 0,
        "Ascent" => Object::Real(ascent),
        "Descent" => Object::Real(descent),
        "CapHeight" => Object::Real(face.capital_height().map(to_pdf).unwrap_or(ascent)),
        "StemV" => 80,
        "MissingWidth" => Object::Real(missing_width),
        "FontFile2" => Object::Reference(file_id),
    });

    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "TrueType",
        "BaseFont" => Object::Name(base_font.clone().into_bytes()),
        "FirstChar" => 32,
        "LastChar" => 255,
        "Widths" => widths.iter().map(|w| Object::Real(*w)).collect::<Vec<_>>(),
        "FontDescriptor" => Object::Reference(descriptor_id),
        "Encoding" => "WinAnsiEncoding",
    });
    register_form_font(doc, resource, font_id)?;

    log::debug!(
        "Embedded font {} as /{}",
        base_font,
        String::from_utf8_lossy(resource)
    );
    Ok(EmbeddedFont {
        resource: resource.to_vec(),
        id: font_id,
        metrics: FontMetrics {
            first_char: 32,
            widths,
            missing_width,
            ascent,
            descent,
        },
    })
}

/// Embed encoded image bytes as an image XObject.
///
/// Baseline gray and RGB JPEGs are stored as-is; everything else is decoded
/// and stored as Flate-compressed RGB with a soft mask for transparency.
fn embed_image(doc: &mut Document, bytes: &[u8]) -> Result<EmbeddedImage> {
    let format = image::guess_format(bytes)?;
    let decoded = image::load_from_memory_with_format(bytes, format)?;
    let (width, height) = decoded.dimensions();

    if format == ImageFormat::Jpeg {
        let color_space = match jpeg_components(bytes) {
            Some(1) => Some("DeviceGray"),
            Some(3) => Some("DeviceRGB"),
            _ => None,
        };
        if let Some(color_space) = color_space {
            let stream = Stream::new(
                dictionary! {
                    "Type" => "XObject",
                    "Subtype" => "Image",
                    "Width" => width as i64,
                    "Height" => height as i64,
                    "ColorSpace" => color_space,
                    "BitsPerComponent" => 8,
                    "Filter" => "DCTDecode",
                },
                bytes.to_vec(),
            );
            let id = doc.add_object(stream);
            return Ok(EmbeddedImage { id, width, height });
        }
    }

    let rgba = decoded.to_rgba8();
    let mut rgb = Vec::with_capacity((width * height * 3) as usize);
    let mut alpha = Vec::with_capacity((width * height) as usize);
    for pixel in rgba.pixels() {
        rgb.extend_from_slice(&pixel.0[..3]);
        alpha.push(pixel.0[3]);
    }

    let mut dict = dictionary! {
        "Type" => "XObject",
        "Subtype" => "Image",
        "Width" => width as i64,
        "Height" => height as i64,
        "ColorSpace" => "DeviceRGB",
        "BitsPerComponent" => 8,
        "Filter" => "FlateDecode",
    };

    if alpha.iter().any(|&a| a != u8::MAX) {
        let mask = Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => width as i64,
                "Height" => height as i64,
                "ColorSpace" => "DeviceGray",
                "BitsPerComponent" => 8,
                "Filter" => "FlateDecode",
            },
            deflate(&alpha)?,
        );
        dict.set("SMask", Object::Reference(doc.add_object(mask)));
    }

    let id = doc.add_object(Stream::new(dict, deflate(&rgb)?));
    Ok(EmbeddedImage { id, width, height })
}

/// Number of colour components declared in a JPEG's start-of-frame marker.
fn jpeg_components(bytes: &[u8]) -> Option<u8> {
    let mut i = 2;
    while i + 4 <= bytes.len() {
        if bytes[i] != 0xFF {
            return None;
        }
        let marker = bytes[i + 1];
        if marker == 0xFF {
            i += 1;
            continue;
        }
        let len = u16::from_be_bytes([bytes[i + 2], bytes[i + 3]]) as usize;
        // SOF0..SOF3; later SOF markers (arithmetic, lossless) are rare in photos
        if (0xC0..=0xC3).contains(&marker) {
            return bytes.get(i + 9).copied();
        }
        i += 2 + len;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{png_bytes, TemplateBuilder};

    #[test]
    fn test_deflate_roundtrip() {
        use flate2::read::ZlibDecoder;
        use std::io::Read;

        let data = b"BT /Helv 12 Tf (hello) Tj ET".repeat(10);
        let compressed = deflate(&data).unwrap();
        let mut out = Vec::new();
        ZlibDecoder::new(compressed.as_slice())
            .read_to_end(&mut out)
            .unwrap();
        assert_eq!(out, data);
    }

    #[test]
    fn test_image_embedded_once() {
        let mut doc = TemplateBuilder::new().text("x").document();
        let mut cache = ResourceCache::new(None);
        let png = png_bytes(4, 2, false);

        let a = cache.image(&mut doc, &png).unwrap();
        let before = doc.objects.len();
        let b = cache.image(&mut doc, &png).unwrap();
        assert_eq!(a.id, b.id);
        assert_eq!(doc.objects.len(), before);
        assert_eq!((a.width, a.height), (4, 2));
    }

    #[test]
    fn test_distinct_images_not_shared() {
        let mut doc = TemplateBuilder::new().text("x").document();
        let mut cache = ResourceCache::new(None);

        let a = cache.image(&mut doc, &png_bytes(4, 2, false)).unwrap();
        let b = cache.image(&mut doc, &png_bytes(2, 4, false)).unwrap();
        assert_ne!(a.id, b.id);
        assert_eq!((b.width, b.height), (2, 4));
    }

    #[test]
    fn test_transparent_image_gets_soft_mask() {
        let mut doc = TemplateBuilder::new().text("x").document();
        let mut cache = ResourceCache::new(None);
        let image = cache.image(&mut doc, &png_bytes(3, 3, true)).unwrap();
        let stream = doc.get_object(image.id).unwrap().as_stream().unwrap();
        assert!(stream.dict.has(b"SMask"));

        let opaque = cache.image(&mut doc, &png_bytes(3, 3, false)).unwrap();
        let stream = doc.get_object(opaque.id).unwrap().as_stream().unwrap();
        assert!(!stream.dict.has(b"SMask"));
    }

    #[test]
    fn test_undecodable_image() {
        let mut doc = TemplateBuilder::new().text("x").document();
        let mut cache = ResourceCache::new(None);
        assert!(matches!(
            cache.image(&mut doc, b"not an image"),
            Err(Error::Image(_))
        ));
    }

    #[test]
    fn test_form_font_binds_missing_name() {
        let mut doc = TemplateBuilder::new().text("x").document();
        let mut cache = ResourceCache::new(None);

        let (helv, metrics) = cache.form_font(&mut doc, b"Helv").unwrap();
        assert_eq!(metrics.width(b' '), 278.0);
        let (again, _) = cache.form_font(&mut doc, b"Helv").unwrap();
        assert_eq!(helv, again);

        let (added, _) = cache.form_font(&mut doc, b"F9").unwrap();
        let acroform = objects::acroform(&doc).unwrap();
        let fonts = get_dict(&doc, acroform, b"DR")
            .and_then(|dr| get_dict(&doc, dr, b"Font"))
            .unwrap();
        assert_eq!(fonts.get(b"F9").unwrap().as_reference().unwrap(), added);
    }

    #[test]
    fn test_missing_font_program_fails_once() {
        let mut doc = TemplateBuilder::new().text("x").document();
        let set = FontSet::new("/missing/Regular.ttf", "/missing/Bold.ttf");
        let mut cache = ResourceCache::new(Some(&set));

        assert!(matches!(cache.font(&mut doc, FontWeight::Bold), Some(Err(_))));
        assert!(matches!(cache.font(&mut doc, FontWeight::Bold), Some(Err(_))));
        assert!(ResourceCache::new(None).font(&mut doc, FontWeight::Regular).is_none());
    }

    #[test]
    fn test_jpeg_components() {
        // SOI, APP0 (len 4), SOF0 with 3 components
        let jpeg = [
            0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x04, 0x00, 0x00, 0xFF, 0xC0, 0x00, 0x11, 0x08, 0x00,
            0x10, 0x00, 0x10, 0x03,
        ];
        assert_eq!(jpeg_components(&jpeg), Some(3));
        assert_eq!(jpeg_components(b"\xFF\xD8garbage"), None);
    }
}
