//! Appearance stream content for filled widgets.
//!
//! Builders here only produce content operations; wrapping them in form
//! XObjects and registering resources is done by the filler.

use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, StringFormat};

use super::encoding::encode_win_ansi;
use super::objects::{get, get_array, get_dict, get_int, get_name, number, resolve};
use super::FALLBACK_DA;

/// Inner padding between the widget border and its text.
const PADDING: f32 = 2.0;
/// Smallest size auto-sized text shrinks to.
const MIN_FONT_SIZE: f32 = 4.0;
/// Starting size for auto-sized multi-line text.
const MULTILINE_FONT_SIZE: f32 = 12.0;
const SHRINK_STEP: f32 = 0.5;

/// Helvetica advance widths for WinAnsiEncoding codes 32..=255 (0 = unassigned).
#[rustfmt::skip]
const HELVETICA_WIDTHS: [u16; 224] = [
    278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333, 278, 278,
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, 278, 278, 584, 584, 584, 556,
    1015, 667, 667, 722, 722, 667, 611, 778, 722, 278, 500, 667, 556, 833, 722, 778,
    667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, 278, 278, 278, 469, 556,
    333, 556, 556, 500, 556, 556, 278, 556, 556, 222, 222, 500, 222, 833, 556, 556,
    556, 556, 333, 500, 278, 556, 500, 722, 500, 500, 500, 334, 260, 334, 584, 0,
    556, 0, 222, 556, 333, 1000, 556, 556, 333, 1000, 667, 333, 1000, 0, 611, 0,
    0, 222, 222, 333, 333, 350, 556, 1000, 333, 1000, 500, 333, 944, 0, 500, 667,
    278, 333, 556, 556, 556, 556, 260, 556, 333, 737, 370, 556, 584, 333, 737, 333,
    400, 584, 333, 333, 333, 556, 537, 278, 333, 333, 365, 556, 834, 834, 834, 611,
    667, 667, 667, 667, 667, 667, 1000, 722, 667, 667, 667, 667, 278, 278, 278, 278,
    722, 722, 778, 778, 778, 778, 778, 584, 778, 722, 722, 722, 722, 667, 667, 611,
    556, 556, 556, 556, 556, 556, 889, 500, 556, 556, 556, 556, 278, 278, 278, 278,
    556, 556, 556, 556, 556, 556, 556, 584, 611, 556, 556, 556, 556, 500, 556, 500,
];

/// Widget rectangle in default user space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub llx: f32,
    pub lly: f32,
    pub urx: f32,
    pub ury: f32,
}

impl Rect {
    /// Build a normalized rectangle from a four-number `/Rect` array.
    pub fn from_slice(values: &[f32]) -> Option<Self> {
        match values {
            [a, b, c, d] => Some(Rect {
                llx: a.min(*c),
                lly: b.min(*d),
                urx: a.max(*c),
                ury: b.max(*d),
            }),
            _ => None,
        }
    }

    pub fn width(&self) -> f32 {
        self.urx - self.llx
    }

    pub fn height(&self) -> f32 {
        self.ury - self.lly
    }
}

/// Horizontal text alignment (`/Q`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Quadding {
    #[default]
    Left,
    Center,
    Right,
}

impl Quadding {
    pub fn from_value(value: i64) -> Self {
        match value {
            1 => Quadding::Center,
            2 => Quadding::Right,
            _ => Quadding::Left,
        }
    }
}

/// Parsed default appearance string (`/DA`).
#[derive(Debug, Clone)]
pub struct DefaultAppearance {
    /// Font resource name, without the leading slash
    pub font: Vec<u8>,
    /// Font size, 0 means auto
    pub size: f32,
    /// Colour operations (`g`, `rg` or `k`)
    pub color: Vec<Operation>,
}

impl DefaultAppearance {
    /// Parse a `/DA` string. Missing parts fall back to `/Helv 0 Tf 0 g`.
    pub fn parse(da: &str) -> Self {
        let mut font = None;
        let mut size = 0.0;
        let mut color = Vec::new();

        if let Ok(content) = Content::decode(da.as_bytes()) {
            for op in content.operations {
                match op.operator.as_str() {
                    "Tf" => {
                        if let [Object::Name(name), value] = op.operands.as_slice() {
                            font = Some(name.clone());
                            size = number(value).unwrap_or(0.0);
                        }
                    }
                    "g" | "rg" | "k" => color = vec![op],
                    _ => {}
                }
            }
        }

        match font {
            Some(font) => DefaultAppearance {
                font,
                size: size.max(0.0),
                color: if color.is_empty() { black() } else { color },
            },
            None => {
                log::debug!("Default appearance '{}' has no font, using fallback", da);
                DefaultAppearance::fallback()
            }
        }
    }

    pub fn fallback() -> Self {
        DefaultAppearance {
            font: b"Helv".to_vec(),
            size: 0.0,
            color: black(),
        }
    }

    /// Same appearance with another font resource.
    pub fn with_font(&self, font: &[u8]) -> Self {
        DefaultAppearance {
            font: font.to_vec(),
            ..self.clone()
        }
    }

    pub fn font_name(&self) -> String {
        String::from_utf8_lossy(&self.font).into_owned()
    }

    /// Serialize back to a `/DA` string.
    pub fn to_da_string(&self) -> String {
        let mut out = format!("/{} {} Tf", self.font_name(), fmt_num(self.size));
        for op in &self.color {
            for operand in &op.operands {
                if let Some(n) = number(operand) {
                    out.push(' ');
                    out.push_str(&fmt_num(n));
                }
            }
            out.push(' ');
            out.push_str(&op.operator);
        }
        out
    }
}

impl Default for DefaultAppearance {
    fn default() -> Self {
        DefaultAppearance::parse(FALLBACK_DA)
    }
}

fn black() -> Vec<Operation> {
    vec![Operation::new("g", vec![Object::Integer(0)])]
}

fn fmt_num(value: f32) -> String {
    if value.fract() == 0.0 {
        format!("{}", value as i64)
    } else {
        let s = format!("{:.3}", value);
        s.trim_end_matches('0').trim_end_matches('.').to_string()
    }
}

/// Glyph metrics of a simple font in WinAnsiEncoding, in 1/1000 em.
#[derive(Debug, Clone, PartialEq)]
pub struct FontMetrics {
    pub first_char: u8,
    pub widths: Vec<f32>,
    pub missing_width: f32,
    pub ascent: f32,
    pub descent: f32,
}

impl FontMetrics {
    /// Metrics of the standard Helvetica font.
    pub fn helvetica() -> Self {
        FontMetrics {
            first_char: 32,
            widths: HELVETICA_WIDTHS.iter().map(|&w| w as f32).collect(),
            missing_width: 556.0,
            ascent: 718.0,
            descent: -207.0,
        }
    }

    /// Fixed-pitch metrics (Courier family).
    pub fn monospace() -> Self {
        FontMetrics {
            first_char: 32,
            widths: vec![600.0; 224],
            missing_width: 600.0,
            ascent: 629.0,
            descent: -157.0,
        }
    }

    /// Metrics from a font dictionary, falling back to the standard fonts
    /// when `/Widths` is absent.
    pub fn from_font_dict(doc: &Document, font: &Dictionary) -> Self {
        let base = get_name(doc, font, b"BaseFont").unwrap_or_default();
        let mut metrics = if base.windows(7).any(|w| w == b"Courier") {
            FontMetrics::monospace()
        } else {
            FontMetrics::helvetica()
        };

        if let Some(widths) = get_array(doc, font, b"Widths") {
            metrics.first_char = get_int(doc, font, b"FirstChar").unwrap_or(0).clamp(0, 255) as u8;
            metrics.widths = widths
                .iter()
                .map(|w| resolve(doc, w).and_then(number).unwrap_or(0.0))
                .collect();
        }

        if let Some(descriptor) = get_dict(doc, font, b"FontDescriptor") {
            let value = |key: &[u8]| get(doc, descriptor, key).and_then(number);
            if let Some(missing) = value(b"MissingWidth").filter(|w| *w > 0.0) {
                metrics.missing_width = missing;
            }
            if let Some(ascent) = value(b"Ascent").filter(|a| *a > 0.0) {
                metrics.ascent = ascent;
            }
            if let Some(descent) = value(b"Descent").filter(|d| *d < 0.0) {
                metrics.descent = descent;
            }
        }
        metrics
    }

    /// Advance width of one code.
    pub fn width(&self, code: u8) -> f32 {
        code.checked_sub(self.first_char)
            .and_then(|i| self.widths.get(i as usize))
            .copied()
            .filter(|w| *w > 0.0)
            .unwrap_or(self.missing_width)
    }

    /// Width of encoded text at `size`.
    pub fn text_width(&self, encoded: &[u8], size: f32) -> f32 {
        encoded.iter().map(|&c| self.width(c)).sum::<f32>() * size / 1000.0
    }

    /// Height of one line (ascent to descent) at `size`.
    pub fn line_height(&self, size: f32) -> f32 {
        (self.ascent - self.descent) * size / 1000.0
    }
}

/// Layout switches for a text widget.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextLayout {
    pub quadding: Quadding,
    pub multiline: bool,
}

/// Content of a text widget appearance.
///
/// Returns the operations and the font size actually used, which differs
/// from `da.size` when the field auto-sizes.
pub fn text_content(
    text: &str,
    rect: &Rect,
    da: &DefaultAppearance,
    metrics: &FontMetrics,
    layout: TextLayout,
) -> (Content, f32) {
    let width = rect.width();
    let height = rect.height();
    let inner_width = (width - 2.0 * PADDING).max(0.0);
    let inner_height = (height - 2.0 * PADDING).max(0.0);

    let (lines, size) = if layout.multiline {
        layout_multiline(text, inner_width, inner_height, da.size, metrics)
    } else {
        let line = encode_win_ansi(&text.replace(['\r', '\n'], " "));
        let size = if da.size > 0.0 {
            da.size
        } else {
            let by_height = inner_height / metrics.line_height(1.0);
            let unit_width = metrics.text_width(&line, 1.0);
            let by_width = if unit_width > 0.0 {
                inner_width / unit_width
            } else {
                by_height
            };
            by_height.min(by_width).max(MIN_FONT_SIZE)
        };
        (vec![line], size)
    };

    let ascent = metrics.ascent * size / 1000.0;
    let descent = metrics.descent * size / 1000.0;
    let first_baseline = if layout.multiline {
        height - PADDING - ascent
    } else {
        (height - (ascent - descent)) / 2.0 - descent
    };
    let leading = metrics.line_height(size);

    let mut ops = vec![
        Operation::new("BMC", vec![Object::Name(b"Tx".to_vec())]),
        Operation::new("q", vec![]),
        Operation::new(
            "re",
            vec![
                Object::Real(1.0),
                Object::Real(1.0),
                Object::Real((width - 2.0).max(0.0)),
                Object::Real((height - 2.0).max(0.0)),
            ],
        ),
        Operation::new("W", vec![]),
        Operation::new("n", vec![]),
        Operation::new("BT", vec![]),
        Operation::new(
            "Tf",
            vec![Object::Name(da.font.clone()), Object::Real(size)],
        ),
    ];
    ops.extend(da.color.iter().cloned());

    for (i, line) in lines.into_iter().enumerate() {
        let line_width = metrics.text_width(&line, size);
        let x = match layout.quadding {
            Quadding::Left => PADDING,
            Quadding::Center => (width - line_width) / 2.0,
            Quadding::Right => width - PADDING - line_width,
        };
        let y = first_baseline - i as f32 * leading;
        ops.push(Operation::new(
            "Tm",
            vec![
                Object::Integer(1),
                Object::Integer(0),
                Object::Integer(0),
                Object::Integer(1),
                Object::Real(x),
                Object::Real(y),
            ],
        ));
        ops.push(Operation::new(
            "Tj",
            vec![Object::String(line, StringFormat::Literal)],
        ));
    }

    ops.push(Operation::new("ET", vec![]));
    ops.push(Operation::new("Q", vec![]));
    ops.push(Operation::new("EMC", vec![]));
    (Content { operations: ops }, size)
}

fn layout_multiline(
    text: &str,
    width: f32,
    height: f32,
    fixed_size: f32,
    metrics: &FontMetrics,
) -> (Vec<Vec<u8>>, f32) {
    if fixed_size > 0.0 {
        return (wrap_lines(text, width, fixed_size, metrics), fixed_size);
    }

    let mut size = MULTILINE_FONT_SIZE;
    loop {
        let lines = wrap_lines(text, width, size, metrics);
        let needed = lines.len() as f32 * metrics.line_height(size);
        if needed <= height || size <= MIN_FONT_SIZE {
            return (lines, size);
        }
        size = (size - SHRINK_STEP).max(MIN_FONT_SIZE);
    }
}

/// Break text into encoded lines no wider than `width`.
///
/// Explicit line breaks are kept; a single word wider than the line is left
/// on a line of its own.
fn wrap_lines(text: &str, width: f32, size: f32, metrics: &FontMetrics) -> Vec<Vec<u8>> {
    let space = metrics.width(b' ') * size / 1000.0;
    let mut lines = Vec::new();

    for paragraph in text.replace("\r\n", "\n").split(['\n', '\r']) {
        let mut line: Vec<u8> = Vec::new();
        let mut line_width = 0.0;
        for word in paragraph.split(' ').filter(|w| !w.is_empty()) {
            let encoded = encode_win_ansi(word);
            let word_width = metrics.text_width(&encoded, size);
            if !line.is_empty() && line_width + space + word_width > width {
                lines.push(std::mem::take(&mut line));
                line_width = 0.0;
            }
            if !line.is_empty() {
                line.push(b' ');
                line_width += space;
            }
            line.extend_from_slice(&encoded);
            line_width += word_width;
        }
        lines.push(line);
    }
    lines
}

/// Content of a checkbox "on" appearance: a ZapfDingbats check mark.
pub fn check_content(rect: &Rect, font: &[u8]) -> Content {
    let size = (rect.width().min(rect.height()) * 0.8).max(MIN_FONT_SIZE);
    // glyph "4" is the check mark, 0.846 em wide
    let glyph_width = 0.846 * size;
    let x = (rect.width() - glyph_width) / 2.0;
    let y = (rect.height() - size * 0.7) / 2.0;

    Content {
        operations: vec![
            Operation::new("q", vec![]),
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec![Object::Name(font.to_vec()), Object::Real(size)]),
            Operation::new("g", vec![Object::Integer(0)]),
            Operation::new("Td", vec![Object::Real(x), Object::Real(y)]),
            Operation::new("Tj", vec![Object::String(b"4".to_vec(), StringFormat::Literal)]),
            Operation::new("ET", vec![]),
            Operation::new("Q", vec![]),
        ],
    }
}

/// Content drawing image XObject `name` scaled to fit `rect`, centred,
/// keeping its aspect ratio.
pub fn image_content(rect: &Rect, image_width: u32, image_height: u32, name: &[u8]) -> Content {
    let (w, h) = (rect.width(), rect.height());
    let (iw, ih) = (image_width.max(1) as f32, image_height.max(1) as f32);
    let scale = (w / iw).min(h / ih);
    let (dw, dh) = (iw * scale, ih * scale);

    Content {
        operations: vec![
            Operation::new("q", vec![]),
            Operation::new(
                "cm",
                vec![
                    Object::Real(dw),
                    Object::Integer(0),
                    Object::Integer(0),
                    Object::Real(dh),
                    Object::Real((w - dw) / 2.0),
                    Object::Real((h - dh) / 2.0),
                ],
            ),
            Operation::new("Do", vec![Object::Name(name.to_vec())]),
            Operation::new("Q", vec![]),
        ],
    }
}
