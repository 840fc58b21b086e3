//! Text encodings used by form values and appearance streams.

use lopdf::{Object, StringFormat};

/// WinAnsiEncoding code points 0x80..=0x9F that differ from Latin-1.
const WIN_ANSI_HIGH: [(u8, char); 27] = [
    (0x80, '\u{20AC}'),
    (0x82, '\u{201A}'),
    (0x83, '\u{0192}'),
    (0x84, '\u{201E}'),
    (0x85, '\u{2026}'),
    (0x86, '\u{2020}'),
    (0x87, '\u{2021}'),
    (0x88, '\u{02C6}'),
    (0x89, '\u{2030}'),
    (0x8A, '\u{0160}'),
    (0x8B, '\u{2039}'),
    (0x8C, '\u{0152}'),
    (0x8E, '\u{017D}'),
    (0x91, '\u{2018}'),
    (0x92, '\u{2019}'),
    (0x93, '\u{201C}'),
    (0x94, '\u{201D}'),
    (0x95, '\u{2022}'),
    (0x96, '\u{2013}'),
    (0x97, '\u{2014}'),
    (0x98, '\u{02DC}'),
    (0x99, '\u{2122}'),
    (0x9A, '\u{0161}'),
    (0x9B, '\u{203A}'),
    (0x9C, '\u{0153}'),
    (0x9E, '\u{017E}'),
    (0x9F, '\u{0178}'),
];

/// Encode text for a simple font using WinAnsiEncoding.
///
/// Characters outside the encoding become `?`.
pub fn encode_win_ansi(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| match c as u32 {
            0x20..=0x7E | 0xA0..=0xFF => c as u8,
            0x09 => b' ',
            _ => WIN_ANSI_HIGH
                .iter()
                .find(|(_, ch)| *ch == c)
                .map(|(code, _)| *code)
                .unwrap_or(b'?'),
        })
        .collect()
}

/// Character for a WinAnsiEncoding code, if the code is assigned.
pub fn win_ansi_char(code: u8) -> Option<char> {
    match code {
        0x20..=0x7E | 0xA0..=0xFF => Some(code as char),
        _ => WIN_ANSI_HIGH
            .iter()
            .find(|(c, _)| *c == code)
            .map(|(_, ch)| *ch),
    }
}

/// Build a PDF text string for a field value.
///
/// Latin-1 text is stored as a literal (PDFDocEncoding agrees with Latin-1 in
/// that range), anything else as UTF-16BE with a byte order mark.
pub fn encode_text_string(text: &str) -> Object {
    let latin1 = text
        .chars()
        .all(|c| matches!(c as u32, 0x09 | 0x0A | 0x0D | 0x20..=0x7E | 0xA1..=0xFF));

    if latin1 {
        Object::String(text.chars().map(|c| c as u8).collect(), StringFormat::Literal)
    } else {
        let mut bytes = vec![0xFE, 0xFF];
        for unit in text.encode_utf16() {
            bytes.extend_from_slice(&unit.to_be_bytes());
        }
        Object::String(bytes, StringFormat::Hexadecimal)
    }
}

/// Decode a PDF text string.
pub fn decode_text_string(bytes: &[u8]) -> String {
    // UTF-16BE (BOM marker)
    if bytes.len() >= 2 && bytes[0] == 0xFE && bytes[1] == 0xFF {
        let utf16: Vec<u16> = bytes[2..]
            .chunks_exact(2)
            .map(|c| u16::from_be_bytes([c[0], c[1]]))
            .collect();
        return String::from_utf16_lossy(&utf16);
    }

    // UTF-8 (PDF 2.0, BOM marker)
    if let Some(rest) = bytes.strip_prefix(&[0xEF, 0xBB, 0xBF]) {
        return String::from_utf8_lossy(rest).into_owned();
    }

    // PDFDocEncoding, treated as Latin-1
    bytes.iter().map(|&b| b as char).collect()
}
