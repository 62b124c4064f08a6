// Charset module
// Decodes ID3-style encoded text runs. Every decode reports how many bytes it
// consumed, BOM and terminator included, so frame readers can step a cursor
// exactly past one field and on to the next.

use std::fmt;

/// Text encodings selectable by the leading encoding byte of a frame payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Charset {
    /// ISO-8859-1, one byte per character.
    Latin1,
    /// UTF-16 with the byte order taken from a BOM (little-endian without one).
    Utf16,
    /// UTF-16 big-endian without a BOM.
    Utf16Be,
    Utf8,
}

impl Charset {
    /// Resolves an encoding byte: 0x00 latin-1, 0x01 UTF-16, 0x02 UTF-16BE, 0x03 UTF-8.
    /// Any other byte is unresolved and yields `None`.
    pub fn from_encoding_byte(byte: u8) -> Option<Self> {
        match byte {
            0x00 => Some(Charset::Latin1),
            0x01 => Some(Charset::Utf16),
            0x02 => Some(Charset::Utf16Be),
            0x03 => Some(Charset::Utf8),
            _ => None,
        }
    }

    pub fn encoding_byte(self) -> u8 {
        match self {
            Charset::Latin1 => 0x00,
            Charset::Utf16 => 0x01,
            Charset::Utf16Be => 0x02,
            Charset::Utf8 => 0x03,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Charset::Latin1 => "iso-8859-1",
            Charset::Utf16 => "utf-16",
            Charset::Utf16Be => "utf-16be",
            Charset::Utf8 => "utf-8",
        }
    }
}

impl fmt::Display for Charset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A decoded text run and the number of source bytes it took up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedString {
    pub value: String,
    pub bytes_consumed: usize,
}

impl fmt::Display for DecodedString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.value)
    }
}

/// Decode a terminated text run from the start of `bytes`.
///
/// Decoding stops at the charset's terminator (one zero byte, or a zero code
/// unit for UTF-16) or at the end of `bytes`. A `None` charset decodes as
/// latin-1, which is what unresolved encoding bytes fall back to.
pub fn decode(bytes: &[u8], charset: Option<Charset>) -> DecodedString {
    match charset {
        Some(Charset::Utf16) => decode_utf16(bytes, false),
        Some(Charset::Utf16Be) => decode_utf16(bytes, true),
        Some(Charset::Utf8) => decode_utf8(bytes),
        Some(Charset::Latin1) | None => decode_latin1(bytes),
    }
}

/// Decode at most `max_length` bytes starting at `offset`.
/// Out-of-range offsets and lengths are clamped to `bytes`.
pub fn decode_at(bytes: &[u8], offset: usize, max_length: usize, charset: Option<Charset>) -> DecodedString {
    let start = offset.min(bytes.len());
    let end = start.saturating_add(max_length).min(bytes.len());
    decode(&bytes[start..end], charset)
}

/// Fixed-length latin-1 text with no terminator handling.
pub fn latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| char::from(b)).collect()
}

fn decode_latin1(bytes: &[u8]) -> DecodedString {
    let (text, consumed) = split_at_nul(bytes);
    DecodedString {
        value: latin1(text),
        bytes_consumed: consumed,
    }
}

fn decode_utf8(bytes: &[u8]) -> DecodedString {
    let bom = if bytes.starts_with(&[0xEF, 0xBB, 0xBF]) { 3 } else { 0 };
    let (text, consumed) = split_at_nul(&bytes[bom..]);
    DecodedString {
        value: String::from_utf8_lossy(text).into_owned(),
        bytes_consumed: bom + consumed,
    }
}

fn decode_utf16(bytes: &[u8], big_endian: bool) -> DecodedString {
    let (big_endian, bom) = match bytes {
        [0xFE, 0xFF, ..] => (true, 2),
        [0xFF, 0xFE, ..] => (false, 2),
        _ => (big_endian, 0),
    };

    let mut units = Vec::with_capacity(bytes.len() / 2);
    let mut consumed = bom;
    for pair in bytes[bom..].chunks_exact(2) {
        consumed += 2;
        let unit = if big_endian {
            u16::from_be_bytes([pair[0], pair[1]])
        } else {
            u16::from_le_bytes([pair[0], pair[1]])
        };
        if unit == 0 {
            break;
        }
        units.push(unit);
    }

    DecodedString {
        value: String::from_utf16_lossy(&units),
        bytes_consumed: consumed,
    }
}

/// Text before the first zero byte, and the count of bytes used including that zero.
fn split_at_nul(bytes: &[u8]) -> (&[u8], usize) {
    match bytes.iter().position(|&b| b == 0) {
        Some(nul) => (&bytes[..nul], nul + 1),
        None => (bytes, bytes.len()),
    }
}
