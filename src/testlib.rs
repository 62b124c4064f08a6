//! Test utilities for mediatags-rs
// Builders for synthetic ID3 tags and media files used by unit tests,
// integration tests and benches.

use std::io::Write;
use tempfile::NamedTempFile;

use crate::charset::Charset;

/// Encodes `text` followed by the charset's terminator.
/// UTF-16 gets a little-endian BOM; UTF-16BE is written without one.
pub fn encode_text(text: &str, charset: Charset) -> Vec<u8> {
    let mut out = Vec::new();
    match charset {
        Charset::Latin1 => {
            out.extend(text.chars().map(|c| u8::try_from(u32::from(c)).unwrap_or(b'?')));
            out.push(0);
        }
        Charset::Utf8 => {
            out.extend_from_slice(text.as_bytes());
            out.push(0);
        }
        Charset::Utf16 => {
            out.extend_from_slice(&[0xFF, 0xFE]);
            out.extend(text.encode_utf16().flat_map(u16::to_le_bytes));
            out.extend_from_slice(&[0, 0]);
        }
        Charset::Utf16Be => {
            out.extend(text.encode_utf16().flat_map(u16::to_be_bytes));
            out.extend_from_slice(&[0, 0]);
        }
    }
    out
}

/// Encoding byte plus encoded text, the payload of a text frame.
pub fn text_payload(text: &str, charset: Charset) -> Vec<u8> {
    let mut out = vec![charset.encoding_byte()];
    out.extend(encode_text(text, charset));
    out
}

pub fn syncsafe_bytes(value: u32) -> [u8; 4] {
    [
        ((value >> 21) & 0x7F) as u8,
        ((value >> 14) & 0x7F) as u8,
        ((value >> 7) & 0x7F) as u8,
        (value & 0x7F) as u8,
    ]
}

/// Inserts a zero after every 0xFF.
pub fn apply_unsynchronisation(bytes: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(bytes.len() + bytes.len() / 8);
    for &b in bytes {
        out.push(b);
        if b == 0xFF {
            out.push(0);
        }
    }
    out
}

/// A frame header and payload laid out for the given major version.
pub fn frame_bytes(major: u8, id: &str, flags: [u8; 2], payload: &[u8]) -> Vec<u8> {
    let size = payload.len() as u32;
    let mut out = id.as_bytes().to_vec();
    match major {
        2 => out.extend_from_slice(&size.to_be_bytes()[1..]),
        3 => {
            out.extend_from_slice(&size.to_be_bytes());
            out.extend_from_slice(&flags);
        }
        _ => {
            out.extend_from_slice(&syncsafe_bytes(size));
            out.extend_from_slice(&flags);
        }
    }
    out.extend_from_slice(payload);
    out
}

/// Builds an ID3v2 tag frame by frame.
#[derive(Debug, Clone)]
pub struct Id3v2Builder {
    major: u8,
    flags: u8,
    body: Vec<u8>,
    padding: usize,
}

impl Id3v2Builder {
    pub fn new(major: u8) -> Self {
        Self {
            major,
            flags: 0,
            body: Vec::new(),
            padding: 0,
        }
    }

    /// Raw header flags byte.
    pub fn flags(mut self, flags: u8) -> Self {
        self.flags = flags;
        self
    }

    pub fn frame(self, id: &str, payload: &[u8]) -> Self {
        self.frame_with_flags(id, [0, 0], payload)
    }

    pub fn frame_with_flags(mut self, id: &str, flags: [u8; 2], payload: &[u8]) -> Self {
        let frame = frame_bytes(self.major, id, flags, payload);
        self.body.extend(frame);
        self
    }

    /// A latin-1 text frame.
    pub fn text(self, id: &str, text: &str) -> Self {
        self.frame(id, &text_payload(text, Charset::Latin1))
    }

    /// Appends bytes to the body as-is.
    pub fn raw(mut self, bytes: &[u8]) -> Self {
        self.body.extend_from_slice(bytes);
        self
    }

    pub fn padding(mut self, padding: usize) -> Self {
        self.padding = padding;
        self
    }

    /// Everything after the header.
    pub fn body(&self) -> Vec<u8> {
        let mut body = self.body.clone();
        body.resize(self.body.len() + self.padding, 0);
        body
    }

    pub fn build(&self) -> Vec<u8> {
        let body = self.body();
        let mut tag = b"ID3".to_vec();
        tag.extend_from_slice(&[self.major, 0, self.flags]);
        tag.extend_from_slice(&syncsafe_bytes(body.len() as u32));
        tag.extend(body);
        tag
    }
}

/// Fields of a 128-byte ID3v1 trailer.
#[derive(Debug, Clone, Default)]
pub struct Id3v1Fields<'a> {
    pub title: &'a str,
    pub artist: &'a str,
    pub album: &'a str,
    pub year: &'a str,
    pub comment: &'a str,
    /// Written as ID3v1.1 when set.
    pub track: Option<u8>,
    pub genre: u8,
}

pub fn id3v1_tag(fields: &Id3v1Fields<'_>) -> Vec<u8> {
    fn field(out: &mut Vec<u8>, text: &str, width: usize) {
        let mut bytes = text.as_bytes().to_vec();
        bytes.resize(width, 0);
        out.extend_from_slice(&bytes);
    }

    let mut tag = b"TAG".to_vec();
    field(&mut tag, fields.title, 30);
    field(&mut tag, fields.artist, 30);
    field(&mut tag, fields.album, 30);
    field(&mut tag, fields.year, 4);
    match fields.track {
        Some(track) => {
            field(&mut tag, fields.comment, 28);
            tag.extend_from_slice(&[0, track]);
        }
        None => field(&mut tag, fields.comment, 30),
    }
    tag.push(fields.genre);
    tag
}

/// A fake audio file: an ID3v2.3 tag, some audio-looking bytes and an ID3v1 trailer.
pub fn sample_file(audio_len: usize) -> Vec<u8> {
    let mut file = Id3v2Builder::new(3)
        .text("TIT2", "Sample Title")
        .text("TPE1", "Sample Artist")
        .text("TALB", "Sample Album")
        .text("TRCK", "3/12")
        .frame("TCON", &text_payload("(17)Rock", Charset::Latin1))
        .frame("COMM", &[b"\x00eng".as_slice(), b"\0", b"Synthetic"].concat())
        .padding(256)
        .build();
    file.extend((0..audio_len).map(|i| (i % 251) as u8 | 0x01));
    file.extend(id3v1_tag(&Id3v1Fields {
        title: "Trailer Title",
        artist: "Trailer Artist",
        track: Some(3),
        genre: 17,
        ..Default::default()
    }));
    file
}

/// One MP4 atom with a 32-bit size.
pub fn mp4_atom(name: &[u8; 4], body: &[u8]) -> Vec<u8> {
    let mut atom = ((body.len() + 8) as u32).to_be_bytes().to_vec();
    atom.extend_from_slice(name);
    atom.extend_from_slice(body);
    atom
}

/// An `ilst` item holding a single `data` atom.
pub fn mp4_item(name: &[u8; 4], type_indicator: u32, value: &[u8]) -> Vec<u8> {
    let data = [type_indicator.to_be_bytes().as_slice(), &[0, 0, 0, 0], value].concat();
    mp4_atom(name, &mp4_atom(b"data", &data))
}

/// A minimal MP4 file: `ftyp`, `media_len` bytes of `mdat`, then a `moov`
/// whose `udta/meta/ilst` holds `items`.
pub fn mp4_file(brand: &[u8; 4], items: &[Vec<u8>], media_len: usize) -> Vec<u8> {
    let ftyp = mp4_atom(b"ftyp", &[brand.as_slice(), &[0, 0, 2, 0], b"isom", brand].concat());
    let hdlr = mp4_atom(b"hdlr", &[[0u8; 8].as_slice(), b"mdirappl", &[0; 9]].concat());
    let ilst = mp4_atom(b"ilst", &items.concat());
    let meta = mp4_atom(b"meta", &[[0u8; 4].as_slice(), hdlr.as_slice(), ilst.as_slice()].concat());
    let udta = mp4_atom(b"udta", &meta);
    let mvhd = mp4_atom(b"mvhd", &[0u8; 100]);
    let moov = mp4_atom(b"moov", &[mvhd, udta].concat());
    let mdat = mp4_atom(b"mdat", &vec![0x33; media_len]);
    [ftyp, mdat, moov].concat()
}

/// An M4A with title, artist, album, track, genre and cover items.
pub fn sample_mp4_file(media_len: usize) -> Vec<u8> {
    let items = [
        mp4_item(b"\xA9nam", 1, b"Atom Title"),
        mp4_item(b"\xA9ART", 1, b"Atom Artist"),
        mp4_item(b"\xA9alb", 1, b"Atom Album"),
        mp4_item(b"trkn", 0, &[0, 0, 0, 5, 0, 9, 0, 0]),
        mp4_item(b"gnre", 0, &[0, 18]),
        mp4_item(b"covr", 14, &[0x89, b'P', b'N', b'G']),
    ];
    mp4_file(b"M4A ", &items, media_len)
}

/// Writes `bytes` to a fresh temporary file.
pub fn create_test_file(bytes: &[u8]) -> std::io::Result<NamedTempFile> {
    let mut file = NamedTempFile::new()?;
    file.write_all(bytes)?;
    file.flush()?;
    Ok(file)
}
