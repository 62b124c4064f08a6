//! MP4 container module
//!
//! iTunes-style metadata items stored under `moov/udta/meta/ilst` in an ISO
//! base media file. The top level is walked one atom header at a time so the
//! media data is never loaded; `moov` is then loaded whole and decoded in memory.

use bytes::Bytes;
use tracing::{debug, trace};

use crate::charset::{self, Charset};
use crate::formats::{ReadOptions, TagError, TagFormat, TagFrame, TagFuture, TagMetadata};
use crate::frames::{Comment, DecodedFrame, FrameError, Lyrics, Picture, UserDefined, PICTURE_TYPES};
use crate::id3v1;
use crate::range::{ByteRange, ResolvedRange};
use crate::transport::MediaSource;

const ATOM_HEADER_LEN: usize = 8;
const LARGE_ATOM_HEADER_LEN: usize = 16;

/// Well-known `data` atom type indicators.
const TYPE_IMPLICIT: u32 = 0;
const TYPE_UTF8: u32 = 1;
const TYPE_UTF16: u32 = 2;
const TYPE_JPEG: u32 = 13;
const TYPE_PNG: u32 = 14;
const TYPE_SIGNED_INT: u32 = 21;
const TYPE_BMP: u32 = 27;

/// Size and name of an atom, parsed from its first 8 or 16 bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AtomHeader {
    pub name: [u8; 4],
    pub header_len: usize,
    /// Whole atom, header included.
    pub size: u64,
}

impl AtomHeader {
    /// Parses the header at the start of `bytes`. `available` is how many bytes
    /// the enclosing container still holds from this atom's start.
    pub fn parse(bytes: &[u8], available: u64) -> Result<Self, TagError> {
        let truncated =
            || TagError::MalformedTag(format!("atom header needs {ATOM_HEADER_LEN} bytes, {available} left"));
        let head = bytes.get(..ATOM_HEADER_LEN).ok_or_else(truncated)?;
        let mut name = [0u8; 4];
        name.copy_from_slice(&head[4..8]);

        let (header_len, size) = match u32::from_be_bytes([head[0], head[1], head[2], head[3]]) {
            // 64-bit size follows the name
            1 => {
                let large = bytes.get(ATOM_HEADER_LEN..LARGE_ATOM_HEADER_LEN).ok_or_else(truncated)?;
                let mut size = [0u8; 8];
                size.copy_from_slice(large);
                (LARGE_ATOM_HEADER_LEN, u64::from_be_bytes(size))
            }
            // runs to the end of its container
            0 => (ATOM_HEADER_LEN, available),
            size => (ATOM_HEADER_LEN, u64::from(size)),
        };

        if size < header_len as u64 || size > available {
            return Err(TagError::MalformedTag(format!(
                "atom {} of {size} bytes does not fit the {available} bytes left",
                atom_name(&name)
            )));
        }
        Ok(Self { name, header_len, size })
    }
}

/// An atom inside an in-memory container.
#[derive(Debug, Clone, Copy)]
pub struct Atom<'a> {
    pub name: [u8; 4],
    pub body: &'a [u8],
}

/// Sibling atoms of a container body, in file order.
pub struct Atoms<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> Atoms<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, offset: 0 }
    }
}

impl<'a> Iterator for Atoms<'a> {
    type Item = Result<Atom<'a>, TagError>;

    fn next(&mut self) -> Option<Self::Item> {
        let data = self.data;
        let rest = data.get(self.offset..).filter(|rest| !rest.is_empty())?;
        match AtomHeader::parse(rest, rest.len() as u64) {
            Ok(header) => {
                let size = header.size as usize;
                self.offset += size;
                Some(Ok(Atom {
                    name: header.name,
                    body: &rest[header.header_len..size],
                }))
            }
            Err(e) => {
                self.offset = data.len();
                Some(Err(e))
            }
        }
    }
}

/// Body of the first child atom called `name`.
fn child<'a>(parent: &'a [u8], name: &[u8; 4]) -> Result<Option<&'a [u8]>, TagError> {
    for atom in Atoms::new(parent) {
        let atom = atom?;
        if &atom.name == name {
            return Ok(Some(atom.body));
        }
    }
    Ok(None)
}

/// Atom names as text; the 0xA9 prefix byte becomes `©`.
pub fn atom_name(name: &[u8; 4]) -> String {
    charset::latin1(name)
}

pub fn describe(name: &[u8; 4]) -> &'static str {
    match name {
        b"\xA9nam" => "Title",
        b"\xA9ART" => "Artist",
        b"aART" => "Album artist",
        b"\xA9alb" => "Album",
        b"\xA9day" => "Release date",
        b"\xA9cmt" => "Comment",
        b"\xA9gen" | b"gnre" => "Genre",
        b"\xA9wrt" => "Composer",
        b"\xA9too" => "Encoding tool",
        b"\xA9lyr" => "Lyrics",
        b"trkn" => "Track number",
        b"disk" => "Disc number",
        b"tmpo" => "Tempo",
        b"cpil" => "Compilation",
        b"covr" => "Cover art",
        b"----" => "Freeform",
        _ => "Unknown",
    }
}

fn text_value(type_indicator: u32, value: &[u8]) -> String {
    let charset = if type_indicator == TYPE_UTF16 {
        Charset::Utf16Be
    } else {
        Charset::Utf8
    };
    charset::decode(value, Some(charset)).value
}

/// `data` atom body: 4-byte type indicator (version byte then 24-bit type),
/// 4-byte locale, then the value.
fn split_data(body: &[u8]) -> Result<(u32, &[u8]), FrameError> {
    if body.len() < 8 {
        return Err(FrameError::Truncated {
            needed: 8,
            available: body.len(),
        });
    }
    let type_indicator = u32::from_be_bytes([0, body[1], body[2], body[3]]);
    Ok((type_indicator, &body[8..]))
}

fn signed_int(value: &[u8]) -> Option<i64> {
    Some(match *value {
        [a] => i64::from(a as i8),
        [a, b] => i64::from(i16::from_be_bytes([a, b])),
        [a, b, c, d] => i64::from(i32::from_be_bytes([a, b, c, d])),
        [a, b, c, d, e, f, g, h] => i64::from_be_bytes([a, b, c, d, e, f, g, h]),
        _ => return None,
    })
}

/// Decodes the first `data` atom of an `ilst` item. Items without one yield `None`.
fn decode_item(name: &[u8; 4], item: &[u8]) -> Result<Option<DecodedFrame>, TagError> {
    let id = atom_name(name);
    let malformed = |source: FrameError| TagError::malformed_frame(&id, source);

    if name == b"----" {
        return decode_freeform(item).map(Some);
    }
    let Some(data) = child(item, b"data")? else {
        trace!(id = %id, "item has no data atom");
        return Ok(None);
    };
    let (type_indicator, value) = split_data(data).map_err(malformed)?;

    let frame = match (type_indicator, name) {
        (TYPE_UTF8 | TYPE_UTF16, b"\xA9cmt") => DecodedFrame::Comment(Comment {
            language: String::new(),
            short_description: String::new(),
            text: text_value(type_indicator, value),
        }),
        (TYPE_UTF8 | TYPE_UTF16, b"\xA9lyr") => DecodedFrame::Lyrics(Lyrics {
            language: String::new(),
            descriptor: String::new(),
            lyrics: text_value(type_indicator, value),
        }),
        (TYPE_UTF8 | TYPE_UTF16, b"\xA9gen") => DecodedFrame::Genre(text_value(type_indicator, value)),
        (TYPE_UTF8 | TYPE_UTF16, _) => DecodedFrame::PlainText(text_value(type_indicator, value)),
        (TYPE_JPEG | TYPE_PNG | TYPE_BMP, _) => DecodedFrame::Picture(Picture {
            format: match type_indicator {
                TYPE_JPEG => "image/jpeg",
                TYPE_PNG => "image/png",
                _ => "image/bmp",
            }
            .to_string(),
            picture_type: PICTURE_TYPES[3],
            description: String::new(),
            data: Bytes::copy_from_slice(value),
        }),
        (TYPE_SIGNED_INT, _) => match signed_int(value) {
            Some(number) => DecodedFrame::PlainText(number.to_string()),
            None => DecodedFrame::Opaque(Bytes::copy_from_slice(value)),
        },
        (TYPE_IMPLICIT, b"trkn" | b"disk") => {
            let [_, _, a, b, c, d, ..] = *value else {
                return Err(malformed(FrameError::Truncated {
                    needed: 6,
                    available: value.len(),
                }));
            };
            let (number, total) = (u16::from_be_bytes([a, b]), u16::from_be_bytes([c, d]));
            match total {
                0 => DecodedFrame::PlainText(number.to_string()),
                total => DecodedFrame::PlainText(format!("{number}/{total}")),
            }
        }
        (TYPE_IMPLICIT, b"gnre") => {
            let genre = match *value {
                [a, b, ..] => usize::from(u16::from_be_bytes([a, b]))
                    .checked_sub(1)
                    .and_then(|index| id3v1::GENRES.get(index)),
                _ => None,
            };
            match genre {
                Some(genre) => DecodedFrame::Genre(genre.to_string()),
                None => DecodedFrame::Opaque(Bytes::copy_from_slice(value)),
            }
        }
        _ => DecodedFrame::Opaque(Bytes::copy_from_slice(value)),
    };
    Ok(Some(frame))
}

/// `----` items: `mean` and `name` children (each after 4 version/flag bytes),
/// then the value in a `data` child.
fn decode_freeform(item: &[u8]) -> Result<DecodedFrame, TagError> {
    let malformed = |source: FrameError| TagError::malformed_frame("----", source);
    let name = child(item, b"name")?.unwrap_or_default();
    let description = charset::decode(name.get(4..).unwrap_or_default(), Some(Charset::Utf8)).value;
    let value = match child(item, b"data")? {
        Some(data) => {
            let (type_indicator, value) = split_data(data).map_err(malformed)?;
            text_value(type_indicator, value)
        }
        None => String::new(),
    };
    Ok(DecodedFrame::UserDefinedText(UserDefined { description, value }))
}

/// Decodes the body of a `moov` atom. A `moov` without `udta/meta/ilst`
/// decodes to metadata with no frames.
pub fn decode_tag(brand: &str, moov: &[u8], options: &ReadOptions) -> Result<TagMetadata, TagError> {
    let mut metadata = TagMetadata::new("MP4", brand.trim_end(), moov.len() as u64);

    let Some(udta) = child(moov, b"udta")? else {
        debug!("moov has no udta atom");
        return Ok(metadata);
    };
    let Some(meta) = child(udta, b"meta")? else {
        debug!("udta has no meta atom");
        return Ok(metadata);
    };
    // meta is a full box: version and flags come first
    let meta = meta
        .get(4..)
        .ok_or_else(|| TagError::MalformedTag("meta atom is truncated".to_string()))?;
    let Some(ilst) = child(meta, b"ilst")? else {
        debug!("meta has no ilst atom");
        return Ok(metadata);
    };

    for item in Atoms::new(ilst) {
        let item = item?;
        let id = atom_name(&item.name);
        if !options.wants(&id) {
            trace!(id = %id, "item not requested");
            continue;
        }
        if let Some(data) = decode_item(&item.name, item.body)? {
            metadata.insert(TagFrame {
                id,
                size: item.body.len() as u64,
                description: describe(&item.name),
                data,
            });
        }
    }

    debug!(brand = %metadata.version, frames = metadata.len(), "decoded MP4 metadata");
    Ok(metadata)
}

/// MP4 / M4A files, recognised by an `ftyp` atom at the start.
#[derive(Debug, Clone, Copy, Default)]
pub struct Mp4Format;

impl TagFormat for Mp4Format {
    fn name(&self) -> &'static str {
        "MP4"
    }

    fn identifier_range(&self) -> ByteRange {
        ByteRange::new(0, 16)
    }

    fn matches(&self, identifier: &[u8]) -> bool {
        identifier.get(4..8) == Some(b"ftyp".as_slice())
    }

    fn read<'a>(&'a self, source: &'a dyn MediaSource, options: &'a ReadOptions) -> TagFuture<'a> {
        Box::pin(async move {
            let len = source.len();
            let mut brand = String::new();
            let mut offset = 0u64;

            while offset < len {
                let available = len - offset;
                let peek = available.min(LARGE_ATOM_HEADER_LEN as u64);
                source.load_range(ResolvedRange::new(offset, peek)).await?;
                let head = source.bytes_at(offset, peek as usize)?;
                let header = AtomHeader::parse(&head, available)?;
                trace!(atom = %atom_name(&header.name), offset, size = header.size, "top-level atom");

                match &header.name {
                    b"ftyp" => {
                        if let Some(major) = head.get(header.header_len..header.header_len + 4) {
                            brand = charset::latin1(major);
                        }
                    }
                    b"moov" => {
                        source.load_range(ResolvedRange::new(offset, header.size)).await?;
                        let body_len = header.size as usize - header.header_len;
                        let moov = source.bytes_at(offset + header.header_len as u64, body_len)?;
                        return decode_tag(&brand, &moov, options);
                    }
                    _ => {}
                }
                offset += header.size;
            }
            Err(TagError::MalformedTag("file has no moov atom".to_string()))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formats::ErrorKind;
    use crate::testlib::{mp4_atom, mp4_file, mp4_item, sample_mp4_file};
    use crate::transport::MemorySource;

    fn moov_body(file: &[u8]) -> Vec<u8> {
        let mut offset = 0;
        while offset < file.len() {
            let header = AtomHeader::parse(&file[offset..], (file.len() - offset) as u64).unwrap();
            let end = offset + header.size as usize;
            if &header.name == b"moov" {
                return file[offset + header.header_len..end].to_vec();
            }
            offset = end;
        }
        panic!("no moov in test file");
    }

    fn decode_items(items: &[Vec<u8>], options: &ReadOptions) -> Result<TagMetadata, TagError> {
        decode_tag("M4A ", &moov_body(&mp4_file(b"M4A ", items, 16)), options)
    }

    #[test]
    fn test_atom_header_sizes() {
        let header = AtomHeader::parse(b"\x00\x00\x00\x10moov", 100).unwrap();
        assert_eq!((header.name, header.header_len, header.size), (*b"moov", 8, 16));

        let large = [[0u8, 0, 0, 1].as_slice(), b"mdat", &40u64.to_be_bytes()].concat();
        let header = AtomHeader::parse(&large, 40).unwrap();
        assert_eq!((header.header_len, header.size), (16, 40));

        // size 0 runs to the end of the container
        assert_eq!(AtomHeader::parse(b"\x00\x00\x00\x00mdat", 77).unwrap().size, 77);
    }

    #[test]
    fn test_atom_header_rejects_bad_sizes() {
        assert!(AtomHeader::parse(b"\x00\x00\x00\x04free", 100).is_err());
        assert!(AtomHeader::parse(b"\x00\x00\x01\x00free", 100).is_err());
        assert!(AtomHeader::parse(b"\x00\x00", 2).is_err());
        assert!(AtomHeader::parse(b"\x00\x00\x00\x01mdat", 100).is_err());
    }

    #[test]
    fn test_atoms_iterates_siblings() {
        let data = [mp4_atom(b"free", b"ab"), mp4_atom(b"skip", b"")].concat();
        let names: Vec<_> = Atoms::new(&data).map(|atom| atom.unwrap().name).collect();
        assert_eq!(names, [*b"free", *b"skip"]);

        let broken = [mp4_atom(b"free", b""), b"\x00\x00\x00\xFFjunk".to_vec()].concat();
        let results: Vec<_> = Atoms::new(&broken).collect();
        assert_eq!(results.len(), 2);
        assert!(results[1].is_err());
    }

    #[test]
    fn test_decode_text_number_and_picture_items() {
        let moov = moov_body(&sample_mp4_file(64));
        let metadata = decode_tag("M4A ", &moov, &ReadOptions::default()).unwrap();
        assert_eq!(metadata.format, "MP4");
        assert_eq!(metadata.version, "M4A");
        assert_eq!(metadata.title(), Some("Atom Title"));
        assert_eq!(metadata.artist(), Some("Atom Artist"));
        assert_eq!(metadata.album(), Some("Atom Album"));
        assert_eq!(metadata.track(), Some("5/9"));
        assert_eq!(metadata.genre(), Some("Rock"));
        let cover = metadata.picture().unwrap();
        assert_eq!(cover.format, "image/png");
        assert_eq!(cover.picture_type, "Cover (front)");
        assert_eq!(metadata.get("\u{A9}nam").unwrap().description, "Title");
    }

    #[test]
    fn test_comment_lyrics_and_freeform_items() {
        let freeform = mp4_atom(
            b"----",
            &[
                mp4_atom(b"mean", b"\0\0\0\0com.apple.iTunes"),
                mp4_atom(b"name", b"\0\0\0\0ISRC"),
                mp4_atom(b"data", b"\0\0\0\x01\0\0\0\0USRC17607839"),
            ]
            .concat(),
        );
        let items = [
            mp4_item(b"\xA9cmt", 1, b"liner notes"),
            mp4_item(b"\xA9lyr", 1, b"la la"),
            mp4_item(b"tmpo", 21, &[0, 120]),
            freeform,
        ];
        let metadata = decode_items(&items, &ReadOptions::default()).unwrap();
        assert_eq!(metadata.comment().unwrap().text, "liner notes");
        assert_eq!(metadata.lyrics().unwrap().lyrics, "la la");
        assert_eq!(metadata.get("tmpo").unwrap().data.as_text(), Some("120"));
        assert_eq!(
            metadata.get("----").unwrap().data,
            DecodedFrame::UserDefinedText(UserDefined {
                description: "ISRC".to_string(),
                value: "USRC17607839".to_string(),
            })
        );
    }

    #[test]
    fn test_track_number_without_total() {
        let items = [mp4_item(b"trkn", 0, &[0, 0, 0, 7, 0, 0, 0, 0])];
        assert_eq!(decode_items(&items, &ReadOptions::default()).unwrap().track(), Some("7"));
    }

    #[test]
    fn test_short_track_number_is_malformed() {
        let items = [mp4_item(b"trkn", 0, &[0, 0, 1])];
        let err = decode_items(&items, &ReadOptions::default()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedFrame);
        assert!(matches!(err, TagError::MalformedFrame { ref id, .. } if id == "trkn"));
    }

    #[test]
    fn test_overrunning_item_fails_whole_read() {
        let mut bad = mp4_item(b"\xA9nam", 1, b"Title");
        bad[3] = 0xF0;
        let items = [mp4_item(b"\xA9ART", 1, b"Fine"), bad];
        let err = decode_items(&items, &ReadOptions::default()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedFrame);
    }

    #[test]
    fn test_allow_list_uses_shortcuts_and_frame_ids() {
        let moov = moov_body(&sample_mp4_file(0));
        let metadata = decode_tag("M4A ", &moov, &ReadOptions::with_tags(["title", "TRCK"])).unwrap();
        assert_eq!(metadata.len(), 2);
        assert_eq!(metadata.title(), Some("Atom Title"));
        assert_eq!(metadata.track(), Some("5/9"));
    }

    #[test]
    fn test_moov_without_ilst_is_empty() {
        let moov = mp4_atom(b"mvhd", &[0; 20]);
        let metadata = decode_tag("isom", &moov, &ReadOptions::default()).unwrap();
        assert!(metadata.is_empty());
        assert_eq!(metadata.version, "isom");
    }

    #[tokio::test]
    async fn test_read_skips_media_data() {
        let file = sample_mp4_file(100_000);
        let source = MemorySource::new(file.clone());
        assert!(Mp4Format.matches(&file[..16]));
        let metadata = Mp4Format.read(&source, &ReadOptions::default()).await.unwrap();
        assert_eq!(metadata.title(), Some("Atom Title"));
        assert_eq!(metadata.version, "M4A");
    }

    #[tokio::test]
    async fn test_read_without_moov_fails() {
        let file = [mp4_atom(b"ftyp", b"M4A \0\0\0\0"), mp4_atom(b"mdat", &[0; 32])].concat();
        let source = MemorySource::new(file);
        let err = Mp4Format.read(&source, &ReadOptions::default()).await.unwrap_err();
        assert!(matches!(err, TagError::MalformedTag(_)));
    }

    #[test]
    fn test_identifier() {
        assert_eq!(Mp4Format.identifier_range(), ByteRange::new(0, 16));
        assert!(Mp4Format.matches(b"\x00\x00\x00\x18ftypM4A \x00\x00\x02\x00"));
        assert!(!Mp4Format.matches(b"ID3\x03\x00\x00\x00\x00\x00\x00"));
        assert!(!Mp4Format.matches(b"ftyp"));
    }
}
