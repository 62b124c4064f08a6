//! ID3v2 container module
//!
//! Decodes ID3v2.2, v2.3 and v2.4 tags found at the start of a file: the
//! 10-byte header, the optional extended header, tag and frame level
//! unsynchronisation, and the frame table. Frame payloads are handed to the
//! routines in [`crate::frames`].

use bytes::Bytes;
use flate2::read::ZlibDecoder;
use std::borrow::Cow;
use std::io::Read;
use tracing::{debug, trace, warn};

use crate::formats::{ReadOptions, TagError, TagFormat, TagFrame, TagFuture, TagMetadata};
use crate::frames::{self, DecodedFrame, FrameError, FrameFlags, MajorVersion, RawFrame};
use crate::range::{ByteRange, ResolvedRange};
use crate::transport::MediaSource;

pub const HEADER_LEN: usize = 10;

/// Tag header flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TagFlags {
    pub unsynchronisation: bool,
    pub extended_header: bool,
    pub experimental: bool,
    pub footer: bool,
}

impl TagFlags {
    pub fn from_byte(byte: u8) -> Self {
        Self {
            unsynchronisation: byte & 0x80 != 0,
            extended_header: byte & 0x40 != 0,
            experimental: byte & 0x20 != 0,
            footer: byte & 0x10 != 0,
        }
    }
}

/// The fixed 10-byte tag header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TagHeader {
    pub version: MajorVersion,
    pub revision: u8,
    pub flags: TagFlags,
    /// Size of everything after the header, footer excluded.
    pub size: u32,
}

impl TagHeader {
    pub fn parse(bytes: &[u8]) -> Result<Self, TagError> {
        let header: &[u8; HEADER_LEN] = bytes
            .get(..HEADER_LEN)
            .and_then(|b| b.try_into().ok())
            .ok_or_else(|| TagError::MalformedTag(format!("header needs {HEADER_LEN} bytes, got {}", bytes.len())))?;
        if &header[..3] != b"ID3" {
            return Err(TagError::TagFormat("missing ID3 identifier".to_string()));
        }
        let (major, revision) = (header[3], header[4]);
        let version = MajorVersion::from_u8(major)
            .ok_or_else(|| TagError::UnsupportedVersion(format!("ID3 v2.{major}.{revision} is not supported")))?;
        Ok(Self {
            version,
            revision,
            flags: TagFlags::from_byte(header[5]),
            size: syncsafe(&header[6..10]),
        })
    }

    pub fn version_string(&self) -> String {
        format!("2.{}.{}", self.version.as_u8(), self.revision)
    }

    /// Bytes a full read needs from the start of the file.
    pub fn tag_len(&self) -> u64 {
        HEADER_LEN as u64 + u64::from(self.size)
    }

    fn frame_header_len(&self) -> usize {
        match self.version {
            MajorVersion::V2 => 6,
            MajorVersion::V3 | MajorVersion::V4 => 10,
        }
    }
}

/// Big-endian integer of 7-bit groups; the top bit of each byte is ignored.
pub fn syncsafe(bytes: &[u8]) -> u32 {
    bytes.iter().fold(0u32, |acc, &b| (acc << 7) | u32::from(b & 0x7F))
}

fn big_endian(bytes: &[u8]) -> u32 {
    bytes.iter().fold(0u32, |acc, &b| (acc << 8) | u32::from(b))
}

/// Drops every zero byte that directly follows a 0xFF.
pub fn remove_unsynchronisation(bytes: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(bytes.len());
    let mut after_ff = false;
    for &b in bytes {
        if !(after_ff && b == 0x00) {
            out.push(b);
        }
        after_ff = b == 0xFF;
    }
    out
}

fn is_frame_id(id: &[u8]) -> bool {
    id.iter().all(|b| b.is_ascii_uppercase() || b.is_ascii_digit())
}

/// Decodes a tag body (the bytes after the header).
pub fn decode_tag(header: &TagHeader, body: &[u8], options: &ReadOptions) -> Result<TagMetadata, TagError> {
    let version = header.version;
    let body: Cow<'_, [u8]> = if header.flags.unsynchronisation && version != MajorVersion::V4 {
        Cow::Owned(remove_unsynchronisation(body))
    } else {
        Cow::Borrowed(body)
    };

    let mut metadata = TagMetadata::new("ID3", header.version_string(), u64::from(header.size));
    metadata.flags = Some(header.flags);

    let mut offset = extended_header_len(header, &body)?;
    let header_len = header.frame_header_len();

    while offset + header_len <= body.len() {
        let frame_header = &body[offset..offset + header_len];
        let id_len = if version == MajorVersion::V2 { 3 } else { 4 };
        let id_bytes = &frame_header[..id_len];
        if id_bytes[0] == 0 || !is_frame_id(id_bytes) {
            trace!(offset, "frame table ends");
            break;
        }
        let Ok(id) = std::str::from_utf8(id_bytes) else {
            break;
        };

        let (size, flags) = match version {
            MajorVersion::V2 => (big_endian(&frame_header[3..6]), FrameFlags::default()),
            MajorVersion::V3 => (
                big_endian(&frame_header[4..8]),
                FrameFlags::parse([frame_header[8], frame_header[9]], version),
            ),
            MajorVersion::V4 => (
                syncsafe(&frame_header[4..8]),
                FrameFlags::parse([frame_header[8], frame_header[9]], version),
            ),
        };

        let start = offset + header_len;
        let available = body.len() - start;
        let size = size as usize;
        if size > available {
            return Err(TagError::malformed_frame(
                id,
                FrameError::Truncated {
                    needed: size,
                    available,
                },
            ));
        }
        let raw = &body[start..start + size];
        offset = start + size;

        if !options.wants(id) {
            trace!(id, "frame not requested");
            continue;
        }

        let data = decode_frame(id, raw, flags, version).map_err(|source| TagError::malformed_frame(id, source))?;
        metadata.insert(TagFrame {
            id: id.to_string(),
            size: size as u64,
            description: frames::describe(id),
            data,
        });
    }

    debug!(version = %metadata.version, frames = metadata.len(), "decoded ID3v2 tag");
    Ok(metadata)
}

fn extended_header_len(header: &TagHeader, body: &[u8]) -> Result<usize, TagError> {
    // v2.2 reuses this bit for whole-tag compression, which no writer produced
    if !header.flags.extended_header || header.version == MajorVersion::V2 {
        return Ok(0);
    }
    let size_bytes = body
        .get(..4)
        .ok_or_else(|| TagError::MalformedTag("extended header is truncated".to_string()))?;
    // v2.4 counts the whole extended header; v2.3 counts what follows the size
    let len = match header.version {
        MajorVersion::V4 => syncsafe(size_bytes) as usize,
        _ => 4 + big_endian(size_bytes) as usize,
    };
    let plausible = match header.version {
        MajorVersion::V4 => len >= 6,
        _ => len == 10 || len == 14,
    };
    if !plausible {
        return Err(TagError::MalformedTag(format!(
            "extended header size {len} is not valid for ID3 v2.{}",
            header.version.as_u8()
        )));
    }
    if len > body.len() {
        return Err(TagError::MalformedTag(format!(
            "extended header of {len} bytes exceeds the {} byte tag",
            body.len()
        )));
    }
    Ok(len)
}

fn decode_frame(id: &str, raw: &[u8], flags: FrameFlags, version: MajorVersion) -> Result<DecodedFrame, FrameError> {
    if flags.encryption {
        debug!(id, "encrypted frame stored opaque");
        return Ok(DecodedFrame::Opaque(Bytes::copy_from_slice(raw)));
    }
    let payload = frame_payload(raw, &flags, version)?;
    match frames::lookup(id) {
        Some(reader) => reader(&RawFrame {
            id,
            payload: &payload,
            flags,
            version,
        }),
        None => {
            trace!(id, "no decoder, frame stored opaque");
            Ok(DecodedFrame::Opaque(Bytes::copy_from_slice(&payload)))
        }
    }
}

/// Strips the per-frame extras the flags announce and undoes frame-level
/// unsynchronisation and compression.
fn frame_payload<'a>(raw: &'a [u8], flags: &FrameFlags, version: MajorVersion) -> Result<Cow<'a, [u8]>, FrameError> {
    let skip = match version {
        MajorVersion::V2 => 0,
        MajorVersion::V3 => usize::from(flags.compression) * 4 + usize::from(flags.grouping),
        MajorVersion::V4 => usize::from(flags.grouping) + usize::from(flags.data_length_indicator) * 4,
    };
    let data = raw.get(skip..).ok_or(FrameError::Truncated {
        needed: skip,
        available: raw.len(),
    })?;

    let data: Cow<'a, [u8]> = if flags.unsynchronisation {
        Cow::Owned(remove_unsynchronisation(data))
    } else {
        Cow::Borrowed(data)
    };

    if flags.compression {
        let declared = declared_size(raw, flags, version).ok_or(FrameError::MissingDataLength)?;
        // one byte past the declared size is enough to detect an overlong stream
        let mut decoder = ZlibDecoder::new(&data[..]).take(declared as u64 + 1);
        let mut decompressed = Vec::new();
        decoder.read_to_end(&mut decompressed).map_err(|_| FrameError::Zlib)?;
        if decompressed.len() != declared {
            return Err(FrameError::SizeMismatch {
                declared,
                actual: decompressed.len(),
            });
        }
        return Ok(Cow::Owned(decompressed));
    }
    Ok(data)
}

/// Decompressed size announced ahead of the frame data: a big-endian prefix
/// in v2.3, the syncsafe data length indicator after the group id in v2.4.
fn declared_size(raw: &[u8], flags: &FrameFlags, version: MajorVersion) -> Option<usize> {
    let bytes = match version {
        MajorVersion::V2 => return None,
        MajorVersion::V3 => raw.get(..4)?,
        MajorVersion::V4 if flags.data_length_indicator => {
            let at = usize::from(flags.grouping);
            raw.get(at..at + 4)?
        }
        MajorVersion::V4 => return None,
    };
    let size = match version {
        MajorVersion::V4 => syncsafe(bytes),
        _ => big_endian(bytes),
    };
    Some(size as usize)
}

/// ID3v2 at the start of the file.
#[derive(Debug, Clone, Copy, Default)]
pub struct Id3v2Format;

impl TagFormat for Id3v2Format {
    fn name(&self) -> &'static str {
        "ID3v2"
    }

    fn identifier_range(&self) -> ByteRange {
        ByteRange::new(0, HEADER_LEN as u64)
    }

    fn matches(&self, identifier: &[u8]) -> bool {
        identifier.starts_with(b"ID3")
    }

    fn read<'a>(&'a self, source: &'a dyn MediaSource, options: &'a ReadOptions) -> TagFuture<'a> {
        Box::pin(async move {
            source.load_range(ResolvedRange::new(0, HEADER_LEN as u64)).await?;
            let header = TagHeader::parse(&source.bytes_at(0, HEADER_LEN)?)?;

            let mut tag_len = header.tag_len();
            if tag_len > source.len() {
                warn!(declared = tag_len, file_len = source.len(), "ID3v2 tag runs past end of file, clamping");
                tag_len = source.len();
            }
            source.load_range(ResolvedRange::new(0, tag_len)).await?;
            let body = source.bytes_at(HEADER_LEN as u64, (tag_len - HEADER_LEN as u64) as usize)?;

            decode_tag(&header, &body, options)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::charset::Charset;
    use crate::formats::ErrorKind;
    use crate::testlib::{apply_unsynchronisation, encode_text, text_payload, Id3v2Builder};
    use crate::transport::MemorySource;
    use flate2::write::ZlibEncoder;
    use flate2::Compression;
    use std::io::Write;

    fn decode(bytes: &[u8], options: &ReadOptions) -> Result<TagMetadata, TagError> {
        let header = TagHeader::parse(bytes)?;
        decode_tag(&header, &bytes[HEADER_LEN..], options)
    }

    fn decode_all(bytes: &[u8]) -> TagMetadata {
        decode(bytes, &ReadOptions::default()).unwrap()
    }

    #[test]
    fn test_syncsafe() {
        assert_eq!(syncsafe(&[0x00, 0x00, 0x02, 0x01]), 257);
        assert_eq!(syncsafe(&[0x7F, 0x7F, 0x7F, 0x7F]), 0x0FFF_FFFF);
        // high bits are ignored
        assert_eq!(syncsafe(&[0x80, 0x80, 0x80, 0x81]), 1);
    }

    #[test]
    fn test_remove_unsynchronisation() {
        assert_eq!(remove_unsynchronisation(&[0xFF, 0x00, 0xE0]), vec![0xFF, 0xE0]);
        assert_eq!(remove_unsynchronisation(&[0xFF, 0x00, 0x00]), vec![0xFF, 0x00]);
        assert_eq!(remove_unsynchronisation(&[0x00, 0xFF]), vec![0x00, 0xFF]);
        let data = [0x01, 0xFF, 0xFF, 0x00, 0x02];
        assert_eq!(remove_unsynchronisation(&apply_unsynchronisation(&data)), data.to_vec());
    }

    #[test]
    fn test_header_parse() {
        let tag = Id3v2Builder::new(4).flags(0x50).padding(300).build();
        let header = TagHeader::parse(&tag).unwrap();
        assert_eq!(header.version, MajorVersion::V4);
        assert_eq!(header.size, 300);
        assert!(header.flags.extended_header && header.flags.footer);
        assert!(!header.flags.unsynchronisation);
        assert_eq!(header.version_string(), "2.4.0");
    }

    #[test]
    fn test_unsupported_version() {
        let mut tag = Id3v2Builder::new(3).build();
        tag[3] = 5;
        let err = TagHeader::parse(&tag).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedVersion);
        assert_eq!(err.to_string(), "ID3 v2.5.0 is not supported");
    }

    #[test]
    fn test_v23_frames_and_padding() {
        let picture = [b"\x00image/png\0".as_slice(), &[3], b"cover\0", &[1, 2, 3, 4]].concat();
        let tag = Id3v2Builder::new(3)
            .text("TIT2", "Song")
            .text("TPE1", "Artist")
            .frame("COMM", &[b"\x00eng".as_slice(), b"desc\0", b"hello"].concat())
            .frame("APIC", &picture)
            .frame("XYYZ", b"opaque")
            .padding(64)
            .build();

        let metadata = decode_all(&tag);
        assert_eq!(metadata.version, "2.3.0");
        assert_eq!(metadata.title(), Some("Song"));
        assert_eq!(metadata.artist(), Some("Artist"));
        assert_eq!(metadata.comment().unwrap().text, "hello");
        let cover = metadata.picture().unwrap();
        assert_eq!(cover.picture_type, "Cover (front)");
        assert_eq!(&cover.data[..], &[1, 2, 3, 4]);
        assert_eq!(metadata.get("XYYZ").unwrap().data, DecodedFrame::Opaque(Bytes::from_static(b"opaque")));
        assert_eq!(metadata.get("TIT2").unwrap().description, "Title/songname/content description");
        assert_eq!(metadata.len(), 5);
    }

    #[test]
    fn test_v22_frames() {
        let picture = [b"\x00PNG".as_slice(), &[0], b"\0", &[7, 7]].concat();
        let tag = Id3v2Builder::new(2)
            .text("TT2", "Old")
            .frame("TCO", b"\x00(17)Rock")
            .frame("PIC", &picture)
            .frame("CNT", &[0, 0, 0, 9])
            .build();

        let metadata = decode_all(&tag);
        assert_eq!(metadata.version, "2.2.0");
        assert_eq!(metadata.title(), Some("Old"));
        assert_eq!(metadata.genre(), Some("Rock"));
        assert_eq!(metadata.picture().unwrap().format, "PNG");
        assert_eq!(metadata.get("CNT").unwrap().data, DecodedFrame::PlayCount(9));
    }

    #[test]
    fn test_v24_syncsafe_frame_size_and_frame_flags() {
        let long_title = "x".repeat(200);
        let lyrics = [b"\x00eng".as_slice(), b"\0", &[0xFF, 0xFE, b'!']].concat();
        let mut with_length = crate::testlib::syncsafe_bytes(lyrics.len() as u32).to_vec();
        with_length.extend_from_slice(&apply_unsynchronisation(&lyrics));

        let tag = Id3v2Builder::new(4)
            .frame("TIT2", &text_payload(&long_title, Charset::Utf8))
            .frame_with_flags("USLT", [0x00, 0x03], &with_length)
            .build();

        let metadata = decode_all(&tag);
        assert_eq!(metadata.title(), Some(long_title.as_str()));
        assert_eq!(metadata.lyrics().unwrap().lyrics, "\u{FF}\u{FE}!");
    }

    #[test]
    fn test_v23_compressed_frame() {
        let payload = text_payload("squeezed", Charset::Latin1);
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&payload).unwrap();
        let mut framed = (payload.len() as u32).to_be_bytes().to_vec();
        framed.extend_from_slice(&encoder.finish().unwrap());

        let tag = Id3v2Builder::new(3).frame_with_flags("TALB", [0x00, 0x80], &framed).build();
        assert_eq!(decode_all(&tag).album(), Some("squeezed"));
    }

    #[test]
    fn test_corrupt_compressed_frame_is_malformed() {
        let tag = Id3v2Builder::new(3)
            .frame_with_flags("TALB", [0x00, 0x80], &[0, 0, 0, 4, 1, 2, 3])
            .build();
        let err = decode(&tag, &ReadOptions::default()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedFrame);
    }

    fn compressed(payload: &[u8]) -> Vec<u8> {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(payload).unwrap();
        encoder.finish().unwrap()
    }

    #[test]
    fn test_compressed_frame_size_must_match_declared() {
        // 64 KiB of text squeezed behind a 4 byte declaration
        let payload = [b"\x00".as_slice(), &[b'A'; 64 * 1024]].concat();
        let mut framed = 4u32.to_be_bytes().to_vec();
        framed.extend_from_slice(&compressed(&payload));
        let tag = Id3v2Builder::new(3).frame_with_flags("TIT2", [0x00, 0x80], &framed).build();
        let err = decode(&tag, &ReadOptions::default()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedFrame);
        assert!(matches!(
            err,
            TagError::MalformedFrame {
                source: FrameError::SizeMismatch { declared: 4, actual: 5 },
                ..
            }
        ));

        // declared larger than the stream
        let payload = text_payload("short", Charset::Latin1);
        let mut framed = 100u32.to_be_bytes().to_vec();
        framed.extend_from_slice(&compressed(&payload));
        let tag = Id3v2Builder::new(3).frame_with_flags("TIT2", [0x00, 0x80], &framed).build();
        let err = decode(&tag, &ReadOptions::default()).unwrap_err();
        assert!(matches!(
            err,
            TagError::MalformedFrame {
                source: FrameError::SizeMismatch { declared: 100, .. },
                ..
            }
        ));
    }

    #[test]
    fn test_v24_compressed_frame_uses_data_length_indicator() {
        let payload = text_payload("four", Charset::Utf8);
        let mut framed = crate::testlib::syncsafe_bytes(payload.len() as u32).to_vec();
        framed.extend_from_slice(&compressed(&payload));
        let tag = Id3v2Builder::new(4).frame_with_flags("TIT2", [0x00, 0x09], &framed).build();
        assert_eq!(decode_all(&tag).title(), Some("four"));

        // compression without a data length indicator
        let tag = Id3v2Builder::new(4)
            .frame_with_flags("TIT2", [0x00, 0x08], &compressed(&payload))
            .build();
        let err = decode(&tag, &ReadOptions::default()).unwrap_err();
        assert!(matches!(
            err,
            TagError::MalformedFrame {
                source: FrameError::MissingDataLength,
                ..
            }
        ));
    }

    #[test]
    fn test_encrypted_and_grouped_frames() {
        let tag = Id3v2Builder::new(3)
            .frame_with_flags("TIT2", [0x00, 0x40], b"\x80secret")
            .frame_with_flags(
                "TPE1",
                [0x00, 0x20],
                &[&[7u8][..], text_payload("Grouped", Charset::Latin1).as_slice()].concat(),
            )
            .build();
        let metadata = decode_all(&tag);
        assert_eq!(metadata.get("TIT2").unwrap().data, DecodedFrame::Opaque(Bytes::from_static(b"\x80secret")));
        assert_eq!(metadata.title(), None);
        assert_eq!(metadata.artist(), Some("Grouped"));
    }

    #[test]
    fn test_tag_level_unsynchronisation() {
        let mut payload = vec![0x01];
        payload.extend_from_slice(&encode_text("ÿes", Charset::Utf16));
        let frames = Id3v2Builder::new(3).frame("TIT2", &payload).body();
        let tag = Id3v2Builder::new(3).flags(0x80).raw(&apply_unsynchronisation(&frames)).build();

        let metadata = decode_all(&tag);
        assert!(metadata.flags.unwrap().unsynchronisation);
        assert_eq!(metadata.title(), Some("ÿes"));
    }

    #[test]
    fn test_extended_headers_are_skipped() {
        let frames = Id3v2Builder::new(3).text("TIT2", "Three").body();
        let mut body = vec![0, 0, 0, 6, 0, 0, 0, 0, 0, 0];
        body.extend_from_slice(&frames);
        let v3 = Id3v2Builder::new(3).flags(0x40).raw(&body).build();
        assert_eq!(decode_all(&v3).title(), Some("Three"));

        let frames = Id3v2Builder::new(4).text("TIT2", "Four").body();
        let mut body = vec![0, 0, 0, 6, 1, 0];
        body.extend_from_slice(&frames);
        let v4 = Id3v2Builder::new(4).flags(0x40).raw(&body).build();
        assert_eq!(decode_all(&v4).title(), Some("Four"));
    }

    #[test]
    fn test_implausible_extended_header_is_malformed() {
        // v2.4 size 0 would put the frame table inside the extended header
        let frames = Id3v2Builder::new(4).text("TIT2", "Hidden").body();
        let mut body = vec![0, 0, 0, 0, 1, 0];
        body.extend_from_slice(&frames);
        let v4 = Id3v2Builder::new(4).flags(0x40).raw(&body).build();
        let err = decode(&v4, &ReadOptions::default()).unwrap_err();
        assert!(matches!(err, TagError::MalformedTag(_)));
        assert_eq!(err.kind(), ErrorKind::MalformedFrame);

        // v2.3 only knows 6 and 10 byte extended headers
        let frames = Id3v2Builder::new(3).text("TIT2", "Hidden").body();
        let mut body = vec![0, 0, 0, 2, 0, 0];
        body.extend_from_slice(&frames);
        let v3 = Id3v2Builder::new(3).flags(0x40).raw(&body).build();
        assert!(matches!(decode(&v3, &ReadOptions::default()), Err(TagError::MalformedTag(_))));

        let frames = Id3v2Builder::new(3).text("TIT2", "Ten").body();
        let mut body = vec![0, 0, 0, 10, 0x80, 0, 0, 0, 0, 0, 0, 0, 0, 0];
        body.extend_from_slice(&frames);
        let v3 = Id3v2Builder::new(3).flags(0x40).raw(&body).build();
        assert_eq!(decode_all(&v3).title(), Some("Ten"));
    }

    #[test]
    fn test_frame_overrunning_tag_is_malformed() {
        let mut tag = Id3v2Builder::new(3).text("TIT2", "Song").build();
        // declared frame size 0x40 bytes, tag holds 6
        tag[HEADER_LEN + 7] = 0x40;
        let err = decode(&tag, &ReadOptions::default()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedFrame);
        assert!(matches!(err, TagError::MalformedFrame { ref id, .. } if id == "TIT2"));
    }

    #[test]
    fn test_bad_picture_fails_whole_read() {
        let tag = Id3v2Builder::new(3)
            .text("TIT2", "Fine")
            .frame("APIC", &[b"\x00image/png\0".as_slice(), &[99]].concat())
            .build();
        let err = decode(&tag, &ReadOptions::default()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedFrame);
    }

    #[test]
    fn test_allow_list_skips_undecodable_frames() {
        let tag = Id3v2Builder::new(3)
            .text("TIT2", "Kept")
            .frame("APIC", &[b"\x00image/png\0".as_slice(), &[99]].concat())
            .build();
        let metadata = decode(&tag, &ReadOptions::with_tags(["title"])).unwrap();
        assert_eq!(metadata.title(), Some("Kept"));
        assert_eq!(metadata.len(), 1);
    }

    #[tokio::test]
    async fn test_read_clamps_tag_to_file() {
        let mut tag = Id3v2Builder::new(3).text("TIT2", "Short file").build();
        // claim a 4096 byte tag
        tag[6..10].copy_from_slice(&crate::testlib::syncsafe_bytes(4096));
        let source = MemorySource::new(tag);

        let metadata = Id3v2Format.read(&source, &ReadOptions::default()).await.unwrap();
        assert_eq!(metadata.title(), Some("Short file"));
        assert_eq!(metadata.size, 4096);
    }

    #[test]
    fn test_identifier() {
        assert_eq!(Id3v2Format.identifier_range(), ByteRange::new(0, 10));
        assert!(Id3v2Format.matches(b"ID3\x03\x00\x00\x00\x00\x00\x00"));
        assert!(!Id3v2Format.matches(b"TAG"));
    }
}
