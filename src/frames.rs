//! Frame decoding module
//!
//! An ID3v2 tag is a sequence of frames, each a typed, length-prefixed record.
//! This module classifies frame identifiers into the decode routine that
//! understands them and implements those routines.
//!
//! Classification runs in three tiers: an exact identifier table first, then
//! the text family (any id starting with `T`) and the link family (any id
//! starting with `W`). Identifiers outside all three have no decoder; the
//! container stores such frames opaquely rather than failing.

use bytes::Bytes;
use std::fmt;
use thiserror::Error;

use crate::charset::{self, Charset};

/// Errors raised while decoding a single frame payload
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("payload needs {needed} bytes but only {available} are present")]
    Truncated { needed: usize, available: usize },
    #[error("unknown picture type {0}")]
    UnknownPictureType(u8),
    #[error("play counter of {0} bytes is not supported")]
    CounterTooWide(usize),
    #[error("zlib decompression failed")]
    Zlib,
    #[error("compressed frame carries no decompressed size")]
    MissingDataLength,
    #[error("frame declares {declared} decompressed bytes but inflates to {actual}")]
    SizeMismatch { declared: usize, actual: usize },
}

/// ID3v2 major version of the container a frame came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum MajorVersion {
    V2 = 2,
    #[default]
    V3 = 3,
    V4 = 4,
}

impl MajorVersion {
    pub fn from_u8(major: u8) -> Option<Self> {
        match major {
            2 => Some(MajorVersion::V2),
            3 => Some(MajorVersion::V3),
            4 => Some(MajorVersion::V4),
            _ => None,
        }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

/// Frame header flags, normalised across the v2.3 and v2.4 bit layouts.
/// v2.2 frames carry no flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameFlags {
    pub tag_alter_preservation: bool,
    pub file_alter_preservation: bool,
    pub read_only: bool,
    pub grouping: bool,
    pub compression: bool,
    pub encryption: bool,
    pub unsynchronisation: bool,
    pub data_length_indicator: bool,
}

impl FrameFlags {
    pub fn parse(raw: [u8; 2], version: MajorVersion) -> Self {
        let [status, format] = raw;
        match version {
            MajorVersion::V2 => FrameFlags::default(),
            MajorVersion::V3 => FrameFlags {
                tag_alter_preservation: status & 0x80 != 0,
                file_alter_preservation: status & 0x40 != 0,
                read_only: status & 0x20 != 0,
                compression: format & 0x80 != 0,
                encryption: format & 0x40 != 0,
                grouping: format & 0x20 != 0,
                unsynchronisation: false,
                data_length_indicator: false,
            },
            MajorVersion::V4 => FrameFlags {
                tag_alter_preservation: status & 0x40 != 0,
                file_alter_preservation: status & 0x20 != 0,
                read_only: status & 0x10 != 0,
                grouping: format & 0x40 != 0,
                compression: format & 0x08 != 0,
                encryption: format & 0x04 != 0,
                unsynchronisation: format & 0x02 != 0,
                data_length_indicator: format & 0x01 != 0,
            },
        }
    }
}

/// One frame as handed to a decode routine: its id, flags, container version
/// and a view onto its payload bytes.
#[derive(Debug, Clone, Copy)]
pub struct RawFrame<'a> {
    pub id: &'a str,
    pub payload: &'a [u8],
    pub flags: FrameFlags,
    pub version: MajorVersion,
}

impl<'a> RawFrame<'a> {
    /// A frame from a v2.3 container with no flags set.
    pub fn new(id: &'a str, payload: &'a [u8]) -> Self {
        Self {
            id,
            payload,
            flags: FrameFlags::default(),
            version: MajorVersion::default(),
        }
    }

    pub fn with_version(mut self, version: MajorVersion) -> Self {
        self.version = version;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserDefined {
    pub description: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Picture {
    /// MIME type, or the three-letter image format of v2.2 frames.
    pub format: String,
    pub picture_type: &'static str,
    pub description: String,
    pub data: Bytes,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Comment {
    pub language: String,
    pub short_description: String,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lyrics {
    pub language: String,
    pub descriptor: String,
    pub lyrics: String,
}

/// The decoded content of one frame. Everything is owned; nothing points
/// back into the byte source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodedFrame {
    PlainText(String),
    LinkUrl(String),
    UserDefinedText(UserDefined),
    UserDefinedUrl(UserDefined),
    Picture(Picture),
    Comment(Comment),
    Lyrics(Lyrics),
    PlayCount(u64),
    Genre(String),
    /// Frames with no decoder, and encrypted frames.
    Opaque(Bytes),
}

impl DecodedFrame {
    /// The text of text-like frames.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            DecodedFrame::PlainText(text) | DecodedFrame::LinkUrl(text) | DecodedFrame::Genre(text) => {
                Some(text.as_str())
            }
            _ => None,
        }
    }
}

impl fmt::Display for DecodedFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodedFrame::PlainText(text) | DecodedFrame::LinkUrl(text) | DecodedFrame::Genre(text) => {
                f.write_str(text)
            }
            DecodedFrame::UserDefinedText(field) | DecodedFrame::UserDefinedUrl(field) => {
                write!(f, "{}: {}", field.description, field.value)
            }
            DecodedFrame::Picture(picture) => write!(
                f,
                "{}, {}, {:?}, {} bytes",
                picture.format,
                picture.picture_type,
                picture.description,
                picture.data.len()
            ),
            DecodedFrame::Comment(comment) => write!(
                f,
                "[{}] {:?}: {}",
                comment.language, comment.short_description, comment.text
            ),
            DecodedFrame::Lyrics(lyrics) => {
                write!(f, "[{}] {:?}: {}", lyrics.language, lyrics.descriptor, lyrics.lyrics)
            }
            DecodedFrame::PlayCount(count) => write!(f, "{count} plays"),
            DecodedFrame::Opaque(data) => write!(f, "<{} bytes>", data.len()),
        }
    }
}

/// A decode routine.
pub type FrameReader = fn(&RawFrame<'_>) -> Result<DecodedFrame, FrameError>;

/// Frame shapes with a dedicated decode routine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    Picture,
    /// `PIC`: always the v2.2 picture layout.
    LegacyPicture,
    Comment,
    Lyrics,
    PlayCounter,
    UserDefinedText,
    Genre,
}

impl FrameKind {
    pub fn reader(self) -> FrameReader {
        match self {
            FrameKind::Picture => read_picture_frame,
            FrameKind::LegacyPicture => read_legacy_picture_frame,
            FrameKind::Comment => read_comment_frame,
            FrameKind::Lyrics => read_lyrics_frame,
            FrameKind::PlayCounter => read_play_counter_frame,
            FrameKind::UserDefinedText => read_user_defined_text_frame,
            FrameKind::Genre => read_genre_frame,
        }
    }
}

const EXACT_FRAMES: &[(&str, FrameKind)] = &[
    ("APIC", FrameKind::Picture),
    ("PIC", FrameKind::LegacyPicture),
    ("COMM", FrameKind::Comment),
    ("COM", FrameKind::Comment),
    ("USLT", FrameKind::Lyrics),
    ("ULT", FrameKind::Lyrics),
    ("PCNT", FrameKind::PlayCounter),
    ("CNT", FrameKind::PlayCounter),
    ("TXXX", FrameKind::UserDefinedText),
    ("TXX", FrameKind::UserDefinedText),
    ("TCON", FrameKind::Genre),
    ("TCO", FrameKind::Genre),
];

/// How a frame identifier is decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameCategory {
    Exact(FrameKind),
    TextFamily,
    LinkFamily,
    Unknown,
}

impl FrameCategory {
    pub fn reader(self) -> Option<FrameReader> {
        match self {
            FrameCategory::Exact(kind) => Some(kind.reader()),
            FrameCategory::TextFamily => Some(read_text_frame),
            FrameCategory::LinkFamily => Some(read_url_frame),
            FrameCategory::Unknown => None,
        }
    }
}

/// Resolve a frame id: exact table entry, then text family, then link family.
pub fn classify(id: &str) -> FrameCategory {
    if let Some(&(_, kind)) = EXACT_FRAMES.iter().find(|(known, _)| *known == id) {
        return FrameCategory::Exact(kind);
    }
    match id.as_bytes().first() {
        Some(b'T') => FrameCategory::TextFamily,
        Some(b'W') => FrameCategory::LinkFamily,
        _ => FrameCategory::Unknown,
    }
}

/// The decode routine for `id`, if any.
pub fn lookup(id: &str) -> Option<FrameReader> {
    classify(id).reader()
}

pub const PICTURE_TYPES: [&str; 21] = [
    "Other",
    "32x32 pixels 'file icon' (PNG only)",
    "Other file icon",
    "Cover (front)",
    "Cover (back)",
    "Leaflet page",
    "Media (e.g. label side of CD)",
    "Lead artist/lead performer/soloist",
    "Artist/performer",
    "Conductor",
    "Band/Orchestra",
    "Composer",
    "Lyricist/text writer",
    "Recording Location",
    "During recording",
    "During performance",
    "Movie/video screen capture",
    "A bright coloured fish",
    "Illustration",
    "Band/artist logotype",
    "Publisher/Studio logotype",
];

fn truncated(needed: usize, available: usize) -> FrameError {
    FrameError::Truncated { needed, available }
}

/// Splits off the leading encoding byte.
fn split_encoding(payload: &[u8]) -> Result<(Option<Charset>, &[u8]), FrameError> {
    match payload.split_first() {
        Some((&byte, rest)) => Ok((Charset::from_encoding_byte(byte), rest)),
        None => Err(truncated(1, 0)),
    }
}

fn skip(bytes: &[u8], count: usize) -> &[u8] {
    bytes.get(count..).unwrap_or_default()
}

/// Any `T???` frame: one string spanning the payload.
pub fn read_text_frame(frame: &RawFrame<'_>) -> Result<DecodedFrame, FrameError> {
    let (charset, rest) = split_encoding(frame.payload)?;
    Ok(DecodedFrame::PlainText(charset::decode(rest, charset).value))
}

/// `TCON`/`TCO`: text with a leading `(NN)` genre code removed.
pub fn read_genre_frame(frame: &RawFrame<'_>) -> Result<DecodedFrame, FrameError> {
    let (charset, rest) = split_encoding(frame.payload)?;
    let text = charset::decode(rest, charset).value;
    Ok(DecodedFrame::Genre(normalize_genre(&text).to_string()))
}

/// Strips one leading parenthesised decimal code, e.g. `(17)Rock` becomes `Rock`.
pub fn normalize_genre(text: &str) -> &str {
    let Some(rest) = text.strip_prefix('(') else {
        return text;
    };
    match rest.split_once(')') {
        Some((code, name)) if !code.is_empty() && code.bytes().all(|b| b.is_ascii_digit()) => name,
        _ => text,
    }
}

/// Any `W???` frame.
///
/// Standard link frames carry no encoding byte and are latin-1 throughout. A
/// first byte that resolves to an encoding marks a user-defined link with a
/// description.
pub fn read_url_frame(frame: &RawFrame<'_>) -> Result<DecodedFrame, FrameError> {
    let (charset, rest) = split_encoding(frame.payload)?;
    match charset {
        Some(charset) => Ok(DecodedFrame::UserDefinedUrl(user_defined_fields(rest, charset))),
        None => Ok(DecodedFrame::LinkUrl(charset::decode(frame.payload, None).value)),
    }
}

/// `TXXX`/`TXX`: description and value.
pub fn read_user_defined_text_frame(frame: &RawFrame<'_>) -> Result<DecodedFrame, FrameError> {
    let (charset, rest) = split_encoding(frame.payload)?;
    let charset = charset.unwrap_or(Charset::Latin1);
    Ok(DecodedFrame::UserDefinedText(user_defined_fields(rest, charset)))
}

// The value is decoded without the frame charset, only the description uses it.
// Writers that encode the value in UTF-16 produce mojibake here.
fn user_defined_fields(bytes: &[u8], charset: Charset) -> UserDefined {
    let description = charset::decode(bytes, Some(charset));
    let value = charset::decode(skip(bytes, description.bytes_consumed), None);
    UserDefined {
        description: description.value,
        value: value.value,
    }
}

/// `APIC`: the picture layout of the frame's container version.
pub fn read_picture_frame(frame: &RawFrame<'_>) -> Result<DecodedFrame, FrameError> {
    decode_picture(frame.payload, frame.version)
}

/// `PIC`: three-letter frames always use the v2.2 layout.
pub fn read_legacy_picture_frame(frame: &RawFrame<'_>) -> Result<DecodedFrame, FrameError> {
    decode_picture(frame.payload, MajorVersion::V2)
}

fn decode_picture(payload: &[u8], version: MajorVersion) -> Result<DecodedFrame, FrameError> {
    let (charset, rest) = split_encoding(payload)?;

    let (format, rest) = match version {
        MajorVersion::V2 => {
            let code = rest.get(..3).ok_or_else(|| truncated(4, payload.len()))?;
            (charset::latin1(code), skip(rest, 3))
        }
        MajorVersion::V3 | MajorVersion::V4 => {
            let mime = charset::decode(rest, None);
            (mime.value, skip(rest, mime.bytes_consumed))
        }
    };

    let (&type_code, rest) = rest
        .split_first()
        .ok_or_else(|| truncated(payload.len() + 1, payload.len()))?;
    let picture_type = PICTURE_TYPES
        .get(usize::from(type_code))
        .copied()
        .ok_or(FrameError::UnknownPictureType(type_code))?;

    let description = charset::decode(rest, charset);
    let data = Bytes::copy_from_slice(skip(rest, description.bytes_consumed));

    Ok(DecodedFrame::Picture(Picture {
        format,
        picture_type,
        description: description.value,
        data,
    }))
}

/// Encoding byte, three-letter language code, descriptor, text.
fn language_fields(payload: &[u8]) -> Result<(String, String, String), FrameError> {
    let (charset, rest) = split_encoding(payload)?;
    let language = rest.get(..3).ok_or_else(|| truncated(4, payload.len()))?;
    let rest = skip(rest, 3);
    let descriptor = charset::decode(rest, charset);
    let text = charset::decode(skip(rest, descriptor.bytes_consumed), charset);
    Ok((charset::latin1(language), descriptor.value, text.value))
}

/// `COMM`/`COM`.
pub fn read_comment_frame(frame: &RawFrame<'_>) -> Result<DecodedFrame, FrameError> {
    let (language, short_description, text) = language_fields(frame.payload)?;
    Ok(DecodedFrame::Comment(Comment {
        language,
        short_description,
        text,
    }))
}

/// `USLT`/`ULT`.
pub fn read_lyrics_frame(frame: &RawFrame<'_>) -> Result<DecodedFrame, FrameError> {
    let (language, descriptor, lyrics) = language_fields(frame.payload)?;
    Ok(DecodedFrame::Lyrics(Lyrics {
        language,
        descriptor,
        lyrics,
    }))
}

/// `PCNT`/`CNT`: a big-endian counter spanning the payload.
///
/// Counters wider than 64 bits are allowed by ID3v2 but not decoded here.
pub fn read_play_counter_frame(frame: &RawFrame<'_>) -> Result<DecodedFrame, FrameError> {
    let payload = frame.payload;
    if payload.is_empty() {
        return Err(truncated(1, 0));
    }
    if payload.len() > 8 {
        return Err(FrameError::CounterTooWide(payload.len()));
    }
    let count = payload.iter().fold(0u64, |acc, &b| (acc << 8) | u64::from(b));
    Ok(DecodedFrame::PlayCount(count))
}

const FRAME_DESCRIPTIONS: &[(&str, &str)] = &[
    // v2.2
    ("BUF", "Recommended buffer size"),
    ("CNT", "Play counter"),
    ("COM", "Comments"),
    ("CRA", "Audio encryption"),
    ("ETC", "Event timing codes"),
    ("GEO", "General encapsulated object"),
    ("IPL", "Involved people list"),
    ("MCI", "Music CD Identifier"),
    ("PIC", "Attached picture"),
    ("POP", "Popularimeter"),
    ("SLT", "Synchronized lyric/text"),
    ("TAL", "Album/Movie/Show title"),
    ("TBP", "BPM (Beats Per Minute)"),
    ("TCM", "Composer"),
    ("TCO", "Content type"),
    ("TCR", "Copyright message"),
    ("TEN", "Encoded by"),
    ("TLE", "Length"),
    ("TP1", "Lead artist(s)/Lead performer(s)/Soloist(s)/Performing group"),
    ("TP2", "Band/Orchestra/Accompaniment"),
    ("TPA", "Part of a set"),
    ("TPB", "Publisher"),
    ("TRK", "Track number/Position in set"),
    ("TSS", "Software/hardware and settings used for encoding"),
    ("TT1", "Content group description"),
    ("TT2", "Title/Songname/Content description"),
    ("TT3", "Subtitle/Description refinement"),
    ("TXT", "Lyricist/text writer"),
    ("TXX", "User defined text information frame"),
    ("TYE", "Year"),
    ("UFI", "Unique file identifier"),
    ("ULT", "Unsychronized lyric/text transcription"),
    ("WAF", "Official audio file webpage"),
    ("WAR", "Official artist/performer webpage"),
    ("WCM", "Commercial information"),
    ("WXX", "User defined URL link frame"),
    // v2.3 and v2.4
    ("APIC", "Attached picture"),
    ("COMM", "Comments"),
    ("ENCR", "Encryption method registration"),
    ("GEOB", "General encapsulated object"),
    ("GRID", "Group identification registration"),
    ("MCDI", "Music CD identifier"),
    ("PCNT", "Play counter"),
    ("POPM", "Popularimeter"),
    ("PRIV", "Private frame"),
    ("SYLT", "Synchronized lyric/text"),
    ("TALB", "Album/Movie/Show title"),
    ("TBPM", "BPM (beats per minute)"),
    ("TCOM", "Composer"),
    ("TCON", "Content type"),
    ("TCOP", "Copyright message"),
    ("TDRC", "Recording time"),
    ("TENC", "Encoded by"),
    ("TEXT", "Lyricist/Text writer"),
    ("TIT1", "Content group description"),
    ("TIT2", "Title/songname/content description"),
    ("TIT3", "Subtitle/Description refinement"),
    ("TLEN", "Length"),
    ("TPE1", "Lead performer(s)/Soloist(s)"),
    ("TPE2", "Band/orchestra/accompaniment"),
    ("TPOS", "Part of a set"),
    ("TPUB", "Publisher"),
    ("TRCK", "Track number/Position in set"),
    ("TSSE", "Software/Hardware and settings used for encoding"),
    ("TXXX", "User defined text information frame"),
    ("TYER", "Year"),
    ("UFID", "Unique file identifier"),
    ("USLT", "Unsynchronized lyric/text transcription"),
    ("WCOM", "Commercial information"),
    ("WOAF", "Official audio file webpage"),
    ("WOAR", "Official artist/performer webpage"),
    ("WXXX", "User defined URL link frame"),
];

/// Human-readable name of a frame id.
pub fn describe(id: &str) -> &'static str {
    FRAME_DESCRIPTIONS
        .iter()
        .find(|(known, _)| *known == id)
        .map(|&(_, description)| description)
        .unwrap_or("Unknown")
}
