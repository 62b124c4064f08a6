//! Tag container module
//!
//! This module defines the TagFormat trait implemented by each tag container
//! decoder (ID3v2, ID3v1, MP4), the metadata record a successful read produces, and
//! the error type shared by detection and decoding.

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

use crate::frames::{Comment, DecodedFrame, FrameError, Lyrics, Picture};
use crate::id3v2::TagFlags;
use crate::range::ByteRange;
use crate::transport::{MediaSource, TransportError};

/// Broad classes of read failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The bytes could not be read. Retryable by the caller.
    FileReader,
    /// No registered container recognised the file.
    TagFormat,
    UnsupportedVersion,
    MalformedFrame,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::FileReader => "fileReader",
            ErrorKind::TagFormat => "tagFormat",
            ErrorKind::UnsupportedVersion => "unsupportedVersion",
            ErrorKind::MalformedFrame => "malformedFrame",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors that can occur during detection or tag decoding
#[derive(Error, Debug)]
pub enum TagError {
    #[error("File reader error: {0}")]
    FileReader(#[from] TransportError),
    #[error("{0}")]
    TagFormat(String),
    #[error("{0}")]
    UnsupportedVersion(String),
    #[error("Malformed frame {id}: {source}")]
    MalformedFrame {
        id: String,
        #[source]
        source: FrameError,
    },
    #[error("Malformed tag: {0}")]
    MalformedTag(String),
}

impl TagError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TagError::FileReader(_) => ErrorKind::FileReader,
            TagError::TagFormat(_) => ErrorKind::TagFormat,
            TagError::UnsupportedVersion(_) => ErrorKind::UnsupportedVersion,
            TagError::MalformedFrame { .. } | TagError::MalformedTag(_) => ErrorKind::MalformedFrame,
        }
    }

    pub fn malformed_frame(id: &str, source: FrameError) -> Self {
        TagError::MalformedFrame {
            id: id.to_string(),
            source,
        }
    }
}

/// Field shortcut names and the frame keys they stand for, across ID3v2.2,
/// ID3v2.3/2.4, ID3v1 and MP4 items.
pub const SHORTCUTS: &[(&str, &[&str])] = &[
    ("title", &["TIT2", "TT2", "title", "\u{A9}nam"]),
    ("artist", &["TPE1", "TP1", "artist", "\u{A9}ART"]),
    ("album", &["TALB", "TAL", "album", "\u{A9}alb"]),
    ("year", &["TYER", "TDRC", "TYE", "year", "\u{A9}day"]),
    ("comment", &["COMM", "COM", "comment", "\u{A9}cmt"]),
    ("track", &["TRCK", "TRK", "track", "trkn"]),
    ("genre", &["TCON", "TCO", "genre", "\u{A9}gen", "gnre"]),
    ("picture", &["APIC", "PIC", "covr"]),
    ("lyrics", &["USLT", "ULT", "\u{A9}lyr"]),
];

/// Frame keys a shortcut name expands to, or `None` for non-shortcuts.
pub fn expand_shortcut(name: &str) -> Option<&'static [&'static str]> {
    SHORTCUTS
        .iter()
        .find(|(shortcut, _)| *shortcut == name)
        .map(|&(_, keys)| keys)
}

/// Per-read decoding options.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReadOptions {
    /// Allow-list of frame ids or shortcut names. `None` decodes everything.
    pub tags_to_read: Option<Vec<String>>,
}

impl ReadOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tags<I, S>(tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tags_to_read: Some(tags.into_iter().map(Into::into).collect()),
        }
    }

    /// Whether the frame stored under `key` should be decoded. A requested
    /// shortcut, or any key of the same field in another container, selects `key`.
    pub fn wants(&self, key: &str) -> bool {
        let Some(tags) = &self.tags_to_read else {
            return true;
        };
        tags.iter().any(|tag| {
            tag == key
                || SHORTCUTS
                    .iter()
                    .any(|(name, keys)| keys.contains(&key) && (tag == name || keys.contains(&tag.as_str())))
        })
    }
}

/// One decoded frame with its container-level attributes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagFrame {
    pub id: String,
    /// Declared payload size in the container.
    pub size: u64,
    pub description: &'static str,
    pub data: DecodedFrame,
}

/// Result of a successful read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagMetadata {
    /// Container name, e.g. `ID3`.
    pub format: &'static str,
    /// e.g. `2.4.0` or `1.1`
    pub version: String,
    /// Tag size in bytes, header excluded.
    pub size: u64,
    pub flags: Option<TagFlags>,
    pub frames: BTreeMap<String, Vec<TagFrame>>,
}

impl TagMetadata {
    pub fn new(format: &'static str, version: impl Into<String>, size: u64) -> Self {
        Self {
            format,
            version: version.into(),
            size,
            flags: None,
            frames: BTreeMap::new(),
        }
    }

    /// Appends a frame under its id. Repeats of an id keep their order.
    pub fn insert(&mut self, frame: TagFrame) {
        self.frames.entry(frame.id.clone()).or_default().push(frame);
    }

    /// First frame stored under `key`.
    pub fn get(&self, key: &str) -> Option<&TagFrame> {
        self.frames.get(key).and_then(|frames| frames.first())
    }

    pub fn get_all(&self, key: &str) -> &[TagFrame] {
        self.frames.get(key).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.frames.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// First frame stored under any key of a shortcut.
    pub fn shortcut(&self, name: &str) -> Option<&DecodedFrame> {
        expand_shortcut(name)?
            .iter()
            .find_map(|key| self.get(key))
            .map(|frame| &frame.data)
    }

    fn shortcut_text(&self, name: &str) -> Option<&str> {
        self.shortcut(name).and_then(DecodedFrame::as_text)
    }

    pub fn title(&self) -> Option<&str> {
        self.shortcut_text("title")
    }

    pub fn artist(&self) -> Option<&str> {
        self.shortcut_text("artist")
    }

    pub fn album(&self) -> Option<&str> {
        self.shortcut_text("album")
    }

    pub fn year(&self) -> Option<&str> {
        self.shortcut_text("year")
    }

    pub fn track(&self) -> Option<&str> {
        self.shortcut_text("track")
    }

    pub fn genre(&self) -> Option<&str> {
        self.shortcut_text("genre")
    }

    pub fn comment(&self) -> Option<&Comment> {
        match self.shortcut("comment")? {
            DecodedFrame::Comment(comment) => Some(comment),
            _ => None,
        }
    }

    pub fn picture(&self) -> Option<&Picture> {
        match self.shortcut("picture")? {
            DecodedFrame::Picture(picture) => Some(picture),
            _ => None,
        }
    }

    pub fn lyrics(&self) -> Option<&Lyrics> {
        match self.shortcut("lyrics")? {
            DecodedFrame::Lyrics(lyrics) => Some(lyrics),
            _ => None,
        }
    }
}

pub type TagFuture<'a> = Pin<Box<dyn Future<Output = Result<TagMetadata, TagError>> + Send + 'a>>;

/// A tag container decoder.
///
/// Detection reads `identifier_range` from the source and offers those bytes
/// to `matches`; the first registered format that matches gets `read`.
pub trait TagFormat: Send + Sync {
    fn name(&self) -> &'static str;

    /// Where the container's identifier bytes live.
    fn identifier_range(&self) -> ByteRange;

    /// Whether `identifier` (the bytes of `identifier_range`) marks this container.
    fn matches(&self, identifier: &[u8]) -> bool;

    /// Loads and decodes the whole tag.
    fn read<'a>(&'a self, source: &'a dyn MediaSource, options: &'a ReadOptions) -> TagFuture<'a>;
}

impl fmt::Debug for dyn TagFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TagFormat")
            .field("name", &self.name())
            .field("identifier_range", &self.identifier_range())
            .finish()
    }
}
