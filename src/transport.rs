// Transport abstraction module
// A media source exposes a file's bytes through explicit range loads, so that
// latency-costly backends only fetch what detection and tag decoding ask for.
// A transport is the backend that knows how to open a source for a location.

use bytes::Bytes;
use memmap2::Mmap;
use std::fmt;
use std::fs::File;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use thiserror::Error;
use tracing::debug;

use crate::charset::{self, Charset, DecodedString};
use crate::range::ResolvedRange;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Timeout")]
    Timeout,
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Range {offset}+{length} runs past the end of a {size} byte file")]
    OutOfBounds { offset: u64, length: u64, size: u64 },
    #[error("Range {offset}+{length} was read before it was loaded")]
    NotLoaded { offset: u64, length: u64 },
    #[error("No suitable file reader found for {0}")]
    Unsupported(String),
    #[error("Transport error: {0}")]
    Other(String),
}

pub type LoadFuture<'a> = Pin<Box<dyn Future<Output = Result<(), TransportError>> + Send + 'a>>;
pub type OpenFuture<'a> = Pin<Box<dyn Future<Output = Result<Box<dyn MediaSource>, TransportError>> + Send + 'a>>;

/// Random access to the bytes of one media file.
///
/// Bytes must be made resident with [`MediaSource::load_range`] before they are
/// read; the synchronous accessors fail with [`TransportError::NotLoaded`]
/// otherwise. Sources are read-only.
pub trait MediaSource: Send + Sync {
    /// Size of the file in bytes.
    fn len(&self) -> u64;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Ensures every byte of `range` is resident.
    fn load_range(&self, range: ResolvedRange) -> LoadFuture<'_>;

    /// Copies out `length` resident bytes starting at `offset`.
    fn bytes_at(&self, offset: u64, length: usize) -> Result<Bytes, TransportError>;

    fn byte_at(&self, offset: u64) -> Result<u8, TransportError> {
        let bytes = self.bytes_at(offset, 1)?;
        bytes
            .first()
            .copied()
            .ok_or(TransportError::NotLoaded { offset, length: 1 })
    }

    /// Fixed-length latin-1 text, no terminator handling.
    fn string_at(&self, offset: u64, length: usize) -> Result<String, TransportError> {
        Ok(charset::latin1(&self.bytes_at(offset, length)?))
    }

    /// Terminated text of at most `length` bytes, with the bytes it consumed.
    fn string_with_charset_at(
        &self,
        offset: u64,
        length: usize,
        charset: Option<Charset>,
    ) -> Result<DecodedString, TransportError> {
        Ok(charset::decode(&self.bytes_at(offset, length)?, charset))
    }

    /// Four bytes read as an unsigned integer.
    fn long_at(&self, offset: u64, big_endian: bool) -> Result<u32, TransportError> {
        let bytes = self.bytes_at(offset, 4)?;
        let raw: [u8; 4] = bytes[..]
            .try_into()
            .map_err(|_| TransportError::NotLoaded { offset, length: 4 })?;
        Ok(if big_endian {
            u32::from_be_bytes(raw)
        } else {
            u32::from_le_bytes(raw)
        })
    }
}

/// Fails when `[offset, offset + length)` does not fit in `size` bytes.
pub fn check_bounds(offset: u64, length: u64, size: u64) -> Result<(), TransportError> {
    match offset.checked_add(length) {
        Some(end) if end <= size => Ok(()),
        _ => Err(TransportError::OutOfBounds { offset, length, size }),
    }
}

/// Where a media file lives.
#[derive(Clone)]
pub enum Location {
    Url(String),
    Path(PathBuf),
    Memory(Bytes),
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Location::Url(url) => f.write_str(url),
            Location::Path(path) => write!(f, "{}", path.display()),
            Location::Memory(data) => write!(f, "<{} bytes in memory>", data.len()),
        }
    }
}

impl fmt::Debug for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Location::Url(url) => f.debug_tuple("Url").field(url).finish(),
            Location::Path(path) => f.debug_tuple("Path").field(path).finish(),
            Location::Memory(data) => f.debug_tuple("Memory").field(&data.len()).finish(),
        }
    }
}

impl From<&str> for Location {
    fn from(value: &str) -> Self {
        if value.starts_with("http://") || value.starts_with("https://") {
            Location::Url(value.to_string())
        } else {
            Location::Path(PathBuf::from(value))
        }
    }
}

impl From<String> for Location {
    fn from(value: String) -> Self {
        Location::from(value.as_str())
    }
}

impl From<PathBuf> for Location {
    fn from(value: PathBuf) -> Self {
        Location::Path(value)
    }
}

impl From<&Path> for Location {
    fn from(value: &Path) -> Self {
        Location::Path(value.to_path_buf())
    }
}

impl From<Bytes> for Location {
    fn from(value: Bytes) -> Self {
        Location::Memory(value)
    }
}

impl From<Vec<u8>> for Location {
    fn from(value: Vec<u8>) -> Self {
        Location::Memory(Bytes::from(value))
    }
}

/// A byte-source backend.
pub trait Transport: Send + Sync {
    fn name(&self) -> &'static str;

    /// Whether this backend can open `location`.
    fn can_handle(&self, location: &Location) -> bool;

    /// Opens a source for the location, returning a future that resolves to the source or an error.
    fn open<'a>(&'a self, location: &'a Location) -> OpenFuture<'a>;
}

/// Source over bytes already in memory.
pub struct MemorySource {
    data: Bytes,
}

impl MemorySource {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self { data: data.into() }
    }
}

impl MediaSource for MemorySource {
    fn len(&self) -> u64 {
        self.data.len() as u64
    }

    fn load_range(&self, range: ResolvedRange) -> LoadFuture<'_> {
        let result = check_bounds(range.offset, range.length, self.len());
        Box::pin(async move { result })
    }

    fn bytes_at(&self, offset: u64, length: usize) -> Result<Bytes, TransportError> {
        check_bounds(offset, length as u64, self.len())?;
        let start = offset as usize;
        Ok(self.data.slice(start..start + length))
    }
}

pub struct MemoryTransport;

impl Transport for MemoryTransport {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn can_handle(&self, location: &Location) -> bool {
        matches!(location, Location::Memory(_))
    }

    fn open<'a>(&'a self, location: &'a Location) -> OpenFuture<'a> {
        Box::pin(async move {
            match location {
                Location::Memory(data) => Ok(Box::new(MemorySource::new(data.clone())) as Box<dyn MediaSource>),
                other => Err(TransportError::Unsupported(other.to_string())),
            }
        })
    }
}

/// Source over a read-only memory mapping of a local file.
/// Loads are bounds checks only; the kernel pages bytes in on access.
pub struct FileSource {
    map: Option<Mmap>,
    len: u64,
}

impl FileSource {
    pub fn open(path: &Path) -> Result<Self, TransportError> {
        let file = File::open(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => TransportError::NotFound(path.display().to_string()),
            _ => TransportError::Io(e),
        })?;
        let len = file.metadata()?.len();
        // Zero-length mappings are rejected by the OS.
        let map = if len == 0 {
            None
        } else {
            // SAFETY: the file is opened read-only and the mapping is never
            // written through. Truncation by another process while mapped is
            // outside what this reader guards against.
            Some(unsafe { Mmap::map(&file)? })
        };
        debug!(path = %path.display(), len, "mapped local file");
        Ok(Self { map, len })
    }

    fn data(&self) -> &[u8] {
        self.map.as_deref().unwrap_or(&[])
    }
}

impl MediaSource for FileSource {
    fn len(&self) -> u64 {
        self.len
    }

    fn load_range(&self, range: ResolvedRange) -> LoadFuture<'_> {
        let result = check_bounds(range.offset, range.length, self.len);
        Box::pin(async move { result })
    }

    fn bytes_at(&self, offset: u64, length: usize) -> Result<Bytes, TransportError> {
        check_bounds(offset, length as u64, self.len)?;
        let start = offset as usize;
        Ok(Bytes::copy_from_slice(&self.data()[start..start + length]))
    }
}

pub struct FileTransport;

impl Transport for FileTransport {
    fn name(&self) -> &'static str {
        "file"
    }

    fn can_handle(&self, location: &Location) -> bool {
        matches!(location, Location::Path(_))
    }

    fn open<'a>(&'a self, location: &'a Location) -> OpenFuture<'a> {
        Box::pin(async move {
            match location {
                Location::Path(path) => Ok(Box::new(FileSource::open(path)?) as Box<dyn MediaSource>),
                other => Err(TransportError::Unsupported(other.to_string())),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_location_from_str() {
        assert!(matches!(Location::from("https://example.com/a.mp3"), Location::Url(_)));
        assert!(matches!(Location::from("http://example.com/a.mp3"), Location::Url(_)));
        assert!(matches!(Location::from("/music/a.mp3"), Location::Path(_)));
        assert!(matches!(Location::from(vec![1u8, 2, 3]), Location::Memory(_)));
        assert_eq!(Location::from(vec![0u8; 4]).to_string(), "<4 bytes in memory>");
    }

    #[test]
    fn test_check_bounds() {
        assert!(check_bounds(0, 10, 10).is_ok());
        assert!(check_bounds(10, 0, 10).is_ok());
        assert!(matches!(check_bounds(5, 6, 10), Err(TransportError::OutOfBounds { .. })));
        assert!(check_bounds(u64::MAX, 2, 10).is_err());
    }

    #[tokio::test]
    async fn test_memory_source_accessors() {
        let source = MemorySource::new(Bytes::from_static(b"ID3\x03\x00\x00\x00\x00\x01\x02tail"));
        assert_eq!(source.len(), 14);
        source.load_range(ResolvedRange::new(0, 14)).await.unwrap();
        assert!(source.load_range(ResolvedRange::new(10, 5)).await.is_err());

        assert_eq!(source.string_at(0, 3).unwrap(), "ID3");
        assert_eq!(source.byte_at(3).unwrap(), 3);
        assert_eq!(source.long_at(6, true).unwrap(), 0x0000_0102);
        assert_eq!(source.long_at(6, false).unwrap(), 0x0201_0000);
        let text = source.string_with_charset_at(10, 4, Some(Charset::Latin1)).unwrap();
        assert_eq!(text.value, "tail");
        assert_eq!(text.bytes_consumed, 4);
        assert!(source.bytes_at(12, 3).is_err());
    }

    #[tokio::test]
    async fn test_memory_transport_open() {
        let location = Location::from(vec![7u8; 32]);
        assert!(MemoryTransport.can_handle(&location));
        assert!(!FileTransport.can_handle(&location));
        let source = MemoryTransport.open(&location).await.unwrap();
        assert_eq!(source.len(), 32);
        assert!(MemoryTransport.open(&Location::from("/nope")).await.is_err());
    }

    #[tokio::test]
    async fn test_file_source_reads_mapped_bytes() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"0123456789").unwrap();
        file.flush().unwrap();

        let location = Location::from(file.path());
        assert!(FileTransport.can_handle(&location));
        let source = FileTransport.open(&location).await.unwrap();
        assert_eq!(source.len(), 10);
        source.load_range(ResolvedRange::new(4, 6)).await.unwrap();
        assert_eq!(source.bytes_at(4, 3).unwrap(), Bytes::from_static(b"456"));
    }

    #[tokio::test]
    async fn test_file_source_empty_and_missing() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let source = FileSource::open(file.path()).unwrap();
        assert!(source.is_empty());
        assert_eq!(source.bytes_at(0, 0).unwrap().len(), 0);

        let missing = FileSource::open(Path::new("/definitely/not/here.mp3"));
        assert!(matches!(missing, Err(TransportError::NotFound(_))));
    }
}
