//! mediatags-rs: ID3 metadata extraction over random-access byte sources
//!
//! ID3v2, ID3v1 and MP4 tags are read from local files, in-memory buffers or HTTP resources while
//! loading only the byte ranges detection and decoding need.
//!
//! ```no_run
//! use mediatags::{Reader, Registry};
//!
//! let registry = Registry::with_defaults();
//! let metadata = Reader::new(&registry, "song.mp3")
//!     .tags_to_read(["title", "artist", "picture"])
//!     .read_blocking()?;
//! println!("{:?} by {:?}", metadata.title(), metadata.artist());
//! # Ok::<(), mediatags::TagError>(())
//! ```

pub mod api;
pub mod cache;
pub mod charset;
pub mod detect;
pub mod formats;
pub mod frames;
pub mod http;
pub mod id3v1;
pub mod id3v2;
pub mod mp4;
pub mod range;
pub mod runtime;
pub mod testlib;
pub mod transport;

pub use api::{Reader, Registry};
pub use charset::{Charset, DecodedString};
pub use formats::{ErrorKind, ReadOptions, TagError, TagFormat, TagFrame, TagMetadata};
pub use frames::{Comment, DecodedFrame, Lyrics, Picture, UserDefined};
pub use http::{HttpConfig, HttpTransport};
pub use range::{ByteRange, ResolvedRange, Side};
pub use transport::{Location, MediaSource, Transport, TransportError};

static CRATE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library version.
pub fn version() -> &'static str {
    CRATE_VERSION
}

/// Reads the tag at `location` with the backends and formats of `registry`.
pub fn read<'r>(location: impl Into<Location>, registry: &'r Registry) -> formats::TagFuture<'r> {
    let location = location.into();
    Box::pin(async move { Reader::new(registry, location).read().await })
}
