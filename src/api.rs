//! API facade module
//!
//! [`Registry`] holds the ordered byte-source backends and tag formats a read
//! may use; [`Reader`] runs one read against a registry: open a source for the
//! location, detect the tag format, decode the tag.

use std::sync::Arc;
use tracing::debug;

use crate::detect;
use crate::formats::{ReadOptions, TagError, TagFormat, TagFuture, TagMetadata};
use crate::http::HttpTransport;
use crate::id3v1::Id3v1Format;
use crate::id3v2::Id3v2Format;
use crate::mp4::Mp4Format;
use crate::runtime::Runtime;
use crate::transport::{FileTransport, Location, MemoryTransport, Transport, TransportError};

/// Ordered backends and tag formats. Order is priority: the first backend
/// that can handle a location opens it, the first format that matches decodes it.
#[derive(Clone)]
pub struct Registry {
    transports: Vec<Arc<dyn Transport>>,
    formats: Vec<Arc<dyn TagFormat>>,
}

impl Registry {
    /// An empty registry.
    pub fn new() -> Self {
        Self {
            transports: Vec::new(),
            formats: Vec::new(),
        }
    }

    /// Backends http, file, memory; formats ID3v2, ID3v1, MP4.
    pub fn with_defaults() -> Self {
        Self::new()
            .with_transport(HttpTransport::default())
            .with_transport(FileTransport)
            .with_transport(MemoryTransport)
            .with_format(Id3v2Format)
            .with_format(Id3v1Format)
            .with_format(Mp4Format)
    }

    pub fn with_transport(mut self, transport: impl Transport + 'static) -> Self {
        self.transports.push(Arc::new(transport));
        self
    }

    pub fn with_format(mut self, format: impl TagFormat + 'static) -> Self {
        self.formats.push(Arc::new(format));
        self
    }

    pub fn add_transport(&mut self, transport: Arc<dyn Transport>) -> &mut Self {
        self.transports.push(transport);
        self
    }

    pub fn add_format(&mut self, format: Arc<dyn TagFormat>) -> &mut Self {
        self.formats.push(format);
        self
    }

    /// Removes every backend named `name`. Returns whether any was removed.
    pub fn remove_transport(&mut self, name: &str) -> bool {
        let before = self.transports.len();
        self.transports.retain(|transport| transport.name() != name);
        self.transports.len() != before
    }

    /// Removes every format named `name`. Returns whether any was removed.
    pub fn remove_format(&mut self, name: &str) -> bool {
        let before = self.formats.len();
        self.formats.retain(|format| format.name() != name);
        self.formats.len() != before
    }

    pub fn transports(&self) -> &[Arc<dyn Transport>] {
        &self.transports
    }

    pub fn formats(&self) -> &[Arc<dyn TagFormat>] {
        &self.formats
    }

    /// The first backend that can handle `location`.
    pub fn find_transport(&self, location: &Location) -> Option<Arc<dyn Transport>> {
        self.transports
            .iter()
            .find(|transport| transport.can_handle(location))
            .cloned()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

/// One read of one location.
pub struct Reader<'r> {
    registry: &'r Registry,
    location: Location,
    options: ReadOptions,
    transport: Option<Arc<dyn Transport>>,
    format: Option<Arc<dyn TagFormat>>,
}

impl<'r> Reader<'r> {
    pub fn new(registry: &'r Registry, location: impl Into<Location>) -> Self {
        Self {
            registry,
            location: location.into(),
            options: ReadOptions::default(),
            transport: None,
            format: None,
        }
    }

    /// Restricts decoding to these frame ids and shortcut names.
    pub fn tags_to_read<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.options = ReadOptions::with_tags(tags);
        self
    }

    /// Uses this backend instead of looking one up in the registry.
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Decodes with this format, skipping detection.
    pub fn format(mut self, format: Arc<dyn TagFormat>) -> Self {
        self.format = Some(format);
        self
    }

    pub fn location(&self) -> &Location {
        &self.location
    }

    pub fn read(&self) -> TagFuture<'_> {
        Box::pin(async move {
            let transport = match &self.transport {
                Some(transport) => Arc::clone(transport),
                None => self
                    .registry
                    .find_transport(&self.location)
                    .ok_or_else(|| TransportError::Unsupported(self.location.to_string()))?,
            };
            debug!(location = %self.location, transport = transport.name(), "opening source");
            let source = transport.open(&self.location).await?;

            let format = match &self.format {
                Some(format) => Arc::clone(format),
                None => detect::detect(source.as_ref(), self.registry.formats()).await?,
            };
            debug!(format = format.name(), size = source.len(), "reading tag");
            format.read(source.as_ref(), &self.options).await
        })
    }

    /// Runs [`Reader::read`] to completion on a fresh current-thread runtime.
    ///
    /// Must not be called from inside an async context.
    pub fn read_blocking(&self) -> Result<TagMetadata, TagError> {
        let runtime = Runtime::new().map_err(TransportError::from)?;
        runtime.block_on(self.read())
    }
}
