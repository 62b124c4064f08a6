// HTTP transport module
// Remote media is fetched with ranged GET requests. Every fetched chunk is
// kept in a ChunkCache so identifier probes and the tag read share bytes
// instead of repeating round trips.

use bytes::Bytes;
use reqwest::header::{HeaderName, HeaderValue, CONTENT_LENGTH, CONTENT_RANGE, IF_MODIFIED_SINCE, RANGE, USER_AGENT};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use std::time::Duration;
use tracing::{debug, trace};

use crate::cache::ChunkCache;
use crate::range::ResolvedRange;
use crate::transport::{check_bounds, LoadFuture, Location, MediaSource, OpenFuture, Transport, TransportError};

/// Configuration for the HTTP transport.
#[derive(Debug, Clone)]
pub struct HttpConfig {
    timeout_seconds: u64,
    avoid_head_requests: bool,
    disallowed_headers: Vec<String>,
    user_agent: Option<String>,
    use_system_proxy: bool,
    probe_length: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        HttpConfigBuilder::default().build()
    }
}

impl HttpConfig {
    pub fn builder() -> HttpConfigBuilder {
        HttpConfigBuilder::default()
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    pub fn avoid_head_requests(&self) -> bool {
        self.avoid_head_requests
    }

    fn allows(&self, header: &HeaderName) -> bool {
        !self
            .disallowed_headers
            .iter()
            .any(|name| name.eq_ignore_ascii_case(header.as_str()))
    }
}

/// Builder for [`HttpConfig`].
#[derive(Debug, Clone)]
pub struct HttpConfigBuilder {
    timeout_seconds: u64,             // Default: 30, Range: 1-300
    avoid_head_requests: bool,        // Default: false
    disallowed_headers: Vec<String>,  // Default: none
    user_agent: Option<String>,       // Default: reqwest's
    use_system_proxy: bool,           // Default: true
    probe_length: u64,                // Default: 1024, Range: 16-65536
}

impl Default for HttpConfigBuilder {
    fn default() -> Self {
        Self {
            timeout_seconds: 30,
            avoid_head_requests: false,
            disallowed_headers: Vec::new(),
            user_agent: None,
            use_system_proxy: true,
            probe_length: 1024,
        }
    }
}

impl HttpConfigBuilder {
    pub fn timeout_seconds(mut self, secs: u64) -> Self {
        self.timeout_seconds = secs.clamp(1, 300);
        self
    }
    /// Learn the file size from the first ranged GET instead of a HEAD request.
    pub fn avoid_head_requests(mut self, avoid: bool) -> Self {
        self.avoid_head_requests = avoid;
        self
    }
    /// Headers that must never be sent, e.g. for servers with strict CORS rules.
    pub fn disallowed_headers<I, S>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.disallowed_headers = headers.into_iter().map(Into::into).collect();
        self
    }
    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.user_agent = Some(agent.into());
        self
    }
    pub fn use_system_proxy(mut self, enabled: bool) -> Self {
        self.use_system_proxy = enabled;
        self
    }
    /// Bytes requested by the size-probing GET when HEAD requests are avoided.
    pub fn probe_length(mut self, len: u64) -> Self {
        self.probe_length = len.clamp(16, 65536);
        self
    }
    pub fn build(self) -> HttpConfig {
        HttpConfig {
            timeout_seconds: self.timeout_seconds,
            avoid_head_requests: self.avoid_head_requests,
            disallowed_headers: self.disallowed_headers,
            user_agent: self.user_agent,
            use_system_proxy: self.use_system_proxy,
            probe_length: self.probe_length,
        }
    }
}

/// Backend for `http://` and `https://` locations.
#[derive(Debug, Clone, Default)]
pub struct HttpTransport {
    config: HttpConfig,
}

impl HttpTransport {
    pub fn new(config: HttpConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &HttpConfig {
        &self.config
    }

    fn client(&self) -> Result<Client, TransportError> {
        let mut builder = Client::builder().timeout(self.config.timeout());
        if !self.config.use_system_proxy {
            builder = builder.no_proxy();
        }
        builder.build().map_err(map_reqwest_error)
    }
}

impl Transport for HttpTransport {
    fn name(&self) -> &'static str {
        "http"
    }

    fn can_handle(&self, location: &Location) -> bool {
        matches!(location, Location::Url(_))
    }

    fn open<'a>(&'a self, location: &'a Location) -> OpenFuture<'a> {
        Box::pin(async move {
            let Location::Url(url) = location else {
                return Err(TransportError::Unsupported(location.to_string()));
            };
            let source = HttpSource::open(self.client()?, url.clone(), self.config.clone()).await?;
            Ok(Box::new(source) as Box<dyn MediaSource>)
        })
    }
}

/// Remote source backed by ranged GET requests.
pub struct HttpSource {
    client: Client,
    url: String,
    config: HttpConfig,
    size: u64,
    cache: ChunkCache,
}

impl HttpSource {
    /// Connects to `url` and learns the resource size.
    pub async fn open(client: Client, url: String, config: HttpConfig) -> Result<Self, TransportError> {
        let mut source = Self {
            client,
            url,
            config,
            size: 0,
            cache: ChunkCache::new(),
        };

        if source.config.avoid_head_requests {
            let probe = ResolvedRange::new(0, source.config.probe_length);
            let response = source.send(source.ranged(source.client.get(&source.url), probe)).await?;
            match response.status() {
                StatusCode::PARTIAL_CONTENT | StatusCode::RANGE_NOT_SATISFIABLE => {
                    let content_range = header_str(&response, &CONTENT_RANGE)
                        .and_then(parse_content_range)
                        .ok_or_else(|| TransportError::Other("missing Content-Range".to_string()))?;
                    source.size = content_range.total;
                    if let Some(start) = content_range.start {
                        let body = response.bytes().await.map_err(map_reqwest_error)?;
                        source.cache.insert(start, body);
                    }
                }
                StatusCode::OK => {
                    let body = response.bytes().await.map_err(map_reqwest_error)?;
                    source.size = body.len() as u64;
                    source.cache.insert(0, body);
                }
                status => return Err(status_error(&source.url, status)),
            }
        } else {
            let response = source.send(source.client.head(&source.url)).await?;
            if !response.status().is_success() {
                return Err(status_error(&source.url, response.status()));
            }
            source.size = header_str(&response, &CONTENT_LENGTH)
                .and_then(|value| value.trim().parse().ok())
                .ok_or_else(|| TransportError::Other("missing Content-Length".to_string()))?;
        }

        debug!(url = %source.url, size = source.size, "opened remote source");
        Ok(source)
    }

    /// Bytes fetched so far.
    pub fn loaded_bytes(&self) -> u64 {
        self.cache.loaded_bytes()
    }

    fn header(&self, builder: RequestBuilder, name: HeaderName, value: &str) -> RequestBuilder {
        if !self.config.allows(&name) {
            return builder;
        }
        match HeaderValue::from_str(value) {
            Ok(value) => builder.header(name, value),
            Err(_) => builder,
        }
    }

    fn ranged(&self, builder: RequestBuilder, range: ResolvedRange) -> RequestBuilder {
        let value = format!("bytes={}-{}", range.offset, range.end().saturating_sub(1));
        let builder = self.header(builder, RANGE, &value);
        // Some caches hand back a stale full response to ranged requests.
        self.header(builder, IF_MODIFIED_SINCE, "Sat, 01 Jan 1970 00:00:00 GMT")
    }

    async fn send(&self, builder: RequestBuilder) -> Result<Response, TransportError> {
        let builder = match &self.config.user_agent {
            Some(agent) => self.header(builder, USER_AGENT, agent),
            None => builder,
        };
        builder.send().await.map_err(map_reqwest_error)
    }

    async fn fetch(&self, range: ResolvedRange) -> Result<(), TransportError> {
        trace!(url = %self.url, %range, "fetching range");
        let response = self.send(self.ranged(self.client.get(&self.url), range)).await?;
        match response.status() {
            StatusCode::PARTIAL_CONTENT => {
                let start = header_str(&response, &CONTENT_RANGE)
                    .and_then(parse_content_range)
                    .and_then(|content_range| content_range.start)
                    .unwrap_or(range.offset);
                let body = response.bytes().await.map_err(map_reqwest_error)?;
                self.cache.insert(start, body);
                Ok(())
            }
            // Range header ignored or disallowed: the whole resource came back.
            StatusCode::OK => {
                let body = response.bytes().await.map_err(map_reqwest_error)?;
                self.cache.insert(0, body);
                Ok(())
            }
            status => Err(status_error(&self.url, status)),
        }
    }
}

impl MediaSource for HttpSource {
    fn len(&self) -> u64 {
        self.size
    }

    fn load_range(&self, range: ResolvedRange) -> LoadFuture<'_> {
        Box::pin(async move {
            check_bounds(range.offset, range.length, self.size)?;
            if self.cache.contains(range.offset, range.length) {
                return Ok(());
            }
            self.fetch(range).await?;
            if self.cache.contains(range.offset, range.length) {
                Ok(())
            } else {
                Err(TransportError::Other(format!("server returned less than {range}")))
            }
        })
    }

    fn bytes_at(&self, offset: u64, length: usize) -> Result<Bytes, TransportError> {
        check_bounds(offset, length as u64, self.size)?;
        self.cache
            .get(offset, length as u64)
            .ok_or(TransportError::NotLoaded {
                offset,
                length: length as u64,
            })
    }
}

/// The parts of a `Content-Range` header the transport uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentRange {
    /// First byte of the returned range; `None` for `bytes */total`.
    pub start: Option<u64>,
    pub total: u64,
}

/// Parses `bytes 0-1023/4096` or `bytes */4096`.
pub fn parse_content_range(value: &str) -> Option<ContentRange> {
    let rest = value.trim().strip_prefix("bytes")?.trim_start();
    let (range, total) = rest.split_once('/')?;
    let total = total.trim().parse().ok()?;
    let start = match range.trim() {
        "*" => None,
        range => Some(range.split_once('-')?.0.trim().parse().ok()?),
    };
    Some(ContentRange { start, total })
}

fn header_str<'r>(response: &'r Response, name: &HeaderName) -> Option<&'r str> {
    response.headers().get(name).and_then(|value| value.to_str().ok())
}

fn status_error(url: &str, status: StatusCode) -> TransportError {
    match status {
        StatusCode::NOT_FOUND | StatusCode::GONE => TransportError::NotFound(url.to_string()),
        status => TransportError::Other(format!("{url} answered {status}")),
    }
}

fn map_reqwest_error(error: reqwest::Error) -> TransportError {
    if error.is_timeout() {
        TransportError::Timeout
    } else {
        TransportError::Other(error.to_string())
    }
}
