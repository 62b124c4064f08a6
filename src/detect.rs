// Format detection module
// Loads the identifier windows of every registered tag format with at most
// one load per file side, waits for both sides, then probes the formats in
// registration order. The first format whose identifier bytes match wins.

use futures::stream::{FuturesUnordered, StreamExt};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tracing::{debug, trace};

use crate::formats::{TagError, TagFormat};
use crate::range::{self, ByteRange, Side};
use crate::transport::{MediaSource, TransportError};

/// Progress of the two side loads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinState {
    WaitingBoth,
    /// One side has reported; the other is still pending.
    WaitingOne(Side),
    Done,
}

/// Join over exactly two completion signals, one per file side.
///
/// A side with nothing to load still signals, so the join always completes
/// after two distinct signals. A repeated signal from the side that already
/// reported does not advance it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SideJoin {
    state: JoinState,
}

impl SideJoin {
    pub fn new() -> Self {
        Self {
            state: JoinState::WaitingBoth,
        }
    }

    pub fn state(&self) -> JoinState {
        self.state
    }

    pub fn is_done(&self) -> bool {
        self.state == JoinState::Done
    }

    /// Records completion of `side` and returns the new state.
    pub fn signal(&mut self, side: Side) -> JoinState {
        self.state = match self.state {
            JoinState::WaitingBoth => JoinState::WaitingOne(side.opposite()),
            JoinState::WaitingOne(pending) if pending == side => JoinState::Done,
            unchanged => unchanged,
        };
        self.state
    }
}

impl Default for SideJoin {
    fn default() -> Self {
        Self::new()
    }
}

pub type DetectFuture<'a> = Pin<Box<dyn Future<Output = Result<Arc<dyn TagFormat>, TagError>> + Send + 'a>>;

/// Finds the first format in `formats` whose identifier bytes match.
pub fn detect<'a>(source: &'a dyn MediaSource, formats: &'a [Arc<dyn TagFormat>]) -> DetectFuture<'a> {
    Box::pin(async move {
        let file_size = source.len();
        let candidates: Vec<ByteRange> = formats.iter().map(|format| format.identifier_range()).collect();
        let plan = range::plan(&candidates, file_size);
        debug!(file_size, start = ?plan.start, end = ?plan.end, "planned identifier loads");

        let mut join = SideJoin::new();
        let mut loads = FuturesUnordered::new();
        for side in [Side::Start, Side::End] {
            match plan.get(side) {
                Some(range) => loads.push(async move { (side, source.load_range(range).await) }),
                None => {
                    join.signal(side);
                }
            }
        }

        while let Some((side, result)) = loads.next().await {
            result?;
            let state = join.signal(side);
            trace!(?side, ?state, "side load finished");
        }
        if !join.is_done() {
            return Err(TagError::from(TransportError::Other(
                "identifier loads did not complete".to_string(),
            )));
        }

        probe(source, formats)
    })
}

/// Tests each format's identifier bytes in registration order.
/// The identifier windows must already be loaded.
pub fn probe(source: &dyn MediaSource, formats: &[Arc<dyn TagFormat>]) -> Result<Arc<dyn TagFormat>, TagError> {
    let file_size = source.len();
    for format in formats {
        let Some(window) = format.identifier_range().resolve(file_size) else {
            trace!(format = format.name(), "identifier window outside file");
            continue;
        };
        let identifier = source.bytes_at(window.offset, window.length as usize)?;
        if format.matches(&identifier) {
            debug!(format = format.name(), "tag format detected");
            return Ok(Arc::clone(format));
        }
    }
    Err(TagError::TagFormat("No suitable tag reader found".to_string()))
}
