// Async runtime module
// Wraps a current-thread Tokio runtime. Reads are single-threaded and
// cooperative, so the blocking facade never needs a worker pool.

use tokio::runtime::{Builder, Runtime as TokioRuntime};

/// Builder for creating a Runtime.
pub struct RuntimeBuilder {
    // Scheduler ticks between polls of the IO and timer drivers.
    event_interval: u32,
    max_blocking_threads: usize,
}

impl RuntimeBuilder {
    pub fn new() -> Self {
        Self {
            event_interval: 61,
            max_blocking_threads: 4,
        }
    }

    /// Default: 61, Range: 1-1000
    pub fn event_interval(mut self, ticks: u32) -> Self {
        self.event_interval = ticks.clamp(1, 1000);
        self
    }

    /// Default: 4, Range: 1-64
    pub fn max_blocking_threads(mut self, threads: usize) -> Self {
        self.max_blocking_threads = threads.clamp(1, 64);
        self
    }

    /// Build the Runtime with the configured settings.
    pub fn build(self) -> Result<Runtime, std::io::Error> {
        let runtime = Builder::new_current_thread()
            .event_interval(self.event_interval)
            .max_blocking_threads(self.max_blocking_threads)
            // the HTTP backend needs the IO driver, tests need timers
            .enable_all()
            .build()?;
        Ok(Runtime { runtime })
    }
}

impl Default for RuntimeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A current-thread runtime that drives reads to completion.
pub struct Runtime {
    runtime: TokioRuntime,
}

impl Runtime {
    /// Create a new Runtime with default settings using the builder.
    pub fn new() -> Result<Self, std::io::Error> {
        RuntimeBuilder::new().build()
    }

    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::new()
    }

    /// Run a future to completion on this runtime.
    /// This blocks the current thread until the future completes.
    pub fn block_on<F, T>(&self, future: F) -> T
    where
        F: std::future::Future<Output = T>,
    {
        self.runtime.block_on(future)
    }
}
