//! Configuration types for the scrcpy-recv crate
//!
//! `DispatchConfig` controls the worker pool that runs handlers and the
//! optional deadline on frame fan-out. `StartupConfig` carries the arguments
//! the engine needs to start listening.

use std::time::Duration;

use crate::error::{ReceiverError, Result};

/// Configuration for the Dispatcher
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Upper bound on how long a frame dispatch waits for its handlers.
    /// Handlers still running at the deadline are reported as failed.
    /// Default: None (wait for every handler)
    pub frame_deadline: Option<Duration>,

    /// Maximum number of threads running handlers at once
    /// Default: 64
    pub max_blocking_threads: usize,

    /// How long an idle handler thread is kept around
    /// Default: 10 seconds
    pub thread_keep_alive: Duration,

    /// Name given to handler threads
    /// Default: "scrcpy-dispatch"
    pub thread_name: String,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            frame_deadline: None,
            max_blocking_threads: 64,
            thread_keep_alive: Duration::from_secs(10),
            thread_name: "scrcpy-dispatch".to_string(),
        }
    }
}

impl DispatchConfig {
    /// Create a new DispatchConfig with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a DispatchConfig whose frame dispatch never waits longer than `deadline`
    pub fn bounded(deadline: Duration) -> Self {
        Self {
            frame_deadline: Some(deadline),
            ..Default::default()
        }
    }

    /// Create a DispatchConfig tuned for a live preview at ~30fps
    pub fn low_latency() -> Self {
        Self {
            frame_deadline: Some(Duration::from_millis(33)),
            max_blocking_threads: 16,
            thread_keep_alive: Duration::from_secs(30),
            ..Default::default()
        }
    }

    /// Validate the configuration and return any issues
    pub fn validate(&self) -> Result<()> {
        if self.max_blocking_threads == 0 {
            return Err(ReceiverError::Configuration(
                "max_blocking_threads must be greater than 0".to_string(),
            ));
        }

        if self.frame_deadline == Some(Duration::ZERO) {
            return Err(ReceiverError::Configuration(
                "frame_deadline must be greater than 0 when set".to_string(),
            ));
        }

        if self.thread_name.is_empty() {
            return Err(ReceiverError::Configuration(
                "thread_name must not be empty".to_string(),
            ));
        }

        Ok(())
    }

    pub fn with_frame_deadline(mut self, deadline: Duration) -> Self {
        self.frame_deadline = Some(deadline);
        self
    }

    pub fn with_max_blocking_threads(mut self, threads: usize) -> Self {
        self.max_blocking_threads = threads;
        self
    }

    pub fn with_thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = name.into();
        self
    }
}

/// Arguments for starting the engine's listening loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartupConfig {
    /// Address (or bare port) the engine listens on
    /// Default: "27183"
    pub listen_address: String,

    /// Network buffer size in KB; 2MB covers a 1080x2512 screen
    /// Default: 2048
    pub network_buffer_kb: u32,

    /// Decoder buffer size in KB, twice the network buffer
    /// Default: 4096
    pub video_buffer_kb: u32,
}

impl Default for StartupConfig {
    fn default() -> Self {
        Self {
            listen_address: "27183".to_string(),
            network_buffer_kb: 2048,
            video_buffer_kb: 4096,
        }
    }
}

impl StartupConfig {
    /// Create a StartupConfig listening on `address` with default buffer sizes
    pub fn new(listen_address: impl Into<String>) -> Self {
        Self {
            listen_address: listen_address.into(),
            ..Default::default()
        }
    }

    /// Set the network buffer size; the video buffer follows at twice the size
    pub fn with_network_buffer_kb(mut self, size_kb: u32) -> Self {
        self.network_buffer_kb = size_kb;
        self.video_buffer_kb = size_kb.saturating_mul(2);
        self
    }

    pub fn with_video_buffer_kb(mut self, size_kb: u32) -> Self {
        self.video_buffer_kb = size_kb;
        self
    }

    /// Validate the configuration and return any issues
    pub fn validate(&self) -> Result<()> {
        if self.listen_address.trim().is_empty() {
            return Err(ReceiverError::InvalidArgument(
                "listen address must not be empty".to_string(),
            ));
        }

        if self.network_buffer_kb == 0 || self.video_buffer_kb == 0 {
            return Err(ReceiverError::InvalidArgument(
                "buffer sizes must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}
