//! Buffer tuning and sampling
//!
//! Handles:
//! - Forward/back buffer targets handed to the demuxer
//! - The 1 Hz buffer-length sampling loop (observability only)

use super::surface::MediaElement;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, trace};

/// Buffer configuration passed to the demuxer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BufferConfig {
    /// Target forward buffer (seconds)
    pub max_buffer_length: f64,
    /// Hard ceiling for the forward buffer (seconds)
    pub max_max_buffer_length: f64,
    /// Played media kept behind the playhead (seconds)
    pub back_buffer_length: f64,
    /// Let the demuxer decode in a background worker
    pub enable_worker: bool,
    /// Start at the lowest rendition and let ABR climb
    pub start_at_lowest: bool,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            max_buffer_length: 45.0,
            max_max_buffer_length: 90.0,
            back_buffer_length: 20.0,
            enable_worker: true,
            start_at_lowest: false,
        }
    }
}

/// Periodic buffer-length sampler bound to one engine instance.
///
/// The task is aborted when the sampler is dropped.
pub struct BufferSampler {
    task: JoinHandle<()>,
    samples: watch::Receiver<f64>,
}

impl BufferSampler {
    /// Start sampling `element` every `period`.
    ///
    /// Returns `None` outside a tokio runtime.
    pub fn spawn(element: Arc<dyn MediaElement>, period: Duration) -> Option<Self> {
        let handle = tokio::runtime::Handle::try_current().ok()?;
        let (tx, samples) = watch::channel(0.0);

        let task = handle.spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let buffered = element.buffered_ahead();
                trace!(buffer_length = buffered, "Buffer sample");
                tx.send_replace(buffered);
            }
        });

        debug!(period_ms = period.as_millis() as u64, "Buffer sampler started");
        Some(Self { task, samples })
    }

    /// Most recent sample
    pub fn latest(&self) -> f64 {
        *self.samples.borrow()
    }

    /// Subscribe to samples
    pub fn subscribe(&self) -> watch::Receiver<f64> {
        self.samples.clone()
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    /// Stop sampling
    pub fn cancel(&self) {
        self.task.abort();
    }
}

impl Drop for BufferSampler {
    fn drop(&mut self) {
        self.task.abort();
    }
}
