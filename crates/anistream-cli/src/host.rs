//! Headless host for playback simulation
//!
//! Stands in for the browser's video element and adaptive demuxer. Every
//! call is logged and recorded so the simulation can report what the
//! engine asked the host to do.

use anistream_core::engine::{BufferConfig, Demuxer, DemuxerFactory, MediaElement};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::debug;

/// Shared record of host calls
#[derive(Debug, Default)]
pub struct CallLog {
    calls: Mutex<Vec<String>>,
}

impl CallLog {
    fn push(&self, call: String) {
        debug!(call = %call, "Host call");
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(call);
    }

    /// Take the calls recorded so far
    pub fn drain(&self) -> Vec<String> {
        std::mem::take(&mut *self.calls.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

/// Video element without a screen
pub struct HeadlessElement {
    log: Arc<CallLog>,
}

impl HeadlessElement {
    pub fn new(log: Arc<CallLog>) -> Self {
        Self { log }
    }
}

impl MediaElement for HeadlessElement {
    fn set_source(&self, url: &str) {
        self.log.push(format!("element.set_source({})", url));
    }

    fn clear_source(&self) {
        self.log.push("element.clear_source()".to_string());
    }

    fn play(&self) {
        self.log.push("element.play()".to_string());
    }

    fn pause(&self) {
        self.log.push("element.pause()".to_string());
    }

    fn seek(&self, time: f64) {
        self.log.push(format!("element.seek({:.1})", time));
    }

    fn set_volume(&self, volume: f64) {
        self.log.push(format!("element.set_volume({:.2})", volume));
    }

    fn set_muted(&self, muted: bool) {
        self.log.push(format!("element.set_muted({})", muted));
    }

    fn set_fullscreen(&self, fullscreen: bool) {
        self.log.push(format!("element.set_fullscreen({})", fullscreen));
    }

    fn buffered_ahead(&self) -> f64 {
        0.0
    }
}

struct HeadlessDemuxer {
    log: Arc<CallLog>,
}

impl Demuxer for HeadlessDemuxer {
    fn load_source(&mut self, url: &str) {
        self.log.push(format!("demuxer.load_source({})", url));
    }

    fn start_load(&mut self) {
        self.log.push("demuxer.start_load()".to_string());
    }

    fn recover_media_error(&mut self) {
        self.log.push("demuxer.recover_media_error()".to_string());
    }

    fn swap_audio_codec(&mut self) {
        self.log.push("demuxer.swap_audio_codec()".to_string());
    }

    fn set_level(&mut self, index: i32) {
        self.log.push(format!("demuxer.set_level({})", index));
    }

    fn destroy(&mut self) {
        self.log.push("demuxer.destroy()".to_string());
    }
}

/// Always supports adaptive playback
pub struct HeadlessFactory {
    log: Arc<CallLog>,
}

impl HeadlessFactory {
    pub fn new(log: Arc<CallLog>) -> Self {
        Self { log }
    }
}

impl DemuxerFactory for HeadlessFactory {
    fn is_supported(&self) -> bool {
        true
    }

    fn create(
        &self,
        _element: Arc<dyn MediaElement>,
        config: &BufferConfig,
    ) -> anyhow::Result<Box<dyn Demuxer>> {
        self.log.push(format!(
            "demuxer.create(max_buffer_length={})",
            config.max_buffer_length
        ));
        Ok(Box::new(HeadlessDemuxer {
            log: Arc::clone(&self.log),
        }))
    }
}
