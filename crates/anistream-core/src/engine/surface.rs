//! Render surface binding
//!
//! The host owns the actual video element. The engine only sees it through
//! [`MediaElement`], and [`RenderSurface`] makes sure at most one engine is
//! bound to a given element at any time.

use crate::error::{Error, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Host media element (an HTML `<video>` in the browser build)
pub trait MediaElement: Send + Sync {
    /// Assign a URL for direct (progressive or native adaptive) playback
    fn set_source(&self, url: &str);

    /// Detach whatever is currently assigned
    fn clear_source(&self);

    /// True when the runtime plays HLS manifests without a demuxer
    fn can_play_adaptive_natively(&self) -> bool {
        false
    }

    fn play(&self);

    fn pause(&self);

    fn seek(&self, time: f64);

    fn set_volume(&self, volume: f64);

    fn set_muted(&self, muted: bool);

    fn set_fullscreen(&self, fullscreen: bool);

    /// Seconds buffered ahead of the current position
    fn buffered_ahead(&self) -> f64;
}

/// A media element plus its single-engine binding flag
pub struct RenderSurface {
    id: String,
    element: Arc<dyn MediaElement>,
    bound: AtomicBool,
}

impl RenderSurface {
    pub fn new(id: impl Into<String>, element: Arc<dyn MediaElement>) -> Arc<Self> {
        Arc::new(Self {
            id: id.into(),
            element,
            bound: AtomicBool::new(false),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn element(&self) -> &Arc<dyn MediaElement> {
        &self.element
    }

    /// True while an engine holds the binding
    pub fn is_bound(&self) -> bool {
        self.bound.load(Ordering::Acquire)
    }

    /// Claim the surface for one engine instance
    pub(crate) fn claim(self: &Arc<Self>) -> Result<SurfaceBinding> {
        if self
            .bound
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(Error::SurfaceBusy {
                surface: self.id.clone(),
            });
        }
        debug!(surface = %self.id, "Render surface bound");
        Ok(SurfaceBinding {
            surface: Arc::clone(self),
        })
    }
}

impl std::fmt::Debug for RenderSurface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderSurface")
            .field("id", &self.id)
            .field("bound", &self.is_bound())
            .finish()
    }
}

/// Held by an engine; dropping it releases the surface
pub(crate) struct SurfaceBinding {
    surface: Arc<RenderSurface>,
}

impl SurfaceBinding {
    pub(crate) fn element(&self) -> &Arc<dyn MediaElement> {
        &self.surface.element
    }
}

impl Drop for SurfaceBinding {
    fn drop(&mut self) {
        self.surface.bound.store(false, Ordering::Release);
        debug!(surface = %self.surface.id, "Render surface released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NullElement;

    impl MediaElement for NullElement {
        fn set_source(&self, _url: &str) {}
        fn clear_source(&self) {}
        fn play(&self) {}
        fn pause(&self) {}
        fn seek(&self, _time: f64) {}
        fn set_volume(&self, _volume: f64) {}
        fn set_muted(&self, _muted: bool) {}
        fn set_fullscreen(&self, _fullscreen: bool) {}
        fn buffered_ahead(&self) -> f64 {
            0.0
        }
    }

    #[test]
    fn test_single_binding() {
        let surface = RenderSurface::new("main", Arc::new(NullElement));
        let binding = surface.claim().unwrap();
        assert!(surface.is_bound());
        assert!(matches!(surface.claim(), Err(Error::SurfaceBusy { .. })));

        drop(binding);
        assert!(!surface.is_bound());
        assert!(surface.claim().is_ok());
    }
}
