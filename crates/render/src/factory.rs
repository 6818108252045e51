use std::sync::atomic::{AtomicUsize, Ordering};
use thingspace_common::Spatial;
use thingspace_kernel::{RenderFactory, Thing};

/// Render factory that builds nothing but handles.
///
/// Stamps each representation with the owning thing's id and state so tests
/// and CLI output can tell builds apart, and counts builds/destroys.
#[derive(Debug, Default)]
pub struct NullRenderFactory {
    built: AtomicUsize,
    destroyed: AtomicUsize,
}

impl NullRenderFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total representations built so far.
    pub fn built(&self) -> usize {
        self.built.load(Ordering::SeqCst)
    }

    /// Total representations destroyed so far.
    pub fn destroyed(&self) -> usize {
        self.destroyed.load(Ordering::SeqCst)
    }

    /// Representations currently alive (built minus destroyed).
    pub fn live(&self) -> usize {
        self.built().saturating_sub(self.destroyed())
    }
}

impl RenderFactory for NullRenderFactory {
    fn render(&self, thing: &Thing) -> Spatial {
        self.built.fetch_add(1, Ordering::SeqCst);
        Spatial::new(format!("{}@{}", thing.id(), thing.state()))
    }

    fn destroy(&self, spatial: Spatial) {
        self.destroyed.fetch_add(1, Ordering::SeqCst);
        tracing::trace!(handle = spatial.handle(), "destroyed representation");
    }
}
