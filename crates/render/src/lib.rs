//! Rendering collaborators: the renderable factory and the world container.
//!
//! # Invariants
//! - The core never reaches into a representation; it only holds handles.
//! - The scene root is an opaque attach/detach sink; membership is by handle.
//!
//! # Workaround
//! Ships a handle-stamping `NullRenderFactory` as a workaround for a real
//! scene-graph backend. The `RenderFactory` trait lives in the kernel (it is
//! the seam the thing model renders through); swap in a GPU-backed factory
//! without changing consumers.

mod factory;
mod scene;

pub use factory::NullRenderFactory;
pub use scene::SceneRoot;

pub fn crate_info() -> &'static str {
    "thingspace-render v0.1.0"
}
