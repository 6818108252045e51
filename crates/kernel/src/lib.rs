//! Thing kernel: the versioned entity model and the authoritative store.
//!
//! # Invariants
//! - `render_state == state` implies the cached rendered representation (if
//!   any) is valid; divergence forces a rebuild before reuse.
//! - A compressed thing must be recreated before storage or rendering.
//! - The store is single-writer, many-reader; writes are owned by one worker.

pub mod store;
pub mod thing;

pub use store::ThingStore;
pub use thing::{RenderFactory, SpriteInfo, Thing};
