//! Shared types and handles for the thingspace engine.
//!
//! # Invariants
//! - Identifiers are stable for the lifetime of the thing they name.
//! - Handles compare by handle value only; display names are advisory.

pub mod types;

pub use types::{ClassId, Spatial, SpriteHandle, ThingId, ThingKey};
