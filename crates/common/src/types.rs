use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Unique identifier for a thing in the world. Stable for the thing's lifetime.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
pub struct ThingId(pub u64);

impl fmt::Display for ThingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "thing:{}", self.0)
    }
}

/// Identifies the behavioral family a thing belongs to (grass, tree, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct ClassId(pub u32);

/// Deletion key: things are addressed by id, bare spatials by name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ThingKey {
    Id(ThingId),
    Name(String),
}

/// Process-wide counter for render handle values. Never reused.
static NEXT_HANDLE: AtomicU64 = AtomicU64::new(1);

fn next_handle() -> u64 {
    NEXT_HANDLE.fetch_add(1, Ordering::Relaxed)
}

/// Cheap, cloneable handle to a rendered representation living in the
/// rendering collaborator. Equality and hashing use the handle value only,
/// so two renders of the same thing produce distinct handles.
#[derive(Debug, Clone)]
pub struct Spatial {
    handle: u64,
    name: String,
}

impl Spatial {
    /// Allocate a fresh handle with the given display name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            handle: next_handle(),
            name: name.into(),
        }
    }

    pub fn handle(&self) -> u64 {
        self.handle
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl PartialEq for Spatial {
    fn eq(&self, other: &Self) -> bool {
        self.handle == other.handle
    }
}

impl Eq for Spatial {}

impl std::hash::Hash for Spatial {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.handle.hash(state);
    }
}

/// Handle to a live far-distance sprite. Sprites are created at attach time
/// and destroyed at detach time, so a handle never outlives one attach cycle.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SpriteHandle(u64);

impl SpriteHandle {
    pub fn new() -> Self {
        Self(next_handle())
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

impl Default for SpriteHandle {
    fn default() -> Self {
        Self::new()
    }
}
