use crate::thing::Thing;
use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use thingspace_common::{SpriteHandle, ThingId};

/// Authoritative mapping from id to thing.
///
/// Single-writer, many-reader: all inserts and removals belong to the
/// mutation worker; the visibility resolver and generator read concurrently.
/// There is no read snapshot — a reader pass may observe a store mid-update.
#[derive(Debug, Default)]
pub struct ThingStore {
    inner: RwLock<HashMap<ThingId, Thing>>,
}

impl ThingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a thing keyed by its id. Returns the replaced thing, if any.
    pub fn insert(&self, thing: Thing) -> Option<Thing> {
        let replaced = self.write().insert(thing.id(), thing);
        if let Some(old) = &replaced {
            tracing::warn!(id = %old.id(), "replaced existing thing in store");
        }
        replaced
    }

    /// Remove a thing by id.
    pub fn remove(&self, id: ThingId) -> Option<Thing> {
        self.write().remove(&id)
    }

    /// Cloned view of a single thing.
    pub fn get(&self, id: ThingId) -> Option<Thing> {
        self.read().get(&id).cloned()
    }

    pub fn contains(&self, id: ThingId) -> bool {
        self.read().contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    pub fn ids(&self) -> Vec<ThingId> {
        self.read().keys().copied().collect()
    }

    /// Record the live sprite connection for a thing, stamping the sprite
    /// against the thing's current render-state. Used by callers applying a
    /// resolver diff after attaching a sprite. Returns false if the thing is
    /// missing or sprite-incapable.
    pub fn connect_sprite(&self, id: ThingId, handle: Option<SpriteHandle>) -> bool {
        let mut guard = self.write();
        let Some(thing) = guard.get_mut(&id) else {
            return false;
        };
        let render_state = thing.render_state();
        match thing.sprite_mut() {
            Some(sprite) => {
                sprite.connected = handle;
                sprite.render_state = render_state;
                true
            }
            None => false,
        }
    }

    /// Cloned copy of the whole map, for persistence.
    pub fn snapshot(&self) -> HashMap<ThingId, Thing> {
        self.read().clone()
    }

    /// Replace the store contents, for restore on startup.
    pub fn load(&self, things: HashMap<ThingId, Thing>) {
        *self.write() = things;
    }

    /// Shared read guard over the underlying map for whole-store passes.
    pub fn read(&self) -> RwLockReadGuard<'_, HashMap<ThingId, Thing>> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    /// Exclusive write guard. Mutating through this guard is reserved for the
    /// single writer and the resolver's render-state bookkeeping.
    pub fn write(&self) -> RwLockWriteGuard<'_, HashMap<ThingId, Thing>> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }
}
