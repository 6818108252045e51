use glam::Vec3;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thingspace_common::{ClassId, Spatial, SpriteHandle, ThingId};

/// Renderable-object factory and lifecycle, owned by the rendering
/// collaborator. `render` builds a fresh representation for a thing;
/// `destroy` releases one that left the scene.
pub trait RenderFactory: Send + Sync {
    fn render(&self, thing: &Thing) -> Spatial;
    fn destroy(&self, spatial: Spatial);
}

/// Per-thing sprite descriptor for far-distance rendering.
///
/// The live sprite is created by the caller at attach time and destroyed at
/// detach time; `connected` tracks the current one. `render_state` records
/// which thing render-state the connected sprite was built against.
/// Equality and hashing use the owning thing id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpriteInfo {
    pub id: ThingId,
    pub render_state: u32,
    #[serde(skip)]
    pub connected: Option<SpriteHandle>,
}

impl SpriteInfo {
    pub fn new(id: ThingId) -> Self {
        Self {
            id,
            render_state: 0,
            connected: None,
        }
    }
}

impl PartialEq for SpriteInfo {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for SpriteInfo {}

impl std::hash::Hash for SpriteInfo {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

/// A versioned, located, typed world entity with custom key-value data.
///
/// `state` counts every modification affecting physical representation or
/// location, starting at 1. `render_state` records the state value as of the
/// last successful render; it starts at 0 so a fresh thing is stale by
/// construction and gets rendered on first use.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Thing {
    id: ThingId,
    class_id: ClassId,
    state: u32,
    render_state: u32,
    location: Vec3,
    /// Type tag within the class, from 1. 0 is treated as 1.
    kind: u8,
    /// How many types the class has, from 1.
    kind_range: u8,
    collision: bool,
    /// Maximum distance at which external actors may affect this thing.
    interaction_radius: f32,
    data: HashMap<String, serde_json::Value>,
    initialized: bool,
    compressed: bool,
    #[serde(skip)]
    rendered: Option<Spatial>,
    sprite: Option<SpriteInfo>,
}

impl Thing {
    pub fn new(id: ThingId, class_id: ClassId, kind: u8) -> Self {
        Self {
            id,
            class_id,
            state: 1,
            render_state: 0,
            location: Vec3::ZERO,
            kind,
            kind_range: 1,
            collision: false,
            interaction_radius: 0.0,
            data: HashMap::new(),
            initialized: false,
            compressed: false,
            rendered: None,
            sprite: None,
        }
    }

    pub fn id(&self) -> ThingId {
        self.id
    }

    pub fn class_id(&self) -> ClassId {
        self.class_id
    }

    pub fn state(&self) -> u32 {
        self.state
    }

    pub fn render_state(&self) -> u32 {
        self.render_state
    }

    pub fn location(&self) -> Vec3 {
        self.location
    }

    pub fn kind(&self) -> u8 {
        self.kind.max(1)
    }

    pub fn kind_range(&self) -> u8 {
        self.kind_range.max(1)
    }

    pub fn set_kind_range(&mut self, range: u8) {
        self.kind_range = range;
    }

    pub fn has_collision(&self) -> bool {
        self.collision
    }

    pub fn set_collision(&mut self, collision: bool) {
        self.collision = collision;
    }

    pub fn interaction_radius(&self) -> f32 {
        self.interaction_radius
    }

    pub fn set_interaction_radius(&mut self, radius: f32) {
        self.interaction_radius = radius;
    }

    /// Mark this thing ready for use. Asset-dependent setup belongs here in
    /// richer classes; the base model only flips the flag.
    pub fn initialize(&mut self) {
        self.initialized = true;
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Move the thing. Counts as a physical modification, so the state bumps.
    pub fn set_location(&mut self, location: Vec3) {
        self.location = location;
        self.bump_state();
    }

    /// Record a modification affecting physical representation or location.
    pub fn bump_state(&mut self) {
        self.state += 1;
    }

    /// Custom data lookup by key.
    pub fn data(&self, key: &str) -> Option<&serde_json::Value> {
        self.data.get(key)
    }

    pub fn set_data(&mut self, key: impl Into<String>, value: serde_json::Value) {
        self.data.insert(key.into(), value);
    }

    /// The cached rendered representation, if any. Only valid while
    /// `render_state == state`.
    pub fn rendered(&self) -> Option<&Spatial> {
        self.rendered.as_ref()
    }

    /// Whether the cached representation needs a rebuild before use.
    pub fn is_stale(&self) -> bool {
        self.rendered.is_none() || self.render_state != self.state
    }

    /// Build a fresh rendered representation, replacing (and destroying) any
    /// prior one, and stamp `render_state` to the current state.
    pub fn render(&mut self, factory: &dyn RenderFactory) {
        if let Some(old) = self.rendered.take() {
            factory.destroy(old);
        }
        let fresh = factory.render(self);
        tracing::debug!(id = %self.id, state = self.state, "rendered thing");
        self.rendered = Some(fresh);
        self.render_state = self.state;
    }

    /// Release the rendered representation without compressing the thing.
    pub fn destroy_rendered(&mut self, factory: &dyn RenderFactory) {
        if let Some(old) = self.rendered.take() {
            factory.destroy(old);
        }
    }

    /// Take the rendered representation out of the thing, leaving it stale.
    pub fn take_rendered(&mut self) -> Option<Spatial> {
        self.rendered.take()
    }

    /// Enable far-distance sprite rendering for this thing.
    pub fn enable_sprite(&mut self) {
        if self.sprite.is_none() {
            self.sprite = Some(SpriteInfo::new(self.id));
        }
    }

    pub fn supports_sprite(&self) -> bool {
        self.sprite.is_some()
    }

    pub fn sprite(&self) -> Option<&SpriteInfo> {
        self.sprite.as_ref()
    }

    pub fn sprite_mut(&mut self) -> Option<&mut SpriteInfo> {
        self.sprite.as_mut()
    }

    /// Discard rendered and derivable data to save memory. The thing must be
    /// recreated before it is used again.
    pub fn compress(&mut self) {
        self.rendered = None;
        if let Some(sprite) = self.sprite.as_mut() {
            sprite.connected = None;
            sprite.render_state = 0;
        }
        self.compressed = true;
        self.initialized = false;
    }

    /// Reverse compression. The representation itself is rebuilt lazily on
    /// the next render.
    pub fn recreate(&mut self) {
        self.compressed = false;
        self.initialized = true;
    }

    pub fn is_compressed(&self) -> bool {
        self.compressed
    }
}
