use crate::ticket::Ticket;
use glam::Vec3;
use std::collections::HashSet;
use thingspace_common::{Spatial, ThingKey};
use thingspace_kernel::{SpriteInfo, Thing};

/// What a mutation command operates on: a fully-formed thing, or a bare
/// renderable. A bare spatial is attached to the world container but never
/// enters the store — it forfeits id-addressing, visibility diffing, and
/// persistence.
#[derive(Debug, Clone)]
pub enum WorldObject {
    Thing(Box<Thing>),
    Bare(Spatial),
}

/// Sampling parameters for environment generation.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerateOptions {
    pub width: u32,
    pub height: u32,
    /// Spacing between sample rays, in world units.
    pub density: f32,
    /// Name of the surface to cast against.
    pub surface: String,
}

/// The incremental diff of renderables that must be added to or removed from
/// the live scene since the last resolver pass. The resolver computes it;
/// callers apply it to the world container themselves.
#[derive(Debug, Clone, Default)]
pub struct RenderDiff {
    pub attach_spatials: HashSet<Spatial>,
    pub detach_spatials: HashSet<Spatial>,
    pub attach_sprites: HashSet<SpriteInfo>,
    pub detach_sprites: HashSet<SpriteInfo>,
}

impl RenderDiff {
    pub fn is_empty(&self) -> bool {
        self.attach_spatials.is_empty()
            && self.detach_spatials.is_empty()
            && self.attach_sprites.is_empty()
            && self.detach_sprites.is_empty()
    }
}

/// Reply payload, shaped by the originating command.
#[derive(Debug, Clone)]
pub enum Reply {
    None,
    Object(WorldObject),
    RenderSets(RenderDiff),
}

/// A request against the world of things. Each variant carries its own
/// strongly-typed fields; the shape contract is the type, not a convention.
#[derive(Debug, Clone)]
pub enum CommandKind {
    /// Add one thing (or bare spatial) to the world.
    AddThing { object: WorldObject },
    /// Add a batch, element-wise with the same rules as `AddThing`.
    AddThings { objects: Vec<WorldObject> },
    /// Delete a thing by id, or a bare spatial by name.
    DeleteThing { key: ThingKey },
    /// Delete a batch, element-wise with the same rules as `DeleteThing`.
    DeleteThings { keys: Vec<ThingKey> },
    /// Compute the attach/detach sets for rendering around a camera.
    ListToRender {
        eye: Vec3,
        render_distance: f32,
        /// Sprite/far rendering radius. Carried for API compatibility; the
        /// current distance test treats everything not near as far.
        far_distance: f32,
        previous_spatials: HashSet<Spatial>,
        previous_sprites: HashSet<SpriteInfo>,
    },
    /// Populate the environment by sampling spawn points on a surface.
    GenerateEnvironment { options: GenerateOptions },
}

impl CommandKind {
    pub fn name(&self) -> &'static str {
        match self {
            CommandKind::AddThing { .. } => "ADD_THING",
            CommandKind::AddThings { .. } => "ADD_THINGS",
            CommandKind::DeleteThing { .. } => "DELETE_THING",
            CommandKind::DeleteThings { .. } => "DELETE_THINGS",
            CommandKind::ListToRender { .. } => "GET_LIST_TO_RENDER",
            CommandKind::GenerateEnvironment { .. } => "GENERATE_ENVIRONMENT",
        }
    }
}

/// An enqueued request and its completion slot. Created once by the
/// submitter and never mutated after enqueue.
#[derive(Debug)]
pub struct Command {
    pub kind: CommandKind,
    pub ticket: Ticket,
}
