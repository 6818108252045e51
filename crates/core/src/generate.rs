use crate::command::{CommandKind, GenerateOptions, WorldObject};
use crate::ticket::{Status, Ticket};
use glam::Vec3;
use std::sync::atomic::{AtomicU64, Ordering};
use thingspace_common::{ClassId, ThingId};
use thingspace_kernel::Thing;

/// Behavioral family ids for generated flora.
pub const GRASS_CLASS: ClassId = ClassId(1);
pub const TREE_CLASS: ClassId = ClassId(2);

/// Ray-casting collaborator: produces candidate spawn points on a named
/// surface. The core never does terrain sampling itself.
pub trait SurfaceSampler: Send + Sync {
    fn cast(&self, options: &GenerateOptions) -> Vec<Vec3>;
}

/// Deterministic sampler over a flat plane — workaround for a real
/// terrain ray-caster. Walks a `width x height` area at `density` spacing
/// and reports every point at `ground_y`.
#[derive(Debug, Clone)]
pub struct FlatGridSampler {
    pub ground_y: f32,
}

impl SurfaceSampler for FlatGridSampler {
    fn cast(&self, options: &GenerateOptions) -> Vec<Vec3> {
        let step = options.density.max(0.1);
        let mut points = Vec::new();
        let mut x = 0.0;
        while x < options.width as f32 {
            let mut z = 0.0;
            while z < options.height as f32 {
                points.push(Vec3::new(x, self.ground_y, z));
                z += step;
            }
            x += step;
        }
        points
    }
}

/// Run one environment generation batch.
///
/// Candidate points at or below `min_spawn_height` are discarded. Every Nth
/// surviving point (N = `tree_threshold`) becomes a tree, the rest grass,
/// each with a fresh sequential id. New things re-enter the pipeline as
/// `AddThing` commands via `submit`, fire-and-forget: a failed enqueue is
/// logged and the batch continues. Returns (grass, trees) spawned.
pub(crate) fn generate<F>(
    options: &GenerateOptions,
    sampler: &dyn SurfaceSampler,
    next_id: &AtomicU64,
    tree_threshold: u32,
    min_spawn_height: f32,
    mut submit: F,
) -> (usize, usize)
where
    F: FnMut(CommandKind) -> Ticket,
{
    let points = sampler.cast(options);
    tracing::info!(
        surface = %options.surface,
        candidates = points.len(),
        "cast spawn candidates"
    );

    let mut index = 0u32;
    let mut grass = 0usize;
    let mut trees = 0usize;
    for point in points {
        if point.y <= min_spawn_height {
            continue;
        }
        index += 1;
        let id = ThingId(next_id.fetch_add(1, Ordering::Relaxed));
        let class = if index >= tree_threshold {
            index = 0;
            trees += 1;
            TREE_CLASS
        } else {
            grass += 1;
            GRASS_CLASS
        };

        let mut thing = Thing::new(id, class, 1);
        thing.initialize();
        thing.set_location(point);

        let ticket = submit(CommandKind::AddThing {
            object: WorldObject::Thing(Box::new(thing)),
        });
        if ticket.status() == Status::Failed {
            tracing::error!(%id, "spawn submission failed, continuing batch");
        }
    }

    tracing::info!(grass, trees, "environment generation batch done");
    (grass, trees)
}
