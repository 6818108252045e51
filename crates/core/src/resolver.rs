use crate::command::RenderDiff;
use glam::Vec3;
use std::collections::HashSet;
use thingspace_common::Spatial;
use thingspace_kernel::{RenderFactory, SpriteInfo, ThingStore};

/// Working sets kept across resolver passes. Cleared, never reallocated —
/// a performance detail, not an observable contract.
#[derive(Debug, Default)]
pub(crate) struct ResolverScratch {
    to_render: HashSet<Spatial>,
    sprite_render: HashSet<SpriteInfo>,
}

/// One visibility pass over the full current thing set.
///
/// Things nearer than `render_distance` get full spatial representations,
/// reused when `render_state == state` and rebuilt otherwise. Everything
/// else is far; far sprite-capable things get the sprite reuse/rebuild
/// treatment. A sprite's lifecycle ties creation and destruction to attach
/// and detach, so a state change while in sprite form yields a
/// detach-then-attach pair rather than an in-place update.
///
/// `far_distance` is accepted for API compatibility but does not participate
/// in the distance test: "not near" is uniformly far.
pub(crate) fn resolve(
    store: &ThingStore,
    factory: &dyn RenderFactory,
    scratch: &mut ResolverScratch,
    eye: Vec3,
    render_distance: f32,
    _far_distance: f32,
    previous_spatials: &HashSet<Spatial>,
    previous_sprites: &HashSet<SpriteInfo>,
) -> RenderDiff {
    scratch.to_render.clear();
    scratch.sprite_render.clear();
    let mut diff = RenderDiff::default();

    {
        let mut things = store.write();
        for thing in things.values_mut() {
            if thing.location().distance(eye) < render_distance {
                if thing.is_stale() {
                    thing.render(factory);
                }
                if let Some(spatial) = thing.rendered() {
                    scratch.to_render.insert(spatial.clone());
                }
            } else if thing.supports_sprite() {
                let render_state = thing.render_state();
                if let Some(sprite) = thing.sprite_mut() {
                    if sprite.render_state == render_state && sprite.connected.is_some() {
                        // live sprite is current, nothing to do
                    } else if sprite.connected.is_none() {
                        diff.attach_sprites.insert(sprite.clone());
                    } else {
                        // state changed while in sprite form: recreate
                        diff.detach_sprites.insert(sprite.clone());
                        sprite.render_state = render_state;
                        diff.attach_sprites.insert(sprite.clone());
                    }
                    scratch.sprite_render.insert(sprite.clone());
                }
            }
        }
    }

    // Set difference both ways against the caller's previous sets. Sprites
    // are asymmetric: the attach set is not previous-filtered, so a rebuilt
    // sprite appears in both attach and detach.
    for spatial in previous_spatials {
        if !scratch.to_render.contains(spatial) {
            diff.detach_spatials.insert(spatial.clone());
        }
    }
    for spatial in &scratch.to_render {
        if !previous_spatials.contains(spatial) {
            diff.attach_spatials.insert(spatial.clone());
        }
    }
    for sprite in previous_sprites {
        if !scratch.sprite_render.contains(sprite) {
            diff.detach_sprites.insert(sprite.clone());
        }
    }

    tracing::debug!(
        attach = diff.attach_spatials.len(),
        detach = diff.detach_spatials.len(),
        attach_sprites = diff.attach_sprites.len(),
        detach_sprites = diff.detach_sprites.len(),
        "visibility pass complete"
    );
    diff
}
