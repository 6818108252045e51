//! The concurrent command-dispatch core.
//!
//! Every mutation, query, and generation request against the shared world of
//! things flows through one coordination point (`Nexus`), decoupled from the
//! caller's thread and from the rendering and persistence collaborators.
//!
//! # Invariants
//! - FIFO order within each worker queue; no ordering across queues.
//! - The mutation worker is the store's single writer.
//! - Every submitted command's ticket reaches a terminal status.

pub mod command;
pub mod generate;
pub mod lifecycle;
mod nexus;
mod resolver;
pub mod ticket;

pub use command::{Command, CommandKind, GenerateOptions, Reply, RenderDiff, WorldObject};
pub use generate::{FlatGridSampler, SurfaceSampler, GRASS_CLASS, TREE_CLASS};
pub use lifecycle::Lifecycle;
pub use nexus::{CoreConfig, CoreError, Nexus};
pub use ticket::{Outcome, Status, Ticket};

pub fn crate_info() -> &'static str {
    "thingspace-core v0.1.0"
}
