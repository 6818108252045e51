//! Persistence: durable key-value backing for the thing store.
//!
//! # Invariants
//! - Saved generations are content-addressed and verifiable.
//! - Schema version mismatches are fail-closed on open.
//! - Loading never observes a partially written generation (write-then-manifest).

mod db;

pub use db::{DbError, ThingDb};

pub fn crate_info() -> &'static str {
    "thingspace-persist v0.1.0"
}
