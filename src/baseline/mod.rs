//! Baseline Engine (spec §4.2) — per-ID statistical profiles, open → frozen.

mod engine;
pub mod persistence;
mod types;

pub use engine::BaselineEngine;
pub use types::{ByteBehavior, IdBaseline};
