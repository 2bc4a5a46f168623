//! Nine-slice style scaling of 3D content.
//!
//! A [`SliceController`] rooted at a scene node stretches everything below
//! it to a target size while keeping the outer bands of the geometry at
//! their original proportions. Meshes and mesh colliders are sliced into
//! derived copies, box colliders are resized, and [modifiers](modifier)
//! drive node positions, scales and nested controllers.

pub mod component;
pub mod controller;
pub mod detail;
pub mod error;
pub mod geometry;
pub mod hash;
pub mod math;
pub mod modifier;
pub mod scene;
pub mod settings;
pub mod slicing;

#[cfg(test)]
mod fixtures;

pub use controller::{CycleOutcome, CyclePhase, SliceController};
pub use error::{Result, SlicerError};
pub use hash::ContentHash;
pub use settings::{SliceConfig, SlicerSettings};
