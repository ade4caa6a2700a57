//! Core data structures for whittle
//!
//! This crate provides the fundamental types for triangle mesh simplification:
//! points, smooth meshes with explicit edge records, and named scalar
//! parameters attached to vertices, faces, or face corners.

pub mod error;
pub mod mesh;
pub mod point;

pub use error::*;
pub use mesh::*;
pub use point::*;

/// Re-export commonly used types from nalgebra
pub use nalgebra::{Point3, Vector3};

/// Common result type for whittle operations
pub type Result<T> = std::result::Result<T, Error>;
