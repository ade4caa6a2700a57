//! Mesh simplification for whittle
//!
//! This crate reduces triangle mesh complexity by iterative edge collapse
//! (Ronfard-Rossignac), preserving manifold topology, respecting a per-edge
//! selection mask, and carrying smoothness and parameter attributes through
//! to the reduced mesh.

pub mod edge_collapse;
pub mod progress;

pub use edge_collapse::*;
pub use progress::*;

use whittle_core::{Result, SmoothMesh};

/// Simplify a mesh by reducing the number of faces/vertices
pub trait MeshSimplifier {
    /// Simplify `mesh`, collapsing edges for as long as the collapse error
    /// stays under `tolerance` (a worldspace distance bound; it is squared
    /// once internally).
    fn simplify(&self, mesh: &SmoothMesh, tolerance: f64) -> Result<SmoothMesh>;
}
