//! Smooth-mesh data structures and functionality

use crate::point::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A mesh vertex with a smoothness weight used by subdivision/smoothing schemes
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MeshVertex {
    pub position: Point3d,
    /// Smoothness weight in `[0, 1]`; 1.0 is fully smooth
    pub smoothness: f32,
}

impl MeshVertex {
    pub fn new(position: Point3d) -> Self {
        Self {
            position,
            smoothness: 1.0,
        }
    }

    pub fn with_smoothness(position: Point3d, smoothness: f32) -> Self {
        Self {
            position,
            smoothness,
        }
    }
}

/// An undirected mesh edge between two vertices
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MeshEdge {
    pub v1: usize,
    pub v2: usize,
    /// Smoothness weight in `[0, 1]`; 0.0 is a hard crease
    pub smoothness: f32,
}

impl MeshEdge {
    pub fn new(v1: usize, v2: usize) -> Self {
        Self {
            v1,
            v2,
            smoothness: 1.0,
        }
    }

    /// Whether this edge joins the given vertex pair, in either order
    pub fn joins(&self, a: usize, b: usize) -> bool {
        (self.v1 == a && self.v2 == b) || (self.v1 == b && self.v2 == a)
    }
}

/// A triangle face: three vertex indices plus the indices of its three edges.
///
/// `e1` joins `v1`–`v2`, `e2` joins `v2`–`v3`, `e3` joins `v3`–`v1`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MeshFace {
    pub v1: usize,
    pub v2: usize,
    pub v3: usize,
    pub e1: usize,
    pub e2: usize,
    pub e3: usize,
}

impl MeshFace {
    pub fn vertices(&self) -> [usize; 3] {
        [self.v1, self.v2, self.v3]
    }

    pub fn edges(&self) -> [usize; 3] {
        [self.e1, self.e2, self.e3]
    }
}

/// How a scalar parameter is attached to the mesh
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ParameterValues {
    /// One value per vertex
    PerVertex(Vec<f64>),
    /// One value per face
    PerFace(Vec<f64>),
    /// One value per face corner, in `v1, v2, v3` order
    PerFaceVertex(Vec<[f64; 3]>),
}

/// A named scalar parameter attached to vertices, faces, or face corners
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeshParameter {
    pub name: String,
    pub values: ParameterValues,
}

impl MeshParameter {
    pub fn new(name: impl Into<String>, values: ParameterValues) -> Self {
        Self {
            name: name.into(),
            values,
        }
    }
}

/// A triangle mesh with explicit edge records, per-vertex/edge smoothness,
/// and optional named scalar parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SmoothMesh {
    pub vertices: Vec<MeshVertex>,
    pub edges: Vec<MeshEdge>,
    pub faces: Vec<MeshFace>,
    pub parameters: Vec<MeshParameter>,
}

impl SmoothMesh {
    /// Create a new empty mesh
    pub fn new() -> Self {
        Self {
            vertices: Vec::new(),
            edges: Vec::new(),
            faces: Vec::new(),
            parameters: Vec::new(),
        }
    }

    /// Create a mesh from vertex positions and face index triples.
    ///
    /// The edge list and per-face edge indices are derived: each unordered
    /// vertex pair appearing in a face becomes exactly one edge. All
    /// smoothness weights default to 1.0.
    pub fn from_vertices_and_faces(positions: Vec<Point3d>, triples: Vec<[usize; 3]>) -> Self {
        let vertices = positions.into_iter().map(MeshVertex::new).collect();

        let mut edges: Vec<MeshEdge> = Vec::new();
        let mut edge_map: HashMap<(usize, usize), usize> = HashMap::with_capacity(triples.len() * 3);
        let mut edge_of = |a: usize, b: usize, edges: &mut Vec<MeshEdge>| -> usize {
            let key = (a.min(b), a.max(b));
            *edge_map.entry(key).or_insert_with(|| {
                edges.push(MeshEdge::new(a, b));
                edges.len() - 1
            })
        };

        let mut faces = Vec::with_capacity(triples.len());
        for [a, b, c] in triples {
            let e1 = edge_of(a, b, &mut edges);
            let e2 = edge_of(b, c, &mut edges);
            let e3 = edge_of(c, a, &mut edges);
            faces.push(MeshFace {
                v1: a,
                v2: b,
                v3: c,
                e1,
                e2,
                e3,
            });
        }

        Self {
            vertices,
            edges,
            faces,
            parameters: Vec::new(),
        }
    }

    /// Get the number of vertices
    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    /// Get the number of edges
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Get the number of faces
    pub fn face_count(&self) -> usize {
        self.faces.len()
    }

    /// Check if the mesh is empty
    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty() || self.faces.is_empty()
    }

    /// Find the edge joining a vertex pair, in either order
    pub fn find_edge(&self, a: usize, b: usize) -> Option<usize> {
        self.edges.iter().position(|e| e.joins(a, b))
    }

    /// Attach a named scalar parameter
    pub fn add_parameter(&mut self, parameter: MeshParameter) {
        self.parameters.push(parameter);
    }

    /// Look up a parameter by name
    pub fn parameter(&self, name: &str) -> Option<&MeshParameter> {
        self.parameters.iter().find(|p| p.name == name)
    }

    /// Face index triples without edge information
    pub fn face_triples(&self) -> Vec<[usize; 3]> {
        self.faces.iter().map(|f| f.vertices()).collect()
    }
}

impl Default for SmoothMesh {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Point3;

    fn quad_mesh() -> SmoothMesh {
        SmoothMesh::from_vertices_and_faces(
            vec![
                Point3::new(0.0, 0.0, 0.0),
                Point3::new(1.0, 0.0, 0.0),
                Point3::new(1.0, 1.0, 0.0),
                Point3::new(0.0, 1.0, 0.0),
            ],
            vec![[0, 1, 2], [0, 2, 3]],
        )
    }

    #[test]
    fn test_edge_derivation() {
        let mesh = quad_mesh();
        assert_eq!(mesh.vertex_count(), 4);
        assert_eq!(mesh.face_count(), 2);
        // 4 boundary edges + 1 shared diagonal
        assert_eq!(mesh.edge_count(), 5);

        // The diagonal is shared, not duplicated
        let diag = mesh.find_edge(0, 2).unwrap();
        assert_eq!(mesh.faces[0].e3, diag);
        assert_eq!(mesh.faces[1].e1, diag);
    }

    #[test]
    fn test_face_edge_pairing() {
        let mesh = quad_mesh();
        for face in &mesh.faces {
            assert!(mesh.edges[face.e1].joins(face.v1, face.v2));
            assert!(mesh.edges[face.e2].joins(face.v2, face.v3));
            assert!(mesh.edges[face.e3].joins(face.v3, face.v1));
        }
    }

    #[test]
    fn test_default_smoothness() {
        let mesh = quad_mesh();
        assert!(mesh.vertices.iter().all(|v| v.smoothness == 1.0));
        assert!(mesh.edges.iter().all(|e| e.smoothness == 1.0));
    }

    #[test]
    fn test_empty_mesh() {
        let mesh = SmoothMesh::new();
        assert!(mesh.is_empty());
        assert_eq!(mesh.edge_count(), 0);
    }

    #[test]
    fn test_parameter_lookup() {
        let mut mesh = quad_mesh();
        mesh.add_parameter(MeshParameter::new(
            "weight",
            ParameterValues::PerVertex(vec![0.0, 1.0, 2.0, 3.0]),
        ));
        let p = mesh.parameter("weight").unwrap();
        match &p.values {
            ParameterValues::PerVertex(v) => assert_eq!(v.len(), 4),
            _ => panic!("expected per-vertex values"),
        }
        assert!(mesh.parameter("missing").is_none());
    }
}
