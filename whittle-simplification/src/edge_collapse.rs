//! Edge collapse simplification
//!
//! Implements Ronfard-Rossignac edge collapse decimation: per-vertex
//! constraint-plane tracking for geometric error, local tessellation error
//! from face-normal deviation, and topology-safety checks that keep the
//! mesh a 2-manifold (with boundary) across every collapse.
//!
//! Collapses are applied in increasing cost order until the cheapest
//! remaining collapse exceeds the caller's tolerance. The scratch topology
//! (vertex stars/crowns, edge/face cross-references, plane lists) is built
//! once per run, mutated in place, and converted back into a flat mesh.

use crate::progress::{ProgressThrottle, SimplifyMonitor};
use crate::MeshSimplifier;
use std::collections::HashMap;
use std::time::Duration;
use whittle_core::{
    Error, MeshParameter, ParameterValues, Point3d, Result, SmoothMesh, Vector3d,
};

const INVALID: usize = usize::MAX;

/// Cached-cost sentinel: the edge must be re-evaluated before the next
/// selection pass.
const DIRTY: f64 = -1.0;

// ============================================================
// Constraint Planes
// ============================================================

/// A plane `a*x + b*y + c*z + d = 0` constraining where a merged vertex may
/// sit without incurring error: derived from an incident face's normal, or
/// for boundary edges from an edge-perpendicular "fence" plane.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Plane {
    a: f64,
    b: f64,
    c: f64,
    d: f64,
}

impl Plane {
    fn from_normal_and_point(n: &Vector3d, p: &Point3d) -> Self {
        Self {
            a: n.x,
            b: n.y,
            c: n.z,
            d: -n.dot(&p.coords),
        }
    }

    /// Signed residual of the plane equation at `p`
    fn eval(&self, p: &Point3d) -> f64 {
        self.a * p.x + self.b * p.y + self.c * p.z + self.d
    }
}

/// Unit normal of triangle (a, b, c). Zero-area triangles fall back to
/// `(1, 1, 1)`: a constraint that never evaluates to zero, so degenerate
/// faces cannot collapse away cost-free and no NaN propagates.
fn find_normal(a: &Point3d, b: &Point3d, c: &Point3d) -> Vector3d {
    let n = (b - a).cross(&(c - a));
    let len = n.norm();
    if len > f64::EPSILON && len.is_finite() {
        n / len
    } else {
        Vector3d::new(1.0, 1.0, 1.0)
    }
}

// ============================================================
// Scratch Topology
// ============================================================

#[derive(Debug)]
struct VertexInfo {
    position: Point3d,
    smoothness: f32,
    /// Backing index into the input mesh's vertex list
    orig: usize,
    /// Edge ids currently incident to this vertex
    star: Vec<usize>,
    /// Face ids currently incident to this vertex
    crown: Vec<usize>,
    /// Accumulated constraint planes; merges concatenate with de-duplication
    planes: Vec<Plane>,
}

#[derive(Debug, Clone, Copy)]
struct EdgeRec {
    /// Surviving endpoint of the preferred collapse direction
    v1: usize,
    /// Absorbed endpoint
    v2: usize,
    f1: usize,
    /// INVALID on a boundary edge
    f2: usize,
    smoothness: f32,
    cost: f64,
    /// From the caller's selection mask; unselected edges never collapse
    collapsible: bool,
    alive: bool,
}

#[derive(Debug, Clone)]
struct FaceRec {
    v: [usize; 3],
    e: [usize; 3],
    /// Position in the live compacted face order
    index: usize,
    /// Index into the input mesh's face list, for parameter remapping
    orig: usize,
    normal: Vector3d,
    alive: bool,
}

/// Union-find over vertex identities. A collapse unions the absorbed vertex
/// into the survivor; the rebuilder follows each input vertex to its
/// canonical representative in amortized O(1).
#[derive(Debug)]
struct VertexMerge {
    parent: Vec<usize>,
}

impl VertexMerge {
    fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
        }
    }

    fn find(&mut self, mut v: usize) -> usize {
        while self.parent[v] != v {
            self.parent[v] = self.parent[self.parent[v]];
            v = self.parent[v];
        }
        v
    }

    fn union_into(&mut self, absorbed: usize, survivor: usize) {
        let a = self.find(absorbed);
        let s = self.find(survivor);
        if a != s {
            self.parent[a] = s;
        }
    }
}

fn remove_item(list: &mut Vec<usize>, item: usize) {
    if let Some(pos) = list.iter().position(|&x| x == item) {
        list.swap_remove(pos);
    }
}

struct Topology {
    verts: Vec<VertexInfo>,
    edges: Vec<EdgeRec>,
    faces: Vec<FaceRec>,
    merge: VertexMerge,
    /// Live face ids, compacted by swap-with-last on removal
    face_order: Vec<usize>,
    /// Edge processing order: the prefix before the cursor is consumed,
    /// the front of the remainder always holds the cheapest edge
    order: Vec<usize>,
    /// Edge id -> position in `order`
    order_pos: Vec<usize>,
    /// Squared caller tolerance; also the guaranteed-rejection cost
    tol: f64,
}

impl Topology {
    fn build(mesh: &SmoothMesh, selection: Option<&[bool]>, tol: f64) -> Self {
        let nv = mesh.vertex_count();

        // Pre-count degrees so every star/crown allocates exactly once
        let mut edge_degree = vec![0usize; nv];
        let mut face_degree = vec![0usize; nv];
        for e in &mesh.edges {
            edge_degree[e.v1] += 1;
            edge_degree[e.v2] += 1;
        }
        for f in &mesh.faces {
            for v in f.vertices() {
                face_degree[v] += 1;
            }
        }

        let mut verts: Vec<VertexInfo> = mesh
            .vertices
            .iter()
            .enumerate()
            .map(|(i, v)| VertexInfo {
                position: v.position,
                smoothness: v.smoothness,
                orig: i,
                star: Vec::with_capacity(edge_degree[i]),
                crown: Vec::with_capacity(face_degree[i]),
                planes: Vec::with_capacity(face_degree[i] + 2),
            })
            .collect();

        let mut edges: Vec<EdgeRec> = mesh
            .edges
            .iter()
            .enumerate()
            .map(|(i, e)| EdgeRec {
                v1: e.v1,
                v2: e.v2,
                f1: INVALID,
                f2: INVALID,
                smoothness: e.smoothness,
                cost: DIRTY,
                collapsible: selection.map_or(true, |s| s[i]),
                alive: true,
            })
            .collect();
        for (i, e) in mesh.edges.iter().enumerate() {
            verts[e.v1].star.push(i);
            verts[e.v2].star.push(i);
        }

        let mut faces: Vec<FaceRec> = Vec::with_capacity(mesh.face_count());
        for (i, f) in mesh.faces.iter().enumerate() {
            let normal = find_normal(
                &verts[f.v1].position,
                &verts[f.v2].position,
                &verts[f.v3].position,
            );
            let plane = Plane::from_normal_and_point(&normal, &verts[f.v1].position);
            for v in f.vertices() {
                verts[v].crown.push(i);
                verts[v].planes.push(plane);
            }
            for e in f.edges() {
                let rec = &mut edges[e];
                if rec.f1 == INVALID {
                    rec.f1 = i;
                } else {
                    rec.f2 = i;
                }
            }
            faces.push(FaceRec {
                v: f.vertices(),
                e: f.edges(),
                index: i,
                orig: i,
                normal,
                alive: true,
            });
        }

        // Boundary edges have no second face to constrain them: fence both
        // endpoints with a plane perpendicular to the adjacent face, so
        // boundary vertices cannot drift inward without penalty.
        for i in 0..edges.len() {
            if edges[i].f2 != INVALID || edges[i].f1 == INVALID {
                continue;
            }
            let (a, b) = (edges[i].v1, edges[i].v2);
            let dir = verts[b].position - verts[a].position;
            let mut fence = dir.cross(&faces[edges[i].f1].normal);
            let len = fence.norm();
            if len > f64::EPSILON && len.is_finite() {
                fence /= len;
            } else {
                fence = Vector3d::new(1.0, 1.0, 1.0);
            }
            let plane = Plane::from_normal_and_point(&fence, &verts[a].position);
            verts[a].planes.push(plane);
            verts[b].planes.push(plane);
        }

        let order: Vec<usize> = (0..edges.len()).collect();
        let order_pos = order.clone();
        let face_order: Vec<usize> = (0..faces.len()).collect();

        let mut top = Self {
            verts,
            edges,
            faces,
            merge: VertexMerge::new(nv),
            face_order,
            order,
            order_pos,
            tol,
        };
        for ei in 0..top.edges.len() {
            top.update_cost(ei);
        }
        if !top.order.is_empty() {
            top.select_min_to_front(0);
        }
        top
    }

    // ============================================================
    // Cost Function
    // ============================================================

    /// Cost of collapsing edge `ei` so that `lose` merges onto `keep`'s
    /// position. Pure: nothing is mutated by evaluating a direction.
    ///
    /// Returns at most `tol`; `tol` itself is a guaranteed-rejection
    /// signal, not a real cost.
    fn collapse_cost(&self, keep: usize, lose: usize, ei: usize) -> f64 {
        let e = &self.edges[ei];
        if !e.collapsible {
            return self.tol;
        }
        let tol = self.tol;
        let new_pos = self.verts[keep].position;
        let mut worst = 0.0f64;

        // Local tessellation error: how far every surviving face around the
        // absorbed vertex would tilt if its corner moved to the new position
        for &fi in &self.verts[lose].crown {
            if fi == e.f1 || fi == e.f2 {
                continue;
            }
            let f = &self.faces[fi];
            let corner = |v: usize| -> Point3d {
                if v == lose {
                    new_pos
                } else {
                    self.verts[v].position
                }
            };
            let (a, b, c) = (corner(f.v[0]), corner(f.v[1]), corner(f.v[2]));
            let cross = (b - a).cross(&(c - a));
            // NaN when the moved triangle becomes degenerate
            let new_normal = cross / cross.norm();
            let deviation = tol * (1.0 - new_normal.dot(&f.normal));
            if !deviation.is_finite() || deviation >= tol {
                return tol;
            }
            if deviation > worst {
                worst = deviation;
            }
        }

        // Local geometric error: squared residual of the absorbed vertex's
        // accumulated constraint planes at the merged position
        for plane in &self.verts[lose].planes {
            let r = plane.eval(&new_pos);
            let r2 = r * r;
            if !r2.is_finite() || r2 >= tol {
                return tol;
            }
            if r2 > worst {
                worst = r2;
            }
        }

        worst
    }

    /// Evaluate both collapse directions for edge `ei`, store the cheaper
    /// cost, and flip the stored endpoints so `v1` is always the surviving
    /// identity. Costs still under tolerance must additionally pass the
    /// topology-safety checks.
    fn update_cost(&mut self, ei: usize) {
        let (v1, v2) = (self.edges[ei].v1, self.edges[ei].v2);
        let forward = self.collapse_cost(v1, v2, ei);
        let backward = self.collapse_cost(v2, v1, ei);
        let mut cost = forward;
        if backward < forward {
            cost = backward;
            let e = &mut self.edges[ei];
            std::mem::swap(&mut e.v1, &mut e.v2);
        }
        if cost < self.tol && self.collapse_breaks_topology(ei) {
            cost = self.tol;
        }
        self.edges[ei].cost = cost;
    }

    fn is_boundary_vertex(&self, v: usize) -> bool {
        self.verts[v].star.iter().any(|&ei| self.edges[ei].f2 == INVALID)
    }

    fn far_vertex(&self, fi: usize, a: usize, b: usize) -> usize {
        self.faces[fi]
            .v
            .iter()
            .copied()
            .find(|&v| v != a && v != b)
            .unwrap_or(INVALID)
    }

    /// Every accepted collapse must preserve a 2-manifold (with boundary).
    fn collapse_breaks_topology(&self, ei: usize) -> bool {
        let e = self.edges[ei];

        // Dangling-edge check: a dying face whose two side edges are both
        // boundary would leave the merged side edge with no face at all
        for fi in [e.f1, e.f2] {
            if fi == INVALID {
                continue;
            }
            let dangling = self.faces[fi]
                .e
                .iter()
                .filter(|&&s| s != ei)
                .all(|&s| self.edges[s].f2 == INVALID);
            if dangling {
                return true;
            }
        }

        if e.f1 == INVALID {
            return false;
        }
        let apex1 = self.far_vertex(e.f1, e.v1, e.v2);
        let apex2 = if e.f2 != INVALID {
            self.far_vertex(e.f2, e.v1, e.v2)
        } else {
            INVALID
        };

        // The edge's two faces sharing one apex means the mesh is down to a
        // closed two-face sheet along this edge, and collapsing would delete
        // the component outright
        if e.f2 != INVALID && apex1 == apex2 {
            return true;
        }

        // Link condition: the endpoints' common neighbors must be exactly
        // the apices of the edge's faces. Any extra common neighbor would
        // leave a doubled edge between the merged vertex and that neighbor.
        for &se in &self.verts[e.v1].star {
            let s = &self.edges[se];
            let o = if s.v1 == e.v1 { s.v2 } else { s.v1 };
            if o == e.v2 || o == apex1 || o == apex2 {
                continue;
            }
            let shared = self.verts[e.v2].star.iter().any(|&se2| {
                let s2 = &self.edges[se2];
                s2.v1 == o || s2.v2 == o
            });
            if shared {
                return true;
            }
        }

        if e.f2 == INVALID {
            return false;
        }

        // Non-manifold check: collapsing an interior edge whose endpoints
        // both sit on boundary loops would fuse two boundaries at one vertex
        self.is_boundary_vertex(e.v1) && self.is_boundary_vertex(e.v2)
    }

    // ============================================================
    // Collapse
    // ============================================================

    /// Collapse edge `ei`, merging its `v2` endpoint into `v1`. The survivor
    /// keeps its own position; never a midpoint.
    ///
    /// Returns the edge ids consumed: the collapsed edge plus one redundant
    /// side edge per deleted face (2 total on a boundary edge, 3 interior).
    fn collapse(&mut self, ei: usize) -> Vec<usize> {
        let (v1, v2) = (self.edges[ei].v1, self.edges[ei].v2);

        // Mark the two-hop neighborhood cost-dirty. Any edge sharing a
        // vertex with an edge of either star can have its error metric
        // changed by the merge; marking only the two stars is not enough.
        let mut touched: Vec<usize> = Vec::new();
        for &se in self.verts[v1].star.iter().chain(self.verts[v2].star.iter()) {
            touched.push(self.edges[se].v1);
            touched.push(self.edges[se].v2);
        }
        {
            let (verts, edges) = (&self.verts, &mut self.edges);
            for &tv in &touched {
                for &te in &verts[tv].star {
                    edges[te].cost = DIRTY;
                }
            }
        }

        let mut consumed = vec![ei];
        let dying = [self.edges[ei].f1, self.edges[ei].f2];
        for fi in dying {
            if fi == INVALID {
                continue;
            }
            // Of the dying triangle's two side edges, the one touching the
            // absorbed vertex is redundant after the merge; the other
            // replaces it.
            let mut keep_side = INVALID;
            let mut dead_side = INVALID;
            for &se in &self.faces[fi].e {
                if se == ei {
                    continue;
                }
                if self.edges[se].v1 == v2 || self.edges[se].v2 == v2 {
                    dead_side = se;
                } else {
                    keep_side = se;
                }
            }
            let ds = self.edges[dead_side];
            let far = if ds.v1 == v2 { ds.v2 } else { ds.v1 };
            let other = if ds.f1 == fi { ds.f2 } else { ds.f1 };

            // Redirect the redundant edge's other face onto the replacement
            self.replace_face_ref(keep_side, fi, other);
            if other != INVALID {
                for e in self.faces[other].e.iter_mut() {
                    if *e == dead_side {
                        *e = keep_side;
                    }
                }
            }
            let rec = &mut self.edges[keep_side];
            rec.smoothness = rec.smoothness.min(ds.smoothness);

            remove_item(&mut self.verts[far].star, dead_side);
            remove_item(&mut self.verts[far].crown, fi);

            self.retire_face(fi);
            self.edges[dead_side].alive = false;
            consumed.push(dead_side);
        }
        self.edges[ei].alive = false;

        // Merge v2 into v1: stars, crowns, planes, smoothness, identity
        let v2_star = std::mem::take(&mut self.verts[v2].star);
        let v2_crown = std::mem::take(&mut self.verts[v2].crown);
        let v2_planes = std::mem::take(&mut self.verts[v2].planes);

        remove_item(&mut self.verts[v1].star, ei);
        for fi in dying {
            if fi != INVALID {
                remove_item(&mut self.verts[v1].crown, fi);
            }
        }

        for se in v2_star {
            if !self.edges[se].alive {
                continue;
            }
            let e = &mut self.edges[se];
            if e.v1 == v2 {
                e.v1 = v1;
            } else if e.v2 == v2 {
                e.v2 = v1;
            }
            self.verts[v1].star.push(se);
        }
        for fi in v2_crown {
            if !self.faces[fi].alive {
                continue;
            }
            for v in self.faces[fi].v.iter_mut() {
                if *v == v2 {
                    *v = v1;
                }
            }
            self.verts[v1].crown.push(fi);
            // The moved corner invalidates the cached normal
            let [a, b, c] = self.faces[fi].v;
            self.faces[fi].normal = find_normal(
                &self.verts[a].position,
                &self.verts[b].position,
                &self.verts[c].position,
            );
        }
        for p in v2_planes {
            // Planes held by both vertices (shared faces) must not count twice
            if !self.verts[v1].planes.contains(&p) {
                self.verts[v1].planes.push(p);
            }
        }
        let s2 = self.verts[v2].smoothness;
        let sv = &mut self.verts[v1];
        sv.smoothness = sv.smoothness.min(s2);

        self.merge.union_into(v2, v1);
        consumed
    }

    fn replace_face_ref(&mut self, ei: usize, from: usize, to: usize) {
        let e = &mut self.edges[ei];
        if e.f1 == from {
            e.f1 = to;
        } else if e.f2 == from {
            e.f2 = to;
        }
        // A boundary edge always keeps f1 occupied
        if e.f1 == INVALID {
            e.f1 = e.f2;
            e.f2 = INVALID;
        }
    }

    fn retire_face(&mut self, fi: usize) {
        let pos = self.faces[fi].index;
        self.face_order.swap_remove(pos);
        if pos < self.face_order.len() {
            let moved = self.face_order[pos];
            self.faces[moved].index = pos;
        }
        self.faces[fi].alive = false;
    }

    // ============================================================
    // Driver
    // ============================================================

    fn order_swap(&mut self, a: usize, b: usize) {
        self.order.swap(a, b);
        self.order_pos[self.order[a]] = a;
        self.order_pos[self.order[b]] = b;
    }

    /// Re-evaluate every cost-dirty edge in the unprocessed remainder
    fn refresh_costs(&mut self, cursor: usize) {
        for k in cursor..self.order.len() {
            let ei = self.order[k];
            if self.edges[ei].cost < 0.0 {
                self.update_cost(ei);
            }
        }
    }

    /// Single selection pass: bring the cheapest unprocessed edge to the
    /// front of the remainder. First minimal edge in order wins ties.
    fn select_min_to_front(&mut self, cursor: usize) {
        let mut best = cursor;
        for k in (cursor + 1)..self.order.len() {
            if self.edges[self.order[k]].cost < self.edges[self.order[best]].cost {
                best = k;
            }
        }
        if best != cursor {
            self.order_swap(cursor, best);
        }
    }

    /// Collapse edges in increasing cost order until the cheapest remaining
    /// collapse reaches tolerance, the edge list is exhausted, or the run is
    /// cancelled. Returns false on cancellation.
    fn run(
        &mut self,
        monitor: Option<&SimplifyMonitor>,
        progress: Option<&ProgressCallback>,
        interval: Duration,
    ) -> bool {
        let mut throttle = ProgressThrottle::new(interval);
        let mut cursor = 0;
        while cursor < self.order.len() {
            if monitor.is_some_and(|m| m.is_cancelled()) {
                return false;
            }
            let ei = self.order[cursor];
            if self.edges[ei].cost >= self.tol {
                break;
            }

            for dead in self.collapse(ei) {
                let pos = self.order_pos[dead];
                self.order_swap(cursor, pos);
                cursor += 1;
            }

            if let Some(m) = monitor {
                m.set_face_count(self.face_order.len());
            }
            if let Some(cb) = progress {
                if throttle.ready() {
                    cb(self.face_order.len());
                }
            }

            if cursor < self.order.len() {
                self.refresh_costs(cursor);
                self.select_min_to_front(cursor);
            }
        }
        true
    }

    // ============================================================
    // Rebuilder
    // ============================================================

    /// Convert the collapsed topology back into a flat mesh: canonical
    /// vertices in first-seen order, remapped face triples, carried edge
    /// smoothness, and parameter values remapped through the survivors.
    fn build_mesh(&mut self, input: &SmoothMesh) -> SmoothMesh {
        let nv = self.verts.len();
        let canon: Vec<usize> = (0..nv).map(|v| self.merge.find(v)).collect();

        let mut compact = vec![INVALID; nv];
        let mut positions: Vec<Point3d> = Vec::new();
        let mut smoothness: Vec<f32> = Vec::new();
        let mut backing: Vec<usize> = Vec::new();
        for v in 0..nv {
            let c = canon[v];
            if compact[c] == INVALID {
                compact[c] = positions.len();
                positions.push(self.verts[c].position);
                smoothness.push(self.verts[c].smoothness);
                backing.push(self.verts[c].orig);
            }
        }

        let triples: Vec<[usize; 3]> = self
            .face_order
            .iter()
            .map(|&fi| {
                let f = &self.faces[fi];
                [
                    compact[canon[f.v[0]]],
                    compact[canon[f.v[1]]],
                    compact[canon[f.v[2]]],
                ]
            })
            .collect();

        let mut out = SmoothMesh::from_vertices_and_faces(positions, triples);
        for (vertex, s) in out.vertices.iter_mut().zip(smoothness) {
            vertex.smoothness = s;
        }

        // Carry live-edge smoothness onto the matching rebuilt edge
        let edge_index: HashMap<(usize, usize), usize> = out
            .edges
            .iter()
            .enumerate()
            .map(|(i, e)| ((e.v1.min(e.v2), e.v1.max(e.v2)), i))
            .collect();
        for e in &self.edges {
            if !e.alive {
                continue;
            }
            let a = compact[canon[e.v1]];
            let b = compact[canon[e.v2]];
            if let Some(&idx) = edge_index.get(&(a.min(b), a.max(b))) {
                out.edges[idx].smoothness = e.smoothness;
            }
        }

        // Per-vertex parameters follow the compaction; per-face and
        // per-corner parameters follow the surviving faces' original indices
        for param in &input.parameters {
            let values = match &param.values {
                ParameterValues::PerVertex(vals) => {
                    ParameterValues::PerVertex(backing.iter().map(|&o| vals[o]).collect())
                }
                ParameterValues::PerFace(vals) => ParameterValues::PerFace(
                    self.face_order
                        .iter()
                        .map(|&fi| vals[self.faces[fi].orig])
                        .collect(),
                ),
                ParameterValues::PerFaceVertex(rows) => ParameterValues::PerFaceVertex(
                    self.face_order
                        .iter()
                        .map(|&fi| rows[self.faces[fi].orig])
                        .collect(),
                ),
            };
            out.parameters.push(MeshParameter::new(param.name.clone(), values));
        }

        out
    }
}

// ============================================================
// Edge Collapse Simplifier
// ============================================================

/// Callback receiving the current live face count at a coarse interval
pub type ProgressCallback = Box<dyn Fn(usize) + Send + Sync>;

/// Edge collapse mesh simplifier.
///
/// Accepts a [`SmoothMesh`], an optional per-edge selection mask restricting
/// which edges may collapse, and a worldspace error tolerance (squared once
/// internally). Produces a reduced mesh with the same attribute surface:
/// vertex/edge smoothness and named scalar parameters are carried through.
pub struct EdgeCollapseSimplifier {
    /// Per-edge collapse eligibility, parallel to the input edge list;
    /// `None` means every edge is a candidate
    pub selection: Option<Vec<bool>>,
    /// Shared cancel flag and live face counter
    pub monitor: Option<SimplifyMonitor>,
    progress: Option<ProgressCallback>,
    progress_interval: Duration,
}

impl Default for EdgeCollapseSimplifier {
    fn default() -> Self {
        Self {
            selection: None,
            monitor: None,
            progress: None,
            progress_interval: Duration::from_millis(200),
        }
    }
}

impl EdgeCollapseSimplifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict collapses to the edges marked true
    pub fn with_selection(mut self, selection: Vec<bool>) -> Self {
        self.selection = Some(selection);
        self
    }

    pub fn with_monitor(mut self, monitor: SimplifyMonitor) -> Self {
        self.monitor = Some(monitor);
        self
    }

    /// Report the live face count through `callback` at most once per
    /// `interval`
    pub fn with_progress<F>(mut self, callback: F, interval: Duration) -> Self
    where
        F: Fn(usize) + Send + Sync + 'static,
    {
        self.progress = Some(Box::new(callback));
        self.progress_interval = interval;
        self
    }
}

impl MeshSimplifier for EdgeCollapseSimplifier {
    fn simplify(&self, mesh: &SmoothMesh, tolerance: f64) -> Result<SmoothMesh> {
        if let Some(selection) = &self.selection {
            if selection.len() != mesh.edge_count() {
                return Err(Error::InvalidData(format!(
                    "Selection mask length {} does not match edge count {}",
                    selection.len(),
                    mesh.edge_count()
                )));
            }
        }
        // A mesh with no faces or edges trivially simplifies to itself
        if mesh.is_empty() {
            return Ok(mesh.clone());
        }

        let tol = tolerance * tolerance;
        let mut topology = Topology::build(mesh, self.selection.as_deref(), tol);
        if let Some(m) = &self.monitor {
            m.set_face_count(mesh.face_count());
        }

        let completed = topology.run(
            self.monitor.as_ref(),
            self.progress.as_ref(),
            self.progress_interval,
        );
        if !completed {
            // Cancellation is all-or-nothing: the caller keeps the input
            return Ok(mesh.clone());
        }

        Ok(topology.build_mesh(mesh))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use whittle_core::Point3;

    fn make_single_triangle() -> SmoothMesh {
        SmoothMesh::from_vertices_and_faces(
            vec![
                Point3::new(0.0, 0.0, 0.0),
                Point3::new(1.0, 0.0, 0.0),
                Point3::new(0.5, 1.0, 0.0),
            ],
            vec![[0, 1, 2]],
        )
    }

    fn make_octahedron() -> SmoothMesh {
        // 6 vertices, 12 edges, 8 faces, consistently wound
        SmoothMesh::from_vertices_and_faces(
            vec![
                Point3::new(1.0, 0.0, 0.0),
                Point3::new(-1.0, 0.0, 0.0),
                Point3::new(0.0, 1.0, 0.0),
                Point3::new(0.0, -1.0, 0.0),
                Point3::new(0.0, 0.0, 1.0),
                Point3::new(0.0, 0.0, -1.0),
            ],
            vec![
                [0, 2, 4],
                [2, 1, 4],
                [1, 3, 4],
                [3, 0, 4],
                [2, 0, 5],
                [1, 2, 5],
                [3, 1, 5],
                [0, 3, 5],
            ],
        )
    }

    fn make_plane_grid(size: usize) -> SmoothMesh {
        let mut vertices = Vec::new();
        for y in 0..size {
            for x in 0..size {
                vertices.push(Point3::new(x as f64, y as f64, 0.0));
            }
        }
        let mut faces = Vec::new();
        for y in 0..(size - 1) {
            for x in 0..(size - 1) {
                let tl = y * size + x;
                let tr = tl + 1;
                let bl = (y + 1) * size + x;
                let br = bl + 1;
                faces.push([tl, bl, tr]);
                faces.push([tr, bl, br]);
            }
        }
        SmoothMesh::from_vertices_and_faces(vertices, faces)
    }

    /// Faces incident to every edge of a rebuilt mesh, keyed by endpoint pair
    fn edge_face_counts(mesh: &SmoothMesh) -> HashMap<(usize, usize), usize> {
        let mut counts: HashMap<(usize, usize), usize> = HashMap::new();
        for f in &mesh.faces {
            for (a, b) in [(f.v1, f.v2), (f.v2, f.v3), (f.v3, f.v1)] {
                *counts.entry((a.min(b), a.max(b))).or_insert(0) += 1;
            }
        }
        counts
    }

    // ---- Geometry tests ----

    #[test]
    fn test_find_normal() {
        let n = find_normal(
            &Point3::new(0.0, 0.0, 0.0),
            &Point3::new(1.0, 0.0, 0.0),
            &Point3::new(0.0, 1.0, 0.0),
        );
        assert!((n - Vector3d::new(0.0, 0.0, 1.0)).norm() < 1e-12);
    }

    #[test]
    fn test_find_normal_degenerate_fallback() {
        let p = Point3::new(1.0, 2.0, 3.0);
        let n = find_normal(&p, &p, &p);
        assert_eq!(n, Vector3d::new(1.0, 1.0, 1.0));
    }

    #[test]
    fn test_plane_through_face_vertices() {
        let (a, b, c) = (
            Point3::new(0.0, 0.0, 1.0),
            Point3::new(1.0, 0.0, 1.0),
            Point3::new(0.0, 1.0, 1.0),
        );
        let plane = Plane::from_normal_and_point(&find_normal(&a, &b, &c), &a);
        assert!(plane.eval(&a).abs() < 1e-12);
        assert!(plane.eval(&b).abs() < 1e-12);
        assert!(plane.eval(&c).abs() < 1e-12);
        assert!((plane.eval(&Point3::new(0.0, 0.0, 3.0)).abs() - 2.0).abs() < 1e-12);
    }

    // ---- Topology construction tests ----

    #[test]
    fn test_build_star_crown_counts() {
        let mesh = make_octahedron();
        let top = Topology::build(&mesh, None, 1.0);
        for v in &top.verts {
            assert_eq!(v.star.len(), 4, "octahedron vertex touches 4 edges");
            assert_eq!(v.crown.len(), 4, "octahedron vertex touches 4 faces");
        }
        // Closed mesh: every edge has exactly two faces
        for e in &top.edges {
            assert_ne!(e.f1, INVALID);
            assert_ne!(e.f2, INVALID);
        }
    }

    #[test]
    fn test_build_boundary_fences() {
        let mesh = make_single_triangle();
        let top = Topology::build(&mesh, None, 1.0);
        // One face plane plus a fence from each of the two incident
        // boundary edges
        for v in &top.verts {
            assert_eq!(v.planes.len(), 3);
        }
        for e in &top.edges {
            assert_eq!(e.f2, INVALID, "all edges of a lone triangle are boundary");
        }
    }

    #[test]
    fn test_build_moves_cheapest_edge_to_front() {
        let mesh = make_plane_grid(4);
        let top = Topology::build(&mesh, None, 0.5 * 0.5);
        let front = top.edges[top.order[0]].cost;
        for &ei in &top.order {
            assert!(top.edges[ei].cost >= front);
        }
    }

    #[test]
    fn test_unselected_edges_cost_tolerance() {
        let mesh = make_octahedron();
        let selection = vec![false; mesh.edge_count()];
        let tol = 100.0;
        let top = Topology::build(&mesh, Some(&selection), tol);
        for e in &top.edges {
            assert_eq!(e.cost, tol);
        }
    }

    // ---- Collapse bookkeeping tests ----

    #[test]
    fn test_collapse_consumes_three_edges_interior() {
        let mesh = make_octahedron();
        let mut top = Topology::build(&mesh, None, 1.0e4);
        let ei = top.order[0];
        assert!(top.edges[ei].cost < top.tol);
        let consumed = top.collapse(ei);
        assert_eq!(consumed.len(), 3, "interior collapse retires 3 edges");
        assert_eq!(top.face_order.len(), 6);
    }

    #[test]
    fn test_collapse_keeps_star_crown_consistent() {
        let mesh = make_octahedron();
        let mut top = Topology::build(&mesh, None, 1.0e4);
        let ei = top.order[0];
        let survivor = top.edges[ei].v1;
        top.collapse(ei);

        // Recount incidences from scratch and compare against the
        // incrementally maintained star/crown
        for (vi, v) in top.verts.iter().enumerate() {
            if top.merge.parent[vi] != vi {
                continue; // absorbed
            }
            let star_count = top
                .edges
                .iter()
                .filter(|e| e.alive && (e.v1 == vi || e.v2 == vi))
                .count();
            let crown_count = top
                .faces
                .iter()
                .filter(|f| f.alive && f.v.contains(&vi))
                .count();
            assert_eq!(v.star.len(), star_count, "star of vertex {vi}");
            assert_eq!(v.crown.len(), crown_count, "crown of vertex {vi}");
        }
        // The merged vertex inherited the absorbed vertex's neighborhood:
        // 3 + 1 surviving edges, 2 + 2 surviving faces
        assert_eq!(top.verts[survivor].star.len(), 4);
        assert_eq!(top.verts[survivor].crown.len(), 4);
    }

    #[test]
    fn test_collapse_smoothness_min_merge() {
        let mut mesh = make_octahedron();
        for v in mesh.vertices.iter_mut() {
            v.smoothness = 0.8;
        }
        mesh.vertices[0].smoothness = 0.25;

        let simplifier = EdgeCollapseSimplifier::new();
        let result = simplifier.simplify(&mesh, 10.0).unwrap();
        let min = result
            .vertices
            .iter()
            .map(|v| v.smoothness)
            .fold(f32::MAX, f32::min);
        assert_eq!(min, 0.25, "min smoothness survives every merge");
    }

    // ---- Simplification tests ----

    #[test]
    fn test_empty_mesh() {
        let simplifier = EdgeCollapseSimplifier::new();
        let mesh = SmoothMesh::new();
        let result = simplifier.simplify(&mesh, 1.0).unwrap();
        assert!(result.is_empty());
    }

    #[test]
    fn test_zero_tolerance_is_identity() {
        let simplifier = EdgeCollapseSimplifier::new();
        let mesh = make_plane_grid(5);
        let result = simplifier.simplify(&mesh, 0.0).unwrap();
        assert_eq!(result.face_count(), mesh.face_count());
        assert_eq!(result.vertex_count(), mesh.vertex_count());
        assert_eq!(result.face_triples(), mesh.face_triples());
    }

    #[test]
    fn test_monotonic_reduction() {
        let simplifier = EdgeCollapseSimplifier::new();
        let mesh = make_plane_grid(6);
        let result = simplifier.simplify(&mesh, 0.5).unwrap();
        assert!(result.face_count() <= mesh.face_count());
        assert!(result.face_count() > 0);
    }

    #[test]
    fn test_octahedron_reduces_to_tetrahedron_or_less() {
        let simplifier = EdgeCollapseSimplifier::new();
        let mesh = make_octahedron();
        let result = simplifier.simplify(&mesh, 100.0).unwrap();
        assert!(result.face_count() <= 4);
        assert!(result.face_count() >= 2);
        // Output remains a closed manifold: every edge has exactly 2 faces
        for (_, count) in edge_face_counts(&result) {
            assert_eq!(count, 2);
        }
    }

    #[test]
    fn test_manifold_preserved_on_open_mesh() {
        let simplifier = EdgeCollapseSimplifier::new();
        let mesh = make_plane_grid(6);
        let result = simplifier.simplify(&mesh, 10.0).unwrap();
        for (_, count) in edge_face_counts(&result) {
            assert!(
                (1..=2).contains(&count),
                "edge with {count} faces breaks manifoldness"
            );
        }
    }

    #[test]
    fn test_selection_mask_wrong_length_is_error() {
        let mesh = make_octahedron();
        let simplifier = EdgeCollapseSimplifier::new().with_selection(vec![true; 3]);
        assert!(simplifier.simplify(&mesh, 1.0).is_err());
    }

    #[test]
    fn test_selection_mask_respected() {
        let mesh = make_octahedron();
        let simplifier =
            EdgeCollapseSimplifier::new().with_selection(vec![false; mesh.edge_count()]);
        let result = simplifier.simplify(&mesh, 1000.0).unwrap();
        assert_eq!(result.face_count(), mesh.face_count());
        assert_eq!(result.vertex_count(), mesh.vertex_count());
    }

    #[test]
    fn test_cancellation_returns_input_unchanged() {
        let monitor = SimplifyMonitor::new();
        monitor.cancel();
        let simplifier = EdgeCollapseSimplifier::new().with_monitor(monitor);
        let mesh = make_plane_grid(6);
        let result = simplifier.simplify(&mesh, 10.0).unwrap();
        assert_eq!(result, mesh);
    }

    #[test]
    fn test_per_vertex_parameter_roundtrip() {
        let mut mesh = make_plane_grid(4);
        let field: Vec<f64> = (0..mesh.vertex_count()).map(|i| i as f64).collect();
        mesh.add_parameter(MeshParameter::new(
            "id",
            ParameterValues::PerVertex(field.clone()),
        ));

        let simplifier = EdgeCollapseSimplifier::new();
        let result = simplifier.simplify(&mesh, 0.0).unwrap();
        match &result.parameter("id").unwrap().values {
            ParameterValues::PerVertex(vals) => assert_eq!(*vals, field),
            _ => panic!("expected per-vertex values"),
        }
    }

    #[test]
    fn test_per_face_parameter_remap() {
        let mut mesh = make_plane_grid(5);
        let field: Vec<f64> = (0..mesh.face_count()).map(|i| i as f64).collect();
        mesh.add_parameter(MeshParameter::new(
            "face_id",
            ParameterValues::PerFace(field),
        ));

        let simplifier = EdgeCollapseSimplifier::new();
        let result = simplifier.simplify(&mesh, 0.5).unwrap();
        match &result.parameter("face_id").unwrap().values {
            ParameterValues::PerFace(vals) => {
                assert_eq!(vals.len(), result.face_count());
                // Surviving faces keep their original field values
                for v in vals {
                    assert!(v.fract() == 0.0 && *v < mesh.face_count() as f64);
                }
            }
            _ => panic!("expected per-face values"),
        }
    }

    #[test]
    fn test_edge_smoothness_carried_over() {
        let mut mesh = make_plane_grid(4);
        for e in mesh.edges.iter_mut() {
            e.smoothness = 0.5;
        }
        let simplifier = EdgeCollapseSimplifier::new();
        let result = simplifier.simplify(&mesh, 0.0).unwrap();
        assert!(result.edges.iter().all(|e| e.smoothness == 0.5));
    }
}
