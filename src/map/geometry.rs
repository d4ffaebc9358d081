//! Brush geometry reconstruction.
//!
//! Brushes are stored plane-based; their face polygons are recovered by
//! seeding the brush AABB's six faces and clipping them against every
//! non-bevel plane. Cutting uses a small over-cut so vertices that sit on a
//! plane fall cleanly to one side, and planes that would cut less than a
//! minimum depth are skipped as redundant to avoid degenerate sliver faces.

use std::collections::BTreeSet;

use cgmath::{InnerSpace, Vector3};

use crate::coll::Aabb;
use crate::constants::{BRUSH_PLANE_OVER_CUT, BRUSH_PLANE_REDUNDANCY, VERTEX_MERGE_EPSILON};
use crate::error::{ErrorReport, SimError, SimResult};
use crate::map::data::{
    BrushContents, MapBrush, MapBrushSide, MapPlane, MapQuirks, ParsedMap, SurfaceFlags,
};

/// A reconstructed face polygon, CW when viewed from the front.
pub type Polygon = Vec<Vector3<f32>>;

/// Rendering/collision category of a brush.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BrushCategory {
    Solid,
    PlayerClip,
    GrenadeClip,
    Ladder,
    Water,
    Sky,
}

impl BrushCategory {
    /// All categories, in display order.
    pub const ALL: [BrushCategory; 6] = [
        BrushCategory::Solid,
        BrushCategory::PlayerClip,
        BrushCategory::GrenadeClip,
        BrushCategory::Ladder,
        BrushCategory::Water,
        BrushCategory::Sky,
    ];

    /// Brush-level membership test over the contents bitmask.
    pub fn brush_test(&self, brush: &MapBrush) -> bool {
        match self {
            // Sky brushes carry SOLID contents; they are told apart from
            // plain solids by their sky-flagged sides.
            BrushCategory::Solid | BrushCategory::Sky => {
                brush.contents.contains(BrushContents::SOLID)
            }
            BrushCategory::PlayerClip => brush.contents.contains(BrushContents::PLAYERCLIP),
            BrushCategory::GrenadeClip => brush.contents.contains(BrushContents::GRENADECLIP),
            BrushCategory::Ladder => brush.contents.contains(BrushContents::LADDER),
            BrushCategory::Water => brush.contents.contains(BrushContents::WATER),
        }
    }

    /// Side-level membership test; separates sky faces from plain solids.
    pub fn side_test(&self, side: &MapBrushSide, map: &ParsedMap) -> bool {
        let sky = SurfaceFlags::SKY | SurfaceFlags::SKY2D;
        match self {
            BrushCategory::Solid => !map.side_surface_flags(side).intersects(sky),
            BrushCategory::Sky => map.side_surface_flags(side).intersects(sky),
            _ => true,
        }
    }
}

/// Tunable epsilons of the face reconstruction. Changing them changes which
/// near-degenerate brushes survive.
#[derive(Debug, Clone, Copy)]
pub struct ExtractionEpsilons {
    /// Over-cut applied while clipping, so on-plane vertices fall cleanly
    /// to one side.
    pub plane_over_cut: f32,
    /// Minimum depth a plane has to cut to not be skipped as redundant.
    pub plane_redundancy: f32,
}

impl Default for ExtractionEpsilons {
    fn default() -> Self {
        Self {
            plane_over_cut: BRUSH_PLANE_OVER_CUT,
            plane_redundancy: BRUSH_PLANE_REDUNDANCY,
        }
    }
}

/// True if two vertices are so close together they count as the same.
/// Absolute epsilon, widened by a relative term for far-out coordinates.
pub fn are_vertices_equivalent(a: Vector3<f32>, b: Vector3<f32>) -> bool {
    let eps_sq = VERTEX_MERGE_EPSILON * VERTEX_MERGE_EPSILON;
    let dist_sq = (b - a).magnitude2();
    if dist_sq <= eps_sq {
        return true;
    }
    dist_sq <= eps_sq * a.magnitude2().max(b.magnitude2())
}

// Plane normals point out of the brush. A vertex is behind (inside) when its
// signed distance is below -overcut.
fn is_vertex_behind_plane(v: Vector3<f32>, p: &MapPlane, overcut: f32) -> bool {
    v.dot(p.normal) - p.dist < -overcut
}

impl ParsedMap {
    /// Vertices of a stored map face, CW when viewed from the front.
    pub fn face_vertices(&self, face_idx: usize) -> Vec<Vector3<f32>> {
        let face = &self.faces[face_idx];
        let mut verts = Vec::with_capacity(face.num_edges as usize);
        for i in 0..face.num_edges as usize {
            let surfedge = self.surfedges[face.first_edge as usize + i];
            if surfedge > 0 {
                verts.push(self.vertices[self.edges[surfedge as usize].v[0] as usize]);
            } else {
                verts.push(self.vertices[self.edges[(-surfedge) as usize].v[1] as usize]);
            }
        }
        verts
    }

    /// AABB of a brush from its axial planes (bevel sides included, taking
    /// the tightest bound per axis). Fails if any axis stays unbounded.
    pub fn brush_aabb(&self, brush_idx: usize, quirks: &MapQuirks) -> SimResult<Aabb> {
        let brush = &self.brushes[brush_idx];
        let mut mins = Vector3::new(f32::NEG_INFINITY, f32::NEG_INFINITY, f32::NEG_INFINITY);
        let mut maxs = Vector3::new(f32::INFINITY, f32::INFINITY, f32::INFINITY);

        for i in 0..brush.num_sides as usize {
            if quirks.skip_brush_sides.contains(&(brush_idx, i)) {
                continue;
            }
            let side = &self.brushsides[brush.first_side as usize + i];
            let plane = &self.planes[side.plane_num as usize];
            for axis in 0..3 {
                if plane.normal[axis] == -1.0 && -plane.dist > mins[axis] {
                    mins[axis] = -plane.dist;
                }
                if plane.normal[axis] == 1.0 && plane.dist < maxs[axis] {
                    maxs[axis] = plane.dist;
                }
            }
        }

        for axis in 0..3 {
            if mins[axis] == f32::NEG_INFINITY || maxs[axis] == f32::INFINITY {
                return Err(SimError::MapMalformed {
                    what: format!("brush {} does not have all 6 axial brushsides", brush_idx),
                });
            }
        }

        Ok(Aabb::new(mins, maxs))
    }

    /// Reconstruct the face polygons of the given brushes, CW from outside.
    ///
    /// `brush_pred` filters whole brushes, `side_pred` filters individual
    /// faces (a brush is still cut by planes whose faces are unwanted, the
    /// unwanted faces are just dropped at the end). Malformed brushes are
    /// reported and skipped.
    pub fn brush_face_polygons(
        &self,
        brush_indices: &BTreeSet<usize>,
        brush_pred: Option<&dyn Fn(&MapBrush) -> bool>,
        side_pred: Option<&dyn Fn(&MapBrushSide, &ParsedMap) -> bool>,
        report: &mut ErrorReport,
    ) -> Vec<Polygon> {
        self.brush_face_polygons_with(
            ExtractionEpsilons::default(),
            brush_indices,
            brush_pred,
            side_pred,
            report,
        )
    }

    /// [`Self::brush_face_polygons`] with explicit clipping epsilons.
    pub fn brush_face_polygons_with(
        &self,
        eps: ExtractionEpsilons,
        brush_indices: &BTreeSet<usize>,
        brush_pred: Option<&dyn Fn(&MapBrush) -> bool>,
        side_pred: Option<&dyn Fn(&MapBrushSide, &ParsedMap) -> bool>,
        report: &mut ErrorReport,
    ) -> Vec<Polygon> {
        let quirks = self.quirks();
        let mut final_faces: Vec<Polygon> = Vec::new();

        for &brush_idx in brush_indices {
            let brush = &self.brushes[brush_idx];

            if let Some(pred) = brush_pred {
                if !pred(brush) {
                    continue;
                }
            }

            let aabb = match self.brush_aabb(brush_idx, &quirks) {
                Ok(aabb) => aabb,
                Err(err) => {
                    report.push(err);
                    continue;
                }
            };

            let (mins, maxs) = (aabb.mins, aabb.maxs);

            // Seed the cutting process with the faces of the brush AABB.
            // Starting from a tight box keeps float error small.
            let mut brush_faces: Vec<Polygon> = vec![
                // +Z
                vec![
                    Vector3::new(maxs.x, maxs.y, maxs.z),
                    Vector3::new(maxs.x, mins.y, maxs.z),
                    Vector3::new(mins.x, mins.y, maxs.z),
                    Vector3::new(mins.x, maxs.y, maxs.z),
                ],
                // -Z
                vec![
                    Vector3::new(mins.x, maxs.y, mins.z),
                    Vector3::new(mins.x, mins.y, mins.z),
                    Vector3::new(maxs.x, mins.y, mins.z),
                    Vector3::new(maxs.x, maxs.y, mins.z),
                ],
                // +X
                vec![
                    Vector3::new(maxs.x, mins.y, maxs.z),
                    Vector3::new(maxs.x, maxs.y, maxs.z),
                    Vector3::new(maxs.x, maxs.y, mins.z),
                    Vector3::new(maxs.x, mins.y, mins.z),
                ],
                // -X
                vec![
                    Vector3::new(mins.x, mins.y, mins.z),
                    Vector3::new(mins.x, maxs.y, mins.z),
                    Vector3::new(mins.x, maxs.y, maxs.z),
                    Vector3::new(mins.x, mins.y, maxs.z),
                ],
                // +Y
                vec![
                    Vector3::new(maxs.x, maxs.y, maxs.z),
                    Vector3::new(mins.x, maxs.y, maxs.z),
                    Vector3::new(mins.x, maxs.y, mins.z),
                    Vector3::new(maxs.x, maxs.y, mins.z),
                ],
                // -Y
                vec![
                    Vector3::new(maxs.x, mins.y, mins.z),
                    Vector3::new(mins.x, mins.y, mins.z),
                    Vector3::new(mins.x, mins.y, maxs.z),
                    Vector3::new(maxs.x, mins.y, maxs.z),
                ],
            ];

            let mut non_bevel_sides: Vec<usize> = Vec::new();
            for i in 0..brush.num_sides as usize {
                let side_idx = brush.first_side as usize + i;
                // Bevel sides only matter for AABB collision and could only
                // produce degenerate faces here.
                if self.brushsides[side_idx].bevel {
                    continue;
                }
                non_bevel_sides.push(side_idx);
            }

            // If no side of this brush is wanted, skip it entirely.
            if let Some(pred) = side_pred {
                let any_wanted = non_bevel_sides
                    .iter()
                    .any(|&idx| pred(&self.brushsides[idx], self));
                if !any_wanted {
                    continue;
                }
            }

            let mut unwanted_face_indices: Vec<usize> = Vec::new();

            for &side_idx in &non_bevel_sides {
                let side = &self.brushsides[side_idx];
                let plane = self.planes[side.plane_num as usize];

                // Skip planes that do not cut any current face by at least
                // the redundancy threshold.
                let mut plane_redundant = true;
                'faces: for face in &brush_faces {
                    for &v in face {
                        if !is_vertex_behind_plane(v, &plane, -eps.plane_redundancy) {
                            plane_redundant = false;
                            break 'faces;
                        }
                    }
                }
                if plane_redundant {
                    continue;
                }

                // Vertices of the new face lying on this plane.
                let mut side_vertices: Vec<Vector3<f32>> = Vec::new();

                for face in brush_faces.iter_mut() {
                    let mut altered: Vec<Vector3<f32>> = Vec::new();

                    let behind: Vec<bool> = face
                        .iter()
                        .map(|&v| is_vertex_behind_plane(v, &plane, eps.plane_over_cut))
                        .collect();

                    for curr in 0..face.len() {
                        let next = (curr + 1) % face.len();
                        let curr_vert = face[curr];
                        let next_vert = face[next];
                        let curr_behind = behind[curr];
                        let next_behind = behind[next];

                        if curr_behind {
                            let duplicate = altered
                                .iter()
                                .any(|&v| are_vertices_equivalent(curr_vert, v));
                            if !duplicate {
                                altered.push(curr_vert);
                            }
                        }

                        if curr_behind != next_behind {
                            // Only intersect if the plane actually cuts this
                            // edge (without over-cut).
                            let actually_cut = if next_behind {
                                !is_vertex_behind_plane(curr_vert, &plane, 0.0)
                            } else {
                                !is_vertex_behind_plane(next_vert, &plane, 0.0)
                            };

                            let new_vertex = if actually_cut {
                                let dir = next_vert - curr_vert;
                                let denom = plane.normal.dot(dir);
                                let t = (plane.dist - plane.normal.dot(curr_vert)) / denom;
                                if t.is_nan() || t.is_infinite() {
                                    // Edge nearly parallel and touching the
                                    // plane; keep the cut vertex instead.
                                    if curr_behind {
                                        next_vert
                                    } else {
                                        curr_vert
                                    }
                                } else {
                                    let t = t.clamp(0.0, 1.0);
                                    curr_vert + t * dir
                                }
                            } else {
                                if curr_behind {
                                    next_vert
                                } else {
                                    curr_vert
                                }
                            };

                            // Duplicates among side vertices get merged later
                            side_vertices.push(new_vertex);

                            let duplicate = altered
                                .iter()
                                .any(|&v| are_vertices_equivalent(new_vertex, v));
                            if !duplicate {
                                altered.push(new_vertex);
                            }
                        }
                    }

                    if altered.len() >= 3 {
                        *face = altered;
                    } else {
                        face.clear();
                    }
                }

                if side_vertices.is_empty() {
                    continue;
                }

                // Merge coincident vertices of the new plane face.
                let mut filtered: Vec<Vector3<f32>> = Vec::new();
                for v in side_vertices {
                    let duplicate = filtered.iter().any(|&f| are_vertices_equivalent(v, f));
                    if !duplicate {
                        filtered.push(v);
                    }
                }

                // A single point means the plane only grazed a corner.
                if filtered.len() < 3 {
                    continue;
                }

                let sorted = sort_face_cw(filtered, plane.normal);

                if let Some(pred) = side_pred {
                    if !pred(side, self) {
                        unwanted_face_indices.push(brush_faces.len());
                    }
                }
                brush_faces.push(sorted);
            }

            for idx in unwanted_face_indices {
                brush_faces[idx].clear();
            }
            for face in brush_faces {
                if !face.is_empty() {
                    final_faces.push(face);
                }
            }
        }

        final_faces
    }

    /// Worldspawn brush indices (model 0 holds most of the map geometry).
    pub fn worldspawn_brush_indices(&self) -> BTreeSet<usize> {
        self.model_brush_indices(0)
    }

    /// All brush indices referenced by a brush model, collected through the
    /// BSP node/leaf walk.
    pub fn model_brush_indices(&self, model_idx: usize) -> BTreeSet<usize> {
        let mut brush_indices = BTreeSet::new();
        let Some(model) = self.models.get(model_idx) else {
            return brush_indices;
        };

        let mut pending = vec![model.head_node];
        while let Some(entry) = pending.pop() {
            if entry >= 0 {
                let node = &self.nodes[entry as usize];
                pending.push(node.children[0]);
                pending.push(node.children[1]);
            } else {
                let leaf = &self.leafs[(-(entry + 1)) as usize];
                let first = leaf.first_leaf_brush as usize;
                for lbrush in first..first + leaf.num_leaf_brushes as usize {
                    brush_indices.insert(self.leaf_brushes[lbrush] as usize);
                }
            }
        }

        brush_indices
    }
}

/// Sort face vertices clockwise (viewed from the front) around the centroid.
///
/// The comparison `sign(n . ((a - c) x (b - c)))` is only a valid strict
/// order within a half-turn, so the vertex set is split at a reference
/// vertex into the half before and the half after it, each sorted
/// separately, then stitched back together.
fn sort_face_cw(vertices: Vec<Vector3<f32>>, plane_normal: Vector3<f32>) -> Polygon {
    let mut center = Vector3::new(0.0, 0.0, 0.0);
    for v in &vertices {
        center += *v;
    }
    center /= vertices.len() as f32;

    let cw_before = |a: Vector3<f32>, b: Vector3<f32>| -> bool {
        plane_normal.dot((a - center).cross(b - center)) < 0.0
    };

    let reference = vertices[0];
    let mut pre_half: Vec<Vector3<f32>> = Vec::new();
    let mut post_half: Vec<Vector3<f32>> = Vec::new();
    for &v in vertices.iter().skip(1) {
        if cw_before(v, reference) {
            pre_half.push(v);
        } else {
            post_half.push(v);
        }
    }

    let by_cw = |a: &Vector3<f32>, b: &Vector3<f32>| {
        if cw_before(*a, *b) {
            std::cmp::Ordering::Less
        } else {
            std::cmp::Ordering::Greater
        }
    };
    pre_half.sort_by(by_cw);
    post_half.sort_by(by_cw);

    let mut sorted = Vec::with_capacity(vertices.len());
    sorted.extend(pre_half);
    sorted.push(reference);
    sorted.extend(post_half);
    sorted
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::map::synth as test_maps;

    #[test]
    fn box_brush_has_six_faces() {
        let map = test_maps::single_box_map(
            Vector3::new(-64.0, -64.0, -16.0),
            Vector3::new(64.0, 64.0, 0.0),
        );
        let mut report = ErrorReport::new();
        let indices: BTreeSet<usize> = [0].into_iter().collect();
        let faces = map.brush_face_polygons(&indices, None, None, &mut report);
        assert!(report.is_empty());
        assert_eq!(faces.len(), 6);
        for face in &faces {
            assert_eq!(face.len(), 4);
        }
    }

    #[test]
    fn wedge_brush_gets_slant_face() {
        // A box cut by a 45 degree plane through opposite top/bottom edges:
        // slanted quad + 4 side faces + bottom, top cut away entirely.
        let map = test_maps::wedge_map();
        let mut report = ErrorReport::new();
        let indices: BTreeSet<usize> = [0].into_iter().collect();
        let faces = map.brush_face_polygons(&indices, None, None, &mut report);
        assert!(report.is_empty());
        assert_eq!(faces.len(), 5);

        // Every vertex of every face must stay on the brush AABB (expanded)
        let aabb = map
            .brush_aabb(0, &MapQuirks::default())
            .unwrap()
            .expanded(1e-3);
        for face in &faces {
            for &v in face {
                assert!(aabb.contains_point(v), "vertex escaped brush: {:?}", v);
            }
        }
    }

    #[test]
    fn face_vertices_lie_on_their_planes() {
        let map = test_maps::wedge_map();
        let mut report = ErrorReport::new();
        let indices: BTreeSet<usize> = [0].into_iter().collect();
        let faces = map.brush_face_polygons(&indices, None, None, &mut report);

        for face in &faces {
            assert!(face.len() >= 3);
            let n = crate::math::cw_normal(face[0], face[1], face[2]);
            let d = n.dot(face[0]);
            for &v in face {
                assert!(
                    (n.dot(v) - d).abs() < 1e-3,
                    "vertex off plane by {}",
                    (n.dot(v) - d).abs()
                );
            }
        }
    }

    #[test]
    fn redundant_plane_is_skipped() {
        // A plane that only grazes the box corner cuts less than the
        // redundancy threshold and must not produce a face.
        let map = test_maps::corner_grazed_box_map();
        let mut report = ErrorReport::new();
        let indices: BTreeSet<usize> = [0].into_iter().collect();
        let faces = map.brush_face_polygons(&indices, None, None, &mut report);
        assert_eq!(faces.len(), 6);
    }

    #[test]
    fn redundancy_threshold_is_tunable() {
        // With an absurd redundancy threshold even the wedge's slant plane
        // counts as redundant and the brush stays a plain box.
        let map = test_maps::wedge_map();
        let mut report = ErrorReport::new();
        let indices: BTreeSet<usize> = [0].into_iter().collect();
        let eps = ExtractionEpsilons {
            plane_redundancy: 1000.0,
            ..ExtractionEpsilons::default()
        };
        let faces = map.brush_face_polygons_with(eps, &indices, None, None, &mut report);
        assert_eq!(faces.len(), 6);
    }

    #[test]
    fn missing_axial_side_is_reported() {
        let map = test_maps::open_ended_brush_map();
        let mut report = ErrorReport::new();
        let indices: BTreeSet<usize> = [0].into_iter().collect();
        let faces = map.brush_face_polygons(&indices, None, None, &mut report);
        assert!(faces.is_empty());
        assert_eq!(report.len(), 1);
    }

    #[test]
    fn worldspawn_walk_collects_leaf_brushes() {
        let map = test_maps::single_box_map(
            Vector3::new(0.0, 0.0, 0.0),
            Vector3::new(8.0, 8.0, 8.0),
        );
        let indices = map.worldspawn_brush_indices();
        assert_eq!(indices.into_iter().collect::<Vec<_>>(), vec![0]);
    }
}
