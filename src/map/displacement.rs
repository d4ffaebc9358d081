//! Displacement tessellation.
//!
//! A displacement subdivides one 4-vertex map face into a `(2^power)^2` tile
//! grid. Grid vertices are bilinearly interpolated between the four face
//! corners and displaced by their per-vertex offset. Each tile becomes two
//! triangles whose separating diagonal alternates per tile (checkerboard),
//! which collision relies on.

use cgmath::{InnerSpace, Vector3};

use crate::constants::{DISP_BOUNDARY_HOVER, DISP_BOUNDARY_THICKNESS};
use crate::error::{ErrorReport, SimError, SimResult};
use crate::map::data::ParsedMap;
use crate::map::geometry::Polygon;
use crate::math::{cw_normal, normalize_mut, normalized};

impl ParsedMap {
    /// World-space grid vertices of one displacement, in the order of the
    /// stored per-vertex offsets (row-major).
    pub fn displacement_vertices(&self, disp_idx: usize) -> SimResult<Vec<Vector3<f32>>> {
        let dispinfo = &self.dispinfos[disp_idx];
        let row_verts = dispinfo.row_verts();
        let num_verts = row_verts * row_verts;

        let face = &self.faces[dispinfo.map_face as usize];
        if face.num_edges != 4 {
            return Err(SimError::MapMalformed {
                what: format!(
                    "displacement {} references a face with {} edges (need 4)",
                    disp_idx, face.num_edges
                ),
            });
        }

        let corners = self.face_vertices(dispinfo.map_face as usize);

        // The corner closest to start_pos anchors the grid orientation.
        // The other three are labeled by CW rotation from it.
        let mut anchor = 0;
        let mut anchor_dist = (dispinfo.start_pos - corners[0]).magnitude2();
        for (i, &c) in corners.iter().enumerate().skip(1) {
            let dist = (dispinfo.start_pos - c).magnitude2();
            if dist < anchor_dist {
                anchor = i;
                anchor_dist = dist;
            }
        }

        let top_left = corners[(anchor + 3) % 4];
        let top_right = corners[anchor];
        let bot_right = corners[(anchor + 1) % 4];
        let bot_left = corners[(anchor + 2) % 4];

        let mut verts = Vec::with_capacity(num_verts);
        for i in 0..num_verts {
            let row_pos = (i % row_verts) as f32 / (row_verts - 1) as f32;
            let col_pos = (i / row_verts) as f32 / (row_verts - 1) as f32;
            let top_interp = row_pos * top_left + (1.0 - row_pos) * top_right;
            let bot_interp = row_pos * bot_left + (1.0 - row_pos) * bot_right;
            let mut v = (1.0 - col_pos) * top_interp + col_pos * bot_interp;

            let dispvert = &self.dispverts[dispinfo.disp_vert_start as usize + i];
            v += dispvert.dist * dispvert.vec;
            verts.push(v);
        }

        Ok(verts)
    }

    /// The two triangles of every tile of one displacement, diagonal
    /// alternating by `(x + y)` parity.
    pub fn displacement_triangles(&self, disp_idx: usize) -> SimResult<Vec<[Vector3<f32>; 3]>> {
        let dispinfo = &self.dispinfos[disp_idx];
        let row_verts = dispinfo.row_verts();
        let tiles = dispinfo.tiles_per_side();

        let verts = self.displacement_vertices(disp_idx)?;

        let mut triangles = Vec::with_capacity(tiles * tiles * 2);
        for tile_y in 0..tiles {
            for tile_x in 0..tiles {
                let top_left = verts[tile_y * row_verts + (tile_x + 1)];
                let bot_left = verts[(tile_y + 1) * row_verts + (tile_x + 1)];
                let bot_right = verts[(tile_y + 1) * row_verts + tile_x];
                let top_right = verts[tile_y * row_verts + tile_x];

                if (tile_x + tile_y) % 2 == 0 {
                    triangles.push([top_left, top_right, bot_left]);
                    triangles.push([bot_left, top_right, bot_right]);
                } else {
                    triangles.push([top_left, bot_right, bot_left]);
                    triangles.push([top_left, top_right, bot_right]);
                }
            }
        }

        Ok(triangles)
    }

    /// Triangles of every displacement that takes part in hull collision.
    /// Bad displacements are reported and skipped.
    pub fn displacement_face_triangles(&self, report: &mut ErrorReport) -> Vec<[Vector3<f32>; 3]> {
        let mut faces = Vec::new();
        for disp_idx in 0..self.dispinfos.len() {
            if self.dispinfos[disp_idx].has_no_hull_coll() {
                continue;
            }
            match self.displacement_triangles(disp_idx) {
                Ok(tris) => faces.extend(tris),
                Err(err) => report.push(err),
            }
        }
        faces
    }

    /// Thin highlight strips along the 4 outer edges of each displacement,
    /// hovering above the surface and pulled slightly inward. Render-only.
    pub fn displacement_boundary_faces(&self, report: &mut ErrorReport) -> Vec<Polygon> {
        let mut total_faces: Vec<Polygon> = Vec::new();

        for disp_idx in 0..self.dispinfos.len() {
            let dispinfo = &self.dispinfos[disp_idx];
            if dispinfo.has_no_hull_coll() {
                continue;
            }

            let row_verts = dispinfo.row_verts();
            let verts = match self.displacement_vertices(disp_idx) {
                Ok(v) => v,
                Err(err) => {
                    report.push(err);
                    continue;
                }
            };

            // Outermost and second-outermost vertex line of each side,
            // walking the perimeter.
            let mut first_outer: [Vec<Vector3<f32>>; 4] = Default::default();
            let mut secnd_outer: [Vec<Vector3<f32>>; 4] = Default::default();

            for i in 0..row_verts {
                // Top row, right to left
                let idx = i;
                first_outer[0].push(verts[idx]);
                secnd_outer[0].push(verts[idx + row_verts]);
            }
            for i in 0..row_verts {
                // Left column, top to bottom
                let idx = row_verts - 1 + i * row_verts;
                first_outer[1].push(verts[idx]);
                secnd_outer[1].push(verts[idx - 1]);
            }
            for i in 0..row_verts {
                // Bottom row, left to right
                let idx = row_verts * row_verts - 1 - i;
                first_outer[2].push(verts[idx]);
                secnd_outer[2].push(verts[idx - row_verts]);
            }
            for i in 0..row_verts {
                // Right column, bottom to top
                let idx = (row_verts - 1) * row_verts - i * row_verts;
                first_outer[3].push(verts[idx]);
                secnd_outer[3].push(verts[idx + 1]);
            }

            for side in 0..4 {
                let first_line = &first_outer[side];
                let secnd_line = &secnd_outer[side];

                // Normals of the triangles that own the outermost edges
                let mut edge_normals = Vec::with_capacity(row_verts - 1);
                for tri_idx in 0..row_verts - 1 {
                    edge_normals.push(cw_normal(
                        first_line[tri_idx + 1],
                        first_line[tri_idx],
                        secnd_line[1 + (tri_idx / 2) * 2],
                    ));
                }

                let hover_offset = |i: usize| -> Vector3<f32> {
                    let mut dir = Vector3::new(0.0, 0.0, 0.0);
                    if i != 0 {
                        dir += edge_normals[i - 1];
                    }
                    if i != row_verts - 1 {
                        dir += edge_normals[i];
                    }
                    normalize_mut(&mut dir);
                    dir * DISP_BOUNDARY_HOVER
                };

                // Outer line: hover above the surface
                let mut outer_line = Vec::with_capacity(row_verts);
                for i in 0..row_verts {
                    outer_line.push(first_line[i] + hover_offset(i));
                }

                // Inner line: hover plus an inward pull. Odd vertices sit on
                // tile borders and use the true inward vector; even vertices
                // derive theirs from the adjacent edge directions.
                let mut inner_line = Vec::with_capacity(row_verts);
                for i in 0..row_verts {
                    let mut v = first_line[i] + hover_offset(i);

                    let true_inwards = secnd_line[i] - first_line[i];
                    let inwards = if i % 2 == 1 {
                        true_inwards
                    } else {
                        let mut dir = Vector3::new(0.0, 0.0, 0.0);
                        if i != 0 {
                            let tmp =
                                (first_line[i - 1] - first_line[i]).cross(edge_normals[i - 1]);
                            dir += normalized(tmp);
                        }
                        if i != row_verts - 1 {
                            let tmp = (first_line[i] - first_line[i + 1]).cross(edge_normals[i]);
                            dir += normalized(tmp);
                        }
                        normalize_mut(&mut dir);
                        dir * true_inwards.magnitude()
                    };
                    v += DISP_BOUNDARY_THICKNESS * inwards;
                    inner_line.push(v);
                }

                for tile in 0..row_verts - 1 {
                    total_faces.push(vec![
                        inner_line[tile],
                        inner_line[tile + 1],
                        outer_line[tile + 1],
                    ]);
                    total_faces.push(vec![
                        outer_line[tile + 1],
                        outer_line[tile],
                        inner_line[tile],
                    ]);
                }
            }
        }

        total_faces
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::map::data::DispFlags;
    use crate::map::synth;

    #[test]
    fn flat_grid_tessellates_to_tile_triangles() {
        let map = synth::flat_displacement_map(128.0, 2);
        let tris = map.displacement_triangles(0).unwrap();
        assert_eq!(tris.len(), 2 * 4 * 4);

        // Flat grid: every triangle lies in the z = 0 plane
        for tri in &tris {
            for v in tri {
                assert!(v.z.abs() < 1e-5);
            }
        }
    }

    #[test]
    fn checkerboard_diagonal_alternates() {
        let map = synth::flat_displacement_map(64.0, 2);
        let tris = map.displacement_triangles(0).unwrap();

        // Both triangles of one tile share the diagonal; for adjacent tiles
        // the shared edge flips. Verify by checking that tile (0,0) and tile
        // (1,0) do not use the same diagonal orientation: in an even tile
        // the two triangles share edge TR-BL, in an odd tile TL-BR.
        let t0 = &tris[0..2];
        let t1 = &tris[2..4];

        let shared_edge = |pair: &[[Vector3<f32>; 3]]| {
            let mut shared = Vec::new();
            for a in &pair[0] {
                for b in &pair[1] {
                    if (a - b).magnitude() < 1e-6 {
                        shared.push(*a);
                    }
                }
            }
            shared
        };

        let d0 = shared_edge(t0);
        let d1 = shared_edge(t1);
        assert_eq!(d0.len(), 2);
        assert_eq!(d1.len(), 2);

        let dir0 = normalized(d0[1] - d0[0]);
        let dir1 = normalized(d1[1] - d1[0]);
        // The two diagonals must not be parallel
        assert!(dir0.dot(dir1).abs() < 0.99, "diagonals did not alternate");
    }

    #[test]
    fn offsets_displace_along_offset_vectors() {
        let mut map = crate::map::data::ParsedMap::empty();
        let row_verts = 5usize;
        let mut offsets = vec![Vector3::new(0.0, 0.0, 0.0); row_verts * row_verts];
        // Raise the exact center vertex by 32 units
        offsets[2 * row_verts + 2] = Vector3::new(0.0, 0.0, 32.0);
        synth::push_flat_displacement(
            &mut map,
            Vector3::new(0.0, 0.0, 0.0),
            128.0,
            2,
            &offsets,
            DispFlags::empty(),
        );
        synth::finalize_worldspawn(&mut map);

        let verts = map.displacement_vertices(0).unwrap();
        let raised: Vec<_> = verts.iter().filter(|v| v.z > 31.0).collect();
        assert_eq!(raised.len(), 1);
        assert!((raised[0].x - 64.0).abs() < 1e-4);
        assert!((raised[0].y - 64.0).abs() < 1e-4);
    }

    #[test]
    fn no_hull_coll_is_excluded_from_collision_faces() {
        let mut map = crate::map::data::ParsedMap::empty();
        let offsets = vec![Vector3::new(0.0, 0.0, 0.0); 25];
        synth::push_flat_displacement(
            &mut map,
            Vector3::new(0.0, 0.0, 0.0),
            64.0,
            2,
            &offsets,
            DispFlags::NO_HULL_COLL,
        );
        synth::finalize_worldspawn(&mut map);

        let mut report = ErrorReport::new();
        let tris = map.displacement_face_triangles(&mut report);
        assert!(tris.is_empty());
        assert!(report.is_empty());
    }

    #[test]
    fn boundary_strips_hover_above_surface() {
        let map = synth::flat_displacement_map(128.0, 2);
        let mut report = ErrorReport::new();
        let strips = map.displacement_boundary_faces(&mut report);
        assert!(report.is_empty());
        // 4 sides, 4 tiles each, 2 triangles per tile
        assert_eq!(strips.len(), 4 * 4 * 2);
        for face in &strips {
            for v in face {
                assert!(v.z > 0.5, "boundary vertex not hovering: {:?}", v);
            }
        }
    }
}
