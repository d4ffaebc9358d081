//! Displacement collision tiles.
//!
//! Each displacement tile contributes two triangles to hull collision.
//! Displacements flagged NO_HULL_COLL are excluded entirely.

use cgmath::{InnerSpace, Vector3};

use crate::coll::aabb::Aabb;
use crate::error::ErrorReport;
use crate::map::ParsedMap;

/// One collidable displacement tile: up to two triangles with their plane
/// normals and a tight AABB.
#[derive(Debug, Clone)]
pub struct DispCollTile {
    pub tris: [[Vector3<f32>; 3]; 2],
    pub normals: [Vector3<f32>; 2],
    pub tri_count: u8,
    pub aabb: Aabb,
    pub surface: i32,
}

/// Build the collision tiles of every hull-collidable displacement.
/// Malformed displacements are reported and skipped.
pub fn build_disp_coll_tiles(map: &ParsedMap, report: &mut ErrorReport) -> Vec<DispCollTile> {
    let mut tiles = Vec::new();

    for disp_idx in 0..map.dispinfos.len() {
        if map.dispinfos[disp_idx].has_no_hull_coll() {
            continue;
        }

        let triangles = match map.displacement_triangles(disp_idx) {
            Ok(t) => t,
            Err(err) => {
                report.push(err);
                continue;
            }
        };

        // displacement_triangles emits tile triangles in pairs
        for pair in triangles.chunks_exact(2) {
            let mut tile = DispCollTile {
                tris: [[Vector3::new(0.0, 0.0, 0.0); 3]; 2],
                normals: [Vector3::new(0.0, 0.0, 0.0); 2],
                tri_count: 0,
                aabb: Aabb::inverted(),
                surface: 0,
            };

            for tri in pair {
                let cross = (tri[2] - tri[0]).cross(tri[1] - tri[0]);
                if cross.magnitude2() < 1.0e-12 {
                    continue; // degenerate sliver
                }
                let idx = tile.tri_count as usize;
                tile.tris[idx] = *tri;
                tile.normals[idx] = cross.normalize();
                tile.tri_count += 1;
                for v in tri {
                    tile.aabb.add_point(*v);
                }
            }

            if tile.tri_count > 0 {
                tiles.push(tile);
            }
        }
    }

    log::debug!("[DispColl] built {} collision tiles", tiles.len());
    tiles
}
