//! Synthetic map builders.
//!
//! Small hand-assembled [`ParsedMap`] instances used by the test suites and
//! by anyone who wants a collidable world without a real map file: axial
//! boxes, wedges, displacement grids. All of them produce a worldspawn model
//! whose single leaf lists every brush.

use cgmath::{InnerSpace, Vector3};

use crate::map::data::{
    BrushContents, DispFlags, DispInfo, DispVert, MapBrush, MapBrushSide, MapEdge, MapFace,
    MapLeaf, MapModel, MapPlane, ParsedMap,
};

/// Append one plane + brushside pair to the map, returning the side index.
pub fn push_side(map: &mut ParsedMap, normal: Vector3<f32>, dist: f32) -> usize {
    let plane_num = map.planes.len() as u16;
    map.planes.push(MapPlane { normal, dist });
    map.brushsides.push(MapBrushSide {
        plane_num,
        tex_info: -1,
        disp_info: -1,
        bevel: false,
    });
    map.brushsides.len() - 1
}

/// Append an axial box brush; returns the brush index.
pub fn push_axial_box(
    map: &mut ParsedMap,
    mins: Vector3<f32>,
    maxs: Vector3<f32>,
    contents: BrushContents,
) -> usize {
    let first_side = map.brushsides.len() as u32;
    push_side(map, Vector3::new(1.0, 0.0, 0.0), maxs.x);
    push_side(map, Vector3::new(-1.0, 0.0, 0.0), -mins.x);
    push_side(map, Vector3::new(0.0, 1.0, 0.0), maxs.y);
    push_side(map, Vector3::new(0.0, -1.0, 0.0), -mins.y);
    push_side(map, Vector3::new(0.0, 0.0, 1.0), maxs.z);
    push_side(map, Vector3::new(0.0, 0.0, -1.0), -mins.z);
    map.brushes.push(MapBrush {
        first_side,
        num_sides: 6,
        contents,
    });
    map.brushes.len() - 1
}

/// Add an extra cutting side to the most recently pushed brush.
pub fn push_extra_side(map: &mut ParsedMap, normal: Vector3<f32>, dist: f32) {
    push_side(map, normal, dist);
    let brush = map
        .brushes
        .last_mut()
        .expect("push_extra_side needs a brush");
    brush.num_sides += 1;
}

/// Build worldspawn (model 0): a single leaf listing every brush.
pub fn finalize_worldspawn(map: &mut ParsedMap) {
    map.leaf_brushes = (0..map.brushes.len() as u16).collect();
    map.leafs = vec![MapLeaf {
        contents: 0,
        first_leaf_face: 0,
        num_leaf_faces: 0,
        first_leaf_brush: 0,
        num_leaf_brushes: map.brushes.len() as u16,
    }];
    map.models = vec![MapModel {
        head_node: -1,
        first_face: 0,
        num_faces: 0,
    }];
}

/// A map holding one solid axial box brush.
pub fn single_box_map(mins: Vector3<f32>, maxs: Vector3<f32>) -> ParsedMap {
    let mut map = ParsedMap::empty();
    push_axial_box(&mut map, mins, maxs, BrushContents::SOLID);
    finalize_worldspawn(&mut map);
    map
}

/// A map holding one solid axial box brush per (mins, maxs) pair.
pub fn boxes_map(boxes: &[(Vector3<f32>, Vector3<f32>)]) -> ParsedMap {
    let mut map = ParsedMap::empty();
    for &(mins, maxs) in boxes {
        push_axial_box(&mut map, mins, maxs, BrushContents::SOLID);
    }
    finalize_worldspawn(&mut map);
    map
}

/// A 64-unit box cut into a triangular prism by a 45 degree plane through
/// the bottom +X edge and the top -X edge.
pub fn wedge_map() -> ParsedMap {
    let mut map = ParsedMap::empty();
    push_axial_box(
        &mut map,
        Vector3::new(0.0, 0.0, 0.0),
        Vector3::new(64.0, 64.0, 64.0),
        BrushContents::SOLID,
    );
    let n = Vector3::new(1.0, 0.0, 1.0).normalize();
    push_extra_side(&mut map, n, n.dot(Vector3::new(64.0, 0.0, 0.0)));
    finalize_worldspawn(&mut map);
    map
}

/// A 64-unit box plus one diagonal plane that only touches its corner.
/// The extra plane cuts nothing and must be skipped as redundant.
pub fn corner_grazed_box_map() -> ParsedMap {
    let mut map = ParsedMap::empty();
    push_axial_box(
        &mut map,
        Vector3::new(0.0, 0.0, 0.0),
        Vector3::new(64.0, 64.0, 64.0),
        BrushContents::SOLID,
    );
    let n = Vector3::new(1.0, 1.0, 1.0).normalize();
    push_extra_side(&mut map, n, n.dot(Vector3::new(64.0, 64.0, 64.0)));
    finalize_worldspawn(&mut map);
    map
}

/// A malformed brush missing its +Z axial side.
pub fn open_ended_brush_map() -> ParsedMap {
    let mut map = ParsedMap::empty();
    let first_side = map.brushsides.len() as u32;
    push_side(&mut map, Vector3::new(1.0, 0.0, 0.0), 64.0);
    push_side(&mut map, Vector3::new(-1.0, 0.0, 0.0), 0.0);
    push_side(&mut map, Vector3::new(0.0, 1.0, 0.0), 64.0);
    push_side(&mut map, Vector3::new(0.0, -1.0, 0.0), 0.0);
    push_side(&mut map, Vector3::new(0.0, 0.0, -1.0), 0.0);
    map.brushes.push(MapBrush {
        first_side,
        num_sides: 5,
        contents: BrushContents::SOLID,
    });
    finalize_worldspawn(&mut map);
    map
}

/// Add a square displacement over a dedicated 4-vertex face.
///
/// The face spans `corner .. corner + (size, size, 0)` in the XY plane;
/// `offsets` supplies one offset vector per grid vertex, row-major with
/// `(2^power + 1)^2` entries.
pub fn push_flat_displacement(
    map: &mut ParsedMap,
    corner: Vector3<f32>,
    size: f32,
    power: u32,
    offsets: &[Vector3<f32>],
    flags: DispFlags,
) -> usize {
    let row_verts = (1usize << power) + 1;
    assert_eq!(offsets.len(), row_verts * row_verts);

    // Face corners, CW viewed from above (+Z front side)
    let v0 = corner;
    let v1 = corner + Vector3::new(0.0, size, 0.0);
    let v2 = corner + Vector3::new(size, size, 0.0);
    let v3 = corner + Vector3::new(size, 0.0, 0.0);

    let base_vert = map.vertices.len() as u16;
    map.vertices.extend_from_slice(&[v0, v1, v2, v3]);

    let base_edge = map.edges.len();
    for i in 0..4u16 {
        map.edges.push(MapEdge {
            v: [base_vert + i, base_vert + (i + 1) % 4],
        });
    }

    let first_edge = map.surfedges.len() as u32;
    for i in 0..4 {
        map.surfedges.push((base_edge + i) as i32);
    }

    let face_idx = map.faces.len();
    map.faces.push(MapFace {
        plane_num: 0,
        first_edge,
        num_edges: 4,
        tex_info: -1,
        disp_info: map.dispinfos.len() as i16,
    });

    let disp_vert_start = map.dispverts.len() as u32;
    for off in offsets {
        let dist = off.magnitude();
        let vec = if dist > 0.0 { off / dist } else { *off };
        map.dispverts.push(DispVert { vec, dist });
    }

    map.dispinfos.push(DispInfo {
        start_pos: v0,
        disp_vert_start,
        disp_tri_start: 0,
        power,
        flags,
        map_face: face_idx as u16,
    });
    map.dispinfos.len() - 1
}

/// A map with a single flat displacement and no brushes.
pub fn flat_displacement_map(size: f32, power: u32) -> ParsedMap {
    let mut map = ParsedMap::empty();
    let row_verts = (1usize << power) + 1;
    let offsets = vec![Vector3::new(0.0, 0.0, 0.0); row_verts * row_verts];
    push_flat_displacement(
        &mut map,
        Vector3::new(0.0, 0.0, 0.0),
        size,
        power,
        &offsets,
        DispFlags::empty(),
    );
    finalize_worldspawn(&mut map);
    map
}
