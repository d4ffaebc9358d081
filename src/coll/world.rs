//! The collidable world.
//!
//! Owns every collision primitive the simulation queries: brushes from the
//! map, displacement collision tiles, per-prop collision caches and the BVH
//! over all of them. Constructed once per map load, then published behind a
//! shared immutable handle; concurrent readers need no synchronization.

use std::cell::RefCell;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use cgmath::{InnerSpace, Matrix4, Vector3};
use parking_lot::RwLock;
use rayon::prelude::*;
use rustc_hash::FxHashMap;

use crate::coll::aabb::Aabb;
use crate::coll::bvh::{Bvh, PrimitiveRef};
use crate::coll::dispcoll::{build_disp_coll_tiles, DispCollTile};
use crate::coll::trace::{
    clip_segment_to_expanded_planes, hull_support_offset, sweep_hull_triangle, ClipPlane,
    SweptQuery, TraceResult,
};
use crate::constants::DIST_EPSILON;
use crate::error::{ErrorReport, SimError, SimResult};
use crate::map::{BrushContents, FileOrigin, ParsedMap};
use crate::math::{
    inverse_model_transform, model_transform, normalized, rotation_matrix, transform_point,
    transform_vector, TriMesh,
};
use crate::phy::{decode_phy, DecodeOptions, PhyBlob, PhyModel};

/// External asset lookup, for maps that reference models outside their own
/// packed files. Implementations must be thread safe; prop loading is
/// parallel.
pub trait PhySource: Sync {
    /// Open the .phy file at the given game path, if it exists.
    fn open_phy(&self, phy_path: &str) -> Option<PhyBlob>;

    /// Whether the .mdl file at the given game path exists.
    fn mdl_exists(&self, mdl_path: &str) -> bool;
}

/// A source with no external assets (embedded or synthetic maps).
pub struct NoExternalAssets;

impl PhySource for NoExternalAssets {
    fn open_phy(&self, _phy_path: &str) -> Option<PhyBlob> {
        None
    }
    fn mdl_exists(&self, _mdl_path: &str) -> bool {
        false
    }
}

/// Collision brush: expanded-clip planes plus bounds and contents.
#[derive(Debug, Clone)]
pub struct CollBrush {
    pub planes: Vec<ClipPlane>,
    pub aabb: Aabb,
    pub contents: BrushContents,
}

/// One convex section of a collision model with precomputed planes.
#[derive(Debug, Clone)]
pub struct CollSection {
    pub mesh: TriMesh,
    /// Plane of each triangle, same order as `mesh.tris`.
    pub planes: Vec<ClipPlane>,
    pub aabb: Aabb,
}

/// A decoded collision model shared by every prop instance using it.
#[derive(Debug, Clone)]
pub struct CollisionModel {
    pub sections: Vec<CollSection>,
    /// Index into the world surface table.
    pub surface: i32,
}

/// Per-prop-instance collision cache: world bounds plus the precomputed
/// transforms that let queries run in model space.
#[derive(Debug, Clone)]
pub struct CollisionCache {
    /// Index into the world's collision model array.
    pub model: u32,
    pub world_aabb: Aabb,
    pub inv_transform: Matrix4<f32>,
    /// Model-to-world rotation (no scale, no translation).
    pub rotation: Matrix4<f32>,
    pub inv_scale: f32,
}

/// The immutable collidable world.
pub struct CollidableWorld {
    map: Arc<ParsedMap>,
    brushes: Vec<CollBrush>,
    disp_tiles: Vec<DispCollTile>,
    models: Vec<CollisionModel>,
    model_index: FxHashMap<String, u32>,
    caches: Vec<CollisionCache>,
    surfaces: Vec<String>,
    bvh: Bvh,
}

impl CollidableWorld {
    /// Assemble the world from a parsed map.
    ///
    /// Prop collision models are decoded in parallel; every primitive array
    /// is final before the BVH is built. Non-fatal problems land in the
    /// returned report.
    pub fn build(
        map: Arc<ParsedMap>,
        phy_source: &dyn PhySource,
        decode_options: DecodeOptions,
    ) -> (Self, ErrorReport) {
        match Self::build_cancellable(map.clone(), phy_source, decode_options, None) {
            Ok(result) => result,
            Err(err) => {
                // Without a cancel token the build cannot be interrupted;
                // keep the contract non-panicking anyway.
                log::error!("[CollidableWorld] build failed: {}", err);
                let mut report = ErrorReport::new();
                report.push(err);
                (
                    Self {
                        map,
                        brushes: Vec::new(),
                        disp_tiles: Vec::new(),
                        models: Vec::new(),
                        model_index: FxHashMap::default(),
                        caches: Vec::new(),
                        surfaces: vec!["default".to_string()],
                        bvh: Bvh::default(),
                    },
                    report,
                )
            }
        }
    }

    /// [`Self::build`] with a cancellation token, checked at chunk
    /// boundaries: between construction phases and per collision model.
    pub fn build_cancellable(
        map: Arc<ParsedMap>,
        phy_source: &dyn PhySource,
        decode_options: DecodeOptions,
        cancel: Option<&AtomicBool>,
    ) -> SimResult<(Self, ErrorReport)> {
        let mut report = ErrorReport::new();

        check_cancel(cancel)?;
        log::debug!("[CollidableWorld] building displacement collision trees");
        let disp_tiles = build_disp_coll_tiles(&map, &mut report);

        check_cancel(cancel)?;
        log::debug!("[CollidableWorld] loading prop collision models");
        let decoded = decode_prop_models(&map, phy_source, decode_options, cancel);
        check_cancel(cancel)?;

        // Surface table index 0 is the default class.
        let mut surfaces: Vec<String> = vec!["default".to_string()];
        let mut models: Vec<CollisionModel> = Vec::new();
        let mut model_index: FxHashMap<String, u32> = FxHashMap::default();

        for (mdl_path, outcome) in decoded {
            match outcome {
                Ok(phy_model) => {
                    let surface = intern_surface(&mut surfaces, &phy_model.surface_prop);
                    let model = build_collision_model(&phy_model, surface);
                    model_index.insert(mdl_path, models.len() as u32);
                    models.push(model);
                }
                Err(SimError::PhyMultipleSolids) => {
                    // Hostage and articulated-door models; skipped on purpose
                    log::debug!(
                        "[CollidableWorld] skipped multi-solid collision model: {}",
                        mdl_path
                    );
                }
                Err(err) => report.push(err),
            }
        }

        check_cancel(cancel)?;
        log::debug!("[CollidableWorld] creating prop collision caches");
        let mut caches: Vec<CollisionCache> = Vec::new();
        for sprop in &map.static_props {
            if !sprop.is_solid_with_vphysics() {
                continue;
            }
            let mdl_path = match map.static_prop_model_dict.get(sprop.model_idx as usize) {
                Some(path) => path,
                None => continue,
            };
            let Some(&model) = model_index.get(mdl_path) else {
                continue;
            };
            if let Some(cache) = build_collision_cache(
                model,
                &models[model as usize],
                sprop.origin,
                sprop.angles,
                sprop.uniform_scale,
            ) {
                caches.push(cache);
            }
        }
        for dprop in &map.dynamic_props {
            let Some(&model) = model_index.get(&dprop.model) else {
                continue;
            };
            if let Some(cache) = build_collision_cache(
                model,
                &models[model as usize],
                dprop.origin,
                dprop.angles,
                1.0,
            ) {
                caches.push(cache);
            }
        }

        check_cancel(cancel)?;
        log::debug!("[CollidableWorld] collecting collision brushes");
        let brushes = collect_collision_brushes(&map, &mut report);

        check_cancel(cancel)?;
        // BVH construction is only valid once all primitive arrays are final
        let mut primitives: Vec<(Aabb, PrimitiveRef)> =
            Vec::with_capacity(brushes.len() + disp_tiles.len() + caches.len());
        for (i, brush) in brushes.iter().enumerate() {
            primitives.push((brush.aabb, PrimitiveRef::Brush(i as u32)));
        }
        for (i, tile) in disp_tiles.iter().enumerate() {
            primitives.push((tile.aabb, PrimitiveRef::DispTile(i as u32)));
        }
        for (i, cache) in caches.iter().enumerate() {
            primitives.push((cache.world_aabb, PrimitiveRef::Prop(i as u32)));
        }
        let bvh = Bvh::build(primitives);

        log::info!(
            "[CollidableWorld] ready: {} brushes, {} disp tiles, {} prop caches ({} models), {} issues",
            brushes.len(),
            disp_tiles.len(),
            caches.len(),
            models.len(),
            report.len()
        );

        Ok((
            Self {
                map,
                brushes,
                disp_tiles,
                models,
                model_index,
                caches,
                surfaces,
                bvh,
            },
            report,
        ))
    }

    pub fn map(&self) -> &Arc<ParsedMap> {
        &self.map
    }

    pub fn brushes(&self) -> &[CollBrush] {
        &self.brushes
    }

    pub fn disp_tiles(&self) -> &[DispCollTile] {
        &self.disp_tiles
    }

    pub fn caches(&self) -> &[CollisionCache] {
        &self.caches
    }

    pub fn models(&self) -> &[CollisionModel] {
        &self.models
    }

    /// Model paths with successfully decoded collision models.
    pub fn has_collision_model(&self, mdl_path: &str) -> bool {
        self.model_index.contains_key(mdl_path)
    }

    /// Surface class name for a trace surface tag.
    pub fn surface_name(&self, surface: i32) -> Option<&str> {
        if surface < 0 {
            return None;
        }
        self.surfaces.get(surface as usize).map(String::as_str)
    }

    /// Ground friction multiplier for a surface tag. No confirmed mapping
    /// table exists; every class currently resolves to 1.0.
    pub fn surface_friction(&self, _surface: i32) -> f32 {
        1.0
    }

    /// Sweep an axis-aligned hull from `query.start` to `query.end` and
    /// report the earliest impact.
    pub fn sweep(&self, query: &SweptQuery) -> TraceResult {
        thread_local! {
            static CANDIDATES: RefCell<Vec<PrimitiveRef>> = RefCell::new(Vec::new());
        }

        let mut result = TraceResult::default();
        let swept = Aabb::swept_hull(query.start, query.end, query.mins, query.maxs)
            .expanded(DIST_EPSILON);

        CANDIDATES.with(|candidates| {
            let mut candidates = candidates.borrow_mut();
            self.bvh.query(&swept, &mut candidates);

            for candidate in candidates.iter() {
                match *candidate {
                    PrimitiveRef::Brush(i) => self.sweep_brush(&self.brushes[i as usize], query, &mut result),
                    PrimitiveRef::DispTile(i) => {
                        self.sweep_disp_tile(&self.disp_tiles[i as usize], query, &mut result)
                    }
                    PrimitiveRef::Prop(i) => {
                        self.sweep_prop(&self.caches[i as usize], query, &mut result)
                    }
                }
            }
        });

        result
    }

    fn sweep_brush(&self, brush: &CollBrush, query: &SweptQuery, result: &mut TraceResult) {
        if !brush.contents.intersects(query.contents_mask) {
            return;
        }
        clip_segment_to_expanded_planes(
            query.start,
            query.end,
            brush.planes.iter().map(|p| ClipPlane {
                dist: p.dist - hull_support_offset(p.normal, query.mins, query.maxs),
                ..*p
            }),
            |n| n,
            result,
        );
    }

    fn sweep_disp_tile(&self, tile: &DispCollTile, query: &SweptQuery, result: &mut TraceResult) {
        // Displacements are part of the solid world
        if !query.contents_mask.contains(BrushContents::SOLID) {
            return;
        }
        for i in 0..tile.tri_count as usize {
            sweep_hull_triangle(
                query.start,
                query.end,
                query.mins,
                query.maxs,
                &tile.tris[i],
                tile.normals[i],
                tile.surface,
                result,
            );
        }
    }

    fn sweep_prop(&self, cache: &CollisionCache, query: &SweptQuery, result: &mut TraceResult) {
        if !query.contents_mask.contains(BrushContents::SOLID) {
            return;
        }
        let model = &self.models[cache.model as usize];

        let start_m = transform_point(&cache.inv_transform, query.start);
        let end_m = transform_point(&cache.inv_transform, query.end);

        for section in &model.sections {
            // Section planes plus the section AABB planes as bevels. Hull
            // expansion happens against the world-space plane orientation.
            let bevels = aabb_bevel_planes(&section.aabb, model.surface);
            let planes = section.planes.iter().copied().chain(bevels);

            let expanded = planes.map(|p| {
                let world_normal = normalized(transform_vector(&cache.rotation, p.normal));
                let support =
                    hull_support_offset(world_normal, query.mins, query.maxs) * cache.inv_scale;
                ClipPlane {
                    dist: p.dist - support,
                    ..p
                }
            });

            clip_segment_to_expanded_planes(
                start_m,
                end_m,
                expanded,
                |n| normalized(transform_vector(&cache.rotation, n)),
                result,
            );
        }
    }
}

/// The six axial planes of a section AABB, used as bevel planes.
fn aabb_bevel_planes(aabb: &Aabb, surface: i32) -> [ClipPlane; 6] {
    [
        ClipPlane {
            normal: Vector3::new(1.0, 0.0, 0.0),
            dist: aabb.maxs.x,
            surface,
        },
        ClipPlane {
            normal: Vector3::new(-1.0, 0.0, 0.0),
            dist: -aabb.mins.x,
            surface,
        },
        ClipPlane {
            normal: Vector3::new(0.0, 1.0, 0.0),
            dist: aabb.maxs.y,
            surface,
        },
        ClipPlane {
            normal: Vector3::new(0.0, -1.0, 0.0),
            dist: -aabb.mins.y,
            surface,
        },
        ClipPlane {
            normal: Vector3::new(0.0, 0.0, 1.0),
            dist: aabb.maxs.z,
            surface,
        },
        ClipPlane {
            normal: Vector3::new(0.0, 0.0, -1.0),
            dist: -aabb.mins.z,
            surface,
        },
    ]
}

fn intern_surface(surfaces: &mut Vec<String>, name: &str) -> i32 {
    if name.is_empty() {
        return 0;
    }
    if let Some(idx) = surfaces.iter().position(|s| s == name) {
        return idx as i32;
    }
    surfaces.push(name.to_string());
    (surfaces.len() - 1) as i32
}

/// Fails once the cancellation token has tripped.
fn check_cancel(cancel: Option<&AtomicBool>) -> SimResult<()> {
    match cancel {
        Some(token) if token.load(Ordering::Relaxed) => Err(SimError::LoadCancelled),
        _ => Ok(()),
    }
}

/// Decode the collision model of every unique model path referenced by a
/// solid prop instance. Runs in parallel per model; joined before return.
/// A tripped cancel token makes the remaining models drop out quickly.
fn decode_prop_models(
    map: &ParsedMap,
    phy_source: &dyn PhySource,
    decode_options: DecodeOptions,
    cancel: Option<&AtomicBool>,
) -> Vec<(String, SimResult<PhyModel>)> {
    // Packed file directory keyed by path for sub-file lookup
    let mut packed_by_name: FxHashMap<&str, usize> = FxHashMap::default();
    for (i, packed) in map.packed_files.iter().enumerate() {
        packed_by_name.insert(packed.file_name.as_str(), i);
    }

    // Model paths referenced by at least one solid prop, deduplicated
    let mut solid_mdl_paths: BTreeSet<&str> = BTreeSet::new();
    for sprop in &map.static_props {
        if sprop.is_solid_with_vphysics() {
            if let Some(path) = map.static_prop_model_dict.get(sprop.model_idx as usize) {
                solid_mdl_paths.insert(path);
            }
        }
    }
    for dprop in &map.dynamic_props {
        solid_mdl_paths.insert(&dprop.model);
    }

    // Embedded maps are self-contained; regular maps must have the .mdl on
    // disk for the prop to count as solid, like the game itself requires.
    let use_external_assets = !map.is_embedded_map;
    let require_existing_mdl = !map.is_embedded_map;

    let paths: Vec<&str> = solid_mdl_paths.into_iter().collect();
    paths
        .par_iter()
        .filter_map(|&mdl_path| {
            if check_cancel(cancel).is_err() {
                return None;
            }
            if mdl_path.len() < 5 {
                return None;
            }
            let mut phy_path = mdl_path.to_string();
            phy_path.replace_range(phy_path.len() - 3.., "phy");

            let mdl_packed = packed_by_name.contains_key(mdl_path);
            let phy_packed = packed_by_name.get(phy_path.as_str()).copied();

            let mdl_external = use_external_assets && phy_source.mdl_exists(mdl_path);
            if require_existing_mdl && !mdl_packed && !mdl_external {
                return Some((
                    mdl_path.to_string(),
                    Err(SimError::AssetNotFound {
                        path: mdl_path.to_string(),
                    }),
                ));
            }

            let blob = match phy_packed {
                Some(packed_idx) => {
                    let packed = &map.packed_files[packed_idx];
                    let opened = match &map.file_origin {
                        FileOrigin::Memory(bytes) => {
                            PhyBlob::from_memory(bytes.clone(), packed.file_offset, packed.file_len)
                        }
                        FileOrigin::Filesystem(path) => {
                            PhyBlob::from_file_range(path, packed.file_offset, packed.file_len)
                        }
                    };
                    match opened {
                        Ok(blob) => blob,
                        Err(err) => return Some((mdl_path.to_string(), Err(err))),
                    }
                }
                None => {
                    let external = if use_external_assets {
                        phy_source.open_phy(&phy_path)
                    } else {
                        None
                    };
                    match external {
                        Some(blob) => blob,
                        // No .phy anywhere: the prop is simply non-solid
                        None => return None,
                    }
                }
            };

            Some((
                mdl_path.to_string(),
                decode_phy(blob.bytes(), decode_options),
            ))
        })
        .collect()
}

/// Per-section planes and bounds for a decoded model.
fn build_collision_model(phy_model: &PhyModel, surface: i32) -> CollisionModel {
    let mut sections = Vec::with_capacity(phy_model.sections.len());
    for mesh in &phy_model.sections {
        let aabb = Aabb::from_points(mesh.vertices.iter());

        let mut planes = Vec::with_capacity(mesh.tris.len());
        for tri in &mesh.tris {
            let v1 = mesh.vertices[tri.verts[0] as usize];
            let v2 = mesh.vertices[tri.verts[1] as usize];
            let v3 = mesh.vertices[tri.verts[2] as usize];
            let normal = crate::math::cw_normal(v1, v2, v3);
            planes.push(ClipPlane {
                normal,
                dist: normal.dot(v1),
                surface,
            });
        }

        sections.push(CollSection {
            mesh: mesh.clone(),
            planes,
            aabb,
        });
    }
    CollisionModel { sections, surface }
}

/// World AABB and inverse transform for one prop instance.
fn build_collision_cache(
    model: u32,
    collision_model: &CollisionModel,
    origin: Vector3<f32>,
    angles: Vector3<f32>,
    uniform_scale: f32,
) -> Option<CollisionCache> {
    let transform = model_transform(origin, angles, uniform_scale);
    let inv_transform = inverse_model_transform(origin, angles, uniform_scale)?;

    let mut world_aabb = Aabb::inverted();
    for section in &collision_model.sections {
        for corner in section.aabb.corners() {
            world_aabb.add_point(transform_point(&transform, corner));
        }
    }
    if collision_model.sections.is_empty() {
        return None;
    }

    Some(CollisionCache {
        model,
        world_aabb,
        inv_transform,
        rotation: rotation_matrix(angles),
        inv_scale: 1.0 / uniform_scale,
    })
}

/// Worldspawn brushes plus brushes of solid func_brush entities.
fn collect_collision_brushes(map: &ParsedMap, report: &mut ErrorReport) -> Vec<CollBrush> {
    let quirks = map.quirks();
    let interesting = BrushContents::player_solid()
        | BrushContents::LADDER
        | BrushContents::WATER
        | BrushContents::GRENADECLIP;

    let mut brushes = Vec::new();

    for &brush_idx in &map.worldspawn_brush_indices() {
        let brush = &map.brushes[brush_idx];
        if !brush.contents.intersects(interesting) {
            continue;
        }
        match build_coll_brush(map, brush_idx, &quirks) {
            Ok(coll_brush) => brushes.push(coll_brush),
            Err(err) => report.push(err),
        }
    }

    for func_brush in &map.func_brushes {
        if !func_brush.is_solid() {
            continue;
        }
        let Some(model_idx) = parse_model_ref(&func_brush.model) else {
            continue;
        };
        if model_idx == 0 || model_idx >= map.models.len() {
            report.push(SimError::MapMalformed {
                what: format!(
                    "func_brush at origin ({:.0},{:.0},{:.0}) has an invalid model idx",
                    func_brush.origin.x, func_brush.origin.y, func_brush.origin.z
                ),
            });
            continue;
        }

        let rotated = func_brush.angles != Vector3::new(0.0, 0.0, 0.0);
        let rotation = rotation_matrix(func_brush.angles);

        for &brush_idx in &map.model_brush_indices(model_idx) {
            let brush = &map.brushes[brush_idx];
            // Grenade-clip brushes do not work in brush entities
            if brush.contents.contains(BrushContents::GRENADECLIP) {
                continue;
            }
            if !brush.contents.intersects(interesting) {
                continue;
            }
            let mut coll_brush = match build_coll_brush(map, brush_idx, &quirks) {
                Ok(coll_brush) => coll_brush,
                Err(err) => {
                    report.push(err);
                    continue;
                }
            };

            // Rotate the planes, then translate by the entity origin
            let mut aabb = Aabb::inverted();
            for corner in coll_brush.aabb.corners() {
                let rotated_corner = if rotated {
                    transform_vector(&rotation, corner)
                } else {
                    corner
                };
                aabb.add_point(rotated_corner + func_brush.origin);
            }
            for plane in &mut coll_brush.planes {
                if rotated {
                    plane.normal = normalized(transform_vector(&rotation, plane.normal));
                }
                plane.dist += plane.normal.dot(func_brush.origin);
            }
            coll_brush.aabb = aabb;
            brushes.push(coll_brush);
        }
    }

    brushes
}

fn build_coll_brush(
    map: &ParsedMap,
    brush_idx: usize,
    quirks: &crate::map::MapQuirks,
) -> SimResult<CollBrush> {
    let brush = &map.brushes[brush_idx];
    let aabb = map.brush_aabb(brush_idx, quirks)?;

    let mut planes = Vec::with_capacity(brush.num_sides as usize);
    for i in 0..brush.num_sides as usize {
        if quirks.skip_brush_sides.contains(&(brush_idx, i)) {
            continue;
        }
        let side = &map.brushsides[brush.first_side as usize + i];
        let plane = &map.planes[side.plane_num as usize];
        planes.push(ClipPlane {
            normal: plane.normal,
            dist: plane.dist,
            surface: 0,
        });
    }

    Ok(CollBrush {
        planes,
        aabb,
        contents: brush.contents,
    })
}

fn parse_model_ref(model: &str) -> Option<usize> {
    model.strip_prefix('*')?.parse().ok()
}

/// Published-world slot: the current world is swapped atomically on map
/// load, readers clone the handle and keep using their snapshot.
#[derive(Default)]
pub struct WorldSlot {
    slot: RwLock<Option<Arc<CollidableWorld>>>,
}

impl WorldSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, world: Arc<CollidableWorld>) {
        *self.slot.write() = Some(world);
    }

    pub fn clear(&self) {
        *self.slot.write() = None;
    }

    pub fn current(&self) -> Option<Arc<CollidableWorld>> {
        self.slot.read().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::map::synth;

    fn build_world(map: ParsedMap) -> CollidableWorld {
        let (world, report) = CollidableWorld::build(
            Arc::new(map),
            &NoExternalAssets,
            DecodeOptions::default(),
        );
        assert!(report.is_empty(), "unexpected issues: {}", report);
        world
    }

    fn player_hull() -> (Vector3<f32>, Vector3<f32>) {
        (
            Vector3::new(-16.0, -16.0, 0.0),
            Vector3::new(16.0, 16.0, 72.0),
        )
    }

    #[test]
    fn sweep_down_onto_floor_brush() {
        let map = synth::single_box_map(
            Vector3::new(-512.0, -512.0, -16.0),
            Vector3::new(512.0, 512.0, 0.0),
        );
        let world = build_world(map);

        let (mins, maxs) = player_hull();
        let query = SweptQuery::new(
            Vector3::new(0.0, 0.0, 100.0),
            Vector3::new(0.0, 0.0, -100.0),
            mins,
            maxs,
        );
        let result = world.sweep(&query);

        assert!(result.did_hit());
        assert!(!result.startsolid);
        assert_eq!(result.plane_normal, Vector3::new(0.0, 0.0, 1.0));
        // Feet travel 100 units to the floor at z = 0 (epsilon pull-back)
        let end = result.end_position(&query);
        assert!(end.z >= 0.0);
        assert!(end.z < 0.1);
    }

    #[test]
    fn sweep_in_free_space_is_clear() {
        let map = synth::single_box_map(
            Vector3::new(-512.0, -512.0, -16.0),
            Vector3::new(512.0, 512.0, 0.0),
        );
        let world = build_world(map);

        let (mins, maxs) = player_hull();
        let query = SweptQuery::new(
            Vector3::new(0.0, 0.0, 200.0),
            Vector3::new(50.0, 50.0, 150.0),
            mins,
            maxs,
        );
        let result = world.sweep(&query);
        assert_eq!(result.fraction, 1.0);
        assert!(!result.startsolid);
        assert_eq!(result.surface, -1);
    }

    #[test]
    fn ladder_contents_respect_query_mask() {
        let mut map = ParsedMap::empty();
        synth::push_axial_box(
            &mut map,
            Vector3::new(-32.0, -32.0, 0.0),
            Vector3::new(32.0, 32.0, 128.0),
            BrushContents::LADDER,
        );
        synth::finalize_worldspawn(&mut map);
        let world = build_world(map);

        let (mins, maxs) = player_hull();
        let start = Vector3::new(-200.0, 0.0, 0.0);
        let end = Vector3::new(200.0, 0.0, 0.0);

        // Default player-solid mask passes through the ladder volume
        let solid_query = SweptQuery::new(start, end, mins, maxs);
        assert_eq!(world.sweep(&solid_query).fraction, 1.0);

        // A ladder-inclusive mask hits it
        let ladder_query =
            SweptQuery::new(start, end, mins, maxs).with_mask(BrushContents::LADDER);
        assert!(world.sweep(&ladder_query).fraction < 1.0);
    }

    #[test]
    fn sweep_hits_displacement_tiles() {
        let mut map = ParsedMap::empty();
        let offsets = vec![Vector3::new(0.0, 0.0, 0.0); 25];
        synth::push_flat_displacement(
            &mut map,
            Vector3::new(-64.0, -64.0, 10.0),
            128.0,
            2,
            &offsets,
            crate::map::DispFlags::empty(),
        );
        synth::finalize_worldspawn(&mut map);
        let world = build_world(map);

        let (mins, maxs) = player_hull();
        let query = SweptQuery::new(
            Vector3::new(0.0, 0.0, 100.0),
            Vector3::new(0.0, 0.0, -100.0),
            mins,
            maxs,
        );
        let result = world.sweep(&query);
        assert!(result.did_hit());
        assert!(result.plane_normal.z > 0.99);
        let end = result.end_position(&query);
        assert!((end.z - 10.0).abs() < 0.1);
    }

    // Source-space half extent that decodes to 12 world units
    const CUBE_HALF_SOURCE: f32 = 0.3048;
    const CUBE_HALF_WORLD: f32 = 12.0;

    fn prop_map(
        phy_bytes: Vec<u8>,
        origin: Vector3<f32>,
        angles: Vector3<f32>,
        uniform_scale: f32,
        embedded: bool,
    ) -> ParsedMap {
        let mut map = ParsedMap::empty();
        map.is_embedded_map = embedded;

        let len = phy_bytes.len() as u64;
        map.file_origin = FileOrigin::Memory(Arc::from(phy_bytes.into_boxed_slice()));
        map.packed_files.push(crate::map::PackedFile {
            file_name: "models/props/crate.phy".to_string(),
            file_offset: 0,
            file_len: len,
        });

        map.static_prop_model_dict = vec!["models/props/crate.mdl".to_string()];
        map.static_props.push(crate::map::StaticProp {
            origin,
            angles,
            uniform_scale,
            model_idx: 0,
            solid: 6,
        });
        synth::finalize_worldspawn(&mut map);
        map
    }

    #[test]
    fn prop_cache_bounds_contain_transformed_sections() {
        let bytes =
            crate::phy::testutil::cube_phy_bytes(-CUBE_HALF_SOURCE, CUBE_HALF_SOURCE, "metal");
        let origin = Vector3::new(100.0, 50.0, 25.0);
        let angles = Vector3::new(10.0, 33.0, -20.0);
        let scale = 1.5;
        let map = prop_map(bytes, origin, angles, scale, true);
        let world = build_world(map);

        assert_eq!(world.caches().len(), 1);
        let cache = &world.caches()[0];
        let model = &world.models()[cache.model as usize];

        let transform = model_transform(origin, angles, scale);
        for section in &model.sections {
            for v in &section.mesh.vertices {
                let world_v = transform_point(&transform, *v);
                assert!(
                    cache.world_aabb.expanded(1e-3).contains_point(world_v),
                    "cache AABB does not contain {:?}",
                    world_v
                );
            }
        }
    }

    #[test]
    fn sweep_lands_on_rotated_prop() {
        let bytes =
            crate::phy::testutil::cube_phy_bytes(-CUBE_HALF_SOURCE, CUBE_HALF_SOURCE, "metal");
        let map = prop_map(
            bytes,
            Vector3::new(0.0, 0.0, 0.0),
            Vector3::new(0.0, 45.0, 0.0),
            1.0,
            true,
        );
        let world = build_world(map);

        let (mins, maxs) = player_hull();
        let query = SweptQuery::new(
            Vector3::new(0.0, 0.0, 100.0),
            Vector3::new(0.0, 0.0, -100.0),
            mins,
            maxs,
        );
        let result = world.sweep(&query);

        assert!(result.did_hit());
        assert!(!result.startsolid);
        assert!(result.plane_normal.z > 0.99, "normal {:?}", result.plane_normal);
        let end = result.end_position(&query);
        assert!((end.z - CUBE_HALF_WORLD).abs() < 0.1, "end z {}", end.z);
        assert_eq!(world.surface_name(result.surface), Some("metal"));
    }

    #[test]
    fn multi_solid_prop_is_skipped_without_error() {
        use crate::phy::testutil::PhyWriter;
        let bytes = PhyWriter::new(2).finish(
            &[(0, vec![[0u16, 1, 2]])],
            &[[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
            "solid {\n}\n",
        );
        let map = prop_map(
            bytes,
            Vector3::new(0.0, 0.0, 0.0),
            Vector3::new(0.0, 0.0, 0.0),
            1.0,
            true,
        );

        let (world, report) = CollidableWorld::build(
            Arc::new(map),
            &NoExternalAssets,
            DecodeOptions::default(),
        );
        assert!(report.is_empty(), "multi-solid must not be an error");
        assert!(world.caches().is_empty());
    }

    #[test]
    fn missing_mdl_on_regular_map_is_reported() {
        let bytes =
            crate::phy::testutil::cube_phy_bytes(-CUBE_HALF_SOURCE, CUBE_HALF_SOURCE, "metal");
        // Not embedded: the .mdl must exist somewhere, and it does not
        let map = prop_map(
            bytes,
            Vector3::new(0.0, 0.0, 0.0),
            Vector3::new(0.0, 0.0, 0.0),
            1.0,
            false,
        );

        let (world, report) = CollidableWorld::build(
            Arc::new(map),
            &NoExternalAssets,
            DecodeOptions::default(),
        );
        assert_eq!(report.len(), 1);
        assert!(matches!(
            report.entries()[0],
            crate::error::SimError::AssetNotFound { .. }
        ));
        assert!(world.caches().is_empty());
    }

    #[test]
    fn tripped_cancel_token_aborts_the_build() {
        let map = synth::single_box_map(
            Vector3::new(-64.0, -64.0, -16.0),
            Vector3::new(64.0, 64.0, 0.0),
        );
        let cancel = AtomicBool::new(true);
        let outcome = CollidableWorld::build_cancellable(
            Arc::new(map),
            &NoExternalAssets,
            DecodeOptions::default(),
            Some(&cancel),
        );
        assert!(matches!(outcome, Err(SimError::LoadCancelled)));
    }

    #[test]
    fn world_slot_swaps_atomically() {
        let slot = WorldSlot::new();
        assert!(slot.current().is_none());

        let world = build_world(synth::single_box_map(
            Vector3::new(-8.0, -8.0, -8.0),
            Vector3::new(8.0, 8.0, 8.0),
        ));
        slot.publish(Arc::new(world));
        assert!(slot.current().is_some());

        slot.clear();
        assert!(slot.current().is_none());
    }
}
