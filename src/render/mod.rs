//! Render-side data contract.
//!
//! [`RenderableWorld`] is everything a renderer needs from a loaded map,
//! as plain data: per-category brush face lists, displacement triangles and
//! boundary strips, trigger-push volumes and per-model prop instance
//! transforms. All faces wind clockwise viewed from outside. No GPU types
//! appear here.

pub mod glide;

pub use glide::{classify, Glidability};

use std::collections::BTreeMap;

use cgmath::{Matrix4, Vector3};
use rustc_hash::FxHashMap;

use crate::coll::CollidableWorld;
use crate::error::{ErrorReport, SimError};
use crate::map::{BrushCategory, ParsedMap, Polygon};
use crate::math::{cw_triangle_faces_up, model_transform, rotation_matrix, transform_vector};

/// Instance transforms of every placed prop sharing one model.
#[derive(Debug, Clone)]
pub struct PropInstanceList {
    pub model_path: String,
    pub transforms: Vec<Matrix4<f32>>,
}

/// All drawable world data extracted from a parsed map.
#[derive(Debug, Clone, Default)]
pub struct RenderableWorld {
    /// Reconstructed brush faces by category.
    pub brush_faces: FxHashMap<BrushCategory, Vec<Polygon>>,
    /// Displacement surface triangles.
    pub displacement_tris: Vec<[Vector3<f32>; 3]>,
    /// Hovering edge-highlight strips along displacement boundaries.
    pub displacement_boundaries: Vec<Polygon>,
    /// Faces of trigger_push volumes that act on players.
    pub trigger_push_faces: Vec<Polygon>,
    /// Per-model instance transforms of solid props.
    pub prop_instances: Vec<PropInstanceList>,
}

impl RenderableWorld {
    /// Extract the drawable world. Prop instances are limited to props
    /// whose collision model actually loaded, mirroring what the
    /// simulation collides with.
    pub fn build(
        map: &ParsedMap,
        coll_world: &CollidableWorld,
        report: &mut ErrorReport,
    ) -> Self {
        let mut renderable = RenderableWorld::default();

        log::debug!("[RenderableWorld] tessellating displacements");
        renderable.displacement_tris = map.displacement_face_triangles(report);
        renderable.displacement_boundaries = map.displacement_boundary_faces(report);

        log::debug!("[RenderableWorld] reconstructing brush faces");
        let worldspawn_brushes = map.worldspawn_brush_indices();

        for category in BrushCategory::ALL {
            let brush_test = move |brush: &crate::map::MapBrush| category.brush_test(brush);
            let side_test = move |side: &crate::map::MapBrushSide, map: &ParsedMap| {
                category.side_test(side, map)
            };
            let brush_pred: &dyn Fn(&crate::map::MapBrush) -> bool = &brush_test;
            let side_pred: &dyn Fn(&crate::map::MapBrushSide, &ParsedMap) -> bool = &side_test;

            let mut faces = map.brush_face_polygons(
                &worldspawn_brushes,
                Some(brush_pred),
                Some(side_pred),
                report,
            );

            // Brush entities contribute extra faces, except grenade-clip
            // ones, which the game ignores inside brush entities
            if category != BrushCategory::GrenadeClip {
                collect_func_brush_faces(map, brush_pred, side_pred, &mut faces, report);
            }

            // Only the water surface is drawn; transparent side and bottom
            // faces would fight with it
            if category == BrushCategory::Water {
                faces.retain(|face| cw_triangle_faces_up(face[0], face[1], face[2]));
            }

            renderable.brush_faces.insert(category, faces);
        }

        renderable.trigger_push_faces = collect_trigger_push_faces(map, report);
        renderable.prop_instances = collect_prop_instances(map, coll_world);

        renderable
    }
}

fn collect_func_brush_faces(
    map: &ParsedMap,
    brush_pred: &dyn Fn(&crate::map::MapBrush) -> bool,
    side_pred: &dyn Fn(&crate::map::MapBrushSide, &ParsedMap) -> bool,
    faces: &mut Vec<Polygon>,
    report: &mut ErrorReport,
) {
    for func_brush in &map.func_brushes {
        if !func_brush.is_solid() {
            continue;
        }
        let Some(model_idx) = func_brush.model.strip_prefix('*').and_then(|m| m.parse().ok())
        else {
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

        let brush_indices = map.model_brush_indices(model_idx);
        let mut entity_faces =
            map.brush_face_polygons(&brush_indices, Some(brush_pred), Some(side_pred), report);
        if entity_faces.is_empty() {
            continue;
        }

        let rotated = func_brush.angles != Vector3::new(0.0, 0.0, 0.0);
        let rotation = rotation_matrix(func_brush.angles);

        for face in &mut entity_faces {
            for v in face.iter_mut() {
                if rotated {
                    *v = transform_vector(&rotation, *v);
                }
                *v += func_brush.origin;
            }
        }
        faces.append(&mut entity_faces);
    }
}

fn collect_trigger_push_faces(map: &ParsedMap, report: &mut ErrorReport) -> Vec<Polygon> {
    let mut trigger_faces: Vec<Polygon> = Vec::new();

    for trigger_push in &map.trigger_pushes {
        if !trigger_push.can_push_players() {
            continue;
        }
        let Some(model_idx) = trigger_push
            .model
            .strip_prefix('*')
            .and_then(|m| m.parse().ok())
        else {
            continue;
        };
        if model_idx == 0 || model_idx >= map.models.len() {
            report.push(SimError::MapMalformed {
                what: format!(
                    "trigger_push at origin ({:.0},{:.0},{:.0}) has an invalid model idx",
                    trigger_push.origin.x, trigger_push.origin.y, trigger_push.origin.z
                ),
            });
            continue;
        }

        let brush_indices = map.model_brush_indices(model_idx);
        let mut faces = map.brush_face_polygons(&brush_indices, None, None, report);
        if faces.is_empty() {
            continue;
        }

        // Water-surface push triggers are lifted one unit so they stop
        // z-fighting with the water plane. Ladder-style push triggers keep
        // their exact position.
        let z_fighting_resolver = if trigger_push.only_falling_players {
            Vector3::new(0.0, 0.0, 0.0)
        } else {
            Vector3::new(0.0, 0.0, 1.0)
        };

        let transform = model_transform(
            trigger_push.origin + z_fighting_resolver,
            trigger_push.angles,
            1.0,
        );
        for face in &mut faces {
            for v in face.iter_mut() {
                *v = crate::math::transform_point(&transform, *v);
            }
        }

        trigger_faces.append(&mut faces);
    }

    trigger_faces
}

fn collect_prop_instances(map: &ParsedMap, coll_world: &CollidableWorld) -> Vec<PropInstanceList> {
    // BTreeMap keeps instance lists in a stable model order
    let mut instances: BTreeMap<&str, Vec<Matrix4<f32>>> = BTreeMap::new();

    for sprop in &map.static_props {
        if !sprop.is_solid_with_vphysics() {
            continue;
        }
        let Some(mdl_path) = map.static_prop_model_dict.get(sprop.model_idx as usize) else {
            continue;
        };
        if !coll_world.has_collision_model(mdl_path) {
            continue;
        }
        instances
            .entry(mdl_path)
            .or_default()
            .push(model_transform(sprop.origin, sprop.angles, sprop.uniform_scale));
    }

    for dprop in &map.dynamic_props {
        if !coll_world.has_collision_model(&dprop.model) {
            continue;
        }
        instances
            .entry(&dprop.model)
            .or_default()
            .push(model_transform(dprop.origin, dprop.angles, 1.0));
    }

    instances
        .into_iter()
        .map(|(model_path, transforms)| PropInstanceList {
            model_path: model_path.to_string(),
            transforms,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coll::NoExternalAssets;
    use crate::map::{synth, BrushContents};
    use crate::phy::DecodeOptions;
    use std::sync::Arc;

    fn build_both(map: ParsedMap) -> (Arc<ParsedMap>, CollidableWorld, RenderableWorld) {
        let map = Arc::new(map);
        let (coll, mut report) = CollidableWorld::build(
            map.clone(),
            &NoExternalAssets,
            DecodeOptions::default(),
        );
        let renderable = RenderableWorld::build(&map, &coll, &mut report);
        assert!(report.is_empty(), "unexpected issues: {}", report);
        (map, coll, renderable)
    }

    #[test]
    fn solid_box_lands_in_solid_category() {
        let map = synth::single_box_map(
            Vector3::new(0.0, 0.0, 0.0),
            Vector3::new(64.0, 64.0, 64.0),
        );
        let (_, _, renderable) = build_both(map);

        assert_eq!(renderable.brush_faces[&BrushCategory::Solid].len(), 6);
        assert!(renderable.brush_faces[&BrushCategory::Water].is_empty());
        assert!(renderable.brush_faces[&BrushCategory::Ladder].is_empty());
    }

    #[test]
    fn water_keeps_only_upward_faces() {
        let mut map = crate::map::ParsedMap::empty();
        synth::push_axial_box(
            &mut map,
            Vector3::new(0.0, 0.0, 0.0),
            Vector3::new(128.0, 128.0, 32.0),
            BrushContents::WATER,
        );
        synth::finalize_worldspawn(&mut map);
        let (_, _, renderable) = build_both(map);

        let water = &renderable.brush_faces[&BrushCategory::Water];
        assert_eq!(water.len(), 1);
        // The surviving face is the top surface at z = 32
        for v in &water[0] {
            assert_eq!(v.z, 32.0);
        }
    }

    #[test]
    fn displacements_appear_with_boundaries() {
        let map = synth::flat_displacement_map(128.0, 2);
        let (_, _, renderable) = build_both(map);
        assert_eq!(renderable.displacement_tris.len(), 32);
        assert!(!renderable.displacement_boundaries.is_empty());
    }
}
