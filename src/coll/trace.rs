//! Swept hull trace primitives.
//!
//! The movement code sweeps an axis-aligned box from A to B and needs the
//! earliest impact with the world. Brushes (and convex prop sections, in
//! model space) are handled by clipping the segment against their
//! Minkowski-expanded half-spaces; displacement tiles by a separating-axis
//! interval sweep against their two triangles.
//!
//! All boundary tests use the network-grid epsilon (1/32 unit), and hits are
//! pulled back by it so the hull never comes to rest flush inside a surface.

use cgmath::{InnerSpace, Vector3};

use crate::constants::DIST_EPSILON;
use crate::map::BrushContents;

/// A swept box query: hull extents are relative to the origin points.
/// `start == end` is the degenerate point query.
#[derive(Debug, Clone, Copy)]
pub struct SweptQuery {
    pub start: Vector3<f32>,
    pub end: Vector3<f32>,
    pub mins: Vector3<f32>,
    pub maxs: Vector3<f32>,
    /// Brushes without any of these contents are ignored.
    pub contents_mask: BrushContents,
}

impl SweptQuery {
    pub fn new(
        start: Vector3<f32>,
        end: Vector3<f32>,
        mins: Vector3<f32>,
        maxs: Vector3<f32>,
    ) -> Self {
        Self {
            start,
            end,
            mins,
            maxs,
            contents_mask: BrushContents::player_solid(),
        }
    }

    pub fn with_mask(mut self, mask: BrushContents) -> Self {
        self.contents_mask = mask;
        self
    }

    pub fn delta(&self) -> Vector3<f32> {
        self.end - self.start
    }
}

/// Result of a swept trace. Values only; references nothing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TraceResult {
    /// Largest t in [0, 1] such that the hull moved to `start + t * delta`
    /// does not intersect any solid.
    pub fraction: f32,
    /// Unit normal of the first surface hit, pointing out of the obstacle.
    /// Zero when nothing was hit.
    pub plane_normal: Vector3<f32>,
    /// Hull intersects solid already at the start point.
    pub startsolid: bool,
    /// Hull is in solid over the whole sweep.
    pub allsolid: bool,
    /// Surface class tag of the hit surface; -1 when no hit.
    pub surface: i32,
}

impl Default for TraceResult {
    fn default() -> Self {
        Self {
            fraction: 1.0,
            plane_normal: Vector3::new(0.0, 0.0, 0.0),
            startsolid: false,
            allsolid: false,
            surface: -1,
        }
    }
}

impl TraceResult {
    pub fn did_hit(&self) -> bool {
        self.fraction < 1.0 || self.startsolid
    }

    /// Point reached by the sweep.
    pub fn end_position(&self, query: &SweptQuery) -> Vector3<f32> {
        query.start + self.fraction * query.delta()
    }
}

/// One clipping half-space with its surface tag.
#[derive(Debug, Clone, Copy)]
pub struct ClipPlane {
    pub normal: Vector3<f32>,
    pub dist: f32,
    pub surface: i32,
}

/// Support offset of a hull [mins, maxs] against a plane normal: the
/// smallest `n . q` over hull corner offsets q. Shifting the plane by this
/// reduces the box sweep to a point sweep.
pub fn hull_support_offset(normal: Vector3<f32>, mins: Vector3<f32>, maxs: Vector3<f32>) -> f32 {
    let mut support = 0.0;
    for axis in 0..3 {
        support += normal[axis] * if normal[axis] > 0.0 { mins[axis] } else { maxs[axis] };
    }
    support
}

/// Clip the segment `start -> end` against a convex set of already-expanded
/// half-spaces and merge the outcome into `result`.
///
/// `map_normal` converts a winning plane normal into world space (identity
/// for world brushes, the prop rotation for model-space sections).
pub fn clip_segment_to_expanded_planes<I, F>(
    start: Vector3<f32>,
    end: Vector3<f32>,
    planes: I,
    map_normal: F,
    result: &mut TraceResult,
) where
    I: IntoIterator<Item = ClipPlane>,
    F: Fn(Vector3<f32>) -> Vector3<f32>,
{
    let mut enter_frac = -1.0f32;
    let mut leave_frac = 1.0f32;
    let mut clip_plane: Option<ClipPlane> = None;
    let mut getout = false;
    let mut startout = false;

    for plane in planes {
        let d1 = plane.normal.dot(start) - plane.dist;
        let d2 = plane.normal.dot(end) - plane.dist;

        if d2 > 0.0 {
            getout = true; // endpoint is not in solid
        }
        if d1 > 0.0 {
            startout = true;
        }

        // Completely in front of this face; the convex set is missed.
        // Also covers the stationary case (d2 == d1 > 0).
        if d1 > 0.0 && d2 >= d1 {
            return;
        }
        if d1 <= 0.0 && d2 <= 0.0 {
            continue;
        }

        if d1 > d2 {
            // Entering: pull the crossing back by the collision epsilon
            let f = (d1 - DIST_EPSILON) / (d1 - d2);
            if f > enter_frac {
                enter_frac = f;
                clip_plane = Some(plane);
            }
        } else {
            // Leaving
            let f = (d1 + DIST_EPSILON) / (d1 - d2);
            if f < leave_frac {
                leave_frac = f;
            }
        }
    }

    if !startout {
        // Original point was inside the solid
        result.startsolid = true;
        if !getout {
            result.allsolid = true;
            result.fraction = 0.0;
        }
        return;
    }

    if enter_frac < leave_frac && enter_frac > -1.0 && enter_frac < result.fraction {
        if let Some(plane) = clip_plane {
            result.fraction = enter_frac.max(0.0);
            result.plane_normal = map_normal(plane.normal);
            result.surface = plane.surface;
        }
    }
}

/// Separating-axis sweep of a moving hull against one triangle.
///
/// Tests the triangle plane, the three coordinate axes and the nine
/// edge-cross axes. The reported hit normal is always the triangle's stored
/// plane normal, which is what ground categorization consumes.
#[allow(clippy::too_many_arguments)]
pub fn sweep_hull_triangle(
    start: Vector3<f32>,
    end: Vector3<f32>,
    mins: Vector3<f32>,
    maxs: Vector3<f32>,
    tri: &[Vector3<f32>; 3],
    plane_normal: Vector3<f32>,
    surface: i32,
    result: &mut TraceResult,
) {
    let delta = end - start;
    let half = (maxs - mins) * 0.5;
    let center0 = start + (mins + maxs) * 0.5;

    let edges = [tri[1] - tri[0], tri[2] - tri[1], tri[0] - tri[2]];
    let coord_axes = [
        Vector3::new(1.0, 0.0, 0.0),
        Vector3::new(0.0, 1.0, 0.0),
        Vector3::new(0.0, 0.0, 1.0),
    ];

    let mut axes: [Vector3<f32>; 13] = [Vector3::new(0.0, 0.0, 0.0); 13];
    let mut axis_count = 0;
    axes[axis_count] = plane_normal;
    axis_count += 1;
    for a in coord_axes {
        axes[axis_count] = a;
        axis_count += 1;
    }
    for e in edges {
        for a in coord_axes {
            let cross = e.cross(a);
            if cross.magnitude2() > 1.0e-12 {
                axes[axis_count] = cross;
                axis_count += 1;
            }
        }
    }

    let mut enter = f32::NEG_INFINITY;
    let mut leave = f32::INFINITY;

    for axis in &axes[..axis_count] {
        let mut tri_min = f32::INFINITY;
        let mut tri_max = f32::NEG_INFINITY;
        for v in tri {
            let d = axis.dot(*v);
            tri_min = tri_min.min(d);
            tri_max = tri_max.max(d);
        }

        let box_center = axis.dot(center0);
        let box_radius =
            axis.x.abs() * half.x + axis.y.abs() * half.y + axis.z.abs() * half.z;
        let box_min = box_center - box_radius;
        let box_max = box_center + box_radius;

        let speed = axis.dot(delta);
        if speed.abs() < 1.0e-8 {
            // Not moving along this axis; separation here is permanent
            if box_max < tri_min || box_min > tri_max {
                return;
            }
            continue;
        }

        let t_cross_min = (tri_min - box_max) / speed;
        let t_cross_max = (tri_max - box_min) / speed;
        let (axis_enter, axis_leave) = if speed > 0.0 {
            (t_cross_min, t_cross_max)
        } else {
            (t_cross_max, t_cross_min)
        };

        enter = enter.max(axis_enter);
        leave = leave.min(axis_leave);
        if enter > leave {
            return;
        }
    }

    if leave < 0.0 || enter > 1.0 {
        return;
    }

    if enter <= 0.0 {
        // Overlapping before any motion
        result.startsolid = true;
        if leave >= 1.0 {
            result.allsolid = true;
            result.fraction = 0.0;
        }
        return;
    }

    let len = delta.magnitude();
    let fraction = if len > 0.0 {
        (enter - DIST_EPSILON / len).max(0.0)
    } else {
        enter.max(0.0)
    };

    if fraction < result.fraction {
        result.fraction = fraction;
        result.plane_normal = plane_normal;
        result.surface = surface;
    }
}
