//! Axis-aligned bounding box.

use cgmath::Vector3;

/// Axis-aligned bounding box in world units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub mins: Vector3<f32>,
    pub maxs: Vector3<f32>,
}

impl Aabb {
    pub fn new(mins: Vector3<f32>, maxs: Vector3<f32>) -> Self {
        Self { mins, maxs }
    }

    /// Inverted box that unions into any point set.
    pub fn inverted() -> Self {
        Self {
            mins: Vector3::new(f32::MAX, f32::MAX, f32::MAX),
            maxs: Vector3::new(f32::MIN, f32::MIN, f32::MIN),
        }
    }

    /// Tight box around a point set. Empty input yields the inverted box.
    pub fn from_points<'a, I: IntoIterator<Item = &'a Vector3<f32>>>(points: I) -> Self {
        let mut aabb = Self::inverted();
        for p in points {
            aabb.add_point(*p);
        }
        aabb
    }

    pub fn add_point(&mut self, p: Vector3<f32>) {
        for axis in 0..3 {
            if p[axis] < self.mins[axis] {
                self.mins[axis] = p[axis];
            }
            if p[axis] > self.maxs[axis] {
                self.maxs[axis] = p[axis];
            }
        }
    }

    pub fn union(&self, other: &Aabb) -> Aabb {
        Aabb {
            mins: Vector3::new(
                self.mins.x.min(other.mins.x),
                self.mins.y.min(other.mins.y),
                self.mins.z.min(other.mins.z),
            ),
            maxs: Vector3::new(
                self.maxs.x.max(other.maxs.x),
                self.maxs.y.max(other.maxs.y),
                self.maxs.z.max(other.maxs.z),
            ),
        }
    }

    pub fn intersects(&self, other: &Aabb) -> bool {
        self.mins.x <= other.maxs.x
            && self.maxs.x >= other.mins.x
            && self.mins.y <= other.maxs.y
            && self.maxs.y >= other.mins.y
            && self.mins.z <= other.maxs.z
            && self.maxs.z >= other.mins.z
    }

    pub fn contains_point(&self, p: Vector3<f32>) -> bool {
        p.x >= self.mins.x
            && p.x <= self.maxs.x
            && p.y >= self.mins.y
            && p.y <= self.maxs.y
            && p.z >= self.mins.z
            && p.z <= self.maxs.z
    }

    pub fn contains(&self, other: &Aabb) -> bool {
        self.mins.x <= other.mins.x
            && self.mins.y <= other.mins.y
            && self.mins.z <= other.mins.z
            && self.maxs.x >= other.maxs.x
            && self.maxs.y >= other.maxs.y
            && self.maxs.z >= other.maxs.z
    }

    pub fn center(&self) -> Vector3<f32> {
        (self.mins + self.maxs) * 0.5
    }

    /// Grow symmetrically by `amount` on every axis.
    pub fn expanded(&self, amount: f32) -> Aabb {
        let d = Vector3::new(amount, amount, amount);
        Aabb {
            mins: self.mins - d,
            maxs: self.maxs + d,
        }
    }

    pub fn translated(&self, offset: Vector3<f32>) -> Aabb {
        Aabb {
            mins: self.mins + offset,
            maxs: self.maxs + offset,
        }
    }

    /// The 8 corner points.
    pub fn corners(&self) -> [Vector3<f32>; 8] {
        let (a, b) = (self.mins, self.maxs);
        [
            Vector3::new(a.x, a.y, a.z),
            Vector3::new(b.x, a.y, a.z),
            Vector3::new(a.x, b.y, a.z),
            Vector3::new(b.x, b.y, a.z),
            Vector3::new(a.x, a.y, b.z),
            Vector3::new(b.x, a.y, b.z),
            Vector3::new(a.x, b.y, b.z),
            Vector3::new(b.x, b.y, b.z),
        ]
    }

    /// Box covering a hull with relative extents [mins, maxs] swept from
    /// `start` to `end`.
    pub fn swept_hull(
        start: Vector3<f32>,
        end: Vector3<f32>,
        hull_mins: Vector3<f32>,
        hull_maxs: Vector3<f32>,
    ) -> Aabb {
        let at_start = Aabb::new(start + hull_mins, start + hull_maxs);
        let at_end = Aabb::new(end + hull_mins, end + hull_maxs);
        at_start.union(&at_end)
    }

    /// Longest axis index (0 = X, 1 = Y, 2 = Z).
    pub fn longest_axis(&self) -> usize {
        let d = self.maxs - self.mins;
        if d.x >= d.y && d.x >= d.z {
            0
        } else if d.y >= d.z {
            1
        } else {
            2
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn union_and_contains() {
        let a = Aabb::new(Vector3::new(0.0, 0.0, 0.0), Vector3::new(1.0, 1.0, 1.0));
        let b = Aabb::new(Vector3::new(2.0, -1.0, 0.5), Vector3::new(3.0, 0.5, 2.0));
        let u = a.union(&b);
        assert!(u.contains(&a));
        assert!(u.contains(&b));
        assert_eq!(u.mins, Vector3::new(0.0, -1.0, 0.0));
        assert_eq!(u.maxs, Vector3::new(3.0, 1.0, 2.0));
    }

    #[test]
    fn touching_boxes_intersect() {
        let a = Aabb::new(Vector3::new(0.0, 0.0, 0.0), Vector3::new(1.0, 1.0, 1.0));
        let b = Aabb::new(Vector3::new(1.0, 0.0, 0.0), Vector3::new(2.0, 1.0, 1.0));
        assert!(a.intersects(&b));
        let c = b.translated(Vector3::new(0.001, 0.0, 0.0));
        assert!(!a.intersects(&c));
    }

    #[test]
    fn swept_hull_covers_both_ends() {
        let mins = Vector3::new(-16.0, -16.0, 0.0);
        let maxs = Vector3::new(16.0, 16.0, 72.0);
        let swept = Aabb::swept_hull(
            Vector3::new(0.0, 0.0, 0.0),
            Vector3::new(100.0, 0.0, -50.0),
            mins,
            maxs,
        );
        assert_eq!(swept.mins, Vector3::new(-16.0, -16.0, -50.0));
        assert_eq!(swept.maxs, Vector3::new(116.0, 16.0, 72.0));
    }
}
