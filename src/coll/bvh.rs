//! Bounding volume hierarchy over all collidable primitives.
//!
//! Broadphase for the swept hull trace: a binary tree built top-down by
//! median split on primitive centroids along the longest axis of the node's
//! bounds. Leaves hold small primitive runs; queries return every leaf
//! primitive whose AABB is pierced by the swept box.

use cgmath::Vector3;

use crate::coll::aabb::Aabb;

/// Reference to one collidable primitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimitiveRef {
    /// Index into the world's collision brush array (worldspawn and solid
    /// brush entities).
    Brush(u32),
    /// Index into the world's displacement tile array.
    DispTile(u32),
    /// Index into the world's prop collision cache array.
    Prop(u32),
}

/// Tree node; a leaf when `prim_count > 0`, with `left_first` then indexing
/// the primitive index array. Interior nodes store the left child index
/// (right child is `left_first + 1`).
#[derive(Debug, Clone, Copy)]
struct BvhNode {
    aabb: Aabb,
    left_first: u32,
    prim_count: u32,
}

impl BvhNode {
    fn is_leaf(&self) -> bool {
        self.prim_count > 0
    }
}

/// Maximum primitives per leaf.
const LEAF_SIZE: usize = 8;
/// Depth guard against degenerate splits.
const MAX_DEPTH: u32 = 32;

struct BuildPrim {
    center: Vector3<f32>,
    aabb: Aabb,
    index: u32,
}

/// Immutable BVH over the world's primitive arrays. Built once after every
/// primitive array is final; never mutated afterwards.
#[derive(Debug, Default)]
pub struct Bvh {
    nodes: Vec<BvhNode>,
    prim_indices: Vec<u32>,
    primitives: Vec<(Aabb, PrimitiveRef)>,
}

impl Bvh {
    /// Build from (AABB, primitive) pairs.
    pub fn build(primitives: Vec<(Aabb, PrimitiveRef)>) -> Self {
        if primitives.is_empty() {
            return Self::default();
        }

        let mut build_prims: Vec<BuildPrim> = primitives
            .iter()
            .enumerate()
            .map(|(i, (aabb, _))| BuildPrim {
                center: aabb.center(),
                aabb: *aabb,
                index: i as u32,
            })
            .collect();

        let mut bvh = Self {
            nodes: Vec::with_capacity(primitives.len() * 2),
            prim_indices: Vec::with_capacity(primitives.len()),
            primitives,
        };
        bvh.nodes.push(BvhNode {
            aabb: Aabb::inverted(),
            left_first: 0,
            prim_count: 0,
        });
        let len = build_prims.len();
        bvh.build_node(0, &mut build_prims, 0, len, 0);

        log::debug!(
            "[Bvh] built {} nodes over {} primitives",
            bvh.nodes.len(),
            bvh.primitives.len()
        );
        bvh
    }

    // Children are allocated as adjacent siblings, so the right child of an
    // interior node is always left_first + 1.
    fn build_node(
        &mut self,
        node_index: usize,
        prims: &mut [BuildPrim],
        start: usize,
        end: usize,
        depth: u32,
    ) {
        let mut aabb = Aabb::inverted();
        for prim in &prims[start..end] {
            aabb = aabb.union(&prim.aabb);
        }

        let prim_count = end - start;
        if prim_count <= LEAF_SIZE || depth >= MAX_DEPTH {
            let first = self.prim_indices.len() as u32;
            for prim in &prims[start..end] {
                self.prim_indices.push(prim.index);
            }
            self.nodes[node_index] = BvhNode {
                aabb,
                left_first: first,
                prim_count: prim_count as u32,
            };
            return;
        }

        // Median split on centroids along the longest axis
        let axis = aabb.longest_axis();
        prims[start..end].sort_by(|a, b| {
            a.center[axis]
                .partial_cmp(&b.center[axis])
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        let mid = start + prim_count / 2;

        let left_child = self.nodes.len();
        self.nodes.push(BvhNode {
            aabb: Aabb::inverted(),
            left_first: 0,
            prim_count: 0,
        });
        self.nodes.push(BvhNode {
            aabb: Aabb::inverted(),
            left_first: 0,
            prim_count: 0,
        });
        self.nodes[node_index] = BvhNode {
            aabb,
            left_first: left_child as u32,
            prim_count: 0,
        };

        self.build_node(left_child, prims, start, mid, depth + 1);
        self.build_node(left_child + 1, prims, mid, end, depth + 1);
    }

    /// Collect all primitives whose AABB intersects `swept`.
    pub fn query(&self, swept: &Aabb, out: &mut Vec<PrimitiveRef>) {
        out.clear();
        if self.nodes.is_empty() {
            return;
        }

        let mut stack: Vec<u32> = vec![0];
        while let Some(node_idx) = stack.pop() {
            let node = &self.nodes[node_idx as usize];
            if !node.aabb.intersects(swept) {
                continue;
            }
            if node.is_leaf() {
                let first = node.left_first as usize;
                for &prim_idx in &self.prim_indices[first..first + node.prim_count as usize] {
                    let (aabb, prim) = &self.primitives[prim_idx as usize];
                    if aabb.intersects(swept) {
                        out.push(*prim);
                    }
                }
            } else {
                stack.push(node.left_first);
                stack.push(node.left_first + 1);
            }
        }
    }

    pub fn primitive_count(&self) -> usize {
        self.primitives.len()
    }

    /// Verify that every node's AABB contains its children (or leaf
    /// primitives). Test support.
    #[cfg(test)]
    fn check_containment(&self) -> bool {
        for node in &self.nodes {
            if node.is_leaf() {
                let first = node.left_first as usize;
                for &prim_idx in &self.prim_indices[first..first + node.prim_count as usize] {
                    if !node.aabb.contains(&self.primitives[prim_idx as usize].0) {
                        return false;
                    }
                }
            } else {
                let left = &self.nodes[node.left_first as usize];
                let right = &self.nodes[node.left_first as usize + 1];
                if !node.aabb.contains(&left.aabb) || !node.aabb.contains(&right.aabb) {
                    return false;
                }
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    fn random_boxes(count: usize, seed: u64) -> Vec<(Aabb, PrimitiveRef)> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..count)
            .map(|i| {
                let center = Vector3::new(
                    rng.gen_range(-2048.0..2048.0),
                    rng.gen_range(-2048.0..2048.0),
                    rng.gen_range(-512.0..512.0),
                );
                let half = Vector3::new(
                    rng.gen_range(1.0..128.0),
                    rng.gen_range(1.0..128.0),
                    rng.gen_range(1.0..128.0),
                );
                (
                    Aabb::new(center - half, center + half),
                    PrimitiveRef::Brush(i as u32),
                )
            })
            .collect()
    }

    #[test]
    fn nodes_contain_their_children() {
        let bvh = Bvh::build(random_boxes(300, 7));
        assert!(bvh.check_containment());
    }

    #[test]
    fn query_matches_brute_force() {
        let boxes = random_boxes(250, 13);
        let bvh = Bvh::build(boxes.clone());

        let mut rng = StdRng::seed_from_u64(99);
        for _ in 0..50 {
            let center = Vector3::new(
                rng.gen_range(-2048.0..2048.0),
                rng.gen_range(-2048.0..2048.0),
                rng.gen_range(-512.0..512.0),
            );
            let swept = Aabb::new(
                center - Vector3::new(200.0, 200.0, 100.0),
                center + Vector3::new(200.0, 200.0, 100.0),
            );

            let mut candidates = Vec::new();
            bvh.query(&swept, &mut candidates);

            let mut expected: Vec<PrimitiveRef> = boxes
                .iter()
                .filter(|(aabb, _)| aabb.intersects(&swept))
                .map(|(_, p)| *p)
                .collect();

            let sort_key = |p: &PrimitiveRef| match p {
                PrimitiveRef::Brush(i) => *i,
                PrimitiveRef::DispTile(i) => *i,
                PrimitiveRef::Prop(i) => *i,
            };
            candidates.sort_by_key(sort_key);
            expected.sort_by_key(sort_key);
            assert_eq!(candidates, expected);
        }
    }

    #[test]
    fn empty_bvh_returns_nothing() {
        let bvh = Bvh::build(Vec::new());
        let mut out = vec![PrimitiveRef::Brush(0)];
        bvh.query(
            &Aabb::new(Vector3::new(-1.0, -1.0, -1.0), Vector3::new(1.0, 1.0, 1.0)),
            &mut out,
        );
        assert!(out.is_empty());
    }

    #[test]
    fn single_primitive_tree() {
        let aabb = Aabb::new(Vector3::new(0.0, 0.0, 0.0), Vector3::new(10.0, 10.0, 10.0));
        let bvh = Bvh::build(vec![(aabb, PrimitiveRef::DispTile(4))]);
        let mut out = Vec::new();
        bvh.query(&aabb, &mut out);
        assert_eq!(out, vec![PrimitiveRef::DispTile(4)]);
    }
}
