//! Collision: collidable world, broadphase BVH and the swept hull trace.

pub mod aabb;
pub mod bvh;
pub mod dispcoll;
pub mod trace;
pub mod world;

pub use aabb::Aabb;
pub use bvh::{Bvh, PrimitiveRef};
pub use dispcoll::DispCollTile;
pub use trace::{ClipPlane, SweptQuery, TraceResult};
pub use world::{
    CollBrush, CollSection, CollidableWorld, CollisionCache, CollisionModel, NoExternalAssets,
    PhySource, WorldSlot,
};
