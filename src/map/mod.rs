//! Map data model and geometry extraction.
//!
//! [`ParsedMap`] is the read-only snapshot an external map parser hands over;
//! the submodules reconstruct brush face polygons, displacement tessellations
//! and per-model brush sets from it.

pub mod data;
pub mod displacement;
pub mod geometry;
pub mod synth;

pub use data::{
    BrushContents, DispFlags, DispInfo, DispTri, DispVert, DynamicProp, FileOrigin, FuncBrush,
    MapBrush, MapBrushSide, MapEdge, MapFace, MapLeaf, MapModel, MapNode, MapPlane, MapQuirks,
    MapTexData, MapTexInfo, PackedFile, ParsedMap, StaticProp, SurfaceFlags, TriggerPush,
};
pub use geometry::{are_vertices_equivalent, BrushCategory, ExtractionEpsilons, Polygon};
