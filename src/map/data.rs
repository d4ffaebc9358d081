//! Parsed map data model.
//!
//! A [`ParsedMap`] is the struct-of-arrays bundle an external map parser
//! produces: raw lump arrays, entity views, the static-prop dictionary and
//! the packed-file directory. This module only models the data; geometry
//! reconstruction lives in the sibling modules.

use std::path::PathBuf;
use std::sync::Arc;

use bitflags::bitflags;
use cgmath::Vector3;

bitflags! {
    /// Brush contents bitmask.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct BrushContents: u32 {
        const SOLID       = 0x0000_0001;
        const WINDOW      = 0x0000_0002;
        const AUX         = 0x0000_0004;
        /// Blocks grenades only. Historically the grate bit.
        const GRENADECLIP = 0x0000_0008;
        const SLIME       = 0x0000_0010;
        const WATER       = 0x0000_0020;
        const BLOCKLOS    = 0x0000_0040;
        const OPAQUE      = 0x0000_0080;
        const MOVEABLE    = 0x0000_4000;
        const AREAPORTAL  = 0x0000_8000;
        const PLAYERCLIP  = 0x0001_0000;
        const MONSTERCLIP = 0x0002_0000;
        const ORIGIN      = 0x0100_0000;
        const MONSTER     = 0x0200_0000;
        const DEBRIS      = 0x0400_0000;
        const DETAIL      = 0x0800_0000;
        const TRANSLUCENT = 0x1000_0000;
        const LADDER      = 0x2000_0000;
        const HITBOX      = 0x4000_0000;
    }
}

impl BrushContents {
    /// Contents that stop the player hull.
    pub fn player_solid() -> Self {
        Self::SOLID | Self::MOVEABLE | Self::WINDOW | Self::PLAYERCLIP | Self::MONSTER
    }
}

bitflags! {
    /// Per-texture surface flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct SurfaceFlags: u32 {
        const LIGHT     = 1 << 0;
        const SKY2D     = 1 << 1;
        const SKY       = 1 << 2;
        const WARP      = 1 << 3;
        const TRANS     = 1 << 4;
        const NOPORTAL  = 1 << 5;
        const TRIGGER   = 1 << 6;
        const NODRAW    = 1 << 7;
        const HINT      = 1 << 8;
        const SKIP      = 1 << 9;
        const NOLIGHT   = 1 << 10;
        const BUMPLIGHT = 1 << 11;
        const NOSHADOWS = 1 << 12;
        const NODECALS  = 1 << 13;
        const NOCHOP    = 1 << 14;
        const HITBOX    = 1 << 15;
    }
}

bitflags! {
    /// Displacement behavior flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct DispFlags: u32 {
        const UNKNOWN_1       = 1 << 0;
        const NO_PHYSICS_COLL = 1 << 1;
        const NO_HULL_COLL    = 1 << 2;
        const NO_RAY_COLL     = 1 << 3;
        const UNKNOWN_2       = 1 << 4;
    }
}

/// Oriented half-space `n . x = dist`; the solid side is `n . x <= dist`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MapPlane {
    pub normal: Vector3<f32>,
    pub dist: f32,
}

/// Edge between two map vertices.
#[derive(Debug, Clone, Copy, Default)]
pub struct MapEdge {
    pub v: [u16; 2],
}

/// Polygonal map face referencing a surfedge run.
#[derive(Debug, Clone, Copy, Default)]
pub struct MapFace {
    pub plane_num: u16,
    pub first_edge: u32,
    pub num_edges: u16,
    pub tex_info: i16,
    pub disp_info: i16,
}

/// Convex solid defined by a run of brushsides.
#[derive(Debug, Clone, Copy, Default)]
pub struct MapBrush {
    pub first_side: u32,
    pub num_sides: u32,
    pub contents: BrushContents,
}

/// One bounding half-space of a brush.
#[derive(Debug, Clone, Copy, Default)]
pub struct MapBrushSide {
    pub plane_num: u16,
    pub tex_info: i16,
    pub disp_info: i16,
    /// Bevel sides only participate in AABB collision, never in faces.
    pub bevel: bool,
}

/// Texture reference with surface flags.
#[derive(Debug, Clone, Copy, Default)]
pub struct MapTexInfo {
    pub flags: SurfaceFlags,
    pub tex_data: u32,
}

/// Texture data record pointing into the string table.
#[derive(Debug, Clone, Copy, Default)]
pub struct MapTexData {
    pub name_string_table_id: u32,
}

/// BSP tree node; negative children reference leafs as `-(idx + 1)`.
#[derive(Debug, Clone, Copy, Default)]
pub struct MapNode {
    pub children: [i32; 2],
}

/// BSP leaf referencing runs of leaf faces and leaf brushes.
#[derive(Debug, Clone, Copy, Default)]
pub struct MapLeaf {
    pub contents: u32,
    pub first_leaf_face: u16,
    pub num_leaf_faces: u16,
    pub first_leaf_brush: u16,
    pub num_leaf_brushes: u16,
}

/// Brush model; index 0 is worldspawn.
#[derive(Debug, Clone, Copy, Default)]
pub struct MapModel {
    pub head_node: i32,
    pub first_face: u32,
    pub num_faces: u32,
}

/// Square displaced-surface grid replacing one map face.
#[derive(Debug, Clone, Copy)]
pub struct DispInfo {
    pub start_pos: Vector3<f32>,
    pub disp_vert_start: u32,
    pub disp_tri_start: u32,
    /// Grid is `(2^power + 1)^2` vertices; valid powers are 2..=4.
    pub power: u32,
    pub flags: DispFlags,
    pub map_face: u16,
}

impl DispInfo {
    pub const MIN_POWER: u32 = 2;
    pub const MAX_POWER: u32 = 4;

    /// Vertices per grid row.
    pub fn row_verts(&self) -> usize {
        (1usize << self.power) + 1
    }

    /// Tiles per grid side.
    pub fn tiles_per_side(&self) -> usize {
        1usize << self.power
    }

    pub fn has_no_hull_coll(&self) -> bool {
        self.flags.contains(DispFlags::NO_HULL_COLL)
    }
}

/// Per-vertex displacement offset.
#[derive(Debug, Clone, Copy)]
pub struct DispVert {
    pub vec: Vector3<f32>,
    pub dist: f32,
}

/// Per-triangle displacement tags.
#[derive(Debug, Clone, Copy, Default)]
pub struct DispTri {
    pub tags: u16,
}

/// A file packed inside the map container.
#[derive(Debug, Clone, Default)]
pub struct PackedFile {
    pub file_name: String,
    pub file_offset: u64,
    pub file_len: u64,
}

/// Where the map bytes came from, so packed sub-files can be re-opened.
#[derive(Debug, Clone)]
pub enum FileOrigin {
    Filesystem(PathBuf),
    Memory(Arc<[u8]>),
}

/// Placed instance of a static prop model.
#[derive(Debug, Clone)]
pub struct StaticProp {
    pub origin: Vector3<f32>,
    /// Pitch, yaw, roll in degrees.
    pub angles: Vector3<f32>,
    pub uniform_scale: f32,
    pub model_idx: u16,
    pub solid: u8,
}

impl StaticProp {
    pub fn is_not_solid(&self) -> bool {
        self.solid == 0
    }
    pub fn is_solid_with_aabb(&self) -> bool {
        self.solid == 2
    }
    pub fn is_solid_with_vphysics(&self) -> bool {
        self.solid == 6
    }
}

/// Dynamic prop entity considered relevant by the parser (solid, with a
/// collision model path).
#[derive(Debug, Clone)]
pub struct DynamicProp {
    pub model: String,
    pub origin: Vector3<f32>,
    pub angles: Vector3<f32>,
}

/// func_brush entity view.
#[derive(Debug, Clone)]
pub struct FuncBrush {
    /// Brush model reference of the form `*N`.
    pub model: String,
    pub origin: Vector3<f32>,
    pub angles: Vector3<f32>,
    /// 0 = toggle, 1 = never solid, 2 = always solid.
    pub solidity: u8,
    pub start_disabled: bool,
}

impl FuncBrush {
    pub fn is_solid(&self) -> bool {
        match self.solidity {
            1 => false,
            2 => true,
            // Toggle solidity depends on the initial state
            _ => !self.start_disabled,
        }
    }
}

/// trigger_push entity view.
#[derive(Debug, Clone)]
pub struct TriggerPush {
    pub model: String,
    pub origin: Vector3<f32>,
    pub angles: Vector3<f32>,
    pub spawnflags: u32,
    pub only_falling_players: bool,
}

impl TriggerPush {
    pub fn can_push_players(&self) -> bool {
        self.spawnflags & (1 << 0) != 0
    }
}

/// Known-bad geometry carve-outs for specific shipped maps.
#[derive(Debug, Clone, Default)]
pub struct MapQuirks {
    /// (brush index, side offset) pairs skipped during AABB derivation.
    pub skip_brush_sides: Vec<(usize, usize)>,
}

/// The struct-of-arrays bundle produced by the external map parser.
///
/// All arrays are read-only snapshots; the collidable world holds this by
/// shared reference for the lifetime of the loaded map.
#[derive(Debug, Clone)]
pub struct ParsedMap {
    pub vertices: Vec<Vector3<f32>>,
    pub edges: Vec<MapEdge>,
    pub surfedges: Vec<i32>,
    pub faces: Vec<MapFace>,
    pub original_faces: Vec<MapFace>,
    pub planes: Vec<MapPlane>,
    pub brushes: Vec<MapBrush>,
    pub brushsides: Vec<MapBrushSide>,
    pub tex_infos: Vec<MapTexInfo>,
    pub tex_datas: Vec<MapTexData>,
    pub tex_string_table: Vec<u32>,
    pub tex_string_data: Vec<u8>,
    pub nodes: Vec<MapNode>,
    pub leafs: Vec<MapLeaf>,
    pub leaf_faces: Vec<u16>,
    pub leaf_brushes: Vec<u16>,
    pub models: Vec<MapModel>,
    pub dispinfos: Vec<DispInfo>,
    pub dispverts: Vec<DispVert>,
    pub disptris: Vec<DispTri>,

    pub static_prop_model_dict: Vec<String>,
    pub static_props: Vec<StaticProp>,
    pub dynamic_props: Vec<DynamicProp>,
    pub func_brushes: Vec<FuncBrush>,
    pub trigger_pushes: Vec<TriggerPush>,

    pub packed_files: Vec<PackedFile>,
    pub file_origin: FileOrigin,
    pub is_embedded_map: bool,

    pub map_version: u32,
    pub sky_name: String,
}

impl ParsedMap {
    /// Empty map, mainly useful to tests and synthetic world builders.
    pub fn empty() -> Self {
        Self {
            vertices: Vec::new(),
            edges: Vec::new(),
            surfedges: Vec::new(),
            faces: Vec::new(),
            original_faces: Vec::new(),
            planes: Vec::new(),
            brushes: Vec::new(),
            brushsides: Vec::new(),
            tex_infos: Vec::new(),
            tex_datas: Vec::new(),
            tex_string_table: Vec::new(),
            tex_string_data: Vec::new(),
            nodes: Vec::new(),
            leafs: Vec::new(),
            leaf_faces: Vec::new(),
            leaf_brushes: Vec::new(),
            models: Vec::new(),
            dispinfos: Vec::new(),
            dispverts: Vec::new(),
            disptris: Vec::new(),
            static_prop_model_dict: Vec::new(),
            static_props: Vec::new(),
            dynamic_props: Vec::new(),
            func_brushes: Vec::new(),
            trigger_pushes: Vec::new(),
            packed_files: Vec::new(),
            file_origin: FileOrigin::Memory(Arc::from(Vec::new().into_boxed_slice())),
            is_embedded_map: false,
            map_version: 0,
            sky_name: String::new(),
        }
    }

    /// Texture name for a texinfo index, read out of the string table.
    pub fn texture_name(&self, tex_info_idx: usize) -> Option<&str> {
        let tex_info = self.tex_infos.get(tex_info_idx)?;
        let tex_data = self.tex_datas.get(tex_info.tex_data as usize)?;
        let offset = *self
            .tex_string_table
            .get(tex_data.name_string_table_id as usize)? as usize;
        let bytes = self.tex_string_data.get(offset..)?;
        let end = bytes.iter().position(|&b| b == 0)?;
        std::str::from_utf8(&bytes[..end]).ok()
    }

    /// Surface flags of a brushside, if its texinfo is valid.
    pub fn side_surface_flags(&self, side: &MapBrushSide) -> SurfaceFlags {
        if side.tex_info < 0 {
            return SurfaceFlags::empty();
        }
        self.tex_infos
            .get(side.tex_info as usize)
            .map(|ti| ti.flags)
            .unwrap_or_default()
    }

    /// Geometry carve-outs for known-broken shipped maps.
    ///
    /// One community map ships a func_brush with two invalid planes; skipping
    /// exactly those sides keeps the rest of the brush usable.
    pub fn quirks(&self) -> MapQuirks {
        if self.map_version == 2915 && self.sky_name == "vertigoblue_hdr" {
            MapQuirks {
                skip_brush_sides: vec![(2537, 26), (2537, 30)],
            }
        } else {
            MapQuirks::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn func_brush_solidity() {
        let mut fb = FuncBrush {
            model: "*1".to_string(),
            origin: Vector3::new(0.0, 0.0, 0.0),
            angles: Vector3::new(0.0, 0.0, 0.0),
            solidity: 1,
            start_disabled: false,
        };
        assert!(!fb.is_solid());
        fb.solidity = 2;
        assert!(fb.is_solid());
        fb.solidity = 0;
        assert!(fb.is_solid());
        fb.start_disabled = true;
        assert!(!fb.is_solid());
    }

    #[test]
    fn texture_name_lookup() {
        let mut map = ParsedMap::empty();
        map.tex_string_data = b"TOOLS/TOOLSSKYBOX\0CONCRETE/FLOOR01\0".to_vec();
        map.tex_string_table = vec![0, 18];
        map.tex_datas = vec![
            MapTexData {
                name_string_table_id: 0,
            },
            MapTexData {
                name_string_table_id: 1,
            },
        ];
        map.tex_infos = vec![
            MapTexInfo {
                flags: SurfaceFlags::SKY,
                tex_data: 0,
            },
            MapTexInfo {
                flags: SurfaceFlags::empty(),
                tex_data: 1,
            },
        ];
        assert_eq!(map.texture_name(0), Some("TOOLS/TOOLSSKYBOX"));
        assert_eq!(map.texture_name(1), Some("CONCRETE/FLOOR01"));
        assert_eq!(map.texture_name(2), None);
    }

    #[test]
    fn player_solid_mask_excludes_grenade_clip() {
        let mask = BrushContents::player_solid();
        assert!(mask.contains(BrushContents::SOLID));
        assert!(mask.contains(BrushContents::PLAYERCLIP));
        assert!(!mask.contains(BrushContents::GRENADECLIP));
        assert!(!mask.contains(BrushContents::LADDER));
        assert!(!mask.contains(BrushContents::WATER));
    }
}
