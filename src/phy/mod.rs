//! Convex collision model (.phy) decoding.
//!
//! A .phy stream describes one solid as a union of disjoint convex pieces
//! ("sections"), each a 16-bit-indexed triangle list over a shared vertex
//! pool, followed by an ASCII KeyValues tail. Layout, little-endian:
//!
//! ```text
//! header (16 B):  header_size(=16) u32 | pad u32 | solid_count u32 | pad u32
//! surface header: binary_size u32 | 'VPHY' u32 | 68 B pad | 'IVPS' u32
//! per section (16 B):  offset_to_vertices u32 | pad u32 | flags u32 | tri_count u32
//!   per triangle (16 B): id u8 pad3 | v1 u16 pad2 | v2 u16 pad2 | v3 u16 pad2
//! vertices (16 B each): x f32 | y f32 | z f32 | pad u32
//! text section: ASCII KeyValues; only "surfaceprop" is extracted
//! ```
//!
//! Source-side triangles wind CCW; output sections are CW-from-outside.
//! Vertex positions swap Y/Z, negate the vertical source axis and scale from
//! meters into world units.

use std::io::{Cursor, Read, Seek, SeekFrom};
use std::ops::Range;
use std::path::Path;
use std::sync::Arc;

use byteorder::{LittleEndian, ReadBytesExt};
use cgmath::Vector3;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::constants::{PHY_MAX_SECTIONS, PHY_MAX_TRIANGLES, PHY_MAX_VERTICES, VPHY_MODEL_SCALE};
use crate::error::{SimError, SimResult};
use crate::math::{TriMesh, TriMeshEdge, TriMeshTri, VertIdx};

const PHY_HEADER_SIZE: u64 = 96;
const SECTION_HEADER_SIZE: u64 = 16;
const TRIANGLE_SIZE: u64 = 16;
const VERTEX_SIZE: u64 = 16;
const MAX_TEXT_LINE_LEN: usize = 4096;

const VPHY_MAGIC: u32 =
    (b'V' as u32) | (b'P' as u32) << 8 | (b'H' as u32) << 16 | (b'Y' as u32) << 24;
const IVPS_MAGIC: u32 =
    (b'I' as u32) | (b'V' as u32) << 8 | (b'P' as u32) << 16 | (b'S' as u32) << 24;

/// A byte range presenting one prop's .phy representation, opened either
/// from the filesystem or from a sub-range of an in-memory map file.
#[derive(Debug, Clone)]
pub struct PhyBlob {
    data: Arc<[u8]>,
    range: Range<usize>,
}

impl PhyBlob {
    /// Open from a file on disk. Blocking; runs off the tick thread.
    pub fn from_file(path: &Path) -> SimResult<Self> {
        let bytes = std::fs::read(path)?;
        let len = bytes.len();
        Ok(Self {
            data: Arc::from(bytes.into_boxed_slice()),
            range: 0..len,
        })
    }

    /// Open a sub-range of a file on disk (a packed sub-file of a map that
    /// itself lives on the filesystem). Blocking; runs off the tick thread.
    pub fn from_file_range(path: &Path, offset: u64, len: u64) -> SimResult<Self> {
        let mut file = std::fs::File::open(path)?;
        file.seek(SeekFrom::Start(offset))?;
        let mut bytes = Vec::with_capacity(len as usize);
        file.take(len).read_to_end(&mut bytes)?;
        if bytes.len() as u64 != len {
            return Err(SimError::PhyMalformed {
                what: format!(
                    "packed sub-file at {} is truncated ({} of {} bytes)",
                    offset,
                    bytes.len(),
                    len
                ),
            });
        }
        let byte_len = bytes.len();
        Ok(Self {
            data: Arc::from(bytes.into_boxed_slice()),
            range: 0..byte_len,
        })
    }

    /// View into an in-memory container (e.g. a packed sub-file).
    pub fn from_memory(data: Arc<[u8]>, offset: u64, len: u64) -> SimResult<Self> {
        let start = offset as usize;
        let end = start.checked_add(len as usize).unwrap_or(usize::MAX);
        if end > data.len() {
            return Err(SimError::PhyMalformed {
                what: format!(
                    "packed sub-file range {}..{} exceeds container of {} bytes",
                    start,
                    end,
                    data.len()
                ),
            });
        }
        Ok(Self {
            data,
            range: start..end,
        })
    }

    pub fn bytes(&self) -> &[u8] {
        &self.data[self.range.clone()]
    }
}

/// Decoding options.
#[derive(Debug, Clone, Copy, Default)]
pub struct DecodeOptions {
    /// Include the shrink-wrap section (the convex hull of the whole model)
    /// instead of skipping it.
    pub include_shrink_wrap: bool,
}

/// A decoded single-solid collision model.
#[derive(Debug, Clone, Default)]
pub struct PhyModel {
    /// Convex sections; the solid is their union.
    pub sections: Vec<TriMesh>,
    /// Surface property name from the text tail ("rock", "metal", ...).
    pub surface_prop: String,
}

fn read_err<E: std::fmt::Display>(err: E) -> SimError {
    SimError::PhyMalformed {
        what: format!("read error: {}", err),
    }
}

fn invalid(what: impl Into<String>) -> SimError {
    SimError::PhyMalformed { what: what.into() }
}

/// Decode a single-solid .phy stream.
///
/// Multi-solid files yield [`SimError::PhyMultipleSolids`], which callers
/// treat as "skip this prop", not as a failure.
pub fn decode_phy(bytes: &[u8], options: DecodeOptions) -> SimResult<PhyModel> {
    let total_len = bytes.len() as u64;
    let mut rd = Cursor::new(bytes);

    if PHY_HEADER_SIZE > total_len {
        return Err(invalid("smaller than the PHY header alone"));
    }

    let header_size = rd.read_u32::<LittleEndian>().map_err(read_err)?;
    rd.seek(SeekFrom::Current(4)).map_err(read_err)?;
    let solid_count = rd.read_u32::<LittleEndian>().map_err(read_err)?;
    rd.seek(SeekFrom::Current(4)).map_err(read_err)?;

    if header_size != 16 {
        return Err(invalid(format!("header size = {}", header_size)));
    }
    if solid_count != 1 {
        return Err(SimError::PhyMultipleSolids);
    }

    let binary_data_size = rd.read_u32::<LittleEndian>().map_err(read_err)?;
    let text_section_pos = rd.position() + binary_data_size as u64;
    if text_section_pos > total_len {
        return Err(invalid("binary section extends beyond the stream"));
    }

    let vphysics_id = rd.read_u32::<LittleEndian>().map_err(read_err)?;
    rd.seek(SeekFrom::Current(68)).map_err(read_err)?;
    let ivps_field = rd.read_u32::<LittleEndian>().map_err(read_err)?;

    if vphysics_id != VPHY_MAGIC {
        return Err(invalid(format!("vphysics id = {:#x}", vphysics_id)));
    }
    if ivps_field != IVPS_MAGIC {
        return Err(invalid(format!("ivps field = {:#x}", ivps_field)));
    }

    // Each section is a flat list of vertex indices, 3 per triangle.
    let mut sections: Vec<Vec<VertIdx>> = Vec::new();
    let mut highest_vertex_idx: i64 = -1;
    let mut vertices_start_pos: u64 = 0;
    // Reading sections stops where the first section says vertices begin.
    let mut sections_end_pos = text_section_pos;

    while rd.position() + SECTION_HEADER_SIZE <= sections_end_pos {
        if sections.len() > PHY_MAX_SECTIONS {
            return Err(invalid("too complex model, section limit reached"));
        }

        let section_start_pos = rd.position();
        let offset_to_vertices = rd.read_u32::<LittleEndian>().map_err(read_err)?;
        rd.seek(SeekFrom::Current(4)).map_err(read_err)?;
        let flags = rd.read_u32::<LittleEndian>().map_err(read_err)?;
        let triangle_count = rd.read_u32::<LittleEndian>().map_err(read_err)?;

        // A set bit 0 marks the shrink-wrap of the whole model: the smallest
        // convex shape encompassing every section. Skipped unless requested.
        let is_shrink_wrap = flags & 0x0001 != 0;
        let ignore_section = is_shrink_wrap && !options.include_shrink_wrap;

        vertices_start_pos = section_start_pos + offset_to_vertices as u64;
        if vertices_start_pos > text_section_pos {
            return Err(invalid("vertex data starts beyond the text section"));
        }
        sections_end_pos = vertices_start_pos;

        if rd.position() + triangle_count as u64 * TRIANGLE_SIZE > sections_end_pos {
            return Err(invalid("invalid section header"));
        }
        if triangle_count as usize > PHY_MAX_TRIANGLES {
            return Err(invalid("too complex model, triangle limit reached"));
        }

        let mut cur_section: Vec<VertIdx> = if ignore_section {
            Vec::new()
        } else {
            Vec::with_capacity(triangle_count as usize * 3)
        };

        for _ in 0..triangle_count {
            rd.seek(SeekFrom::Current(4)).map_err(read_err)?;
            let v1 = rd.read_u16::<LittleEndian>().map_err(read_err)?;
            rd.seek(SeekFrom::Current(2)).map_err(read_err)?;
            let v2 = rd.read_u16::<LittleEndian>().map_err(read_err)?;
            rd.seek(SeekFrom::Current(2)).map_err(read_err)?;
            let v3 = rd.read_u16::<LittleEndian>().map_err(read_err)?;
            rd.seek(SeekFrom::Current(2)).map_err(read_err)?;

            if ignore_section {
                continue;
            }
            cur_section.extend_from_slice(&[v1, v2, v3]);
            highest_vertex_idx = highest_vertex_idx.max(v1 as i64);
            highest_vertex_idx = highest_vertex_idx.max(v2 as i64);
            highest_vertex_idx = highest_vertex_idx.max(v3 as i64);
        }

        if !ignore_section && !cur_section.is_empty() {
            sections.push(cur_section);
        }
    }

    let mut vertices: Vec<Vector3<f32>> = Vec::new();
    if highest_vertex_idx >= 0 {
        let num_vertices = (highest_vertex_idx + 1) as u64;
        if vertices_start_pos + num_vertices * VERTEX_SIZE > text_section_pos {
            return Err(invalid("vertex data ends beyond the text section"));
        }
        if num_vertices as usize > PHY_MAX_VERTICES {
            return Err(invalid("too complex model, vertex limit reached"));
        }

        rd.seek(SeekFrom::Start(vertices_start_pos)).map_err(read_err)?;
        vertices.reserve(num_vertices as usize);

        for _ in 0..num_vertices {
            let x = rd.read_f32::<LittleEndian>().map_err(read_err)?;
            let y = rd.read_f32::<LittleEndian>().map_err(read_err)?;
            let z = rd.read_f32::<LittleEndian>().map_err(read_err)?;
            rd.seek(SeekFrom::Current(4)).map_err(read_err)?;

            // Swap Y and Z, invert the source vertical axis, and scale the
            // model into world units.
            vertices.push(Vector3::new(
                VPHY_MODEL_SCALE * x,
                VPHY_MODEL_SCALE * z,
                VPHY_MODEL_SCALE * -y,
            ));
        }
    }

    let surface_prop = read_surface_prop(&bytes[text_section_pos as usize..]);

    let mut model = PhyModel {
        sections: Vec::with_capacity(sections.len()),
        surface_prop,
    };

    for section_indices in sections {
        model.sections.push(build_section(&section_indices, &vertices));
    }

    Ok(model)
}

/// Scan the KeyValues text tail for the `surfaceprop` of the solid block.
fn read_surface_prop(text: &[u8]) -> String {
    let mut in_solid_block = false;
    for line in text.split(|&b| b == b'\n') {
        if line.len() > MAX_TEXT_LINE_LEN {
            break;
        }
        let Ok(line) = std::str::from_utf8(line) else {
            break;
        };
        if line == "solid {" {
            in_solid_block = true;
            continue;
        }
        if line == "}" {
            in_solid_block = false;
            continue;
        }
        if in_solid_block && line.len() >= 16 && line.ends_with('"') {
            if let Some(value) = line.strip_prefix("\"surfaceprop\" \"") {
                return value[..value.len() - 1].to_string();
            }
        }
    }
    String::new()
}

/// Build one convex section: invert winding to CW-from-outside, rebase
/// vertex indices by first occurrence, deduplicate undirected edges.
fn build_section(vert_indices: &[VertIdx], vertices: &[Vector3<f32>]) -> TriMesh {
    let mut tris: Vec<TriMeshTri> = Vec::with_capacity(vert_indices.len() / 3);
    for tri in vert_indices.chunks_exact(3) {
        tris.push(TriMeshTri {
            verts: [tri[0], tri[2], tri[1]],
        });
    }

    // Old-to-new index LUT in first-occurrence order
    let mut lut: FxHashMap<VertIdx, VertIdx> = FxHashMap::default();
    for tri in &tris {
        for &old_idx in &tri.verts {
            let next = lut.len() as VertIdx;
            lut.entry(old_idx).or_insert(next);
        }
    }

    for tri in &mut tris {
        for v in &mut tri.verts {
            *v = lut[v];
        }
    }

    let mut section_vertices = vec![Vector3::new(0.0, 0.0, 0.0); lut.len()];
    for (&old_idx, &new_idx) in &lut {
        section_vertices[new_idx as usize] = vertices[old_idx as usize];
    }

    let mut seen: FxHashSet<(VertIdx, VertIdx)> = FxHashSet::default();
    let mut edges: Vec<TriMeshEdge> = Vec::with_capacity(tris.len() * 3 / 2);
    for tri in &tris {
        for i in 0..3 {
            let v1 = tri.verts[i];
            let v2 = tri.verts[(i + 1) % 3];
            let key = (v1.min(v2), v1.max(v2));
            if seen.insert(key) {
                edges.push(TriMeshEdge { verts: [v1, v2] });
            }
        }
    }

    TriMesh {
        vertices: section_vertices,
        edges,
        tris,
    }
}

/// Test-only .phy stream writer, shared by the decoder tests and the world
/// assembly tests.
#[cfg(test)]
pub(crate) mod testutil {
    use super::{IVPS_MAGIC, SECTION_HEADER_SIZE, TRIANGLE_SIZE, VERTEX_SIZE, VPHY_MAGIC};

    pub struct PhyWriter {
        bytes: Vec<u8>,
    }

    impl PhyWriter {
        pub fn new(solid_count: u32) -> Self {
            let mut w = Self { bytes: Vec::new() };
            w.u32(16);
            w.u32(0);
            w.u32(solid_count);
            w.u32(0);
            w
        }

        fn u32(&mut self, v: u32) {
            self.bytes.extend_from_slice(&v.to_le_bytes());
        }

        fn u16(&mut self, v: u16) {
            self.bytes.extend_from_slice(&v.to_le_bytes());
        }

        fn f32(&mut self, v: f32) {
            self.bytes.extend_from_slice(&v.to_le_bytes());
        }

        /// sections: (flags, triangle index triples). Vertices in source
        /// space. Returns finished bytes incl. surface header and text tail.
        pub fn finish(
            mut self,
            sections: &[(u32, Vec<[u16; 3]>)],
            vertices: &[[f32; 3]],
            text: &str,
        ) -> Vec<u8> {
            let sections_bytes: u64 = sections
                .iter()
                .map(|(_, tris)| SECTION_HEADER_SIZE + tris.len() as u64 * TRIANGLE_SIZE)
                .sum();
            let vertices_bytes = vertices.len() as u64 * VERTEX_SIZE;
            // binary size counts everything between itself and the text tail
            let binary_size = 4 + 68 + 4 + sections_bytes + vertices_bytes;

            self.u32(binary_size as u32);
            self.u32(VPHY_MAGIC);
            for _ in 0..17 {
                self.u32(0);
            }
            self.u32(IVPS_MAGIC);

            let mut remaining = sections_bytes;
            for (flags, tris) in sections {
                let tris_size = tris.len() as u64 * TRIANGLE_SIZE;
                // Offset from this section header to the vertex pool
                let offset_to_vertices = remaining;
                self.u32(offset_to_vertices as u32);
                self.u32(0);
                self.u32(*flags);
                self.u32(tris.len() as u32);
                for (id, tri) in tris.iter().enumerate() {
                    self.bytes.push(id as u8);
                    self.bytes.extend_from_slice(&[0, 0, 0]);
                    for &v in tri {
                        self.u16(v);
                        self.u16(0);
                    }
                }
                remaining -= SECTION_HEADER_SIZE + tris_size;
            }

            for v in vertices {
                self.f32(v[0]);
                self.f32(v[1]);
                self.f32(v[2]);
                self.u32(0);
            }

            self.bytes.extend_from_slice(text.as_bytes());
            self.bytes
        }
    }

    /// An axis-aligned cube from `min` to `max` in source space (remember
    /// the decoder swaps Y and Z and negates the source Y).
    pub fn cube_phy_bytes(min: f32, max: f32, surfaceprop: &str) -> Vec<u8> {
        // 8 corners; CCW-from-outside source winding per face
        let (a, b) = (min, max);
        let vertices = vec![
            [a, a, a],
            [b, a, a],
            [a, b, a],
            [b, b, a],
            [a, a, b],
            [b, a, b],
            [a, b, b],
            [b, b, b],
        ];
        let tris = vec![
            // -z
            [0u16, 2, 1],
            [1, 2, 3],
            // +z
            [4, 5, 6],
            [5, 7, 6],
            // -y
            [0, 1, 4],
            [1, 5, 4],
            // +y
            [2, 6, 3],
            [3, 6, 7],
            // -x
            [0, 4, 2],
            [2, 4, 6],
            // +x
            [1, 3, 5],
            [3, 7, 5],
        ];
        let text = format!("solid {{\n\"surfaceprop\" \"{}\"\n}}\n", surfaceprop);
        PhyWriter::new(1).finish(&[(0, tris)], &vertices, &text)
    }
}
