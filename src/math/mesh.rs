//! Generic triangle mesh with 16-bit indices.
//!
//! Used for convex prop sections. Creation paths guarantee unique vertices,
//! unique undirected edges and CW-from-outside triangle winding; see the
//! decoder for the exact guarantees.

use cgmath::Vector3;

/// Index into a [`TriMesh`] vertex array.
pub type VertIdx = u16;

/// Undirected edge, represented by its 2 vertex indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TriMeshEdge {
    pub verts: [VertIdx; 2],
}

/// Triangle, represented by 3 vertex indices in CW winding order
/// when viewed from outside.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TriMeshTri {
    pub verts: [VertIdx; 3],
}

/// Triangle mesh describing one convex section of a collision model.
#[derive(Debug, Clone, Default)]
pub struct TriMesh {
    pub vertices: Vec<Vector3<f32>>,
    pub edges: Vec<TriMeshEdge>,
    pub tris: Vec<TriMeshTri>,
}

impl TriMesh {
    /// Largest vertex count addressable by [`VertIdx`].
    pub const MAX_VERTICES: usize = 1 + VertIdx::MAX as usize;

    /// Verify the structural invariants of this mesh. Intended for tests and
    /// debug assertions on freshly decoded inputs; quadratic, so never called
    /// on the hot path.
    pub fn check_invariants(&self) -> Result<(), String> {
        for edge in &self.edges {
            if edge.verts[0] as usize >= self.vertices.len()
                || edge.verts[1] as usize >= self.vertices.len()
            {
                return Err("edge vertex index out of bounds".to_string());
            }
        }
        for tri in &self.tris {
            for v in tri.verts {
                if v as usize >= self.vertices.len() {
                    return Err("triangle vertex index out of bounds".to_string());
                }
            }
        }

        for i in 0..self.vertices.len() {
            for j in i + 1..self.vertices.len() {
                if self.vertices[i] == self.vertices[j] {
                    return Err(format!("duplicate vertices at {} and {}", i, j));
                }
            }
        }

        for i in 0..self.edges.len() {
            for j in i + 1..self.edges.len() {
                let a = self.edges[i].verts;
                let b = self.edges[j].verts;
                let same = (a[0] == b[0] && a[1] == b[1]) || (a[0] == b[1] && a[1] == b[0]);
                if same {
                    return Err(format!("duplicate edges at {} and {}", i, j));
                }
            }
        }

        // Triangles equal under rotation are duplicates (CW winding assumed)
        for i in 0..self.tris.len() {
            for j in i + 1..self.tris.len() {
                let a = self.tris[i].verts;
                let b = self.tris[j].verts;
                let same = (a[0] == b[0] && a[1] == b[1] && a[2] == b[2])
                    || (a[0] == b[1] && a[1] == b[2] && a[2] == b[0])
                    || (a[0] == b[2] && a[1] == b[0] && a[2] == b[1]);
                if same {
                    return Err(format!("duplicate triangles at {} and {}", i, j));
                }
            }
        }

        for (idx, _) in self.vertices.iter().enumerate() {
            let referenced = self
                .tris
                .iter()
                .any(|t| t.verts.iter().any(|&v| v as usize == idx));
            if !referenced {
                return Err(format!("vertex {} not referenced by any triangle", idx));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tetrahedron() -> TriMesh {
        TriMesh {
            vertices: vec![
                Vector3::new(0.0, 0.0, 0.0),
                Vector3::new(1.0, 0.0, 0.0),
                Vector3::new(0.0, 1.0, 0.0),
                Vector3::new(0.0, 0.0, 1.0),
            ],
            edges: vec![
                TriMeshEdge { verts: [0, 1] },
                TriMeshEdge { verts: [0, 2] },
                TriMeshEdge { verts: [0, 3] },
                TriMeshEdge { verts: [1, 2] },
                TriMeshEdge { verts: [1, 3] },
                TriMeshEdge { verts: [2, 3] },
            ],
            tris: vec![
                TriMeshTri { verts: [0, 1, 2] },
                TriMeshTri { verts: [0, 3, 1] },
                TriMeshTri { verts: [0, 2, 3] },
                TriMeshTri { verts: [1, 3, 2] },
            ],
        }
    }

    #[test]
    fn valid_mesh_passes() {
        assert!(tetrahedron().check_invariants().is_ok());
    }

    #[test]
    fn duplicate_edge_detected() {
        let mut mesh = tetrahedron();
        mesh.edges.push(TriMeshEdge { verts: [1, 0] });
        assert!(mesh.check_invariants().is_err());
    }

    #[test]
    fn out_of_bounds_index_detected() {
        let mut mesh = tetrahedron();
        mesh.tris.push(TriMeshTri { verts: [0, 1, 9] });
        assert!(mesh.check_invariants().is_err());
    }

    #[test]
    fn unreferenced_vertex_detected() {
        let mut mesh = tetrahedron();
        mesh.vertices.push(Vector3::new(5.0, 5.0, 5.0));
        assert!(mesh.check_invariants().is_err());
    }
}
