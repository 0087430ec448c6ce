use bytemuck::{Pod, Zeroable};
use glam::{Vec2, Vec3};
use serde::{Deserialize, Serialize};

/// Interleaved vertex consumed by the normal-mapping shader.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default, Pod, Zeroable, Serialize, Deserialize)]
pub struct Vertex {
    pub position: [f32; 3],
    pub uv: [f32; 2],
    pub normal: [f32; 3],
    /// xyz tangent, w handedness of the bitangent.
    pub tangent: [f32; 4],
}

impl Vertex {
    pub fn new(position: Vec3, uv: Vec2, normal: Vec3) -> Self {
        Self {
            position: position.into(),
            uv: uv.into(),
            normal: normal.into(),
            tangent: [0.0; 4],
        }
    }

    fn position(&self) -> Vec3 {
        Vec3::from(self.position)
    }

    fn uv(&self) -> Vec2 {
        Vec2::from(self.uv)
    }

    fn normal(&self) -> Vec3 {
        Vec3::from(self.normal)
    }
}

/// CPU-side triangle mesh.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MeshData {
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
}

impl MeshData {
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// Replaces zero normals with area-weighted face normals.
    pub fn compute_missing_normals(&mut self) {
        if !self
            .vertices
            .iter()
            .any(|vertex| vertex.normal() == Vec3::ZERO)
        {
            return;
        }
        let mut accum = vec![Vec3::ZERO; self.vertices.len()];
        for triangle in self.indices.chunks_exact(3) {
            let [i0, i1, i2] = [triangle[0], triangle[1], triangle[2]].map(|i| i as usize);
            let p0 = self.vertices[i0].position();
            let normal = (self.vertices[i1].position() - p0)
                .cross(self.vertices[i2].position() - p0);
            if normal.length_squared() > f32::EPSILON {
                accum[i0] += normal;
                accum[i1] += normal;
                accum[i2] += normal;
            }
        }
        for (vertex, normal) in self.vertices.iter_mut().zip(accum) {
            if vertex.normal() == Vec3::ZERO {
                vertex.normal = normal.normalize_or_zero().into();
            }
        }
    }

    /// Computes per-vertex tangents from positions and texture coordinates.
    ///
    /// Tangents are orthogonalised against the vertex normal; `w` stores the
    /// sign needed to rebuild the bitangent as `cross(n, t) * w`. Vertices
    /// whose triangles have degenerate UVs get an arbitrary tangent
    /// perpendicular to the normal.
    pub fn compute_tangents(&mut self) {
        let mut tangents = vec![Vec3::ZERO; self.vertices.len()];
        let mut bitangents = vec![Vec3::ZERO; self.vertices.len()];

        for triangle in self.indices.chunks_exact(3) {
            let [i0, i1, i2] = [triangle[0], triangle[1], triangle[2]].map(|i| i as usize);
            let (v0, v1, v2) = (self.vertices[i0], self.vertices[i1], self.vertices[i2]);
            let edge1 = v1.position() - v0.position();
            let edge2 = v2.position() - v0.position();
            let duv1 = v1.uv() - v0.uv();
            let duv2 = v2.uv() - v0.uv();
            let det = duv1.x * duv2.y - duv2.x * duv1.y;
            if det.abs() <= f32::EPSILON {
                continue;
            }
            let r = 1.0 / det;
            let tangent = (edge1 * duv2.y - edge2 * duv1.y) * r;
            let bitangent = (edge2 * duv1.x - edge1 * duv2.x) * r;
            for index in [i0, i1, i2] {
                tangents[index] += tangent;
                bitangents[index] += bitangent;
            }
        }

        for ((vertex, tangent), bitangent) in self.vertices.iter_mut().zip(tangents).zip(bitangents)
        {
            let normal = vertex.normal().normalize_or_zero();
            let mut t = (tangent - normal * normal.dot(tangent)).normalize_or_zero();
            if t == Vec3::ZERO {
                t = if normal == Vec3::ZERO {
                    Vec3::X
                } else {
                    normal.any_orthonormal_vector()
                };
            }
            let handedness = if normal.cross(t).dot(bitangent) < 0.0 {
                -1.0
            } else {
                1.0
            };
            vertex.tangent = t.extend(handedness).into();
        }
    }
}

/// Two-unit square in the XY plane facing +Z, textured once across.
pub fn plane() -> MeshData {
    let normal = Vec3::Z;
    let vertices = vec![
        Vertex::new(Vec3::new(-1.0, -1.0, 0.0), Vec2::new(0.0, 1.0), normal),
        Vertex::new(Vec3::new(1.0, -1.0, 0.0), Vec2::new(1.0, 1.0), normal),
        Vertex::new(Vec3::new(1.0, 1.0, 0.0), Vec2::new(1.0, 0.0), normal),
        Vertex::new(Vec3::new(-1.0, 1.0, 0.0), Vec2::new(0.0, 0.0), normal),
    ];
    let mut mesh = MeshData {
        vertices,
        indices: vec![0, 1, 2, 0, 2, 3],
    };
    mesh.compute_tangents();
    mesh
}

/// Unit box centred on the origin with one texture per face.
pub fn cube() -> MeshData {
    let faces = [
        (Vec3::Z, Vec3::X),
        (Vec3::NEG_Z, Vec3::NEG_X),
        (Vec3::X, Vec3::NEG_Z),
        (Vec3::NEG_X, Vec3::Z),
        (Vec3::Y, Vec3::X),
        (Vec3::NEG_Y, Vec3::X),
    ];
    let mut mesh = MeshData::default();
    for (normal, right) in faces {
        let up = normal.cross(right);
        let base = mesh.vertices.len() as u32;
        let corners = [
            (-0.5, -0.5, Vec2::new(0.0, 1.0)),
            (0.5, -0.5, Vec2::new(1.0, 1.0)),
            (0.5, 0.5, Vec2::new(1.0, 0.0)),
            (-0.5, 0.5, Vec2::new(0.0, 0.0)),
        ];
        for (x, y, uv) in corners {
            let position = normal * 0.5 + right * x + up * y;
            mesh.vertices.push(Vertex::new(position, uv, normal));
        }
        mesh.indices
            .extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
    }
    mesh.compute_tangents();
    mesh
}
