use std::collections::HashMap;

use anyhow::{anyhow, Context, Result};
use glam::{Vec2, Vec3};

use crate::mesh::{MeshData, Vertex};

/// Parses an OBJ file from memory into a tangent-space mesh.
///
/// Positions, texture coordinates and normals are honoured; polygons are fan
/// triangulated. Missing normals are generated from the faces and tangents are
/// always computed, so the result can be fed straight to the normal-mapping
/// pipeline.
pub fn load_obj_from_str(data: &str) -> Result<MeshData> {
    let mut positions = Vec::new();
    let mut uvs = Vec::new();
    let mut normals = Vec::new();
    let mut faces: Vec<[FaceIndex; 3]> = Vec::new();

    for (line_no, line) in data.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let mut parts = trimmed.split_whitespace();
        let Some(tag) = parts.next() else {
            continue;
        };
        match tag {
            "v" => positions.push(
                parse_vec3(parts)
                    .with_context(|| format!("invalid vertex on line {}", line_no + 1))?,
            ),
            "vt" => uvs.push(
                parse_uv(parts)
                    .with_context(|| format!("invalid texture coordinate on line {}", line_no + 1))?,
            ),
            "vn" => normals.push(
                parse_vec3(parts)
                    .with_context(|| format!("invalid normal on line {}", line_no + 1))?,
            ),
            "f" => {
                let polygon = parse_face(parts)
                    .with_context(|| format!("invalid face on line {}", line_no + 1))?;
                triangulate_face(&polygon, &mut faces);
            }
            _ => {}
        }
    }

    if positions.is_empty() {
        return Err(anyhow!("OBJ file does not define any vertices"));
    }

    let mut mesh = build_mesh(&positions, &uvs, &normals, &faces)?;
    mesh.compute_missing_normals();
    mesh.compute_tangents();
    Ok(mesh)
}

fn next_f32<'a>(parts: &mut impl Iterator<Item = &'a str>) -> Result<f32> {
    Ok(parts
        .next()
        .ok_or_else(|| anyhow!("missing vector component"))?
        .parse::<f32>()?)
}

fn parse_vec3<'a>(mut parts: impl Iterator<Item = &'a str>) -> Result<Vec3> {
    let x = next_f32(&mut parts)?;
    let y = next_f32(&mut parts)?;
    let z = next_f32(&mut parts)?;
    Ok(Vec3::new(x, y, z))
}

/// OBJ texture space has v pointing up; images have it pointing down.
fn parse_uv<'a>(mut parts: impl Iterator<Item = &'a str>) -> Result<Vec2> {
    let u = next_f32(&mut parts)?;
    let v = next_f32(&mut parts)?;
    Ok(Vec2::new(u, 1.0 - v))
}

fn parse_index(segment: Option<&str>) -> Result<i32> {
    match segment {
        None | Some("") => Ok(0),
        Some(text) => text
            .parse::<i32>()
            .with_context(|| format!("bad index `{text}`")),
    }
}

fn parse_face<'a>(parts: impl Iterator<Item = &'a str>) -> Result<Vec<FaceIndex>> {
    let mut indices = Vec::new();
    for part in parts {
        let mut segments = part.split('/');
        let v = segments
            .next()
            .ok_or_else(|| anyhow!("missing vertex index"))?
            .parse::<i32>()?;
        let vt = parse_index(segments.next())?;
        let vn = parse_index(segments.next())?;
        indices.push(FaceIndex { v, vt, vn });
    }
    if indices.len() < 3 {
        return Err(anyhow!("faces must reference at least 3 vertices"));
    }
    Ok(indices)
}

fn triangulate_face(polygon: &[FaceIndex], faces: &mut Vec<[FaceIndex; 3]>) {
    for i in 1..(polygon.len() - 1) {
        faces.push([polygon[0], polygon[i], polygon[i + 1]]);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct Key {
    position: usize,
    uv: Option<usize>,
    normal: Option<usize>,
}

#[derive(Debug, Clone, Copy)]
struct FaceIndex {
    v: i32,
    vt: i32,
    vn: i32,
}

fn build_mesh(
    positions: &[Vec3],
    uvs: &[Vec2],
    normals: &[Vec3],
    faces: &[[FaceIndex; 3]],
) -> Result<MeshData> {
    let mut lookup: HashMap<Key, u32> = HashMap::new();
    let mut mesh = MeshData::default();

    for face in faces {
        for idx in face {
            let key = Key {
                position: fix_index(idx.v, positions.len())
                    .ok_or_else(|| anyhow!("invalid vertex index {}", idx.v))?,
                uv: optional_index(idx.vt, uvs.len(), "texture coordinate")?,
                normal: optional_index(idx.vn, normals.len(), "normal")?,
            };
            let next_index = mesh.vertices.len() as u32;
            let entry = lookup.entry(key).or_insert_with(|| {
                mesh.vertices.push(Vertex::new(
                    positions[key.position],
                    key.uv.map(|i| uvs[i]).unwrap_or(Vec2::ZERO),
                    key.normal.map(|i| normals[i]).unwrap_or(Vec3::ZERO),
                ));
                next_index
            });
            mesh.indices.push(*entry);
        }
    }

    Ok(mesh)
}

/// Resolves a `vt` or `vn` reference; 0 means the face left it out.
fn optional_index(index: i32, len: usize, what: &str) -> Result<Option<usize>> {
    if index == 0 {
        return Ok(None);
    }
    fix_index(index, len)
        .map(Some)
        .ok_or_else(|| anyhow!("invalid {what} index {index}"))
}

fn fix_index(index: i32, len: usize) -> Option<usize> {
    if index > 0 {
        let zero_based = index as usize - 1;
        (zero_based < len).then_some(zero_based)
    } else if index < 0 {
        let abs = index.unsigned_abs() as usize;
        (abs <= len).then_some(len - abs)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const QUAD: &str = "
v -1 -1 0
v 1 -1 0
v 1 1 0
v -1 1 0
vt 0 0
vt 1 0
vt 1 1
vt 0 1
vn 0 0 1
f 1/1/1 2/2/1 3/3/1 4/4/1
";

    #[test]
    fn parses_simple_triangle() {
        let obj = "\nv 0 0 0\nv 1 0 0\nv 0 1 0\nf 1 2 3\n";
        let mesh = load_obj_from_str(obj).unwrap();
        assert_eq!(mesh.indices, vec![0, 1, 2]);
        assert_eq!(mesh.vertices.len(), 3);
    }

    #[test]
    fn computes_missing_normals() {
        let obj = "\nv 0 0 0\nv 1 0 0\nv 0 1 0\nf 1 2 3\n";
        let mesh = load_obj_from_str(obj).unwrap();
        for vertex in &mesh.vertices {
            assert!(Vec3::from(vertex.normal).abs_diff_eq(Vec3::Z, 1e-5));
        }
    }

    #[test]
    fn quads_are_fan_triangulated_with_flipped_v() {
        let mesh = load_obj_from_str(QUAD).unwrap();
        assert_eq!(mesh.triangle_count(), 2);
        assert_eq!(mesh.vertices.len(), 4);
        assert_eq!(mesh.vertices[0].uv, [0.0, 1.0]);
        assert_eq!(mesh.vertices[2].uv, [1.0, 0.0]);
    }

    #[test]
    fn tangents_follow_texture_u() {
        let mesh = load_obj_from_str(QUAD).unwrap();
        for vertex in &mesh.vertices {
            let tangent = Vec3::from_slice(&vertex.tangent[..3]);
            assert!(tangent.abs_diff_eq(Vec3::X, 1e-5));
        }
    }

    #[test]
    fn negative_indices_count_from_the_end() {
        let obj = "v 0 0 0\nv 1 0 0\nv 0 1 0\nf -3 -2 -1\n";
        let mesh = load_obj_from_str(obj).unwrap();
        assert_eq!(Vec3::from(mesh.vertices[2].position), Vec3::Y);
    }

    #[test]
    fn out_of_range_index_is_an_error() {
        let obj = "v 0 0 0\nv 1 0 0\nv 0 1 0\nf 1 2 9\n";
        assert!(load_obj_from_str(obj).is_err());
    }

    #[test]
    fn out_of_range_uv_and_normal_indices_are_errors() {
        let base = "v 0 0 0\nv 1 0 0\nv 0 1 0\nvt 0 0\nvn 0 0 1\n";
        let bad_uv = format!("{base}f 1/1/1 2/2/1 3/1/1\n");
        let err = load_obj_from_str(&bad_uv).unwrap_err();
        assert!(format!("{err:#}").contains("invalid texture coordinate index 2"));

        let bad_normal = format!("{base}f 1/1/1 2/1/-2 3/1/1\n");
        let err = load_obj_from_str(&bad_normal).unwrap_err();
        assert!(format!("{err:#}").contains("invalid normal index -2"));

        let skipped = format!("{base}f 1//1 2//1 3//1\n");
        assert!(load_obj_from_str(&skipped).is_ok());
    }

    #[test]
    fn empty_file_is_an_error() {
        assert!(load_obj_from_str("# nothing here\n").is_err());
    }
}
