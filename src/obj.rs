//! Wavefront OBJ import into [`Mesh`] buffers.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use anyhow::{anyhow, bail, Context, Result};
use glam::Vec3;

use crate::mesh::{Mesh, Vertex};

/// Reads and parses an OBJ file from disk.
pub fn load_obj(path: &Path) -> Result<Mesh> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("unable to read OBJ file {}", path.display()))?;
    parse_obj(&data).with_context(|| format!("failed to parse OBJ mesh {}", path.display()))
}

/// Parses OBJ text into an indexed triangle list.
///
/// Only `v`, `vn` and `f` records are read; polygons are fan-triangulated.
/// Vertices without a normal get area-weighted smooth normals.
pub fn parse_obj(data: &str) -> Result<Mesh> {
    let mut positions = Vec::new();
    let mut normals = Vec::new();
    let mut triangles: Vec<[Corner; 3]> = Vec::new();

    for (line_index, line) in data.lines().enumerate() {
        let line_no = line_index + 1;
        let mut fields = line.split_whitespace();
        match fields.next() {
            Some("v") => positions.push(
                parse_vec3(fields).with_context(|| format!("invalid vertex on line {line_no}"))?,
            ),
            Some("vn") => normals.push(
                parse_vec3(fields).with_context(|| format!("invalid normal on line {line_no}"))?,
            ),
            Some("f") => {
                let polygon = parse_face(fields)
                    .with_context(|| format!("invalid face on line {line_no}"))?;
                for i in 1..polygon.len() - 1 {
                    triangles.push([polygon[0], polygon[i], polygon[i + 1]]);
                }
            }
            _ => {}
        }
    }

    if positions.is_empty() {
        bail!("OBJ file does not define any vertices");
    }

    let (mut mesh, missing_normals) = assemble(&positions, &normals, &triangles)?;
    if missing_normals {
        smooth_normals(&mut mesh);
    }
    Ok(mesh)
}

/// One face corner: 1-based (or negative, relative) OBJ indices.
#[derive(Debug, Clone, Copy)]
struct Corner {
    position: i64,
    normal: Option<i64>,
}

fn parse_vec3<'a>(mut fields: impl Iterator<Item = &'a str>) -> Result<Vec3> {
    let mut component = || -> Result<f32> {
        let text = fields
            .next()
            .ok_or_else(|| anyhow!("missing vector component"))?;
        Ok(text.parse::<f32>()?)
    };
    Ok(Vec3::new(component()?, component()?, component()?))
}

fn parse_face<'a>(fields: impl Iterator<Item = &'a str>) -> Result<Vec<Corner>> {
    let corners = fields
        .map(|field| {
            // v, v/vt, v//vn or v/vt/vn
            let mut parts = field.split('/');
            let position = parts
                .next()
                .ok_or_else(|| anyhow!("missing vertex index"))?
                .parse::<i64>()
                .with_context(|| format!("bad vertex index in `{field}`"))?;
            let normal = match parts.nth(1) {
                Some(text) if !text.is_empty() => Some(
                    text.parse::<i64>()
                        .with_context(|| format!("bad normal index in `{field}`"))?,
                ),
                _ => None,
            };
            Ok(Corner { position, normal })
        })
        .collect::<Result<Vec<_>>>()?;
    if corners.len() < 3 {
        bail!("faces must reference at least 3 vertices");
    }
    Ok(corners)
}

fn resolve(index: i64, len: usize) -> Option<usize> {
    match index {
        1.. => {
            let zero_based = usize::try_from(index - 1).ok()?;
            (zero_based < len).then_some(zero_based)
        }
        0 => None,
        _ => len.checked_sub(usize::try_from(-index).ok()?),
    }
}

/// Deduplicates `(position, normal)` pairs into a vertex buffer. The flag is
/// set when any corner came without a normal.
fn assemble(
    positions: &[Vec3],
    normals: &[Vec3],
    triangles: &[[Corner; 3]],
) -> Result<(Mesh, bool)> {
    let mut lookup: HashMap<(usize, Option<usize>), u32> = HashMap::new();
    let mut mesh = Mesh::default();
    let mut missing_normals = false;

    for corner in triangles.iter().flatten() {
        let position = resolve(corner.position, positions.len())
            .ok_or_else(|| anyhow!("vertex index {} is out of range", corner.position))?;
        let normal = match corner.normal {
            Some(index) => Some(
                resolve(index, normals.len())
                    .ok_or_else(|| anyhow!("normal index {index} is out of range"))?,
            ),
            None => None,
        };
        missing_normals |= normal.is_none();

        let next = mesh.vertices.len() as u32;
        let index = *lookup.entry((position, normal)).or_insert_with(|| {
            mesh.vertices.push(Vertex::new(
                positions[position],
                normal.map_or(Vec3::ZERO, |n| normals[n]),
            ));
            next
        });
        mesh.indices.push(index);
    }

    Ok((mesh, missing_normals))
}

fn smooth_normals(mesh: &mut Mesh) {
    let mut accumulated = vec![Vec3::ZERO; mesh.vertices.len()];
    for triangle in mesh.indices.chunks_exact(3) {
        let [a, b, c] = [triangle[0], triangle[1], triangle[2]].map(|i| i as usize);
        let p = [a, b, c].map(|i| mesh.vertices[i].position);
        let face_normal = (p[1] - p[0]).cross(p[2] - p[0]);
        for i in [a, b, c] {
            accumulated[i] += face_normal;
        }
    }
    for (vertex, normal) in mesh.vertices.iter_mut().zip(accumulated) {
        if vertex.normal == Vec3::ZERO {
            vertex.normal = normal.normalize_or_zero();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_triangle_and_computes_normal() {
        let mesh = parse_obj("v 0 0 0\nv 1 0 0\nv 0 1 0\nf 1 2 3\n").unwrap();
        assert_eq!(mesh.indices, vec![0, 1, 2]);
        assert_eq!(mesh.vertices.len(), 3);
        for vertex in &mesh.vertices {
            assert!((vertex.normal - Vec3::Z).length() < 1e-5);
        }
    }

    #[test]
    fn quads_are_fan_triangulated() {
        let obj = "v 0 0 0\nv 1 0 0\nv 1 0 -1\nv 0 0 -1\nvn 0 1 0\nf 1//1 2//1 3//1 4//1\n";
        let mesh = parse_obj(obj).unwrap();
        assert_eq!(mesh.triangle_count(), 2);
        assert_eq!(mesh.indices, vec![0, 1, 2, 0, 2, 3]);
        assert!(mesh.vertices.iter().all(|v| v.normal == Vec3::Y));
    }

    #[test]
    fn negative_indices_are_relative() {
        let mesh = parse_obj("v 0 0 0\nv 1 0 0\nv 0 1 0\nf -3 -2 -1\n").unwrap();
        assert_eq!(mesh.vertices[2].position, Vec3::Y);
    }

    #[test]
    fn out_of_range_index_is_an_error() {
        let err = parse_obj("v 0 0 0\nv 1 0 0\nf 1 2 7\n").unwrap_err();
        assert!(format!("{err:#}").contains("out of range"));
    }

    #[test]
    fn empty_file_is_an_error() {
        assert!(parse_obj("# nothing here\n").is_err());
    }

    #[test]
    fn loads_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tri.obj");
        std::fs::write(&path, "v 0 0 0\nv 1 0 0\nv 0 1 0\nf 1 2 3\n").unwrap();
        assert_eq!(load_obj(&path).unwrap().triangle_count(), 1);
        assert!(load_obj(&dir.path().join("missing.obj")).is_err());
    }
}
