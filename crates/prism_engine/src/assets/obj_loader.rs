//! OBJ mesh loading
//!
//! Wavefront OBJ parsing through `tobj`, flattened into the engine's
//! [`MeshData`] vertex/index buffers.

use std::path::Path;

use crate::assets::AssetError;
use crate::render::mesh::{MeshData, Vertex};

/// Load an OBJ file into a single vertex/index buffer pair.
///
/// All models in the file are merged. Faces are triangulated and
/// re-indexed with a single index stream. Files with no vertices are
/// rejected.
pub fn load_obj<P: AsRef<Path>>(path: P) -> Result<MeshData, AssetError> {
    let path = path.as_ref();
    log::debug!("Loading OBJ mesh from {:?}", path);

    let options = tobj::LoadOptions {
        triangulate: true,
        single_index: true,
        ..Default::default()
    };
    let (models, _materials) =
        tobj::load_obj(path, &options).map_err(|e| AssetError::Parse(format!("{path:?}: {e}")))?;

    let mut vertices = Vec::new();
    let mut indices = Vec::new();

    for model in &models {
        let mesh = &model.mesh;
        let base = vertices.len() as u32;
        let vertex_count = mesh.positions.len() / 3;

        for i in 0..vertex_count {
            let position = [
                mesh.positions[i * 3],
                mesh.positions[i * 3 + 1],
                mesh.positions[i * 3 + 2],
            ];
            let normal = if mesh.normals.len() >= (i + 1) * 3 {
                [
                    mesh.normals[i * 3],
                    mesh.normals[i * 3 + 1],
                    mesh.normals[i * 3 + 2],
                ]
            } else {
                [0.0, 0.0, 1.0]
            };
            let tex_coord = if mesh.texcoords.len() >= (i + 1) * 2 {
                [mesh.texcoords[i * 2], mesh.texcoords[i * 2 + 1]]
            } else {
                [0.0, 0.0]
            };
            vertices.push(Vertex::new(position, normal, tex_coord));
        }

        indices.extend(mesh.indices.iter().map(|&i| base + i));
    }

    if vertices.is_empty() {
        return Err(AssetError::Invalid(format!("{path:?}: no vertices")));
    }

    log::debug!(
        "Loaded mesh with {} vertices / {} indices from {:?}",
        vertices.len(),
        indices.len(),
        path
    );
    Ok(MeshData { vertices, indices })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const TRIANGLE_OBJ: &str = "\
v 0.0 0.0 0.0
v 1.0 0.0 0.0
v 0.0 1.0 0.0
vn 0.0 0.0 1.0
vt 0.0 0.0
f 1/1/1 2/1/1 3/1/1
";

    fn write_temp(name: &str, contents: &str) -> std::path::PathBuf {
        let dir = std::env::temp_dir().join("prism_obj_loader_test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        path
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(load_obj("definitely/not/a/real/mesh.obj").is_err());
    }

    #[test]
    fn triangle_parses_to_three_vertices() {
        let path = write_temp("triangle.obj", TRIANGLE_OBJ);
        let data = load_obj(&path).unwrap();
        assert_eq!(data.vertices.len(), 3);
        assert_eq!(data.indices.len(), 3);
        assert_eq!(data.vertices[1].position, [1.0, 0.0, 0.0]);
        assert_eq!(data.vertices[0].normal, [0.0, 0.0, 1.0]);
    }

    #[test]
    fn empty_file_is_invalid() {
        let path = write_temp("empty.obj", "# nothing here\n");
        assert!(matches!(load_obj(&path), Err(AssetError::Invalid(_))));
    }
}
