//! Wavefront OBJ importer built on `tobj`
//!
//! OBJ files have no node hierarchy: the imported root node carries no meshes
//! and gets one child per object in the file, in file order.

use std::path::Path;

use log::{debug, warn};

use super::{ImportFlags, Scene, SceneImporter, SceneMaterial, SceneMesh, SceneNode, TextureKind};

/// Reads `.obj` files and their `.mtl` material libraries.
#[derive(Copy, Clone, Debug, Default)]
pub struct ObjImporter;

impl ObjImporter {
    pub fn new() -> Self {
        Self
    }
}

impl SceneImporter for ObjImporter {
    fn import(&self, path: &Path, flags: ImportFlags) -> Result<Scene, String> {
        let (models, materials) = tobj::load_obj(
            path,
            &tobj::LoadOptions {
                triangulate: flags.triangulate,
                single_index: true,
                ..Default::default()
            },
        )
        .map_err(|e| e.to_string())?;

        let materials = materials.unwrap_or_else(|e| {
            warn!("No usable MTL file for '{}' ({}), using no materials", path.display(), e);
            Vec::new()
        });

        let mut root = SceneNode::new(
            path.file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
                .unwrap_or_default(),
        );
        let mut meshes = Vec::with_capacity(models.len());

        for (index, model) in models.iter().enumerate() {
            meshes.push(convert_mesh(&model.name, &model.mesh, flags));
            root.children
                .push(SceneNode::new(model.name.clone()).with_meshes([index]));
        }

        debug!(
            "Imported '{}': {} objects, {} materials",
            path.display(),
            meshes.len(),
            materials.len()
        );

        Ok(Scene {
            root: Some(root),
            meshes,
            materials: materials.iter().map(convert_material).collect(),
            incomplete: false,
        })
    }
}

fn convert_mesh(name: &str, mesh: &tobj::Mesh, flags: ImportFlags) -> SceneMesh {
    let positions: Vec<[f32; 3]> = mesh
        .positions
        .chunks_exact(3)
        .map(|p| [p[0], p[1], p[2]])
        .collect();

    let faces: Vec<Vec<u32>> = if mesh.face_arities.is_empty() {
        mesh.indices.chunks(3).map(<[u32]>::to_vec).collect()
    } else {
        let mut start = 0;
        mesh.face_arities
            .iter()
            .map(|&arity| {
                let end = start + arity as usize;
                let face = mesh.indices[start..end].to_vec();
                start = end;
                face
            })
            .collect()
    };

    // Use normals from OBJ if available, otherwise calculate them
    let normals = if !mesh.normals.is_empty() && mesh.normals.len() == mesh.positions.len() {
        mesh.normals
            .chunks_exact(3)
            .map(|n| [n[0], n[1], n[2]])
            .collect()
    } else {
        calculate_smooth_normals(&positions, &faces)
    };

    let tex_coords = (!mesh.texcoords.is_empty()).then(|| {
        mesh.texcoords
            .chunks_exact(2)
            .map(|uv| {
                if flags.flip_uvs {
                    [uv[0], 1.0 - uv[1]]
                } else {
                    [uv[0], uv[1]]
                }
            })
            .collect()
    });

    SceneMesh {
        name: name.to_string(),
        positions,
        normals,
        tex_coords,
        faces,
        material_index: mesh.material_id,
    }
}

fn convert_material(material: &tobj::Material) -> SceneMaterial {
    let slots = [
        (TextureKind::Diffuse, &material.diffuse_texture),
        (TextureKind::Specular, &material.specular_texture),
        (TextureKind::Normal, &material.normal_texture),
        (TextureKind::Ambient, &material.ambient_texture),
    ];

    let mut converted = SceneMaterial::new(material.name.clone());
    for (kind, texture) in slots {
        if let Some(texture) = texture.as_deref().filter(|t| !t.is_empty()) {
            converted.add_texture(kind, texture);
        }
    }
    converted
}

/// Averages the face normals around each vertex, for files without normals.
pub(crate) fn calculate_smooth_normals(positions: &[[f32; 3]], faces: &[Vec<u32>]) -> Vec<[f32; 3]> {
    let mut normals = vec![[0.0_f32; 3]; positions.len()];
    let mut counts = vec![0u32; positions.len()];

    for face in faces.iter().filter(|face| face.len() >= 3) {
        let corners: Vec<usize> = face.iter().map(|&i| i as usize).collect();
        if corners.iter().any(|&i| i >= positions.len()) {
            continue;
        }
        let v0 = positions[corners[0]];
        let v1 = positions[corners[1]];
        let v2 = positions[corners[2]];

        let edge1 = [v1[0] - v0[0], v1[1] - v0[1], v1[2] - v0[2]];
        let edge2 = [v2[0] - v0[0], v2[1] - v0[1], v2[2] - v0[2]];

        let face_normal = [
            edge1[1] * edge2[2] - edge1[2] * edge2[1],
            edge1[2] * edge2[0] - edge1[0] * edge2[2],
            edge1[0] * edge2[1] - edge1[1] * edge2[0],
        ];

        for &vertex in &corners {
            for axis in 0..3 {
                normals[vertex][axis] += face_normal[axis];
            }
            counts[vertex] += 1;
        }
    }

    for (normal, &count) in normals.iter_mut().zip(&counts) {
        if count == 0 {
            continue;
        }
        let length = (normal[0].powi(2) + normal[1].powi(2) + normal[2].powi(2)).sqrt();
        if length > 0.0 {
            for component in normal.iter_mut() {
                *component /= length;
            }
        }
    }

    normals
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::PathBuf;

    fn fixture_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "haggis_models_obj_{}_{}",
            name,
            std::process::id()
        ));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    const TWO_OBJECTS: &str = "\
mtllib scene.mtl
o first
v 0.0 0.0 0.0
v 1.0 0.0 0.0
v 1.0 1.0 0.0
v 0.0 1.0 0.0
vt 0.0 0.25
vt 1.0 0.25
vt 1.0 1.0
vt 0.0 1.0
usemtl brick
f 1/1 2/2 3/3 4/4
o second
v 0.0 0.0 1.0
v 1.0 0.0 1.0
v 0.0 1.0 1.0
usemtl brick
f 5 6 7
";

    const MATERIALS: &str = "\
newmtl brick
Kd 0.8 0.8 0.8
map_Kd textures/brick.png
map_Ks textures/brick_spec.png
";

    #[test]
    fn test_objects_become_children_of_root() {
        let dir = fixture_dir("children");
        fs::write(dir.join("scene.obj"), TWO_OBJECTS).unwrap();
        fs::write(dir.join("scene.mtl"), MATERIALS).unwrap();

        let scene = ObjImporter::new()
            .import(&dir.join("scene.obj"), ImportFlags::default())
            .unwrap();

        let root = scene.root.as_ref().unwrap();
        assert!(root.meshes.is_empty());
        assert_eq!(root.children.len(), 2);
        assert_eq!(root.children[0].meshes, vec![0]);
        assert_eq!(root.children[1].meshes, vec![1]);
        assert_eq!(scene.meshes[0].name, "first");

        // Quad is triangulated into two faces
        assert_eq!(scene.meshes[0].faces.len(), 2);
        assert!(scene.meshes[0].faces.iter().all(|f| f.len() == 3));
        assert_eq!(scene.meshes[1].faces, vec![vec![0, 1, 2]]);
    }

    #[test]
    fn test_materials_and_texture_slots() {
        let dir = fixture_dir("materials");
        fs::write(dir.join("scene.obj"), TWO_OBJECTS).unwrap();
        fs::write(dir.join("scene.mtl"), MATERIALS).unwrap();

        let scene = ObjImporter::new()
            .import(&dir.join("scene.obj"), ImportFlags::default())
            .unwrap();

        assert_eq!(scene.materials.len(), 1);
        let material = &scene.materials[0];
        assert_eq!(
            material.texture_path(TextureKind::Diffuse, 0),
            Some("textures/brick.png")
        );
        assert_eq!(
            material.texture_path(TextureKind::Specular, 0),
            Some("textures/brick_spec.png")
        );
        assert_eq!(scene.meshes[0].material_index, Some(0));
    }

    #[test]
    fn test_flip_uvs() {
        let dir = fixture_dir("uvs");
        fs::write(dir.join("scene.obj"), TWO_OBJECTS).unwrap();
        fs::write(dir.join("scene.mtl"), MATERIALS).unwrap();
        let path = dir.join("scene.obj");

        let flipped = ObjImporter::new()
            .import(&path, ImportFlags::default())
            .unwrap();
        let unflipped = ObjImporter::new()
            .import(
                &path,
                ImportFlags {
                    flip_uvs: false,
                    ..ImportFlags::default()
                },
            )
            .unwrap();

        let flipped_uv = flipped.meshes[0].tex_coords.as_ref().unwrap()[0];
        let raw_uv = unflipped.meshes[0].tex_coords.as_ref().unwrap()[0];
        assert_eq!(raw_uv, [0.0, 0.25]);
        assert_eq!(flipped_uv, [0.0, 0.75]);
        assert!(flipped.meshes[1].tex_coords.is_none());
    }

    #[test]
    fn test_normals_computed_when_missing() {
        let dir = fixture_dir("normals");
        fs::write(dir.join("scene.obj"), TWO_OBJECTS).unwrap();
        fs::write(dir.join("scene.mtl"), MATERIALS).unwrap();

        let scene = ObjImporter::new()
            .import(&dir.join("scene.obj"), ImportFlags::default())
            .unwrap();

        for normal in &scene.meshes[1].normals {
            assert!((normal[2] - 1.0).abs() < 1e-6);
        }
    }

    #[test]
    fn test_missing_mtl_yields_no_materials() {
        let dir = fixture_dir("no_mtl");
        fs::write(dir.join("scene.obj"), TWO_OBJECTS).unwrap();
        let _ = fs::remove_file(dir.join("scene.mtl"));

        let scene = ObjImporter::new()
            .import(&dir.join("scene.obj"), ImportFlags::default())
            .unwrap();
        assert!(scene.materials.is_empty());
        assert_eq!(scene.meshes.len(), 2);
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let result = ObjImporter::new().import(
            Path::new("/definitely/not/here/scene.obj"),
            ImportFlags::default(),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_smooth_normals_of_flat_triangle() {
        let positions = [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]];
        let normals = calculate_smooth_normals(&positions, &[vec![0, 1, 2]]);
        assert_eq!(normals, vec![[0.0, 0.0, 1.0]; 3]);
    }
}
