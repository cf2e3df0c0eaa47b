use std::{
    fs,
    path::{Path, PathBuf},
};

use kiln_shared::{
    log::{info, trace, warn},
    serde_json::{self, Value},
};
use serde::Serialize;

use crate::{
    asset_processor::{ConvertContext, Converter},
    common::{extract_extension_from_path, relative_to_root},
    config::Config,
    meta::{self, Metadata},
    shader::Declaration,
    Error, Result,
};

/// Material that was read from a Wavefront `.mtl` file.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MtlMaterial {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ambient: Option<[f32; 3]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diffuse: Option<[f32; 3]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub specular: Option<[f32; 3]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub emissive: Option<[f32; 3]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub specular_exponent: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alpha: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refraction: Option<f32>,
    /// Texture maps by kind (e.g. `diffuse_map`) with the file name as it appears in the `.mtl` file.
    #[serde(skip)]
    pub maps: Vec<(String, String)>,
}

/// Parses the materials of a Wavefront `.mtl` file.
///
/// # Example
///
/// ```rust
/// use kiln_content::material::parse_mtl;
/// let materials = parse_mtl("newmtl stone\nKd 0.5 0.5 0.5\nmap_Kd stone.png\n", "stone.mtl".as_ref()).unwrap();
/// assert_eq!(materials[0].name, "stone");
/// assert_eq!(materials[0].diffuse, Some([0.5, 0.5, 0.5]));
/// assert_eq!(materials[0].maps, vec![("diffuse_map".to_owned(), "stone.png".to_owned())]);
/// ```
pub fn parse_mtl(source: &str, path: &Path) -> Result<Vec<MtlMaterial>> {
    let malformed = |line_number: usize, message: &str| Error::MalformedDescriptor {
        path: path.to_owned(),
        message: format!("line {}: {message}", line_number + 1),
    };

    let mut materials = Vec::<MtlMaterial>::new();
    for (line_number, line) in source.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let mut tokens = line.split_whitespace();
        let Some(key) = tokens.next() else {
            continue;
        };
        let arguments = tokens.collect::<Vec<_>>();

        if key == "newmtl" {
            let name = line[key.len()..].trim();
            if name.is_empty() {
                return Err(malformed(line_number, "material without name"));
            }
            // The name becomes the file name of the generated material.
            if name.contains(['/', '\\']) {
                return Err(malformed(line_number, &format!("material name '{name}' contains a path separator")));
            }
            materials.push(MtlMaterial {
                name: name.to_owned(),
                ..Default::default()
            });
            continue;
        }

        let Some(material) = materials.last_mut() else {
            trace!("Ignoring '{key}' before the first material in '{}'", path.display());
            continue;
        };

        let float = |index: usize| -> Result<f32> {
            arguments
                .get(index)
                .ok_or_else(|| malformed(line_number, &format!("'{key}' expects {} values", index + 1)))?
                .parse::<f32>()
                .map_err(|err| malformed(line_number, &format!("'{key}': {err}")))
        };
        let color = || -> Result<[f32; 3]> { Ok([float(0)?, float(1)?, float(2)?]) };
        // Map options like `-bm 1.0` precede the file name.
        let map = |kind: &str| -> Result<(String, String)> {
            let file_name = arguments
                .last()
                .ok_or_else(|| malformed(line_number, &format!("'{key}' expects a file name")))?;
            Ok((kind.to_owned(), (*file_name).to_owned()))
        };

        match key {
            "Ka" => material.ambient = Some(color()?),
            "Kd" => material.diffuse = Some(color()?),
            "Ks" => material.specular = Some(color()?),
            "Ke" => material.emissive = Some(color()?),
            "Ns" => material.specular_exponent = Some(float(0)?),
            "d" => material.alpha = Some(float(0)?),
            "Tr" => material.alpha = Some(1.0 - float(0)?),
            "Ni" => material.refraction = Some(float(0)?),
            "map_Ka" => material.maps.push(map("ambient_map")?),
            "map_Kd" => material.maps.push(map("diffuse_map")?),
            "map_Ks" => material.maps.push(map("specular_map")?),
            "map_d" => material.maps.push(map("alpha_map")?),
            "bump" | "map_bump" => material.maps.push(map("normal_map")?),
            _ => trace!("Ignoring unsupported key '{key}' in '{}'", path.display()),
        }
    }
    Ok(materials)
}

/// Returns the identity of the texture at `texture_path` or an empty string if the texture has no metadata.
pub fn texture_id(texture_path: &Path) -> Result<String> {
    let texture_meta = meta::load(texture_path)?;
    match meta::identity(&texture_meta) {
        Some(identity) => Ok(identity.to_owned()),
        None => {
            warn!("Texture '{}' has no identity", texture_path.display());
            Ok(String::new())
        }
    }
}

/// Converts the material into its JSON representation. The maps are resolved relative to `out_dir`.
fn material_to_json(material: &MtlMaterial, out_dir: &Path, config: &Config) -> Result<Value> {
    let mut value = serde_json::to_value(material).map_err(|err| Error::Other(Box::new(err)))?;
    if let Value::Object(object) = &mut value {
        for (kind, file_name) in &material.maps {
            let texture_path = out_dir.join(file_name);
            object.insert(
                format!("{kind}_path"),
                relative_to_root(&texture_path, &config.data_root).into(),
            );
            object.insert(format!("{kind}_id"), texture_id(&texture_path)?.into());
        }
    }
    Ok(value)
}

fn write_materials(materials: &[MtlMaterial], out_dir: &Path, config: &Config) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(out_dir)?;
    materials
        .iter()
        .map(|material| {
            let path = out_dir.join(format!("{}.mat", material.name));
            let content = meta::to_pretty_json(&material_to_json(material, out_dir, config)?)?;
            fs::write(&path, content)?;
            trace!("Written material '{}'", path.display());
            Ok(path)
        })
        .collect()
}

/// Writes a `<name>.mat` file into `out_dir` for every material in the `.mtl` file.
pub fn generate_materials(mtl_path: impl AsRef<Path>, out_dir: impl AsRef<Path>, config: &Config) -> Result<Vec<PathBuf>> {
    let (mtl_path, out_dir) = (mtl_path.as_ref(), out_dir.as_ref());
    info!("Generating materials from '{}'", mtl_path.display());
    let materials = parse_mtl(&fs::read_to_string(mtl_path)?, mtl_path)?;
    write_materials(&materials, out_dir, config)
}

/// Adds the identities of the referenced textures and the content of the referenced shaders to a `.mat` file.
fn enrich_material(content: &mut serde_json::Map<String, Value>, path: &Path, config: &Config) -> Result<()> {
    let string_value = |key: &str, value: &Value| -> Result<String> {
        value.as_str().map(ToOwned::to_owned).ok_or_else(|| Error::MalformedDescriptor {
            path: path.to_owned(),
            message: format!("'{key}' must be a string"),
        })
    };

    let mut additions = serde_json::Map::new();
    let mut uniforms = Vec::<Value>::new();
    for (key, value) in content.iter() {
        if key.contains("map_path") {
            let id_key = key.replace("path", "id");
            if !content.contains_key(&id_key) {
                let texture_path = config.data_root.join(string_value(key, value)?);
                additions.insert(id_key, texture_id(&texture_path)?.into());
            }
        }
        if key.contains("shader_path") {
            let shader_path = config.data_root.join(string_value(key, value)?);
            let shader_source = fs::read_to_string(&shader_path).map_err(|err| Error::MalformedDescriptor {
                path: path.to_owned(),
                message: format!("failed to read shader '{}': {err}", shader_path.display()),
            })?;
            additions.insert(key.replace("path", "content"), shader_source.into());

            let shader_meta = meta::load(&shader_path)?;
            let Some(shader_uniforms) = shader_meta.get("uniforms").and_then(Value::as_array) else {
                warn!("Shader '{}' has no uniforms in its metadata", shader_path.display());
                continue;
            };
            for uniform in shader_uniforms {
                let declaration: Declaration =
                    serde_json::from_value(uniform.clone()).map_err(|err| Error::MalformedMetadata {
                        path: shader_path.clone(),
                        message: err.to_string(),
                    })?;
                let known = uniforms
                    .iter()
                    .any(|existing| existing.get("name").and_then(Value::as_str) == Some(declaration.name.as_str()));
                if !known {
                    uniforms.push(uniform.clone());
                }
            }
        }
    }
    additions.insert("uniforms".to_owned(), Value::Array(uniforms));
    content.extend(additions);
    Ok(())
}

/// Converts `.mtl` files into one `.mat` file per material and enriches `.mat` files with the
/// identities of the referenced textures and the content of the referenced shaders.
pub struct MaterialConverter;

impl MaterialConverter {
    fn convert_mtl(config: &Config, src: &Path, dst: &Path, mut meta: Metadata) -> Result<Metadata> {
        let out_dir = dst.parent().unwrap_or(Path::new(""));
        let materials = parse_mtl(&fs::read_to_string(src)?, src)?;
        write_materials(&materials, out_dir, config)?;
        let material_files = materials
            .iter()
            .map(|material| Value::from(format!("{}.mat", material.name)))
            .collect();
        meta.insert("material_files".to_owned(), Value::Array(material_files));
        Ok(meta)
    }

    fn convert_mat(config: &Config, src: &Path, dst: &Path, meta: Metadata) -> Result<Metadata> {
        let content = fs::read_to_string(src)?;
        let mut material = match serde_json::from_str::<Value>(&content) {
            Ok(Value::Object(material)) => material,
            Ok(_) => {
                return Err(Error::MalformedDescriptor {
                    path: src.to_owned(),
                    message: "expected a JSON object".to_owned(),
                })
            }
            Err(err) => {
                return Err(Error::MalformedDescriptor {
                    path: src.to_owned(),
                    message: err.to_string(),
                })
            }
        };
        enrich_material(&mut material, src, config)?;
        fs::write(dst, meta::to_pretty_json(&material)?)?;
        Ok(meta)
    }
}

impl Converter for MaterialConverter {
    fn convert(&self, context: &ConvertContext, src: &Path, dst: &Path, meta: Metadata) -> Result<Metadata> {
        info!("Converting material '{}'", src.display());
        match extract_extension_from_path(src).as_deref() {
            Some("mtl") => Self::convert_mtl(context.config, src, dst, meta),
            _ => Self::convert_mat(context.config, src, dst, meta),
        }
    }
}

#[cfg(test)]
mod tests {
    use kiln_shared::{indoc::indoc, serde_json::json};
    use kiln_test::setup_logger;
    use tempdir::TempDir;

    use super::*;
    use crate::tool::testing::RecordingRunner;

    const CRATE_MTL: &str = indoc! {"
        # Exported by hand
        newmtl crate
        Ka 1.0 1.0 1.0
        Kd\t0.8 0.6  0.4
        Ns 250
        Tr 0.25
        map_Kd -bm 1.0 crate_diffuse.png
        bump crate_normal.png
        illum 2

        newmtl glass
        d 0.5
        Ke 0 0 1
        map_Kd missing.png
    "};

    fn object(value: Value) -> serde_json::Map<String, Value> {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn parse_all_materials() {
        let materials = parse_mtl(CRATE_MTL, Path::new("crate.mtl")).unwrap();
        assert_eq!(materials.len(), 2);

        let crate_material = &materials[0];
        assert_eq!(crate_material.name, "crate");
        assert_eq!(crate_material.ambient, Some([1.0, 1.0, 1.0]));
        assert_eq!(crate_material.diffuse, Some([0.8, 0.6, 0.4]));
        assert_eq!(crate_material.specular_exponent, Some(250.0));
        assert_eq!(crate_material.alpha, Some(0.75));
        assert_eq!(
            crate_material.maps,
            vec![
                ("diffuse_map".to_owned(), "crate_diffuse.png".to_owned()),
                ("normal_map".to_owned(), "crate_normal.png".to_owned()),
            ]
        );

        let glass = &materials[1];
        assert_eq!(glass.alpha, Some(0.5));
        assert_eq!(glass.emissive, Some([0.0, 0.0, 1.0]));
    }

    #[test]
    fn parse_malformed_number() {
        let result = parse_mtl("newmtl a\nKd 1.0 x 1.0", Path::new("a.mtl"));
        assert!(matches!(result, Err(Error::MalformedDescriptor { .. })));
    }

    #[test]
    fn parse_name_with_path_separator() {
        for source in ["newmtl ../escape\nKd 1 1 1", "newmtl sub\\escape"] {
            let result = parse_mtl(source, Path::new("a.mtl"));
            assert!(matches!(result, Err(Error::MalformedDescriptor { .. })), "{source}");
        }
    }

    #[test]
    fn parse_missing_values() {
        let result = parse_mtl("newmtl a\nKa 1.0", Path::new("a.mtl"));
        assert!(matches!(result, Err(Error::MalformedDescriptor { .. })));
    }

    #[test]
    fn convert_mtl() {
        // Given
        setup_logger();
        let root = TempDir::new("root").unwrap();
        let data_root = root.path().join("data");
        let dst = data_root.join("models").join("crate.mtl");
        fs::create_dir_all(dst.parent().unwrap()).unwrap();
        let src = root.path().join("crate.mtl");
        fs::write(&src, CRATE_MTL).unwrap();
        fs::write(dst.with_file_name("crate_diffuse.png.meta"), r#"{"uuid": "diffuse-id"}"#).unwrap();
        let config = Config::new(&data_root);
        let runner = RecordingRunner::new();
        let context = ConvertContext {
            config: &config,
            runner: &runner,
        };

        // When
        let meta = MaterialConverter.convert(&context, &src, &dst, Metadata::new()).unwrap();

        // Then
        assert_eq!(meta["material_files"], json!(["crate.mat", "glass.mat"]));
        let crate_material: Value = serde_json::from_str(&fs::read_to_string(dst.with_file_name("crate.mat")).unwrap()).unwrap();
        assert_eq!(crate_material["name"], json!("crate"));
        assert_eq!(crate_material["diffuse_map_path"], json!("models/crate_diffuse.png"));
        assert_eq!(crate_material["diffuse_map_id"], json!("diffuse-id"));
        assert_eq!(crate_material["normal_map_path"], json!("models/crate_normal.png"));
        assert_eq!(crate_material["normal_map_id"], json!(""));
        let glass: Value = serde_json::from_str(&fs::read_to_string(dst.with_file_name("glass.mat")).unwrap()).unwrap();
        assert_eq!(glass["alpha"], json!(0.5));
        assert_eq!(glass["diffuse_map_id"], json!(""));
    }

    #[test]
    fn convert_mat() {
        // Given
        let root = TempDir::new("root").unwrap();
        let data_root = root.path().join("data");
        fs::create_dir_all(data_root.join("shaders")).unwrap();
        fs::create_dir_all(data_root.join("textures")).unwrap();
        fs::write(data_root.join("textures/albedo.png.meta"), r#"{"uuid": "albedo-id"}"#).unwrap();
        fs::write(data_root.join("shaders/pbr.vert"), "uniform mat4 model;").unwrap();
        fs::write(
            data_root.join("shaders/pbr.vert.meta"),
            r#"{"uniforms": [{"type": "mat4", "name": "model"}, {"type": "float", "name": "time"}]}"#,
        )
        .unwrap();
        fs::write(data_root.join("shaders/pbr.frag"), "uniform float time;").unwrap();
        fs::write(
            data_root.join("shaders/pbr.frag.meta"),
            r#"{"uniforms": [{"type": "float", "name": "time"}, {"type": "sampler2D", "name": "albedo"}]}"#,
        )
        .unwrap();
        let src = root.path().join("pbr.mat");
        let material = json!({
            "albedo_map_path": "textures/albedo.png",
            "normal_map_path": "textures/normal.png",
            "roughness_map_path": "textures/roughness.png",
            "roughness_map_id": "fixed",
            "vertex_shader_path": "shaders/pbr.vert",
            "fragment_shader_path": "shaders/pbr.frag",
        });
        fs::write(&src, material.to_string()).unwrap();
        let dst = data_root.join("materials/pbr.mat");
        fs::create_dir_all(dst.parent().unwrap()).unwrap();
        let config = Config::new(&data_root);
        let runner = RecordingRunner::new();
        let context = ConvertContext {
            config: &config,
            runner: &runner,
        };

        // When
        MaterialConverter.convert(&context, &src, &dst, Metadata::new()).unwrap();

        // Then
        let result: Value = serde_json::from_str(&fs::read_to_string(&dst).unwrap()).unwrap();
        assert_eq!(result["albedo_map_id"], json!("albedo-id"));
        assert_eq!(result["normal_map_id"], json!(""));
        assert_eq!(result["roughness_map_id"], json!("fixed"));
        assert_eq!(result["vertex_shader_content"], json!("uniform mat4 model;"));
        assert_eq!(result["fragment_shader_content"], json!("uniform float time;"));
        let uniform_names = result["uniforms"]
            .as_array()
            .unwrap()
            .iter()
            .map(|uniform| uniform["name"].as_str().unwrap())
            .collect::<Vec<_>>();
        assert_eq!(uniform_names.len(), 3);
        for name in ["model", "time", "albedo"] {
            assert!(uniform_names.contains(&name));
        }
    }

    #[test]
    fn mat_with_missing_shader_fails() {
        let root = TempDir::new("root").unwrap();
        let config = Config::new(root.path());
        let mut material = object(json!({"shader_path": "missing.vert"}));
        let result = enrich_material(&mut material, Path::new("a.mat"), &config);
        assert!(matches!(result, Err(Error::MalformedDescriptor { .. })));
    }

    #[test]
    fn mat_with_shader_without_metadata() {
        let root = TempDir::new("root").unwrap();
        fs::write(root.path().join("plain.frag"), "void main() {}").unwrap();
        let config = Config::new(root.path());
        let mut material = object(json!({"shader_path": "plain.frag"}));

        enrich_material(&mut material, Path::new("a.mat"), &config).unwrap();

        assert_eq!(material["shader_content"], json!("void main() {}"));
        assert_eq!(material["uniforms"], json!([]));
    }

    #[test]
    fn generate_materials_into_folder() {
        let root = TempDir::new("root").unwrap();
        let mtl_path = root.path().join("crate.mtl");
        fs::write(&mtl_path, CRATE_MTL).unwrap();
        let out_dir = root.path().join("out");

        let paths = generate_materials(&mtl_path, &out_dir, &Config::new(root.path())).unwrap();

        assert_eq!(paths, vec![out_dir.join("crate.mat"), out_dir.join("glass.mat")]);
        assert!(paths.iter().all(|path| path.is_file()));
        assert!(!crate::common::meta_path(out_dir.join("crate.mat")).exists());
    }
}
