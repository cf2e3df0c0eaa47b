use std::{
    ffi::OsString,
    fs,
    path::{Path, PathBuf},
};

use kiln_shared::{log::info, serde_json};
use serde::{Deserialize, Serialize};

use crate::{
    asset_processor::{ConvertContext, Converter},
    common::relative_to_root,
    config::{Config, SKYBOX_SCHEMA_FILE_NAME},
    meta::{self, Metadata},
    tool::Tool,
    Error, Result,
};

/// Content of a `.skybox` file. The faces are paths relative to the file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkyboxDescriptor {
    pub name: String,
    pub right: String,
    pub left: String,
    pub top: String,
    pub bottom: String,
    pub front: String,
    pub back: String,
}

impl SkyboxDescriptor {
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(|err| Error::MalformedDescriptor {
            path: path.to_owned(),
            message: err.to_string(),
        })
    }

    /// Paths of the faces in the order in which they are stored in a cubemap.
    pub fn face_paths(&self, face_dir: &Path) -> [PathBuf; 6] {
        [
            &self.right,
            &self.left,
            &self.top,
            &self.bottom,
            &self.front,
            &self.back,
        ]
        .map(|face| face_dir.join(face))
    }
}

/// Packs the six faces of a skybox into one cubemap with `toktx`.
pub struct SkyboxConverter;

impl Converter for SkyboxConverter {
    fn check_configuration(&self, config: &Config, _src: &Path) -> Result<()> {
        config.tool_path(Tool::ValidateJson)?;
        config.tool_path(Tool::Toktx)?;
        config.schema_path(SKYBOX_SCHEMA_FILE_NAME)?;
        Ok(())
    }

    fn convert(&self, context: &ConvertContext, src: &Path, dst: &Path, mut meta: Metadata) -> Result<Metadata> {
        let schema_path = context.config.schema_path(SKYBOX_SCHEMA_FILE_NAME)?;
        context
            .runner
            .run(Tool::ValidateJson, &[OsString::from(src), OsString::from(&schema_path)])?;
        let descriptor = SkyboxDescriptor::from_file(src)?;

        meta::setting(&mut meta, "transcoder", "BC1_RGB".to_owned())?;
        let genmipmap = meta::setting(&mut meta, "genmipmap", true)?;

        let face_dir = src.parent().unwrap_or(Path::new(""));
        let ktx_path = dst
            .parent()
            .unwrap_or(Path::new(""))
            .join(format!("{}.ktx", descriptor.name));
        info!("Packing skybox '{}' into '{}'", descriptor.name, ktx_path.display());

        let mut args = vec![OsString::from("--cubemap")];
        if genmipmap {
            args.push("--genmipmap".into());
        }
        args.push(ktx_path.clone().into());
        args.extend(descriptor.face_paths(face_dir).map(OsString::from));
        context.runner.run(Tool::Toktx, &args)?;

        meta.insert(
            "ktx_path".to_owned(),
            relative_to_root(&ktx_path, &context.config.data_root).into(),
        );
        Ok(meta)
    }
}
