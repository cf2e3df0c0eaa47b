use std::{ffi::OsString, path::Path};

use kiln_shared::{
    log::{info, trace},
    serde_json::{self, Value},
    thiserror,
};
use serde::Deserialize;

use crate::{
    asset_processor::{ConvertContext, Converter},
    common::{append_extension, extract_extension_from_path, relative_to_root},
    config::Config,
    meta::{self, Metadata},
    tool::Tool,
    Result,
};

/// Extensions of the images that can be encoded into a KTX container.
pub const TRANSCODABLE_EXTENSIONS: &[&str] = &["jpeg", "jpg", "png", "pam", "ppm", "pgm"];

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Textures must have 1 to 4 channels but '{path}' has {channel_count}")]
    UnsupportedChannelCount { path: String, channel_count: u8 },
    #[error("Failed to determine the format of '{path}': {error_message}")]
    FailedProbing { path: String, error_message: String },
}

impl From<Error> for crate::Error {
    fn from(value: Error) -> Self {
        crate::Error::Other(Box::new(value))
    }
}

/// Output of the `image_format` tool.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ImageFormat {
    channel_count: u8,
}

/// Returns whether the texture at `path` is encoded by the [`TextureConverter`].
pub fn is_transcodable(path: &Path) -> bool {
    extract_extension_from_path(path).map_or(false, |extension| TRANSCODABLE_EXTENSIONS.contains(&extension.as_str()))
}

/// Returns the default block compression for an image with the given number of channels.
///
/// # Example
///
/// ```rust
/// use kiln_content::texture::default_transcoder;
/// assert_eq!(default_transcoder(4), Some("BC3_RGBA"));
/// assert_eq!(default_transcoder(5), None);
/// ```
pub fn default_transcoder(channel_count: u8) -> Option<&'static str> {
    match channel_count {
        1 => Some("BC4_R"),
        2 => Some("BC5_RG"),
        3 => Some("BC1_RGB"),
        4 => Some("BC3_RGBA"),
        _ => None,
    }
}

/// Transcoders of the BC7 family need the high quality UASTC intermediate.
fn needs_uastc(transcoder: &str) -> bool {
    transcoder.to_uppercase().starts_with("BC7")
}

/// Encodes images into a `.basis` file with `basisu` and into a `.ktx` file with `toktx`.
///
/// Both files are separate outputs that are encoded from the source image. `toktx` doesn't read
/// `.basis` files, so the `.basis` file is never an input of the `.ktx` file.
///
/// | Key           | Default      |
/// |---------------|--------------|
/// | `transcoder`  | by channels  |
/// | `linear`      | `true`       |
/// | `ktx2`        | `true`       |
/// | `genmipmap`   | `true`       |
/// | `compression` | `"zcmp"`     |
/// | `zcmp_level`  | `3`          |
///
/// Images that can't be encoded (e.g. `.dds`) are only copied.
pub struct TextureConverter;

impl TextureConverter {
    fn channel_count(context: &ConvertContext, src: &Path) -> Result<u8> {
        let channel_count = if context.config.tools.get(Tool::ImageFormat).is_some() {
            let output = context.runner.run(Tool::ImageFormat, &[OsString::from(src)])?;
            let format: ImageFormat = serde_json::from_str(&output.stdout).map_err(|err| Error::FailedProbing {
                path: src.display().to_string(),
                error_message: err.to_string(),
            })?;
            format.channel_count
        } else {
            image::open(src)
                .map_err(|err| Error::FailedProbing {
                    path: src.display().to_string(),
                    error_message: err.to_string(),
                })?
                .color()
                .channel_count()
        };
        trace!("Texture '{}' has {channel_count} channels", src.display());
        Ok(channel_count)
    }

    fn transcoder(context: &ConvertContext, src: &Path, meta: &Metadata) -> Result<String> {
        if let Some(transcoder) = meta.get("transcoder").and_then(Value::as_str) {
            return Ok(transcoder.to_owned());
        }
        let channel_count = Self::channel_count(context, src)?;
        let transcoder = default_transcoder(channel_count).ok_or_else(|| Error::UnsupportedChannelCount {
            path: src.display().to_string(),
            channel_count,
        })?;
        Ok(transcoder.to_owned())
    }
}

impl Converter for TextureConverter {
    fn check_configuration(&self, config: &Config, src: &Path) -> Result<()> {
        if is_transcodable(src) {
            config.tool_path(Tool::Basisu)?;
            config.tool_path(Tool::Toktx)?;
        }
        Ok(())
    }

    fn convert(&self, context: &ConvertContext, src: &Path, dst: &Path, mut meta: Metadata) -> Result<Metadata> {
        if !is_transcodable(src) {
            trace!("Texture '{}' is not encoded", src.display());
            return Ok(meta);
        }

        let transcoder = Self::transcoder(context, src, &meta)?;
        let transcoder: String = meta::setting(&mut meta, "transcoder", transcoder)?;
        let linear = meta::setting(&mut meta, "linear", true)?;
        let ktx2 = meta::setting(&mut meta, "ktx2", true)?;
        let genmipmap = meta::setting(&mut meta, "genmipmap", true)?;
        let compression: String = meta::setting(&mut meta, "compression", "zcmp".to_owned())?;

        info!("Encoding texture '{}' with transcoder {transcoder}", src.display());
        let basis_path = append_extension(dst, "basis");
        let mut args = Vec::<OsString>::new();
        if needs_uastc(&transcoder) {
            args.push("-uastc".into());
        }
        if linear {
            args.push("-linear".into());
        }
        if genmipmap {
            args.push("-mipmap".into());
        }
        args.extend([OsString::from("-output_file"), OsString::from(&basis_path), OsString::from(src)]);
        context.runner.run(Tool::Basisu, &args)?;

        let ktx_path = append_extension(dst, "ktx");
        let color_space = if linear { "--linear" } else { "--srgb" };
        let mut args = vec![OsString::from(color_space)];
        if ktx2 {
            args.push("--t2".into());
        }
        if genmipmap {
            args.push("--genmipmap".into());
        }
        match compression.as_str() {
            "bcmp" => args.push("--bcmp".into()),
            "zcmp" => {
                let level: u32 = meta::setting(&mut meta, "zcmp_level", 3)?;
                args.extend([OsString::from("--zcmp"), OsString::from(level.to_string())]);
            }
            _ => {}
        }
        args.extend([OsString::from(&ktx_path), OsString::from(src)]);
        context.runner.run(Tool::Toktx, &args)?;

        let data_root = &context.config.data_root;
        meta.insert("basis_path".to_owned(), relative_to_root(&basis_path, data_root).into());
        meta.insert("ktx_path".to_owned(), relative_to_root(&ktx_path, data_root).into());
        meta.insert("ktx".to_owned(), true.into());
        Ok(meta)
    }
}
