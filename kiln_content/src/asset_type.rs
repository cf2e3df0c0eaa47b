use std::{fmt, path::Path};

use serde::{Deserialize, Serialize};

use crate::common::extract_extension_from_path;

/// Extensions of all files that are classified as [`AssetType::Texture`].
pub const TEXTURE_EXTENSIONS: &[&str] = &[
    "jpeg", "jpg", "png", "bmp", "tga", "hdr", "ktx", "ktx2", "dds", "pam", "ppm", "pgm", "basis",
];

/// Type of an asset. It is determined by the extension of the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum AssetType {
    Unknown,
    Material,
    Mesh,
    Texture,
    Scene,
    VertexShader,
    FragmentShader,
    Font,
    Skybox,
    Package,
}

impl AssetType {
    /// Returns the [`AssetType`] for the given lowercase extension without the leading dot.
    pub fn from_extension(extension: &str) -> Self {
        match extension {
            extension if TEXTURE_EXTENSIONS.contains(&extension) => AssetType::Texture,
            "mtl" | "mat" => AssetType::Material,
            "obj" => AssetType::Mesh,
            "scene" => AssetType::Scene,
            "vert" => AssetType::VertexShader,
            "frag" => AssetType::FragmentShader,
            "ttf" => AssetType::Font,
            "skybox" => AssetType::Skybox,
            "pkg_json" => AssetType::Package,
            _ => AssetType::Unknown,
        }
    }
}

impl fmt::Display for AssetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AssetType::Unknown => "Unknown",
            AssetType::Material => "Material",
            AssetType::Mesh => "Mesh",
            AssetType::Texture => "Texture",
            AssetType::Scene => "Scene",
            AssetType::VertexShader => "VertexShader",
            AssetType::FragmentShader => "FragmentShader",
            AssetType::Font => "Font",
            AssetType::Skybox => "Skybox",
            AssetType::Package => "Package",
        };
        f.write_str(name)
    }
}

/// Classifies the file at `path` by its extension. The file doesn't have to exist.
///
/// # Example
///
/// ```rust
/// use kiln_content::{classify, AssetType};
/// assert_eq!(classify("textures/Shield.PNG"), AssetType::Texture);
/// assert_eq!(classify("shaders/shield.vert"), AssetType::VertexShader);
/// assert_eq!(classify("readme.txt"), AssetType::Unknown);
/// ```
pub fn classify(path: impl AsRef<Path>) -> AssetType {
    extract_extension_from_path(path.as_ref())
        .map(|extension| AssetType::from_extension(&extension))
        .unwrap_or(AssetType::Unknown)
}
