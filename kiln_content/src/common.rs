use std::{
    ffi::OsString,
    fs, io,
    path::{Path, PathBuf},
    result,
};

use kiln_shared::{log::trace, pathdiff, thiserror};

use crate::{asset_type::AssetType, tool::Tool};

/// Extension that is appended to the path of an asset to get the path of its sidecar metadata file.
pub const META_FILE_EXTENSION: &str = "meta";

pub type Result<T> = result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IoError: {0}")]
    IoError(#[from] io::Error),
    #[error("Malformed metadata in '{path}': {message}")]
    MalformedMetadata { path: PathBuf, message: String },
    #[error("Metadata value of '{key}' has an unexpected type: {message}")]
    InvalidMetadataValue { key: String, message: String },
    #[error("Malformed descriptor '{path}': {message}")]
    MalformedDescriptor { path: PathBuf, message: String },
    #[error("Invalid configuration file '{path}': {message}")]
    InvalidConfig { path: PathBuf, message: String },
    #[error("Missing configuration: {0}")]
    MissingConfiguration(String),
    #[error("No converter registered for asset type {0}")]
    ConverterNotRegistered(AssetType),
    #[error("Failed to launch {tool}: {message}")]
    ToolLaunch { tool: Tool, message: String },
    #[error("{tool} exited with exit code {code:?}:\nstdout:\n{stdout}\nstderr:\n{stderr}")]
    ToolFailed {
        tool: Tool,
        code: Option<i32>,
        stdout: String,
        stderr: String,
    },
    #[error("Other: {0}")]
    Other(Box<dyn std::error::Error + Send + Sync>),
}

pub(crate) fn extract_extension_from_path(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|extension| extension.to_str())
        .map(|extension| extension.to_lowercase())
}

/// Appends `extension` to the full file name, e.g. `albedo.png` becomes `albedo.png.ktx`.
pub fn append_extension(path: impl AsRef<Path>, extension: &str) -> PathBuf {
    let mut path: OsString = path.as_ref().as_os_str().to_owned();
    path.push(".");
    path.push(extension);
    PathBuf::from(path)
}

/// Returns the path of the sidecar metadata file that belongs to the asset at `path`.
pub fn meta_path(path: impl AsRef<Path>) -> PathBuf {
    append_extension(path, META_FILE_EXTENSION)
}

/// Path of `path` relative to `root` with forward slashes. Paths outside of `root` are returned unchanged.
pub fn relative_to_root(path: &Path, root: &Path) -> String {
    let relative = if path.starts_with(root) {
        pathdiff::diff_paths(path, root).unwrap_or_else(|| path.to_owned())
    } else {
        path.to_owned()
    };
    relative.to_string_lossy().replace('\\', "/")
}

/// Creates all missing parent directories of `path`.
pub(crate) fn create_parent_dirs(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            trace!("Creating directory: {}", parent.display());
            fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

/// Copies `src` to `dst`, creating the parent directories of `dst`. Copying a file onto itself does nothing.
pub(crate) fn copy_file(src: &Path, dst: &Path) -> Result<()> {
    create_parent_dirs(dst)?;
    if let (Ok(src_canonical), Ok(dst_canonical)) = (src.canonicalize(), dst.canonicalize()) {
        if src_canonical == dst_canonical {
            return Ok(());
        }
    }
    trace!("Copying '{}' to '{}'", src.display(), dst.display());
    fs::copy(src, dst)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use tempdir::TempDir;

    use super::*;

    #[test]
    fn meta_path_appends_extension() {
        assert_eq!(meta_path("textures/albedo.png"), PathBuf::from("textures/albedo.png.meta"));
        assert_eq!(meta_path("shader"), PathBuf::from("shader.meta"));
    }

    #[test]
    fn extension_is_lowercased() {
        assert_eq!(extract_extension_from_path(Path::new("a/B.PNG")), Some("png".to_owned()));
        assert_eq!(extract_extension_from_path(Path::new("a/b")), None);
    }

    #[test]
    fn relative_to_root_uses_forward_slashes() {
        let root = Path::new("build").join("data");
        let path = root.join("textures").join("albedo.png");
        assert_eq!(relative_to_root(&path, &root), "textures/albedo.png");
        assert_eq!(relative_to_root(Path::new("/elsewhere/a.png"), &root), "/elsewhere/a.png");
    }

    #[test]
    fn copy_creates_parent_directories() {
        // Given
        let root = TempDir::new("root").unwrap();
        let src = root.path().join("src.txt");
        fs::write(&src, "Hello World!").unwrap();
        let dst = root.path().join("a").join("b").join("dst.txt");

        // When
        copy_file(&src, &dst).unwrap();

        // Then
        assert_eq!(fs::read_to_string(&dst).unwrap(), "Hello World!");
    }

    #[test]
    fn copy_onto_itself_keeps_content() {
        let root = TempDir::new("root").unwrap();
        let src = root.path().join("same.txt");
        fs::write(&src, "Hello World!").unwrap();
        copy_file(&src, &src).unwrap();
        assert_eq!(fs::read_to_string(&src).unwrap(), "Hello World!");
    }
}
