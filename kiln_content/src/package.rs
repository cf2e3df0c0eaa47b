use std::{
    collections::BTreeSet,
    ffi::OsString,
    fs::{self, File},
    io::{self, Write},
    path::{Path, PathBuf},
};

use kiln_shared::{
    log::{info, trace, warn},
    serde_json::{self, Value},
    thiserror,
};
use serde::{Deserialize, Serialize};
use zip::{write::FileOptions, CompressionMethod, ZipWriter};

use crate::{
    asset_processor::{ConvertContext, Converter},
    common::{create_parent_dirs, relative_to_root},
    config::{Config, PACKAGE_SCHEMA_FILE_NAME},
    meta::Metadata,
    tool::Tool,
    Result,
};

/// Characters that turn an entry of a package into a glob pattern.
const GLOB_CHARACTERS: &[char] = &['*', '?', '['];

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("File '{0}' of the package doesn't exist")]
    MissingFile(String),
    #[error("Invalid pattern '{pattern}': {error_message}")]
    InvalidPattern { pattern: String, error_message: String },
    #[error("Failed to write archive '{path}': {error_message}")]
    FailedWriting { path: PathBuf, error_message: String },
}

impl From<Error> for crate::Error {
    fn from(value: Error) -> Self {
        crate::Error::Other(Box::new(value))
    }
}

/// Content of a `.pkg_json` file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageDescriptor {
    pub name: String,
    /// Paths relative to the data root. Entries containing `*`, `?` or `[` are glob patterns.
    pub files: Vec<String>,
}

impl PackageDescriptor {
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(|err| crate::Error::MalformedDescriptor {
            path: path.to_owned(),
            message: err.to_string(),
        })
    }

    /// Resolves the entries against `data_root` and returns the sorted paths relative to `data_root`.
    pub fn resolve(&self, data_root: &Path) -> Result<BTreeSet<String>> {
        let mut files = BTreeSet::new();
        for entry in &self.files {
            if entry.contains(GLOB_CHARACTERS) {
                let matches = expand_pattern(entry, data_root)?;
                if matches.is_empty() {
                    warn!("Pattern '{entry}' of package '{}' doesn't match any file", self.name);
                }
                files.extend(matches);
            } else {
                if !data_root.join(entry).is_file() {
                    return Err(Error::MissingFile(entry.clone()).into());
                }
                files.insert(entry.replace('\\', "/"));
            }
        }
        Ok(files)
    }
}

fn expand_pattern(entry: &str, data_root: &Path) -> Result<Vec<String>> {
    let root = glob::Pattern::escape(&data_root.to_string_lossy());
    let pattern = format!("{root}/{entry}");
    let paths = glob::glob(&pattern).map_err(|err| Error::InvalidPattern {
        pattern: entry.to_owned(),
        error_message: err.to_string(),
    })?;
    let mut matches = Vec::new();
    for path in paths {
        let path = path.map_err(|err| crate::Error::IoError(err.into_error()))?;
        if path.is_file() {
            matches.push(relative_to_root(&path, data_root));
        }
    }
    trace!("Pattern '{entry}' matches {} files", matches.len());
    Ok(matches)
}

/// Writes the files to a zip archive. The entries are named by their path relative to `data_root`.
fn write_archive<'a>(archive_path: &Path, data_root: &Path, files: impl IntoIterator<Item = &'a String>) -> Result<()> {
    let failed = |err: &dyn std::fmt::Display| Error::FailedWriting {
        path: archive_path.to_owned(),
        error_message: err.to_string(),
    };

    create_parent_dirs(archive_path)?;
    let mut writer = ZipWriter::new(File::create(archive_path)?);
    let options = FileOptions::default().compression_method(CompressionMethod::Deflated);
    for file in files {
        writer.start_file(file.as_str(), options).map_err(|err| failed(&err))?;
        let mut reader = File::open(data_root.join(file))?;
        io::copy(&mut reader, &mut writer)?;
    }
    let mut inner = writer.finish().map_err(|err| failed(&err))?;
    inner.flush()?;
    Ok(())
}

/// Bundles the files that a package descriptor names into a `<name>.pkg` zip archive.
pub struct PackageConverter;

impl Converter for PackageConverter {
    fn check_configuration(&self, config: &Config, _src: &Path) -> Result<()> {
        config.tool_path(Tool::ValidateJson)?;
        config.schema_path(PACKAGE_SCHEMA_FILE_NAME)?;
        Ok(())
    }

    fn convert(&self, context: &ConvertContext, src: &Path, dst: &Path, mut meta: Metadata) -> Result<Metadata> {
        let schema_path = context.config.schema_path(PACKAGE_SCHEMA_FILE_NAME)?;
        context
            .runner
            .run(Tool::ValidateJson, &[OsString::from(src), OsString::from(&schema_path)])?;
        let descriptor = PackageDescriptor::from_file(src)?;

        let data_root = &context.config.data_root;
        let pkg_path = dst
            .parent()
            .unwrap_or(Path::new(""))
            .join(format!("{}.pkg", descriptor.name));
        let mut files = descriptor.resolve(data_root)?;
        // The archive of a previous run must not be packed into itself.
        files.remove(&relative_to_root(&pkg_path, data_root));
        info!("Writing package '{}' with {} files", pkg_path.display(), files.len());
        write_archive(&pkg_path, data_root, &files)?;

        meta.insert("pkg_path".to_owned(), relative_to_root(&pkg_path, data_root).into());
        meta.insert(
            "package_files".to_owned(),
            Value::Array(files.into_iter().map(Value::from).collect()),
        );
        Ok(meta)
    }
}
