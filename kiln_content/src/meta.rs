//! Sidecar metadata files.
//!
//! Every processed asset gets a `<asset>.meta` file next to it. It is a JSON object that stores
//! the identity of the asset (`uuid`) as well as every conversion setting that was applied to
//! it. Settings that are absent are filled with the converter's defaults and written back so
//! that the file can be edited to override them on the next run.

use std::{
    fs, io,
    path::{Path, PathBuf},
};

use kiln_shared::{
    log::trace,
    serde_json::{
        self,
        ser::{PrettyFormatter, Serializer},
        Map, Value,
    },
    uuid::Uuid,
};
use serde::{de::DeserializeOwned, Serialize};

use crate::{
    common::{append_extension, create_parent_dirs, meta_path},
    Error, Result,
};

/// Key of the identity of an asset.
pub const IDENTITY_KEY: &str = "uuid";

/// Key that disables copying the source file to the destination when set to `false`.
pub const COPY_KEY: &str = "copy";

/// Content of a sidecar metadata file.
pub type Metadata = Map<String, Value>;

/// Reads the metadata of the asset at `asset_path` from `<asset_path>.meta`.
///
/// Returns an empty [`Metadata`] when the file doesn't exist. A file that exists but doesn't
/// contain a JSON object results in [`Error::MalformedMetadata`].
pub fn load(asset_path: impl AsRef<Path>) -> Result<Metadata> {
    let path = meta_path(asset_path);
    if !path.is_file() {
        trace!("No metadata found at '{}'", path.display());
        return Ok(Metadata::new());
    }
    let content = fs::read_to_string(&path)?;
    parse(&path, &content)
}

fn parse(path: &Path, content: &str) -> Result<Metadata> {
    match serde_json::from_str::<Value>(content) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(Error::MalformedMetadata {
            path: path.to_owned(),
            message: format!("expected a JSON object but found '{other}'"),
        }),
        Err(err) => Err(Error::MalformedMetadata {
            path: path.to_owned(),
            message: err.to_string(),
        }),
    }
}

/// Merges the destination and the source metadata. Keys that are present on both sides take the value of `src`.
///
/// # Example
///
/// ```rust
/// use kiln_content::meta::{merge, Metadata};
/// use kiln_shared::serde_json::json;
///
/// let dst = json!({"a": 1, "b": 2}).as_object().unwrap().clone();
/// let src = json!({"b": 3, "c": 4}).as_object().unwrap().clone();
/// let merged = merge(&dst, &src);
/// assert_eq!(merged, json!({"a": 1, "b": 3, "c": 4}).as_object().unwrap().clone());
/// ```
pub fn merge(dst: &Metadata, src: &Metadata) -> Metadata {
    let mut merged = dst.clone();
    for (key, value) in src {
        merged.insert(key.clone(), value.clone());
    }
    merged
}

/// Assigns a new identity to the metadata if it doesn't have one yet.
pub fn ensure_identity(mut meta: Metadata) -> Metadata {
    if !meta.contains_key(IDENTITY_KEY) {
        let uuid = Uuid::new_v4().to_string();
        trace!("Assigning new identity {uuid}");
        meta.insert(IDENTITY_KEY.to_owned(), Value::String(uuid));
    }
    meta
}

/// Returns the identity of the asset if it has one.
pub fn identity(meta: &Metadata) -> Option<&str> {
    meta.get(IDENTITY_KEY).and_then(Value::as_str)
}

/// Returns `false` only if the metadata explicitly disables copying.
pub fn copy_enabled(meta: &Metadata) -> bool {
    meta.get(COPY_KEY).and_then(Value::as_bool).unwrap_or(true)
}

/// Serializes the metadata with an indentation of four spaces.
pub fn to_pretty_json(value: &impl Serialize) -> io::Result<Vec<u8>> {
    let mut buffer = Vec::new();
    let mut serializer = Serializer::with_formatter(&mut buffer, PrettyFormatter::with_indent(b"    "));
    value.serialize(&mut serializer).map_err(io::Error::from)?;
    buffer.push(b'\n');
    Ok(buffer)
}

/// Writes the metadata of the asset at `asset_path` to `<asset_path>.meta`.
///
/// The content is written to a temporary file first which is renamed afterwards so that
/// readers either observe the old or the new file but never a partially written one.
pub fn persist(asset_path: impl AsRef<Path>, meta: &Metadata) -> Result<PathBuf> {
    let path = meta_path(&asset_path);
    let temporary_path = append_extension(&path, "tmp");
    create_parent_dirs(&path)?;
    let content = to_pretty_json(meta)?;
    fs::write(&temporary_path, content)?;
    if let Err(err) = fs::rename(&temporary_path, &path) {
        let _ = fs::remove_file(&temporary_path);
        return Err(err.into());
    }
    trace!("Written metadata to '{}'", path.display());
    Ok(path)
}

/// Returns the setting stored under `key` or stores and returns `default` if the key is absent.
///
/// Every tunable conversion parameter goes through this function so that the applied value
/// ends up in the metadata where it can be overridden.
pub fn setting<T>(meta: &mut Metadata, key: &str, default: T) -> Result<T>
where
    T: Serialize + DeserializeOwned,
{
    if let Some(value) = meta.get(key) {
        return serde_json::from_value(value.clone()).map_err(|err| Error::InvalidMetadataValue {
            key: key.to_owned(),
            message: err.to_string(),
        });
    }
    let value = serde_json::to_value(&default).map_err(|err| Error::InvalidMetadataValue {
        key: key.to_owned(),
        message: err.to_string(),
    })?;
    meta.insert(key.to_owned(), value);
    Ok(default)
}
