//! # Overview
//!
//! Crate for [processing](AssetProcessor) the assets of a game.
//!
//! This crate is based around the idea of two structurally mirrored directory
//! trees. One is the source directory, which contains the original assets
//! and the other is the data directory, which contains the processed assets.
//! Every file in the source directory is copied to the same relative location
//! in the data directory. Next to every processed asset, there is a `.meta`
//! file which contains the identity of the asset as well as the settings that
//! were used to convert it.
//!
//! ## Example:
//!
//! **Source Directory:**
//!
//! ```text
//! assets/
//! ├─ textures/
//! │  ├─ albedo.png
//! │  ├─ albedo.png.meta    (optional overrides)
//! ├─ shaders/
//! │  ├─ shield.vert
//! ├─ readme.txt
//! ```
//!
//! **Data Directory:**
//!
//! ```text
//! data/
//! ├─ textures/
//! │  ├─ albedo.png
//! │  ├─ albedo.png.meta
//! │  ├─ albedo.png.basis
//! │  ├─ albedo.png.ktx
//! ├─ shaders/
//! │  ├─ shield.vert
//! │  ├─ shield.vert.meta
//! ├─ readme.txt            (unknown type, copied without metadata)
//! ```
//!
//! # Components
//!
//! * [`classify`] determines the [`AssetType`] of a file by its extension.
//! * The [`meta`] module loads, merges and persists the sidecar metadata.
//! * The [`AssetProcessor`] dispatches an asset to the [`Converter`] that is registered for its type.
//! * The [`TreeWalker`] runs the [`AssetProcessor`] for a whole directory tree.
//!
//! The converters call external tools like `toktx` through a [`ToolRunner`](tool::ToolRunner).
//! Their paths are part of the [`Config`] that is passed to the [`AssetProcessor`].

mod asset_processor;
mod asset_type;
mod common;
mod tree_walker;

pub mod config;
pub mod material;
pub mod meta;
pub mod package;
pub mod shader;
pub mod skybox;
pub mod texture;
pub mod tool;

pub use asset_processor::*;
pub use asset_type::*;
pub use common::{append_extension, meta_path, relative_to_root, Error, Result, META_FILE_EXTENSION};
pub use config::Config;
pub use tree_walker::*;
