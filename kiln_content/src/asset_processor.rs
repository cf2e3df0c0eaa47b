use std::{collections::BTreeMap, path::Path, sync::Arc};

use kiln_shared::log::{info, trace};

use crate::{
    asset_type::{classify, AssetType},
    common::copy_file,
    config::Config,
    material::MaterialConverter,
    meta::{self, Metadata, IDENTITY_KEY},
    package::PackageConverter,
    shader::ShaderConverter,
    skybox::SkyboxConverter,
    texture::TextureConverter,
    tool::ToolRunner,
    Error, Result,
};

/// Everything a [`Converter`] needs besides the asset itself.
pub struct ConvertContext<'a> {
    pub config: &'a Config,
    pub runner: &'a dyn ToolRunner,
}

/// Converts one type of asset.
pub trait Converter: Send + Sync {
    /// Checks that everything the conversion of `src` needs is configured. It is called before
    /// the destination is modified.
    fn check_configuration(&self, _config: &Config, _src: &Path) -> Result<()> {
        Ok(())
    }

    /// Converts `src` into `dst` and returns the updated metadata.
    ///
    /// Settings that are present in `meta` have to be respected. Settings that are absent have
    /// to be filled with their defaults so that they are persisted.
    fn convert(&self, context: &ConvertContext, src: &Path, dst: &Path, meta: Metadata) -> Result<Metadata>;
}

/// Converter for assets that are only copied. They still get an identity.
pub struct PassthroughConverter;

impl Converter for PassthroughConverter {
    fn convert(&self, _context: &ConvertContext, _src: &Path, _dst: &Path, meta: Metadata) -> Result<Metadata> {
        Ok(meta)
    }
}

/// Result of [`AssetProcessor::process`].
#[derive(Debug, Clone, PartialEq)]
pub enum ProcessOutcome {
    /// The asset type is unknown. The file was copied and no metadata was written.
    Skipped,
    /// The asset was converted and its metadata was persisted.
    Converted { asset_type: AssetType, metadata: Metadata },
}

/// Processes single assets by dispatching them to the [`Converter`] registered for their [`AssetType`].
pub struct AssetProcessor {
    config: Config,
    runner: Arc<dyn ToolRunner>,
    converters: BTreeMap<AssetType, Box<dyn Converter>>,
}

impl AssetProcessor {
    /// Creates an [`AssetProcessor`] without any converters.
    pub fn new(config: Config, runner: Arc<dyn ToolRunner>) -> Self {
        info!("Creating AssetProcessor with data root '{}'", config.data_root.display());
        Self {
            config,
            runner,
            converters: BTreeMap::new(),
        }
    }

    /// Creates an [`AssetProcessor`] with a converter for every known [`AssetType`].
    pub fn with_default_converters(config: Config, runner: Arc<dyn ToolRunner>) -> Self {
        Self::new(config, runner)
            .register(AssetType::Texture, Box::new(TextureConverter))
            .register(AssetType::VertexShader, Box::new(ShaderConverter))
            .register(AssetType::FragmentShader, Box::new(ShaderConverter))
            .register(AssetType::Material, Box::new(MaterialConverter))
            .register(AssetType::Skybox, Box::new(SkyboxConverter))
            .register(AssetType::Package, Box::new(PackageConverter))
            .register(AssetType::Mesh, Box::new(PassthroughConverter))
            .register(AssetType::Font, Box::new(PassthroughConverter))
            .register(AssetType::Scene, Box::new(PassthroughConverter))
    }

    /// Registers a [`Converter`] for the given [`AssetType`].
    ///
    /// # Panics
    ///
    /// * If a converter is already registered for `asset_type`.
    /// * If `asset_type` is [`AssetType::Unknown`].
    pub fn register(mut self, asset_type: AssetType, converter: Box<dyn Converter>) -> Self {
        assert_ne!(asset_type, AssetType::Unknown, "unknown assets cannot have a converter");
        if self.converters.contains_key(&asset_type) {
            panic!("converter for asset type '{asset_type}' already registered");
        }
        self.converters.insert(asset_type, converter);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn converter(&self, asset_type: AssetType) -> Result<&dyn Converter> {
        self.converters
            .get(&asset_type)
            .map(Box::as_ref)
            .ok_or(Error::ConverterNotRegistered(asset_type))
    }

    /// Runs the converter for `asset_type`. Unknown assets are returned unchanged.
    pub fn dispatch(&self, asset_type: AssetType, src: &Path, dst: &Path, meta: Metadata) -> Result<Metadata> {
        if asset_type == AssetType::Unknown {
            return Ok(meta);
        }
        let converter = self.converter(asset_type)?;
        let context = ConvertContext {
            config: &self.config,
            runner: self.runner.as_ref(),
        };
        converter.convert(&context, src, dst, meta)
    }

    /// Processes the asset `src` into `dst` and writes the metadata to `<dst>.meta`.
    ///
    /// Metadata next to `src` overrides the metadata that was persisted next to `dst`, except
    /// for the identity of the asset. Nothing is persisted when the conversion fails.
    pub fn process(&self, src: impl AsRef<Path>, dst: impl AsRef<Path>) -> Result<ProcessOutcome> {
        let (src, dst) = (src.as_ref(), dst.as_ref());
        let asset_type = classify(dst);
        trace!("Classified '{}' as {asset_type}", dst.display());

        if asset_type == AssetType::Unknown {
            info!("Copying asset of unknown type: {}", src.display());
            copy_file(src, dst)?;
            return Ok(ProcessOutcome::Skipped);
        }

        let converter = self.converter(asset_type)?;
        converter.check_configuration(&self.config, src)?;

        let dst_meta = meta::load(dst)?;
        let src_meta = meta::load(src)?;
        let merged = merge_sidecars(&dst_meta, &src_meta);

        if meta::copy_enabled(&merged) {
            copy_file(src, dst)?;
        } else {
            trace!("Copying disabled by metadata of '{}'", src.display());
        }

        info!("Processing {asset_type} asset: {}", src.display());
        let converted = self.dispatch(asset_type, src, dst, merged)?;
        let metadata = meta::ensure_identity(converted);
        meta::persist(dst, &metadata)?;
        info!("Successfully processed asset: {}", dst.display());

        Ok(ProcessOutcome::Converted { asset_type, metadata })
    }
}

/// Merges the sidecars with the source winning. An identity that was already persisted is kept.
fn merge_sidecars(dst_meta: &Metadata, src_meta: &Metadata) -> Metadata {
    let mut merged = meta::merge(dst_meta, src_meta);
    if let Some(identity) = dst_meta.get(IDENTITY_KEY) {
        merged.insert(IDENTITY_KEY.to_owned(), identity.clone());
    }
    merged
}
