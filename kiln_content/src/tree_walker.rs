use std::path::{Path, PathBuf};

use kiln_shared::{
    has_extension,
    log::{error, info, warn},
    pathdiff,
    walkdir::WalkDir,
};

use crate::{
    asset_processor::{AssetProcessor, ProcessOutcome},
    asset_type::{classify, AssetType},
    common::META_FILE_EXTENSION,
    Result,
};

/// Summary of a [`TreeWalker::run`].
#[derive(Debug, Default)]
pub struct WalkReport {
    /// Number of assets that were converted and got metadata.
    pub converted: usize,
    /// Number of assets of unknown type that were only copied.
    pub copied: usize,
    /// Assets that failed together with the error message. Only filled when failures are isolated.
    pub failures: Vec<(PathBuf, String)>,
}

impl WalkReport {
    pub fn failed(&self) -> usize {
        self.failures.len()
    }
}

/// Mirrors a source directory into a destination directory and processes every file on the way.
pub struct TreeWalker {
    processor: AssetProcessor,
    isolate_failures: bool,
}

impl TreeWalker {
    pub fn new(processor: AssetProcessor) -> Self {
        Self {
            processor,
            isolate_failures: false,
        }
    }

    /// When enabled, a failing asset is logged and the walk continues. Otherwise the first failure aborts the walk.
    pub fn isolate_failures(mut self, isolate_failures: bool) -> Self {
        self.isolate_failures = isolate_failures;
        self
    }

    pub fn processor(&self) -> &AssetProcessor {
        &self.processor
    }

    /// Processes every file below `src_root` into the same relative path below `dst_root`.
    ///
    /// Materials, skyboxes and packages read the output of other assets, so they are processed in a
    /// second pass after everything else. Within a pass, files are processed in the order of their names.
    pub fn run(&self, src_root: impl AsRef<Path>, dst_root: impl AsRef<Path>) -> Result<WalkReport> {
        let (src_root, dst_root) = (src_root.as_ref(), dst_root.as_ref());
        info!("Walking '{}' into '{}'", src_root.display(), dst_root.display());

        let (dependents, independents): (Vec<_>, Vec<_>) = collect_files(src_root, dst_root)
            .into_iter()
            .partition(|(path, _)| depends_on_other_assets(classify(path)));

        let mut report = WalkReport::default();
        for (path, relative_path) in independents.into_iter().chain(dependents) {
            let dst = dst_root.join(&relative_path);
            match self.processor.process(&path, &dst) {
                Ok(ProcessOutcome::Converted { .. }) => report.converted += 1,
                Ok(ProcessOutcome::Skipped) => report.copied += 1,
                Err(err) if self.isolate_failures => {
                    error!("Failed to process file '{}': {err}", path.display());
                    report.failures.push((relative_path, err.to_string()));
                }
                Err(err) => {
                    error!("Failed to process file '{}': {err}", path.display());
                    return Err(err);
                }
            }
        }

        info!(
            "Walk finished: {} converted, {} copied, {} failed",
            report.converted,
            report.copied,
            report.failed()
        );
        Ok(report)
    }
}

/// Assets whose converters read the converted output of other assets below the data root.
fn depends_on_other_assets(asset_type: AssetType) -> bool {
    matches!(asset_type, AssetType::Material | AssetType::Skybox | AssetType::Package)
}

/// Returns the absolute and the relative path of every file below `src_root` that isn't a sidecar.
fn collect_files(src_root: &Path, dst_root: &Path) -> Vec<(PathBuf, PathBuf)> {
    // A destination inside of the source must not be walked.
    let nested_dst_root = dst_root != src_root && dst_root.starts_with(src_root);

    let entries = WalkDir::new(src_root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| !(nested_dst_root && entry.path().starts_with(dst_root)));

    let mut files = Vec::new();
    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                warn!("Failed to read directory entry in '{}': {err}", src_root.display());
                continue;
            }
        };

        if entry.file_type().is_dir() {
            continue;
        }
        if has_extension(entry.path(), META_FILE_EXTENSION) {
            continue;
        }

        let Some(relative_path) = pathdiff::diff_paths(entry.path(), src_root) else {
            warn!("Failed to get relative path of '{}' relative to '{}'", entry.path().display(), src_root.display());
            continue;
        };
        files.push((entry.into_path(), relative_path));
    }
    files
}

#[cfg(test)]
mod tests {
    use std::{fs, sync::Arc};

    use kiln_shared::serde_json::{self, json, Value};
    use kiln_test::setup_logger;
    use tempdir::TempDir;

    use super::*;
    use crate::{
        common::meta_path,
        config::Config,
        meta,
        tool::{testing::RecordingRunner, Tool},
        Error,
    };

    struct Fixture {
        root: TempDir,
    }

    impl Fixture {
        fn new(files: &[(&str, &str)]) -> Self {
            setup_logger();
            let root = TempDir::new("root").unwrap();
            for (file, content) in files {
                let path = root.path().join("src").join(file);
                fs::create_dir_all(path.parent().unwrap()).unwrap();
                fs::write(path, content).unwrap();
            }
            Self { root }
        }

        fn src_root(&self) -> PathBuf {
            self.root.path().join("src")
        }

        fn dst_root(&self) -> PathBuf {
            self.root.path().join("data")
        }

        fn walker(&self, runner: RecordingRunner) -> TreeWalker {
            let config = Config::new(self.dst_root())
                .with_tool(Tool::GlslangValidator, "glslangValidator")
                .with_tool(Tool::ValidateJson, "validate_json")
                .with_schema_dir(self.root.path().join("schemas"));
            TreeWalker::new(AssetProcessor::with_default_converters(config, Arc::new(runner)))
        }
    }

    #[test]
    fn mirrors_tree() {
        // Given
        let fixture = Fixture::new(&[
            ("readme.txt", "Hello World!"),
            ("fonts/regular.ttf", "font"),
            ("shaders/shield.vert", "uniform mat4 model;"),
            ("shaders/shield.vert.meta", r#"{"uuid": "shield"}"#),
        ]);

        // When
        let report = fixture.walker(RecordingRunner::new()).run(fixture.src_root(), fixture.dst_root()).unwrap();

        // Then
        assert_eq!(report.converted, 2);
        assert_eq!(report.copied, 1);
        assert_eq!(report.failed(), 0);
        let dst_root = fixture.dst_root();
        assert!(dst_root.join("readme.txt").is_file());
        assert!(!meta_path(dst_root.join("readme.txt")).exists());
        assert!(meta_path(dst_root.join("fonts/regular.ttf")).is_file());
        assert_eq!(meta::identity(&meta::load(dst_root.join("shaders/shield.vert")).unwrap()), Some("shield"));
        // Sidecars of the source are merged, not mirrored as separate assets.
        assert!(!meta_path(dst_root.join("shaders/shield.vert.meta")).exists());
    }

    #[test]
    fn first_failure_aborts() {
        // Given
        let fixture = Fixture::new(&[("a.vert", "void main() {"), ("b.ttf", "font")]);
        let runner = RecordingRunner::new().with_failure(Tool::GlslangValidator, 1);

        // When
        let result = fixture.walker(runner).run(fixture.src_root(), fixture.dst_root());

        // Then
        assert!(matches!(result, Err(Error::ToolFailed { .. })));
        assert!(!fixture.dst_root().join("b.ttf").exists());
    }

    #[test]
    fn isolated_failures_are_collected() {
        // Given
        let fixture = Fixture::new(&[("a.vert", "void main() {"), ("b.ttf", "font")]);
        let runner = RecordingRunner::new().with_failure(Tool::GlslangValidator, 1);

        // When
        let report = fixture
            .walker(runner)
            .isolate_failures(true)
            .run(fixture.src_root(), fixture.dst_root())
            .unwrap();

        // Then
        assert_eq!(report.converted, 1);
        assert_eq!(report.failed(), 1);
        assert_eq!(report.failures[0].0, PathBuf::from("a.vert"));
        assert!(!meta_path(fixture.dst_root().join("a.vert")).exists());
        assert!(meta_path(fixture.dst_root().join("b.ttf")).exists());
    }

    #[test]
    fn nested_destination_is_not_walked() {
        let fixture = Fixture::new(&[("a.ttf", "font")]);
        let dst_root = fixture.src_root().join("out");
        let walker = fixture.walker(RecordingRunner::new());

        walker.run(fixture.src_root(), &dst_root).unwrap();
        let report = walker.run(fixture.src_root(), &dst_root).unwrap();

        assert_eq!(report.converted, 1);
        assert!(!dst_root.join("out").exists());
    }

    #[test]
    fn package_sees_files_that_sort_after_it() {
        // Given
        let fixture = Fixture::new(&[
            ("core.pkg_json", r#"{"name": "core", "files": ["textures/a.txt"]}"#),
            ("textures/a.txt", "a"),
        ]);

        // When
        let report = fixture.walker(RecordingRunner::new()).run(fixture.src_root(), fixture.dst_root()).unwrap();

        // Then
        assert_eq!(report.failed(), 0);
        let dst_root = fixture.dst_root();
        assert!(dst_root.join("core.pkg").is_file());
        let package_meta = meta::load(dst_root.join("core.pkg_json")).unwrap();
        assert_eq!(package_meta["package_files"], json!(["textures/a.txt"]));
    }

    #[test]
    fn material_sees_texture_that_sorts_after_it() {
        // Given
        let fixture = Fixture::new(&[
            ("materials/pbr.mat", r#"{"albedo_map_path": "textures/albedo.dds"}"#),
            ("textures/albedo.dds", "dds"),
        ]);

        // When
        fixture.walker(RecordingRunner::new()).run(fixture.src_root(), fixture.dst_root()).unwrap();

        // Then
        let dst_root = fixture.dst_root();
        let texture_meta = meta::load(dst_root.join("textures/albedo.dds")).unwrap();
        let texture_id = meta::identity(&texture_meta).unwrap().to_owned();
        assert!(!texture_id.is_empty());
        let material: Value = serde_json::from_str(&fs::read_to_string(dst_root.join("materials/pbr.mat")).unwrap()).unwrap();
        assert_eq!(material["albedo_map_id"], json!(texture_id));
    }
}
