use std::{
    env,
    ffi::OsString,
    fs,
    path::{Path, PathBuf},
};

use kiln_shared::{log::info, serde_yaml};
use serde::{Deserialize, Serialize};

use crate::{tool::Tool, Error, Result};

/// File name of the schema that skybox descriptors are validated against.
pub const SKYBOX_SCHEMA_FILE_NAME: &str = "skybox_validator.json";

/// File name of the schema that package descriptors are validated against.
pub const PACKAGE_SCHEMA_FILE_NAME: &str = "pkg_validator.json";

/// Paths to the external executables. Tools that are not configured are `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolPaths {
    pub glslang_validator: Option<PathBuf>,
    pub toktx: Option<PathBuf>,
    pub basisu: Option<PathBuf>,
    pub validate_json: Option<PathBuf>,
    pub image_format: Option<PathBuf>,
}

impl ToolPaths {
    /// Returns the configured path of the given tool.
    pub fn get(&self, tool: Tool) -> Option<&Path> {
        self.slot(tool).as_deref()
    }

    /// Sets the path of the given tool.
    pub fn with(mut self, tool: Tool, path: impl Into<PathBuf>) -> Self {
        *self.slot_mut(tool) = Some(path.into());
        self
    }

    fn slot(&self, tool: Tool) -> &Option<PathBuf> {
        match tool {
            Tool::GlslangValidator => &self.glslang_validator,
            Tool::Toktx => &self.toktx,
            Tool::Basisu => &self.basisu,
            Tool::ValidateJson => &self.validate_json,
            Tool::ImageFormat => &self.image_format,
        }
    }

    fn slot_mut(&mut self, tool: Tool) -> &mut Option<PathBuf> {
        match tool {
            Tool::GlslangValidator => &mut self.glslang_validator,
            Tool::Toktx => &mut self.toktx,
            Tool::Basisu => &mut self.basisu,
            Tool::ValidateJson => &mut self.validate_json,
            Tool::ImageFormat => &mut self.image_format,
        }
    }
}

/// Configuration of the pipeline. It is created once at startup and passed to every component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Root of the build output. Relative asset references are resolved against it.
    pub data_root: PathBuf,
    /// Directory that contains the JSON schemas for the descriptors.
    #[serde(default)]
    pub schema_dir: Option<PathBuf>,
    #[serde(default)]
    pub tools: ToolPaths,
}

impl Config {
    /// Creates a [`Config`] without any tools.
    pub fn new(data_root: impl Into<PathBuf>) -> Self {
        Self {
            data_root: data_root.into(),
            schema_dir: None,
            tools: ToolPaths::default(),
        }
    }

    pub fn with_schema_dir(mut self, schema_dir: impl Into<PathBuf>) -> Self {
        self.schema_dir = Some(schema_dir.into());
        self
    }

    pub fn with_tool(mut self, tool: Tool, path: impl Into<PathBuf>) -> Self {
        self.tools = self.tools.with(tool, path);
        self
    }

    /// Reads the configuration from a YAML file. Relative paths in the file are relative to the file's directory.
    ///
    /// ```yaml
    /// data_root: build/data
    /// schema_dir: validator
    /// tools:
    ///   toktx: /usr/local/bin/toktx
    ///   validate_json: build/tools/validate_json
    /// ```
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("Reading configuration from '{}'", path.display());
        let content = fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content).map_err(|err| Error::InvalidConfig {
            path: path.to_owned(),
            message: err.to_string(),
        })?;
        let base = path.parent().unwrap_or(Path::new(""));
        Ok(config.relative_to(base))
    }

    /// Reads the configuration from the environment of the process. Tools that are not set
    /// explicitly are searched for in the `PATH`.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var_os(key), |tool| which::which(tool.executable_name()).ok())
    }

    /// Builds the configuration from the variables that `lookup` returns. `search` is asked for
    /// every tool that isn't configured by a variable.
    ///
    /// | Variable            | Meaning                                             |
    /// |---------------------|-----------------------------------------------------|
    /// | `BINARY_FOLDER`     | Build folder, the data root is its `data` directory |
    /// | `SCHEMA_DIR`        | Directory of the descriptor schemas                 |
    /// | `VULKAN_SDK`        | Vulkan SDK that contains `glslangValidator`         |
    /// | `TOKTX_EXE`         | Path to `toktx`                                     |
    /// | `BASISU_EXE`        | Path to `basisu`                                    |
    /// | `VALIDATE_JSON_EXE` | Path to `validate_json`                             |
    /// | `IMAGE_FORMAT_EXE`  | Path to `image_format`                              |
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<OsString>, search: impl Fn(Tool) -> Option<PathBuf>) -> Self {
        let path = |key: &str| lookup(key).filter(|value| !value.is_empty()).map(PathBuf::from);

        let data_root = path("BINARY_FOLDER")
            .map(|binary_folder| binary_folder.join("data"))
            .unwrap_or_else(|| PathBuf::from("."));

        let glslang_validator = path("VULKAN_SDK").map(|sdk| {
            let name = format!("{}{}", Tool::GlslangValidator.executable_name(), env::consts::EXE_SUFFIX);
            sdk.join("Bin").join(name)
        });

        let tools = ToolPaths {
            glslang_validator,
            toktx: path("TOKTX_EXE"),
            basisu: path("BASISU_EXE"),
            validate_json: path("VALIDATE_JSON_EXE"),
            image_format: path("IMAGE_FORMAT_EXE"),
        };
        let tools = Tool::ALL.into_iter().fold(tools, |tools, tool| {
            if tools.get(tool).is_some() {
                return tools;
            }
            match search(tool) {
                Some(found) => tools.with(tool, found),
                None => tools,
            }
        });

        Self {
            data_root,
            schema_dir: path("SCHEMA_DIR"),
            tools,
        }
    }

    /// Returns the path of the given tool or fails if it is not configured.
    pub fn tool_path(&self, tool: Tool) -> Result<&Path> {
        self.tools
            .get(tool)
            .ok_or_else(|| Error::MissingConfiguration(format!("path to {tool}")))
    }

    /// Returns the path of the schema with the given file name or fails if no schema directory is configured.
    pub fn schema_path(&self, file_name: &str) -> Result<PathBuf> {
        self.schema_dir
            .as_ref()
            .map(|schema_dir| schema_dir.join(file_name))
            .ok_or_else(|| Error::MissingConfiguration("schema directory".to_owned()))
    }

    fn relative_to(self, base: &Path) -> Self {
        let resolve = |path: PathBuf| if path.is_relative() { base.join(path) } else { path };
        let tools = Tool::ALL.into_iter().fold(ToolPaths::default(), |tools, tool| match self.tools.get(tool) {
            // Bare executable names are looked up in the PATH by the operating system.
            Some(path) if path.components().count() > 1 => tools.with(tool, resolve(path.to_owned())),
            Some(path) => tools.with(tool, path),
            None => tools,
        });
        Self {
            data_root: resolve(self.data_root),
            schema_dir: self.schema_dir.map(resolve),
            tools,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use tempdir::TempDir;

    use super::*;

    #[test]
    fn from_file() {
        // Given
        let root = TempDir::new("root").unwrap();
        let config_path = root.path().join("kiln.yaml");
        let content = kiln_shared::indoc::indoc! {"
            data_root: build/data
            schema_dir: /opt/schemas
            tools:
              toktx: toktx
              validate_json: build/tools/validate_json
        "};
        fs::write(&config_path, content).unwrap();

        // When
        let config = Config::from_file(&config_path).unwrap();

        // Then
        assert_eq!(config.data_root, root.path().join("build/data"));
        assert_eq!(config.schema_dir, Some(PathBuf::from("/opt/schemas")));
        assert_eq!(config.tools.get(Tool::Toktx), Some(Path::new("toktx")));
        assert_eq!(
            config.tools.get(Tool::ValidateJson),
            Some(root.path().join("build/tools/validate_json").as_path())
        );
        assert_eq!(config.tools.get(Tool::Basisu), None);
    }

    #[test]
    fn from_file_invalid() {
        let root = TempDir::new("root").unwrap();
        let config_path = root.path().join("kiln.yaml");
        fs::write(&config_path, "tools: [1, 2]").unwrap();
        assert!(matches!(Config::from_file(&config_path), Err(Error::InvalidConfig { .. })));
    }

    #[test]
    fn from_lookup() {
        // Given
        let variables = HashMap::from([
            ("BINARY_FOLDER", "/build"),
            ("TOKTX_EXE", "/sdk/toktx"),
            ("VULKAN_SDK", "/vulkan"),
            ("BASISU_EXE", ""),
        ]);

        // When
        let config = Config::from_lookup(
            |key| variables.get(key).map(OsString::from),
            |tool| (tool == Tool::Basisu).then(|| PathBuf::from("/usr/bin/basisu")),
        );

        // Then
        assert_eq!(config.data_root, PathBuf::from("/build/data"));
        assert_eq!(config.tools.get(Tool::Toktx), Some(Path::new("/sdk/toktx")));
        assert!(config.tools.get(Tool::GlslangValidator).unwrap().starts_with("/vulkan/Bin"));
        assert_eq!(config.tools.get(Tool::Basisu), Some(Path::new("/usr/bin/basisu")));
        assert_eq!(config.tools.get(Tool::ValidateJson), None);
        assert_eq!(config.schema_dir, None);
    }

    #[test]
    fn missing_tool() {
        let config = Config::new("data");
        assert!(matches!(config.tool_path(Tool::Toktx), Err(Error::MissingConfiguration(_))));
        assert!(matches!(config.schema_path(SKYBOX_SCHEMA_FILE_NAME), Err(Error::MissingConfiguration(_))));

        let config = config.with_tool(Tool::Toktx, "toktx").with_schema_dir("schemas");
        assert_eq!(config.tool_path(Tool::Toktx).unwrap(), Path::new("toktx"));
        assert_eq!(
            config.schema_path(SKYBOX_SCHEMA_FILE_NAME).unwrap(),
            Path::new("schemas").join(SKYBOX_SCHEMA_FILE_NAME)
        );
    }
}
