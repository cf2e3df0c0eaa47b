use std::{
    ffi::OsString,
    fmt,
    path::{Path, PathBuf},
    process::Command,
};

use kiln_shared::log::{info, trace};

use crate::{config::ToolPaths, Error, Result};

/// External executables that the converters invoke.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Tool {
    GlslangValidator,
    Toktx,
    Basisu,
    ValidateJson,
    ImageFormat,
}

impl Tool {
    pub const ALL: [Tool; 5] = [
        Tool::GlslangValidator,
        Tool::Toktx,
        Tool::Basisu,
        Tool::ValidateJson,
        Tool::ImageFormat,
    ];

    /// Name of the executable without platform specific extension.
    pub fn executable_name(&self) -> &'static str {
        match self {
            Tool::GlslangValidator => "glslangValidator",
            Tool::Toktx => "toktx",
            Tool::Basisu => "basisu",
            Tool::ValidateJson => "validate_json",
            Tool::ImageFormat => "image_format",
        }
    }
}

impl fmt::Display for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.executable_name())
    }
}

/// Captured output of a successful tool invocation.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ToolOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Runs external tools. A non-zero exit code must be reported as [`Error::ToolFailed`].
pub trait ToolRunner: Send + Sync {
    fn run(&self, tool: Tool, args: &[OsString]) -> Result<ToolOutput>;
}

/// [`ToolRunner`] that starts the executables configured in [`ToolPaths`] as child processes.
pub struct ProcessRunner {
    tools: ToolPaths,
}

impl ProcessRunner {
    pub fn new(tools: &ToolPaths) -> Self {
        Self { tools: tools.clone() }
    }

    fn executable(&self, tool: Tool) -> Result<PathBuf> {
        self.tools
            .get(tool)
            .map(Path::to_path_buf)
            .ok_or_else(|| Error::MissingConfiguration(format!("path to {tool}")))
    }
}

impl ToolRunner for ProcessRunner {
    fn run(&self, tool: Tool, args: &[OsString]) -> Result<ToolOutput> {
        let executable = self.executable(tool)?;
        info!(
            "Running {} {}",
            executable.display(),
            args.iter().map(|arg| arg.to_string_lossy()).collect::<Vec<_>>().join(" ")
        );

        let output = Command::new(&executable).args(args).output().map_err(|err| Error::ToolLaunch {
            tool,
            message: format!("could not execute '{}': {err}", executable.display()),
        })?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        if output.status.success() {
            trace!("{tool} finished successfully");
            Ok(ToolOutput { stdout, stderr })
        } else {
            Err(Error::ToolFailed {
                tool,
                code: output.status.code(),
                stdout,
                stderr,
            })
        }
    }
}
