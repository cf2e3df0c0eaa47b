use std::{
    io,
    path::{Path, PathBuf},
    process::ExitCode,
    sync::Arc,
};

use clap::{error::ErrorKind, Parser, Subcommand};
use color_eyre as ey;
use ey::eyre::{eyre, Context};
use kiln_content::{classify, material, tool::ProcessRunner, AssetProcessor, Config, ProcessOutcome, TreeWalker};
use kiln_shared::log::{self, error, info};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct CommandLineArguments {
    /// Log everything including the trace messages
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Processes a single asset
    Convert {
        /// Source file
        source: PathBuf,

        /// Destination file
        destination: PathBuf,

        /// YAML configuration file. The environment is used when it's omitted.
        config: Option<PathBuf>,
    },
    /// Processes all assets of a directory
    Build {
        /// Source directory
        source_dir: PathBuf,

        /// Destination directory. It is the data root unless the configuration file says otherwise.
        destination_dir: PathBuf,

        /// YAML configuration file. The environment is used when it's omitted.
        config: Option<PathBuf>,

        /// Continue with the next asset when an asset fails
        #[arg(long)]
        isolate: bool,
    },
    /// Writes a `.mat` file for every material of a `.mtl` file
    Materials {
        /// Wavefront material file
        mtl: PathBuf,

        /// Folder into which the materials are written
        out_dir: PathBuf,

        /// YAML configuration file. The environment is used when it's omitted.
        config: Option<PathBuf>,
    },
    /// Prints the asset type of the given paths
    Classify {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
}

fn setup_logger(verbose: bool) -> ey::Result<()> {
    let level = if verbose {
        log::LevelFilter::Trace
    } else {
        log::LevelFilter::Info
    };
    fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "{}[{}][{}] {}",
                kiln_shared::chrono::Local::now().format("[%Y-%m-%d][%H:%M:%S]"),
                record.target(),
                record.level(),
                message
            ))
        })
        .level(level)
        .chain(io::stderr())
        .apply()
        .map_err(|err| io::Error::new(io::ErrorKind::Other, err))?;
    Ok(())
}

fn load_config(config_path: Option<&Path>) -> ey::Result<Config> {
    match config_path {
        Some(config_path) => Config::from_file(config_path).wrap_err("Failed to read the configuration"),
        None => Ok(Config::from_env()),
    }
}

fn processor(config: Config) -> AssetProcessor {
    let runner = Arc::new(ProcessRunner::new(&config.tools));
    AssetProcessor::with_default_converters(config, runner)
}

fn run(command: Command) -> ey::Result<()> {
    match command {
        Command::Convert {
            source,
            destination,
            config,
        } => {
            let processor = processor(load_config(config.as_deref())?);
            let outcome = processor
                .process(&source, &destination)
                .wrap_err_with(|| format!("Failed to process '{}'", source.display()))?;
            match outcome {
                ProcessOutcome::Skipped => info!("Copied '{}' without conversion", source.display()),
                ProcessOutcome::Converted { asset_type, .. } => info!("Converted {asset_type} '{}'", source.display()),
            }
        }
        Command::Build {
            source_dir,
            destination_dir,
            config,
            isolate,
        } => {
            let config = match config {
                Some(config_path) => load_config(Some(&config_path))?,
                None => Config {
                    data_root: destination_dir.clone(),
                    ..Config::from_env()
                },
            };
            let walker = TreeWalker::new(processor(config)).isolate_failures(isolate);
            let report = walker
                .run(&source_dir, &destination_dir)
                .wrap_err_with(|| format!("Failed to build '{}'", source_dir.display()))?;
            for (path, message) in &report.failures {
                error!("{}: {message}", path.display());
            }
            if report.failed() > 0 {
                return Err(eyre!("{} of the assets failed", report.failed()));
            }
        }
        Command::Materials { mtl, out_dir, config } => {
            let config = load_config(config.as_deref())?;
            let paths = material::generate_materials(&mtl, &out_dir, &config)
                .wrap_err_with(|| format!("Failed to generate materials from '{}'", mtl.display()))?;
            for path in paths {
                println!("{}", path.display());
            }
        }
        Command::Classify { paths } => {
            for path in paths {
                println!("{}: {}", path.display(), classify(&path));
            }
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    let command_line_arguments = match CommandLineArguments::try_parse() {
        Ok(command_line_arguments) => command_line_arguments,
        Err(err) => {
            let _ = err.print();
            return match err.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => ExitCode::SUCCESS,
                _ => ExitCode::FAILURE,
            };
        }
    };

    let result = color_eyre::install().and_then(|_| setup_logger(command_line_arguments.verbose));
    let result = result.and_then(|_| run(command_line_arguments.command));
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{err:?}");
            ExitCode::FAILURE
        }
    }
}
