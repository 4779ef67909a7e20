//! kmz2shp command-line interface
//!
//! Converts a KML or KMZ file into one ESRI Shapefile per geometry kind.

use std::fs;
use std::path::{Path, PathBuf};
use std::process;

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use kmz2shp_core::{convert_path, ConvertOptions, WrittenTable};
use log::{debug, warn};
use serde::{Deserialize, Serialize};

/// Configuration file name, looked up in the home and current directories
const CONFIG_FILE_NAME: &str = ".kmz2shp.toml";

/// Verbosity level for output control
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Verbosity {
    /// Suppress all output except errors
    Quiet,
    /// Normal output (default)
    Normal,
    /// Verbose output with extra details
    Verbose,
}

impl Verbosity {
    /// Create from CLI flags
    const fn from_flags(quiet: bool, verbose: bool) -> Self {
        if quiet {
            Self::Quiet
        } else if verbose {
            Self::Verbose
        } else {
            Self::Normal
        }
    }

    /// Check if output should be shown (not quiet)
    const fn should_show_output(self) -> bool {
        !matches!(self, Self::Quiet)
    }

    /// Default log filter, overridden by `RUST_LOG`
    const fn log_filter(self) -> &'static str {
        match self {
            Self::Quiet => "error",
            Self::Normal => "warn",
            Self::Verbose => "info",
        }
    }
}

/// Configuration file contents
///
/// Precedence order (highest to lowest):
/// 1. Command-line arguments
/// 2. Explicit config (--config)
/// 3. Project config (./.kmz2shp.toml)
/// 4. User config (~/.kmz2shp.toml)
/// 5. Built-in defaults
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
struct Config {
    /// Default settings for conversion
    #[serde(skip_serializing_if = "Option::is_none")]
    convert: Option<ConvertConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
struct ConvertConfig {
    /// Keep placemarks without geometry in a `_nogeom.dbf` table
    #[serde(skip_serializing_if = "Option::is_none")]
    include_null_geometry: Option<bool>,

    /// Directory for output when no output base is given
    #[serde(skip_serializing_if = "Option::is_none")]
    output_dir: Option<PathBuf>,
}

impl ConvertConfig {
    /// Values set in `other` replace those in `self`
    fn overlay(self, other: Self) -> Self {
        Self {
            include_null_geometry: other.include_null_geometry.or(self.include_null_geometry),
            output_dir: other.output_dir.or(self.output_dir),
        }
    }
}

impl Config {
    /// Load configuration from file
    fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Load a discovered config, warning instead of failing
    fn load_optional(path: &Path) -> Option<Self> {
        if !path.exists() {
            return None;
        }
        match Self::load_from_file(path) {
            Ok(config) => {
                debug!("Loaded config from {}", path.display());
                Some(config)
            }
            Err(e) => {
                warn!("Ignoring config {}: {e:#}", path.display());
                None
            }
        }
    }

    /// Load user config from ~/.kmz2shp.toml
    fn load_user_config() -> Option<Self> {
        let home_dir = dirs::home_dir()?;
        Self::load_optional(&home_dir.join(CONFIG_FILE_NAME))
    }

    /// Load project config from ./.kmz2shp.toml
    fn load_project_config() -> Option<Self> {
        Self::load_optional(Path::new(CONFIG_FILE_NAME))
    }

    /// Merge configs given lowest precedence first
    fn merge<I: IntoIterator<Item = Option<Self>>>(layers: I) -> Self {
        let convert = layers
            .into_iter()
            .flatten()
            .filter_map(|config| config.convert)
            .reduce(ConvertConfig::overlay);
        Self { convert }
    }

    fn convert_settings(&self) -> ConvertConfig {
        self.convert.clone().unwrap_or_default()
    }
}

#[derive(Parser, Debug)]
#[command(
    name = "kmz2shp",
    about = "Convert KML/KMZ files to ESRI Shapefiles",
    long_about = "Convert KML/KMZ files to ESRI Shapefiles.\n\
                  \n\
                  Writes one table per geometry kind: <base>_point.shp, <base>_line.shp\n\
                  and <base>_polygon.shp. Attributes come from description tables and\n\
                  ExtendedData.",
    version
)]
struct Args {
    /// Input KML or KMZ file
    #[arg(value_name = "INPUT")]
    input: PathBuf,

    /// Output path prefix (default: input path without extension)
    #[arg(value_name = "OUTPUT_BASE")]
    output_base: Option<PathBuf>,

    /// Keep placemarks without geometry in a <base>_nogeom.dbf table
    #[arg(long)]
    include_null_geometry: bool,

    /// Drop placemarks without geometry even if the config keeps them
    #[arg(long, conflicts_with = "include_null_geometry")]
    skip_null_geometry: bool,

    /// Print written tables as JSON
    #[arg(long)]
    json: bool,

    /// Read configuration from this file
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Suppress all output except errors
    #[arg(short, long)]
    quiet: bool,

    /// Show detailed processing information
    #[arg(short, long, conflicts_with = "quiet")]
    verbose: bool,
}

fn init_logging(verbosity: Verbosity) {
    let env = env_logger::Env::default().default_filter_or(verbosity.log_filter());
    env_logger::Builder::from_env(env)
        .target(env_logger::Target::Stderr)
        .init();
}

/// Whether to drop geometry-less placemarks; flags win over the config
fn skip_null_geometry(args: &Args, settings: &ConvertConfig) -> bool {
    if args.include_null_geometry {
        false
    } else if args.skip_null_geometry {
        true
    } else {
        !settings.include_null_geometry.unwrap_or(false)
    }
}

/// Output base from the argument, else the config's output directory
fn resolve_output_base(
    input: &Path,
    output_base: Option<PathBuf>,
    settings: &ConvertConfig,
) -> Option<PathBuf> {
    output_base.or_else(|| {
        let dir = settings.output_dir.as_ref()?;
        let stem = input.file_stem()?;
        Some(dir.join(stem))
    })
}

fn print_tables(tables: &[WrittenTable], json: bool, verbosity: Verbosity) -> Result<()> {
    if json {
        let output = serde_json::to_string_pretty(tables).context("Failed to serialize result")?;
        println!("{output}");
    } else if verbosity.should_show_output() {
        for table in tables {
            println!("{}", table.path.display());
        }
    }
    Ok(())
}

fn run(args: Args) -> Result<()> {
    let verbosity = Verbosity::from_flags(args.quiet, args.verbose);
    init_logging(verbosity);

    let explicit = args
        .config
        .as_deref()
        .map(Config::load_from_file)
        .transpose()?;
    let config = Config::merge([
        Config::load_user_config(),
        Config::load_project_config(),
        explicit,
    ]);
    let settings = config.convert_settings();

    let options = ConvertOptions {
        skip_null_geometry: skip_null_geometry(&args, &settings),
    };
    let output_base = resolve_output_base(&args.input, args.output_base, &settings);

    let tables = convert_path(&args.input, output_base.as_deref(), &options)
        .with_context(|| format!("Failed to convert {}", args.input.display()))?;

    print_tables(&tables, args.json, verbosity)
}

fn main() {
    let args = Args::parse();
    if let Err(e) = run(args) {
        eprintln!("{} {e:#}", "Error:".red().bold());
        process::exit(1);
    }
}
