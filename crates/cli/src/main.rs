//! objgraph CLI
//!
//! Inspect, convert and check serialized object graphs.

use clap::{Parser as ClapParser, Subcommand};
use objgraph::format::text::{self, TextConfig};
use objgraph::{Codec, Format, GraphConfig, GraphError, RawValue};
use objgraph_core::ModuleRegistry;
use std::fs;
use std::path::{Path, PathBuf};
use std::process;
use tracing::{debug, info};

#[derive(ClapParser)]
#[command(name = "objgraph")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Inspect, convert and check serialized object graphs", long_about = None)]
struct Cli {
    /// Graph configuration (TOML)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print a human-readable rendering of a graph file
    Inspect {
        file: PathBuf,

        /// Input format (defaults to the file extension)
        #[arg(short, long)]
        format: Option<Format>,

        /// Indent nested nodes
        #[arg(long)]
        pretty: bool,
    },

    /// Transcode a graph between JSON and binary
    Convert {
        input: PathBuf,
        output: PathBuf,

        /// Input format (defaults to the input extension)
        #[arg(long)]
        from: Option<Format>,

        /// Output format (defaults to the output extension)
        #[arg(long)]
        to: Option<Format>,
    },

    /// Rebuild a graph and report the type of its root value
    Check {
        file: PathBuf,

        /// Input format (defaults to the file extension)
        #[arg(short, long)]
        format: Option<Format>,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config = match cli.config.as_deref().map(load_config).transpose() {
        Ok(config) => config.unwrap_or_default(),
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Inspect {
            file,
            format,
            pretty,
        } => run_inspect(&config, &file, format, pretty).map(|out| println!("{}", out)),
        Commands::Convert {
            input,
            output,
            from,
            to,
        } => run_convert(&config, &input, &output, from, to).map(|written| {
            println!(
                "Converted {} -> {} ({} bytes)",
                input.display(),
                output.display(),
                written
            )
        }),
        Commands::Check { file, format } => {
            run_check(config, &file, format).map(|out| println!("{}", out))
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn load_config(path: &Path) -> Result<GraphConfig, String> {
    let content = fs::read_to_string(path)
        .map_err(|e| format!("reading config {}: {}", path.display(), e))?;
    let config = GraphConfig::from_toml(&content)?;
    debug!(?config, "loaded config");
    Ok(config)
}

/// Explicit format, else the one the extension names
fn resolve_format(explicit: Option<Format>, path: &Path) -> Result<Format, GraphError> {
    explicit.or_else(|| Format::from_path(path)).ok_or_else(|| {
        GraphError::Format(format!(
            "cannot tell the format of {}; pass it explicitly",
            path.display()
        ))
    })
}

fn read_raw(
    config: &GraphConfig,
    path: &Path,
    format: Option<Format>,
) -> Result<RawValue, GraphError> {
    let format = resolve_format(format, path)?;
    let bytes = fs::read(path)?;
    info!(path = %path.display(), %format, bytes = bytes.len(), "reading graph");
    format.decode(&bytes, config.max_depth)
}

fn run_inspect(
    config: &GraphConfig,
    path: &Path,
    format: Option<Format>,
    pretty: bool,
) -> Result<String, GraphError> {
    let raw = read_raw(config, path, format)?;
    let config = if pretty {
        TextConfig::pretty()
    } else {
        TextConfig::compact()
    };
    Ok(text::render(&raw, &config))
}

/// Returns the number of bytes written
fn run_convert(
    config: &GraphConfig,
    input: &Path,
    output: &Path,
    from: Option<Format>,
    to: Option<Format>,
) -> Result<usize, GraphError> {
    let raw = read_raw(config, input, from)?;
    let to = resolve_format(to, output)?;
    let bytes = to.encode(&raw, config.pretty)?;
    fs::write(output, &bytes)?;
    Ok(bytes.len())
}

fn run_check(
    config: GraphConfig,
    path: &Path,
    format: Option<Format>,
) -> Result<String, GraphError> {
    let raw = read_raw(&config, path, format)?;
    let codec = Codec::new(config, ModuleRegistry::with_stdlib());
    let value = codec.from_raw(&raw)?;
    Ok(format!(
        "ok: {} ({} self references)",
        value.type_name(),
        raw.placeholder_count()
    ))
}
