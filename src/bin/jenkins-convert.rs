//! Command-line front end: Jenkins JSON trace in, pipeline YAML/JSON out.

use std::fs;
use std::io::{self, Read, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use tracing_subscriber::EnvFilter;

use converter::{ConvertOptions, codegen, convert};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
enum Format {
    #[default]
    Yaml,
    Json,
}

#[derive(Parser, Debug)]
#[command(name = "jenkins-convert")]
#[command(version)]
#[command(about = "Convert a Jenkins JSON trace export into a pipeline document")]
#[command(after_help = "Example:\n    jenkins-convert trace.json --name build --output pipeline.yaml")]
struct Args {
    /// Trace file to read; `-` or omitted reads stdin
    input: Option<PathBuf>,

    /// Write the document here instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,

    #[arg(short, long, value_enum, default_value_t = Format::Yaml)]
    format: Format,

    /// Options as a JSON file (`pipelineName`, `defaultImage`, `mergeSteps`)
    #[arg(long)]
    options: Option<PathBuf>,

    /// Pipeline name; overrides the options file
    #[arg(short, long)]
    name: Option<String>,

    /// Image for steps outside any container block; overrides the options file
    #[arg(long)]
    image: Option<String>,

    /// Keep adjacent script steps separate
    #[arg(long)]
    no_merge: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging();

    let input = read_input(args.input.as_deref())?;
    let options = build_options(&args)?;

    let conversion = convert(&input, &options)?;
    for diagnostic in &conversion.diagnostics {
        eprintln!("warning: {}", diagnostic);
    }

    let document = match args.format {
        Format::Yaml => codegen::to_yaml(&conversion.pipeline)?,
        Format::Json => codegen::to_json(&conversion.pipeline)?,
    };

    match &args.output {
        Some(path) => fs::write(path, &document)
            .with_context(|| format!("failed to write {}", path.display()))?,
        None => {
            let mut stdout = io::stdout().lock();
            stdout.write_all(document.as_bytes())?;
            if !document.ends_with('\n') {
                stdout.write_all(b"\n")?;
            }
        }
    }
    Ok(())
}

/// Logs go to stderr so stdout stays a clean document. `RUST_LOG` overrides
/// the default `warn` level.
fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .try_init();
}

fn read_input(path: Option<&std::path::Path>) -> Result<String> {
    match path {
        Some(p) if p.as_os_str() != "-" => {
            fs::read_to_string(p).with_context(|| format!("failed to read {}", p.display()))
        }
        _ => {
            let mut buf = String::new();
            io::stdin()
                .read_to_string(&mut buf)
                .context("failed to read stdin")?;
            Ok(buf)
        }
    }
}

fn build_options(args: &Args) -> Result<ConvertOptions> {
    let mut options = match &args.options {
        Some(path) => {
            let raw = fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            ConvertOptions::from_json(&raw)?
        }
        None => ConvertOptions::default(),
    };
    if args.name.is_some() {
        options.pipeline_name = args.name.clone();
    }
    if args.image.is_some() {
        options.default_image = args.image.clone();
    }
    if args.no_merge {
        options.merge_steps = false;
    }
    Ok(options)
}
