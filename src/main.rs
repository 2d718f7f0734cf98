use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

mod aggregate;
mod config;
mod error;
mod fields;
mod kobo;
mod labels;
mod multi;
mod output;
mod pipeline;
mod types;
mod utils;

use config::{load_labels, OutputArgs, SourceArgs, SourceConfig};
use kobo::{KoboClient, Paginator};
use utils::osc8_file_link;

#[derive(Parser)]
#[command(name = "kobo-digest")]
#[command(about = "KoboToolbox consultation submissions to dashboard JSON")]
struct Cli {
    /// Only log warnings and errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch all submissions and write data.json and records.json
    Run {
        #[command(flatten)]
        source: SourceArgs,
        #[command(flatten)]
        output: OutputArgs,
    },
    /// Fetch all submissions and write them untouched to kobo_raw.json
    Fetch {
        #[command(flatten)]
        source: SourceArgs,
        /// Directory for kobo_raw.json
        #[arg(long, default_value = ".")]
        out_dir: PathBuf,
    },
    /// Rebuild data.json and records.json from a saved raw dump
    Aggregate {
        /// kobo_raw.json, a saved API page, or a JSON array of submissions
        #[arg(short, long)]
        input: PathBuf,
        #[command(flatten)]
        output: OutputArgs,
    },
    /// Print the effective label table as JSON
    Labels {
        /// JSON file of { domain: { code: label } } merged over the built-in labels
        #[arg(long, env = "KOBO_LABELS")]
        labels: Option<PathBuf>,
        /// Only print this domain (org_type, province, risque, ...)
        #[arg(long)]
        domain: Option<String>,
    },
}

fn init_tracing(quiet: bool) {
    let default = if quiet { "warn" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn paginator(config: &SourceConfig) -> Result<Paginator<KoboClient>> {
    let client = KoboClient::new(&config.token, config.timeout)?;
    Ok(Paginator::new(client)
        .with_page_delay(config.page_delay)
        .with_retry(config.retry))
}

fn print_written(paths: &[PathBuf]) {
    for path in paths {
        println!("Wrote {}", osc8_file_link(path));
    }
}

fn run_command(source: &SourceArgs, output: &OutputArgs) -> Result<()> {
    let config = source.resolve()?;
    let labels = output.label_table()?;
    let paginator = paginator(&config)?;

    let written = pipeline::run(&paginator, config.entry_url.as_str(), &labels, &output.out_dir)
        .with_context(|| format!("pipeline failed for {}", config.entry_url))?;
    print_written(&written);
    Ok(())
}

fn fetch_command(source: &SourceArgs, out_dir: &Path) -> Result<()> {
    let config = source.resolve()?;
    let paginator = paginator(&config)?;

    let written = pipeline::fetch_raw(&paginator, config.entry_url.as_str(), out_dir)
        .with_context(|| format!("fetch failed for {}", config.entry_url))?;
    print_written(&[written]);
    Ok(())
}

fn aggregate_command(input: &Path, output: &OutputArgs) -> Result<()> {
    let labels = output.label_table()?;
    let written = pipeline::aggregate_file(input, &labels, &output.out_dir)
        .with_context(|| format!("aggregation failed for {}", input.display()))?;
    print_written(&written);
    Ok(())
}

fn labels_command(path: Option<PathBuf>, domain: Option<String>) -> Result<()> {
    let labels = load_labels(path.as_deref())?;
    let json = match domain {
        Some(name) => {
            let codes = labels
                .domain(&name)
                .with_context(|| format!("no label domain named '{}'", name))?;
            output::render_json("labels", codes)?
        }
        None => output::render_json("labels", &labels)?,
    };
    print!("{}", json);
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.quiet);

    match cli.command {
        Commands::Run { source, output } => run_command(&source, &output),
        Commands::Fetch { source, out_dir } => fetch_command(&source, &out_dir),
        Commands::Aggregate { input, output } => aggregate_command(&input, &output),
        Commands::Labels { labels, domain } => labels_command(labels, domain),
    }
}
