mod cells;
mod config;
mod filter;
mod html;
mod markers;
mod notebook;
mod pdf;
mod preprocess;
mod registry;
mod rewrite;
mod structure;

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use config::Config;
use notebook::Notebook;

#[derive(Parser)]
#[command(name = "nbexport", about = "Convert Jupyter notebooks to presentation-ready PDF")]
struct Cli {
    /// Notebook file to convert
    file: PathBuf,

    /// YAML configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Output PDF path
    #[arg(short, long, default_value = "output.pdf")]
    output: PathBuf,

    /// Also write the intermediate HTML to this path
    #[arg(long)]
    html_output: Option<PathBuf>,

    /// Stop after HTML generation
    #[arg(long)]
    html_only: bool,

    /// Force a PDF engine (chromium, wkhtmltopdf, weasyprint)
    #[arg(long, env = "NBEXPORT_PDF_ENGINE")]
    pdf_engine: Option<String>,

    /// Log level when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn main() {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);
    if let Err(err) = run(&cli) {
        error!("{err:#}");
        std::process::exit(1);
    }
}

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn run(cli: &Cli) -> Result<()> {
    if cli.html_only && cli.html_output.is_none() {
        bail!("--html-only requires --html-output");
    }

    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(engine) = &cli.pdf_engine {
        config.pdf_engine = Some(engine.clone());
    }

    let notebook = Notebook::load(&cli.file)?;
    info!(cells = notebook.cells.len(), file = %cli.file.display(), "notebook loaded");

    let processed = preprocess::preprocess(notebook, &config)?;
    info!(cells = processed.cells.len(), "preprocessing done");

    let rendered = html::render_html(&processed, &config)?;
    info!(bytes = rendered.len(), "html generated");

    if let Some(path) = &cli.html_output {
        std::fs::write(path, &rendered)
            .with_context(|| format!("Could not write {}", path.display()))?;
        info!(path = %path.display(), "html written");
    }
    if cli.html_only {
        return Ok(());
    }

    pdf::render_pdf(&rendered, &cli.output, &config)?;
    info!(path = %cli.output.display(), "pdf written");
    Ok(())
}
