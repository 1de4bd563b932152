//! ARBOR CLI
//!
//! `arbor run` starts one component, `arbor console` drives the shared
//! tree by hand, `arbor encode`/`arbor decode` convert node files.

#![warn(missing_docs)]
#![warn(clippy::all)]

mod command;
mod console;

use arbor_codec::Format;
use arbor_core::Configuration;
use arbor_runtime::{ComponentSettings, Role, assemble, open_transport};
use arbor_store::{LocalStore, Replicator};
use arbor_transport::MemoryBus;
use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, WrapErr};
use console::Console;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "arbor")]
#[command(
    about = "ARBOR - replicated tree middleware with priority-gated workers",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a component until interrupted
    Run {
        /// Configuration file
        #[arg(short, long)]
        config: PathBuf,
        /// Override a configuration entry (key=value)
        #[arg(short, long = "set")]
        set: Vec<String>,
        /// What the component does: counter, persist or plain
        #[arg(short, long, default_value = "plain")]
        role: Role,
    },
    /// Interactive console
    Console {
        /// Configuration file
        #[arg(short, long)]
        config: PathBuf,
        /// Override a configuration entry (key=value)
        #[arg(short, long = "set")]
        set: Vec<String>,
    },
    /// Convert an XML node file to binary
    Encode {
        /// XML input
        #[arg(short, long)]
        input: PathBuf,
        /// Binary output
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Convert a binary node file to XML
    Decode {
        /// Binary input
        #[arg(short, long)]
        input: PathBuf,
        /// XML output
        #[arg(short, long)]
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("arbor=info")),
        )
        .init();

    match cli.command {
        Commands::Run { config, set, role } => run(&config, &set, role).await,
        Commands::Console { config, set } => console(&config, &set).await,
        Commands::Encode { input, output } => convert(&input, Format::Xml, &output, Format::Binary),
        Commands::Decode { input, output } => convert(&input, Format::Binary, &output, Format::Xml),
    }
}

fn load_config(path: &Path, overrides: &[String]) -> Result<Configuration> {
    let (mut config, problems) = Configuration::load(path)?;
    for problem in problems {
        warn!(file = %path.display(), %problem, "skipping configuration line");
    }
    for entry in overrides {
        config.apply_override(entry)?;
    }
    Ok(config)
}

fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("interrupt received, shutting down"),
            Err(e) => warn!(error = %e, "cannot listen for interrupts"),
        }
        token.cancel();
    });
    cancel
}

async fn run(path: &Path, overrides: &[String], role: Role) -> Result<()> {
    let config = load_config(path, overrides)?;
    let settings = ComponentSettings::from_config(&config)?;
    let bus = MemoryBus::new();
    let transport = open_transport(&settings, &bus).await?;

    info!(component = %settings.name, %role, transport = %settings.transport, "launching");
    assemble(role, settings, transport)
        .run(cancel_on_ctrl_c())
        .await?;
    Ok(())
}

async fn console(path: &Path, overrides: &[String]) -> Result<()> {
    let config = load_config(path, overrides)?;
    let settings = ComponentSettings::from_config(&config)?;
    let bus = MemoryBus::new();
    let transport = open_transport(&settings, &bus).await?;

    let store = Arc::new(LocalStore::new(settings.name.clone(), settings.policy.clone()));
    let console = Console::new(Arc::clone(&store), settings.console_output.clone());
    let printer = console.watch();

    let cancel = CancellationToken::new();
    let replicator = Replicator::start(store, transport, cancel.clone());
    let outcome = console.repl().await;

    cancel.cancel();
    replicator.join().await;
    printer.abort();
    outcome
}

fn convert(input: &Path, from: Format, output: &Path, to: Format) -> Result<()> {
    let bytes = std::fs::read(input).wrap_err_with(|| format!("reading {}", input.display()))?;
    let node = from
        .decode(&bytes)
        .wrap_err_with(|| format!("decoding {} as {}", input.display(), from))?;
    std::fs::write(output, to.encode(&node)?)
        .wrap_err_with(|| format!("writing {}", output.display()))?;
    info!(
        input = %input.display(),
        output = %output.display(),
        entries = node.entry_count(),
        "converted"
    );
    Ok(())
}
