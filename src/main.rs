use std::fs;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand, ValueEnum};
use graphvis::{CpuKernels, LayoutConfig, LayoutSession, Link, Particle, RunState};
use serde::Serialize;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Headless force-directed graph layout.
#[derive(Parser)]
#[command(name = "graphvis")]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Seed a chain graph and run the optimizer
    Run {
        /// Configuration file (.yaml, .yml or .json)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Number of particles in the seeded chain
        #[arg(long, default_value = "32")]
        chain: usize,

        /// Number of update frames to run
        #[arg(short, long, default_value = "100")]
        frames: usize,

        /// Write the final layout as JSON
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Manual step command applied on every frame
        #[arg(long, default_value = "0", allow_negative_numbers = true)]
        command: i32,

        /// Start paused (only manual commands take effect)
        #[arg(long)]
        pause: bool,
    },
    /// Print the default configuration
    Config {
        #[arg(long, value_enum, default_value = "yaml")]
        format: ConfigFormat,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum ConfigFormat {
    Yaml,
    Json,
}

/// Final layout as written by `run --output`
#[derive(Serialize)]
struct LayoutOutput {
    positions: Vec<[f32; 3]>,
    links: Vec<[u32; 2]>,
    step_length: f32,
    energy: f32,
    iterations: u64,
    mode: String,
}

impl LayoutOutput {
    fn new(particles: &[Particle], links: &[Link], diag: &graphvis::Diagnostics) -> Self {
        Self {
            positions: particles.iter().map(Particle::xyz).collect(),
            links: links.iter().map(|l| [l.par1, l.par2]).collect(),
            step_length: diag.step_length,
            energy: diag.energy,
            iterations: diag.iterations,
            mode: diag.mode.to_string(),
        }
    }
}

fn run(
    config: Option<&Path>,
    chain: usize,
    frames: usize,
    output: Option<&Path>,
    command: i32,
    pause: bool,
) -> anyhow::Result<()> {
    let mut config = match config {
        Some(path) => LayoutConfig::load(path)?,
        None => LayoutConfig::default(),
    };
    config.capacity = config.capacity.max(chain);

    let run_state = if pause { RunState::Pause } else { RunState::Run };
    let mut session = LayoutSession::new(config, CpuKernels::new(), run_state)?;
    session.build_chain(chain)?;
    session.commit()?;

    let mut diag = session.diagnostics();
    for _ in 0..frames {
        diag = session.update(command);
    }
    info!(
        mode = %diag.mode,
        step_length = diag.step_length,
        energy = diag.energy,
        iterations = diag.iterations,
        "Finished {} frames",
        frames
    );
    println!("{diag}");

    if let Some(path) = output {
        let layout = LayoutOutput::new(&session.particles()?, &session.links()?, &diag);
        fs::write(path, serde_json::to_string_pretty(&layout)?)?;
        println!("Wrote layout to {}", path.display());
    }
    Ok(())
}

fn print_config(format: ConfigFormat) -> anyhow::Result<()> {
    let config = LayoutConfig::default();
    let text = match format {
        ConfigFormat::Yaml => serde_yaml::to_string(&config)?,
        ConfigFormat::Json => serde_json::to_string_pretty(&config)?,
    };
    println!("{text}");
    Ok(())
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            config,
            chain,
            frames,
            output,
            command,
            pause,
        } => run(
            config.as_deref(),
            chain,
            frames,
            output.as_deref(),
            command,
            pause,
        ),
        Commands::Config { format } => print_config(format),
    }
}
