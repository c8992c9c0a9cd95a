use std::path::PathBuf;

use anyhow::Result;
use boids_app::{RunOptions, load_config, run_headless};
use boids_core::GridJitter;
use clap::Parser;
use tracing::info;

#[derive(Parser, Debug)]
#[command(
    name = "boids-app",
    version,
    about = "Run the spatial-hash flocking pipeline headlessly"
)]
struct Cli {
    /// JSON file with configuration overrides; missing fields keep their defaults.
    #[arg(short, long, env = "BOIDS_CONFIG")]
    config: Option<PathBuf>,
    /// Number of agents to spawn.
    #[arg(long, env = "BOIDS_AGENTS")]
    agents: Option<usize>,
    /// Ticks to simulate.
    #[arg(long, env = "BOIDS_TICKS", default_value_t = 600)]
    ticks: u64,
    /// Seconds advanced per tick.
    #[arg(long, default_value_t = 1.0 / 60.0)]
    delta_time: f32,
    /// Seed for spawning and lattice jitter.
    #[arg(long, env = "BOIDS_SEED")]
    seed: Option<u64>,
    /// Size of a dedicated worker pool (defaults to the global rayon pool).
    #[arg(long, env = "BOIDS_THREADS")]
    threads: Option<usize>,
    /// Keep the lattice axis-aligned instead of jittering it every tick.
    #[arg(long)]
    fixed_grid: bool,
    /// Log a progress line every N ticks (0 disables).
    #[arg(long, default_value_t = 60)]
    report_every: u64,
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let mut config = load_config(cli.config.as_deref())?;
    if let Some(agents) = cli.agents {
        config.population_size = agents;
    }
    if let Some(seed) = cli.seed {
        config.rng_seed = Some(seed);
    }
    if let Some(threads) = cli.threads {
        config.worker_threads = Some(threads);
    }
    if cli.fixed_grid {
        config.grid_jitter = GridJitter::Fixed;
    }

    let options = RunOptions {
        ticks: cli.ticks,
        delta_time: cli.delta_time,
        report_every: cli.report_every,
    };
    let report = run_headless(config, &options)?;
    if let Some(summary) = report.last {
        info!(
            tick = summary.tick.0,
            agents = summary.stats.agent_count,
            cells = summary.stats.occupied_cells,
            polarization = summary.stats.polarization,
            "final tick"
        );
    }
    Ok(())
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}
