//! Headless application plumbing for the boids flocking pipeline.

use std::fs;
use std::path::Path;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, ensure};
use boids_core::{FlockWorld, FlockingConfig, TickSummary};
use tracing::{info, warn};

pub mod spawn;

pub use spawn::spawn_population;

/// Parameters of a headless run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunOptions {
    /// Ticks to simulate.
    pub ticks: u64,
    /// Seconds advanced per tick.
    pub delta_time: f32,
    /// Log a summary every this many ticks; 0 disables periodic logging.
    pub report_every: u64,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            ticks: 600,
            delta_time: 1.0 / 60.0,
            report_every: 60,
        }
    }
}

/// Outcome of [`run_headless`].
#[derive(Debug, Clone)]
pub struct RunReport {
    pub agents: usize,
    pub ticks: u64,
    pub elapsed: Duration,
    pub last: Option<TickSummary>,
}

impl RunReport {
    /// Average wall-clock time per tick.
    #[must_use]
    pub fn mean_tick_time(&self) -> Duration {
        if self.ticks == 0 {
            Duration::ZERO
        } else {
            self.elapsed.div_f64(self.ticks as f64)
        }
    }
}

/// Load a configuration, starting from defaults and applying a JSON file when given.
///
/// Fields absent from the file keep their default values.
pub fn load_config(path: Option<&Path>) -> Result<FlockingConfig> {
    let Some(path) = path else {
        return Ok(FlockingConfig::default());
    };
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    let config: FlockingConfig = serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse config file {}", path.display()))?;
    Ok(config)
}

/// Spawn a population from `config` and step it `options.ticks` times.
pub fn run_headless(config: FlockingConfig, options: &RunOptions) -> Result<RunReport> {
    ensure!(
        options.delta_time.is_finite() && options.delta_time >= 0.0,
        "delta time must be finite and non-negative, got {}",
        options.delta_time
    );
    let mut world = FlockWorld::new(config).context("invalid flocking configuration")?;
    let spawn_config = world.config().clone();
    let mut population = spawn_population(&spawn_config, world.rng());
    let agents = population.len();
    if agents == 0 {
        warn!("population is empty; ticks will be no-ops");
    }
    info!(
        agents,
        ticks = options.ticks,
        delta_time = options.delta_time,
        "starting headless flock run"
    );

    let started = Instant::now();
    for _ in 0..options.ticks {
        let summary = world.step(&mut population, options.delta_time);
        if options.report_every > 0 && summary.tick.0 % options.report_every == 0 {
            info!(
                tick = summary.tick.0,
                cells = summary.stats.occupied_cells,
                largest_cell = summary.stats.largest_cell,
                isolated = summary.stats.isolated_agents,
                polarization = summary.stats.polarization,
                "flock progress"
            );
        }
    }
    let elapsed = started.elapsed();

    let report = RunReport {
        agents,
        ticks: options.ticks,
        elapsed,
        last: world.last_summary().copied(),
    };
    info!(
        ticks = report.ticks,
        elapsed_ms = elapsed.as_millis() as u64,
        mean_tick_us = report.mean_tick_time().as_micros() as u64,
        "headless flock run complete"
    );
    Ok(report)
}
