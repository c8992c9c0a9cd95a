use rand::rngs::SmallRng;
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::collections::VecDeque;
use std::fmt;
use tracing::debug;

use crate::config::FlockingConfig;
use crate::pipeline::{self, TickStats};
use crate::population::Population;
use crate::{FlockError, Tick, TickSummary};

/// Drives the flocking pipeline tick after tick.
///
/// Owns the configuration, the lattice jitter RNG, the optional bounded worker
/// pool, and a bounded history of tick summaries. It never retains spatial
/// state between ticks; the population itself is owned by the caller.
pub struct FlockWorld {
    config: FlockingConfig,
    tick: Tick,
    rng: SmallRng,
    pool: Option<ThreadPool>,
    history: VecDeque<TickSummary>,
}

impl fmt::Debug for FlockWorld {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FlockWorld")
            .field("config", &self.config)
            .field("tick", &self.tick)
            .field(
                "worker_threads",
                &self.pool.as_ref().map(ThreadPool::current_num_threads),
            )
            .field("history_len", &self.history.len())
            .finish()
    }
}

fn build_pool(config: &FlockingConfig) -> Result<Option<ThreadPool>, FlockError> {
    config
        .worker_threads
        .map(|threads| {
            ThreadPoolBuilder::new()
                .num_threads(threads)
                .thread_name(|index| format!("boids-worker-{index}"))
                .build()
                .map_err(|err| FlockError::WorkerPool(err.to_string()))
        })
        .transpose()
}

impl FlockWorld {
    /// Instantiate a driver using the supplied configuration.
    pub fn new(config: FlockingConfig) -> Result<Self, FlockError> {
        config.validate()?;
        let pool = build_pool(&config)?;
        let rng = config.seeded_rng();
        let history = VecDeque::with_capacity(config.history_capacity);
        Ok(Self {
            config,
            tick: Tick::zero(),
            rng,
            pool,
            history,
        })
    }

    /// Advance `population` by one tick of `delta_time` seconds.
    pub fn step(&mut self, population: &mut Population, delta_time: f32) -> TickSummary {
        let Self {
            config, rng, pool, ..
        } = self;
        let stats: TickStats = match pool {
            Some(pool) => pool.install(|| pipeline::step(population, delta_time, config, rng)),
            None => pipeline::step(population, delta_time, config, rng),
        };

        self.tick = self.tick.next();
        let summary = TickSummary {
            tick: self.tick,
            stats,
        };
        debug!(
            tick = summary.tick.0,
            agents = stats.agent_count,
            cells = stats.occupied_cells,
            largest_cell = stats.largest_cell,
            isolated = stats.isolated_agents,
            polarization = stats.polarization,
            "flock tick complete"
        );

        if self.history.len() >= self.config.history_capacity {
            self.history.pop_front();
        }
        self.history.push_back(summary);
        summary
    }

    /// Returns an immutable reference to configuration.
    #[must_use]
    pub fn config(&self) -> &FlockingConfig {
        &self.config
    }

    /// Swap in a new configuration, rebuilding the worker pool if its size changed.
    pub fn replace_config(&mut self, config: FlockingConfig) -> Result<(), FlockError> {
        config.validate()?;
        if config.worker_threads != self.config.worker_threads {
            self.pool = build_pool(&config)?;
        }
        if config.rng_seed != self.config.rng_seed {
            self.rng = config.seeded_rng();
        }
        while self.history.len() > config.history_capacity {
            self.history.pop_front();
        }
        self.config = config;
        Ok(())
    }

    /// Current simulation tick.
    #[must_use]
    pub const fn tick(&self) -> Tick {
        self.tick
    }

    /// Resets the tick counter and clears history (useful for restarts).
    pub fn reset_time(&mut self) {
        self.tick = Tick::zero();
        self.history.clear();
    }

    /// Iterate over retained tick summaries, oldest first.
    pub fn history(&self) -> impl Iterator<Item = &TickSummary> {
        self.history.iter()
    }

    /// Most recent tick summary, if any tick has run.
    #[must_use]
    pub fn last_summary(&self) -> Option<&TickSummary> {
        self.history.back()
    }

    /// Borrow the jitter RNG mutably, e.g. to spawn agents from the same stream.
    #[must_use]
    pub fn rng(&mut self) -> &mut SmallRng {
        &mut self.rng
    }
}
