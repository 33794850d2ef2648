//! Top-level tick orchestration.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use rayon::ThreadPool;

use crate::bounds;
use crate::chunk::{Chunk, ChunkStore};
use crate::config::SimulationConfig;
use crate::dispatch::{BucketCounts, BucketSolver, ClassificationPolicy, DispatchOverride, Dispatcher, SimulationBucket};
use crate::environment::Environment;
use crate::error::Result;
use crate::grid2::Grid2Solver;
use crate::metadata::{build_pool, update_metadata};

/// What one tick did.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TickReport {
    /// Frame number that was simulated.
    pub frame: u64,
    pub buckets: BucketCounts,
    pub normalization_ratio: f32,
    pub existing_density: f64,
    pub new_density: f64,
    pub simulate_time: Duration,
    pub metadata_time: Duration,
}

/// Owns the chunks, the environment and one solver per bucket.
pub struct FluidSimulator {
    config: SimulationConfig,
    store: ChunkStore,
    env: Environment,
    dispatcher: Dispatcher,
    solvers: HashMap<SimulationBucket, Box<dyn BucketSolver>>,
    pool: Option<ThreadPool>,
    links_dirty: bool,
}

impl FluidSimulator {
    pub fn new(config: SimulationConfig) -> Result<Self> {
        config.validate()?;
        let mut solvers: HashMap<SimulationBucket, Box<dyn BucketSolver>> = HashMap::new();
        solvers.insert(SimulationBucket::Grid2, Box::new(Grid2Solver::new(&config)));

        Ok(FluidSimulator {
            env: Environment::new(&config),
            store: ChunkStore::new(),
            dispatcher: Dispatcher::default(),
            solvers,
            pool: build_pool(config.threads),
            links_dirty: false,
            config,
        })
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    pub fn environment(&self) -> &Environment {
        &self.env
    }

    pub fn frame(&self) -> u64 {
        self.env.frame
    }

    pub fn store(&self) -> &ChunkStore {
        &self.store
    }

    /// Mutable access for the host to write field data between ticks.
    pub fn store_mut(&mut self) -> &mut ChunkStore {
        &mut self.store
    }

    /// Add an empty chunk. Neighbor links are rebuilt before the next tick,
    /// or immediately with [`FluidSimulator::link_neighbors`].
    pub fn add_chunk(&mut self, world_pos: [i32; 3]) -> Result<usize> {
        let idx = self.store.insert(Chunk::new(world_pos))?;
        self.links_dirty = true;
        Ok(idx)
    }

    /// Remove a chunk. The last chunk takes the removed chunk's index.
    pub fn remove_chunk(&mut self, world_pos: [i32; 3]) -> Option<Chunk> {
        let removed = self.store.remove(world_pos);
        if removed.is_some() {
            self.links_dirty = true;
        }
        removed
    }

    pub fn link_neighbors(&mut self) {
        self.store.link_neighbors();
        self.links_dirty = false;
    }

    pub fn set_dispatch_override(&mut self, forced: DispatchOverride) {
        self.dispatcher.set_override(forced);
    }

    pub fn dispatch_override(&self) -> DispatchOverride {
        self.dispatcher.dispatch_override()
    }

    pub fn set_policy(&mut self, policy: Box<dyn ClassificationPolicy>) {
        self.dispatcher.set_policy(policy);
    }

    /// Install the solver that runs `bucket`, replacing any previous one.
    pub fn register_solver(&mut self, bucket: SimulationBucket, solver: Box<dyn BucketSolver>) {
        self.solvers.insert(bucket, solver);
    }

    /// Advance every awake chunk by one frame.
    ///
    /// A non-positive or non-finite `dt`, or a non-finite `gravity`, falls
    /// back to the configured value.
    pub fn tick(&mut self, dt: f32, gravity: f32) -> TickReport {
        let dt = if dt > 0.0 && dt.is_finite() {
            dt
        } else {
            log::warn!("invalid timestep {}, using {}", dt, self.config.dt);
            self.config.dt
        };
        let gravity = if gravity.is_finite() {
            gravity
        } else {
            log::warn!("invalid gravity {}, using {}", gravity, self.config.gravity);
            self.config.gravity
        };

        self.env.begin_frame(dt, gravity);
        if self.links_dirty {
            self.link_neighbors();
        }
        bounds::exchange_halos(&mut self.store);

        let buckets = self.dispatcher.rebuild(&self.store);

        let started = Instant::now();
        for bucket in SimulationBucket::ALL {
            let members = self.dispatcher.members(bucket);
            if members.is_empty() {
                continue;
            }
            match self.solvers.get_mut(&bucket) {
                Some(solver) => solver.simulate(&mut self.store, members, &mut self.env),
                None => log::debug!("no solver for {:?}, skipping {} chunks", bucket, members.len()),
            }
        }
        let simulate_time = started.elapsed();

        let started = Instant::now();
        update_metadata(
            &mut self.store,
            &self.env.border_mask,
            self.config.homogeneous_threshold,
            self.config.solver.backend,
            self.pool.as_ref(),
        );
        let metadata_time = started.elapsed();

        bounds::exchange_halos(&mut self.store);

        let report = TickReport {
            frame: self.env.frame,
            buckets,
            normalization_ratio: self.env.density.normalization_ratio,
            existing_density: self.env.density.existing,
            new_density: self.env.density.new,
            simulate_time,
            metadata_time,
        };
        self.env.end_frame();
        log::debug!(
            "frame {}: {} awake, {} asleep, ratio {}, simulate {:?}, metadata {:?}",
            report.frame,
            buckets.awake(),
            buckets.asleep,
            report.normalization_ratio,
            simulate_time,
            metadata_time
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::FieldKind;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct Counting(Arc<AtomicUsize>);

    impl BucketSolver for Counting {
        fn simulate(&mut self, _store: &mut ChunkStore, members: &[usize], _env: &mut Environment) {
            self.0.fetch_add(members.len(), Ordering::SeqCst);
        }
    }

    #[test]
    fn test_rejects_invalid_config() {
        let config = SimulationConfig {
            dt: -1.0,
            ..SimulationConfig::default()
        };
        assert!(FluidSimulator::new(config).is_err());
    }

    #[test]
    fn test_tick_advances_frame_and_links() {
        let mut sim = FluidSimulator::new(SimulationConfig::default()).unwrap();
        sim.add_chunk([0, 0, 0]).unwrap();
        sim.add_chunk([1, 0, 0]).unwrap();
        assert!(sim.add_chunk([1, 0, 0]).is_err());
        sim.store_mut().get_mut(0).unwrap().set(FieldKind::Density, 8, 8, 8, 1.0);

        let report = sim.tick(0.02, -9.81);
        assert_eq!(report.frame, 0);
        assert_eq!(sim.frame(), 1);
        assert_eq!(report.buckets.grid2, 2);
        assert!(sim.store().get(0).unwrap().mask().neighbor_count() > 0);
    }

    #[test]
    fn test_empty_world_goes_to_sleep() {
        let mut sim = FluidSimulator::new(SimulationConfig::default()).unwrap();
        sim.add_chunk([0, 0, 0]).unwrap();
        let first = sim.tick(0.02, -9.81);
        assert_eq!(first.buckets.grid2, 1, "new chunks start awake");
        let second = sim.tick(0.02, -9.81);
        assert_eq!(second.buckets.asleep, 1);
        assert_eq!(second.buckets.awake(), 0);
    }

    #[test]
    fn test_registered_solver_receives_override() {
        let count = Arc::new(AtomicUsize::new(0));
        let mut sim = FluidSimulator::new(SimulationConfig::default()).unwrap();
        sim.register_solver(SimulationBucket::Cellular, Box::new(Counting(count.clone())));
        sim.add_chunk([0, 0, 0]).unwrap();
        sim.add_chunk([0, 1, 0]).unwrap();
        // Keeps both chunks awake since the counting solver never moves it
        sim.store_mut().get_mut(0).unwrap().set(FieldKind::Density, 4, 4, 4, 0.5);
        sim.set_dispatch_override(DispatchOverride::Cellular);

        let report = sim.tick(0.02, 0.0);
        assert_eq!(report.buckets.cellular, 2);
        assert_eq!(count.load(Ordering::SeqCst), 2);

        // Nobody runs the pressure-cell bucket: skipped without effect
        sim.set_dispatch_override(DispatchOverride::PressureCell);
        let report = sim.tick(0.02, 0.0);
        assert_eq!(report.buckets.pressure_cell, 2);
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_bad_timestep_falls_back() {
        let mut sim = FluidSimulator::new(SimulationConfig::default()).unwrap();
        sim.add_chunk([0, 0, 0]).unwrap();
        sim.tick(f32::NAN, f32::INFINITY);
        assert_eq!(sim.environment().dt, 0.02);
        assert_eq!(sim.environment().gravity, -9.81);
    }
}
