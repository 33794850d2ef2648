//! Per-frame assignment of awake chunks to simulation buckets.

use crate::chunk::{Chunk, ChunkStore};
use crate::environment::Environment;

/// Solver family a chunk is simulated with this frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SimulationBucket {
    Cellular = 0,
    Grid = 1,
    Grid2 = 2,
    PressureCell = 3,
}

impl SimulationBucket {
    pub const ALL: [SimulationBucket; 4] = [
        SimulationBucket::Cellular,
        SimulationBucket::Grid,
        SimulationBucket::Grid2,
        SimulationBucket::PressureCell,
    ];
}

/// Forces every awake chunk into one bucket. Meant for exercising a single
/// solver in isolation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[repr(u8)]
pub enum DispatchOverride {
    #[default]
    None = 0,
    Cellular = 1,
    Grid2 = 2,
    PressureCell = 3,
}

impl DispatchOverride {
    pub fn from_id(id: u8) -> Option<DispatchOverride> {
        match id {
            0 => Some(DispatchOverride::None),
            1 => Some(DispatchOverride::Cellular),
            2 => Some(DispatchOverride::Grid2),
            3 => Some(DispatchOverride::PressureCell),
            _ => None,
        }
    }

    pub fn bucket(self) -> Option<SimulationBucket> {
        match self {
            DispatchOverride::None => None,
            DispatchOverride::Cellular => Some(SimulationBucket::Cellular),
            DispatchOverride::Grid2 => Some(SimulationBucket::Grid2),
            DispatchOverride::PressureCell => Some(SimulationBucket::PressureCell),
        }
    }
}

/// Decides which bucket an awake chunk belongs to.
pub trait ClassificationPolicy: Send {
    fn classify(&self, chunk: &Chunk) -> SimulationBucket;
}

/// Puts every chunk in the same bucket.
#[derive(Clone, Copy, Debug)]
pub struct UniformPolicy(pub SimulationBucket);

impl Default for UniformPolicy {
    fn default() -> Self {
        UniformPolicy(SimulationBucket::Grid2)
    }
}

impl ClassificationPolicy for UniformPolicy {
    fn classify(&self, _chunk: &Chunk) -> SimulationBucket {
        self.0
    }
}

/// Steps every member chunk of one bucket for one frame.
///
/// `members` are store indices, sorted ascending and free of duplicates.
pub trait BucketSolver: Send {
    fn simulate(&mut self, store: &mut ChunkStore, members: &[usize], env: &mut Environment);
}

/// Membership counts from the last rebuild.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BucketCounts {
    pub cellular: usize,
    pub grid: usize,
    pub grid2: usize,
    pub pressure_cell: usize,
    pub asleep: usize,
}

impl BucketCounts {
    pub fn get(&self, bucket: SimulationBucket) -> usize {
        match bucket {
            SimulationBucket::Cellular => self.cellular,
            SimulationBucket::Grid => self.grid,
            SimulationBucket::Grid2 => self.grid2,
            SimulationBucket::PressureCell => self.pressure_cell,
        }
    }

    pub fn awake(&self) -> usize {
        self.cellular + self.grid + self.grid2 + self.pressure_cell
    }
}

pub struct Dispatcher {
    policy: Box<dyn ClassificationPolicy>,
    forced: DispatchOverride,
    buckets: [Vec<usize>; 4],
    counts: BucketCounts,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Dispatcher::new(Box::new(UniformPolicy::default()))
    }
}

impl Dispatcher {
    pub fn new(policy: Box<dyn ClassificationPolicy>) -> Self {
        Dispatcher {
            policy,
            forced: DispatchOverride::None,
            buckets: Default::default(),
            counts: BucketCounts::default(),
        }
    }

    pub fn set_policy(&mut self, policy: Box<dyn ClassificationPolicy>) {
        self.policy = policy;
    }

    pub fn set_override(&mut self, forced: DispatchOverride) {
        self.forced = forced;
    }

    pub fn dispatch_override(&self) -> DispatchOverride {
        self.forced
    }

    /// Clear every bucket and reassign all awake chunks. Nothing carries
    /// over from the previous frame.
    pub fn rebuild(&mut self, store: &ChunkStore) -> BucketCounts {
        for bucket in self.buckets.iter_mut() {
            bucket.clear();
        }
        let mut asleep = 0;
        for (idx, chunk) in store.chunks().iter().enumerate() {
            if chunk.metadata.asleep {
                asleep += 1;
                continue;
            }
            let bucket = self.forced.bucket().unwrap_or_else(|| self.policy.classify(chunk));
            self.buckets[bucket as usize].push(idx);
        }

        self.counts = BucketCounts {
            cellular: self.buckets[SimulationBucket::Cellular as usize].len(),
            grid: self.buckets[SimulationBucket::Grid as usize].len(),
            grid2: self.buckets[SimulationBucket::Grid2 as usize].len(),
            pressure_cell: self.buckets[SimulationBucket::PressureCell as usize].len(),
            asleep,
        };
        log::debug!("dispatch: {:?} (override {:?})", self.counts, self.forced);
        self.counts
    }

    pub fn members(&self, bucket: SimulationBucket) -> &[usize] {
        &self.buckets[bucket as usize]
    }

    pub fn counts(&self) -> BucketCounts {
        self.counts
    }
}
