//! Random workloads, for simulation and testing.

use rand::Rng;

use crate::helpe::*;

/// Bounds (inclusive) of a random workload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimParams {
    /// How many jobs to create.
    pub jobs:           (usize, usize),
    /// How many distinct chunks exist.
    pub catalog:        (usize, usize),
    /// How many chunk reads each job makes.
    pub reads_per_job:  (usize, usize),
    pub deadlines:      (Deadline, Deadline),
}

impl Default for SimParams {
    fn default() -> Self {
        Self {
            jobs:           (1, 10),
            catalog:        (1, 20),
            reads_per_job:  (1, 20),
            deadlines:      (1, 10),
        }
    }
}

impl SimParams {
    /// Every range must be non-empty, the catalog must hold at least
    /// one chunk and deadlines must be positive.
    pub fn is_valid(&self) -> bool {
        let ranges = [self.jobs, self.catalog, self.reads_per_job, self.deadlines];
        ranges.iter().all(|(lo, hi)| lo <= hi)
            && self.catalog.0 > 0
            && self.deadlines.0 > 0
    }
}

/// Draws a workload: a job count, a catalog size, then for every job
/// a deadline and a number of chunk reads, each read picking a catalog
/// chunk uniformly at random (repeats allowed).
pub fn simulate<R: Rng>(params: &SimParams, rng: &mut R) -> Vec<Job> {
    assert!(params.is_valid(), "Bad simulation bounds: {params:?}");
    let num_jobs = rng.gen_range(params.jobs.0..=params.jobs.1);
    let catalog = rng.gen_range(params.catalog.0..=params.catalog.1) as ChunkId;

    (0..num_jobs)
        .map(|id| {
            let reads = rng.gen_range(params.reads_per_job.0..=params.reads_per_job.1);
            let chunks: Vec<ChunkId> = (0..reads)
                .map(|_| rng.gen_range(0..catalog))
                .collect();
            let deadline = rng.gen_range(params.deadlines.0..=params.deadlines.1);
            Job::new(id as u32, deadline, chunks)
        })
        .collect()
}
