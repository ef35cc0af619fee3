//! Welcome to `cred`!
//!
//! Given a batch of jobs, each reading a set of shared data chunks
//! and due by some deadline, `cred` computes how few machines can
//! serve all of them. Every machine offers `S` processing slots per
//! time unit and may host at most `B` distinct chunks in one packing
//! round.
//!
//! The entry point is [`Cluster::cred_m`]. It walks the deadlines in
//! increasing order, sizes each group with [`Cluster::cred_s`] and,
//! in between, pre-stages later demand onto machines that already
//! hold the chunk.

mod job;
mod cluster;

pub mod algo;
pub mod analyze;
pub mod gen;
pub mod jobset;
pub mod helpe;

pub use crate::helpe::*;

/// An indivisible piece of content. Serving one unit of demand for
/// a chunk costs [`cost`](DataChunk::cost) slots, which is always 1:
/// chunks are equally sized, so only their identity matters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DataChunk {
    pub id:     ChunkId,
    pub cost:   Slots,
}

/// Our fundamental unit of input. A [`Job`] reads every chunk in
/// [`chunks`](Job::chunks) (repeats allowed, each occurrence counts)
/// and must be served by logical time [`deadline`](Job::deadline).
///
/// Jobs sharing a deadline form a *deadline group* and are allocated
/// together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    pub chunks:     Vec<DataChunk>,
    pub deadline:   Deadline,
    // Only used for reporting.
    pub id:         u32,
}

/// The allocator context. Everything the algorithm mutates lives
/// here: the machines created so far, their leftover capacity and
/// the placement tables that make up the final answer.
///
/// A [`Cluster`] starts empty (or with a few warm machines, see
/// [`Cluster::spawn_machine`]) and only ever grows. Machines are
/// never destroyed and their capacity only decreases.
#[derive(Debug, Clone)]
pub struct Cluster {
    config:     Config,
    // Insertion order is id order.
    machines:   IndexMap<MachineId, Machine>,
    next_id:    MachineId,
    placements: PlacementTable,
    rounds:     Vec<PackRound>,
    // `N_a`, refreshed after every processed deadline.
    active:     usize,
}
