pub use std::{
    io::{BufRead, BufReader},
    collections::{BTreeMap, BTreeSet, HashMap},
    path::PathBuf,
    ops::Range,
    time::Instant,
    fmt,
};
pub use thiserror::Error;
pub use itertools::Itertools;
pub use rayon::prelude::*;
pub use indexmap::IndexMap;
pub use clap::{Parser, ValueEnum};
pub use tracing::{debug, info, trace, warn};

pub use crate::{Cluster, DataChunk, Job,
    algo::select_window,
    jobset::*,
};

/// The unit of machine work. A machine supplies `S` slots per unit
/// of logical time, and serving one unit of chunk demand takes one slot.
pub type Slots = usize;

/// Logical time. Deadlines are positive; `0` is the start of the run.
pub type Deadline = usize;

pub type ChunkId = u32;

/// Machine ids start at 1 and are handed out in increasing order.
/// They are never reused.
pub type MachineId = u32;

/// The gatekept input of the allocator. See [`init`].
pub type JobSet = Vec<Job>;

/// Outstanding demand for one chunk: how many slots it still needs
/// within the deadline group being processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkDemand {
    pub count:  Slots,
    pub chunk:  ChunkId,
}

impl ChunkDemand {
    pub fn new(chunk: ChunkId, count: Slots) -> Self {
        Self { count, chunk }
    }
}

impl fmt::Display for ChunkDemand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.chunk, self.count)
    }
}

pub type DemandList = Vec<ChunkDemand>;

/// The time frame a placement belongs to.
///
/// Grants are recorded under the absolute [`deadline`](Window::deadline).
/// The [`span`](Window::span) is the time elapsed since the previously
/// processed deadline, and it sizes the machines created for the window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Window {
    pub deadline:   Deadline,
    pub span:       Deadline,
}

impl Window {
    pub fn new(deadline: Deadline, span: Deadline) -> Self {
        debug_assert!(span <= deadline, "Window reaches before time 0");
        Self { deadline, span }
    }

    /// A window covering the whole of `[0, deadline]`.
    pub fn whole(deadline: Deadline) -> Self {
        Self::new(deadline, deadline)
    }
}

/// The two knobs of the allocator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    // S
    slots:      Slots,
    // B
    max_chunks: usize,
}

impl Config {
    /// Both `slots` (`S`) and `max_chunks` (`B`) must be positive,
    /// else the allocator could never make progress.
    pub fn new(slots: Slots, max_chunks: usize) -> Result<Self, ConfigError> {
        if slots == 0 {
            Err(ConfigError::ZeroSlots)
        } else if max_chunks == 0 {
            Err(ConfigError::ZeroChunkLimit)
        } else {
            Ok(Self { slots, max_chunks })
        }
    }

    pub fn slots(&self) -> Slots {
        self.slots
    }

    pub fn max_chunks(&self) -> usize {
        self.max_chunks
    }

    /// Slots offered by a machine living through `span` time units.
    ///
    /// Saturates at `Slots::MAX`. Inputs from outside should go through
    /// [`checked_capacity`](Config::checked_capacity) first.
    #[inline(always)]
    pub fn capacity(&self, span: Deadline) -> Slots {
        self.slots.saturating_mul(span)
    }

    /// Like [`capacity`](Config::capacity), but fails if `S * span` does
    /// not fit in [`Slots`].
    pub fn checked_capacity(&self, span: Deadline) -> Result<Slots, ConfigError> {
        self.slots
            .checked_mul(span)
            .ok_or(ConfigError::CapacityOverflow { slots: self.slots, span })
    }
}

/// A host for chunks. Its [`capacity`](Machine::capacity) is fixed at
/// creation; [`remaining`](Machine::remaining) only goes down.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Machine {
    pub id:         MachineId,
    pub capacity:   Slots,
    pub remaining:  Slots,
    /// Every chunk that was ever granted slots here, for any deadline.
    pub chunks:     BTreeSet<ChunkId>,
}

impl Machine {
    pub fn new(id: MachineId, capacity: Slots) -> Self {
        Self {
            id,
            capacity,
            remaining:  capacity,
            chunks:     BTreeSet::new(),
        }
    }

    #[inline(always)]
    pub fn granted(&self) -> Slots {
        self.capacity - self.remaining
    }

    #[inline(always)]
    pub fn is_exhausted(&self) -> bool {
        self.remaining == 0
    }

    #[inline(always)]
    pub fn hosts(&self, chunk: ChunkId) -> bool {
        self.chunks.contains(&chunk)
    }
}

/// For each (chunk, deadline), the machines serving it and the slots
/// each one granted. The inner map's keys are the hosting machines.
pub type PlacementTable = BTreeMap<(ChunkId, Deadline), IndexMap<MachineId, Slots>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundKind {
    /// Demand of the deadline currently being allocated.
    Allocate,
    /// Demand of a later deadline, packed early into idle capacity.
    PreStage,
}

/// What a single packer call granted on one machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackRound {
    pub machine:    MachineId,
    pub window:     Window,
    pub kind:       RoundKind,
    pub granted:    Vec<(ChunkId, Slots)>,
}

//---START ERRORS
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    #[error("slot multiplier S must be positive")]
    ZeroSlots,
    #[error("per-machine chunk limit B must be positive")]
    ZeroChunkLimit,
    #[error("{slots} slots over {span} time units overflow a machine's capacity")]
    CapacityOverflow {
        slots:  Slots,
        span:   Deadline,
    },
}

#[derive(Error, Debug)]
/// Appears while constructing the [JobSet] to be allocated.
pub enum JobError {
    #[error("No jobs to allocate!")]
    Empty,
    #[error("{message}\n{culprit:?}")]
    Invalid {
        message: String,
        culprit: Job,
    },
}

#[derive(Error, Debug)]
pub enum InputError {
    #[error("could not read workload: {0}")]
    Io(#[from] std::io::Error),
    #[error("line {line}: {reason}")]
    Malformed {
        line:   usize,
        reason: String,
    },
    #[error(transparent)]
    Job(#[from] JobError),
}

/// A broken invariant, as found by [`crate::analyze::audit`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuditError {
    #[error("machine {machine}: {granted} slots granted out of a capacity of {capacity}")]
    Overcommitted {
        machine:    MachineId,
        capacity:   Slots,
        granted:    Slots,
    },
    #[error("machine {machine}: {remaining} slots remaining, but {capacity} - {granted} expected")]
    LedgerMismatch {
        machine:    MachineId,
        capacity:   Slots,
        granted:    Slots,
        remaining:  Slots,
    },
    #[error("machine ids out of order: {next} created after {prev}")]
    IdOrder {
        prev:   MachineId,
        next:   MachineId,
    },
    #[error("chunk {chunk} placed at deadline {deadline} on unknown machine {machine}")]
    UnknownMachine {
        chunk:      ChunkId,
        deadline:   Deadline,
        machine:    MachineId,
    },
    #[error("machine {machine} got {distinct} distinct chunks in one round at deadline {deadline} (limit {limit})")]
    ChunkCap {
        machine:    MachineId,
        deadline:   Deadline,
        distinct:   usize,
        limit:      usize,
    },
    #[error("chunk {chunk} at deadline {deadline}: {granted} slots granted, {wanted} wanted")]
    Conservation {
        chunk:      ChunkId,
        deadline:   Deadline,
        wanted:     Slots,
        granted:    Slots,
    },
}
//---END ERRORS

//---START EXTERNAL INTERFACES
// The types listed below read workloads from files.
//
// To support another source, simply make sure that it
// satisfies the `JobGen` trait.

/// A job as read from a file: its deadline and chunk ids.
pub type RawJob = (Deadline, Vec<ChunkId>);

/// Defines the interface for reading jobs.
pub trait JobGen<T> {
    fn new(path: PathBuf) -> Self;
    /// Reads every job in the source, unvalidated.
    fn read_jobs(&self) -> Result<Vec<Job>, InputError>;
    /// Uses some available data to spawn one [Job].
    fn gen_single(&self, d: T, id: u32) -> Job;
}

/// Parses one CSV field, blaming `line` on failure.
fn parse_field<T: std::str::FromStr>(
    raw:    &str,
    line:   usize,
    what:   &str,
) -> Result<T, InputError> {
    let raw = raw.trim();
    raw.parse()
        .map_err(|_| InputError::Malformed {
            line,
            reason: format!("bad {what} `{raw}`"),
        })
}

/// Yields (line number, content) of every non-blank data line,
/// skipping the header.
fn data_lines(path: &PathBuf) -> Result<Vec<(usize, String)>, InputError> {
    let reader = BufReader::new(std::fs::File::open(path)?);
    let mut res = vec![];
    for (idx, line) in reader.lines().enumerate().skip(1) {
        let line = line?;
        if !line.trim().is_empty() {
            res.push((idx + 1, line));
        }
    }

    Ok(res)
}

/// One job per row: `job_id,deadline,chunks`, the last field being
/// a space- or semicolon-separated list of chunk ids. The first line
/// is a header.
pub struct JobCSVParser {
    pub path: PathBuf,
}

impl JobGen<RawJob> for JobCSVParser {
    fn new(path: PathBuf) -> Self {
        Self { path }
    }

    fn read_jobs(&self) -> Result<Vec<Job>, InputError> {
        let mut res = vec![];
        for (line, content) in data_lines(&self.path)? {
            let fields: Vec<&str> = content.splitn(3, ',').collect();
            if fields.len() != 3 {
                return Err(InputError::Malformed {
                    line,
                    reason: format!("expected 3 fields, found {}", fields.len()),
                });
            }
            let id = parse_field(fields[0], line, "job id")?;
            let deadline = parse_field(fields[1], line, "deadline")?;
            let chunks = fields[2]
                .split(|c: char| c == ';' || c.is_whitespace())
                .filter(|s| !s.is_empty())
                .map(|s| parse_field(s, line, "chunk id"))
                .collect::<Result<Vec<ChunkId>, _>>()?;
            res.push(self.gen_single((deadline, chunks), id));
        }

        Ok(res)
    }

    fn gen_single(&self, (deadline, chunks): RawJob, id: u32) -> Job {
        Job::new(id, deadline, chunks)
    }
}

/// One chunk access per row: `job_id,deadline,chunk_id`, as found
/// in workload traces. Rows are grouped into jobs by id, in order of
/// first appearance. The first line is a header.
pub struct TraceCSVParser {
    pub path: PathBuf,
}

impl JobGen<RawJob> for TraceCSVParser {
    fn new(path: PathBuf) -> Self {
        Self { path }
    }

    fn read_jobs(&self) -> Result<Vec<Job>, InputError> {
        let mut grouped: IndexMap<u32, RawJob> = IndexMap::new();
        for (line, content) in data_lines(&self.path)? {
            let fields: Vec<&str> = content.split(',').collect();
            if fields.len() != 3 {
                return Err(InputError::Malformed {
                    line,
                    reason: format!("expected 3 fields, found {}", fields.len()),
                });
            }
            let id: u32 = parse_field(fields[0], line, "job id")?;
            let deadline: Deadline = parse_field(fields[1], line, "deadline")?;
            let chunk: ChunkId = parse_field(fields[2], line, "chunk id")?;
            let entry = grouped.entry(id).or_insert((deadline, vec![]));
            if entry.0 != deadline {
                return Err(InputError::Malformed {
                    line,
                    reason: format!("job {id} already has deadline {}", entry.0),
                });
            }
            entry.1.push(chunk);
        }

        Ok(grouped
            .into_iter()
            .map(|(id, d)| self.gen_single(d, id))
            .collect())
    }

    fn gen_single(&self, (deadline, chunks): RawJob, id: u32) -> Job {
        Job::new(id, deadline, chunks)
    }
}

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum, Debug)]
pub enum InputFormat {
    /// A CSV file with one job per row (job_id,deadline,chunk ids)
    Jobs,
    /// A CSV file with one chunk access per row (job_id,deadline,chunk_id)
    Trace,
}

pub fn read_from_path<T, D>(file_path: PathBuf) -> Result<JobSet, InputError>
where T: JobGen<D> {
    let parser = T::new(file_path);
    let jobs = parser.read_jobs()?;
    let set = crate::jobset::init(jobs)?;

    Ok(set)
}
//---END EXTERNAL INTERFACES

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_tmp(name: &str, content: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("cred-{}-{name}", std::process::id()));
        let mut fd = std::fs::File::create(&path).unwrap();
        fd.write_all(content.as_bytes()).unwrap();
        path
    }

    #[test]
    fn test_config_rejects_zero_knobs() {
        assert_eq!(Config::new(0, 4), Err(ConfigError::ZeroSlots));
        assert_eq!(Config::new(4, 0), Err(ConfigError::ZeroChunkLimit));
        let cfg = Config::new(4, 128).unwrap();
        assert_eq!(cfg.capacity(3), 12);
    }

    #[test]
    fn test_capacity_overflow_is_rejected() {
        let cfg = Config::new(4, 128).unwrap();
        assert_eq!(cfg.checked_capacity(3), Ok(12));

        let huge = Config::new(Slots::MAX / 2 + 1, 1).unwrap();
        assert_eq!(huge.checked_capacity(1), Ok(Slots::MAX / 2 + 1));
        assert_eq!(
            huge.checked_capacity(2),
            Err(ConfigError::CapacityOverflow { slots: Slots::MAX / 2 + 1, span: 2 })
        );
        assert_eq!(huge.capacity(2), Slots::MAX);
    }

    #[test]
    fn test_job_csv() {
        let path = write_tmp("jobs.csv", "id,deadline,chunks\n0,3,1 2 2\n\n7,1,5;6\n");
        let jobs = JobCSVParser::new(path.clone()).read_jobs().unwrap();
        std::fs::remove_file(path).unwrap();

        assert_eq!(jobs.len(), 2);
        assert_eq!(jobs[0].deadline, 3);
        assert_eq!(jobs[0].chunk_ids().collect::<Vec<_>>(), vec![1, 2, 2]);
        assert_eq!(jobs[1].id, 7);
        assert_eq!(jobs[1].chunk_ids().collect::<Vec<_>>(), vec![5, 6]);
    }

    #[test]
    fn test_job_csv_reports_line() {
        let path = write_tmp("bad.csv", "id,deadline,chunks\n0,3,1\n1,x,2\n");
        let err = JobCSVParser::new(path.clone()).read_jobs().unwrap_err();
        std::fs::remove_file(path).unwrap();

        match err {
            InputError::Malformed { line, .. } => assert_eq!(line, 3),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_trace_csv_groups_by_job() {
        let path = write_tmp("trace.csv", "job,deadline,chunk\n4,2,9\n1,5,3\n4,2,8\n");
        let jobs = TraceCSVParser::new(path.clone()).read_jobs().unwrap();
        std::fs::remove_file(path).unwrap();

        assert_eq!(jobs.len(), 2);
        assert_eq!(jobs[0].id, 4);
        assert_eq!(jobs[0].chunk_ids().collect::<Vec<_>>(), vec![9, 8]);
        assert_eq!(jobs[1].deadline, 5);
    }

    #[test]
    fn test_trace_csv_conflicting_deadline() {
        let path = write_tmp("conflict.csv", "job,deadline,chunk\n4,2,9\n4,3,8\n");
        let res = TraceCSVParser::new(path.clone()).read_jobs();
        std::fs::remove_file(path).unwrap();

        assert!(matches!(res, Err(InputError::Malformed { line: 3, .. })));
    }

    #[test]
    fn test_read_from_path_gatekeeps() {
        let path = write_tmp("zero.csv", "id,deadline,chunks\n0,0,1\n");
        let res = read_from_path::<JobCSVParser, RawJob>(path.clone());
        std::fs::remove_file(path).unwrap();

        assert!(matches!(res, Err(InputError::Job(JobError::Invalid { .. }))));
    }
}
