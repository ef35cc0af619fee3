use crate::helpe::*;

/// Initializes a [JobSet] with a given set of jobs.
/// A successfully returned [JobSet] is guaranteed to be
/// compliant with all of `cred`'s assumptions. These are:
/// - there is at least one job
/// - no job has a zero deadline
/// - every chunk costs exactly one slot
///
/// This function is the gatekeeper to the rest of the library.
pub fn init(mut in_jobs: Vec<Job>) -> Result<JobSet, JobError> {
    if in_jobs.is_empty() {
        return Err(JobError::Empty);
    }
    let offence = in_jobs.iter()
        .enumerate()
        .find_map(|(idx, j)| {
            if j.deadline == 0 {
                Some((idx, "Job with 0 deadline found!"))
            } else if j.chunks.iter().any(|c| c.cost != 1) {
                Some((idx, "Chunk with non-unit cost found!"))
            } else { None }
        });
    if let Some((idx, message)) = offence {
        return Err(JobError::Invalid {
            message: String::from(message),
            culprit: in_jobs.remove(idx),
        });
    }

    Ok(in_jobs)
}

/// The distinct deadlines of `jobs`, in increasing order.
#[inline(always)]
pub fn deadlines(jobs: &JobSet) -> BTreeSet<Deadline> {
    jobs.iter()
        .map(|j| j.deadline)
        .collect()
}

/// Aggregates the demand of the deadline group `deadline`: for each
/// chunk, the slots needed to serve every read of it by every job due
/// at `deadline`.
#[inline(always)]
pub fn aggregate(jobs: &JobSet, deadline: Deadline) -> BTreeMap<ChunkId, Slots> {
    let mut res = BTreeMap::new();
    for c in jobs.iter()
        .filter(|j| j.is_due_at(deadline))
        .flat_map(|j| j.chunks.iter()) {
        *res.entry(c.id).or_insert(0) += c.cost;
    }

    res
}

/// [`aggregate`] for every deadline at once.
pub fn aggregate_all(jobs: &JobSet) -> BTreeMap<Deadline, BTreeMap<ChunkId, Slots>> {
    deadlines(jobs)
        .into_iter()
        .map(|d| (d, aggregate(jobs, d)))
        .collect()
}

/// Flattens an aggregated group into a [DemandList], in chunk id order.
#[inline(always)]
pub fn demand_list(group: &BTreeMap<ChunkId, Slots>) -> DemandList {
    group.iter()
        .filter(|(_, count)| **count > 0)
        .map(|(chunk, count)| ChunkDemand::new(*chunk, *count))
        .collect()
}

pub fn get_total_demand(jobs: &JobSet) -> Slots {
    jobs.iter().fold(0, |sum, j| sum + j.load())
}
