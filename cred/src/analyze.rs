use crate::helpe::*;

/// Checks a finished allocation of `jobs` against every invariant
/// `cred` promises. Returns the first violation found.
///
/// Meant for a [Cluster] on which [`Cluster::cred_m`] has run to
/// completion; use [`check_machines`] for one still in flight.
pub fn audit(cluster: &Cluster, jobs: &JobSet) -> Result<(), AuditError> {
    check_machines(cluster)?;
    check_conservation(cluster, jobs)
}

/// The invariants that hold at any point of a run:
/// - machine ids are strictly increasing
/// - no machine grants more than its capacity, and its remaining
///   slots are exactly what was not granted
/// - every placement sits on a known machine
/// - no allocation round hands more than `B` distinct chunks
///   to one machine
pub fn check_machines(cluster: &Cluster) -> Result<(), AuditError> {
    for (prev, next) in cluster.machine_ids().into_iter().tuple_windows() {
        if next <= prev {
            return Err(AuditError::IdOrder { prev, next });
        }
    }

    let mut booked: HashMap<MachineId, Slots> = HashMap::new();
    for (&(chunk, deadline), hosts) in cluster.placements() {
        for (&machine, &slots) in hosts {
            if cluster.machine(machine).is_none() {
                return Err(AuditError::UnknownMachine { chunk, deadline, machine });
            }
            *booked.entry(machine).or_insert(0) += slots;
        }
    }
    for m in cluster.machines() {
        let granted = booked.get(&m.id).copied().unwrap_or(0);
        if granted > m.capacity {
            return Err(AuditError::Overcommitted {
                machine:    m.id,
                capacity:   m.capacity,
                granted,
            });
        }
        if m.remaining != m.capacity - granted {
            return Err(AuditError::LedgerMismatch {
                machine:    m.id,
                capacity:   m.capacity,
                granted,
                remaining:  m.remaining,
            });
        }
    }

    let limit = cluster.config().max_chunks();
    for round in cluster.rounds()
        .iter()
        .filter(|r| r.kind == RoundKind::Allocate) {
        let distinct = round.granted
            .iter()
            .map(|(chunk, _)| chunk)
            .unique()
            .count();
        if distinct > limit {
            return Err(AuditError::ChunkCap {
                machine:    round.machine,
                deadline:   round.window.deadline,
                distinct,
                limit,
            });
        }
    }

    Ok(())
}

/// Every (chunk, deadline) got exactly the slots its deadline group
/// asked for: nothing lost, nothing granted twice.
pub fn check_conservation(cluster: &Cluster, jobs: &JobSet) -> Result<(), AuditError> {
    let groups = aggregate_all(jobs);
    for (&deadline, group) in &groups {
        for (&chunk, &wanted) in group {
            let granted = cluster.granted(chunk, deadline);
            if granted != wanted {
                return Err(AuditError::Conservation { chunk, deadline, wanted, granted });
            }
        }
    }
    // Nor any grant nobody asked for.
    for (&(chunk, deadline), hosts) in cluster.placements() {
        let wanted = groups
            .get(&deadline)
            .and_then(|g| g.get(&chunk))
            .copied()
            .unwrap_or(0);
        if wanted == 0 {
            return Err(AuditError::Conservation {
                chunk,
                deadline,
                wanted,
                granted: hosts.values().sum(),
            });
        }
    }

    Ok(())
}
