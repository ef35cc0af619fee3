use crate::helpe::*;

impl Cluster {
    /// Creates a new, machine-less [Cluster].
    pub fn new(config: Config) -> Self {
        Self {
            config,
            machines:   IndexMap::new(),
            next_id:    1,
            placements: BTreeMap::new(),
            rounds:     vec![],
            active:     0,
        }
    }

    pub fn config(&self) -> Config {
        self.config
    }

    /// Brings up a new machine offering `capacity` slots and returns
    /// its id. Ids are strictly increasing.
    ///
    /// The allocator calls this whenever existing machines cannot
    /// absorb the demand at hand. Callers may also use it before
    /// [`Cluster::cred_m`] to seed warm machines.
    pub fn spawn_machine(&mut self, capacity: Slots) -> MachineId {
        let id = self.next_id;
        self.next_id += 1;
        self.machines.insert(id, Machine::new(id, capacity));
        debug!(machine = id, capacity, "new machine");

        id
    }

    pub fn machine(&self, id: MachineId) -> Option<&Machine> {
        self.machines.get(&id)
    }

    /// All machines, oldest first.
    pub fn machines(&self) -> impl Iterator<Item = &Machine> {
        self.machines.values()
    }

    #[inline(always)]
    pub fn machine_ids(&self) -> Vec<MachineId> {
        self.machines.keys().copied().collect()
    }

    /// Number of machines created so far.
    #[inline(always)]
    pub fn len(&self) -> usize {
        self.machines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.machines.is_empty()
    }

    /// `N_a`: the machine count as of the last deadline processed
    /// by [`Cluster::cred_m`].
    pub fn active(&self) -> usize {
        self.active
    }

    pub(crate) fn set_active(&mut self, n: usize) {
        self.active = n;
    }

    /// Unused slots on machine `id`; zero for unknown machines.
    #[inline(always)]
    pub fn remaining(&self, id: MachineId) -> Slots {
        self.machines
            .get(&id)
            .map_or(0, |m| m.remaining)
    }

    pub fn placements(&self) -> &PlacementTable {
        &self.placements
    }

    pub fn rounds(&self) -> &[PackRound] {
        &self.rounds
    }

    /// The machines serving `chunk` for `deadline`, in grant order.
    pub fn hosts(&self, chunk: ChunkId, deadline: Deadline) -> Vec<MachineId> {
        self.placements
            .get(&(chunk, deadline))
            .map_or(vec![], |m| m.keys().copied().collect())
    }

    #[inline(always)]
    pub fn is_placed(&self, chunk: ChunkId, deadline: Deadline, machine: MachineId) -> bool {
        self.placements
            .get(&(chunk, deadline))
            .is_some_and(|m| m.contains_key(&machine))
    }

    /// Slots granted to `chunk` on `machine` for `deadline`.
    pub fn grant_on(&self, chunk: ChunkId, deadline: Deadline, machine: MachineId) -> Option<Slots> {
        self.placements
            .get(&(chunk, deadline))
            .and_then(|m| m.get(&machine))
            .copied()
    }

    /// Slots granted to `chunk` for `deadline`, over all machines.
    #[inline(always)]
    pub fn granted(&self, chunk: ChunkId, deadline: Deadline) -> Slots {
        self.placements
            .get(&(chunk, deadline))
            .map_or(0, |m| m.values().sum())
    }

    /// What is left of an aggregated deadline group once earlier
    /// grants (pre-staging included) are taken out. Fully served
    /// chunks are dropped; the rest keep chunk id order.
    pub fn residual(&self, group: &BTreeMap<ChunkId, Slots>, deadline: Deadline) -> DemandList {
        group.iter()
            .map(|(&chunk, &wanted)| {
                ChunkDemand::new(chunk, wanted.saturating_sub(self.granted(chunk, deadline)))
            })
            .filter(|d| d.count > 0)
            .collect()
    }

    /// Books `slots` of `machine` for `chunk` under `deadline`.
    ///
    /// Callers must make sure the machine exists and has the slots.
    pub(crate) fn grant(
        &mut self,
        chunk:      ChunkId,
        deadline:   Deadline,
        machine:    MachineId,
        slots:      Slots,
    ) {
        let Some(m) = self.machines.get_mut(&machine) else {
            unreachable!("Grant on unknown machine {machine}");
        };
        debug_assert!(slots > 0 && slots <= m.remaining, "Bad grant requested");
        m.remaining -= slots;
        m.chunks.insert(chunk);
        *self.placements
            .entry((chunk, deadline))
            .or_default()
            .entry(machine)
            .or_insert(0) += slots;
    }

    pub(crate) fn log_round(&mut self, round: PackRound) {
        if !round.granted.is_empty() {
            self.rounds.push(round);
        }
    }
}

impl fmt::Display for Cluster {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Machines:")?;
        for m in self.machines() {
            writeln!(
                f,
                "  #{:<4} {:>6}/{:<6} slots used\tchunks: {}",
                m.id,
                m.granted(),
                m.capacity,
                m.chunks.iter().join(" ")
            )?;
        }
        writeln!(f, "Placements (chunk @ deadline -> machine:slots):")?;
        for ((chunk, deadline), hosts) in &self.placements {
            writeln!(
                f,
                "  {chunk} @ {deadline} -> {}",
                hosts.iter()
                    .map(|(m, s)| format!("{m}:{s}"))
                    .join(", ")
            )?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cluster() -> Cluster {
        Cluster::new(Config::new(2, 4).unwrap())
    }

    #[test]
    fn test_ids_start_at_one_and_increase() {
        let mut c = cluster();
        assert!(c.is_empty());
        assert_eq!(c.spawn_machine(4), 1);
        assert_eq!(c.spawn_machine(6), 2);
        assert_eq!(c.machine_ids(), vec![1, 2]);
        assert_eq!(c.remaining(2), 6);
        assert_eq!(c.remaining(9), 0);
    }

    #[test]
    fn test_grant_updates_both_views() {
        let mut c = cluster();
        let m = c.spawn_machine(5);
        c.grant(7, 3, m, 2);

        assert_eq!(c.remaining(m), 3);
        assert!(c.machine(m).unwrap().hosts(7));
        assert!(c.is_placed(7, 3, m));
        assert!(!c.is_placed(7, 4, m));
        assert_eq!(c.grant_on(7, 3, m), Some(2));
        assert_eq!(c.hosts(7, 3), vec![m]);
        assert_eq!(c.granted(7, 3), 2);
        assert_eq!(c.granted(7, 4), 0);
    }

    #[test]
    fn test_residual_subtracts_grants() {
        let mut c = cluster();
        let m = c.spawn_machine(5);
        c.grant(1, 3, m, 2);
        c.grant(2, 3, m, 3);
        let group = BTreeMap::from([(1, 4), (2, 3), (5, 1)]);

        assert_eq!(
            c.residual(&group, 3),
            vec![ChunkDemand::new(1, 2), ChunkDemand::new(5, 1)]
        );
    }

    #[test]
    fn test_report_lists_placements() {
        let mut c = cluster();
        let m = c.spawn_machine(5);
        c.grant(1, 3, m, 2);
        let report = c.to_string();

        assert!(report.contains("1 @ 3 -> 1:2"));
        assert!(report.contains("2/5"));
    }
}
