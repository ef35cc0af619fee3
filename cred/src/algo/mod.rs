pub mod packing;
pub mod single;

pub use single::select_window;

use crate::helpe::*;

/// Per-deadline aggregated demand, as built by [`aggregate_all`].
type Groups = BTreeMap<Deadline, BTreeMap<ChunkId, Slots>>;

impl Cluster {
    /// Allocates machines for the whole of `jobs` and returns `N_a`,
    /// the number of machines needed. The placements stay behind in
    /// the [Cluster] for inspection.
    ///
    /// Deadline groups are processed in increasing order. A group due
    /// at `d` gets the time elapsed since the previous group, so new
    /// machines are sized `S * (d - prev)`. Machines created earlier
    /// stay around with whatever capacity they have left.
    ///
    /// After each group, the machines that served it pre-stage later
    /// demand for chunks they already hold, which saves placing those
    /// chunks elsewhere when the later group comes up.
    pub fn cred_m(&mut self, jobs: &JobSet) -> usize {
        let total_start = Instant::now();
        let groups = aggregate_all(jobs);

        let mut prev = 0;
        for (&d, group) in &groups {
            let window = Window::new(d, d - prev);
            // Pre-staged grants are already served.
            let chunks = self.residual(group, d);
            let temp = self.cred_s(chunks, self.config.capacity(window.span), window);
            self.prestage(temp, d, &groups);
            prev = d;
            self.set_active(self.len());
            info!(
                deadline = d,
                span = window.span,
                machines = self.active(),
                "deadline group allocated"
            );
        }
        info!(
            elapsed_us = total_start.elapsed().as_micros() as u64,
            machines = self.active(),
            "allocation done"
        );

        self.active()
    }

    /// Lets the first `temp` machines use their idle slots on demand
    /// of groups due after `current`, restricted to chunks they already
    /// hold.
    fn prestage(&mut self, temp: usize, current: Deadline, groups: &Groups) {
        let hosts: Vec<MachineId> = self.machine_ids()
            .into_iter()
            .take(temp)
            .collect();
        for n in hosts {
            let mut running_prev = current;
            for (&jt, group) in groups.range(current + 1..) {
                let window = Window::new(jt, jt - running_prev);
                running_prev = jt;
                let Some(machine) = self.machine(n) else { continue; };
                let resident: DemandList = self.residual(group, jt)
                    .into_iter()
                    .filter(|d| machine.hosts(d.chunk))
                    .collect();
                if resident.is_empty() { continue; }
                let budget = self.config
                    .capacity(jt)
                    .saturating_sub(self.remaining(n));
                debug!(machine = n, deadline = jt, budget, "pre-staging");
                self.pack(resident, budget, n, window, RoundKind::PreStage);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cluster(slots: Slots, max_chunks: usize) -> Cluster {
        Cluster::new(Config::new(slots, max_chunks).unwrap())
    }

    #[test]
    fn test_single_group() {
        let jobs = init(vec![Job::new(0, 2, [5, 5, 5])]).unwrap();
        let mut c = cluster(2, 10);

        assert_eq!(c.cred_m(&jobs), 1);
        assert_eq!(c.grant_on(5, 2, 1), Some(3));
        assert_eq!(c.active(), 1);
    }

    #[test]
    fn test_spans_size_new_machines() {
        // Group at 3 gets 3 time units, group at 4 only one.
        let jobs = init(vec![
            Job::new(0, 3, [1]),
            Job::new(1, 4, [2, 2, 2, 2, 2, 2, 2]),
        ]).unwrap();
        let mut c = cluster(2, 10);
        c.cred_m(&jobs);

        let caps: Vec<Slots> = c.machines().map(|m| m.capacity).collect();
        assert_eq!(caps[0], 6);
        assert!(caps[1..].iter().all(|&cap| cap == 2));
        assert_eq!(c.granted(2, 4), 7);
    }

    #[test]
    fn test_prestaging_serves_later_group() {
        // Machine 1 holds chunk 7 after deadline 2 and still has 3
        // idle slots: the later group's 3 reads of chunk 7 fit there.
        let jobs = init(vec![
            Job::new(0, 2, [7]),
            Job::new(1, 3, [7]),
            Job::new(2, 3, [7]),
            Job::new(3, 3, [7]),
        ]).unwrap();
        let mut c = cluster(2, 10);

        assert_eq!(c.cred_m(&jobs), 1);
        assert_eq!(c.grant_on(7, 3, 1), Some(3));
        let staged = c.rounds()
            .iter()
            .find(|r| r.kind == RoundKind::PreStage)
            .unwrap();
        assert_eq!(staged.window, Window::new(3, 1));
        assert_eq!(staged.granted, vec![(7, 3)]);
    }

    #[test]
    fn test_prestaging_skips_foreign_chunks() {
        let jobs = init(vec![
            Job::new(0, 2, [7]),
            Job::new(1, 3, [8]),
        ]).unwrap();
        let mut c = cluster(2, 10);
        c.cred_m(&jobs);

        assert!(c.rounds().iter().all(|r| r.kind == RoundKind::Allocate));
        // Chunk 8 still lands on machine 1, during its own group.
        assert_eq!(c.grant_on(8, 3, 1), Some(1));
    }

    #[test]
    fn test_empty_group_is_skipped() {
        let jobs = init(vec![Job::new(0, 2, []), Job::new(1, 5, [1])]).unwrap();
        let mut c = cluster(1, 10);

        assert_eq!(c.cred_m(&jobs), 1);
        // The empty group still moves the window start forward.
        assert_eq!(c.machine(1).unwrap().capacity, 3);
    }
}
