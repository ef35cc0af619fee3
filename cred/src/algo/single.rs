use crate::helpe::*;

impl Cluster {
    /// Finds machines for every slot of `demand`, a single deadline
    /// group. Returns the number of machines alive afterwards.
    ///
    /// Existing machines are tried first, oldest first. Whatever they
    /// cannot absorb goes to a new machine of `S * window.span` slots.
    /// When more than `B` distinct chunks are outstanding, each machine
    /// is handed only a window of them (see [`select_window`]) whose
    /// load is sized by `virtual_deadline`.
    ///
    /// Demand with no positive count returns 0 and touches nothing.
    /// Panics on a zero-span window.
    pub fn cred_s(
        &mut self,
        demand:             DemandList,
        virtual_deadline:   Slots,
        window:             Window,
    ) -> usize {
        // Ties in demand are broken by input position.
        let rank: HashMap<ChunkId, usize> = demand.iter()
            .enumerate()
            .map(|(pos, d)| (d.chunk, pos))
            .collect();
        let mut outstanding: DemandList = demand.into_iter()
            .filter(|d| d.count > 0)
            .collect();
        if outstanding.is_empty() { return 0; }
        // A zero-slot machine could never take anything.
        assert!(window.span > 0, "Empty window at deadline {}", window.deadline);
        debug!(
            deadline = window.deadline,
            span = window.span,
            virtual_deadline,
            "allocating {}",
            outstanding.iter().join(" ")
        );

        // Every pass either drains a machine's budget or some chunk's
        // demand, and a fresh machine always takes at least one slot.
        while !outstanding.is_empty() {
            for id in self.machine_ids() {
                if outstanding.is_empty() { break; }
                outstanding = self.pack_round(outstanding, &rank, id, virtual_deadline, window);
            }
            if !outstanding.is_empty() {
                let id = self.spawn_machine(self.config.capacity(window.span));
                outstanding = self.pack_round(outstanding, &rank, id, virtual_deadline, window);
            }
        }

        self.len()
    }

    /// Offers one machine its share of `outstanding`: everything if
    /// the distinct-chunk limit allows it, a window otherwise.
    /// Returns the new outstanding list.
    fn pack_round(
        &mut self,
        mut outstanding:    DemandList,
        rank:               &HashMap<ChunkId, usize>,
        machine:            MachineId,
        virtual_deadline:   Slots,
        window:             Window,
    ) -> DemandList {
        let budget = self.remaining(machine);
        if budget == 0 { return outstanding; }

        // Biggest demand first.
        outstanding.sort_by_key(|d| (std::cmp::Reverse(d.count), rank[&d.chunk]));
        let limit = self.config.max_chunks();
        if outstanding.len() <= limit {
            return self.schedule(outstanding, budget, machine, window);
        }

        let bin = select_window(&outstanding, limit, virtual_deadline);
        trace!(machine, from = bin.start, to = bin.end, "window selected");
        let picked: DemandList = outstanding.drain(bin).collect();
        let leftover = self.schedule(picked, budget, machine, window);
        outstanding.extend(leftover);

        outstanding
    }
}

/// Picks which entries of `demand` (sorted by decreasing count) to
/// pack together on one machine, given that it may host at most
/// `limit` distinct chunks and should be loaded up to `target` slots.
///
/// Starting from the `limit` lightest entries, the window slides one
/// entry at a time toward the heavy end while its load is under
/// `target`. The tail is then trimmed for as long as the load stays
/// at or above `target`. The result is the shortest prefix of the
/// slid window that reaches `target`, or the whole window if even
/// the head cannot.
pub fn select_window(demand: &[ChunkDemand], limit: usize, target: Slots) -> Range<usize> {
    let n = demand.len();
    if n <= limit { return 0..n; }

    let (mut lo, mut hi) = (n - limit, n);
    let mut load: Slots = demand[lo..hi].iter().map(|d| d.count).sum();
    while load < target && lo > 0 {
        lo -= 1;
        load += demand[lo].count;
        hi -= 1;
        load -= demand[hi].count;
    }
    while hi - lo > 1 && load - demand[hi - 1].count >= target {
        hi -= 1;
        load -= demand[hi].count;
    }

    lo..hi
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cluster(slots: Slots, max_chunks: usize) -> Cluster {
        Cluster::new(Config::new(slots, max_chunks).unwrap())
    }

    fn counts(list: &[Slots]) -> DemandList {
        list.iter()
            .enumerate()
            .map(|(chunk, &count)| ChunkDemand::new(chunk as ChunkId, count))
            .collect()
    }

    #[test]
    fn test_empty_demand() {
        let mut c = cluster(2, 10);
        assert_eq!(c.cred_s(vec![], 4, Window::whole(2)), 0);
        assert!(c.is_empty());
    }

    #[test]
    fn test_all_zero_demand_is_noop() {
        let mut c = cluster(2, 10);
        let warm = c.spawn_machine(8);
        let n = c.cred_s(vec![ChunkDemand::new(1, 0), ChunkDemand::new(2, 0)], 4, Window::whole(2));

        assert_eq!(n, 0);
        assert_eq!(c.machine_ids(), vec![warm]);
        assert_eq!(c.remaining(warm), 8);
        assert!(c.placements().is_empty());
        assert!(c.rounds().is_empty());
    }

    #[test]
    fn test_single_chunk_fits_one_machine() {
        // S = 2, deadline 2: capacity 4 covers a demand of 3.
        let mut c = cluster(2, 10);
        let n = c.cred_s(vec![ChunkDemand::new(0, 3)], 4, Window::whole(2));

        assert_eq!(n, 1);
        assert_eq!(c.grant_on(0, 2, 1), Some(3));
        assert_eq!(c.remaining(1), 1);
    }

    #[test]
    fn test_capacity_overflow_spawns_machine() {
        // S = 1, deadline 1: each machine serves a single slot.
        let mut c = cluster(1, 2);
        let n = c.cred_s(counts(&[1, 1]), 1, Window::whole(1));

        assert_eq!(n, 2);
        assert_eq!(c.hosts(0, 1).len() + c.hosts(1, 1).len(), 2);
        assert!(c.machines().all(|m| m.is_exhausted()));
    }

    #[test]
    fn test_demand_spans_machines() {
        let mut c = cluster(2, 10);
        let n = c.cred_s(vec![ChunkDemand::new(9, 7)], 4, Window::whole(2));

        assert_eq!(n, 2);
        assert_eq!(c.hosts(9, 2), vec![1, 2]);
        assert_eq!(c.granted(9, 2), 7);
    }

    #[test]
    fn test_existing_machines_reused_first() {
        let mut c = cluster(2, 10);
        let warm = c.spawn_machine(8);
        let n = c.cred_s(counts(&[3, 2]), 4, Window::whole(2));

        assert_eq!(n, 1);
        assert_eq!(c.hosts(0, 2), vec![warm]);
        assert_eq!(c.remaining(warm), 3);
    }

    #[test]
    fn test_window_fits_under_limit() {
        assert_eq!(select_window(&counts(&[5, 4, 3]), 3, 100), 0..3);
    }

    #[test]
    fn test_window_tail_already_enough() {
        // Trailing two carry 2 + 1 >= 2; trimming keeps just the 2.
        assert_eq!(select_window(&counts(&[5, 4, 3, 2, 1]), 2, 2), 3..4);
    }

    #[test]
    fn test_window_slides_toward_heavy_end() {
        let demand = counts(&[9, 6, 4, 2, 1, 1]);
        // [2, 1, 1] = 4 < 8, slide: [4, 2, 1] = 7, slide: [6, 4, 2] = 12,
        // then trim the 2: [6, 4] = 10 >= 8, trimming the 4 would not.
        let bin = select_window(&demand, 3, 8);
        assert_eq!(bin, 1..3);
    }

    #[test]
    fn test_window_stops_at_head() {
        let demand = counts(&[2, 1, 1, 1]);
        assert_eq!(select_window(&demand, 2, 50), 0..2);
    }

    #[test]
    fn test_many_chunks_respect_limit() {
        let mut c = cluster(4, 10);
        let demand: DemandList = (0..15)
            .map(|chunk| ChunkDemand::new(chunk, 1 + (chunk as Slots % 3)))
            .collect();
        let total: Slots = demand.iter().map(|d| d.count).sum();
        c.cred_s(demand, 8, Window::whole(2));

        assert!(c.len() >= 2);
        for round in c.rounds() {
            assert!(round.granted.len() <= 10);
        }
        let granted: Slots = (0..15).map(|chunk| c.granted(chunk, 2)).sum();
        assert_eq!(granted, total);
    }
}
