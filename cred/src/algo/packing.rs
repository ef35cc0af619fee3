use crate::helpe::*;

impl Cluster {
    /// Packs as much of `demand` as possible into `budget` slots of
    /// `machine`, recording grants under `window.deadline`. Returns
    /// the entries that still carry demand, in packing order.
    ///
    /// Entries are served smallest-first: the more chunks we clear
    /// entirely, the faster the working set shrinks. A chunk that is
    /// already placed on `machine` for this deadline is skipped, so
    /// calling this twice never double-grants.
    ///
    /// A zero budget returns `demand` untouched.
    pub fn schedule(
        &mut self,
        demand:     DemandList,
        budget:     Slots,
        machine:    MachineId,
        window:     Window,
    ) -> DemandList {
        self.pack(demand, budget, machine, window, RoundKind::Allocate)
    }

    pub(crate) fn pack(
        &mut self,
        mut demand: DemandList,
        mut budget: Slots,
        machine:    MachineId,
        window:     Window,
        kind:       RoundKind,
    ) -> DemandList {
        if budget == 0 { return demand; }
        if self.machine(machine).is_none() {
            warn!(machine, "packing onto unknown machine ignored");
            return demand;
        }
        debug!(
            machine,
            deadline = window.deadline,
            span = window.span,
            budget,
            ?kind,
            "packing {}",
            demand.iter().join(" ")
        );

        // Stable, so equal demands keep their relative order.
        demand.sort_by_key(|d| d.count);
        let mut round = PackRound {
            machine,
            window,
            kind,
            granted: vec![],
        };
        for d in demand.iter_mut() {
            if budget == 0 { break; }
            if self.is_placed(d.chunk, window.deadline, machine) {
                trace!(machine, chunk = d.chunk, "already placed, skipping");
                continue;
            }
            if d.count == 0 { continue; }
            if self.remaining(machine) == 0 {
                trace!(machine, "machine is full");
                break;
            }
            let give = d.count
                .min(self.remaining(machine))
                .min(budget);
            self.grant(d.chunk, window.deadline, machine, give);
            d.count -= give;
            budget -= give;
            round.granted.push((d.chunk, give));
            debug!(
                machine,
                chunk = d.chunk,
                slots = give,
                left = d.count,
                machine_left = self.remaining(machine),
                "granted"
            );
        }
        self.log_round(round);

        demand.into_iter()
            .filter(|d| d.count > 0)
            .collect()
    }
}
