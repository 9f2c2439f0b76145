use tracing::{debug, warn};

use super::Scheduler;
use crate::limits::MAX_SLOT_SEARCH_STEPS;
use crate::model::*;

impl Scheduler {
    /// Earliest `[t, t + duration)` with `t = search_start + k * step` that
    /// fits inside `[search_start, search_end]` and could be admitted with
    /// `demands`. Nothing is reserved.
    ///
    /// Returns `None` for a non-positive duration or zero step, and without
    /// scanning when the request can never succeed: a constraint violation,
    /// an unknown resource, or a demand larger than the resource's total.
    pub fn find_next_available(
        &self,
        duration: Ms,
        demands: &[ResourceDemand],
        search_start: Ms,
        search_end: Ms,
        step_minutes: u32,
    ) -> Option<Span> {
        if duration <= 0 || step_minutes == 0 {
            return None;
        }
        let step = Ms::from(step_minutes) * MINUTE_MS;

        // Probe event only used to accumulate repeated demands.
        let probe_end = search_start.checked_add(duration)?;
        let mut probe = Event::new("slot search", search_start, probe_end).ok()?;
        for demand in demands {
            probe.push_demand(demand.clone()).ok()?;
        }
        let demands = probe.resources();

        if let Err(e) = self.check_constraints(demands) {
            debug!(reason = %e, "slot search cannot succeed");
            return None;
        }
        for demand in demands {
            match self.catalog.find_by_name(demand.name()) {
                Some(r) if demand.quantity() <= r.quantity => {}
                _ => {
                    debug!(resource = demand.name(), "slot search cannot succeed");
                    return None;
                }
            }
        }

        let mut candidate = search_start;
        let mut steps: usize = 0;
        let found = loop {
            let Some(end) = candidate.checked_add(duration) else {
                break None;
            };
            if end > search_end {
                break None;
            }
            if steps >= MAX_SLOT_SEARCH_STEPS {
                warn!(steps, "slot search gave up");
                break None;
            }
            steps += 1;
            let span = Span::new(candidate, end);
            if self.check_capacity(&span, demands).is_ok() {
                break Some(span);
            }
            let Some(next) = candidate.checked_add(step) else {
                break None;
            };
            candidate = next;
        };

        metrics::histogram!(crate::observability::SLOT_SEARCH_STEPS).record(steps as f64);
        found
    }
}
