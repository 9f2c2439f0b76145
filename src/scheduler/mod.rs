mod constraints;
mod error;
mod search;
mod usage;

pub use constraints::{ConstraintViolation, ExclusionConflict, validate};
pub use error::SchedulingError;
pub use usage::{merge_overlapping, saturated_spans, subtract_intervals, usage_segments};

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::catalog::Catalog;
use crate::limits::*;
use crate::model::*;

pub type SharedEvent = Arc<Event>;

/// Events reserving one resource, kept sorted by start (stable for ties).
#[derive(Debug, Clone, Default)]
struct ResourceEvents {
    events: Vec<SharedEvent>,
}

impl ResourceEvents {
    fn insert(&mut self, event: SharedEvent) {
        let pos = self
            .events
            .partition_point(|e| e.start() <= event.start());
        self.events.insert(pos, event);
    }

    fn remove(&mut self, event: &SharedEvent) -> bool {
        if let Some(pos) = self.events.iter().position(|e| Arc::ptr_eq(e, event)) {
            self.events.remove(pos);
            true
        } else {
            false
        }
    }

    /// Only events whose span strictly overlaps the query window.
    fn overlapping(&self, query: &Span) -> impl Iterator<Item = &SharedEvent> {
        // Everything at index >= right_bound starts at or after query.end → can't overlap.
        let right_bound = self
            .events
            .partition_point(|e| e.start() < query.end);
        self.events[..right_bound]
            .iter()
            .filter(move |e| e.end() > query.start)
    }

    fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

/// The reservation engine: catalog + three event indices.
///
/// All methods are synchronous and assume a single owner; callers that share
/// a scheduler serialize access themselves (see [`crate::planner::Planner`]).
#[derive(Debug, Default)]
pub struct Scheduler {
    catalog: Catalog,
    /// All admitted events, by start ascending, ties in insertion order.
    events_by_start: Vec<SharedEvent>,
    /// Normalized event name → event.
    name_to_event: HashMap<String, SharedEvent>,
    /// Normalized resource name → events reserving it.
    resource_to_events: HashMap<String, ResourceEvents>,
    /// Bumped on every change to the event set.
    revision: u64,
}

impl Scheduler {
    pub fn new(catalog: Catalog) -> Self {
        Self {
            catalog,
            ..Self::default()
        }
    }

    // ── Catalog ──────────────────────────────────────────────

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Swap in a whole catalog, returning the old one. Admitted events are not rechecked.
    pub fn replace_catalog(&mut self, catalog: Catalog) -> Catalog {
        std::mem::replace(&mut self.catalog, catalog)
    }

    /// Insert or merge a resource; returns the resulting catalog entry.
    pub fn add_resource(&mut self, resource: Resource) -> &Resource {
        self.catalog.add_resource(resource)
    }

    /// Remove a catalog entry. Admitted events that reference it stay in place.
    pub fn remove_resource(&mut self, name: &str) -> Option<Resource> {
        self.catalog.remove_resource(name)
    }

    pub fn mark_unavailable(&mut self, name: &str, amount: u32) -> bool {
        self.catalog.mark_unavailable(name, amount)
    }

    pub fn mark_available(&mut self, name: &str, amount: u32) -> bool {
        self.catalog.mark_available(name, amount)
    }

    // ── Admission ────────────────────────────────────────────

    /// Read-only admission check. Safe to call speculatively.
    pub fn can_schedule(&self, event: &Event) -> Result<(), SchedulingError> {
        if event.end() <= event.start() {
            return Err(SchedulingError::InvalidDuration);
        }
        if self.name_to_event.contains_key(&event.normalized_name()) {
            return Err(SchedulingError::DuplicateName(event.name().to_string()));
        }
        self.check_constraints(event.resources())?;
        self.check_capacity(&event.span(), event.resources())
    }

    pub(crate) fn check_constraints(&self, demands: &[ResourceDemand]) -> Result<(), SchedulingError> {
        validate(demands.iter().map(ResourceDemand::name), &self.catalog)
            .map_err(SchedulingError::Constraint)
    }

    pub(crate) fn check_capacity(
        &self,
        span: &Span,
        demands: &[ResourceDemand],
    ) -> Result<(), SchedulingError> {
        for demand in demands {
            let resource = self
                .catalog
                .find_by_name(demand.name())
                .ok_or_else(|| SchedulingError::UnknownResource(demand.name().to_string()))?;
            let reserved = u64::from(self.reserved_in(demand.name(), span));
            let total = u64::from(resource.quantity);
            if reserved + u64::from(demand.quantity()) > total {
                let free = u32::try_from(total.saturating_sub(reserved)).unwrap_or(u32::MAX);
                return Err(SchedulingError::InsufficientAvailability {
                    resource: demand.name().to_string(),
                    free,
                });
            }
        }
        Ok(())
    }

    /// Units of `resource` held by admitted events that overlap `[start, end)`.
    pub fn count_reserved(&self, resource: &str, start: Ms, end: Ms) -> u32 {
        if end <= start {
            return 0;
        }
        self.reserved_in(&normalize(resource), &Span::new(start, end))
    }

    fn reserved_in(&self, key: &str, span: &Span) -> u32 {
        let Some(list) = self.resource_to_events.get(key) else {
            return 0;
        };
        let total: u64 = list
            .overlapping(span)
            .map(|e| u64::from(e.quantity_of(key)))
            .sum();
        u32::try_from(total).unwrap_or(u32::MAX)
    }

    // ── Mutations ────────────────────────────────────────────

    /// Admit an event, or report why it cannot be scheduled.
    pub fn add_event(&mut self, event: Event) -> Result<(), SchedulingError> {
        let result = if self.events_by_start.len() >= MAX_EVENTS {
            Err(SchedulingError::LimitExceeded("too many events"))
        } else {
            self.can_schedule(&event)
        };
        match result {
            Ok(()) => {
                debug!(event = %event.name(), start = event.start(), end = event.end(), "event admitted");
                self.insert_unchecked(Arc::new(event));
                metrics::counter!(crate::observability::EVENTS_ADMITTED_TOTAL).increment(1);
                metrics::gauge!(crate::observability::EVENTS_ACTIVE)
                    .set(self.events_by_start.len() as f64);
                Ok(())
            }
            Err(e) => {
                debug!(event = %event.name(), reason = %e, "event rejected");
                metrics::counter!(crate::observability::EVENTS_REJECTED_TOTAL, "reason" => e.label())
                    .increment(1);
                Err(e)
            }
        }
    }

    /// Touches all three indices; the caller has already decided admission.
    fn insert_unchecked(&mut self, event: SharedEvent) {
        let pos = self
            .events_by_start
            .partition_point(|e| e.start() <= event.start());
        self.events_by_start.insert(pos, event.clone());
        self.name_to_event.insert(event.normalized_name(), event.clone());
        for demand in event.resources() {
            self.resource_to_events
                .entry(demand.name().to_string())
                .or_default()
                .insert(event.clone());
        }
        self.revision += 1;
    }

    /// Remove an admitted event by name. Returns false if there is none.
    pub fn remove_event(&mut self, name: &str) -> bool {
        self.take_event(name).is_some()
    }

    /// Remove an admitted event by name and hand it back.
    pub fn take_event(&mut self, name: &str) -> Option<Event> {
        let event = self.name_to_event.remove(&normalize(name))?;
        if let Some(pos) = self
            .events_by_start
            .iter()
            .position(|e| Arc::ptr_eq(e, &event))
        {
            self.events_by_start.remove(pos);
        }
        for demand in event.resources() {
            if let Some(list) = self.resource_to_events.get_mut(demand.name()) {
                list.remove(&event);
                if list.is_empty() {
                    self.resource_to_events.remove(demand.name());
                }
            }
        }
        self.revision += 1;
        metrics::counter!(crate::observability::EVENTS_REMOVED_TOTAL).increment(1);
        metrics::gauge!(crate::observability::EVENTS_ACTIVE).set(self.events_by_start.len() as f64);
        debug!(event = %event.name(), "event removed");
        Some(Arc::unwrap_or_clone(event))
    }

    /// Put back an event that was taken out earlier, without admission
    /// checks. The catalog may have changed since it was admitted.
    pub(crate) fn restore(&mut self, event: Event) {
        debug!(event = %event.name(), "event restored");
        self.insert_unchecked(Arc::new(event));
        metrics::gauge!(crate::observability::EVENTS_ACTIVE).set(self.events_by_start.len() as f64);
    }

    /// Drop every admitted event. The catalog is kept.
    pub fn clear(&mut self) {
        self.events_by_start.clear();
        self.name_to_event.clear();
        self.resource_to_events.clear();
        self.revision += 1;
        metrics::gauge!(crate::observability::EVENTS_ACTIVE).set(0.0);
    }

    /// Clear, then re-admit every event through [`Scheduler::add_event`].
    ///
    /// Events that fail are reported by name; the ones that succeeded stay
    /// admitted. Nothing is rolled back.
    pub fn replay<I>(&mut self, events: I) -> BTreeMap<String, SchedulingError>
    where
        I: IntoIterator<Item = Event>,
    {
        self.clear();
        let mut failures = BTreeMap::new();
        for event in events {
            let name = event.name().to_string();
            if let Err(e) = self.add_event(event) {
                failures.insert(name, e);
            }
        }
        failures
    }

    /// Clear, then rebuild the indices directly from trusted data without any
    /// admission checks. A repeated name is skipped so the indices stay
    /// consistent. Returns the number of events indexed.
    pub fn rebuild<I>(&mut self, events: I) -> usize
    where
        I: IntoIterator<Item = Event>,
    {
        self.clear();
        for event in events {
            if self.name_to_event.contains_key(&event.normalized_name()) {
                warn!(event = %event.name(), "skipping repeated event name during rebuild");
                continue;
            }
            self.insert_unchecked(Arc::new(event));
        }
        metrics::gauge!(crate::observability::EVENTS_ACTIVE).set(self.events_by_start.len() as f64);
        self.events_by_start.len()
    }

    // ── Queries ──────────────────────────────────────────────

    pub fn len(&self) -> usize {
        self.events_by_start.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events_by_start.is_empty()
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Snapshot copy of all admitted events, start ascending.
    pub fn list_events(&self) -> Vec<Event> {
        self.events_by_start.iter().map(|e| (**e).clone()).collect()
    }

    pub fn get_event(&self, name: &str) -> Option<&Event> {
        self.name_to_event.get(&normalize(name)).map(|e| e.as_ref())
    }

    /// Admitted events reserving `resource`, start ascending.
    pub fn events_for_resource(&self, resource: &str) -> Vec<Event> {
        self.resource_to_events
            .get(&normalize(resource))
            .map(|list| list.events.iter().map(|e| (**e).clone()).collect())
            .unwrap_or_default()
    }

    /// Exact occupancy timeline of a resource as maximal constant segments.
    pub fn usage_intervals(&self, resource: &str) -> Vec<UsageSegment> {
        let key = normalize(resource);
        let Some(list) = self.resource_to_events.get(&key) else {
            return Vec::new();
        };
        usage_segments(list.events.iter().map(|e| (e.span(), e.quantity_of(&key))))
    }

    /// Time ranges in which every unit of `resource` is reserved.
    pub fn saturated_spans(&self, resource: &str) -> Vec<Span> {
        let Some(r) = self.catalog.find_by_name(resource) else {
            return Vec::new();
        };
        saturated_spans(&self.usage_intervals(resource), r.quantity)
    }

    /// Sub-ranges of `query` in which at least `min_free` units of `resource`
    /// are unreserved. Empty for unknown resources.
    pub fn free_windows(&self, resource: &str, query: Span, min_free: u32) -> Vec<Span> {
        let Some(r) = self.catalog.find_by_name(resource) else {
            return Vec::new();
        };
        if min_free > r.quantity {
            return Vec::new();
        }
        let threshold = r.quantity - min_free;
        let blocked: Vec<Span> = self
            .usage_intervals(resource)
            .iter()
            .filter(|s| s.quantity > threshold)
            .map(|s| Span::new(s.start, s.end))
            .collect();
        subtract_intervals(&[query], &merge_overlapping(&blocked))
    }
}
