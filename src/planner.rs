use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use thiserror::Error;
use tokio::sync::{Mutex, broadcast};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::catalog::Catalog;
use crate::config::PlannerConfig;
use crate::model::*;
use crate::notify::{Change, NotifyHub};
use crate::scheduler::{Scheduler, SchedulingError};
use crate::snapshot::{SnapshotError, SnapshotStore};

#[derive(Debug, Error)]
pub enum PlannerError {
    #[error(transparent)]
    Scheduling(#[from] SchedulingError),
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
    /// Validated load kept `loaded` events; the rest failed. Nothing was rolled back.
    #[error("{} of {} events failed to load", failures.len(), loaded + failures.len())]
    PartialLoad {
        loaded: usize,
        failures: BTreeMap<String, SchedulingError>,
    },
    #[error("no event named '{0}'")]
    EventNotFound(String),
    #[error("no resource named '{0}'")]
    ResourceNotFound(String),
    #[error("no snapshot path configured")]
    NoSnapshotPath,
    #[error("background task failed: {0}")]
    Task(String),
}

/// Thread-safe front door to the [`Scheduler`].
///
/// Every engine call runs under one exclusive lock. Snapshot I/O never does:
/// saves copy the event list under the lock and write on the blocking pool,
/// loads read and decode first and only then take the lock to apply.
pub struct Planner {
    scheduler: Mutex<Scheduler>,
    events_store: Option<SnapshotStore>,
    catalog_store: Option<SnapshotStore>,
    notify: Arc<NotifyHub>,
    /// Scheduler revision last written to (or read from) the events store.
    saved_revision: AtomicU64,
    /// Held from copying the events until the rename, so saves land in order.
    save_lock: Mutex<()>,
    step_minutes: u32,
}

impl Planner {
    pub fn new(scheduler: Scheduler) -> Self {
        let revision = scheduler.revision();
        Self {
            scheduler: Mutex::new(scheduler),
            events_store: None,
            catalog_store: None,
            notify: Arc::new(NotifyHub::new()),
            saved_revision: AtomicU64::new(revision),
            save_lock: Mutex::new(()),
            step_minutes: PlannerConfig::default().step_minutes,
        }
    }

    pub fn with_events_store(mut self, store: SnapshotStore) -> Self {
        self.events_store = Some(store);
        self
    }

    pub fn with_catalog_store(mut self, store: SnapshotStore) -> Self {
        self.catalog_store = Some(store);
        self
    }

    pub fn with_step_minutes(mut self, step_minutes: u32) -> Self {
        self.step_minutes = step_minutes;
        self
    }

    /// Build a planner from configuration: restore the working copy if a
    /// default is configured, then load the catalog and the events
    /// (validated) when their files exist. Events that fail validation are
    /// logged and left out.
    pub async fn open(config: &PlannerConfig) -> Result<Self, PlannerError> {
        let events_store = SnapshotStore::new(config.events_path());
        let catalog_store = SnapshotStore::new(config.catalog_path());

        if let Some(default) = config.default_events.clone() {
            let store = events_store.clone();
            tokio::task::spawn_blocking(move || store.ensure_working_copy(&default))
                .await
                .map_err(|e| PlannerError::Task(e.to_string()))??;
        }

        let planner = Planner::new(Scheduler::default())
            .with_events_store(events_store)
            .with_catalog_store(catalog_store)
            .with_step_minutes(config.step_minutes);

        if planner.catalog_store.as_ref().is_some_and(SnapshotStore::exists) {
            planner.load_catalog().await?;
        }
        if planner.events_store.as_ref().is_some_and(SnapshotStore::exists) {
            match planner.load_snapshot(true).await {
                Ok(_) => {}
                Err(PlannerError::PartialLoad { loaded, failures }) => {
                    for (name, reason) in &failures {
                        warn!(event = %name, %reason, "event not restored");
                    }
                    warn!(loaded, failed = failures.len(), "partial load");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(planner)
    }

    // ── Notifications ────────────────────────────────────────

    pub fn notify(&self) -> &Arc<NotifyHub> {
        &self.notify
    }

    pub fn subscribe(&self, resource: &str) -> broadcast::Receiver<Change> {
        self.notify.subscribe(resource)
    }

    pub fn subscribe_all(&self) -> broadcast::Receiver<Change> {
        self.notify.subscribe_all()
    }

    // ── Catalog ──────────────────────────────────────────────

    /// Insert or merge; returns the resulting entry.
    pub async fn add_resource(&self, resource: Resource) -> Resource {
        self.scheduler.lock().await.add_resource(resource).clone()
    }

    /// Remove a resource together with every event that reserves it.
    /// Returns the removed resource and the names of the removed events.
    pub async fn remove_resource(&self, name: &str) -> Result<(Resource, Vec<String>), PlannerError> {
        let (resource, removed) = {
            let mut scheduler = self.scheduler.lock().await;
            if !scheduler.catalog().contains(name) {
                return Err(PlannerError::ResourceNotFound(name.to_string()));
            }
            let names: Vec<String> = scheduler
                .events_for_resource(name)
                .iter()
                .map(|e| e.name().to_string())
                .collect();
            let removed: Vec<Event> = names.iter().filter_map(|n| scheduler.take_event(n)).collect();
            let resource = scheduler
                .remove_resource(name)
                .ok_or_else(|| PlannerError::ResourceNotFound(name.to_string()))?;
            (resource, removed)
        };

        info!(resource = %resource.name, events = removed.len(), "resource removed");
        let names = removed.iter().map(|e| e.name().to_string()).collect();
        for event in &removed {
            self.notify.publish(removed_change(event));
        }
        self.notify.remove(name);
        Ok((resource, names))
    }

    pub async fn mark_unavailable(&self, name: &str, amount: u32) -> bool {
        self.scheduler.lock().await.mark_unavailable(name, amount)
    }

    pub async fn mark_available(&self, name: &str, amount: u32) -> bool {
        self.scheduler.lock().await.mark_available(name, amount)
    }

    pub async fn find_resource(&self, name: &str) -> Option<Resource> {
        self.scheduler.lock().await.catalog().find_by_name(name).cloned()
    }

    pub async fn resources(&self) -> Vec<Resource> {
        self.scheduler.lock().await.catalog().resources().to_vec()
    }

    pub async fn resources_by_category(&self, category: &Category) -> Vec<Resource> {
        self.scheduler
            .lock()
            .await
            .catalog()
            .by_category(category)
            .cloned()
            .collect()
    }

    pub async fn available_by_category(&self, category: &Category) -> Vec<Resource> {
        self.scheduler
            .lock()
            .await
            .catalog()
            .available_by_category(category)
            .cloned()
            .collect()
    }

    // ── Events ───────────────────────────────────────────────

    pub async fn add_event(&self, event: Event) -> Result<(), PlannerError> {
        let change = Change::EventAdded {
            name: event.name().to_string(),
            span: event.span(),
            resources: demand_names(&event),
        };
        self.scheduler.lock().await.add_event(event)?;
        self.notify.publish(change);
        Ok(())
    }

    pub async fn remove_event(&self, name: &str) -> bool {
        let removed = self.scheduler.lock().await.take_event(name);
        match removed {
            Some(event) => {
                self.notify.publish(removed_change(&event));
                true
            }
            None => false,
        }
    }

    /// Replace an admitted event: the old one is removed and the new one
    /// admitted in the same critical section. If admission fails the old
    /// event is put back.
    pub async fn replace_event(&self, name: &str, event: Event) -> Result<(), PlannerError> {
        let old = {
            let mut scheduler = self.scheduler.lock().await;
            let old = scheduler
                .take_event(name)
                .ok_or_else(|| PlannerError::EventNotFound(name.to_string()))?;
            if let Err(e) = scheduler.add_event(event.clone()) {
                scheduler.restore(old);
                return Err(e.into());
            }
            old
        };
        self.notify.publish(removed_change(&old));
        self.notify.publish(Change::EventAdded {
            name: event.name().to_string(),
            span: event.span(),
            resources: demand_names(&event),
        });
        Ok(())
    }

    pub async fn can_schedule(&self, event: &Event) -> Result<(), SchedulingError> {
        self.scheduler.lock().await.can_schedule(event)
    }

    pub async fn get_event(&self, name: &str) -> Option<Event> {
        self.scheduler.lock().await.get_event(name).cloned()
    }

    pub async fn list_events(&self) -> Vec<Event> {
        self.scheduler.lock().await.list_events()
    }

    pub async fn events_for_resource(&self, resource: &str) -> Vec<Event> {
        self.scheduler.lock().await.events_for_resource(resource)
    }

    pub async fn count_reserved(&self, resource: &str, start: Ms, end: Ms) -> u32 {
        self.scheduler.lock().await.count_reserved(resource, start, end)
    }

    pub async fn usage_intervals(&self, resource: &str) -> Vec<UsageSegment> {
        self.scheduler.lock().await.usage_intervals(resource)
    }

    pub async fn saturated_spans(&self, resource: &str) -> Vec<Span> {
        self.scheduler.lock().await.saturated_spans(resource)
    }

    pub async fn free_windows(&self, resource: &str, query: Span, min_free: u32) -> Vec<Span> {
        self.scheduler.lock().await.free_windows(resource, query, min_free)
    }

    pub async fn find_next_available(
        &self,
        duration: Ms,
        demands: &[ResourceDemand],
        search_start: Ms,
        search_end: Ms,
        step_minutes: u32,
    ) -> Option<Span> {
        self.scheduler
            .lock()
            .await
            .find_next_available(duration, demands, search_start, search_end, step_minutes)
    }

    /// [`Planner::find_next_available`] with the configured step.
    pub async fn find_slot(
        &self,
        duration: Ms,
        demands: &[ResourceDemand],
        search_start: Ms,
        search_end: Ms,
    ) -> Option<Span> {
        self.find_next_available(duration, demands, search_start, search_end, self.step_minutes)
            .await
    }

    pub async fn revision(&self) -> u64 {
        self.scheduler.lock().await.revision()
    }

    /// True when the event set changed since the last save or load.
    pub async fn is_dirty(&self) -> bool {
        self.revision().await != self.saved_revision.load(Ordering::Acquire)
    }

    // ── Snapshots ────────────────────────────────────────────

    pub fn events_path(&self) -> Option<PathBuf> {
        self.events_store.as_ref().map(|s| s.path().to_path_buf())
    }

    /// Save events to the configured store. Returns the number written.
    pub async fn save_snapshot(&self) -> Result<usize, PlannerError> {
        let store = self.events_store.clone().ok_or(PlannerError::NoSnapshotPath)?;
        self.save_to(store, true).await
    }

    /// Save events to an explicit path. Does not affect the dirty flag.
    pub async fn save_snapshot_to(&self, path: impl Into<PathBuf>) -> Result<usize, PlannerError> {
        self.save_to(SnapshotStore::new(path), false).await
    }

    async fn save_to(&self, store: SnapshotStore, track: bool) -> Result<usize, PlannerError> {
        let _saving = self.save_lock.lock().await;
        let (events, revision) = {
            let scheduler = self.scheduler.lock().await;
            (scheduler.list_events(), scheduler.revision())
        };
        let count = events.len();
        let path = store.path().to_path_buf();
        let result = tokio::task::spawn_blocking(move || store.save_events(&events))
            .await
            .map_err(|e| PlannerError::Task(e.to_string()))
            .and_then(|r| r.map_err(PlannerError::from));
        match result {
            Ok(()) => {
                if track {
                    self.saved_revision.fetch_max(revision, Ordering::AcqRel);
                }
                self.notify.publish(Change::SnapshotSaved { path, events: count });
                Ok(count)
            }
            Err(e) => {
                metrics::counter!(crate::observability::SNAPSHOT_FAILURES_TOTAL, "op" => "save")
                    .increment(1);
                Err(e)
            }
        }
    }

    /// Load events from the configured store. See [`Planner::load_snapshot_from`].
    pub async fn load_snapshot(&self, validate: bool) -> Result<usize, PlannerError> {
        let store = self.events_store.clone().ok_or(PlannerError::NoSnapshotPath)?;
        self.load_from(store, validate, true).await
    }

    /// Replace the admitted events with the contents of a snapshot file.
    ///
    /// With `validate`, every record is replayed through admission; failures
    /// (including undecodable records) come back as [`PlannerError::PartialLoad`]
    /// while the events that passed stay admitted. Without it the indices are
    /// rebuilt directly and any undecodable record aborts the load with the
    /// previous state untouched. A combined workspace file also replaces the
    /// catalog before the events are applied.
    pub async fn load_snapshot_from(
        &self,
        path: impl Into<PathBuf>,
        validate: bool,
    ) -> Result<usize, PlannerError> {
        self.load_from(SnapshotStore::new(path), validate, false).await
    }

    async fn load_from(
        &self,
        store: SnapshotStore,
        validate: bool,
        track: bool,
    ) -> Result<usize, PlannerError> {
        let path = store.path().to_path_buf();
        let result = self.apply_document(store, validate, track).await;
        match &result {
            Ok(loaded) => self.notify.publish(Change::SnapshotLoaded {
                path,
                events: *loaded,
                failures: 0,
            }),
            Err(PlannerError::PartialLoad { loaded, failures }) => {
                self.notify.publish(Change::SnapshotLoaded {
                    path,
                    events: *loaded,
                    failures: failures.len(),
                })
            }
            Err(_) => {
                metrics::counter!(crate::observability::SNAPSHOT_FAILURES_TOTAL, "op" => "load")
                    .increment(1);
            }
        }
        result
    }

    async fn apply_document(
        &self,
        store: SnapshotStore,
        validate: bool,
        track: bool,
    ) -> Result<usize, PlannerError> {
        let doc = tokio::task::spawn_blocking(move || store.read())
            .await
            .map_err(|e| PlannerError::Task(e.to_string()))??;
        let catalog = doc.catalog()?;

        if validate {
            let mut decode_failures = BTreeMap::new();
            let mut events = Vec::new();
            for (name, decoded) in doc.decode_events() {
                match decoded {
                    Ok(event) => events.push(event),
                    Err(e) => {
                        decode_failures.insert(name, e);
                    }
                }
            }
            let (loaded, mut failures) = {
                let mut scheduler = self.scheduler.lock().await;
                if let Some(catalog) = catalog {
                    scheduler.replace_catalog(catalog);
                }
                let failures = scheduler.replay(events);
                if track {
                    self.saved_revision.store(scheduler.revision(), Ordering::Release);
                }
                (scheduler.len(), failures)
            };
            failures.extend(decode_failures);
            info!(loaded, failed = failures.len(), "events loaded (validated)");
            if failures.is_empty() {
                Ok(loaded)
            } else {
                Err(PlannerError::PartialLoad { loaded, failures })
            }
        } else {
            let events = doc.events_strict()?;
            let loaded = {
                let mut scheduler = self.scheduler.lock().await;
                if let Some(catalog) = catalog {
                    scheduler.replace_catalog(catalog);
                }
                let loaded = scheduler.rebuild(events);
                if track {
                    self.saved_revision.store(scheduler.revision(), Ordering::Release);
                }
                loaded
            };
            info!(loaded, "events loaded (trusted)");
            Ok(loaded)
        }
    }

    /// Save the catalog to the configured catalog store.
    pub async fn save_catalog(&self) -> Result<usize, PlannerError> {
        let store = self.catalog_store.clone().ok_or(PlannerError::NoSnapshotPath)?;
        let _saving = self.save_lock.lock().await;
        let catalog = self.scheduler.lock().await.catalog().clone();
        let count = catalog.len();
        tokio::task::spawn_blocking(move || store.save_catalog(&catalog))
            .await
            .map_err(|e| PlannerError::Task(e.to_string()))??;
        Ok(count)
    }

    /// Replace the catalog from the configured catalog store. Admitted events
    /// are kept as they are.
    pub async fn load_catalog(&self) -> Result<usize, PlannerError> {
        let store = self.catalog_store.clone().ok_or(PlannerError::NoSnapshotPath)?;
        let doc = tokio::task::spawn_blocking(move || store.read())
            .await
            .map_err(|e| PlannerError::Task(e.to_string()))??;
        let catalog = doc.catalog()?.unwrap_or_else(Catalog::new);
        let count = catalog.len();
        self.scheduler.lock().await.replace_catalog(catalog);
        info!(resources = count, "catalog loaded");
        Ok(count)
    }

    /// Save catalog and events together as one workspace document.
    pub async fn save_workspace(&self, path: impl Into<PathBuf>) -> Result<usize, PlannerError> {
        let store = SnapshotStore::new(path);
        let _saving = self.save_lock.lock().await;
        let (catalog, events) = {
            let scheduler = self.scheduler.lock().await;
            (scheduler.catalog().clone(), scheduler.list_events())
        };
        let count = events.len();
        tokio::task::spawn_blocking(move || store.save_workspace(&catalog, &events))
            .await
            .map_err(|e| PlannerError::Task(e.to_string()))??;
        Ok(count)
    }

    // ── Background I/O ───────────────────────────────────────

    /// Save on a separate task. Completion is reported through the returned
    /// handle and as a [`Change`] on the global channel.
    pub fn spawn_save(self: &Arc<Self>) -> JoinHandle<Result<usize, PlannerError>> {
        let planner = Arc::clone(self);
        tokio::spawn(async move {
            let result = planner.save_snapshot().await;
            if let Err(e) = &result {
                planner.report_failure(e);
            }
            result
        })
    }

    /// Load on a separate task; same reporting as [`Planner::spawn_save`].
    pub fn spawn_load(self: &Arc<Self>, validate: bool) -> JoinHandle<Result<usize, PlannerError>> {
        let planner = Arc::clone(self);
        tokio::spawn(async move {
            let result = planner.load_snapshot(validate).await;
            if let Err(e) = &result
                && !matches!(e, PlannerError::PartialLoad { .. })
            {
                planner.report_failure(e);
            }
            result
        })
    }

    fn report_failure(&self, error: &PlannerError) {
        warn!(%error, "background snapshot task failed");
        self.notify.publish(Change::SnapshotFailed {
            path: self.events_path().unwrap_or_default(),
            reason: error.to_string(),
        });
    }
}

fn demand_names(event: &Event) -> Vec<String> {
    event.resources().iter().map(|d| d.name().to_string()).collect()
}

fn removed_change(event: &Event) -> Change {
    Change::EventRemoved {
        name: event.name().to_string(),
        span: event.span(),
        resources: demand_names(event),
    }
}
