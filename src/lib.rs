//! Resource reservation engine for a single venue: rooms, staff and
//! equipment booked by time-bound events, with overbooking prevention and
//! requires / excludes rules between resources.

pub mod autosave;
pub mod catalog;
pub mod config;
pub mod limits;
pub mod model;
pub mod notify;
pub mod observability;
pub mod planner;
pub mod scheduler;
pub mod snapshot;

pub use catalog::Catalog;
pub use config::PlannerConfig;
pub use model::{Category, Event, Ms, Resource, ResourceDemand, ResourceKind, Span, UsageSegment};
pub use planner::{Planner, PlannerError};
pub use scheduler::{ConstraintViolation, Scheduler, SchedulingError};
pub use snapshot::{SnapshotError, SnapshotStore};
