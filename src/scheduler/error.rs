use thiserror::Error;

use super::constraints::ConstraintViolation;

/// Why an event (or a resource) was not admitted. Every variant is recoverable
/// by retrying with different input.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchedulingError {
    #[error("invalid event: {0}")]
    InvalidEvent(String),
    #[error("invalid resource: {0}")]
    InvalidResource(String),
    #[error("event must have a positive duration")]
    InvalidDuration,
    #[error("an event named '{0}' already exists")]
    DuplicateName(String),
    #[error("constraint violation: {0}")]
    Constraint(ConstraintViolation),
    #[error("resource '{0}' does not exist in the catalog")]
    UnknownResource(String),
    #[error("resource '{resource}' has insufficient availability (free: {free})")]
    InsufficientAvailability { resource: String, free: u32 },
    #[error("limit exceeded: {0}")]
    LimitExceeded(&'static str),
}

impl SchedulingError {
    /// Short label for metrics.
    pub fn label(&self) -> &'static str {
        match self {
            SchedulingError::InvalidEvent(_) => "invalid_event",
            SchedulingError::InvalidResource(_) => "invalid_resource",
            SchedulingError::InvalidDuration => "invalid_duration",
            SchedulingError::DuplicateName(_) => "duplicate_name",
            SchedulingError::Constraint(_) => "constraint",
            SchedulingError::UnknownResource(_) => "unknown_resource",
            SchedulingError::InsufficientAvailability { .. } => "insufficient_availability",
            SchedulingError::LimitExceeded(_) => "limit_exceeded",
        }
    }
}
