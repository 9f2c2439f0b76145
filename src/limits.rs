use crate::model::Ms;

/// Longest accepted event or resource name, in bytes.
pub const MAX_NAME_LEN: usize = 256;

/// Longest accepted free-text field (notes, recurrence tag, descriptions).
pub const MAX_TEXT_LEN: usize = 4096;

/// Distinct resources a single event may reserve.
pub const MAX_DEMANDS_PER_EVENT: usize = 64;

/// Admitted events held by one scheduler.
pub const MAX_EVENTS: usize = 100_000;

/// Candidate windows tried by one slot search before giving up.
pub const MAX_SLOT_SEARCH_STEPS: usize = 100_000;

/// 1970-01-01T00:00:00Z
pub const MIN_VALID_TIMESTAMP_MS: Ms = 0;

/// 9999-12-31T23:59:59.999Z
pub const MAX_VALID_TIMESTAMP_MS: Ms = 253_402_300_799_999;
