use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::limits::*;
use crate::scheduler::SchedulingError;

/// Unix milliseconds (UTC) — the only time type inside the engine.
pub type Ms = i64;

pub const MINUTE_MS: Ms = 60_000;

/// Case-insensitive key used for every resource and event lookup.
pub fn normalize(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Half-open interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Span {
    pub start: Ms,
    pub end: Ms,
}

impl Span {
    pub fn new(start: Ms, end: Ms) -> Self {
        debug_assert!(start < end, "Span start must be before end");
        Self { start, end }
    }

    pub fn duration_ms(&self) -> Ms {
        self.end - self.start
    }

    /// Strictly positive intersection. Touching endpoints do not overlap.
    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }
}

// ── Timestamps ───────────────────────────────────────────────────

/// RFC 3339 in UTC, fractional seconds only when non-zero.
pub fn format_timestamp(ms: Ms) -> String {
    DateTime::<Utc>::from_timestamp_millis(ms)
        .map_or_else(|| ms.to_string(), |dt| dt.to_rfc3339_opts(SecondsFormat::AutoSi, true))
}

/// Accepts RFC 3339 with an offset, or a naive ISO-8601 date-time which is read as UTC.
pub fn parse_timestamp(s: &str) -> Option<Ms> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.timestamp_millis());
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .map(|naive| naive.and_utc().timestamp_millis())
}

// ── Resources ────────────────────────────────────────────────────

/// Resource category. Free-form categories compare by their lowercase text.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Category {
    Room,
    Employee,
    Item,
    Other(String),
}

impl Category {
    pub fn parse(s: &str) -> Self {
        match normalize(s).as_str() {
            "" | "item" => Category::Item,
            "room" => Category::Room,
            "employee" => Category::Employee,
            other => Category::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Category::Room => "room",
            Category::Employee => "employee",
            Category::Item => "item",
            Category::Other(s) => s,
        }
    }
}

impl From<String> for Category {
    fn from(s: String) -> Self {
        Category::parse(&s)
    }
}

impl From<Category> for String {
    fn from(c: Category) -> Self {
        c.as_str().to_string()
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Category-specific details. The engine only ever looks at `category()`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceKind {
    Room {
        /// Seated guests, not concurrent bookings.
        capacity: u32,
        room_type: String,
        interior: bool,
    },
    Employee {
        role: String,
        shift: String,
    },
    Item {
        description: Option<String>,
    },
    /// A resource that only carries a category.
    Generic(Category),
}

impl ResourceKind {
    pub fn category(&self) -> Category {
        match self {
            ResourceKind::Room { .. } => Category::Room,
            ResourceKind::Employee { .. } => Category::Employee,
            ResourceKind::Item { .. } => Category::Item,
            ResourceKind::Generic(c) => c.clone(),
        }
    }
}

/// A named, quantified asset that events consume.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resource {
    pub name: String,
    pub kind: ResourceKind,
    /// Total concurrent units.
    pub quantity: u32,
    /// Normalized names that must be requested alongside this resource.
    pub requires: BTreeSet<String>,
    /// Normalized names that must not be requested alongside this resource.
    pub excludes: BTreeSet<String>,
    pub excludes_categories: BTreeSet<Category>,
}

impl Resource {
    pub fn new(name: &str, kind: ResourceKind, quantity: u32) -> Result<Self, SchedulingError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(SchedulingError::InvalidResource("resource name must not be empty".into()));
        }
        if name.len() > MAX_NAME_LEN {
            return Err(SchedulingError::LimitExceeded("resource name too long"));
        }
        Ok(Self {
            name: name.to_string(),
            kind,
            quantity,
            requires: BTreeSet::new(),
            excludes: BTreeSet::new(),
            excludes_categories: BTreeSet::new(),
        })
    }

    pub fn room(name: &str, capacity: u32) -> Result<Self, SchedulingError> {
        let kind = ResourceKind::Room {
            capacity,
            room_type: "standard".into(),
            interior: true,
        };
        Self::new(name, kind, 1)
    }

    pub fn employee(name: &str, role: &str) -> Result<Self, SchedulingError> {
        let kind = ResourceKind::Employee {
            role: role.to_string(),
            shift: "day".into(),
        };
        Self::new(name, kind, 1)
    }

    pub fn item(name: &str, quantity: u32) -> Result<Self, SchedulingError> {
        Self::new(name, ResourceKind::Item { description: None }, quantity)
    }

    pub fn with_requires<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.requires
            .extend(names.into_iter().map(|n| normalize(n.as_ref())).filter(|n| !n.is_empty()));
        self
    }

    pub fn with_excludes<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.excludes
            .extend(names.into_iter().map(|n| normalize(n.as_ref())).filter(|n| !n.is_empty()));
        self
    }

    pub fn with_excludes_categories<I, S>(mut self, categories: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.excludes_categories.extend(
            categories
                .into_iter()
                .filter(|c| !c.as_ref().trim().is_empty())
                .map(|c| Category::parse(c.as_ref())),
        );
        self
    }

    pub fn normalized_name(&self) -> String {
        normalize(&self.name)
    }

    pub fn category(&self) -> Category {
        self.kind.category()
    }

    pub fn available(&self) -> bool {
        self.quantity > 0
    }
}

// ── Events ───────────────────────────────────────────────────────

/// One `(resource, quantity)` demand inside an event. The name is stored normalized.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceDemand {
    name: String,
    quantity: u32,
}

impl ResourceDemand {
    pub fn new(name: &str, quantity: u32) -> Result<Self, SchedulingError> {
        let name = normalize(name);
        if name.is_empty() {
            return Err(SchedulingError::InvalidEvent("resource name must not be empty".into()));
        }
        if name.len() > MAX_NAME_LEN {
            return Err(SchedulingError::LimitExceeded("resource name too long"));
        }
        if quantity < 1 {
            return Err(SchedulingError::InvalidEvent(format!(
                "quantity for '{name}' must be at least 1"
            )));
        }
        Ok(Self { name, quantity })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn quantity(&self) -> u32 {
        self.quantity
    }
}

/// Bare resource names mean one unit.
impl From<&str> for ResourceDemand {
    fn from(name: &str) -> Self {
        Self {
            name: normalize(name),
            quantity: 1,
        }
    }
}

/// A named time interval with a set of resource demands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "EventRecord", into = "EventRecord")]
pub struct Event {
    name: String,
    span: Span,
    resources: Vec<ResourceDemand>,
    /// Opaque tag such as "daily"; never expanded.
    pub recurrence: Option<String>,
    pub notes: Option<String>,
}

impl Event {
    pub fn new(name: &str, start: Ms, end: Ms) -> Result<Self, SchedulingError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(SchedulingError::InvalidEvent("event name must not be empty".into()));
        }
        if name.len() > MAX_NAME_LEN {
            return Err(SchedulingError::LimitExceeded("event name too long"));
        }
        if end <= start {
            return Err(SchedulingError::InvalidEvent("end must be after start".into()));
        }
        if start < MIN_VALID_TIMESTAMP_MS || end > MAX_VALID_TIMESTAMP_MS {
            return Err(SchedulingError::LimitExceeded("timestamp out of range"));
        }
        Ok(Self {
            name: name.to_string(),
            span: Span::new(start, end),
            resources: Vec::new(),
            recurrence: None,
            notes: None,
        })
    }

    /// Builder form of [`Event::add_resource`].
    pub fn with_resource(mut self, name: &str, quantity: u32) -> Result<Self, SchedulingError> {
        self.add_resource(name, quantity)?;
        Ok(self)
    }

    pub fn with_recurrence(mut self, recurrence: impl Into<String>) -> Self {
        self.recurrence = Some(recurrence.into());
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    /// Add a demand, summing into an existing entry with the same normalized name.
    pub fn add_resource(&mut self, name: &str, quantity: u32) -> Result<(), SchedulingError> {
        let demand = ResourceDemand::new(name, quantity)?;
        self.push_demand(demand)
    }

    pub(crate) fn push_demand(&mut self, demand: ResourceDemand) -> Result<(), SchedulingError> {
        if let Some(existing) = self.resources.iter_mut().find(|d| d.name == demand.name) {
            existing.quantity = existing
                .quantity
                .checked_add(demand.quantity)
                .ok_or(SchedulingError::LimitExceeded("quantity overflow"))?;
            return Ok(());
        }
        if self.resources.len() >= MAX_DEMANDS_PER_EVENT {
            return Err(SchedulingError::LimitExceeded("too many resources on event"));
        }
        self.resources.push(demand);
        Ok(())
    }

    /// Drop `quantity` units of a demand, or the whole entry when `None` or when
    /// the remainder would be zero. Returns false if the event had no such demand.
    pub fn remove_resource(&mut self, name: &str, quantity: Option<u32>) -> bool {
        let key = normalize(name);
        let Some(pos) = self.resources.iter().position(|d| d.name == key) else {
            return false;
        };
        match quantity {
            Some(q) if q < self.resources[pos].quantity => self.resources[pos].quantity -= q,
            _ => {
                self.resources.remove(pos);
            }
        }
        true
    }

    pub fn resource_quantity(&self, name: &str) -> u32 {
        let key = normalize(name);
        self.quantity_of(&key)
    }

    /// Lookup by an already-normalized key.
    pub(crate) fn quantity_of(&self, key: &str) -> u32 {
        self.resources
            .iter()
            .find(|d| d.name == key)
            .map_or(0, |d| d.quantity)
    }

    pub fn overlaps(&self, other: &Event) -> bool {
        self.span.overlaps(&other.span)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn normalized_name(&self) -> String {
        normalize(&self.name)
    }

    pub fn span(&self) -> Span {
        self.span
    }

    pub fn start(&self) -> Ms {
        self.span.start
    }

    pub fn end(&self) -> Ms {
        self.span.end
    }

    pub fn duration_ms(&self) -> Ms {
        self.span.duration_ms()
    }

    pub fn resources(&self) -> &[ResourceDemand] {
        &self.resources
    }
}

/// One maximal constant-occupancy segment of a resource's timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageSegment {
    pub start: Ms,
    pub end: Ms,
    pub quantity: u32,
}

// ── Persisted record forms ───────────────────────────────────────

fn default_quantity() -> i64 {
    1
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DemandRecord {
    pub name: String,
    #[serde(default = "default_quantity")]
    pub quantity: i64,
}

/// The stable on-disk form of an [`Event`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    pub name: String,
    pub start: String,
    pub end: String,
    #[serde(default)]
    pub resources: Vec<DemandRecord>,
    #[serde(default)]
    pub recurrence: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl From<Event> for EventRecord {
    fn from(event: Event) -> Self {
        Self {
            start: format_timestamp(event.span.start),
            end: format_timestamp(event.span.end),
            resources: event
                .resources
                .into_iter()
                .map(|d| DemandRecord {
                    name: d.name,
                    quantity: i64::from(d.quantity),
                })
                .collect(),
            name: event.name,
            recurrence: event.recurrence,
            notes: event.notes,
        }
    }
}

impl TryFrom<EventRecord> for Event {
    type Error = SchedulingError;

    fn try_from(record: EventRecord) -> Result<Self, Self::Error> {
        let start = parse_timestamp(&record.start).ok_or_else(|| {
            SchedulingError::InvalidEvent(format!("invalid start timestamp '{}'", record.start))
        })?;
        let end = parse_timestamp(&record.end).ok_or_else(|| {
            SchedulingError::InvalidEvent(format!("invalid end timestamp '{}'", record.end))
        })?;
        let mut event = Event::new(&record.name, start, end)?;
        for demand in record.resources {
            let quantity = u32::try_from(demand.quantity).map_err(|_| {
                SchedulingError::InvalidEvent(format!(
                    "quantity for '{}' must be at least 1",
                    demand.name
                ))
            })?;
            event.add_resource(&demand.name, quantity)?;
        }
        for text in [&record.recurrence, &record.notes].into_iter().flatten() {
            if text.len() > MAX_TEXT_LEN {
                return Err(SchedulingError::LimitExceeded("event text too long"));
            }
        }
        event.recurrence = record.recurrence;
        event.notes = record.notes;
        Ok(event)
    }
}

const GENERIC_TYPE_TAG: &str = "Resource";

/// The stable on-disk form of a [`Resource`].
///
/// `type` is written as `"Resource"` for category-only resources. Other
/// values only come from catalogs written by the older desktop tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRecord {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub type_tag: Option<String>,
    pub name: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default = "default_quantity")]
    pub quantity: i64,
    #[serde(default)]
    pub available: bool,
    #[serde(default)]
    pub requires: Vec<String>,
    #[serde(default)]
    pub excludes: Vec<String>,
    #[serde(default)]
    pub excludes_categories: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capacity: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interior: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shift: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl From<&Resource> for ResourceRecord {
    fn from(r: &Resource) -> Self {
        let mut record = Self {
            type_tag: None,
            name: r.name.clone(),
            category: Some(r.category().to_string()),
            quantity: i64::from(r.quantity),
            available: r.available(),
            requires: r.requires.iter().cloned().collect(),
            excludes: r.excludes.iter().cloned().collect(),
            excludes_categories: r.excludes_categories.iter().map(ToString::to_string).collect(),
            capacity: None,
            room_type: None,
            interior: None,
            role: None,
            shift: None,
            description: None,
        };
        match &r.kind {
            ResourceKind::Room { capacity, room_type, interior } => {
                record.capacity = Some(*capacity);
                record.room_type = Some(room_type.clone());
                record.interior = Some(*interior);
            }
            ResourceKind::Employee { role, shift } => {
                record.role = Some(role.clone());
                record.shift = Some(shift.clone());
            }
            ResourceKind::Item { description } => record.description = description.clone(),
            ResourceKind::Generic(_) => record.type_tag = Some(GENERIC_TYPE_TAG.into()),
        }
        record
    }
}

impl TryFrom<ResourceRecord> for Resource {
    type Error = SchedulingError;

    fn try_from(record: ResourceRecord) -> Result<Self, Self::Error> {
        let quantity = u32::try_from(record.quantity).map_err(|_| {
            SchedulingError::InvalidResource(format!(
                "quantity for '{}' must not be negative",
                record.name
            ))
        })?;
        let category = record
            .type_tag
            .as_deref()
            .map(Category::parse)
            .filter(|c| !matches!(c, Category::Other(_)))
            .unwrap_or_else(|| Category::parse(record.category.as_deref().unwrap_or("")));
        let generic = record
            .type_tag
            .as_deref()
            .is_some_and(|t| t.eq_ignore_ascii_case(GENERIC_TYPE_TAG));
        let kind = match category {
            other if generic => ResourceKind::Generic(other),
            Category::Room => ResourceKind::Room {
                capacity: record.capacity.unwrap_or(1),
                room_type: record.room_type.unwrap_or_else(|| "standard".into()),
                interior: record.interior.unwrap_or(true),
            },
            Category::Employee => ResourceKind::Employee {
                role: record.role.unwrap_or_default(),
                shift: record.shift.unwrap_or_else(|| "day".into()),
            },
            Category::Item => ResourceKind::Item { description: record.description },
            other => ResourceKind::Generic(other),
        };
        Ok(Resource::new(&record.name, kind, quantity)?
            .with_requires(&record.requires)
            .with_excludes(&record.excludes)
            .with_excludes_categories(&record.excludes_categories))
    }
}
