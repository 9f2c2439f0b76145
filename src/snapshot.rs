use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::catalog::Catalog;
use crate::model::{Event, EventRecord, Resource, ResourceRecord};
use crate::scheduler::SchedulingError;

/// Highest document version this build reads and the one it writes.
pub const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("malformed JSON in {}: {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("unsupported snapshot version {found} in {}", path.display())]
    UnsupportedVersion { path: PathBuf, found: u32 },
    #[error("invalid record '{name}': {reason}")]
    InvalidRecord { name: String, reason: String },
}

impl SnapshotError {
    fn io(path: &Path, source: io::Error) -> Self {
        SnapshotError::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    fn json(path: &Path, source: serde_json::Error) -> Self {
        SnapshotError::Json {
            path: path.to_path_buf(),
            source,
        }
    }
}

fn default_version() -> u32 {
    SNAPSHOT_VERSION
}

#[derive(Debug, Clone, Default, Deserialize)]
struct Inventory {
    #[serde(default)]
    resources: Vec<Value>,
}

/// Raw shape of every document we accept: an events file, a catalog file,
/// or the combined workspace file with an `inventory` section.
#[derive(Debug, Clone, Deserialize)]
struct RawDocument {
    #[serde(default = "default_version")]
    version: u32,
    #[serde(default)]
    events: Option<Vec<Value>>,
    #[serde(default)]
    resources: Option<Vec<Value>>,
    #[serde(default)]
    inventory: Option<Inventory>,
}

/// A document read from disk, records still undecoded so that one bad
/// record does not hide the others.
#[derive(Debug, Clone, Default)]
pub struct Document {
    pub version: u32,
    /// `None` when the file carried no resource section at all.
    pub resources: Option<Vec<Value>>,
    pub events: Vec<Value>,
}

impl Document {
    /// Decode every event record in file order, paired with the name used
    /// to report it (the record's `name`, or `#<index>` when it has none).
    pub fn decode_events(&self) -> Vec<(String, Result<Event, SchedulingError>)> {
        self.events
            .iter()
            .enumerate()
            .map(|(i, value)| {
                let name = value
                    .get("name")
                    .and_then(Value::as_str)
                    .map_or_else(|| format!("#{i}"), str::to_string);
                let event = EventRecord::deserialize(value)
                    .map_err(|e| SchedulingError::InvalidEvent(e.to_string()))
                    .and_then(Event::try_from);
                (name, event)
            })
            .collect()
    }

    /// All events, or the first record that fails to decode.
    pub fn events_strict(&self) -> Result<Vec<Event>, SnapshotError> {
        self.decode_events()
            .into_iter()
            .map(|(name, event)| {
                event.map_err(|e| SnapshotError::InvalidRecord {
                    name,
                    reason: e.to_string(),
                })
            })
            .collect()
    }

    /// The resource section as a catalog; `None` if the file had none.
    pub fn catalog(&self) -> Result<Option<Catalog>, SnapshotError> {
        let Some(values) = &self.resources else {
            return Ok(None);
        };
        let mut catalog = Catalog::new();
        for (i, value) in values.iter().enumerate() {
            let name = value
                .get("name")
                .and_then(Value::as_str)
                .map_or_else(|| format!("#{i}"), str::to_string);
            let resource = ResourceRecord::deserialize(value)
                .map_err(|e| SchedulingError::InvalidResource(e.to_string()))
                .and_then(Resource::try_from)
                .map_err(|e| SnapshotError::InvalidRecord {
                    name,
                    reason: e.to_string(),
                })?;
            catalog.add_resource(resource);
        }
        Ok(Some(catalog))
    }
}

#[derive(Serialize)]
struct EventsOut<'a> {
    version: u32,
    events: &'a [Event],
}

#[derive(Serialize)]
struct CatalogOut {
    version: u32,
    resources: Vec<ResourceRecord>,
}

#[derive(Serialize)]
struct InventoryOut {
    resources: Vec<ResourceRecord>,
}

#[derive(Serialize)]
struct WorkspaceOut<'a> {
    version: u32,
    inventory: InventoryOut,
    events: &'a [Event],
}

/// One JSON document on disk.
///
/// Writes go to `<file>.tmp`, are fsynced, then renamed over the target, so
/// the canonical path only ever holds a complete document. All methods
/// block; async callers run them on the blocking pool.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    path: PathBuf,
}

impl SnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// `{"version": 1, "events": [...]}`
    pub fn save_events(&self, events: &[Event]) -> Result<(), SnapshotError> {
        self.write_atomic(&EventsOut {
            version: SNAPSHOT_VERSION,
            events,
        })?;
        info!(path = %self.path.display(), events = events.len(), "events saved");
        Ok(())
    }

    /// `{"version": 1, "resources": [...]}`
    pub fn save_catalog(&self, catalog: &Catalog) -> Result<(), SnapshotError> {
        self.write_atomic(&CatalogOut {
            version: SNAPSHOT_VERSION,
            resources: catalog.resources().iter().map(ResourceRecord::from).collect(),
        })?;
        info!(path = %self.path.display(), resources = catalog.len(), "catalog saved");
        Ok(())
    }

    /// `{"version": 1, "inventory": {"resources": [...]}, "events": [...]}`
    pub fn save_workspace(&self, catalog: &Catalog, events: &[Event]) -> Result<(), SnapshotError> {
        self.write_atomic(&WorkspaceOut {
            version: SNAPSHOT_VERSION,
            inventory: InventoryOut {
                resources: catalog.resources().iter().map(ResourceRecord::from).collect(),
            },
            events,
        })?;
        info!(
            path = %self.path.display(),
            resources = catalog.len(),
            events = events.len(),
            "workspace saved"
        );
        Ok(())
    }

    /// Read any supported document. A missing `events` section reads as empty.
    pub fn read(&self) -> Result<Document, SnapshotError> {
        let started = Instant::now();
        let file = File::open(&self.path).map_err(|e| SnapshotError::io(&self.path, e))?;
        let raw: RawDocument = serde_json::from_reader(BufReader::new(file))
            .map_err(|e| SnapshotError::json(&self.path, e))?;
        if raw.version > SNAPSHOT_VERSION {
            return Err(SnapshotError::UnsupportedVersion {
                path: self.path.clone(),
                found: raw.version,
            });
        }
        let resources = match raw.inventory {
            Some(inventory) => Some(inventory.resources),
            None => raw.resources,
        };
        let doc = Document {
            version: raw.version,
            resources,
            events: raw.events.unwrap_or_default(),
        };
        metrics::histogram!(crate::observability::SNAPSHOT_LOAD_DURATION)
            .record(started.elapsed().as_secs_f64());
        debug!(path = %self.path.display(), events = doc.events.len(), "document read");
        Ok(doc)
    }

    /// Make sure the working file exists and holds valid JSON, restoring it
    /// from `default` otherwise. Returns true when a copy was made.
    pub fn ensure_working_copy(&self, default: &Path) -> Result<bool, SnapshotError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|e| SnapshotError::io(parent, e))?;
        }
        let usable = match File::open(&self.path) {
            Ok(file) => serde_json::from_reader::<_, Value>(BufReader::new(file)).is_ok(),
            Err(e) if e.kind() == io::ErrorKind::NotFound => false,
            Err(e) => return Err(SnapshotError::io(&self.path, e)),
        };
        if usable {
            return Ok(false);
        }
        warn!(
            path = %self.path.display(),
            default = %default.display(),
            "working copy missing or unreadable, restoring default"
        );
        fs::copy(default, &self.path).map_err(|e| SnapshotError::io(default, e))?;
        Ok(true)
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    /// Write to a temp file and fsync, then rename over the target.
    fn write_atomic<T: Serialize>(&self, doc: &T) -> Result<(), SnapshotError> {
        let started = Instant::now();
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|e| SnapshotError::io(parent, e))?;
        }
        let tmp_path = self.tmp_path();
        let file = File::create(&tmp_path).map_err(|e| SnapshotError::io(&tmp_path, e))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, doc)
            .map_err(|e| SnapshotError::json(&tmp_path, e))?;
        writer.flush().map_err(|e| SnapshotError::io(&tmp_path, e))?;
        writer
            .get_ref()
            .sync_all()
            .map_err(|e| SnapshotError::io(&tmp_path, e))?;
        fs::rename(&tmp_path, &self.path).map_err(|e| SnapshotError::io(&self.path, e))?;
        metrics::histogram!(crate::observability::SNAPSHOT_SAVE_DURATION)
            .record(started.elapsed().as_secs_f64());
        Ok(())
    }
}
