use std::path::PathBuf;
use std::time::Duration;

/// Runtime configuration, read from `HOTELPLAN_*` environment variables.
///
/// | variable | default |
/// |---|---|
/// | `HOTELPLAN_DATA_DIR` | `./data` |
/// | `HOTELPLAN_EVENTS_FILE` | `events.json` |
/// | `HOTELPLAN_CATALOG_FILE` | `inventory.json` |
/// | `HOTELPLAN_DEFAULT_EVENTS` | unset (no working-copy restore) |
/// | `HOTELPLAN_AUTOSAVE_SECS` | `30` (`0` disables) |
/// | `HOTELPLAN_STEP_MINUTES` | `15` |
/// | `HOTELPLAN_METRICS_PORT` | unset (no exporter) |
///
/// Unparseable numbers fall back to the default.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannerConfig {
    pub data_dir: PathBuf,
    pub events_file: String,
    pub catalog_file: String,
    /// Pristine events document copied over a missing or corrupt working file.
    pub default_events: Option<PathBuf>,
    pub autosave_interval: Option<Duration>,
    pub step_minutes: u32,
    pub metrics_port: Option<u16>,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            events_file: "events.json".into(),
            catalog_file: "inventory.json".into(),
            default_events: None,
            autosave_interval: Some(Duration::from_secs(30)),
            step_minutes: 15,
            metrics_port: None,
        }
    }
}

impl PlannerConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; `from_env` passes `std::env::var`.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let autosave_secs: u64 = lookup("HOTELPLAN_AUTOSAVE_SECS")
            .and_then(|s| s.trim().parse().ok())
            .unwrap_or(30);
        Self {
            data_dir: lookup("HOTELPLAN_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            events_file: lookup("HOTELPLAN_EVENTS_FILE").unwrap_or(defaults.events_file),
            catalog_file: lookup("HOTELPLAN_CATALOG_FILE").unwrap_or(defaults.catalog_file),
            default_events: lookup("HOTELPLAN_DEFAULT_EVENTS").map(PathBuf::from),
            autosave_interval: (autosave_secs > 0).then(|| Duration::from_secs(autosave_secs)),
            step_minutes: lookup("HOTELPLAN_STEP_MINUTES")
                .and_then(|s| s.trim().parse().ok())
                .filter(|m| *m > 0)
                .unwrap_or(defaults.step_minutes),
            metrics_port: lookup("HOTELPLAN_METRICS_PORT").and_then(|s| s.trim().parse().ok()),
        }
    }

    pub fn events_path(&self) -> PathBuf {
        self.data_dir.join(&self.events_file)
    }

    pub fn catalog_path(&self) -> PathBuf {
        self.data_dir.join(&self.catalog_file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_when_unset() {
        let config = PlannerConfig::from_lookup(|_| None);
        assert_eq!(config, PlannerConfig::default());
        assert_eq!(config.events_path(), PathBuf::from("./data/events.json"));
    }

    #[test]
    fn reads_every_variable() {
        let config = PlannerConfig::from_lookup(lookup_from(&[
            ("HOTELPLAN_DATA_DIR", "/var/lib/hotel"),
            ("HOTELPLAN_EVENTS_FILE", "eventos.json"),
            ("HOTELPLAN_CATALOG_FILE", "inventario.json"),
            ("HOTELPLAN_DEFAULT_EVENTS", "/usr/share/hotel/eventos.json"),
            ("HOTELPLAN_AUTOSAVE_SECS", "5"),
            ("HOTELPLAN_STEP_MINUTES", "30"),
            ("HOTELPLAN_METRICS_PORT", "9100"),
        ]));
        assert_eq!(config.events_path(), PathBuf::from("/var/lib/hotel/eventos.json"));
        assert_eq!(config.catalog_path(), PathBuf::from("/var/lib/hotel/inventario.json"));
        assert_eq!(
            config.default_events,
            Some(PathBuf::from("/usr/share/hotel/eventos.json"))
        );
        assert_eq!(config.autosave_interval, Some(Duration::from_secs(5)));
        assert_eq!(config.step_minutes, 30);
        assert_eq!(config.metrics_port, Some(9100));
    }

    #[test]
    fn zero_autosave_disables_it() {
        let config = PlannerConfig::from_lookup(lookup_from(&[("HOTELPLAN_AUTOSAVE_SECS", "0")]));
        assert_eq!(config.autosave_interval, None);
    }

    #[test]
    fn bad_numbers_fall_back() {
        let config = PlannerConfig::from_lookup(lookup_from(&[
            ("HOTELPLAN_AUTOSAVE_SECS", "often"),
            ("HOTELPLAN_STEP_MINUTES", "0"),
            ("HOTELPLAN_METRICS_PORT", "99999"),
        ]));
        assert_eq!(config.autosave_interval, Some(Duration::from_secs(30)));
        assert_eq!(config.step_minutes, 15);
        assert_eq!(config.metrics_port, None);
    }
}
