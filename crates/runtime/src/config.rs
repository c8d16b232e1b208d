use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use pl_core::{Gpm, Timestamp};
use pl_fleet::FleetConfig;
use pl_predictors::{BandedRandomWalk, SpeedBand, ThroughputModel};

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("reading {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("parsing {path}: {source}")]
    Toml {
        path: PathBuf,
        source: toml::de::Error,
    },
}

/// Everything a Pressline process reads at startup.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub engine: EngineConfig,
    pub server: ServerConfig,
    pub store: StoreConfig,
}

impl Settings {
    /// Defaults, overlaid by the TOML file when given, overlaid by the
    /// `PRESSLINE_DB_*` environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut settings = match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                })?;
                toml::from_str(&raw).map_err(|source| ConfigError::Toml {
                    path: path.to_path_buf(),
                    source,
                })?
            }
            None => Settings::default(),
        };
        settings.store.apply_lookup(|key| std::env::var(key).ok());
        Ok(settings)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub tick_interval_ms: u64,
    pub ticks_per_minute: u32,
    pub healthy_band: SpeedBand,
    pub max_step: u32,
    pub start_speed: Gpm,
    pub target_speed: Gpm,
    pub history_capacity: usize,
    /// Fixed seed for reproducible runs; wall-clock derived when unset.
    pub seed: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let fleet = FleetConfig::default();
        let walk = BandedRandomWalk::default();
        Self {
            tick_interval_ms: 1_000,
            ticks_per_minute: 60,
            healthy_band: walk.band,
            max_step: walk.max_step,
            start_speed: fleet.start_speed,
            target_speed: fleet.target_speed,
            history_capacity: fleet.history_capacity,
            seed: None,
        }
    }
}

impl EngineConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }

    pub fn fleet_config(&self) -> FleetConfig {
        FleetConfig {
            start_speed: self.start_speed,
            target_speed: self.target_speed,
            history_capacity: self.history_capacity,
        }
    }

    pub fn throughput_model(&self) -> ThroughputModel {
        let walk = BandedRandomWalk::new(self.healthy_band, self.max_step);
        ThroughputModel::new(Box::new(walk), self.ticks_per_minute)
    }

    pub fn seed_or_clock(&self, now: Timestamp) -> u64 {
        self.seed.unwrap_or_else(|| now.timestamp_nanos_opt().unwrap_or_default() as u64)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DashboardSource {
    /// The fixed four-hour demo series.
    Simulated,
    /// Per-minute documents from the configured store.
    Store,
}

impl FromStr for DashboardSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "simulated" => Ok(DashboardSource::Simulated),
            "store" => Ok(DashboardSource::Store),
            other => Err(format!("unknown dashboard source: {other}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: SocketAddr,
    pub dashboard_source: DashboardSource,
    pub dashboard_window_hours: i64,
    pub catalog_size: usize,
    pub concurrent_requests_max: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([127, 0, 0, 1], 8080)),
            dashboard_source: DashboardSource::Simulated,
            dashboard_window_hours: 24,
            catalog_size: 300,
            concurrent_requests_max: 100,
        }
    }
}

pub const ENV_DB_NAME: &str = "PRESSLINE_DB_NAME";
pub const ENV_DB_COLLECTION: &str = "PRESSLINE_DB_COLLECTION";
pub const ENV_DB_URI: &str = "PRESSLINE_DB_URI";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct StoreConfig {
    pub database: String,
    pub collection: String,
    /// Root directory of the document store.
    pub connection_string: String,
    pub query_timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database: "pressline".into(),
            collection: "minute_counts".into(),
            connection_string: "./data".into(),
            query_timeout_ms: 5_000,
        }
    }
}

impl StoreConfig {
    /// Overrides fields whose variable is set and non-empty.
    pub fn apply_lookup(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |key| lookup(key).filter(|v: &String| !v.is_empty());
        if let Some(v) = get(ENV_DB_NAME) {
            self.database = v;
        }
        if let Some(v) = get(ENV_DB_COLLECTION) {
            self.collection = v;
        }
        if let Some(v) = get(ENV_DB_URI) {
            self.connection_string = v;
        }
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.query_timeout_ms)
    }

    pub fn collection_path(&self) -> PathBuf {
        Path::new(&self.connection_string)
            .join(&self.database)
            .join(format!("{}.jsonl", self.collection))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn store_defaults_and_overrides() {
        let mut cfg = StoreConfig::default();
        assert_eq!(cfg.collection_path(), PathBuf::from("./data/pressline/minute_counts.jsonl"));

        let env: HashMap<&str, &str> =
            HashMap::from([(ENV_DB_NAME, "planta"), (ENV_DB_URI, "/srv/db"), (ENV_DB_COLLECTION, "")]);
        cfg.apply_lookup(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(cfg.database, "planta");
        assert_eq!(cfg.collection, "minute_counts");
        assert_eq!(cfg.collection_path(), PathBuf::from("/srv/db/planta/minute_counts.jsonl"));
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[engine]\nseed = 7\nhealthy_band = {{ low = 300, high = 320 }}\n\n[server]\ndashboard_source = \"store\""
        )
        .unwrap();
        let settings = Settings::load(Some(file.path())).unwrap();
        assert_eq!(settings.engine.seed, Some(7));
        assert_eq!(settings.engine.healthy_band, SpeedBand { low: 300, high: 320 });
        assert_eq!(settings.engine.ticks_per_minute, 60);
        assert_eq!(settings.server.dashboard_source, DashboardSource::Store);
        assert_eq!(settings.server.catalog_size, 300);
    }

    #[test]
    fn missing_file_is_reported() {
        let err = Settings::load(Some(Path::new("/nonexistent/pressline.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
