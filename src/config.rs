//! Application-level configuration loading: autosave timing, transition
//! timeout and the default snapshot of every record kind.

use std::{collections::HashMap, env, fs, io::ErrorKind, path::PathBuf, time::Duration};

use serde::Deserialize;
use serde_json::{Value, json};
use serde_with::{DurationMilliSeconds, serde_as};
use tracing::{info, warn};

use crate::{dao::models::RecordKind, engine::persister::PersisterConfig};

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "TOUCHLINE_BACK_CONFIG_PATH";
const DEFAULT_TRANSITION_TIMEOUT: Duration = Duration::from_secs(5);

/// Timing of the draft engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    /// Quiet period before a draft is written.
    pub quiescence_window: Duration,
    /// Period after an editor mounts during which edits are not autosaved.
    pub grace_period: Duration,
    /// Upper bound for a lifecycle transition; `None` disables the limit.
    pub transition_timeout: Option<Duration>,
}

impl EngineConfig {
    /// Persister timing derived from this configuration.
    pub fn persister(&self) -> PersisterConfig {
        PersisterConfig {
            quiescence_window: self.quiescence_window,
            grace_period: self.grace_period,
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        let persister = PersisterConfig::default();
        Self {
            quiescence_window: persister.quiescence_window,
            grace_period: persister.grace_period,
            transition_timeout: Some(DEFAULT_TRANSITION_TIMEOUT),
        }
    }
}

#[derive(Debug, Clone)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    engine: EngineConfig,
    defaults: HashMap<RecordKind, Value>,
}

impl AppConfig {
    /// Load the application configuration from disk, falling back to built-in defaults.
    pub fn load() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<RawConfig>(&contents) {
                Ok(raw) => {
                    let app_config: Self = raw.into();
                    info!(
                        path = %path.display(),
                        quiescence_window_ms = app_config.engine.quiescence_window.as_millis() as u64,
                        "loaded engine settings from config"
                    );
                    app_config
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        }
    }

    /// Draft engine timing.
    pub fn engine(&self) -> EngineConfig {
        self.engine
    }

    /// Static default snapshot for a record kind; the lowest-ranked source when
    /// resolving what an editor starts from.
    pub fn defaults_for(&self, kind: RecordKind) -> Value {
        self.defaults
            .get(&kind)
            .cloned()
            .unwrap_or_else(|| default_snapshot(kind))
    }

    /// Replace the engine timing, keeping everything else.
    pub fn with_engine(mut self, engine: EngineConfig) -> Self {
        self.engine = engine;
        self
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            engine: EngineConfig::default(),
            defaults: HashMap::new(),
        }
    }
}

#[serde_as]
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
/// JSON representation of the configuration file located at [`DEFAULT_CONFIG_PATH`].
struct RawConfig {
    #[serde_as(as = "Option<DurationMilliSeconds<u64>>")]
    quiescence_window_ms: Option<Duration>,
    #[serde_as(as = "Option<DurationMilliSeconds<u64>>")]
    grace_period_ms: Option<Duration>,
    /// `0` disables the transition timeout.
    #[serde_as(as = "Option<DurationMilliSeconds<u64>>")]
    transition_timeout_ms: Option<Duration>,
    #[serde(default)]
    defaults: HashMap<RecordKind, Value>,
}

impl From<RawConfig> for AppConfig {
    fn from(value: RawConfig) -> Self {
        let fallback = EngineConfig::default();
        let transition_timeout = match value.transition_timeout_ms {
            Some(limit) if limit.is_zero() => None,
            Some(limit) => Some(limit),
            None => fallback.transition_timeout,
        };

        let defaults = value
            .defaults
            .into_iter()
            .filter(|(kind, snapshot)| {
                let usable = snapshot.is_object();
                if !usable {
                    warn!(kind = kind.as_key(), "ignoring non-object default snapshot");
                }
                usable
            })
            .collect();

        Self {
            engine: EngineConfig {
                quiescence_window: value
                    .quiescence_window_ms
                    .unwrap_or(fallback.quiescence_window),
                grace_period: value.grace_period_ms.unwrap_or(fallback.grace_period),
                transition_timeout,
            },
            defaults,
        }
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

/// Built-in default snapshots shipped with the binary.
fn default_snapshot(kind: RecordKind) -> Value {
    match kind {
        RecordKind::Match => json!({
            "formation": "2-3-1",
            "lineup": {},
            "teamSummary": {
                "defenseSummary": "",
                "midfieldSummary": "",
                "attackSummary": "",
                "generalSummary": ""
            },
            "playerStats": {},
            "notes": ""
        }),
        RecordKind::TrainingPlan => json!({
            "drills": [],
            "notes": ""
        }),
    }
}
