//! Configuration module
//!
//! Every option is read once at process start from the environment
//! (a `.env` file is honoured via dotenvy in `main`). Defaults live in
//! `constants.rs`. Unparseable or out-of-range values are a `FatalConfigError`.

use std::env;
use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use validator::Validate;

use crate::constants;
use crate::error::FatalConfigError;
use crate::logic::features::{IdentityMode, SensorInfo};
use crate::logic::retry::RetryPolicy;

// ============================================================================
// SECTIONS
// ============================================================================

/// Elasticsearch connection
#[derive(Debug, Clone, Validate)]
pub struct ElasticConfig {
    #[validate(url)]
    pub url: String,
    #[validate(length(min = 1))]
    pub index: String,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Overrides basic auth when set
    pub api_key: Option<String>,
    pub verify_certs: bool,
    #[validate(range(min = 1))]
    pub timeout_secs: u64,
}

/// Kismet REST connection
#[derive(Debug, Clone, Validate)]
pub struct KismetConfig {
    #[validate(url)]
    pub url: String,
    pub api_key: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    #[validate(range(min = 1))]
    pub timeout_secs: u64,
}

/// Ollama chat endpoint used for context summaries
#[derive(Debug, Clone, Validate)]
pub struct OllamaConfig {
    pub enabled: bool,
    #[validate(url)]
    pub url: String,
    #[validate(length(min = 1))]
    pub model: String,
    #[validate(range(min = 0.0, max = 2.0))]
    pub temperature: f32,
    #[validate(range(min = 1))]
    pub timeout_secs: u64,
}

/// Sync/ingest loop
#[derive(Debug, Clone, Validate)]
pub struct SyncConfig {
    #[validate(range(min = 1))]
    pub poll_seconds: u64,
    #[validate(range(min = 1, max = 10000))]
    pub batch_size: usize,
    pub initial_lookback_secs: u64,
    pub cursor_path: PathBuf,
    pub identity: IdentityMode,
    pub sensor: SensorInfo,
}

/// Enrichment scanner
#[derive(Debug, Clone, Validate)]
pub struct EnrichConfig {
    #[validate(range(min = 1))]
    pub poll_seconds: u64,
    #[validate(range(min = 1, max = 1000))]
    pub batch_size: usize,
    #[validate(range(min = 1, max = 64))]
    pub concurrency: usize,
    /// Optional ES date-math lower bound on `@timestamp` (e.g. `now-24h`)
    pub time_window: Option<String>,
    #[validate(range(min = 1))]
    pub score_timeout_ms: u64,
}

/// Pretrained anomaly model artifact
#[derive(Debug, Clone, Default)]
pub struct ModelConfig {
    /// ONNX export of the Isolation Forest; `None` disables scoring
    pub path: Option<PathBuf>,
    /// Feature metadata sidecar; defaults to `<path>.json`
    pub metadata_path: Option<PathBuf>,
}

impl ModelConfig {
    pub fn resolved_metadata_path(&self) -> Option<PathBuf> {
        self.metadata_path.clone().or_else(|| {
            self.path.as_ref().map(|p| {
                let mut s = p.clone().into_os_string();
                s.push(".json");
                PathBuf::from(s)
            })
        })
    }
}

#[derive(Debug, Clone, Validate)]
pub struct RetryConfig {
    #[validate(range(min = 1, max = 20))]
    pub max_attempts: usize,
    pub min_delay_ms: u64,
    #[validate(range(min = 1))]
    pub max_delay_ms: u64,
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_attempts,
            Duration::from_millis(self.min_delay_ms),
            Duration::from_millis(self.max_delay_ms.max(self.min_delay_ms)),
        )
    }
}

// ============================================================================
// CONFIG
// ============================================================================

/// Application configuration
#[derive(Debug, Clone, Validate)]
pub struct Config {
    #[validate(nested)]
    pub elastic: ElasticConfig,
    #[validate(nested)]
    pub kismet: KismetConfig,
    #[validate(nested)]
    pub ollama: OllamaConfig,
    #[validate(nested)]
    pub sync: SyncConfig,
    #[validate(nested)]
    pub enrich: EnrichConfig,
    pub model: ModelConfig,
    #[validate(nested)]
    pub retry: RetryConfig,
    /// Status server port, 0 disables it
    pub status_port: u16,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, FatalConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup (tests use a map)
    pub fn from_lookup<F>(lookup: F) -> Result<Self, FatalConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let vars = Vars(&lookup);

        let identity = match vars.get("IDENTITY_MODE").as_deref() {
            None | Some("latest") => IdentityMode::Latest,
            Some("window") => IdentityMode::Window {
                secs: vars.parse("OBSERVATION_WINDOW_SECS", constants::DEFAULT_OBSERVATION_WINDOW_SECS)?
                    .max(1),
            },
            Some(other) => {
                return Err(FatalConfigError::Invalid {
                    option: "IDENTITY_MODE",
                    reason: format!("expected `latest` or `window`, got `{}`", other),
                })
            }
        };

        let config = Self {
            elastic: ElasticConfig {
                url: vars.string("ES_URL", constants::DEFAULT_ES_URL),
                index: vars.string("ES_INDEX", constants::DEFAULT_ES_INDEX),
                username: vars.get("ES_USERNAME"),
                password: vars.get("ES_PASSWORD"),
                api_key: vars.get("ES_API_KEY"),
                verify_certs: vars.flag("ES_VERIFY_CERTS", false)?,
                timeout_secs: vars.parse("HTTP_TIMEOUT_SECS", constants::DEFAULT_HTTP_TIMEOUT_SECS)?,
            },
            kismet: KismetConfig {
                url: vars.string("KISMET_URL", constants::DEFAULT_KISMET_URL),
                api_key: vars.get("KISMET_API_KEY"),
                username: vars.get("KISMET_USERNAME"),
                password: vars.get("KISMET_PASSWORD"),
                timeout_secs: vars.parse("HTTP_TIMEOUT_SECS", constants::DEFAULT_HTTP_TIMEOUT_SECS)?,
            },
            ollama: OllamaConfig {
                enabled: vars.flag("CONTEXT_ENABLED", true)?,
                url: vars
                    .string("OLLAMA_URL", constants::DEFAULT_OLLAMA_URL)
                    .trim_end_matches('/')
                    .to_string(),
                model: vars.string("OLLAMA_MODEL", constants::DEFAULT_OLLAMA_MODEL),
                temperature: vars.parse("OLLAMA_TEMPERATURE", constants::DEFAULT_OLLAMA_TEMPERATURE)?,
                timeout_secs: vars.parse("LLM_TIMEOUT_SECS", constants::DEFAULT_LLM_TIMEOUT_SECS)?,
            },
            sync: SyncConfig {
                poll_seconds: vars.parse("SYNC_POLL_SECONDS", constants::DEFAULT_SYNC_POLL_SECONDS)?,
                batch_size: vars.parse("SYNC_BATCH_SIZE", constants::DEFAULT_SYNC_BATCH_SIZE)?,
                initial_lookback_secs: vars
                    .parse("INITIAL_LOOKBACK_SECS", constants::DEFAULT_INITIAL_LOOKBACK_SECS)?,
                cursor_path: vars
                    .get("CURSOR_PATH")
                    .map(PathBuf::from)
                    .unwrap_or_else(constants::default_cursor_path),
                identity,
                sensor: SensorInfo {
                    id: vars
                        .get("SENSOR_ID")
                        .unwrap_or_else(constants::default_sensor_id),
                    site: vars.get("SENSOR_SITE"),
                },
            },
            enrich: EnrichConfig {
                poll_seconds: vars.parse("POLL_SECONDS", constants::DEFAULT_ENRICH_POLL_SECONDS)?,
                batch_size: vars.parse("BATCH_SIZE", constants::DEFAULT_ENRICH_BATCH_SIZE)?,
                concurrency: vars.parse("ENRICH_CONCURRENCY", constants::DEFAULT_ENRICH_CONCURRENCY)?,
                time_window: vars.get("TIME_WINDOW"),
                score_timeout_ms: vars.parse("SCORE_TIMEOUT_MS", constants::DEFAULT_SCORE_TIMEOUT_MS)?,
            },
            model: ModelConfig {
                path: vars.get("MODEL_PATH").map(PathBuf::from),
                metadata_path: vars.get("MODEL_METADATA_PATH").map(PathBuf::from),
            },
            retry: RetryConfig {
                max_attempts: vars.parse("RETRY_MAX_ATTEMPTS", constants::DEFAULT_RETRY_MAX_ATTEMPTS)?,
                min_delay_ms: vars.parse("RETRY_MIN_DELAY_MS", constants::DEFAULT_RETRY_MIN_DELAY_MS)?,
                max_delay_ms: vars.parse("RETRY_MAX_DELAY_MS", constants::DEFAULT_RETRY_MAX_DELAY_MS)?,
            },
            status_port: vars.parse("STATUS_PORT", constants::DEFAULT_STATUS_PORT)?,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn sync_interval(&self) -> Duration {
        Duration::from_secs(self.sync.poll_seconds)
    }

    pub fn enrich_interval(&self) -> Duration {
        Duration::from_secs(self.enrich.poll_seconds)
    }

    /// Log the resolved configuration without secrets
    pub fn log_summary(&self) {
        tracing::info!("  Elasticsearch: {} (index: {})", self.elastic.url, self.elastic.index);
        tracing::info!("  Kismet: {}", self.kismet.url);
        tracing::info!(
            "  Sensor: {} (site: {})",
            self.sync.sensor.id,
            self.sync.sensor.site.as_deref().unwrap_or("-")
        );
        tracing::info!("  Identity: {:?}", self.sync.identity);
        tracing::info!(
            "  Sync: every {}s, batch {}",
            self.sync.poll_seconds,
            self.sync.batch_size
        );
        tracing::info!(
            "  Enrichment: every {}s, page {}, fan-out {}",
            self.enrich.poll_seconds,
            self.enrich.batch_size,
            self.enrich.concurrency
        );
        match &self.model.path {
            Some(path) => tracing::info!("  Model: {}", path.display()),
            None => tracing::info!("  Model: none (scoring disabled)"),
        }
        if self.ollama.enabled {
            tracing::info!("  Ollama: {} (model: {})", self.ollama.url, self.ollama.model);
        } else {
            tracing::info!("  Ollama: disabled");
        }
    }
}

// ============================================================================
// HELPERS
// ============================================================================

struct Vars<'a, F: Fn(&str) -> Option<String>>(&'a F);

impl<'a, F: Fn(&str) -> Option<String>> Vars<'a, F> {
    /// Non-empty value, trimmed
    fn get(&self, key: &str) -> Option<String> {
        (self.0)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn string(&self, key: &str, default: &str) -> String {
        self.get(key).unwrap_or_else(|| default.to_string())
    }

    fn parse<T>(&self, key: &'static str, default: T) -> Result<T, FatalConfigError>
    where
        T: FromStr,
        T::Err: Display,
    {
        match self.get(key) {
            None => Ok(default),
            Some(raw) => raw.parse().map_err(|e: T::Err| FatalConfigError::Invalid {
                option: key,
                reason: format!("`{}`: {}", raw, e),
            }),
        }
    }

    fn flag(&self, key: &'static str, default: bool) -> Result<bool, FatalConfigError> {
        match self.get(key).map(|v| v.to_lowercase()).as_deref() {
            None => Ok(default),
            Some("true" | "1" | "yes" | "on") => Ok(true),
            Some("false" | "0" | "no" | "off") => Ok(false),
            Some(other) => Err(FatalConfigError::Invalid {
                option: key,
                reason: format!("expected a boolean, got `{}`", other),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(pairs: &[(&str, &str)]) -> Result<Config, FatalConfigError> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|k| map.get(k).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&[("SENSOR_ID", "lab-1")]).unwrap();
        assert_eq!(config.elastic.url, "https://es01:9200");
        assert_eq!(config.elastic.index, "wids-wireless-features");
        assert!(!config.elastic.verify_certs);
        assert_eq!(config.enrich.batch_size, 10);
        assert_eq!(config.sync.identity, IdentityMode::Latest);
        assert_eq!(config.sync.sensor.id, "lab-1");
        assert!(config.model.path.is_none());
        assert!(config.ollama.enabled);
    }

    #[test]
    fn test_window_identity() {
        let config = load(&[("IDENTITY_MODE", "window"), ("OBSERVATION_WINDOW_SECS", "60")]).unwrap();
        assert_eq!(config.sync.identity, IdentityMode::Window { secs: 60 });
    }

    #[test]
    fn test_rejects_bad_number() {
        let err = load(&[("BATCH_SIZE", "ten")]).unwrap_err();
        assert!(matches!(err, FatalConfigError::Invalid { option: "BATCH_SIZE", .. }));
    }

    #[test]
    fn test_rejects_zero_concurrency() {
        let err = load(&[("ENRICH_CONCURRENCY", "0")]).unwrap_err();
        assert!(matches!(err, FatalConfigError::Validation(_)));
    }

    #[test]
    fn test_rejects_unknown_identity_mode() {
        assert!(load(&[("IDENTITY_MODE", "hourly")]).is_err());
    }

    #[test]
    fn test_metadata_path_defaults_next_to_model() {
        let config = load(&[("MODEL_PATH", "/models/iforest.onnx")]).unwrap();
        assert_eq!(
            config.model.resolved_metadata_path(),
            Some(PathBuf::from("/models/iforest.onnx.json"))
        );
    }
}
