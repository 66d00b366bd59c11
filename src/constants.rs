//! Central Configuration Constants
//!
//! Single source of truth for all configuration defaults.
//! Environment variables override every value here (see `config.rs`).

/// App name
pub const APP_NAME: &str = "wids-pipeline";

/// App version
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

// ============================================
// Elasticsearch
// ============================================

pub const DEFAULT_ES_URL: &str = "https://es01:9200";
pub const DEFAULT_ES_INDEX: &str = "wids-wireless-features";

// ============================================
// Kismet
// ============================================

pub const DEFAULT_KISMET_URL: &str = "http://kismet:2501";

// ============================================
// Ollama
// ============================================

pub const DEFAULT_OLLAMA_URL: &str = "http://ollama:11434";
pub const DEFAULT_OLLAMA_MODEL: &str = "llama3.1";
pub const DEFAULT_OLLAMA_TEMPERATURE: f32 = 0.2;
pub const DEFAULT_LLM_TIMEOUT_SECS: u64 = 120;

// ============================================
// Sync loop
// ============================================

/// Sync poll interval (seconds)
pub const DEFAULT_SYNC_POLL_SECONDS: u64 = 10;

/// Max telemetry records handled per poll
pub const DEFAULT_SYNC_BATCH_SIZE: usize = 500;

/// How far back the very first poll reaches when no cursor is persisted
pub const DEFAULT_INITIAL_LOOKBACK_SECS: u64 = 3600;

/// Observation window length for `IDENTITY_MODE=window`
pub const DEFAULT_OBSERVATION_WINDOW_SECS: u64 = 300;

/// Cursor file name inside the data directory
pub const CURSOR_FILE_NAME: &str = "sync_cursor.json";

// ============================================
// Enrichment scanner
// ============================================

pub const DEFAULT_ENRICH_POLL_SECONDS: u64 = 10;
pub const DEFAULT_ENRICH_BATCH_SIZE: usize = 10;
pub const DEFAULT_ENRICH_CONCURRENCY: usize = 4;
pub const DEFAULT_SCORE_TIMEOUT_MS: u64 = 2000;

// ============================================
// Transport
// ============================================

pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_RETRY_MAX_ATTEMPTS: usize = 3;
pub const DEFAULT_RETRY_MIN_DELAY_MS: u64 = 250;
pub const DEFAULT_RETRY_MAX_DELAY_MS: u64 = 5000;

/// Status endpoint port (0 disables the server)
pub const DEFAULT_STATUS_PORT: u16 = 8088;

/// Default tracing filter when RUST_LOG is unset
pub const DEFAULT_LOG_FILTER: &str = "wids_pipeline=info,tower_http=info";

/// Default cursor path: `<local data dir>/wids-pipeline/sync_cursor.json`
pub fn default_cursor_path() -> std::path::PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| std::path::PathBuf::from("."))
        .join(APP_NAME)
        .join(CURSOR_FILE_NAME)
}

/// Sensor id fallback: the machine hostname
pub fn default_sensor_id() -> String {
    hostname::get()
        .map(|h| h.to_string_lossy().to_string())
        .unwrap_or_else(|_| "unknown-sensor".to_string())
}
