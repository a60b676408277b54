//! Shared environment configuration for the IAT binaries.
//!
//! | Variable | Default | Used by |
//! |----------|---------|---------|
//! | `IAT_BASE_PATH` | `.` | all (working directory) |
//! | `IAT_PORT` | `9000` | server |
//! | `IAT_IMAGE_DIR` | `images` | all (stimulus pool) |
//! | `IAT_SINK` | `file` | server (`file`, `rest`, `memory`) |
//! | `IAT_RESULTS_DIR` | `data/results` | file sink |
//! | `IAT_SUPABASE_URL` / `IAT_SUPABASE_KEY` | empty | rest sink |
//! | `IAT_SUPABASE_TABLE` | `iat_results` | rest sink |
//! | `IAT_COMPLETION_URL` | survey panel URL | server |
//! | `IAT_SESSION_IDLE_SECS` | `7200` | server (idle session eviction) |
//! | `IAT_SESSION_FINISHED_SECS` | `600` | server (saved session eviction) |
//! | `RUST_LOG` | `info` | logging |

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::constants::{
    DEFAULT_COMPLETION_URL, DEFAULT_RESULTS_TABLE, FINISHED_SESSION_TTL_SECS, SESSION_IDLE_TTL_SECS,
};
use crate::sink::{JsonFileSink, MemorySink, ResultsSink, SupabaseSink};

fn var_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

/// Install the `tracing` subscriber, filtered by `RUST_LOG` (default `info`).
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Read `IAT_BASE_PATH` (default `"."`) and chdir into it. Exits on failure.
pub fn init_base_path() -> PathBuf {
    let base_path = var_or("IAT_BASE_PATH", ".");
    info!(base_path = %base_path, "IAT_BASE_PATH");
    let path = PathBuf::from(&base_path);
    if let Err(e) = std::env::set_current_dir(&base_path) {
        error!(base_path = %base_path, error = %e, "failed to change directory");
        std::process::exit(1);
    }
    if let Ok(cwd) = std::env::current_dir() {
        info!(cwd = %cwd.display(), "working directory");
    }
    path
}

/// Read `IAT_PORT` (default 9000).
pub fn server_port() -> u16 {
    std::env::var("IAT_PORT")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(9000)
}

/// Read `IAT_IMAGE_DIR` (default `images`).
pub fn image_dir() -> PathBuf {
    PathBuf::from(var_or("IAT_IMAGE_DIR", "images"))
}

/// Read `IAT_COMPLETION_URL`; `{user_id}` is substituted per participant.
pub fn completion_url_template() -> String {
    var_or("IAT_COMPLETION_URL", DEFAULT_COMPLETION_URL)
}

fn secs_or(name: &str, default: u64) -> Duration {
    Duration::from_secs(
        std::env::var(name)
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(default),
    )
}

/// Read `IAT_SESSION_IDLE_SECS` and `IAT_SESSION_FINISHED_SECS`:
/// (idle limit, limit after a successful save).
pub fn session_ttl() -> (Duration, Duration) {
    (
        secs_or("IAT_SESSION_IDLE_SECS", SESSION_IDLE_TTL_SECS),
        secs_or("IAT_SESSION_FINISHED_SECS", FINISHED_SESSION_TTL_SECS),
    )
}

/// Which results sink the server hands finished sessions to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SinkConfig {
    File { dir: PathBuf },
    Rest { url: String, key: String, table: String },
    Memory,
}

impl SinkConfig {
    /// Read `IAT_SINK` and the variables of the chosen sink.
    /// An unknown `IAT_SINK` value falls back to the file sink.
    pub fn from_env() -> Self {
        match var_or("IAT_SINK", "file").as_str() {
            "rest" | "supabase" => SinkConfig::Rest {
                url: var_or("IAT_SUPABASE_URL", ""),
                key: var_or("IAT_SUPABASE_KEY", ""),
                table: var_or("IAT_SUPABASE_TABLE", DEFAULT_RESULTS_TABLE),
            },
            "memory" => SinkConfig::Memory,
            other => {
                if other != "file" {
                    error!(value = other, "unknown IAT_SINK, using file sink");
                }
                SinkConfig::File {
                    dir: PathBuf::from(var_or("IAT_RESULTS_DIR", "data/results")),
                }
            }
        }
    }

    /// Short name for logs; never includes credentials.
    pub fn name(&self) -> &'static str {
        match self {
            SinkConfig::File { .. } => "file",
            SinkConfig::Rest { .. } => "rest",
            SinkConfig::Memory => "memory",
        }
    }

    pub fn build(&self) -> Arc<dyn ResultsSink> {
        match self {
            SinkConfig::File { dir } => Arc::new(JsonFileSink::new(dir.clone())),
            SinkConfig::Rest { url, key, table } => {
                Arc::new(SupabaseSink::new(url.clone(), key.clone(), table.clone()))
            }
            SinkConfig::Memory => Arc::new(MemorySink::new()),
        }
    }
}
