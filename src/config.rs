//! Runtime configuration resolved from the environment.
//!
//! Server discovery order:
//! 1. `BANQUET_SERVER_URL` (explicit base URL)
//! 2. Port file written by the query server (`BANQUET_PORT_FILE`,
//!    default `/tmp/metalsqlite.port`) → `http://[::1]:<port>`
//! 3. `http://[::1]:8080`

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use url::Url;

use crate::stream::DEFAULT_MAX_LINE_LEN;

/// Port file the Go query server writes on startup.
pub const DEFAULT_PORT_FILE: &str = "/tmp/metalsqlite.port";

/// Port used when no port file is available.
pub const FALLBACK_PORT: u16 = 8080;

/// Default connect timeout in seconds.
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

const SERVER_URL_ENV: &str = "BANQUET_SERVER_URL";
const PORT_FILE_ENV: &str = "BANQUET_PORT_FILE";
const MAX_LINE_ENV: &str = "BANQUET_MAX_LINE_BYTES";
const CONNECT_TIMEOUT_ENV: &str = "BANQUET_CONNECT_TIMEOUT_SECS";
const REQUEST_TIMEOUT_ENV: &str = "BANQUET_REQUEST_TIMEOUT_SECS";
const LOG_DIR_ENV: &str = "BANQUET_LOG_DIR";

/// Client configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Base URL of the query server.
    pub server_url: Url,
    /// Upper bound on a single NDJSON line.
    pub max_line_len: usize,
    pub connect_timeout: Duration,
    /// Whole-request timeout. `None` lets long streams run indefinitely.
    pub request_timeout: Option<Duration>,
    /// Directory for the log file in TUI mode.
    pub log_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_url: loopback_url(FALLBACK_PORT),
            max_line_len: DEFAULT_MAX_LINE_LEN,
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            request_timeout: None,
            log_dir: default_log_dir(),
        }
    }
}

impl Config {
    /// Build a configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is set but cannot be parsed.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        config.server_url = match lookup(SERVER_URL_ENV) {
            Some(raw) => Url::parse(raw.trim())
                .with_context(|| format!("Invalid {}: {}", SERVER_URL_ENV, raw))?,
            None => {
                let port_file = lookup(PORT_FILE_ENV)
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_PORT_FILE));
                server_url_from_port_file(&port_file)
            }
        };

        if let Some(raw) = lookup(MAX_LINE_ENV) {
            config.max_line_len = raw
                .trim()
                .parse()
                .with_context(|| format!("Invalid {}: {}", MAX_LINE_ENV, raw))?;
        }

        if let Some(raw) = lookup(CONNECT_TIMEOUT_ENV) {
            let secs: u64 = raw
                .trim()
                .parse()
                .with_context(|| format!("Invalid {}: {}", CONNECT_TIMEOUT_ENV, raw))?;
            config.connect_timeout = Duration::from_secs(secs);
        }

        if let Some(raw) = lookup(REQUEST_TIMEOUT_ENV) {
            let secs: u64 = raw
                .trim()
                .parse()
                .with_context(|| format!("Invalid {}: {}", REQUEST_TIMEOUT_ENV, raw))?;
            config.request_timeout = (secs > 0).then(|| Duration::from_secs(secs));
        }

        if let Some(dir) = lookup(LOG_DIR_ENV) {
            config.log_dir = PathBuf::from(dir);
        }

        Ok(config)
    }
}

/// Resolve the server URL from a port file, falling back to port 8080.
pub fn server_url_from_port_file(path: &Path) -> Url {
    match std::fs::read_to_string(path) {
        Ok(contents) => match contents.trim().parse::<u16>() {
            Ok(port) => {
                tracing::info!("Using server port {} from {}", port, path.display());
                loopback_url(port)
            }
            Err(_) => {
                tracing::warn!(
                    "Ignoring malformed port file {}: {:?}",
                    path.display(),
                    contents.trim()
                );
                loopback_url(FALLBACK_PORT)
            }
        },
        Err(_) => loopback_url(FALLBACK_PORT),
    }
}

/// `http://[::1]:<port>`, where the query server listens.
pub fn loopback_url(port: u16) -> Url {
    let mut url = Url::parse("http://[::1]/").expect("static URL is valid");
    // Setting a port on an http URL with a host cannot fail.
    let _ = url.set_port(Some(port));
    url
}

/// Log directory: `~/.cache/banquet-tui` (XDG) or the platform cache dir.
fn default_log_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("banquet-tui")
}
