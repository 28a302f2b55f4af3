//! Configuration for the relay binary.
//!
//! All configuration is loaded from environment variables. Every variable
//! is optional; unset variables fall back to defaults, set-but-unparsable
//! ones are an error.

use centrale_relay::relay::{RelayOptions, DEFAULT_COMMAND_BUFFER, DEFAULT_SUBSCRIBER_BUFFER};
use centrale_relay::state::DEFAULT_MAX_BODY_BYTES;
use centrale_relay::ServerConfig;

use crate::error::ConfigError;

/// Default TCP port, matching the dashboards' default `ws://localhost:3000`.
const DEFAULT_PORT: u16 = 3000;

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Pretty,
    /// One JSON object per line.
    Json,
}

/// Complete relay configuration loaded from the environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayConfig {
    /// Address to bind.
    pub host: String,
    /// TCP port to listen on.
    pub port: u16,
    /// Frames a dashboard may fall behind before it is disconnected.
    pub subscriber_buffer: usize,
    /// Largest accepted producer request body, in bytes.
    pub max_body_bytes: usize,
    /// Log output format.
    pub log_format: LogFormat,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            host: String::from("0.0.0.0"),
            port: DEFAULT_PORT,
            subscriber_buffer: DEFAULT_SUBSCRIBER_BUFFER,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            log_format: LogFormat::Pretty,
        }
    }
}

impl RelayConfig {
    /// Load configuration from environment variables.
    ///
    /// Optional variables:
    /// - `HOST` -- bind address (default `0.0.0.0`)
    /// - `PORT` -- listening port (default `3000`)
    /// - `SUBSCRIBER_BUFFER` -- per-dashboard frame queue, must be > 0 (default 256)
    /// - `MAX_BODY_BYTES` -- producer request body limit (default 65536)
    /// - `LOG_FORMAT` -- `pretty` or `json` (default `pretty`)
    ///
    /// Log verbosity is controlled separately through `RUST_LOG`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let host = lookup("HOST").unwrap_or(defaults.host);
        let port = parse_or(&lookup, "PORT", defaults.port)?;
        let subscriber_buffer = parse_or(&lookup, "SUBSCRIBER_BUFFER", defaults.subscriber_buffer)?;
        if subscriber_buffer == 0 {
            return Err(ConfigError::Invalid {
                name: "SUBSCRIBER_BUFFER",
                message: String::from("must be greater than zero"),
            });
        }
        let max_body_bytes = parse_or(&lookup, "MAX_BODY_BYTES", defaults.max_body_bytes)?;

        let log_format = match lookup("LOG_FORMAT").as_deref() {
            None | Some("pretty") => LogFormat::Pretty,
            Some("json") => LogFormat::Json,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    name: "LOG_FORMAT",
                    message: format!("unknown format `{other}` (expected `pretty` or `json`)"),
                });
            }
        };

        Ok(Self {
            host,
            port,
            subscriber_buffer,
            max_body_bytes,
            log_format,
        })
    }

    /// Listener settings for the HTTP server.
    pub fn server(&self) -> ServerConfig {
        ServerConfig {
            host: self.host.clone(),
            port: self.port,
        }
    }

    /// Tuning for the relay task.
    pub const fn relay_options(&self) -> RelayOptions {
        RelayOptions {
            subscriber_buffer: self.subscriber_buffer,
            command_buffer: DEFAULT_COMMAND_BUFFER,
        }
    }
}

/// Parse an optional variable, falling back to `default` when unset.
fn parse_or<F, T>(lookup: &F, name: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    lookup(name).map_or(Ok(default), |raw| {
        raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            name,
            message: format!("`{raw}`: {e}"),
        })
    })
}
