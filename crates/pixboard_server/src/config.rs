//! Server configuration.

use pixboard_core::Color;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Errors from reading or validating configuration.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// An environment variable holds an unusable value.
    #[error("invalid value {value:?} for {var}: {reason}")]
    InvalidVar {
        /// Variable name.
        var: &'static str,
        /// Raw value.
        value: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The assembled configuration is inconsistent.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Configuration for the canvas server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// WebSocket listen address.
    pub bind_addr: SocketAddr,
    /// Listen address for cross-process admin events (`None` disables it).
    pub admin_addr: Option<SocketAddr>,
    /// Grid width in cells.
    pub width: u32,
    /// Grid height in cells.
    pub height: u32,
    /// Background color, palette id 0.
    pub default_color: String,
    /// Edge length of dirty-tracking chunks.
    pub chunk_size: u32,
    /// Key holding the binary grid snapshot.
    pub grid_key: String,
    /// Key holding the legacy JSON string grid (`None` disables the dual write).
    pub legacy_grid_key: Option<String>,
    /// Key of the durable placement queue.
    pub queue_key: String,
    /// Maximum placements per flush transaction.
    pub flush_batch_size: usize,
    /// Period of the flush worker.
    pub flush_interval: Duration,
    /// Delay between the first unsaved change and the snapshot save.
    pub save_debounce: Duration,
    /// Whether placements without any identity are accepted.
    pub allow_anonymous: bool,
    /// Frames a connection may have waiting before it is dropped as too slow.
    pub outbox_capacity: usize,
}

impl ServerConfig {
    /// Creates a configuration with defaults and the given listen address.
    pub fn new(bind_addr: SocketAddr) -> Self {
        Self {
            bind_addr,
            admin_addr: Some(SocketAddr::from(([127, 0, 0, 1], 8081))),
            width: 100,
            height: 100,
            default_color: "#FFFFFF".to_string(),
            chunk_size: pixboard_core::DEFAULT_CHUNK_SIZE,
            grid_key: "canvas:grid".to_string(),
            legacy_grid_key: Some("canvas:grid:legacy".to_string()),
            queue_key: "canvas:queue".to_string(),
            flush_batch_size: 500,
            flush_interval: Duration::from_secs(5),
            save_debounce: Duration::from_secs(2),
            allow_anonymous: true,
            outbox_capacity: 1024,
        }
    }

    /// Reads configuration from `PIXBOARD_*` environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is malformed or the result is invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Reads configuration through `lookup`, starting from defaults.
    ///
    /// Recognized variables: `PIXBOARD_BIND`, `PIXBOARD_PORT`,
    /// `PIXBOARD_ADMIN_BIND` (`off` disables), `PIXBOARD_WIDTH`,
    /// `PIXBOARD_HEIGHT`, `PIXBOARD_DEFAULT_COLOR`, `PIXBOARD_CHUNK_SIZE`,
    /// `PIXBOARD_GRID_KEY`, `PIXBOARD_LEGACY_GRID_KEY` (`off` disables),
    /// `PIXBOARD_QUEUE_KEY`, `PIXBOARD_FLUSH_BATCH`,
    /// `PIXBOARD_FLUSH_INTERVAL_MS`, `PIXBOARD_SAVE_DEBOUNCE_MS`,
    /// `PIXBOARD_ALLOW_ANONYMOUS`, `PIXBOARD_OUTBOX_CAPACITY`.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is malformed or the result is invalid.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(addr) = parse_var(&lookup, "PIXBOARD_BIND")? {
            config.bind_addr = addr;
        }
        if let Some(port) = parse_var::<u16, _>(&lookup, "PIXBOARD_PORT")? {
            config.bind_addr.set_port(port);
        }
        if let Some(raw) = lookup("PIXBOARD_ADMIN_BIND") {
            config.admin_addr = if raw.eq_ignore_ascii_case("off") {
                None
            } else {
                Some(parse_value("PIXBOARD_ADMIN_BIND", &raw)?)
            };
        }
        if let Some(width) = parse_var(&lookup, "PIXBOARD_WIDTH")? {
            config.width = width;
        }
        if let Some(height) = parse_var(&lookup, "PIXBOARD_HEIGHT")? {
            config.height = height;
        }
        if let Some(color) = lookup("PIXBOARD_DEFAULT_COLOR") {
            config.default_color = color;
        }
        if let Some(size) = parse_var(&lookup, "PIXBOARD_CHUNK_SIZE")? {
            config.chunk_size = size;
        }
        if let Some(key) = lookup("PIXBOARD_GRID_KEY") {
            config.grid_key = key;
        }
        if let Some(key) = lookup("PIXBOARD_LEGACY_GRID_KEY") {
            config.legacy_grid_key = (!key.eq_ignore_ascii_case("off")).then_some(key);
        }
        if let Some(key) = lookup("PIXBOARD_QUEUE_KEY") {
            config.queue_key = key;
        }
        if let Some(batch) = parse_var(&lookup, "PIXBOARD_FLUSH_BATCH")? {
            config.flush_batch_size = batch;
        }
        if let Some(ms) = parse_var(&lookup, "PIXBOARD_FLUSH_INTERVAL_MS")? {
            config.flush_interval = Duration::from_millis(ms);
        }
        if let Some(ms) = parse_var(&lookup, "PIXBOARD_SAVE_DEBOUNCE_MS")? {
            config.save_debounce = Duration::from_millis(ms);
        }
        if let Some(raw) = lookup("PIXBOARD_ALLOW_ANONYMOUS") {
            config.allow_anonymous = parse_bool("PIXBOARD_ALLOW_ANONYMOUS", &raw)?;
        }
        if let Some(capacity) = parse_var(&lookup, "PIXBOARD_OUTBOX_CAPACITY")? {
            config.outbox_capacity = capacity;
        }

        config.validate()?;
        Ok(config)
    }

    /// Checks that the configuration can run a board.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] describing the first problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.width == 0 || self.height == 0 {
            return Err(ConfigError::Invalid(format!(
                "grid dimensions must be positive, got {}x{}",
                self.width, self.height
            )));
        }
        if self.chunk_size == 0 {
            return Err(ConfigError::Invalid("chunk size must be positive".into()));
        }
        if self.flush_batch_size == 0 {
            return Err(ConfigError::Invalid("flush batch size must be positive".into()));
        }
        if self.flush_interval.is_zero() {
            return Err(ConfigError::Invalid("flush interval must be positive".into()));
        }
        if self.outbox_capacity == 0 {
            return Err(ConfigError::Invalid("outbox capacity must be positive".into()));
        }
        self.default_color()?;

        let mut keys = vec![self.grid_key.as_str(), self.queue_key.as_str()];
        if let Some(legacy) = &self.legacy_grid_key {
            keys.push(legacy);
        }
        for key in &keys {
            pixboard_storage::validate_key(key)
                .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        }
        keys.sort_unstable();
        if keys.windows(2).any(|pair| pair[0] == pair[1]) {
            return Err(ConfigError::Invalid(
                "grid, legacy grid and queue keys must differ".into(),
            ));
        }
        Ok(())
    }

    /// Returns the parsed default color.
    ///
    /// # Errors
    ///
    /// Returns an error if `default_color` is not a hex color.
    pub fn default_color(&self) -> Result<Color, ConfigError> {
        Color::parse(&self.default_color)
            .map_err(|e| ConfigError::Invalid(format!("default color: {e}")))
    }

    /// Sets the grid dimensions.
    pub fn with_dimensions(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    /// Sets the default color.
    pub fn with_default_color(mut self, color: impl Into<String>) -> Self {
        self.default_color = color.into();
        self
    }

    /// Sets the admin event listen address.
    pub fn with_admin_addr(mut self, addr: Option<SocketAddr>) -> Self {
        self.admin_addr = addr;
        self
    }

    /// Sets the flush batch size.
    pub fn with_flush_batch_size(mut self, size: usize) -> Self {
        self.flush_batch_size = size;
        self
    }

    /// Sets the flush period.
    pub fn with_flush_interval(mut self, interval: Duration) -> Self {
        self.flush_interval = interval;
        self
    }

    /// Sets the snapshot save debounce.
    pub fn with_save_debounce(mut self, debounce: Duration) -> Self {
        self.save_debounce = debounce;
        self
    }

    /// Sets whether anonymous placements are accepted.
    pub fn with_allow_anonymous(mut self, allow: bool) -> Self {
        self.allow_anonymous = allow;
        self
    }

    /// Sets the per-connection frame backlog.
    pub fn with_outbox_capacity(mut self, capacity: usize) -> Self {
        self.outbox_capacity = capacity;
        self
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new(SocketAddr::from(([127, 0, 0, 1], 8080)))
    }
}

fn parse_value<T>(var: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidVar {
        var,
        value: raw.to_string(),
        reason: e.to_string(),
    })
}

fn parse_var<T, F>(lookup: &F, var: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    lookup(var).map(|raw| parse_value(var, &raw)).transpose()
}

fn parse_bool(var: &'static str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidVar {
            var,
            value: raw.to_string(),
            reason: "expected a boolean".into(),
        }),
    }
}
