//! Configuration
//!
//! Game and server settings, read from environment variables with
//! defaults. Validation runs once at startup; any failure is fatal.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::str::FromStr;

use thiserror::Error;

/// Configuration errors. Startup only.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// Parameters that cannot produce a playable game.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// An environment variable could not be parsed.
    #[error("invalid value for {var}: {value:?}")]
    InvalidValue {
        /// Variable name.
        var: String,
        /// Raw value found.
        value: String,
    },
}

/// Game settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameConfig {
    /// Board dimension (board is `board_dim × board_dim`).
    pub board_dim: usize,
    /// Number of portal pairs.
    pub max_portals: usize,
    /// Player cap. `None` accepts any number of joins.
    pub max_players: Option<usize>,
    /// Event log capacity.
    pub max_logs: usize,
    /// Color of cells that are not portal endpoints.
    pub default_cell_color: String,
    /// Lowest die face.
    pub dice_min: u32,
    /// Highest die face.
    pub dice_max: u32,
    /// Per-viewer push queue capacity.
    pub subscriber_queue: usize,
    /// Seed for board layout and dice. `None` seeds from the clock.
    pub rng_seed: Option<u64>,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            board_dim: 10,
            max_portals: 8,
            max_players: None,
            max_logs: 20,
            default_cell_color: "#FFFFFF".to_string(),
            dice_min: 1,
            dice_max: 6,
            subscriber_queue: 8,
            rng_seed: None,
        }
    }
}

impl GameConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let config = Self {
            board_dim: env_or("BOARD_DIM", defaults.board_dim)?,
            max_portals: env_or("MAX_PORTALS", defaults.max_portals)?,
            max_players: env_opt("MAX_PLAYERS")?,
            max_logs: env_or("MAX_STREAMS", defaults.max_logs)?,
            default_cell_color: std::env::var("DEFAULT_CELL_COLOR")
                .unwrap_or(defaults.default_cell_color),
            dice_min: env_or("DICE_MIN", defaults.dice_min)?,
            dice_max: env_or("DICE_MAX", defaults.dice_max)?,
            subscriber_queue: env_or("SUBSCRIBER_QUEUE", defaults.subscriber_queue)?,
            rng_seed: env_opt("RNG_SEED")?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Number of cells on the board.
    pub fn cell_count(&self) -> usize {
        self.board_dim * self.board_dim
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_board(self.board_dim, self.max_portals, &self.default_cell_color)?;
        if self.max_logs == 0 {
            return Err(invalid("MAX_STREAMS must be > 0"));
        }
        if self.dice_min == 0 {
            return Err(invalid("DICE_MIN must be > 0"));
        }
        if self.dice_min > self.dice_max {
            return Err(invalid("DICE_MIN must be <= DICE_MAX"));
        }
        if self.subscriber_queue == 0 {
            return Err(invalid("SUBSCRIBER_QUEUE must be > 0"));
        }
        if self.max_players == Some(0) {
            return Err(invalid("MAX_PLAYERS must be > 0 when set"));
        }
        Ok(())
    }
}

/// Check board parameters.
///
/// The dimension must be even: only then does the serpentine path run from
/// the bottom-left start to the top-left finish. Portal endpoints are drawn
/// without replacement from every cell except the start and finish, so
/// `2 × max_portals` must fit in `dim² − 2`.
pub fn validate_board(dim: usize, max_portals: usize, color: &str) -> Result<(), ConfigError> {
    if dim < 2 {
        return Err(invalid(format!("board dimension must be >= 2, got {dim}")));
    }
    if dim % 2 != 0 {
        return Err(invalid(format!("board dimension must be even, got {dim}")));
    }
    let cells = dim
        .checked_mul(dim)
        .filter(|cells| *cells <= u32::MAX as usize)
        .ok_or_else(|| invalid(format!("board dimension {dim} is too large")))?;
    let available = cells - 2;
    if max_portals.saturating_mul(2) > available {
        return Err(invalid(format!(
            "{max_portals} portals need {} distinct cells, only {available} available",
            max_portals.saturating_mul(2)
        )));
    }
    if color.trim().is_empty() {
        return Err(invalid("default cell color must not be empty"));
    }
    Ok(())
}

/// Server settings.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address.
    pub bind_addr: SocketAddr,
    /// Maximum concurrent connections.
    pub max_connections: usize,
    /// Server version string.
    pub version: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 8080),
            max_connections: 1000,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

impl ServerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let host: IpAddr = env_or("BIND_HOST", defaults.bind_addr.ip())?;
        let port: u16 = env_or("PORT", defaults.bind_addr.port())?;
        let max_connections = env_or("MAX_CONNECTIONS", defaults.max_connections)?;
        if max_connections == 0 {
            return Err(invalid("MAX_CONNECTIONS must be > 0"));
        }

        Ok(Self {
            bind_addr: SocketAddr::new(host, port),
            max_connections,
            version: defaults.version,
        })
    }
}

fn invalid(message: impl Into<String>) -> ConfigError {
    ConfigError::InvalidConfiguration(message.into())
}

fn parse_var<T: FromStr>(var: &str, raw: &str) -> Result<T, ConfigError> {
    raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
        var: var.to_string(),
        value: raw.to_string(),
    })
}

fn env_or<T: FromStr>(var: &str, default: T) -> Result<T, ConfigError> {
    match std::env::var(var) {
        Ok(raw) => parse_var(var, &raw),
        Err(_) => Ok(default),
    }
}

fn env_opt<T: FromStr>(var: &str) -> Result<Option<T>, ConfigError> {
    match std::env::var(var) {
        Ok(raw) if !raw.trim().is_empty() => parse_var(var, &raw).map(Some),
        _ => Ok(None),
    }
}
