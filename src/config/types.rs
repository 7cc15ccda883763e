//! Configuration types for the trading client
//!
//! All settings are loaded from YAML (with env overrides for the URLs)
//! and shared read-only across tasks.

use serde::{Deserialize, Serialize};

use crate::error::AppError;

// ============================================================================
// Defaults
// ============================================================================

/// Displayed levels per side of the book window
const DEFAULT_BOOK_DEPTH: usize = 5;
/// Price grid used for bucketing and for sizing the window
const DEFAULT_BOOK_STEP: f64 = 1.0;
/// Midpoint drift (in price units) required before the anchor re-centers
const DEFAULT_ADJUSTMENT_THRESHOLD: f64 = 2.0;
/// Anchor seed when the book has never shown a positive midpoint
const DEFAULT_PRICE: f64 = 100.0;
/// Maximum markets a participant may complete in one session
const DEFAULT_MAX_MARKETS: u32 = 4;
/// Trader-attribute poll interval in seconds
const DEFAULT_ATTRIBUTE_POLL_SECS: u64 = 10;

fn default_book_depth() -> usize {
    DEFAULT_BOOK_DEPTH
}
fn default_book_step() -> f64 {
    DEFAULT_BOOK_STEP
}
fn default_adjustment_threshold() -> f64 {
    DEFAULT_ADJUSTMENT_THRESHOLD
}
fn default_price() -> f64 {
    DEFAULT_PRICE
}
fn default_max_markets() -> u32 {
    DEFAULT_MAX_MARKETS
}
fn default_attribute_poll_secs() -> u64 {
    DEFAULT_ATTRIBUTE_POLL_SECS
}
fn default_state_dir() -> String {
    ".state".to_string()
}

// ============================================================================
// Configuration Structs
// ============================================================================

/// Order-book display window settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookConfig {
    /// Levels shown per side, i.e. the window spans `depth * step` around the anchor
    #[serde(default = "default_book_depth")]
    pub depth: usize,
    /// Price grid for bucketing levels
    #[serde(default = "default_book_step")]
    pub step: f64,
    /// Midpoint drift required before the anchor moves
    #[serde(default = "default_adjustment_threshold")]
    pub adjustment_threshold: f64,
    /// Anchor seed used until a positive midpoint is observed
    #[serde(default = "default_price")]
    pub default_price: f64,
}

impl Default for BookConfig {
    fn default() -> Self {
        Self {
            depth: DEFAULT_BOOK_DEPTH,
            step: DEFAULT_BOOK_STEP,
            adjustment_threshold: DEFAULT_ADJUSTMENT_THRESHOLD,
            default_price: DEFAULT_PRICE,
        }
    }
}

impl BookConfig {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.depth == 0 {
            return Err(AppError::Config("book.depth must be > 0".to_string()));
        }
        if !(self.step.is_finite() && self.step > 0.0) {
            return Err(AppError::Config(format!(
                "book.step must be a positive finite number (got {})",
                self.step
            )));
        }
        if !(self.adjustment_threshold.is_finite() && self.adjustment_threshold > 0.0) {
            return Err(AppError::Config(format!(
                "book.adjustment_threshold must be a positive finite number (got {})",
                self.adjustment_threshold
            )));
        }
        if !(self.default_price.is_finite() && self.default_price > 0.0) {
            return Err(AppError::Config(format!(
                "book.default_price must be a positive finite number (got {})",
                self.default_price
            )));
        }
        Ok(())
    }
}

/// Root client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// WebSocket base URL, e.g. `wss://host/trader/`
    pub ws_url: String,
    /// HTTP base URL for the session/trader endpoints
    pub http_url: String,
    #[serde(default)]
    pub book: BookConfig,
    #[serde(default)]
    pub reconnect: crate::connection::ReconnectConfig,
    #[serde(default = "default_attribute_poll_secs")]
    pub attribute_poll_secs: u64,
    #[serde(default = "default_max_markets")]
    pub max_markets: u32,
    /// Directory for the persisted session state files
    #[serde(default = "default_state_dir")]
    pub state_dir: String,
}

impl ClientConfig {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.ws_url.trim().is_empty() {
            return Err(AppError::Config("ws_url cannot be empty".to_string()));
        }
        if !(self.ws_url.starts_with("ws://") || self.ws_url.starts_with("wss://")) {
            return Err(AppError::Config(format!(
                "ws_url must start with ws:// or wss:// (got '{}')",
                self.ws_url
            )));
        }
        if self.http_url.trim().is_empty() {
            return Err(AppError::Config("http_url cannot be empty".to_string()));
        }
        if self.max_markets == 0 {
            return Err(AppError::Config("max_markets must be > 0".to_string()));
        }
        // A zero period would panic inside tokio::time::interval
        if self.attribute_poll_secs == 0 {
            return Err(AppError::Config(
                "attribute_poll_secs must be > 0".to_string(),
            ));
        }
        self.book.validate()?;
        self.reconnect.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> ClientConfig {
        ClientConfig {
            ws_url: "wss://example.org/trader/".to_string(),
            http_url: "https://example.org/api/".to_string(),
            book: BookConfig::default(),
            reconnect: Default::default(),
            attribute_poll_secs: DEFAULT_ATTRIBUTE_POLL_SECS,
            max_markets: DEFAULT_MAX_MARKETS,
            state_dir: ".state".to_string(),
        }
    }

    #[test]
    fn test_valid_config_passes() {
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn test_empty_ws_url_rejected() {
        let mut cfg = valid_config();
        cfg.ws_url = "".to_string();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_non_ws_scheme_rejected() {
        let mut cfg = valid_config();
        cfg.ws_url = "https://example.org/trader/".to_string();
        let err = cfg.validate().unwrap_err().to_string();
        assert!(err.contains("ws://"), "Got: {}", err);
    }

    #[test]
    fn test_zero_depth_rejected() {
        let mut cfg = valid_config();
        cfg.book.depth = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_nan_threshold_rejected() {
        let mut cfg = valid_config();
        cfg.book.adjustment_threshold = f64::NAN;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_zero_max_markets_rejected() {
        let mut cfg = valid_config();
        cfg.max_markets = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_zero_attribute_poll_rejected() {
        let mut cfg = valid_config();
        cfg.attribute_poll_secs = 0;
        let err = cfg.validate().unwrap_err().to_string();
        assert!(err.contains("attribute_poll_secs"), "Got: {}", err);
    }
}
