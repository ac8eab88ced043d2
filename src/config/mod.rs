//! Configuration loading and management
//!
//! [`ServiceConfig`] is built once (from the environment, YAML, or by hand)
//! and handed to the service builder. Nothing in the service reads the
//! environment on its own.
//!
//! | Variable     | Field               | Default  |
//! |--------------|---------------------|----------|
//! | `JWT_SECRET` | `token.secret`      | `""`     |
//! | `JWT_ISSUER` | `token.issuer`      | none     |
//! | `JWT_EXPIRE` | `token.expires_in`  | none     |
//! | `LOG_LEVEL`  | `verbosity`         | `HIGH`   |

use anyhow::Result;
use chrono::Duration;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::core::error::ConfigError;

/// Diagnostic verbosity of the service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Verbosity {
    /// Trace every resolved listing query before it runs
    #[default]
    High,
    /// No query traces
    Low,
}

impl Verbosity {
    /// `HIGH` (any case) is high, anything else is low
    pub fn parse(s: &str) -> Self {
        if s.trim().eq_ignore_ascii_case("high") {
            Verbosity::High
        } else {
            Verbosity::Low
        }
    }
}

/// Token signing settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenConfig {
    /// Shared HS256 secret
    #[serde(default)]
    pub secret: String,

    /// `iss` claim put in issued tokens and required on verification
    #[serde(default)]
    pub issuer: Option<String>,

    /// Token lifetime: seconds, or a number with a unit (`15m`, `12h`, `7 days`)
    #[serde(default)]
    pub expires_in: Option<String>,
}

impl TokenConfig {
    /// Parsed token lifetime, `None` for tokens that never expire
    pub fn expiry(&self) -> Result<Option<Duration>, ConfigError> {
        self.expires_in
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .map(parse_duration)
            .transpose()
    }
}

/// Complete configuration for an entity service
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceConfig {
    #[serde(default)]
    pub token: TokenConfig,

    #[serde(default)]
    pub verbosity: Verbosity,
}

impl ServiceConfig {
    /// Load configuration from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from any key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let config = Self {
            token: TokenConfig {
                secret: lookup("JWT_SECRET").unwrap_or_default(),
                issuer: lookup("JWT_ISSUER").filter(|s| !s.is_empty()),
                expires_in: lookup("JWT_EXPIRE").filter(|s| !s.is_empty()),
            },
            verbosity: lookup("LOG_LEVEL")
                .map(|s| Verbosity::parse(&s))
                .unwrap_or_default(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a YAML file
    pub fn from_yaml_file(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    /// Load configuration from a YAML string
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Check values that are only parsed on use
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.token.expiry()?;
        if self.token.secret.is_empty() {
            tracing::warn!("JWT secret is empty, issued tokens are trivially forgeable");
        }
        Ok(())
    }
}

/// Parse a lifetime such as `3600`, `90s`, `15m`, `12h`, `7d`, `2 weeks` or `1y`.
///
/// A bare number counts seconds.
pub fn parse_duration(input: &str) -> Result<Duration, ConfigError> {
    let invalid = |message: String| ConfigError::InvalidValue {
        field: "token.expires_in".to_string(),
        message,
    };

    let re = Regex::new(
        r"(?i)^\s*(\d+)\s*(ms|msecs?|milliseconds?|s|secs?|seconds?|m|mins?|minutes?|h|hrs?|hours?|d|days?|w|weeks?|y|yrs?|years?)?\s*$",
    )
    .map_err(|e| invalid(e.to_string()))?;

    let caps = re
        .captures(input)
        .ok_or_else(|| invalid(format!("cannot parse duration '{}'", input)))?;

    let amount: i64 = caps[1]
        .parse()
        .map_err(|e: std::num::ParseIntError| invalid(e.to_string()))?;

    let unit = caps
        .get(2)
        .map(|m| m.as_str().to_ascii_lowercase())
        .unwrap_or_default();

    let seconds_per_unit: i64 = match unit.as_str() {
        "ms" | "msec" | "msecs" | "millisecond" | "milliseconds" => {
            return Ok(Duration::milliseconds(amount));
        }
        "" | "s" | "sec" | "secs" | "second" | "seconds" => 1,
        "m" | "min" | "mins" | "minute" | "minutes" => 60,
        "h" | "hr" | "hrs" | "hour" | "hours" => 3_600,
        "d" | "day" | "days" => 86_400,
        "w" | "week" | "weeks" => 604_800,
        _ => 31_557_600,
    };

    amount
        .checked_mul(seconds_per_unit)
        .and_then(Duration::try_seconds)
        .ok_or_else(|| invalid(format!("duration '{}' is out of range", input)))
}
