//! Dispatch service configuration.
//!
//! Reads:
//! - `DISPATCH_TIE_BREAK`: `input_order` (default) or `courier_id`
//! - `DISPATCH_COMMIT_ATTEMPTS`: positive integer, default 3

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{DispatchError, Result};

/// Default number of decide-and-commit rounds before giving up on a shipment.
pub const DEFAULT_COMMIT_ATTEMPTS: u32 = 3;

/// How the engine orders couriers with equal active load.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TieBreak {
    /// First courier in the fleet snapshot wins.
    #[default]
    InputOrder,
    /// Lexicographically smallest courier id wins.
    CourierId,
}

impl TieBreak {
    pub fn as_str(self) -> &'static str {
        match self {
            TieBreak::InputOrder => "input_order",
            TieBreak::CourierId => "courier_id",
        }
    }
}

impl fmt::Display for TieBreak {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TieBreak {
    type Err = DispatchError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "input_order" => Ok(TieBreak::InputOrder),
            "courier_id" => Ok(TieBreak::CourierId),
            other => Err(DispatchError::Config(format!(
                "unknown tie-break '{other}' (expected input_order or courier_id)"
            ))),
        }
    }
}

/// Knobs for [`crate::Dispatcher`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchConfig {
    pub tie_break: TieBreak,
    /// Attempts per shipment when a capacity-guarded commit is refused.
    pub max_commit_attempts: u32,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            tie_break: TieBreak::default(),
            max_commit_attempts: DEFAULT_COMMIT_ATTEMPTS,
        }
    }
}

impl DispatchConfig {
    pub fn with_tie_break(mut self, tie_break: TieBreak) -> Self {
        self.tie_break = tie_break;
        self
    }

    pub fn with_max_commit_attempts(mut self, attempts: u32) -> Self {
        self.max_commit_attempts = attempts;
        self
    }

    /// Create from environment variables, falling back to defaults for unset keys.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same resolution as [`DispatchConfig::from_env`] over an arbitrary lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(raw) = lookup("DISPATCH_TIE_BREAK") {
            config.tie_break = raw.parse()?;
        }

        if let Some(raw) = lookup("DISPATCH_COMMIT_ATTEMPTS") {
            let attempts: u32 = raw.trim().parse().map_err(|_| {
                DispatchError::Config(format!("DISPATCH_COMMIT_ATTEMPTS is not a number: {raw}"))
            })?;
            if attempts == 0 {
                return Err(DispatchError::Config(
                    "DISPATCH_COMMIT_ATTEMPTS must be at least 1".to_string(),
                ));
            }
            config.max_commit_attempts = attempts;
        }

        Ok(config)
    }
}
