//! Runtime Configuration
//!
//! Settings are read once per thread when the runtime is first touched
//! (see [`RuntimeConfig::from_env`]) and can be replaced at any time with
//! [`Runtime::configure`](crate::reactive::Runtime::configure).
//!
//! | Variable               | Default     |
//! |------------------------|-------------|
//! | `WEFT_MAX_PROPAGATION` | `1000000`   |
//! | `WEFT_WARN_UNOWNED`    | `true`      |

use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Default bound on computations run in a single propagation pass.
pub const DEFAULT_MAX_PROPAGATION: usize = 1_000_000;

/// Per-thread runtime settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Number of computation runs in one flush after which the batch is
    /// aborted as a runaway dependency cycle.
    pub max_propagation: usize,

    /// Emit a warning when a memo or effect is created with no owning scope.
    pub warn_unowned: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_propagation: DEFAULT_MAX_PROPAGATION,
            warn_unowned: true,
        }
    }
}

impl RuntimeConfig {
    /// Build a config from `WEFT_*` environment variables, falling back to
    /// defaults for anything unset or unparsable.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_propagation: env_or("WEFT_MAX_PROPAGATION", defaults.max_propagation),
            warn_unowned: env_or("WEFT_WARN_UNOWNED", defaults.warn_unowned),
        }
    }

    /// Parse a config from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn with_max_propagation(mut self, limit: usize) -> Self {
        self.max_propagation = limit;
        self
    }

    pub fn with_warn_unowned(mut self, warn: bool) -> Self {
        self.warn_unowned = warn;
        self
    }
}

fn env_or<T: FromStr>(name: &str, default: T) -> T {
    match std::env::var(name) {
        Ok(raw) => match raw.trim().parse() {
            Ok(value) => value,
            Err(_) => {
                tracing::warn!(variable = name, value = %raw, "ignoring unparsable runtime setting");
                default
            }
        },
        Err(_) => default,
    }
}
