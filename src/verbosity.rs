//! Runtime verbosity control.
//!
//! The level is a plain integer set through the `verbose` endpoint. Besides
//! gating extra request logging it retunes the global log filter:
//!
//! | level | filter             |
//! |-------|--------------------|
//! | ≤ 0   | startup filter     |
//! | 1     | `debug`            |
//! | ≥ 2   | `trace`            |

use std::sync::atomic::{AtomicI32, Ordering};

use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::LogReloadHandle;

/// Process-wide verbosity level.
pub struct Verbosity {
    level: AtomicI32,
    base_filter: String,
    reload: Option<LogReloadHandle>,
}

impl Verbosity {
    /// Verbosity that retunes the installed subscriber through `reload`.
    #[must_use]
    pub fn new(base_filter: impl Into<String>, reload: Option<LogReloadHandle>) -> Self {
        Self {
            level: AtomicI32::new(0),
            base_filter: base_filter.into(),
            reload,
        }
    }

    /// Verbosity that only tracks the level.
    #[must_use]
    pub fn detached() -> Self {
        Self::new("info", None)
    }

    /// Filter restored at level 0.
    #[must_use]
    pub fn base_filter(&self) -> &str {
        &self.base_filter
    }

    /// Current level.
    #[must_use]
    pub fn get(&self) -> i32 {
        self.level.load(Ordering::Relaxed)
    }

    /// Whether extra request logging is on.
    #[must_use]
    pub fn is_verbose(&self) -> bool {
        self.get() > 0
    }

    /// Set the level and apply the matching log filter.
    pub fn set(&self, level: i32) {
        self.level.store(level, Ordering::Relaxed);
        info!(level, "Switched verbosity level");

        let Some(handle) = &self.reload else {
            return;
        };
        let directive = filter_directive(level, &self.base_filter);
        match EnvFilter::try_new(directive) {
            Ok(filter) => {
                if let Err(e) = handle.reload(filter) {
                    warn!(error = %e, "Failed to reload log filter");
                }
            }
            Err(e) => warn!(directive, error = %e, "Invalid log filter directive"),
        }
    }
}

impl std::fmt::Debug for Verbosity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Verbosity")
            .field("level", &self.get())
            .field("base_filter", &self.base_filter)
            .field("reloadable", &self.reload.is_some())
            .finish()
    }
}

fn filter_directive(level: i32, base: &str) -> &str {
    match level {
        i32::MIN..=0 => base,
        1 => "debug",
        _ => "trace",
    }
}
