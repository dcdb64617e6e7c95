//! Process-wide default configuration
//!
//! Every [`crate::process_query`] call merges its overrides over the default
//! held here. The default is meant to be set once at startup; replacing it is
//! last-writer-wins and does not affect evaluations already running, since
//! each evaluation resolves its own snapshot.
//!
//! # Usage
//! ```rust
//! use ouroboros_filter::{set_default_config, ConfigOverride, ErrorHandling};
//!
//! // Drop disallowed clauses instead of failing
//! set_default_config(ConfigOverride::new().error_handling(ErrorHandling::silent()));
//! ```

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use tracing::info;

use crate::config::{ConfigOverride, DefaultConfig};

/// Current default, initialized to the built-in base
static DEFAULT_CONFIG: Lazy<RwLock<DefaultConfig>> =
    Lazy::new(|| RwLock::new(DefaultConfig::base()));

/// Snapshot of the current default configuration
pub fn default_config() -> DefaultConfig {
    DEFAULT_CONFIG.read().clone()
}

/// Replace the default configuration
///
/// `defaults` is merged over the built-in base, never over the previous
/// default, so two calls are not cumulative.
pub fn set_default_config(defaults: ConfigOverride) {
    let config = DefaultConfig::base().merged(&defaults);
    info!(
        allowed_fields = config.allowed_fields.len(),
        top_level_operators = config.top_level_operators.len(),
        throw_on_error = config.error_handling.throw_on_error,
        "Replaced default filter configuration"
    );
    *DEFAULT_CONFIG.write() = config;
}

/// Restore the built-in base configuration
pub fn reset_default_config() {
    *DEFAULT_CONFIG.write() = DefaultConfig::base();
}
