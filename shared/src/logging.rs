//! Shared logging utilities for consistent tracing across agents and the controller

use crate::types::NodeId;
use chrono::{DateTime, Utc};
use tracing::{error, info};

/// Build the filter directive for the current node
pub fn filter_directive(node: &NodeId, log_level: Option<&str>) -> String {
    let base_level = log_level.unwrap_or("info");

    match node {
        NodeId::Agent(_) => format!("agent={base_level},shared={base_level}"),
        NodeId::Controller => format!("controller={base_level},shared={base_level}"),
        NodeId::Unassigned => base_level.to_string(),
    }
}

/// Initialize the tracing subscriber for the current node
///
/// `RUST_LOG` wins over the computed directive when set.
pub fn init_tracing(log_level: Option<&str>) {
    use tracing_subscriber::{fmt, EnvFilter};

    let directive = filter_directive(NodeId::current(), log_level);
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&directive));

    let _ = fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .try_init();
}

/// Get formatted timestamp for consistent logging
pub fn format_timestamp() -> String {
    let now: DateTime<Utc> = Utc::now();
    now.format("%H:%M:%S%.3f").to_string()
}

/// Macro for node-aware info logging
#[macro_export]
macro_rules! node_info {
    ($node:expr, $($arg:tt)*) => {
        tracing::info!(
            node = %$node,
            timestamp = $crate::logging::format_timestamp(),
            $($arg)*
        );
    };
}

/// Macro for node-aware warning logging
#[macro_export]
macro_rules! node_warn {
    ($node:expr, $($arg:tt)*) => {
        tracing::warn!(
            node = %$node,
            timestamp = $crate::logging::format_timestamp(),
            $($arg)*
        );
    };
}

/// Macro for node-aware error logging
#[macro_export]
macro_rules! node_error {
    ($node:expr, $($arg:tt)*) => {
        tracing::error!(
            node = %$node,
            timestamp = $crate::logging::format_timestamp(),
            $($arg)*
        );
    };
}

/// Macro for node-aware debug logging
#[macro_export]
macro_rules! node_debug {
    ($node:expr, $($arg:tt)*) => {
        tracing::debug!(
            node = %$node,
            timestamp = $crate::logging::format_timestamp(),
            $($arg)*
        );
    };
}

/// Contextual logging helper for startup messages
pub fn log_startup(node: &NodeId, details: &str) {
    info!(
        node = %node,
        timestamp = format_timestamp(),
        "🚀 Starting {}",
        details
    );
}

/// Contextual logging helper for shutdown messages
pub fn log_shutdown(node: &NodeId, reason: &str) {
    info!(
        node = %node,
        timestamp = format_timestamp(),
        "🛑 Shutting down: {}",
        reason
    );
}

/// Contextual logging helper for error conditions
pub fn log_error(node: &NodeId, context: &str, error: &dyn std::fmt::Display) {
    error!(
        node = %node,
        timestamp = format_timestamp(),
        error = %error,
        "❌ {} failed: {}",
        context,
        error
    );
}

/// Contextual logging helper for success conditions
pub fn log_success(node: &NodeId, message: &str) {
    info!(
        node = %node,
        timestamp = format_timestamp(),
        "✅ {}",
        message
    );
}
