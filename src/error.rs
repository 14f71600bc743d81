//! Error types for the plugin scan engine.

use std::path::PathBuf;

/// Main error type for the scan-and-reconcile engine and local loader.
#[derive(Debug, thiserror::Error)]
pub enum PluginSystemError {
    /// Allocation or bookkeeping failure while folding a candidate into
    /// the working set. Non-fatal everywhere except the Phase A snapshot.
    #[error("insufficient resources: {0}")]
    Resource(String),

    /// Descriptor parse failure, surfaced by a `DescriptorLoader`.
    #[error("malformed plugin descriptor at {path}: {reason}")]
    Malformed { path: PathBuf, reason: String },

    /// Descriptor read or directory enumeration failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A host-returned status, propagated unchanged.
    #[error("host error: {0}")]
    Host(String),

    /// Raised by host registry test doubles and by `uninstall_plugin`'s
    /// not-installed precondition.
    #[error("plugin not found: {0}")]
    PluginNotFound(String),
}

/// Result type used throughout this crate.
pub type Result<T> = std::result::Result<T, PluginSystemError>;
