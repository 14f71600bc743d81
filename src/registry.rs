//! The host context / registry boundary consumed by the scan engine.

use std::sync::Arc;

use crate::error::Result;
use crate::info::PluginHandle;
use crate::loader::Loader;

/// Lifecycle state of an installed plug-in, as tracked by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PluginState {
    Uninstalled,
    Installed,
    Resolved,
    Starting,
    Active,
    Stopping,
}

/// The host's in-context store of installed plug-ins, their states, and
/// their loader provenance.
///
/// Every method here is synchronous and is expected to be invoked with
/// the host's context lock already held for the call's entire duration
/// — that locking discipline belongs to the host, not this crate, but
/// every `ScanEngine` method assumes a single
/// `HostRegistry` is never called concurrently with itself.
pub trait HostRegistry: Send + Sync {
    /// Returns every loader currently registered with this context, in
    /// the order scans should consult them.
    fn loaders(&self) -> Vec<Arc<dyn Loader>>;

    /// Returns every plug-in currently known to the registry.
    fn get_plugins_info(&self) -> Result<Vec<PluginHandle>>;

    /// Returns the lifecycle state of the plug-in with the given
    /// identifier, or `Uninstalled` if the host has no record of it.
    fn get_plugin_state(&self, id: &str) -> PluginState;

    /// Installs a freshly discovered plug-in under the given loader.
    fn install_plugin(&self, info: PluginHandle, loader: Arc<dyn Loader>) -> Result<()>;

    /// Uninstalls an installed plug-in. Precondition: the plug-in is
    /// not currently running (not `Starting`, `Active`, or `Stopping`).
    fn uninstall_plugin(&self, id: &str) -> Result<()>;

    /// Stops every plug-in the host considers running.
    fn stop_plugins(&self);

    /// Starts the plug-in with the given identifier.
    fn start_plugin(&self, id: &str) -> Result<()>;

    /// Records that the caller now holds a reference to `info`.
    fn use_info(&self, info: &PluginHandle);

    /// Records that the caller has released its reference to `info`.
    fn release_info(&self, info: &PluginHandle);

    /// Reserves a slot for `id` under `loader` in the
    /// `loaders_to_plugins` provenance map, ahead of installing it.
    fn reserve_slot(&self, loader: &Arc<dyn Loader>, id: &str);

    /// Releases a previously reserved slot (used when an install
    /// attempt fails after the reservation was made).
    fn release_slot(&self, loader: &Arc<dyn Loader>, id: &str);

    /// Debug-level, localized logging sink. Default forwards to
    /// `tracing::debug!` with a `plugin_scan` target.
    fn log_debug(&self, message: &str) {
        tracing::debug!(target: "plugin_scan", "{message}");
    }

    /// Error-level, localized logging sink. Default forwards to
    /// `tracing::error!` with a `plugin_scan` target.
    fn log_error(&self, message: &str) {
        tracing::error!(target: "plugin_scan", "{message}");
    }
}
