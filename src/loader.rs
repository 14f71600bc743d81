//! The pluggable discovery source abstraction.

use async_trait::async_trait;

use crate::info::PluginHandle;
use crate::registry::HostRegistry;

/// An abstract discovery source.
///
/// A `Loader` holds whatever private state it needs and exposes a
/// [`scan`](Loader::scan) operation returning a set of candidate
/// plug-in descriptors. Within one returned set the loader must itself
/// apply the highest-version-wins rule itself, so the engine never
/// sees two entries for the same identifier from a single loader.
#[async_trait]
pub trait Loader: Send + Sync {
    /// Scans this loader's backing store for plug-in descriptors.
    ///
    /// Returns `None` to signal "this loader could not scan" — a
    /// non-fatal condition the caller logs and moves past. Each
    /// returned handle is considered newly taken by the caller.
    async fn scan(&self, ctx: &dyn HostRegistry) -> Option<Vec<PluginHandle>>;

    /// Optional release hook invoked with the exact set `scan` last
    /// returned, once the engine is done with it. The default does
    /// nothing — dropping the `Arc`s already reclaims their memory;
    /// override this only for loader-side side effects (closing an
    /// archive handle, freeing scratch buffers) the engine doesn't
    /// know about.
    async fn release_plugins(&self, _ctx: &dyn HostRegistry, _plugins: Vec<PluginHandle>) {}
}
