//! A concrete [`Loader`] that discovers plug-ins under a set of
//! filesystem directories.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::info::{version_cmp, PluginHandle, PluginInfo};
use crate::loader::Loader;
use crate::registry::HostRegistry;
use crate::DescriptorLoader;

/// An ordered, duplicate-free set of directory paths under byte-equal
/// comparison.
///
/// Registering an already-present path is a no-op; unregistering an
/// absent one is a no-op. Kept as a plain `Vec` rather than a hash set
/// because the set is small (a handful of search paths per host) and
/// insertion order matters for nothing observable, but scan order over
/// it does need to be deterministic run-to-run for tests, which a
/// `Vec` gives for free.
#[derive(Debug, Default)]
struct LocalLoaderState {
    directories: Vec<PathBuf>,
}

impl LocalLoaderState {
    fn register(&mut self, path: PathBuf) {
        if !self.directories.contains(&path) {
            self.directories.push(path);
        }
    }

    fn unregister(&mut self, path: &Path) {
        self.directories.retain(|p| p != path);
    }

    fn unregister_all(&mut self) {
        // The directory set is empty afterwards; unregister_dir for
        // each entry would also work but costs O(n^2).
        self.directories.clear();
    }
}

/// A [`Loader`] backed by an ordered set of filesystem directories.
///
/// Each registered directory's immediate children are treated as
/// candidate plug-in install locations: [`scan`](LocalLoader::scan)
/// enumerates them, hands each one to a [`DescriptorLoader`], and
/// folds the results with the same highest-version-wins rule the
/// engine itself uses in Phase B.
pub struct LocalLoader<D: DescriptorLoader> {
    state: RwLock<LocalLoaderState>,
    descriptor_loader: D,
}

impl<D: DescriptorLoader> LocalLoader<D> {
    pub fn new(descriptor_loader: D) -> Self {
        Self {
            state: RwLock::new(LocalLoaderState::default()),
            descriptor_loader,
        }
    }

    /// Registers a directory to scan. Idempotent.
    pub fn register_dir(&self, path: impl Into<PathBuf>) {
        self.state.write().register(path.into());
    }

    /// Unregisters a directory. No-op if it was never registered.
    pub fn unregister_dir(&self, path: impl AsRef<Path>) {
        self.state.write().unregister(path.as_ref());
    }

    /// Empties the directory set.
    pub fn unregister_all(&self) {
        self.state.write().unregister_all();
    }

    /// Returns the currently registered directories, in registration
    /// order.
    pub fn directories(&self) -> Vec<PathBuf> {
        self.state.read().directories.clone()
    }

    fn is_hidden(name: &std::ffi::OsStr) -> bool {
        match name.to_str() {
            Some(s) => s.is_empty() || s.starts_with('.'),
            // A non-UTF8 name can't start with NUL or '.' in a way we can
            // check cheaply; treat it as visible rather than silently
            // dropping an entry this core can't even identify for logs.
            None => false,
        }
    }

    /// Reconciles `candidate` into `avail` using the same
    /// highest-version-wins rule the scan engine's Phase B applies.
    fn fold_candidate(avail: &mut HashMap<String, PluginHandle>, candidate: PluginInfo) {
        let id = candidate.identifier.clone();
        match avail.get(&id) {
            Some(existing) if version_cmp(&candidate.version, &existing.version) != Ordering::Greater => {
                // tie or lower version: discard the new entry
            }
            _ => {
                avail.insert(id, Arc::new(candidate));
            }
        }
    }
}

#[async_trait]
impl<D: DescriptorLoader + Send + Sync> Loader for LocalLoader<D> {
    async fn scan(&self, _ctx: &dyn HostRegistry) -> Option<Vec<PluginHandle>> {
        let directories = self.directories();
        let mut avail: HashMap<String, PluginHandle> = HashMap::new();

        for dir in &directories {
            let entries = match std::fs::read_dir(dir) {
                Ok(entries) => entries,
                Err(e) => {
                    warn!(target: "plugin_scan", directory = %dir.display(), error = %e, "failed to open plug-in directory");
                    continue;
                }
            };

            for entry in entries {
                let entry = match entry {
                    Ok(entry) => entry,
                    Err(e) => {
                        warn!(target: "plugin_scan", directory = %dir.display(), error = %e, "directory enumeration error, skipping rest of this directory");
                        break;
                    }
                };

                let name = entry.file_name();
                if Self::is_hidden(&name) {
                    continue;
                }

                let path = dir.join(&name);
                match self.descriptor_loader.load_descriptor(&path) {
                    Ok(info) => Self::fold_candidate(&mut avail, info),
                    Err(e) => {
                        warn!(target: "plugin_scan", path = %path.display(), error = %e, "failed to parse plug-in descriptor, skipping");
                        continue;
                    }
                }
            }
        }

        debug!(target: "plugin_scan", count = avail.len(), "local loader scan complete");
        Some(avail.into_values().collect())
    }
}

/// Convenience alias for a [`LocalLoader`] using the reference
/// [`crate::descriptor::TomlDescriptorLoader`].
pub type DefaultLocalLoader = LocalLoader<crate::descriptor::TomlDescriptorLoader>;
