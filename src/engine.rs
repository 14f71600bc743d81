//! The scan-and-reconcile orchestrator.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::Result;
use crate::info::{version_cmp, PluginHandle};
use crate::loader::Loader;
use crate::registry::{HostRegistry, PluginState};

bitflags! {
    /// Independent behavior toggles for [`ScanEngine::scan`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ScanFlags: u32 {
        /// Replace an installed plug-in when a strictly newer version
        /// is discovered.
        const UPGRADE = 1 << 0;
        /// Stop every running plug-in before installing any new one.
        const STOP_ALL_ON_INSTALL = 1 << 1;
        /// Stop every running plug-in before uninstalling one for
        /// upgrade.
        const STOP_ALL_ON_UPGRADE = 1 << 2;
        /// After install/upgrade, restart every plug-in that was
        /// `Starting` or `Active` when the scan began.
        const RESTART_ACTIVE = 1 << 3;
    }
}

impl Default for ScanFlags {
    fn default() -> Self {
        ScanFlags::empty()
    }
}

/// Ambient configuration for a [`ScanEngine`], read once at host
/// startup the way a process-wide `*Config` struct usually is.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScanConfig {
    /// Flags applied when a caller invokes [`ScanEngine::scan_with_defaults`]
    /// instead of passing explicit flags.
    #[serde(with = "scan_flags_serde")]
    pub flags: ScanFlags,

    /// Optional cap on plugins installed during a single scan. Entries
    /// beyond the cap are treated as a non-fatal per-plugin `Resource`
    /// failure rather than aborting the scan.
    pub max_plugins: Option<usize>,
}

mod scan_flags_serde {
    use super::ScanFlags;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(flags: &ScanFlags, s: S) -> std::result::Result<S::Ok, S::Error> {
        flags.bits().serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<ScanFlags, D::Error> {
        let bits = u32::deserialize(d)?;
        Ok(ScanFlags::from_bits_truncate(bits))
    }
}

/// The top-level orchestrator. Stateless between calls — all state it
/// operates on lives in the [`HostRegistry`] passed to
/// [`scan`](ScanEngine::scan).
#[derive(Debug, Default)]
pub struct ScanEngine {
    config: ScanConfig,
}

impl ScanEngine {
    pub fn new(config: ScanConfig) -> Self {
        Self { config }
    }

    /// Runs one scan using `self`'s configured default flags.
    pub async fn scan_with_defaults(&self, ctx: &dyn HostRegistry) -> Result<()> {
        let flags = self.config.flags;
        self.scan(ctx, flags).await
    }

    /// Runs one scan-and-reconcile pass against `ctx` under `flags`.
    pub async fn scan(&self, ctx: &dyn HostRegistry, flags: ScanFlags) -> Result<()> {
        debug!(target: "plugin_scan", ?flags, "scan started");

        let restart_list = self.snapshot_active(ctx, flags)?;

        let avail = self.discover(ctx).await;

        let status = self.reconcile_and_install(ctx, avail, flags);
        let status = self.restart(ctx, &restart_list, status);

        debug!(target: "plugin_scan", ok = status.is_ok(), "scan finished");
        status
    }

    /// Phase A — snapshot the active set, only when the flag
    /// combination below requires it.
    fn snapshot_active(&self, ctx: &dyn HostRegistry, flags: ScanFlags) -> Result<Vec<String>> {
        let needs_snapshot = flags.contains(ScanFlags::RESTART_ACTIVE)
            && (flags.contains(ScanFlags::UPGRADE) || flags.contains(ScanFlags::STOP_ALL_ON_INSTALL));

        if !needs_snapshot {
            return Ok(Vec::new());
        }

        let plugins = ctx.get_plugins_info()?;
        let mut restart_list = Vec::new();
        for info in &plugins {
            let state = ctx.get_plugin_state(&info.identifier);
            if matches!(state, PluginState::Starting | PluginState::Active) {
                restart_list.push(info.identifier.clone());
            }
        }
        Ok(restart_list)
    }

    /// Phase B — discover candidates from every registered loader and
    /// fold them into a single identifier-keyed working set.
    async fn discover(&self, ctx: &dyn HostRegistry) -> HashMap<String, (PluginHandle, Arc<dyn Loader>)> {
        let mut avail: HashMap<String, (PluginHandle, Arc<dyn Loader>)> = HashMap::new();

        for loader in ctx.loaders() {
            let Some(plugins) = loader.scan(ctx).await else {
                ctx.log_debug("loader returned no result; skipping");
                continue;
            };

            for info in &plugins {
                ctx.use_info(info);
            }

            for info in plugins.iter().cloned() {
                match avail.get(&info.identifier) {
                    Some((existing, _)) if version_cmp(&info.version, &existing.version) != Ordering::Greater => {
                        // tie or lower version: release this candidate, keep the incumbent
                        ctx.release_info(&info);
                    }
                    Some((existing, _)) => {
                        let existing = existing.clone();
                        ctx.release_info(&existing);
                        avail.insert(info.identifier.clone(), (info, loader.clone()));
                    }
                    None => {
                        avail.insert(info.identifier.clone(), (info, loader.clone()));
                    }
                }
            }

            loader.release_plugins(ctx, plugins).await;
        }

        avail
    }

    /// Phase C — reconcile the working set against the registry and
    /// drive install/upgrade.
    fn reconcile_and_install(
        &self,
        ctx: &dyn HostRegistry,
        mut avail: HashMap<String, (PluginHandle, Arc<dyn Loader>)>,
        flags: ScanFlags,
    ) -> Result<()> {
        let mut stopped = false;
        let mut installed = 0usize;
        let mut status: Result<()> = Ok(());

        let installed_versions: HashMap<String, PluginHandle> = ctx
            .get_plugins_info()
            .unwrap_or_default()
            .into_iter()
            .map(|p| (p.identifier.clone(), p))
            .collect();

        let ids: Vec<String> = avail.keys().cloned().collect();
        for id in ids {
            let Some((info, loader)) = avail.remove(&id) else {
                continue;
            };

            if let Some(max_plugins) = self.config.max_plugins {
                if installed >= max_plugins {
                    ctx.log_error(&format!("plugin '{id}' exceeds configured max_plugins, skipping"));
                    ctx.release_info(&info);
                    continue;
                }
            }

            let current_state = ctx.get_plugin_state(&id);
            let already_installed = current_state != PluginState::Uninstalled;

            let mut slot_is_empty = !already_installed;

            if already_installed && flags.contains(ScanFlags::UPGRADE) {
                let installed_version = installed_versions.get(&id).and_then(|p| p.version.clone());

                if version_cmp(&info.version, &installed_version) == Ordering::Greater {
                    if !stopped
                        && (flags.contains(ScanFlags::STOP_ALL_ON_UPGRADE)
                            || flags.contains(ScanFlags::STOP_ALL_ON_INSTALL))
                    {
                        ctx.stop_plugins();
                        stopped = true;
                    }

                    if let Err(e) = ctx.uninstall_plugin(&id) {
                        ctx.log_error(&format!("failed to uninstall '{id}' for upgrade: {e}"));
                        status = Err(e);
                        ctx.release_info(&info);
                        break;
                    }

                    slot_is_empty = true;
                }
            }

            if slot_is_empty {
                if !stopped && flags.contains(ScanFlags::STOP_ALL_ON_INSTALL) {
                    ctx.stop_plugins();
                    stopped = true;
                }

                ctx.reserve_slot(&loader, &id);
                match ctx.install_plugin(info.clone(), loader.clone()) {
                    Ok(()) => {
                        installed += 1;
                    }
                    Err(e) => {
                        ctx.release_slot(&loader, &id);
                        ctx.log_error(&format!("failed to install '{id}': {e}"));
                        status = Err(e);
                        ctx.release_info(&info);
                        break;
                    }
                }
            }

            ctx.release_info(&info);
        }

        // Anything left in `avail` when we broke out early is released here.
        for (_, (info, _)) in avail.into_iter() {
            ctx.release_info(&info);
        }

        status
    }

    /// Phase D — restart every plug-in snapshotted in Phase A that is
    /// still installed.
    fn restart(&self, ctx: &dyn HostRegistry, restart_list: &[String], mut status: Result<()>) -> Result<()> {
        for id in restart_list {
            if ctx.get_plugin_state(id) == PluginState::Uninstalled {
                continue;
            }
            if let Err(e) = ctx.start_plugin(id) {
                ctx.log_error(&format!("failed to restart '{id}': {e}"));
                if status.is_ok() {
                    status = Err(e);
                }
            }
        }
        status
    }
}
