//! End-to-end scan engine scenarios plus a couple of extra
//! invariant-style property checks (version-wins exclusivity, restart
//! fidelity).

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use plugin_scan::{
    HostRegistry, Loader, PluginHandle, PluginInfo, PluginState, PluginSystemError, PluginVersion,
    Result, ScanEngine, ScanFlags,
};

#[derive(Default)]
struct Inner {
    loaders: Vec<Arc<dyn Loader>>,
    installed: HashMap<String, PluginHandle>,
    states: HashMap<String, PluginState>,
    loader_slots: Vec<(Arc<dyn Loader>, HashSet<String>)>,
    calls: Vec<String>,
    use_counts: HashMap<usize, i64>,
    install_fail: HashSet<String>,
    uninstall_fail: HashSet<String>,
    start_fail: HashSet<String>,
}

/// A test double for the host context: tracks every call the engine
/// makes so scenario expectations can assert on call order, and
/// tracks `use_info`/`release_info` balance per handle.
struct MockRegistry {
    inner: Mutex<Inner>,
}

impl MockRegistry {
    fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
        }
    }

    fn add_loader(&self, loader: Arc<dyn Loader>) {
        self.inner.lock().unwrap().loaders.push(loader);
    }

    fn seed_installed(&self, info: PluginHandle, state: PluginState) {
        let mut inner = self.inner.lock().unwrap();
        inner.states.insert(info.identifier.clone(), state);
        inner.installed.insert(info.identifier.clone(), info);
    }

    fn fail_install(&self, id: &str) {
        self.inner.lock().unwrap().install_fail.insert(id.to_string());
    }

    fn calls(&self) -> Vec<String> {
        self.inner.lock().unwrap().calls.clone()
    }

    fn is_installed(&self, id: &str) -> bool {
        self.inner.lock().unwrap().installed.contains_key(id)
    }

    fn installed_version(&self, id: &str) -> Option<String> {
        self.inner
            .lock()
            .unwrap()
            .installed
            .get(id)
            .and_then(|p| p.version.as_ref().map(|v| v.as_str().to_string()))
    }

    /// All outstanding `use_info` counts should be exactly zero at the
    /// end of a scan: every handle the engine took a reference to was
    /// eventually released.
    fn assert_refcounts_balanced(&self) {
        let inner = self.inner.lock().unwrap();
        for (ptr, count) in inner.use_counts.iter() {
            assert_eq!(*count, 0, "handle {ptr:#x} has unbalanced use/release count {count}");
        }
    }
}

impl HostRegistry for MockRegistry {
    fn loaders(&self) -> Vec<Arc<dyn Loader>> {
        self.inner.lock().unwrap().loaders.clone()
    }

    fn get_plugins_info(&self) -> Result<Vec<PluginHandle>> {
        Ok(self.inner.lock().unwrap().installed.values().cloned().collect())
    }

    fn get_plugin_state(&self, id: &str) -> PluginState {
        self.inner
            .lock()
            .unwrap()
            .states
            .get(id)
            .copied()
            .unwrap_or(PluginState::Uninstalled)
    }

    fn install_plugin(&self, info: PluginHandle, _loader: Arc<dyn Loader>) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if inner.install_fail.contains(&info.identifier) {
            return Err(PluginSystemError::Resource(format!(
                "no room for '{}'",
                info.identifier
            )));
        }
        inner.calls.push(format!("install:{}", info.identifier));
        inner.states.insert(info.identifier.clone(), PluginState::Installed);
        inner.installed.insert(info.identifier.clone(), info);
        Ok(())
    }

    fn uninstall_plugin(&self, id: &str) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if inner.uninstall_fail.contains(id) {
            return Err(PluginSystemError::Host(format!("cannot uninstall '{id}'")));
        }
        inner.calls.push(format!("uninstall:{id}"));
        inner.installed.remove(id);
        inner.states.insert(id.to_string(), PluginState::Uninstalled);
        Ok(())
    }

    fn stop_plugins(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push("stop_plugins".to_string());
        for state in inner.states.values_mut() {
            if matches!(*state, PluginState::Starting | PluginState::Active) {
                *state = PluginState::Installed;
            }
        }
    }

    fn start_plugin(&self, id: &str) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if inner.start_fail.contains(id) {
            return Err(PluginSystemError::Host(format!("cannot start '{id}'")));
        }
        inner.calls.push(format!("start:{id}"));
        inner.states.insert(id.to_string(), PluginState::Active);
        Ok(())
    }

    fn use_info(&self, info: &PluginHandle) {
        let key = Arc::as_ptr(info) as usize;
        *self.inner.lock().unwrap().use_counts.entry(key).or_insert(0) += 1;
    }

    fn release_info(&self, info: &PluginHandle) {
        let key = Arc::as_ptr(info) as usize;
        *self.inner.lock().unwrap().use_counts.entry(key).or_insert(0) -= 1;
    }

    fn reserve_slot(&self, loader: &Arc<dyn Loader>, id: &str) {
        let mut inner = self.inner.lock().unwrap();
        if let Some((_, set)) = inner.loader_slots.iter_mut().find(|(l, _)| Arc::ptr_eq(l, loader)) {
            set.insert(id.to_string());
            return;
        }
        let mut set = HashSet::new();
        set.insert(id.to_string());
        inner.loader_slots.push((loader.clone(), set));
    }

    fn release_slot(&self, loader: &Arc<dyn Loader>, id: &str) {
        let mut inner = self.inner.lock().unwrap();
        if let Some((_, set)) = inner.loader_slots.iter_mut().find(|(l, _)| Arc::ptr_eq(l, loader)) {
            set.remove(id);
        }
    }
}

/// A loader that returns a fixed set of plugins once per `scan`, or
/// `None` to simulate a loader that "could not scan".
struct FakeLoader {
    plugins: Option<Vec<(&'static str, Option<&'static str>)>>,
}

impl FakeLoader {
    fn some(plugins: Vec<(&'static str, Option<&'static str>)>) -> Arc<Self> {
        Arc::new(Self { plugins: Some(plugins) })
    }

    fn none() -> Arc<Self> {
        Arc::new(Self { plugins: None })
    }
}

#[async_trait]
impl Loader for FakeLoader {
    async fn scan(&self, _ctx: &dyn HostRegistry) -> Option<Vec<PluginHandle>> {
        self.plugins.as_ref().map(|list| {
            list.iter()
                .map(|(id, version)| {
                    let version = version.and_then(PluginVersion::parse);
                    Arc::new(PluginInfo::new(id.to_string(), version, PathBuf::from(id)))
                })
                .collect()
        })
    }
}

fn installed_info(id: &str, version: &str) -> PluginHandle {
    Arc::new(PluginInfo::new(id.to_string(), PluginVersion::parse(version), PathBuf::from(id)))
}

#[tokio::test]
async fn s1_empty_filesystem_leaves_registry_unchanged() {
    let ctx = MockRegistry::new();
    ctx.add_loader(FakeLoader::some(vec![]));

    let engine = ScanEngine::default();
    let status = engine.scan(&ctx, ScanFlags::empty()).await;

    assert!(status.is_ok());
    assert!(ctx.calls().is_empty());
    ctx.assert_refcounts_balanced();
}

#[tokio::test]
async fn s2_two_versions_same_id_installs_highest() {
    let ctx = MockRegistry::new();
    ctx.add_loader(FakeLoader::some(vec![("p", Some("1.0"))]));
    ctx.add_loader(FakeLoader::some(vec![("p", Some("2.0"))]));

    let engine = ScanEngine::default();
    let status = engine.scan(&ctx, ScanFlags::empty()).await;

    assert!(status.is_ok());
    let install_calls: Vec<_> = ctx.calls().into_iter().filter(|c| c.starts_with("install:")).collect();
    assert_eq!(install_calls, vec!["install:p".to_string()]);
    assert_eq!(ctx.installed_version("p").as_deref(), Some("2.0"));
    ctx.assert_refcounts_balanced();
}

#[tokio::test]
async fn s3_upgrade_path_runs_phases_in_order() {
    let ctx = MockRegistry::new();
    ctx.seed_installed(installed_info("p", "1.0"), PluginState::Active);
    ctx.add_loader(FakeLoader::some(vec![("p", Some("2.0"))]));

    let engine = ScanEngine::default();
    let flags = ScanFlags::UPGRADE | ScanFlags::STOP_ALL_ON_UPGRADE | ScanFlags::RESTART_ACTIVE;
    let status = engine.scan(&ctx, flags).await;

    assert!(status.is_ok());
    assert_eq!(
        ctx.calls(),
        vec![
            "stop_plugins".to_string(),
            "uninstall:p".to_string(),
            "install:p".to_string(),
            "start:p".to_string(),
        ]
    );
    assert_eq!(ctx.installed_version("p").as_deref(), Some("2.0"));
    ctx.assert_refcounts_balanced();
}

#[tokio::test]
async fn s4_malformed_descriptor_does_not_block_valid_sibling() {
    use plugin_scan::{DefaultLocalLoader, TomlDescriptorLoader};
    use std::fs;

    let temp = tempfile::TempDir::new().unwrap();
    let broken = temp.path().join("broken");
    fs::create_dir_all(&broken).unwrap();
    fs::write(broken.join("plugin.toml"), "identifier = \n").unwrap();

    let valid = temp.path().join("valid");
    fs::create_dir_all(&valid).unwrap();
    fs::write(valid.join("plugin.toml"), "identifier = \"q\"\nversion = \"1.0\"\n").unwrap();

    let local_loader = DefaultLocalLoader::new(TomlDescriptorLoader::new());
    local_loader.register_dir(temp.path());

    let ctx = MockRegistry::new();
    ctx.add_loader(Arc::new(local_loader));

    let engine = ScanEngine::default();
    let status = engine.scan(&ctx, ScanFlags::empty()).await;

    assert!(status.is_ok());
    assert!(ctx.is_installed("q"));
    assert_eq!(
        ctx.calls().into_iter().filter(|c| c.starts_with("install:")).count(),
        1
    );
    ctx.assert_refcounts_balanced();
}

#[tokio::test]
async fn s5_install_failure_aborts_phase_c_but_runs_phase_d() {
    let ctx = MockRegistry::new();
    ctx.seed_installed(installed_info("z", "1.0"), PluginState::Active);
    ctx.fail_install("x");
    ctx.add_loader(FakeLoader::some(vec![("x", Some("1.0")), ("y", Some("1.0"))]));

    let engine = ScanEngine::default();
    let flags = ScanFlags::RESTART_ACTIVE | ScanFlags::STOP_ALL_ON_INSTALL;
    let status = engine.scan(&ctx, flags).await;

    assert!(status.is_err());
    assert!(matches!(status.unwrap_err(), PluginSystemError::Resource(_)));
    // z was snapshotted active in Phase A and is still installed at Phase D; it must be restarted
    // regardless of what happened to x/y in Phase C.
    assert!(ctx.calls().contains(&"start:z".to_string()));
    ctx.assert_refcounts_balanced();
}

#[tokio::test]
async fn s6_one_loader_returning_none_does_not_prevent_another_from_installing() {
    let ctx = MockRegistry::new();
    ctx.add_loader(FakeLoader::none());
    ctx.add_loader(FakeLoader::some(vec![("p", Some("1.0"))]));

    let engine = ScanEngine::default();
    let status = engine.scan(&ctx, ScanFlags::empty()).await;

    assert!(status.is_ok());
    assert!(ctx.is_installed("p"));
    ctx.assert_refcounts_balanced();
}

#[tokio::test]
async fn restart_fidelity_only_restarts_still_installed_snapshotted_plugins() {
    let ctx = MockRegistry::new();
    ctx.seed_installed(installed_info("stays", "1.0"), PluginState::Active);
    ctx.seed_installed(installed_info("removed", "1.0"), PluginState::Active);
    // Simulate "removed" having been uninstalled by something else between the
    // Phase A snapshot and Phase D — Phase D must skip it.
    {
        let mut inner = ctx.inner.lock().unwrap();
        inner.installed.remove("removed");
        inner.states.insert("removed".to_string(), PluginState::Uninstalled);
    }
    ctx.add_loader(FakeLoader::some(vec![]));

    let engine = ScanEngine::default();
    let status = engine.scan(&ctx, ScanFlags::RESTART_ACTIVE | ScanFlags::STOP_ALL_ON_INSTALL).await;

    assert!(status.is_ok());
    let calls = ctx.calls();
    assert!(calls.contains(&"start:stays".to_string()));
    assert!(!calls.contains(&"start:removed".to_string()));
}

#[tokio::test]
async fn version_wins_never_installs_an_identifier_twice() {
    let ctx = MockRegistry::new();
    ctx.add_loader(FakeLoader::some(vec![("p", Some("1.0")), ("p", Some("3.0"))]));
    ctx.add_loader(FakeLoader::some(vec![("p", Some("2.0"))]));

    let engine = ScanEngine::default();
    let status = engine.scan(&ctx, ScanFlags::empty()).await;

    assert!(status.is_ok());
    let install_calls: Vec<_> = ctx.calls().into_iter().filter(|c| c.starts_with("install:")).collect();
    assert_eq!(install_calls.len(), 1);
    assert_eq!(ctx.installed_version("p").as_deref(), Some("3.0"));
}
