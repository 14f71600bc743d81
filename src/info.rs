//! The plug-in descriptor record and its version ordering.

use std::cmp::Ordering;
use std::path::PathBuf;
use std::sync::Arc;

/// A dotted-numeric version, e.g. `1.0` or `2.4.1`.
///
/// Shorter sequences compare as if padded with trailing zeros, so
/// `1.0` and `1.0.0` are equal. Parsing a non-numeric component fails
/// the whole version rather than guessing an ordering for it.
#[derive(Debug, Clone, Eq)]
pub struct PluginVersion {
    parts: Vec<u64>,
    raw: String,
}

impl PluginVersion {
    /// Parses a dotted-numeric version string.
    pub fn parse(raw: &str) -> Option<Self> {
        if raw.is_empty() {
            return None;
        }
        let mut parts = Vec::new();
        for component in raw.split('.') {
            parts.push(component.parse::<u64>().ok()?);
        }
        Some(Self {
            parts,
            raw: raw.to_string(),
        })
    }

    /// The original string this version was parsed from.
    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl PartialEq for PluginVersion {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl PartialOrd for PluginVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PluginVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        let len = self.parts.len().max(other.parts.len());
        for i in 0..len {
            let a = self.parts.get(i).copied().unwrap_or(0);
            let b = other.parts.get(i).copied().unwrap_or(0);
            match a.cmp(&b) {
                Ordering::Equal => continue,
                other => return other,
            }
        }
        Ordering::Equal
    }
}

impl std::fmt::Display for PluginVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Compares two optional versions under the glossary's "null < any
/// non-null" rule. Returns `Ordering::Greater` only when `lhs` is
/// strictly newer than `rhs`.
pub fn version_cmp(lhs: &Option<PluginVersion>, rhs: &Option<PluginVersion>) -> Ordering {
    match (lhs, rhs) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(a), Some(b)) => a.cmp(b),
    }
}

/// A named import of another plug-in's extension point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginImport {
    pub plugin_id: String,
    pub version: Option<PluginVersion>,
    pub optional: bool,
}

/// An extension point a plug-in declares for others to extend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtensionPoint {
    pub local_id: String,
    pub name: Option<String>,
}

/// An extension a plug-in contributes to some extension point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extension {
    pub extension_point_id: String,
    pub local_id: Option<String>,
}

/// An immutable-after-parse record describing one plug-in.
///
/// Everything besides `identifier`, `version`, and `path` is opaque to
/// the scan engine and local loader — they exist so a `DescriptorLoader`
/// has somewhere to put what it parsed, but no algorithm in this crate
/// inspects them.
#[derive(Debug, Clone)]
pub struct PluginInfo {
    pub identifier: String,
    pub version: Option<PluginVersion>,
    pub path: PathBuf,
    pub name: Option<String>,
    pub provider_name: Option<String>,
    pub imports: Vec<PluginImport>,
    pub extension_points: Vec<ExtensionPoint>,
    pub extensions: Vec<Extension>,
    pub runtime_library: Option<String>,
}

impl PluginInfo {
    /// Constructs a minimal `PluginInfo` with only the fields this
    /// crate's algorithms care about. Descriptor loaders typically
    /// build the full struct directly instead.
    pub fn new(identifier: impl Into<String>, version: Option<PluginVersion>, path: PathBuf) -> Self {
        Self {
            identifier: identifier.into(),
            version,
            path,
            name: None,
            provider_name: None,
            imports: Vec::new(),
            extension_points: Vec::new(),
            extensions: Vec::new(),
            runtime_library: None,
        }
    }
}

/// The shared-ownership handle a `PluginInfo` is passed around by.
///
/// The scan engine's working set and the host registry both hold
/// clones of this handle; `HostRegistry::use_info`/`release_info` track
/// that sharing independently of `Arc`'s own refcount (see DESIGN.md).
pub type PluginHandle = Arc<PluginInfo>;
