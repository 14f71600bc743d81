//! The descriptor parser boundary and a reference TOML implementation.
//!
//! Parsing a descriptor document into a [`PluginInfo`] is explicitly out
//! of scope for the scan engine and local loader; this module
//! only defines the trait they call through, plus one concrete loader
//! for tests and for hosts that don't need their own descriptor format.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{PluginSystemError, Result};
use crate::info::{Extension, ExtensionPoint, PluginImport, PluginInfo, PluginVersion};

/// Turns a descriptor document into an in-memory [`PluginInfo`].
pub trait DescriptorLoader: Send + Sync {
    /// Parses the descriptor found at `path` (a plug-in's install
    /// directory, or a descriptor file directly — the implementation
    /// decides which).
    fn load_descriptor(&self, path: &Path) -> Result<PluginInfo>;

    /// Parses a descriptor from an in-memory byte buffer, synthesizing
    /// `synthetic_path` as the resulting `PluginInfo::path`. The core
    /// never consults this path itself.
    fn load_descriptor_from_bytes(&self, bytes: &[u8], synthetic_path: &str) -> Result<PluginInfo>;
}

#[derive(Debug, Deserialize)]
struct RawDescriptor {
    identifier: String,
    version: Option<String>,
    name: Option<String>,
    provider: Option<String>,
    #[serde(default)]
    imports: Vec<RawImport>,
    #[serde(rename = "extension-points", default)]
    extension_points: Vec<RawExtensionPoint>,
    #[serde(default)]
    extensions: Vec<RawExtension>,
    #[serde(rename = "runtime-library")]
    runtime_library: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawImport {
    #[serde(rename = "plugin")]
    plugin_id: String,
    version: Option<String>,
    #[serde(default)]
    optional: bool,
}

#[derive(Debug, Deserialize)]
struct RawExtensionPoint {
    id: String,
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawExtension {
    point: String,
    id: Option<String>,
}

/// Reads `<dir>/plugin.toml` as a plug-in descriptor.
///
/// This is a reference implementation, not a mandated format —
/// [`crate::local_loader::LocalLoader`] is generic over any
/// [`DescriptorLoader`].
#[derive(Debug, Default, Clone, Copy)]
pub struct TomlDescriptorLoader;

impl TomlDescriptorLoader {
    pub fn new() -> Self {
        Self
    }

    fn convert(raw: RawDescriptor, path: PathBuf) -> Result<PluginInfo> {
        if raw.identifier.trim().is_empty() {
            return Err(PluginSystemError::Malformed {
                path,
                reason: "identifier must not be empty".to_string(),
            });
        }

        let version = match raw.version {
            Some(v) => Some(PluginVersion::parse(&v).ok_or_else(|| PluginSystemError::Malformed {
                path: path.clone(),
                reason: format!("version '{v}' is not dotted-numeric"),
            })?),
            None => None,
        };

        let imports = raw
            .imports
            .into_iter()
            .map(|i| -> Result<PluginImport> {
                let version = match i.version {
                    Some(v) => Some(PluginVersion::parse(&v).ok_or_else(|| PluginSystemError::Malformed {
                        path: path.clone(),
                        reason: format!("import version '{v}' is not dotted-numeric"),
                    })?),
                    None => None,
                };
                Ok(PluginImport {
                    plugin_id: i.plugin_id,
                    version,
                    optional: i.optional,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let extension_points = raw
            .extension_points
            .into_iter()
            .map(|p| ExtensionPoint {
                local_id: p.id,
                name: p.name,
            })
            .collect();

        let extensions = raw
            .extensions
            .into_iter()
            .map(|e| Extension {
                extension_point_id: e.point,
                local_id: e.id,
            })
            .collect();

        Ok(PluginInfo {
            identifier: raw.identifier,
            version,
            path,
            name: raw.name,
            provider_name: raw.provider,
            imports,
            extension_points,
            extensions,
            runtime_library: raw.runtime_library,
        })
    }
}

impl DescriptorLoader for TomlDescriptorLoader {
    fn load_descriptor(&self, path: &Path) -> Result<PluginInfo> {
        let descriptor_path = if path.is_dir() {
            path.join("plugin.toml")
        } else {
            path.to_path_buf()
        };

        let contents = std::fs::read_to_string(&descriptor_path)?;
        let raw: RawDescriptor = toml::from_str(&contents).map_err(|e| PluginSystemError::Malformed {
            path: descriptor_path.clone(),
            reason: e.to_string(),
        })?;
        Self::convert(raw, path.to_path_buf())
    }

    fn load_descriptor_from_bytes(&self, bytes: &[u8], synthetic_path: &str) -> Result<PluginInfo> {
        let text = std::str::from_utf8(bytes).map_err(|e| PluginSystemError::Malformed {
            path: PathBuf::from(synthetic_path),
            reason: e.to_string(),
        })?;
        let raw: RawDescriptor = toml::from_str(text).map_err(|e| PluginSystemError::Malformed {
            path: PathBuf::from(synthetic_path),
            reason: e.to_string(),
        })?;
        Self::convert(raw, PathBuf::from(synthetic_path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_descriptor() {
        let loader = TomlDescriptorLoader::new();
        let info = loader
            .load_descriptor_from_bytes(b"identifier = \"p\"\nversion = \"1.0\"\n", "mem://p")
            .unwrap();
        assert_eq!(info.identifier, "p");
        assert_eq!(info.version.unwrap().as_str(), "1.0");
    }

    #[test]
    fn rejects_empty_identifier() {
        let loader = TomlDescriptorLoader::new();
        let err = loader
            .load_descriptor_from_bytes(b"identifier = \"\"\n", "mem://bad")
            .unwrap_err();
        assert!(matches!(err, PluginSystemError::Malformed { .. }));
    }

    #[test]
    fn rejects_non_numeric_version() {
        let loader = TomlDescriptorLoader::new();
        let err = loader
            .load_descriptor_from_bytes(b"identifier = \"p\"\nversion = \"abc\"\n", "mem://p")
            .unwrap_err();
        assert!(matches!(err, PluginSystemError::Malformed { .. }));
    }
}
