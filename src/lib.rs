//! # plugin-scan
//!
//! A plug-in framework core: it discovers plug-in descriptors on disk,
//! reconciles multiple versions of the same plug-in into a single
//! installable set, and drives the install/upgrade/restart lifecycle of
//! plug-ins against a host's running context.
//!
//! ## Architecture
//!
//! - [`Loader`] — an abstract discovery source. Implement this to teach
//!   the engine about a new place plug-ins can come from.
//! - [`LocalLoader`] — the concrete, filesystem-backed loader this
//!   crate ships: an ordered set of directories, each scanned for
//!   immediate-child plug-in install locations.
//! - [`ScanEngine`] — the orchestrator: consults every loader a host
//!   context knows about, merges results by identifier with a
//!   highest-version-wins rule, and drives install/upgrade/restart
//!   against a [`HostRegistry`] under [`ScanFlags`].
//!
//! Descriptor parsing, the host registry itself, and dynamic loading of
//! plug-in *runtime* code are host/collaborator concerns this crate
//! only defines traits for ([`DescriptorLoader`], [`HostRegistry`]); one
//! reference [`TomlDescriptorLoader`] is included for local filesystem
//! use and for tests.

pub mod descriptor;
pub mod engine;
pub mod error;
pub mod info;
pub mod loader;
pub mod local_loader;
pub mod registry;

pub use descriptor::{DescriptorLoader, TomlDescriptorLoader};
pub use engine::{ScanConfig, ScanEngine, ScanFlags};
pub use error::{PluginSystemError, Result};
pub use info::{
    Extension, ExtensionPoint, PluginHandle, PluginImport, PluginInfo, PluginVersion,
};
pub use loader::Loader;
pub use local_loader::{DefaultLocalLoader, LocalLoader};
pub use registry::{HostRegistry, PluginState};
