//! Plugin-management runtime.
//!
//! Hosts embed a [`Manager`] per plugin interface. Managers discover dynamic
//! plugins in a directory (a shared library plus a `<name>.conf` descriptor
//! next to it), adopt compiled-in static plugins registered before their
//! construction, resolve declared dependencies across managers, and
//! instantiate plugins through their exported factories.
//!
//! ## Submodules
//!
//! - [`manager`]: the lifecycle engine, [`Manager`].
//! - [`metadata`]: parsed descriptors, [`PluginMetadata`].
//! - [`state`]: the [`LoadState`] bit set returned by lifecycle operations.
//! - [`static_plugins`]: registration of compiled-in plugins, drained into
//!   the global storage by the first manager constructed in the process.
//! - `loader` (internal): platform-abstracted module open, entry-point
//!   resolution and close.
//! - `storage` (internal): the process-wide record and alias tables all
//!   managers share.
//! - [`traits`]: the [`PluginInstance`] base protocol and the [`Instancer`]
//!   factory signature.
//! - [`error`]: internal error plumbing feeding the log output.
//!
//! Lifecycle operations return [`LoadState`] values instead of `Result`s;
//! diagnostics go through the `log` facade. The whole runtime is
//! single-threaded by contract and callers are expected to serialize all
//! operations externally.

pub mod error;
pub(crate) mod loader;
pub mod manager;
pub mod metadata;
pub mod state;
pub mod static_plugins;
pub(crate) mod storage;
pub mod traits;

pub use manager::Manager;
pub use metadata::PluginMetadata;
pub use state::{LoadState, LoadStates};
pub use static_plugins::{register_static, StaticPlugin};
pub use traits::{Instancer, PluginInstance};

// Used by the registration macro.
pub use inventory;

/// Version of the plugin ABI this runtime was compiled with. Dynamic
/// modules report theirs through `pluginVersion()`; static plugins carry it
/// in their registration. Mismatches refuse to load.
pub const PLUGIN_VERSION: i32 = 1;

#[cfg(test)]
mod tests;
