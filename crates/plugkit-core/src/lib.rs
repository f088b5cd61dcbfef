//! Plugkit: a plugin-management runtime for host applications.
//!
//! The crate has two independent subsystems:
//!
//! - [`plugin_system`] discovers, loads, instantiates and unloads extension
//!   modules, both compiled-in static plugins and shared libraries, while
//!   honoring declared inter-plugin dependencies.
//! - [`args`] is a declarative command-line argument parser with prefixed
//!   namespaces, built so several cooperating parsers can consume a single
//!   command line.

pub(crate) mod assert;

pub mod args;
pub mod plugin_system;

pub use args::Arguments;
pub use plugin_system::{
    register_static, Instancer, LoadState, LoadStates, Manager, PluginInstance, PluginMetadata,
    StaticPlugin, PLUGIN_VERSION,
};
