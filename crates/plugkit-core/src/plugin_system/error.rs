//! Error types internal to the plugin system.
//!
//! Public lifecycle operations report failure through
//! [`LoadState`](super::LoadState) values. These errors cover the fallible
//! plumbing underneath (descriptor I/O and parsing, module open and close)
//! and end up in log output rather than in return types.

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum PluginSystemError {
    #[error("cannot read plugin descriptor {}: {source}", path.display())]
    DescriptorIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot parse plugin descriptor of '{plugin}': {source}")]
    DescriptorParse {
        plugin: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("cannot open plugin module {}: {message}", path.display())]
    ModuleOpen { path: PathBuf, message: String },

    #[error("cannot close plugin module: {message}")]
    ModuleClose { message: String },
}
