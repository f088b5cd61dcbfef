use serde::Deserialize;
use toml::Table;

use crate::plugin_system::error::PluginSystemError;

/// Parsed plugin descriptor plus runtime bookkeeping.
///
/// A descriptor is a TOML document stored next to the plugin module as
/// `<name>.conf` (or embedded in the binary for static plugins). Recognized
/// top-level keys are `name`, `depends` and `provides`; everything else is
/// preserved opaquely and reachable through [`extra()`](Self::extra).
///
/// The `used_by` list is maintained by the runtime while plugins load and
/// unload. It is never read from a descriptor.
#[derive(Debug, Clone, Default)]
pub struct PluginMetadata {
    name: String,
    depends: Vec<String>,
    provides: Vec<String>,
    pub(crate) used_by: Vec<String>,
    extra: Table,
}

#[derive(Deserialize)]
struct RawDescriptor {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    depends: Vec<String>,
    #[serde(default)]
    provides: Vec<String>,
    #[serde(flatten)]
    extra: Table,
}

impl PluginMetadata {
    /// Parses descriptor text. The record name comes from the module
    /// filename (or static registration) and is authoritative; a `name` key
    /// in the descriptor is checked against it but never overrides it.
    pub(crate) fn parse(name: &str, descriptor: &str) -> Result<Self, PluginSystemError> {
        let raw: RawDescriptor =
            toml::from_str(descriptor).map_err(|source| PluginSystemError::DescriptorParse {
                plugin: name.to_string(),
                source,
            })?;

        if let Some(declared) = &raw.name {
            if declared != name {
                log::warn!(
                    "plugin descriptor of '{}' declares mismatched name '{}', ignoring it",
                    name,
                    declared
                );
            }
        }

        let mut provides = raw.provides;
        // A plugin must not alias itself.
        provides.retain(|alias| {
            if alias == name {
                log::warn!("plugin '{}' lists itself among provided aliases, dropping", name);
                false
            } else {
                true
            }
        });

        Ok(PluginMetadata {
            name: name.to_string(),
            depends: raw.depends,
            provides,
            used_by: Vec::new(),
            extra: raw.extra,
        })
    }

    /// Reads and parses `<name>.conf` from disk.
    pub(crate) fn from_file(
        name: &str,
        path: &std::path::Path,
    ) -> Result<Self, PluginSystemError> {
        let descriptor =
            std::fs::read_to_string(path).map_err(|source| PluginSystemError::DescriptorIo {
                path: path.to_path_buf(),
                source,
            })?;
        Self::parse(name, &descriptor)
    }

    /// Metadata with no dependencies, aliases or extra data. Used for static
    /// plugins whose embedded descriptor failed to parse.
    pub(crate) fn empty(name: &str) -> Self {
        PluginMetadata {
            name: name.to_string(),
            ..Default::default()
        }
    }

    /// Unique plugin name, case sensitive.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Names of plugins this plugin requires to be loaded first.
    pub fn depends(&self) -> &[String] {
        &self.depends
    }

    /// Alias names this plugin can also be looked up by.
    pub fn provides(&self) -> &[String] {
        &self.provides
    }

    /// Names of plugins currently depending on this plugin. Non-empty means
    /// unload is refused with [`LoadState::Required`](super::LoadState).
    pub fn used_by(&self) -> &[String] {
        &self.used_by
    }

    /// Plugin-specific descriptor data outside the recognized keys.
    pub fn extra(&self) -> &Table {
        &self.extra
    }

    /// Convenience lookup of a string value in the extra data.
    pub fn value(&self, key: &str) -> Option<&str> {
        self.extra.get(key).and_then(|value| value.as_str())
    }
}
