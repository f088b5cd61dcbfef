//! Process-wide plugin storage.
//!
//! All managers in a process share one storage: static plugins register
//! before any manager exists and dependencies may cross manager boundaries,
//! so per-manager isolation is not an option. The storage is created lazily
//! on first manager construction and lives for the rest of the process. The
//! mutex only serializes access so the storage can live in a `static`; the
//! runtime makes no further thread-safety promises.

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};

use crate::plugin_system::loader::{LoadedModule, ModuleBackend};
use crate::plugin_system::metadata::PluginMetadata;
use crate::plugin_system::state::{LoadState, LoadStates};
use crate::plugin_system::static_plugins::{self, StaticPlugin};
use crate::plugin_system::traits::{Instancer, PluginInstance};
use crate::plugin_system::PLUGIN_VERSION;

/// Identity of a live manager. Records refer to their owning manager by id
/// instead of by reference; the id outlives nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct ManagerId(u64);

impl ManagerId {
    pub(crate) fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        ManagerId(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// Runtime shadow of one plugin.
pub(crate) struct PluginRecord {
    pub(crate) metadata: PluginMetadata,
    pub(crate) load_state: LoadState,
    /// Owning manager; `None` only for a static plugin between managers.
    pub(crate) owner: Option<ManagerId>,
    pub(crate) instancer: Option<Instancer>,
    pub(crate) static_plugin: Option<&'static StaticPlugin>,
    pub(crate) module: Option<Box<dyn LoadedModule>>,
}

/// Per-manager state, kept inside the storage so that cross-manager
/// dependency loads can reach a foreign manager's directory, interface,
/// backend and instance table in one lock scope.
pub(crate) struct ManagerData {
    pub(crate) interface: String,
    pub(crate) plugin_directory: Option<PathBuf>,
    pub(crate) backend: Arc<dyn ModuleBackend>,
    pub(crate) instances: BTreeMap<String, Vec<Arc<dyn PluginInstance>>>,
}

#[derive(Default)]
pub(crate) struct PluginStorage {
    /// One record per plugin name.
    pub(crate) plugins: BTreeMap<String, PluginRecord>,
    /// Alias to record names. Collisions across managers are legal, lookup
    /// resolves them by owner.
    pub(crate) aliases: BTreeMap<String, Vec<String>>,
    pub(crate) managers: HashMap<ManagerId, ManagerData>,
}

/// Locks the global storage, creating it on first use. Poison is ignored:
/// the only panics inside lock scopes are programmer-error aborts that
/// happen before any mutation.
pub(crate) fn lock() -> MutexGuard<'static, PluginStorage> {
    static STORAGE: OnceLock<Mutex<PluginStorage>> = OnceLock::new();
    STORAGE
        .get_or_init(Default::default)
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl PluginStorage {
    /// Resolves a query to a record name, trying the exact name first and
    /// aliases second. Both are constrained to records owned by the querying
    /// manager.
    pub(crate) fn find_with_alias(&self, manager: ManagerId, query: &str) -> Option<String> {
        if let Some(record) = self.plugins.get(query) {
            if record.owner == Some(manager) {
                return Some(query.to_string());
            }
            return None;
        }

        if let Some(names) = self.aliases.get(query) {
            for name in names {
                if self
                    .plugins
                    .get(name)
                    .is_some_and(|record| record.owner == Some(manager))
                {
                    return Some(name.clone());
                }
            }
        }

        None
    }

    /// Registers the `provides` aliases of an inserted record.
    pub(crate) fn register_aliases(&mut self, name: &str) {
        let provides = match self.plugins.get(name) {
            Some(record) => record.metadata.provides().to_vec(),
            None => return,
        };
        for alias in provides {
            self.aliases.entry(alias).or_default().push(name.to_string());
        }
    }

    /// Drops alias entries of records owned by `manager`, optionally
    /// narrowed to records in one of the `states`. Must run before the
    /// records themselves are purged.
    pub(crate) fn purge_aliases(&mut self, manager: ManagerId, states: Option<LoadStates>) {
        let plugins = &self.plugins;
        self.aliases.retain(|_, names| {
            names.retain(|name| match plugins.get(name) {
                Some(record) => {
                    !(record.owner == Some(manager)
                        && states.is_none_or(|mask| record.load_state.matches(mask)))
                }
                None => false,
            });
            !names.is_empty()
        });
    }

    /// Adopts pending static plugin registrations into the storage. Runs on
    /// every manager construction; only the first call finds anything.
    pub(crate) fn drain_static_plugins(&mut self) {
        for static_plugin in static_plugins::drain() {
            if static_plugin.version != PLUGIN_VERSION {
                log::error!(
                    "wrong version of static plugin '{}', got {} but expected {}",
                    static_plugin.name,
                    static_plugin.version,
                    PLUGIN_VERSION
                );
                continue;
            }
            if self.plugins.contains_key(static_plugin.name) {
                log::error!(
                    "static plugin '{}' is already registered, dropping the duplicate",
                    static_plugin.name
                );
                continue;
            }

            let metadata = match PluginMetadata::parse(static_plugin.name, static_plugin.descriptor)
            {
                Ok(metadata) => metadata,
                Err(error) => {
                    log::error!("{}", error);
                    PluginMetadata::empty(static_plugin.name)
                }
            };

            self.plugins.insert(
                static_plugin.name.to_string(),
                PluginRecord {
                    metadata,
                    load_state: LoadState::Static,
                    owner: None,
                    instancer: Some(static_plugin.instancer),
                    static_plugin: Some(static_plugin),
                    module: None,
                },
            );
            self.register_aliases(static_plugin.name);
        }
    }

    /// Takes ownership of ownerless static plugins whose interface matches
    /// the given manager and runs their initializers.
    pub(crate) fn adopt_static_plugins(&mut self, manager: ManagerId) {
        let interface = match self.managers.get(&manager) {
            Some(data) => data.interface.clone(),
            None => return,
        };

        let mut initializers = Vec::new();
        for (name, record) in self.plugins.iter_mut() {
            let Some(static_plugin) = record.static_plugin else {
                continue;
            };
            if record.owner.is_none() && static_plugin.interface == interface {
                record.owner = Some(manager);
                initializers.push(static_plugin.initializer);
                log::debug!("adopted static plugin '{}'", name);
            }
        }
        for initializer in initializers {
            initializer();
        }
    }
}
