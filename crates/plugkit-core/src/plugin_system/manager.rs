use std::ffi::CStr;
use std::path::PathBuf;
use std::sync::Arc;

use crate::assert::soft_assert;
use crate::plugin_system::loader::{LoadedModule, ModuleBackend, NativeBackend, MODULE_SUFFIX};
use crate::plugin_system::metadata::PluginMetadata;
use crate::plugin_system::state::LoadState;
use crate::plugin_system::storage::{self, ManagerData, ManagerId, PluginRecord, PluginStorage};
use crate::plugin_system::traits::PluginInstance;
use crate::plugin_system::PLUGIN_VERSION;

/// Controls a set of plugins sharing one interface string and one plugin
/// directory.
///
/// Constructing the first manager in a process drains the static plugin
/// registry. Every manager then adopts the ownerless static plugins whose
/// interface matches its own and scans its plugin directory for dynamic
/// plugin modules. Records live in the process-wide plugin storage, so
/// dependencies may reach across managers; each record still has exactly one
/// owning manager at a time.
///
/// All operations assume external serialization. The runtime is
/// single-threaded by contract; the internal lock exists to make the shared
/// storage sound, not to make concurrent lifecycle calls meaningful.
///
/// Dropping a manager recursively unloads everything it owns. Static plugin
/// records are finalized and left behind for a future manager to adopt;
/// dynamic records are removed. Dropping a manager while instances of its
/// plugins are still held by the host is not supported and leaves those
/// instances detached from any record.
pub struct Manager {
    pub(crate) id: ManagerId,
}

impl Manager {
    /// Version constant compiled into this runtime. Dynamic modules whose
    /// `pluginVersion()` differs are refused.
    pub const VERSION: i32 = PLUGIN_VERSION;

    /// Creates a manager for the given interface string and plugin
    /// directory.
    pub fn new(interface: impl Into<String>, plugin_directory: impl Into<PathBuf>) -> Self {
        let manager = Self::create(interface.into(), Arc::new(NativeBackend));
        manager.set_plugin_directory(plugin_directory);
        manager
    }

    /// Creates a manager that only serves static plugins. Useful on targets
    /// without dynamic loading and in hosts that bundle everything.
    pub fn static_only(interface: impl Into<String>) -> Self {
        Self::create(interface.into(), Arc::new(NativeBackend))
    }

    /// Test seam: a manager with a substitute module backend.
    #[cfg(test)]
    pub(crate) fn with_backend(
        interface: impl Into<String>,
        plugin_directory: impl Into<PathBuf>,
        backend: Arc<dyn ModuleBackend>,
    ) -> Self {
        let manager = Self::create(interface.into(), backend);
        manager.set_plugin_directory(plugin_directory);
        manager
    }

    fn create(interface: String, backend: Arc<dyn ModuleBackend>) -> Self {
        let id = ManagerId::next();
        let mut storage = storage::lock();
        storage.drain_static_plugins();
        storage.managers.insert(
            id,
            ManagerData {
                interface,
                plugin_directory: None,
                backend,
                instances: Default::default(),
            },
        );
        storage.adopt_static_plugins(id);
        Manager { id }
    }

    /// Interface string all plugins of this manager must declare.
    pub fn interface(&self) -> String {
        storage::lock()
            .managers
            .get(&self.id)
            .map(|data| data.interface.clone())
            .unwrap_or_default()
    }

    /// Directory the manager discovers dynamic plugins in. `None` for a
    /// static-only manager.
    pub fn plugin_directory(&self) -> Option<PathBuf> {
        storage::lock()
            .managers
            .get(&self.id)
            .and_then(|data| data.plugin_directory.clone())
    }

    /// Points the manager at a plugin directory.
    ///
    /// Records of plugins that are neither loaded nor static are purged
    /// (aliases first) and the directory is scanned anew. A module file
    /// whose name is already taken by any manager's record is skipped, never
    /// reloaded or reassociated. A missing `<name>.conf` next to a module,
    /// or one that fails to parse, leaves the record in
    /// [`LoadState::WrongMetadataFile`].
    pub fn set_plugin_directory(&self, directory: impl Into<PathBuf>) {
        let directory = directory.into();
        let mut storage = storage::lock();

        // Aliases have to go before the records they point to.
        let purgeable = LoadState::NotLoaded | LoadState::WrongMetadataFile;
        storage.purge_aliases(self.id, Some(purgeable));
        let stale: Vec<String> = storage
            .plugins
            .iter()
            .filter(|(_, record)| {
                record.owner == Some(self.id) && record.load_state.matches(purgeable)
            })
            .map(|(name, _)| name.clone())
            .collect();
        for name in stale {
            storage.plugins.remove(&name);
        }

        match std::fs::read_dir(&directory) {
            Ok(entries) => {
                for entry in entries.flatten() {
                    let file_name = entry.file_name();
                    let Some(file_name) = file_name.to_str() else {
                        continue;
                    };
                    if file_name.starts_with('.') {
                        continue;
                    }
                    if entry.file_type().map_or(true, |kind| kind.is_dir()) {
                        continue;
                    }
                    let Some(name) = file_name.strip_suffix(MODULE_SUFFIX) else {
                        continue;
                    };
                    if name.is_empty() || storage.plugins.contains_key(name) {
                        continue;
                    }

                    let conf = directory.join(format!("{}.conf", name));
                    let (metadata, load_state) = match PluginMetadata::from_file(name, &conf) {
                        Ok(metadata) => (metadata, LoadState::NotLoaded),
                        Err(error) => {
                            log::warn!("{}", error);
                            (PluginMetadata::empty(name), LoadState::WrongMetadataFile)
                        }
                    };
                    storage.plugins.insert(
                        name.to_string(),
                        PluginRecord {
                            metadata,
                            load_state,
                            owner: Some(self.id),
                            instancer: None,
                            static_plugin: None,
                            module: None,
                        },
                    );
                    storage.register_aliases(name);
                }
            }
            Err(error) => log::warn!(
                "cannot list plugin directory {}: {}",
                directory.display(),
                error
            ),
        }

        storage
            .managers
            .get_mut(&self.id)
            .expect("live manager has storage data")
            .plugin_directory = Some(directory);
    }

    /// Rescans the current plugin directory.
    pub fn reload_plugin_directory(&self) {
        if let Some(directory) = self.plugin_directory() {
            self.set_plugin_directory(directory);
        }
    }

    /// Names of all plugins owned by this manager, in storage order.
    pub fn plugin_list(&self) -> Vec<String> {
        storage::lock()
            .plugins
            .iter()
            .filter(|(_, record)| record.owner == Some(self.id))
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Metadata snapshot of a plugin, resolved by name or alias.
    pub fn metadata(&self, plugin: &str) -> Option<PluginMetadata> {
        let storage = storage::lock();
        let name = storage.find_with_alias(self.id, plugin)?;
        storage
            .plugins
            .get(&name)
            .map(|record| record.metadata.clone())
    }

    /// Load state of a plugin, resolved by name or alias.
    pub fn load_state(&self, plugin: &str) -> LoadState {
        let storage = storage::lock();
        match storage.find_with_alias(self.id, plugin) {
            Some(name) => storage.plugins[name.as_str()].load_state,
            None => LoadState::NotFound,
        }
    }

    /// Loads a plugin and everything it depends on.
    ///
    /// Returns [`LoadState::Loaded`] on success and on repeated calls,
    /// [`LoadState::Static`] for static plugins, and one of the error states
    /// otherwise. A failed load releases whatever it had opened and leaves
    /// dependency bookkeeping untouched.
    pub fn load(&self, plugin: &str) -> LoadState {
        let mut storage = storage::lock();
        match storage.find_with_alias(self.id, plugin) {
            Some(name) => load_internal(&mut storage, self.id, &name),
            None => {
                log::error!(
                    "plugin '{}' is not static and was not found in the plugin directory",
                    plugin
                );
                LoadState::NotFound
            }
        }
    }

    /// Unloads a plugin.
    ///
    /// Refused with [`LoadState::Required`] while other plugins depend on it
    /// and with [`LoadState::Used`] while an instance denies deletion.
    /// Instances that allow deletion are destroyed in reverse construction
    /// order. Returns [`LoadState::NotLoaded`] on success.
    pub fn unload(&self, plugin: &str) -> LoadState {
        let mut storage = storage::lock();
        match storage.find_with_alias(self.id, plugin) {
            Some(name) => unload_internal(&mut storage, &name),
            None => {
                log::error!("plugin '{}' was not found", plugin);
                LoadState::NotFound
            }
        }
    }

    /// Constructs a new instance of a loaded (or static) plugin.
    ///
    /// The instancer receives the record's original name even when the
    /// plugin was resolved through an alias. The instance is tracked by this
    /// manager until it is unregistered or destroyed during unload. Asking
    /// for an instance of a plugin that is not loaded is a programmer error.
    pub fn instance(&self, plugin: &str) -> Option<Arc<dyn PluginInstance>> {
        let (instancer, name) = {
            let storage = storage::lock();
            let name = storage.find_with_alias(self.id, plugin);
            let record = name.as_deref().and_then(|name| storage.plugins.get(name));
            soft_assert!(
                record.is_some_and(|record| record
                    .load_state
                    .matches(LoadState::Loaded | LoadState::Static)),
                None,
                "plugin '{}' is not loaded",
                plugin
            );
            let record = record.expect("presence checked above");
            (
                record.instancer.expect("loaded plugin has an instancer"),
                name.expect("presence checked above"),
            )
        };

        // The lock is released so the instancer may query the manager.
        let raw = unsafe { instancer(self, &name) };
        let instance: Arc<dyn PluginInstance> = Arc::from(unsafe { Box::from_raw(raw) });
        self.register_instance(&name, Arc::clone(&instance));
        Some(instance)
    }

    /// Tracks an externally constructed instance of a plugin owned by this
    /// manager and returns the plugin's metadata. Registering against a
    /// foreign or unknown record is a programmer error.
    pub fn register_instance(
        &self,
        plugin: &str,
        instance: Arc<dyn PluginInstance>,
    ) -> Option<PluginMetadata> {
        let mut storage = storage::lock();
        let known = storage
            .plugins
            .get(plugin)
            .is_some_and(|record| record.owner == Some(self.id));
        soft_assert!(
            known,
            None,
            "attempt to register instance of plugin '{}' not known to this manager",
            plugin
        );

        let metadata = storage.plugins[plugin].metadata.clone();
        storage
            .managers
            .get_mut(&self.id)
            .expect("live manager has storage data")
            .instances
            .entry(plugin.to_string())
            .or_default()
            .push(instance);
        Some(metadata)
    }

    /// Stops tracking an instance previously passed to or returned from
    /// this manager. The per-plugin list disappears with its last entry.
    pub fn unregister_instance(&self, plugin: &str, instance: &Arc<dyn PluginInstance>) {
        let mut storage = storage::lock();
        let known = storage
            .plugins
            .get(plugin)
            .is_some_and(|record| record.owner == Some(self.id));
        soft_assert!(
            known,
            (),
            "attempt to unregister instance of plugin '{}' not known to this manager",
            plugin
        );

        let data = storage
            .managers
            .get_mut(&self.id)
            .expect("live manager has storage data");
        let mut removed = false;
        if let Some(instances) = data.instances.get_mut(plugin) {
            if let Some(position) = instances
                .iter()
                .position(|existing| Arc::ptr_eq(existing, instance))
            {
                instances.remove(position);
                removed = true;
            }
            if instances.is_empty() {
                data.instances.remove(plugin);
            }
        }
        soft_assert!(
            removed,
            (),
            "attempt to unregister an instance of plugin '{}' that was never registered",
            plugin
        );
    }
}

impl Drop for Manager {
    fn drop(&mut self) {
        let mut storage = storage::lock();

        let owned: Vec<String> = storage
            .plugins
            .iter()
            .filter(|(_, record)| record.owner == Some(self.id))
            .map(|(name, _)| name.clone())
            .collect();

        // Dependents go before their dependency, hence the recursion. Static
        // records are orphaned and finalized so a future manager can adopt
        // them again; dynamic records are scheduled for removal.
        let mut removed = Vec::new();
        for name in owned {
            let state = unload_recursive(&mut storage, self.id, &name);
            if state == LoadState::Static {
                let record = storage
                    .plugins
                    .get_mut(&name)
                    .expect("record looked up above");
                record.owner = None;
                let finalizer = record.static_plugin.map(|sp| sp.finalizer);
                if let Some(finalizer) = finalizer {
                    finalizer();
                }
            } else {
                removed.push(name);
            }
        }

        // Aliases first, the records they point to second.
        storage.purge_aliases(self.id, None);
        for name in &removed {
            storage.plugins.remove(name);
        }
        storage.managers.remove(&self.id);
    }
}

fn load_internal(storage: &mut PluginStorage, manager: ManagerId, name: &str) -> LoadState {
    let record = match storage.plugins.get(name) {
        Some(record) => record,
        None => return LoadState::NotFound,
    };

    let state = record.load_state;
    if state != LoadState::NotLoaded {
        if !state.matches(LoadState::Static | LoadState::Loaded) {
            log::error!("plugin '{}' is not ready to load: {}", name, state);
        }
        return state;
    }

    // Dependencies are loaded through their own managers first. Their
    // usedBy lists are only touched once everything has succeeded.
    let depends = record.metadata.depends().to_vec();
    for dependency in &depends {
        let dependency_manager = storage
            .plugins
            .get(dependency)
            .and_then(|record| record.owner);
        let satisfied = match dependency_manager {
            Some(id) => load_internal(storage, id, dependency)
                .matches(LoadState::Loaded | LoadState::Static),
            None => false,
        };
        if !satisfied {
            log::error!(
                "unresolved dependency '{}' of plugin '{}'",
                dependency,
                name
            );
            return LoadState::UnresolvedDependency;
        }
    }

    let data = storage
        .managers
        .get(&manager)
        .expect("record owner is a live manager");
    let Some(directory) = data.plugin_directory.clone() else {
        log::error!("plugin '{}' has no plugin directory to load from", name);
        return LoadState::LoadFailed;
    };
    let filename = directory.join(format!("{}{}", name, MODULE_SUFFIX));

    let module = match data.backend.open(&filename) {
        Ok(module) => module,
        Err(error) => {
            log::error!("cannot load plugin '{}': {}", name, error);
            return LoadState::LoadFailed;
        }
    };

    let Some(version) = module.version() else {
        log::error!("cannot get version of plugin '{}'", name);
        close_discarding(module, name);
        return LoadState::LoadFailed;
    };
    let version = unsafe { version() };
    if version != PLUGIN_VERSION {
        log::error!(
            "wrong version of plugin '{}', expected {} but got {}",
            name,
            PLUGIN_VERSION,
            version
        );
        close_discarding(module, name);
        return LoadState::WrongPluginVersion;
    }

    let Some(interface) = module.interface() else {
        log::error!("cannot get interface string of plugin '{}'", name);
        close_discarding(module, name);
        return LoadState::LoadFailed;
    };
    let interface = unsafe { CStr::from_ptr(interface()) }
        .to_string_lossy()
        .into_owned();
    if interface != data.interface {
        log::error!(
            "wrong interface string of plugin '{}', expected '{}' but got '{}'",
            name,
            data.interface,
            interface
        );
        close_discarding(module, name);
        return LoadState::WrongInterfaceVersion;
    }

    let Some(instancer) = module.instancer() else {
        log::error!("cannot get instancer of plugin '{}'", name);
        close_discarding(module, name);
        return LoadState::LoadFailed;
    };

    let Some(initializer) = module.initializer() else {
        log::error!("cannot get initializer of plugin '{}'", name);
        close_discarding(module, name);
        return LoadState::LoadFailed;
    };
    unsafe { initializer() };

    // Everything went well, record this plugin with each dependency.
    for dependency in &depends {
        if let Some(dependency) = storage.plugins.get_mut(dependency) {
            dependency.metadata.used_by.push(name.to_string());
        }
    }

    let record = storage
        .plugins
        .get_mut(name)
        .expect("record looked up above");
    record.module = Some(module);
    record.instancer = Some(instancer);
    record.load_state = LoadState::Loaded;
    LoadState::Loaded
}

fn unload_internal(storage: &mut PluginStorage, name: &str) -> LoadState {
    let record = match storage.plugins.get(name) {
        Some(record) => record,
        None => return LoadState::NotFound,
    };
    let owner = record.owner;

    let state = record.load_state;
    if state != LoadState::Loaded {
        if !state.matches(LoadState::Static | LoadState::NotLoaded | LoadState::WrongMetadataFile) {
            log::error!("plugin '{}' is not ready to unload: {}", name, state);
        }
        return state;
    }

    if !record.metadata.used_by().is_empty() {
        log::error!(
            "plugin '{}' is required by other plugins: {:?}",
            name,
            record.metadata.used_by()
        );
        return LoadState::Required;
    }

    // Every live instance has to agree to deletion; then they go in reverse
    // construction order.
    if let Some(owner) = owner {
        let data = storage
            .managers
            .get_mut(&owner)
            .expect("record owner is a live manager");
        if let Some(instances) = data.instances.get(name) {
            if instances.iter().any(|instance| !instance.can_be_deleted()) {
                log::error!("plugin '{}' is currently used and cannot be deleted", name);
                return LoadState::Used;
            }
        }
        if let Some(mut instances) = data.instances.remove(name) {
            while let Some(instance) = instances.pop() {
                drop(instance);
            }
        }
    }

    let depends = storage.plugins[name].metadata.depends().to_vec();
    for dependency in &depends {
        if let Some(dependency) = storage.plugins.get_mut(dependency) {
            if let Some(position) = dependency
                .metadata
                .used_by
                .iter()
                .position(|used_by| used_by == name)
            {
                dependency.metadata.used_by.remove(position);
            }
        }
    }

    let record = storage
        .plugins
        .get_mut(name)
        .expect("record looked up above");
    let module = record.module.take();
    record.instancer = None;
    record.load_state = LoadState::NotLoaded;

    if let Some(module) = module {
        match module.finalizer() {
            Some(finalizer) => unsafe { finalizer() },
            // Not fatal, continue with unloading.
            None => log::warn!("cannot get finalizer of plugin '{}'", name),
        }
        if let Err(error) = module.close() {
            log::error!("cannot unload plugin '{}': {}", name, error);
            return LoadState::UnloadFailed;
        }
    }

    LoadState::NotLoaded
}

/// Unloads a plugin after recursively unloading everything in its usedBy
/// list. Only meaningful during manager destruction, where every owned
/// record must end up static, not loaded or metadata-less.
fn unload_recursive(storage: &mut PluginStorage, manager: ManagerId, name: &str) -> LoadState {
    let record = match storage.plugins.get(name) {
        Some(record) => record,
        None => return LoadState::NotFound,
    };
    // A foreign record cannot be touched here; the parent unload will
    // report it as still required.
    if record.owner != Some(manager) {
        return LoadState::NotFound;
    }

    if record.load_state != LoadState::Static {
        let dependents = record.metadata.used_by().to_vec();
        for dependent in &dependents {
            unload_recursive(storage, manager, dependent);
        }
    }

    let after = unload_internal(storage, name);
    if !after.matches(LoadState::Static | LoadState::NotLoaded | LoadState::WrongMetadataFile) {
        log::error!(
            "cannot unload plugin '{}' on manager destruction: {}",
            name,
            after
        );
        debug_assert!(
            false,
            "cannot unload plugin '{}' on manager destruction: {}",
            name, after
        );
    }
    after
}

fn close_discarding(module: Box<dyn LoadedModule>, name: &str) {
    if let Err(error) = module.close() {
        log::warn!("cannot close module of plugin '{}': {}", name, error);
    }
}
