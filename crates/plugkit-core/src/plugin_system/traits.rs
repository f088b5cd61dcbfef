use std::any::Any;

use crate::plugin_system::manager::Manager;

/// Base protocol every plugin instance obeys.
///
/// Hosts define richer interface traits on top of this; the runtime only
/// needs liveness queries and downcasting. Instances are created through a
/// plugin's [`Instancer`] and tracked by the owning manager until they are
/// unregistered or destroyed during unload.
pub trait PluginInstance: Send + Sync {
    /// Whether the manager may destroy this instance during unload.
    ///
    /// Returning `true` asserts that the host holds no references to the
    /// instance besides the manager's own tracking handle. The default is
    /// conservative.
    fn can_be_deleted(&self) -> bool {
        false
    }

    /// Downcasting access for hosts with concrete instance types.
    fn as_any(&self) -> &dyn Any;
}

/// Factory entry point yielding a freshly constructed plugin instance.
///
/// Dynamic plugins export this under the symbol name `pluginInstancer`;
/// static plugins pass it to the registration macro. The manager invokes it
/// with the plugin's original (never aliased) name. The returned pointer is
/// a `Box` turned raw; the manager takes ownership of it immediately.
///
/// The plugin storage lock is not held during the call, so instancers may
/// query the passed manager (for metadata, typically).
#[allow(improper_ctypes_definitions)]
pub type Instancer =
    unsafe extern "C" fn(&Manager, &str) -> *mut dyn PluginInstance;
