//! Shared fixtures: a configurable module backend standing in for real
//! shared libraries, plus simple plugin instance types.
//!
//! The global plugin storage is shared by every test in the process, so
//! each test works with its own plugin names and interface strings.

use std::any::Any;
use std::ffi::{c_char, c_int};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::plugin_system::error::PluginSystemError;
use crate::plugin_system::loader::{
    HookFn, InterfaceFn, LoadedModule, ModuleBackend, VersionFn, MODULE_SUFFIX,
};
use crate::plugin_system::manager::Manager;
use crate::plugin_system::traits::{Instancer, PluginInstance};
use crate::plugin_system::PLUGIN_VERSION;

pub extern "C" fn current_version() -> c_int {
    PLUGIN_VERSION
}

pub extern "C" fn future_version() -> c_int {
    PLUGIN_VERSION + 1
}

pub extern "C" fn noop_hook() {}

#[allow(improper_ctypes_definitions)]
pub unsafe extern "C" fn test_instancer(
    _manager: &Manager,
    plugin: &str,
) -> *mut dyn PluginInstance {
    Box::into_raw(Box::new(TestInstance {
        name: plugin.to_string(),
        deletable: true,
        drop_log: None,
    }))
}

/// Constructor used by static plugin registrations.
pub fn make_test_instance(_manager: &Manager, plugin: &str) -> Box<dyn PluginInstance> {
    Box::new(TestInstance {
        name: plugin.to_string(),
        deletable: true,
        drop_log: None,
    })
}

pub struct TestInstance {
    pub name: String,
    pub deletable: bool,
    pub drop_log: Option<Arc<Mutex<Vec<String>>>>,
}

impl PluginInstance for TestInstance {
    fn can_be_deleted(&self) -> bool {
        self.deletable
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl Drop for TestInstance {
    fn drop(&mut self) {
        if let Some(log) = &self.drop_log {
            log.lock().unwrap().push(self.name.clone());
        }
    }
}

/// Hands out the same module template for every open, with a close counter
/// shared between the backend and its modules.
pub struct MockBackend {
    version: VersionFn,
    interface: InterfaceFn,
    instancer: Option<Instancer>,
    initializer: Option<HookFn>,
    finalizer: Option<HookFn>,
    fail_open: bool,
    fail_close: bool,
    closed: Arc<AtomicUsize>,
}

impl MockBackend {
    pub fn new(interface: InterfaceFn) -> Self {
        MockBackend {
            version: current_version as VersionFn,
            interface,
            instancer: Some(test_instancer as Instancer),
            initializer: Some(noop_hook as HookFn),
            finalizer: Some(noop_hook as HookFn),
            fail_open: false,
            fail_close: false,
            closed: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn version(mut self, version: VersionFn) -> Self {
        self.version = version;
        self
    }

    pub fn instancer(mut self, instancer: Option<Instancer>) -> Self {
        self.instancer = instancer;
        self
    }

    pub fn initializer(mut self, initializer: Option<HookFn>) -> Self {
        self.initializer = initializer;
        self
    }

    pub fn finalizer(mut self, finalizer: Option<HookFn>) -> Self {
        self.finalizer = finalizer;
        self
    }

    pub fn fail_open(mut self) -> Self {
        self.fail_open = true;
        self
    }

    pub fn fail_close(mut self) -> Self {
        self.fail_close = true;
        self
    }

    /// Counter incremented on every module close.
    pub fn close_count(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.closed)
    }
}

struct MockModule {
    version: VersionFn,
    interface: InterfaceFn,
    instancer: Option<Instancer>,
    initializer: Option<HookFn>,
    finalizer: Option<HookFn>,
    fail_close: bool,
    closed: Arc<AtomicUsize>,
}

impl LoadedModule for MockModule {
    fn version(&self) -> Option<VersionFn> {
        Some(self.version)
    }

    fn interface(&self) -> Option<InterfaceFn> {
        Some(self.interface)
    }

    fn instancer(&self) -> Option<Instancer> {
        self.instancer
    }

    fn initializer(&self) -> Option<HookFn> {
        self.initializer
    }

    fn finalizer(&self) -> Option<HookFn> {
        self.finalizer
    }

    fn close(self: Box<Self>) -> Result<(), PluginSystemError> {
        self.closed.fetch_add(1, Ordering::SeqCst);
        if self.fail_close {
            Err(PluginSystemError::ModuleClose {
                message: "mock close failure".to_string(),
            })
        } else {
            Ok(())
        }
    }
}

impl ModuleBackend for MockBackend {
    fn open(&self, path: &Path) -> Result<Box<dyn LoadedModule>, PluginSystemError> {
        if self.fail_open {
            return Err(PluginSystemError::ModuleOpen {
                path: path.to_path_buf(),
                message: "mock open failure".to_string(),
            });
        }
        Ok(Box::new(MockModule {
            version: self.version,
            interface: self.interface,
            instancer: self.instancer,
            initializer: self.initializer,
            finalizer: self.finalizer,
            fail_close: self.fail_close,
            closed: Arc::clone(&self.closed),
        }))
    }
}

/// Drops an empty module file and its descriptor into a plugin directory.
pub fn write_plugin(directory: &Path, name: &str, descriptor: &str) {
    std::fs::write(directory.join(format!("{}{}", name, MODULE_SUFFIX)), b"").unwrap();
    std::fs::write(directory.join(format!("{}.conf", name)), descriptor).unwrap();
}

// Interface entry points for mock modules have to be plain functions, so
// there is one per test interface string.

pub extern "C" fn iface_beacon() -> *const c_char {
    b"plugkit.test.Beacon/1.0\0".as_ptr().cast()
}
pub const IFACE_BEACON: &str = "plugkit.test.Beacon/1.0";

pub extern "C" fn iface_codec() -> *const c_char {
    b"plugkit.test.Codec/1.0\0".as_ptr().cast()
}
pub const IFACE_CODEC: &str = "plugkit.test.Codec/1.0";

pub extern "C" fn iface_net() -> *const c_char {
    b"plugkit.test.Net/1.0\0".as_ptr().cast()
}
pub const IFACE_NET: &str = "plugkit.test.Net/1.0";

pub extern "C" fn iface_store() -> *const c_char {
    b"plugkit.test.Store/1.0\0".as_ptr().cast()
}
pub const IFACE_STORE: &str = "plugkit.test.Store/1.0";

pub extern "C" fn iface_sensor() -> *const c_char {
    b"plugkit.test.Sensor/1.0\0".as_ptr().cast()
}
pub const IFACE_SENSOR: &str = "plugkit.test.Sensor/1.0";

pub extern "C" fn iface_audio() -> *const c_char {
    b"plugkit.test.Audio/1.0\0".as_ptr().cast()
}
pub const IFACE_AUDIO: &str = "plugkit.test.Audio/1.0";

pub extern "C" fn iface_render() -> *const c_char {
    b"plugkit.test.Render/1.0\0".as_ptr().cast()
}
pub const IFACE_RENDER: &str = "plugkit.test.Render/1.0";

pub extern "C" fn iface_input() -> *const c_char {
    b"plugkit.test.Input/1.0\0".as_ptr().cast()
}
pub const IFACE_INPUT: &str = "plugkit.test.Input/1.0";
