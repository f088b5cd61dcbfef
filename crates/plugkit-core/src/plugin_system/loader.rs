//! Dynamic module loading.
//!
//! The platform split (POSIX `dlopen` family, Windows
//! `LoadLibrary`/`GetProcAddress`/`FreeLibrary`) is handled by `libloading`;
//! this module narrows it to the handful of operations the manager needs and
//! keeps them behind the [`ModuleBackend`]/[`LoadedModule`] traits so tests
//! can substitute a fake backend.

use std::ffi::{c_char, c_int};
use std::path::Path;

use crate::plugin_system::error::PluginSystemError;
use crate::plugin_system::traits::Instancer;

/// Filename suffix of shared libraries on this platform.
pub(crate) const MODULE_SUFFIX: &str = std::env::consts::DLL_SUFFIX;

/// `pluginVersion` entry point.
pub(crate) type VersionFn = unsafe extern "C" fn() -> c_int;
/// `pluginInterface` entry point.
pub(crate) type InterfaceFn = unsafe extern "C" fn() -> *const c_char;
/// `pluginInitializer` and `pluginFinalizer` entry points.
pub(crate) type HookFn = unsafe extern "C" fn();

/// An opened plugin module with its well-known entry points.
///
/// Resolution returns copied-out function pointers; they stay valid for as
/// long as the module object is alive, which the plugin record guarantees.
pub(crate) trait LoadedModule: Send + Sync {
    fn version(&self) -> Option<VersionFn>;
    fn interface(&self) -> Option<InterfaceFn>;
    fn instancer(&self) -> Option<Instancer>;
    fn initializer(&self) -> Option<HookFn>;
    fn finalizer(&self) -> Option<HookFn>;
    fn close(self: Box<Self>) -> Result<(), PluginSystemError>;
}

/// Opens plugin modules for one manager.
pub(crate) trait ModuleBackend: Send + Sync {
    fn open(&self, path: &Path) -> Result<Box<dyn LoadedModule>, PluginSystemError>;
}

/// The real backend.
pub(crate) struct NativeBackend;

struct NativeModule {
    library: libloading::Library,
}

impl NativeModule {
    /// Copies a typed function pointer out of the library. The pointer is
    /// only handed out while `self.library` stays open.
    unsafe fn entry_point<T: Copy>(&self, name: &[u8]) -> Option<T> {
        unsafe { self.library.get::<T>(name).ok().map(|symbol| *symbol) }
    }
}

impl LoadedModule for NativeModule {
    fn version(&self) -> Option<VersionFn> {
        unsafe { self.entry_point(b"pluginVersion\0") }
    }

    fn interface(&self) -> Option<InterfaceFn> {
        unsafe { self.entry_point(b"pluginInterface\0") }
    }

    fn instancer(&self) -> Option<Instancer> {
        unsafe { self.entry_point(b"pluginInstancer\0") }
    }

    fn initializer(&self) -> Option<HookFn> {
        unsafe { self.entry_point(b"pluginInitializer\0") }
    }

    fn finalizer(&self) -> Option<HookFn> {
        unsafe { self.entry_point(b"pluginFinalizer\0") }
    }

    fn close(self: Box<Self>) -> Result<(), PluginSystemError> {
        self.library
            .close()
            .map_err(|e| PluginSystemError::ModuleClose {
                message: e.to_string(),
            })
    }
}

impl ModuleBackend for NativeBackend {
    #[cfg(unix)]
    fn open(&self, path: &Path) -> Result<Box<dyn LoadedModule>, PluginSystemError> {
        use libloading::os::unix::{Library, RTLD_GLOBAL, RTLD_NOW};

        // Symbols are made globally visible so plugins loaded later can
        // link against plugins loaded earlier.
        let library = unsafe { Library::open(Some(path), RTLD_NOW | RTLD_GLOBAL) }.map_err(
            |e| PluginSystemError::ModuleOpen {
                path: path.to_path_buf(),
                message: e.to_string(),
            },
        )?;
        Ok(Box::new(NativeModule {
            library: library.into(),
        }))
    }

    #[cfg(windows)]
    fn open(&self, path: &Path) -> Result<Box<dyn LoadedModule>, PluginSystemError> {
        let library =
            unsafe { libloading::Library::new(path) }.map_err(|e| PluginSystemError::ModuleOpen {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;
        Ok(Box::new(NativeModule { library }))
    }
}
