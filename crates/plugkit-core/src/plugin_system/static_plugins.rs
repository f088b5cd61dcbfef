//! Registration of compiled-in plugins.
//!
//! Static plugins announce themselves before any [`Manager`] exists, either
//! declaratively through [`register_static_plugin!`] (collected at link time
//! via `inventory`) or imperatively through [`register_static`] early in
//! `main`. The first manager constructed in the process drains both sources
//! into the global plugin storage; registering afterwards is an error.
//!
//! [`Manager`]: super::Manager
//! [`register_static_plugin!`]: crate::register_static_plugin

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use crate::assert::soft_assert;
use crate::plugin_system::traits::Instancer;
use crate::plugin_system::PLUGIN_VERSION;

/// Registration record of a compiled-in plugin.
///
/// The descriptor text takes the place of the on-disk `<name>.conf` file of
/// a dynamic plugin; embed it with `include_str!` or write it inline.
pub struct StaticPlugin {
    pub name: &'static str,
    pub version: i32,
    pub interface: &'static str,
    pub instancer: Instancer,
    pub initializer: fn(),
    pub finalizer: fn(),
    pub descriptor: &'static str,
}

inventory::collect!(StaticPlugin);

static PENDING: Mutex<Vec<&'static StaticPlugin>> = Mutex::new(Vec::new());
static DRAINED: AtomicBool = AtomicBool::new(false);

/// Queues a static plugin for adoption by the first manager constructed in
/// this process.
///
/// Fails loudly when called after the registry has been drained or with a
/// registration built against another runtime version.
pub fn register_static(plugin: &'static StaticPlugin) {
    soft_assert!(
        plugin.version == PLUGIN_VERSION,
        (),
        "wrong version of static plugin '{}', got {} but expected {}",
        plugin.name,
        plugin.version,
        PLUGIN_VERSION
    );
    soft_assert!(
        !DRAINED.load(Ordering::SeqCst),
        (),
        "too late to register static plugin '{}'",
        plugin.name
    );

    PENDING
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .push(plugin);
}

/// Takes every pending registration, link-time and imperative, and closes
/// the registry. Later calls return nothing.
pub(crate) fn drain() -> Vec<&'static StaticPlugin> {
    if DRAINED.swap(true, Ordering::SeqCst) {
        return Vec::new();
    }

    let explicit = std::mem::take(
        &mut *PENDING
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()),
    );

    let mut pending: Vec<&'static StaticPlugin> = Vec::new();
    for plugin in inventory::iter::<StaticPlugin> {
        pending.push(plugin);
    }
    pending.extend(explicit);
    pending
}

/// Declares a compiled-in plugin.
///
/// The constructor is a `fn(&Manager, &str) -> Box<dyn PluginInstance>`;
/// initializer and finalizer are plain `fn()` callbacks invoked when a
/// manager adopts respectively releases the plugin.
///
/// ```ignore
/// register_static_plugin!(
///     "Canary",
///     "example.plugkit.Bird/1.0",
///     include_str!("Canary.conf"),
///     Canary::create,
///     Canary::initialize,
///     Canary::finalize
/// );
/// ```
#[macro_export]
macro_rules! register_static_plugin {
    ($name:literal, $interface:expr, $descriptor:expr, $ctor:path, $initializer:path, $finalizer:path) => {
        const _: () = {
            #[allow(improper_ctypes_definitions)]
            unsafe extern "C" fn instancer(
                manager: &$crate::plugin_system::Manager,
                plugin: &str,
            ) -> *mut dyn $crate::plugin_system::PluginInstance {
                ::std::boxed::Box::into_raw($ctor(manager, plugin))
            }

            $crate::plugin_system::inventory::submit! {
                $crate::plugin_system::StaticPlugin {
                    name: $name,
                    version: $crate::plugin_system::PLUGIN_VERSION,
                    interface: $interface,
                    instancer: instancer,
                    initializer: $initializer,
                    finalizer: $finalizer,
                    descriptor: $descriptor,
                }
            }
        };
    };
}
