use std::fmt;
use std::ops::BitOr;

/// Load state of a plugin record.
///
/// Every variant occupies its own bit so that groups of states can be tested
/// with a single mask, e.g. `LoadState::Static | LoadState::Loaded`. Lifecycle
/// operations on [`Manager`](crate::plugin_system::Manager) return these
/// states instead of `Result` values; callers inspect the returned state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum LoadState {
    /// No plugin of the queried name or alias is known to the manager.
    NotFound = 1 << 0,
    /// The descriptor file next to the module could not be read or parsed.
    WrongMetadataFile = 1 << 1,
    /// The module reports a plugin version other than [`PLUGIN_VERSION`].
    ///
    /// [`PLUGIN_VERSION`]: crate::plugin_system::PLUGIN_VERSION
    WrongPluginVersion = 1 << 2,
    /// The module reports an interface string other than the manager's.
    WrongInterfaceVersion = 1 << 3,
    /// A declared dependency is missing, unowned or failed to load.
    UnresolvedDependency = 1 << 4,
    /// The module could not be opened or lacks a mandatory entry point.
    LoadFailed = 1 << 5,
    /// The plugin is known but its module is not currently loaded.
    NotLoaded = 1 << 6,
    /// The module is loaded and ready to instantiate.
    Loaded = 1 << 7,
    /// Closing the module failed; the record was reset to not-loaded anyway.
    UnloadFailed = 1 << 8,
    /// The plugin cannot be unloaded because other plugins depend on it.
    Required = 1 << 9,
    /// The plugin has live instances that refuse deletion.
    Used = 1 << 10,
    /// The plugin is compiled into the host and is never unloaded.
    Static = 1 << 11,
}

impl LoadState {
    /// Bit value of this state.
    pub const fn bits(self) -> u16 {
        self as u16
    }

    /// Tests membership in a mask built with `|`.
    pub fn matches(self, mask: impl Into<LoadStates>) -> bool {
        mask.into().contains(self)
    }
}

impl fmt::Display for LoadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LoadState::NotFound => "NotFound",
            LoadState::WrongMetadataFile => "WrongMetadataFile",
            LoadState::WrongPluginVersion => "WrongPluginVersion",
            LoadState::WrongInterfaceVersion => "WrongInterfaceVersion",
            LoadState::UnresolvedDependency => "UnresolvedDependency",
            LoadState::LoadFailed => "LoadFailed",
            LoadState::NotLoaded => "NotLoaded",
            LoadState::Loaded => "Loaded",
            LoadState::UnloadFailed => "UnloadFailed",
            LoadState::Required => "Required",
            LoadState::Used => "Used",
            LoadState::Static => "Static",
        };
        f.write_str(name)
    }
}

/// A set of [`LoadState`] bits, produced by `state | state`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LoadStates(u16);

impl LoadStates {
    /// The empty set.
    pub const fn empty() -> Self {
        LoadStates(0)
    }

    pub const fn bits(self) -> u16 {
        self.0
    }

    pub const fn contains(self, state: LoadState) -> bool {
        self.0 & state.bits() != 0
    }
}

impl From<LoadState> for LoadStates {
    fn from(state: LoadState) -> Self {
        LoadStates(state.bits())
    }
}

impl BitOr for LoadState {
    type Output = LoadStates;

    fn bitor(self, rhs: LoadState) -> LoadStates {
        LoadStates(self.bits() | rhs.bits())
    }
}

impl BitOr<LoadState> for LoadStates {
    type Output = LoadStates;

    fn bitor(self, rhs: LoadState) -> LoadStates {
        LoadStates(self.0 | rhs.bits())
    }
}

impl BitOr for LoadStates {
    type Output = LoadStates;

    fn bitor(self, rhs: LoadStates) -> LoadStates {
        LoadStates(self.0 | rhs.0)
    }
}

impl fmt::Display for LoadStates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const ALL: [LoadState; 12] = [
            LoadState::NotFound,
            LoadState::WrongMetadataFile,
            LoadState::WrongPluginVersion,
            LoadState::WrongInterfaceVersion,
            LoadState::UnresolvedDependency,
            LoadState::LoadFailed,
            LoadState::NotLoaded,
            LoadState::Loaded,
            LoadState::UnloadFailed,
            LoadState::Required,
            LoadState::Used,
            LoadState::Static,
        ];

        let mut first = true;
        for state in ALL {
            if self.contains(state) {
                if !first {
                    f.write_str("|")?;
                }
                write!(f, "{}", state)?;
                first = false;
            }
        }
        if first {
            f.write_str("(empty)")?;
        }
        Ok(())
    }
}
