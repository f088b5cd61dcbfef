//! Assertion helper for programmer errors.
//!
//! Misuse of a public API (duplicate argument keys, querying a boolean flag
//! as a value, registering an instance with the wrong manager) aborts in
//! debug builds. Release builds log the message and return the supplied
//! fallback so the process can limp on.

macro_rules! soft_assert {
    ($cond:expr, $ret:expr, $($msg:tt)+) => {
        if !$cond {
            log::error!($($msg)+);
            debug_assert!(false, $($msg)+);
            return $ret;
        }
    };
}

pub(crate) use soft_assert;
