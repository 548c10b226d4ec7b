//! Logging macros used throughout the crate.
//!
//! `info!` and `warn!` are the `log` crate's own. `debug!` and `trace!` check
//! [`HOT_LOG_ENABLED`] first: the update pass runs at every halt of the target and reports each
//! reconciled reference at those levels, so release builds skip them unless the `hot_log`
//! feature is on.
//!
//! Always import logging macros from this module. `Cargo.toml` renames the `log` crate to
//! `the_log_crate` so that an editor never suggests `log::debug!` in its place.

pub(crate) use the_log_crate::{info, warn, Level};

/// DEBUG and TRACE logs are compiled into debug builds, and into release builds built with the
/// `hot_log` feature.
pub(crate) const HOT_LOG_ENABLED: bool = cfg!(any(debug_assertions, feature = "hot_log"));

/// `the_log_crate::debug!`, skipped unless [`HOT_LOG_ENABLED`].
macro_rules! debug {
    ($($arg:tt)+) => {
        if $crate::util::log::HOT_LOG_ENABLED {
            the_log_crate::debug!($($arg)+)
        }
    };
}

/// `the_log_crate::trace!`, skipped unless [`HOT_LOG_ENABLED`].
macro_rules! trace {
    ($($arg:tt)+) => {
        if $crate::util::log::HOT_LOG_ENABLED {
            the_log_crate::trace!($($arg)+)
        }
    };
}

// Give the macros a path, so that callers write `use crate::util::log::{debug, trace}`.
pub(crate) use debug;
pub(crate) use trace;
