// src/macros.rs

//
// Logging macros
//
// logging feature enabled  → tracing, target "protomux"
// logging feature disabled → log_error prints to stderr, everything else
//                            compiles away
//

#![allow(unused_macros)]

// --------------------
// ERROR
// --------------------

#[cfg(feature = "logging")]
macro_rules! log_error {
    ($($arg:tt)*) => {
        tracing::error!(target: "protomux", $($arg)*)
    };
}

#[cfg(not(feature = "logging"))]
macro_rules! log_error {
    ($($arg:tt)*) => {
        eprintln!("protomux: {}", format_args!($($arg)*))
    };
}

// --------------------
// WARN
// --------------------

#[cfg(feature = "logging")]
macro_rules! log_warn {
    ($($arg:tt)*) => {
        tracing::warn!(target: "protomux", $($arg)*)
    };
}

#[cfg(not(feature = "logging"))]
macro_rules! log_warn {
    ($($arg:tt)*) => {};
}

// --------------------
// INFO
// --------------------

#[cfg(feature = "logging")]
macro_rules! log_info {
    ($($arg:tt)*) => {
        tracing::info!(target: "protomux", $($arg)*)
    };
}

#[cfg(not(feature = "logging"))]
macro_rules! log_info {
    ($($arg:tt)*) => {};
}

// --------------------
// DEBUG
// --------------------

#[cfg(feature = "logging")]
macro_rules! log_debug {
    ($($arg:tt)*) => {
        tracing::debug!(target: "protomux", $($arg)*)
    };
}

#[cfg(not(feature = "logging"))]
macro_rules! log_debug {
    ($($arg:tt)*) => {};
}

// --------------------
// TRACE (per-frame noise)
// --------------------

#[cfg(feature = "logging")]
macro_rules! log_trace {
    ($($arg:tt)*) => {
        tracing::trace!(target: "protomux", $($arg)*)
    };
}

#[cfg(not(feature = "logging"))]
macro_rules! log_trace {
    ($($arg:tt)*) => {};
}

pub(crate) use log_debug;
pub(crate) use log_error;
pub(crate) use log_info;
pub(crate) use log_trace;
pub(crate) use log_warn;
