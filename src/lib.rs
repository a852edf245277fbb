//! Quash - quite a shell
//!
//! A line-oriented command interpreter: pipelines, file redirection and
//! background jobs that are reported when they finish.

#![warn(missing_debug_implementations, trivial_casts, unused_import_braces)]

/// Logs the error of a `Result` that can't be propagated.
macro_rules! log_if_err {
    ($result:expr, $fmt:literal $(, $arg:expr)*) => {
        if let Err(ref e) = $result {
            ::log::error!(concat!($fmt, ": {}") $(, $arg)*, e);
        }
    };
}

pub mod core;
pub mod editor;
pub mod errors;
pub mod execute_command;
pub mod shell;
mod util;

pub use crate::shell::{Shell, ShellConfig};
pub use crate::util::QuashExitStatusExt;
