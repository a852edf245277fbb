//! Quash builtins
//!
//! This module includes the implementations of the shell builtin commands.
//! Where possible the commands conform to their standard Bash counterparts.

use std::iter;

use docopt::Docopt;
use failure::Fail;
use serde::Deserialize;

use self::prelude::*;

use self::dirs::{Cd, Pwd};
use self::echo::Echo;
use self::env::Export;
use self::exit::{Exit, Quit};
use self::help::Help;
use self::jobs::Jobs;
use self::kill::Kill;
use crate::core::tokenizer;

pub mod prelude {
    pub use std::io::Write;
    pub use std::process::ExitStatus;

    pub use failure::ResultExt;

    pub use super::parse_args;
    pub use crate::errors::{Error, ErrorKind, Result};
    pub use crate::shell::Shell;
    pub use crate::util::QuashExitStatusExt;
}

mod dirs;
mod echo;
mod env;
mod exit;
mod help;
mod jobs;
mod kill;

const CD_NAME: &str = "cd";
const ECHO_NAME: &str = "echo";
const EXIT_NAME: &str = "exit";
const EXPORT_NAME: &str = "export";
const HELP_NAME: &str = "help";
const JOBS_NAME: &str = "jobs";
const KILL_NAME: &str = "kill";
const PWD_NAME: &str = "pwd";
const QUIT_NAME: &str = "quit";

/// Represents a Quash builtin command such as cd or help.
pub trait BuiltinCommand {
    /// The NAME of the command.
    const NAME: &'static str;
    /// The help string to display to the user.
    const HELP: &'static str;
    /// The usage string to display to the user.
    fn usage() -> String {
        Self::HELP.lines().next().unwrap_or(Self::NAME).to_owned()
    }
    /// Runs the command with the given arguments in the `shell` environment.
    fn run<T: AsRef<str>>(shell: &mut Shell, args: &[T], stdout: &mut dyn Write) -> Result<()>;
}

pub fn is_builtin<T: AsRef<str>>(program: T) -> bool {
    [
        CD_NAME,
        ECHO_NAME,
        EXIT_NAME,
        EXPORT_NAME,
        HELP_NAME,
        JOBS_NAME,
        KILL_NAME,
        PWD_NAME,
        QUIT_NAME,
    ]
    .contains(&program.as_ref())
}

/// precondition: command is a builtin.
/// Returns (`exit_status_code`, `builtin_result`)
///
/// `args` are the words as typed. `echo` and `export` expand variables
/// themselves; every other builtin gets its arguments expanded here.
pub fn run<S1, S2>(
    shell: &mut Shell,
    program: S1,
    args: &[S2],
    stdout: &mut dyn Write,
) -> (ExitStatus, Result<()>)
where
    S1: AsRef<str>,
    S2: AsRef<str>,
{
    debug_assert!(is_builtin(&program));

    let result = match program.as_ref() {
        ECHO_NAME => Echo::run(shell, args, stdout),
        EXPORT_NAME => Export::run(shell, args, stdout),
        name => tokenizer::expand_words(args)
            .and_then(|args| run_with_expanded_args(shell, name, &args, stdout)),
    };

    let exit_status = get_builtin_exit_status(&result);
    (exit_status, result)
}

fn run_with_expanded_args(
    shell: &mut Shell,
    program: &str,
    args: &[String],
    stdout: &mut dyn Write,
) -> Result<()> {
    match program {
        CD_NAME => Cd::run(shell, args, stdout),
        EXIT_NAME => Exit::run(shell, args, stdout),
        HELP_NAME => Help::run(shell, args, stdout),
        JOBS_NAME => Jobs::run(shell, args, stdout),
        KILL_NAME => Kill::run(shell, args, stdout),
        PWD_NAME => Pwd::run(shell, args, stdout),
        QUIT_NAME => Quit::run(shell, args, stdout),
        _ => unreachable!(),
    }
}

fn get_builtin_exit_status(result: &Result<()>) -> ExitStatus {
    let status = match *result {
        Ok(()) => 0,
        Err(ref e) => e.exit_code(),
    };

    ExitStatus::from_status(status)
}

pub fn parse_args<'a, 'de: 'a, D, S, I>(usage: &str, program: S, args: I) -> Result<D>
where
    D: Deserialize<'de>,
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    Docopt::new(usage)
        .and_then(|docopt| {
            docopt
                .help(false)
                .argv(iter::once(program).chain(args))
                .deserialize()
        })
        .map_err(|e| e.context(ErrorKind::Docopt).into())
}
