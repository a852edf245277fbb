use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::process::{self, ExitStatus};

use atty::{self, Stream};
use docopt::Docopt;
use log::{debug, error, LevelFilter};
use nix::unistd::Pid;
use serde::Deserialize;

use quash::errors::Error;
use quash::shell::DEFAULT_HISTORY_CAPACITY;
use quash::{QuashExitStatusExt, Shell, ShellConfig};

const LOG_FILE_NAME: &str = ".quash_log";

const USAGE: &str = "
Quash - quite a shell.

Usage:
    quash [options]
    quash [options] -c <command>
    quash [options] <file>
    quash (-h | --help)
    quash --version

Options:
    -h --help       Show this screen.
    --version       Show version.
    -c              If the -c option is present, then commands are read from the first non-option
                        argument command_string.
    --log=<path>    File to write log to, defaults to ~/.quash_log
";

/// Docopts input arguments.
#[derive(Debug, Deserialize)]
struct Args {
    arg_command: Option<String>,
    arg_file: Option<String>,
    flag_version: bool,
    flag_c: bool,
    flag_log: Option<String>,
}

fn main() {
    let args: Args = Docopt::new(USAGE)
        .and_then(|d| d.deserialize())
        .unwrap_or_else(|e| e.exit());

    init_logger(args.flag_log.as_ref());
    debug!("{:?}", args);

    if args.flag_version {
        println!("quash version {}", env!("CARGO_PKG_VERSION"));
    } else if args.flag_c || args.arg_file.is_some() {
        execute_from_command_string_or_file(&args);
    } else {
        execute_from_stdin();
    }
}

/// Logging is skipped when the log file can't be opened.
fn init_logger(path: Option<&String>) {
    let log_path = match path.map(PathBuf::from).or_else(default_log_path) {
        Some(log_path) => log_path,
        None => return,
    };
    let log_file = match OpenOptions::new().create(true).append(true).open(&log_path) {
        Ok(log_file) => log_file,
        Err(_) => return,
    };

    let pid = Pid::this();
    let _ = fern::Dispatch::new()
        .format(move |out, message, record| {
            out.finish(format_args!(
                "{} [{}] {}: {}",
                pid,
                record.level(),
                record.target(),
                message
            ))
        })
        .level(LevelFilter::Trace)
        .chain(log_file)
        .apply();
}

fn default_log_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(LOG_FILE_NAME))
}

fn execute_from_command_string_or_file(args: &Args) -> ! {
    let shell_config = ShellConfig::noninteractive();
    let mut shell = Shell::new(shell_config).unwrap_or_else(|e| display_error_and_exit(&e));

    let result = if let Some(ref command) = args.arg_command {
        shell.execute_command_string(command)
    } else if let Some(ref file_path) = args.arg_file {
        shell.execute_commands_from_file(Path::new(file_path))
    } else {
        unreachable!();
    };

    if let Err(e) = result {
        eprintln!("quash: {}", e.describe());
        shell.exit(Some(ExitStatus::from_status(e.exit_code())));
    }
    shell.exit(None);
}

fn execute_from_stdin() -> ! {
    let shell_config = if atty::is(Stream::Stdin) {
        ShellConfig::interactive(DEFAULT_HISTORY_CAPACITY)
    } else {
        ShellConfig::noninteractive()
    };
    let mut shell = Shell::new(shell_config).unwrap_or_else(|e| display_error_and_exit(&e));
    shell.execute_from_stdin()
}

fn display_error_and_exit(error: &Error) -> ! {
    error!("failed to create shell: {}", error);
    eprintln!("quash: {}", error.describe());
    process::exit(ExitStatus::from_failure().code().unwrap_or(1));
}
