//! Process creation for command lines.
//!
//! A command line with N stages needs N-1 pipes. All of them, along with any
//! redirection files, are opened before the first fork. Each child wires its
//! own ends onto stdin/stdout and closes every descriptor it inherited from
//! the pipeline; otherwise a reader further down would never see end of
//! input.

use std::ffi::CString;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::os::unix::io::{AsRawFd, FromRawFd, RawFd};
use std::process::ExitStatus;

use failure::{Fail, ResultExt};
use log::{debug, error};
use nix::errno::Errno;
use nix::sys::wait;
use nix::unistd::{self, ForkResult, Pid};

use crate::core::{
    parser::ast::{CommandLine, OutputMode, OutputRedirect, Stage},
    variable_expansion,
};
use crate::errors::{ErrorKind, Result};
use crate::shell::{builtins, job_control, Shell};
use crate::util;

const COMMAND_NOT_FOUND_EXIT_STATUS: i32 = 127;
const COMMAND_NOT_EXECUTABLE_EXIT_STATUS: i32 = 126;

/// A stage whose arguments have been expanded and converted for `execvp`.
struct PreparedStage<'a> {
    stage: &'a Stage,
    program: CString,
    argv: Vec<CString>,
}

impl<'a> PreparedStage<'a> {
    fn new(stage: &'a Stage) -> Result<Self> {
        let argv = stage
            .argv()?
            .into_iter()
            .map(CString::new)
            .collect::<::std::result::Result<Vec<_>, _>>()
            .context(ErrorKind::Io)?;
        Ok(Self {
            stage,
            program: argv[0].clone(),
            argv,
        })
    }
}

/// Spawns one process per stage of `command`, returning their pids in stage
/// order. Nothing is spawned if expansion, opening a redirection or creating
/// a pipe fails.
///
/// If a fork fails partway, the stages already running are left alone and
/// their pids are returned so they can still be waited for.
pub fn spawn_processes(shell: &mut Shell, command: &CommandLine) -> Result<Vec<Pid>> {
    let stages = command
        .stages
        .iter()
        .map(PreparedStage::new)
        .collect::<Result<Vec<_>>>()?;

    let input = match command.redirection.stdin {
        Some(ref path) => Some(open_input(path)?),
        None => None,
    };
    let output = match command.redirection.stdout {
        Some(ref redirect) => Some(open_output(redirect)?),
        None => None,
    };
    let pipes = (1..stages.len())
        .map(|_| create_pipe())
        .collect::<Result<Vec<_>>>()?;

    let mut inherited: Vec<RawFd> = pipes
        .iter()
        .flat_map(|(read_end, write_end)| vec![read_end.as_raw_fd(), write_end.as_raw_fd()])
        .collect();
    inherited.extend(input.iter().chain(output.iter()).map(AsRawFd::as_raw_fd));

    // Anything still buffered would otherwise be written again by each child.
    let _ = io::stdout().flush();
    let _ = io::stderr().flush();

    let last = stages.len() - 1;
    let mut pids = Vec::with_capacity(stages.len());
    for (i, stage) in stages.iter().enumerate() {
        let stdin = if i > 0 {
            Some(pipes[i - 1].0.as_raw_fd())
        } else {
            input.as_ref().map(AsRawFd::as_raw_fd)
        };
        let stdout = if i < last {
            Some(pipes[i].1.as_raw_fd())
        } else {
            output.as_ref().map(AsRawFd::as_raw_fd)
        };

        // The child only calls async-signal-safe functions before exec; the
        // shell itself is single threaded.
        match util::syscall(|| unsafe { unistd::fork() }) {
            Ok(ForkResult::Parent { child }) => {
                debug!("spawned {} for '{}'", child, stage.stage.words.join(" "));
                if command.background {
                    let temp_result = unistd::setpgid(child, child);
                    log_if_err!(temp_result, "failed to set pgid for pid ({})", child);
                }
                pids.push(child);
            }
            Ok(ForkResult::Child) => {
                exec_stage(shell, stage, stdin, stdout, &inherited, command.background)
            }
            Err(e) => {
                error!("fork failed after {} of {} stages: {}", i, stages.len(), e);
                if pids.is_empty() {
                    return Err(e.context(ErrorKind::Nix).into());
                }
                eprintln!("quash: fork: {}", e);
                break;
            }
        }
    }

    drop(pipes);
    drop(input);
    drop(output);
    Ok(pids)
}

/// Waits for every pid, in order, returning one exit status per process.
pub fn wait_for_processes(pids: &[Pid]) -> Result<Vec<ExitStatus>> {
    pids.iter().map(|&pid| wait_for_process(pid)).collect()
}

/// Blocks until `pid` terminates.
pub fn wait_for_process(pid: Pid) -> Result<ExitStatus> {
    loop {
        let wait_status = util::syscall(|| wait::waitpid(pid, None)).context(ErrorKind::Nix)?;
        if let Some(exit_status) = util::exit_status_from_wait(wait_status) {
            debug!("{} exited with {}", pid, exit_status);
            return Ok(exit_status);
        }
    }
}

pub fn open_input(path: &str) -> Result<File> {
    let path = variable_expansion::expand(path)?;
    let file = File::open(&path).with_context(|_| ErrorKind::File(path.clone()))?;
    Ok(file)
}

pub fn open_output(redirect: &OutputRedirect) -> Result<File> {
    let path = variable_expansion::expand(&redirect.path)?;
    let mut options = OpenOptions::new();
    options.create(true);
    match redirect.mode {
        OutputMode::Truncate => options.write(true).truncate(true),
        OutputMode::Append => options.append(true),
    };
    let file = options
        .open(&path)
        .with_context(|_| ErrorKind::File(path.clone()))?;
    Ok(file)
}

/// Wraps `unistd::pipe()` to return RAII structs instead of raw, owning file descriptors
/// Returns (`read_end_pipe`, `write_end_pipe`)
fn create_pipe() -> Result<(File, File)> {
    // It is safe to call from_raw_fd here because the returned Files are the
    // only owners of the descriptors.
    let (read_end_pipe, write_end_pipe) = unistd::pipe().context(ErrorKind::Nix)?;
    unsafe {
        Ok((
            File::from_raw_fd(read_end_pipe),
            File::from_raw_fd(write_end_pipe),
        ))
    }
}

/// Runs in the forked child. Never returns.
fn exec_stage(
    shell: &mut Shell,
    stage: &PreparedStage<'_>,
    stdin: Option<RawFd>,
    stdout: Option<RawFd>,
    inherited: &[RawFd],
    background: bool,
) -> ! {
    job_control::restore_default_signals(shell.is_interactive());
    if background {
        let _ = unistd::setpgid(Pid::from_raw(0), Pid::from_raw(0));
    }

    let redirected = redirect_fd(stdin, libc::STDIN_FILENO)
        .and_then(|_| redirect_fd(stdout, libc::STDOUT_FILENO));
    if let Err(e) = redirected {
        eprintln!("quash: failed to redirect: {}", e);
        child_exit(1);
    }
    for fd in descriptors_to_close(inherited, stdin, stdout) {
        let _ = unistd::close(fd);
    }

    let program = stage.stage.program();
    if builtins::is_builtin(program) {
        let words = &stage.stage.words;
        let (exit_status, result) = builtins::run(shell, program, &words[1..], &mut io::stdout());
        if let Err(e) = result {
            eprintln!("quash: {}", e.describe());
        }
        let _ = io::stdout().flush();
        child_exit(exit_status.code().unwrap_or(1));
    }

    let e = match unistd::execvp(&stage.program, &stage.argv) {
        Err(e) => e,
        Ok(never) => match never {},
    };
    let name = stage.program.to_string_lossy();
    if e == Errno::ENOENT {
        eprintln!("quash: {}: command not found", name);
        child_exit(COMMAND_NOT_FOUND_EXIT_STATUS);
    }
    eprintln!("quash: {}: {}", name, e.desc());
    child_exit(COMMAND_NOT_EXECUTABLE_EXIT_STATUS)
}

fn redirect_fd(from: Option<RawFd>, to: RawFd) -> nix::Result<()> {
    match from {
        Some(fd) if fd != to => util::syscall(|| unistd::dup2(fd, to)).map(|_| ()),
        _ => Ok(()),
    }
}

/// The inherited descriptors a child closes after `redirect_fd`. Standard
/// input and output now hold the stage's own ends, even when a pipe or file
/// was already opened on 0 or 1.
fn descriptors_to_close<'a>(
    inherited: &'a [RawFd],
    stdin: Option<RawFd>,
    stdout: Option<RawFd>,
) -> impl Iterator<Item = RawFd> + 'a {
    inherited.iter().cloned().filter(move |&fd| {
        !(fd == libc::STDIN_FILENO && stdin.is_some()
            || fd == libc::STDOUT_FILENO && stdout.is_some())
    })
}

/// Leaves the child without running the parent's exit handlers or flushing
/// its copies of the parent's buffers.
fn child_exit(code: i32) -> ! {
    let _ = io::stderr().flush();
    unsafe { libc::_exit(code) }
}
