//! Background job notification.
//!
//! Finished jobs are noticed two ways: the main loop polls before every
//! prompt, and a SIGCHLD handler reaps as soon as a child exits. Both go
//! through `JobTable::reap`, whose slot claims keep them from reporting the
//! same job twice.

use std::fmt::{self, Write as _};
use std::io::Write;

use failure::ResultExt;
use log::{debug, info};
use nix::errno::Errno;
use nix::sys::{
    signal::{self, SaFlags, SigAction, SigHandler, SigSet, Signal},
    wait::{self, WaitPidFlag, WaitStatus},
};
use nix::unistd::{self, Pid};

use crate::core::job::{Job, JobTable};
use crate::errors::{ErrorKind, Result};
use crate::util;

/// Jobs started by this process. The SIGCHLD handler only sees this table.
static JOB_TABLE: JobTable = JobTable::new();

const NOTIFICATION_CAPACITY: usize = 256;

pub fn job_table() -> &'static JobTable {
    &JOB_TABLE
}

/// Installs the SIGCHLD notifier. Interactive shells also ignore the
/// keyboard signals meant for foreground children.
pub fn initialize_job_control(interactive: bool) -> Result<()> {
    let action = SigAction::new(
        SigHandler::Handler(handle_sigchld),
        SaFlags::SA_RESTART | SaFlags::SA_NOCLDSTOP,
        SigSet::empty(),
    );
    unsafe {
        signal::sigaction(Signal::SIGCHLD, &action).context(ErrorKind::Nix)?;
    }

    if interactive {
        unsafe {
            signal::signal(Signal::SIGINT, SigHandler::SigIgn).context(ErrorKind::Nix)?;
            signal::signal(Signal::SIGQUIT, SigHandler::SigIgn).context(ErrorKind::Nix)?;
        }
    }

    info!("job control initialized (interactive: {})", interactive);
    Ok(())
}

/// Called in a freshly forked child, before exec.
pub fn restore_default_signals(interactive: bool) {
    // signal(3) only fails for invalid signal numbers.
    unsafe {
        let _ = signal::signal(Signal::SIGCHLD, SigHandler::SigDfl);
        let _ = signal::signal(Signal::SIGPIPE, SigHandler::SigDfl);
        if interactive {
            let _ = signal::signal(Signal::SIGINT, SigHandler::SigDfl);
            let _ = signal::signal(Signal::SIGQUIT, SigHandler::SigDfl);
        }
    }
}

/// Runs `f` with SIGCHLD blocked, keeping the handler's output from landing
/// in the middle of whatever `f` prints.
pub fn with_sigchld_blocked<T, F: FnOnce() -> T>(f: F) -> T {
    let mut mask = SigSet::empty();
    mask.add(Signal::SIGCHLD);
    let temp_result = mask.thread_block();
    log_if_err!(temp_result, "failed to block SIGCHLD");
    let result = f();
    let temp_result = mask.thread_unblock();
    log_if_err!(temp_result, "failed to unblock SIGCHLD");
    result
}

/// Non-blocking check whether `pid` is gone. A pid that is no longer our
/// child counts as gone so that its entry is dropped.
pub fn has_terminated(pid: Pid) -> bool {
    match util::syscall(|| wait::waitpid(pid, Some(WaitPidFlag::WNOHANG))) {
        Ok(WaitStatus::Exited(..)) | Ok(WaitStatus::Signaled(..)) => true,
        Ok(_) => false,
        Err(Errno::ECHILD) => true,
        Err(_) => false,
    }
}

/// Polling path: reports and removes every finished job.
pub fn do_job_notification(jobs: &JobTable, stdout: &mut dyn Write) -> usize {
    let reaped = jobs.reap(has_terminated, |job| {
        debug!("job [{}] ({}) finished", job.id(), job.pid());
        let temp_result = writeln!(stdout, "{}", job.completion());
        log_if_err!(temp_result, "failed to report finished job");
    });
    let _ = stdout.flush();
    reaped
}

extern "C" fn handle_sigchld(_: libc::c_int) {
    let _errno = SavedErrno::save();
    JOB_TABLE.reap(has_terminated, write_completion);
}

/// Puts back the `errno` of the code the handler interrupted.
struct SavedErrno(libc::c_int);

impl SavedErrno {
    fn save() -> Self {
        SavedErrno(unsafe { *errno_location() })
    }
}

impl Drop for SavedErrno {
    fn drop(&mut self) {
        unsafe { *errno_location() = self.0 }
    }
}

#[cfg(any(target_os = "linux", target_os = "android"))]
unsafe fn errno_location() -> *mut libc::c_int {
    libc::__errno_location()
}

#[cfg(any(
    target_os = "macos",
    target_os = "ios",
    target_os = "freebsd",
    target_os = "dragonfly"
))]
unsafe fn errno_location() -> *mut libc::c_int {
    libc::__error()
}

/// Async-signal-safe: formats on the stack and writes straight to stdout.
fn write_completion(job: &Job) {
    let mut message = StackBuffer::new();
    if writeln!(message, "{}", job.completion()).is_err() {
        message.truncated();
    }
    let _ = util::syscall(|| unistd::write(libc::STDOUT_FILENO, message.as_bytes()));
}

/// Fixed-size `fmt::Write` target for use where allocating is not allowed.
struct StackBuffer {
    bytes: [u8; NOTIFICATION_CAPACITY],
    len: usize,
}

impl StackBuffer {
    fn new() -> Self {
        Self {
            bytes: [0; NOTIFICATION_CAPACITY],
            len: 0,
        }
    }

    fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len]
    }

    /// Ends an overflowing message with a newline.
    fn truncated(&mut self) {
        self.len = self.len.min(NOTIFICATION_CAPACITY - 1);
        self.bytes[self.len] = b'\n';
        self.len += 1;
    }
}

impl fmt::Write for StackBuffer {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        let available = NOTIFICATION_CAPACITY - self.len;
        let n = s.len().min(available);
        self.bytes[self.len..self.len + n].copy_from_slice(&s.as_bytes()[..n]);
        self.len += n;
        if n < s.len() {
            Err(fmt::Error)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::fmt::Write as _;
    use std::process::Command;
    use std::sync::Mutex;
    use std::thread;
    use std::time::{Duration, Instant};

    use lazy_static::lazy_static;

    use crate::core::job::JobId;
    use crate::shell::{Shell, ShellConfig};

    lazy_static! {
        /// Serializes the tests that install the handler and use `JOB_TABLE`.
        static ref HANDLER_LOCK: Mutex<()> = Mutex::new(());
    }

    fn install_handler() {
        Shell::new(ShellConfig::interactive(1)).unwrap();
    }

    /// Waits for the handler, never polling, to drop job `id`.
    fn wait_for_handler_to_reap(id: JobId) {
        let deadline = Instant::now() + Duration::from_secs(10);
        while JOB_TABLE.find(id).is_some() {
            assert!(Instant::now() < deadline, "job [{}] was never reaped", id);
            thread::sleep(Duration::from_millis(10));
        }
    }

    fn child_pid(child: &::std::process::Child) -> Pid {
        Pid::from_raw(child.id() as i32)
    }

    #[test]
    fn test_has_terminated() {
        let mut sleeper = Command::new("sleep").arg("30").spawn().unwrap();
        assert!(!has_terminated(child_pid(&sleeper)));
        sleeper.kill().unwrap();
        while !has_terminated(child_pid(&sleeper)) {
            thread::sleep(Duration::from_millis(10));
        }
    }

    #[test]
    fn test_unknown_pid_has_terminated() {
        assert!(has_terminated(Pid::from_raw(i32::max_value())));
    }

    #[test]
    fn test_do_job_notification_reports_each_job_once() {
        let jobs = JobTable::new();
        let quick = Command::new("true").spawn().unwrap();
        let id = jobs.add(child_pid(&quick), &["true"]).unwrap();

        let mut output = Vec::new();
        while do_job_notification(&jobs, &mut output) == 0 {
            thread::sleep(Duration::from_millis(10));
        }
        assert!(jobs.is_empty());
        assert_eq!(
            String::from_utf8(output).unwrap(),
            format!("[{}] {} done true\n", id, quick.id())
        );

        let mut output = Vec::new();
        assert_eq!(do_job_notification(&jobs, &mut output), 0);
        assert!(output.is_empty());
    }

    #[test]
    fn test_stack_buffer() {
        let mut buffer = StackBuffer::new();
        write!(buffer, "[{}] {}", 1, "done").unwrap();
        assert_eq!(buffer.as_bytes(), b"[1] done");

        let mut buffer = StackBuffer::new();
        let long = "x".repeat(NOTIFICATION_CAPACITY + 10);
        assert!(write!(buffer, "{}", long).is_err());
        buffer.truncated();
        assert_eq!(buffer.as_bytes().len(), NOTIFICATION_CAPACITY);
        assert_eq!(buffer.as_bytes().last(), Some(&b'\n'));
    }

    #[test]
    fn test_handler_reaps_background_job() {
        let _lock = HANDLER_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let mut shell = Shell::new(ShellConfig::interactive(1)).unwrap();
        let ids_before: Vec<JobId> = JOB_TABLE.list().iter().map(Job::id).collect();

        shell.execute_command_string("sleep 1 &").unwrap();
        let job = JOB_TABLE
            .list()
            .into_iter()
            .find(|job| !ids_before.contains(&job.id()))
            .expect("background job should be tracked");
        assert_eq!(job.command(), "sleep 1");

        wait_for_handler_to_reap(job.id());
    }

    #[test]
    fn test_exit_while_sigchld_blocked_is_reaped_on_unblock() {
        let _lock = HANDLER_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        install_handler();

        let id = with_sigchld_blocked(|| {
            let quick = Command::new("true").spawn().unwrap();
            thread::sleep(Duration::from_millis(200));
            let id = JOB_TABLE.add(child_pid(&quick), &["true"]).unwrap();
            // Directed at this thread, so it stays pending until the unblock.
            signal::raise(Signal::SIGCHLD).unwrap();
            id
        });

        wait_for_handler_to_reap(id);
    }

    #[test]
    fn test_handler_preserves_errno() {
        let _lock = HANDLER_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        // Not a child of ours, so the handler's waitpid fails with ECHILD.
        let id = JOB_TABLE.add(Pid::from_raw(i32::max_value()), &["stray"]).unwrap();

        unsafe { *errno_location() = libc::ENOTTY };
        handle_sigchld(libc::SIGCHLD);
        assert_eq!(Errno::last(), Errno::ENOTTY);
        assert!(JOB_TABLE.find(id).is_none());
    }
}
