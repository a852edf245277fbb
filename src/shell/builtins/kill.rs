use log::info;
use nix::errno::Errno;
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;

use crate::core::job::JobId;
use crate::shell::builtins::{self, prelude::*};
use crate::shell::KilledJob;

pub struct Kill;

impl builtins::BuiltinCommand for Kill {
    const NAME: &'static str = builtins::KILL_NAME;

    const HELP: &'static str = "\
kill: kill pid | %job_id
    Send SIGTERM to a process or a background job.

    For %JOB_ID, waits briefly for the job to terminate and removes it from
    the job list. A job still running afterwards is reported as signaled and
    stays listed until it exits.

    Exit Status:
    Returns success unless an invalid argument is given or an error occurs.";

    fn run<T: AsRef<str>>(shell: &mut Shell, args: &[T], stdout: &mut dyn Write) -> Result<()> {
        let arg = match args.first() {
            Some(arg) => arg.as_ref(),
            None => return Err(Error::builtin_command(format!("kill: usage: {}", Self::usage()), 2)),
        };

        if arg.starts_with('%') {
            let id = arg[1..].parse::<u32>().map(JobId).map_err(|_| {
                Error::builtin_command(format!("kill: {}: arguments must be job IDs", arg), 1)
            })?;
            let killed = shell.kill_job(id).map_err(|e| match *e.kind() {
                ErrorKind::NoSuchJob(_) => Error::builtin_command(format!("kill: {}", e), 1),
                _ => e,
            })?;
            let (job, outcome) = match killed {
                KilledJob::Terminated(job) => (job, "terminated"),
                KilledJob::StillRunning(job) => (job, "signaled"),
            };
            writeln!(
                stdout,
                "[{}] {} {} {}",
                job.id(),
                job.pid(),
                outcome,
                job.command()
            )
            .context(ErrorKind::Io)?;
        } else {
            let pid = match arg.parse::<i32>() {
                Ok(pid) if pid > 0 => Pid::from_raw(pid),
                _ => {
                    return Err(Error::builtin_command(
                        format!("kill: {}: arguments must be process or job IDs", arg),
                        1,
                    ))
                }
            };
            // A tracked job is reported by the notifier once it is reaped.
            signal::kill(pid, Signal::SIGTERM).map_err(|e| {
                let reason = if e == Errno::ESRCH {
                    "No such process"
                } else {
                    e.desc()
                };
                Error::builtin_command(format!("kill: ({}) - {}", pid, reason), 1)
            })?;
            info!("sent SIGTERM to {}", pid);
            writeln!(stdout, "{} terminated", pid).context(ErrorKind::Io)?;
        }

        Ok(())
    }
}
