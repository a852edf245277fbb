//! The Shell reads command lines, runs built-ins in its own process, launches
//! everything else through `execute_command`, and tracks background jobs.

use std::fmt;
use std::fs;
use std::io::{self, Write};
use std::path::Path;
use std::process::{self, ExitStatus};
use std::thread;
use std::time::{Duration, Instant};

use failure::ResultExt;
use log::{debug, info, warn};
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;

use crate::core::{
    job::{Job, JobId, JobTable},
    parser::ast::CommandLine,
};
use crate::editor::Editor;
use crate::errors::{Error, ErrorKind, Result};
use crate::execute_command;
use crate::util::QuashExitStatusExt;

pub mod builtins;
pub mod job_control;

pub const PROMPT: &str = "[QUASH]$ ";
pub const BANNER: &str = "Welcome to Quash Shell!";
pub const DEFAULT_HISTORY_CAPACITY: usize = 10;

/// How long `kill %N` waits for a signalled job before returning to the prompt.
const KILL_WAIT_TIMEOUT: Duration = Duration::from_millis(500);
const KILL_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Outcome of `Shell::kill_job`.
#[derive(Debug, PartialEq)]
pub enum KilledJob {
    /// The process exited and the job was removed.
    Terminated(Job),
    /// SIGTERM was sent but the process is still alive; the job stays listed.
    StillRunning(Job),
}

/// Polls `pid` until it is gone or `timeout` passes.
fn wait_for_exit(pid: Pid, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if job_control::has_terminated(pid) {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        thread::sleep(KILL_POLL_INTERVAL);
    }
}

pub struct Shell {
    /// Responsible for readline and history.
    editor: Editor,
    jobs: &'static JobTable,
    /// Exit status of last command executed.
    last_exit_status: ExitStatus,
    config: ShellConfig,
    /// Is `false` when reading a script or piped input, or if installing the
    /// signal handlers fails.
    is_interactive: bool,
}

impl Shell {
    pub fn new(config: ShellConfig) -> Result<Self> {
        Self::with_job_table(config, job_control::job_table())
    }

    /// Only the process-wide table is reaped by the SIGCHLD handler; any other
    /// table relies on polling.
    pub fn with_job_table(config: ShellConfig, jobs: &'static JobTable) -> Result<Self> {
        let mut shell = Self {
            editor: Editor::with_capacity(config.command_history_capacity),
            jobs,
            last_exit_status: ExitStatus::from_success(),
            config,
            is_interactive: config.enable_job_control && atty::is(atty::Stream::Stdin),
        };

        if config.enable_job_control {
            let result = job_control::initialize_job_control(shell.is_interactive);
            if let Err(e) = result {
                warn!("failed to initialize job control: {}", e.describe());
                shell.is_interactive = false;
            }
        }

        info!("quash started up");
        Ok(shell)
    }

    pub fn is_interactive(&self) -> bool {
        self.is_interactive
    }

    pub fn jobs(&self) -> &'static JobTable {
        self.jobs
    }

    pub fn last_exit_status(&self) -> ExitStatus {
        self.last_exit_status
    }

    /// Runs one line. On error the exit status is updated and the error is
    /// returned for the caller to report.
    pub fn execute_command_string(&mut self, input: &str) -> Result<()> {
        let input = input.trim();
        if input.is_empty() {
            return Ok(());
        }

        if self.config.enable_command_history {
            self.editor.add_history_entry(input);
        }

        let result = CommandLine::parse(input).and_then(|command| match command {
            Some(command) => self.execute_command(&command),
            None => Ok(()),
        });
        if let Err(ref e) = result {
            self.last_exit_status = ExitStatus::from_status(e.exit_code());
        }
        result
    }

    /// Runs each line of `path`, reporting errors and moving on.
    pub fn execute_commands_from_file(&mut self, path: &Path) -> Result<()> {
        let contents = fs::read_to_string(path)
            .with_context(|_| ErrorKind::File(path.display().to_string()))?;

        for line in contents.lines() {
            self.notify_finished_jobs();
            let result = self.execute_command_string(line);
            report_error(&result);
        }
        self.notify_finished_jobs();
        Ok(())
    }

    /// The read loop. Returns only by exiting the process.
    pub fn execute_from_stdin(&mut self) -> ! {
        let show_prompt = self.editor.is_terminal();
        if show_prompt && self.config.display_messages {
            println!("{}", BANNER);
        }

        loop {
            self.notify_finished_jobs();

            let prompt = if show_prompt { PROMPT } else { "" };
            let line = match self.editor.readline(prompt) {
                Ok(Some(line)) => line,
                Ok(None) => {
                    println!();
                    self.exit(Some(ExitStatus::from_success()));
                }
                Err(e) => {
                    eprintln!("quash: {}", e.describe());
                    self.exit(Some(ExitStatus::from_failure()));
                }
            };

            let result = self.execute_command_string(&line);
            report_error(&result);
        }
    }

    /// Sends SIGTERM to job `id` and gives it `KILL_WAIT_TIMEOUT` to exit.
    /// The job is removed only once its process is gone; one that outlives
    /// the wait stays tracked for the notifier.
    pub fn kill_job(&mut self, id: JobId) -> Result<KilledJob> {
        let result = self.jobs.remove_if(id, |job| -> Result<bool> {
            signal::kill(job.pid(), Signal::SIGTERM).context(ErrorKind::Nix)?;
            Ok(wait_for_exit(job.pid(), KILL_WAIT_TIMEOUT))
        });

        match result {
            Some(Ok((job, true))) => {
                info!("killed job [{}] ({})", job.id(), job.pid());
                Ok(KilledJob::Terminated(job))
            }
            Some(Ok((job, false))) => {
                warn!("job [{}] ({}) still running after SIGTERM", job.id(), job.pid());
                Ok(KilledJob::StillRunning(job))
            }
            Some(Err(e)) => Err(e),
            None => Err(Error::no_such_job(format!("%{}", id))),
        }
    }

    /// Exits with `n`, or the last command's status when `None`.
    pub fn exit(&mut self, n: Option<ExitStatus>) -> ! {
        let code = n
            .unwrap_or(self.last_exit_status)
            .code()
            .unwrap_or(1);
        let _ = io::stdout().flush();
        info!("quash has shut down ({})", code);
        process::exit(code & 0xff);
    }

    fn notify_finished_jobs(&self) {
        job_control::do_job_notification(self.jobs, &mut io::stdout());
    }

    fn execute_command(&mut self, command: &CommandLine) -> Result<()> {
        if !command.is_pipeline() && builtins::is_builtin(command.stages[0].program()) {
            if command.background {
                debug!("running background built-in in the foreground");
            }
            return self.execute_builtin(command);
        }

        // Expanded now so that the job's text matches what was launched.
        let argv = if command.background {
            command.stages[0].argv()?
        } else {
            Vec::new()
        };

        let pids = execute_command::spawn_processes(self, command)?;
        if command.background {
            let pid = pids[0];
            let jobs = self.jobs;
            job_control::with_sigchld_blocked(|| match jobs.add(pid, &argv) {
                Some(id) => {
                    println!("[{}] {}", id, pid);
                    let _ = io::stdout().flush();
                }
                None => warn!("job table full, {} runs untracked", pid),
            });
            self.last_exit_status = ExitStatus::from_success();
        } else {
            let statuses = execute_command::wait_for_processes(&pids)?;
            if let Some(&status) = statuses.last() {
                self.last_exit_status = status;
            }
        }
        Ok(())
    }

    fn execute_builtin(&mut self, command: &CommandLine) -> Result<()> {
        let stage = &command.stages[0];
        if let Some(ref path) = command.redirection.stdin {
            // Built-ins don't read input, but the file must exist.
            execute_command::open_input(path)?;
        }

        let (exit_status, result) = match command.redirection.stdout {
            Some(ref redirect) => {
                let mut file = execute_command::open_output(redirect)?;
                builtins::run(self, stage.program(), &stage.words[1..], &mut file)
            }
            None => builtins::run(self, stage.program(), &stage.words[1..], &mut io::stdout()),
        };
        self.last_exit_status = exit_status;
        result
    }
}

impl fmt::Debug for Shell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} jobs\n{:?}", self.jobs, self.editor)
    }
}

fn report_error(result: &Result<()>) {
    if let Err(ref e) = *result {
        debug!("command failed: {:?}", e);
        eprintln!("quash: {}", e.describe());
    }
}

/// Policy object to control a Shell's behavior
#[derive(Debug, Copy, Clone)]
pub struct ShellConfig {
    /// Determines if new command entries will be added to the shell's command history.
    enable_command_history: bool,

    /// Number of entries to store in the shell's command history
    command_history_capacity: usize,

    /// Determines if the SIGCHLD notifier is installed. Finished jobs are
    /// always reported before the next prompt.
    enable_job_control: bool,

    /// Determines if the welcome banner is displayed.
    display_messages: bool,
}

impl ShellConfig {
    /// Creates an interactive shell, e.g. command history, job notification
    ///
    /// # Complete List
    /// - Command History is enabled
    /// - Background jobs are reported as soon as they finish
    /// - The welcome banner is displayed
    pub fn interactive(command_history_capacity: usize) -> Self {
        Self {
            enable_command_history: true,
            command_history_capacity,
            enable_job_control: true,
            display_messages: true,
        }
    }

    /// Creates a noninteractive shell, e.g. no command history
    ///
    /// # Complete List
    /// - Command History is disabled.
    /// - Background jobs are reported only between commands.
    /// - No banner is displayed.
    pub fn noninteractive() -> Self {
        Default::default()
    }
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            enable_command_history: false,
            command_history_capacity: 0,
            enable_job_control: false,
            display_messages: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::fs;
    use std::thread;
    use std::time::Duration;

    use tempdir::TempDir;

    fn shell() -> Shell {
        let jobs: &'static JobTable = Box::leak(Box::new(JobTable::new()));
        Shell::with_job_table(ShellConfig::noninteractive(), jobs).unwrap()
    }

    #[test]
    fn test_last_exit_status() {
        let mut shell = shell();
        shell.execute_command_string("false").unwrap();
        assert_eq!(shell.last_exit_status().code(), Some(1));
        shell.execute_command_string("true").unwrap();
        assert!(shell.last_exit_status().success());
        shell.execute_command_string("true | false").unwrap();
        assert_eq!(shell.last_exit_status().code(), Some(1));
    }

    #[test]
    fn test_empty_line_keeps_status() {
        let mut shell = shell();
        shell.execute_command_string("false").unwrap();
        shell.execute_command_string("   ").unwrap();
        assert_eq!(shell.last_exit_status().code(), Some(1));
    }

    #[test]
    fn test_syntax_error_status() {
        let mut shell = shell();
        let e = shell.execute_command_string("ls >").unwrap_err();
        match *e.kind() {
            ErrorKind::Syntax(_) => {}
            ref kind => panic!("unexpected error kind: {:?}", kind),
        }
        assert_eq!(shell.last_exit_status().code(), Some(2));
    }

    #[test]
    fn test_builtin_output_redirection() {
        let dir = TempDir::new("quash").unwrap();
        let output = dir.path().join("out.txt");
        let mut shell = shell();
        shell
            .execute_command_string(&format!("echo \"hello  world\" > {}", output.display()))
            .unwrap();
        shell
            .execute_command_string(&format!("echo again >> {}", output.display()))
            .unwrap();
        assert_eq!(
            fs::read_to_string(&output).unwrap(),
            "hello world\nagain\n"
        );
    }

    #[test]
    fn test_background_job_lifecycle() {
        let mut shell = shell();
        let jobs = shell.jobs();

        shell.execute_command_string("sleep 30 &").unwrap();
        shell.execute_command_string("sleep 30 &").unwrap();
        let listed = jobs.list();
        assert_eq!(listed.len(), 2);
        assert!(listed[0].id() < listed[1].id());
        assert_eq!(listed[0].command(), "sleep 30");

        let killed = shell.kill_job(listed[0].id()).unwrap();
        assert_eq!(killed, KilledJob::Terminated(listed[0]));
        assert_eq!(jobs.list(), vec![listed[1]]);

        let e = shell.kill_job(listed[0].id()).unwrap_err();
        assert_eq!(
            *e.kind(),
            ErrorKind::NoSuchJob(format!("%{}", listed[0].id()))
        );
        assert_eq!(jobs.len(), 1);

        shell.kill_job(listed[1].id()).unwrap();
        assert!(jobs.is_empty());
    }

    #[test]
    fn test_kill_job_ignoring_sigterm_does_not_block() {
        let dir = TempDir::new("quash").unwrap();
        let ready = dir.path().join("ready");
        let script = dir.path().join("ignore_term.sh");
        fs::write(
            &script,
            format!("trap '' TERM\ntouch {}\nsleep 30\n", ready.display()),
        )
        .unwrap();

        let mut shell = shell();
        shell
            .execute_command_string(&format!("sh {} &", script.display()))
            .unwrap();
        let job = shell.jobs().list()[0];
        while !ready.exists() {
            thread::sleep(Duration::from_millis(10));
        }

        let started = Instant::now();
        let killed = shell.kill_job(job.id()).unwrap();
        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(killed, KilledJob::StillRunning(job));
        assert_eq!(shell.jobs().list(), vec![job]);

        signal::kill(job.pid(), Signal::SIGKILL).unwrap();
        let mut output = Vec::new();
        while job_control::do_job_notification(shell.jobs(), &mut output) == 0 {
            thread::sleep(Duration::from_millis(10));
        }
        assert!(shell.jobs().is_empty());
    }

    #[test]
    fn test_finished_background_job_is_reaped() {
        let mut shell = shell();
        shell.execute_command_string("true &").unwrap();
        assert_eq!(shell.jobs().len(), 1);

        let mut output = Vec::new();
        while job_control::do_job_notification(shell.jobs(), &mut output) == 0 {
            thread::sleep(Duration::from_millis(10));
        }
        assert!(shell.jobs().is_empty());
        let output = String::from_utf8(output).unwrap();
        assert!(output.starts_with("[1] "));
        assert!(output.ends_with(" done true\n"));
    }

    #[test]
    fn test_background_pipeline_is_rejected() {
        let mut shell = shell();
        assert!(shell.execute_command_string("true | true &").is_err());
        assert!(shell.jobs().is_empty());
    }

    #[test]
    fn test_commands_from_file() {
        let dir = TempDir::new("quash").unwrap();
        let output = dir.path().join("out.txt");
        let script = dir.path().join("script.qsh");
        fs::write(
            &script,
            format!(
                "printf one > {0}\nls >\nprintf two >> {0}\n",
                output.display()
            ),
        )
        .unwrap();

        let mut shell = shell();
        shell.execute_commands_from_file(&script).unwrap();
        assert_eq!(fs::read_to_string(&output).unwrap(), "onetwo");
        assert!(shell.last_exit_status().success());
    }

    #[test]
    fn test_missing_script() {
        let mut shell = shell();
        let e = shell
            .execute_commands_from_file(Path::new("/nonexistent/quash/script"))
            .unwrap_err();
        assert_eq!(
            *e.kind(),
            ErrorKind::File("/nonexistent/quash/script".to_string())
        );
    }
}
