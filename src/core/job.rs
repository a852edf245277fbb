//! Background job table.
//!
//! The table is a fixed arena of slots so that it can live in a `static` and
//! be reaped from a SIGCHLD handler. Every slot moves between three states:
//!
//! - `FREE`: holds nothing.
//! - `CLAIMED`: owned by exactly one actor, which is filling, inspecting or
//!   emptying it.
//! - `LIVE`: holds a running job.
//!
//! A slot only leaves `FREE` or `LIVE` through a compare-and-swap into
//! `CLAIMED`, so the main loop and the signal handler never edit the same slot
//! at the same time, and a job is removed at most once. No operation that may
//! run inside the handler allocates or locks.

use std::fmt;
use std::str;
use std::sync::atomic::{AtomicI32, AtomicU32, AtomicU8, AtomicUsize, Ordering};

use nix::unistd::Pid;

/// Maximum number of background jobs tracked at once.
pub const MAX_JOBS: usize = 64;

/// Maximum length in bytes of a job's command text.
pub const MAX_COMMAND_LEN: usize = 100;

const FREE: u8 = 0;
const CLAIMED: u8 = 1;
const LIVE: u8 = 2;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct JobId(pub u32);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Snapshot of a tracked background process.
#[derive(Clone, Copy)]
pub struct Job {
    id: JobId,
    pid: Pid,
    command: [u8; MAX_COMMAND_LEN],
    command_len: usize,
}

impl Job {
    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn pid(&self) -> Pid {
        self.pid
    }

    /// The command line, possibly truncated.
    pub fn command(&self) -> &str {
        // Only whole characters are ever stored.
        str::from_utf8(&self.command[..self.command_len]).unwrap_or("")
    }

    /// Message printed once the job has been reaped.
    pub fn completion(&self) -> Completion<'_> {
        Completion(self)
    }
}

impl PartialEq for Job {
    fn eq(&self, other: &Job) -> bool {
        self.id == other.id && self.pid == other.pid && self.command() == other.command()
    }
}

impl fmt::Display for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {} {} &", self.id, self.pid, self.command())
    }
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "id: {}\tpid: {}\tcommand: {}",
            self.id,
            self.pid,
            self.command()
        )
    }
}

#[derive(Debug)]
pub struct Completion<'a>(&'a Job);

impl<'a> fmt::Display for Completion<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {} done {}", self.0.id, self.0.pid, self.0.command())
    }
}

struct Slot {
    state: AtomicU8,
    id: AtomicU32,
    pid: AtomicI32,
    command_len: AtomicUsize,
    command: [AtomicU8; MAX_COMMAND_LEN],
}

impl Slot {
    #[allow(clippy::declare_interior_mutable_const)]
    const fn new() -> Slot {
        const ZERO: AtomicU8 = AtomicU8::new(0);
        Slot {
            state: AtomicU8::new(FREE),
            id: AtomicU32::new(0),
            pid: AtomicI32::new(0),
            command_len: AtomicUsize::new(0),
            command: [ZERO; MAX_COMMAND_LEN],
        }
    }

    fn claim(&self, from: u8) -> bool {
        self.state
            .compare_exchange(from, CLAIMED, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }

    /// Caller must hold the claim.
    fn release(&self, to: u8) {
        self.state.store(to, Ordering::Release);
    }

    /// Caller must hold the claim.
    fn snapshot(&self) -> Job {
        let mut command = [0; MAX_COMMAND_LEN];
        let command_len = self.command_len.load(Ordering::Relaxed);
        for (byte, stored) in command.iter_mut().zip(&self.command[..command_len]) {
            *byte = stored.load(Ordering::Relaxed);
        }
        Job {
            id: JobId(self.id.load(Ordering::Relaxed)),
            pid: Pid::from_raw(self.pid.load(Ordering::Relaxed)),
            command,
            command_len,
        }
    }

    /// Caller must hold the claim.
    fn fill<S: AsRef<str>>(&self, id: JobId, pid: Pid, argv: &[S]) {
        self.id.store(id.0, Ordering::Relaxed);
        self.pid.store(pid.as_raw(), Ordering::Relaxed);

        let mut len = 0;
        for (i, arg) in argv.iter().enumerate() {
            let separator = if i == 0 { "" } else { " " };
            for c in separator.chars().chain(arg.as_ref().chars()) {
                let mut buffer = [0; 4];
                let encoded = c.encode_utf8(&mut buffer).as_bytes();
                if len + encoded.len() > MAX_COMMAND_LEN {
                    self.command_len.store(len, Ordering::Relaxed);
                    return;
                }
                for byte in encoded {
                    self.command[len].store(*byte, Ordering::Relaxed);
                    len += 1;
                }
            }
        }
        self.command_len.store(len, Ordering::Relaxed);
    }
}

/// Capacity-bounded table of background jobs. Safe to share with a signal
/// handler; see the module documentation.
pub struct JobTable {
    slots: [Slot; MAX_JOBS],
    job_count: AtomicU32,
}

impl JobTable {
    #[allow(clippy::declare_interior_mutable_const)]
    pub const fn new() -> JobTable {
        const FREE_SLOT: Slot = Slot::new();
        JobTable {
            slots: [FREE_SLOT; MAX_JOBS],
            job_count: AtomicU32::new(0),
        }
    }

    /// Starts tracking `pid`. Returns `None`, leaving the process untracked,
    /// when every slot is taken.
    pub fn add<S: AsRef<str>>(&self, pid: Pid, argv: &[S]) -> Option<JobId> {
        let slot = self.slots.iter().find(|slot| slot.claim(FREE))?;
        let id = JobId(self.job_count.fetch_add(1, Ordering::Relaxed) + 1);
        slot.fill(id, pid, argv);
        slot.release(LIVE);
        Some(id)
    }

    /// Stops tracking `pid`. Removing a pid that is not tracked does nothing.
    pub fn remove(&self, pid: Pid) -> Option<Job> {
        for slot in &self.slots {
            if slot.pid.load(Ordering::Relaxed) != pid.as_raw() || !slot.claim(LIVE) {
                continue;
            }
            let job = slot.snapshot();
            if job.pid == pid {
                slot.release(FREE);
                return Some(job);
            }
            slot.release(LIVE);
        }
        None
    }

    /// Jobs in the order they were added.
    pub fn list(&self) -> Vec<Job> {
        let mut jobs: Vec<Job> = self
            .slots
            .iter()
            .filter_map(|slot| self.inspect(slot, |job| Some(*job)))
            .collect();
        jobs.sort_by_key(Job::id);
        jobs
    }

    pub fn find(&self, id: JobId) -> Option<Job> {
        self.slots
            .iter()
            .filter(|slot| slot.id.load(Ordering::Relaxed) == id.0)
            .filter_map(|slot| self.inspect(slot, |job| Some(*job).filter(|j| j.id == id)))
            .next()
    }

    pub fn len(&self) -> usize {
        self.slots
            .iter()
            .filter(|slot| slot.state.load(Ordering::Acquire) == LIVE)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Removes every job whose process `has_terminated` reports as gone,
    /// handing each to `notify` first. Jobs claimed by someone else are left
    /// for the next call. Returns the number of jobs removed.
    ///
    /// Neither allocates nor locks, so it may run inside a signal handler as
    /// long as the callbacks don't either.
    pub fn reap<F, N>(&self, mut has_terminated: F, mut notify: N) -> usize
    where
        F: FnMut(Pid) -> bool,
        N: FnMut(&Job),
    {
        let mut reaped = 0;
        for slot in &self.slots {
            if !slot.claim(LIVE) {
                continue;
            }
            let job = slot.snapshot();
            if has_terminated(job.pid) {
                notify(&job);
                slot.release(FREE);
                reaped += 1;
            } else {
                slot.release(LIVE);
            }
        }
        reaped
    }

    /// Runs `f` on job `id` while holding its slot. The job is removed when
    /// `f` returns `Ok(true)` and kept otherwise. Returns the job and whether
    /// it was removed, or `None` if no such job exists.
    pub fn remove_if<F, E>(&self, id: JobId, f: F) -> Option<Result<(Job, bool), E>>
    where
        F: FnOnce(&Job) -> Result<bool, E>,
    {
        for slot in &self.slots {
            if slot.id.load(Ordering::Relaxed) != id.0 || !slot.claim(LIVE) {
                continue;
            }
            let job = slot.snapshot();
            if job.id != id {
                slot.release(LIVE);
                continue;
            }
            return Some(match f(&job) {
                Ok(remove) => {
                    slot.release(if remove { FREE } else { LIVE });
                    Ok((job, remove))
                }
                Err(e) => {
                    slot.release(LIVE);
                    Err(e)
                }
            });
        }
        None
    }

    fn inspect<T, F>(&self, slot: &Slot, f: F) -> Option<T>
    where
        F: FnOnce(&Job) -> Option<T>,
    {
        if !slot.claim(LIVE) {
            return None;
        }
        let result = f(&slot.snapshot());
        slot.release(LIVE);
        result
    }
}

impl Default for JobTable {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for JobTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} jobs\tjob_count: {}",
            self.len(),
            self.job_count.load(Ordering::Relaxed)
        )?;
        for job in self.list() {
            writeln!(f, "{:?}", job)?;
        }

        Ok(())
    }
}
