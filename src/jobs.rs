use std::io::{self, Write};

/// Maximum number of concurrently tracked jobs. The slot index doubles as
/// the user-visible job id, so the table is a fixed array rather than a
/// list: freed ids are reused in place.
pub const MAXJOBS: usize = 32;

/// Display buffer for a job's command name, including the terminator in
/// the original layout; we keep at most `CMDBUFSZ - 1` bytes.
pub const CMDBUFSZ: usize = 16;

/// The lifecycle state of a tracked job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Running,
    Stopped,
    Done,
}

/// Where a job was most recently placed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    Foreground,
    Background,
}

/// A single tracked child process. `pid == 0` marks a free slot.
#[derive(Debug)]
pub struct Job {
    pub jid: usize,
    pub pid: libc::pid_t,
    pub pgid: libc::pid_t,
    pub placement: Placement,
    pub state: JobState,
    pub status: i32,
    pub termsig: i32,
    pub cmd: String,
}

impl Job {
    fn free(jid: usize) -> Self {
        Self {
            jid,
            pid: 0,
            pgid: 0,
            placement: Placement::Foreground,
            state: JobState::Done,
            status: 0,
            termsig: 0,
            cmd: String::new(),
        }
    }

    /// Print the `jobs`-style line for this slot:
    /// `[jid]+ State\tcmd\tPID: pid` plus the exit cause once done.
    pub fn display(&self) {
        let state = match self.state {
            JobState::Running => "Running",
            JobState::Stopped => "Suspended",
            JobState::Done => "Done",
        };
        let mut line = format!("[{}]+ {}\t{}\tPID: {}", self.jid, state, self.cmd, self.pid);
        if self.state == JobState::Done {
            if self.termsig != 0 {
                line.push_str(&format!("\tTerminated with signal {}", self.termsig));
            } else {
                line.push_str(&format!("\tExit {}", self.status));
            }
        }
        let _ = writeln!(io::stdout(), "{line}");
    }
}

/// The shell's job table: the single source of truth for live children.
pub struct JobTable {
    slots: [Job; MAXJOBS],
}

impl Default for JobTable {
    fn default() -> Self {
        Self::new()
    }
}

impl JobTable {
    pub fn new() -> Self {
        Self {
            slots: std::array::from_fn(Job::free),
        }
    }

    /// Reset every slot to free. Used at init and by forked subshells that
    /// must not inherit their parent's bookkeeping.
    pub fn clear(&mut self) {
        for jid in 0..MAXJOBS {
            self.slots[jid] = Job::free(jid);
        }
    }

    /// First free slot, if any. Checked before forking so a full table
    /// never produces an untracked child.
    pub fn first_free(&self) -> Option<usize> {
        self.slots.iter().position(|job| job.pid == 0)
    }

    /// Claim the first free slot for a running child. Returns the job id,
    /// or `None` when all slots are taken.
    pub fn register(
        &mut self,
        pid: libc::pid_t,
        pgid: libc::pid_t,
        placement: Placement,
        cmd: &str,
    ) -> Option<usize> {
        let jid = self.first_free()?;
        self.slots[jid] = Job {
            jid,
            pid,
            pgid,
            placement,
            state: JobState::Running,
            status: 0,
            termsig: 0,
            cmd: truncate_cmd(cmd),
        };
        Some(jid)
    }

    /// Release a slot; its id becomes available for the next `register`.
    pub fn unregister(&mut self, jid: usize) {
        self.slots[jid] = Job::free(jid);
    }

    pub fn get(&self, jid: usize) -> &Job {
        &self.slots[jid]
    }

    pub fn get_mut(&mut self, jid: usize) -> &mut Job {
        &mut self.slots[jid]
    }

    pub fn find_by_pid(&self, pid: libc::pid_t) -> Option<usize> {
        if pid == 0 {
            return None;
        }
        self.slots.iter().position(|job| job.pid == pid)
    }

    /// First occupied slot whose stored command name matches exactly.
    pub fn find_by_cmd(&self, name: &str) -> Option<usize> {
        self.slots
            .iter()
            .position(|job| job.pid != 0 && job.cmd == name)
    }

    /// Ids of every occupied slot, in slot order.
    pub fn occupied_jids(&self) -> Vec<usize> {
        self.slots
            .iter()
            .filter(|job| job.pid != 0)
            .map(|job| job.jid)
            .collect()
    }

    /// Ids of every occupied slot that has not finished yet.
    pub fn live_jids(&self) -> Vec<usize> {
        self.slots
            .iter()
            .filter(|job| job.pid != 0 && job.state != JobState::Done)
            .map(|job| job.jid)
            .collect()
    }

    /// Drop every finished job, displaying background ones first when
    /// `notify` is set. Foreground jobs leave quietly: their status was
    /// already reported through the evaluation result.
    pub fn sweep_done(&mut self, notify: bool) {
        for jid in 0..MAXJOBS {
            if self.slots[jid].pid != 0 && self.slots[jid].state == JobState::Done {
                if notify && self.slots[jid].placement == Placement::Background {
                    self.slots[jid].display();
                }
                self.unregister(jid);
            }
        }
    }
}

/// Keep at most `CMDBUFSZ - 1` bytes of the command name, never splitting
/// a UTF-8 character.
fn truncate_cmd(cmd: &str) -> String {
    let mut end = cmd.len().min(CMDBUFSZ - 1);
    while !cmd.is_char_boundary(end) {
        end -= 1;
    }
    cmd[..end].to_string()
}
