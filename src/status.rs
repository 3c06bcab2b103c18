/// Marker for "no user-visible status yet": a background job was started
/// and its exit status will only be known at a later sweep. Kept outside
/// the 0..=255 range a process can actually exit with.
pub const INTERN_STATUS: i32 = -128;

/// Internal status returned when the job table has no free slot.
pub const STATUS_TABLE_FULL: i32 = INTERN_STATUS + 1;

/// Map an internal status onto the 0..=255 range shown to the user.
/// Asynchronous results surface as success; carried error offsets (for
/// example [`STATUS_TABLE_FULL`]) keep their distance from the sentinel.
pub fn canonical(status: i32) -> i32 {
    if status < 0 {
        status - INTERN_STATUS
    } else {
        status
    }
}

/// A single observable change in a child's lifecycle, decoded from a raw
/// `waitpid` status word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitEvent {
    /// The child called `exit` with the given code.
    Exited(i32),
    /// The child was killed by the given signal.
    Signaled(i32),
    /// The child was stopped (SIGTSTP, SIGTTIN, ...).
    Stopped,
    /// A stopped child was resumed by SIGCONT.
    Continued,
}

pub fn decode_wait(raw: libc::c_int) -> Option<WaitEvent> {
    if libc::WIFEXITED(raw) {
        return Some(WaitEvent::Exited(libc::WEXITSTATUS(raw)));
    }
    if libc::WIFSIGNALED(raw) {
        return Some(WaitEvent::Signaled(libc::WTERMSIG(raw)));
    }
    if libc::WIFSTOPPED(raw) {
        return Some(WaitEvent::Stopped);
    }
    if libc::WIFCONTINUED(raw) {
        return Some(WaitEvent::Continued);
    }
    None
}
