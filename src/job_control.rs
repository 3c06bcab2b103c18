use std::ffi::CString;
use std::io;

/// Fork the current process. Returns 0 in the child, the child's pid in
/// the parent.
pub fn fork() -> io::Result<libc::pid_t> {
    let pid = unsafe { libc::fork() };
    if pid < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(pid)
    }
}

pub fn set_process_group(pid: libc::pid_t, pgid: libc::pid_t) -> io::Result<()> {
    loop {
        let rc = unsafe { libc::setpgid(pid, pgid) };
        if rc == 0 {
            return Ok(());
        }

        let err = io::Error::last_os_error();
        match err.raw_os_error() {
            Some(code) if code == libc::EINTR => continue,
            // Already exec'd or gone; the other side of the race won and the
            // group is set either way.
            Some(code) if code == libc::EACCES || code == libc::ESRCH => return Ok(()),
            _ => return Err(err),
        }
    }
}

/// Signal every process in a group at once.
pub fn send_signal_to_group(pgid: libc::pid_t, signal: libc::c_int) -> io::Result<()> {
    if pgid <= 0 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "invalid process group id",
        ));
    }

    loop {
        let rc = unsafe { libc::kill(-pgid, signal) };
        if rc == 0 {
            return Ok(());
        }

        let err = io::Error::last_os_error();
        if err.raw_os_error() == Some(libc::EINTR) {
            continue;
        }
        return Err(err);
    }
}

/// Signal-zero probe: does the kernel still know this pid?
pub fn process_alive(pid: libc::pid_t) -> bool {
    if unsafe { libc::kill(pid, 0) } == 0 {
        return true;
    }
    io::Error::last_os_error().raw_os_error() != Some(libc::ESRCH)
}

/// Block until the given child exits, is killed, or is stopped at the
/// terminal. Returns the raw wait status for decoding.
pub fn wait_foreground(pid: libc::pid_t) -> io::Result<libc::c_int> {
    let mut raw: libc::c_int = 0;
    loop {
        let rc = unsafe { libc::waitpid(pid, &mut raw, libc::WUNTRACED) };
        if rc >= 0 {
            return Ok(raw);
        }

        let err = io::Error::last_os_error();
        if err.raw_os_error() == Some(libc::EINTR) {
            continue;
        }
        return Err(err);
    }
}

/// Non-blocking probe of one child, reporting stops and continues as well
/// as termination. `Ok(None)` means nothing changed.
pub fn poll_job(pid: libc::pid_t) -> io::Result<Option<libc::c_int>> {
    let mut raw: libc::c_int = 0;
    loop {
        let rc = unsafe {
            libc::waitpid(
                pid,
                &mut raw,
                libc::WUNTRACED | libc::WCONTINUED | libc::WNOHANG,
            )
        };
        if rc > 0 {
            return Ok(Some(raw));
        }
        if rc == 0 {
            return Ok(None);
        }

        let err = io::Error::last_os_error();
        if err.raw_os_error() == Some(libc::EINTR) {
            continue;
        }
        return Err(err);
    }
}

// ── Exec plumbing ──

/// An argv frozen into exec form before forking, so the child only has to
/// make the `execvp` call itself.
pub struct ExecImage {
    args: Vec<CString>,
    argv: Vec<*const libc::c_char>,
}

impl ExecImage {
    pub fn new(args: &[String]) -> io::Result<Self> {
        let mut owned = Vec::with_capacity(args.len());
        for arg in args {
            owned.push(CString::new(arg.as_str()).map_err(|_| {
                io::Error::new(io::ErrorKind::InvalidInput, "argument contains a NUL byte")
            })?);
        }
        let mut argv: Vec<*const libc::c_char> = owned.iter().map(|arg| arg.as_ptr()).collect();
        argv.push(std::ptr::null());
        Ok(Self { args: owned, argv })
    }

    /// Replace the current process image. Only returns on failure.
    pub fn exec(&self) -> io::Error {
        unsafe {
            libc::execvp(self.args[0].as_ptr(), self.argv.as_ptr());
        }
        io::Error::last_os_error()
    }
}

// ── Terminal arbiter ──

/// Attempt to make the shell's group the terminal's foreground group.
/// Failure (or a non-terminal stdin) means the shell runs non-interactive.
pub fn acquire_terminal(shell_pgid: libc::pid_t) -> bool {
    if unsafe { libc::isatty(libc::STDIN_FILENO) } != 1 {
        return false;
    }
    set_terminal_foreground(libc::STDIN_FILENO, shell_pgid).is_ok()
}

/// Hand the controlling terminal to a job's process group. No-op when
/// non-interactive.
pub fn give_terminal_to(interactive: bool, pgid: libc::pid_t) -> io::Result<()> {
    if !interactive {
        return Ok(());
    }
    set_terminal_foreground(libc::STDIN_FILENO, pgid)
}

/// Give the controlling terminal back to the shell. No-op when
/// non-interactive.
pub fn reclaim_terminal(interactive: bool, shell_pgid: libc::pid_t) -> io::Result<()> {
    give_terminal_to(interactive, shell_pgid)
}

struct SignalIgnoreGuard {
    signal: libc::c_int,
    previous: libc::sighandler_t,
}

impl SignalIgnoreGuard {
    fn ignore(signal: libc::c_int) -> io::Result<Self> {
        let previous = unsafe { libc::signal(signal, libc::SIG_IGN) };
        if previous == libc::SIG_ERR {
            return Err(io::Error::last_os_error());
        }
        Ok(Self { signal, previous })
    }
}

impl Drop for SignalIgnoreGuard {
    fn drop(&mut self) {
        unsafe {
            libc::signal(self.signal, self.previous);
        }
    }
}

fn set_terminal_foreground(fd: libc::c_int, pgid: libc::pid_t) -> io::Result<()> {
    if pgid <= 0 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "invalid process group id",
        ));
    }

    // tcsetpgrp from a non-foreground group raises SIGTTOU.
    let _sigttou = SignalIgnoreGuard::ignore(libc::SIGTTOU)?;
    loop {
        let rc = unsafe { libc::tcsetpgrp(fd, pgid) };
        if rc == 0 {
            return Ok(());
        }

        let err = io::Error::last_os_error();
        if err.raw_os_error() == Some(libc::EINTR) {
            continue;
        }
        return Err(err);
    }
}
