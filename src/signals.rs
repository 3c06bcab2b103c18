use std::io;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};

/// Signals the dispatcher owns while the shell is active.
const HANDLED: [libc::c_int; 5] = [
    libc::SIGCHLD,
    libc::SIGINT,
    libc::SIGTSTP,
    libc::SIGTTIN,
    libc::SIGTTOU,
];

// The handler may only perform async-signal-safe work, so it records
// events here and the evaluator reconciles them on the main flow.
static CHILD_PENDING: AtomicBool = AtomicBool::new(false);
static INTERRUPT_PENDING: AtomicBool = AtomicBool::new(false);
static STOP_PENDING: AtomicBool = AtomicBool::new(false);
static SHELL_PGID: AtomicI32 = AtomicI32::new(0);

extern "C" fn dispatch(signo: libc::c_int) {
    match signo {
        libc::SIGCHLD => CHILD_PENDING.store(true, Ordering::Relaxed),
        libc::SIGINT => INTERRUPT_PENDING.store(true, Ordering::Relaxed),
        libc::SIGTSTP => STOP_PENDING.store(true, Ordering::Relaxed),
        libc::SIGTTIN | libc::SIGTTOU => {
            // The shell lost the terminal; take it back immediately, or the
            // restarted read/write would block again forever.
            let pgid = SHELL_PGID.load(Ordering::Relaxed);
            if pgid > 0 {
                unsafe {
                    libc::tcsetpgrp(libc::STDIN_FILENO, pgid);
                }
            }
        }
        _ => {}
    }
}

/// Record the shell's process group for the terminal-reclaim path above.
pub fn set_shell_pgid(pgid: libc::pid_t) {
    SHELL_PGID.store(pgid, Ordering::Relaxed);
}

pub fn clear_pending() {
    CHILD_PENDING.store(false, Ordering::Relaxed);
    INTERRUPT_PENDING.store(false, Ordering::Relaxed);
    STOP_PENDING.store(false, Ordering::Relaxed);
}

pub fn take_child_event() -> bool {
    CHILD_PENDING.swap(false, Ordering::Relaxed)
}

pub fn take_interrupt() -> bool {
    INTERRUPT_PENDING.swap(false, Ordering::Relaxed)
}

pub fn take_stop() -> bool {
    STOP_PENDING.swap(false, Ordering::Relaxed)
}

/// Install the shell's own handlers. `SA_RESTART` keeps the evaluator's
/// blocking calls from unwinding with EINTR on every child event.
pub fn install_shell_handlers() -> io::Result<()> {
    install(
        dispatch as extern "C" fn(libc::c_int) as libc::sighandler_t,
        libc::SA_RESTART,
    )
}

/// Put every handled signal back to the OS default. Used around the
/// foreground wait, where the signals belong to the job on the terminal
/// rather than to the shell.
pub fn install_default_handlers() -> io::Result<()> {
    install(libc::SIG_DFL, 0)
}

fn install(handler: libc::sighandler_t, flags: libc::c_int) -> io::Result<()> {
    for &sig in &HANDLED {
        unsafe {
            let mut action: libc::sigaction = std::mem::zeroed();
            libc::sigemptyset(&mut action.sa_mask);
            action.sa_sigaction = handler;
            action.sa_flags = flags;
            if libc::sigaction(sig, &action, std::ptr::null_mut()) != 0 {
                return Err(io::Error::last_os_error());
            }
        }
    }
    Ok(())
}

/// Reset dispositions in a forked child before it runs anything. Besides
/// the dispatcher's set this covers SIGQUIT and SIGPIPE: the Rust runtime
/// ignores SIGPIPE and SIG_IGN would survive exec.
pub fn reset_in_child() {
    let signals = [
        libc::SIGCHLD,
        libc::SIGINT,
        libc::SIGTSTP,
        libc::SIGTTIN,
        libc::SIGTTOU,
        libc::SIGQUIT,
        libc::SIGPIPE,
    ];
    for &sig in &signals {
        unsafe {
            libc::signal(sig, libc::SIG_DFL);
        }
    }
}
