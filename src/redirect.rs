use std::fs::{File, OpenOptions};
use std::io;
use std::os::fd::RawFd;

use crate::ast::RedirKind;

/// A saved copy of a standard descriptor. Dropping the guard puts the
/// original back, so every exit path out of a redirected or piped
/// subexpression restores the shell's own stdio.
pub struct SavedFd {
    saved: RawFd,
    target: RawFd,
}

impl SavedFd {
    pub fn save(target: RawFd) -> io::Result<Self> {
        let saved = dup_cloexec(target)?;
        Ok(Self { saved, target })
    }
}

impl Drop for SavedFd {
    fn drop(&mut self) {
        let _ = dup2(self.saved, self.target);
        unsafe {
            libc::close(self.saved);
        }
    }
}

/// Alias `dst` to the same open file description as `src`. The duplicate
/// is inheritable: close-on-exec does not follow a dup2.
pub fn dup2(src: RawFd, dst: RawFd) -> io::Result<()> {
    loop {
        if unsafe { libc::dup2(src, dst) } >= 0 {
            return Ok(());
        }
        let err = io::Error::last_os_error();
        if err.raw_os_error() != Some(libc::EINTR) {
            return Err(err);
        }
    }
}

// Saves land at fd 3 or above with close-on-exec set, out of reach of the
// children evaluated underneath them.
fn dup_cloexec(fd: RawFd) -> io::Result<RawFd> {
    let duped = unsafe { libc::fcntl(fd, libc::F_DUPFD_CLOEXEC, 3) };
    if duped < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(duped)
}

/// Open a redirection target with the flags its kind calls for. The
/// standard library opens with close-on-exec, so children only ever see
/// the descriptors dup2'd onto their stdio.
pub fn open_target(kind: RedirKind, path: &str) -> io::Result<File> {
    match kind {
        RedirKind::In => OpenOptions::new().read(true).open(path),
        RedirKind::Out | RedirKind::Err | RedirKind::ErrOut => OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path),
        RedirKind::Append => OpenOptions::new()
            .write(true)
            .create(true)
            .append(true)
            .open(path),
    }
}

/// The standard descriptors a redirection kind rewires, in the order they
/// are aliased.
pub fn target_fds(kind: RedirKind) -> &'static [RawFd] {
    match kind {
        RedirKind::In => &[libc::STDIN_FILENO],
        RedirKind::Out | RedirKind::Append => &[libc::STDOUT_FILENO],
        RedirKind::Err => &[libc::STDERR_FILENO],
        RedirKind::ErrOut => &[libc::STDERR_FILENO, libc::STDOUT_FILENO],
    }
}
