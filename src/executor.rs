use std::io::{self, Write};
use std::os::fd::AsRawFd;

use crate::ast::{Expr, RedirKind, SeqOp};
use crate::builtins;
use crate::job_control;
use crate::jobs::{JobState, JobTable, MAXJOBS, Placement};
use crate::redirect::{self, SavedFd};
use crate::signals;
use crate::status::{self, INTERN_STATUS, STATUS_TABLE_FULL, WaitEvent};

/// Process-wide evaluator state, threaded mutably through evaluation.
pub struct Shell {
    pub jobs: JobTable,
    pub interactive: bool,
    pub last_status: i32,
    shell_pgid: libc::pid_t,
    fg_job: Option<usize>,
    last_job: Option<usize>,
    initialized: bool,
}

impl Default for Shell {
    fn default() -> Self {
        Self::new()
    }
}

impl Shell {
    pub fn new() -> Self {
        Self {
            jobs: JobTable::new(),
            interactive: false,
            last_status: 0,
            shell_pgid: 0,
            fg_job: None,
            last_job: None,
            initialized: false,
        }
    }

    /// Top-level entry: evaluate one parsed expression and return the
    /// status the read loop shows at the next prompt.
    pub fn eval(&mut self, expr: &Expr) -> i32 {
        self.ensure_initialized();

        let notify = self.interactive;
        let raw = self.handle_expression(expr, Placement::Foreground, notify);

        self.drain_signals();
        self.reap();

        let mut wstatus = status::canonical(raw);
        // When the evaluation itself only produced the internal sentinel,
        // a foreground failure still outranks its canonicalization.
        if raw < 0 {
            if let Some(jid) = self.fg_job {
                let job = self.jobs.get(jid);
                if job.pid != 0 && job.status != 0 {
                    wstatus = job.status;
                }
            }
        }
        self.last_status = wstatus;

        if self.interactive {
            self.notify_foreground_faults();
        }
        self.jobs.sweep_done(self.interactive);
        self.fg_job = None;

        wstatus
    }

    fn ensure_initialized(&mut self) {
        if self.initialized {
            return;
        }
        for attempt in 0..2 {
            match self.init_shell() {
                Ok(()) => {
                    self.initialized = true;
                    return;
                }
                Err(err) if attempt == 0 => {
                    eprintln!("minish: shell initialization failed, retrying: {err}");
                }
                Err(err) => {
                    eprintln!("minish: unable to initialize the shell, quitting: {err}");
                    std::process::exit(1);
                }
            }
        }
    }

    fn init_shell(&mut self) -> io::Result<()> {
        let pid = unsafe { libc::getpid() };
        if unsafe { libc::getpgrp() } != pid {
            job_control::set_process_group(pid, pid)?;
        }
        self.shell_pgid = pid;
        signals::set_shell_pgid(pid);
        signals::clear_pending();
        signals::install_shell_handlers()?;
        self.jobs.clear();
        // Failing to own the terminal just means batch mode.
        self.interactive = job_control::acquire_terminal(pid);
        Ok(())
    }

    // ── Expression dispatch ──

    fn handle_expression(&mut self, expr: &Expr, opts: Placement, notify: bool) -> i32 {
        match expr {
            Expr::Empty => INTERN_STATUS,
            Expr::Redirect { kind, file, body } => self.lay_redirection(*kind, file, body, opts),
            Expr::Pipe { left, right } => self.lay_pipeline(left, right, opts),
            Expr::Sequence { op, left, right } => self.start_sequence(*op, left, right, opts, notify),
            Expr::Background(body) => self.handle_expression(body, Placement::Background, notify),
            Expr::Simple { argv } => self.start_cmd(argv, opts, notify),
        }
    }

    // ── Redirection layer ──

    fn lay_redirection(&mut self, kind: RedirKind, file: &str, body: &Expr, opts: Placement) -> i32 {
        match self.redirected_eval(kind, file, body, opts) {
            Ok(wstatus) => wstatus,
            Err(err) => {
                eprintln!("{file}: {err}");
                1
            }
        }
    }

    fn redirected_eval(
        &mut self,
        kind: RedirKind,
        file: &str,
        body: &Expr,
        opts: Placement,
    ) -> io::Result<i32> {
        // Guards restore in reverse declaration order on every path out.
        let _save_in = SavedFd::save(libc::STDIN_FILENO)?;
        let _save_out = SavedFd::save(libc::STDOUT_FILENO)?;
        let _save_err = SavedFd::save(libc::STDERR_FILENO)?;

        let target = redirect::open_target(kind, file)?;
        for &fd in redirect::target_fds(kind) {
            redirect::dup2(target.as_raw_fd(), fd)?;
        }
        drop(target);

        Ok(self.handle_expression(body, opts, false))
    }

    // ── Pipeline layer ──

    fn lay_pipeline(&mut self, left: &Expr, right: &Expr, opts: Placement) -> i32 {
        match self.piped_eval(left, right, opts) {
            Ok(wstatus) => wstatus,
            Err(err) => {
                eprintln!("minish: cannot set up pipe: {err}");
                1
            }
        }
    }

    fn piped_eval(&mut self, left: &Expr, right: &Expr, opts: Placement) -> io::Result<i32> {
        // Both pipe ends are close-on-exec; children only keep the end
        // dup2'd onto their stdio, so a finished pipeline leaves nothing
        // open in the shell.
        let (reader, writer) = os_pipe::pipe()?;

        // Consumer first, reading from the pipe. It must not wait on
        // itself, so it always goes to the background.
        {
            let _save_in = SavedFd::save(libc::STDIN_FILENO)?;
            redirect::dup2(reader.as_raw_fd(), libc::STDIN_FILENO)?;
            drop(reader);
            self.handle_expression(right, Placement::Background, false);
        }

        // Producer second, writing into the pipe, with the caller's own
        // placement. By now a reader is attached.
        let wstatus;
        {
            let _save_out = SavedFd::save(libc::STDOUT_FILENO)?;
            redirect::dup2(writer.as_raw_fd(), libc::STDOUT_FILENO)?;
            drop(writer);
            wstatus = self.handle_expression(left, opts, false);
        }

        Ok(wstatus)
    }

    // ── Sequence layer ──

    fn start_sequence(
        &mut self,
        op: SeqOp,
        left: &Expr,
        right: &Expr,
        opts: Placement,
        notify: bool,
    ) -> i32 {
        if opts == Placement::Background {
            return self.start_background_sequence(op, left, right, notify);
        }

        let mut wstatus = status::canonical(self.handle_expression(left, opts, false));
        match op {
            SeqOp::And => {
                if wstatus == 0 {
                    wstatus = self.handle_expression(right, opts, false);
                }
            }
            SeqOp::Or => {
                if wstatus != 0 {
                    wstatus = self.handle_expression(right, opts, false);
                }
            }
            SeqOp::Always => {
                wstatus = self.handle_expression(right, opts, false);
            }
        }
        status::canonical(wstatus)
    }

    /// Run a whole sequence as one background job: fork a subshell that
    /// evaluates it in foreground mode and exits with its status.
    fn start_background_sequence(
        &mut self,
        op: SeqOp,
        left: &Expr,
        right: &Expr,
        notify: bool,
    ) -> i32 {
        if self.jobs.first_free().is_none() {
            Self::report_table_full();
            return STATUS_TABLE_FULL;
        }

        let pid = match job_control::fork() {
            Ok(pid) => pid,
            Err(err) => {
                eprintln!("minish: cannot fork: {err}");
                return 1;
            }
        };

        if pid == 0 {
            signals::reset_in_child();
            let _ = job_control::set_process_group(0, 0);
            // The subshell neither owns the terminal nor the parent's
            // jobs; it starts its own bookkeeping from scratch.
            self.interactive = false;
            self.jobs.clear();
            self.fg_job = None;
            self.last_job = None;
            let wstatus =
                status::canonical(self.start_sequence(op, left, right, Placement::Foreground, notify));
            std::process::exit(wstatus);
        }

        match self.jobs.register(pid, pid, Placement::Background, "Sequence") {
            Some(jid) => {
                self.launch_job(jid, notify);
                INTERN_STATUS
            }
            None => {
                Self::report_table_full();
                STATUS_TABLE_FULL
            }
        }
    }

    // ── Command launcher ──

    fn start_cmd(&mut self, argv: &[String], opts: Placement, notify: bool) -> i32 {
        if argv.is_empty() {
            return INTERN_STATUS;
        }
        if let Some(wstatus) = builtins::execute(self, argv) {
            return wstatus;
        }

        // Claim table space before forking so a full table never leaves
        // an untracked child behind.
        if self.jobs.first_free().is_none() {
            Self::report_table_full();
            return STATUS_TABLE_FULL;
        }

        let image = match job_control::ExecImage::new(argv) {
            Ok(image) => image,
            Err(err) => {
                eprintln!("minish: {}: {err}", argv[0]);
                return 1;
            }
        };

        let pid = match job_control::fork() {
            Ok(pid) => pid,
            Err(err) => {
                eprintln!("minish: cannot fork: {err}");
                return 1;
            }
        };

        if pid == 0 {
            signals::reset_in_child();
            let _ = job_control::set_process_group(0, 0);
            let err = image.exec();
            if err.kind() == io::ErrorKind::NotFound {
                eprintln!("{}: command not found", argv[0]);
                std::process::exit(127);
            }
            eprintln!("{}: {err}", argv[0]);
            std::process::exit(126);
        }

        match self.jobs.register(pid, pid, opts, &argv[0]) {
            Some(jid) => {
                self.launch_job(jid, notify);
                if opts == Placement::Foreground {
                    self.jobs.get(jid).status
                } else {
                    INTERN_STATUS
                }
            }
            None => {
                Self::report_table_full();
                STATUS_TABLE_FULL
            }
        }
    }

    // ── Job dispatch ──

    fn launch_job(&mut self, jid: usize, notify: bool) {
        // Force Stopped so foreground and background dispatch both send
        // the continue uniformly, whether or not the child got to run.
        self.jobs.get_mut(jid).state = JobState::Stopped;

        let (pid, pgid, placement) = {
            let job = self.jobs.get(jid);
            (job.pid, job.pgid, job.placement)
        };
        // Parent side of the setpgid race with the child's own call.
        let _ = job_control::set_process_group(pid, pgid);

        match placement {
            Placement::Foreground => self.send_to_foreground(jid),
            Placement::Background => {
                self.send_to_background(jid);
                if notify {
                    let job = self.jobs.get(jid);
                    let _ = writeln!(io::stdout(), "[{}] {}", job.jid, job.pid);
                }
            }
        }
    }

    /// Give a job the terminal and block until it exits or stops.
    fn send_to_foreground(&mut self, jid: usize) {
        // While the job owns the terminal the shell must not intercept
        // signals that belong to it.
        let _ = signals::install_default_handlers();

        let (pid, pgid, state) = {
            let job = self.jobs.get(jid);
            (job.pid, job.pgid, job.state)
        };
        if let Err(err) = job_control::give_terminal_to(self.interactive, pgid) {
            eprintln!("minish: cannot hand the terminal to job {jid}: {err}");
        }

        self.jobs.get_mut(jid).placement = Placement::Foreground;
        self.fg_job = Some(jid);

        if state == JobState::Stopped {
            if let Err(err) = job_control::send_signal_to_group(pgid, libc::SIGCONT) {
                eprintln!("minish: cannot continue job {jid}: {err}");
            }
        }

        match job_control::wait_foreground(pid) {
            Ok(raw) => self.set_status_from_wait(jid, raw),
            Err(err) => eprintln!("minish: wait on foreground job {jid}: {err}"),
        }

        let _ = signals::install_shell_handlers();
        if let Err(err) = job_control::reclaim_terminal(self.interactive, self.shell_pgid) {
            eprintln!("minish: cannot reclaim the terminal: {err}");
        }
    }

    /// Resume a job in the background and remember it as the default
    /// target for `fg`/`bg`.
    fn send_to_background(&mut self, jid: usize) {
        let (pgid, state) = {
            let job = self.jobs.get(jid);
            (job.pgid, job.state)
        };
        if state == JobState::Stopped {
            if let Err(err) = job_control::send_signal_to_group(pgid, libc::SIGCONT) {
                eprintln!("minish: cannot continue job {jid}: {err}");
            }
        }

        let job = self.jobs.get_mut(jid);
        job.state = JobState::Running;
        job.placement = Placement::Background;
        self.last_job = Some(jid);
    }

    /// Fold a raw wait status into a job slot. A stop always demotes the
    /// job to background: a stopped job is never foreground.
    fn set_status_from_wait(&mut self, jid: usize, raw: libc::c_int) {
        match status::decode_wait(raw) {
            Some(WaitEvent::Exited(code)) => {
                let job = self.jobs.get_mut(jid);
                job.status = code;
                job.state = JobState::Done;
            }
            Some(WaitEvent::Signaled(sig)) => {
                let job = self.jobs.get_mut(jid);
                job.termsig = sig;
                job.state = JobState::Done;
            }
            Some(WaitEvent::Stopped) => {
                let job = self.jobs.get_mut(jid);
                job.status = 0;
                job.state = JobState::Stopped;
                job.placement = Placement::Background;
                self.last_job = Some(jid);
            }
            Some(WaitEvent::Continued) | None => {}
        }
    }

    // ── Signal dispatch and reaping ──

    /// Apply the dispatcher policy for any signals recorded since the
    /// last drain.
    fn drain_signals(&mut self) {
        // A job that already finished is past interrupting or suspending.
        let live_fg = self
            .fg_job
            .filter(|&jid| self.jobs.get(jid).pid != 0 && self.jobs.get(jid).state != JobState::Done);
        if signals::take_interrupt() {
            if let Some(jid) = live_fg {
                let pgid = self.jobs.get(jid).pgid;
                if let Err(err) = job_control::send_signal_to_group(pgid, libc::SIGINT) {
                    eprintln!("minish: cannot interrupt job {jid}: {err}");
                }
            }
        }
        if signals::take_stop() {
            if let Some(jid) = live_fg {
                self.suspend_job(jid);
            }
        }
        if signals::take_child_event() {
            self.reap();
        }
    }

    fn suspend_job(&mut self, jid: usize) {
        let pgid = self.jobs.get(jid).pgid;
        if let Err(err) = job_control::send_signal_to_group(pgid, libc::SIGTSTP) {
            eprintln!("minish: cannot suspend job {jid}: {err}");
        }
        let job = self.jobs.get_mut(jid);
        job.state = JobState::Stopped;
        job.placement = Placement::Background;
        self.last_job = Some(jid);
    }

    /// Reconcile every occupied slot with what the kernel reports,
    /// without blocking. Slots whose process vanished entirely are
    /// released on the spot.
    fn reap(&mut self) {
        for jid in 0..MAXJOBS {
            let (pid, state) = {
                let job = self.jobs.get(jid);
                (job.pid, job.state)
            };
            if pid <= 0 || state == JobState::Done {
                continue;
            }
            match job_control::poll_job(pid) {
                Ok(Some(raw)) => self.set_status_from_wait(jid, raw),
                _ => {
                    if !job_control::process_alive(pid) {
                        self.jobs.unregister(jid);
                    }
                }
            }
        }
    }

    // ── fg / bg ──

    /// Pick a job by name, or fall back to the most recent live one, and
    /// move it to the foreground or background.
    pub(crate) fn resume_job(&mut self, name: Option<&str>, to_background: bool) -> i32 {
        let which = if to_background { "bg" } else { "fg" };

        let jid = match name {
            Some(name) => match self.jobs.find_by_cmd(name) {
                Some(jid) => jid,
                None => {
                    eprintln!("{which}: job not found: {name}");
                    return 1;
                }
            },
            None => {
                let live = self.jobs.live_jids();
                let last_is_live = self
                    .last_job
                    .is_some_and(|jid| live.contains(&jid));
                if !last_is_live {
                    self.last_job = live.first().copied();
                }
                let Some(mut jid) = self.last_job else {
                    eprintln!("{which}: no job to resume");
                    return 1;
                };
                // Highest pid wins: the most recently forked live job.
                for &candidate in &live {
                    if self.jobs.get(candidate).pid >= self.jobs.get(jid).pid {
                        jid = candidate;
                    }
                }
                jid
            }
        };

        let (state, cmd) = {
            let job = self.jobs.get(jid);
            (job.state, job.cmd.clone())
        };
        if to_background && state == JobState::Running {
            eprintln!("{cmd}: job already in background");
            return 1;
        }

        let _ = writeln!(io::stdout(), "[{jid}]+ Resumed\t{cmd}");
        if to_background {
            self.send_to_background(jid);
            0
        } else {
            self.send_to_foreground(jid);
            // Same contract as a fresh foreground launch: the job's own
            // exit status is the result.
            self.jobs.get(jid).status
        }
    }

    // ── Top-level reporting ──

    fn notify_foreground_faults(&self) {
        let Some(jid) = self.fg_job else {
            return;
        };
        let job = self.jobs.get(jid);
        if job.pid == 0 {
            return;
        }
        match job.termsig {
            libc::SIGSEGV => eprintln!("{}: Segmentation fault.", job.cmd),
            libc::SIGKILL | libc::SIGTERM => eprintln!("{}: Terminated.", job.cmd),
            _ => {}
        }
    }

    fn report_table_full() {
        eprintln!("minish: job table full, terminate some jobs first (max: {MAXJOBS})");
    }
}
