#![cfg(unix)]

use std::io::Write;
use std::process::{Child, Command, Stdio};
use std::time::Duration;

fn spawn_shell() -> Child {
    Command::new(env!("CARGO_BIN_EXE_minish"))
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("spawn minish")
}

fn run_shell(lines: &[&str]) -> std::process::Output {
    let mut child = spawn_shell();
    {
        let stdin = child.stdin.as_mut().expect("stdin");
        for line in lines {
            writeln!(stdin, "{line}").expect("write line");
        }
        writeln!(stdin, "exit").expect("write exit");
    }
    child.wait_with_output().expect("wait output")
}

/// Drive the shell with a signal delivered mid-session: run `before`,
/// give the shell time to settle at the prompt, hit it with `signal`,
/// then run `after`.
fn run_shell_with_signal(before: &str, signal: libc::c_int, after: &str) -> std::process::Output {
    let mut child = spawn_shell();
    let mut stdin = child.stdin.take().expect("stdin");

    writeln!(stdin, "{before}").expect("write line");
    std::thread::sleep(Duration::from_millis(300));
    unsafe {
        libc::kill(child.id() as libc::pid_t, signal);
    }
    std::thread::sleep(Duration::from_millis(100));
    writeln!(stdin, "{after}").expect("write line");
    writeln!(stdin, "exit").expect("write exit");
    drop(stdin);

    child.wait_with_output().expect("wait output")
}

#[test]
fn pipeline_sigpipe_does_not_abort_shell() {
    // yes writes until head closes the read end; the producer dies of
    // SIGPIPE and the shell carries on.
    let output = run_shell(&["yes | head -1", "echo ALIVE", "echo $? ST"]);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("ALIVE"), "stdout was: {stdout}");
    assert!(stdout.contains("0 ST"), "stdout was: {stdout}");
    assert!(output.status.success(), "shell did not exit cleanly");
}

#[test]
fn shell_survives_sigtstp_at_the_prompt() {
    // With no foreground job the dispatcher drops the stop event instead
    // of letting the default action suspend the shell.
    let output = run_shell_with_signal("echo START", libc::SIGTSTP, "echo ALIVE");
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("START"), "stdout was: {stdout}");
    assert!(stdout.contains("ALIVE"), "stdout was: {stdout}");
}

#[test]
fn shell_survives_sigint_at_the_prompt() {
    let output = run_shell_with_signal("echo START", libc::SIGINT, "echo ALIVE");
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("ALIVE"), "stdout was: {stdout}");
    assert!(output.status.success(), "shell did not exit cleanly");
}

#[test]
fn foreground_child_killed_by_signal_is_not_an_error_status() {
    // The signal surfaces through the job's termsig, not the numeric
    // status.
    let output = run_shell(&["sh -c 'kill -TERM $$'", "echo $? SIG"]);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("0 SIG"), "stdout was: {stdout}");
}
