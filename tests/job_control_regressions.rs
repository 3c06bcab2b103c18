use std::io::Write;
use std::process::{Command, Stdio};

fn run_shell(lines: &[&str]) -> std::process::Output {
    let mut child = Command::new(env!("CARGO_BIN_EXE_minish"))
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("spawn minish");

    {
        let stdin = child.stdin.as_mut().expect("stdin");
        for line in lines {
            writeln!(stdin, "{line}").expect("write line");
        }
        writeln!(stdin, "exit").expect("write exit");
    }

    child.wait_with_output().expect("wait output")
}

#[test]
fn background_job_is_listed_then_swept() {
    let output = run_shell(&["sleep 1 &", "jobs", "sleep 2", "jobs", "echo END"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(
        stdout.contains("[0]+ Running\tsleep\tPID: "),
        "stdout was: {stdout}"
    );
    assert!(stdout.contains("END"), "stdout was: {stdout}");
    // Once the sleep finished, its slot was reconciled and freed: the
    // second `jobs` has nothing left to list.
    let listings = stdout.matches("Running\tsleep").count();
    assert_eq!(listings, 1, "stdout was: {stdout}");
}

#[test]
fn two_background_jobs_take_distinct_slots() {
    let output = run_shell(&["sleep 1 &", "sleep 1 &", "jobs"]);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("[0]+ Running\tsleep"), "stdout was: {stdout}");
    assert!(stdout.contains("[1]+ Running\tsleep"), "stdout was: {stdout}");
}

#[test]
fn background_sequence_actually_runs() {
    let output = run_shell(&[
        "(sleep 0.3 && echo SEQDONE) &",
        "jobs",
        "sleep 1",
        "echo AFTER",
    ]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(stdout.contains("Sequence"), "stdout was: {stdout}");
    let seq = stdout.find("SEQDONE").expect("sequence output missing");
    let after = stdout.find("AFTER").expect("marker missing");
    assert!(seq < after, "stdout was: {stdout}");
}

#[test]
fn fg_waits_and_surfaces_the_job_status() {
    let output = run_shell(&["sh -c 'sleep 0.3; exit 7' &", "fg sh", "echo $? FG"]);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Resumed\tsh"), "stdout was: {stdout}");
    assert!(stdout.contains("7 FG"), "stdout was: {stdout}");
}

#[test]
fn stopped_job_resumes_in_foreground() {
    // The child stops itself with the terminal-stop signal; the
    // foreground wait hands control back to the shell with the job
    // suspended, and fg picks it up again.
    let output = run_shell(&[
        "sh -c 'kill -TSTP $$; echo RESUMED'",
        "jobs",
        "fg sh",
        "echo $? RES",
    ]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(stdout.contains("Suspended\tsh"), "stdout was: {stdout}");
    assert!(stdout.contains("Resumed\tsh"), "stdout was: {stdout}");
    assert!(stdout.contains("RESUMED"), "stdout was: {stdout}");
    assert!(stdout.contains("0 RES"), "stdout was: {stdout}");
}

#[test]
fn stopped_job_resumes_in_background() {
    let output = run_shell(&[
        "sh -c 'kill -TSTP $$; echo BGDONE'",
        "bg sh",
        "sleep 1",
        "echo TAIL",
    ]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(stdout.contains("Resumed\tsh"), "stdout was: {stdout}");
    let done = stdout.find("BGDONE").expect("resumed output missing");
    let tail = stdout.find("TAIL").expect("marker missing");
    assert!(done < tail, "stdout was: {stdout}");
}

#[test]
fn bg_rejects_a_job_already_running() {
    let output = run_shell(&["sleep 1 &", "bg sleep", "echo $? BGG"]);
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("already in background"),
        "stderr was: {stderr}"
    );
    assert!(stdout.contains("1 BGG"), "stdout was: {stdout}");
}

#[test]
fn fg_with_empty_table_is_an_error() {
    let output = run_shell(&["fg", "echo $? NOJOB"]);
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("no job to resume"), "stderr was: {stderr}");
    assert!(stdout.contains("1 NOJOB"), "stdout was: {stdout}");
}

#[test]
fn fg_with_unknown_name_is_an_error() {
    let output = run_shell(&["sleep 1 &", "fg nosuch", "echo $? NAME"]);
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("job not found: nosuch"),
        "stderr was: {stderr}"
    );
    assert!(stdout.contains("1 NAME"), "stdout was: {stdout}");
}
