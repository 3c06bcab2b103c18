use std::io::{self, Write};

use crate::executor::Shell;

// Dispatch hashes of the recognized built-ins.
const CD: i32 = 0x15d9;
const BG: i32 = 0x1665;
const FG: i32 = 0x1681;
const HASH: i32 = 0x47ee6;
const HELP: i32 = 0x4c151;
const ECHO: i32 = 0x4b21d;
const EXIT: i32 = 0x4e65e;
const JOBS: i32 = 0x4d206;
const STATUS_TOKEN: i32 = 0xd0b; // "$?"

/// Dispatch hash over a command name: each byte weighted by a growing
/// power of seven, reduced mod `i32::MAX`. Collisions are possible in
/// principle; none exist among the recognized names.
pub fn hash_cmd(name: &str) -> i32 {
    let mut hash: i64 = 0;
    let mut weight: i64 = 7;
    for &byte in name.as_bytes() {
        hash = (hash + (byte as i64).wrapping_mul(weight)).rem_euclid(i32::MAX as i64);
        weight = weight.wrapping_mul(7);
    }
    hash as i32
}

/// Run `argv` as a built-in if its name is recognized. Returns the exit
/// status, or `None` when the command must be launched externally.
pub fn execute(shell: &mut Shell, argv: &[String]) -> Option<i32> {
    match hash_cmd(&argv[0]) {
        EXIT => {
            // Same path as end-of-input: the shell is done.
            std::process::exit(0);
        }
        ECHO => Some(echo(shell, &argv[1..])),
        CD => Some(cd(argv.get(1))),
        HELP => {
            display_help();
            Some(0)
        }
        HASH => Some(hash(argv.get(1))),
        JOBS => {
            for jid in shell.jobs.occupied_jids() {
                shell.jobs.get(jid).display();
            }
            Some(0)
        }
        FG => Some(shell.resume_job(argv.get(1).map(String::as_str), false)),
        BG => Some(shell.resume_job(argv.get(1).map(String::as_str), true)),
        _ => None,
    }
}

/// Print the arguments space-separated with a trailing newline. A leading
/// `$?` token is replaced by the last top-level status.
fn echo(shell: &Shell, args: &[String]) -> i32 {
    if args.is_empty() {
        return 0;
    }

    let mut parts: Vec<String> = Vec::with_capacity(args.len());
    let mut rest = args;
    if hash_cmd(&args[0]) == STATUS_TOKEN {
        parts.push(shell.last_status.to_string());
        rest = &args[1..];
    }
    parts.extend(rest.iter().cloned());

    let _ = writeln!(io::stdout(), "{}", parts.join(" "));
    0
}

fn cd(target: Option<&String>) -> i32 {
    // With no argument this stays a no-op.
    let Some(target) = target else {
        return 0;
    };
    if let Err(err) = std::env::set_current_dir(target) {
        eprintln!("cd: {target}: {err}");
        return 1;
    }
    0
}

fn hash(text: Option<&String>) -> i32 {
    match text {
        Some(text) => {
            let _ = writeln!(io::stdout(), "{:x}", hash_cmd(text));
            0
        }
        None => {
            eprintln!("hash: no argument to hash");
            1
        }
    }
}

fn display_help() {
    let entries = [
        "cd [dir]",
        "echo [$? | arg ...]",
        "exit",
        "hash [text]",
        "jobs",
        "fg [name]",
        "bg [name]",
        "help",
    ];

    let mut out = io::stdout();
    let _ = writeln!(out, "minish - a small job-control shell\n");
    let _ = writeln!(out, "These commands are defined internally:\n");
    for entry in entries {
        let _ = writeln!(out, "\t{entry}");
    }
    let _ = writeln!(out, "\nKeyboard shortcuts:");
    let _ = writeln!(out, "\t- Ctrl-Z: suspend the current foreground job");
    let _ = writeln!(out, "\t- Ctrl-C: interrupt the current foreground job\n");
}
