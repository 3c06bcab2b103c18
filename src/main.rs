mod ast;
mod builtins;
mod executor;
mod job_control;
mod jobs;
mod parser;
mod redirect;
mod signals;
mod status;

use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;

use executor::Shell;

fn main() {
    let mut shell = Shell::new();
    let mut editor = match DefaultEditor::new() {
        Ok(editor) => editor,
        Err(err) => {
            eprintln!("minish: cannot open input: {err}");
            std::process::exit(1);
        }
    };

    loop {
        let prompt = format!("minish({}): ", shell.last_status);
        match editor.readline(&prompt) {
            Ok(line) => {
                if !line.trim().is_empty() {
                    let _ = editor.add_history_entry(line.as_str());
                }
                // Blank lines still evaluate (to Empty) so finished
                // background jobs get reported at the next prompt.
                match parser::parse_line(&line) {
                    Ok(expr) => {
                        shell.eval(&expr);
                    }
                    Err(msg) => {
                        eprintln!("minish: {msg}");
                        shell.last_status = 2;
                    }
                }
            }
            Err(ReadlineError::Interrupted) => continue,
            Err(ReadlineError::Eof) => break,
            Err(err) => {
                eprintln!("minish: {err}");
                break;
            }
        }
    }

    std::process::exit(0);
}
