//! The interactive driver: a line-oriented REPL over a mounted [`ext2fs::FileSystem`].
//!
//! Line parsing, prompt rendering, and help text are left to straightforward judgment rather than
//! pinned down by an invariant — only the façade calls each command makes are binding.

mod commands;

use ext2fs::FileSystem;
use std::io::{self, BufRead, Write};

/// Tracks the shell's notion of "here": the inode actually used to resolve relative paths, and a
/// plain component stack kept in lockstep for `pwd` to print. Not part of the filesystem engine —
/// every façade call takes `cwd` explicitly, so this is purely driver state (§6 "pwd: driver
/// state").
struct Cwd {
    inode: u32,
    components: Vec<String>,
}

impl Cwd {
    fn root() -> Self {
        Self {
            inode: ext2fs::fs::ROOT_INODE,
            components: Vec::new(),
        }
    }

    fn display(&self) -> String {
        if self.components.is_empty() {
            "/".to_string()
        } else {
            format!("/{}", self.components.join("/"))
        }
    }

    /// Updates the component stack to reflect having followed `path`, without touching `inode`
    /// (the caller resolves that separately and only commits both together on success).
    fn advance(&self, path: &[u8]) -> Vec<String> {
        let text = String::from_utf8_lossy(path);
        let absolute = text.starts_with('/');
        let mut stack = if absolute {
            Vec::new()
        } else {
            self.components.clone()
        };
        for part in text.split('/').filter(|p| !p.is_empty()) {
            match part {
                "." => {}
                ".." => {
                    stack.pop();
                }
                _ => stack.push(part.to_string()),
            }
        }
        stack
    }
}

fn now() -> u32 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as u32)
        .unwrap_or(0)
}

/// Runs the REPL to completion, reading commands from stdin until EOF, `exit`, or `quit`.
/// Returns the process exit code (always 0: a failed command is reported and the loop continues).
pub fn run(mut fs: FileSystem) -> i32 {
    let mut cwd = Cwd::root();
    let stdin = io::stdin();
    print!("> ");
    io::stdout().flush().ok();
    for line in stdin.lock().lines() {
        let Ok(line) = line else { break };
        let line = line.trim();
        if !line.is_empty() {
            let words: Vec<&str> = line.split_whitespace().collect();
            match words[0] {
                "exit" | "quit" => break,
                cmd => match commands::dispatch(&mut fs, &mut cwd, cmd, &words[1..], now()) {
                    Ok(()) => {}
                    Err(e) => eprintln!("{cmd}: {e}"),
                },
            }
        }
        print!("> ");
        io::stdout().flush().ok();
    }
    0
}
