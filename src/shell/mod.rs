//! Virtual shell: fake commands, line input and program execution against a session channel.

pub mod commands;
pub mod error;
pub mod executor;
pub mod filesystem;
pub mod input;
pub mod output;
pub mod terminal;

/// Program started by a `shell` request.
pub const DEFAULT_SHELL: &str = "sh";

/// Split a command line on whitespace. No quoting or escaping.
pub fn tokenize(line: &str) -> Vec<String> {
    line.split_whitespace().map(str::to_string).collect()
}
