pub mod cat;
pub mod cd;
pub mod echo;
pub mod exit;
pub mod hostname;
pub mod id;
pub mod pwd;
pub mod sh;
pub mod su;
pub mod sysinfo;
pub mod uname;
pub mod wpm;

use crate::shell::error::ExecError;
use crate::shell::input::LineReader;
use crate::shell::output::OutputSink;
use crate::ssh::transport::TransportError;
use futures::future::{BoxFuture, FutureExt};
use std::collections::HashMap;
use std::sync::{Arc, LazyLock};

/// Everything one program invocation can see and touch.
pub struct ExecutionContext<'a> {
    pub args: Vec<String>,
    pub stdin: &'a mut dyn LineReader,
    pub stdout: Arc<dyn OutputSink>,
    pub stderr: Arc<dyn OutputSink>,
    pub pty: bool,
    pub user: String,
    /// Working directory of the enclosing shell. Only that shell and the
    /// commands it runs synchronously hold this borrow.
    pub cwd: &'a mut String,
    /// Hostname shown by the enclosing shell.
    pub hostname: String,
    /// Process-wide generated name every new shell starts from.
    pub display_name: Arc<str>,
}

impl<'a> ExecutionContext<'a> {
    /// Context for a sub-command: same I/O, user and cwd cell, new argv.
    pub fn derive<'b>(&'b mut self, args: Vec<String>) -> ExecutionContext<'b> {
        ExecutionContext {
            args,
            stdin: &mut *self.stdin,
            stdout: self.stdout.clone(),
            stderr: self.stderr.clone(),
            pty: self.pty,
            user: self.user.clone(),
            cwd: &mut *self.cwd,
            hostname: self.hostname.clone(),
            display_name: self.display_name.clone(),
        }
    }

    pub fn arg(&self, index: usize) -> Option<&str> {
        self.args.get(index).map(String::as_str)
    }
}

/// Exit status plus the error the command ended with, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub status: u32,
    pub error: Option<ExecError>,
}

impl Outcome {
    pub fn status(status: u32) -> Self {
        Self {
            status,
            error: None,
        }
    }

    pub fn failed(status: u32, error: impl Into<ExecError>) -> Self {
        Self {
            status,
            error: Some(error.into()),
        }
    }

    /// `status` with whatever error the final write produced.
    pub fn after_write(status: u32, written: Result<(), TransportError>) -> Self {
        Self {
            status,
            error: written.err().map(ExecError::from),
        }
    }

    /// `status` if the output was written, 1 otherwise.
    pub fn from_output(status: u32, written: Result<(), TransportError>) -> Self {
        match written {
            Ok(()) => Self::status(status),
            Err(e) => Self::failed(1, e),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Shell,
    Exit,
    True,
    False,
    Echo,
    Cat,
    Su,
    Uname,
    Pwd,
    Id,
    Hostname,
    Cd,
    Wpm,
    Apt,
    Lscpu,
    Free,
    Lspci,
}

static REGISTRY: LazyLock<HashMap<&'static str, Command>> = LazyLock::new(|| {
    HashMap::from([
        ("sh", Command::Shell),
        ("exit", Command::Exit),
        ("true", Command::True),
        ("false", Command::False),
        ("echo", Command::Echo),
        ("cat", Command::Cat),
        ("su", Command::Su),
        ("uname", Command::Uname),
        ("pwd", Command::Pwd),
        ("id", Command::Id),
        ("hostname", Command::Hostname),
        ("cd", Command::Cd),
        ("wpm", Command::Wpm),
        ("apt", Command::Apt),
        ("apt-get", Command::Apt),
        ("lscpu", Command::Lscpu),
        ("free", Command::Free),
        ("lspci", Command::Lspci),
    ])
});

pub fn lookup(name: &str) -> Option<Command> {
    REGISTRY.get(name).copied()
}

/// Registered command names, unordered.
pub fn names() -> impl Iterator<Item = &'static str> {
    REGISTRY.keys().copied()
}

impl Command {
    pub fn execute<'a>(self, ctx: ExecutionContext<'a>) -> BoxFuture<'a, Outcome> {
        match self {
            Command::Shell => sh::run(ctx).boxed(),
            Command::Exit => exit::run(ctx).boxed(),
            Command::True => async { Outcome::status(0) }.boxed(),
            Command::False => async { Outcome::status(1) }.boxed(),
            Command::Echo => echo::run(ctx).boxed(),
            Command::Cat => cat::run(ctx).boxed(),
            Command::Su => su::run(ctx).boxed(),
            Command::Uname => uname::run(ctx).boxed(),
            Command::Pwd => pwd::run(ctx).boxed(),
            Command::Id => id::run(ctx).boxed(),
            Command::Hostname => hostname::run(ctx).boxed(),
            Command::Cd => cd::run(ctx).boxed(),
            Command::Wpm => wpm::run(ctx).boxed(),
            Command::Apt => wpm::run_apt(ctx).boxed(),
            Command::Lscpu => sysinfo::lscpu(ctx).boxed(),
            Command::Free => sysinfo::free(ctx).boxed(),
            Command::Lspci => sysinfo::lspci(ctx).boxed(),
        }
    }
}

/// `<host>: <name>: command not found`
pub fn not_found_message(hostname: &str, name: &str) -> String {
    format!("{}: {}: command not found", hostname, name)
}

/// Run `args[0]` from the registry. Unknown names exit 127.
pub async fn dispatch(ctx: ExecutionContext<'_>) -> Outcome {
    let Some(name) = ctx.args.first().cloned() else {
        return Outcome::status(0);
    };
    match lookup(&name) {
        Some(command) => command.execute(ctx).await,
        None => {
            let written = ctx
                .stderr
                .write_line(&not_found_message(&ctx.hostname, &name))
                .await;
            Outcome::after_write(127, written)
        }
    }
}
