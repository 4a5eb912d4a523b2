use crate::shell::commands::{self, Command, ExecutionContext, Outcome};
use crate::shell::error::ExecError;
use crate::shell::filesystem::{display_path, JAIL_ROOT};
use crate::shell::tokenize;

/// `user@host:cwd$ ` (`#` for root)
pub fn prompt(user: &str, hostname: &str, cwd: &str) -> String {
    let home = format!("/home/{}", user);
    let symbol = if user == "root" { '#' } else { '$' };
    format!("{}@{}:{}{} ", user, hostname, display_path(cwd, &home), symbol)
}

/// The virtual shell. Each invocation starts over in the guest home with the
/// process-wide hostname; nothing is inherited from an enclosing shell.
pub async fn run(mut ctx: ExecutionContext<'_>) -> Outcome {
    let mut cwd = JAIL_ROOT.to_string();
    let hostname = ctx.display_name.to_string();
    let mut last_status = 0;

    loop {
        if ctx.pty {
            let prompt = prompt(&ctx.user, &hostname, &cwd);
            if let Err(e) = ctx.stdout.write_str(&prompt).await {
                return Outcome::failed(last_status, e);
            }
        }

        let line = match ctx.stdin.read_line().await {
            Ok(line) => line,
            Err(ExecError::Eof) => {
                if ctx.pty {
                    let _ = ctx.stdout.write_line("exit").await;
                }
                return Outcome::status(last_status);
            }
            Err(e) => return Outcome::failed(last_status, e),
        };

        let args = tokenize(&line);
        let Some(name) = args.first().cloned() else {
            continue;
        };

        let sub = ExecutionContext {
            args,
            stdin: &mut *ctx.stdin,
            stdout: ctx.stdout.clone(),
            stderr: ctx.stderr.clone(),
            pty: ctx.pty,
            user: ctx.user.clone(),
            cwd: &mut cwd,
            hostname: hostname.clone(),
            display_name: ctx.display_name.clone(),
        };

        if name == "exit" {
            return Outcome::status(Command::Exit.execute(sub).await.status);
        }
        let outcome = commands::dispatch(sub).await;

        last_status = outcome.status;
        if let Some(e) = outcome.error {
            let _ = ctx
                .stderr
                .write_line(&format!("sh: {}: {}", name, e))
                .await;
        }
    }
}
