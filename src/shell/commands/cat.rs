use crate::shell::commands::{ExecutionContext, Outcome};

/// Copies stdin to stdout line by line. There are no files to read.
pub async fn run(mut ctx: ExecutionContext<'_>) -> Outcome {
    if ctx.args.len() > 1 {
        let msg = format!("{}: cat: file operations are not implemented", ctx.hostname);
        return Outcome::after_write(1, ctx.stderr.write_line(&msg).await);
    }

    loop {
        match ctx.stdin.read_line().await {
            Ok(line) => {
                if let Err(e) = ctx.stdout.write_line(&line).await {
                    return Outcome::failed(1, e);
                }
            }
            Err(e) if e.is_end_of_input() => return Outcome::status(0),
            Err(e) => return Outcome::failed(1, e),
        }
    }
}
