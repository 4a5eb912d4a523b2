use crate::shell::commands::{ExecutionContext, Outcome};

pub async fn run(ctx: ExecutionContext<'_>) -> Outcome {
    Outcome::from_output(0, ctx.stdout.write_line(ctx.cwd.as_str()).await)
}
