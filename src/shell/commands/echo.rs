use crate::shell::commands::{ExecutionContext, Outcome};

pub async fn run(ctx: ExecutionContext<'_>) -> Outcome {
    let text = ctx.args.get(1..).unwrap_or_default().join(" ");
    Outcome::from_output(0, ctx.stdout.write_line(&text).await)
}
