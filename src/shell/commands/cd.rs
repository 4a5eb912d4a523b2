use crate::shell::commands::{ExecutionContext, Outcome};
use crate::shell::filesystem::{is_within_jail, resolve, JAIL_ROOT};

/// Changes the shell's working directory. Targets outside the guest home are refused;
/// existence is never checked.
pub async fn run(mut ctx: ExecutionContext<'_>) -> Outcome {
    let target = ctx.arg(1).unwrap_or(JAIL_ROOT).to_string();
    let resolved = resolve(ctx.cwd.as_str(), &target);

    if !is_within_jail(&resolved) {
        let msg = format!("{}: cd: {}: Permission denied", ctx.hostname, target);
        return Outcome::after_write(1, ctx.stderr.write_line(&msg).await);
    }

    *ctx.cwd = resolved;
    Outcome::status(0)
}
