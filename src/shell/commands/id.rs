use crate::shell::commands::{ExecutionContext, Outcome};

/// `uid=..(..) gid=..(..) groups=..(..)`; root is 0, everyone else 1000 with a
/// primary group named after the user.
pub fn format_id(user: &str) -> String {
    let (uid, gid, group) = if user == "root" {
        (0, 0, "root")
    } else {
        (1000, 1000, user)
    };
    format!(
        "uid={}({}) gid={}({}) groups={}({})",
        uid, user, gid, group, gid, group
    )
}

pub async fn run(ctx: ExecutionContext<'_>) -> Outcome {
    Outcome::from_output(0, ctx.stdout.write_line(&format_id(&ctx.user)).await)
}
