use crate::shell::commands::{ExecutionContext, Outcome};

/// Status for `exit <arg>`: base-10 digits taken modulo 2^32, `None` if not numeric.
pub fn parse_status(arg: &str) -> Option<u32> {
    if arg.is_empty() || !arg.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let status = arg
        .bytes()
        .fold(0u32, |acc, b| acc.wrapping_mul(10).wrapping_add(u32::from(b - b'0')));
    Some(status)
}

pub async fn run(ctx: ExecutionContext<'_>) -> Outcome {
    let Some(arg) = ctx.arg(1) else {
        return Outcome::status(0);
    };
    match parse_status(arg) {
        Some(status) => Outcome::status(status),
        None => {
            let msg = format!("{}: exit: {}: numeric argument required", ctx.hostname, arg);
            Outcome::after_write(255, ctx.stderr.write_line(&msg).await)
        }
    }
}
