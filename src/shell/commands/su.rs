use crate::shell::commands::{sh, ExecutionContext, Outcome};

/// Starts a fresh shell as another user (default `root`). No password is asked.
/// The new shell gets the caller's I/O and PTY mode but starts over in the guest
/// home with the generated hostname.
pub async fn run(mut ctx: ExecutionContext<'_>) -> Outcome {
    let target = ctx.arg(1).unwrap_or("root").to_string();
    let mut nested = ctx.derive(vec!["sh".to_string()]);
    nested.user = target;
    nested.hostname = nested.display_name.to_string();

    let outcome = sh::run(nested).await;
    match outcome.error {
        // Leaving the nested shell returns to the caller's prompt.
        Some(ref e) if e.is_end_of_input() => Outcome::status(outcome.status),
        _ => outcome,
    }
}
