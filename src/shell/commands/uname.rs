use crate::shell::commands::{ExecutionContext, Outcome};

const KERNEL_NAME: &str = "Linux";
const KERNEL_RELEASE: &str = "5.15.0-101-generic";
const KERNEL_VERSION: &str = "#1-Linux SMP Tue Mar 26 15:04:31 UTC 2024";
const MACHINE: &str = "x86_64";
const OPERATING_SYSTEM: &str = "Linux";

/// Field selectors in the order uname prints them.
const FIELDS: [(char, &str); 8] = [
    ('s', "--kernel-name"),
    ('n', "--nodename"),
    ('r', "--kernel-release"),
    ('v', "--kernel-version"),
    ('m', "--machine"),
    ('p', "--processor"),
    ('i', "--hardware-platform"),
    ('o', "--operating-system"),
];

fn field(flag: char, hostname: &str) -> &str {
    match flag {
        's' => KERNEL_NAME,
        'n' => hostname,
        'r' => KERNEL_RELEASE,
        'v' => KERNEL_VERSION,
        'm' | 'p' | 'i' => MACHINE,
        _ => OPERATING_SYSTEM,
    }
}

/// Selected flags, or `None` when everything should be printed
/// (no flags, `-a`, or anything unrecognised).
fn selected(args: &[String]) -> Option<Vec<char>> {
    let mut flags = Vec::new();
    for arg in args {
        if arg == "--all" {
            return None;
        }
        if let Some((short, _)) = FIELDS.iter().find(|(_, long)| long == arg) {
            flags.push(*short);
            continue;
        }
        let letters = arg.strip_prefix('-')?;
        if letters.is_empty() || letters.starts_with('-') {
            return None;
        }
        for c in letters.chars() {
            if c == 'a' || !FIELDS.iter().any(|(short, _)| *short == c) {
                return None;
            }
            flags.push(c);
        }
    }
    if flags.is_empty() {
        None
    } else {
        Some(flags)
    }
}

pub fn render(args: &[String], hostname: &str) -> String {
    let flags = selected(args);
    FIELDS
        .iter()
        .map(|(short, _)| *short)
        .filter(|c| flags.as_ref().map_or(true, |f| f.contains(c)))
        .map(|c| field(c, hostname))
        .collect::<Vec<_>>()
        .join(" ")
}

pub async fn run(ctx: ExecutionContext<'_>) -> Outcome {
    let output = render(ctx.args.get(1..).unwrap_or_default(), &ctx.hostname);
    Outcome::from_output(0, ctx.stdout.write_line(&output).await)
}
