use std::fmt;
use std::io::IsTerminal;

use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::fmt::format::{FormatEvent, FormatFields, Writer};
use tracing_subscriber::fmt::FmtContext;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::EnvFilter;

use crate::config::types::LogFormat;

/// How a diagnostic line reads to an operator skimming the console.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// The client was let in.
    Allow,
    /// Something the client asked for was turned down.
    Deny,
}

impl Verdict {
    /// Classify a message by its wording. Most lines get no tag.
    pub fn classify(message: &str) -> Option<Self> {
        const DENY: &[&str] = &[
            "refus",
            "rejected",
            "unsupported",
            "max auth attempts",
            "exceeded",
            "request failed",
        ];
        const ALLOW: &[&str] = &["auth accepted", "connection accepted"];

        let lower = message.to_lowercase();
        if DENY.iter().any(|p| lower.contains(p)) {
            Some(Verdict::Deny)
        } else if ALLOW.iter().any(|p| lower.contains(p)) {
            Some(Verdict::Allow)
        } else {
            None
        }
    }

    fn tag(self, ansi: bool) -> &'static str {
        match (self, ansi) {
            (Verdict::Deny, true) => "\x1b[31m[DENY]\x1b[0m ",
            (Verdict::Deny, false) => "[DENY] ",
            (Verdict::Allow, true) => "\x1b[34m[ALLOW]\x1b[0m ",
            (Verdict::Allow, false) => "[ALLOW] ",
        }
    }
}

/// Wraps a formatter: prefixes each line with its [`Verdict`] tag and, on a
/// terminal, colours the fields operators grep for.
pub struct HoneypotFormatter<E> {
    inner: E,
    ansi: bool,
}

impl<E> HoneypotFormatter<E> {
    pub fn new(inner: E, ansi: bool) -> Self {
        Self { inner, ansi }
    }
}

impl<S, N, E> FormatEvent<S, N> for HoneypotFormatter<E>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
    E: FormatEvent<S, N>,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let mut message = MessageText::default();
        event.record(&mut message);
        if let Some(verdict) = Verdict::classify(&message.0) {
            writer.write_str(verdict.tag(self.ansi))?;
        }

        if !self.ansi {
            return self.inner.format_event(ctx, writer, event);
        }
        let mut line = String::new();
        self.inner.format_event(ctx, Writer::new(&mut line), event)?;
        writer.write_str(&colorize_fields(&line))
    }
}

/// ANSI colour for a field name, if it gets one.
fn field_color(name: &str) -> Option<&'static str> {
    match name {
        "user" | "method" => Some("36"),
        "request" | "subsystem" | "program" => Some("33"),
        "peer" | "address" | "host" => Some("35"),
        "conn_id" | "channel" => Some("2"),
        "status" => Some("32"),
        "error" => Some("31"),
        _ => None,
    }
}

const COLORED_FIELDS: &[&str] = &[
    "user", "method", "request", "subsystem", "program", "peer", "address", "host", "conn_id",
    "channel", "status", "error",
];

fn colorize_fields(line: &str) -> String {
    let mut out = line.to_string();
    for name in COLORED_FIELDS {
        let Some(color) = field_color(name) else {
            continue;
        };
        let plain = format!(" {}=", name);
        if out.contains(&plain) {
            out = out.replace(&plain, &format!(" \x1b[{}m{}=\x1b[0m", color, name));
        }
    }
    out
}

#[derive(Default)]
struct MessageText(String);

impl Visit for MessageText {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.0 = value.to_string();
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            self.0 = format!("{:?}", value);
        }
    }
}

/// Install the global subscriber. `level` is an `EnvFilter` directive; a bad one
/// falls back to `info`.
pub fn setup_logging(level: &str, format: LogFormat) {
    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => {
            let ansi = std::io::stdout().is_terminal();
            builder
                .with_ansi(ansi)
                .event_format(HoneypotFormatter::new(
                    tracing_subscriber::fmt::format::Format::default().with_ansi(ansi),
                    ansi,
                ))
                .init()
        }
    }
}
