use rand::Rng;

/// Generate a compact correlation ID (8 hex characters) from the first 4 bytes of a UUID v4.
///
/// This provides a short, human-readable identifier suitable for log messages
/// while still offering ~4 billion unique values to avoid collisions in practice.
pub fn generate_correlation_id() -> String {
    let uuid = uuid::Uuid::new_v4();
    let bytes = uuid.as_bytes();
    format!(
        "{:02x}{:02x}{:02x}{:02x}",
        bytes[0], bytes[1], bytes[2], bytes[3]
    )
}

/// Random `vm-NNNNNN` hostname for the virtual host.
pub fn generate_display_hostname() -> String {
    format!("vm-{:06}", rand::thread_rng().gen_range(0..1_000_000))
}

/// Printable rendering of raw request bytes for debug logging.
pub fn escape_bytes(data: &[u8]) -> String {
    data.escape_ascii().to_string()
}
