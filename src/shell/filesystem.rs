//! Path handling for the notional guest filesystem. Nothing here touches the host disk.

/// Guest home directory; the working directory never leaves it.
pub const JAIL_ROOT: &str = "/home/guest";

/// Lexically normalize an absolute path: collapse separators, drop `.`, resolve `..`.
/// `..` at the root stays at the root.
pub fn normalize(path: &str) -> String {
    let mut components: Vec<&str> = Vec::new();
    for component in path.split('/') {
        match component {
            "" | "." => {}
            ".." => {
                components.pop();
            }
            c => components.push(c),
        }
    }

    if components.is_empty() {
        "/".to_string()
    } else {
        format!("/{}", components.join("/"))
    }
}

/// Resolve `target` against `cwd`. Relative targets are joined to `cwd` first.
pub fn resolve(cwd: &str, target: &str) -> String {
    if target.starts_with('/') {
        normalize(target)
    } else {
        normalize(&format!("{}/{}", cwd, target))
    }
}

/// True when `path` is the jail root or below it. The filesystem root is always outside.
pub fn is_within_jail(path: &str) -> bool {
    if path == "/" {
        return false;
    }
    match path.strip_prefix(JAIL_ROOT) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

/// Replace a leading `home` prefix with `~` for prompt display.
pub fn display_path(cwd: &str, home: &str) -> String {
    match cwd.strip_prefix(home) {
        Some("") => "~".to_string(),
        Some(rest) if rest.starts_with('/') => format!("~{}", rest),
        _ => cwd.to_string(),
    }
}
