//! Mount directives: `#> mount['alias'] from 'sourceId'`.
//!
//! Directives are line-anchored and must occupy the whole line (trailing
//! whitespace aside). Lines that merely start with `#>` but do not match are
//! left in the text untouched.

use serde::Serialize;

/// A parsed mount directive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MountDirective {
    pub alias: String,
    pub source: String,
}

/// Parse a single line as a mount directive.
pub fn parse_mount_line(line: &str) -> Option<MountDirective> {
    let rest = line.strip_prefix("#>")?.trim_start();
    let rest = rest.strip_prefix("mount['")?;
    let (alias, rest) = rest.split_once('\'')?;
    let rest = rest.strip_prefix(']')?.trim_start();
    let rest = rest.strip_prefix("from")?.trim_start();
    let rest = rest.strip_prefix('\'')?;
    let (source, rest) = rest.split_once('\'')?;
    if !rest.trim().is_empty() {
        return None;
    }
    Some(MountDirective {
        alias: alias.to_string(),
        source: source.to_string(),
    })
}

/// Extract every mount directive, returning them in order together with the
/// text that remains once their lines are removed (trimmed). Text without
/// directives is returned unchanged.
pub fn extract_mounts(text: &str) -> (Vec<MountDirective>, String) {
    let mut mounts = Vec::new();
    let mut kept: Vec<&str> = Vec::new();
    for line in text.split('\n') {
        match parse_mount_line(line) {
            Some(m) => mounts.push(m),
            None => kept.push(line),
        }
    }
    if mounts.is_empty() {
        return (mounts, text.to_string());
    }
    (mounts, kept.join("\n").trim().to_string())
}
