//! `authorized_keys` file contents.

use crate::error::{Error, Result};
use std::path::Path;

/// Extract key lines, dropping blank lines and `#` comments.
pub fn parse_authorized_keys(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}

/// Read the keys from a file. A missing file holds no keys.
pub fn read_authorized_keys(path: &Path) -> Result<Vec<String>> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(parse_authorized_keys(&content)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(e) => Err(Error::io(path, e)),
    }
}

/// Render a key file: the header line followed by one key per line.
pub fn render_authorized_keys(header: &str, keys: &[String]) -> String {
    let mut out = String::new();
    out.push_str(header);
    out.push('\n');
    for key in keys {
        out.push_str(key);
        out.push('\n');
    }
    out
}
