//! Loading proxy lists from disk

use crate::Result;
use anyhow::Context;
use std::fs;
use std::path::Path;

/// Trimmed, non-empty, non-comment lines in their original order
pub fn parse_proxy_list(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(String::from)
        .collect()
}

/// Read a proxy list file, one proxy per line
pub fn load_proxy_list<P: AsRef<Path>>(path: P) -> Result<Vec<String>> {
    let path = path.as_ref();
    let content = fs::read_to_string(path)
        .with_context(|| format!("failed to read proxy list {}", path.display()))?;
    Ok(parse_proxy_list(&content))
}
