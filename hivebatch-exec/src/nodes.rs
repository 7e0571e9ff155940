//! Node list handling.

use std::fs;
use std::path::Path;

use crate::error::{Error, Result};

/// Removes duplicate node names, keeping the first occurrence of each.
pub fn dedup(nodes: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(nodes.len());
    for node in nodes {
        if !out.contains(&node) {
            out.push(node);
        }
    }
    out
}

/// Reads a node file with one host name per line.
///
/// Blank lines and lines starting with `#` are skipped. Schedulers list a
/// host once per allocated core, duplicates are removed keeping order.
pub fn read_node_file(path: &Path) -> Result<Vec<String>> {
    let text = fs::read_to_string(path).map_err(|e| {
        Error::InvalidNodeList(format!(
            "failed reading node file {}: {}",
            path.to_string_lossy(),
            e
        ))
    })?;
    let nodes = dedup(
        text.lines()
            .map(|l| l.trim())
            .filter(|l| !l.is_empty() && !l.starts_with('#'))
            .map(|l| l.to_string())
            .collect(),
    );
    if nodes.is_empty() {
        return Err(Error::InvalidNodeList(format!(
            "node file {} lists no nodes",
            path.to_string_lossy()
        )));
    }
    Ok(nodes)
}

/// Expands a compressed host list such as `node[01-03,07],login1`.
pub fn expand_host_list(list: &str) -> Result<Vec<String>> {
    let mut nodes = Vec::new();
    for part in split_top_level(list)? {
        nodes.extend(expand_part(part)?);
    }
    if nodes.is_empty() {
        return Err(Error::InvalidNodeList(format!("empty host list `{}`", list)));
    }
    Ok(dedup(nodes))
}

/// Splits on commas that aren't inside brackets.
fn split_top_level(list: &str) -> Result<Vec<&str>> {
    let mut parts = Vec::new();
    let mut depth = 0;
    let mut start = 0;
    for (i, c) in list.char_indices() {
        match c {
            '[' => depth += 1,
            ']' if depth == 0 => {
                return Err(Error::InvalidNodeList(format!("unbalanced `]` in `{}`", list)))
            }
            ']' => depth -= 1,
            ',' if depth == 0 => {
                parts.push(list[start..i].trim());
                start = i + 1;
            }
            _ => (),
        }
    }
    if depth != 0 {
        return Err(Error::InvalidNodeList(format!("unbalanced `[` in `{}`", list)));
    }
    parts.push(list[start..].trim());
    Ok(parts.into_iter().filter(|p| !p.is_empty()).collect())
}

fn expand_part(part: &str) -> Result<Vec<String>> {
    let open = match part.find('[') {
        Some(i) => i,
        None => return Ok(vec![part.to_string()]),
    };
    let close = match part[open..].find(']') {
        Some(i) => open + i,
        None => return Err(Error::InvalidNodeList(format!("unbalanced `[` in `{}`", part))),
    };
    let prefix = &part[..open];
    let suffixes = expand_part(&part[close + 1..])?;

    let mut out = Vec::new();
    for range in part[open + 1..close].split(',') {
        for n in expand_range(range.trim())? {
            for suffix in &suffixes {
                out.push(format!("{}{}{}", prefix, n, suffix));
            }
        }
    }
    Ok(out)
}

/// Expands `3`, `01-03` or `8-10`, keeping the zero padding of the start.
fn expand_range(range: &str) -> Result<Vec<String>> {
    let invalid = || Error::InvalidNodeList(format!("invalid range `{}`", range));
    let (start, end) = match range.find('-') {
        Some(i) => (&range[..i], &range[i + 1..]),
        None => (range, range),
    };
    let width = start.len();
    let first = start.parse::<u64>().map_err(|_| invalid())?;
    let last = end.parse::<u64>().map_err(|_| invalid())?;
    if last < first {
        return Err(invalid());
    }
    Ok((first..=last)
        .map(|n| format!("{:0width$}", n, width = width))
        .collect())
}
