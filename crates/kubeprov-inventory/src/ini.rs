//! Ansible INI inventory format
//!
//! Supports `[group]`, `[group:children]` and `[group:vars]` sections and
//! inline host variables (`host key=value ...`). Comments are dropped on read.
//! Host variables are written on the first line that names the host. Quoted
//! values (`key='a b'`) are kept verbatim, quotes included.

use crate::model::{Inventory, SectionKind};
use kubeprov_core::{ProvisionError, Result};
use std::collections::HashSet;
use std::path::Path;

/// Group receiving hosts listed before any section header
pub const UNGROUPED: &str = "ungrouped";

fn parse_error(path: &Path, line: usize, message: impl Into<String>) -> ProvisionError {
    ProvisionError::InventoryParse {
        path: path.to_path_buf(),
        line,
        message: message.into(),
    }
}

/// Split a host line on whitespace outside `'...'` and `"..."` quotes
fn split_host_line(line: &str) -> std::result::Result<Vec<&str>, String> {
    let mut tokens = Vec::new();
    let mut start: Option<usize> = None;
    let mut quote: Option<char> = None;

    for (i, c) in line.char_indices() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None if c.is_whitespace() => {
                if let Some(begin) = start.take() {
                    tokens.push(&line[begin..i]);
                }
            }
            None => {
                start.get_or_insert(i);
                if c == '\'' || c == '"' {
                    quote = Some(c);
                }
            }
        }
    }

    if let Some(q) = quote {
        return Err(format!("unterminated {} quote", q));
    }
    if let Some(begin) = start {
        tokens.push(&line[begin..]);
    }
    Ok(tokens)
}

/// Parse inventory `content`; `path` is only used in error messages
pub fn parse(path: &Path, content: &str) -> Result<Inventory> {
    let mut inventory = Inventory::new();
    let mut current: Option<(String, SectionKind)> = None;

    for (number, raw) in content.lines().enumerate() {
        let line_no = number + 1;
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }

        if let Some(header) = line.strip_prefix('[') {
            let header = header
                .strip_suffix(']')
                .ok_or_else(|| parse_error(path, line_no, "unterminated section header"))?;
            let (name, kind) = match header.split_once(':') {
                None => (header, SectionKind::Hosts),
                Some((name, "children")) => (name, SectionKind::Children),
                Some((name, "vars")) => (name, SectionKind::Vars),
                Some((_, other)) => {
                    return Err(parse_error(
                        path,
                        line_no,
                        format!("unknown section type '{}'", other),
                    ));
                }
            };
            let name = name.trim();
            if name.is_empty() {
                return Err(parse_error(path, line_no, "empty group name"));
            }
            inventory.section_mut(name, kind);
            current = Some((name.to_string(), kind));
            continue;
        }

        let (group, kind) = match &current {
            Some((name, kind)) => (name.as_str(), *kind),
            None => (UNGROUPED, SectionKind::Hosts),
        };

        match kind {
            SectionKind::Hosts => {
                let tokens =
                    split_host_line(line).map_err(|e| parse_error(path, line_no, e))?;
                let mut tokens = tokens.into_iter();
                let Some(hostname) = tokens.next() else {
                    continue;
                };
                let mut vars = Vec::new();
                for token in tokens {
                    let (key, value) = token.split_once('=').ok_or_else(|| {
                        parse_error(
                            path,
                            line_no,
                            format!("expected key=value after host name, got '{}'", token),
                        )
                    })?;
                    vars.push((key, value));
                }
                let entry = inventory.upsert_host(hostname);
                for (key, value) in vars {
                    entry.set_var_if_absent(key, value);
                }
                inventory.add_to_group(group, hostname);
            }
            SectionKind::Children => inventory.add_child(group, line),
            SectionKind::Vars => {
                if !line.contains('=') {
                    return Err(parse_error(
                        path,
                        line_no,
                        format!("expected key=value in [{}:vars]", group),
                    ));
                }
                inventory.push_unique(group, SectionKind::Vars, line);
            }
        }
    }

    Ok(inventory)
}

/// Render `inventory` as INI text
pub fn render(inventory: &Inventory) -> String {
    let mut out = String::new();
    let mut rendered: HashSet<&str> = HashSet::new();

    for (i, section) in inventory.sections().iter().enumerate() {
        if i > 0 {
            out.push('\n');
        }
        out.push_str(&section.header());
        out.push('\n');

        for value in &section.entries {
            out.push_str(value);
            if section.kind == SectionKind::Hosts && rendered.insert(value.as_str()) {
                if let Some(entry) = inventory.host(value) {
                    for (key, var) in &entry.vars {
                        out.push(' ');
                        out.push_str(key);
                        out.push('=');
                        out.push_str(var);
                    }
                }
            }
            out.push('\n');
        }
    }

    out
}
