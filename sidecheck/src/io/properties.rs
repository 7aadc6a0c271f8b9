//! Java `.properties` records, the format of extension module descriptors.
//!
//! Parsing follows `java.util.Properties#load`: `#`/`!` comments, `=`, `:`
//! or whitespace between key and value, backslash line continuations and
//! `\uXXXX` escapes. Writing escapes everything outside printable ASCII so
//! the output loads identically under ISO-8859-1.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};

const WHITESPACE: [char; 3] = [' ', '\t', '\x0c'];

/// Ordered key/value record. Keys are unique; setting an existing key keeps
/// its position.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PropertiesRecord {
    entries: Vec<(String, String)>,
}

impl PropertiesRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn parse(contents: &str) -> Self {
        let mut record = Self::new();
        for line in logical_lines(contents) {
            let (key, value) = split_key_value(&line);
            record.set(key, value);
        }
        record
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Render as `key=value` lines.
    pub fn render(&self) -> String {
        let mut buf = String::new();
        for (key, value) in &self.entries {
            escape_into(&mut buf, key, true);
            buf.push('=');
            escape_into(&mut buf, value, false);
            buf.push('\n');
        }
        buf
    }
}

/// Load a properties file.
pub fn load_properties(path: &Path) -> Result<PropertiesRecord> {
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    Ok(PropertiesRecord::parse(&contents))
}

/// Atomically write a properties file (temp file + rename).
pub fn write_properties(path: &Path, record: &PropertiesRecord) -> Result<()> {
    let tmp_path = path.with_extension("properties.tmp");
    fs::write(&tmp_path, record.render())
        .with_context(|| format!("write temp file {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace {}", path.display()))?;
    Ok(())
}

/// Join natural lines into logical lines, dropping blanks and comments.
fn logical_lines(contents: &str) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();
    let mut continuing = false;

    for natural in contents.lines() {
        let line = natural.trim_start_matches(WHITESPACE);
        if !continuing && (line.is_empty() || line.starts_with('#') || line.starts_with('!')) {
            continue;
        }
        let trailing = line.chars().rev().take_while(|c| *c == '\\').count();
        if trailing % 2 == 1 {
            current.push_str(&line[..line.len() - 1]);
            continuing = true;
            continue;
        }
        current.push_str(line);
        lines.push(std::mem::take(&mut current));
        continuing = false;
    }
    if continuing {
        lines.push(current);
    }
    lines
}

fn split_key_value(line: &str) -> (String, String) {
    let mut escaped = false;
    let mut key_end = line.len();
    for (idx, c) in line.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' => escaped = true,
            '=' | ':' => {
                key_end = idx;
                break;
            }
            c if WHITESPACE.contains(&c) => {
                key_end = idx;
                break;
            }
            _ => {}
        }
    }

    let key = &line[..key_end];
    let mut rest = line[key_end..].trim_start_matches(WHITESPACE);
    if let Some(stripped) = rest.strip_prefix(['=', ':']) {
        rest = stripped.trim_start_matches(WHITESPACE);
    }
    (unescape(key), unescape(rest))
}

fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('t') => out.push('\t'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('f') => out.push('\x0c'),
            Some('u') => {
                let hex: String = chars.by_ref().take(4).collect();
                match u32::from_str_radix(&hex, 16).ok().and_then(char::from_u32) {
                    Some(decoded) => out.push(decoded),
                    None => {
                        out.push('u');
                        out.push_str(&hex);
                    }
                }
            }
            Some(other) => out.push(other),
            None => {}
        }
    }
    out
}

fn escape_into(buf: &mut String, text: &str, is_key: bool) {
    for (idx, c) in text.chars().enumerate() {
        match c {
            '\\' => buf.push_str("\\\\"),
            '\t' => buf.push_str("\\t"),
            '\n' => buf.push_str("\\n"),
            '\r' => buf.push_str("\\r"),
            '\x0c' => buf.push_str("\\f"),
            ' ' if is_key || idx == 0 => buf.push_str("\\ "),
            '=' | ':' | '#' | '!' => {
                buf.push('\\');
                buf.push(c);
            }
            c if (' '..='~').contains(&c) => buf.push(c),
            c => {
                let mut units = [0u16; 2];
                for unit in c.encode_utf16(&mut units) {
                    buf.push_str(&format!("\\u{unit:04X}"));
                }
            }
        }
    }
}
