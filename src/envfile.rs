//! Environment file reader
//!
//! Env files hold `KEY=VALUE` lines. The descriptor treats them as opaque;
//! they are only read for interpolation defaults (`.env`) and when env-file
//! checks are requested.

use crate::error::{BerthError, Result};
use regex::Regex;
use std::path::Path;
use std::sync::OnceLock;

/// One entry of an env file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvEntry {
    pub key: String,
    /// `None` for a bare `KEY` line, which passes the host's value through
    pub value: Option<String>,
}

fn key_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_.-]*$").expect("valid regex"))
}

/// Read and parse an env file
pub fn read(path: &Path) -> Result<Vec<EnvEntry>> {
    let content = std::fs::read_to_string(path)?;
    parse_str(&content, path)
}

/// Parse env file content; `path` is only used in error messages
pub fn parse_str(content: &str, path: &Path) -> Result<Vec<EnvEntry>> {
    let mut entries = Vec::new();

    for (index, raw) in content.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let error = |message: String| BerthError::EnvFileParse {
            path: path.to_path_buf(),
            line: index + 1,
            message,
        };

        let line = line.strip_prefix("export ").map(str::trim_start).unwrap_or(line);
        let (key, value) = match line.split_once('=') {
            Some((key, value)) => (key.trim(), Some(parse_value(value.trim()).map_err(error)?)),
            None => (line, None),
        };

        if !key_pattern().is_match(key) {
            return Err(error(format!("invalid variable name '{}'", key)));
        }

        entries.push(EnvEntry {
            key: key.to_string(),
            value,
        });
    }

    Ok(entries)
}

fn parse_value(value: &str) -> std::result::Result<String, String> {
    if let Some(rest) = value.strip_prefix('\'') {
        let end = rest
            .find('\'')
            .ok_or_else(|| "unterminated single quote".to_string())?;
        return Ok(rest[..end].to_string());
    }

    if let Some(rest) = value.strip_prefix('"') {
        let mut out = String::new();
        let mut chars = rest.chars();
        while let Some(c) = chars.next() {
            match c {
                '"' => return Ok(out),
                '\\' => match chars.next() {
                    Some('n') => out.push('\n'),
                    Some('t') => out.push('\t'),
                    Some('"') => out.push('"'),
                    Some('\\') => out.push('\\'),
                    Some(other) => {
                        out.push('\\');
                        out.push(other);
                    }
                    None => break,
                },
                other => out.push(other),
            }
        }
        return Err("unterminated double quote".to_string());
    }

    // unquoted: a " #" starts a trailing comment
    let value = match value.find(" #") {
        Some(pos) => &value[..pos],
        None => value,
    };
    Ok(value.trim_end().to_string())
}
