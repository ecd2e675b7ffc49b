//! Deployment descriptor parser

use super::config::{
    DependsOnCondition, DependsOnConfig, Descriptor, EnvFileConfig, ServiceConfig,
};
use super::mount;
use crate::error::{BerthError, Result};
use crate::settings::LoaderOptions;
use indexmap::IndexMap;
use regex::{Captures, Regex};
use serde_yaml::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

/// Default descriptor file names, in lookup order
pub const DEFAULT_DESCRIPTOR_FILES: &[&str] = &[
    "compose.yaml",
    "compose.yml",
    "docker-compose.yaml",
    "docker-compose.yml",
];

/// Descriptor file parser
pub struct DescriptorParser;

impl DescriptorParser {
    /// Find a descriptor file in a directory
    pub fn find_descriptor_file(dir: &Path) -> Option<PathBuf> {
        DEFAULT_DESCRIPTOR_FILES
            .iter()
            .map(|name| dir.join(name))
            .find(|path| path.is_file())
    }

    /// Parse a descriptor file from a path
    pub fn parse_file(path: &Path, options: &LoaderOptions) -> Result<Descriptor> {
        tracing::debug!("Parsing descriptor file: {}", path.display());

        let content = std::fs::read_to_string(path).map_err(|e| {
            BerthError::DescriptorParse(format!("Failed to read {}: {}", path.display(), e))
        })?;

        Self::parse_str(&content, options).map_err(|e| match e {
            BerthError::DescriptorParse(msg) => {
                BerthError::DescriptorParse(format!("{}: {}", path.display(), msg))
            }
            other => other,
        })
    }

    /// Parse a descriptor from a string
    pub fn parse_str(content: &str, options: &LoaderOptions) -> Result<Descriptor> {
        let mut raw: Value = serde_yaml::from_str(content)
            .map_err(|e| BerthError::DescriptorParse(format!("Failed to parse YAML: {}", e)))?;

        if raw.is_null() {
            return Err(BerthError::DescriptorParse(
                "descriptor is empty".to_string(),
            ));
        }
        if !raw.is_mapping() {
            return Err(BerthError::DescriptorParse(
                "top level of a descriptor must be a mapping".to_string(),
            ));
        }

        raw.apply_merge()
            .map_err(|e| BerthError::DescriptorParse(format!("Failed to apply merge keys: {}", e)))?;

        if options.interpolate {
            interpolate_value(&mut raw, &options.environment)?;
        }

        serde_yaml::from_value(raw)
            .map_err(|e| BerthError::DescriptorParse(format!("Invalid descriptor: {}", e)))
    }

    /// Parse multiple descriptor files, each overlaying the previous ones
    pub fn parse_files(paths: &[PathBuf], options: &LoaderOptions) -> Result<Descriptor> {
        let mut paths = paths.iter();
        let first = paths.next().ok_or_else(|| {
            BerthError::InvalidConfig("no descriptor files given".to_string())
        })?;

        let mut descriptor = Self::parse_file(first, options)?;
        for path in paths {
            let overlay = Self::parse_file(path, options)?;
            tracing::debug!("Merging overlay {}", path.display());
            descriptor = Self::merge_descriptors(descriptor, overlay);
        }

        Ok(descriptor)
    }

    /// Merge two descriptors; the overlay wins on conflicts
    pub fn merge_descriptors(base: Descriptor, overlay: Descriptor) -> Descriptor {
        let mut result = base;

        if overlay.version.is_some() {
            result.version = overlay.version;
        }
        if overlay.name.is_some() {
            result.name = overlay.name;
        }

        for (name, service) in overlay.services {
            match result.services.get_mut(&name) {
                Some(existing) => merge_service(existing, service),
                None => {
                    result.services.insert(name, service);
                }
            }
        }

        for (name, volume) in overlay.volumes {
            result.volumes.insert(name, volume);
        }

        result.extra.extend(overlay.extra);

        result
    }
}

fn merge_service(existing: &mut ServiceConfig, overlay: ServiceConfig) {
    if overlay.env_file.is_some() {
        let mut files: Vec<String> = existing
            .env_files()
            .into_iter()
            .map(str::to_string)
            .collect();
        for file in overlay.env_files() {
            if !files.iter().any(|f| f == file) {
                files.push(file.to_string());
            }
        }
        existing.env_file = Some(match files.len() {
            1 => EnvFileConfig::Single(files.remove(0)),
            _ => EnvFileConfig::Multiple(files),
        });
    }

    if overlay.image.is_some() {
        existing.image = overlay.image;
    }
    if overlay.restart.is_some() {
        existing.restart = overlay.restart;
    }

    if let Some(overlay_deps) = overlay.depends_on {
        existing.depends_on = Some(match existing.depends_on.take() {
            None => overlay_deps,
            Some(base_deps) => merge_dependencies(base_deps, overlay_deps),
        });
    }

    if let Some(ports) = overlay.ports {
        let merged = existing.ports.get_or_insert_with(Vec::new);
        for port in ports {
            if !merged.contains(&port) {
                merged.push(port);
            }
        }
    }

    if let Some(volumes) = overlay.volumes {
        let merged = existing.volumes.get_or_insert_with(Vec::new);
        for volume in volumes {
            let target = mount::target_of(&volume);
            let slot = target
                .as_ref()
                .and_then(|t| merged.iter().position(|m| mount::target_of(m).as_ref() == Some(t)));
            match slot {
                Some(index) => merged[index] = volume,
                None => merged.push(volume),
            }
        }
    }

    existing.extra.extend(overlay.extra);
}

fn merge_dependencies(base: DependsOnConfig, overlay: DependsOnConfig) -> DependsOnConfig {
    match (base, overlay) {
        (DependsOnConfig::Array(mut names), DependsOnConfig::Array(extra)) => {
            for name in extra {
                if !names.contains(&name) {
                    names.push(name);
                }
            }
            DependsOnConfig::Array(names)
        }
        (base, overlay) => {
            let mut map = into_condition_map(base);
            for (name, condition) in into_condition_map(overlay) {
                map.insert(name, condition);
            }
            DependsOnConfig::Map(map)
        }
    }
}

fn into_condition_map(deps: DependsOnConfig) -> IndexMap<String, DependsOnCondition> {
    match deps {
        DependsOnConfig::Map(map) => map,
        DependsOnConfig::Array(names) => {
            names
                .into_iter()
                .map(|name| (name, DependsOnCondition::default()))
                .collect()
        }
    }
}

fn variable_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r"\$(?:(?P<escape>\$)|\{(?P<braced>[A-Za-z_][A-Za-z0-9_]*)(?P<op>:?[-?])?|(?P<named>[A-Za-z_][A-Za-z0-9_]*))",
        )
        .expect("valid regex")
    })
}

/// Interpolate variables in every string value of a YAML document
pub fn interpolate_value(value: &mut Value, env: &HashMap<String, String>) -> Result<()> {
    match value {
        Value::String(s) => {
            if s.contains('$') {
                *s = interpolate_str(s, env)?;
            }
        }
        Value::Sequence(items) => {
            for item in items {
                interpolate_value(item, env)?;
            }
        }
        Value::Mapping(map) => {
            for (_, item) in map.iter_mut() {
                interpolate_value(item, env)?;
            }
        }
        Value::Tagged(tagged) => interpolate_value(&mut tagged.value, env)?,
        Value::Null | Value::Bool(_) | Value::Number(_) => {}
    }
    Ok(())
}

/// Double every `$` in string values, so interpolating the document again
/// gives back the same strings
pub fn escape_value(value: &mut Value) {
    match value {
        Value::String(s) => {
            if s.contains('$') {
                *s = s.replace('$', "$$");
            }
        }
        Value::Sequence(items) => items.iter_mut().for_each(escape_value),
        Value::Mapping(map) => {
            for (_, item) in map.iter_mut() {
                escape_value(item);
            }
        }
        Value::Tagged(tagged) => escape_value(&mut tagged.value),
        Value::Null | Value::Bool(_) | Value::Number(_) => {}
    }
}

/// Interpolate variables in a string
///
/// Supports `$VAR`, `${VAR}`, `${VAR:-default}`, `${VAR-default}`,
/// `${VAR:?message}` and `${VAR?message}`. Defaults may themselves contain
/// variables, braced ones included. `$$` produces a literal `$`.
pub fn interpolate_str(s: &str, env: &HashMap<String, String>) -> Result<String> {
    let mut result = String::with_capacity(s.len());
    let mut rest = s;

    while let Some(caps) = variable_pattern().captures(rest) {
        let Some(head) = caps.get(0) else { break };
        check_literal(&rest[..head.start()], s)?;
        result.push_str(&rest[..head.start()]);

        let tail = &rest[head.end()..];
        let consumed = if caps.name("braced").is_some() {
            let end = closing_brace(tail).ok_or_else(|| malformed(s))?;
            let arg = &tail[..end];
            if caps.name("op").is_none() && !arg.is_empty() {
                return Err(malformed(s));
            }
            result.push_str(&substitute(&caps, arg, env)?);
            end + 1
        } else {
            result.push_str(&substitute(&caps, "", env)?);
            0
        };
        rest = &tail[consumed..];
    }

    check_literal(rest, s)?;
    result.push_str(rest);
    Ok(result)
}

/// Offset of the `}` closing a braced expression, skipping nested `${...}`
fn closing_brace(s: &str) -> Option<usize> {
    let bytes = s.as_bytes();
    let mut depth = 0usize;
    let mut i = 0;

    while i < bytes.len() {
        match (bytes[i], bytes.get(i + 1)) {
            (b'$', Some(b'$')) => i += 1,
            (b'$', Some(b'{')) => {
                depth += 1;
                i += 1;
            }
            (b'}', _) if depth == 0 => return Some(i),
            (b'}', _) => depth -= 1,
            _ => {}
        }
        i += 1;
    }

    None
}

/// A `${` that the pattern did not consume is malformed
fn check_literal(segment: &str, whole: &str) -> Result<()> {
    if segment.contains("${") {
        return Err(malformed(whole));
    }
    Ok(())
}

fn malformed(whole: &str) -> BerthError {
    BerthError::Interpolation(format!("invalid interpolation format in '{}'", whole))
}

fn substitute(caps: &Captures, arg: &str, env: &HashMap<String, String>) -> Result<String> {
    if caps.name("escape").is_some() {
        return Ok("$".to_string());
    }

    let name = match caps.name("braced").or_else(|| caps.name("named")) {
        Some(m) => m.as_str(),
        None => return Ok(String::new()),
    };
    let value = env.get(name);

    match caps.name("op").map(|m| m.as_str()) {
        Some(":-") => match value {
            Some(v) if !v.is_empty() => Ok(v.clone()),
            _ => interpolate_str(arg, env),
        },
        Some("-") => match value {
            Some(v) => Ok(v.clone()),
            None => interpolate_str(arg, env),
        },
        Some(":?") => match value {
            Some(v) if !v.is_empty() => Ok(v.clone()),
            _ => Err(required_error(name, arg)),
        },
        Some("?") => match value {
            Some(v) => Ok(v.clone()),
            None => Err(required_error(name, arg)),
        },
        _ => match value {
            Some(v) => Ok(v.clone()),
            None => {
                tracing::warn!(
                    "The {} variable is not set. Defaulting to a blank string.",
                    name
                );
                Ok(String::new())
            }
        },
    }
}

fn required_error(name: &str, message: &str) -> BerthError {
    if message.is_empty() {
        BerthError::Interpolation(format!("required variable {} is missing a value", name))
    } else {
        BerthError::Interpolation(format!(
            "required variable {} is missing a value: {}",
            name, message
        ))
    }
}
