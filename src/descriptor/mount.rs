//! Volume binding resolution

use super::config::VolumeMount;
use crate::error::{BerthError, Result};
use regex::Regex;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

/// Mount type of a volume binding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MountType {
    /// Named or anonymous volume managed by the engine
    Volume,
    /// Host path
    Bind,
    /// In-memory filesystem
    Tmpfs,
}

impl FromStr for MountType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "volume" => Ok(MountType::Volume),
            "bind" => Ok(MountType::Bind),
            "tmpfs" => Ok(MountType::Tmpfs),
            other => Err(format!("unknown mount type '{}'", other)),
        }
    }
}

impl fmt::Display for MountType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MountType::Volume => write!(f, "volume"),
            MountType::Bind => write!(f, "bind"),
            MountType::Tmpfs => write!(f, "tmpfs"),
        }
    }
}

/// Short-syntax mode flags the engine understands
const MOUNT_MODES: &[&str] = &[
    "rw", "ro", "z", "Z", "nocopy", "cached", "delegated", "consistent", "shared", "slave",
    "private", "rshared", "rslave", "rprivate",
];

fn volume_name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_.-]*$").expect("valid regex"))
}

/// A volume binding with its syntax normalized away
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedMount {
    #[serde(rename = "type")]
    pub mount_type: MountType,
    /// Volume name or host path; absent for anonymous volumes and tmpfs
    pub source: Option<String>,
    /// Absolute path inside the container
    pub target: String,
    pub read_only: bool,
}

impl ResolvedMount {
    /// Resolve a binding declared by the named service
    pub fn resolve(service: &str, mount: &VolumeMount) -> Result<Self> {
        let resolved = match mount {
            VolumeMount::Short(spec) => Self::parse_short(spec),
            VolumeMount::Long(long) => {
                let source = long.source.as_deref().filter(|s| !s.is_empty());
                let mount_type = match long.mount_type.as_deref() {
                    Some(t) => t.parse(),
                    None => Ok(infer_type(source)),
                };
                match (mount_type, long.target.as_deref()) {
                    (Err(reason), _) => Err(reason),
                    (_, None) => Err("missing target path".to_string()),
                    (Ok(mount_type), Some(target)) => Self::build(
                        mount_type,
                        source,
                        target,
                        long.read_only.unwrap_or(false),
                    ),
                }
            }
        };

        resolved.map_err(|reason| BerthError::InvalidMount {
            service: service.to_string(),
            spec: mount.to_string(),
            reason,
        })
    }

    /// Name of the named volume this binding uses, if any
    pub fn volume_name(&self) -> Option<&str> {
        match self.mount_type {
            MountType::Volume => self.source.as_deref(),
            _ => None,
        }
    }

    fn parse_short(spec: &str) -> std::result::Result<Self, String> {
        let parts: Vec<&str> = spec.split(':').collect();
        match parts.as_slice() {
            [target] => Self::build(MountType::Volume, None, target, false),
            [source, target] => {
                Self::build(infer_type(Some(*source)), Some(*source), target, false)
            }
            [source, target, mode] => {
                let read_only = parse_mode(mode)?;
                Self::build(infer_type(Some(*source)), Some(*source), target, read_only)
            }
            _ => Err("expected [source:]target[:mode]".to_string()),
        }
    }

    fn build(
        mount_type: MountType,
        source: Option<&str>,
        target: &str,
        read_only: bool,
    ) -> std::result::Result<Self, String> {
        if target.is_empty() {
            return Err("missing target path".to_string());
        }
        if !target.starts_with('/') {
            return Err(format!("target '{}' is not an absolute path", target));
        }

        match (mount_type, source) {
            (MountType::Bind, None) => return Err("bind mount needs a source path".to_string()),
            (MountType::Bind, Some("")) => {
                return Err("bind mount needs a source path".to_string())
            }
            (MountType::Tmpfs, Some(_)) => {
                return Err("tmpfs mount cannot have a source".to_string())
            }
            (MountType::Volume, Some(name)) if !volume_name_pattern().is_match(name) => {
                return Err(format!("'{}' is not a valid volume name", name))
            }
            _ => {}
        }

        Ok(Self {
            mount_type,
            source: source.map(str::to_string),
            target: target.to_string(),
            read_only,
        })
    }
}

impl fmt::Display for ResolvedMount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ", self.mount_type)?;
        if let Some(source) = &self.source {
            write!(f, "{} -> ", source)?;
        }
        write!(f, "{}", self.target)?;
        if self.read_only {
            write!(f, " (ro)")?;
        }
        Ok(())
    }
}

/// Paths become bind mounts; anything else names a volume
fn infer_type(source: Option<&str>) -> MountType {
    match source {
        Some(s) if s.starts_with('/') || s.starts_with('.') || s.starts_with('~') => {
            MountType::Bind
        }
        _ => MountType::Volume,
    }
}

fn parse_mode(mode: &str) -> std::result::Result<bool, String> {
    let flags: Vec<&str> = mode.split(',').collect();
    if let Some(unknown) = flags.iter().find(|flag| !MOUNT_MODES.contains(*flag)) {
        return Err(format!("unknown mount mode '{}'", unknown));
    }
    let read_only = flags.contains(&"ro");
    if read_only && flags.contains(&"rw") {
        return Err("mount cannot be both 'ro' and 'rw'".to_string());
    }
    Ok(read_only)
}

/// Best-effort container path of a binding, used when merging overlays
pub fn target_of(mount: &VolumeMount) -> Option<String> {
    match mount {
        VolumeMount::Short(spec) => {
            let parts: Vec<&str> = spec.split(':').collect();
            match parts.as_slice() {
                [target] | [_, target] | [_, target, _] => Some(target.to_string()),
                _ => None,
            }
        }
        VolumeMount::Long(long) => long.target.clone(),
    }
}
