//! Descriptor validation
//!
//! Errors break one of the descriptor invariants and always name the service
//! or volume at fault. Warnings flag things the engine will accept but that are
//! probably mistakes.

use super::config::{DependsOnConfig, Descriptor, ServiceConfig, DEPENDENCY_CONDITIONS};
use super::mount::ResolvedMount;
use super::plan::StartupPlan;
use super::port::{PortMapping, Protocol};
use super::restart::RestartPolicy;
use crate::envfile;
use crate::error::{BerthError, Result};
use serde_yaml::Value;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::net::IpAddr;
use std::path::Path;

/// Prefix of extension keys, which are never reported
const EXTENSION_PREFIX: &str = "x-";

/// A non-fatal finding
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Warning {
    /// Service the warning is about, if any
    pub service: Option<String>,
    pub message: String,
}

impl Warning {
    fn service(service: &str, message: String) -> Self {
        Self {
            service: Some(service.to_string()),
            message,
        }
    }

    fn global(message: String) -> Self {
        Self {
            service: None,
            message,
        }
    }
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

/// Every error and warning found in a descriptor, in declaration order
#[derive(Debug, Default)]
pub struct Report {
    pub errors: Vec<BerthError>,
    pub warnings: Vec<Warning>,
}

impl Report {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Fail with the first error, or in strict mode with any warning
    pub fn into_result(self, strict: bool) -> Result<Vec<Warning>> {
        if let Some(first) = self.errors.into_iter().next() {
            return Err(first);
        }
        if strict && !self.warnings.is_empty() {
            return Err(BerthError::Validation {
                errors: 0,
                warnings: self.warnings.len(),
            });
        }
        Ok(self.warnings)
    }

    fn error(&mut self, error: BerthError) {
        self.errors.push(error);
    }

    fn warn(&mut self, warning: Warning) {
        tracing::debug!("Validation warning: {}", warning);
        self.warnings.push(warning);
    }
}

/// Descriptor validator
pub struct Validator;

impl Validator {
    /// Validate a descriptor, returning its warnings or the first error
    pub fn validate(descriptor: &Descriptor) -> Result<Vec<Warning>> {
        Self::diagnose(descriptor).into_result(false)
    }

    /// Collect every error and warning in a descriptor
    pub fn diagnose(descriptor: &Descriptor) -> Report {
        let mut report = Report::default();

        if let Some(version) = &descriptor.version {
            if !(version.starts_with('2') || version.starts_with('3')) {
                report.warn(Warning::global(format!(
                    "Unrecognized format version '{}'",
                    version
                )));
            }
        }

        for key in unknown_keys(&descriptor.extra) {
            report.warn(Warning::global(format!(
                "Top-level key '{}' is not interpreted and will be ignored",
                key
            )));
        }

        let mut mounted = HashSet::new();
        let mut published: PublishedPorts = BTreeMap::new();
        let mut dependency_errors = false;

        for (name, service) in descriptor.services.iter() {
            check_image(&mut report, name, service);
            check_restart(&mut report, name, service);
            dependency_errors |= check_dependencies(&mut report, descriptor, name, service);
            check_ports(&mut report, name, service, &mut published);
            check_mounts(&mut report, descriptor, name, service, &mut mounted);

            for key in unknown_keys(&service.extra) {
                report.warn(Warning::service(
                    name,
                    format!(
                        "Service '{}' key '{}' is not interpreted and will be ignored",
                        name, key
                    ),
                ));
            }
        }

        for (name, volume) in descriptor.volumes.iter() {
            if !mounted.contains(name.as_str()) {
                let kind = if volume.is_external() {
                    "External volume"
                } else {
                    "Volume"
                };
                report.warn(Warning::global(format!(
                    "{} '{}' is declared but not mounted by any service",
                    kind, name
                )));
            }
        }

        // ordering is only meaningful once every edge points at a real service
        if !dependency_errors {
            if let Err(e) = StartupPlan::new(descriptor) {
                report.error(e);
            }
        }

        tracing::debug!(
            "Validated {} services, {} volumes: {} errors, {} warnings",
            descriptor.services.len(),
            descriptor.volumes.len(),
            report.errors.len(),
            report.warnings.len()
        );

        report
    }

    /// Check that every env file referenced by a service exists and parses
    pub fn check_env_files(descriptor: &Descriptor, base_dir: &Path) -> Vec<BerthError> {
        let mut errors = Vec::new();

        for (name, service) in descriptor.services.iter() {
            for file in service.env_files() {
                let path = base_dir.join(file);
                if !path.is_file() {
                    errors.push(BerthError::EnvFileNotFound {
                        service: name.to_string(),
                        path,
                    });
                    continue;
                }
                if let Err(e) = envfile::read(&path) {
                    errors.push(e);
                }
            }
        }

        errors
    }
}

fn unknown_keys(extra: &BTreeMap<String, Value>) -> impl Iterator<Item = &str> {
    extra
        .keys()
        .map(|k| k.as_str())
        .filter(|k| !k.starts_with(EXTENSION_PREFIX))
}

fn check_image(report: &mut Report, name: &str, service: &ServiceConfig) {
    let has_image = service
        .image
        .as_deref()
        .map(|image| !image.trim().is_empty())
        .unwrap_or(false);
    if !has_image {
        report.error(BerthError::MissingImage(name.to_string()));
    }
}

fn check_restart(report: &mut Report, name: &str, service: &ServiceConfig) {
    if let Some(policy) = &service.restart {
        if policy.parse::<RestartPolicy>().is_err() {
            report.error(BerthError::InvalidRestartPolicy {
                service: name.to_string(),
                policy: policy.clone(),
            });
        }
    }
}

/// Returns true when an edge points at a missing service or back at itself
fn check_dependencies(
    report: &mut Report,
    descriptor: &Descriptor,
    name: &str,
    service: &ServiceConfig,
) -> bool {
    let mut broken = false;
    let mut seen = HashSet::new();

    for dep in service.dependency_names() {
        if !seen.insert(dep) {
            report.warn(Warning::service(
                name,
                format!("Service '{}' lists dependency '{}' more than once", name, dep),
            ));
            continue;
        }
        if dep == name {
            report.error(BerthError::SelfDependency(name.to_string()));
            broken = true;
        } else if !descriptor.services.contains_key(dep) {
            report.error(BerthError::UnknownDependency {
                service: name.to_string(),
                dependency: dep.to_string(),
            });
            broken = true;
        }
    }

    if let Some(DependsOnConfig::Map(conditions)) = &service.depends_on {
        for (dep, condition) in conditions.iter() {
            if !DEPENDENCY_CONDITIONS.contains(&condition.condition.as_str()) {
                report.error(BerthError::InvalidDependencyCondition {
                    service: name.to_string(),
                    dependency: dep.to_string(),
                    condition: condition.condition.clone(),
                });
            }
        }
    }

    broken
}

fn check_ports(
    report: &mut Report,
    name: &str,
    service: &ServiceConfig,
    published: &mut PublishedPorts,
) {
    let Some(ports) = &service.ports else { return };

    for port in ports {
        let mapping = match PortMapping::from_config(name, port) {
            Ok(mapping) => mapping,
            Err(e) => {
                report.error(e);
                continue;
            }
        };

        for host_port in mapping.host_ports() {
            let bindings = published.entry((mapping.protocol, host_port)).or_default();
            let clash = bindings
                .iter()
                .find(|(ip, _)| addresses_overlap(*ip, mapping.host_ip))
                .map(|(_, owner)| owner.clone());
            match clash {
                Some(owner) if owner == name => report.warn(Warning::service(
                    name,
                    format!(
                        "Service '{}' publishes host port {}/{} more than once",
                        name, host_port, mapping.protocol
                    ),
                )),
                Some(owner) => report.warn(Warning::service(
                    name,
                    format!(
                        "Host port {}/{} is published by both '{}' and '{}'",
                        host_port, mapping.protocol, owner, name
                    ),
                )),
                None => bindings.push((mapping.host_ip, name.to_string())),
            }
        }
    }
}

/// Host bindings seen so far, keyed by protocol and host port
type PublishedPorts = BTreeMap<(Protocol, u16), Vec<(Option<IpAddr>, String)>>;

/// An absent or unspecified address binds every address
fn addresses_overlap(a: Option<IpAddr>, b: Option<IpAddr>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => a == b || a.is_unspecified() || b.is_unspecified(),
        _ => true,
    }
}

fn check_mounts<'a>(
    report: &mut Report,
    descriptor: &'a Descriptor,
    name: &str,
    service: &ServiceConfig,
    mounted: &mut HashSet<&'a str>,
) {
    let Some(volumes) = &service.volumes else { return };
    let mut targets: HashMap<String, usize> = HashMap::new();

    for volume in volumes {
        let resolved = match ResolvedMount::resolve(name, volume) {
            Ok(resolved) => resolved,
            Err(e) => {
                report.error(e);
                continue;
            }
        };

        let count = targets.entry(resolved.target.clone()).or_insert(0);
        *count += 1;
        if *count == 2 {
            report.error(BerthError::DuplicateMountTarget {
                service: name.to_string(),
                target: resolved.target.clone(),
            });
        }

        if let Some(volume_name) = resolved.volume_name() {
            match descriptor.volumes.get_key_value(volume_name) {
                Some((declared, _)) => {
                    mounted.insert(declared.as_str());
                }
                None => report.error(BerthError::UndeclaredVolume {
                    service: name.to_string(),
                    volume: volume_name.to_string(),
                }),
            }
        }
    }
}
