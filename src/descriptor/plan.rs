//! Dependency ordering of services
//!
//! The loader does not start anything. The plan tells the external engine (or
//! a human) which order the `depends_on` graph implies.

use super::config::Descriptor;
use crate::error::{BerthError, Result};
use std::collections::{HashMap, HashSet};

/// Services in an order that satisfies every `depends_on` edge
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartupPlan {
    /// Topological order, dependencies first
    order: Vec<String>,
    /// Direct dependencies of each planned service
    dependencies: HashMap<String, Vec<String>>,
}

impl StartupPlan {
    /// Plan every service of the descriptor
    pub fn new(descriptor: &Descriptor) -> Result<Self> {
        let names: Vec<&str> = descriptor.services.keys().map(String::as_str).collect();
        Self::build(descriptor, &names)
    }

    /// Plan the named services together with everything they depend on
    pub fn for_services<S: AsRef<str>>(descriptor: &Descriptor, services: &[S]) -> Result<Self> {
        let mut names = Vec::with_capacity(services.len());
        for service in services {
            let name = service.as_ref();
            if !descriptor.services.contains_key(name) {
                return Err(BerthError::ServiceNotFound(name.to_string()));
            }
            names.push(name);
        }
        Self::build(descriptor, &names)
    }

    fn build(descriptor: &Descriptor, roots: &[&str]) -> Result<Self> {
        let mut order = Vec::new();
        let mut visited = HashSet::new();
        let mut path = Vec::new();

        for service in roots {
            topological_sort(descriptor, service, &mut visited, &mut path, &mut order)?;
        }

        let dependencies: HashMap<String, Vec<String>> = order
            .iter()
            .map(|name| {
                let deps: Vec<String> = descriptor
                    .services
                    .get(name)
                    .map(|s| s.dependency_names().into_iter().map(str::to_string).collect())
                    .unwrap_or_default();
                (name.clone(), deps)
            })
            .collect();

        tracing::debug!("Startup order: {}", order.join(", "));

        Ok(Self {
            order,
            dependencies,
        })
    }

    /// Start order, dependencies first
    pub fn order(&self) -> &[String] {
        &self.order
    }

    /// Stop order, dependents first
    pub fn shutdown_order(&self) -> Vec<String> {
        self.order.iter().rev().cloned().collect()
    }

    /// Group services into stages; every dependency of a service sits in an
    /// earlier stage, so services within one stage are independent
    pub fn stages(&self) -> Vec<Vec<String>> {
        let mut levels: HashMap<&str, usize> = HashMap::new();
        let mut stages: Vec<Vec<String>> = Vec::new();

        for name in &self.order {
            let level = self
                .dependencies
                .get(name)
                .into_iter()
                .flatten()
                .filter_map(|dep| levels.get(dep.as_str()))
                .map(|level| level + 1)
                .max()
                .unwrap_or(0);

            levels.insert(name, level);
            if stages.len() <= level {
                stages.resize_with(level + 1, Vec::new);
            }
            stages[level].push(name.clone());
        }

        stages
    }

    /// Direct dependencies of a planned service
    pub fn dependencies_of(&self, service: &str) -> Option<&[String]> {
        self.dependencies.get(service).map(|d| d.as_slice())
    }
}

/// Depth-first topological sort; `path` holds the services being visited so a
/// back edge can be reported as the full cycle
fn topological_sort(
    descriptor: &Descriptor,
    service: &str,
    visited: &mut HashSet<String>,
    path: &mut Vec<String>,
    order: &mut Vec<String>,
) -> Result<()> {
    if visited.contains(service) {
        return Ok(());
    }

    if let Some(start) = path.iter().position(|s| s == service) {
        let mut cycle = path[start..].to_vec();
        cycle.push(service.to_string());
        return Err(BerthError::DependencyCycle(cycle));
    }

    let config = descriptor
        .services
        .get(service)
        .ok_or_else(|| BerthError::ServiceNotFound(service.to_string()))?;

    path.push(service.to_string());

    for dep in config.dependency_names() {
        if !descriptor.services.contains_key(dep) {
            return Err(BerthError::UnknownDependency {
                service: service.to_string(),
                dependency: dep.to_string(),
            });
        }
        topological_sort(descriptor, dep, visited, path, order)?;
    }

    path.pop();
    visited.insert(service.to_string());
    order.push(service.to_string());

    Ok(())
}
