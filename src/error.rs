//! Error types for Berth

use std::path::PathBuf;
use thiserror::Error;

/// Result type for Berth operations
pub type Result<T> = std::result::Result<T, BerthError>;

/// Berth error types
#[derive(Error, Debug)]
pub enum BerthError {
    #[error("Descriptor parse error: {0}")]
    DescriptorParse(String),

    #[error("No descriptor file found in {}", .0.display())]
    DescriptorNotFound(PathBuf),

    #[error("Service '{0}' must have an 'image' specified")]
    MissingImage(String),

    #[error("Service '{service}' depends on unknown service '{dependency}'")]
    UnknownDependency { service: String, dependency: String },

    #[error("Service '{0}' depends on itself")]
    SelfDependency(String),

    #[error("Circular dependency detected: {}", .0.join(" -> "))]
    DependencyCycle(Vec<String>),

    #[error("Service '{service}' uses unknown condition '{condition}' for dependency '{dependency}'")]
    InvalidDependencyCondition {
        service: String,
        dependency: String,
        condition: String,
    },

    #[error("Service '{service}' mounts undeclared volume '{volume}'")]
    UndeclaredVolume { service: String, volume: String },

    #[error("Service '{service}' has invalid port mapping '{spec}': {reason}")]
    InvalidPort {
        service: String,
        spec: String,
        reason: String,
    },

    #[error("Service '{service}' has invalid volume binding '{spec}': {reason}")]
    InvalidMount {
        service: String,
        spec: String,
        reason: String,
    },

    #[error("Service '{service}' mounts more than one volume at '{target}'")]
    DuplicateMountTarget { service: String, target: String },

    #[error("Service '{service}' has invalid restart policy '{policy}'")]
    InvalidRestartPolicy { service: String, policy: String },

    #[error("Service '{service}' references missing env file {}", .path.display())]
    EnvFileNotFound { service: String, path: PathBuf },

    #[error("Env file {} line {line}: {message}", .path.display())]
    EnvFileParse {
        path: PathBuf,
        line: usize,
        message: String,
    },

    #[error("Interpolation error: {0}")]
    Interpolation(String),

    #[error("Service not found: {0}")]
    ServiceNotFound(String),

    #[error("Descriptor is invalid: {errors} error(s), {warnings} warning(s)")]
    Validation { errors: usize, warnings: usize },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(String),
}

impl BerthError {
    /// Name of the service this error is about, if any
    pub fn service(&self) -> Option<&str> {
        match self {
            BerthError::MissingImage(name)
            | BerthError::SelfDependency(name)
            | BerthError::ServiceNotFound(name) => Some(name),
            BerthError::UnknownDependency { service, .. }
            | BerthError::InvalidDependencyCondition { service, .. }
            | BerthError::UndeclaredVolume { service, .. }
            | BerthError::InvalidPort { service, .. }
            | BerthError::InvalidMount { service, .. }
            | BerthError::DuplicateMountTarget { service, .. }
            | BerthError::InvalidRestartPolicy { service, .. }
            | BerthError::EnvFileNotFound { service, .. } => Some(service),
            _ => None,
        }
    }
}

impl From<serde_yaml::Error> for BerthError {
    fn from(e: serde_yaml::Error) -> Self {
        BerthError::Yaml(e.to_string())
    }
}
