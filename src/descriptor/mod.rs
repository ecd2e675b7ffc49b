//! Multi-service deployment descriptors
//!
//! This module parses descriptor files into typed services and volumes,
//! checks their invariants and derives the dependency order an engine
//! would start them in.

pub mod config;
pub mod digest;
pub mod mount;
pub mod parser;
pub mod plan;
pub mod port;
pub mod restart;
pub mod validate;

pub use config::{Descriptor, ServiceConfig, VolumeConfig};
pub use mount::{MountType, ResolvedMount};
pub use parser::DescriptorParser;
pub use plan::StartupPlan;
pub use port::{PortMapping, Protocol};
pub use restart::RestartPolicy;
pub use validate::{Report, Validator, Warning};
