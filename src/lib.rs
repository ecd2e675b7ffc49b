//! Berth - a validating loader for multi-service deployment descriptors
//!
//! Berth reads compose-style descriptor files that wire services, named
//! volumes and environment files together, and checks them before an
//! orchestration engine ever sees them:
//!
//! - Service names and volume names are unique
//! - Every mounted named volume is declared
//! - Every dependency names a declared service, without cycles
//! - Port mappings, volume bindings and restart policies are well formed
//!
//! Berth never runs containers; that is the engine's job.

pub mod descriptor;
pub mod envfile;
pub mod error;
pub mod project;
pub mod settings;

pub use error::{BerthError, Result};
pub use project::Project;
pub use settings::LoaderOptions;
