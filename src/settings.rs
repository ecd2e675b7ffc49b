//! Loader options

use crate::envfile;
use crate::error::Result;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Name of the interpolation defaults file looked up in the project directory
pub const DOTENV_FILE: &str = ".env";

/// Options controlling how descriptors are loaded and checked
#[derive(Debug, Clone)]
pub struct LoaderOptions {
    /// Project directory; relative env file paths resolve against it
    pub base_dir: PathBuf,
    /// Variables available to `${VAR}` interpolation
    pub environment: HashMap<String, String>,
    /// Substitute variables before parsing
    pub interpolate: bool,
    /// Treat warnings as errors
    pub strict: bool,
    /// Require every referenced env file to exist and parse
    pub check_env_files: bool,
}

impl Default for LoaderOptions {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from("."),
            environment: HashMap::new(),
            interpolate: true,
            strict: false,
            check_env_files: false,
        }
    }
}

impl LoaderOptions {
    /// Create options for a project directory with an empty environment
    pub fn new(base_dir: &Path) -> Self {
        Self {
            base_dir: base_dir.to_path_buf(),
            ..Self::default()
        }
    }

    /// Create options whose environment is `<base_dir>/.env` overlaid by the
    /// process environment
    pub fn from_env(base_dir: &Path) -> Result<Self> {
        let mut environment = HashMap::new();

        let dotenv = base_dir.join(DOTENV_FILE);
        if dotenv.is_file() {
            tracing::debug!("Loading interpolation defaults from {}", dotenv.display());
            for entry in envfile::read(&dotenv)? {
                if let Some(value) = entry.value {
                    environment.insert(entry.key, value);
                }
            }
        }

        environment.extend(
            std::env::vars_os()
                .filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?))),
        );

        Ok(Self {
            environment,
            ..Self::new(base_dir)
        })
    }

    /// Set a variable
    pub fn env(mut self, key: &str, value: &str) -> Self {
        self.environment.insert(key.to_string(), value.to_string());
        self
    }

    /// Enable or disable interpolation
    pub fn interpolate(mut self, enabled: bool) -> Self {
        self.interpolate = enabled;
        self
    }

    /// Enable or disable strict mode
    pub fn strict(mut self, enabled: bool) -> Self {
        self.strict = enabled;
        self
    }

    /// Enable or disable env file checks
    pub fn check_env_files(mut self, enabled: bool) -> Self {
        self.check_env_files = enabled;
        self
    }
}
