//! Project loading
//!
//! A project is the merged result of one or more descriptor files plus the
//! name the engine would group its containers under.

use crate::descriptor::validate::{Report, Validator, Warning};
use crate::descriptor::{Descriptor, DescriptorParser};
use crate::error::{BerthError, Result};
use crate::settings::LoaderOptions;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

/// Name used when nothing better can be derived
pub const DEFAULT_PROJECT_NAME: &str = "default";

fn project_name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[a-z0-9][a-z0-9_-]*$").expect("valid regex"))
}

/// A loaded descriptor project
#[derive(Debug, Clone)]
pub struct Project {
    /// Project name
    pub name: String,
    /// Descriptor files in merge order
    pub files: Vec<PathBuf>,
    /// Merged descriptor
    pub descriptor: Descriptor,
    /// Warnings from validation
    pub warnings: Vec<Warning>,
}

impl Project {
    /// Parse and merge the descriptor files without validating them
    ///
    /// With no files given, the default file names are looked up in the
    /// options' base directory.
    pub fn open(options: &LoaderOptions, files: &[PathBuf]) -> Result<Self> {
        let files = resolve_files(options, files)?;
        let descriptor = DescriptorParser::parse_files(&files, options)?;
        let name = project_name(&descriptor, &options.base_dir)?;

        tracing::info!(
            "Loaded project {} from {} file(s): {} services, {} volumes",
            name,
            files.len(),
            descriptor.services.len(),
            descriptor.volumes.len()
        );

        Ok(Self {
            name,
            files,
            descriptor,
            warnings: Vec::new(),
        })
    }

    /// Open and validate a project; fails on the first error
    pub fn load(options: &LoaderOptions, files: &[PathBuf]) -> Result<Self> {
        let mut project = Self::open(options, files)?;
        project.warnings = project.diagnose(options).into_result(options.strict)?;
        Ok(project)
    }

    /// Collect every error and warning, including env file checks when enabled
    pub fn diagnose(&self, options: &LoaderOptions) -> Report {
        let mut report = Validator::diagnose(&self.descriptor);
        if options.check_env_files {
            report
                .errors
                .extend(Validator::check_env_files(&self.descriptor, &options.base_dir));
        }
        report
    }
}

/// Use the given files, or find the default descriptor in the base directory
pub fn resolve_files(options: &LoaderOptions, files: &[PathBuf]) -> Result<Vec<PathBuf>> {
    if !files.is_empty() {
        return Ok(files.to_vec());
    }

    DescriptorParser::find_descriptor_file(&options.base_dir)
        .map(|file| vec![file])
        .ok_or_else(|| BerthError::DescriptorNotFound(options.base_dir.clone()))
}

/// The descriptor's own `name`, else the normalized directory name
fn project_name(descriptor: &Descriptor, base_dir: &Path) -> Result<String> {
    if let Some(name) = &descriptor.name {
        if !project_name_pattern().is_match(name) {
            return Err(BerthError::InvalidConfig(format!(
                "project name '{}' must contain only lowercase letters, digits, dashes and underscores, and start with a letter or digit",
                name
            )));
        }
        return Ok(name.clone());
    }

    let dir = base_dir
        .canonicalize()
        .unwrap_or_else(|_| base_dir.to_path_buf());
    let derived = dir
        .file_name()
        .and_then(|s| s.to_str())
        .map(normalize_project_name)
        .unwrap_or_default();

    if derived.is_empty() {
        Ok(DEFAULT_PROJECT_NAME.to_string())
    } else {
        Ok(derived)
    }
}

/// Lowercase and drop characters not allowed in project names
pub fn normalize_project_name(raw: &str) -> String {
    let cleaned: String = raw
        .to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '-' || *c == '_')
        .collect();
    cleaned
        .trim_start_matches(|c: char| c == '-' || c == '_')
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const DESCRIPTOR: &str = r#"
services:
  app:
    image: app:1
    depends_on: [db]
    env_file: app.env
    volumes:
      - upload:/upload
  db:
    image: postgres:15
volumes:
  upload:
"#;

    #[test]
    fn test_normalize_project_name() {
        assert_eq!(normalize_project_name("My Ledger.App"), "myledgerapp");
        assert_eq!(normalize_project_name("__svc-1"), "svc-1");
        assert_eq!(normalize_project_name("..."), "");
    }

    #[test]
    fn test_load_from_directory() {
        let temp = tempdir().unwrap();
        let dir = temp.path().join("Ledger_Stack");
        std::fs::create_dir(&dir).unwrap();
        std::fs::write(dir.join("compose.yml"), DESCRIPTOR).unwrap();

        let options = LoaderOptions::new(&dir);
        let project = Project::load(&options, &[]).unwrap();
        assert_eq!(project.name, "ledger_stack");
        assert_eq!(project.files, vec![dir.join("compose.yml")]);
        assert_eq!(project.descriptor.services.len(), 2);
        assert!(project.warnings.is_empty());
    }

    #[test]
    fn test_explicit_name_wins() {
        let temp = tempdir().unwrap();
        let file = temp.path().join("compose.yaml");
        std::fs::write(&file, format!("name: ledger\n{}", DESCRIPTOR)).unwrap();

        let project = Project::load(&LoaderOptions::new(temp.path()), &[file.clone()]).unwrap();
        assert_eq!(project.name, "ledger");

        std::fs::write(&file, format!("name: Bad Name\n{}", DESCRIPTOR)).unwrap();
        assert!(matches!(
            Project::open(&LoaderOptions::new(temp.path()), &[file]),
            Err(BerthError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_missing_descriptor() {
        let temp = tempdir().unwrap();
        assert!(matches!(
            Project::open(&LoaderOptions::new(temp.path()), &[]),
            Err(BerthError::DescriptorNotFound(_))
        ));
    }

    #[test]
    fn test_env_file_checks_are_opt_in() {
        let temp = tempdir().unwrap();
        std::fs::write(temp.path().join("compose.yaml"), DESCRIPTOR).unwrap();

        let options = LoaderOptions::new(temp.path());
        assert!(Project::load(&options, &[]).is_ok());

        let checked = options.check_env_files(true);
        match Project::load(&checked, &[]) {
            Err(BerthError::EnvFileNotFound { service, .. }) => assert_eq!(service, "app"),
            other => panic!("expected missing env file, got {:?}", other),
        }

        std::fs::write(temp.path().join("app.env"), "KEY=value\n").unwrap();
        assert!(Project::load(&checked, &[]).is_ok());
    }

    #[test]
    fn test_strict_mode_fails_on_warnings() {
        let temp = tempdir().unwrap();
        std::fs::write(
            temp.path().join("compose.yaml"),
            format!("{}  spare:\n", DESCRIPTOR),
        )
        .unwrap();

        let options = LoaderOptions::new(temp.path());
        let project = Project::load(&options, &[]).unwrap();
        assert_eq!(project.warnings.len(), 1);

        assert!(matches!(
            Project::load(&options.strict(true), &[]),
            Err(BerthError::Validation { warnings: 1, .. })
        ));
    }

    #[test]
    fn test_overlay_files_merge_in_order() {
        let temp = tempdir().unwrap();
        let base = temp.path().join("compose.yaml");
        let overlay = temp.path().join("compose.override.yaml");
        std::fs::write(&base, DESCRIPTOR).unwrap();
        std::fs::write(&overlay, "services:\n  db:\n    image: postgres:16\n").unwrap();

        let project =
            Project::load(&LoaderOptions::new(temp.path()), &[base, overlay]).unwrap();
        assert_eq!(
            project.descriptor.services.get("db").unwrap().image.as_deref(),
            Some("postgres:16")
        );
    }
}
