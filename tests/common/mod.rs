//! Shared helpers for berth integration tests.

use assert_cmd::Command;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Directory holding the three-service fixture stack.
#[allow(dead_code)]
pub fn stack_dir() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/stack")
}

/// Contents of the fixture descriptor.
#[allow(dead_code)]
pub fn stack_descriptor() -> String {
    fs::read_to_string(stack_dir().join("compose.yaml")).expect("Failed to read fixture descriptor")
}

/// Isolated project directory for CLI runs.
#[allow(dead_code)]
pub struct TestContext {
    root: TempDir,
}

#[allow(dead_code)]
impl TestContext {
    /// Create an empty project directory.
    pub fn new() -> Self {
        let root = TempDir::new().expect("Failed to create temp directory for tests");
        Self { root }
    }

    /// Create a project directory seeded with the fixture stack.
    pub fn with_stack() -> Self {
        let ctx = Self::new();
        for entry in fs::read_dir(stack_dir()).expect("Failed to list fixture stack") {
            let entry = entry.expect("Failed to read fixture entry");
            fs::copy(entry.path(), ctx.path().join(entry.file_name()))
                .expect("Failed to copy fixture file");
        }
        ctx
    }

    pub fn path(&self) -> &Path {
        self.root.path()
    }

    /// Overwrite a file in the project directory.
    pub fn write(&self, name: &str, content: &str) {
        fs::write(self.path().join(name), content).expect("Failed to write test file");
    }

    pub fn remove(&self, name: &str) {
        fs::remove_file(self.path().join(name)).expect("Failed to remove test file");
    }

    /// Build a command for the compiled `berth` binary running in the project directory.
    pub fn cli(&self) -> Command {
        let mut cmd = Command::cargo_bin("berth").expect("Failed to locate berth binary");
        cmd.current_dir(self.path()).env_remove("RUST_LOG");
        cmd
    }
}
