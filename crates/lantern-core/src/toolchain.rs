//! The build collaborator.
//!
//! Lantern never drives `cargo` itself. A [`Toolchain`] places the
//! generated unit in the user's package, builds its tests and runs them
//! with captured stdout.

use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ToolchainError {
    /// The generated unit did not build. Retrying will not help.
    #[error("generated unit failed to compile: {message}")]
    Compile { message: String },

    #[error("failed to write {path}: {message}")]
    Write { path: PathBuf, message: String },

    /// The test binary could not be launched or died without output.
    #[error("test run failed: {message}")]
    Run { message: String },
}

impl ToolchainError {
    /// Errors no retry can fix.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ToolchainError::Compile { .. })
    }
}

/// Captured result of one test-binary run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunOutput {
    pub stdout: String,
    pub stderr: String,
    /// Exit status was zero. Panicking candidates do not make it non-zero;
    /// they are reported through the wire records.
    pub success: bool,
}

pub trait Toolchain: Send + Sync {
    /// Place `source` as the unit `file_name` next to the original.
    fn write_unit(&self, file_name: &str, source: &str) -> Result<(), ToolchainError>;

    /// Build and run the unit's tests, capturing stdout.
    fn build_and_run(&self, file_name: &str) -> Result<RunOutput, ToolchainError>;
}
