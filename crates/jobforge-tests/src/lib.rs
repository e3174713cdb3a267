//! Shared test infrastructure for jobforge.
//!
//! Provides document fixtures and a temporary on-disk workspace for
//! exercising the full validate, compile and write cycle.
//!
//! # Usage
//!
//! ```ignore
//! use jobforge_tests::{GroupFixture, TestWorkspace};
//!
//! let workspace = TestWorkspace::new().unwrap();
//! workspace.add_group("istio.yaml", &GroupFixture::istio()).unwrap();
//! let written = workspace.generate().unwrap();
//! ```

pub mod context;
pub mod fixtures;

pub use context::TestWorkspace;
pub use fixtures::*;

/// Initialize test logging (call once per test binary).
pub fn init_test_logging() {
    use tracing_subscriber::{EnvFilter, fmt};

    let _ = fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("warn,jobforge_compiler=debug")),
        )
        .with_test_writer()
        .try_init();
}
