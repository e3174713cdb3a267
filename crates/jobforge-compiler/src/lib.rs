//! Job compilation for jobforge.
//!
//! Takes validated job-group documents and produces the descriptor
//! documents a CI scheduler reads:
//!
//! 1. **Matrix expansion**: each job template fans out over the group's
//!    matrix axes
//! 2. **Inheritance**: image, env, labels, cluster and the rest resolve
//!    global < group < job
//! 3. **Requirements**: named presets are merged onto each descriptor
//!
//! The [`output`] module renders, writes and checks generated files, and
//! [`diff`] reports how a fresh compilation differs from a previous one.

pub mod branching;
pub mod compiler;
pub mod diff;
pub mod matrix;
pub mod merge;
pub mod output;
pub mod overlay;
pub mod requirements;

pub use compiler::JobCompiler;
pub use diff::{DiffReport, diff};
pub use matrix::MatrixExpander;
pub use requirements::RequirementResolver;

use jobforge_core::Result;
use jobforge_core::job::JobGroup;
use jobforge_core::prowjob::JobConfig;
use jobforge_core::settings::GlobalSettings;

/// Compile one job group against the global settings.
pub fn compile(settings: &GlobalSettings, group: &JobGroup) -> Result<JobConfig> {
    JobCompiler::new(settings, group).compile()
}
