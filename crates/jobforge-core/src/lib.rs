//! jobforge core
//!
//! Domain types, error handling and document loading for jobforge.
//! This crate has minimal dependencies and defines the shared vocabulary
//! used by the validator, the compiler and the CLI:
//!
//! - [`settings::GlobalSettings`]: process-wide defaults, loaded once per run
//! - [`job::JobGroup`] / [`job::JobTemplate`]: one authored job-group document
//! - [`preset::PresetStore`]: named requirement presets
//! - [`pod::PodSpec`]: the closed compute-spec schema jobs are compiled into
//! - [`prowjob::JobConfig`]: the scheduler-native descriptor document

pub mod error;
pub mod job;
pub mod load;
pub mod pod;
pub mod preset;
pub mod prowjob;
pub mod settings;

pub use error::{Error, Result};

/// Branch assumed when a job group does not list any.
pub const DEFAULT_BRANCH: &str = "master";

/// Resource profile applied when a job does not name one.
pub const DEFAULT_RESOURCE: &str = "default";
