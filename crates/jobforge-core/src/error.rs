//! Error types for jobforge.

use crate::job::TriggerType;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    // Authoring errors
    #[error("Unknown requirements: {}", .0.join(", "))]
    UnknownRequirements(Vec<String>),

    #[error("'{0}' is not a valid type. Must be one of presubmit, postsubmit, periodic")]
    UnknownTriggerType(String),

    #[error("'{0}' is not a valid modifier. Must be one of hidden, optional, skipped")]
    UnknownModifier(String),

    #[error("Job '{job}' has nonexistent resource '{resource}'")]
    UnknownResource { job: String, resource: String },

    #[error("Repo {0} not valid, should take form org/repo[@branch]")]
    InvalidRepo(String),

    #[error("Duplicate {kind} job name: {name}")]
    DuplicateJob { kind: TriggerType, name: String },

    // Structural merge errors
    #[error("Unable to merge pod spec from requirement '{requirement}': {reason}")]
    MergeConflict { requirement: String, reason: String },

    #[error("Job {job} requests secrets but has {containers} containers; secrets only work with 1 container")]
    SecretsRequireSingleContainer { job: String, containers: usize },

    // I/O errors
    #[error("Failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to unmarshal {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: serde_yaml::Error,
    },

    #[error("Generated config is different than file {}", .0.display())]
    Stale(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(err: serde_yaml::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}
