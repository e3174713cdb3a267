//! Rendering, writing and checking generated descriptor files.

use jobforge_core::job::JobGroup;
use jobforge_core::load;
use jobforge_core::prowjob::JobConfig;
use jobforge_core::settings::GlobalSettings;
use jobforge_core::{DEFAULT_BRANCH, Error, Result};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info};

/// The header banner followed by the YAML document.
pub fn render(settings: &GlobalSettings, config: &JobConfig) -> Result<String> {
    let body = serde_yaml::to_string(config)?;
    Ok(format!("{}{}", settings.header(), body))
}

/// `<dir>/<org>.<repo>.gen.yaml`, or `<dir>/<org>.<repo>.<branch>.gen.yaml`
/// for a group that only targets a single non-default branch.
pub fn output_path(dir: &Path, group: &JobGroup) -> PathBuf {
    match group.branches.as_slice() {
        [branch] if branch != DEFAULT_BRANCH => dir.join(format!(
            "{}.{}.{}.gen.yaml",
            group.org, group.repo, branch
        )),
        _ => dir.join(format!("{}.{}.gen.yaml", group.org, group.repo)),
    }
}

/// Replace `path` with `content` atomically, creating parent directories.
pub fn write_atomic(path: &Path, content: &str) -> Result<()> {
    let write_err = |source| Error::Write {
        path: path.to_path_buf(),
        source,
    };

    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(parent).map_err(write_err)?;

    let mut file = NamedTempFile::new_in(parent).map_err(write_err)?;
    file.write_all(content.as_bytes()).map_err(write_err)?;
    file.persist(path).map_err(|e| write_err(e.error))?;

    info!(path = %path.display(), bytes = content.len(), "Wrote generated config");
    Ok(())
}

/// Fail with [`Error::Stale`] unless `path` holds exactly `content`.
pub fn check(path: &Path, content: &str) -> Result<()> {
    let current = match std::fs::read_to_string(path) {
        Ok(current) => current,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            debug!(path = %path.display(), "Generated config does not exist");
            return Err(Error::Stale(path.to_path_buf()));
        }
        Err(source) => {
            return Err(Error::Read {
                path: path.to_path_buf(),
                source,
            });
        }
    };

    if current != content {
        return Err(Error::Stale(path.to_path_buf()));
    }
    debug!(path = %path.display(), "Generated config is up to date");
    Ok(())
}

/// Read a previously generated descriptor document.
pub fn read_job_config(path: &Path) -> Result<JobConfig> {
    load::read_yaml(path)
}
