//! Temporary on-disk workspace mirroring a real job-config checkout.

use jobforge_compiler::output;
use jobforge_core::job::JobGroup;
use jobforge_core::load;
use jobforge_core::settings::GlobalSettings;
use jobforge_spec::Validator;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::debug;

pub type Result<T> = std::result::Result<T, Box<dyn std::error::Error>>;

/// A global settings file, a directory of job groups and an output
/// directory, all inside a temporary directory.
///
/// Drop this to remove everything.
pub struct TestWorkspace {
    dir: TempDir,
}

impl TestWorkspace {
    /// Create an empty workspace with default global settings.
    pub fn new() -> Result<Self> {
        crate::init_test_logging();

        let workspace = Self {
            dir: TempDir::new()?,
        };
        std::fs::create_dir_all(workspace.input())?;
        workspace.set_settings(&GlobalSettings::default())?;
        Ok(workspace)
    }

    /// Create a workspace with the given global settings.
    pub fn with_settings(settings: &GlobalSettings) -> Result<Self> {
        let workspace = Self::new()?;
        workspace.set_settings(settings)?;
        Ok(workspace)
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn global(&self) -> PathBuf {
        self.root().join("global.yaml")
    }

    pub fn input(&self) -> PathBuf {
        self.root().join("jobs")
    }

    pub fn output(&self) -> PathBuf {
        self.root().join("generated")
    }

    /// Overwrite the global settings file.
    pub fn set_settings(&self, settings: &GlobalSettings) -> Result<()> {
        std::fs::write(self.global(), serde_yaml::to_string(settings)?)?;
        Ok(())
    }

    /// Write a job group into the input directory.
    pub fn add_group(&self, file: &str, group: &JobGroup) -> Result<PathBuf> {
        let path = self.input().join(file);
        std::fs::write(&path, serde_yaml::to_string(group)?)?;
        Ok(path)
    }

    /// Write a raw job-group document into the input directory.
    pub fn add_raw_group(&self, file: &str, content: &str) -> Result<PathBuf> {
        let path = self.input().join(file);
        std::fs::write(&path, content)?;
        Ok(path)
    }

    /// Validate, compile and write every job group. Returns the written
    /// paths in input order.
    pub fn generate(&self) -> Result<Vec<PathBuf>> {
        let mut written = Vec::new();
        for (group, content) in self.compile_all()? {
            let target = output::output_path(&self.output(), &group);
            output::write_atomic(&target, &content)?;
            written.push(target);
        }
        Ok(written)
    }

    /// Compare every job group's compiled output with the file on disk.
    /// Stops at the first stale file.
    pub fn check(&self) -> Result<()> {
        for (group, content) in self.compile_all()? {
            output::check(&output::output_path(&self.output(), &group), &content)?;
        }
        Ok(())
    }

    fn compile_all(&self) -> Result<Vec<(JobGroup, String)>> {
        let settings = GlobalSettings::load(self.global())?;
        let validator = Validator::new(&settings);

        let mut compiled = Vec::new();
        for path in load::yaml_files(&self.input())? {
            debug!(path = %path.display(), "Compiling test job group");
            let group = JobGroup::load(&path)?;
            validator
                .validate(&path.display().to_string(), &group)
                .ensure_valid()?;

            let jobs = jobforge_compiler::compile(&settings, &group)?;
            compiled.push((group, output::render(&settings, &jobs)?));
        }
        Ok(compiled)
    }
}
