//! Requirement resolution and application.
//!
//! A requirement names a preset in the effective [`PresetStore`]. Resolving
//! a list of requirements yields the presets in order; applying them merges
//! each onto a job descriptor, followed by the derived effects (secret
//! injection and CPU tuning).

use crate::overlay::overlay_pod_spec;
use jobforge_core::pod::{Container, EnvVar};
use jobforge_core::preset::{PresetStore, RequirementPreset, Secret};
use jobforge_core::prowjob::JobBase;
use jobforge_core::{Error, Result};
use tracing::{debug, warn};

/// Env var carrying the serialized secret references.
pub const SECRETS_ENV: &str = "GCP_SECRETS";

/// Env var tuned from the container's CPU limit.
pub const MAX_PROCS_ENV: &str = "GOMAXPROCS";

/// Resolves requirement names against a preset store and merges the
/// resulting presets onto job descriptors.
pub struct RequirementResolver<'a> {
    presets: &'a PresetStore,
    auto_max_procs: bool,
}

impl<'a> RequirementResolver<'a> {
    pub fn new(presets: &'a PresetStore, auto_max_procs: bool) -> Self {
        Self {
            presets,
            auto_max_procs,
        }
    }

    /// Resolve `requirements` minus `excluded` into presets, preserving
    /// order.
    ///
    /// Every name in both lists must exist; all missing names are reported
    /// together.
    pub fn resolve<'r>(
        &self,
        requirements: &'r [String],
        excluded: &[String],
    ) -> Result<Vec<(&'r str, &'a RequirementPreset)>> {
        let mut missing: Vec<String> = Vec::new();
        for name in requirements.iter().chain(excluded) {
            if !self.presets.contains(name) && !missing.contains(name) {
                missing.push(name.clone());
            }
        }
        if !missing.is_empty() {
            return Err(Error::UnknownRequirements(missing));
        }

        let presets: &'a PresetStore = self.presets;
        Ok(requirements
            .iter()
            .filter(|name| !excluded.contains(name))
            .filter_map(|name| presets.get(name).map(|preset| (name.as_str(), preset)))
            .collect())
    }

    /// Apply the resolved requirements to `job`.
    pub fn apply(
        &self,
        job: &mut JobBase,
        requirements: &[String],
        excluded: &[String],
    ) -> Result<()> {
        let mut secrets: Vec<Secret> = Vec::new();

        for (name, preset) in self.resolve(requirements, excluded)? {
            debug!(job = %job.name, requirement = %name, "Applying requirement");
            merge_preset(job, name, preset)?;
            for secret in &preset.secrets {
                if !secrets.contains(secret) {
                    secrets.push(secret.clone());
                }
            }
        }

        if !secrets.is_empty() {
            inject_secrets(job, &secrets)?;
        }
        if self.auto_max_procs {
            for container in &mut job.spec.containers {
                inject_max_procs(container);
            }
        }
        Ok(())
    }
}

/// Merge one preset onto a job descriptor.
pub fn merge_preset(job: &mut JobBase, name: &str, preset: &RequirementPreset) -> Result<()> {
    for (key, value) in &preset.annotations {
        job.annotations.insert(key.clone(), value.clone());
    }
    for (key, value) in &preset.labels {
        job.labels.insert(key.clone(), value.clone());
    }

    let spec = &mut job.spec;
    for container in &mut spec.containers {
        container.args.extend(preset.args.iter().cloned());
        for var in &preset.env {
            if !container.has_env(&var.name) {
                container.env.push(var.clone());
            }
        }
        for mount in &preset.volume_mounts {
            if !container.has_mount_path(&mount.mount_path) {
                container.volume_mounts.push(mount.clone());
            }
        }
    }

    for volume in &preset.volumes {
        if !spec.volumes.iter().any(|v| v.name == volume.name) {
            spec.volumes.push(volume.clone());
        }
    }

    if let Some(overlay) = &preset.pod_spec {
        overlay_pod_spec(spec, overlay, name)?;
    }
    Ok(())
}

fn inject_secrets(job: &mut JobBase, secrets: &[Secret]) -> Result<()> {
    let containers = job.spec.containers.len();
    if containers != 1 {
        return Err(Error::SecretsRequireSingleContainer {
            job: job.name.clone(),
            containers,
        });
    }

    let value = serde_json::to_string(secrets)?;
    let container = &mut job.spec.containers[0];
    if container.has_env(SECRETS_ENV) {
        warn!(
            job = %job.name,
            env = SECRETS_ENV,
            "Job sets its own secrets variable, replacing it with the requirement secrets"
        );
        container.env.retain(|e| e.name != SECRETS_ENV);
    }
    container.env.push(EnvVar::new(SECRETS_ENV, value));
    Ok(())
}

/// Set `GOMAXPROCS` to the container's CPU limit rounded up to whole cores.
fn inject_max_procs(container: &mut Container) {
    if container.has_env(MAX_PROCS_ENV) {
        return;
    }
    let Some(millis) = container.resources.cpu_limit_millis() else {
        return;
    };
    if millis == 0 {
        return;
    }
    let procs = millis.div_ceil(1000);
    container
        .env
        .push(EnvVar::new(MAX_PROCS_ENV, procs.to_string()));
}
