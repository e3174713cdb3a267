//! Structural overlay of a partial pod spec onto a job's pod spec.
//!
//! The merge fills in what the target leaves unset and never overwrites a
//! populated field. List fields are concatenated; named entries
//! (containers, volumes) must not collide with different content.

use jobforge_core::pod::{Container, PodSpec, Volume};
use jobforge_core::{Error, Result};

/// Overlay `overlay` onto `target`. `requirement` names the preset the
/// overlay came from, for error messages.
pub fn overlay_pod_spec(target: &mut PodSpec, overlay: &PodSpec, requirement: &str) -> Result<()> {
    fill(&mut target.service_account_name, &overlay.service_account_name);
    fill(&mut target.priority_class_name, &overlay.priority_class_name);
    fill(&mut target.restart_policy, &overlay.restart_policy);
    fill(&mut target.dns_policy, &overlay.dns_policy);
    fill(&mut target.host_network, &overlay.host_network);
    fill(
        &mut target.termination_grace_period_seconds,
        &overlay.termination_grace_period_seconds,
    );

    for (key, value) in &overlay.node_selector {
        target
            .node_selector
            .entry(key.clone())
            .or_insert_with(|| value.clone());
    }

    for container in &overlay.containers {
        if let Some(name) = &container.name
            && let Some(existing) = find_container(&target.containers, name)
        {
            if existing != container {
                return Err(conflict(requirement, "container", name));
            }
            continue;
        }
        target.containers.push(container.clone());
    }

    for volume in &overlay.volumes {
        if let Some(existing) = find_volume(&target.volumes, &volume.name) {
            if existing != volume {
                return Err(conflict(requirement, "volume", &volume.name));
            }
            continue;
        }
        target.volumes.push(volume.clone());
    }

    target.tolerations.extend(overlay.tolerations.iter().cloned());
    Ok(())
}

fn fill<T: Clone>(target: &mut Option<T>, overlay: &Option<T>) {
    if target.is_none() {
        target.clone_from(overlay);
    }
}

fn find_container<'a>(containers: &'a [Container], name: &str) -> Option<&'a Container> {
    containers.iter().find(|c| c.name.as_deref() == Some(name))
}

fn find_volume<'a>(volumes: &'a [Volume], name: &str) -> Option<&'a Volume> {
    volumes.iter().find(|v| v.name == name)
}

fn conflict(requirement: &str, what: &str, name: &str) -> Error {
    Error::MergeConflict {
        requirement: requirement.to_string(),
        reason: format!("{} '{}' already exists with different content", what, name),
    }
}
