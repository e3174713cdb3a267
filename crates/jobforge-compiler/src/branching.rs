//! Release-branch copies of job groups.

use jobforge_core::job::JobGroup;
use tracing::debug;

/// A copy of `group` targeting only `release`.
///
/// Only groups with `support_release_branching` are branched. Jobs that
/// set `disable_release_branching` are dropped, and the copy itself does
/// not branch again.
pub fn release_branch(group: &JobGroup, release: &str) -> Option<JobGroup> {
    if !group.support_release_branching {
        debug!(repo = %group.full_name(), "Release branching not supported, skipping");
        return None;
    }

    let mut branched = group.clone();
    branched.branches = vec![release.to_string()];
    branched.support_release_branching = false;
    branched.jobs.retain(|job| !job.disable_release_branching);

    debug!(
        repo = %group.full_name(),
        release = %release,
        jobs = branched.jobs.len(),
        "Created release branch job group"
    );
    Some(branched)
}
