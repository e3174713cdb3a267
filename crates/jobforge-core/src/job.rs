//! Job-group documents.
//!
//! These types represent the user-authored job YAML: one [`JobGroup`] per
//! repository, each declaring any number of [`JobTemplate`]s.

use crate::load;
use crate::pod::{EnvVar, ResourceRequirements};
use crate::preset::PresetStore;
use crate::settings::GlobalSettings;
use crate::{DEFAULT_BRANCH, Error, Result};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// All jobs for one repository.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct JobGroup {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub jobs: Vec<JobTemplate>,
    #[serde(default)]
    pub repo: String,
    #[serde(default)]
    pub org: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub branches: Vec<String>,
    /// Axis name -> substitution values for `$(matrix.<axis>)`.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub matrix: BTreeMap<String, Vec<String>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<EnvVar>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub image: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_pull_policy: Option<String>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub support_release_branching: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub node_selector: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub resources: BTreeMap<String, ResourceRequirements>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub requirements: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub excluded_requirements: Vec<String>,
    #[serde(default, skip_serializing_if = "PresetStore::is_empty")]
    pub requirement_presets: PresetStore,
}

fn is_false(value: &bool) -> bool {
    !*value
}

impl JobGroup {
    /// Load a job group from a YAML file. Branches default to `master`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let mut group: JobGroup = load::read_yaml(path.as_ref())?;
        if group.branches.is_empty() {
            group.branches = vec![DEFAULT_BRANCH.to_string()];
        }
        Ok(group)
    }

    /// `org/repo`.
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.org, self.repo)
    }

    /// Target branches, falling back to `master` when none are declared.
    pub fn target_branches(&self) -> Vec<String> {
        if self.branches.is_empty() {
            vec![DEFAULT_BRANCH.to_string()]
        } else {
            self.branches.clone()
        }
    }

    /// Global resource profiles overlaid by this group's; local wins.
    pub fn effective_resources(
        &self,
        settings: &GlobalSettings,
    ) -> BTreeMap<String, ResourceRequirements> {
        let mut resources = settings.resources.clone();
        for (name, profile) in &self.resources {
            resources.insert(name.clone(), profile.clone());
        }
        resources
    }

    /// Global presets overlaid by this group's; local wins.
    pub fn effective_presets(&self, settings: &GlobalSettings) -> PresetStore {
        settings.requirement_presets.layered(&self.requirement_presets)
    }
}

/// One declared job, possibly parameterized by matrix placeholders.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct JobTemplate {
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub command: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<EnvVar>,
    /// Trigger types; empty means presubmit and postsubmit.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub types: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<String>,
    /// Extra repositories to check out, `org/repo[@branch]`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub repos: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_pull_policy: Option<String>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub disable_release_branching: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cron: Option<String>,
    /// Changed-path regex restricting when the job triggers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub regex: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_concurrency: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub node_selector: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    /// Resource profile name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub modifiers: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub requirements: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub excluded_requirements: Vec<String>,
}

impl JobTemplate {
    /// Parsed trigger types, defaulting to presubmit and postsubmit.
    pub fn trigger_types(&self) -> Result<Vec<TriggerType>> {
        if self.types.is_empty() {
            return Ok(vec![TriggerType::Presubmit, TriggerType::Postsubmit]);
        }
        self.types.iter().map(|t| t.parse()).collect()
    }

    pub fn parsed_modifiers(&self) -> Result<Vec<Modifier>> {
        self.modifiers.iter().map(|m| m.parse()).collect()
    }

    pub fn parsed_repos(&self) -> Result<Vec<RepoRef>> {
        self.repos.iter().map(|r| r.parse()).collect()
    }
}

/// The kind of a compiled job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum TriggerType {
    Presubmit,
    Postsubmit,
    Periodic,
}

impl TriggerType {
    pub const ALL: [TriggerType; 3] = [
        TriggerType::Presubmit,
        TriggerType::Postsubmit,
        TriggerType::Periodic,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerType::Presubmit => "presubmit",
            TriggerType::Postsubmit => "postsubmit",
            TriggerType::Periodic => "periodic",
        }
    }
}

impl fmt::Display for TriggerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TriggerType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        TriggerType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| Error::UnknownTriggerType(s.to_string()))
    }
}

/// Per-job flag altering default trigger or report behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Modifier {
    /// Do not report results.
    Hidden,
    /// Result does not block merging.
    Optional,
    /// Never triggered automatically.
    Skipped,
}

impl Modifier {
    pub const ALL: [Modifier; 3] = [Modifier::Hidden, Modifier::Optional, Modifier::Skipped];

    pub fn as_str(&self) -> &'static str {
        match self {
            Modifier::Hidden => "hidden",
            Modifier::Optional => "optional",
            Modifier::Skipped => "skipped",
        }
    }
}

impl fmt::Display for Modifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Modifier {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Modifier::ALL
            .into_iter()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| Error::UnknownModifier(s.to_string()))
    }
}

/// A repository reference, `org/repo` optionally pinned with `@branch`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoRef {
    pub org: String,
    pub repo: String,
    pub branch: Option<String>,
}

impl FromStr for RepoRef {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || Error::InvalidRepo(s.to_string());

        let (org_repo, branch) = match s.split_once('@') {
            Some((org_repo, branch)) if !branch.is_empty() => {
                (org_repo, Some(branch.to_string()))
            }
            Some(_) => return Err(invalid()),
            None => (s, None),
        };

        let parts: Vec<&str> = org_repo.split('/').collect();
        match parts.as_slice() {
            [org, repo] if !org.is_empty() && !repo.is_empty() => Ok(RepoRef {
                org: org.to_string(),
                repo: repo.to_string(),
                branch,
            }),
            _ => Err(invalid()),
        }
    }
}

impl fmt::Display for RepoRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.org, self.repo)?;
        if let Some(branch) = &self.branch {
            write!(f, "@{}", branch)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_trigger_types() {
        let job = JobTemplate {
            name: "unit".to_string(),
            ..Default::default()
        };
        assert_eq!(
            job.trigger_types().unwrap(),
            vec![TriggerType::Presubmit, TriggerType::Postsubmit]
        );
    }

    #[test]
    fn test_unknown_trigger_type() {
        let job = JobTemplate {
            name: "unit".to_string(),
            types: vec!["nightly".to_string()],
            ..Default::default()
        };
        assert!(matches!(
            job.trigger_types(),
            Err(Error::UnknownTriggerType(t)) if t == "nightly"
        ));
    }

    #[test]
    fn test_modifier_parse() {
        assert_eq!("hidden".parse::<Modifier>().unwrap(), Modifier::Hidden);
        assert!("invisible".parse::<Modifier>().is_err());
    }

    #[test]
    fn test_repo_ref_parse() {
        let plain: RepoRef = "istio/test-infra".parse().unwrap();
        assert_eq!(plain.org, "istio");
        assert_eq!(plain.repo, "test-infra");
        assert_eq!(plain.branch, None);

        let pinned: RepoRef = "istio/tools@release-1.2".parse().unwrap();
        assert_eq!(pinned.branch.as_deref(), Some("release-1.2"));
        assert_eq!(pinned.to_string(), "istio/tools@release-1.2");

        assert!("istio".parse::<RepoRef>().is_err());
        assert!("istio/a/b".parse::<RepoRef>().is_err());
        assert!("istio/tools@".parse::<RepoRef>().is_err());
        assert!("/tools".parse::<RepoRef>().is_err());
    }

    #[test]
    fn test_group_yaml() {
        let yaml = r#"
org: istio
repo: istio
image: gcr.io/istio-testing/build-tools:latest
matrix:
  k8s: ["1.20", "1.21"]
jobs:
  - name: unit-tests
    command: [make, test]
  - name: integ-$(matrix.k8s)
    types: [periodic]
    cron: "0 */6 * * *"
    modifiers: [hidden]
"#;
        let group: JobGroup = serde_yaml::from_str(yaml).expect("parse");
        assert_eq!(group.full_name(), "istio/istio");
        assert_eq!(group.target_branches(), vec!["master".to_string()]);
        assert_eq!(group.matrix["k8s"].len(), 2);
        assert_eq!(group.jobs[1].cron.as_deref(), Some("0 */6 * * *"));
    }

    #[test]
    fn test_effective_resources_local_wins() {
        let settings = GlobalSettings {
            resources: BTreeMap::from([
                ("default".to_string(), ResourceRequirements::default()),
                (
                    "large".to_string(),
                    serde_yaml::from_str("limits: {cpu: 8}").unwrap(),
                ),
            ]),
            ..Default::default()
        };
        let group = JobGroup {
            resources: BTreeMap::from([(
                "large".to_string(),
                serde_yaml::from_str("limits: {cpu: 16}").unwrap(),
            )]),
            ..Default::default()
        };

        let resources = group.effective_resources(&settings);
        assert_eq!(resources.len(), 2);
        assert_eq!(resources["large"].cpu_limit_millis(), Some(16000));
    }
}
