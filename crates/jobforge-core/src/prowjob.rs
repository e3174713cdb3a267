//! Scheduler-native job descriptors.
//!
//! The output of compilation: the document the CI scheduler reads, keyed by
//! trigger kind and repository.

use crate::job::TriggerType;
use crate::pod::PodSpec;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const TESTGRID_DASHBOARD: &str = "testgrid-dashboards";
pub const TESTGRID_ALERT_EMAIL: &str = "testgrid-alert-email";
pub const TESTGRID_NUM_FAILURES: &str = "testgrid-num-failures-to-alert";

/// A complete descriptor document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobConfig {
    /// `org/repo` -> presubmits.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub presubmits: BTreeMap<String, Vec<Presubmit>>,
    /// `org/repo` -> postsubmits.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub postsubmits: BTreeMap<String, Vec<Postsubmit>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub periodics: Vec<Periodic>,
}

impl JobConfig {
    pub fn is_empty(&self) -> bool {
        self.presubmits.is_empty() && self.postsubmits.is_empty() && self.periodics.is_empty()
    }

    /// Total number of descriptors across all kinds.
    pub fn len(&self) -> usize {
        self.presubmits.values().map(Vec::len).sum::<usize>()
            + self.postsubmits.values().map(Vec::len).sum::<usize>()
            + self.periodics.len()
    }

    /// Descriptors of one kind, flattened across repositories.
    pub fn bases(&self, kind: TriggerType) -> Vec<&JobBase> {
        match kind {
            TriggerType::Presubmit => self
                .presubmits
                .values()
                .flatten()
                .map(|p| &p.base)
                .collect(),
            TriggerType::Postsubmit => self
                .postsubmits
                .values()
                .flatten()
                .map(|p| &p.base)
                .collect(),
            TriggerType::Periodic => self.periodics.iter().map(|p| &p.base).collect(),
        }
    }
}

/// Fields shared by every descriptor kind.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobBase {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_concurrency: Option<u32>,
    #[serde(default)]
    pub decorate: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decoration_config: Option<DecorationConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path_alias: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extra_refs: Vec<Refs>,
    pub spec: PodSpec,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DecorationConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<String>,
}

/// A repository checked out alongside (or instead of) the triggering one.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Refs {
    pub org: String,
    pub repo: String,
    pub base_ref: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path_alias: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Presubmit {
    #[serde(flatten)]
    pub base: JobBase,
    #[serde(default)]
    pub always_run: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub optional: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub skip_report: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_if_changed: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub branches: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Postsubmit {
    #[serde(flatten)]
    pub base: JobBase,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub skip_report: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_if_changed: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub branches: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Periodic {
    #[serde(flatten)]
    pub base: JobBase,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cron: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_presubmit_yaml_shape() {
        let presubmit = Presubmit {
            base: JobBase {
                name: "unit-test_myrepo".to_string(),
                decorate: true,
                ..Default::default()
            },
            always_run: true,
            branches: vec!["^master$".to_string()],
            ..Default::default()
        };

        let yaml = serde_yaml::to_string(&presubmit).expect("serialize");
        assert!(yaml.starts_with("name: unit-test_myrepo\n"));
        assert!(yaml.contains("always_run: true"));
        // Unset flags are omitted from the document.
        assert!(!yaml.contains("optional"));
        assert!(!yaml.contains("skip_report"));

        let parsed: Presubmit = serde_yaml::from_str(&yaml).expect("deserialize");
        assert_eq!(parsed, presubmit);
    }

    #[test]
    fn test_bases_by_kind() {
        let mut config = JobConfig::default();
        config.presubmits.insert(
            "org/repo".to_string(),
            vec![Presubmit::default(), Presubmit::default()],
        );
        config.periodics.push(Periodic::default());

        assert_eq!(config.len(), 3);
        assert_eq!(config.bases(TriggerType::Presubmit).len(), 2);
        assert_eq!(config.bases(TriggerType::Postsubmit).len(), 0);
        assert_eq!(config.bases(TriggerType::Periodic).len(), 1);
    }
}
