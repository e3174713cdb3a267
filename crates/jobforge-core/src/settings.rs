//! Process-wide generator settings.

use crate::Result;
use crate::load;
use crate::pod::ResourceRequirements;
use crate::preset::PresetStore;
use schemars::JsonSchema;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

pub const DEFAULT_AUTOGEN_HEADER: &str = "# THIS FILE IS AUTOGENERATED, DO NOT EDIT IT MANUALLY.";

/// Defaults shared by every job group. Loaded once and never mutated
/// during a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default, deny_unknown_fields)]
pub struct GlobalSettings {
    /// Banner written at the top of every generated file.
    pub autogen_header: String,
    /// org -> path alias, e.g. `istio -> istio.io`.
    pub path_aliases: BTreeMap<String, String>,
    pub cluster: Option<String>,
    pub node_selector: BTreeMap<String, String>,
    pub testgrid_config: TestgridConfig,
    pub annotations: BTreeMap<String, String>,
    pub labels: BTreeMap<String, String>,
    pub resources: BTreeMap<String, ResourceRequirements>,
    /// Requirements applied to every job.
    pub base_requirements: Vec<String>,
    pub requirement_presets: PresetStore,
    /// Inject `GOMAXPROCS` derived from each container's CPU limit.
    pub auto_max_procs: bool,
}

impl Default for GlobalSettings {
    fn default() -> Self {
        Self {
            autogen_header: DEFAULT_AUTOGEN_HEADER.to_string(),
            path_aliases: BTreeMap::new(),
            cluster: None,
            node_selector: BTreeMap::new(),
            testgrid_config: TestgridConfig::default(),
            annotations: BTreeMap::new(),
            labels: BTreeMap::new(),
            resources: BTreeMap::new(),
            base_requirements: Vec::new(),
            requirement_presets: PresetStore::new(),
            auto_max_procs: false,
        }
    }
}

impl GlobalSettings {
    /// Load settings from a YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        load::read_yaml(path.as_ref())
    }

    /// Header banner, always newline-terminated.
    pub fn header(&self) -> String {
        if self.autogen_header.is_empty() || self.autogen_header.ends_with('\n') {
            self.autogen_header.clone()
        } else {
            format!("{}\n", self.autogen_header)
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default, deny_unknown_fields)]
pub struct TestgridConfig {
    pub enabled: bool,
    pub alert_email: Option<String>,
    /// Written either as a number or a quoted number.
    #[serde(deserialize_with = "failure_count")]
    #[schemars(with = "Option<u32>")]
    pub num_failures_to_alert: Option<u32>,
}

fn failure_count<'de, D>(deserializer: D) -> std::result::Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Count(u32),
        Text(String),
    }

    match Option::<Repr>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Repr::Count(n)) => Ok(Some(n)),
        Some(Repr::Text(text)) => text.trim().parse().map(Some).map_err(|_| {
            serde::de::Error::custom(format!(
                "num_failures_to_alert must be a non-negative integer, got {:?}",
                text
            ))
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_applied() {
        let settings: GlobalSettings = serde_yaml::from_str("cluster: build\n").expect("parse");
        assert_eq!(settings.autogen_header, DEFAULT_AUTOGEN_HEADER);
        assert_eq!(settings.cluster.as_deref(), Some("build"));
        assert!(!settings.auto_max_procs);
        assert!(!settings.testgrid_config.enabled);
    }

    #[test]
    fn test_header_newline() {
        let settings = GlobalSettings::default();
        assert_eq!(settings.header(), format!("{}\n", DEFAULT_AUTOGEN_HEADER));

        let custom = GlobalSettings {
            autogen_header: "# generated\n# do not edit\n".to_string(),
            ..Default::default()
        };
        assert_eq!(custom.header(), "# generated\n# do not edit\n");
    }

    #[test]
    fn test_num_failures_number_or_string() {
        let parse = |yaml: &str| -> Option<u32> {
            let settings: GlobalSettings = serde_yaml::from_str(yaml).expect("parse");
            settings.testgrid_config.num_failures_to_alert
        };

        assert_eq!(parse("testgrid_config: {num_failures_to_alert: 3}\n"), Some(3));
        assert_eq!(parse("testgrid_config: {num_failures_to_alert: \"3\"}\n"), Some(3));
        assert_eq!(parse("testgrid_config: {enabled: true}\n"), None);

        let result: std::result::Result<GlobalSettings, _> =
            serde_yaml::from_str("testgrid_config: {num_failures_to_alert: often}\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_unknown_field_rejected() {
        let result: std::result::Result<GlobalSettings, _> =
            serde_yaml::from_str("clutser: build\n");
        assert!(result.is_err());
    }
}
