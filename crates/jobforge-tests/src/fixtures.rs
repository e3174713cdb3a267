//! Test fixtures for creating sample documents.

use jobforge_core::job::{JobGroup, JobTemplate};
use jobforge_core::pod::{EnvVar, Quantity, ResourceRequirements, Volume, VolumeMount};
use jobforge_core::preset::{RequirementPreset, Secret};
use jobforge_core::settings::{GlobalSettings, TestgridConfig};
use std::collections::BTreeMap;

/// Factory for global settings.
pub struct SettingsFixture;

impl SettingsFixture {
    /// Settings with nothing configured beyond the defaults.
    pub fn minimal() -> GlobalSettings {
        GlobalSettings::default()
    }

    /// Settings resembling a real deployment: path aliases, testgrid,
    /// resource profiles and a handful of presets.
    pub fn istio() -> GlobalSettings {
        let mut settings = GlobalSettings {
            path_aliases: BTreeMap::from([("istio".to_string(), "istio.io".to_string())]),
            node_selector: BTreeMap::from([("testing".to_string(), "test-pool".to_string())]),
            testgrid_config: TestgridConfig {
                enabled: true,
                alert_email: Some("istio-oncall@example.com".to_string()),
                num_failures_to_alert: Some(1),
            },
            resources: BTreeMap::from([
                ("default".to_string(), Self::profile("500m", "3")),
                ("lightweight".to_string(), Self::profile("100m", "1500m")),
            ]),
            base_requirements: vec!["cache".to_string()],
            auto_max_procs: true,
            ..Default::default()
        };

        settings
            .requirement_presets
            .insert("cache", PresetFixture::cache());
        settings
            .requirement_presets
            .insert("docker", PresetFixture::docker());
        settings
            .requirement_presets
            .insert("gcp", PresetFixture::gcp());
        settings
    }

    fn profile(request: &str, limit: &str) -> ResourceRequirements {
        ResourceRequirements {
            requests: BTreeMap::from([("cpu".to_string(), Quantity::new(request))]),
            limits: BTreeMap::from([("cpu".to_string(), Quantity::new(limit))]),
        }
    }
}

/// Factory for requirement presets.
pub struct PresetFixture;

impl PresetFixture {
    pub fn cache() -> RequirementPreset {
        RequirementPreset {
            volumes: vec![Volume {
                name: "build-cache".to_string(),
                source: BTreeMap::from([(
                    "hostPath".to_string(),
                    serde_json::json!({"path": "/var/tmp/prow/cache"}),
                )]),
            }],
            volume_mounts: vec![VolumeMount {
                name: "build-cache".to_string(),
                mount_path: "/home/prow/go/pkg".to_string(),
                ..Default::default()
            }],
            ..Default::default()
        }
    }

    pub fn docker() -> RequirementPreset {
        RequirementPreset {
            labels: BTreeMap::from([("preset-docker".to_string(), "true".to_string())]),
            env: vec![EnvVar::new("DOCKER_IN_DOCKER_ENABLED", "true")],
            ..Default::default()
        }
    }

    pub fn gcp() -> RequirementPreset {
        RequirementPreset {
            secrets: vec![Secret {
                name: "release-token".to_string(),
                env: Some("RELEASE_TOKEN".to_string()),
                ..Default::default()
            }],
            ..Default::default()
        }
    }
}

/// Factory for job groups.
pub struct GroupFixture;

impl GroupFixture {
    /// A group with one job of each kind, a matrix and two branches.
    pub fn istio() -> JobGroup {
        JobGroup {
            org: "istio".to_string(),
            repo: "istio".to_string(),
            branches: vec!["master".to_string(), "release-1.12".to_string()],
            image: "gcr.io/istio-testing/build-tools:master-latest".to_string(),
            support_release_branching: true,
            requirements: vec!["docker".to_string()],
            matrix: BTreeMap::from([(
                "k8s".to_string(),
                vec!["1.21".to_string(), "1.22".to_string()],
            )]),
            jobs: vec![
                JobFixture::presubmit("unit"),
                JobTemplate {
                    name: "integ-k8s-$(matrix.k8s)".to_string(),
                    command: vec![
                        "prow/integ-suite-kind.sh".to_string(),
                        "--node-image".to_string(),
                        "kindest/node:v$(matrix.k8s)".to_string(),
                    ],
                    types: vec!["presubmit".to_string()],
                    regex: Some(r"^(pkg|tests)/".to_string()),
                    timeout: Some("2h".to_string()),
                    ..Default::default()
                },
                JobTemplate {
                    name: "release".to_string(),
                    command: vec!["prow/release-commit.sh".to_string()],
                    types: vec!["postsubmit".to_string()],
                    requirements: vec!["gcp".to_string()],
                    excluded_requirements: vec!["docker".to_string()],
                    resources: Some("lightweight".to_string()),
                    disable_release_branching: true,
                    ..Default::default()
                },
                JobFixture::periodic("nightly", "0 4 * * *"),
            ],
            ..Default::default()
        }
    }
}

/// Factory for single jobs.
pub struct JobFixture;

impl JobFixture {
    pub fn presubmit(name: &str) -> JobTemplate {
        JobTemplate {
            name: name.to_string(),
            command: vec!["make".to_string(), name.to_string()],
            types: vec!["presubmit".to_string()],
            ..Default::default()
        }
    }

    pub fn periodic(name: &str, cron: &str) -> JobTemplate {
        JobTemplate {
            name: name.to_string(),
            command: vec!["make".to_string(), name.to_string()],
            types: vec!["periodic".to_string()],
            cron: Some(cron.to_string()),
            ..Default::default()
        }
    }
}
