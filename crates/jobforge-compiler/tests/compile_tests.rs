//! End-to-end compilation of authored documents.

use jobforge_compiler::{compile, output};
use jobforge_core::Error;
use jobforge_core::job::{JobGroup, TriggerType};
use jobforge_core::pod::EnvVar;
use jobforge_core::prowjob::{TESTGRID_ALERT_EMAIL, TESTGRID_DASHBOARD, TESTGRID_NUM_FAILURES};
use jobforge_core::settings::GlobalSettings;
use pretty_assertions::assert_eq;

const SETTINGS: &str = r#"
path_aliases:
  istio: istio.io
cluster: private
node_selector:
  testing: test-pool
testgrid_config:
  enabled: true
  alert_email: istio-oncall@example.com
  num_failures_to_alert: 3
annotations:
  owner: infra
resources:
  default:
    requests: {cpu: 500m, memory: 3Gi}
    limits: {cpu: 3, memory: 24Gi}
  lightweight:
    limits: {cpu: 1500m}
base_requirements: [cache]
auto_max_procs: true
requirement_presets:
  cache:
    volumes:
      - name: build-cache
        hostPath: {path: /var/tmp/prow/cache, type: DirectoryOrCreate}
    volume_mounts:
      - name: build-cache
        mountPath: /home/prow/go/pkg
  docker:
    labels:
      preset-docker: "true"
    env:
      - {name: DOCKER_IN_DOCKER_ENABLED, value: "true"}
  gcp:
    secrets:
      - name: release-token
        env: RELEASE_TOKEN
  sidecar:
    pod_spec:
      containers:
        - name: envoy
          image: envoyproxy/envoy:v1.20
"#;

const GROUP: &str = r#"
org: istio
repo: proxy
branches: [master, release-1.2]
image: gcr.io/istio-testing/build-tools-proxy:latest
env:
  - {name: BUILD_WITH_CONTAINER, value: "0"}
requirements: [docker]
matrix:
  arch: [amd64, arm64]
jobs:
  - name: unit-$(matrix.arch)
    command: [./prow/proxy-presubmit.sh, --arch=$(matrix.arch)]
    timeout: 4h
    types: [presubmit]
  - name: release
    types: [postsubmit, periodic]
    interval: 24h
    repos: [istio/test-infra@master]
    modifiers: [hidden]
    resources: lightweight
    requirements: [gcp]
    excluded_requirements: [docker]
"#;

fn load() -> (GlobalSettings, JobGroup) {
    let settings = serde_yaml::from_str(SETTINGS).expect("parse settings");
    let group = serde_yaml::from_str(GROUP).expect("parse group");
    (settings, group)
}

fn names(config: &jobforge_core::prowjob::JobConfig, kind: TriggerType) -> Vec<String> {
    config.bases(kind).iter().map(|b| b.name.clone()).collect()
}

#[test]
fn test_compiles_every_kind_and_branch() {
    let (settings, group) = load();

    let config = compile(&settings, &group).expect("compile");

    assert_eq!(
        names(&config, TriggerType::Presubmit),
        vec![
            "unit-amd64_proxy",
            "unit-arm64_proxy",
            "unit-amd64_proxy_release-1.2",
            "unit-arm64_proxy_release-1.2",
        ]
    );
    assert_eq!(
        names(&config, TriggerType::Postsubmit),
        vec!["release_proxy_postsubmit", "release_proxy_release-1.2_postsubmit"]
    );
    assert_eq!(names(&config, TriggerType::Periodic), vec!["release_proxy_periodic"]);
    assert_eq!(config.len(), 7);
}

#[test]
fn test_presubmit_descriptor() {
    let (settings, group) = load();

    let config = compile(&settings, &group).expect("compile");
    let presubmit = &config.presubmits["istio/proxy"][3];
    let base = &presubmit.base;
    let container = &base.spec.containers[0];

    assert_eq!(presubmit.branches, vec!["^release-1.2$"]);
    assert!(presubmit.always_run);
    assert_eq!(base.cluster.as_deref(), Some("private"));
    assert_eq!(base.path_alias.as_deref(), Some("istio.io/proxy"));
    assert_eq!(base.annotations["owner"], "infra");
    assert_eq!(base.annotations[TESTGRID_DASHBOARD], "istio_release-1.2_proxy");
    assert!(!base.annotations.contains_key(TESTGRID_ALERT_EMAIL));
    assert_eq!(base.labels["preset-docker"], "true");
    assert_eq!(base.spec.node_selector["testing"], "test-pool");
    assert_eq!(base.spec.volumes[0].name, "build-cache");

    assert_eq!(
        container.command,
        vec!["./prow/proxy-presubmit.sh", "--arch=arm64"]
    );
    assert_eq!(container.volume_mounts[0].mount_path, "/home/prow/go/pkg");
    assert_eq!(
        container.env,
        vec![
            EnvVar::new("BUILD_WITH_CONTAINER", "0"),
            EnvVar::new("DOCKER_IN_DOCKER_ENABLED", "true"),
            EnvVar::new("GOMAXPROCS", "3"),
        ]
    );
}

#[test]
fn test_postsubmit_and_periodic_descriptors() {
    let (settings, group) = load();

    let config = compile(&settings, &group).expect("compile");
    let postsubmit = &config.postsubmits["istio/proxy"][0];
    let periodic = &config.periodics[0];

    assert!(postsubmit.skip_report);
    assert_eq!(
        postsubmit.base.annotations[TESTGRID_DASHBOARD],
        "istio_proxy_postsubmit"
    );
    assert_eq!(
        postsubmit.base.annotations[TESTGRID_ALERT_EMAIL],
        "istio-oncall@example.com"
    );
    assert_eq!(postsubmit.base.annotations[TESTGRID_NUM_FAILURES], "3");
    // docker is excluded on this job.
    assert!(!postsubmit.base.labels.contains_key("preset-docker"));

    let env = &periodic.base.spec.containers[0].env;
    assert_eq!(env[0], EnvVar::new("BUILD_WITH_CONTAINER", "0"));
    assert_eq!(
        env[1],
        EnvVar::new("GCP_SECRETS", r#"[{"name":"release-token","env":"RELEASE_TOKEN"}]"#)
    );
    assert_eq!(env[2], EnvVar::new("GOMAXPROCS", "2"));
    assert_eq!(periodic.interval.as_deref(), Some("24h"));
    assert_eq!(periodic.base.extra_refs[0].path_alias.as_deref(), Some("istio.io/test-infra"));
    assert_eq!(periodic.base.path_alias, None);
}

#[test]
fn test_secrets_with_sidecar_fail() {
    let (settings, mut group) = load();
    group.jobs[1].requirements.push("sidecar".to_string());

    let err = compile(&settings, &group).expect_err("two containers");

    match err {
        Error::SecretsRequireSingleContainer { job, containers } => {
            assert_eq!(job, "release_proxy_postsubmit");
            assert_eq!(containers, 2);
        }
        other => panic!("unexpected error: {}", other),
    }
}

#[test]
fn test_unknown_requirement_aborts() {
    let (settings, mut group) = load();
    group.requirements.push("gpu".to_string());

    let err = compile(&settings, &group).expect_err("unknown requirement");

    assert!(matches!(err, Error::UnknownRequirements(missing) if missing == vec!["gpu".to_string()]));
}

#[test]
fn test_compilation_is_deterministic() {
    let (settings, group) = load();

    let first = output::render(&settings, &compile(&settings, &group).expect("compile"))
        .expect("render");
    let second = output::render(&settings, &compile(&settings, &group).expect("compile"))
        .expect("render");

    assert_eq!(first, second);
    assert!(first.starts_with("# THIS FILE IS AUTOGENERATED"));
}
