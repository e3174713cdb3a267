//! Job compilation.
//!
//! Turns one job group into scheduler descriptors: every matrix-expanded
//! job is compiled once per target branch for presubmits and postsubmits,
//! and once for periodics. Settings are inherited global < group < job.

use crate::matrix::MatrixExpander;
use crate::merge::{merge_env, most_specific, overlay_maps};
use crate::requirements::RequirementResolver;
use jobforge_core::job::{JobGroup, JobTemplate, Modifier, TriggerType};
use jobforge_core::pod::{Container, PodSpec, ResourceRequirements, SecurityContext};
use jobforge_core::preset::PresetStore;
use jobforge_core::prowjob::{
    DecorationConfig, JobBase, JobConfig, Periodic, Postsubmit, Presubmit, Refs,
    TESTGRID_ALERT_EMAIL, TESTGRID_DASHBOARD, TESTGRID_NUM_FAILURES,
};
use jobforge_core::settings::GlobalSettings;
use jobforge_core::{DEFAULT_BRANCH, DEFAULT_RESOURCE, Error, Result};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info};

/// Compiles a single job group against the global settings.
pub struct JobCompiler<'a> {
    settings: &'a GlobalSettings,
    group: &'a JobGroup,
    presets: PresetStore,
    resources: BTreeMap<String, ResourceRequirements>,
}

impl<'a> JobCompiler<'a> {
    pub fn new(settings: &'a GlobalSettings, group: &'a JobGroup) -> Self {
        Self {
            settings,
            group,
            presets: group.effective_presets(settings),
            resources: group.effective_resources(settings),
        }
    }

    /// Compile the whole group. Any error aborts compilation; partial
    /// output is never returned.
    pub fn compile(&self) -> Result<JobConfig> {
        let expander = MatrixExpander::new(&self.group.matrix);
        let mut jobs: Vec<(JobTemplate, Vec<TriggerType>)> = Vec::new();
        for template in &self.group.jobs {
            for job in expander.expand(template)? {
                let types = job.trigger_types()?;
                jobs.push((job, types));
            }
        }

        let branches = self.group.target_branches();
        let mut presubmits = Vec::new();
        let mut postsubmits = Vec::new();
        let mut periodics = Vec::new();

        for branch in &branches {
            for (job, types) in &jobs {
                if types.contains(&TriggerType::Presubmit) {
                    presubmits.push(self.presubmit(job, branch)?);
                }
                if types.contains(&TriggerType::Postsubmit) {
                    postsubmits.push(self.postsubmit(job, branch)?);
                }
            }
        }

        // Periodics do not fan out per branch.
        let first_branch = branches.first().map(String::as_str).unwrap_or(DEFAULT_BRANCH);
        for (job, types) in &jobs {
            if types.contains(&TriggerType::Periodic) {
                periodics.push(self.periodic(job, first_branch)?);
            }
        }

        ensure_unique(TriggerType::Presubmit, presubmits.iter().map(|p| &p.base))?;
        ensure_unique(TriggerType::Postsubmit, postsubmits.iter().map(|p| &p.base))?;
        ensure_unique(TriggerType::Periodic, periodics.iter().map(|p| &p.base))?;

        info!(
            repo = %self.group.full_name(),
            presubmits = presubmits.len(),
            postsubmits = postsubmits.len(),
            periodics = periodics.len(),
            "Compiled job group"
        );

        let mut config = JobConfig {
            periodics,
            ..Default::default()
        };
        if !presubmits.is_empty() {
            config.presubmits.insert(self.group.full_name(), presubmits);
        }
        if !postsubmits.is_empty() {
            config.postsubmits.insert(self.group.full_name(), postsubmits);
        }
        Ok(config)
    }

    fn presubmit(&self, job: &JobTemplate, branch: &str) -> Result<Presubmit> {
        let name = self.job_name(job, branch);
        let mut base = self.job_base(job, name, branch)?;
        base.path_alias = self.path_alias();
        if self.settings.testgrid_config.enabled {
            base.annotations
                .insert(TESTGRID_DASHBOARD.to_string(), self.dashboard(branch));
        }

        let run_if_changed = non_empty(&job.regex);
        let mut presubmit = Presubmit {
            base,
            always_run: run_if_changed.is_none(),
            run_if_changed,
            branches: vec![branch_matcher(branch)],
            ..Default::default()
        };
        for modifier in job.parsed_modifiers()? {
            match modifier {
                Modifier::Optional => presubmit.optional = true,
                Modifier::Hidden => presubmit.skip_report = true,
                Modifier::Skipped => presubmit.always_run = false,
            }
        }

        self.apply_requirements(job, &mut presubmit.base)?;
        Ok(presubmit)
    }

    fn postsubmit(&self, job: &JobTemplate, branch: &str) -> Result<Postsubmit> {
        let name = format!("{}_postsubmit", self.job_name(job, branch));
        let mut base = self.job_base(job, name, branch)?;
        base.path_alias = self.path_alias();
        if self.settings.testgrid_config.enabled {
            self.alerting_annotations(&mut base, format!("{}_postsubmit", self.dashboard(branch)));
        }

        let mut postsubmit = Postsubmit {
            base,
            run_if_changed: non_empty(&job.regex),
            branches: vec![branch_matcher(branch)],
            ..Default::default()
        };
        for modifier in job.parsed_modifiers()? {
            match modifier {
                Modifier::Hidden => postsubmit.skip_report = true,
                Modifier::Optional | Modifier::Skipped => {
                    debug!(
                        job = %postsubmit.base.name,
                        modifier = %modifier,
                        "Modifier does not apply to postsubmits, ignoring"
                    );
                }
            }
        }

        self.apply_requirements(job, &mut postsubmit.base)?;
        Ok(postsubmit)
    }

    fn periodic(&self, job: &JobTemplate, branch: &str) -> Result<Periodic> {
        let name = format!("{}_periodic", self.job_name(job, branch));

        // Without extra repos, a periodic checks out its own repository.
        let mut job = job.clone();
        if job.repos.is_empty() {
            job.repos = vec![self.group.full_name()];
        }

        let mut base = self.job_base(&job, name, branch)?;
        if self.settings.testgrid_config.enabled {
            self.alerting_annotations(&mut base, format!("{}_periodic", self.dashboard(branch)));
        }

        let mut periodic = Periodic {
            base,
            cron: non_empty(&job.cron),
            interval: non_empty(&job.interval),
        };
        self.apply_requirements(&job, &mut periodic.base)?;
        Ok(periodic)
    }

    /// `<job>_<repo>`, suffixed with the branch unless it is the default.
    fn job_name(&self, job: &JobTemplate, branch: &str) -> String {
        if branch == DEFAULT_BRANCH {
            format!("{}_{}", job.name, self.group.repo)
        } else {
            format!("{}_{}_{}", job.name, self.group.repo, branch)
        }
    }

    /// Testgrid dashboard name: `<org>[_<branch>]_<repo>`.
    fn dashboard(&self, branch: &str) -> String {
        if branch == DEFAULT_BRANCH {
            format!("{}_{}", self.group.org, self.group.repo)
        } else {
            format!("{}_{}_{}", self.group.org, branch, self.group.repo)
        }
    }

    fn alerting_annotations(&self, base: &mut JobBase, dashboard: String) {
        let testgrid = &self.settings.testgrid_config;
        base.annotations
            .insert(TESTGRID_DASHBOARD.to_string(), dashboard);
        if let Some(email) = &testgrid.alert_email {
            base.annotations
                .insert(TESTGRID_ALERT_EMAIL.to_string(), email.clone());
        }
        if let Some(failures) = testgrid.num_failures_to_alert {
            base.annotations
                .insert(TESTGRID_NUM_FAILURES.to_string(), failures.to_string());
        }
    }

    fn path_alias(&self) -> Option<String> {
        self.settings
            .path_aliases
            .get(&self.group.org)
            .map(|alias| format!("{}/{}", alias, self.group.repo))
    }

    fn job_base(&self, job: &JobTemplate, name: String, branch: &str) -> Result<JobBase> {
        let settings = self.settings;
        let group = self.group;

        let node_selector = most_specific([
            Some(&settings.node_selector),
            Some(&group.node_selector),
            Some(&job.node_selector),
        ])
        .cloned()
        .unwrap_or_default();

        let cluster = [
            settings.cluster.as_deref(),
            group.cluster.as_deref(),
            job.cluster.as_deref(),
        ]
        .into_iter()
        .flatten()
        .filter(|c| !c.is_empty() && *c != "default")
        .last()
        .map(str::to_string);

        let extra_refs = job
            .parsed_repos()?
            .into_iter()
            .map(|repo| Refs {
                path_alias: settings
                    .path_aliases
                    .get(&repo.org)
                    .map(|alias| format!("{}/{}", alias, repo.repo)),
                base_ref: repo.branch.unwrap_or_else(|| branch.to_string()),
                org: repo.org,
                repo: repo.repo,
            })
            .collect();

        Ok(JobBase {
            name,
            cluster,
            labels: overlay_maps([&settings.labels, &group.labels, &job.labels]),
            annotations: overlay_maps([
                &settings.annotations,
                &group.annotations,
                &job.annotations,
            ]),
            max_concurrency: job.max_concurrency.filter(|n| *n > 0),
            decorate: true,
            decoration_config: non_empty(&job.timeout).map(|timeout| DecorationConfig {
                timeout: Some(timeout),
            }),
            path_alias: None,
            extra_refs,
            spec: PodSpec {
                containers: vec![self.container(job)?],
                node_selector,
                ..Default::default()
            },
        })
    }

    fn container(&self, job: &JobTemplate) -> Result<Container> {
        let group = self.group;

        let image = most_specific([Some(group.image.as_str()), job.image.as_deref()])
            .unwrap_or_default()
            .to_string();
        let image_pull_policy = most_specific([
            group.image_pull_policy.as_deref(),
            job.image_pull_policy.as_deref(),
        ])
        .map(str::to_string);

        let profile = job.resources.as_deref().unwrap_or(DEFAULT_RESOURCE);
        let resources = match self.resources.get(profile) {
            Some(resources) => resources.clone(),
            None if job.resources.is_some() => {
                return Err(Error::UnknownResource {
                    job: job.name.clone(),
                    resource: profile.to_string(),
                });
            }
            None => ResourceRequirements::default(),
        };

        Ok(Container {
            image,
            image_pull_policy,
            command: job.command.clone(),
            env: merge_env(&job.env, &group.env),
            resources,
            security_context: Some(SecurityContext {
                privileged: Some(true),
                ..Default::default()
            }),
            ..Default::default()
        })
    }

    fn apply_requirements(&self, job: &JobTemplate, base: &mut JobBase) -> Result<()> {
        let mut requirements: Vec<String> = Vec::new();
        for name in self
            .settings
            .base_requirements
            .iter()
            .chain(&job.requirements)
            .chain(&self.group.requirements)
        {
            if !requirements.contains(name) {
                requirements.push(name.clone());
            }
        }

        let mut excluded = job.excluded_requirements.clone();
        for name in &self.group.excluded_requirements {
            if !excluded.contains(name) {
                excluded.push(name.clone());
            }
        }

        RequirementResolver::new(&self.presets, self.settings.auto_max_procs).apply(
            base,
            &requirements,
            &excluded,
        )
    }
}

fn branch_matcher(branch: &str) -> String {
    format!("^{}$", branch)
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value.clone().filter(|v| !v.is_empty())
}

fn ensure_unique<'j>(kind: TriggerType, bases: impl Iterator<Item = &'j JobBase>) -> Result<()> {
    let mut seen = BTreeSet::new();
    for base in bases {
        if !seen.insert(base.name.as_str()) {
            return Err(Error::DuplicateJob {
                kind,
                name: base.name.clone(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use jobforge_core::pod::{EnvVar, Quantity};
    use jobforge_core::preset::RequirementPreset;
    use jobforge_core::settings::TestgridConfig;
    use pretty_assertions::assert_eq;

    fn settings() -> GlobalSettings {
        let mut settings = GlobalSettings {
            path_aliases: BTreeMap::from([("istio".to_string(), "istio.io".to_string())]),
            cluster: Some("default".to_string()),
            labels: BTreeMap::from([("a".to_string(), "1".to_string())]),
            resources: BTreeMap::from([(
                "default".to_string(),
                ResourceRequirements {
                    limits: BTreeMap::from([("cpu".to_string(), Quantity::new("3"))]),
                    ..Default::default()
                },
            )]),
            ..Default::default()
        };
        settings.requirement_presets.insert(
            "cache",
            RequirementPreset {
                labels: BTreeMap::from([("preset-cache".to_string(), "true".to_string())]),
                ..Default::default()
            },
        );
        settings
    }

    fn group(jobs: Vec<JobTemplate>) -> JobGroup {
        JobGroup {
            org: "istio".to_string(),
            repo: "proxy".to_string(),
            branches: vec!["master".to_string()],
            image: "gcr.io/istio-testing/build-tools:latest".to_string(),
            labels: BTreeMap::from([
                ("a".to_string(), "2".to_string()),
                ("b".to_string(), "2".to_string()),
            ]),
            jobs,
            ..Default::default()
        }
    }

    fn job(name: &str, types: &[&str]) -> JobTemplate {
        JobTemplate {
            name: name.to_string(),
            command: vec!["make".to_string(), name.to_string()],
            types: types.iter().map(|t| t.to_string()).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_default_types_and_naming() {
        let settings = settings();
        let mut group = group(vec![job("unit", &[])]);
        group.branches = vec!["master".to_string(), "release-1.4".to_string()];

        let config = JobCompiler::new(&settings, &group).compile().unwrap();

        let presubmits: Vec<&str> = config
            .bases(TriggerType::Presubmit)
            .iter()
            .map(|b| b.name.as_str())
            .collect();
        let postsubmits: Vec<&str> = config
            .bases(TriggerType::Postsubmit)
            .iter()
            .map(|b| b.name.as_str())
            .collect();
        assert_eq!(presubmits, vec!["unit_proxy", "unit_proxy_release-1.4"]);
        assert_eq!(
            postsubmits,
            vec!["unit_proxy_postsubmit", "unit_proxy_release-1.4_postsubmit"]
        );
        assert!(config.periodics.is_empty());

        let presubmit = &config.presubmits["istio/proxy"][1];
        assert_eq!(presubmit.branches, vec!["^release-1.4$"]);
        assert!(presubmit.always_run);
        assert_eq!(presubmit.base.path_alias.as_deref(), Some("istio.io/proxy"));
    }

    #[test]
    fn test_job_base_inheritance() {
        let settings = settings();
        let mut unit = job("unit", &["presubmit"]);
        unit.labels = BTreeMap::from([("b".to_string(), "3".to_string())]);
        unit.timeout = Some("2h".to_string());
        unit.max_concurrency = Some(0);
        let group = group(vec![unit]);

        let config = JobCompiler::new(&settings, &group).compile().unwrap();
        let base = &config.presubmits["istio/proxy"][0].base;

        assert_eq!(
            base.labels,
            BTreeMap::from([
                ("a".to_string(), "2".to_string()),
                ("b".to_string(), "3".to_string()),
            ])
        );
        assert_eq!(base.cluster, None);
        assert_eq!(base.max_concurrency, None);
        assert!(base.decorate);
        assert_eq!(
            base.decoration_config,
            Some(DecorationConfig {
                timeout: Some("2h".to_string())
            })
        );

        let container = &base.spec.containers[0];
        assert_eq!(container.image, "gcr.io/istio-testing/build-tools:latest");
        assert_eq!(container.resources.cpu_limit_millis(), Some(3000));
        assert_eq!(
            container.security_context.as_ref().and_then(|s| s.privileged),
            Some(true)
        );
    }

    #[test]
    fn test_env_merge_job_wins() {
        let settings = settings();
        let mut unit = job("unit", &["presubmit"]);
        unit.env = vec![EnvVar::new("MODE", "job")];
        let mut group = group(vec![unit]);
        group.env = vec![EnvVar::new("MODE", "group"), EnvVar::new("CI", "true")];

        let config = JobCompiler::new(&settings, &group).compile().unwrap();

        assert_eq!(
            config.presubmits["istio/proxy"][0].base.spec.containers[0].env,
            vec![EnvVar::new("MODE", "job"), EnvVar::new("CI", "true")]
        );
    }

    #[test]
    fn test_regex_and_modifiers() {
        let settings = settings();
        let mut lint = job("lint", &[]);
        lint.regex = Some(r"\.go$".to_string());
        lint.modifiers = vec!["optional".to_string(), "hidden".to_string()];
        let group = group(vec![lint]);

        let config = JobCompiler::new(&settings, &group).compile().unwrap();

        let presubmit = &config.presubmits["istio/proxy"][0];
        assert!(!presubmit.always_run);
        assert!(presubmit.optional);
        assert!(presubmit.skip_report);
        assert_eq!(presubmit.run_if_changed.as_deref(), Some(r"\.go$"));

        let postsubmit = &config.postsubmits["istio/proxy"][0];
        assert!(postsubmit.skip_report);
        assert_eq!(postsubmit.run_if_changed.as_deref(), Some(r"\.go$"));
    }

    #[test]
    fn test_skipped_presubmit_never_always_runs() {
        let settings = settings();
        let mut e2e = job("e2e", &["presubmit"]);
        e2e.modifiers = vec!["skipped".to_string()];
        let group = group(vec![e2e]);

        let config = JobCompiler::new(&settings, &group).compile().unwrap();

        assert!(!config.presubmits["istio/proxy"][0].always_run);
    }

    #[test]
    fn test_periodic_uses_first_branch_and_own_repo() {
        let mut settings = settings();
        settings.testgrid_config = TestgridConfig {
            enabled: true,
            alert_email: Some("oncall@example.com".to_string()),
            num_failures_to_alert: None,
        };
        let mut nightly = job("nightly", &["periodic"]);
        nightly.cron = Some("0 4 * * *".to_string());
        let mut group = group(vec![nightly]);
        group.branches = vec!["release-1.4".to_string(), "master".to_string()];

        let config = JobCompiler::new(&settings, &group).compile().unwrap();

        assert_eq!(config.periodics.len(), 1);
        let periodic = &config.periodics[0];
        assert_eq!(periodic.base.name, "nightly_proxy_release-1.4_periodic");
        assert_eq!(periodic.cron.as_deref(), Some("0 4 * * *"));
        assert_eq!(periodic.interval, None);
        assert_eq!(
            periodic.base.extra_refs,
            vec![Refs {
                org: "istio".to_string(),
                repo: "proxy".to_string(),
                base_ref: "release-1.4".to_string(),
                path_alias: Some("istio.io/proxy".to_string()),
            }]
        );
        assert_eq!(
            periodic.base.annotations[TESTGRID_DASHBOARD],
            "istio_release-1.4_proxy_periodic"
        );
        assert_eq!(periodic.base.annotations[TESTGRID_ALERT_EMAIL], "oncall@example.com");
        assert!(!periodic.base.annotations.contains_key(TESTGRID_NUM_FAILURES));
    }

    #[test]
    fn test_extra_refs_with_branch_pin() {
        let settings = settings();
        let mut unit = job("unit", &["presubmit"]);
        unit.repos = vec!["istio/tools@release-1.2".to_string(), "envoy/envoy".to_string()];
        let group = group(vec![unit]);

        let config = JobCompiler::new(&settings, &group).compile().unwrap();
        let refs = &config.presubmits["istio/proxy"][0].base.extra_refs;

        assert_eq!(refs[0].base_ref, "release-1.2");
        assert_eq!(refs[0].path_alias.as_deref(), Some("istio.io/tools"));
        assert_eq!(refs[1].base_ref, "master");
        assert_eq!(refs[1].path_alias, None);
    }

    #[test]
    fn test_requirements_applied() {
        let mut settings = settings();
        settings.base_requirements = vec!["cache".to_string()];
        let group = group(vec![job("unit", &["presubmit"])]);

        let config = JobCompiler::new(&settings, &group).compile().unwrap();

        assert_eq!(config.presubmits["istio/proxy"][0].base.labels["preset-cache"], "true");
    }

    #[test]
    fn test_group_exclusion_removes_base_requirement() {
        let mut settings = settings();
        settings.base_requirements = vec!["cache".to_string()];
        let mut group = group(vec![job("unit", &["presubmit"])]);
        group.excluded_requirements = vec!["cache".to_string()];

        let config = JobCompiler::new(&settings, &group).compile().unwrap();

        assert!(
            !config.presubmits["istio/proxy"][0]
                .base
                .labels
                .contains_key("preset-cache")
        );
    }

    #[test]
    fn test_unknown_resource_profile() {
        let settings = settings();
        let mut unit = job("unit", &["presubmit"]);
        unit.resources = Some("huge".to_string());
        let group = group(vec![unit]);

        let err = JobCompiler::new(&settings, &group).compile().unwrap_err();

        assert!(matches!(err, Error::UnknownResource { resource, .. } if resource == "huge"));
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let settings = settings();
        let group = group(vec![job("unit", &["presubmit"]), job("unit", &["presubmit"])]);

        let err = JobCompiler::new(&settings, &group).compile().unwrap_err();

        assert!(matches!(
            err,
            Error::DuplicateJob {
                kind: TriggerType::Presubmit,
                ..
            }
        ));
    }

    #[test]
    fn test_matrix_jobs_compiled() {
        let settings = settings();
        let mut group = group(vec![job("integ-$(matrix.k8s)", &["presubmit"])]);
        group.matrix = BTreeMap::from([(
            "k8s".to_string(),
            vec!["1.20".to_string(), "1.21".to_string()],
        )]);

        let config = JobCompiler::new(&settings, &group).compile().unwrap();

        let names: Vec<&str> = config
            .bases(TriggerType::Presubmit)
            .iter()
            .map(|b| b.name.as_str())
            .collect();
        assert_eq!(names, vec!["integ-1.20_proxy", "integ-1.21_proxy"]);
    }
}
