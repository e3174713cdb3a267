//! Validation of job-group documents against the effective settings.

use crate::schedule::{parse_cron, parse_duration};
use crate::ValidationReport;
use jobforge_core::job::{JobGroup, JobTemplate, Modifier, RepoRef, TriggerType};
use jobforge_core::preset::PresetStore;
use jobforge_core::settings::GlobalSettings;
use regex::Regex;
use std::collections::BTreeMap;
use tracing::debug;

/// Validator for job-group documents.
pub struct Validator<'a> {
    settings: &'a GlobalSettings,
}

impl<'a> Validator<'a> {
    pub fn new(settings: &'a GlobalSettings) -> Self {
        Self { settings }
    }

    /// Validate a job group. `file` names the document in messages.
    pub fn validate(&self, file: &str, group: &JobGroup) -> ValidationReport {
        let mut report = ValidationReport::new(file);
        let presets = group.effective_presets(self.settings);
        let resources = group.effective_resources(self.settings);

        if group.org.is_empty() {
            report.error("org", "org must be set");
        }
        if group.repo.is_empty() {
            report.error("repo", "repo must be set");
        }

        self.check_requirements(
            &mut report,
            "base_requirements",
            &self.settings.base_requirements,
            &presets,
        );
        self.check_requirements(&mut report, "requirements", &group.requirements, &presets);
        self.check_requirements(
            &mut report,
            "excluded_requirements",
            &group.excluded_requirements,
            &presets,
        );

        for (index, job) in group.jobs.iter().enumerate() {
            let path = format!("jobs[{}]", index);
            self.check_job(&mut report, &path, group, job, &presets, &resources);
        }

        debug!(
            file = %file,
            errors = report.errors.len(),
            warnings = report.warnings.len(),
            "Validated job group"
        );
        report
    }

    fn check_job(
        &self,
        report: &mut ValidationReport,
        path: &str,
        group: &JobGroup,
        job: &JobTemplate,
        presets: &PresetStore,
        resources: &BTreeMap<String, jobforge_core::pod::ResourceRequirements>,
    ) {
        if job.name.is_empty() {
            report.error(format!("{}.name", path), "job name must be set");
        }
        let name = &job.name;

        if group.image.is_empty() && job.image.as_deref().unwrap_or_default().is_empty() {
            report.error(
                format!("{}.image", path),
                format!("job '{}' has no image and the group does not set one", name),
            );
        }

        if let Some(profile) = job.resources.as_deref()
            && !resources.contains_key(profile)
        {
            report.error(
                format!("{}.resources", path),
                format!("job '{}' has nonexistent resource '{}'", name, profile),
            );
        }

        let mut modifiers = Vec::new();
        for modifier in &job.modifiers {
            match modifier.parse::<Modifier>() {
                Ok(m) => modifiers.push(m),
                Err(e) => report.error(format!("{}.modifiers", path), e.to_string()),
            }
        }

        let mut types = Vec::new();
        for t in &job.types {
            match t.parse::<TriggerType>() {
                Ok(t) => types.push(t),
                Err(e) => report.error(format!("{}.types", path), e.to_string()),
            }
        }

        self.check_requirements(
            report,
            &format!("{}.requirements", path),
            &job.requirements,
            presets,
        );
        self.check_requirements(
            report,
            &format!("{}.excluded_requirements", path),
            &job.excluded_requirements,
            presets,
        );

        if types.contains(&TriggerType::Periodic) {
            self.check_schedule(report, path, job);
        } else if job.cron.is_some() || job.interval.is_some() {
            report.warn(format!(
                "{}: job '{}' sets a schedule but is not periodic; the schedule is ignored",
                report.file, name
            ));
        }

        let has_presubmit = job.types.is_empty() || types.contains(&TriggerType::Presubmit);
        for modifier in &modifiers {
            if matches!(modifier, Modifier::Optional | Modifier::Skipped) && !has_presubmit {
                report.warn(format!(
                    "{}: modifier '{}' on job '{}' only applies to presubmits and is ignored",
                    report.file, modifier, name
                ));
            }
        }

        if let Some(timeout) = &job.timeout
            && let Err(e) = parse_duration(timeout)
        {
            report.error(format!("{}.timeout", path), e.to_string());
        }

        if let Some(regex) = &job.regex
            && let Err(e) = Regex::new(regex)
        {
            report.error(
                format!("{}.regex", path),
                format!("invalid regex {:?}: {}", regex, e),
            );
        }

        for repo in &job.repos {
            if let Err(e) = repo.parse::<RepoRef>() {
                report.error(format!("{}.repos", path), e.to_string());
            }
        }
    }

    fn check_schedule(&self, report: &mut ValidationReport, path: &str, job: &JobTemplate) {
        let name = &job.name;
        match (non_empty(&job.cron), non_empty(&job.interval)) {
            (Some(_), Some(_)) => report.error(
                path,
                format!("cron and interval cannot be both set in periodic {}", name),
            ),
            (None, None) => report.error(
                path,
                format!("cron and interval cannot be both empty in periodic {}", name),
            ),
            (Some(cron), None) => {
                if let Err(e) = parse_cron(cron) {
                    report.error(
                        format!("{}.cron", path),
                        format!("invalid cron string {} in periodic {}: {}", cron, name, e),
                    );
                }
            }
            (None, Some(interval)) => {
                if let Err(e) = parse_duration(interval) {
                    report.error(
                        format!("{}.interval", path),
                        format!("cannot parse duration in periodic {}: {}", name, e),
                    );
                }
            }
        }
    }

    fn check_requirements(
        &self,
        report: &mut ValidationReport,
        path: &str,
        names: &[String],
        presets: &PresetStore,
    ) {
        for name in names {
            if !presets.contains(name) {
                let known: Vec<&str> = presets.names().collect();
                report.error(
                    path,
                    format!(
                        "'{}' is not a valid requirement. Must be one of {}",
                        name,
                        known.join(", ")
                    ),
                );
            }
        }
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}
