//! Command handlers.

use crate::config::{CONFIG_FILE, CliConfig};
use console::style;
use jobforge_compiler::{branching, output};
use jobforge_core::job::JobGroup;
use jobforge_core::load;
use jobforge_core::prowjob::JobConfig;
use jobforge_core::settings::GlobalSettings;
use jobforge_spec::Validator;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Validate and compile every job group, writing the generated files.
///
/// Nothing is written unless every group compiles.
pub fn generate(config: &CliConfig) -> Result<(), Box<dyn std::error::Error>> {
    let settings = GlobalSettings::load(&config.global)?;
    let groups = load_groups(&config.input)?;

    let mut rendered = Vec::with_capacity(groups.len());
    for (path, group) in &groups {
        let jobs = compile_checked(&settings, path, group)?;
        let content = output::render(&settings, &jobs)?;
        rendered.push((output::output_path(&config.output, group), content, jobs.len()));
    }

    for (target, content, count) in &rendered {
        output::write_atomic(target, content)?;
        println!("{} {} ({} jobs)", style("✓").green(), target.display(), count);
    }

    info!(groups = groups.len(), "Generation complete");
    Ok(())
}

/// Compare every job group's compiled output with the file on disk.
pub fn check(config: &CliConfig) -> Result<(), Box<dyn std::error::Error>> {
    let settings = GlobalSettings::load(&config.global)?;
    let groups = load_groups(&config.input)?;

    let mut stale = Vec::new();
    for (path, group) in &groups {
        let jobs = compile_checked(&settings, path, group)?;
        let content = output::render(&settings, &jobs)?;
        let target = output::output_path(&config.output, group);

        match output::check(&target, &content) {
            Ok(()) => println!("{} {}", style("✓").green(), target.display()),
            Err(jobforge_core::Error::Stale(stale_path)) => {
                println!("{} {} is out of date", style("✗").red(), stale_path.display());
                stale.push(stale_path);
            }
            Err(e) => return Err(e.into()),
        }
    }

    if !stale.is_empty() {
        return Err(format!(
            "{} generated file(s) out of date, run `jobforge generate`",
            stale.len()
        )
        .into());
    }
    Ok(())
}

/// Print how a job group's compiled output differs from an existing file.
pub fn diff(
    config: &CliConfig,
    file: &Path,
    existing: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    let settings = GlobalSettings::load(&config.global)?;
    let group = JobGroup::load(file)?;
    let jobs = compile_checked(&settings, file, &group)?;

    let existing = existing.unwrap_or_else(|| output::output_path(&config.output, &group));
    let current = output::read_job_config(&existing)?;
    let report = jobforge_compiler::diff(&jobs, &current)?;

    println!(
        "Comparing {} with {}",
        style(file.display()).bold(),
        style(existing.display()).dim()
    );
    print!("{}", report);
    Ok(())
}

/// Compile a job group and print the generated file.
pub fn print(config: &CliConfig, file: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let settings = GlobalSettings::load(&config.global)?;
    let group = JobGroup::load(file)?;
    let jobs = compile_checked(&settings, file, &group)?;

    print!("{}", output::render(&settings, &jobs)?);
    Ok(())
}

/// Validate job-group documents.
pub fn validate(
    config: &CliConfig,
    files: Vec<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    let settings = GlobalSettings::load(&config.global)?;
    let files = if files.is_empty() {
        load::yaml_files(&config.input)?
    } else {
        files
    };

    let validator = Validator::new(&settings);
    let mut failed = 0;
    for path in &files {
        let group = JobGroup::load(path)?;
        let report = validator.validate(&path.display().to_string(), &group);

        for warning in &report.warnings {
            println!("{} {}", style("!").yellow(), warning);
        }
        if report.is_valid() {
            println!(
                "{} {} is valid ({} jobs)",
                style("✓").green(),
                path.display(),
                group.jobs.len()
            );
        } else {
            println!("{} {}", style("✗").red(), report);
            failed += 1;
        }
    }

    if failed > 0 {
        return Err(format!(
            "{} of {} job group(s) failed validation",
            failed,
            files.len()
        )
        .into());
    }
    Ok(())
}

/// Write release-branch copies of the job groups that support branching.
pub fn branch(
    config: &CliConfig,
    release: &str,
    dir: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    let dir = dir.unwrap_or_else(|| config.input.clone());
    let groups = load_groups(&config.input)?;

    let mut written = 0;
    for (path, group) in &groups {
        let Some(branched) = branching::release_branch(group, release) else {
            continue;
        };

        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(group.repo.as_str());
        let target = dir.join(format!("{}-{}.yaml", stem, release));
        output::write_atomic(&target, &serde_yaml::to_string(&branched)?)?;

        println!(
            "{} {} ({} jobs)",
            style("✓").green(),
            target.display(),
            branched.jobs.len()
        );
        written += 1;
    }

    if written == 0 {
        println!(
            "{} No job groups support release branching",
            style("i").blue()
        );
    }
    Ok(())
}

/// Print the JSON Schema of the job-group or global settings document.
pub fn schema(settings: bool) -> Result<(), Box<dyn std::error::Error>> {
    let schema = if settings {
        schemars::schema_for!(GlobalSettings)
    } else {
        schemars::schema_for!(JobGroup)
    };
    println!("{}", serde_json::to_string_pretty(&schema)?);
    Ok(())
}

/// Show configuration.
pub fn show_config(config: &CliConfig) -> Result<(), Box<dyn std::error::Error>> {
    println!("Current configuration:");
    println!("  global: {}", config.global.display());
    println!("  input: {}", config.input.display());
    println!("  output: {}", config.output.display());

    let path = Path::new(CONFIG_FILE);
    if path.exists() {
        println!("\nConfig file: {}", path.display());
    } else {
        println!("\nConfig file: {} (not present, using defaults)", path.display());
    }
    Ok(())
}

/// Set configuration value.
pub fn set_config(key: &str, value: &str) -> Result<(), Box<dyn std::error::Error>> {
    let path = Path::new(CONFIG_FILE);
    let mut config = CliConfig::load_from(path)?;
    config.set(key, value)?;
    config.save_to(path)?;
    println!("{} Set {} = {}", style("✓").green(), key, value);
    Ok(())
}

/// Every job group in `dir`, in sorted path order.
fn load_groups(dir: &Path) -> Result<Vec<(PathBuf, JobGroup)>, Box<dyn std::error::Error>> {
    let mut groups = Vec::new();
    for path in load::yaml_files(dir)? {
        debug!(path = %path.display(), "Loading job group");
        let group = JobGroup::load(&path)?;
        groups.push((path, group));
    }
    Ok(groups)
}

/// Validate then compile; validation failures are returned as the report.
fn compile_checked(
    settings: &GlobalSettings,
    path: &Path,
    group: &JobGroup,
) -> Result<JobConfig, Box<dyn std::error::Error>> {
    let report = Validator::new(settings).validate(&path.display().to_string(), group);
    for warning in &report.warnings {
        warn!("{}", warning);
    }
    report.ensure_valid()?;

    Ok(jobforge_compiler::compile(settings, group)?)
}
