use colored::Colorize;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use podup::config::PodupConfig;
use podup::error::{PodupError, Result};
use podup::index::{ListingStore, RegistryFactory, VersionIndex};
use podup::model::{Dependency, Requirement, root_name};
use podup::project::Project;
use podup::resolver::{
    Resolvability, ResolverOptions, UnlockMode, UpdateChecker, UpdateReport, classify,
};
use rayon::prelude::*;
use std::path::Path;
use std::sync::Arc;

/// Command line overrides layered over `podup.toml`.
#[derive(Debug, Clone, Default)]
pub struct CheckOverrides {
    pub include_prerelease: bool,
    pub unlock: Option<UnlockMode>,
    pub no_cache: bool,
}

/// Everything a check needs, shared by all checks of one run.
struct CheckSession {
    project: Project,
    options: ResolverOptions,
    factory: Arc<RegistryFactory>,
    store: Arc<dyn ListingStore>,
    config: PodupConfig,
}

impl CheckSession {
    fn open(project_path: &Path, config_path: Option<&Path>, overrides: &CheckOverrides) -> Result<Self> {
        let project = Project::load(project_path)?;
        let config_dir = project.root.as_deref().unwrap_or(project_path);
        let mut config = PodupConfig::load(config_dir, config_path)?;

        if overrides.include_prerelease {
            config.allow_prerelease = true;
        }
        if let Some(unlock) = overrides.unlock {
            config.unlock = unlock;
        }

        let options = config.resolver_options()?;
        let factory = Arc::new(RegistryFactory::new(
            config.registries.clone(),
            config.transport_settings(),
        ));
        let store = config.listing_store(overrides.no_cache);

        Ok(Self {
            project,
            options,
            factory,
            store,
            config,
        })
    }

    fn checker<'a>(&'a self, dependency: &'a Dependency) -> UpdateChecker<'a> {
        let index = VersionIndex::new(Arc::clone(&self.factory), Arc::clone(&self.store))
            .with_max_age(self.config.max_age());
        UpdateChecker::new(
            dependency,
            self.project.dependencies(),
            self.project.graph(),
            &self.options,
            index,
        )
    }

    fn select(&self, pod: Option<&str>) -> Result<Vec<&Dependency>> {
        match pod {
            Some(pod) => self
                .project
                .dependency(pod)
                .map(|dependency| vec![dependency])
                .ok_or_else(|| {
                    PodupError::ProjectValidation(format!(
                        "Pod '{}' is not declared in the Podfile",
                        root_name(pod)
                    ))
                }),
            None => Ok(self.project.dependencies().iter().collect()),
        }
    }
}

/// Execute the check workflow: report the newest and newest resolvable
/// version of every pod (or one pod) without touching any file.
pub fn execute_check(
    project_path: &Path,
    config_path: Option<&Path>,
    pod: Option<&str>,
    overrides: &CheckOverrides,
    json: bool,
) -> Result<()> {
    if !json {
        println!("{}", "Checking for available pod updates...".cyan().bold());
        println!("\n{}", "1. Reading Podfile and Podfile.lock...".yellow());
    }
    let session = CheckSession::open(project_path, config_path, overrides)?;
    let dependencies = session.select(pod)?;

    if !json {
        println!(
            "{}",
            format!(
                "✓ {} pod(s) declared, {} locked",
                session.project.dependencies().len(),
                session.project.graph().len()
            )
            .green()
        );
        if !session.project.has_lockfile() {
            println!(
                "{}",
                "⚠ No Podfile.lock: requirements cannot be rewritten".red()
            );
        }
        println!("\n{}", "2. Resolving updates...".yellow());
    }

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(session.config.jobs.unwrap_or(0))
        .build()
        .map_err(|e| PodupError::Config(format!("Cannot start worker pool: {e}")))?;

    let pb = ProgressBar::new(dependencies.len() as u64);
    if json {
        pb.set_draw_target(ProgressDrawTarget::hidden());
    }
    pb.set_style(
        ProgressStyle::default_bar()
            .template("  [{bar:40}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=>-"),
    );

    let results: Vec<(&Dependency, Result<UpdateReport>)> = pool.install(|| {
        dependencies
            .par_iter()
            .map(|dependency| {
                pb.set_message(format!("Checking {}", dependency.name));
                let result = session.checker(dependency).report();
                pb.inc(1);
                (*dependency, result)
            })
            .collect()
    });
    pb.finish_and_clear();

    let total = results.len();
    let mut reports = Vec::new();
    let mut failures = Vec::new();
    for (dependency, result) in results {
        match result {
            Ok(report) => reports.push((dependency, report)),
            Err(e) => {
                tracing::debug!("Check of {} failed: {:?}", dependency.name, e);
                failures.push((dependency.name.clone(), e));
            }
        }
    }

    if json {
        let plain: Vec<&UpdateReport> = reports.iter().map(|(_, report)| report).collect();
        println!("{}", serde_json::to_string_pretty(&plain)?);
    } else {
        println!("{}", "✓ Check completed".green());
        print_reports(&reports);
    }

    if failures.is_empty() {
        return Ok(());
    }
    for (name, error) in &failures {
        eprintln!("{} {}: {}", "✗".red(), name.white().bold(), error);
    }
    // a single failing pod surfaces its own error
    if total == 1 {
        if let Some((_, error)) = failures.pop() {
            return Err(error);
        }
    }
    Err(PodupError::ChecksFailed {
        failed: failures.len(),
        total,
    })
}

fn print_reports(reports: &[(&Dependency, UpdateReport)]) {
    let (updatable, rest): (Vec<_>, Vec<_>) =
        reports.iter().partition(|(_, report)| report.can_update);

    if updatable.is_empty() {
        println!("\n{}", "✨ All pods are up to date!".green().bold());
    } else {
        println!("\n{}", "📦 Available Updates:".cyan().bold());
        for (dependency, report) in &updatable {
            println!(
                "  • {} {} → {}{}",
                report.name.white().bold(),
                display_version(report.current.as_ref()).red(),
                display_version(report.latest_resolvable.as_ref()).green().bold(),
                held_back_note(report)
            );
            if let Some(requirements) = &report.updated_requirements {
                print_requirement_changes(&dependency.requirements, requirements);
            }
        }
    }

    let held: Vec<&UpdateReport> = rest
        .iter()
        .map(|(_, report)| report)
        .filter(|report| report.latest.is_some() && report.latest != report.current)
        .collect();
    if !held.is_empty() {
        println!("\n{}:", "Held back by other pods".yellow().bold());
        for report in held {
            println!(
                "  • {} stays at {} (latest {})",
                report.name.white().bold(),
                display_version(report.current.as_ref()),
                display_version(report.latest.as_ref()).dimmed()
            );
        }
    }

    let pinned: Vec<&UpdateReport> = rest
        .iter()
        .map(|(_, report)| report)
        .filter(|report| classify(&report.source) == Resolvability::Unresolvable)
        .collect();
    if !pinned.is_empty() {
        println!("\n{}:", "Pinned outside the registry".dimmed());
        for report in pinned {
            println!("  • {} ({})", report.name, report.source.to_string().dimmed());
        }
    }
}

fn held_back_note(report: &UpdateReport) -> String {
    match (&report.latest, &report.latest_resolvable) {
        (Some(latest), Some(resolvable)) if latest != resolvable => {
            format!(" (latest {latest} is held back)").dimmed().to_string()
        }
        _ => String::new(),
    }
}

fn print_requirement_changes(original: &[Requirement], updated: &[Requirement]) {
    for (before, after) in original.iter().zip(updated) {
        if before.requirement != after.requirement {
            println!(
                "      {}: {} → {}",
                after.file.dimmed(),
                display_requirement(before),
                display_requirement(after).green()
            );
        }
    }
}

fn display_version(version: Option<&podup::specs::Version>) -> String {
    version.map_or_else(|| "-".to_string(), ToString::to_string)
}

fn display_requirement(requirement: &Requirement) -> String {
    requirement
        .requirement
        .clone()
        .unwrap_or_else(|| "(any)".to_string())
}

/// Execute the list workflow: show declared pods, their locked versions and
/// where they resolve from. Never touches the network.
pub fn execute_list(project_path: &Path) -> Result<()> {
    println!("{}", "Listing pods...".cyan().bold());

    println!("\n{}", "1. Reading Podfile and Podfile.lock...".yellow());
    let project = Project::load(project_path)?;
    println!("{}", "✓ Project loaded".green());
    if let Some(version) = project
        .lockfile
        .as_ref()
        .and_then(|lockfile| lockfile.cocoapods_version.as_deref())
    {
        println!("   Locked with CocoaPods {}", version.bright_cyan());
    }

    println!("\n{}", "📦 Pods:".cyan().bold());
    for dependency in project.dependencies() {
        let requirements: Vec<String> = dependency
            .requirements
            .iter()
            .map(display_requirement)
            .collect();
        println!(
            "  • {} {} [{}] {}",
            dependency.name.white().bold(),
            display_version(dependency.version.as_ref()).green(),
            requirements.join("; "),
            dependency.source.to_string().dimmed()
        );
    }

    let transitive: Vec<_> = project
        .graph()
        .iter()
        .filter(|(name, _)| project.dependency(name).is_none())
        .collect();
    if !transitive.is_empty() {
        println!("\n{}", "Transitive:".yellow().bold());
        for (name, pod) in transitive {
            println!("  • {} {}", name, pod.version.to_string().dimmed());
        }
    }

    Ok(())
}

/// Execute the requirements workflow: print the rewritten manifest
/// requirements of a single pod.
pub fn execute_requirements(
    project_path: &Path,
    config_path: Option<&Path>,
    pod: &str,
    overrides: &CheckOverrides,
    json: bool,
) -> Result<()> {
    let session = CheckSession::open(project_path, config_path, overrides)?;
    let dependencies = session.select(Some(pod))?;
    let dependency = dependencies[0];

    let mut checker = session.checker(dependency);
    let updated = checker.updated_requirements()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&updated)?);
        return Ok(());
    }

    let resolvable = checker.latest_resolvable_version()?;
    println!(
        "{} {} → {}",
        dependency.name.white().bold(),
        display_version(dependency.version.as_ref()).red(),
        display_version(resolvable.as_ref()).green().bold()
    );
    for (before, after) in dependency.requirements.iter().zip(&updated) {
        let groups = if after.groups.is_empty() {
            String::new()
        } else {
            format!(
                " ({})",
                after.groups.iter().cloned().collect::<Vec<_>>().join(", ")
            )
        };
        let marker = if before.requirement == after.requirement {
            "unchanged".dimmed().to_string()
        } else {
            display_requirement(after).green().to_string()
        };
        println!(
            "  {}{}: {} → {}",
            after.file,
            groups.dimmed(),
            display_requirement(before),
            marker
        );
    }

    Ok(())
}
