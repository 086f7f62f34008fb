//! Stale device cleanup
//!
//! `cleanup run` fetches devices from Graph, classifies them, plans the
//! requested action, optionally executes it, and writes a report.
//! `cleanup plan` does the same classification offline from JSON snapshots.

use crate::cmd::progress;
use crate::config::{CleanupDefaults, ConfigManager};
use crate::error::Result;
use crate::executor::{self, ActionOutcome};
use crate::graph::{devices, GraphClient};
use crate::lifecycle::{
    self, ActionPlan, ClassifiedCandidate, DeviceRecord, DirectoryDeviceRecord, ExclusionEntry,
    ReasonCode, RequestedAction, SkipReason,
};
use crate::report::{self, ReportFormat, RunReport};
use chrono::Utc;
use clap::{Args, Subcommand};
use colored::Colorize;
use std::path::{Path, PathBuf};

#[derive(Subcommand, Debug)]
pub enum CleanupCommands {
    /// Classify tenant devices and retire/delete the stale ones
    Run(RunArgs),

    /// Classify devices from JSON snapshot files without contacting Graph
    Plan(PlanArgs),
}

/// Thresholds and output options shared by `run` and `plan`
#[derive(Args, Debug)]
pub struct SweepOptions {
    /// Days without sync before a device counts as stale
    #[arg(long)]
    pub stale_days: Option<i64>,

    /// Devices allowed per user/OS/name group before older ones are flagged
    #[arg(long)]
    pub duplicate_threshold: Option<i64>,

    /// Maximum number of devices to act on in one run
    #[arg(long)]
    pub max_count: Option<i64>,

    /// Action to plan for candidates
    #[arg(short, long, value_enum)]
    pub action: Option<RequestedAction>,

    /// CSV of devices to never touch (DeviceId, DirectoryId, SerialNumber, DeviceName)
    #[arg(short, long)]
    pub exclusions: Option<PathBuf>,

    /// Directory for reports and backups
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Report format
    #[arg(short, long, value_enum, default_value = "csv")]
    pub format: ReportFormat,
}

#[derive(Args, Debug)]
pub struct RunArgs {
    #[command(flatten)]
    pub options: SweepOptions,

    /// Tenant to run against (defaults to the active tenant)
    #[arg(short, long)]
    pub tenant: Option<String>,

    /// Also evaluate Entra ID devices that have no Intune record
    #[arg(long)]
    pub include_directory: bool,

    /// Show what would happen without retiring or deleting anything
    #[arg(long)]
    pub dry_run: bool,

    /// Skip confirmation prompt
    #[arg(short = 'y', long)]
    pub yes: bool,
}

#[derive(Args, Debug)]
pub struct PlanArgs {
    #[command(flatten)]
    pub options: SweepOptions,

    /// JSON array of managed device records
    #[arg(long)]
    pub managed: PathBuf,

    /// JSON array of directory device records
    #[arg(long)]
    pub directory: Option<PathBuf>,
}

/// Options after applying config.toml defaults
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub stale_days: i64,
    pub duplicate_threshold: i64,
    pub max_count: i64,
    pub action: RequestedAction,
    pub exclusions_file: Option<PathBuf>,
    pub output_dir: PathBuf,
    pub format: ReportFormat,
}

impl Settings {
    pub fn resolve(options: &SweepOptions, defaults: &CleanupDefaults, fallback_dir: PathBuf) -> Self {
        Self {
            stale_days: options.stale_days.unwrap_or(defaults.stale_days),
            duplicate_threshold: options
                .duplicate_threshold
                .unwrap_or(defaults.duplicate_threshold),
            max_count: options.max_count.unwrap_or(defaults.max_count),
            action: options.action.unwrap_or(defaults.action),
            exclusions_file: options
                .exclusions
                .clone()
                .or_else(|| defaults.exclusions_file.clone()),
            output_dir: options
                .output
                .clone()
                .or_else(|| defaults.output_dir.clone())
                .unwrap_or(fallback_dir),
            format: options.format,
        }
    }

    fn load_exclusions(&self) -> Result<Vec<ExclusionEntry>> {
        match &self.exclusions_file {
            Some(path) => lifecycle::load_exclusions(path),
            None => Ok(Vec::new()),
        }
    }
}

pub async fn run(args: RunArgs) -> Result<()> {
    let config_manager = ConfigManager::new()?;
    let config = config_manager.load_config()?;
    let tenant = config_manager.resolve_tenant(args.tenant.as_deref())?;
    let defaults = config.cleanup.with_overrides(&tenant.cleanup);
    let settings = Settings::resolve(&args.options, &defaults, config_manager.reports_dir());
    let include_directory = args.include_directory || defaults.include_directory;

    println!("{} stale devices...", "Sweeping".cyan().bold());
    println!("→ Tenant: {}", tenant.name.cyan().bold());
    print_settings(&settings);

    // Validate inputs before any network traffic
    let exclusions = settings.load_exclusions()?;
    let graph = GraphClient::from_config(&config_manager, &tenant.name).await?;

    let spinner = progress::create_spinner("Fetching Intune managed devices...");
    let managed = match devices::list_managed_devices(&graph).await {
        Ok(managed) => {
            progress::finish_spinner_success(
                &spinner,
                &format!("{} managed devices", managed.len()),
            );
            managed
        }
        Err(e) => {
            progress::finish_spinner_error(&spinner, "Failed to fetch managed devices");
            return Err(e);
        }
    };

    let directory = if include_directory {
        let spinner = progress::create_spinner("Fetching Entra ID devices...");
        match devices::list_directory_devices(&graph).await {
            Ok(directory) => {
                progress::finish_spinner_success(
                    &spinner,
                    &format!("{} directory devices", directory.len()),
                );
                directory
            }
            Err(e) => {
                progress::finish_spinner_error(&spinner, "Failed to fetch directory devices");
                return Err(e);
            }
        }
    } else {
        Vec::new()
    };

    let (candidates, plan) = classify_and_plan(&managed, &directory, &exclusions, &settings)?;
    print_summary(&candidates, &plan, settings.action);

    let mut outcomes: Vec<ActionOutcome> = Vec::new();
    let mut executed = false;

    if settings.action.is_destructive() && !plan.planned.is_empty() {
        if args.dry_run {
            println!("\n{}", "DRY RUN - No changes will be made".yellow().bold());
            print_planned(&plan.planned, settings.action);
        } else if args.yes || confirm(&plan.planned, settings.action, &tenant.name)? {
            let backup = report::write_backup(&plan.planned, &settings.output_dir)?;
            println!("{} Backup saved: {}", "→".cyan(), backup.display());

            let bar = progress::create_progress_bar(
                plan.planned.len() as u64,
                &format!("{} devices", capitalize(&settings.action.to_string())),
            );
            outcomes = executor::execute_plan(&graph, &plan.planned, settings.action, |_| {
                bar.inc(1)
            })
            .await;
            executed = true;

            let (succeeded, failed) = executor::summarize(&outcomes);
            if failed == 0 {
                progress::finish_progress_success(&bar, &format!("{} devices processed", succeeded));
            } else {
                progress::finish_progress_error(
                    &bar,
                    &format!("{} succeeded, {} failed", succeeded, failed),
                );
            }
            print_outcomes(&outcomes);
        } else {
            println!("{}", "Cancelled.".yellow());
        }
    }

    let run_report = RunReport {
        generated_at: Utc::now(),
        tenant: Some(tenant.name.clone()),
        requested_action: settings.action,
        dry_run: !executed,
        stale_days: settings.stale_days,
        duplicate_threshold: settings.duplicate_threshold,
        max_count: settings.max_count,
        candidates,
        plan,
        outcomes,
    };
    write_and_print_report(&run_report, &settings)?;

    Ok(())
}

pub async fn plan(args: PlanArgs) -> Result<()> {
    let config_manager = ConfigManager::new()?;
    let config = config_manager.load_config()?;
    let settings = Settings::resolve(&args.options, &config.cleanup, config_manager.reports_dir());

    println!("{} device snapshot (offline)...", "Classifying".cyan().bold());
    print_settings(&settings);

    let exclusions = settings.load_exclusions()?;
    let managed: Vec<DeviceRecord> = read_snapshot(&args.managed)?;
    let directory: Vec<DirectoryDeviceRecord> = match &args.directory {
        Some(path) => read_snapshot(path)?,
        None => Vec::new(),
    };
    println!(
        "→ {} managed, {} directory devices loaded",
        managed.len(),
        directory.len()
    );

    let (candidates, plan) = classify_and_plan(&managed, &directory, &exclusions, &settings)?;
    print_summary(&candidates, &plan, settings.action);
    print_planned(&plan.planned, settings.action);

    let run_report = RunReport {
        generated_at: Utc::now(),
        tenant: None,
        requested_action: settings.action,
        dry_run: true,
        stale_days: settings.stale_days,
        duplicate_threshold: settings.duplicate_threshold,
        max_count: settings.max_count,
        candidates,
        plan,
        outcomes: Vec::new(),
    };
    write_and_print_report(&run_report, &settings)?;

    Ok(())
}

/// Classify and plan against a single reference time
pub fn classify_and_plan(
    managed: &[DeviceRecord],
    directory: &[DirectoryDeviceRecord],
    exclusions: &[ExclusionEntry],
    settings: &Settings,
) -> Result<(Vec<ClassifiedCandidate>, ActionPlan)> {
    let candidates = lifecycle::classify_at(
        managed,
        directory,
        settings.stale_days,
        settings.duplicate_threshold,
        Utc::now(),
    )?;
    let plan = lifecycle::plan(&candidates, exclusions, settings.max_count, settings.action)?;
    Ok((candidates, plan))
}

fn read_snapshot<T: for<'de> serde::Deserialize<'de>>(path: &Path) -> Result<Vec<T>> {
    let contents = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&contents)?)
}

fn write_and_print_report(run_report: &RunReport, settings: &Settings) -> Result<()> {
    let files = report::write_report(run_report, &settings.output_dir, settings.format)?;
    println!("\n{} Report written:", "✓".green().bold());
    for file in files {
        println!("  • {}", file.display());
    }
    Ok(())
}

fn print_settings(settings: &Settings) {
    println!(
        "→ Stale after {} days, duplicate threshold {}, max {} per run",
        settings.stale_days, settings.duplicate_threshold, settings.max_count
    );
    println!("→ Action: {}", settings.action.to_string().bold());
    if let Some(path) = &settings.exclusions_file {
        println!("→ Exclusions: {}", path.display());
    }
}

fn print_summary(candidates: &[ClassifiedCandidate], plan: &ActionPlan, action: RequestedAction) {
    println!("\n{}", "Classification Summary:".bold());
    println!("{}", "─".repeat(60));

    for reason in [
        ReasonCode::LastSyncStale,
        ReasonCode::FailedEnrollment,
        ReasonCode::NoUser,
        ReasonCode::DuplicateRegistration,
        ReasonCode::DirectoryStale,
    ] {
        let count = candidates.iter().filter(|c| c.has_reason(reason)).count();
        if count > 0 {
            println!("  {:<24} {:>6}  {}", reason.as_str(), count, reason.description().dimmed());
        }
    }

    println!("{}", "─".repeat(60));
    println!("  {:<24} {:>6}", "Candidates", candidates.len());
    println!(
        "  {:<24} {:>6}",
        format!("Planned ({})", action),
        plan.planned.len().to_string().green()
    );
    for reason in [
        SkipReason::Excluded,
        SkipReason::MaxCountReached,
        SkipReason::ActionNotApplicable,
    ] {
        let count = plan.skipped_for(reason);
        if count > 0 {
            println!(
                "  {:<24} {:>6}",
                format!("Skipped: {}", reason),
                count.to_string().yellow()
            );
        }
    }
}

fn print_planned(planned: &[ClassifiedCandidate], action: RequestedAction) {
    if planned.is_empty() {
        return;
    }

    println!("\n{} Devices that would be {}:", "→".cyan(), past_tense(action));
    println!(
        "\n{:<24} {:<32} {:<22} {}",
        "Device", "User", "Last Sync", "Reasons"
    );
    println!("{}", "─".repeat(100));
    for candidate in planned {
        println!(
            "{:<24} {:<32} {:<22} {}",
            candidate.display_name,
            candidate.user_principal_name.as_deref().unwrap_or("-"),
            report::format_last_sync(candidate.last_sync_time),
            candidate.reasons_display()
        );
    }
}

fn print_outcomes(outcomes: &[ActionOutcome]) {
    for outcome in outcomes.iter().filter(|o| !o.succeeded) {
        println!(
            "  {} {}: {}",
            "✗".red().bold(),
            outcome.display_name,
            outcome.error.as_deref().unwrap_or("unknown error").red()
        );
    }
}

fn confirm(planned: &[ClassifiedCandidate], action: RequestedAction, tenant: &str) -> Result<bool> {
    use std::io::{self, Write};

    println!(
        "\n{} This will {} {} device(s) in tenant '{}'",
        "⚠".yellow().bold(),
        action,
        planned.len(),
        tenant
    );
    print!("\nContinue? [y/N]: ");
    io::stdout().flush()?;

    let mut response = String::new();
    io::stdin().read_line(&mut response)?;
    Ok(response.trim().eq_ignore_ascii_case("y"))
}

fn past_tense(action: RequestedAction) -> &'static str {
    match action {
        RequestedAction::Export => "exported",
        RequestedAction::Retire => "retired",
        RequestedAction::Delete => "deleted",
    }
}

fn capitalize(value: &str) -> String {
    let mut chars = value.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options() -> SweepOptions {
        SweepOptions {
            stale_days: None,
            duplicate_threshold: Some(3),
            max_count: None,
            action: Some(RequestedAction::Delete),
            exclusions: None,
            output: None,
            format: ReportFormat::Json,
        }
    }

    #[test]
    fn test_settings_prefer_flags_over_config() {
        let defaults = CleanupDefaults {
            stale_days: 45,
            output_dir: Some(PathBuf::from("/var/reports")),
            ..CleanupDefaults::default()
        };

        let settings = Settings::resolve(&options(), &defaults, PathBuf::from("/tmp/fallback"));

        assert_eq!(settings.stale_days, 45);
        assert_eq!(settings.duplicate_threshold, 3);
        assert_eq!(settings.max_count, 50);
        assert_eq!(settings.action, RequestedAction::Delete);
        assert_eq!(settings.output_dir, PathBuf::from("/var/reports"));
    }

    #[test]
    fn test_settings_fall_back_to_reports_dir() {
        let settings = Settings::resolve(
            &options(),
            &CleanupDefaults::default(),
            PathBuf::from("/tmp/fallback"),
        );
        assert_eq!(settings.output_dir, PathBuf::from("/tmp/fallback"));
    }

    #[test]
    fn test_classify_and_plan_rejects_bad_thresholds() {
        let mut settings =
            Settings::resolve(&options(), &CleanupDefaults::default(), PathBuf::from("."));
        settings.max_count = -5;

        let result = classify_and_plan(&[], &[], &[], &settings);
        assert!(matches!(result, Err(crate::error::Error::InvalidArgument(_))));
    }

    #[test]
    fn test_capitalize() {
        assert_eq!(capitalize("retire"), "Retire");
        assert_eq!(capitalize(""), "");
    }
}
