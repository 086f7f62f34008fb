//! Cleanup run reports
//!
//! Writes the candidate, planned and skipped lists (plus action outcomes
//! when a plan was executed) as CSV, JSON or HTML, and the JSON backup of
//! planned devices taken before anything destructive runs.

use crate::error::Result;
use crate::executor::ActionOutcome;
use crate::lifecycle::{ActionPlan, ClassifiedCandidate, RequestedAction, SkipReason};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ReportFormat {
    Csv,
    Json,
    Html,
}

/// Everything a run decided and did
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub generated_at: DateTime<Utc>,
    pub tenant: Option<String>,
    pub requested_action: RequestedAction,
    pub dry_run: bool,
    pub stale_days: i64,
    pub duplicate_threshold: i64,
    pub max_count: i64,
    pub candidates: Vec<ClassifiedCandidate>,
    pub plan: ActionPlan,
    pub outcomes: Vec<ActionOutcome>,
}

impl RunReport {
    fn file_stem(&self) -> String {
        format!("devicesweep-{}", self.generated_at.format("%Y%m%d-%H%M%S"))
    }
}

/// Flat row shared by the candidate, planned and skipped CSV files
#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct CandidateRow<'a> {
    device_id: &'a str,
    directory_id: &'a str,
    device_name: &'a str,
    user_principal_name: &'a str,
    serial_number: &'a str,
    operating_system: &'a str,
    last_sync: String,
    enrollment_state: &'a str,
    management_agent: &'a str,
    source: &'static str,
    reasons: String,
    recommended_action: String,
    duplicate_group: &'a str,
    skip_reason: String,
}

impl<'a> CandidateRow<'a> {
    fn new(candidate: &'a ClassifiedCandidate, skip_reason: Option<SkipReason>) -> Self {
        Self {
            device_id: &candidate.id,
            directory_id: candidate.directory_id.as_deref().unwrap_or(""),
            device_name: &candidate.display_name,
            user_principal_name: candidate.user_principal_name.as_deref().unwrap_or(""),
            serial_number: candidate.serial_number.as_deref().unwrap_or(""),
            operating_system: &candidate.operating_system,
            last_sync: format_last_sync(candidate.last_sync_time),
            enrollment_state: &candidate.enrollment_state,
            management_agent: &candidate.management_agent,
            source: candidate.source.as_str(),
            reasons: candidate.reasons_display(),
            recommended_action: candidate.recommended_action.to_string(),
            duplicate_group: &candidate.duplicate_group_key,
            skip_reason: skip_reason.map(|r| r.to_string()).unwrap_or_default(),
        }
    }
}

pub fn format_last_sync(value: Option<DateTime<Utc>>) -> String {
    value
        .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| "Never".to_string())
}

/// Write the report into `dir`, returning the files created
pub fn write_report(report: &RunReport, dir: &Path, format: ReportFormat) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(dir)?;
    let stem = report.file_stem();

    let written = match format {
        ReportFormat::Json => {
            let path = dir.join(format!("{}.json", stem));
            fs::write(&path, serde_json::to_string_pretty(report)?)?;
            vec![path]
        }
        ReportFormat::Html => {
            let path = dir.join(format!("{}.html", stem));
            fs::write(&path, render_html(report))?;
            vec![path]
        }
        ReportFormat::Csv => write_csv_files(report, dir, &stem)?,
    };

    tracing::info!(files = written.len(), dir = %dir.display(), "report written");
    Ok(written)
}

fn write_csv_files(report: &RunReport, dir: &Path, stem: &str) -> Result<Vec<PathBuf>> {
    let mut written = Vec::new();

    let candidates_path = dir.join(format!("{}-candidates.csv", stem));
    let mut wtr = csv::Writer::from_path(&candidates_path)?;
    for candidate in &report.candidates {
        wtr.serialize(CandidateRow::new(candidate, None))?;
    }
    wtr.flush()?;
    written.push(candidates_path);

    let planned_path = dir.join(format!("{}-planned.csv", stem));
    let mut wtr = csv::Writer::from_path(&planned_path)?;
    for candidate in &report.plan.planned {
        wtr.serialize(CandidateRow::new(candidate, None))?;
    }
    wtr.flush()?;
    written.push(planned_path);

    let skipped_path = dir.join(format!("{}-skipped.csv", stem));
    let mut wtr = csv::Writer::from_path(&skipped_path)?;
    for entry in &report.plan.skipped {
        wtr.serialize(CandidateRow::new(&entry.candidate, Some(entry.skip_reason)))?;
    }
    wtr.flush()?;
    written.push(skipped_path);

    if !report.outcomes.is_empty() {
        let outcomes_path = dir.join(format!("{}-outcomes.csv", stem));
        let mut wtr = csv::Writer::from_path(&outcomes_path)?;
        wtr.write_record(["DeviceId", "DeviceName", "Source", "Action", "Result", "Error"])?;
        for outcome in &report.outcomes {
            let action = outcome.action.to_string();
            wtr.write_record([
                outcome.device_id.as_str(),
                outcome.display_name.as_str(),
                outcome.source.as_str(),
                action.as_str(),
                if outcome.succeeded { "Succeeded" } else { "Failed" },
                outcome.error.as_deref().unwrap_or(""),
            ])?;
        }
        wtr.flush()?;
        written.push(outcomes_path);
    }

    Ok(written)
}

/// Save the full planned records before acting on them
pub fn write_backup(planned: &[ClassifiedCandidate], dir: &Path) -> Result<PathBuf> {
    fs::create_dir_all(dir)?;
    let path = dir.join(format!(
        "devicesweep-backup-{}.json",
        Utc::now().format("%Y%m%d-%H%M%S")
    ));
    fs::write(&path, serde_json::to_string_pretty(planned)?)?;
    tracing::info!(path = %path.display(), devices = planned.len(), "backup written");
    Ok(path)
}

fn escape_html(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn candidate_rows(candidates: &[(&ClassifiedCandidate, Option<SkipReason>)]) -> String {
    if candidates.is_empty() {
        return "<tr><td colspan='7' class='empty'>None</td></tr>".to_string();
    }

    candidates
        .iter()
        .map(|(c, skip)| {
            format!(
                "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>",
                escape_html(&c.display_name),
                escape_html(c.user_principal_name.as_deref().unwrap_or("")),
                escape_html(&c.operating_system),
                format_last_sync(c.last_sync_time),
                c.reasons_display(),
                c.recommended_action,
                skip.map(|r| r.to_string()).unwrap_or_default(),
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn render_html(report: &RunReport) -> String {
    let candidates: Vec<_> = report.candidates.iter().map(|c| (c, None)).collect();
    let planned: Vec<_> = report.plan.planned.iter().map(|c| (c, None)).collect();
    let skipped: Vec<_> = report
        .plan
        .skipped
        .iter()
        .map(|s| (&s.candidate, Some(s.skip_reason)))
        .collect();

    let outcome_rows = report
        .outcomes
        .iter()
        .map(|o| {
            format!(
                "<tr class='{}'><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>",
                if o.succeeded { "ok" } else { "failed" },
                escape_html(&o.display_name),
                o.action,
                if o.succeeded { "Succeeded" } else { "Failed" },
                escape_html(o.error.as_deref().unwrap_or("")),
            )
        })
        .collect::<Vec<_>>()
        .join("\n");

    let header = "<tr><th>Device</th><th>User</th><th>OS</th><th>Last Sync</th>\
                  <th>Reasons</th><th>Recommended</th><th>Skip Reason</th></tr>";

    format!(
        r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<title>Device Cleanup Report</title>
<style>
body {{ font-family: 'Segoe UI', Arial, sans-serif; margin: 32px; color: #1f2937; }}
h1 {{ color: #1e3a5f; }}
table {{ border-collapse: collapse; width: 100%; margin-bottom: 32px; }}
th, td {{ border: 1px solid #e5e7eb; padding: 6px 10px; text-align: left; font-size: 13px; }}
th {{ background: #f3f4f6; }}
.summary span {{ display: inline-block; margin-right: 24px; font-weight: 600; }}
tr.failed td {{ color: #dc2626; }}
td.empty {{ color: #6b7280; font-style: italic; }}
</style>
</head>
<body>
<h1>Device Cleanup Report</h1>
<p>Generated {generated} | Tenant: {tenant} | Action: {action}{dry_run}</p>
<p>Stale after {stale_days} days | Duplicate threshold {threshold} | Max per run {max_count}</p>
<div class="summary">
<span>Candidates: {candidate_count}</span>
<span>Planned: {planned_count}</span>
<span>Skipped: {skipped_count}</span>
</div>
<h2>Candidates</h2>
<table>
{header}
{candidate_rows}
</table>
<h2>Planned</h2>
<table>
{header}
{planned_rows}
</table>
<h2>Skipped</h2>
<table>
{header}
{skipped_rows}
</table>
<h2>Outcomes</h2>
<table>
<tr><th>Device</th><th>Action</th><th>Result</th><th>Error</th></tr>
{outcome_rows}
</table>
</body>
</html>"#,
        generated = report.generated_at.format("%Y-%m-%d %H:%M:%S UTC"),
        tenant = escape_html(report.tenant.as_deref().unwrap_or("offline")),
        action = report.requested_action,
        dry_run = if report.dry_run { " (dry run)" } else { "" },
        stale_days = report.stale_days,
        threshold = report.duplicate_threshold,
        max_count = report.max_count,
        candidate_count = report.candidates.len(),
        planned_count = report.plan.planned.len(),
        skipped_count = report.plan.skipped.len(),
        header = header,
        candidate_rows = candidate_rows(&candidates),
        planned_rows = candidate_rows(&planned),
        skipped_rows = candidate_rows(&skipped),
        outcome_rows = outcome_rows,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::{DeviceRecord, ReasonCode, SkippedEntry};

    fn sample_report() -> RunReport {
        let device = DeviceRecord {
            id: "m-1".into(),
            directory_id: None,
            display_name: "R&D <lab>".into(),
            user_principal_name: None,
            serial_number: Some("SN1".into()),
            last_sync_time: None,
            enrollment_state: "failed".into(),
            management_agent: "mdm".into(),
            operating_system: "Windows".into(),
        };
        let mut candidate = ClassifiedCandidate::from_managed(&device, ReasonCode::LastSyncStale);
        candidate.add_reason(ReasonCode::NoUser);

        RunReport {
            generated_at: Utc::now(),
            tenant: Some("contoso".into()),
            requested_action: RequestedAction::Export,
            dry_run: true,
            stale_days: 90,
            duplicate_threshold: 1,
            max_count: 0,
            candidates: vec![candidate.clone()],
            plan: ActionPlan {
                planned: Vec::new(),
                skipped: vec![SkippedEntry {
                    candidate,
                    skip_reason: SkipReason::MaxCountReached,
                }],
            },
            outcomes: Vec::new(),
        }
    }

    #[test]
    fn test_csv_report_files() {
        let dir = tempfile::tempdir().unwrap();
        let files = write_report(&sample_report(), dir.path(), ReportFormat::Csv).unwrap();

        // no outcomes file when nothing was executed
        assert_eq!(files.len(), 3);

        let candidates = fs::read_to_string(&files[0]).unwrap();
        let mut lines = candidates.lines();
        assert!(lines.next().unwrap().starts_with("DeviceId,DirectoryId,DeviceName"));
        let row = lines.next().unwrap();
        assert!(row.contains("LastSyncStale;NoUser"));
        assert!(row.contains("Never"));

        let skipped = fs::read_to_string(&files[2]).unwrap();
        assert!(skipped.contains("MaxCountReached"));
    }

    #[test]
    fn test_json_report_round_trips_as_value() {
        let dir = tempfile::tempdir().unwrap();
        let files = write_report(&sample_report(), dir.path(), ReportFormat::Json).unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&files[0]).unwrap()).unwrap();
        assert_eq!(value["requestedAction"], "export");
        assert_eq!(value["candidates"][0]["reasonCodes"][1], "NoUser");
        assert_eq!(value["plan"]["skipped"][0]["skipReason"], "MaxCountReached");
    }

    #[test]
    fn test_html_report_escapes_names() {
        let html = render_html(&sample_report());
        assert!(html.contains("R&amp;D &lt;lab&gt;"));
        assert!(html.contains("(dry run)"));
    }

    #[test]
    fn test_backup_contains_planned_devices() {
        let dir = tempfile::tempdir().unwrap();
        let report = sample_report();
        let path = write_backup(&report.candidates, dir.path()).unwrap();

        let restored: Vec<ClassifiedCandidate> =
            serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(restored, report.candidates);
    }
}
