//! Device lifecycle model
//!
//! Plain records describing managed and directory devices, and the
//! candidate/plan types produced by the classifier and planner.

pub mod classifier;
pub mod exclusions;
pub mod planner;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

pub use classifier::{classify, classify_at, duplicate_group_key, normalize_device_name};
pub use exclusions::{load_exclusions, parse_exclusions};
pub use planner::{plan, ActionPlan};

/// A device enrolled in Intune, flattened from the Graph response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceRecord {
    pub id: String,
    #[serde(default)]
    pub directory_id: Option<String>,
    pub display_name: String,
    #[serde(default)]
    pub user_principal_name: Option<String>,
    #[serde(default)]
    pub serial_number: Option<String>,
    /// `None` means the device has never synced.
    #[serde(default)]
    pub last_sync_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub enrollment_state: String,
    #[serde(default)]
    pub management_agent: String,
    #[serde(default)]
    pub operating_system: String,
}

/// An Entra ID device object.
///
/// `id` is the directory device id, the value managed devices reference
/// through `directory_id`. `object_id` is the directory object id used to
/// delete the record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectoryDeviceRecord {
    pub id: String,
    #[serde(default)]
    pub object_id: Option<String>,
    pub display_name: String,
    #[serde(default)]
    pub serial_number: Option<String>,
    #[serde(default)]
    pub operating_system: String,
    #[serde(default)]
    pub approximate_last_sign_in: Option<DateTime<Utc>>,
    #[serde(default)]
    pub registration_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub created_time: Option<DateTime<Utc>>,
}

impl DirectoryDeviceRecord {
    /// Sign-in time, else registration time, else creation time.
    pub fn last_activity_time(&self) -> Option<DateTime<Utc>> {
        self.approximate_last_sign_in
            .or(self.registration_time)
            .or(self.created_time)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CandidateSource {
    ManagedDevice,
    DirectoryDevice,
}

impl CandidateSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            CandidateSource::ManagedDevice => "ManagedDevice",
            CandidateSource::DirectoryDevice => "DirectoryDevice",
        }
    }
}

impl fmt::Display for CandidateSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a device was flagged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReasonCode {
    LastSyncStale,
    FailedEnrollment,
    NoUser,
    DuplicateRegistration,
    DirectoryStale,
}

impl ReasonCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReasonCode::LastSyncStale => "LastSyncStale",
            ReasonCode::FailedEnrollment => "FailedEnrollment",
            ReasonCode::NoUser => "NoUser",
            ReasonCode::DuplicateRegistration => "DuplicateRegistration",
            ReasonCode::DirectoryStale => "DirectoryStale",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            ReasonCode::LastSyncStale => "No sync within the stale window, or never synced",
            ReasonCode::FailedEnrollment => "Enrollment failed or device never contacted",
            ReasonCode::NoUser => "No primary user assigned",
            ReasonCode::DuplicateRegistration => "Older duplicate of a re-enrolled device",
            ReasonCode::DirectoryStale => "Directory object with no managed device and no recent activity",
        }
    }

    /// Action recommended when this is the first reason a device was flagged for.
    pub fn recommended_action(&self) -> RecommendedAction {
        match self {
            ReasonCode::LastSyncStale => RecommendedAction::RetireOrDelete,
            _ => RecommendedAction::Delete,
        }
    }
}

impl fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecommendedAction {
    RetireOrDelete,
    Delete,
}

impl fmt::Display for RecommendedAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecommendedAction::RetireOrDelete => f.write_str("RetireOrDelete"),
            RecommendedAction::Delete => f.write_str("Delete"),
        }
    }
}

/// What the operator asked the run to do with planned candidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum RequestedAction {
    Export,
    Retire,
    Delete,
}

impl RequestedAction {
    pub fn is_destructive(&self) -> bool {
        !matches!(self, RequestedAction::Export)
    }
}

impl fmt::Display for RequestedAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestedAction::Export => f.write_str("export"),
            RequestedAction::Retire => f.write_str("retire"),
            RequestedAction::Delete => f.write_str("delete"),
        }
    }
}

/// A device flagged by at least one detection pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassifiedCandidate {
    pub id: String,
    pub directory_id: Option<String>,
    /// Directory object id, set for directory-only candidates.
    pub directory_object_id: Option<String>,
    pub display_name: String,
    pub user_principal_name: Option<String>,
    pub serial_number: Option<String>,
    pub last_sync_time: Option<DateTime<Utc>>,
    pub enrollment_state: String,
    pub management_agent: String,
    pub operating_system: String,
    pub source: CandidateSource,
    pub reason_codes: Vec<ReasonCode>,
    pub duplicate_group_key: String,
    pub recommended_action: RecommendedAction,
}

impl ClassifiedCandidate {
    pub fn from_managed(device: &DeviceRecord, reason: ReasonCode) -> Self {
        Self {
            id: device.id.clone(),
            directory_id: device.directory_id.clone(),
            directory_object_id: None,
            display_name: device.display_name.clone(),
            user_principal_name: device.user_principal_name.clone(),
            serial_number: device.serial_number.clone(),
            last_sync_time: device.last_sync_time,
            enrollment_state: device.enrollment_state.clone(),
            management_agent: device.management_agent.clone(),
            operating_system: device.operating_system.clone(),
            source: CandidateSource::ManagedDevice,
            reason_codes: vec![reason],
            duplicate_group_key: duplicate_group_key(device),
            recommended_action: reason.recommended_action(),
        }
    }

    pub fn from_directory(device: &DirectoryDeviceRecord, reason: ReasonCode) -> Self {
        Self {
            id: device.id.clone(),
            directory_id: Some(device.id.clone()),
            directory_object_id: device.object_id.clone(),
            display_name: device.display_name.clone(),
            user_principal_name: None,
            serial_number: device.serial_number.clone(),
            last_sync_time: device.last_activity_time(),
            enrollment_state: String::new(),
            management_agent: String::new(),
            operating_system: device.operating_system.clone(),
            source: CandidateSource::DirectoryDevice,
            reason_codes: vec![reason],
            duplicate_group_key: format!(
                "|{}|{}",
                device.operating_system,
                normalize_device_name(&device.display_name)
            ),
            recommended_action: reason.recommended_action(),
        }
    }

    /// Append a reason code unless already present. The recommended action
    /// stays tied to the first code.
    pub fn add_reason(&mut self, reason: ReasonCode) {
        if !self.reason_codes.contains(&reason) {
            self.reason_codes.push(reason);
        }
    }

    pub fn has_reason(&self, reason: ReasonCode) -> bool {
        self.reason_codes.contains(&reason)
    }

    pub fn reasons_display(&self) -> String {
        self.reason_codes
            .iter()
            .map(ReasonCode::as_str)
            .collect::<Vec<_>>()
            .join(";")
    }
}

/// One row of the exclusion list. Absent fields never match.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExclusionEntry {
    pub device_id: Option<String>,
    pub directory_id: Option<String>,
    pub serial_number: Option<String>,
    pub display_name: Option<String>,
}

impl ExclusionEntry {
    pub fn is_empty(&self) -> bool {
        [
            &self.device_id,
            &self.directory_id,
            &self.serial_number,
            &self.display_name,
        ]
        .iter()
        .all(|field| field.as_deref().map_or(true, str::is_empty))
    }

    /// Exact, case-sensitive match on any populated field.
    pub fn matches(&self, candidate: &ClassifiedCandidate) -> bool {
        fn field_matches(wanted: &Option<String>, actual: Option<&str>) -> bool {
            match (wanted.as_deref(), actual) {
                (Some(w), Some(a)) if !w.is_empty() => w == a,
                _ => false,
            }
        }

        field_matches(&self.device_id, Some(candidate.id.as_str()))
            || field_matches(&self.directory_id, candidate.directory_id.as_deref())
            || field_matches(&self.serial_number, candidate.serial_number.as_deref())
            || field_matches(&self.display_name, Some(candidate.display_name.as_str()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SkipReason {
    Excluded,
    MaxCountReached,
    ActionNotApplicable,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::Excluded => f.write_str("Excluded"),
            SkipReason::MaxCountReached => f.write_str("MaxCountReached"),
            SkipReason::ActionNotApplicable => f.write_str("ActionNotApplicable"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkippedEntry {
    pub candidate: ClassifiedCandidate,
    pub skip_reason: SkipReason,
}
