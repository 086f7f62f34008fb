//! Stale, orphaned and duplicate device detection
//!
//! Runs the detection passes in a fixed order over a device snapshot:
//! 1. last sync older than the stale window (or never synced)
//! 2. failed or never-contacted enrollment
//! 3. no primary user
//! 4. duplicate registrations beyond the allowed group size
//! 5. directory objects with no managed counterpart and no recent activity
//!
//! A device flagged by several passes yields a single candidate that
//! accumulates reason codes.

use super::{ClassifiedCandidate, DeviceRecord, DirectoryDeviceRecord, ReasonCode};
use crate::error::{Error, Result};
use chrono::{DateTime, Duration, Utc};
use std::collections::{HashMap, HashSet};

const FAILED_ENROLLMENT_STATES: &[&str] = &["failed", "notContacted"];
const UNKNOWN_MANAGEMENT_AGENT: &str = "unknown";

/// Classify devices against the current time.
pub fn classify(
    managed_devices: &[DeviceRecord],
    directory_devices: &[DirectoryDeviceRecord],
    stale_days: i64,
    duplicate_threshold: i64,
) -> Result<Vec<ClassifiedCandidate>> {
    classify_at(
        managed_devices,
        directory_devices,
        stale_days,
        duplicate_threshold,
        Utc::now(),
    )
}

/// Classify devices against a fixed reference time.
pub fn classify_at(
    managed_devices: &[DeviceRecord],
    directory_devices: &[DirectoryDeviceRecord],
    stale_days: i64,
    duplicate_threshold: i64,
    now: DateTime<Utc>,
) -> Result<Vec<ClassifiedCandidate>> {
    if stale_days < 0 {
        return Err(Error::InvalidArgument(format!(
            "staleDays must be >= 0, got {}",
            stale_days
        )));
    }
    if duplicate_threshold < 1 {
        return Err(Error::InvalidArgument(format!(
            "duplicateThreshold must be >= 1, got {}",
            duplicate_threshold
        )));
    }

    // Absurd windows push the cutoff before the representable range; nothing
    // with a sync time can be that old, so only never-synced devices flag.
    let cutoff = Duration::try_days(stale_days).and_then(|window| now.checked_sub_signed(window));
    let is_stale = |seen: Option<DateTime<Utc>>| match (seen, cutoff) {
        (None, _) => true,
        (Some(seen), Some(cutoff)) => seen < cutoff,
        (Some(_), None) => false,
    };

    let mut candidates = CandidateSet::default();

    for device in managed_devices {
        if is_stale(device.last_sync_time) {
            candidates.flag(device, ReasonCode::LastSyncStale);
        }
    }
    tracing::debug!(count = candidates.len(), "after last-sync pass");

    for device in managed_devices {
        if has_failed_enrollment(device) {
            candidates.flag(device, ReasonCode::FailedEnrollment);
        }
    }
    tracing::debug!(count = candidates.len(), "after enrollment pass");

    for device in managed_devices {
        if device.user_principal_name.as_deref().map_or(true, str::is_empty) {
            candidates.flag(device, ReasonCode::NoUser);
        }
    }
    tracing::debug!(count = candidates.len(), "after orphaned pass");

    // duplicate_threshold >= 1 was checked above
    let keep = duplicate_threshold as usize;
    for group in duplicate_groups(managed_devices) {
        if group.len() <= keep {
            continue;
        }

        let mut ranked = group;
        // Stable sort: equal sync times keep input order, never-synced sorts last.
        ranked.sort_by(|a, b| b.last_sync_time.cmp(&a.last_sync_time));

        for device in &ranked[keep..] {
            candidates.flag(device, ReasonCode::DuplicateRegistration);
        }
    }
    tracing::debug!(count = candidates.len(), "after duplicate pass");

    if !directory_devices.is_empty() {
        let managed_directory_ids: HashSet<&str> = managed_devices
            .iter()
            .filter_map(|d| d.directory_id.as_deref())
            .collect();

        for device in directory_devices {
            if managed_directory_ids.contains(device.id.as_str()) {
                continue;
            }
            if is_stale(device.last_activity_time()) {
                candidates.flag_directory(device, ReasonCode::DirectoryStale);
            }
        }
        tracing::debug!(count = candidates.len(), "after directory pass");
    }

    Ok(candidates.into_vec())
}

/// Strip trailing digits so "LAPTOP-01" and "LAPTOP-02" share a root.
pub fn normalize_device_name(name: &str) -> &str {
    name.trim_end_matches(|c: char| c.is_ascii_digit())
}

/// `userPrincipalName|operatingSystem|normalizedName`
pub fn duplicate_group_key(device: &DeviceRecord) -> String {
    format!(
        "{}|{}|{}",
        device.user_principal_name.as_deref().unwrap_or(""),
        device.operating_system,
        normalize_device_name(&device.display_name)
    )
}

// Graph casing differs between endpoints, so both fields compare case-insensitively.
fn has_failed_enrollment(device: &DeviceRecord) -> bool {
    FAILED_ENROLLMENT_STATES
        .iter()
        .any(|state| device.enrollment_state.eq_ignore_ascii_case(state))
        || device
            .management_agent
            .eq_ignore_ascii_case(UNKNOWN_MANAGEMENT_AGENT)
}

/// Groups of devices with a user, in order of each group's first member.
fn duplicate_groups(devices: &[DeviceRecord]) -> Vec<Vec<&DeviceRecord>> {
    let mut groups: Vec<Vec<&DeviceRecord>> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for device in devices {
        if device.user_principal_name.as_deref().map_or(true, str::is_empty) {
            continue;
        }
        let key = duplicate_group_key(device);
        match index.get(&key) {
            Some(&slot) => groups[slot].push(device),
            None => {
                index.insert(key, groups.len());
                groups.push(vec![device]);
            }
        }
    }

    groups
}

/// Candidates in discovery order, unique by device id.
#[derive(Default)]
struct CandidateSet {
    candidates: Vec<ClassifiedCandidate>,
    by_id: HashMap<String, usize>,
}

impl CandidateSet {
    fn flag(&mut self, device: &DeviceRecord, reason: ReasonCode) {
        match self.by_id.get(&device.id) {
            Some(&slot) => self.candidates[slot].add_reason(reason),
            None => self.push(ClassifiedCandidate::from_managed(device, reason)),
        }
    }

    fn flag_directory(&mut self, device: &DirectoryDeviceRecord, reason: ReasonCode) {
        match self.by_id.get(&device.id) {
            Some(&slot) => self.candidates[slot].add_reason(reason),
            None => self.push(ClassifiedCandidate::from_directory(device, reason)),
        }
    }

    fn push(&mut self, candidate: ClassifiedCandidate) {
        self.by_id.insert(candidate.id.clone(), self.candidates.len());
        self.candidates.push(candidate);
    }

    fn len(&self) -> usize {
        self.candidates.len()
    }

    fn into_vec(self) -> Vec<ClassifiedCandidate> {
        self.candidates
    }
}
