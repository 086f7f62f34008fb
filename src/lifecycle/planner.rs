//! Turn classified candidates into a run plan
//!
//! Candidates are considered in order. Exclusions are checked first so an
//! excluded device never consumes a slot under the run cap.

use super::{
    CandidateSource, ClassifiedCandidate, ExclusionEntry, RequestedAction, SkipReason,
    SkippedEntry,
};
use crate::error::{Error, Result};
use serde::Serialize;

/// Devices to act on and devices held back, with the reason.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ActionPlan {
    pub planned: Vec<ClassifiedCandidate>,
    pub skipped: Vec<SkippedEntry>,
}

impl ActionPlan {
    pub fn skipped_for(&self, reason: SkipReason) -> usize {
        self.skipped
            .iter()
            .filter(|entry| entry.skip_reason == reason)
            .count()
    }
}

pub fn plan(
    candidates: &[ClassifiedCandidate],
    exclusions: &[ExclusionEntry],
    max_count: i64,
    requested_action: RequestedAction,
) -> Result<ActionPlan> {
    if max_count < 0 {
        return Err(Error::InvalidArgument(format!(
            "maxCount must be >= 0, got {}",
            max_count
        )));
    }
    let max_count = usize::try_from(max_count).unwrap_or(usize::MAX);

    let mut result = ActionPlan::default();

    for candidate in candidates {
        let skip_reason = if exclusions.iter().any(|entry| entry.matches(candidate)) {
            Some(SkipReason::Excluded)
        } else if result.planned.len() >= max_count {
            Some(SkipReason::MaxCountReached)
        } else if requested_action == RequestedAction::Retire
            && candidate.source != CandidateSource::ManagedDevice
        {
            Some(SkipReason::ActionNotApplicable)
        } else {
            None
        };

        match skip_reason {
            Some(skip_reason) => {
                tracing::debug!(device = %candidate.id, reason = %skip_reason, "skipping candidate");
                result.skipped.push(SkippedEntry {
                    candidate: candidate.clone(),
                    skip_reason,
                });
            }
            None => result.planned.push(candidate.clone()),
        }
    }

    tracing::info!(
        planned = result.planned.len(),
        skipped = result.skipped.len(),
        action = %requested_action,
        "action plan built"
    );

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::{DeviceRecord, DirectoryDeviceRecord, ReasonCode};

    fn candidate(id: &str) -> ClassifiedCandidate {
        let device = DeviceRecord {
            id: id.to_string(),
            directory_id: Some(format!("aad-{}", id)),
            display_name: format!("PC-{}", id),
            user_principal_name: None,
            serial_number: Some(format!("SN-{}", id)),
            last_sync_time: None,
            enrollment_state: "normal".into(),
            management_agent: "mdm".into(),
            operating_system: "Windows".into(),
        };
        ClassifiedCandidate::from_managed(&device, ReasonCode::NoUser)
    }

    fn directory_candidate(id: &str) -> ClassifiedCandidate {
        let device = DirectoryDeviceRecord {
            id: id.to_string(),
            object_id: Some(format!("obj-{}", id)),
            display_name: format!("DIR-{}", id),
            serial_number: None,
            operating_system: "Windows".into(),
            approximate_last_sign_in: None,
            registration_time: None,
            created_time: None,
        };
        ClassifiedCandidate::from_directory(&device, ReasonCode::DirectoryStale)
    }

    fn planned_ids(plan: &ActionPlan) -> Vec<&str> {
        plan.planned.iter().map(|c| c.id.as_str()).collect()
    }

    #[test]
    fn test_exclusion_scenario() {
        let candidates = vec![candidate("D1"), candidate("D2"), candidate("D3")];
        let exclusions = vec![ExclusionEntry {
            serial_number: Some("SN-D2".into()),
            ..Default::default()
        }];

        let plan = plan(&candidates, &exclusions, 2, RequestedAction::Delete).unwrap();

        assert_eq!(planned_ids(&plan), vec!["D1", "D3"]);
        assert_eq!(plan.skipped.len(), 1);
        assert_eq!(plan.skipped[0].candidate.id, "D2");
        assert_eq!(plan.skipped[0].skip_reason, SkipReason::Excluded);
    }

    #[test]
    fn test_exclusion_wins_over_cap() {
        let candidates = vec![candidate("D1"), candidate("D2")];
        let exclusions = vec![ExclusionEntry {
            device_id: Some("D1".into()),
            ..Default::default()
        }];

        let plan = plan(&candidates, &exclusions, 5, RequestedAction::Delete).unwrap();

        assert_eq!(planned_ids(&plan), vec!["D2"]);
        assert_eq!(plan.skipped[0].skip_reason, SkipReason::Excluded);
    }

    #[test]
    fn test_cap_exactness() {
        let candidates: Vec<_> = (0..7).map(|n| candidate(&format!("D{}", n))).collect();

        let plan = plan(&candidates, &[], 3, RequestedAction::Export).unwrap();

        assert_eq!(plan.planned.len(), 3);
        assert_eq!(plan.skipped.len(), 4);
        assert_eq!(plan.skipped_for(SkipReason::MaxCountReached), 4);
        assert_eq!(planned_ids(&plan), vec!["D0", "D1", "D2"]);
    }

    #[test]
    fn test_zero_cap_plans_nothing() {
        let candidates = vec![candidate("D1")];
        let plan = plan(&candidates, &[], 0, RequestedAction::Delete).unwrap();
        assert!(plan.planned.is_empty());
        assert_eq!(plan.skipped[0].skip_reason, SkipReason::MaxCountReached);
    }

    #[test]
    fn test_retire_skips_directory_devices() {
        let candidates = vec![directory_candidate("X"), candidate("D1")];

        let retire = plan(&candidates, &[], 10, RequestedAction::Retire).unwrap();
        assert_eq!(planned_ids(&retire), vec!["D1"]);
        assert_eq!(retire.skipped[0].skip_reason, SkipReason::ActionNotApplicable);

        let delete = plan(&candidates, &[], 10, RequestedAction::Delete).unwrap();
        assert_eq!(planned_ids(&delete), vec!["X", "D1"]);
        assert!(delete.skipped.is_empty());
    }

    #[test]
    fn test_rejects_negative_max_count() {
        let result = plan(&[candidate("D1")], &[], -1, RequestedAction::Export);
        assert!(matches!(result, Err(Error::InvalidArgument(_))));
    }
}
