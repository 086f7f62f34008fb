//! Apply a plan against Microsoft Graph
//!
//! Devices are processed one at a time. A failure on one device is recorded
//! in its outcome and the run moves on.

use crate::error::{Error, Result};
use crate::graph::{devices, GraphClient};
use crate::lifecycle::{CandidateSource, ClassifiedCandidate, RequestedAction};
use serde::Serialize;

/// Result of acting on one planned device
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionOutcome {
    pub device_id: String,
    pub display_name: String,
    pub source: CandidateSource,
    pub action: RequestedAction,
    pub succeeded: bool,
    pub error: Option<String>,
}

/// Execute `action` for every planned candidate. `Export` performs no calls.
pub async fn execute_plan<F>(
    client: &GraphClient,
    planned: &[ClassifiedCandidate],
    action: RequestedAction,
    mut on_outcome: F,
) -> Vec<ActionOutcome>
where
    F: FnMut(&ActionOutcome),
{
    if action == RequestedAction::Export {
        return Vec::new();
    }

    let mut outcomes = Vec::with_capacity(planned.len());

    for candidate in planned {
        let result = execute_one(client, candidate, action).await;

        let outcome = ActionOutcome {
            device_id: candidate.id.clone(),
            display_name: candidate.display_name.clone(),
            source: candidate.source,
            action,
            succeeded: result.is_ok(),
            error: result.err().map(|e| e.to_string()),
        };

        match &outcome.error {
            Some(error) => tracing::warn!(device = %outcome.device_id, %error, "{} failed", action),
            None => tracing::info!(device = %outcome.device_id, "{} succeeded", action),
        }

        on_outcome(&outcome);
        outcomes.push(outcome);
    }

    outcomes
}

async fn execute_one(
    client: &GraphClient,
    candidate: &ClassifiedCandidate,
    action: RequestedAction,
) -> Result<()> {
    match (action, candidate.source) {
        (RequestedAction::Retire, CandidateSource::ManagedDevice) => {
            devices::retire_managed_device(client, &candidate.id).await
        }
        (RequestedAction::Delete, CandidateSource::ManagedDevice) => {
            devices::delete_managed_device(client, &candidate.id).await
        }
        (RequestedAction::Delete, CandidateSource::DirectoryDevice) => {
            let object_id = candidate.directory_object_id.as_deref().ok_or_else(|| {
                Error::InvalidArgument(format!(
                    "directory device '{}' has no object id",
                    candidate.id
                ))
            })?;
            devices::delete_directory_device(client, object_id).await
        }
        (RequestedAction::Retire, CandidateSource::DirectoryDevice) => Err(Error::InvalidArgument(
            format!("directory device '{}' cannot be retired", candidate.id),
        )),
        (RequestedAction::Export, _) => Ok(()),
    }
}

/// (succeeded, failed)
pub fn summarize(outcomes: &[ActionOutcome]) -> (usize, usize) {
    let succeeded = outcomes.iter().filter(|o| o.succeeded).count();
    (succeeded, outcomes.len() - succeeded)
}
