//! End-to-end cleanup flow: classify, plan, execute against a mock Graph,
//! and report.

use chrono::{Duration, Utc};
use devicesweep::executor::{execute_plan, summarize};
use devicesweep::graph::{GraphClient, RetryPolicy};
use devicesweep::lifecycle::{
    classify_at, parse_exclusions, plan, CandidateSource, DeviceRecord, DirectoryDeviceRecord,
    ReasonCode, RequestedAction, SkipReason,
};
use devicesweep::report::{write_report, ReportFormat, RunReport};
use wiremock::matchers::{any, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn device(id: &str, upn: Option<&str>, days_since_sync: Option<i64>) -> DeviceRecord {
    DeviceRecord {
        id: id.to_string(),
        directory_id: Some(format!("aad-{}", id)),
        display_name: format!("PC-{}", id),
        user_principal_name: upn.map(str::to_string),
        serial_number: Some(format!("SN-{}", id)),
        last_sync_time: days_since_sync.map(|d| Utc::now() - Duration::days(d)),
        enrollment_state: "normal".into(),
        management_agent: "mdm".into(),
        operating_system: "Windows".into(),
    }
}

fn orphan_directory_device() -> DirectoryDeviceRecord {
    DirectoryDeviceRecord {
        id: "dir-1".into(),
        object_id: Some("obj-1".into()),
        display_name: "GHOST".into(),
        serial_number: None,
        operating_system: "Windows".into(),
        approximate_last_sign_in: Some(Utc::now() - Duration::days(400)),
        registration_time: None,
        created_time: None,
    }
}

async fn mock_client(server: &MockServer) -> GraphClient {
    GraphClient::with_base_url("token".into(), &format!("{}/v1.0", server.uri())).with_retry_policy(
        RetryPolicy {
            max_retries: 1,
            initial_backoff_ms: 1,
            max_backoff_ms: 1,
        },
    )
}

#[tokio::test]
async fn test_delete_run_executes_planned_and_continues_after_failure() {
    let server = MockServer::start().await;

    Mock::given(method("DELETE"))
        .and(path("/v1.0/deviceManagement/managedDevices/stale"))
        .respond_with(ResponseTemplate::new(404).set_body_json(serde_json::json!({
            "error": {"code": "NotFound", "message": "gone"}
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/v1.0/deviceManagement/managedDevices/orphan"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/v1.0/devices/obj-1"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let managed = vec![
        device("healthy", Some("a@contoso.com"), Some(3)),
        device("stale", Some("b@contoso.com"), Some(200)),
        device("orphan", None, Some(1)),
        device("keep", None, None),
    ];
    let exclusions = parse_exclusions("DeviceName\nPC-keep\n".as_bytes()).unwrap();

    let candidates =
        classify_at(&managed, &[orphan_directory_device()], 90, 1, Utc::now()).unwrap();
    let ids: Vec<_> = candidates.iter().map(|c| c.id.as_str()).collect();
    assert_eq!(ids, vec!["stale", "keep", "orphan", "dir-1"]);

    let action_plan = plan(&candidates, &exclusions, 10, RequestedAction::Delete).unwrap();
    assert_eq!(action_plan.planned.len(), 3);
    assert_eq!(action_plan.skipped[0].candidate.id, "keep");
    assert_eq!(action_plan.skipped[0].skip_reason, SkipReason::Excluded);

    let client = mock_client(&server).await;
    let mut seen = 0;
    let outcomes = execute_plan(&client, &action_plan.planned, RequestedAction::Delete, |_| {
        seen += 1
    })
    .await;

    assert_eq!(seen, 3);
    assert_eq!(summarize(&outcomes), (2, 1));
    assert!(!outcomes[0].succeeded);
    assert!(outcomes[0].error.as_deref().unwrap().contains("NotFound"));
    assert_eq!(outcomes[2].source, CandidateSource::DirectoryDevice);
    assert!(outcomes[2].succeeded);
}

#[tokio::test]
async fn test_retire_run_skips_directory_devices() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1.0/deviceManagement/managedDevices/stale/retire"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let managed = vec![device("stale", Some("b@contoso.com"), Some(120))];
    let candidates =
        classify_at(&managed, &[orphan_directory_device()], 90, 1, Utc::now()).unwrap();
    let action_plan = plan(&candidates, &[], 10, RequestedAction::Retire).unwrap();

    assert_eq!(action_plan.planned.len(), 1);
    assert_eq!(
        action_plan.skipped_for(SkipReason::ActionNotApplicable),
        1
    );

    let client = mock_client(&server).await;
    let outcomes =
        execute_plan(&client, &action_plan.planned, RequestedAction::Retire, |_| {}).await;
    assert_eq!(summarize(&outcomes), (1, 0));
}

#[tokio::test]
async fn test_export_never_calls_graph() {
    let server = MockServer::start().await;
    Mock::given(any())
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;

    let managed = vec![device("stale", None, None)];
    let candidates = classify_at(&managed, &[], 90, 1, Utc::now()).unwrap();
    let action_plan = plan(&candidates, &[], 10, RequestedAction::Export).unwrap();
    assert_eq!(action_plan.planned.len(), 1);

    let client = mock_client(&server).await;
    let outcomes =
        execute_plan(&client, &action_plan.planned, RequestedAction::Export, |_| {}).await;
    assert!(outcomes.is_empty());
}

#[test]
fn test_snapshot_to_report() {
    let managed_json = r#"[
        {"id": "m-1", "displayName": "LAPTOP-01", "userPrincipalName": "u@x.com",
         "lastSyncTime": null, "operatingSystem": "Windows"},
        {"id": "m-2", "displayName": "LAPTOP-02", "userPrincipalName": "u@x.com",
         "lastSyncTime": "2099-01-01T00:00:00Z", "operatingSystem": "Windows"}
    ]"#;
    let managed: Vec<DeviceRecord> = serde_json::from_str(managed_json).unwrap();

    let candidates = classify_at(&managed, &[], 90, 1, Utc::now()).unwrap();
    assert_eq!(candidates.len(), 1);
    assert_eq!(
        candidates[0].reason_codes,
        vec![ReasonCode::LastSyncStale, ReasonCode::DuplicateRegistration]
    );

    let action_plan = plan(&candidates, &[], 0, RequestedAction::Delete).unwrap();
    let report = RunReport {
        generated_at: Utc::now(),
        tenant: None,
        requested_action: RequestedAction::Delete,
        dry_run: true,
        stale_days: 90,
        duplicate_threshold: 1,
        max_count: 0,
        candidates,
        plan: action_plan,
        outcomes: Vec::new(),
    };

    let dir = tempfile::tempdir().unwrap();
    let files = write_report(&report, dir.path(), ReportFormat::Html).unwrap();
    let html = std::fs::read_to_string(&files[0]).unwrap();
    assert!(html.contains("LAPTOP-01"));
    assert!(html.contains("MaxCountReached"));
}
