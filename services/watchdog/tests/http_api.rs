//! HTTP trigger served over a real listener, backed by in-memory fakes.

use std::sync::Arc;

use serde_json::Value;
use tokio::net::TcpListener;
use watchdog_reconcile::{ComputeInstance, InstanceStatus, ReconcileTarget, Reconciler, WorkStatus};
use watchdog_service::{api, AppState};
use watchdog_testing::{job, run, FakeBuildSystem, FakeFleet, FleetCall};

const WORKFLOW_PATH: &str = ".github/workflows/build.yml";

fn target() -> ReconcileTarget {
    ReconcileTarget {
        project: "acme-ci".to_string(),
        zone: "europe-west1-b".to_string(),
        organization: "acme".to_string(),
        repository: "game".to_string(),
    }
}

async fn start_api(build_system: FakeBuildSystem, fleet: Arc<FakeFleet>) -> String {
    let reconciler = Reconciler::new(Arc::new(build_system), fleet);
    let app = api::create_router(AppState::new(reconciler, target()));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    format!("http://{addr}")
}

fn queued_build() -> FakeBuildSystem {
    FakeBuildSystem::new()
        .with_run(run(100, WorkStatus::Queued, 7, "abc123"))
        .with_workflow(7, WORKFLOW_PATH)
        .with_file(
            "abc123",
            WORKFLOW_PATH,
            "jobs:\n  build-win64:\n    runs-on: build_agent\n",
        )
        .with_jobs(100, vec![job("build-win64", WorkStatus::Queued)])
}

#[tokio::test]
async fn test_healthz() {
    let base_url = start_api(FakeBuildSystem::new(), FakeFleet::shared(vec![])).await;

    let response = reqwest::get(format!("{base_url}/healthz")).await.unwrap();
    assert_eq!(response.status(), 200);

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["service"], "runner-watchdog");
}

#[tokio::test]
async fn test_pass_reports_started_and_stopped_instances() {
    let fleet = FakeFleet::shared(vec![
        ComputeInstance::new("agent-1", "build_agent", InstanceStatus::Terminated),
        ComputeInstance::new("agent-2", "gpu_agent", InstanceStatus::Running),
    ]);
    let base_url = start_api(queued_build(), Arc::clone(&fleet)).await;

    let response = reqwest::Client::new()
        .post(format!("{base_url}/"))
        .body("ignored")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["required_labels"], serde_json::json!(["build_agent"]));
    assert_eq!(
        body["started_instances"],
        serde_json::json!([
            {"instance_name": "agent-1", "runner_name": "build_agent", "status": "TERMINATED"}
        ])
    );
    assert_eq!(
        body["stopped_instances"],
        serde_json::json!([
            {"instance_name": "agent-2", "runner_name": "gpu_agent", "status": "RUNNING"}
        ])
    );
    assert_eq!(
        fleet.calls(),
        [
            FleetCall::Start("agent-1".to_string()),
            FleetCall::Stop("agent-2".to_string()),
        ]
    );
}

#[tokio::test]
async fn test_converged_fleet_reports_empty_lists() {
    let fleet = FakeFleet::shared(vec![ComputeInstance::new(
        "agent-1",
        "build_agent",
        InstanceStatus::Running,
    )]);
    let base_url = start_api(queued_build(), Arc::clone(&fleet)).await;

    let body: Value = reqwest::get(format!("{base_url}/"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(body["started_instances"], serde_json::json!([]));
    assert_eq!(body["stopped_instances"], serde_json::json!([]));
    assert!(fleet.calls().is_empty());
}

#[tokio::test]
async fn test_failed_pass_returns_server_error() {
    let build_system = FakeBuildSystem::new()
        .with_run(run(100, WorkStatus::Queued, 7, "abc123"))
        .with_workflow(7, WORKFLOW_PATH)
        .with_file_status("abc123", WORKFLOW_PATH, 404);
    let fleet = FakeFleet::shared(vec![ComputeInstance::new(
        "agent-2",
        "gpu_agent",
        InstanceStatus::Running,
    )]);
    let base_url = start_api(build_system, Arc::clone(&fleet)).await;

    let response = reqwest::Client::new()
        .post(format!("{base_url}/"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 500);

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["code"], "remote_error");
    assert!(body["message"]
        .as_str()
        .unwrap()
        .starts_with("Error during processing"));
    assert!(fleet.calls().is_empty());
}
