//! RPC frontend over a real HTTP socket.

use serde_json::{Value, json};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use weaver_kernel::rpc::{
    GetProcessStatusResponse, HealthCheckResponse, ListProcessesResponse, RpcServer,
    ServiceDescriptor, StartProcessResponse, StopProcessResponse,
};
use weaver_kernel::testing::{TestKernel, fixed_clock};

struct Harness {
    t: TestKernel,
    base: String,
    client: reqwest::Client,
    token: CancellationToken,
    server: JoinHandle<std::io::Result<()>>,
}

async fn start_server(introspection: bool) -> Harness {
    let t = TestKernel::with_clock(fixed_clock(1_700_000_000));
    let server = RpcServer::bind(
        "127.0.0.1:0".parse().unwrap(),
        t.kernel.clone(),
        introspection,
    )
    .await
    .unwrap();
    let addr: SocketAddr = server.local_addr().unwrap();
    let token = CancellationToken::new();
    let server = tokio::spawn(server.run(token.clone()));

    Harness {
        t,
        base: format!("http://{}/kernel.v1.KernelService", addr),
        client: reqwest::Client::new(),
        token,
        server,
    }
}

impl Harness {
    async fn call(&self, operation: &str, body: Value) -> reqwest::Response {
        self.client
            .post(format!("{}/{}", self.base, operation))
            .json(&body)
            .send()
            .await
            .unwrap()
    }

    async fn start(&self, name: &str) -> StartProcessResponse {
        self.call(
            "StartProcess",
            json!({
                "name": name,
                "language": "python",
                "command": "",
                "node_id": "localhost",
                "port": 8000,
                "memory_limit": 536870912,
                "cpu_shares": 1024,
                "environment": {"MODE": "test"}
            }),
        )
        .await
        .json()
        .await
        .unwrap()
    }
}

#[tokio::test]
async fn test_health_check() {
    let h = start_server(false).await;

    let response = h.call("HealthCheck", json!({})).await;
    assert_eq!(response.status(), 200);
    let body: HealthCheckResponse = response.json().await.unwrap();
    assert_eq!(body.status, "healthy");
    assert_eq!(body.message, "Kernel is healthy");

    h.t.runtime.set_unreachable(true);
    let body: HealthCheckResponse = h.call("HealthCheck", json!({})).await.json().await.unwrap();
    assert_eq!(body.status, "unhealthy");
    assert!(body.message.starts_with("Docker daemon unreachable: "));
}

#[tokio::test]
async fn test_start_status_list_stop() {
    let h = start_server(false).await;

    let started = h.start("svc-a").await;
    assert!(started.success);
    assert_eq!(started.message, "Process started successfully");
    assert_eq!(started.process_id.len(), 12);

    let builds = h.t.builder.builds();
    assert_eq!(builds[0].0.environment.get("MODE"), Some(&"test".to_string()));

    let status: GetProcessStatusResponse = h
        .call("GetProcessStatus", json!({"process_id": started.process_id}))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(status.status, "running");

    let list: ListProcessesResponse = h.call("ListProcesses", json!({})).await.json().await.unwrap();
    assert_eq!(list.processes.len(), 1);
    let info = &list.processes[0];
    assert_eq!(info.process_id, started.process_id);
    assert_eq!(info.name, "svc-a");
    assert_eq!(info.status, "running");
    assert_eq!(info.language, "python");
    assert_eq!(info.port, 8000);
    assert_eq!(info.created_at, 1_700_000_000);

    let response = h
        .call("StopProcess", json!({"process_id": started.process_id}))
        .await;
    assert_eq!(response.status(), 200);
    let stopped: StopProcessResponse = response.json().await.unwrap();
    assert!(stopped.success);
    assert_eq!(stopped.message, "Process stopped successfully");

    let list: ListProcessesResponse = h.call("ListProcesses", json!({})).await.json().await.unwrap();
    assert_eq!(list.processes[0].status, "stopped");
}

#[tokio::test]
async fn test_status_of_unknown_process() {
    let h = start_server(false).await;

    let status: GetProcessStatusResponse = h
        .call("GetProcessStatus", json!({"process_id": "nope"}))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(status.status, "not_found");
}

#[tokio::test]
async fn test_stop_unknown_process_is_404() {
    let h = start_server(false).await;

    let response = h.call("StopProcess", json!({"process_id": "nope"})).await;
    assert_eq!(response.status(), 404);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body, json!({"success": false, "message": "Process not found"}));
    assert!(h.t.runtime.calls().is_empty());
}

#[tokio::test]
async fn test_stop_failure_is_reported() {
    let h = start_server(false).await;
    let started = h.start("svc-a").await;
    let handle = h
        .t
        .kernel
        .registry()
        .get(&started.process_id)
        .unwrap()
        .runtime_handle()
        .to_string();
    h.t.runtime.fail_stop_for(handle);

    let response = h
        .call("StopProcess", json!({"process_id": started.process_id}))
        .await;
    assert_eq!(response.status(), 200);
    let body: StopProcessResponse = response.json().await.unwrap();
    assert!(!body.success);
    assert!(body.message.starts_with("Failed to stop container: "));
}

#[tokio::test]
async fn test_start_failure_is_reported() {
    let h = start_server(false).await;
    h.t.builder.fail(true);

    let started = h.start("svc-a").await;
    assert!(!started.success);
    assert!(started.process_id.is_empty());
    assert!(started.message.starts_with("Failed to build container: "));
    assert!(h.t.kernel.registry().is_empty());
}

#[tokio::test]
async fn test_same_name_twice_in_one_second() {
    let h = start_server(false).await;

    assert!(h.start("svc-a").await.success);
    let second = h.start("svc-a").await;
    assert!(!second.success);
    assert!(second.message.starts_with("Failed to create container: "));
}

#[tokio::test]
async fn test_missing_fields_take_defaults() {
    let h = start_server(false).await;

    let response = h.call("StartProcess", json!({"name": "bare"})).await;
    let body: StartProcessResponse = response.json().await.unwrap();
    assert!(body.success);

    let record = h.t.kernel.registry().get(&body.process_id).unwrap();
    assert_eq!(record.port, 0);
    assert_eq!(record.language, "");
}

#[tokio::test]
async fn test_malformed_json_is_rejected() {
    let h = start_server(false).await;

    let response = h
        .client
        .post(format!("{}/StartProcess", h.base))
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert!(response.status().is_client_error());
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["success"], json!(false));
    assert!(h.t.builder.builds().is_empty());
}

#[tokio::test]
async fn test_introspection_disabled_by_default() {
    let h = start_server(false).await;

    let response = h.client.get(&h.base).send().await.unwrap();
    assert_eq!(response.status(), 404);
}

#[tokio::test]
async fn test_introspection_lists_operations() {
    let h = start_server(true).await;

    let response = h.client.get(&h.base).send().await.unwrap();
    assert_eq!(response.status(), 200);
    let descriptor: ServiceDescriptor = response.json().await.unwrap();
    assert_eq!(descriptor.service, "kernel.v1.KernelService");
    let names: Vec<&str> = descriptor.methods.iter().map(|m| m.name.as_str()).collect();
    assert_eq!(
        names,
        vec![
            "StartProcess",
            "StopProcess",
            "GetProcessStatus",
            "ListProcesses",
            "HealthCheck"
        ]
    );
}

#[tokio::test]
async fn test_graceful_shutdown() {
    let h = start_server(false).await;
    assert_eq!(h.call("HealthCheck", json!({})).await.status(), 200);

    h.token.cancel();
    tokio::time::timeout(Duration::from_secs(5), h.server)
        .await
        .expect("server should stop after cancellation")
        .unwrap()
        .unwrap();
}
