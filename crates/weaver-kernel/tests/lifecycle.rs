//! Lifecycle manager behaviour against the in-memory runtime.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use weaver_build::BuildError;
use weaver_container::{
    ContainerError, InstanceState, LABEL_LANGUAGE, LABEL_MANAGED, LABEL_NODE, LABEL_PROCESS,
};
use weaver_core::{KernelEvent, ProcessStatus, RegistryError, StartStep, StatusReport};
use weaver_kernel::testing::{RuntimeCall, TestKernel, fixed_clock, ticking_clock};
use weaver_kernel::{KernelError, LifecycleTimeouts, StartRequest};

fn request(name: &str) -> StartRequest {
    StartRequest {
        name: name.to_string(),
        language: "python".to_string(),
        command: String::new(),
        node_id: "localhost".to_string(),
        port: 8000,
        memory_limit: 536_870_912,
        cpu_shares: 1024,
        environment: HashMap::new(),
    }
}

fn handle_of(t: &TestKernel, process_id: &str) -> String {
    t.kernel
        .registry()
        .get(process_id)
        .unwrap()
        .runtime_handle()
        .to_string()
}

#[tokio::test]
async fn test_status_of_unknown_id_is_not_found() {
    let t = TestKernel::new();
    assert_eq!(
        t.kernel.get_process_status("does-not-exist").await,
        StatusReport::NotFound
    );
    assert!(t.runtime.calls().is_empty());
}

#[tokio::test]
async fn test_start_registers_running_record() {
    let t = TestKernel::new();

    let id = t.kernel.start_process(request("svc-a")).await.unwrap();
    assert_eq!(id.len(), 12);

    let record = t.kernel.registry().get(&id).unwrap();
    assert_eq!(record.status(), ProcessStatus::Running);
    assert_eq!(record.name, "svc-a");
    assert_eq!(record.language, "python");
    assert_eq!(record.port, 8000);
    assert_eq!(record.image, "weaver-app-svc-a:latest");
    assert!(record.instance_name.starts_with("weaver-svc-a-"));
    assert!(record.runtime_handle().starts_with(&id));

    assert_eq!(
        t.runtime.calls(),
        vec![
            RuntimeCall::Create(record.instance_name.clone()),
            RuntimeCall::Start(record.runtime_handle().to_string()),
        ]
    );
    assert_eq!(
        t.events
            .count(|e| matches!(e, KernelEvent::ProcessStarted { process_id, .. } if *process_id == id)),
        1
    );
}

#[tokio::test]
async fn test_start_derives_runtime_config() {
    let t = TestKernel::with_clock(fixed_clock(1_700_000_000));
    let mut req = request("api");
    req.environment.insert("DEBUG".to_string(), "1".to_string());
    req.node_id = "node-7".to_string();

    let id = t.kernel.start_process(req).await.unwrap();
    let config = t.runtime.instance_config(&handle_of(&t, &id)).unwrap();

    assert_eq!(config.name, "weaver-api-1700000000");
    assert_eq!(config.image, "weaver-app-api:latest");
    assert_eq!(config.exposed_port, Some(8000));
    assert_eq!(config.memory_limit, 536_870_912);
    assert_eq!(config.cpu_shares, 1024);
    assert_eq!(config.environment.get("DEBUG"), Some(&"1".to_string()));
    assert_eq!(config.labels.get(LABEL_MANAGED), Some(&"true".to_string()));
    assert_eq!(config.labels.get(LABEL_PROCESS), Some(&"api".to_string()));
    assert_eq!(config.labels.get(LABEL_NODE), Some(&"node-7".to_string()));
    assert_eq!(config.labels.get(LABEL_LANGUAGE), Some(&"python".to_string()));
}

#[tokio::test]
async fn test_start_passes_language_spec_to_builder() {
    let t = TestKernel::new();
    let mut req = request("worker");
    req.language = "node".to_string();
    req.command = "node server.js".to_string();
    t.kernel.start_process(req).await.unwrap();

    let mut blank = request("blank");
    blank.command = "   ".to_string();
    t.kernel.start_process(blank).await.unwrap();

    let builds = t.builder.builds();
    assert_eq!(builds.len(), 2);
    assert_eq!(builds[0].0.language, "node");
    assert_eq!(builds[0].0.command.as_deref(), Some("node server.js"));
    assert_eq!(builds[0].1, "weaver-app-worker:latest");
    assert_eq!(builds[1].0.command, None);
}

#[tokio::test]
async fn test_build_failure_leaves_registry_untouched() {
    let t = TestKernel::new();
    t.builder.fail(true);

    let before = t.kernel.registry().len();
    let err = t.kernel.start_process(request("svc-a")).await.unwrap_err();

    assert!(matches!(err, KernelError::BuildFailed(_)));
    assert!(err.to_string().starts_with("Failed to build container: "));
    assert_eq!(t.kernel.registry().len(), before);
    assert!(t.runtime.calls().is_empty());
    assert_eq!(
        t.events.count(|e| matches!(
            e,
            KernelEvent::StartFailed {
                step: StartStep::Build,
                ..
            }
        )),
        1
    );
}

#[tokio::test]
async fn test_create_failure_leaves_registry_untouched() {
    let t = TestKernel::new();
    t.runtime.fail_create(true);

    let err = t.kernel.start_process(request("svc-a")).await.unwrap_err();
    assert!(matches!(err, KernelError::CreateFailed(_)));
    assert!(err.to_string().starts_with("Failed to create container: "));
    assert!(t.kernel.registry().is_empty());
}

#[tokio::test]
async fn test_start_failure_leaves_registry_untouched() {
    let t = TestKernel::new();
    t.runtime.fail_start(true);

    let err = t.kernel.start_process(request("svc-a")).await.unwrap_err();
    assert!(matches!(err, KernelError::StartFailed(_)));
    assert!(t.kernel.registry().is_empty());
    // 作成済みのインスタンスは片付けない
    assert_eq!(t.runtime.instance_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_build_deadline_is_a_build_failure() {
    let timeouts = LifecycleTimeouts {
        build: Duration::from_secs(5),
        ..Default::default()
    };
    let t = TestKernel::with(ticking_clock(1_700_000_000), timeouts);
    t.builder.hang(true);

    let err = t.kernel.start_process(request("svc-a")).await.unwrap_err();
    assert!(matches!(err, KernelError::BuildFailed(BuildError::Timeout(_))));
    assert!(t.kernel.registry().is_empty());
}

#[tokio::test]
async fn test_same_name_same_second_collides_on_create() {
    let t = TestKernel::with_clock(fixed_clock(1_700_000_000));

    let first = t.kernel.start_process(request("svc-a")).await;
    let second = t.kernel.start_process(request("svc-a")).await;

    assert!(first.is_ok());
    let err = second.unwrap_err();
    assert!(matches!(
        err,
        KernelError::CreateFailed(ContainerError::Conflict(_))
    ));
    assert_eq!(t.kernel.registry().len(), 1);
}

#[tokio::test]
async fn test_process_id_collision_is_rejected() {
    let t = TestKernel::new();
    t.runtime
        .force_handle("deadbeefcafe0000000000000000000000000000000000000000000000000000");

    t.kernel.start_process(request("svc-a")).await.unwrap();
    let err = t.kernel.start_process(request("svc-b")).await.unwrap_err();

    assert!(matches!(
        err,
        KernelError::Registry(RegistryError::AlreadyExists(ref id)) if id == "deadbeefcafe"
    ));
    let record = t.kernel.registry().get("deadbeefcafe").unwrap();
    assert_eq!(record.name, "svc-a");
    assert_eq!(t.kernel.registry().len(), 1);
}

#[tokio::test]
async fn test_stop_unknown_id_never_touches_runtime() {
    let t = TestKernel::new();

    let err = t.kernel.stop_process("nope").await.unwrap_err();
    assert!(matches!(err, KernelError::NotFound(_)));
    assert_eq!(err.to_string(), "Process not found");
    assert!(t.runtime.calls().is_empty());
}

#[tokio::test]
async fn test_stop_then_remove() {
    let t = TestKernel::new();
    let id = t.kernel.start_process(request("svc-a")).await.unwrap();
    let handle = handle_of(&t, &id);

    t.kernel.stop_process(&id).await.unwrap();

    let calls = t.runtime.calls();
    assert_eq!(
        &calls[2..],
        &[RuntimeCall::Stop(handle.clone()), RuntimeCall::Remove(handle)]
    );
    assert_eq!(
        t.kernel.registry().get(&id).unwrap().status(),
        ProcessStatus::Stopped
    );
}

#[tokio::test]
async fn test_stop_failure_keeps_status() {
    let t = TestKernel::new();
    let id = t.kernel.start_process(request("svc-a")).await.unwrap();
    t.runtime.fail_stop_for(handle_of(&t, &id));

    let err = t.kernel.stop_process(&id).await.unwrap_err();
    assert!(matches!(err, KernelError::StopFailed(_)));
    assert!(err.to_string().starts_with("Failed to stop container: "));
    assert_eq!(
        t.kernel.registry().get(&id).unwrap().status(),
        ProcessStatus::Running
    );
    assert_eq!(
        t.runtime
            .count_calls(|c| matches!(c, RuntimeCall::Remove(_))),
        0
    );
}

#[tokio::test(start_paused = true)]
async fn test_stop_deadline_is_a_stop_failure() {
    let t = TestKernel::new();
    let id = t.kernel.start_process(request("svc-a")).await.unwrap();
    t.runtime.hang_stop_for(handle_of(&t, &id));

    let err = t.kernel.stop_process(&id).await.unwrap_err();
    assert!(matches!(
        err,
        KernelError::StopFailed(ContainerError::Timeout { operation: "stop", .. })
    ));
    assert_eq!(
        t.kernel.registry().get(&id).unwrap().status(),
        ProcessStatus::Running
    );
}

#[tokio::test(start_paused = true)]
async fn test_stop_that_uses_full_grace_succeeds() {
    let t = TestKernel::new();
    let id = t.kernel.start_process(request("svc-a")).await.unwrap();
    let handle = handle_of(&t, &id);
    // SIGTERM を無視するワークロード: ランタイムは猶予を使い切ってから SIGKILL する
    t.runtime.slow_stop_for(handle.clone());

    let started = tokio::time::Instant::now();
    t.kernel.stop_process(&id).await.unwrap();

    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_secs(28) && elapsed < Duration::from_secs(30));
    assert_eq!(t.runtime.stop_graces(), vec![Duration::from_secs(28)]);
    assert_eq!(
        &t.runtime.calls()[2..],
        &[RuntimeCall::Stop(handle.clone()), RuntimeCall::Remove(handle)]
    );
    assert_eq!(
        t.kernel.registry().get(&id).unwrap().status(),
        ProcessStatus::Stopped
    );
}

#[tokio::test(start_paused = true)]
async fn test_stale_inspect_does_not_overwrite_stop() {
    let t = TestKernel::new();
    let id = t.kernel.start_process(request("svc-a")).await.unwrap();
    t.runtime.delay_inspect(Duration::from_secs(2));

    let kernel = t.kernel.clone();
    let query_id = id.clone();
    let query = tokio::spawn(async move { kernel.get_process_status(&query_id).await });

    // inspect が running を読んだあとで停止する
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(
        t.runtime
            .count_calls(|c| matches!(c, RuntimeCall::Inspect(_))),
        1
    );
    t.kernel.stop_process(&id).await.unwrap();

    assert_eq!(query.await.unwrap(), StatusReport::Running);
    assert_eq!(
        t.kernel.registry().get(&id).unwrap().status(),
        ProcessStatus::Stopped
    );
    assert_eq!(t.kernel.list_processes()[0].status, ProcessStatus::Stopped);
}

#[tokio::test]
async fn test_remove_failure_is_not_fatal() {
    let t = TestKernel::new();
    let id = t.kernel.start_process(request("svc-a")).await.unwrap();
    t.runtime.fail_remove(true);

    t.kernel.stop_process(&id).await.unwrap();
    assert_eq!(
        t.kernel.registry().get(&id).unwrap().status(),
        ProcessStatus::Stopped
    );
    assert_eq!(
        t.events
            .count(|e| matches!(e, KernelEvent::RemoveFailed { .. })),
        1
    );
}

#[tokio::test]
async fn test_start_status_stop_scenario() {
    let t = TestKernel::new();

    let id = t.kernel.start_process(request("svc-a")).await.unwrap();
    assert_eq!(t.kernel.get_process_status(&id).await, StatusReport::Running);

    t.kernel.stop_process(&id).await.unwrap();
    assert_eq!(
        t.kernel.registry().get(&id).unwrap().status(),
        ProcessStatus::Stopped
    );

    // ライブの inspect がキャッシュより優先される
    t.runtime.set_state(&handle_of(&t, &id), InstanceState::Dead);
    assert_eq!(t.kernel.get_process_status(&id).await, StatusReport::Failed);
    assert_eq!(
        t.kernel.registry().get(&id).unwrap().status(),
        ProcessStatus::Failed
    );
}

#[tokio::test]
async fn test_other_states_map_to_stopped() {
    let t = TestKernel::new();
    let id = t.kernel.start_process(request("svc-a")).await.unwrap();

    t.runtime
        .set_state(&handle_of(&t, &id), InstanceState::Other("paused".into()));
    assert_eq!(t.kernel.get_process_status(&id).await, StatusReport::Stopped);
}

#[tokio::test]
async fn test_inspect_failure_degrades_to_unknown() {
    let t = TestKernel::new();
    let id = t.kernel.start_process(request("svc-a")).await.unwrap();
    t.runtime.fail_inspect(true);

    assert_eq!(t.kernel.get_process_status(&id).await, StatusReport::Unknown);
    // キャッシュは変更しない
    assert_eq!(
        t.kernel.registry().get(&id).unwrap().status(),
        ProcessStatus::Running
    );
    assert_eq!(
        t.events
            .count(|e| matches!(e, KernelEvent::StatusDegraded { .. })),
        1
    );
}

#[tokio::test]
async fn test_list_is_ordered_by_creation() {
    let t = TestKernel::new();
    let a = t.kernel.start_process(request("svc-a")).await.unwrap();
    let b = t.kernel.start_process(request("svc-b")).await.unwrap();
    let c = t.kernel.start_process(request("svc-c")).await.unwrap();
    t.kernel.stop_process(&b).await.unwrap();

    let list = t.kernel.list_processes();
    let ids: Vec<&str> = list.iter().map(|p| p.process_id.as_str()).collect();
    assert_eq!(ids, vec![a.as_str(), b.as_str(), c.as_str()]);
    assert_eq!(list[1].status, ProcessStatus::Stopped);
    assert_eq!(list[0].name, "svc-a");
    assert_eq!(list[0].port, 8000);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_list_is_a_snapshot_under_concurrent_starts() {
    let t = TestKernel::new();
    const STARTS: usize = 64;

    let mut tasks = Vec::new();
    for i in 0..STARTS {
        let kernel = Arc::clone(&t.kernel);
        tasks.push(tokio::spawn(async move {
            kernel.start_process(request(&format!("svc-{}", i))).await
        }));
    }

    let kernel = Arc::clone(&t.kernel);
    let lister = tokio::spawn(async move {
        let mut previous = 0;
        for _ in 0..200 {
            let list = kernel.list_processes();
            let mut ids: Vec<&str> = list.iter().map(|p| p.process_id.as_str()).collect();
            ids.sort();
            ids.dedup();
            assert_eq!(ids.len(), list.len());
            assert!(list.len() >= previous);
            assert!(list.len() <= STARTS);
            previous = list.len();
            tokio::task::yield_now().await;
        }
    });

    for task in tasks {
        task.await.unwrap().unwrap();
    }
    lister.await.unwrap();
    assert_eq!(t.kernel.list_processes().len(), STARTS);
}

#[tokio::test]
async fn test_health_check() {
    let t = TestKernel::new();

    let health = t.kernel.health_check().await;
    assert!(health.healthy);
    assert_eq!(health.status, "healthy");
    assert_eq!(health.message, "Kernel is healthy");

    t.runtime.set_unreachable(true);
    let health = t.kernel.health_check().await;
    assert!(!health.healthy);
    assert_eq!(health.status, "unhealthy");
    assert_eq!(health.message, "Docker daemon unreachable: Connection refused");
}
