//! テスト用のインメモリ実装
//!
//! `test-utils` feature で有効化される。Docker なしでカーネルを動かすためのもの。

use crate::lifecycle::{Clock, Kernel, LifecycleTimeouts};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use weaver_build::{BuildError, BuildResult, ImageBuilder, LanguageSpec};
use weaver_container::{
    ContainerError, ContainerRuntime, InstanceConfig, InstanceHandle, InstanceState, Result,
};
use weaver_core::RecordingSink;

/// ランタイムに対して行われた呼び出し
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuntimeCall {
    Create(String),
    Start(String),
    Stop(String),
    Remove(String),
    Inspect(String),
    Ping,
}

#[derive(Debug, Clone)]
struct FakeInstance {
    config: InstanceConfig,
    state: InstanceState,
}

#[derive(Debug, Default)]
struct FakeState {
    next: u64,
    instances: HashMap<String, FakeInstance>,
    /// 使用中のインスタンス名（Docker と同様に重複は Conflict）
    names: HashSet<String>,
    calls: Vec<RuntimeCall>,
    forced_handle: Option<String>,
    fail_create: bool,
    fail_start: bool,
    fail_stop: HashSet<String>,
    hang_stop: HashSet<String>,
    /// 猶予を使い切ってから戻るインスタンス（SIGTERM を無視するワークロード）
    slow_stop: HashSet<String>,
    stop_graces: Vec<Duration>,
    inspect_delay: Option<Duration>,
    fail_remove: bool,
    fail_inspect: bool,
    unreachable: bool,
}

/// In-memory [`ContainerRuntime`] with failure injection.
#[derive(Debug, Default)]
pub struct FakeRuntime {
    state: Mutex<FakeState>,
}

impl FakeRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn calls(&self) -> Vec<RuntimeCall> {
        self.lock().calls.clone()
    }

    pub fn count_calls<F>(&self, predicate: F) -> usize
    where
        F: Fn(&RuntimeCall) -> bool,
    {
        self.lock().calls.iter().filter(|c| predicate(c)).count()
    }

    /// 作成済みインスタンスの設定
    pub fn instance_config(&self, handle: &str) -> Option<InstanceConfig> {
        self.lock().instances.get(handle).map(|i| i.config.clone())
    }

    pub fn instance_count(&self) -> usize {
        self.lock().instances.len()
    }

    /// 以後の create が常にこのハンドルを返す（ID 衝突の再現用）
    pub fn force_handle(&self, handle: impl Into<String>) {
        self.lock().forced_handle = Some(handle.into());
    }

    pub fn set_state(&self, handle: &str, state: InstanceState) {
        if let Some(instance) = self.lock().instances.get_mut(handle) {
            instance.state = state;
        }
    }

    pub fn fail_create(&self, fail: bool) {
        self.lock().fail_create = fail;
    }

    pub fn fail_start(&self, fail: bool) {
        self.lock().fail_start = fail;
    }

    pub fn fail_stop_for(&self, handle: impl Into<String>) {
        self.lock().fail_stop.insert(handle.into());
    }

    /// stop が完了しないインスタンス
    pub fn hang_stop_for(&self, handle: impl Into<String>) {
        self.lock().hang_stop.insert(handle.into());
    }

    /// Docker と同じく、猶予 + SIGKILL の時間が経ってから stop が戻る
    pub fn slow_stop_for(&self, handle: impl Into<String>) {
        self.lock().slow_stop.insert(handle.into());
    }

    /// stop に渡された猶予
    pub fn stop_graces(&self) -> Vec<Duration> {
        self.lock().stop_graces.clone()
    }

    /// inspect が状態を読んでから戻るまでの遅延
    pub fn delay_inspect(&self, delay: Duration) {
        self.lock().inspect_delay = Some(delay);
    }

    pub fn fail_remove(&self, fail: bool) {
        self.lock().fail_remove = fail;
    }

    pub fn fail_inspect(&self, fail: bool) {
        self.lock().fail_inspect = fail;
    }

    pub fn set_unreachable(&self, unreachable: bool) {
        self.lock().unreachable = unreachable;
    }
}

fn handle_for(n: u64) -> String {
    format!("c{:011x}{}", n, "0".repeat(52))
}

#[async_trait]
impl ContainerRuntime for FakeRuntime {
    async fn create(&self, config: &InstanceConfig) -> Result<InstanceHandle> {
        let mut state = self.lock();
        state.calls.push(RuntimeCall::Create(config.name.clone()));

        if state.fail_create {
            return Err(ContainerError::DockerApiError("create failed".to_string()));
        }
        if state.names.contains(&config.name) {
            return Err(ContainerError::Conflict(format!(
                "The container name \"/{}\" is already in use",
                config.name
            )));
        }

        state.next += 1;
        let handle = state
            .forced_handle
            .clone()
            .unwrap_or_else(|| handle_for(state.next));
        state.names.insert(config.name.clone());
        state.instances.insert(
            handle.clone(),
            FakeInstance {
                config: config.clone(),
                state: InstanceState::Other("created".to_string()),
            },
        );
        Ok(InstanceHandle::new(handle))
    }

    async fn start(&self, handle: &InstanceHandle) -> Result<()> {
        let mut state = self.lock();
        state.calls.push(RuntimeCall::Start(handle.to_string()));

        if state.fail_start {
            return Err(ContainerError::DockerApiError("start failed".to_string()));
        }
        match state.instances.get_mut(handle.as_str()) {
            Some(instance) => {
                instance.state = InstanceState::Running;
                Ok(())
            }
            None => Err(ContainerError::NotFound(handle.to_string())),
        }
    }

    async fn stop(&self, handle: &InstanceHandle, timeout: Duration) -> Result<()> {
        let (hang, slow) = {
            let mut state = self.lock();
            state.calls.push(RuntimeCall::Stop(handle.to_string()));
            state.stop_graces.push(timeout);

            if state.fail_stop.contains(handle.as_str()) {
                return Err(ContainerError::DockerApiError("stop failed".to_string()));
            }
            (
                state.hang_stop.contains(handle.as_str()),
                state.slow_stop.contains(handle.as_str()),
            )
        };

        if hang {
            std::future::pending::<()>().await;
        }
        if slow {
            tokio::time::sleep(timeout + Duration::from_millis(50)).await;
        }

        if let Some(instance) = self.lock().instances.get_mut(handle.as_str()) {
            instance.state = InstanceState::Other("exited".to_string());
        }
        Ok(())
    }

    async fn remove(&self, handle: &InstanceHandle, _force: bool) -> Result<()> {
        let mut state = self.lock();
        state.calls.push(RuntimeCall::Remove(handle.to_string()));

        if state.fail_remove {
            return Err(ContainerError::DockerApiError("remove failed".to_string()));
        }
        if let Some(instance) = state.instances.get(handle.as_str()) {
            let name = instance.config.name.clone();
            state.names.remove(&name);
        }
        Ok(())
    }

    async fn inspect(&self, handle: &InstanceHandle) -> Result<InstanceState> {
        let (result, delay) = {
            let mut state = self.lock();
            state.calls.push(RuntimeCall::Inspect(handle.to_string()));

            if state.fail_inspect {
                return Err(ContainerError::DockerConnectionFailed(
                    "Connection refused".to_string(),
                ));
            }
            let result = state
                .instances
                .get(handle.as_str())
                .map(|i| i.state.clone())
                .ok_or_else(|| ContainerError::NotFound(handle.to_string()));
            (result, state.inspect_delay)
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        result
    }

    async fn ping(&self) -> Result<()> {
        let mut state = self.lock();
        state.calls.push(RuntimeCall::Ping);

        if state.unreachable {
            return Err(ContainerError::DockerConnectionFailed(
                "Connection refused".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
struct BuilderState {
    builds: Vec<(LanguageSpec, String)>,
    fail: bool,
    hang: bool,
}

/// In-memory [`ImageBuilder`] that records every build.
#[derive(Debug, Default)]
pub struct FakeBuilder {
    state: Mutex<BuilderState>,
}

impl FakeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, BuilderState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn builds(&self) -> Vec<(LanguageSpec, String)> {
        self.lock().builds.clone()
    }

    pub fn fail(&self, fail: bool) {
        self.lock().fail = fail;
    }

    pub fn hang(&self, hang: bool) {
        self.lock().hang = hang;
    }
}

#[async_trait]
impl ImageBuilder for FakeBuilder {
    async fn build(&self, spec: &LanguageSpec, tag: &str) -> BuildResult<()> {
        let hang = {
            let mut state = self.lock();
            state.builds.push((spec.clone(), tag.to_string()));
            if state.fail {
                return Err(BuildError::BuildFailed("base image not found".to_string()));
            }
            state.hang
        };

        if hang {
            std::future::pending::<()>().await;
        }
        Ok(())
    }
}

/// 常に同じ時刻を返す時計
pub fn fixed_clock(unix_secs: i64) -> Clock {
    let now = DateTime::<Utc>::from_timestamp(unix_secs, 0).unwrap_or_default();
    Arc::new(move || now)
}

/// 1秒ずつ進む時計（呼び出しごとに +1s）
pub fn ticking_clock(start_secs: i64) -> Clock {
    let tick = Arc::new(Mutex::new(start_secs));
    Arc::new(move || {
        let mut secs = tick.lock().unwrap_or_else(PoisonError::into_inner);
        let now = DateTime::<Utc>::from_timestamp(*secs, 0).unwrap_or_default();
        *secs += 1;
        now
    })
}

/// フェイク一式で組み立てたカーネル
pub struct TestKernel {
    pub kernel: Arc<Kernel>,
    pub runtime: Arc<FakeRuntime>,
    pub builder: Arc<FakeBuilder>,
    pub events: Arc<RecordingSink>,
}

impl TestKernel {
    pub fn new() -> Self {
        Self::with_clock(ticking_clock(1_700_000_000))
    }

    pub fn with_clock(clock: Clock) -> Self {
        Self::with(clock, LifecycleTimeouts::default())
    }

    pub fn with(clock: Clock, timeouts: LifecycleTimeouts) -> Self {
        let runtime = Arc::new(FakeRuntime::new());
        let builder = Arc::new(FakeBuilder::new());
        let events = Arc::new(RecordingSink::new());
        let kernel = Kernel::builder(runtime.clone(), builder.clone())
            .events(events.clone())
            .clock(clock)
            .timeouts(timeouts)
            .build();

        Self {
            kernel: Arc::new(kernel),
            runtime,
            builder,
            events,
        }
    }
}

impl Default for TestKernel {
    fn default() -> Self {
        Self::new()
    }
}
