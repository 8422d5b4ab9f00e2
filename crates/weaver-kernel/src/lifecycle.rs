//! ライフサイクルマネージャー
//!
//! start / stop / status / list / health の5操作をレジストリとランタイムに対して実行する。
//! レジストリを書き換えるのはこのモジュールだけ。外部呼び出しはすべて期限付きで、
//! レジストリのロックを保持したまま行うことはない。

use crate::error::{KernelError, Result};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use weaver_build::{BuildError, ImageBuilder, LanguageSpec};
use weaver_container::{
    ContainerError, ContainerRuntime, InstanceConfig, InstanceHandle, InstanceState,
    managed_labels,
};
use weaver_core::{
    EventSink, KernelEvent, ProcessRecord, ProcessRegistry, ProcessStatus, ProcessSummary,
    StartStep, StatusReport, TracingSink,
};

/// プロセスIDとして使うランタイムハンドルの先頭文字数
pub const PROCESS_ID_LEN: usize = 12;

/// 停止期限のうち、猶予切れ後の SIGKILL と応答に残しておく時間
pub const STOP_KILL_MARGIN: Duration = Duration::from_secs(2);

/// インスタンス名・作成時刻に使う時計
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// 外部呼び出しの期限
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LifecycleTimeouts {
    pub build: Duration,
    /// create / start / remove / inspect / ping
    pub runtime_call: Duration,
    /// StopProcess の期限（ランタイムに渡す猶予はこれより短い）
    pub stop: Duration,
}

impl Default for LifecycleTimeouts {
    fn default() -> Self {
        Self {
            build: Duration::from_secs(600),
            runtime_call: Duration::from_secs(30),
            stop: Duration::from_secs(30),
        }
    }
}

/// StartProcess の入力
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StartRequest {
    pub name: String,
    pub language: String,
    /// 空文字は言語ごとのデフォルトコマンド
    pub command: String,
    pub node_id: String,
    pub port: i32,
    pub memory_limit: i64,
    pub cpu_shares: i32,
    pub environment: HashMap<String, String>,
}

/// HealthCheck の結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthReport {
    pub healthy: bool,
    pub status: String,
    pub message: String,
}

impl HealthReport {
    fn healthy() -> Self {
        Self {
            healthy: true,
            status: "healthy".to_string(),
            message: "Kernel is healthy".to_string(),
        }
    }

    fn unhealthy(message: String) -> Self {
        Self {
            healthy: false,
            status: "unhealthy".to_string(),
            message,
        }
    }
}

/// Lifecycle manager shared by both frontends and the shutdown coordinator.
pub struct Kernel {
    registry: Arc<ProcessRegistry>,
    runtime: Arc<dyn ContainerRuntime>,
    builder: Arc<dyn ImageBuilder>,
    events: Arc<dyn EventSink>,
    clock: Clock,
    timeouts: LifecycleTimeouts,
}

impl Kernel {
    pub fn builder(
        runtime: Arc<dyn ContainerRuntime>,
        builder: Arc<dyn ImageBuilder>,
    ) -> KernelBuilder {
        KernelBuilder {
            runtime,
            builder,
            registry: None,
            events: None,
            clock: None,
            timeouts: LifecycleTimeouts::default(),
        }
    }

    pub fn registry(&self) -> &Arc<ProcessRegistry> {
        &self.registry
    }

    pub fn runtime(&self) -> &Arc<dyn ContainerRuntime> {
        &self.runtime
    }

    pub fn events(&self) -> &Arc<dyn EventSink> {
        &self.events
    }

    pub fn timeouts(&self) -> LifecycleTimeouts {
        self.timeouts
    }

    /// ビルド → 作成 → 起動がすべて成功した場合のみレコードを登録する
    ///
    /// どの段階で失敗してもレジストリは変更されない。作成・起動後の失敗で残った
    /// インスタンスは片付けない。
    pub async fn start_process(&self, request: StartRequest) -> Result<String> {
        self.events.emit(&KernelEvent::ProcessStarting {
            name: request.name.clone(),
            language: request.language.clone(),
            node_id: request.node_id.clone(),
        });

        // 1. イメージビルド
        let image = image_tag(&request.name);
        let spec = LanguageSpec::new(&request.language)
            .with_command(request.command.as_str())
            .with_environment(request.environment.clone());
        let build = tokio::time::timeout(self.timeouts.build, self.builder.build(&spec, &image));
        let build = match build.await {
            Ok(result) => result,
            Err(_) => Err(BuildError::Timeout(self.timeouts.build)),
        };
        if let Err(e) = build {
            let error = KernelError::BuildFailed(e);
            return Err(self.start_failed(&request.name, StartStep::Build, error));
        }

        // 2. インスタンス作成
        let instance_name = instance_name(&request.name, (self.clock)());
        let config = InstanceConfig {
            name: instance_name.clone(),
            image: image.clone(),
            environment: request.environment.clone(),
            exposed_port: u16::try_from(request.port).ok().filter(|p| *p > 0),
            memory_limit: request.memory_limit,
            cpu_shares: request.cpu_shares,
            labels: managed_labels(&request.name, &request.node_id, &request.language),
        };
        let handle = match self
            .runtime_call("create", self.runtime.create(&config))
            .await
        {
            Ok(handle) => handle,
            Err(e) => {
                let error = KernelError::CreateFailed(e);
                return Err(self.start_failed(&request.name, StartStep::Create, error));
            }
        };

        // 3. 起動
        if let Err(e) = self.runtime_call("start", self.runtime.start(&handle)).await {
            let error = KernelError::StartFailed(e);
            return Err(self.start_failed(&request.name, StartStep::Start, error));
        }

        // 4. 登録（ID の重複チェックはレジストリ側で行う）
        let process_id = handle.short_id(PROCESS_ID_LEN).to_string();
        let record = ProcessRecord::new(
            process_id.clone(),
            handle.as_str(),
            request.name.clone(),
            request.language.clone(),
            request.port,
            (self.clock)(),
        )
        .with_instance(instance_name.clone(), image);
        if let Err(e) = self.registry.insert(record) {
            let error = KernelError::Registry(e);
            return Err(self.start_failed(&request.name, StartStep::Register, error));
        }

        self.events.emit(&KernelEvent::ProcessStarted {
            process_id: process_id.clone(),
            runtime_handle: handle.to_string(),
            instance_name,
        });
        Ok(process_id)
    }

    /// 停止 → 削除の順で実行
    ///
    /// 停止に失敗した場合はステータスを変更しない。削除の失敗は記録のみ。
    pub async fn stop_process(&self, process_id: &str) -> Result<()> {
        let record = self
            .registry
            .get(process_id)
            .map_err(|_| KernelError::NotFound(process_id.to_string()))?;
        let handle = InstanceHandle::new(record.runtime_handle());

        let stop = self.timeouts.stop;
        let grace = stop_grace(stop);
        if let Err(e) = deadline("stop", stop, self.runtime.stop(&handle, grace)).await {
            self.events.emit(&KernelEvent::StopFailed {
                process_id: process_id.to_string(),
                error: e.to_string(),
            });
            return Err(KernelError::StopFailed(e));
        }

        if let Err(e) = self
            .runtime_call("remove", self.runtime.remove(&handle, true))
            .await
        {
            self.events.emit(&KernelEvent::RemoveFailed {
                process_id: process_id.to_string(),
                error: e.to_string(),
            });
        }

        self.registry
            .update(process_id, |r| r.set_status(ProcessStatus::Stopped))?;
        self.events.emit(&KernelEvent::ProcessStopped {
            process_id: process_id.to_string(),
        });
        Ok(())
    }

    /// ライブの inspect 結果を返し、キャッシュにも書き戻す
    pub async fn get_process_status(&self, process_id: &str) -> StatusReport {
        let Ok(record) = self.registry.get(process_id) else {
            return StatusReport::NotFound;
        };
        let handle = InstanceHandle::new(record.runtime_handle());
        let cached = record.status();

        match self
            .runtime_call("inspect", self.runtime.inspect(&handle))
            .await
        {
            Ok(state) => {
                let status = status_from_state(&state);
                // 照会中に stop などで状態が変わっていれば、古い inspect 結果で上書きしない
                let _ = self.registry.update(process_id, |r| {
                    if r.status() == cached {
                        r.set_status(status);
                    }
                });
                status.into()
            }
            Err(e) => {
                self.events.emit(&KernelEvent::StatusDegraded {
                    process_id: process_id.to_string(),
                    error: e.to_string(),
                });
                StatusReport::Unknown
            }
        }
    }

    /// 作成時刻順のスナップショット
    pub fn list_processes(&self) -> Vec<ProcessSummary> {
        let mut summaries: Vec<ProcessSummary> =
            self.registry.list().iter().map(ProcessRecord::summary).collect();
        summaries.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.process_id.cmp(&b.process_id))
        });
        summaries
    }

    pub async fn health_check(&self) -> HealthReport {
        match self.runtime_call("ping", self.runtime.ping()).await {
            Ok(()) => HealthReport::healthy(),
            Err(e) => {
                self.events.emit(&KernelEvent::RuntimeUnreachable {
                    error: e.to_string(),
                });
                let message = if matches!(e, ContainerError::DockerConnectionFailed(_)) {
                    e.to_string()
                } else {
                    format!("Docker daemon unreachable: {}", e)
                };
                HealthReport::unhealthy(message)
            }
        }
    }

    fn start_failed(&self, name: &str, step: StartStep, error: KernelError) -> KernelError {
        self.events.emit(&KernelEvent::StartFailed {
            name: name.to_string(),
            step,
            error: error.to_string(),
        });
        error
    }

    async fn runtime_call<T, F>(
        &self,
        operation: &'static str,
        fut: F,
    ) -> weaver_container::Result<T>
    where
        F: Future<Output = weaver_container::Result<T>>,
    {
        deadline(operation, self.timeouts.runtime_call, fut).await
    }
}

/// 期限切れは呼び出しの失敗と同じ扱い
pub(crate) async fn deadline<T, F>(
    operation: &'static str,
    after: Duration,
    fut: F,
) -> weaver_container::Result<T>
where
    F: Future<Output = weaver_container::Result<T>>,
{
    match tokio::time::timeout(after, fut).await {
        Ok(result) => result,
        Err(_) => Err(ContainerError::Timeout { operation, after }),
    }
}

/// ランタイムに渡す停止猶予
///
/// 猶予切れ後の SIGKILL まで含めて `deadline` 内に戻るよう、余裕分を差し引く。
pub fn stop_grace(deadline: Duration) -> Duration {
    deadline.saturating_sub(STOP_KILL_MARGIN)
}

/// running → running, dead → failed, それ以外 → stopped
pub fn status_from_state(state: &InstanceState) -> ProcessStatus {
    match state {
        InstanceState::Running => ProcessStatus::Running,
        InstanceState::Dead => ProcessStatus::Failed,
        InstanceState::Other(_) => ProcessStatus::Stopped,
    }
}

pub fn image_tag(name: &str) -> String {
    format!("weaver-app-{}:latest", name)
}

pub fn instance_name(name: &str, now: DateTime<Utc>) -> String {
    format!("weaver-{}-{}", name, now.timestamp())
}

pub struct KernelBuilder {
    runtime: Arc<dyn ContainerRuntime>,
    builder: Arc<dyn ImageBuilder>,
    registry: Option<Arc<ProcessRegistry>>,
    events: Option<Arc<dyn EventSink>>,
    clock: Option<Clock>,
    timeouts: LifecycleTimeouts,
}

impl KernelBuilder {
    pub fn registry(mut self, registry: Arc<ProcessRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn clock(mut self, clock: Clock) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn timeouts(mut self, timeouts: LifecycleTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn build(self) -> Kernel {
        Kernel {
            registry: self.registry.unwrap_or_default(),
            runtime: self.runtime,
            builder: self.builder,
            events: self
                .events
                .unwrap_or_else(|| Arc::new(TracingSink) as Arc<dyn EventSink>),
            clock: self.clock.unwrap_or_else(|| Arc::new(Utc::now) as Clock),
            timeouts: self.timeouts,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(status_from_state(&InstanceState::Running), ProcessStatus::Running);
        assert_eq!(status_from_state(&InstanceState::Dead), ProcessStatus::Failed);
        assert_eq!(
            status_from_state(&InstanceState::Other("exited".into())),
            ProcessStatus::Stopped
        );
        assert_eq!(
            status_from_state(&InstanceState::Other("paused".into())),
            ProcessStatus::Stopped
        );
    }

    #[test]
    fn test_stop_grace_leaves_margin() {
        assert_eq!(stop_grace(Duration::from_secs(30)), Duration::from_secs(28));
        assert_eq!(stop_grace(Duration::from_secs(10)), Duration::from_secs(8));
        assert_eq!(stop_grace(Duration::from_secs(1)), Duration::ZERO);
    }

    #[test]
    fn test_derived_names() {
        let now = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        assert_eq!(image_tag("svc-a"), "weaver-app-svc-a:latest");
        assert_eq!(instance_name("svc-a", now), "weaver-svc-a-1700000000");
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_maps_to_timeout() {
        let err = deadline("inspect", Duration::from_secs(5), async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(())
        })
        .await
        .unwrap_err();
        assert!(matches!(err, ContainerError::Timeout { operation: "inspect", .. }));
    }
}
