//! シャットダウン協調
//!
//! シグナル受信後、両フロントエンドの受け付けを止め、レジストリ上の全プロセスを
//! 期限付きで停止（ドレイン）する。レコードの削除は行わない。

use crate::lifecycle::{Kernel, deadline, stop_grace};
use futures_util::stream::{FuturesUnordered, StreamExt};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use weaver_container::InstanceHandle;
use weaver_core::KernelEvent;

/// ドレインの期限
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrainPolicy {
    /// インスタンスごとの停止期限（ランタイムに渡す猶予はこれより短い）
    pub per_instance: Duration,
    /// ドレイン全体の上限
    pub total: Duration,
}

impl Default for DrainPolicy {
    fn default() -> Self {
        Self {
            per_instance: Duration::from_secs(10),
            total: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DrainReport {
    pub attempted: usize,
    pub stopped: Vec<String>,
    /// (process_id, エラーメッセージ)
    pub failed: Vec<(String, String)>,
    pub deadline_exceeded: bool,
}

/// レジストリのスナップショットに対し、全インスタンスの停止を並行して試みる
///
/// 1件の失敗は他の停止に影響しない。全体の期限を過ぎた時点で未完了のものは失敗扱い。
pub async fn drain(kernel: &Kernel, policy: DrainPolicy) -> DrainReport {
    let started = Instant::now();
    let events = kernel.events();
    let records = kernel.registry().list();
    events.emit(&KernelEvent::DrainStarted {
        processes: records.len(),
    });

    let mut stops: FuturesUnordered<_> = records
        .iter()
        .map(|record| {
            let process_id = record.id().to_string();
            let handle = InstanceHandle::new(record.runtime_handle());
            let runtime = kernel.runtime().clone();
            async move {
                let grace = stop_grace(policy.per_instance);
                let result =
                    deadline("stop", policy.per_instance, runtime.stop(&handle, grace)).await;
                (process_id, result)
            }
        })
        .collect();

    let mut report = DrainReport {
        attempted: records.len(),
        ..Default::default()
    };
    let mut finished = HashSet::new();
    let deadline_at = started + policy.total;

    loop {
        match tokio::time::timeout_at(deadline_at, stops.next()).await {
            Ok(Some((process_id, Ok(())))) => {
                finished.insert(process_id.clone());
                report.stopped.push(process_id);
            }
            Ok(Some((process_id, Err(e)))) => {
                events.emit(&KernelEvent::DrainStopFailed {
                    process_id: process_id.clone(),
                    error: e.to_string(),
                });
                finished.insert(process_id.clone());
                report.failed.push((process_id, e.to_string()));
            }
            Ok(None) => break,
            Err(_) => {
                report.deadline_exceeded = true;
                break;
            }
        }
    }

    if report.deadline_exceeded {
        for record in records.iter().filter(|r| !finished.contains(r.id())) {
            report
                .failed
                .push((record.id().to_string(), "drain deadline exceeded".to_string()));
        }
    }

    events.emit(&KernelEvent::DrainFinished {
        attempted: report.attempted,
        failed: report.failed.len(),
        deadline_exceeded: report.deadline_exceeded,
        elapsed: started.elapsed(),
    });
    report
}

/// フロントエンドの停止とドレインの順序を管理する
pub struct ShutdownCoordinator {
    kernel: Arc<Kernel>,
    token: CancellationToken,
    policy: DrainPolicy,
    frontend_grace: Duration,
    frontends: Vec<JoinHandle<()>>,
}

impl ShutdownCoordinator {
    pub fn new(kernel: Arc<Kernel>, policy: DrainPolicy, frontend_grace: Duration) -> Self {
        Self {
            kernel,
            token: CancellationToken::new(),
            policy,
            frontend_grace,
            frontends: Vec::new(),
        }
    }

    /// フロントエンドに渡すトークン
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn register(&mut self, frontend: JoinHandle<()>) {
        self.frontends.push(frontend);
    }

    /// 受け付け停止 → ドレイン → フロントエンドの終了待ち（猶予超過は中断）
    pub async fn shutdown(mut self) -> DrainReport {
        self.kernel.events().emit(&KernelEvent::ShutdownRequested);
        self.token.cancel();

        let report = drain(&self.kernel, self.policy).await;

        let joined = tokio::time::timeout(self.frontend_grace, async {
            for frontend in self.frontends.iter_mut() {
                let _ = frontend.await;
            }
        })
        .await;
        if joined.is_err() {
            tracing::warn!("Frontends did not finish within grace period, aborting");
            for frontend in &self.frontends {
                frontend.abort();
            }
        }

        report
    }
}

/// 終了シグナルを待つ
///
/// Unix では SIGINT / SIGTERM / SIGQUIT、それ以外では Ctrl-C。
#[cfg(unix)]
pub async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigquit = signal(SignalKind::quit())?;

    tokio::select! {
        _ = sigint.recv()  => {},
        _ = sigterm.recv() => {},
        _ = sigquit.recv() => {},
    }
    Ok(())
}

#[cfg(not(unix))]
pub async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await
}
