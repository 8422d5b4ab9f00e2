use crate::config::KernelConfig;
use crate::lifecycle::Kernel;
use crate::protocol::{LegacyServer, LegacySettings};
use crate::rpc::RpcServer;
use crate::shutdown::{DrainPolicy, DrainReport, ShutdownCoordinator};
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

/// 両フロントエンドをバインド済みの状態で保持する
pub struct Daemon {
    kernel: Arc<Kernel>,
    legacy: LegacyServer,
    rpc: RpcServer,
    policy: DrainPolicy,
    frontend_grace: Duration,
}

impl Daemon {
    pub async fn bind(config: &KernelConfig, kernel: Arc<Kernel>) -> io::Result<Self> {
        let settings = LegacySettings {
            defaults: config.legacy_defaults.clone(),
            read_timeout: config.timeouts.read(),
            max_payload: config.max_payload_bytes,
        };
        let legacy = LegacyServer::bind(config.legacy_addr(), kernel.clone(), settings).await?;
        let rpc = RpcServer::bind(
            config.rpc_addr(),
            kernel.clone(),
            config.introspection_enabled(),
        )
        .await?;

        Ok(Self {
            kernel,
            legacy,
            rpc,
            policy: DrainPolicy {
                per_instance: config.timeouts.drain_instance(),
                total: config.timeouts.drain_total(),
            },
            frontend_grace: config.timeouts.frontend_grace(),
        })
    }

    pub fn legacy_addr(&self) -> io::Result<SocketAddr> {
        self.legacy.local_addr()
    }

    pub fn rpc_addr(&self) -> io::Result<SocketAddr> {
        self.rpc.local_addr()
    }

    /// `signal` が完了するまでサービスし、その後シャットダウンとドレインを行う
    pub async fn run_until<F>(self, signal: F) -> DrainReport
    where
        F: Future<Output = ()>,
    {
        let mut coordinator =
            ShutdownCoordinator::new(self.kernel.clone(), self.policy, self.frontend_grace);

        let token = coordinator.token();
        coordinator.register(tokio::spawn(self.legacy.run(token.clone())));

        let rpc = self.rpc;
        coordinator.register(tokio::spawn(async move {
            if let Err(e) = rpc.run(token).await {
                tracing::error!(error = %e, "RPC server error");
            }
        }));

        signal.await;
        coordinator.shutdown().await
    }
}
