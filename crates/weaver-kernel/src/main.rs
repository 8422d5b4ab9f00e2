use anyhow::Context;
use clap::Parser;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use weaver_build::DockerImageBuilder;
use weaver_container::DockerRuntime;
use weaver_core::TracingSink;
use weaver_kernel::{Cli, Daemon, Kernel, KernelConfig, wait_for_shutdown_signal};

fn init_tracing(config: &KernelConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.filter_directive()));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = cli.load_config().context("設定の読み込みに失敗しました")?;
    init_tracing(&config);

    let runtime = DockerRuntime::connect_with_local_defaults()
        .context("Failed to create Docker client")?;
    let info = runtime
        .engine_info()
        .await
        .context("Docker daemon is not reachable")?;
    tracing::info!(
        version = %info.server_version,
        containers = info.containers,
        "Connected to Docker daemon"
    );

    let builder = DockerImageBuilder::new(runtime.docker().clone()).verbose(config.dev_mode);
    let kernel = Kernel::builder(Arc::new(runtime), Arc::new(builder))
        .events(Arc::new(TracingSink))
        .timeouts(config.timeouts.lifecycle())
        .build();

    let daemon = Daemon::bind(&config, Arc::new(kernel))
        .await
        .with_context(|| {
            format!(
                "Failed to listen on {} / {}",
                config.legacy_addr(),
                config.rpc_addr()
            )
        })?;
    tracing::info!(
        legacy = %daemon.legacy_addr()?,
        rpc = %daemon.rpc_addr()?,
        dev_mode = config.dev_mode,
        introspection = config.introspection_enabled(),
        "Weaver kernel started"
    );

    let report = daemon
        .run_until(async {
            if let Err(e) = wait_for_shutdown_signal().await {
                tracing::error!(error = %e, "Failed to listen for shutdown signal");
            }
        })
        .await;

    tracing::info!(
        attempted = report.attempted,
        stopped = report.stopped.len(),
        failed = report.failed.len(),
        deadline_exceeded = report.deadline_exceeded,
        "Kernel stopped"
    );
    Ok(())
}
