//! bollard を使った ContainerRuntime 実装

use crate::converter::{instance_state, instance_to_container_config};
use crate::error::{ContainerError, Result};
use crate::runtime::{ContainerRuntime, InstanceConfig, InstanceHandle, InstanceState};
use async_trait::async_trait;
use bollard::Docker;
use bollard::query_parameters::{
    InspectContainerOptions, RemoveContainerOptionsBuilder, StartContainerOptions,
    StopContainerOptionsBuilder,
};
use std::time::Duration;

/// Docker Engine バックエンド
#[derive(Clone)]
pub struct DockerRuntime {
    docker: Docker,
}

/// `docker info` の要約
#[derive(Debug, Clone, Default)]
pub struct EngineInfo {
    pub server_version: String,
    pub containers: i64,
}

impl DockerRuntime {
    pub fn new(docker: Docker) -> Self {
        Self { docker }
    }

    /// ローカルのデフォルト設定（DOCKER_HOST / unix ソケット）で接続
    pub fn connect_with_local_defaults() -> Result<Self> {
        let docker = Docker::connect_with_local_defaults()
            .map_err(|e| ContainerError::DockerConnectionFailed(e.to_string()))?;
        Ok(Self::new(docker))
    }

    pub fn docker(&self) -> &Docker {
        &self.docker
    }

    /// エンジン情報を取得（起動時の接続確認用）
    pub async fn engine_info(&self) -> Result<EngineInfo> {
        let info = self.docker.info().await?;
        Ok(EngineInfo {
            server_version: info.server_version.unwrap_or_default(),
            containers: info.containers.unwrap_or_default(),
        })
    }
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn create(&self, config: &InstanceConfig) -> Result<InstanceHandle> {
        if config.image.is_empty() {
            return Err(ContainerError::InvalidConfig("image is empty".to_string()));
        }

        let (body, options) = instance_to_container_config(config);
        tracing::debug!(name = %config.name, image = %config.image, "Creating container");

        let response = self.docker.create_container(Some(options), body).await?;
        for warning in &response.warnings {
            tracing::warn!(name = %config.name, %warning, "Container create warning");
        }

        Ok(InstanceHandle::new(response.id))
    }

    async fn start(&self, handle: &InstanceHandle) -> Result<()> {
        self.docker
            .start_container(handle.as_str(), None::<StartContainerOptions>)
            .await?;
        Ok(())
    }

    async fn stop(&self, handle: &InstanceHandle, timeout: Duration) -> Result<()> {
        let grace = i32::try_from(timeout.as_secs()).unwrap_or(i32::MAX);
        let options = StopContainerOptionsBuilder::default().t(grace).build();
        self.docker
            .stop_container(handle.as_str(), Some(options))
            .await?;
        Ok(())
    }

    async fn remove(&self, handle: &InstanceHandle, force: bool) -> Result<()> {
        let options = RemoveContainerOptionsBuilder::default().force(force).build();
        self.docker
            .remove_container(handle.as_str(), Some(options))
            .await?;
        Ok(())
    }

    async fn inspect(&self, handle: &InstanceHandle) -> Result<InstanceState> {
        let response = self
            .docker
            .inspect_container(handle.as_str(), None::<InspectContainerOptions>)
            .await?;
        Ok(instance_state(response.state.as_ref()))
    }

    async fn ping(&self) -> Result<()> {
        self.docker.ping().await?;
        Ok(())
    }
}
