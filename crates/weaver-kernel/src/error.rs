use thiserror::Error;
use weaver_build::BuildError;
use weaver_container::ContainerError;
use weaver_core::RegistryError;

/// ライフサイクル操作のエラー
///
/// `Display` はそのままフロントエンドの応答メッセージになる。
#[derive(Debug, Error)]
pub enum KernelError {
    #[error("Process not found")]
    NotFound(String),

    #[error("Failed to build container: {0}")]
    BuildFailed(#[source] BuildError),

    #[error("Failed to create container: {0}")]
    CreateFailed(#[source] ContainerError),

    #[error("Failed to start container: {0}")]
    StartFailed(#[source] ContainerError),

    #[error("Failed to stop container: {0}")]
    StopFailed(#[source] ContainerError),

    #[error("Failed to register process: {0}")]
    Registry(#[from] RegistryError),
}

pub type Result<T> = std::result::Result<T, KernelError>;
