use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ContainerError {
    #[error("Docker daemon unreachable: {0}")]
    DockerConnectionFailed(String),

    #[error("no such container: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("Docker API error: {0}")]
    DockerApiError(String),

    #[error("{operation} timed out after {}s", after.as_secs())]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    #[error("invalid instance config: {0}")]
    InvalidConfig(String),
}

impl From<bollard::errors::Error> for ContainerError {
    fn from(err: bollard::errors::Error) -> Self {
        match &err {
            bollard::errors::Error::DockerResponseServerError {
                status_code: 404,
                message,
            } => ContainerError::NotFound(message.clone()),
            bollard::errors::Error::DockerResponseServerError {
                status_code: 409,
                message,
            } => ContainerError::Conflict(message.clone()),
            _ => {
                // 接続エラーの可能性をチェック
                let err_str = err.to_string();
                if err_str.contains("Connection refused")
                    || err_str.contains("No such file or directory")
                {
                    ContainerError::DockerConnectionFailed(err_str)
                } else {
                    ContainerError::DockerApiError(err_str)
                }
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, ContainerError>;
