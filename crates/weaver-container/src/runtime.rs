use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

/// ランタイムが返すインスタンスの識別子
///
/// 中身は不透明な文字列として扱う。
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstanceHandle(String);

impl InstanceHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// 先頭 `len` 文字（ハンドルが短い場合は全体）
    pub fn short_id(&self, len: usize) -> &str {
        match self.0.char_indices().nth(len) {
            Some((idx, _)) => &self.0[..idx],
            None => &self.0,
        }
    }
}

impl fmt::Display for InstanceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// インスタンスの状態
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstanceState {
    Running,
    Dead,
    /// created / exited / paused など
    Other(String),
}

/// インスタンス作成に必要な設定
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InstanceConfig {
    /// ランタイム上のインスタンス名
    pub name: String,
    pub image: String,
    pub environment: HashMap<String, String>,
    /// 公開するコンテナポート（TCP）
    pub exposed_port: Option<u16>,
    /// メモリ上限（バイト、0 は無制限）
    pub memory_limit: i64,
    pub cpu_shares: i32,
    pub labels: HashMap<String, String>,
}

/// コンテナランタイムのトレイト
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    async fn create(&self, config: &InstanceConfig) -> Result<InstanceHandle>;

    async fn start(&self, handle: &InstanceHandle) -> Result<()>;

    /// `timeout` は強制終了までの猶予
    async fn stop(&self, handle: &InstanceHandle, timeout: Duration) -> Result<()>;

    async fn remove(&self, handle: &InstanceHandle, force: bool) -> Result<()>;

    async fn inspect(&self, handle: &InstanceHandle) -> Result<InstanceState>;

    async fn ping(&self) -> Result<()>;
}
