//! カーネル設定
//!
//! 優先順位（低 → 高）: 組み込みデフォルト → YAML ファイル → コマンドライン / 環境変数。

use crate::lifecycle::LifecycleTimeouts;
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("設定ファイルが見つかりません: {}", .0.display())]
    NotFound(PathBuf),

    #[error("設定ファイルを読み込めません: {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("設定ファイルの解析に失敗しました: {0}")]
    Parse(#[from] serde_yaml::Error),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// ログ出力の対象クレート
const LOG_TARGETS: [&str; 4] = ["weaver_kernel", "weaver_core", "weaver_container", "weaver_build"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KernelConfig {
    pub listen: IpAddr,
    /// レガシー TCP プロトコルのポート
    pub port: u16,
    /// 未指定なら `port + 1`
    pub rpc_port: Option<u16>,
    pub log_level: String,
    pub dev_mode: bool,
    /// 未指定なら `dev_mode` に従う
    pub introspection: Option<bool>,
    pub max_payload_bytes: usize,
    pub timeouts: TimeoutConfig,
    pub legacy_defaults: LegacyDefaults,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            listen: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: 50051,
            rpc_port: None,
            log_level: "info".to_string(),
            dev_mode: false,
            introspection: None,
            max_payload_bytes: 1024 * 1024,
            timeouts: TimeoutConfig::default(),
            legacy_defaults: LegacyDefaults::default(),
        }
    }
}

/// 各種期限（秒）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    pub read_secs: u64,
    pub stop_secs: u64,
    pub drain_instance_secs: u64,
    pub drain_total_secs: u64,
    pub runtime_call_secs: u64,
    pub build_secs: u64,
    pub frontend_grace_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            read_secs: 30,
            stop_secs: 30,
            drain_instance_secs: 10,
            drain_total_secs: 30,
            runtime_call_secs: 30,
            build_secs: 600,
            frontend_grace_secs: 5,
        }
    }
}

impl TimeoutConfig {
    pub fn read(&self) -> Duration {
        Duration::from_secs(self.read_secs)
    }

    pub fn drain_instance(&self) -> Duration {
        Duration::from_secs(self.drain_instance_secs)
    }

    pub fn drain_total(&self) -> Duration {
        Duration::from_secs(self.drain_total_secs)
    }

    pub fn frontend_grace(&self) -> Duration {
        Duration::from_secs(self.frontend_grace_secs)
    }

    pub fn lifecycle(&self) -> LifecycleTimeouts {
        LifecycleTimeouts {
            build: Duration::from_secs(self.build_secs),
            runtime_call: Duration::from_secs(self.runtime_call_secs),
            stop: Duration::from_secs(self.stop_secs),
        }
    }
}

/// レガシープロトコルの Start は言語やリソースを運べないため、この値で起動する
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LegacyDefaults {
    pub language: String,
    pub node_id: String,
    pub port: i32,
    pub memory_limit: i64,
    pub cpu_shares: i32,
}

impl Default for LegacyDefaults {
    fn default() -> Self {
        Self {
            language: "python".to_string(),
            node_id: "localhost".to_string(),
            port: 8000,
            memory_limit: 512 * 1024 * 1024,
            cpu_shares: 1024,
        }
    }
}

impl KernelConfig {
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&content)
    }

    /// 設定ファイルを読み込む
    ///
    /// 明示されたパスは存在しなければエラー。省略時は
    /// `<config_dir>/weaver/kernel.yaml` があれば読み、なければデフォルト。
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::from_file(path);
        }
        match default_config_path() {
            Some(path) if path.exists() => {
                tracing::debug!(path = %path.display(), "Loading default config file");
                Self::from_file(&path)
            }
            _ => Ok(Self::default()),
        }
    }

    pub fn rpc_port(&self) -> u16 {
        self.rpc_port.unwrap_or_else(|| self.port.saturating_add(1))
    }

    pub fn introspection_enabled(&self) -> bool {
        self.introspection.unwrap_or(self.dev_mode)
    }

    pub fn legacy_addr(&self) -> SocketAddr {
        SocketAddr::new(self.listen, self.port)
    }

    pub fn rpc_addr(&self) -> SocketAddr {
        SocketAddr::new(self.listen, self.rpc_port())
    }

    /// `RUST_LOG` 未設定時に使うフィルタ。未知のレベルは info
    pub fn filter_directive(&self) -> String {
        let level = match self.log_level.to_lowercase().as_str() {
            "debug" => "debug",
            "warn" | "warning" => "warn",
            "error" => "error",
            _ => "info",
        };
        LOG_TARGETS
            .iter()
            .map(|target| format!("{}={}", target, level))
            .collect::<Vec<_>>()
            .join(",")
    }
}

pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("weaver").join("kernel.yaml"))
}
