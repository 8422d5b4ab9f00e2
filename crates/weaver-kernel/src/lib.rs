//! Weaver Kernel
//!
//! コンテナとして動くユーザーワークロードの起動・停止・照会を担うカーネル。
//! 同じライフサイクルマネージャーを2つのフロントエンドから公開する:
//!
//! - レガシーバイナリプロトコル（TCP、8バイトヘッダー + テキストペイロード）
//! - 構造化 RPC（`kernel.v1.KernelService`、JSON over HTTP）

pub mod cli;
pub mod config;
pub mod daemon;
pub mod error;
pub mod lifecycle;
pub mod protocol;
pub mod rpc;
pub mod shutdown;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use cli::Cli;
pub use config::{ConfigError, KernelConfig, LegacyDefaults, TimeoutConfig};
pub use daemon::Daemon;
pub use error::{KernelError, Result};
pub use lifecycle::{HealthReport, Kernel, KernelBuilder, LifecycleTimeouts, StartRequest};
pub use shutdown::{
    DrainPolicy, DrainReport, ShutdownCoordinator, drain, wait_for_shutdown_signal,
};
