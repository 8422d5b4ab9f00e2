use crate::config::{self, KernelConfig};
use clap::Parser;
use std::net::IpAddr;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "weaver-kernel")]
#[command(version, about = "Weaver kernel - コンテナとして動くプロセスの管理デーモン", long_about = None)]
pub struct Cli {
    /// 設定ファイル（省略時は <config_dir>/weaver/kernel.yaml があれば使用）
    #[arg(short, long, env = "WEAVER_CONFIG")]
    pub config: Option<PathBuf>,

    /// レガシー TCP プロトコルのポート
    #[arg(short, long, env = "WEAVER_PORT")]
    pub port: Option<u16>,

    /// RPC フロントエンドのポート（省略時は port + 1）
    #[arg(long, env = "WEAVER_RPC_PORT")]
    pub rpc_port: Option<u16>,

    /// 待ち受けアドレス
    #[arg(long, env = "WEAVER_LISTEN")]
    pub listen: Option<IpAddr>,

    /// ログレベル (debug, info, warn, error)
    #[arg(long, env = "WEAVER_LOG_LEVEL")]
    pub log_level: Option<String>,

    /// 開発モード（ビルド出力の詳細ログ、イントロスペクション有効）
    #[arg(long, env = "WEAVER_DEV_MODE")]
    pub dev_mode: bool,

    /// RPC イントロスペクションを有効化
    #[arg(long, env = "WEAVER_INTROSPECTION")]
    pub introspection: bool,
}

impl Cli {
    /// 設定ファイルを読み込み、フラグで上書きする
    pub fn load_config(&self) -> config::Result<KernelConfig> {
        let mut config = KernelConfig::load(self.config.as_deref())?;
        self.apply_to(&mut config);
        Ok(config)
    }

    pub fn apply_to(&self, config: &mut KernelConfig) {
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(rpc_port) = self.rpc_port {
            config.rpc_port = Some(rpc_port);
        }
        if let Some(listen) = self.listen {
            config.listen = listen;
        }
        if let Some(level) = &self.log_level {
            config.log_level = level.clone();
        }
        if self.dev_mode {
            config.dev_mode = true;
        }
        if self.introspection {
            config.introspection = Some(true);
        }
    }
}
