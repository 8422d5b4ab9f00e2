//! InstanceConfig から Docker API パラメータへの変換

use crate::runtime::{InstanceConfig, InstanceState};
use bollard::models::{ContainerCreateBody, ContainerState, HostConfig};
use bollard::query_parameters::{CreateContainerOptions, CreateContainerOptionsBuilder};
use std::collections::HashMap;

/// カーネル管理下のインスタンスに付与するラベル
pub const LABEL_MANAGED: &str = "weaver.managed";
pub const LABEL_PROCESS: &str = "weaver.process";
pub const LABEL_NODE: &str = "weaver.node";
pub const LABEL_LANGUAGE: &str = "weaver.language";

/// CPU シェアを nano CPU に変換（1 シェア = 1,000,000 nano CPU）
pub fn nano_cpus(cpu_shares: i32) -> i64 {
    i64::from(cpu_shares) * 1_000_000
}

/// 環境変数を `KEY=VALUE` 形式に変換（キー順）
pub fn environment_list(environment: &HashMap<String, String>) -> Vec<String> {
    let mut env: Vec<String> = environment
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect();
    env.sort();
    env
}

/// 管理用ラベルを生成
pub fn managed_labels(name: &str, node_id: &str, language: &str) -> HashMap<String, String> {
    let mut labels = HashMap::new();
    labels.insert(LABEL_MANAGED.to_string(), "true".to_string());
    labels.insert(LABEL_PROCESS.to_string(), name.to_string());
    labels.insert(LABEL_NODE.to_string(), node_id.to_string());
    labels.insert(LABEL_LANGUAGE.to_string(), language.to_string());
    labels
}

/// InstanceConfig を Docker のコンテナ設定に変換
pub fn instance_to_container_config(
    config: &InstanceConfig,
) -> (ContainerCreateBody, CreateContainerOptions) {
    // ポート公開設定（ホスト側は publish_all_ports で自動割り当て）
    let mut exposed_ports = HashMap::new();
    if let Some(port) = config.exposed_port {
        exposed_ports.insert(format!("{}/tcp", port), HashMap::new());
    }

    let host_config = HostConfig {
        publish_all_ports: Some(true),
        memory: (config.memory_limit > 0).then_some(config.memory_limit),
        nano_cpus: (config.cpu_shares > 0).then(|| nano_cpus(config.cpu_shares)),
        ..Default::default()
    };

    let body = ContainerCreateBody {
        image: Some(config.image.clone()),
        env: Some(environment_list(&config.environment)),
        exposed_ports: Some(exposed_ports),
        host_config: Some(host_config),
        labels: Some(config.labels.clone()),
        ..Default::default()
    };

    let options = CreateContainerOptionsBuilder::default()
        .name(&config.name)
        .build();

    (body, options)
}

/// inspect 結果の状態を InstanceState に変換
pub fn instance_state(state: Option<&ContainerState>) -> InstanceState {
    let Some(state) = state else {
        return InstanceState::Other("unknown".to_string());
    };

    if state.running.unwrap_or(false) {
        InstanceState::Running
    } else if state.dead.unwrap_or(false) {
        InstanceState::Dead
    } else {
        let status = state
            .status
            .as_ref()
            .map(|s| format!("{:?}", s).to_lowercase())
            .unwrap_or_else(|| "unknown".to_string());
        InstanceState::Other(status)
    }
}
