//! `kernel.v1.KernelService` のリクエスト / レスポンス
//!
//! フィールドはすべて snake_case。欠けているフィールドはゼロ値として扱う。

use crate::lifecycle::StartRequest;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use weaver_core::ProcessSummary;

pub const SERVICE_NAME: &str = "kernel.v1.KernelService";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StartProcessRequest {
    pub name: String,
    pub language: String,
    pub command: String,
    pub node_id: String,
    pub port: i32,
    pub memory_limit: i64,
    pub cpu_shares: i32,
    pub environment: HashMap<String, String>,
}

impl From<StartProcessRequest> for StartRequest {
    fn from(req: StartProcessRequest) -> Self {
        StartRequest {
            name: req.name,
            language: req.language,
            command: req.command,
            node_id: req.node_id,
            port: req.port,
            memory_limit: req.memory_limit,
            cpu_shares: req.cpu_shares,
            environment: req.environment,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StartProcessResponse {
    pub success: bool,
    pub process_id: String,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StopProcessRequest {
    pub process_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StopProcessResponse {
    pub success: bool,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GetProcessStatusRequest {
    pub process_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GetProcessStatusResponse {
    /// running / stopped / failed / unknown / not_found
    pub status: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ListProcessesRequest {}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessInfo {
    pub process_id: String,
    pub name: String,
    pub status: String,
    pub language: String,
    pub port: i32,
    /// Unix 秒
    pub created_at: i64,
}

impl From<ProcessSummary> for ProcessInfo {
    fn from(summary: ProcessSummary) -> Self {
        ProcessInfo {
            process_id: summary.process_id,
            name: summary.name,
            status: summary.status.to_string(),
            language: summary.language,
            port: summary.port,
            created_at: summary.created_at.timestamp(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ListProcessesResponse {
    pub processes: Vec<ProcessInfo>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HealthCheckRequest {}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthCheckResponse {
    /// healthy / unhealthy
    pub status: String,
    pub message: String,
}

/// イントロスペクション用のサービス記述
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceDescriptor {
    pub service: String,
    pub methods: Vec<MethodDescriptor>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodDescriptor {
    pub name: String,
    pub path: String,
    pub request_fields: Vec<String>,
    pub response_fields: Vec<String>,
}

impl ServiceDescriptor {
    pub fn kernel() -> Self {
        fn method(name: &str, request: &[&str], response: &[&str]) -> MethodDescriptor {
            MethodDescriptor {
                name: name.to_string(),
                path: format!("/{}/{}", SERVICE_NAME, name),
                request_fields: request.iter().map(|f| f.to_string()).collect(),
                response_fields: response.iter().map(|f| f.to_string()).collect(),
            }
        }

        ServiceDescriptor {
            service: SERVICE_NAME.to_string(),
            methods: vec![
                method(
                    "StartProcess",
                    &[
                        "name",
                        "language",
                        "command",
                        "node_id",
                        "port",
                        "memory_limit",
                        "cpu_shares",
                        "environment",
                    ],
                    &["success", "process_id", "message"],
                ),
                method("StopProcess", &["process_id"], &["success", "message"]),
                method("GetProcessStatus", &["process_id"], &["status"]),
                method("ListProcesses", &[], &["processes"]),
                method("HealthCheck", &[], &["status", "message"]),
            ],
        }
    }
}
