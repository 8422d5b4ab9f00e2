//! Message types, payload parsing and dispatch for the legacy protocol.

use crate::config::LegacyDefaults;
use crate::lifecycle::{Kernel, StartRequest};
use std::collections::HashMap;
use std::fmt::Write;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum MessageType {
    Start = 1,
    Stop = 2,
    /// 番号は予約済みだがこのプロトコルでは未対応
    GetStatus = 3,
    List = 4,
    HealthCheck = 5,
}

impl TryFrom<u32> for MessageType {
    type Error = u32;

    fn try_from(value: u32) -> Result<Self, u32> {
        match value {
            1 => Ok(MessageType::Start),
            2 => Ok(MessageType::Stop),
            3 => Ok(MessageType::GetStatus),
            4 => Ok(MessageType::List),
            5 => Ok(MessageType::HealthCheck),
            other => Err(other),
        }
    }
}

/// A parsed legacy request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Start { name: String, command: String },
    Stop { process_id: String },
    List,
    HealthCheck,
    /// 未知の type、および GetStatus
    Unsupported(u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseError {
    InvalidFormat,
}

impl Request {
    pub fn parse(message_type: u32, payload: &str) -> Result<Self, ParseError> {
        match MessageType::try_from(message_type) {
            Ok(MessageType::Start) => {
                // "<ignored> <name> <command>"、command 内の空白はそのまま
                let mut parts = payload.splitn(3, ' ');
                match (parts.next(), parts.next(), parts.next()) {
                    (Some(_), Some(name), Some(command)) => Ok(Request::Start {
                        name: name.to_string(),
                        command: command.to_string(),
                    }),
                    _ => Err(ParseError::InvalidFormat),
                }
            }
            Ok(MessageType::Stop) => Ok(Request::Stop {
                process_id: payload.trim().to_string(),
            }),
            Ok(MessageType::List) => Ok(Request::List),
            Ok(MessageType::HealthCheck) => Ok(Request::HealthCheck),
            Ok(MessageType::GetStatus) | Err(_) => Ok(Request::Unsupported(message_type)),
        }
    }
}

pub const INVALID_FORMAT: &str = "ERROR: Invalid message format";
pub const UNKNOWN_TYPE: &str = "ERROR: Unknown message type";

/// Executes one request against the kernel and renders the response text.
pub async fn dispatch(kernel: &Kernel, defaults: &LegacyDefaults, request: Request) -> String {
    match request {
        Request::Start { name, command } => {
            let request = StartRequest {
                name,
                language: defaults.language.clone(),
                command,
                node_id: defaults.node_id.clone(),
                port: defaults.port,
                memory_limit: defaults.memory_limit,
                cpu_shares: defaults.cpu_shares,
                environment: HashMap::new(),
            };
            match kernel.start_process(request).await {
                Ok(process_id) => format!("Process started successfully: {}", process_id),
                Err(e) => format!("ERROR: {}", e),
            }
        }
        Request::Stop { process_id } => match kernel.stop_process(&process_id).await {
            Ok(()) => "Process stopped successfully".to_string(),
            Err(e) => format!("ERROR: {}", e),
        },
        Request::List => {
            let mut response = String::from("Processes:\n");
            for process in kernel.list_processes() {
                let _ = writeln!(
                    response,
                    "{} {} {} {}",
                    process.process_id, process.name, process.status, process.language
                );
            }
            response
        }
        Request::HealthCheck => {
            let health = kernel.health_check().await;
            if health.healthy {
                format!("OK: {}", health.message)
            } else {
                format!("ERROR: {}", health.message)
            }
        }
        Request::Unsupported(_) => UNKNOWN_TYPE.to_string(),
    }
}
