//! Structured kernel events.
//!
//! Components never log through a global logger directly. Each one receives an
//! [`EventSink`] and reports what happened as a [`KernelEvent`]; the sink decides
//! how to render it. [`TracingSink`] forwards to `tracing`, [`RecordingSink`]
//! keeps events in memory for assertions.

use std::fmt;
use std::net::SocketAddr;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

/// Step of `StartProcess` that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartStep {
    Build,
    Create,
    Start,
    Register,
}

impl fmt::Display for StartStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StartStep::Build => "build",
            StartStep::Create => "create",
            StartStep::Start => "start",
            StartStep::Register => "register",
        })
    }
}

/// Which frontend a request arrived through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Frontend {
    Legacy,
    Rpc,
}

impl fmt::Display for Frontend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Frontend::Legacy => "legacy",
            Frontend::Rpc => "rpc",
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum KernelEvent {
    ProcessStarting {
        name: String,
        language: String,
        node_id: String,
    },
    ProcessStarted {
        process_id: String,
        runtime_handle: String,
        instance_name: String,
    },
    StartFailed {
        name: String,
        step: StartStep,
        error: String,
    },
    ProcessStopped {
        process_id: String,
    },
    StopFailed {
        process_id: String,
        error: String,
    },
    /// Removal after a successful stop failed; the stop still counts.
    RemoveFailed {
        process_id: String,
        error: String,
    },
    StatusDegraded {
        process_id: String,
        error: String,
    },
    RuntimeUnreachable {
        error: String,
    },
    ListenerStarted {
        frontend: Frontend,
        addr: SocketAddr,
    },
    ListenerStopped {
        frontend: Frontend,
    },
    AcceptFailed {
        error: String,
    },
    ConnectionAccepted {
        peer: SocketAddr,
    },
    /// The connection ended before a full request was read.
    ConnectionDropped {
        peer: SocketAddr,
        reason: String,
    },
    FrameReceived {
        peer: SocketAddr,
        message_type: u32,
        length: u32,
    },
    UnknownMessageType {
        peer: SocketAddr,
        message_type: u32,
    },
    ResponseSent {
        peer: SocketAddr,
        message_type: u32,
        length: usize,
    },
    ResponseFailed {
        peer: SocketAddr,
        error: String,
    },
    RpcCall {
        operation: &'static str,
    },
    ShutdownRequested,
    DrainStarted {
        processes: usize,
    },
    DrainStopFailed {
        process_id: String,
        error: String,
    },
    DrainFinished {
        attempted: usize,
        failed: usize,
        deadline_exceeded: bool,
        elapsed: Duration,
    },
}

/// Observability collaborator injected into every kernel component.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: &KernelEvent);
}

/// Renders events as `tracing` events with structured fields.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: &KernelEvent) {
        use tracing::{debug, error, info, warn};

        match event {
            KernelEvent::ProcessStarting {
                name,
                language,
                node_id,
            } => info!(process_name = %name, %language, %node_id, "Starting process"),
            KernelEvent::ProcessStarted {
                process_id,
                runtime_handle,
                instance_name,
            } => info!(%process_id, %runtime_handle, %instance_name, "Process started"),
            KernelEvent::StartFailed { name, step, error } => {
                error!(process_name = %name, %step, %error, "Failed to start process")
            }
            KernelEvent::ProcessStopped { process_id } => info!(%process_id, "Process stopped"),
            KernelEvent::StopFailed { process_id, error } => {
                error!(%process_id, %error, "Failed to stop process")
            }
            KernelEvent::RemoveFailed { process_id, error } => {
                warn!(%process_id, %error, "Failed to remove instance (continuing anyway)")
            }
            KernelEvent::StatusDegraded { process_id, error } => {
                warn!(%process_id, %error, "Status query degraded to unknown")
            }
            KernelEvent::RuntimeUnreachable { error } => {
                warn!(%error, "Container runtime unreachable")
            }
            KernelEvent::ListenerStarted { frontend, addr } => {
                info!(%frontend, %addr, "Listener started")
            }
            KernelEvent::ListenerStopped { frontend } => info!(%frontend, "Listener stopped"),
            KernelEvent::AcceptFailed { error } => error!(%error, "Failed to accept connection"),
            KernelEvent::ConnectionAccepted { peer } => debug!(%peer, "Connection established"),
            KernelEvent::ConnectionDropped { peer, reason } => {
                warn!(%peer, %reason, "Connection closed without response")
            }
            KernelEvent::FrameReceived {
                peer,
                message_type,
                length,
            } => info!(%peer, message_type, length, "Received message"),
            KernelEvent::UnknownMessageType { peer, message_type } => {
                warn!(%peer, message_type, "Unknown message type")
            }
            KernelEvent::ResponseSent {
                peer,
                message_type,
                length,
            } => debug!(%peer, message_type, length, "Response sent"),
            KernelEvent::ResponseFailed { peer, error } => {
                error!(%peer, %error, "Failed to send response")
            }
            KernelEvent::RpcCall { operation } => debug!(operation, "RPC call"),
            KernelEvent::ShutdownRequested => info!("Shutdown requested"),
            KernelEvent::DrainStarted { processes } => {
                info!(processes, "Draining processes before shutdown")
            }
            KernelEvent::DrainStopFailed { process_id, error } => {
                warn!(%process_id, %error, "Failed to stop instance during shutdown")
            }
            KernelEvent::DrainFinished {
                attempted,
                failed,
                deadline_exceeded,
                elapsed,
            } => {
                if *deadline_exceeded {
                    warn!(attempted, failed, ?elapsed, "Drain deadline exceeded")
                } else {
                    info!(attempted, failed, ?elapsed, "Drain finished")
                }
            }
        }
    }
}

/// Keeps every emitted event in memory.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<KernelEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<KernelEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn count<F>(&self, predicate: F) -> usize
    where
        F: Fn(&KernelEvent) -> bool,
    {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|e| predicate(e))
            .count()
    }
}

impl EventSink for RecordingSink {
    fn emit(&self, event: &KernelEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event.clone());
    }
}
