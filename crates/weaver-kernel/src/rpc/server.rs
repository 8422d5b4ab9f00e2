//! `kernel.v1.KernelService` over JSON/HTTP.

use super::error::{Result, RpcError};
use super::types::*;
use crate::error::KernelError;
use crate::lifecycle::Kernel;
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use weaver_core::{Frontend, KernelEvent};

/// Application state shared with handlers.
#[derive(Clone)]
pub struct RpcState {
    pub kernel: Arc<Kernel>,
}

impl RpcState {
    fn call(&self, operation: &'static str) -> &Kernel {
        self.kernel.events().emit(&KernelEvent::RpcCall { operation });
        &self.kernel
    }
}

/// Creates the RPC router. Introspection is routed only when enabled.
pub fn create_router(kernel: Arc<Kernel>, introspection: bool) -> Router {
    let service = format!("/{}", SERVICE_NAME);

    let mut router = Router::new()
        .route(&format!("{}/StartProcess", service), post(start_process))
        .route(&format!("{}/StopProcess", service), post(stop_process))
        .route(
            &format!("{}/GetProcessStatus", service),
            post(get_process_status),
        )
        .route(&format!("{}/ListProcesses", service), post(list_processes))
        .route(&format!("{}/HealthCheck", service), post(health_check));

    if introspection {
        router = router.route(&service, get(describe));
    }

    router.with_state(RpcState { kernel })
}

pub struct RpcServer {
    listener: TcpListener,
    router: Router,
    kernel: Arc<Kernel>,
}

impl RpcServer {
    pub async fn bind(
        addr: SocketAddr,
        kernel: Arc<Kernel>,
        introspection: bool,
    ) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self {
            listener,
            router: create_router(kernel.clone(), introspection),
            kernel,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// `shutdown` がキャンセルされると新規接続の受け付けを止め、処理中の呼び出しを待って戻る
    pub async fn run(self, shutdown: CancellationToken) -> io::Result<()> {
        let events = self.kernel.events().clone();
        if let Ok(addr) = self.listener.local_addr() {
            events.emit(&KernelEvent::ListenerStarted {
                frontend: Frontend::Rpc,
                addr,
            });
        }

        let result = axum::serve(self.listener, self.router)
            .with_graceful_shutdown(shutdown.cancelled_owned())
            .await;

        events.emit(&KernelEvent::ListenerStopped {
            frontend: Frontend::Rpc,
        });
        result
    }
}

async fn start_process(
    State(state): State<RpcState>,
    payload: std::result::Result<Json<StartProcessRequest>, JsonRejection>,
) -> Result<Json<StartProcessResponse>> {
    let Json(request) = payload?;
    let kernel = state.call("StartProcess");

    let response = match kernel.start_process(request.into()).await {
        Ok(process_id) => StartProcessResponse {
            success: true,
            process_id,
            message: "Process started successfully".to_string(),
        },
        Err(e) => StartProcessResponse {
            success: false,
            process_id: String::new(),
            message: e.to_string(),
        },
    };
    Ok(Json(response))
}

async fn stop_process(
    State(state): State<RpcState>,
    payload: std::result::Result<Json<StopProcessRequest>, JsonRejection>,
) -> Result<Json<StopProcessResponse>> {
    let Json(request) = payload?;
    let kernel = state.call("StopProcess");

    match kernel.stop_process(&request.process_id).await {
        Ok(()) => Ok(Json(StopProcessResponse {
            success: true,
            message: "Process stopped successfully".to_string(),
        })),
        Err(e @ KernelError::NotFound(_)) => Err(RpcError::NotFound(e.to_string())),
        Err(e) => Ok(Json(StopProcessResponse {
            success: false,
            message: e.to_string(),
        })),
    }
}

async fn get_process_status(
    State(state): State<RpcState>,
    payload: std::result::Result<Json<GetProcessStatusRequest>, JsonRejection>,
) -> Result<Json<GetProcessStatusResponse>> {
    let Json(request) = payload?;
    let kernel = state.call("GetProcessStatus");

    let status = kernel.get_process_status(&request.process_id).await;
    Ok(Json(GetProcessStatusResponse {
        status: status.as_str().to_string(),
    }))
}

async fn list_processes(State(state): State<RpcState>) -> Json<ListProcessesResponse> {
    let kernel = state.call("ListProcesses");

    Json(ListProcessesResponse {
        processes: kernel
            .list_processes()
            .into_iter()
            .map(ProcessInfo::from)
            .collect(),
    })
}

async fn health_check(State(state): State<RpcState>) -> Json<HealthCheckResponse> {
    let kernel = state.call("HealthCheck");

    let health = kernel.health_check().await;
    Json(HealthCheckResponse {
        status: health.status,
        message: health.message,
    })
}

async fn describe() -> Json<ServiceDescriptor> {
    Json(ServiceDescriptor::kernel())
}
