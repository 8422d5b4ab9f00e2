use super::frame::{Frame, LegacyCodec};
use super::message::{INVALID_FORMAT, Request, dispatch};
use crate::config::LegacyDefaults;
use crate::lifecycle::Kernel;
use futures_util::{SinkExt, StreamExt};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use weaver_core::{EventSink, Frontend, KernelEvent};

/// 接続ごとの設定
#[derive(Debug, Clone)]
pub struct LegacySettings {
    pub defaults: LegacyDefaults,
    /// 接続開始からリクエスト受信完了までの期限
    pub read_timeout: Duration,
    pub max_payload: usize,
}

impl Default for LegacySettings {
    fn default() -> Self {
        Self {
            defaults: LegacyDefaults::default(),
            read_timeout: Duration::from_secs(30),
            max_payload: 1024 * 1024,
        }
    }
}

/// 1接続1リクエストのバイナリプロトコルサーバー
pub struct LegacyServer {
    listener: TcpListener,
    kernel: Arc<Kernel>,
    settings: Arc<LegacySettings>,
}

impl LegacyServer {
    pub async fn bind(
        addr: SocketAddr,
        kernel: Arc<Kernel>,
        settings: LegacySettings,
    ) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self {
            listener,
            kernel,
            settings: Arc::new(settings),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// `shutdown` がキャンセルされるまで接続を受け付ける
    ///
    /// キャンセル後は新規接続を受け付けず、処理中の接続の完了を待って戻る。
    pub async fn run(self, shutdown: CancellationToken) {
        let events = self.kernel.events().clone();
        if let Ok(addr) = self.listener.local_addr() {
            events.emit(&KernelEvent::ListenerStarted {
                frontend: Frontend::Legacy,
                addr,
            });
        }

        let connections = TaskTracker::new();
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        events.emit(&KernelEvent::ConnectionAccepted { peer });
                        let kernel = self.kernel.clone();
                        let settings = self.settings.clone();
                        connections.spawn(async move {
                            handle_connection(stream, peer, &kernel, &settings).await;
                        });
                    }
                    Err(e) => {
                        // 受け付けエラーは記録して継続
                        events.emit(&KernelEvent::AcceptFailed { error: e.to_string() });
                    }
                },
            }
        }

        drop(self.listener);
        connections.close();
        connections.wait().await;
        events.emit(&KernelEvent::ListenerStopped {
            frontend: Frontend::Legacy,
        });
    }
}

/// CONNECTED → READ_HEADER → READ_BODY → DISPATCH → SEND_RESPONSE → CLOSED
async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    kernel: &Kernel,
    settings: &LegacySettings,
) {
    let events: &dyn EventSink = kernel.events().as_ref();
    let mut framed = Framed::new(stream, LegacyCodec::new(settings.max_payload));

    let frame = match tokio::time::timeout(settings.read_timeout, framed.next()).await {
        Ok(Some(Ok(frame))) => frame,
        Ok(Some(Err(e))) => {
            events.emit(&KernelEvent::ConnectionDropped {
                peer,
                reason: e.to_string(),
            });
            return;
        }
        Ok(None) => {
            events.emit(&KernelEvent::ConnectionDropped {
                peer,
                reason: "connection closed before a full frame".to_string(),
            });
            return;
        }
        Err(_) => {
            events.emit(&KernelEvent::ConnectionDropped {
                peer,
                reason: format!(
                    "read deadline of {}s exceeded",
                    settings.read_timeout.as_secs()
                ),
            });
            return;
        }
    };

    events.emit(&KernelEvent::FrameReceived {
        peer,
        message_type: frame.message_type,
        length: frame.payload.len() as u32,
    });

    let payload = match Request::parse(frame.message_type, &frame.payload) {
        Ok(Request::Unsupported(message_type)) => {
            events.emit(&KernelEvent::UnknownMessageType { peer, message_type });
            dispatch(kernel, &settings.defaults, Request::Unsupported(message_type)).await
        }
        Ok(request) => dispatch(kernel, &settings.defaults, request).await,
        Err(_) => INVALID_FORMAT.to_string(),
    };

    let length = payload.len();
    match framed.send(Frame::new(frame.message_type, payload)).await {
        Ok(()) => events.emit(&KernelEvent::ResponseSent {
            peer,
            message_type: frame.message_type,
            length,
        }),
        Err(e) => events.emit(&KernelEvent::ResponseFailed {
            peer,
            error: e.to_string(),
        }),
    }
}
