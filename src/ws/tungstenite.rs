//! [`Connector`] backed by `tokio-tungstenite`.

use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::{SinkExt as _, StreamExt as _};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_tungstenite::tungstenite::protocol::frame::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async_with_config};
use url::Url;

use super::error::{TransportFailure, WsError};
use super::transport::{CloseReason, Connector, FrameLimits, TransportEvents, TransportHandle};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type Ack = oneshot::Sender<Result<(), WsError>>;

#[derive(Debug)]
enum Command {
    Text(String, Ack),
    Close(Ack),
}

/// Opens plain or TLS WebSocket connections.
#[non_exhaustive]
#[derive(Debug, Clone, Default)]
pub struct TungsteniteConnector {
    /// Set `TCP_NODELAY` on the underlying socket
    pub disable_nagle: bool,
}

#[async_trait]
impl Connector for TungsteniteConnector {
    type Handle = TungsteniteHandle;

    async fn connect(
        &self,
        address: &Url,
        limits: FrameLimits,
        events: TransportEvents,
    ) -> Result<Self::Handle, WsError> {
        let config = WebSocketConfig::default()
            .max_message_size(Some(limits.max_message_size))
            .max_frame_size(Some(limits.max_frame_size));

        let (ws_stream, _response) =
            connect_async_with_config(address.as_str(), Some(config), self.disable_nagle).await?;

        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let remote_close = Arc::new(OnceLock::new());

        tokio::spawn(handle_connection(
            ws_stream,
            command_rx,
            events,
            Arc::clone(&remote_close),
        ));

        Ok(TungsteniteHandle {
            command_tx,
            remote_close,
        })
    }
}

/// A live tungstenite connection.
///
/// Writes and the close request are queued to the connection task in call
/// order; once a close has been queued every later write fails.
#[derive(Debug, Clone)]
pub struct TungsteniteHandle {
    command_tx: mpsc::UnboundedSender<Command>,
    /// Set when the remote peer ended the connection
    remote_close: Arc<OnceLock<CloseReason>>,
}

impl TungsteniteHandle {
    fn request<F>(&self, command: F) -> BoxFuture<'static, Result<(), WsError>>
    where
        F: FnOnce(Ack) -> Command,
    {
        let (ack_tx, ack_rx) = oneshot::channel();
        let queued = self.command_tx.send(command(ack_tx)).is_ok();
        let remote_close = Arc::clone(&self.remote_close);

        Box::pin(async move {
            if queued && let Ok(result) = ack_rx.await {
                return result;
            }
            Err(match remote_close.get() {
                Some(close) => WsError::RemoteDisconnect(close.clone()),
                None => TransportFailure::closed().into(),
            })
        })
    }
}

impl TransportHandle for TungsteniteHandle {
    fn send_text(&self, frame: String) -> BoxFuture<'static, Result<(), WsError>> {
        self.request(|ack| Command::Text(frame, ack))
    }

    fn close(&self) -> BoxFuture<'static, Result<(), WsError>> {
        self.request(Command::Close)
    }
}

/// Drive one connection until it is gone, then report the close.
async fn handle_connection(
    ws_stream: WsStream,
    mut command_rx: mpsc::UnboundedReceiver<Command>,
    events: TransportEvents,
    remote_close: Arc<OnceLock<CloseReason>>,
) {
    let (mut write, mut read) = ws_stream.split();
    let mut received_close: Option<CloseReason> = None;
    let mut close_requested = false;
    let mut commands_open = true;

    let reason = loop {
        tokio::select! {
            msg = read.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        #[cfg(feature = "tracing")]
                        tracing::trace!(generation = events.generation(), len = text.len(), "Received WebSocket text message");
                        events.frame(text.as_str().to_owned());
                    }
                    Some(Ok(Message::Close(frame))) => {
                        // Tungstenite answers the close; keep reading until the stream ends.
                        received_close = Some(frame.map_or_else(
                            || CloseReason::new(u16::from(CloseCode::Status), ""),
                            |frame| CloseReason::new(u16::from(frame.code), frame.reason.as_str()),
                        ));
                    }
                    Some(Ok(Message::Binary(bytes))) => {
                        #[cfg(feature = "tracing")]
                        tracing::trace!(len = bytes.len(), "Ignoring binary WebSocket frame");
                        #[cfg(not(feature = "tracing"))]
                        let _ = bytes;
                    }
                    Some(Ok(_)) => {
                        // Ping and pong are answered by tungstenite.
                    }
                    Some(Err(e)) => {
                        #[cfg(feature = "tracing")]
                        tracing::debug!(error = %e, "WebSocket read ended");
                        break match (received_close.take(), e) {
                            (Some(close), _) => close,
                            (None, tokio_tungstenite::tungstenite::Error::Capacity(e)) => {
                                CloseReason::new(u16::from(CloseCode::Size), e.to_string())
                            }
                            (None, _) => CloseReason::abnormal(),
                        };
                    }
                    None => break received_close.take().unwrap_or_else(CloseReason::abnormal),
                }
            }

            command = command_rx.recv(), if commands_open => {
                match command {
                    Some(Command::Text(text, ack)) => {
                        let result = write.send(Message::Text(text.into())).await;
                        _ = ack.send(result.map_err(WsError::from));
                    }
                    Some(Command::Close(ack)) => {
                        close_requested = true;
                        let result = write
                            .send(Message::Close(Some(CloseFrame {
                                code: CloseCode::Normal,
                                reason: "".into(),
                            })))
                            .await;
                        _ = ack.send(result.map_err(WsError::from));
                    }
                    None => {
                        // Every handle is gone; nobody can write or close anymore.
                        commands_open = false;
                        if !close_requested {
                            close_requested = true;
                            _ = write.send(Message::Close(None)).await;
                        }
                    }
                }
            }
        }
    };

    if !close_requested {
        _ = remote_close.set(reason.clone());
    }

    // Fail queued commands before the session hears about the close.
    drop(command_rx);

    #[cfg(feature = "tracing")]
    tracing::debug!(generation = events.generation(), close = %reason, "WebSocket connection ended");

    events.closed(reason);
}
