//! Minimal tungstenite socket wrapper for the far end of a session: loopback servers in tests
//! and demos, or one-off clients that don't need the session engine.

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, accept_async as tungstenite_accept,
    connect_async_tls_with_config as tungstenite_connect_tls,
    tungstenite::{Error as TungsteniteError, protocol::CloseFrame},
};

use crate::core::{WebSocketBufferConfig, WebSocketError, WsFrame};
use crate::tls::install_rustls_crypto_provider;
use crate::transport::tungstenite::{frame_to_msg, map_ws_error, msg_to_frame, websocket_config};

/// Thin wrapper around a websocket stream that hides tungstenite types.
pub struct WsClient {
    inner: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl WsClient {
    pub async fn send(&mut self, frame: WsFrame) -> Result<(), WebSocketError> {
        self.inner
            .send(frame_to_msg(frame))
            .await
            .map_err(|e| map_ws_error("write", e))
    }

    pub async fn send_text(&mut self, text: impl Into<String>) -> Result<(), WebSocketError> {
        self.send(WsFrame::text(text)).await
    }

    /// Next frame, or `None` once the peer is gone.
    pub async fn next(&mut self) -> Option<Result<WsFrame, WebSocketError>> {
        self.inner
            .next()
            .await
            .map(|res| res.map(msg_to_frame).map_err(|e| map_ws_error("read", e)))
    }

    /// Start the close handshake with `code`.
    pub async fn close(&mut self, code: u16, reason: &str) -> Result<(), WebSocketError> {
        let frame = CloseFrame {
            code: code.into(),
            reason: reason.to_owned().into(),
        };
        self.inner
            .close(Some(frame))
            .await
            .or_else(|e| match e {
                TungsteniteError::ConnectionClosed | TungsteniteError::AlreadyClosed => Ok(()),
                other => Err(other),
            })
            .map_err(|e| map_ws_error("close", e))
    }
}

/// Connect to a websocket URL with default buffers.
pub async fn connect_async(url: impl AsRef<str>) -> Result<WsClient, WebSocketError> {
    connect_with_buffers(url, WebSocketBufferConfig::default()).await
}

pub async fn connect_with_buffers(
    url: impl AsRef<str>,
    buffers: WebSocketBufferConfig,
) -> Result<WsClient, WebSocketError> {
    install_rustls_crypto_provider();
    let (stream, _) =
        tungstenite_connect_tls(url.as_ref(), Some(websocket_config(buffers)), false, None)
            .await
            .map_err(|err| WebSocketError::ConnectionFailed(err.to_string()))?;
    Ok(WsClient { inner: stream })
}

/// Accept an incoming websocket connection.
pub async fn accept_async(stream: TcpStream) -> Result<WsClient, WebSocketError> {
    let ws = tungstenite_accept(MaybeTlsStream::Plain(stream))
        .await
        .map_err(|err| WebSocketError::ConnectionFailed(err.to_string()))?;
    Ok(WsClient { inner: ws })
}
