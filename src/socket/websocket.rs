//! The persistent websocket to the signaling relay.
//!
//! One logical connection carries every message type, multiplexed by the
//! envelope's `type` discriminator. This layer owns framing and JSON
//! decode/encode only; routing and policy live with the client.

use crate::protocol::{ClientMessage, LoginRequest, ServerMessage};
use crate::socket::error::{Result, SocketError};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use log::{debug, info, trace, warn};
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::sync::mpsc::{self, Receiver};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

type RawWs = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<RawWs, Message>;
type WsStream = SplitStream<RawWs>;

pub struct SignalingSocket {
    sink: Arc<Mutex<Option<WsSink>>>,
}

impl SignalingSocket {
    /// Dial the relay. Returns the socket and a channel of decoded inbound
    /// messages; the channel closes when the connection drops for any reason.
    pub async fn connect(url: &str) -> Result<(Self, Receiver<ServerMessage>)> {
        info!("Dialing {url}");
        let (ws, _response) = connect_async(url).await?;
        let (sink, stream) = ws.split();

        let (messages_tx, messages_rx) = mpsc::channel(100);
        tokio::spawn(Self::read_pump(stream, messages_tx));

        Ok((
            Self {
                sink: Arc::new(Mutex::new(Some(sink))),
            },
            messages_rx,
        ))
    }

    /// Send credentials. Called exactly once per socket, right after open;
    /// there is no handshake retry on the same connection.
    pub async fn send_login(&self, username: &str, password: &str) -> Result<()> {
        let raw = serde_json::to_string(&LoginRequest {
            username: username.to_string(),
            password: password.to_string(),
        })?;
        self.send_raw(raw).await
    }

    pub async fn send(&self, message: &ClientMessage) -> Result<()> {
        self.send_raw(message.encode()?).await
    }

    async fn send_raw(&self, raw: String) -> Result<()> {
        let mut sink_guard = self.sink.lock().await;
        let sink = sink_guard.as_mut().ok_or(SocketError::SocketClosed)?;
        debug!("--> Sending frame: {} bytes", raw.len());
        sink.send(Message::text(raw)).await?;
        Ok(())
    }

    pub async fn close(&self) {
        if let Some(mut sink) = self.sink.lock().await.take() {
            let _ = sink.close().await;
        }
    }

    async fn read_pump(mut stream: WsStream, messages_tx: mpsc::Sender<ServerMessage>) {
        loop {
            match stream.next().await {
                Some(Ok(Message::Text(raw))) => {
                    trace!("<-- Received frame: {} bytes", raw.len());
                    match ServerMessage::decode(raw.as_str()) {
                        Ok(message) => {
                            if messages_tx.send(message).await.is_err() {
                                warn!("Message receiver dropped, closing read pump");
                                break;
                            }
                        }
                        Err(e) => {
                            warn!("Failed to decode inbound frame: {e}");
                        }
                    }
                }
                Some(Ok(Message::Close(_))) => {
                    trace!("Received close frame");
                    break;
                }
                Some(Ok(_)) => {
                    // Ping/pong handled by tungstenite; binary frames are
                    // not part of this protocol.
                }
                Some(Err(e)) => {
                    warn!("Error reading from websocket: {e}");
                    break;
                }
                None => {
                    trace!("Websocket stream ended");
                    break;
                }
            }
        }
        // Dropping messages_tx closes the channel, which is how the client
        // run loop learns the connection is gone.
    }
}
