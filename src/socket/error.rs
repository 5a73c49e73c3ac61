use thiserror::Error;

pub type Result<T> = std::result::Result<T, SocketError>;

#[derive(Debug, Error)]
pub enum SocketError {
    #[error("websocket error: {0}")]
    Ws(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("socket is closed")]
    SocketClosed,

    #[error("failed to encode outbound frame: {0}")]
    Encode(#[from] serde_json::Error),
}
