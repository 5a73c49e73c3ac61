//! Real-time messaging client with one-to-one audio/video calling.
//!
//! The crate speaks a JSON signaling protocol over a persistent websocket
//! and orchestrates the call lifecycle on top of it. Media capture and the
//! peer-to-peer transport are platform concerns injected through the traits
//! in [`calls::media`]; the core never touches a device directly and stays
//! fully testable without one.

pub mod calls;
pub mod client;
pub mod config;
pub mod error;
pub mod presence;
pub mod protocol;
pub mod socket;
pub mod types;

pub use calls::{CallApi, CallError, MediaDevices, PeerConnector};
pub use client::Client;
pub use config::ClientConfig;
pub use error::ClientError;
pub use types::events::EventBus;
