//! Client side of the generation server's REST and WebSocket API.

pub mod channel;
pub mod client;
pub mod error;
pub mod messages;
pub mod types;

pub use channel::{EventChannel, WebSocketChannel};
pub use client::{ArtifactDownloader, ComfyClient, HistorySource};
pub use error::ComfyError;
pub use messages::ServerMessage;
pub use types::{HistoryEntry, JobHandle, OutputReference, Outputs, SystemStats};
