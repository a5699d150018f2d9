//! # Pixboard Protocol
//!
//! Wire protocol types and JSON codecs for Pixboard.
//!
//! This crate provides:
//! - [`ClientMessage`] / [`ServerMessage`] for the WebSocket protocol
//! - [`AdminEvent`] for the cross-process administrative channel
//! - JSON encoding/decoding with frame size limits
//!
//! Every frame is a JSON object with a `type` discriminator and camelCase
//! fields. Admin events use a `topic` discriminator with a `payload`.
//!
//! This is a pure protocol crate with no I/O operations.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod codec;
mod error;
mod events;
mod messages;

pub use codec::{
    decode_client, decode_event, decode_server, encode_client, encode_event, encode_server,
    timestamp_ms, MAX_CLIENT_FRAME_LEN, MAX_EVENT_LINE_LEN,
};
pub use error::{ProtocolError, ProtocolResult};
pub use events::{AdminEvent, CanvasClearEvent, LinkEvent, LogoutEvent};
pub use messages::{
    AuthRequest, CanvasCleared, ClientMessage, ColorField, InitPayload, LinkedNotice, PixelUpdate,
    PlacePixel, ServerMessage,
};
