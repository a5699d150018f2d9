//! WebSocket protocol messages.

use serde::{Deserialize, Serialize};

/// A frame sent by a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientMessage {
    /// Request to color one cell.
    PlacePixel(PlacePixel),
    /// Registers the connection under one or more identities.
    Auth(AuthRequest),
    /// Asks the server to resend the full grid.
    RequestInit,
    /// Liveness probe.
    Ping,
}

impl ClientMessage {
    /// Returns the wire name of the message type.
    pub fn type_name(&self) -> &'static str {
        match self {
            ClientMessage::PlacePixel(_) => "placePixel",
            ClientMessage::Auth(_) => "auth",
            ClientMessage::RequestInit => "requestInit",
            ClientMessage::Ping => "ping",
        }
    }
}

/// The color of a placement: a literal value or a palette id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ColorField {
    /// Literal color such as `#FF0000`.
    Value(String),
    /// Palette id already known to the client.
    Id(u64),
}

/// Body of a `placePixel` frame.
///
/// Coordinates arrive as JSON numbers and are validated by the server;
/// non-integral or out-of-range values cause the frame to be dropped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlacePixel {
    /// Column.
    pub x: f64,
    /// Row.
    pub y: f64,
    /// Requested color.
    pub color: ColorField,
    /// Identity of the placing user.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// Whether the caller claims privileged status.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_admin: Option<bool>,
}

impl PlacePixel {
    /// Creates an anonymous placement with a literal color.
    pub fn new(x: u32, y: u32, color: impl Into<String>) -> Self {
        Self {
            x: f64::from(x),
            y: f64::from(y),
            color: ColorField::Value(color.into()),
            user_id: None,
            is_admin: None,
        }
    }

    /// Attributes the placement to a user.
    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }
}

/// Body of an `auth` frame.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthRequest {
    /// Internal user id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// External provider (Discord) account id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discord_id: Option<String>,
    /// Client-chosen correlation token for account linking.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_token: Option<String>,
}

/// A frame sent by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerMessage {
    /// Full grid state.
    Init(InitPayload),
    /// One cell changed.
    UpdatePixel(PixelUpdate),
    /// Reply to `ping`.
    Pong,
    /// The session was terminated elsewhere; the client should sign out.
    Logout,
    /// An account link completed.
    Linked(LinkedNotice),
    /// The whole canvas was wiped.
    CanvasClear(CanvasCleared),
}

impl ServerMessage {
    /// Returns the wire name of the message type.
    pub fn type_name(&self) -> &'static str {
        match self {
            ServerMessage::Init(_) => "init",
            ServerMessage::UpdatePixel(_) => "updatePixel",
            ServerMessage::Pong => "pong",
            ServerMessage::Logout => "logout",
            ServerMessage::Linked(_) => "linked",
            ServerMessage::CanvasClear(_) => "canvasClear",
        }
    }
}

/// Body of an `init` frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitPayload {
    /// Grid width.
    pub width: u32,
    /// Grid height.
    pub height: u32,
    /// Row-major literal colors, `width * height` entries.
    pub grid: Vec<String>,
    /// Placements accepted so far.
    pub total_pixels: u64,
    /// Server time in milliseconds since the Unix epoch.
    pub timestamp: u64,
}

/// Body of an `updatePixel` frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PixelUpdate {
    /// Column.
    pub x: u32,
    /// Row.
    pub y: u32,
    /// Literal color.
    pub color: String,
    /// Placing user, if known.
    pub user_id: Option<String>,
    /// Time the placement was applied.
    pub timestamp: u64,
    /// Placements accepted so far, including this one.
    pub total_pixels: u64,
}

/// Body of a `linked` frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkedNotice {
    /// Time of the notification.
    pub ts: u64,
    /// Correlation token the client registered with, if any.
    pub client_token: Option<String>,
    /// The provider account that was linked.
    pub for_discord_id: String,
}

/// Body of a `canvasClear` frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanvasCleared {
    /// Time of the wipe.
    pub timestamp: u64,
    /// Grid width.
    pub width: u32,
    /// Grid height.
    pub height: u32,
    /// Blank grid, every entry the default color.
    pub grid: Vec<String>,
    /// Always 0 after a wipe.
    pub total_pixels: u64,
    /// Identity of the admin who triggered the wipe.
    pub cleared_by: Option<String>,
}
