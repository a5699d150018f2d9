//! Administrative events delivered across processes.

use serde::{Deserialize, Serialize};

/// An event published by an out-of-band administrative action.
///
/// Encoded as `{"topic": "...", "payload": {...}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "topic", content = "payload")]
pub enum AdminEvent {
    /// Terminate every session of a user.
    #[serde(rename = "logout")]
    Logout(LogoutEvent),
    /// A provider account was linked.
    #[serde(rename = "link")]
    Link(LinkEvent),
    /// Wipe the whole canvas.
    #[serde(rename = "canvas-clear")]
    CanvasClear(CanvasClearEvent),
}

impl AdminEvent {
    /// Returns the topic name.
    pub fn topic(&self) -> &'static str {
        match self {
            AdminEvent::Logout(_) => "logout",
            AdminEvent::Link(_) => "link",
            AdminEvent::CanvasClear(_) => "canvas-clear",
        }
    }
}

/// Payload of the `logout` topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogoutEvent {
    /// Identity whose sessions end.
    pub user_id: String,
}

/// Payload of the `link` topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkEvent {
    /// Provider-side account id that was linked.
    pub user_id: String,
    /// Correlation token chosen by the client that started the link.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_token: Option<String>,
}

/// Payload of the `canvas-clear` topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanvasClearEvent {
    /// Admin who triggered the wipe.
    #[serde(default)]
    pub admin_id: Option<String>,
    /// Time of the wipe.
    pub timestamp: u64,
    /// Grid width the publisher expects.
    pub width: u32,
    /// Grid height the publisher expects.
    pub height: u32,
    /// Color every cell is reset to.
    pub default_color: String,
    /// Blank grid computed by the publisher; the server recomputes it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grid: Option<Vec<String>>,
}
