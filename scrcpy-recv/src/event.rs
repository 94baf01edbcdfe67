//! Event payloads handed to registered handlers.
//!
//! Every payload owns its data. Frame bytes are copied out of the engine's
//! buffer once per event into a [`Bytes`] that all handlers of that event
//! share.

use std::fmt;

use bytes::Bytes;

use crate::types::{DeviceId, ImageSize};

/// Status reported by the engine when no control socket is connected for the device.
pub const CTRL_SOCKET_NOT_CONNECTED: i32 = -9999;

/// A decoded frame image.
#[derive(Debug, Clone)]
pub struct FrameImage {
    /// Device the frame came from
    pub device: DeviceId,
    /// Encoded image bytes (owned copy of the engine buffer)
    pub data: Bytes,
    /// Size of the image after scaling
    pub image_size: ImageSize,
    /// Size of the device screen
    pub screen_size: ImageSize,
}

impl FrameImage {
    /// Number of payload bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the payload is empty.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Screen size reported by a device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub device: DeviceId,
    pub screen_size: ImageSize,
}

/// Result of forwarding a control message to a device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CtrlSendAck {
    pub device: DeviceId,
    pub message_id: String,
    /// Bytes written, or a negative status code
    pub status: i32,
    pub data_len: i32,
}

impl CtrlSendAck {
    /// The whole payload was accepted.
    pub fn is_complete(&self) -> bool {
        self.status >= 0 && self.status == self.data_len
    }

    /// The device had no control channel when the message was sent.
    pub fn is_not_connected(&self) -> bool {
        self.status == CTRL_SOCKET_NOT_CONNECTED
    }
}

/// Channel that dropped in a disconnect event.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ConnectionKind {
    Video,
    Control,
    Other(String),
}

impl ConnectionKind {
    /// Parse the connection type string used by the engine.
    pub fn parse(value: &str) -> Self {
        match value {
            "video" => ConnectionKind::Video,
            "ctrl" => ConnectionKind::Control,
            other => ConnectionKind::Other(other.to_string()),
        }
    }

    /// The engine's string form of this connection kind.
    pub fn as_str(&self) -> &str {
        match self {
            ConnectionKind::Video => "video",
            ConnectionKind::Control => "ctrl",
            ConnectionKind::Other(value) => value,
        }
    }
}

impl fmt::Display for ConnectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A device channel was disconnected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceDisconnected {
    pub device: DeviceId,
    pub connection: ConnectionKind,
}
