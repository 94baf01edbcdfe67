//! Core types for the scrcpy-recv crate.

use std::borrow::Borrow;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Caller-chosen identifier for one native session.
#[derive(Debug, Clone, Hash, Eq, PartialEq, PartialOrd, Ord)]
pub struct Token(pub String);

impl Token {
    /// Create a new token from a string.
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Get the token as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for Token {
    fn from(token: String) -> Self {
        Self(token)
    }
}

impl From<&str> for Token {
    fn from(token: &str) -> Self {
        Self(token.to_string())
    }
}

impl Borrow<str> for Token {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of one device multiplexed within a session.
#[derive(Debug, Clone, Hash, Eq, PartialEq, PartialOrd, Ord)]
pub struct DeviceId(pub String);

impl DeviceId {
    /// Create a new device ID from a string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the device ID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for DeviceId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for DeviceId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl Borrow<str> for DeviceId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Width and height of a frame image or a device screen.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Default)]
pub struct ImageSize {
    pub width: i32,
    pub height: i32,
}

impl ImageSize {
    /// Create a new image size.
    pub const fn new(width: i32, height: i32) -> Self {
        Self { width, height }
    }

    /// The engine reports `-1 x -1` for devices it knows nothing about.
    pub fn is_known(&self) -> bool {
        self.width >= 0 && self.height >= 0
    }

    /// Scale both dimensions down by an integer divisor.
    pub fn scaled_down(&self, divisor: i32) -> Self {
        if divisor <= 0 {
            return *self;
        }
        Self::new(self.width / divisor, self.height / divisor)
    }
}

impl fmt::Display for ImageSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// The four event kinds a session can register handlers for.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq)]
pub enum EventKind {
    /// Decoded frame image delivered by the video channel
    FrameImage,
    /// Screen size reported by the device
    DeviceInfo,
    /// Acknowledgement of a control message send
    CtrlSend,
    /// Video or control channel dropped
    Disconnect,
}

impl EventKind {
    /// All event kinds, in registry order.
    pub const ALL: [EventKind; 4] = [
        EventKind::FrameImage,
        EventKind::DeviceInfo,
        EventKind::CtrlSend,
        EventKind::Disconnect,
    ];

    /// Short lowercase name used in log fields.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::FrameImage => "frame_image",
            EventKind::DeviceInfo => "device_info",
            EventKind::CtrlSend => "ctrl_send",
            EventKind::Disconnect => "disconnect",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Opaque identifier returned for every handler registration.
///
/// Allows removing a single handler instead of every handler registered
/// for a (device, event kind) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RegistrationId(u64);

static NEXT_REGISTRATION_ID: AtomicU64 = AtomicU64::new(1);

impl RegistrationId {
    /// Allocate the next process-unique registration ID.
    pub(crate) fn next() -> Self {
        Self(NEXT_REGISTRATION_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for RegistrationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "reg-{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_size_display() {
        assert_eq!(ImageSize::new(1080, 1920).to_string(), "1080x1920");
        assert_eq!(ImageSize::new(-1, -1).to_string(), "-1x-1");
    }

    #[test]
    fn test_image_size_known() {
        assert!(ImageSize::new(720, 1280).is_known());
        assert!(!ImageSize::new(-1, -1).is_known());
    }

    #[test]
    fn test_image_size_scaled_down() {
        assert_eq!(ImageSize::new(1080, 1920).scaled_down(3), ImageSize::new(360, 640));
        assert_eq!(ImageSize::new(1080, 1920).scaled_down(0), ImageSize::new(1080, 1920));
    }

    #[test]
    fn test_registration_ids_are_unique() {
        let a = RegistrationId::next();
        let b = RegistrationId::next();
        assert_ne!(a, b);
        assert!(b.as_u64() > a.as_u64());
        assert!(a.to_string().starts_with("reg-"));
    }

    #[test]
    fn test_identifier_conversions() {
        let token: Token = "session001".into();
        assert_eq!(token.as_str(), "session001");
        let device = DeviceId::from(String::from("d1"));
        assert_eq!(device.to_string(), "d1");
        assert_eq!(EventKind::CtrlSend.to_string(), "ctrl_send");
    }
}
