//! Capability contract of the native streaming engine.
//!
//! The engine decodes video, owns the sockets and produces every event this
//! crate distributes. It is consumed only through the two traits below:
//! [`NativeEngine`] allocates one [`NativeSession`] per token, and the session
//! delivers events back through an [`EventSink`] (normally the
//! [`Dispatcher`](crate::dispatch::Dispatcher)).
//!
//! Implementations: [`LoopbackEngine`](crate::loopback::LoopbackEngine) keeps
//! everything in-process, the `native-engine` crate binds the real shared
//! library.

use std::sync::Arc;

use crate::config::StartupConfig;
use crate::types::{DeviceId, ImageSize, Token};

/// Receiver of the four upcalls raised by the engine.
///
/// Arguments are borrowed from the engine and only valid for the duration of
/// the call; `data` in particular must be copied before it escapes.
pub trait EventSink: Send + Sync {
    /// A decoded frame for `device` is available.
    fn frame_image(
        &self,
        token: &str,
        device: &str,
        data: &[u8],
        image_size: ImageSize,
        screen_size: ImageSize,
    );

    /// `device` reported its screen size.
    fn device_info(&self, token: &str, device: &str, width: i32, height: i32);

    /// A control message send finished with `status`.
    fn ctrl_send(&self, token: &str, device: &str, message_id: &str, status: i32, data_len: i32);

    /// One of `device`'s channels dropped.
    fn disconnected(&self, token: &str, device: &str, connection_type: &str);
}

/// Allocator of native sessions.
pub trait NativeEngine: Send + Sync {
    /// Allocate a native context for `token`.
    ///
    /// Returns `None` when the engine cannot allocate one. Events raised by the
    /// returned session are delivered to `sink`.
    fn create_session(&self, token: &Token, sink: Arc<dyn EventSink>)
        -> Option<Box<dyn NativeSession>>;
}

/// One native engine context. Dropping it frees the context.
pub trait NativeSession: Send + Sync {
    /// Run the listening loop. Blocks until [`shutdown`](Self::shutdown) is called.
    fn start(&self, config: &StartupConfig);

    /// Ask a running loop to stop.
    fn shutdown(&self);

    /// Scale frames for `device` to `size`.
    fn set_image_size(&self, device: &DeviceId, size: ImageSize);

    /// Size configured with [`set_image_size`](Self::set_image_size), if any.
    fn configured_image_size(&self, device: &DeviceId) -> Option<ImageSize>;

    /// Screen size reported by the device, if it has connected.
    fn device_image_size(&self, device: &DeviceId) -> Option<ImageSize>;

    fn register_frame_callback(&self, device: &DeviceId);

    fn unregister_all_frame_callbacks(&self, device: &DeviceId);

    fn register_device_info_callback(&self, device: &DeviceId);

    fn unregister_all_device_info_callbacks(&self, device: &DeviceId);

    /// There is no matching unregister call; the engine keeps delivering acks.
    fn set_ctrl_send_callback(&self, device: &DeviceId);

    /// Registered once per session, not per device.
    fn set_disconnect_callback(&self);

    /// Forward a control payload to `device`. The outcome arrives as a ctrl-send upcall.
    fn send_ctrl_message(&self, device: &DeviceId, message_id: &str, data: &[u8]);
}
