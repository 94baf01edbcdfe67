//! # scrcpy-recv
//!
//! Event broker between a native scrcpy streaming engine and application
//! handlers.
//!
//! ## Overview
//!
//! The engine decodes video from Android devices and raises four kinds of
//! events on its own threads: decoded frame images, reported screen sizes,
//! control message send results and channel disconnects. This crate keeps
//! track of which handlers care about which (token, device) pair and fans each
//! event out to them.
//!
//! ## Key Features
//!
//! - **Session Handles**: one native context per token, released exactly once
//! - **Callback Registry**: per-device handler lists for each event kind, with
//!   wholesale or per-registration removal
//! - **Process-Wide Directory**: token lookup for upcalls that carry no context
//! - **Two Dispatch Strategies**: blocking fan-out with a buffer copy for frame
//!   images, fire-and-forget for everything else
//! - **Handler Isolation**: a panicking handler is reported, never propagated
//!   into the engine thread
//!
//! ## Usage
//!
//! ```rust,ignore
//! use scrcpy_recv::prelude::*;
//!
//! let engine = LoopbackEngine::new();
//! let session = Session::new(&engine, "session001")?;
//!
//! session.add_device_info_callback("d1", |info| {
//!     println!("{} reports {}", info.device, info.screen_size);
//! })?;
//! session.add_frame_image_callback("d1", |frame| {
//!     println!("frame of {} bytes at {}", frame.len(), frame.image_size);
//! })?;
//!
//! // Blocks until shut_down() is called from another thread.
//! let runner = session.spawn_start_up(StartupConfig::default())?;
//! // ...
//! session.shut_down()?;
//! runner.join().ok();
//! session.release()?;
//! ```
//!
//! ## Architecture
//!
//! 1. **Allocation**: [`Session::new`] asks a [`NativeEngine`] for a context
//! 2. **Registration**: the first handler of any kind lists the session in
//!    the [`Directory`] under its token; the last removal unlists it
//! 3. **Upcall**: the engine calls the [`Dispatcher`] (directly through
//!    [`EventSink`] or through the [`upcall`] functions) with a token
//! 4. **Fan-out**: the dispatcher looks the token up, snapshots the handlers
//!    of every listed session and runs them on its blocking pool

pub mod config;
pub mod directory;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod event;
pub mod loopback;
pub mod registry;
pub mod session;
pub mod types;
pub mod upcall;

// Re-export main types for convenience
pub use config::{DispatchConfig, StartupConfig};
pub use directory::Directory;
pub use dispatch::{DispatchOutcome, DispatchReport, Dispatcher};
pub use engine::{EventSink, NativeEngine, NativeSession};
pub use error::{HandlerFault, ReceiverError, Result};
pub use event::{
    ConnectionKind, CtrlSendAck, DeviceDisconnected, DeviceInfo, FrameImage,
    CTRL_SOCKET_NOT_CONNECTED,
};
pub use loopback::{LoopbackEngine, LoopbackHandle, SentMessage};
pub use registry::{CtrlSendHandler, DeviceInfoHandler, DisconnectHandler, FrameImageHandler};
pub use session::{Session, SessionRef};
pub use types::{DeviceId, EventKind, ImageSize, RegistrationId, Token};

/// Prelude module for convenient imports
///
/// ```rust
/// use scrcpy_recv::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{
        ConnectionKind, CtrlSendAck, DeviceDisconnected, DeviceId, DeviceInfo, DispatchConfig,
        Dispatcher, EventKind, FrameImage, ImageSize, LoopbackEngine, NativeEngine, ReceiverError,
        RegistrationId, Result, Session, SessionRef, StartupConfig, Token,
    };
}
