//! In-process engine
//!
//! [`LoopbackEngine`] implements [`NativeEngine`] without sockets or a video
//! decoder. It behaves like the real engine where the session layer can
//! observe it:
//!
//! - events are only raised for devices (and kinds) natively registered;
//! - `start` blocks until `shutdown`, and a shutdown that arrives first makes
//!   the next `start` return immediately;
//! - control messages are acknowledged with `status == len`, or with
//!   [`CTRL_SOCKET_NOT_CONNECTED`] when the device never connected.
//!
//! Tests and the demo drive it through a [`LoopbackHandle`], which plays the
//! role of the remote device.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use dashmap::DashMap;
use parking_lot::{Condvar, Mutex};

use crate::config::StartupConfig;
use crate::engine::{EventSink, NativeEngine, NativeSession};
use crate::event::{ConnectionKind, CTRL_SOCKET_NOT_CONNECTED};
use crate::types::{DeviceId, ImageSize, Token};

/// A control message received by the loopback engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub device: DeviceId,
    pub message_id: String,
    pub data: Bytes,
}

#[derive(Default)]
struct DeviceState {
    configured: HashMap<DeviceId, ImageSize>,
    reported: HashMap<DeviceId, ImageSize>,
    frame_registered: HashSet<DeviceId>,
    device_info_registered: HashSet<DeviceId>,
    ctrl_send_registered: HashSet<DeviceId>,
    disconnect_registered: bool,
    ctrl_connected: HashSet<DeviceId>,
    sent: Vec<SentMessage>,
    listen: Option<StartupConfig>,
}

#[derive(Default)]
struct RunState {
    running: bool,
    stop_requested: bool,
}

struct LoopbackState {
    token: Token,
    sink: Arc<dyn EventSink>,
    devices: Mutex<DeviceState>,
    run: Mutex<RunState>,
    wake: Condvar,
    freed: AtomicBool,
}

impl LoopbackState {
    fn is_freed(&self) -> bool {
        self.freed.load(Ordering::Acquire)
    }
}

/// Engine that keeps every session in memory.
#[derive(Default)]
pub struct LoopbackEngine {
    sessions: DashMap<Token, Vec<Arc<LoopbackState>>>,
    fail_next_allocation: AtomicBool,
}

impl LoopbackEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `create_session` call fail as if the engine were out of memory.
    pub fn fail_next_allocation(&self) {
        self.fail_next_allocation.store(true, Ordering::Release);
    }

    /// Device-side handle of the most recent live session for `token`.
    pub fn session(&self, token: &str) -> Option<LoopbackHandle> {
        let sessions = self.sessions.get(token)?;
        sessions
            .iter()
            .rev()
            .find(|state| !state.is_freed())
            .map(|state| LoopbackHandle {
                state: Arc::clone(state),
            })
    }

    /// Number of sessions ever allocated for `token`, freed ones included.
    pub fn allocated(&self, token: &str) -> usize {
        self.sessions.get(token).map_or(0, |sessions| sessions.len())
    }
}

impl NativeEngine for LoopbackEngine {
    fn create_session(
        &self,
        token: &Token,
        sink: Arc<dyn EventSink>,
    ) -> Option<Box<dyn NativeSession>> {
        if self.fail_next_allocation.swap(false, Ordering::AcqRel) {
            tracing::warn!(token = %token, "Loopback allocation failed");
            return None;
        }

        let state = Arc::new(LoopbackState {
            token: token.clone(),
            sink,
            devices: Mutex::new(DeviceState::default()),
            run: Mutex::new(RunState::default()),
            wake: Condvar::new(),
            freed: AtomicBool::new(false),
        });
        self.sessions
            .entry(token.clone())
            .or_default()
            .push(Arc::clone(&state));

        Some(Box::new(LoopbackSession { state }))
    }
}

/// Engine-side half of a loopback session.
struct LoopbackSession {
    state: Arc<LoopbackState>,
}

impl NativeSession for LoopbackSession {
    fn start(&self, config: &StartupConfig) {
        self.state.devices.lock().listen = Some(config.clone());

        let mut run = self.state.run.lock();
        run.running = true;
        while !run.stop_requested {
            self.state.wake.wait(&mut run);
        }
        run.stop_requested = false;
        run.running = false;
    }

    fn shutdown(&self) {
        let mut run = self.state.run.lock();
        run.stop_requested = true;
        self.state.wake.notify_all();
    }

    fn set_image_size(&self, device: &DeviceId, size: ImageSize) {
        self.state.devices.lock().configured.insert(device.clone(), size);
    }

    fn configured_image_size(&self, device: &DeviceId) -> Option<ImageSize> {
        self.state.devices.lock().configured.get(device).copied()
    }

    fn device_image_size(&self, device: &DeviceId) -> Option<ImageSize> {
        self.state.devices.lock().reported.get(device).copied()
    }

    fn register_frame_callback(&self, device: &DeviceId) {
        self.state.devices.lock().frame_registered.insert(device.clone());
    }

    fn unregister_all_frame_callbacks(&self, device: &DeviceId) {
        self.state.devices.lock().frame_registered.remove(device);
    }

    fn register_device_info_callback(&self, device: &DeviceId) {
        self.state
            .devices
            .lock()
            .device_info_registered
            .insert(device.clone());
    }

    fn unregister_all_device_info_callbacks(&self, device: &DeviceId) {
        self.state.devices.lock().device_info_registered.remove(device);
    }

    fn set_ctrl_send_callback(&self, device: &DeviceId) {
        self.state
            .devices
            .lock()
            .ctrl_send_registered
            .insert(device.clone());
    }

    fn set_disconnect_callback(&self) {
        self.state.devices.lock().disconnect_registered = true;
    }

    fn send_ctrl_message(&self, device: &DeviceId, message_id: &str, data: &[u8]) {
        let (ack, connected) = {
            let mut devices = self.state.devices.lock();
            devices.sent.push(SentMessage {
                device: device.clone(),
                message_id: message_id.to_string(),
                data: Bytes::copy_from_slice(data),
            });
            (
                devices.ctrl_send_registered.contains(device),
                devices.ctrl_connected.contains(device),
            )
        };

        if !ack {
            return;
        }
        let (status, data_len) = if connected {
            let len = i32::try_from(data.len()).unwrap_or(i32::MAX);
            (len, len)
        } else {
            (CTRL_SOCKET_NOT_CONNECTED, CTRL_SOCKET_NOT_CONNECTED)
        };
        self.state.sink.ctrl_send(
            self.state.token.as_str(),
            device.as_str(),
            message_id,
            status,
            data_len,
        );
    }
}

impl Drop for LoopbackSession {
    fn drop(&mut self) {
        self.state.freed.store(true, Ordering::Release);
        self.shutdown();
    }
}

/// Device-side view of a loopback session, used to inject events.
#[derive(Clone)]
pub struct LoopbackHandle {
    state: Arc<LoopbackState>,
}

impl LoopbackHandle {
    pub fn token(&self) -> &Token {
        &self.state.token
    }

    /// Simulate `device` connecting with the given screen size.
    ///
    /// Records the reported size, opens its control channel and raises a
    /// device-info event if that device is registered for one. Returns
    /// whether the event was raised.
    pub fn connect_device(&self, device: impl Into<DeviceId>, screen_size: ImageSize) -> bool {
        let device = device.into();
        let registered = {
            let mut devices = self.state.devices.lock();
            devices.reported.insert(device.clone(), screen_size);
            devices.ctrl_connected.insert(device.clone());
            devices.device_info_registered.contains(&device)
        };

        if !registered || self.state.is_freed() {
            return false;
        }
        self.state.sink.device_info(
            self.state.token.as_str(),
            device.as_str(),
            screen_size.width,
            screen_size.height,
        );
        true
    }

    /// Raise a frame event for `device` with `data`.
    ///
    /// The image size is the configured one if set, otherwise the reported
    /// screen size. Returns whether the event was raised; the call blocks
    /// until the sink returns.
    pub fn emit_frame(&self, device: impl Into<DeviceId>, data: &[u8]) -> bool {
        let device = device.into();
        let sizes = {
            let devices = self.state.devices.lock();
            if !devices.frame_registered.contains(&device) {
                None
            } else {
                let screen = devices
                    .reported
                    .get(&device)
                    .copied()
                    .unwrap_or(ImageSize::new(-1, -1));
                let image = devices.configured.get(&device).copied().unwrap_or(screen);
                Some((image, screen))
            }
        };

        match sizes {
            Some((image_size, screen_size)) if !self.state.is_freed() => {
                self.state.sink.frame_image(
                    self.state.token.as_str(),
                    device.as_str(),
                    data,
                    image_size,
                    screen_size,
                );
                true
            }
            _ => false,
        }
    }

    /// Simulate one of `device`'s channels dropping.
    pub fn disconnect_device(&self, device: impl Into<DeviceId>, connection: ConnectionKind) -> bool {
        let device = device.into();
        let registered = {
            let mut devices = self.state.devices.lock();
            if connection == ConnectionKind::Control {
                devices.ctrl_connected.remove(&device);
            }
            devices.disconnect_registered
        };

        if !registered || self.state.is_freed() {
            return false;
        }
        self.state
            .sink
            .disconnected(self.state.token.as_str(), device.as_str(), connection.as_str());
        true
    }

    pub fn is_frame_registered(&self, device: &str) -> bool {
        self.state.devices.lock().frame_registered.contains(device)
    }

    pub fn is_device_info_registered(&self, device: &str) -> bool {
        self.state.devices.lock().device_info_registered.contains(device)
    }

    pub fn has_ctrl_send_callback(&self, device: &str) -> bool {
        self.state.devices.lock().ctrl_send_registered.contains(device)
    }

    pub fn has_disconnect_callback(&self) -> bool {
        self.state.devices.lock().disconnect_registered
    }

    /// Control messages received so far, oldest first.
    pub fn sent_messages(&self) -> Vec<SentMessage> {
        self.state.devices.lock().sent.clone()
    }

    pub fn is_running(&self) -> bool {
        self.state.run.lock().running
    }

    /// Configuration of the last `start` call.
    pub fn listen_config(&self) -> Option<StartupConfig> {
        self.state.devices.lock().listen.clone()
    }

    /// Whether the session layer freed this context.
    pub fn is_freed(&self) -> bool {
        self.state.is_freed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[derive(Default)]
    struct RecordingSink {
        events: Mutex<Vec<String>>,
    }

    impl EventSink for RecordingSink {
        fn frame_image(
            &self,
            token: &str,
            device: &str,
            data: &[u8],
            image_size: ImageSize,
            screen_size: ImageSize,
        ) {
            self.events.lock().push(format!(
                "frame {} {} {} {} {}",
                token,
                device,
                data.len(),
                image_size,
                screen_size
            ));
        }

        fn device_info(&self, token: &str, device: &str, width: i32, height: i32) {
            self.events
                .lock()
                .push(format!("info {} {} {}x{}", token, device, width, height));
        }

        fn ctrl_send(&self, token: &str, device: &str, message_id: &str, status: i32, data_len: i32) {
            self.events.lock().push(format!(
                "ctrl {} {} {} {} {}",
                token, device, message_id, status, data_len
            ));
        }

        fn disconnected(&self, token: &str, device: &str, connection_type: &str) {
            self.events
                .lock()
                .push(format!("disconnected {} {} {}", token, device, connection_type));
        }
    }

    fn setup(token: &str) -> (LoopbackEngine, Box<dyn NativeSession>, Arc<RecordingSink>) {
        let engine = LoopbackEngine::new();
        let sink = Arc::new(RecordingSink::default());
        let native = engine
            .create_session(&Token::new(token), sink.clone())
            .unwrap();
        (engine, native, sink)
    }

    #[test]
    fn test_events_only_for_registered_devices() {
        let (engine, native, sink) = setup("A");
        let device = engine.session("A").unwrap();

        assert!(!device.emit_frame("d1", &[0u8; 10]));
        assert!(!device.connect_device("d1", ImageSize::new(1080, 1920)));

        native.register_frame_callback(&DeviceId::new("d1"));
        native.register_device_info_callback(&DeviceId::new("d1"));
        assert!(device.connect_device("d1", ImageSize::new(1080, 1920)));
        assert!(device.emit_frame("d1", &[0u8; 10]));

        native.set_image_size(&DeviceId::new("d1"), ImageSize::new(360, 640));
        assert!(device.emit_frame("d1", &[0u8; 4]));

        let events = sink.events.lock().clone();
        assert_eq!(
            events,
            vec![
                "info A d1 1080x1920".to_string(),
                "frame A d1 10 1080x1920 1080x1920".to_string(),
                "frame A d1 4 360x640 1080x1920".to_string(),
            ]
        );
    }

    #[test]
    fn test_ctrl_ack_status() {
        let (engine, native, sink) = setup("A");
        let device = engine.session("A").unwrap();
        let d1 = DeviceId::new("d1");

        native.send_ctrl_message(&d1, "m0", &[1, 2, 3]);
        assert!(sink.events.lock().is_empty());

        native.set_ctrl_send_callback(&d1);
        native.send_ctrl_message(&d1, "m1", &[1, 2, 3]);
        device.connect_device("d1", ImageSize::new(720, 1280));
        native.send_ctrl_message(&d1, "m2", &[1, 2, 3]);

        let events = sink.events.lock().clone();
        assert_eq!(
            events,
            vec![
                "ctrl A d1 m1 -9999 -9999".to_string(),
                "ctrl A d1 m2 3 3".to_string(),
            ]
        );
        assert_eq!(device.sent_messages().len(), 3);
    }

    #[test]
    fn test_start_blocks_until_shutdown() {
        let (engine, native, _sink) = setup("A");
        let device = engine.session("A").unwrap();
        let native: Arc<dyn NativeSession> = Arc::from(native);

        let runner = Arc::clone(&native);
        let join = thread::spawn(move || runner.start(&StartupConfig::default()));

        while !device.is_running() {
            thread::sleep(Duration::from_millis(1));
        }
        native.shutdown();
        join.join().unwrap();

        assert!(!device.is_running());
        assert_eq!(device.listen_config(), Some(StartupConfig::default()));
    }

    #[test]
    fn test_shutdown_before_start_returns_immediately() {
        let (_engine, native, _sink) = setup("A");
        native.shutdown();
        native.start(&StartupConfig::new("27184"));
    }

    #[test]
    fn test_free_and_allocation_failure() {
        let (engine, native, _sink) = setup("A");
        let device = engine.session("A").unwrap();
        drop(native);

        assert!(device.is_freed());
        assert!(engine.session("A").is_none());
        assert_eq!(engine.allocated("A"), 1);

        engine.fail_next_allocation();
        let sink: Arc<dyn EventSink> = Arc::new(RecordingSink::default());
        assert!(engine.create_session(&Token::new("B"), sink.clone()).is_none());
        assert!(engine.create_session(&Token::new("B"), sink).is_some());
    }
}
