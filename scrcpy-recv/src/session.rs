//! Session handles
//!
//! A [`Session`] owns one native engine context for a token, together with
//! the handlers registered on it. [`SessionRef`] is a cloneable reference to
//! the same session, so one thread can block in
//! [`start_up`](SessionRef::start_up) while others register handlers, send
//! control messages or call [`shut_down`](SessionRef::shut_down).
//!
//! Releasing the owner frees the native context exactly once. Every later call
//! through a surviving `SessionRef` fails with
//! [`ReceiverError::UseAfterRelease`].
//!
//! # Directory membership
//!
//! A session is listed in its dispatcher's [`Directory`](crate::directory::Directory)
//! while it has at least one registration of any kind for any device. The
//! check is on the aggregate count, so removing every handler of one device
//! keeps the session listed as long as another device still has one.
//!
//! # Caveats
//!
//! Handlers must not release the session they are registered on; a frame
//! handler doing so would wait for its own dispatch to finish.

use std::ops::Deref;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::{Mutex, RwLock, RwLockReadGuard};

use crate::config::StartupConfig;
use crate::dispatch::Dispatcher;
use crate::engine::{EventSink, NativeEngine, NativeSession};
use crate::error::{ReceiverError, Result};
use crate::event::{CtrlSendAck, DeviceDisconnected, DeviceInfo, FrameImage};
use crate::registry::{
    CallbackRegistry, CtrlSendHandler, DeviceInfoHandler, DisconnectHandler, FrameImageHandler,
};
use crate::types::{DeviceId, EventKind, ImageSize, RegistrationId, Token};

type NativeSlot = Option<Box<dyn NativeSession>>;

/// State shared by a session owner, its references and the directory.
pub(crate) struct SessionShared {
    token: Token,
    /// `None` once released. Frame dispatch and `start_up` hold read guards;
    /// release takes the write guard.
    native: RwLock<NativeSlot>,
    released: AtomicBool,
    running: AtomicBool,
    /// Serializes registry changes with the matching native calls.
    registration_lock: Mutex<()>,
    registry: Mutex<CallbackRegistry>,
    disconnect_bound: AtomicBool,
    dispatcher: Arc<Dispatcher>,
}

impl SessionShared {
    /// Guard keeping the native context alive for the duration of a frame dispatch.
    ///
    /// `None` if the session was released.
    pub(crate) fn dispatch_guard(&self) -> Option<RwLockReadGuard<'_, NativeSlot>> {
        if self.is_released() {
            return None;
        }
        let guard = self.native.read_recursive();
        guard.is_some().then_some(guard)
    }

    pub(crate) fn frame_image_handlers(&self, device: &DeviceId) -> Vec<FrameImageHandler> {
        if self.is_released() {
            return Vec::new();
        }
        self.registry.lock().frame_image.handlers(device)
    }

    pub(crate) fn device_info_handlers(&self, device: &DeviceId) -> Vec<DeviceInfoHandler> {
        if self.is_released() {
            return Vec::new();
        }
        self.registry.lock().device_info.handlers(device)
    }

    pub(crate) fn ctrl_send_handlers(&self, device: &DeviceId) -> Vec<CtrlSendHandler> {
        if self.is_released() {
            return Vec::new();
        }
        self.registry.lock().ctrl_send.handlers(device)
    }

    pub(crate) fn disconnect_handlers(&self, device: &DeviceId) -> Vec<DisconnectHandler> {
        if self.is_released() {
            return Vec::new();
        }
        self.registry.lock().disconnect.handlers(device)
    }

    fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }

    fn released_error(&self) -> ReceiverError {
        ReceiverError::UseAfterRelease {
            token: self.token.clone(),
        }
    }
}

/// Cloneable reference to a session.
///
/// Does not keep the native context alive: once the owning [`Session`] is
/// released every operation returns [`ReceiverError::UseAfterRelease`].
#[derive(Clone)]
pub struct SessionRef {
    shared: Arc<SessionShared>,
}

impl SessionRef {
    /// The token this session was created for. Still available after release.
    pub fn token(&self) -> &Token {
        &self.shared.token
    }

    pub fn is_released(&self) -> bool {
        self.shared.is_released()
    }

    /// Whether a `start_up` call is currently blocked in the engine loop.
    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }

    /// Run the engine's listening loop on the calling thread.
    ///
    /// Blocks until [`shut_down`](Self::shut_down) is called from another
    /// thread. A `shut_down` issued while no loop is running stays pending,
    /// so the next `start_up` returns at once. Bind and decode failures stay
    /// inside the engine.
    pub fn start_up(&self, config: &StartupConfig) -> Result<()> {
        config.validate()?;
        self.with_native(|native| {
            if self.shared.running.swap(true, Ordering::SeqCst) {
                return Err(ReceiverError::InvalidArgument(format!(
                    "session {} is already running",
                    self.shared.token
                )));
            }
            // Pairs with release(): one of the two sees the other's flag.
            if self.shared.released.load(Ordering::SeqCst) {
                self.shared.running.store(false, Ordering::SeqCst);
                return Err(self.shared.released_error());
            }

            tracing::info!(
                token = %self.shared.token,
                address = %config.listen_address,
                network_buffer_kb = config.network_buffer_kb,
                video_buffer_kb = config.video_buffer_kb,
                "Session starting"
            );

            native.start(config);

            self.shared.running.store(false, Ordering::Release);
            tracing::info!(token = %self.shared.token, "Session loop exited");
            Ok(())
        })?
    }

    /// Run [`start_up`](Self::start_up) on a dedicated, named thread.
    pub fn spawn_start_up(&self, config: StartupConfig) -> Result<JoinHandle<Result<()>>> {
        config.validate()?;
        self.ensure_live()?;

        let session = self.clone();
        let handle = thread::Builder::new()
            .name(format!("scrcpy-recv-{}", self.shared.token))
            .spawn(move || session.start_up(&config))?;
        Ok(handle)
    }

    /// Ask the engine loop to stop.
    pub fn shut_down(&self) -> Result<()> {
        self.with_native(|native| {
            tracing::info!(token = %self.shared.token, "Session shutting down");
            native.shutdown();
        })
    }

    /// Scale frames delivered for `device` to `width` x `height`.
    pub fn set_frame_image_size(
        &self,
        device: impl Into<DeviceId>,
        width: i32,
        height: i32,
    ) -> Result<()> {
        let device = non_empty_device(device.into())?;
        if width <= 0 || height <= 0 {
            return Err(ReceiverError::InvalidArgument(format!(
                "frame image size must be positive, got {}x{}",
                width, height
            )));
        }
        self.with_native(|native| {
            tracing::debug!(device = %device, width, height, "Setting frame image size");
            native.set_image_size(&device, ImageSize::new(width, height));
        })
    }

    /// Size frames are scaled to, if one was configured.
    pub fn get_frame_image_size(&self, device: impl Into<DeviceId>) -> Result<Option<ImageSize>> {
        let device = non_empty_device(device.into())?;
        self.with_native(|native| native.configured_image_size(&device).filter(ImageSize::is_known))
    }

    /// Screen size the device reported, if it has connected.
    pub fn get_original_frame_image_size(
        &self,
        device: impl Into<DeviceId>,
    ) -> Result<Option<ImageSize>> {
        let device = non_empty_device(device.into())?;
        self.with_native(|native| native.device_image_size(&device).filter(ImageSize::is_known))
    }

    /// Register a handler for every frame image of `device`.
    ///
    /// The handler sees a copy of the engine's buffer and runs on the
    /// dispatch pool; the engine thread waits for it.
    pub fn add_frame_image_callback<F>(
        &self,
        device: impl Into<DeviceId>,
        handler: F,
    ) -> Result<RegistrationId>
    where
        F: Fn(&FrameImage) + Send + Sync + 'static,
    {
        let device = non_empty_device(device.into())?;
        let handler: FrameImageHandler = Arc::new(handler);
        self.register(
            EventKind::FrameImage,
            &device,
            |registry| registry.frame_image.add(device.clone(), handler),
            |native| {
                native.unregister_all_frame_callbacks(&device);
                native.register_frame_callback(&device);
            },
        )
    }

    /// Register a handler for the screen size `device` reports.
    pub fn add_device_info_callback<F>(
        &self,
        device: impl Into<DeviceId>,
        handler: F,
    ) -> Result<RegistrationId>
    where
        F: Fn(&DeviceInfo) + Send + Sync + 'static,
    {
        let device = non_empty_device(device.into())?;
        let handler: DeviceInfoHandler = Arc::new(handler);
        self.register(
            EventKind::DeviceInfo,
            &device,
            |registry| registry.device_info.add(device.clone(), handler),
            |native| native.register_device_info_callback(&device),
        )
    }

    /// Register a handler for control message send results of `device`.
    pub fn add_ctrl_event_send_callback<F>(
        &self,
        device: impl Into<DeviceId>,
        handler: F,
    ) -> Result<RegistrationId>
    where
        F: Fn(&CtrlSendAck) + Send + Sync + 'static,
    {
        let device = non_empty_device(device.into())?;
        let handler: CtrlSendHandler = Arc::new(handler);
        self.register(
            EventKind::CtrlSend,
            &device,
            |registry| registry.ctrl_send.add(device.clone(), handler),
            |native| native.set_ctrl_send_callback(&device),
        )
    }

    /// Register a handler for dropped channels of `device`.
    pub fn add_device_disconnected_callback<F>(
        &self,
        device: impl Into<DeviceId>,
        handler: F,
    ) -> Result<RegistrationId>
    where
        F: Fn(&DeviceDisconnected) + Send + Sync + 'static,
    {
        let device = non_empty_device(device.into())?;
        let handler: DisconnectHandler = Arc::new(handler);
        let shared = &self.shared;
        self.register(
            EventKind::Disconnect,
            &device,
            |registry| registry.disconnect.add(device.clone(), handler),
            |native| {
                // The engine has a single disconnect upcall per context.
                if !shared.disconnect_bound.swap(true, Ordering::AcqRel) {
                    native.set_disconnect_callback();
                }
            },
        )
    }

    /// Remove every frame image handler of `device`. Returns how many were removed.
    pub fn remove_all_image_callbacks(&self, device: impl Into<DeviceId>) -> Result<usize> {
        let device = device.into();
        self.deregister(EventKind::FrameImage, &device, |native| {
            native.unregister_all_frame_callbacks(&device)
        })
    }

    /// Remove every device info handler of `device`. Returns how many were removed.
    pub fn remove_all_device_info_callbacks(&self, device: impl Into<DeviceId>) -> Result<usize> {
        let device = device.into();
        self.deregister(EventKind::DeviceInfo, &device, |native| {
            native.unregister_all_device_info_callbacks(&device)
        })
    }

    /// Remove every control-send handler of `device`.
    ///
    /// The engine keeps reporting send results; they are dropped here.
    pub fn remove_all_ctrl_event_send_callback(&self, device: impl Into<DeviceId>) -> Result<usize> {
        let device = device.into();
        self.deregister(EventKind::CtrlSend, &device, |_| {})
    }

    /// Remove every disconnect handler of `device`.
    pub fn remove_all_disconnected_callbacks(&self, device: impl Into<DeviceId>) -> Result<usize> {
        let device = device.into();
        self.deregister(EventKind::Disconnect, &device, |_| {})
    }

    /// Remove a single handler by the ID its registration returned.
    pub fn remove_callback(&self, id: RegistrationId) -> Result<()> {
        self.with_native(|native| -> Result<()> {
            let _serial = self.shared.registration_lock.lock();
            let (kind, device, now_empty) = {
                let mut registry = self.shared.registry.lock();
                let Some(removed) = registry.remove(id) else {
                    tracing::warn!(token = %self.shared.token, registration = %id, "Unknown registration");
                    return Err(ReceiverError::RegistrationNotFound(id));
                };
                self.sync_directory_membership(&registry);
                removed
            };

            tracing::debug!(
                token = %self.shared.token,
                registration = %id,
                kind = %kind,
                device = %device,
                "Removed handler"
            );

            if now_empty {
                match kind {
                    EventKind::FrameImage => native.unregister_all_frame_callbacks(&device),
                    EventKind::DeviceInfo => native.unregister_all_device_info_callbacks(&device),
                    EventKind::CtrlSend | EventKind::Disconnect => {}
                }
            }
            Ok(())
        })?
    }

    /// Forward a control payload to `device`.
    ///
    /// The send result arrives later through the control-send handlers.
    pub fn send_ctrl_event(
        &self,
        device: impl Into<DeviceId>,
        message_id: &str,
        data: &[u8],
    ) -> Result<()> {
        self.ensure_live()?;
        let device = non_empty_device(device.into())?;
        if data.is_empty() {
            return Err(ReceiverError::InvalidArgument(
                "control payload is empty".to_string(),
            ));
        }
        self.with_native(|native| {
            tracing::debug!(
                device = %device,
                message_id = message_id,
                data_len = data.len(),
                "Sending control message"
            );
            native.send_ctrl_message(&device, message_id, data);
        })
    }

    /// Total handlers registered on this session, across every kind and device.
    pub fn registration_count(&self) -> usize {
        self.shared.registry.lock().total()
    }

    /// Handlers registered for one (device, kind) pair.
    pub fn handler_count(&self, kind: EventKind, device: impl Into<DeviceId>) -> usize {
        self.shared.registry.lock().count(kind, &device.into())
    }

    fn register<A, N>(
        &self,
        kind: EventKind,
        device: &DeviceId,
        add: A,
        native_call: N,
    ) -> Result<RegistrationId>
    where
        A: FnOnce(&mut CallbackRegistry) -> RegistrationId,
        N: FnOnce(&dyn NativeSession),
    {
        self.with_native(|native| -> Result<RegistrationId> {
            let _serial = self.shared.registration_lock.lock();
            // A release may have cleared the registry while we waited.
            self.ensure_live()?;
            let id = {
                let mut registry = self.shared.registry.lock();
                let id = add(&mut *registry);
                self.sync_directory_membership(&registry);
                id
            };
            native_call(native);

            tracing::debug!(
                token = %self.shared.token,
                registration = %id,
                kind = %kind,
                device = %device,
                "Registered handler"
            );
            Ok(id)
        })?
    }

    fn deregister<N>(&self, kind: EventKind, device: &DeviceId, native_call: N) -> Result<usize>
    where
        N: FnOnce(&dyn NativeSession),
    {
        self.with_native(|native| {
            let _serial = self.shared.registration_lock.lock();
            let removed = {
                let mut registry = self.shared.registry.lock();
                let removed = registry.remove_device(kind, device);
                self.sync_directory_membership(&registry);
                removed
            };

            if removed > 0 {
                native_call(native);
                tracing::debug!(
                    token = %self.shared.token,
                    kind = %kind,
                    device = %device,
                    removed,
                    "Removed handlers"
                );
            }
            removed
        })
    }

    /// List the session in the directory while it has any registration, and
    /// unlist it once it has none. Called with the registry lock held.
    fn sync_directory_membership(&self, registry: &CallbackRegistry) {
        let directory = self.shared.dispatcher.directory();
        if registry.is_empty() {
            if directory.remove(&self.shared.token, &self.shared) {
                tracing::debug!(token = %self.shared.token, "Session removed from directory");
            }
        } else if directory.insert(&self.shared.token, &self.shared) {
            tracing::debug!(token = %self.shared.token, "Session added to directory");
        }
    }

    fn ensure_live(&self) -> Result<()> {
        if self.is_released() {
            return Err(self.shared.released_error());
        }
        Ok(())
    }

    fn with_native<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&dyn NativeSession) -> T,
    {
        self.ensure_live()?;
        let guard = self.shared.native.read_recursive();
        match guard.as_deref() {
            Some(native) => Ok(f(native)),
            None => Err(self.shared.released_error()),
        }
    }

    fn release_inner(&self) -> Result<()> {
        if self.shared.released.swap(true, Ordering::SeqCst) {
            return Err(self.shared.released_error());
        }

        if self.shared.running.load(Ordering::SeqCst) {
            if let Some(native) = self.shared.native.read_recursive().as_deref() {
                native.shutdown();
            }
        }

        {
            let _serial = self.shared.registration_lock.lock();
            let mut registry = self.shared.registry.lock();
            registry.clear();
            self.sync_directory_membership(&registry);
        }

        // Waits for in-flight frame dispatches and a running start_up to finish.
        let native = self.shared.native.write().take();
        drop(native);

        tracing::info!(token = %self.shared.token, "Session released");
        Ok(())
    }
}

/// Owner of a native session.
///
/// Dereferences to [`SessionRef`] for every operation. Dropping the owner
/// releases the session.
pub struct Session {
    handle: SessionRef,
}

impl Session {
    /// Allocate a session for `token` on the process-wide dispatcher.
    pub fn new(engine: &dyn NativeEngine, token: impl Into<Token>) -> Result<Self> {
        Self::with_dispatcher(engine, token, Dispatcher::global()?)
    }

    /// Allocate a session whose events are routed through `dispatcher`.
    pub fn with_dispatcher(
        engine: &dyn NativeEngine,
        token: impl Into<Token>,
        dispatcher: Arc<Dispatcher>,
    ) -> Result<Self> {
        let token = token.into();
        if token.as_str().is_empty() {
            return Err(ReceiverError::InvalidArgument(
                "session token is empty".to_string(),
            ));
        }

        let sink: Arc<dyn EventSink> = dispatcher.clone();
        let native = engine
            .create_session(&token, sink)
            .ok_or_else(|| ReceiverError::AllocationFailure {
                token: token.clone(),
            })?;

        tracing::info!(token = %token, "Session created");

        Ok(Self {
            handle: SessionRef {
                shared: Arc::new(SessionShared {
                    token,
                    native: RwLock::new(Some(native)),
                    released: AtomicBool::new(false),
                    running: AtomicBool::new(false),
                    registration_lock: Mutex::new(()),
                    registry: Mutex::new(CallbackRegistry::new()),
                    disconnect_bound: AtomicBool::new(false),
                    dispatcher,
                }),
            },
        })
    }

    /// A cloneable reference for use from other threads.
    pub fn handle(&self) -> SessionRef {
        self.handle.clone()
    }

    /// Free the native context and drop every registration.
    ///
    /// Stops a running loop first, then waits for it and for in-flight frame
    /// dispatches to finish.
    pub fn release(self) -> Result<()> {
        self.handle.release_inner()
    }
}

impl Deref for Session {
    type Target = SessionRef;

    fn deref(&self) -> &SessionRef {
        &self.handle
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if !self.handle.is_released() {
            let _ = self.handle.release_inner();
        }
    }
}

fn non_empty_device(device: DeviceId) -> Result<DeviceId> {
    if device.as_str().is_empty() {
        return Err(ReceiverError::InvalidArgument(
            "device identifier is empty".to_string(),
        ));
    }
    Ok(device)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DispatchConfig;
    use mockall::mock;
    use mockall::predicate::*;

    mock! {
        pub Native {}

        impl NativeSession for Native {
            fn start(&self, config: &StartupConfig);
            fn shutdown(&self);
            fn set_image_size(&self, device: &DeviceId, size: ImageSize);
            fn configured_image_size(&self, device: &DeviceId) -> Option<ImageSize>;
            fn device_image_size(&self, device: &DeviceId) -> Option<ImageSize>;
            fn register_frame_callback(&self, device: &DeviceId);
            fn unregister_all_frame_callbacks(&self, device: &DeviceId);
            fn register_device_info_callback(&self, device: &DeviceId);
            fn unregister_all_device_info_callbacks(&self, device: &DeviceId);
            fn set_ctrl_send_callback(&self, device: &DeviceId);
            fn set_disconnect_callback(&self);
            fn send_ctrl_message(&self, device: &DeviceId, message_id: &str, data: &[u8]);
        }
    }

    /// Hands out a single prepared native session.
    struct OneShotEngine {
        native: Mutex<Option<MockNative>>,
    }

    impl OneShotEngine {
        fn new(native: MockNative) -> Self {
            Self {
                native: Mutex::new(Some(native)),
            }
        }

        fn failing() -> Self {
            Self {
                native: Mutex::new(None),
            }
        }
    }

    impl NativeEngine for OneShotEngine {
        fn create_session(
            &self,
            _token: &Token,
            _sink: Arc<dyn EventSink>,
        ) -> Option<Box<dyn NativeSession>> {
            self.native
                .lock()
                .take()
                .map(|native| Box::new(native) as Box<dyn NativeSession>)
        }
    }

    fn dispatcher() -> Arc<Dispatcher> {
        Arc::new(Dispatcher::new(DispatchConfig::default()).unwrap())
    }

    fn session_with(native: MockNative, token: &str) -> (Session, Arc<Dispatcher>) {
        let dispatcher = dispatcher();
        let engine = OneShotEngine::new(native);
        let session = Session::with_dispatcher(&engine, token, Arc::clone(&dispatcher)).unwrap();
        (session, dispatcher)
    }

    #[test]
    fn test_allocation_failure() {
        let engine = OneShotEngine::failing();
        let result = Session::with_dispatcher(&engine, "A", dispatcher());
        assert!(matches!(
            result,
            Err(ReceiverError::AllocationFailure { token }) if token.as_str() == "A"
        ));
    }

    #[test]
    fn test_empty_token_rejected() {
        let engine = OneShotEngine::new(MockNative::new());
        let result = Session::with_dispatcher(&engine, "", dispatcher());
        assert!(matches!(result, Err(ReceiverError::InvalidArgument(_))));
    }

    #[test]
    fn test_frame_registration_reissues_native_registration() {
        let mut native = MockNative::new();
        let mut seq = mockall::Sequence::new();
        native
            .expect_unregister_all_frame_callbacks()
            .with(eq(DeviceId::new("d1")))
            .times(1)
            .in_sequence(&mut seq)
            .return_const(());
        native
            .expect_register_frame_callback()
            .with(eq(DeviceId::new("d1")))
            .times(1)
            .in_sequence(&mut seq)
            .return_const(());

        let (session, dispatcher) = session_with(native, "A");
        assert!(!dispatcher.directory().contains("A"));

        session.add_frame_image_callback("d1", |_| {}).unwrap();
        assert!(dispatcher.directory().contains("A"));
        assert_eq!(session.registration_count(), 1);
    }

    #[test]
    fn test_directory_membership_uses_aggregate_count() {
        let mut native = MockNative::new();
        native.expect_register_device_info_callback().return_const(());
        native.expect_unregister_all_device_info_callbacks().return_const(());
        native.expect_set_ctrl_send_callback().return_const(());

        let (session, dispatcher) = session_with(native, "A");
        session.add_device_info_callback("d1", |_| {}).unwrap();
        session.add_ctrl_event_send_callback("d2", |_| {}).unwrap();

        assert_eq!(session.remove_all_device_info_callbacks("d1").unwrap(), 1);
        assert!(dispatcher.directory().contains("A"));

        assert_eq!(session.remove_all_ctrl_event_send_callback("d2").unwrap(), 1);
        assert!(!dispatcher.directory().contains("A"));
    }

    #[test]
    fn test_remove_without_registrations_is_noop() {
        let mut native = MockNative::new();
        native.expect_unregister_all_frame_callbacks().never();
        native.expect_unregister_all_device_info_callbacks().never();

        let (session, dispatcher) = session_with(native, "A");
        assert_eq!(session.remove_all_image_callbacks("d1").unwrap(), 0);
        assert_eq!(session.remove_all_device_info_callbacks("d1").unwrap(), 0);
        assert_eq!(session.remove_all_ctrl_event_send_callback("d1").unwrap(), 0);
        assert_eq!(session.remove_all_disconnected_callbacks("d1").unwrap(), 0);
        assert!(dispatcher.directory().is_empty());
    }

    #[test]
    fn test_disconnect_callback_bound_once() {
        let mut native = MockNative::new();
        native.expect_set_disconnect_callback().times(1).return_const(());

        let (session, _dispatcher) = session_with(native, "A");
        session.add_device_disconnected_callback("d1", |_| {}).unwrap();
        session.add_device_disconnected_callback("d2", |_| {}).unwrap();
        assert_eq!(session.handler_count(EventKind::Disconnect, "d1"), 1);
        assert_eq!(session.registration_count(), 2);
    }

    #[test]
    fn test_remove_callback_by_id() {
        let mut native = MockNative::new();
        native.expect_register_device_info_callback().return_const(());
        native
            .expect_unregister_all_device_info_callbacks()
            .with(eq(DeviceId::new("d1")))
            .times(1)
            .return_const(());

        let (session, dispatcher) = session_with(native, "A");
        let first = session.add_device_info_callback("d1", |_| {}).unwrap();
        let second = session.add_device_info_callback("d1", |_| {}).unwrap();

        session.remove_callback(first).unwrap();
        assert_eq!(session.handler_count(EventKind::DeviceInfo, "d1"), 1);
        assert!(dispatcher.directory().contains("A"));

        session.remove_callback(second).unwrap();
        assert!(!dispatcher.directory().contains("A"));

        assert!(matches!(
            session.remove_callback(second),
            Err(ReceiverError::RegistrationNotFound(id)) if id == second
        ));
    }

    #[test]
    fn test_send_ctrl_event_validates_payload() {
        let mut native = MockNative::new();
        native.expect_send_ctrl_message().never();

        let (session, _dispatcher) = session_with(native, "A");
        assert!(matches!(
            session.send_ctrl_event("d1", "m1", &[]),
            Err(ReceiverError::InvalidArgument(_))
        ));
        assert!(matches!(
            session.send_ctrl_event("", "m1", &[1]),
            Err(ReceiverError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_send_ctrl_event_forwards() {
        let mut native = MockNative::new();
        native
            .expect_send_ctrl_message()
            .withf(|device, message_id, data| {
                device.as_str() == "d1" && message_id == "test001" && data.len() == 14
            })
            .times(1)
            .return_const(());

        let (session, _dispatcher) = session_with(native, "A");
        session.send_ctrl_event("d1", "test001", &[0u8; 14]).unwrap();
    }

    #[test]
    fn test_image_size_pass_through() {
        let mut native = MockNative::new();
        native
            .expect_set_image_size()
            .with(eq(DeviceId::new("d1")), eq(ImageSize::new(360, 640)))
            .times(1)
            .return_const(());
        native
            .expect_configured_image_size()
            .return_const(Some(ImageSize::new(360, 640)));
        native
            .expect_device_image_size()
            .return_const(Some(ImageSize::new(-1, -1)));

        let (session, _dispatcher) = session_with(native, "A");
        session.set_frame_image_size("d1", 360, 640).unwrap();
        assert_eq!(
            session.get_frame_image_size("d1").unwrap(),
            Some(ImageSize::new(360, 640))
        );
        assert_eq!(session.get_original_frame_image_size("d1").unwrap(), None);

        assert!(matches!(
            session.set_frame_image_size("d1", 0, 640),
            Err(ReceiverError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_use_after_release() {
        let mut native = MockNative::new();
        native.expect_register_device_info_callback().return_const(());
        native.expect_send_ctrl_message().never();
        native.expect_shutdown().never();

        let (session, dispatcher) = session_with(native, "A");
        session.add_device_info_callback("d1", |_| {}).unwrap();
        let handle = session.handle();

        session.release().unwrap();
        assert!(handle.is_released());
        assert!(!dispatcher.directory().contains("A"));
        assert_eq!(handle.token().as_str(), "A");

        assert!(matches!(
            handle.send_ctrl_event("d1", "m1", &[1, 2, 3]),
            Err(ReceiverError::UseAfterRelease { .. })
        ));
        assert!(matches!(
            handle.send_ctrl_event("d1", "m1", &[]),
            Err(ReceiverError::UseAfterRelease { .. })
        ));
        assert!(matches!(
            handle.add_frame_image_callback("d1", |_| {}),
            Err(ReceiverError::UseAfterRelease { .. })
        ));
        assert!(matches!(
            handle.shut_down(),
            Err(ReceiverError::UseAfterRelease { .. })
        ));
        assert_eq!(handle.registration_count(), 0);
    }

    #[test]
    fn test_drop_releases_session() {
        let mut native = MockNative::new();
        native.expect_set_ctrl_send_callback().return_const(());

        let (session, dispatcher) = session_with(native, "A");
        session.add_ctrl_event_send_callback("d1", |_| {}).unwrap();
        let handle = session.handle();
        drop(session);

        assert!(handle.is_released());
        assert!(dispatcher.directory().is_empty());
    }
}
