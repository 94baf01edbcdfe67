//! Dispatch of engine events to registered handlers.
//!
//! Two fan-out strategies, kept as separate code paths:
//!
//! - **Blocking fan-out** ([`Dispatcher::dispatch_frame_image`]): the frame
//!   buffer belongs to the engine and is only valid during the upcall. It is
//!   copied once, one task per handler is spawned, and the calling engine
//!   thread waits for every task (or the configured deadline) before
//!   returning.
//! - **Fire-and-forget fan-out** (device info, ctrl-send acks, disconnects):
//!   the payload is plain data, so tasks are spawned and the call returns
//!   immediately. No ordering is guaranteed between handlers.
//!
//! Handlers run on a dedicated tokio blocking pool. A panicking handler is
//! caught in its own task and reported; it never reaches the engine thread.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use bytes::Bytes;
use crossbeam::channel::{self, RecvTimeoutError};
use tokio::runtime::{Builder, Handle, Runtime};

use crate::config::DispatchConfig;
use crate::directory::Directory;
use crate::engine::EventSink;
use crate::error::{HandlerFault, ReceiverError, Result};
use crate::event::{ConnectionKind, CtrlSendAck, DeviceDisconnected, DeviceInfo, FrameImage};
use crate::types::{DeviceId, EventKind, ImageSize};

static GLOBAL: OnceLock<Arc<Dispatcher>> = OnceLock::new();

/// What happened to a single dispatched event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// No session is listed under the event's token
    NoSession,
    /// Sessions exist for the token but none has a handler for the device
    NoHandlers,
    /// Blocking fan-out finished waiting for its handlers
    Completed,
    /// Fire-and-forget fan-out spawned its handlers
    Spawned,
}

/// Summary of one dispatched event.
#[derive(Debug, Clone)]
pub struct DispatchReport {
    pub kind: EventKind,
    pub device: DeviceId,
    pub outcome: DispatchOutcome,
    /// Sessions listed under the token
    pub sessions: usize,
    /// Handlers invoked (blocking) or spawned (fire-and-forget)
    pub handlers: usize,
    /// Handlers that panicked or overran the deadline (blocking fan-out only)
    pub faults: Vec<HandlerFault>,
}

impl DispatchReport {
    fn empty(kind: EventKind, device: DeviceId, outcome: DispatchOutcome, sessions: usize) -> Self {
        Self {
            kind,
            device,
            outcome,
            sessions,
            handlers: 0,
            faults: Vec::new(),
        }
    }

    /// At least one handler received the event.
    pub fn is_delivered(&self) -> bool {
        self.handlers > 0
    }

    /// Number of handlers, or the first handler failure.
    pub fn into_result(self) -> Result<usize> {
        match self.faults.into_iter().next() {
            Some(fault) => Err(ReceiverError::HandlerPanic {
                kind: self.kind,
                device: self.device,
                fault,
            }),
            None => Ok(self.handlers),
        }
    }
}

/// Resolves engine events to sessions and runs their handlers.
pub struct Dispatcher {
    directory: Directory,
    config: DispatchConfig,
    runtime: Option<Runtime>,
}

impl Dispatcher {
    /// Create a dispatcher with its own directory and handler pool.
    pub fn new(config: DispatchConfig) -> Result<Self> {
        config.validate()?;

        let runtime = Builder::new_current_thread()
            .max_blocking_threads(config.max_blocking_threads)
            .thread_keep_alive(config.thread_keep_alive)
            .thread_name(config.thread_name.clone())
            .build()?;

        tracing::debug!(
            max_blocking_threads = config.max_blocking_threads,
            frame_deadline_ms = config.frame_deadline.map(|d| d.as_millis() as u64),
            "Dispatcher created"
        );

        Ok(Self {
            directory: Directory::new(),
            config,
            runtime: Some(runtime),
        })
    }

    /// The process-wide dispatcher used by engine upcalls.
    ///
    /// Created with [`DispatchConfig::default`] on first use unless
    /// [`init_global`](Self::init_global) ran earlier.
    pub fn global() -> Result<Arc<Dispatcher>> {
        if let Some(dispatcher) = GLOBAL.get() {
            return Ok(Arc::clone(dispatcher));
        }
        let dispatcher = Arc::new(Dispatcher::new(DispatchConfig::default())?);
        Ok(Arc::clone(GLOBAL.get_or_init(|| dispatcher)))
    }

    /// Create the process-wide dispatcher with a custom configuration.
    ///
    /// Fails if it already exists, since sessions may hold the old one.
    pub fn init_global(config: DispatchConfig) -> Result<Arc<Dispatcher>> {
        if GLOBAL.get().is_some() {
            return Err(ReceiverError::Configuration(
                "global dispatcher is already initialised".to_string(),
            ));
        }
        let dispatcher = Arc::new(Dispatcher::new(config)?);
        GLOBAL.set(Arc::clone(&dispatcher)).map_err(|_| {
            ReceiverError::Configuration("global dispatcher is already initialised".to_string())
        })?;
        Ok(dispatcher)
    }

    pub fn directory(&self) -> &Directory {
        &self.directory
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    /// Blocking fan-out of a frame image.
    ///
    /// `data` is copied before any handler runs. Returns only after every
    /// matching handler finished, or after the configured deadline.
    pub fn dispatch_frame_image(
        &self,
        token: &str,
        device: &str,
        data: &[u8],
        image_size: ImageSize,
        screen_size: ImageSize,
    ) -> DispatchReport {
        let kind = EventKind::FrameImage;
        let device = DeviceId::new(device);
        let sessions = self.directory.lookup(token);

        if sessions.is_empty() {
            tracing::debug!(
                token = token,
                device = %device,
                data_len = data.len(),
                image_size = %image_size,
                screen_size = %screen_size,
                "No session registered for frame image"
            );
            return DispatchReport::empty(kind, device, DispatchOutcome::NoSession, 0);
        }

        // Released sessions are skipped; holding the guards keeps a
        // concurrent release() waiting until this fan-out is done.
        let mut guards = Vec::with_capacity(sessions.len());
        let mut handlers = Vec::new();
        for session in &sessions {
            if let Some(guard) = session.dispatch_guard() {
                handlers.extend(session.frame_image_handlers(&device));
                guards.push(guard);
            }
        }

        if handlers.is_empty() {
            tracing::debug!(
                token = token,
                device = %device,
                data_len = data.len(),
                image_size = %image_size,
                screen_size = %screen_size,
                "No frame image handler configured for device"
            );
            return DispatchReport::empty(kind, device, DispatchOutcome::NoHandlers, sessions.len());
        }

        let frame = Arc::new(FrameImage {
            device: device.clone(),
            data: Bytes::copy_from_slice(data),
            image_size,
            screen_size,
        });

        let expected = handlers.len();
        let (done_tx, done_rx) = channel::bounded(expected);
        for handler in handlers {
            let frame = Arc::clone(&frame);
            let done_tx = done_tx.clone();
            self.spawn(move || {
                let outcome = invoke_isolated(|| handler(&frame));
                let _ = done_tx.send(outcome);
            });
        }
        drop(done_tx);

        let faults = self.await_handlers(kind, &device, expected, &done_rx);
        drop(guards);

        DispatchReport {
            kind,
            device,
            outcome: DispatchOutcome::Completed,
            sessions: sessions.len(),
            handlers: expected,
            faults,
        }
    }

    /// Fire-and-forget fan-out of a device's reported screen size.
    pub fn dispatch_device_info(
        &self,
        token: &str,
        device: &str,
        width: i32,
        height: i32,
    ) -> DispatchReport {
        let kind = EventKind::DeviceInfo;
        let device = DeviceId::new(device);
        let sessions = self.directory.lookup(token);
        let handlers: Vec<_> = sessions
            .iter()
            .flat_map(|session| session.device_info_handlers(&device))
            .collect();

        let info = DeviceInfo {
            device: device.clone(),
            screen_size: ImageSize::new(width, height),
        };
        self.fan_out(kind, token, device, sessions.len(), info, handlers)
    }

    /// Fire-and-forget fan-out of a control message send result.
    pub fn dispatch_ctrl_send(
        &self,
        token: &str,
        device: &str,
        message_id: &str,
        status: i32,
        data_len: i32,
    ) -> DispatchReport {
        let kind = EventKind::CtrlSend;
        let device = DeviceId::new(device);
        let sessions = self.directory.lookup(token);
        let handlers: Vec<_> = sessions
            .iter()
            .flat_map(|session| session.ctrl_send_handlers(&device))
            .collect();

        tracing::debug!(
            token = token,
            device = %device,
            message_id = message_id,
            status = status,
            data_len = data_len,
            "Control message send completed"
        );

        let ack = CtrlSendAck {
            device: device.clone(),
            message_id: message_id.to_string(),
            status,
            data_len,
        };
        self.fan_out(kind, token, device, sessions.len(), ack, handlers)
    }

    /// Fire-and-forget fan-out of a dropped device channel.
    pub fn dispatch_disconnected(
        &self,
        token: &str,
        device: &str,
        connection_type: &str,
    ) -> DispatchReport {
        let kind = EventKind::Disconnect;
        let device = DeviceId::new(device);
        let sessions = self.directory.lookup(token);
        let handlers: Vec<_> = sessions
            .iter()
            .flat_map(|session| session.disconnect_handlers(&device))
            .collect();

        let event = DeviceDisconnected {
            device: device.clone(),
            connection: ConnectionKind::parse(connection_type),
        };
        self.fan_out(kind, token, device, sessions.len(), event, handlers)
    }

    /// Spawn every handler with a shared copy of `event` and return without waiting.
    fn fan_out<E>(
        &self,
        kind: EventKind,
        token: &str,
        device: DeviceId,
        sessions: usize,
        event: E,
        handlers: Vec<Arc<dyn Fn(&E) + Send + Sync>>,
    ) -> DispatchReport
    where
        E: Send + Sync + 'static,
    {
        if sessions == 0 {
            tracing::debug!(token = token, device = %device, kind = %kind, "No session registered for event");
            return DispatchReport::empty(kind, device, DispatchOutcome::NoSession, 0);
        }
        if handlers.is_empty() {
            tracing::debug!(token = token, device = %device, kind = %kind, "No handler configured for device");
            return DispatchReport::empty(kind, device, DispatchOutcome::NoHandlers, sessions);
        }

        let spawned = handlers.len();
        let event = Arc::new(event);
        for handler in handlers {
            let event = Arc::clone(&event);
            let task_device = device.clone();
            self.spawn(move || {
                if let Err(message) = invoke_isolated(|| handler(&event)) {
                    tracing::error!(
                        kind = %kind,
                        device = %task_device,
                        panic = %message,
                        "Handler panicked"
                    );
                }
            });
        }

        DispatchReport {
            kind,
            device,
            outcome: DispatchOutcome::Spawned,
            sessions,
            handlers: spawned,
            faults: Vec::new(),
        }
    }

    /// Wait for `expected` completions, bounded by the frame deadline if one is set.
    fn await_handlers(
        &self,
        kind: EventKind,
        device: &DeviceId,
        expected: usize,
        done_rx: &channel::Receiver<std::result::Result<(), String>>,
    ) -> Vec<HandlerFault> {
        let deadline = self.config.frame_deadline;
        // A deadline past the clock's range waits without bound.
        let due = deadline.and_then(|limit| Instant::now().checked_add(limit));
        let mut completed = 0;
        let mut faults = Vec::new();

        while completed < expected {
            let received = match due {
                Some(due) => done_rx.recv_deadline(due),
                None => done_rx.recv().map_err(|_| RecvTimeoutError::Disconnected),
            };

            match received {
                Ok(Ok(())) => completed += 1,
                Ok(Err(message)) => {
                    completed += 1;
                    tracing::error!(kind = %kind, device = %device, panic = %message, "Handler panicked");
                    faults.push(HandlerFault::Panicked(message));
                }
                Err(RecvTimeoutError::Timeout) => {
                    let limit = deadline.unwrap_or(Duration::ZERO);
                    let outstanding = expected - completed;
                    tracing::warn!(
                        kind = %kind,
                        device = %device,
                        outstanding = outstanding,
                        deadline_ms = limit.as_millis() as u64,
                        "Handlers overran dispatch deadline"
                    );
                    faults.extend((0..outstanding).map(|_| HandlerFault::TimedOut(limit)));
                    break;
                }
                Err(RecvTimeoutError::Disconnected) => {
                    let outstanding = expected - completed;
                    tracing::error!(
                        kind = %kind,
                        device = %device,
                        outstanding = outstanding,
                        "Handler tasks dropped before completing"
                    );
                    faults.extend((0..outstanding).map(|_| {
                        HandlerFault::Panicked("handler task was dropped".to_string())
                    }));
                    break;
                }
            }
        }

        faults
    }

    fn spawn<F>(&self, task: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if let Some(handle) = self.handle() {
            // Detached: completion is tracked by the caller if it cares.
            drop(handle.spawn_blocking(task));
        }
    }

    fn handle(&self) -> Option<&Handle> {
        self.runtime.as_ref().map(Runtime::handle)
    }
}

impl EventSink for Dispatcher {
    fn frame_image(
        &self,
        token: &str,
        device: &str,
        data: &[u8],
        image_size: ImageSize,
        screen_size: ImageSize,
    ) {
        self.dispatch_frame_image(token, device, data, image_size, screen_size);
    }

    fn device_info(&self, token: &str, device: &str, width: i32, height: i32) {
        self.dispatch_device_info(token, device, width, height);
    }

    fn ctrl_send(&self, token: &str, device: &str, message_id: &str, status: i32, data_len: i32) {
        self.dispatch_ctrl_send(token, device, message_id, status, data_len);
    }

    fn disconnected(&self, token: &str, device: &str, connection_type: &str) {
        self.dispatch_disconnected(token, device, connection_type);
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        // May run on a handler thread; never block joining the pool.
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}

/// Run a handler, converting a panic into its message.
fn invoke_isolated<F: FnOnce()>(handler: F) -> std::result::Result<(), String> {
    panic::catch_unwind(AssertUnwindSafe(handler)).map_err(|payload| panic_message(payload.as_ref()))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
