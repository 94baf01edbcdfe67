//! One receiver allocated by the shared library.

use std::ffi::{c_int, CString};
use std::sync::Arc;

use scrcpy_recv::{DeviceId, ImageSize, NativeSession, StartupConfig};

use crate::error::Result;
use crate::ffi::{ScrcpyListener, ScrcpyRect};
use crate::library::Symbols;
use crate::trampoline;

pub(crate) struct NativeReceiver {
    symbols: Arc<Symbols>,
    handle: ScrcpyListener,
    token: CString,
}

// The receiver guards its own state; the handle is only an address.
unsafe impl Send for NativeReceiver {}
unsafe impl Sync for NativeReceiver {}

impl NativeReceiver {
    pub(crate) fn new(symbols: Arc<Symbols>, handle: ScrcpyListener, token: CString) -> Self {
        Self {
            symbols,
            handle,
            token,
        }
    }

    /// Run `f` with `device` as a C string, logging and skipping it if the
    /// conversion fails.
    fn with_device<T>(&self, device: &DeviceId, f: impl FnOnce(&CString) -> T) -> Option<T> {
        match c_string(device.as_str()) {
            Ok(device) => Some(f(&device)),
            Err(e) => {
                tracing::warn!(
                    token = %self.token.to_string_lossy(),
                    device = %device,
                    error = %e,
                    "Device id cannot be passed to the engine"
                );
                None
            }
        }
    }
}

fn c_string(value: &str) -> Result<CString> {
    Ok(CString::new(value)?)
}

fn c_size(size_kb: u32) -> c_int {
    c_int::try_from(size_kb).unwrap_or(c_int::MAX)
}

impl NativeSession for NativeReceiver {
    fn start(&self, config: &StartupConfig) {
        let address = match c_string(&config.listen_address) {
            Ok(address) => address,
            Err(e) => {
                tracing::error!(error = %e, "Listen address cannot be passed to the engine");
                return;
            }
        };
        unsafe {
            (self.symbols.start_receiver)(
                self.handle,
                address.as_ptr() as *mut _,
                c_size(config.network_buffer_kb),
                c_size(config.video_buffer_kb),
            );
        }
    }

    fn shutdown(&self) {
        unsafe { (self.symbols.shutdown_receiver)(self.handle) }
    }

    fn set_image_size(&self, device: &DeviceId, size: ImageSize) {
        self.with_device(device, |device| unsafe {
            (self.symbols.set_image_size)(
                self.handle,
                device.as_ptr() as *mut _,
                size.width,
                size.height,
            )
        });
    }

    fn configured_image_size(&self, device: &DeviceId) -> Option<ImageSize> {
        self.with_device(device, |device| unsafe {
            (self.symbols.get_cfg_image_size)(self.handle, device.as_ptr() as *mut _)
        })
        .and_then(ScrcpyRect::known)
    }

    fn device_image_size(&self, device: &DeviceId) -> Option<ImageSize> {
        self.with_device(device, |device| unsafe {
            (self.symbols.get_device_image_size)(self.handle, device.as_ptr() as *mut _)
        })
        .and_then(ScrcpyRect::known)
    }

    fn register_frame_callback(&self, device: &DeviceId) {
        self.with_device(device, |device| unsafe {
            (self.symbols.frame_register_callback)(
                self.handle,
                device.as_ptr() as *mut _,
                trampoline::on_frame_image,
            )
        });
    }

    fn unregister_all_frame_callbacks(&self, device: &DeviceId) {
        self.with_device(device, |device| unsafe {
            (self.symbols.frame_unregister_all_callbacks)(self.handle, device.as_ptr() as *mut _)
        });
    }

    fn register_device_info_callback(&self, device: &DeviceId) {
        self.with_device(device, |device| unsafe {
            (self.symbols.device_info_register_callback)(
                self.handle,
                device.as_ptr() as *mut _,
                trampoline::on_device_info,
            )
        });
    }

    fn unregister_all_device_info_callbacks(&self, device: &DeviceId) {
        self.with_device(device, |device| unsafe {
            (self.symbols.device_info_unregister_all_callbacks)(
                self.handle,
                device.as_ptr() as *mut _,
            )
        });
    }

    fn set_ctrl_send_callback(&self, device: &DeviceId) {
        self.with_device(device, |device| unsafe {
            (self.symbols.set_ctrl_msg_send_callback)(
                self.handle,
                device.as_ptr() as *mut _,
                trampoline::on_ctrl_msg_send,
            )
        });
    }

    fn set_disconnect_callback(&self) {
        unsafe {
            (self.symbols.set_device_disconnected_callback)(
                self.handle,
                trampoline::on_device_disconnected,
            )
        }
    }

    fn send_ctrl_message(&self, device: &DeviceId, message_id: &str, data: &[u8]) {
        let message_id = match c_string(message_id) {
            Ok(message_id) => message_id,
            Err(e) => {
                tracing::warn!(device = %device, error = %e, "Message id cannot be passed to the engine");
                return;
            }
        };
        let Ok(data_len) = c_int::try_from(data.len()) else {
            tracing::warn!(device = %device, data_len = data.len(), "Control payload too large");
            return;
        };

        // The engine copies the payload before returning.
        self.with_device(device, |device| unsafe {
            (self.symbols.send_ctrl_msg)(
                self.handle,
                device.as_ptr() as *mut _,
                message_id.as_ptr() as *mut _,
                data.as_ptr() as *mut u8,
                data_len,
            )
        });
    }
}

impl Drop for NativeReceiver {
    fn drop(&mut self) {
        unsafe { (self.symbols.free_receiver)(self.handle) }
        tracing::debug!(token = %self.token.to_string_lossy(), "Freed native receiver");
    }
}
