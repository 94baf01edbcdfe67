//! Loading the shared library and allocating receivers.

use std::ffi::CString;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use libloading::Library;
use scrcpy_recv::{Dispatcher, EventSink, NativeEngine, NativeSession, Token};

use crate::error::{NativeError, Result};
use crate::ffi::*;
use crate::receiver::NativeReceiver;

/// Function pointer table resolved from the library.
///
/// The pointers stay valid as long as `_library` is loaded, which is for
/// as long as any receiver holds the table.
pub(crate) struct Symbols {
    pub(crate) new_receiver: NewReceiverFn,
    pub(crate) free_receiver: FreeReceiverFn,
    pub(crate) start_receiver: StartReceiverFn,
    pub(crate) shutdown_receiver: ShutdownReceiverFn,
    pub(crate) set_image_size: SetImageSizeFn,
    pub(crate) get_cfg_image_size: GetImageSizeFn,
    pub(crate) get_device_image_size: GetImageSizeFn,
    pub(crate) frame_register_callback: FrameRegisterFn,
    pub(crate) frame_unregister_all_callbacks: UnregisterAllFn,
    pub(crate) device_info_register_callback: DeviceInfoRegisterFn,
    pub(crate) device_info_unregister_all_callbacks: UnregisterAllFn,
    pub(crate) set_ctrl_msg_send_callback: SetCtrlMsgSendFn,
    pub(crate) send_ctrl_msg: SendCtrlMsgFn,
    pub(crate) set_device_disconnected_callback: SetDisconnectedFn,
    _library: Library,
}

/// Resolve one symbol and copy the function pointer out of it.
///
/// # Safety
///
/// `T` must match the symbol's C signature.
unsafe fn resolve<T: Copy>(library: &Library, symbol: &'static str) -> Result<T> {
    library
        .get::<T>(symbol.as_bytes())
        .map(|resolved| *resolved)
        .map_err(|source| NativeError::MissingSymbol { symbol, source })
}

/// The `scrcpy_recv` shared library, loaded at run time.
///
/// Implements [`NativeEngine`]; every receiver it allocates reports events
/// to the process-wide [`Dispatcher`], since the C callbacks carry only the
/// token.
#[derive(Clone)]
pub struct NativeLibrary {
    symbols: Arc<Symbols>,
    path: PathBuf,
}

impl NativeLibrary {
    /// Load the library at `path` and resolve every entry point.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let library = unsafe { Library::new(&path) }.map_err(|source| NativeError::Load {
            path: path.clone(),
            source,
        })?;

        let symbols = unsafe {
            Symbols {
                new_receiver: resolve(&library, "scrcpy_new_receiver")?,
                free_receiver: resolve(&library, "scrcpy_free_receiver")?,
                start_receiver: resolve(&library, "scrcpy_start_receiver")?,
                shutdown_receiver: resolve(&library, "scrcpy_shutdown_receiver")?,
                set_image_size: resolve(&library, "scrcpy_set_image_size")?,
                get_cfg_image_size: resolve(&library, "scrcpy_get_cfg_image_size")?,
                get_device_image_size: resolve(&library, "scrcpy_get_device_image_size")?,
                frame_register_callback: resolve(&library, "scrcpy_frame_register_callback")?,
                frame_unregister_all_callbacks: resolve(
                    &library,
                    "scrcpy_frame_unregister_all_callbacks",
                )?,
                device_info_register_callback: resolve(
                    &library,
                    "scrcpy_device_info_register_callback",
                )?,
                device_info_unregister_all_callbacks: resolve(
                    &library,
                    "scrcpy_device_info_unregister_all_callbacks",
                )?,
                set_ctrl_msg_send_callback: resolve(
                    &library,
                    "scrcpy_device_set_ctrl_msg_send_callback",
                )?,
                send_ctrl_msg: resolve(&library, "scrcpy_device_send_ctrl_msg")?,
                set_device_disconnected_callback: resolve(
                    &library,
                    "scrcpy_set_device_disconnected_callback",
                )?,
                _library: library,
            }
        };

        tracing::info!(path = %path.display(), "Loaded scrcpy_recv library");
        Ok(Self {
            symbols: Arc::new(symbols),
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl NativeEngine for NativeLibrary {
    fn create_session(
        &self,
        token: &Token,
        sink: Arc<dyn EventSink>,
    ) -> Option<Box<dyn NativeSession>> {
        if !routes_to_global(&sink) {
            tracing::warn!(
                token = %token,
                "Session does not use the global dispatcher; native events will not reach it"
            );
        }

        let c_token = match CString::new(token.as_str()) {
            Ok(c_token) => c_token,
            Err(e) => {
                tracing::error!(token = %token, error = %e, "Token cannot be passed to the engine");
                return None;
            }
        };

        let handle = unsafe { (self.symbols.new_receiver)(c_token.as_ptr() as *mut _) };
        if handle.is_null() {
            tracing::error!(token = %token, "Engine failed to allocate receiver");
            return None;
        }

        tracing::debug!(token = %token, "Allocated native receiver");
        Some(Box::new(NativeReceiver::new(
            Arc::clone(&self.symbols),
            handle,
            c_token,
        )))
    }
}

fn routes_to_global(sink: &Arc<dyn EventSink>) -> bool {
    match Dispatcher::global() {
        Ok(global) => {
            Arc::as_ptr(sink) as *const () == Arc::as_ptr(&global) as *const ()
        }
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_missing_library() {
        let result = NativeLibrary::open("/nonexistent/libscrcpy_recv.so");
        match result {
            Err(NativeError::Load { path, .. }) => {
                assert_eq!(path, PathBuf::from("/nonexistent/libscrcpy_recv.so"));
            }
            Err(other) => panic!("Expected Load error, got {:?}", other),
            Ok(_) => panic!("Expected Load error"),
        }
    }

    #[test]
    fn test_global_sink_detection() {
        let global: Arc<dyn EventSink> = Dispatcher::global().unwrap();
        assert!(routes_to_global(&global));

        let local: Arc<dyn EventSink> =
            Arc::new(Dispatcher::new(scrcpy_recv::DispatchConfig::default()).unwrap());
        assert!(!routes_to_global(&local));
    }
}
