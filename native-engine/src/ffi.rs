//! C types of the `scrcpy_recv` shared library.

use std::ffi::{c_char, c_int, c_void};

use scrcpy_recv::ImageSize;

/// Opaque receiver handle returned by `scrcpy_new_receiver`.
pub type ScrcpyListener = *mut c_void;

/// `scrcpy_rect`; the engine reports `{-1, -1}` for unknown devices.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScrcpyRect {
    pub width: c_int,
    pub height: c_int,
}

impl ScrcpyRect {
    pub fn to_size(self) -> ImageSize {
        ImageSize::new(self.width, self.height)
    }

    /// `None` when the engine does not know the size.
    pub fn known(self) -> Option<ImageSize> {
        Some(self.to_size()).filter(ImageSize::is_known)
    }
}

impl From<ImageSize> for ScrcpyRect {
    fn from(size: ImageSize) -> Self {
        Self {
            width: size.width,
            height: size.height,
        }
    }
}

pub type FrameImageCallback = unsafe extern "C" fn(
    token: *mut c_char,
    device_id: *mut c_char,
    img_data: *mut u8,
    img_data_len: u32,
    img_size: ScrcpyRect,
    orig_size: ScrcpyRect,
);

pub type DeviceInfoCallback = unsafe extern "C" fn(
    token: *mut c_char,
    device_id: *mut c_char,
    screen_width: c_int,
    screen_height: c_int,
);

/// `status` equals `data_len` when sent, `-9999` without a control socket.
pub type CtrlMsgSendCallback = unsafe extern "C" fn(
    token: *mut c_char,
    device_id: *mut c_char,
    msg_id: *mut c_char,
    status: c_int,
    data_len: c_int,
);

pub type DeviceDisconnectedCallback = unsafe extern "C" fn(
    token: *mut c_char,
    device_id: *mut c_char,
    connection_type: *mut c_char,
);

pub type NewReceiverFn = unsafe extern "C" fn(token: *mut c_char) -> ScrcpyListener;
pub type FreeReceiverFn = unsafe extern "C" fn(handle: ScrcpyListener);
pub type StartReceiverFn = unsafe extern "C" fn(
    handle: ScrcpyListener,
    listen_address: *mut c_char,
    net_buffer_size: c_int,
    video_buffer_size: c_int,
);
pub type ShutdownReceiverFn = unsafe extern "C" fn(handle: ScrcpyListener);
pub type SetImageSizeFn =
    unsafe extern "C" fn(handle: ScrcpyListener, device_id: *mut c_char, width: c_int, height: c_int);
pub type GetImageSizeFn =
    unsafe extern "C" fn(handle: ScrcpyListener, device_id: *mut c_char) -> ScrcpyRect;
pub type FrameRegisterFn = unsafe extern "C" fn(
    handle: ScrcpyListener,
    device_id: *mut c_char,
    handler: FrameImageCallback,
);
pub type DeviceInfoRegisterFn = unsafe extern "C" fn(
    handle: ScrcpyListener,
    device_id: *mut c_char,
    handler: DeviceInfoCallback,
);
pub type UnregisterAllFn = unsafe extern "C" fn(handle: ScrcpyListener, device_id: *mut c_char);
pub type SetCtrlMsgSendFn = unsafe extern "C" fn(
    handle: ScrcpyListener,
    device_id: *mut c_char,
    callback: CtrlMsgSendCallback,
);
pub type SendCtrlMsgFn = unsafe extern "C" fn(
    handle: ScrcpyListener,
    device_id: *mut c_char,
    msg_id: *mut c_char,
    data: *mut u8,
    data_len: c_int,
);
pub type SetDisconnectedFn =
    unsafe extern "C" fn(handle: ScrcpyListener, callback: DeviceDisconnectedCallback);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rect_unknown_size() {
        let rect = ScrcpyRect {
            width: -1,
            height: -1,
        };
        assert_eq!(rect.known(), None);
        assert_eq!(rect.to_size(), ImageSize::new(-1, -1));
    }

    #[test]
    fn test_rect_round_trip() {
        let rect = ScrcpyRect::from(ImageSize::new(360, 640));
        assert_eq!(rect.known(), Some(ImageSize::new(360, 640)));
    }
}
