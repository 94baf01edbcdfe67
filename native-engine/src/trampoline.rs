//! `extern "C"` entry points handed to the engine.
//!
//! The engine passes no context pointer, only the token, so every trampoline
//! forwards to the process-wide dispatcher. Nothing may unwind across the C
//! boundary: conversion failures and dispatch errors are logged and dropped.

use std::borrow::Cow;
use std::ffi::{c_char, c_int, CStr};
use std::panic::{self, AssertUnwindSafe};
use std::slice;

use scrcpy_recv::upcall;

use crate::ffi::ScrcpyRect;

/// Borrow a C string from the engine, or `None` for a null pointer.
///
/// # Safety
///
/// `ptr` must be null or point to a NUL-terminated string valid for `'a`.
unsafe fn borrow_str<'a>(ptr: *const c_char) -> Option<Cow<'a, str>> {
    if ptr.is_null() {
        None
    } else {
        Some(CStr::from_ptr(ptr).to_string_lossy())
    }
}

fn contained<F: FnOnce()>(kind: &'static str, f: F) {
    if panic::catch_unwind(AssertUnwindSafe(f)).is_err() {
        tracing::error!(kind, "Panic while handling engine upcall");
    }
}

pub(crate) unsafe extern "C" fn on_frame_image(
    token: *mut c_char,
    device_id: *mut c_char,
    img_data: *mut u8,
    img_data_len: u32,
    img_size: ScrcpyRect,
    orig_size: ScrcpyRect,
) {
    contained("frame_image", || {
        let (Some(token), Some(device)) = (borrow_str(token), borrow_str(device_id)) else {
            tracing::debug!("Dropping frame image with null token or device");
            return;
        };
        let data: &[u8] = if img_data_len == 0 {
            &[]
        } else if img_data.is_null() {
            tracing::debug!(token = %token, device = %device, "Dropping frame image with null buffer");
            return;
        } else {
            // Valid until this upcall returns; the dispatcher copies it first.
            slice::from_raw_parts(img_data, img_data_len as usize)
        };

        if let Err(e) = upcall::frame_image(
            &token,
            &device,
            data,
            img_size.to_size(),
            orig_size.to_size(),
        ) {
            tracing::error!(token = %token, device = %device, error = %e, "Frame dispatch failed");
        }
    });
}

pub(crate) unsafe extern "C" fn on_device_info(
    token: *mut c_char,
    device_id: *mut c_char,
    screen_width: c_int,
    screen_height: c_int,
) {
    contained("device_info", || {
        let (Some(token), Some(device)) = (borrow_str(token), borrow_str(device_id)) else {
            tracing::debug!("Dropping device info with null token or device");
            return;
        };
        if let Err(e) = upcall::device_info(&token, &device, screen_width, screen_height) {
            tracing::error!(token = %token, device = %device, error = %e, "Device info dispatch failed");
        }
    });
}

pub(crate) unsafe extern "C" fn on_ctrl_msg_send(
    token: *mut c_char,
    device_id: *mut c_char,
    msg_id: *mut c_char,
    status: c_int,
    data_len: c_int,
) {
    contained("ctrl_send", || {
        let (Some(token), Some(device)) = (borrow_str(token), borrow_str(device_id)) else {
            tracing::debug!("Dropping ctrl send result with null token or device");
            return;
        };
        let message_id = borrow_str(msg_id).unwrap_or_default();
        if let Err(e) = upcall::ctrl_send(&token, &device, &message_id, status, data_len) {
            tracing::error!(token = %token, device = %device, error = %e, "Ctrl send dispatch failed");
        }
    });
}

pub(crate) unsafe extern "C" fn on_device_disconnected(
    token: *mut c_char,
    device_id: *mut c_char,
    connection_type: *mut c_char,
) {
    contained("disconnect", || {
        let (Some(token), Some(device)) = (borrow_str(token), borrow_str(device_id)) else {
            tracing::debug!("Dropping disconnect with null token or device");
            return;
        };
        let connection = borrow_str(connection_type).unwrap_or_default();
        if let Err(e) = upcall::disconnected(&token, &device, &connection) {
            tracing::error!(token = %token, device = %device, error = %e, "Disconnect dispatch failed");
        }
    });
}
