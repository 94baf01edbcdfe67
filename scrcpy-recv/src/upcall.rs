//! Entry points for engine callbacks that carry no context pointer.
//!
//! A C engine calls back through plain function pointers, so the only way to
//! find the interested sessions is the token it passes. These functions route
//! to the process-wide [`Dispatcher`].

use crate::dispatch::{DispatchReport, Dispatcher};
use crate::error::Result;
use crate::types::ImageSize;

/// Deliver a frame image. Blocks until every matching handler finished.
pub fn frame_image(
    token: &str,
    device: &str,
    data: &[u8],
    image_size: ImageSize,
    screen_size: ImageSize,
) -> Result<DispatchReport> {
    let dispatcher = Dispatcher::global()?;
    Ok(dispatcher.dispatch_frame_image(token, device, data, image_size, screen_size))
}

pub fn device_info(token: &str, device: &str, width: i32, height: i32) -> Result<DispatchReport> {
    Ok(Dispatcher::global()?.dispatch_device_info(token, device, width, height))
}

pub fn ctrl_send(
    token: &str,
    device: &str,
    message_id: &str,
    status: i32,
    data_len: i32,
) -> Result<DispatchReport> {
    Ok(Dispatcher::global()?.dispatch_ctrl_send(token, device, message_id, status, data_len))
}

pub fn disconnected(token: &str, device: &str, connection_type: &str) -> Result<DispatchReport> {
    Ok(Dispatcher::global()?.dispatch_disconnected(token, device, connection_type))
}
