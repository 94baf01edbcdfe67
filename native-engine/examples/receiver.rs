//! Receive frames from real devices through the scrcpy_recv shared library
//!
//! Usage: `receiver <path to libscrcpy_recv> [device id] [seconds]`
//!
//! The library path may also be given through `SCRCPY_RECV_LIB`. Frames of the
//! device are scaled to a third of its screen once it reports its size.

use std::env;
use std::time::Duration;

use native_engine::NativeLibrary;
use scrcpy_recv::{Session, StartupConfig};
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let mut args = env::args().skip(1);
    let library_path = args
        .next()
        .or_else(|| env::var("SCRCPY_RECV_LIB").ok())
        .ok_or("pass the library path or set SCRCPY_RECV_LIB")?;
    let device = args.next().unwrap_or_else(|| "emulator-5554".to_string());
    let seconds: u64 = args.next().map(|s| s.parse()).transpose()?.unwrap_or(30);

    let library = NativeLibrary::open(&library_path)?;
    let session = Session::new(&library, "session001")?;

    let scaler = session.handle();
    session.add_device_info_callback(device.as_str(), move |info| {
        let target = info.screen_size.scaled_down(3);
        println!("{} screen {}, scaling to {}", info.device, info.screen_size, target);
        if let Err(e) = scaler.set_frame_image_size(info.device.clone(), target.width, target.height) {
            eprintln!("Failed to scale frames: {}", e);
        }
    })?;
    session.add_frame_image_callback(device.as_str(), |frame| {
        println!("{}: {} bytes at {}", frame.device, frame.len(), frame.image_size);
    })?;
    session.add_ctrl_event_send_callback(device.as_str(), |ack| {
        println!("ctrl {} -> status {} of {}", ack.message_id, ack.status, ack.data_len);
    })?;
    session.add_device_disconnected_callback(device.as_str(), |event| {
        println!("{} disconnected ({})", event.device, event.connection);
    })?;

    let config = StartupConfig::default();
    println!("Listening on {} for {}s", config.listen_address, seconds);
    let runner = session.spawn_start_up(config)?;

    std::thread::sleep(Duration::from_secs(seconds));
    session.shut_down()?;
    if let Ok(result) = runner.join() {
        result?;
    }
    session.release()?;
    Ok(())
}
