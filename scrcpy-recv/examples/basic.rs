//! Basic receiver walkthrough on the in-process engine
//!
//! Mirrors what an application does against the real engine:
//! 1. Create a session for a token and register device-info, frame and
//!    control-send handlers for one device
//! 2. Scale frames to a third of the reported screen once the device connects
//! 3. Run the listening loop on its own thread
//! 4. Send a control message and watch its acknowledgement arrive
//! 5. Shut down and release
//!
//! Run with `RUST_LOG=scrcpy_recv=debug cargo run --example basic` for dispatch logs.

use std::sync::mpsc;
use std::time::Duration;

use scrcpy_recv::prelude::*;
use tracing_subscriber::EnvFilter;

const TOKEN: &str = "session001";
const DEVICE: &str = "emulator-5554";

fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    println!("scrcpy-recv - Basic Example");
    println!("===========================");

    let engine = LoopbackEngine::new();
    let session = Session::new(&engine, TOKEN)?;
    let handle = session.handle();

    let (sized_tx, sized_rx) = mpsc::channel();
    let scaler = session.handle();
    session.add_device_info_callback(DEVICE, move |info| {
        println!("Device {} screen size {}", info.device, info.screen_size);
        let target = info.screen_size.scaled_down(3);
        match scaler.set_frame_image_size(info.device.clone(), target.width, target.height) {
            Ok(()) => println!("   Frames scaled to {}", target),
            Err(e) => eprintln!("   Failed to scale frames: {}", e),
        }
        let _ = sized_tx.send(());
    })?;

    session.add_frame_image_callback(DEVICE, |frame| {
        println!(
            "Frame from {}: {} bytes, image {}, screen {}",
            frame.device,
            frame.len(),
            frame.image_size,
            frame.screen_size
        );
    })?;

    let (ack_tx, ack_rx) = mpsc::channel();
    session.add_ctrl_event_send_callback(DEVICE, move |ack| {
        let outcome = if ack.is_complete() {
            "sent"
        } else if ack.is_not_connected() {
            "no control channel"
        } else {
            "partial"
        };
        println!(
            "Control message {} to {}: {} ({} of {} bytes)",
            ack.message_id, ack.device, outcome, ack.status, ack.data_len
        );
        let _ = ack_tx.send(ack.clone());
    })?;

    session.add_device_disconnected_callback(DEVICE, |event| {
        println!("Device {} lost its {} channel", event.device, event.connection);
    })?;

    println!("\nStarting receiver on port {}", StartupConfig::default().listen_address);
    let runner = session.spawn_start_up(StartupConfig::default())?;

    // Play the device side.
    let device = engine
        .session(TOKEN)
        .ok_or("loopback session missing")?;
    device.connect_device(DEVICE, ImageSize::new(1080, 1920));
    sized_rx.recv_timeout(Duration::from_secs(5))?;

    for frame in 0..3u8 {
        device.emit_frame(DEVICE, &vec![frame; 1024 * (frame as usize + 1)]);
    }

    // 14-byte control payload
    let payload = [
        0x02, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x01, 0x00,
    ];
    handle.send_ctrl_event(DEVICE, "test001", &payload)?;
    let ack = ack_rx.recv_timeout(Duration::from_secs(5))?;
    println!("Acknowledged: {}", ack.is_complete());

    println!(
        "Original size {:?}, scaled size {:?}",
        handle.get_original_frame_image_size(DEVICE)?,
        handle.get_frame_image_size(DEVICE)?
    );

    device.disconnect_device(DEVICE, ConnectionKind::Video);
    std::thread::sleep(Duration::from_millis(50));

    println!("\nShutting down");
    handle.shut_down()?;
    match runner.join() {
        Ok(result) => result?,
        Err(_) => eprintln!("Receiver thread panicked"),
    }

    session.release()?;
    println!("Session released: {}", handle.is_released());
    Ok(())
}
