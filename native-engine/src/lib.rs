//! # native-engine
//!
//! [`NativeEngine`](scrcpy_recv::NativeEngine) implementation over the real
//! `scrcpy_recv` shared library.
//!
//! The library is loaded at run time with `libloading`, so nothing links
//! against it at build time. Engine callbacks enter through `extern "C"`
//! trampolines that forward to the process-wide
//! [`Dispatcher`](scrcpy_recv::Dispatcher); sessions used with this engine
//! must therefore be created with [`Session::new`](scrcpy_recv::Session::new).
//!
//! ## Usage
//!
//! ```rust,ignore
//! use native_engine::NativeLibrary;
//! use scrcpy_recv::{Session, StartupConfig};
//!
//! let library = NativeLibrary::open("libscrcpy_recv.so")?;
//! let session = Session::new(&library, "session001")?;
//! session.add_frame_image_callback("emulator-5554", |frame| {
//!     println!("{} bytes", frame.len());
//! })?;
//! let runner = session.spawn_start_up(StartupConfig::default())?;
//! ```

pub mod error;
pub mod ffi;
pub mod library;
mod receiver;
mod trampoline;

pub use error::{NativeError, Result};
pub use ffi::ScrcpyRect;
pub use library::NativeLibrary;
