//! Error types for the native engine binding.

use std::path::PathBuf;

/// Errors raised while loading or talking to the shared library.
#[derive(Debug, thiserror::Error)]
pub enum NativeError {
    /// The shared library could not be opened
    #[error("Failed to load {path}: {source}")]
    Load {
        path: PathBuf,
        #[source]
        source: libloading::Error,
    },

    /// The library does not export a required symbol
    #[error("Missing symbol {symbol}: {source}")]
    MissingSymbol {
        symbol: &'static str,
        #[source]
        source: libloading::Error,
    },

    /// A string passed to the engine contains a NUL byte
    #[error("String contains an interior NUL byte: {0}")]
    InteriorNul(#[from] std::ffi::NulError),
}

/// Convenience type alias for Results using NativeError.
pub type Result<T> = std::result::Result<T, NativeError>;
