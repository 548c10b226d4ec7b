//! Utilities shared by the heap schemes: remote addresses, constants and conversions, options,
//! logging, errors, and probing of remote object headers.

/// Remote addresses and address arithmetic.
pub mod address;
/// Constants about words, bytes and sizes.
pub mod constants;
/// Alignment and size conversions.
pub mod conversions;
/// The error type of the crate.
pub mod error;
/// Wrappers around the logging macros.
pub(crate) mod log;
/// Built-in logger.
pub mod logger;
/// Reading object headers in the target: hubs and forwarding words.
pub mod object_probe;
/// Inspector options.
pub mod options;

/// A mock remote VM and helpers for tests.
#[cfg(any(test, feature = "mock_test"))]
pub mod test_util;

pub use self::address::Address;
pub use self::address::ByteOffset;
pub use self::address::ByteSize;
pub use self::address::Word;
