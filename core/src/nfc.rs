//! Talking to the terminal over NFC: APDU primitives and ISO 7816-4 status words.

pub use apdu::core::{HandleError, HandlerInCtx, Result};
pub use apdu::Error;
pub use apdu::{Command, Response};

/// Normal processing.
pub const SW_SUCCESS: u16 = 0x9000;

/// No precise diagnosis.
pub const SW_UNKNOWN: u16 = 0x6F00;

/// Length of the CLA INS P1 P2 header.
pub const HEADER_LENGTH: usize = 4;
