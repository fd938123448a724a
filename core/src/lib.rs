//! A crate to impersonate a Visa MSD contactless card behind an APDU transport.
//!
//! The terminal drives a fixed four-step exchange: PPSE select, Visa AID select,
//! Get Processing Options and Read Record. Every step but the last one is answered
//! from a static catalog; the Read Record response is built from magnetic-stripe
//! track data supplied by the host, and is rebuilt whenever that data changes.
//!
//! ```rust
//! use hcepay::Card;
//!
//! let card = Card::default();
//! let response = card.handle(&[0x00, 0xB2, 0x01, 0x0C, 0x00]);
//!
//! assert_eq!(&response[..4], &[0x70, 0x15, 0x57, 0x13]);
//! assert_eq!(&response[response.len() - 2..], &[0x90, 0x00]);
//! ```
//!
//! Logging goes through `tracing` when the `tracing` feature is on. Without it, which is the
//! default and how the FFI crates build, every log statement compiles to nothing.

pub mod card;
pub mod catalog;
pub mod nfc;
pub mod settings;
pub mod tlv;
pub mod track2;

pub use card::{Card, Deactivation};
pub use settings::Settings;
pub use tlv::EmvRecord;
pub use track2::{PackedTrack2, Track2};
