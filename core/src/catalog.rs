//! The commands a Visa MSD card answers, and what it answers them with.
//!
//! A terminal always sends the same bytes to select the PPSE, to select the Visa application
//! and to read the record, so those are matched as a whole. The Get Processing Options
//! command carries whatever PDOL data the terminal wants to send, so only its header counts.

use std::fmt;

use crate::nfc::{HEADER_LENGTH, SW_UNKNOWN};

/// Visa credit or debit.
pub const VISA_AID: [u8; 7] = [0xA0, 0x00, 0x00, 0x00, 0x03, 0x10, 0x10];

pub const PPSE_NAME: &[u8; 14] = b"2PAY.SYS.DDF01";

pub const PPSE_SELECT: [u8; 20] = [
    0x00, 0xA4, 0x04, 0x00, // SELECT by DF name
    0x0E, // Lc
    b'2', b'P', b'A', b'Y', b'.', b'S', b'Y', b'S', b'.', b'D', b'D', b'F', b'0', b'1',
    0x00, // Le
];

pub const PPSE_SELECT_RESPONSE: [u8; 39] = [
    0x6F, 0x23, // FCI Template
    0x84, 0x0E, // DF Name
    b'2', b'P', b'A', b'Y', b'.', b'S', b'Y', b'S', b'.', b'D', b'D', b'F', b'0', b'1',
    0xA5, 0x11, // FCI Proprietary Template
    0xBF, 0x0C, 0x0E, // FCI Issuer Discretionary Data
    0x61, 0x0C, // Directory Entry
    0x4F, 0x07, // ADF Name
    0xA0, 0x00, 0x00, 0x00, 0x03, 0x10, 0x10,
    0x87, 0x01, 0x01, // Application Priority Indicator
    0x90, 0x00,
];

pub const AID_SELECT: [u8; 13] = [
    0x00, 0xA4, 0x04, 0x00, // SELECT by DF name
    0x07, // Lc
    0xA0, 0x00, 0x00, 0x00, 0x03, 0x10, 0x10,
    0x00, // Le
];

pub const AID_SELECT_RESPONSE: [u8; 34] = [
    0x6F, 0x1E, // FCI Template
    0x84, 0x07, // DF Name
    0xA0, 0x00, 0x00, 0x00, 0x03, 0x10, 0x10,
    0xA5, 0x13, // FCI Proprietary Template
    0x50, 0x0B, // Application Label
    b'V', b'I', b'S', b'A', b' ', b'C', b'R', b'E', b'D', b'I', b'T',
    0x9F, 0x38, 0x03, // PDOL
    0x9F, 0x66, 0x02, // Terminal Transaction Qualifiers, 2 octets
    0x90, 0x00,
];

pub const GPO_HEADER: [u8; HEADER_LENGTH] = [0x80, 0xA8, 0x00, 0x00];

pub const GPO_RESPONSE: [u8; 10] = [
    0x80, 0x06, // Response Message Template Format 1
    0x00, 0x80, // AIP: MSD supported
    0x08, 0x01, 0x01, 0x00, // AFL: SFI 1, record 1 to 1, none for offline auth
    0x90, 0x00,
];

pub const READ_RECORD: [u8; 5] = [
    0x00, 0xB2, // READ RECORD
    0x01, // record 1
    0x0C, // SFI 1
    0x00, // Le
];

pub const UNKNOWN_ERROR_RESPONSE: [u8; 2] = SW_UNKNOWN.to_be_bytes();

/// A step of the MSD exchange, as seen from the card.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum Step {
    PpseSelect,
    AidSelect,
    GetProcessingOptions,
    ReadRecord,
    Unhandled,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Step::PpseSelect => "Step #1 PPSE select",
            Step::AidSelect => "Step #2 Visa MSD select",
            Step::GetProcessingOptions => "Step #3 GPO (get processing options)",
            Step::ReadRecord => "Step #4 READ RECORD",
            Step::Unhandled => "Unhandled APDU",
        })
    }
}

pub enum Matcher {
    /// The whole command must be equal.
    Exact(&'static [u8]),

    /// CLA INS P1 P2 must be equal and the command must carry a body.
    Header([u8; HEADER_LENGTH]),
}

impl Matcher {
    pub fn matches(&self, command: &[u8]) -> bool {
        match self {
            Matcher::Exact(bytes) => *bytes == command,
            Matcher::Header(header) => {
                command.len() > HEADER_LENGTH && command[..HEADER_LENGTH] == header[..]
            }
        }
    }
}

pub enum Reply {
    Static(&'static [u8]),

    /// Whatever record is published by the card at the time of the command.
    Record,
}

pub struct Entry {
    pub step: Step,
    pub matcher: Matcher,
    pub reply: Reply,
}

/// Entries in the order they are tried.
pub static ENTRIES: [Entry; 4] = [
    Entry {
        step: Step::PpseSelect,
        matcher: Matcher::Exact(&PPSE_SELECT),
        reply: Reply::Static(&PPSE_SELECT_RESPONSE),
    },
    Entry {
        step: Step::AidSelect,
        matcher: Matcher::Exact(&AID_SELECT),
        reply: Reply::Static(&AID_SELECT_RESPONSE),
    },
    Entry {
        step: Step::GetProcessingOptions,
        matcher: Matcher::Header(GPO_HEADER),
        reply: Reply::Static(&GPO_RESPONSE),
    },
    Entry {
        step: Step::ReadRecord,
        matcher: Matcher::Exact(&READ_RECORD),
        reply: Reply::Record,
    },
];

/// Finds the first entry matching the command.
pub fn lookup(command: &[u8]) -> Option<&'static Entry> {
    ENTRIES.iter().find(|entry| entry.matcher.matches(command))
}
