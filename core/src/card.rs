//! The emulated card: answers command APDUs and keeps the Read Record response up to date.

use std::sync::Arc;

use parking_lot::RwLock;
#[cfg(feature = "tracing")]
use tracing::{debug, info, warn};

use crate::catalog::{self, Reply, Step, UNKNOWN_ERROR_RESPONSE};
use crate::nfc;
use crate::settings::{Settings, DEFAULT_SWIPE_DATA, SWIPE_DATA_KEY};
use crate::tlv::{self, EmvRecord};
use crate::track2::{self, Track2};

#[cfg(not(feature = "tracing"))]
macro_rules! debug {
    ($($t: tt)*) => {};
}

#[cfg(not(feature = "tracing"))]
macro_rules! info {
    ($($t: tt)*) => {};
}

#[cfg(not(feature = "tracing"))]
macro_rules! warn {
    ($($t: tt)*) => {};
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum Error {
    #[error("Swipe data is not usable: {0}")]
    Track2(#[from] track2::Error),

    #[error("Could not build the Read Record response: {0}")]
    Tlv(#[from] tlv::Error),
}

/// Why the terminal stopped talking to the card.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Deactivation {
    /// The NFC link was lost, e.g. the phone was moved away from the terminal.
    LinkLoss,

    /// The terminal selected another application.
    Deselected,

    Other(i32),
}

impl From<i32> for Deactivation {
    fn from(reason: i32) -> Self {
        match reason {
            0 => Self::LinkLoss,
            1 => Self::Deselected,
            reason => Self::Other(reason),
        }
    }
}

/// An emulated Visa MSD card.
///
/// Commands are answered independently of each other; the only state is the Read Record
/// response built from the latest usable swipe data. Updating it swaps a pointer, so a command
/// handled concurrently sees either the previous record or the new one.
pub struct Card {
    record: RwLock<Option<Arc<EmvRecord>>>,
}

impl Card {
    /// Creates a card answering with the record built from the swipe data.
    /// If the swipe data is not usable, Read Record is rejected until usable data is supplied.
    pub fn new(swipe_data: &str) -> Self {
        let card = Self {
            record: RwLock::new(None),
        };

        // Failures are already logged and leave the card without a record.
        let _ = card.on_swipe_data_changed(swipe_data);

        card
    }

    pub fn with_settings(settings: &Settings) -> Self {
        Self::new(&settings.swipe_data)
    }

    /// The Read Record response currently published, if any.
    pub fn record(&self) -> Option<Arc<EmvRecord>> {
        self.record.read().clone()
    }

    /// Rebuilds the Read Record response from new swipe data.
    /// On error the previous response stays in place.
    pub fn on_swipe_data_changed(&self, swipe_data: &str) -> Result<(), Error> {
        let record = Track2::extract(swipe_data)
            .map_err(Error::from)
            .and_then(|track2| {
                debug!("Track 2 equivalent data: {}", track2);

                EmvRecord::read_record_response(&track2.pack()).map_err(Error::from)
            });

        match record {
            Ok(record) => {
                info!("Read Record response updated");
                *self.record.write() = Some(Arc::new(record));

                Ok(())
            }
            Err(e) => {
                warn!("Keeping the previous Read Record response: {}", e);

                Err(e)
            }
        }
    }

    /// Reacts to a change in the host's preference store.
    /// A removed swipe data setting falls back to the built-in test card.
    pub fn on_setting_changed(&self, key: &str, value: Option<&str>) -> Result<(), Error> {
        debug!("Setting changed: key={}", key);

        if key != SWIPE_DATA_KEY {
            return Ok(());
        }

        self.on_swipe_data_changed(value.unwrap_or(DEFAULT_SWIPE_DATA))
    }

    #[cfg_attr(not(feature = "tracing"), allow(unused_variables))]
    pub fn on_deactivated(&self, reason: Deactivation) {
        info!("Deactivated: {:?}", reason);
    }

    /// Tells which step of the exchange the command belongs to.
    pub fn classify(&self, command: &[u8]) -> Step {
        catalog::lookup(command)
            .map(|entry| entry.step)
            .unwrap_or(Step::Unhandled)
    }

    /// Answers a command APDU. Anything unknown is answered with `6F 00`.
    #[cfg_attr(not(feature = "tracing"), allow(unused_variables))]
    pub fn handle(&self, command: &[u8]) -> Vec<u8> {
        let (step, response) = match catalog::lookup(command) {
            Some(entry) => (entry.step, self.reply(&entry.reply)),
            None => {
                info!("Unhandled APDU: {}", hex::encode(command));

                (Step::Unhandled, UNKNOWN_ERROR_RESPONSE.to_vec())
            }
        };

        debug!(
            "{}: {} / Response: {}",
            step,
            hex::encode(command),
            hex::encode(&response)
        );

        response
    }

    fn reply(&self, reply: &Reply) -> Vec<u8> {
        match reply {
            Reply::Static(bytes) => bytes.to_vec(),
            Reply::Record => match self.record() {
                Some(record) => record.as_bytes().to_vec(),
                None => {
                    warn!("Read Record requested but no usable swipe data was supplied");

                    UNKNOWN_ERROR_RESPONSE.to_vec()
                }
            },
        }
    }
}

impl Default for Card {
    /// Creates a card answering with the built-in test card.
    fn default() -> Self {
        Self::new(DEFAULT_SWIPE_DATA)
    }
}

impl<Ctx> nfc::HandlerInCtx<Ctx> for Card {
    fn handle_in_ctx(&self, _: Ctx, command: &[u8], response: &mut [u8]) -> nfc::Result {
        let rx = self.handle(command);
        let len = rx.len();

        if response.len() < len {
            return Err(nfc::HandleError::NotEnoughBuffer(len));
        }

        response[..len].copy_from_slice(&rx);

        Ok(len)
    }
}
