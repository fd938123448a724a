//! A point-of-sale terminal playing the Visa MSD exchange against a card.

use hcepay::catalog::{AID_SELECT, PPSE_SELECT, READ_RECORD};
use hcepay::nfc::{self, Command, HandleError, HandlerInCtx, Response};
use hcepay::tlv::{self, TAG_RECORD_TEMPLATE, TAG_TRACK2_EQUIVALENT};
use hcepay::{PackedTrack2, Track2};
use tracing::{debug, info};

/// PDOL data the card asks for in GPO: Terminal Transaction Qualifiers, MSD supported.
const PDOL_DATA: [u8; 4] = [0x83, 0x02, 0x80, 0x00];

const TAG_FCI_TEMPLATE: [u8; 1] = [0x6F];
const TAG_FCI_PROPRIETARY: [u8; 1] = [0xA5];
const TAG_APPLICATION_LABEL: [u8; 1] = [0x50];
const TAG_RESPONSE_FORMAT_1: [u8; 1] = [0x80];

/// Large enough for any short response APDU.
const MAX_RESPONSE_SIZE: usize = 258;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Error occurred while communicating with the card during {step}")]
    Handle {
        step: &'static str,
        #[source]
        source: HandleError,
    },

    #[error("The card rejected {step}")]
    Card {
        step: &'static str,
        #[source]
        source: nfc::Error,
    },

    #[error("The card answered {0} without the expected data object")]
    MissingData(&'static str),

    #[error("The card returned unusable Track 2 data: {0}")]
    Track2(#[from] hcepay::track2::Error),
}

pub(crate) type Result<T> = std::result::Result<T, Error>;

/// What the terminal learned from the card.
#[derive(Debug)]
pub struct Transaction {
    pub label: String,
    pub aip: [u8; 2],
    pub track2: Track2,
}

pub struct Terminal<'a, T>
where
    T: HandlerInCtx<()>,
{
    card: &'a T,
}

impl<'a, T> Terminal<'a, T>
where
    T: HandlerInCtx<()>,
{
    pub fn new(card: &'a T) -> Self {
        Self { card }
    }

    /// Runs PPSE select, application select, GPO and Read Record in order.
    pub fn tap(&self) -> Result<Transaction> {
        self.transmit("PPSE select", &PPSE_SELECT)?;

        let fci = self.transmit("application select", &AID_SELECT)?;
        let label = tlv::find(&fci, &TAG_FCI_TEMPLATE)
            .and_then(|fci| tlv::find(fci, &TAG_FCI_PROPRIETARY))
            .and_then(|proprietary| tlv::find(proprietary, &TAG_APPLICATION_LABEL))
            .map(|label| String::from_utf8_lossy(label).to_string())
            .ok_or(Error::MissingData("application select"))?;
        info!("Selected application: {}", label);

        let gpo = Command::new_with_payload_le(0x80, 0xA8, 0x00, 0x00, 0, &PDOL_DATA);
        let gpo = self.transmit("get processing options", &Vec::from(gpo))?;
        let aip = tlv::find(&gpo, &TAG_RESPONSE_FORMAT_1)
            .and_then(|value| value.get(..2))
            .map(|aip| [aip[0], aip[1]])
            .ok_or(Error::MissingData("get processing options"))?;
        debug!("AIP: {}", hex::encode(aip));

        let record = self.transmit("read record", &READ_RECORD)?;
        let track2 = tlv::find(&record, &[TAG_RECORD_TEMPLATE])
            .and_then(|template| tlv::find(template, &[TAG_TRACK2_EQUIVALENT]))
            .map(PackedTrack2::from)
            .ok_or(Error::MissingData("read record"))?
            .unpack()?;

        Ok(Transaction { label, aip, track2 })
    }

    /// Transmits an APDU command to the card, then returns the response data without the trailer.
    fn transmit(&self, step: &'static str, tx: &[u8]) -> Result<Vec<u8>> {
        debug!("TX: {}", hex::encode(tx));

        let mut rx = [0u8; MAX_RESPONSE_SIZE];
        let len = self
            .card
            .handle_in_ctx((), tx, &mut rx)
            .map_err(|source| Error::Handle { step, source })?;
        let rx = &rx[..len];

        debug!("RX: {}", hex::encode(rx));

        std::result::Result::<&[u8], apdu::core::Error>::from(Response::from(rx))
            .map(|data| data.to_vec())
            .map_err(|e| Error::Card {
                step,
                source: e.into(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use hcepay::Card;

    #[test]
    fn test_tap() {
        let card = Card::default();
        let transaction = Terminal::new(&card).tap().unwrap();

        assert_eq!("VISA CREDIT", transaction.label);
        assert_eq!([0x00, 0x80], transaction.aip);
        assert_eq!("4046460664629718", transaction.track2.pan());
        assert_eq!("16101210000018100000", transaction.track2.discretionary());
    }

    #[test]
    fn test_tap_without_record() {
        let card = Card::new("no track 2 here");

        assert!(matches!(
            Terminal::new(&card).tap(),
            Err(Error::Card {
                step: "read record",
                source: nfc::Error::CommandAborted,
            }),
        ));
    }

    /// Answers every command with a fixed response, or fails like a broken link.
    struct Canned(Option<&'static [u8]>);

    impl HandlerInCtx<()> for Canned {
        fn handle_in_ctx(&self, _: (), _: &[u8], response: &mut [u8]) -> nfc::Result {
            match self.0 {
                Some(rx) => {
                    response[..rx.len()].copy_from_slice(rx);
                    Ok(rx.len())
                }
                None => Err(HandleError::NotEnoughBuffer(MAX_RESPONSE_SIZE + 1)),
            }
        }
    }

    #[test]
    fn test_tap_rejected() {
        let card = Canned(Some(&[0x6A, 0x82]));

        assert!(matches!(
            Terminal::new(&card).tap(),
            Err(Error::Card {
                step: "PPSE select",
                source: nfc::Error::FileNotFound,
            }),
        ));

        let card = Canned(Some(&[0x90]));

        assert!(matches!(
            Terminal::new(&card).tap(),
            Err(Error::Card {
                step: "PPSE select",
                source: nfc::Error::Unknown(0x00, 0x00),
            }),
        ));
    }

    #[test]
    fn test_tap_link_failure() {
        let card = Canned(None);
        let err = Terminal::new(&card).tap().unwrap_err();

        assert!(matches!(
            err,
            Error::Handle {
                step: "PPSE select",
                source: HandleError::NotEnoughBuffer(259),
            },
        ));
        assert!(std::error::Error::source(&err).is_some());
    }
}
