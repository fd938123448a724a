//! BER-TLV support for EMV records.

use crate::nfc::SW_SUCCESS;
use crate::track2::PackedTrack2;

pub const TAG_RECORD_TEMPLATE: u8 = 0x70;
pub const TAG_TRACK2_EQUIVALENT: u8 = 0x57;

/// Largest value a short-form length octet can describe.
const MAX_SHORT_LENGTH: usize = 0xFF;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum Error {
    #[error("TLV value of {0} octets does not fit a single length octet")]
    TooLong(usize),
}

/// Simple TLV writer for one-octet tags and one-octet lengths.
#[derive(Default)]
pub struct Writer {
    buffer: Vec<u8>,
}

impl Writer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Writes a tag, the length of the value and the value.
    pub fn write(&mut self, tag: u8, value: &[u8]) -> Result<&mut Self, Error> {
        let length = u8::try_from(value.len()).map_err(|_| Error::TooLong(value.len()))?;

        self.buffer.push(tag);
        self.buffer.push(length);
        self.buffer.extend_from_slice(value);

        Ok(self)
    }

    /// Runs the closure against a nested writer, then writes its output as the value of `tag`.
    pub fn in_template<F>(&mut self, tag: u8, f: F) -> Result<&mut Self, Error>
    where
        F: FnOnce(&mut Self) -> Result<(), Error>,
    {
        let mut inner = Self::new();
        f(&mut inner)?;

        self.write(tag, &inner.buffer)
    }

    /// Appends the status word and returns the whole response APDU.
    pub fn finish(mut self, sw: u16) -> Vec<u8> {
        self.buffer.extend_from_slice(&sw.to_be_bytes());
        self.buffer
    }
}

/// Finds the value of `tag` among the TLV objects in `data`, without descending into templates.
/// Returns `None` if the tag is absent or the data is truncated.
pub fn find<'a>(data: &'a [u8], tag: &[u8]) -> Option<&'a [u8]> {
    let mut rest = data;

    while let [first, ..] = rest {
        // Two-octet tags such as 9F38 have all five low bits of the first octet set.
        let tag_length = if first & 0x1F == 0x1F { 2 } else { 1 };
        let (&length, tail) = rest.get(tag_length..)?.split_first()?;
        let length = length as usize;

        let value = tail.get(..length)?;
        if &rest[..tag_length] == tag {
            return Some(value);
        }

        rest = &tail[length..];
    }

    None
}

/// A Read Record response: `70 L 57 L <track 2> 90 00`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmvRecord(Vec<u8>);

impl EmvRecord {
    /// Wraps the packed Track 2 data into the EMV record template.
    pub fn read_record_response(packed: &PackedTrack2) -> Result<Self, Error> {
        // Tag and length of 57 count towards the template length.
        if packed.len() + 2 > MAX_SHORT_LENGTH {
            return Err(Error::TooLong(packed.len() + 2));
        }

        let mut writer = Writer::new();
        writer.in_template(TAG_RECORD_TEMPLATE, |w| {
            w.write(TAG_TRACK2_EQUIVALENT, packed.as_bytes()).map(|_| ())
        })?;

        Ok(Self(writer.finish(SW_SUCCESS)))
    }

    /// The full response APDU, trailer included.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Track 2 equivalent data carried by the record.
    pub fn track2(&self) -> PackedTrack2 {
        PackedTrack2::from(&self.0[4..self.0.len() - 2])
    }
}

impl From<EmvRecord> for Vec<u8> {
    fn from(record: EmvRecord) -> Self {
        record.0
    }
}
