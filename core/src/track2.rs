//! Track 2 equivalent data: extraction from magnetic-stripe track strings and nibble packing.
//!
//! A swipe string in ISO/IEC 7813 format carries an optional Track 1 section followed by
//! the Track 2 section `;PAN=YYMM SSS discretionary?`. Only the Track 2 field travels to the
//! terminal, packed as BCD-like nibbles with `D` standing in for the `=` separator.

use std::fmt;

const START_SENTINEL: char = ';';
const END_SENTINEL: char = '?';
const SEPARATOR: char = '=';

/// Characters a single swipe string never spans.
const LINE_TERMINATORS: [char; 5] = ['\n', '\r', '\u{85}', '\u{2028}', '\u{2029}'];

const SEPARATOR_NIBBLE: u8 = 0xD;
const PAD_NIBBLE: u8 = 0xF;

const PAN_LENGTH: std::ops::RangeInclusive<usize> = 12..=19;
const DISCRETIONARY_LENGTH: std::ops::RangeInclusive<usize> = 1..=128;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum Error {
    #[error("No Track 2 field (;PAN=DATA?) found in the swipe data")]
    NotFound,

    #[error("Invalid nibble 0x{0:X} in packed Track 2 data")]
    InvalidNibble(u8),
}

/// A Track 2 field as found between the start and end sentinels, e.g. `4046460664629718=1610...`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Track2 {
    field: String,
    separator: usize,
}

impl Track2 {
    /// Extracts the Track 2 field from the raw swipe data.
    ///
    /// The last start sentinel followed by a well-formed field and an end sentinel wins,
    /// so a Track 1 section containing `;` never shadows the Track 2 section after it.
    /// Swipe data spanning several lines is rejected as a whole.
    pub fn extract(raw: &str) -> Result<Self, Error> {
        if raw.contains(&LINE_TERMINATORS[..]) {
            return Err(Error::NotFound);
        }

        raw.rmatch_indices(START_SENTINEL)
            .find_map(|(i, _)| Self::scan(&raw[i + START_SENTINEL.len_utf8()..]))
            .ok_or(Error::NotFound)
    }

    /// Reads `PAN=DATA?` at the beginning of `s`, ignoring whatever follows the end sentinel.
    fn scan(s: &str) -> Option<Self> {
        let pan = count_digits(s);
        if !PAN_LENGTH.contains(&pan) || !s[pan..].starts_with(SEPARATOR) {
            return None;
        }

        let rest = &s[pan + 1..];
        let discretionary = count_digits(rest);
        if !DISCRETIONARY_LENGTH.contains(&discretionary)
            || !rest[discretionary..].starts_with(END_SENTINEL)
        {
            return None;
        }

        Some(Self {
            field: s[..pan + 1 + discretionary].to_owned(),
            separator: pan,
        })
    }

    /// Primary account number, the digits before the separator.
    pub fn pan(&self) -> &str {
        &self.field[..self.separator]
    }

    /// Expiry date, service code and discretionary data, the digits after the separator.
    pub fn discretionary(&self) -> &str {
        &self.field[self.separator + 1..]
    }

    pub fn as_str(&self) -> &str {
        &self.field
    }

    /// Packs the field into nibbles, high nibble first, padding with `F` to a whole byte.
    pub fn pack(&self) -> PackedTrack2 {
        let mut nibbles: Vec<u8> = self
            .field
            .bytes()
            .map(|c| match c {
                b'=' => SEPARATOR_NIBBLE,
                digit => digit - b'0',
            })
            .collect();

        if nibbles.len() % 2 != 0 {
            nibbles.push(PAD_NIBBLE);
        }

        PackedTrack2(
            nibbles
                .chunks_exact(2)
                .map(|pair| (pair[0] << 4) | pair[1])
                .collect(),
        )
    }
}

impl fmt::Display for Track2 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.field)
    }
}

/// Track 2 equivalent data as it is sent in tag `57`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackedTrack2(Vec<u8>);

impl PackedTrack2 {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Restores the textual field, dropping a trailing pad nibble.
    pub fn unpack(&self) -> Result<Track2, Error> {
        let mut field = String::with_capacity(self.0.len() * 2);

        for (i, nibble) in self.0.iter().flat_map(|b| [b >> 4, b & 0x0F]).enumerate() {
            match nibble {
                0..=9 => field.push(char::from(b'0' + nibble)),
                SEPARATOR_NIBBLE => field.push(SEPARATOR),
                PAD_NIBBLE if i == self.0.len() * 2 - 1 => {}
                _ => return Err(Error::InvalidNibble(nibble)),
            }
        }

        field.push(END_SENTINEL);
        Track2::scan(&field).ok_or(Error::NotFound)
    }
}

impl From<&[u8]> for PackedTrack2 {
    fn from(bytes: &[u8]) -> Self {
        Self(bytes.to_vec())
    }
}

impl From<PackedTrack2> for Vec<u8> {
    fn from(packed: PackedTrack2) -> Self {
        packed.0
    }
}

fn count_digits(s: &str) -> usize {
    s.bytes().take_while(u8::is_ascii_digit).count()
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEFAULT: &str = "%B4046460664629718^000NETSPEND^161012100000181000000?;4046460664629718=16101210000018100000?";

    #[test]
    fn test_extract() {
        let track2 = Track2::extract(DEFAULT).unwrap();

        assert_eq!("4046460664629718=16101210000018100000", track2.as_str());
        assert_eq!("4046460664629718", track2.pan());
        assert_eq!("16101210000018100000", track2.discretionary());
    }

    #[test]
    fn test_extract_surrounded() {
        let track2 = Track2::extract("junk;123456789012=1?trailer").unwrap();
        assert_eq!("123456789012=1", track2.as_str());
    }

    #[test]
    fn test_extract_prefers_last_field() {
        let track2 = Track2::extract(";111111111111=1?;222222222222=2?").unwrap();
        assert_eq!("222222222222", track2.pan());

        let track2 = Track2::extract(";111111111111=1?;oops").unwrap();
        assert_eq!("111111111111", track2.pan());
    }

    #[test]
    fn test_extract_rejects_malformed() {
        for raw in [
            "",
            "4046460664629718=16101210000018100000",
            ";4046460664629718=16101210000018100000",
            "4046460664629718=16101210000018100000?",
            ";12345678901=1?",
            ";12345678901234567890=1?",
            ";123456789012=?",
            ";123456789012?",
            ";123456789012=12=3?",
            ";1234 56789012=1?",
            ";١٢٣٤٥٦٧٨٩٠١٢=1?",
        ] {
            assert_eq!(Err(Error::NotFound), Track2::extract(raw), "{raw:?}");
        }
    }

    #[test]
    fn test_extract_rejects_line_terminators() {
        for raw in [
            "%B4046^X^1610?\n;4046460664629718=16101210000018100000?",
            ";4046460664629718=16101210000018100000?\r\n",
            "\r;4046460664629718=16101210000018100000?",
            ";4046460664629718=16101210000018100000?\u{85}",
            "\u{2028};4046460664629718=16101210000018100000?",
            ";4046460664629718=16101210000018100000?\u{2029}",
        ] {
            assert_eq!(Err(Error::NotFound), Track2::extract(raw), "{raw:?}");
        }
    }

    #[test]
    fn test_extract_length_bounds() {
        let longest = format!(";{}={}?", "9".repeat(19), "0".repeat(128));
        assert!(Track2::extract(&longest).is_ok());

        let too_long = format!(";{}={}?", "9".repeat(19), "0".repeat(129));
        assert_eq!(Err(Error::NotFound), Track2::extract(&too_long));
    }

    #[test]
    fn test_pack_odd() {
        let packed = Track2::extract(DEFAULT).unwrap().pack();

        assert_eq!(19, packed.len());
        assert_eq!(
            "4046460664629718d16101210000018100000f",
            hex::encode(packed.as_bytes()),
        );
    }

    #[test]
    fn test_pack_even() {
        let packed = Track2::extract(";123456789012=345?").unwrap().pack();
        assert_eq!(
            vec![0x12, 0x34, 0x56, 0x78, 0x90, 0x12, 0xD3, 0x45],
            Vec::from(packed),
        );
    }

    #[test]
    fn test_unpack() {
        let track2 = Track2::extract(DEFAULT).unwrap();
        assert_eq!(Ok(track2.clone()), track2.pack().unpack());

        let packed = PackedTrack2::from(&[0x12, 0x34, 0x56, 0x78, 0x90, 0x12, 0xD3, 0x4A][..]);
        assert_eq!(Err(Error::InvalidNibble(0xA)), packed.unpack());

        let packed = PackedTrack2::from(&[0x12, 0x34][..]);
        assert_eq!(Err(Error::NotFound), packed.unpack());
    }
}
