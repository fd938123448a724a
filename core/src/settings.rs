//! Settings the host keeps for the card.

/// Prepaid Visa MSD test card, accepted by most terminals.
pub const DEFAULT_SWIPE_DATA: &str = "%B4046460664629718^000NETSPEND^161012100000181000000?;4046460664629718=16101210000018100000?";

/// Key of the swipe data in the host's preference store.
pub const SWIPE_DATA_KEY: &str = "SWIPE_DATA";

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct Settings {
    /// Magnetic-stripe track data in ISO/IEC 7813 format.
    pub swipe_data: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            swipe_data: DEFAULT_SWIPE_DATA.to_owned(),
        }
    }
}
