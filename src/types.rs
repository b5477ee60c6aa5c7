//! Shared types used across the node firmware
//!
//! Radio parameters are carried as range-checked newtypes so that the
//! validating configuration path can reject a value before it ever reaches
//! the transceiver. The raw primitives are still what the hardware layer
//! receives, because the deferring path forwards unchecked values.

use core::fmt;

/// Carrier frequency in MHz, accepted by the `update freqMhz` command
#[derive(Clone, Copy, PartialEq, PartialOrd)]
pub struct Frequency(f32);

impl Frequency {
    /// Lowest frequency accepted by the command layer
    pub const MIN_MHZ: f32 = 100.0;

    /// Highest frequency accepted by the command layer
    pub const MAX_MHZ: f32 = 1000.0;

    /// Create a frequency, returns None if out of range (or NaN)
    #[must_use]
    pub fn from_mhz(mhz: f32) -> Option<Self> {
        if (Self::MIN_MHZ..=Self::MAX_MHZ).contains(&mhz) {
            Some(Self(mhz))
        } else {
            None
        }
    }

    /// Get the frequency in MHz
    #[must_use]
    pub const fn as_mhz(self) -> f32 {
        self.0
    }
}

impl fmt::Debug for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Frequency({} MHz)", self.0)
    }
}

#[cfg(feature = "embedded")]
impl defmt::Format for Frequency {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "{} MHz", self.0);
    }
}

/// Transmit output power in dBm
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct OutputPower(i8);

impl OutputPower {
    /// Minimum output power
    pub const MIN_DBM: i8 = -9;

    /// Maximum output power (SX1262 high-power PA)
    pub const MAX_DBM: i8 = 22;

    /// Create an output power, returns None if out of range
    #[must_use]
    pub const fn from_dbm(dbm: i8) -> Option<Self> {
        if dbm >= Self::MIN_DBM && dbm <= Self::MAX_DBM {
            Some(Self(dbm))
        } else {
            None
        }
    }

    /// Get the power in dBm
    #[must_use]
    pub const fn as_dbm(self) -> i8 {
        self.0
    }
}

#[cfg(feature = "embedded")]
impl defmt::Format for OutputPower {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "{} dBm", self.0);
    }
}

/// LoRa spreading factor
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct SpreadingFactor(u8);

impl SpreadingFactor {
    /// Smallest spreading factor
    pub const MIN: u8 = 5;

    /// Largest spreading factor
    pub const MAX: u8 = 12;

    /// Create a spreading factor, returns None if out of range
    #[must_use]
    pub const fn new(sf: u8) -> Option<Self> {
        if sf >= Self::MIN && sf <= Self::MAX {
            Some(Self(sf))
        } else {
            None
        }
    }

    /// Get the raw spreading factor
    #[must_use]
    pub const fn value(self) -> u8 {
        self.0
    }
}

#[cfg(feature = "embedded")]
impl defmt::Format for SpreadingFactor {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "SF{}", self.0);
    }
}

/// LoRa signal bandwidth in kHz
#[derive(Clone, Copy, Debug, PartialEq, PartialOrd)]
pub struct Bandwidth(f32);

impl Bandwidth {
    /// Lowest bandwidth accepted by the command layer
    pub const MIN_KHZ: f32 = 0.0;

    /// Highest bandwidth accepted by the command layer
    pub const MAX_KHZ: f32 = 510.0;

    /// Create a bandwidth, returns None if out of range (or NaN)
    #[must_use]
    pub fn from_khz(khz: f32) -> Option<Self> {
        if (Self::MIN_KHZ..=Self::MAX_KHZ).contains(&khz) {
            Some(Self(khz))
        } else {
            None
        }
    }

    /// Get the bandwidth in kHz
    #[must_use]
    pub const fn as_khz(self) -> f32 {
        self.0
    }
}

#[cfg(feature = "embedded")]
impl defmt::Format for Bandwidth {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "{} kHz", self.0);
    }
}

/// Full set of modem parameters applied when the radio is brought up
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RadioParams {
    /// Carrier frequency in MHz
    pub frequency_mhz: f32,
    /// Output power in dBm
    pub power_dbm: i8,
    /// Spreading factor (5..=12)
    pub spreading_factor: u8,
    /// Bandwidth in kHz
    pub bandwidth_khz: f32,
    /// Coding rate denominator (4/x)
    pub coding_rate: u8,
    /// LoRa sync word
    pub sync_word: u8,
    /// Preamble length in symbols
    pub preamble_len: u16,
}

impl Default for RadioParams {
    fn default() -> Self {
        use crate::config::radio;
        Self {
            frequency_mhz: radio::FREQUENCY_MHZ,
            power_dbm: radio::POWER_DBM,
            spreading_factor: radio::SPREADING_FACTOR,
            bandwidth_khz: radio::BANDWIDTH_KHZ,
            coding_rate: radio::CODING_RATE,
            sync_word: radio::SYNC_WORD,
            preamble_len: radio::PREAMBLE_LEN,
        }
    }
}

/// Half-duplex link state
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum RadioState {
    /// Not yet configured, or configuration failed
    #[default]
    Idle,
    /// A transmission is in flight
    Transmitting,
    /// Listening for packets
    Receiving,
    /// A transmission was force-aborted and receive could not be restarted yet
    TimedOut,
}

impl RadioState {
    /// Short lowercase name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Transmitting => "transmitting",
            Self::Receiving => "receiving",
            Self::TimedOut => "timed-out",
        }
    }
}

#[cfg(feature = "embedded")]
impl defmt::Format for RadioState {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "{}", self.as_str());
    }
}

/// Operating mode reported in the status line
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum NodeMode {
    /// Transmit and receive (heartbeats and command relay enabled)
    #[default]
    Transceive,
    /// Listen only, the transmitter is never keyed
    Receive,
}

impl NodeMode {
    /// Name used on the wire
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Transceive => "transceive",
            Self::Receive => "receive",
        }
    }

    /// Parse a wire name (case-sensitive)
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "transceive" => Some(Self::Transceive),
            "receive" => Some(Self::Receive),
            _ => None,
        }
    }

    /// Whether this mode may key the transmitter
    #[must_use]
    pub const fn may_transmit(self) -> bool {
        matches!(self, Self::Transceive)
    }
}

#[cfg(feature = "embedded")]
impl defmt::Format for NodeMode {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "{}", self.as_str());
    }
}

/// How numeric configuration values are range-checked
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RangePolicy {
    /// Reject out-of-range values before calling the hardware
    Validate,
    /// Forward everything and let the hardware report an error code
    Defer,
}

impl Default for RangePolicy {
    fn default() -> Self {
        if cfg!(feature = "sim-radio") || !cfg!(feature = "embedded") {
            Self::Validate
        } else {
            Self::Defer
        }
    }
}
