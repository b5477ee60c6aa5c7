//! Transceiver capability
//!
//! The link state machine talks to the physical radio only through
//! [`RadioHardware`]. Operations are non-blocking: `start_transmit` and
//! `start_receive` return as soon as the chip has been commanded, and the
//! end of the operation is reported through the [`CompletionSignal`].

use crate::radio::completion::CompletionSignal;
use crate::types::RadioParams;

/// Numeric status codes reported by the hardware layer
pub mod codes {
    //! Negative codes follow the RadioLib numbering so logs read the same
    //! on every build

    /// No error
    pub const NONE: i16 = 0;
    /// The chip did not answer during initialisation
    pub const CHIP_NOT_FOUND: i16 = -2;
    /// Payload larger than the FIFO
    pub const PACKET_TOO_LONG: i16 = -4;
    /// Transmit did not finish
    pub const TX_TIMEOUT: i16 = -5;
    /// Receive window elapsed
    pub const RX_TIMEOUT: i16 = -6;
    /// Received packet failed its CRC
    pub const CRC_MISMATCH: i16 = -7;
    /// Bandwidth not supported by the modem
    pub const INVALID_BANDWIDTH: i16 = -8;
    /// Spreading factor not supported by the modem
    pub const INVALID_SPREADING_FACTOR: i16 = -9;
    /// Frequency outside the synthesiser range
    pub const INVALID_FREQUENCY: i16 = -12;
    /// Output power outside the PA range
    pub const INVALID_OUTPUT_POWER: i16 = -13;
    /// SPI transfer failed
    pub const SPI_ERROR: i16 = -16;
    /// No packet waiting in the FIFO
    pub const NO_PACKET: i16 = -20;
    /// BUSY line stayed high
    pub const SPI_CMD_TIMEOUT: i16 = -705;
}

/// Error code reported by the transceiver
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HwError(pub i16);

impl HwError {
    /// Get the numeric code
    #[must_use]
    pub const fn code(self) -> i16 {
        self.0
    }
}

#[cfg(feature = "embedded")]
impl defmt::Format for HwError {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "code {}", self.0);
    }
}

/// Why a configuration change was not applied
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConfigError {
    /// Rejected by the validating range policy before reaching the hardware
    OutOfRange,
    /// Rejected by the hardware layer
    Hardware(HwError),
}

/// LoRa bandwidths supported by the SX126x modem, in kHz, with register codes
pub const LORA_BANDWIDTHS: [(f32, u8); 10] = [
    (7.8, 0x00),
    (10.4, 0x08),
    (15.6, 0x01),
    (20.8, 0x09),
    (31.25, 0x02),
    (41.7, 0x0A),
    (62.5, 0x03),
    (125.0, 0x04),
    (250.0, 0x05),
    (500.0, 0x06),
];

/// Look up the modem register code for a bandwidth in kHz
///
/// Matches within 0.05 kHz so that `7.8` and `31.25` typed by an operator
/// resolve to the nominal 7.81 / 31.25 kHz settings.
#[must_use]
pub fn bandwidth_code(khz: f32) -> Option<u8> {
    LORA_BANDWIDTHS
        .iter()
        .find(|(nominal, _)| {
            let diff = nominal - khz;
            diff < 0.05 && diff > -0.05
        })
        .map(|&(_, code)| code)
}

/// Frequency range of the SX1262 synthesiser in MHz
pub const HW_FREQUENCY_RANGE_MHZ: (f32, f32) = (150.0, 960.0);

/// Physical transceiver operations used by the link
pub trait RadioHardware {
    /// Reset and configure the chip with the full parameter set
    fn begin(&mut self, params: &RadioParams) -> Result<(), HwError>;

    /// Bind the completion signal raised when a transmit or receive finishes
    ///
    /// Drivers whose completion comes from a separately watched interrupt
    /// line do not need to keep it.
    fn bind_completion(&mut self, _signal: &'static CompletionSignal) {}

    /// Load `payload` and start transmitting without waiting for the end
    fn start_transmit(&mut self, payload: &[u8]) -> Result<(), HwError>;

    /// Clean up after a transmit-done interrupt
    fn finish_transmit(&mut self) -> Result<(), HwError>;

    /// Enter continuous receive
    fn start_receive(&mut self) -> Result<(), HwError>;

    /// Copy the last received packet into `buf`, returning its length
    fn read_data(&mut self, buf: &mut [u8]) -> Result<usize, HwError>;

    /// RSSI of the last received packet in dBm
    fn rssi(&mut self) -> i16;

    /// Set output power in dBm
    fn set_output_power(&mut self, dbm: i8) -> Result<(), HwError>;

    /// Set carrier frequency in MHz
    fn set_frequency(&mut self, mhz: f32) -> Result<(), HwError>;

    /// Set spreading factor
    fn set_spreading_factor(&mut self, sf: u8) -> Result<(), HwError>;

    /// Set bandwidth in kHz
    fn set_bandwidth(&mut self, khz: f32) -> Result<(), HwError>;
}
