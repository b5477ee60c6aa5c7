//! System configuration and hardware constants
//!
//! Compile-time constants for the node: pin map, default modem settings,
//! task periods and buffer sizes. [`NodeConfig`] gathers the values that
//! may be overridden at runtime (mostly by tests and bench builds).

use crate::types::{RadioParams, RangePolicy};

/// Longest operator or radio line, in bytes, excluding the terminator
pub const MAX_LINE_LEN: usize = 128;

/// Largest LoRa payload the SX1262 FIFO can hold
pub const MAX_PACKET_LEN: usize = 255;

/// Capacity of the command reply buffer flushed to serial after a dispatch
pub const REPLY_LEN: usize = 192;

/// Capacity of the assembled status line
pub const STATUS_LINE_LEN: usize = 128;

/// USB CDC ACM packet size
pub const USB_CDC_PACKET_SIZE: u16 = 64;

/// Serial line assembly buffer (two maximum lines)
pub const SERIAL_BUFFER_SIZE: usize = 2 * MAX_LINE_LEN;

/// USB VID (use test VID for development)
pub const USB_VID: u16 = 0x1209;

/// USB PID (get from pid.codes for production)
pub const USB_PID: u16 = 0x0002;

/// Default modem parameters
pub mod radio {
    //! Values the node boots with before any `update` command

    /// Carrier frequency in MHz
    pub const FREQUENCY_MHZ: f32 = 915.0;

    /// Output power in dBm
    pub const POWER_DBM: i8 = 22;

    /// Spreading factor
    pub const SPREADING_FACTOR: u8 = 7;

    /// Bandwidth in kHz
    pub const BANDWIDTH_KHZ: f32 = 500.0;

    /// Coding rate 4/5
    pub const CODING_RATE: u8 = 5;

    /// Public network sync word
    pub const SYNC_WORD: u8 = 0x34;

    /// Preamble length in symbols
    pub const PREAMBLE_LEN: u16 = 20;

    /// Longest time a transmit may stay in flight without a completion signal
    pub const TX_TIMEOUT_MS: u64 = 3_000;
}

/// Task periods in milliseconds
pub mod intervals {
    //! Polling and heartbeat periods of the cooperative tasks

    /// Serial poll period
    pub const SERIAL_MS: u64 = 100;

    /// Radio poll period
    pub const RADIO_MS: u64 = 100;

    /// Status LED toggle period
    pub const INDICATOR_MS: u64 = 1_000;

    /// Status line broadcast period
    pub const HEARTBEAT_MS: u64 = 4_000;
}

/// Battery sense network
pub mod battery {
    //! Divider and cell count of the battery sense input

    /// Divider ratio of the battery sense resistor network
    pub const DIVIDER_RATIO: f32 = 2.0;

    /// ADC reference voltage
    pub const VREF: f32 = 3.3;

    /// Cells in series
    pub const CELLS: u8 = 1;
}

/// Log region in internal flash
pub mod log_region {
    //! Top 64 KiB of the STM32G474RE's 512 KiB flash, offsets from flash base

    /// First byte of the log region
    pub const START: u32 = 0x0007_0000;

    /// One past the last byte of the log region
    pub const END: u32 = 0x0008_0000;
}

/// Pin assignments for GPIO
pub mod pins {
    //! GPIO pin assignments matching the schematic

    /// SX1262 SPI clock
    pub const RF_SCK: &str = "PA5";

    /// SX1262 SPI MISO
    pub const RF_MISO: &str = "PA6";

    /// SX1262 SPI MOSI
    pub const RF_MOSI: &str = "PA7";

    /// SX1262 chip select (NSS)
    pub const RF_NSS: &str = "PA4";

    /// SX1262 reset (active low)
    pub const RF_RESET: &str = "PB0";

    /// SX1262 BUSY
    pub const RF_BUSY: &str = "PB1";

    /// SX1262 DIO1, TX/RX done interrupt (EXTI2)
    pub const RF_DIO1: &str = "PB2";

    /// Status LED
    pub const LED_STATUS: &str = "PC6";

    /// Switched output driven by `set output`
    pub const SWITCHED_OUTPUT: &str = "PC7";

    /// Battery sense ADC input
    pub const BATTERY_ADC: &str = "PA0";

    /// USB D+ (handled by USB peripheral)
    pub const USB_DP: &str = "PA12";

    /// USB D- (handled by USB peripheral)
    pub const USB_DM: &str = "PA11";
}

/// Runtime node configuration
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NodeConfig {
    /// Identifier reported in the status line
    pub node_id: u32,
    /// Modem parameters applied on `configure`
    pub radio: RadioParams,
    /// How `update` values are range-checked
    pub range_policy: RangePolicy,
    /// Transmit completion timeout
    pub tx_timeout_ms: u64,
    /// Status line broadcast period
    pub heartbeat_ms: u64,
    /// Radio poll period
    pub radio_poll_ms: u64,
}

impl NodeConfig {
    /// Default configuration for the given node id
    #[must_use]
    pub fn with_node_id(node_id: u32) -> Self {
        Self {
            node_id,
            ..Self::default()
        }
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            node_id: 0,
            radio: RadioParams::default(),
            range_policy: RangePolicy::default(),
            tx_timeout_ms: radio::TX_TIMEOUT_MS,
            heartbeat_ms: intervals::HEARTBEAT_MS,
            radio_poll_ms: intervals::RADIO_MS,
        }
    }
}
