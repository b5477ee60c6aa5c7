//! Configuration and Constants Tests
//!
//! Tests to verify configuration values are valid and consistent.
//! Run with: cargo test --no-default-features --features std --test config_tests

use lora_node::config::*;
use lora_node::radio::hardware::{bandwidth_code, HW_FREQUENCY_RANGE_MHZ};
use lora_node::types::{
    Bandwidth, Frequency, OutputPower, RadioParams, RangePolicy, SpreadingFactor,
};

// =============================================================================
// Default Radio Settings Tests
// =============================================================================

#[test]
fn default_frequency_valid() {
    assert!(Frequency::from_mhz(radio::FREQUENCY_MHZ).is_some());
    let (low, high) = HW_FREQUENCY_RANGE_MHZ;
    assert!((low..=high).contains(&radio::FREQUENCY_MHZ));
}

#[test]
fn default_power_valid() {
    assert!(OutputPower::from_dbm(radio::POWER_DBM).is_some());
}

#[test]
fn default_spreading_factor_valid() {
    assert!(SpreadingFactor::new(radio::SPREADING_FACTOR).is_some());
}

#[test]
fn default_bandwidth_supported() {
    assert!(Bandwidth::from_khz(radio::BANDWIDTH_KHZ).is_some());
    assert!(bandwidth_code(radio::BANDWIDTH_KHZ).is_some());
}

#[test]
fn default_coding_rate_valid() {
    // 4/5 through 4/8
    assert!((5..=8).contains(&radio::CODING_RATE));
}

#[test]
fn default_params_match_constants() {
    let params = RadioParams::default();
    assert_eq!(params.frequency_mhz, radio::FREQUENCY_MHZ);
    assert_eq!(params.power_dbm, radio::POWER_DBM);
    assert_eq!(params.spreading_factor, radio::SPREADING_FACTOR);
    assert_eq!(params.bandwidth_khz, radio::BANDWIDTH_KHZ);
    assert_eq!(params.sync_word, radio::SYNC_WORD);
    assert_eq!(params.preamble_len, radio::PREAMBLE_LEN);
}

// =============================================================================
// Buffer Size Tests
// =============================================================================

#[test]
fn serial_buffer_holds_a_full_line() {
    assert!(SERIAL_BUFFER_SIZE > MAX_LINE_LEN);
}

#[test]
fn packet_matches_fifo() {
    // SX1262 FIFO is 256 bytes, payload length is one byte
    assert_eq!(MAX_PACKET_LEN, 255);
}

#[test]
fn serial_line_fits_a_packet() {
    assert!(MAX_LINE_LEN <= MAX_PACKET_LEN);
}

#[test]
fn status_line_fits_a_packet() {
    assert!(STATUS_LINE_LEN <= MAX_PACKET_LEN);
}

#[test]
fn usb_packet_size_valid() {
    // Full-speed bulk endpoints take 8, 16, 32 or 64 bytes
    assert!([8, 16, 32, 64].contains(&USB_CDC_PACKET_SIZE));
}

// =============================================================================
// Interval Tests
// =============================================================================

#[test]
fn heartbeat_slower_than_polling() {
    assert!(intervals::HEARTBEAT_MS > intervals::RADIO_MS);
    assert!(intervals::HEARTBEAT_MS > intervals::SERIAL_MS);
}

#[test]
fn transmit_timeout_shorter_than_heartbeat() {
    assert!(radio::TX_TIMEOUT_MS < intervals::HEARTBEAT_MS);
}

// =============================================================================
// Log Region Tests
// =============================================================================

#[test]
fn log_region_page_aligned() {
    // STM32G474 flash pages are 2 KiB
    assert_eq!(log_region::START % 2048, 0);
    assert_eq!(log_region::END % 2048, 0);
}

#[test]
fn log_region_inside_flash() {
    assert!(log_region::START < log_region::END);
    assert!(log_region::END <= 512 * 1024);
}

// =============================================================================
// Battery Tests
// =============================================================================

#[test]
fn battery_constants_valid() {
    assert!(battery::DIVIDER_RATIO >= 1.0);
    assert!(battery::VREF > 0.0);
    assert!(battery::CELLS >= 1);
}

// =============================================================================
// Node Configuration Tests
// =============================================================================

#[test]
fn node_config_defaults() {
    let config = NodeConfig::default();
    assert_eq!(config.node_id, 0);
    assert_eq!(config.radio, RadioParams::default());
    assert_eq!(config.tx_timeout_ms, radio::TX_TIMEOUT_MS);
    assert_eq!(config.heartbeat_ms, intervals::HEARTBEAT_MS);
    assert_eq!(config.radio_poll_ms, intervals::RADIO_MS);
}

#[test]
fn node_config_with_id() {
    let config = NodeConfig::with_node_id(42);
    assert_eq!(config.node_id, 42);
    assert_eq!(config.radio, RadioParams::default());
}

#[test]
fn host_builds_validate_ranges() {
    assert_eq!(RangePolicy::default(), RangePolicy::Validate);
    assert_eq!(NodeConfig::default().range_policy, RangePolicy::Validate);
}

#[test]
fn usb_ids_nonzero() {
    assert_ne!(USB_VID, 0);
    assert_ne!(USB_PID, 0);
}
