//! Peripheral Drivers
//!
//! Drivers for the external transceiver and the flash-backed log store.

pub mod flash_log;
pub mod sx1262;
