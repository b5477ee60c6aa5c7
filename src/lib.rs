//! LoRa Node Firmware Library
//!
//! Firmware for a battery-powered STM32G474 node that exchanges short text
//! messages with peers over a half-duplex LoRa channel (SX1262) and with a
//! local operator over USB serial. Commands typed by the operator are
//! relayed to peers and applied locally; data and status lines are echoed
//! and persisted to an append-only log in internal flash.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    APPLICATION LAYER                         │
//! │  Message Router  │  Command Dispatcher  │  Envelope Protocol │
//! ├─────────────────────────────────────────────────────────────┤
//! │                      LINK LAYER                              │
//! │  Radio Link (half-duplex state machine)  │  Data Log         │
//! ├─────────────────────────────────────────────────────────────┤
//! │                   HAL / DRIVER LAYER                         │
//! │  SX1262  │  Flash Log  │  USB CDC  │  ADC  │  GPIO           │
//! ├─────────────────────────────────────────────────────────────┤
//! │                    RTOS / SCHEDULER                          │
//! │           embassy-rs (async/await executor)                  │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Everything above the driver layer is target-independent and is tested
//! on the host with `--no-default-features --features std`.

#![cfg_attr(feature = "embedded", no_std)]
#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Must come first so the logging macros are visible to every module
mod fmt;

// Re-export dependencies needed by the binary (only in embedded mode)
#[cfg(feature = "embedded")]
pub use embassy_executor;
#[cfg(feature = "embedded")]
pub use embassy_stm32;
#[cfg(feature = "embedded")]
pub use embassy_time;
#[cfg(feature = "embedded")]
pub use embassy_usb;

/// Hardware Abstraction Layer
///
/// Battery ADC and status LED on the STM32G474.
#[cfg(feature = "embedded")]
pub mod hal;

/// Peripheral Drivers
///
/// SX1262 transceiver and the flash-backed log store.
#[cfg(feature = "embedded")]
pub mod drivers;

/// USB Subsystem
///
/// CDC ACM serial port for the operator.
#[cfg(feature = "embedded")]
pub mod usb;

/// Radio Link
///
/// Transceiver capability, completion signal and the half-duplex state machine.
pub mod radio;

/// Command Dispatcher
///
/// Nested static command tables and their handlers.
pub mod command;

/// Message Envelope Protocol
///
/// Tokenizer, message classification and status line format.
pub mod protocol;

/// Message Router
///
/// Top-level orchestration of link, serial, dispatcher and log.
pub mod router;

/// Serial line assembly and output trait
pub mod serial;

/// Append-only data log
pub mod storage;

/// Battery monitoring
pub mod power;

/// Shared types used across modules
pub mod types;

/// System configuration and constants
pub mod config;

/// Prelude module for common imports
pub mod prelude {
    //! Convenient re-exports for common types and traits.

    pub use crate::config::*;
    pub use crate::types::*;

    pub use crate::radio::completion::{CompletionSignal, RADIO_COMPLETION};
    pub use crate::radio::hardware::{ConfigError, HwError, RadioHardware};
    pub use crate::radio::link::{RadioLink, SendOutcome};
    pub use crate::router::MessageRouter;
    pub use crate::serial::SerialPort;
    pub use crate::storage::{DataLog, LogStorage};

    // Common traits
    pub use embedded_hal::digital::OutputPin;
}
