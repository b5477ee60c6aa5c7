//! Hardware Abstraction Layer
//!
//! Thin wrappers over the STM32G474 peripherals the node uses directly.
//! The radio, flash and USB are handled in `drivers` and `usb`.

pub mod adc;
pub mod gpio;
