//! USB Subsystem
//!
//! CDC ACM virtual serial port for the operator.

pub mod cdc;
