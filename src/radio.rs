//! Radio Link
//!
//! Half-duplex transceiver access for the node: the hardware capability
//! trait, the completion signal raised by the DIO interrupt, the link state
//! machine that serialises every transmit and receive, and a simulated
//! transceiver for bench builds and tests.

pub mod completion;
pub mod hardware;
pub mod link;
pub mod sim;
