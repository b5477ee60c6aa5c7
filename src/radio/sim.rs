//! Simulated transceiver
//!
//! Stands in for the SX1262 on bench builds without an RF module and in
//! host tests. Transmitted packets are recorded instead of radiated, and
//! received packets are injected by the caller. Range checks use the same
//! error codes the real chip reports so the deferring configuration path
//! behaves as it does on hardware.

use heapless::{Deque, Vec};

use crate::config::MAX_PACKET_LEN;
use crate::radio::completion::CompletionSignal;
use crate::radio::hardware::{
    bandwidth_code, codes, HwError, RadioHardware, HW_FREQUENCY_RANGE_MHZ,
};
use crate::types::{OutputPower, RadioParams, SpreadingFactor};

/// Number of transmitted packets kept for inspection
pub const SENT_HISTORY: usize = 8;

/// RSSI reported for every injected packet
pub const SIM_RSSI_DBM: i16 = -40;

type Packet = Vec<u8, MAX_PACKET_LEN>;

/// In-memory transceiver
pub struct SimulatedRadio {
    completion: Option<&'static CompletionSignal>,
    auto_complete: bool,
    params: RadioParams,
    began: bool,
    listening: bool,
    transmitting: bool,
    rx_pending: Option<Packet>,
    sent: Deque<Packet, SENT_HISTORY>,
    fail_next: Option<HwError>,
    fail_begin: Option<HwError>,
}

impl SimulatedRadio {
    /// Create a radio whose transmits complete as soon as they start
    #[must_use]
    pub fn new() -> Self {
        Self {
            completion: None,
            auto_complete: true,
            params: RadioParams::default(),
            began: false,
            listening: false,
            transmitting: false,
            rx_pending: None,
            sent: Deque::new(),
            fail_next: None,
            fail_begin: None,
        }
    }

    /// Create a radio whose transmits stay in flight until
    /// [`complete_transmit`](Self::complete_transmit) is called
    #[must_use]
    pub fn with_deferred_completion() -> Self {
        Self {
            auto_complete: false,
            ..Self::new()
        }
    }

    /// Make `begin` fail with `code`
    #[must_use]
    pub fn failing_begin(mut self, code: i16) -> Self {
        self.fail_begin = Some(HwError(code));
        self
    }

    /// Make the next fallible operation fail with `code`
    pub fn fail_next(&mut self, code: i16) {
        self.fail_next = Some(HwError(code));
    }

    /// Finish the transmit in flight and raise the completion signal
    pub fn complete_transmit(&mut self) -> bool {
        if !self.transmitting {
            return false;
        }
        self.raise_completion();
        true
    }

    /// Deliver `payload` as if it had been received over the air
    ///
    /// Only lands while the radio is listening; returns whether it did.
    pub fn inject(&mut self, payload: &[u8]) -> bool {
        if !self.listening || payload.len() > MAX_PACKET_LEN {
            return false;
        }
        let mut packet = Packet::new();
        if packet.extend_from_slice(payload).is_err() {
            return false;
        }
        self.rx_pending = Some(packet);
        self.raise_completion();
        true
    }

    /// Packets transmitted so far, oldest first
    pub fn sent(&self) -> impl Iterator<Item = &[u8]> {
        self.sent.iter().map(Vec::as_slice)
    }

    /// Number of packets in the history
    #[must_use]
    pub fn sent_count(&self) -> usize {
        self.sent.len()
    }

    /// Last transmitted packet
    #[must_use]
    pub fn last_sent(&self) -> Option<&[u8]> {
        self.sent.back().map(Vec::as_slice)
    }

    /// Whether the radio is in receive mode
    #[must_use]
    pub const fn is_listening(&self) -> bool {
        self.listening
    }

    /// Whether a transmit is in flight
    #[must_use]
    pub const fn is_transmitting(&self) -> bool {
        self.transmitting
    }

    /// Whether `begin` succeeded
    #[must_use]
    pub const fn is_started(&self) -> bool {
        self.began
    }

    /// Parameters currently applied
    #[must_use]
    pub const fn params(&self) -> &RadioParams {
        &self.params
    }

    fn raise_completion(&self) {
        if let Some(signal) = self.completion {
            signal.signal();
        }
    }

    fn check_injected_failure(&mut self) -> Result<(), HwError> {
        match self.fail_next.take() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl Default for SimulatedRadio {
    fn default() -> Self {
        Self::new()
    }
}

fn check_frequency(mhz: f32) -> Result<(), HwError> {
    let (low, high) = HW_FREQUENCY_RANGE_MHZ;
    if (low..=high).contains(&mhz) {
        Ok(())
    } else {
        Err(HwError(codes::INVALID_FREQUENCY))
    }
}

fn check_power(dbm: i8) -> Result<(), HwError> {
    OutputPower::from_dbm(dbm)
        .map(|_| ())
        .ok_or(HwError(codes::INVALID_OUTPUT_POWER))
}

fn check_spreading_factor(sf: u8) -> Result<(), HwError> {
    SpreadingFactor::new(sf)
        .map(|_| ())
        .ok_or(HwError(codes::INVALID_SPREADING_FACTOR))
}

fn check_bandwidth(khz: f32) -> Result<(), HwError> {
    bandwidth_code(khz)
        .map(|_| ())
        .ok_or(HwError(codes::INVALID_BANDWIDTH))
}

impl RadioHardware for SimulatedRadio {
    fn begin(&mut self, params: &RadioParams) -> Result<(), HwError> {
        if let Some(e) = self.fail_begin {
            return Err(e);
        }
        self.check_injected_failure()?;
        check_frequency(params.frequency_mhz)?;
        check_power(params.power_dbm)?;
        check_spreading_factor(params.spreading_factor)?;
        check_bandwidth(params.bandwidth_khz)?;

        self.params = *params;
        self.began = true;
        self.listening = false;
        self.transmitting = false;
        self.rx_pending = None;
        Ok(())
    }

    fn bind_completion(&mut self, signal: &'static CompletionSignal) {
        self.completion = Some(signal);
    }

    fn start_transmit(&mut self, payload: &[u8]) -> Result<(), HwError> {
        if !self.began {
            return Err(HwError(codes::CHIP_NOT_FOUND));
        }
        self.check_injected_failure()?;
        if payload.len() > MAX_PACKET_LEN {
            return Err(HwError(codes::PACKET_TOO_LONG));
        }

        let mut packet = Packet::new();
        packet
            .extend_from_slice(payload)
            .map_err(|()| HwError(codes::PACKET_TOO_LONG))?;
        if self.sent.is_full() {
            self.sent.pop_front();
        }
        // Room was made above
        let _ = self.sent.push_back(packet);

        self.listening = false;
        self.transmitting = true;
        if self.auto_complete {
            self.raise_completion();
        }
        Ok(())
    }

    fn finish_transmit(&mut self) -> Result<(), HwError> {
        self.transmitting = false;
        Ok(())
    }

    fn start_receive(&mut self) -> Result<(), HwError> {
        if !self.began {
            return Err(HwError(codes::CHIP_NOT_FOUND));
        }
        self.check_injected_failure()?;
        self.transmitting = false;
        self.listening = true;
        Ok(())
    }

    fn read_data(&mut self, buf: &mut [u8]) -> Result<usize, HwError> {
        self.check_injected_failure()?;
        let packet = self.rx_pending.take().ok_or(HwError(codes::NO_PACKET))?;
        let dest = buf
            .get_mut(..packet.len())
            .ok_or(HwError(codes::PACKET_TOO_LONG))?;
        dest.copy_from_slice(&packet);
        Ok(packet.len())
    }

    fn rssi(&mut self) -> i16 {
        SIM_RSSI_DBM
    }

    fn set_output_power(&mut self, dbm: i8) -> Result<(), HwError> {
        self.check_injected_failure()?;
        check_power(dbm)?;
        self.params.power_dbm = dbm;
        Ok(())
    }

    fn set_frequency(&mut self, mhz: f32) -> Result<(), HwError> {
        self.check_injected_failure()?;
        check_frequency(mhz)?;
        self.params.frequency_mhz = mhz;
        Ok(())
    }

    fn set_spreading_factor(&mut self, sf: u8) -> Result<(), HwError> {
        self.check_injected_failure()?;
        check_spreading_factor(sf)?;
        self.params.spreading_factor = sf;
        Ok(())
    }

    fn set_bandwidth(&mut self, khz: f32) -> Result<(), HwError> {
        self.check_injected_failure()?;
        check_bandwidth(khz)?;
        self.params.bandwidth_khz = khz;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn history_drops_oldest() {
        let mut radio = SimulatedRadio::new();
        radio.begin(&RadioParams::default()).unwrap();
        for i in 0..=SENT_HISTORY {
            radio.start_transmit(&[i as u8]).unwrap();
        }
        assert_eq!(radio.sent_count(), SENT_HISTORY);
        assert_eq!(radio.sent().next(), Some(&[1u8][..]));
        assert_eq!(radio.last_sent(), Some(&[SENT_HISTORY as u8][..]));
    }

    #[test]
    fn inject_requires_listening() {
        let mut radio = SimulatedRadio::new();
        assert!(!radio.inject(b"hello"));
        radio.begin(&RadioParams::default()).unwrap();
        radio.start_receive().unwrap();
        assert!(radio.inject(b"hello"));

        let mut buf = [0u8; 16];
        assert_eq!(radio.read_data(&mut buf), Ok(5));
        assert_eq!(&buf[..5], b"hello");
        assert_eq!(radio.read_data(&mut buf), Err(HwError(codes::NO_PACKET)));
    }

    #[test]
    fn hardware_range_codes() {
        let mut radio = SimulatedRadio::new();
        assert_eq!(
            radio.set_frequency(100.0),
            Err(HwError(codes::INVALID_FREQUENCY))
        );
        assert_eq!(
            radio.set_bandwidth(100.0),
            Err(HwError(codes::INVALID_BANDWIDTH))
        );
        assert!(radio.set_bandwidth(125.0).is_ok());
    }
}
