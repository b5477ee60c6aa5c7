//! Half-duplex link state machine
//!
//! [`RadioLink`] owns the transceiver and is the only thing allowed to key
//! it. At most one operation is in flight: a send while a transmit is
//! outstanding is refused and reported as dropped rather than queued, so a
//! caller never blocks on the radio.
//!
//! ```text
//! Idle ──configure──▶ Receiving ──send──▶ Transmitting
//!                        ▲                    │
//!                        ├────completion──────┤
//!                        └──timeout (forced)──┘
//! ```
//!
//! Two nodes keying up at the same moment will both lose their packet. The
//! link neither detects nor retries this; it is a documented limitation.

use embassy_futures::select::{select, Either};
use embedded_hal_async::delay::DelayNs;
use heapless::{String, Vec};

use crate::config::MAX_PACKET_LEN;
use crate::radio::completion::CompletionSignal;
use crate::radio::hardware::{ConfigError, HwError, RadioHardware};
use crate::types::{
    Bandwidth, Frequency, OutputPower, RadioParams, RadioState, RangePolicy, SpreadingFactor,
};

/// Result of handing a message to the link
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SendOutcome {
    /// Transmission started
    Accepted,
    /// Nothing was transmitted
    Dropped(DropReason),
}

impl SendOutcome {
    /// Whether the transmission started
    #[must_use]
    pub const fn is_accepted(self) -> bool {
        matches!(self, Self::Accepted)
    }
}

/// Why a send was dropped
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DropReason {
    /// Empty message
    Empty,
    /// A transmit is already in flight
    Busy,
    /// Message longer than a packet
    TooLong,
    /// The transceiver refused to start
    Hardware(HwError),
}

/// Something observed while servicing the link
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LinkEvent {
    /// The in-flight transmit finished and receive was restarted
    TxComplete,
    /// The in-flight transmit was force-aborted after the timeout
    TxTimedOut,
    /// A received payload is ready for [`RadioLink::get_message`]
    RxReady,
    /// A receive completed but the payload could not be read
    RxFailed(HwError),
}

/// How a transmit that was waited on ended
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TxOutcome {
    /// Completion was signalled
    Sent,
    /// No completion within the timeout, link forced back to receive
    TimedOut,
    /// Nothing was in flight
    NotTransmitting,
}

/// Single owner of the transceiver
pub struct RadioLink<R: RadioHardware> {
    hw: R,
    state: RadioState,
    completion: &'static CompletionSignal,
    settings: RadioParams,
    policy: RangePolicy,
    tx_timeout_ms: u64,
    tx_started_ms: u64,
    rx_ready: bool,
    rx_buffer: Vec<u8, MAX_PACKET_LEN>,
    last_rssi: i16,
}

impl<R: RadioHardware> RadioLink<R> {
    /// Create an unconfigured link
    pub fn new(
        hw: R,
        completion: &'static CompletionSignal,
        settings: RadioParams,
        policy: RangePolicy,
        tx_timeout_ms: u64,
    ) -> Self {
        Self {
            hw,
            state: RadioState::Idle,
            completion,
            settings,
            policy,
            tx_timeout_ms,
            tx_started_ms: 0,
            rx_ready: false,
            rx_buffer: Vec::new(),
            last_rssi: 0,
        }
    }

    /// Bring the transceiver up on `frequency_mhz` at `power_dbm` and start listening
    ///
    /// The pins were handed to the hardware driver when it was built. On
    /// failure the link stays `Idle` and must not be assumed usable.
    pub fn configure(&mut self, frequency_mhz: f32, power_dbm: i8) -> Result<(), HwError> {
        let params = RadioParams {
            frequency_mhz,
            power_dbm,
            ..self.settings
        };

        self.hw.bind_completion(self.completion);
        self.completion.reset();
        self.rx_ready = false;

        if let Err(e) = self.hw.begin(&params).and_then(|()| self.hw.start_receive()) {
            error!("LoRa initialisation FAILED! Code: {}", e.code());
            self.state = RadioState::Idle;
            return Err(e);
        }

        self.settings = params;
        self.state = RadioState::Receiving;
        info!(
            "LoRa initialised at {} MHz, {} dBm",
            params.frequency_mhz,
            params.power_dbm
        );
        Ok(())
    }

    /// Current link state
    #[must_use]
    pub const fn state(&self) -> RadioState {
        self.state
    }

    /// Whether a transmit is in flight
    #[must_use]
    pub const fn is_transmitting(&self) -> bool {
        matches!(self.state, RadioState::Transmitting)
    }

    /// Parameters currently applied to the transceiver
    #[must_use]
    pub const fn settings(&self) -> &RadioParams {
        &self.settings
    }

    /// Range policy for configuration changes
    #[must_use]
    pub const fn policy(&self) -> RangePolicy {
        self.policy
    }

    /// RSSI captured with the last received packet
    #[must_use]
    pub const fn last_rssi(&self) -> i16 {
        self.last_rssi
    }

    /// Whether a received payload is waiting
    #[must_use]
    pub const fn has_message(&self) -> bool {
        self.rx_ready
    }

    /// Borrow the transceiver
    pub fn hardware(&self) -> &R {
        &self.hw
    }

    /// Mutably borrow the transceiver
    pub fn hardware_mut(&mut self) -> &mut R {
        &mut self.hw
    }

    /// Start transmitting `message` unless the link is busy
    ///
    /// A pending completion is serviced first so that a finished receive is
    /// not mistaken for the end of this transmit.
    pub fn send(&mut self, message: &[u8], now_ms: u64) -> SendOutcome {
        if message.is_empty() {
            return SendOutcome::Dropped(DropReason::Empty);
        }

        self.poll(now_ms);

        if !matches!(self.state, RadioState::Idle | RadioState::Receiving) {
            debug!("Radio busy ({}), dropping send", self.state.as_str());
            return SendOutcome::Dropped(DropReason::Busy);
        }

        if message.len() > MAX_PACKET_LEN {
            warn!("Message of {} bytes exceeds packet size, dropping", message.len());
            return SendOutcome::Dropped(DropReason::TooLong);
        }

        info!(
            "Transmitting [{}]",
            core::str::from_utf8(message).unwrap_or("<binary>")
        );

        match self.hw.start_transmit(message) {
            Ok(()) => {
                self.state = RadioState::Transmitting;
                self.tx_started_ms = now_ms;
                SendOutcome::Accepted
            }
            Err(e) => {
                error!("LoRa send failed with code: {}", e.code());
                if self.state == RadioState::Receiving {
                    self.restart_receive();
                }
                SendOutcome::Dropped(DropReason::Hardware(e))
            }
        }
    }

    /// Service the completion signal and the transmit timeout
    pub fn poll(&mut self, now_ms: u64) -> Option<LinkEvent> {
        if self.completion.take() {
            return self.handle_completion();
        }

        match self.state {
            RadioState::Transmitting
                if now_ms.saturating_sub(self.tx_started_ms) >= self.tx_timeout_ms =>
            {
                self.abort_transmit();
                Some(LinkEvent::TxTimedOut)
            }
            RadioState::TimedOut => {
                self.restart_receive();
                None
            }
            _ => None,
        }
    }

    /// Wait for the in-flight transmit to finish, bounded by the timeout
    ///
    /// The one place a caller waits on the radio: a relayed command is not
    /// applied locally until peers had the chance to hear it.
    pub async fn transmit_complete<D: DelayNs>(&mut self, delay: &mut D) -> TxOutcome {
        if !self.is_transmitting() {
            return TxOutcome::NotTransmitting;
        }

        let timeout_ms = u32::try_from(self.tx_timeout_ms).unwrap_or(u32::MAX);
        let completion = self.completion;

        match select(completion.wait(), delay.delay_ms(timeout_ms)).await {
            Either::First(()) => {
                self.complete_transmit();
                TxOutcome::Sent
            }
            Either::Second(()) => {
                self.abort_transmit();
                TxOutcome::TimedOut
            }
        }
    }

    /// Copy a waiting payload into `out` and re-arm receive
    ///
    /// Never blocks. A payload that does not fit `out` (or is not text) is
    /// discarded whole.
    pub fn get_message<const N: usize>(&mut self, out: &mut String<N>) -> bool {
        if !self.rx_ready {
            return false;
        }

        self.rx_ready = false;
        if self.state == RadioState::Receiving {
            self.restart_receive();
        }

        out.clear();
        let Ok(text) = core::str::from_utf8(&self.rx_buffer) else {
            warn!("Received payload is not text, discarding");
            return false;
        };
        if out.push_str(text).is_err() {
            warn!("Buffer overflow: message of {} bytes too long", text.len());
            out.clear();
            return false;
        }
        true
    }

    /// Read the RSSI from the transceiver
    pub fn rssi(&mut self) -> i16 {
        self.hw.rssi()
    }

    /// Change output power (`update gain`)
    pub fn set_output_power(&mut self, dbm: i8) -> Result<(), ConfigError> {
        if self.policy == RangePolicy::Validate && OutputPower::from_dbm(dbm).is_none() {
            warn!("Output power {} dBm out of range", dbm);
            return Err(ConfigError::OutOfRange);
        }
        self.hw.set_output_power(dbm).map_err(|e| {
            error!("Setting output power failed with code: {}", e.code());
            ConfigError::Hardware(e)
        })?;
        self.settings.power_dbm = dbm;
        info!("Output power set to {} dBm", dbm);
        Ok(())
    }

    /// Change carrier frequency (`update freqMhz`)
    pub fn set_frequency(&mut self, mhz: f32) -> Result<(), ConfigError> {
        if self.policy == RangePolicy::Validate && Frequency::from_mhz(mhz).is_none() {
            warn!("Frequency {} MHz out of range", mhz);
            return Err(ConfigError::OutOfRange);
        }
        self.hw.set_frequency(mhz).map_err(|e| {
            error!("Setting frequency failed with code: {}", e.code());
            ConfigError::Hardware(e)
        })?;
        self.settings.frequency_mhz = mhz;
        info!("Frequency set to {} MHz", mhz);
        Ok(())
    }

    /// Change spreading factor (`update sf`)
    pub fn set_spreading_factor(&mut self, sf: u8) -> Result<(), ConfigError> {
        if self.policy == RangePolicy::Validate && SpreadingFactor::new(sf).is_none() {
            warn!("Spreading factor {} out of range", sf);
            return Err(ConfigError::OutOfRange);
        }
        self.hw.set_spreading_factor(sf).map_err(|e| {
            error!("Setting spreading factor failed with code: {}", e.code());
            ConfigError::Hardware(e)
        })?;
        self.settings.spreading_factor = sf;
        info!("Spreading factor set to {}", sf);
        Ok(())
    }

    /// Change bandwidth (`update bwKHz`)
    pub fn set_bandwidth(&mut self, khz: f32) -> Result<(), ConfigError> {
        if self.policy == RangePolicy::Validate && Bandwidth::from_khz(khz).is_none() {
            warn!("Bandwidth {} kHz out of range", khz);
            return Err(ConfigError::OutOfRange);
        }
        self.hw.set_bandwidth(khz).map_err(|e| {
            error!("Setting bandwidth failed with code: {}", e.code());
            ConfigError::Hardware(e)
        })?;
        self.settings.bandwidth_khz = khz;
        info!("Bandwidth set to {} kHz", khz);
        Ok(())
    }

    fn handle_completion(&mut self) -> Option<LinkEvent> {
        match self.state {
            RadioState::Transmitting => {
                self.complete_transmit();
                Some(LinkEvent::TxComplete)
            }
            RadioState::Receiving => Some(self.capture_packet()),
            RadioState::Idle | RadioState::TimedOut => {
                debug!("Ignoring completion while {}", self.state.as_str());
                None
            }
        }
    }

    fn complete_transmit(&mut self) {
        if let Err(e) = self.hw.finish_transmit() {
            warn!("Finishing transmit failed with code: {}", e.code());
        }
        debug!("Transmit complete");
        self.restart_receive();
    }

    fn abort_transmit(&mut self) {
        warn!(
            "Transmit timed out after {} ms, forcing receive",
            self.tx_timeout_ms
        );
        self.state = RadioState::TimedOut;
        self.restart_receive();
    }

    fn capture_packet(&mut self) -> LinkEvent {
        if self.rx_ready {
            warn!("Unread payload overwritten by new packet");
        }

        self.rx_buffer.clear();
        // Length is bounded by the FIFO, which matches the buffer capacity
        let _ = self.rx_buffer.resize(MAX_PACKET_LEN, 0);

        match self.hw.read_data(&mut self.rx_buffer) {
            Ok(len) => {
                self.rx_buffer.truncate(len);
                self.last_rssi = self.hw.rssi();
                self.rx_ready = true;
                debug!("LoRa receive successful, {} bytes", len);
                LinkEvent::RxReady
            }
            Err(e) => {
                self.rx_buffer.clear();
                error!("LoRa receive failed with code: {}", e.code());
                self.restart_receive();
                LinkEvent::RxFailed(e)
            }
        }
    }

    fn restart_receive(&mut self) {
        match self.hw.start_receive() {
            Ok(()) => self.state = RadioState::Receiving,
            Err(e) => {
                error!("Restarting receive failed with code: {}", e.code());
                if self.state == RadioState::Transmitting {
                    self.state = RadioState::TimedOut;
                }
            }
        }
    }
}
