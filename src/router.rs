//! Message router
//!
//! Top level of the node: owns the radio link, the operator serial port,
//! the data log and the switched output, and applies the envelope protocol
//! to every line that arrives from either side.
//!
//! The router is driven from outside with the current time. On hardware a
//! single task feeds it serial lines, radio poll ticks and heartbeat ticks,
//! which keeps the link single-owner without a lock.
//!
//! Only `command` lines typed by the operator are relayed onto the radio.
//! Lines received over the air are handled locally and never re-broadcast.

use embedded_hal::digital::OutputPin;
use embedded_hal_async::delay::DelayNs;
use heapless::{String, Vec};

use crate::command::{self, NodeControl, Reply, COMMANDS};
use crate::config::{MAX_PACKET_LEN, REPLY_LEN};
use crate::protocol::{DeviceStatus, MessageKind, Tokens, RECEIVED_PREFIX, SEPARATOR, USAGE};
use crate::radio::hardware::{ConfigError, RadioHardware};
use crate::radio::link::{RadioLink, TxOutcome};
use crate::serial::SerialPort;
use crate::storage::{DataLog, LogStorage, MAX_LOG_LINE};
use crate::types::NodeMode;

/// Health string reported while everything works
pub const STATUS_OK: &str = "ok";

/// Health string reported when the radio failed to come up
pub const STATUS_RADIO_FAULT: &str = "radio-fault";

/// Health string reported when the log could not be mounted
pub const STATUS_LOG_FAULT: &str = "log-fault";

/// Node orchestrator
pub struct MessageRouter<R, S, F, P>
where
    R: RadioHardware,
    S: SerialPort,
    F: LogStorage,
    P: OutputPin,
{
    link: RadioLink<R>,
    serial: S,
    log: DataLog<F>,
    output: P,
    node_id: u32,
    mode: NodeMode,
    status: &'static str,
}

impl<R, S, F, P> MessageRouter<R, S, F, P>
where
    R: RadioHardware,
    S: SerialPort,
    F: LogStorage,
    P: OutputPin,
{
    /// Assemble a router from its parts
    pub fn new(link: RadioLink<R>, serial: S, log: DataLog<F>, output: P, node_id: u32) -> Self {
        Self {
            link,
            serial,
            log,
            output,
            node_id,
            mode: NodeMode::default(),
            status: STATUS_OK,
        }
    }

    /// Bring up the radio and open the log
    ///
    /// Failures are recorded in the status string and the node keeps
    /// running degraded.
    pub fn begin(&mut self, frequency_mhz: f32, power_dbm: i8) -> bool {
        let radio_ok = self.link.configure(frequency_mhz, power_dbm).is_ok();
        let log_ok = self.log.begin();

        self.status = if !radio_ok {
            STATUS_RADIO_FAULT
        } else if !log_ok {
            STATUS_LOG_FAULT
        } else {
            STATUS_OK
        };
        info!("Node {} up, status {}", self.node_id, self.status);
        radio_ok && log_ok
    }

    /// Radio link
    pub const fn link(&self) -> &RadioLink<R> {
        &self.link
    }

    /// Mutable radio link
    pub fn link_mut(&mut self) -> &mut RadioLink<R> {
        &mut self.link
    }

    /// Operator serial port
    pub const fn serial(&self) -> &S {
        &self.serial
    }

    /// Mutable operator serial port
    pub fn serial_mut(&mut self) -> &mut S {
        &mut self.serial
    }

    /// Data log
    pub const fn log(&self) -> &DataLog<F> {
        &self.log
    }

    /// Switched output
    pub const fn output(&self) -> &P {
        &self.output
    }

    /// Current operating mode
    #[must_use]
    pub const fn mode(&self) -> NodeMode {
        self.mode
    }

    /// Health string reported in the status line
    #[must_use]
    pub const fn status(&self) -> &'static str {
        self.status
    }

    /// Handle a line typed by the operator
    ///
    /// A `command` is relayed first and applied locally only once the relay
    /// finished (or timed out), so peers hear it no later than this node
    /// acts on it.
    pub async fn handle_serial_line<D: DelayNs>(&mut self, line: &str, delay: &mut D, now_ms: u64) {
        let mut tokens = Tokens::new(line);
        let Some(tag) = tokens.next_token() else {
            return;
        };
        debug!("Serial line: {}", line);

        if MessageKind::classify(tag) == MessageKind::Command {
            self.relay(line, delay, now_ms).await;
        }
        self.route(tag, tokens).await;
    }

    /// Service the link and handle a received payload, if any
    ///
    /// Returns whether a payload was handled.
    pub async fn poll_radio(&mut self, now_ms: u64) -> bool {
        // The link logs every event itself
        let _ = self.link.poll(now_ms);

        let mut payload: String<MAX_PACKET_LEN> = String::new();
        if !self.link.get_message(&mut payload) {
            return false;
        }

        info!("Radio received: {}", payload.as_str());
        self.serial.write_str(RECEIVED_PREFIX).await;
        self.serial.write_str(&payload).await;
        self.serial.write_str("\n").await;

        let mut tokens = Tokens::new(&payload);
        if let Some(tag) = tokens.next_token() {
            self.route(tag, tokens).await;
        }
        true
    }

    /// Report the node status to serial and broadcast it (lossy)
    ///
    /// A send that finds the link busy is dropped, not retried.
    pub async fn heartbeat(&mut self, battery_level: f32, now_ms: u64) {
        let status = DeviceStatus {
            id: self.node_id,
            rssi: self.link.last_rssi(),
            battery_level,
            mode: self.mode,
            status: self.status,
        };
        let Some(line) = status.to_line() else {
            warn!("Status line overflow, heartbeat skipped");
            return;
        };

        self.serial.write_str(&line).await;
        self.serial.write_str("\n").await;

        if self.mode.may_transmit() && !self.link.send(line.as_bytes(), now_ms).is_accepted() {
            debug!("Heartbeat not sent");
        }
    }

    async fn relay<D: DelayNs>(&mut self, line: &str, delay: &mut D, now_ms: u64) {
        if !self.mode.may_transmit() {
            debug!("Receive mode, command not relayed");
            return;
        }

        if !self.link.send(line.as_bytes(), now_ms).is_accepted() {
            warn!("Command relay dropped");
            return;
        }

        match self.link.transmit_complete(delay).await {
            TxOutcome::Sent => debug!("Command relayed"),
            TxOutcome::TimedOut => warn!("Command relay timed out"),
            TxOutcome::NotTransmitting => {}
        }
    }

    async fn route(&mut self, tag: &str, mut tokens: Tokens<'_>) {
        match MessageKind::classify(tag) {
            MessageKind::Command => self.run_command(&mut tokens).await,
            kind @ (MessageKind::Data | MessageKind::Status) => {
                let payload = tokens.remainder();
                if payload.is_empty() {
                    debug!("Empty {} message ignored", kind.tag());
                    return;
                }
                self.serial.write_str(payload).await;
                self.serial.write_str("\n").await;
                self.log.write_line(payload);
            }
            MessageKind::Help => {
                self.serial.write_str(USAGE).await;
            }
            MessageKind::Flash => self.flash().await,
            MessageKind::Unknown => warn!("Unknown message type: {}", tag),
        }
    }

    async fn run_command(&mut self, tokens: &mut Tokens<'_>) {
        let mut context = CommandContext {
            link: &mut self.link,
            mode: &mut self.mode,
            output: &mut self.output,
            replies: String::new(),
        };
        let outcome = command::dispatch(&mut context, COMMANDS, tokens);
        let replies = context.replies;

        if let command::Dispatch::Handled(name) = outcome {
            debug!("Command {} done", name);
        }
        if !replies.is_empty() {
            self.serial.write_str(&replies).await;
        }
    }

    /// Dump the log between separators, then erase it
    ///
    /// The log is kept if any part of the dump was dropped by the port.
    async fn flash(&mut self) {
        let mut complete = self.serial.write_str(SEPARATOR).await;

        let mut cursor = 0;
        let mut line: Vec<u8, MAX_LOG_LINE> = Vec::new();
        while complete && self.log.read_line(&mut cursor, &mut line) {
            match core::str::from_utf8(&line) {
                Ok(text) => {
                    complete = self.serial.write_str(text).await
                        && self.serial.write_str("\n").await;
                }
                Err(_) => warn!("Skipping log line that is not text"),
            }
        }

        if complete && self.serial.write_str(SEPARATOR).await {
            self.log.remove_file();
        } else {
            warn!("Log dump incomplete, log kept");
        }
    }
}

/// Node state a command may touch, borrowed for one dispatch
struct CommandContext<'a, R: RadioHardware, P: OutputPin> {
    link: &'a mut RadioLink<R>,
    mode: &'a mut NodeMode,
    output: &'a mut P,
    replies: String<REPLY_LEN>,
}

impl<R: RadioHardware, P: OutputPin> Reply for CommandContext<'_, R, P> {
    fn reply(&mut self, text: &str) {
        if self.replies.push_str(text).is_err() {
            warn!("Reply buffer full, dropping {} bytes", text.len());
        }
    }
}

impl<R: RadioHardware, P: OutputPin> NodeControl for CommandContext<'_, R, P> {
    fn set_output_power(&mut self, dbm: i8) -> Result<(), ConfigError> {
        self.link.set_output_power(dbm)
    }

    fn set_frequency(&mut self, mhz: f32) -> Result<(), ConfigError> {
        self.link.set_frequency(mhz)
    }

    fn set_spreading_factor(&mut self, sf: u8) -> Result<(), ConfigError> {
        self.link.set_spreading_factor(sf)
    }

    fn set_bandwidth(&mut self, khz: f32) -> Result<(), ConfigError> {
        self.link.set_bandwidth(khz)
    }

    fn mode(&self) -> NodeMode {
        *self.mode
    }

    fn set_mode(&mut self, mode: NodeMode) {
        *self.mode = mode;
    }

    fn set_output(&mut self, on: bool) -> bool {
        let result = if on {
            self.output.set_high()
        } else {
            self.output.set_low()
        };
        if result.is_err() {
            warn!("Failed to drive switched output");
        }
        result.is_ok()
    }
}
