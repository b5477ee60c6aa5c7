//! Message Router Tests
//!
//! End-to-end tests of the envelope protocol: relay of operator commands,
//! echo and logging of data, log dumps, heartbeats and radio-received lines.
//! Run with: cargo test --no-default-features --features std --test router_tests

use core::convert::Infallible;

use embassy_futures::block_on;
use embedded_hal::digital::{ErrorType, OutputPin};
use embedded_hal_async::delay::DelayNs;

use lora_node::protocol::{SEPARATOR, USAGE};
use lora_node::radio::completion::CompletionSignal;
use lora_node::radio::hardware::codes;
use lora_node::radio::link::RadioLink;
use lora_node::radio::sim::SimulatedRadio;
use lora_node::router::{MessageRouter, STATUS_OK, STATUS_RADIO_FAULT};
use lora_node::serial::SerialPort;
use lora_node::storage::{DataLog, MemoryStorage};
use lora_node::types::{NodeMode, RadioParams, RadioState, RangePolicy};

const NODE_ID: u32 = 7;

/// Serial double capturing everything written
///
/// With a capacity set, output past it is dropped as a port with no room
/// would.
#[derive(Default)]
struct CapturedSerial {
    output: String,
    capacity: Option<usize>,
}

impl SerialPort for CapturedSerial {
    async fn write_str(&mut self, text: &str) -> bool {
        let room = self
            .capacity
            .map_or(text.len(), |cap| cap.saturating_sub(self.output.len()));
        let taken = &text[..room.min(text.len())];
        self.output.push_str(taken);
        taken.len() == text.len()
    }
}

/// Output pin double remembering its level
#[derive(Default)]
struct Pin {
    high: bool,
}

impl ErrorType for Pin {
    type Error = Infallible;
}

impl OutputPin for Pin {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.high = false;
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.high = true;
        Ok(())
    }
}

/// Delay that never elapses
struct Forever;

impl DelayNs for Forever {
    async fn delay_ns(&mut self, _ns: u32) {
        core::future::pending::<()>().await;
    }
}

/// Delay that elapses at once
struct NoDelay;

impl DelayNs for NoDelay {
    async fn delay_ns(&mut self, _ns: u32) {}
}

type Router = MessageRouter<SimulatedRadio, CapturedSerial, MemoryStorage<1024>, Pin>;

fn router_with(radio: SimulatedRadio) -> Router {
    let completion: &'static CompletionSignal = Box::leak(Box::new(CompletionSignal::new()));
    let link = RadioLink::new(
        radio,
        completion,
        RadioParams::default(),
        RangePolicy::Validate,
        3_000,
    );
    MessageRouter::new(
        link,
        CapturedSerial::default(),
        DataLog::new(MemoryStorage::new()),
        Pin::default(),
        NODE_ID,
    )
}

fn router() -> Router {
    let mut router = router_with(SimulatedRadio::new());
    assert!(router.begin(915.0, 22));
    router
}

fn type_line(router: &mut Router, line: &str) {
    block_on(router.handle_serial_line(line, &mut Forever, 0));
}

fn output(router: &Router) -> &str {
    &router.serial().output
}

fn sent(router: &Router) -> Vec<String> {
    router
        .link()
        .hardware()
        .sent()
        .map(|packet| String::from_utf8(packet.to_vec()).unwrap())
        .collect()
}

fn log_contents(router: &Router) -> &[u8] {
    router.log().storage().contents()
}

// =============================================================================
// Startup Tests
// =============================================================================

#[test]
fn begin_reports_ok() {
    let router = router();
    assert_eq!(router.status(), STATUS_OK);
    assert_eq!(router.mode(), NodeMode::Transceive);
    assert_eq!(router.link().state(), RadioState::Receiving);
    assert_eq!(log_contents(&router), b"New Log\n");
}

#[test]
fn begin_with_dead_radio_keeps_log() {
    let mut router = router_with(SimulatedRadio::new().failing_begin(codes::CHIP_NOT_FOUND));
    assert!(!router.begin(915.0, 22));
    assert_eq!(router.status(), STATUS_RADIO_FAULT);
    assert_eq!(router.link().state(), RadioState::Idle);
    assert!(router.log().is_mounted());
}

// =============================================================================
// Command Tests
// =============================================================================

#[test]
fn command_is_relayed_verbatim_then_applied() {
    let mut router = router();
    type_line(&mut router, "command update gain 14");

    assert_eq!(sent(&router), ["command update gain 14"]);
    assert_eq!(router.link().settings().power_dbm, 14);
    assert_eq!(router.link().state(), RadioState::Receiving);
}

#[test]
fn command_is_not_logged_or_echoed() {
    let mut router = router();
    type_line(&mut router, "command update sf 9");
    assert_eq!(router.link().settings().spreading_factor, 9);
    assert!(output(&router).is_empty());
    assert_eq!(log_contents(&router), b"New Log\n");
}

#[test]
fn out_of_range_command_is_relayed_but_not_applied() {
    let mut router = router();
    type_line(&mut router, "command update gain 40");
    assert_eq!(sent(&router), ["command update gain 40"]);
    assert_eq!(router.link().settings().power_dbm, 22);
}

#[test]
fn command_replies_go_to_serial() {
    let mut router = router();
    type_line(&mut router, "command mode");
    assert_eq!(output(&router), "mode: transceive\n");
}

#[test]
fn command_help_lists_table() {
    let mut router = router();
    type_line(&mut router, "command update help");
    assert_eq!(
        output(&router),
        "Available commands: help, gain, freqMhz, sf, bwKHz\n"
    );
}

#[test]
fn command_applied_even_when_relay_is_busy() {
    let mut router = router_with(SimulatedRadio::with_deferred_completion());
    assert!(router.begin(915.0, 22));
    // Occupy the radio with a transmit that never completes
    assert!(router.link_mut().send(b"stuck", 0).is_accepted());

    type_line(&mut router, "command update freqMhz 868");
    assert_eq!(sent(&router), ["stuck"]);
    assert_eq!(router.link().settings().frequency_mhz, 868.0);
}

#[test]
fn command_applied_after_relay_times_out() {
    let mut router = router_with(SimulatedRadio::with_deferred_completion());
    assert!(router.begin(915.0, 22));

    block_on(router.handle_serial_line("command update sf 11", &mut NoDelay, 0));
    assert_eq!(sent(&router), ["command update sf 11"]);
    assert_eq!(router.link().state(), RadioState::Receiving);
    assert_eq!(router.link().settings().spreading_factor, 11);
}

#[test]
fn unknown_command_changes_nothing() {
    let mut router = router();
    let before = *router.link().settings();
    type_line(&mut router, "command bogus 1");
    assert_eq!(*router.link().settings(), before);
    assert!(output(&router).is_empty());
}

#[cfg(feature = "switched-output")]
#[test]
fn set_output_drives_pin() {
    let mut router = router();
    type_line(&mut router, "command set output 1");
    assert!(router.output().high);
    type_line(&mut router, "command set output 0");
    assert!(!router.output().high);
}

// =============================================================================
// Data and Status Tests
// =============================================================================

#[test]
fn data_is_echoed_and_logged() {
    let mut router = router();
    type_line(&mut router, "data 12.5,3.2");
    assert_eq!(output(&router), "12.5,3.2\n");
    assert_eq!(log_contents(&router), b"New Log\n12.5,3.2\n");
    assert!(sent(&router).is_empty());
}

#[test]
fn status_is_echoed_and_logged() {
    let mut router = router();
    type_line(&mut router, "status node 3 ok");
    assert_eq!(output(&router), "node 3 ok\n");
    assert_eq!(log_contents(&router), b"New Log\nnode 3 ok\n");
}

#[test]
fn empty_data_is_ignored() {
    let mut router = router();
    type_line(&mut router, "data   ");
    assert!(output(&router).is_empty());
    assert_eq!(log_contents(&router), b"New Log\n");
}

#[test]
fn unknown_type_is_ignored() {
    let mut router = router();
    type_line(&mut router, "bogus foo");
    assert!(output(&router).is_empty());
    assert!(sent(&router).is_empty());
    assert_eq!(log_contents(&router), b"New Log\n");
}

#[test]
fn help_writes_usage() {
    let mut router = router();
    type_line(&mut router, "help");
    assert_eq!(output(&router), USAGE);
}

// =============================================================================
// Flash Tests
// =============================================================================

#[test]
fn flash_dumps_then_erases() {
    let mut router = router();
    type_line(&mut router, "data 1,2");
    type_line(&mut router, "status fine");
    router.serial_mut().output.clear();

    type_line(&mut router, "flash");
    let expected = format!("{SEPARATOR}New Log\n1,2\nfine\n{SEPARATOR}");
    assert_eq!(output(&router), expected);
    assert_eq!(router.log().file_len(), 0);
}

#[test]
fn flash_keeps_log_when_output_is_dropped() {
    let mut router = router();
    let lines: Vec<String> = (0..40).map(|i| format!("sample-{i:03},12.5,3.2")).collect();
    for line in &lines {
        type_line(&mut router, &format!("data {line}"));
    }
    let logged = router.log().file_len();
    router.serial_mut().output.clear();

    router.serial_mut().capacity = Some(512);
    type_line(&mut router, "flash");
    assert_eq!(output(&router).len(), 512);
    assert_eq!(router.log().file_len(), logged);

    // Once the port keeps up, the whole log is dumped in order and erased
    router.serial_mut().output.clear();
    router.serial_mut().capacity = None;
    type_line(&mut router, "flash");
    let expected = format!("{SEPARATOR}New Log\n{}\n{SEPARATOR}", lines.join("\n"));
    assert_eq!(output(&router), expected);
    assert_eq!(router.log().file_len(), 0);
}

#[test]
fn flash_keeps_log_when_closing_separator_is_dropped() {
    let mut router = router();
    type_line(&mut router, "data 1,2");
    let logged = router.log().file_len();
    router.serial_mut().output.clear();

    let dump_without_separator = SEPARATOR.len() + "New Log\n1,2\n".len();
    router.serial_mut().capacity = Some(dump_without_separator);
    type_line(&mut router, "flash");
    assert_eq!(router.log().file_len(), logged);
}

#[test]
fn flash_on_empty_log() {
    let mut router = router();
    type_line(&mut router, "flash");
    type_line(&mut router, "flash");
    let expected = format!("{SEPARATOR}New Log\n{SEPARATOR}{SEPARATOR}{SEPARATOR}");
    assert_eq!(output(&router), expected);
}

// =============================================================================
// Heartbeat Tests
// =============================================================================

#[test]
fn heartbeat_reports_and_broadcasts() {
    let mut router = router();
    block_on(router.heartbeat(87.5, 0));

    let line = "status ID:7 RSSI:0 batteryLevel:87.50 mode:transceive status:ok";
    assert_eq!(output(&router), format!("{line}\n"));
    assert_eq!(sent(&router), [line]);
}

#[test]
fn heartbeat_dropped_while_transmit_in_flight() {
    let mut router = router_with(SimulatedRadio::with_deferred_completion());
    assert!(router.begin(915.0, 22));
    assert!(router.link_mut().send(b"data first", 0).is_accepted());

    block_on(router.heartbeat(87.5, 10));
    let line = "status ID:7 RSSI:0 batteryLevel:87.50 mode:transceive status:ok";
    assert_eq!(output(&router), format!("{line}\n"));
    assert_eq!(sent(&router), ["data first"]);
    assert_eq!(router.link().state(), RadioState::Transmitting);

    // Dropped, not queued: completing the first transmit sends nothing more
    assert!(router.link_mut().hardware_mut().complete_transmit());
    block_on(router.poll_radio(20));
    assert_eq!(sent(&router), ["data first"]);
    assert_eq!(router.link().state(), RadioState::Receiving);
}

#[test]
fn heartbeat_reports_last_rssi() {
    let mut router = router();
    router.link_mut().hardware_mut().inject(b"data x");
    block_on(router.poll_radio(0));
    router.serial_mut().output.clear();

    block_on(router.heartbeat(50.0, 10));
    assert!(output(&router).starts_with("status ID:7 RSSI:-40 batteryLevel:50.00"));
}

// =============================================================================
// Receive Mode Tests
// =============================================================================

#[test]
fn receive_mode_never_transmits() {
    let mut router = router();
    type_line(&mut router, "command mode receive");
    assert_eq!(router.mode(), NodeMode::Receive);
    // The mode change itself was relayed while still transceiving
    assert_eq!(sent(&router), ["command mode receive"]);

    type_line(&mut router, "command update gain 10");
    assert_eq!(router.link().settings().power_dbm, 10);

    block_on(router.heartbeat(100.0, 0));
    assert_eq!(sent(&router).len(), 1);
    assert!(output(&router).contains("mode:receive"));
}

// =============================================================================
// Radio Receive Tests
// =============================================================================

#[test]
fn received_data_is_echoed_and_logged() {
    let mut router = router();
    assert!(router.link_mut().hardware_mut().inject(b"data hello"));
    assert!(block_on(router.poll_radio(0)));

    assert_eq!(output(&router), "Received: data hello\nhello\n");
    assert_eq!(log_contents(&router), b"New Log\nhello\n");
}

#[test]
fn received_command_is_applied_not_relayed() {
    let mut router = router();
    router
        .link_mut()
        .hardware_mut()
        .inject(b"command update sf 10");
    assert!(block_on(router.poll_radio(0)));

    assert_eq!(router.link().settings().spreading_factor, 10);
    assert!(sent(&router).is_empty());
}

#[test]
fn poll_without_traffic() {
    let mut router = router();
    assert!(!block_on(router.poll_radio(0)));
    assert!(output(&router).is_empty());
}
