//! LoRa Node Main Application
//!
//! Entry point for the STM32G474-based LoRa messaging node.
//! Initializes hardware and spawns async tasks:
//!
//! - `node_task` owns the router and with it the radio link
//! - `dio1_task` turns the SX1262 DIO1 edge into the completion signal
//! - `usb_task`, `usb_reader_task`, `usb_writer_task` run the CDC serial port
//! - `indicator_task` blinks the status LED

#![no_std]
#![no_main]

use defmt::info;
use embassy_executor::Spawner;
use embassy_futures::select::{select3, Either3};
use embassy_stm32::exti::ExtiInput;
use embassy_stm32::flash::Flash;
use embassy_stm32::gpio::{Level, Output, Pull, Speed};
use embassy_stm32::peripherals::USB;
use embassy_stm32::usb::Driver;
use embassy_stm32::{bind_interrupts, usb};
use embassy_time::{Delay, Duration, Instant, Ticker};
use embassy_usb::class::cdc_acm::{CdcAcmClass, Receiver, Sender, State};
use embassy_usb::{Builder, UsbDevice};
use static_cell::StaticCell;
use {defmt_rtt as _, panic_probe as _};

use lora_node::drivers::flash_log::FlashLogStorage;
use lora_node::hal::adc::BatterySense;
use lora_node::hal::gpio::StatusLed;
use lora_node::power::BatteryMonitor;
use lora_node::prelude::*;
use lora_node::usb::cdc::{self, UsbDeviceInfo, UsbSerial, UsbStrings, SERIAL_LINES};

#[cfg(feature = "sim-radio")]
use lora_node::radio::sim::SimulatedRadio;
#[cfg(not(feature = "sim-radio"))]
use {
    embassy_stm32::gpio::Input,
    embassy_stm32::mode::Blocking,
    embassy_stm32::spi::{self, Spi},
    embassy_stm32::time::Hertz,
    embedded_hal_bus::spi::ExclusiveDevice,
    lora_node::drivers::sx1262::Sx1262,
};

// Bind interrupt handlers
bind_interrupts!(struct Irqs {
    USB_LP => usb::InterruptHandler<USB>;
});

type UsbDriver = Driver<'static, USB>;

#[cfg(not(feature = "sim-radio"))]
type Radio = Sx1262<
    ExclusiveDevice<Spi<'static, Blocking>, Output<'static>, Delay>,
    Output<'static>,
    Input<'static>,
    Delay,
>;

#[cfg(feature = "sim-radio")]
type Radio = SimulatedRadio;

type Router = MessageRouter<Radio, UsbSerial, FlashLogStorage<'static>, Output<'static>>;

/// Main entry point
#[embassy_executor::main]
async fn main(spawner: Spawner) {
    info!("LoRa Node Firmware v{}", env!("CARGO_PKG_VERSION"));

    let mut config = embassy_stm32::Config::default();
    {
        use embassy_stm32::rcc::{mux, Hsi48Config};
        // USB needs a 48 MHz clock, trimmed from the host's SOF
        config.rcc.hsi48 = Some(Hsi48Config {
            sync_from_usb: true,
        });
        config.rcc.mux.clk48sel = mux::Clk48sel::HSI48;
    }
    let p = embassy_stm32::init(config);

    info!("Peripherals initialized");

    // USB CDC ACM serial
    let driver = Driver::new(p.USB, Irqs, p.PA12, p.PA11);
    let usb_config = UsbDeviceInfo::default().to_config(&UsbStrings::default());

    static CONFIG_DESCRIPTOR: StaticCell<[u8; 256]> = StaticCell::new();
    static BOS_DESCRIPTOR: StaticCell<[u8; 256]> = StaticCell::new();
    static CONTROL_BUF: StaticCell<[u8; 64]> = StaticCell::new();
    static CDC_STATE: StaticCell<State<'static>> = StaticCell::new();

    let mut builder = Builder::new(
        driver,
        usb_config,
        CONFIG_DESCRIPTOR.init([0; 256]),
        BOS_DESCRIPTOR.init([0; 256]),
        &mut [],
        CONTROL_BUF.init([0; 64]),
    );
    let class = CdcAcmClass::new(&mut builder, CDC_STATE.init(State::new()), USB_CDC_PACKET_SIZE);
    let (tx, rx) = class.split();
    let usb = builder.build();

    // Radio
    #[cfg(not(feature = "sim-radio"))]
    let radio = {
        let mut spi_config = spi::Config::default();
        spi_config.frequency = Hertz(8_000_000);
        let bus = Spi::new_blocking(p.SPI1, p.PA5, p.PA7, p.PA6, spi_config);
        let nss = Output::new(p.PA4, Level::High, Speed::VeryHigh);
        let device = ExclusiveDevice::new(bus, nss, Delay).unwrap_or_else(|e| match e {});
        let reset = Output::new(p.PB0, Level::High, Speed::Low);
        let busy = Input::new(p.PB1, Pull::None);
        Sx1262::new(device, reset, busy, Delay)
    };
    #[cfg(feature = "sim-radio")]
    let radio = SimulatedRadio::new();

    let dio1 = ExtiInput::new(p.PB2, p.EXTI2, Pull::Down);

    let node_config = NodeConfig::with_node_id(node_id());
    info!("Node id {:X}", node_config.node_id);

    let link = RadioLink::new(
        radio,
        &RADIO_COMPLETION,
        node_config.radio,
        node_config.range_policy,
        node_config.tx_timeout_ms,
    );
    let log = DataLog::new(FlashLogStorage::new(Flash::new_blocking(p.FLASH)));
    let output = Output::new(p.PC7, Level::Low, Speed::Low);

    let mut router = Router::new(link, UsbSerial, log, output, node_config.node_id);
    router.begin(node_config.radio.frequency_mhz, node_config.radio.power_dbm);

    let battery = BatterySense::new(p.ADC1, p.PA0);
    let led = StatusLed::new(Output::new(p.PC6, Level::Low, Speed::Low));

    // Spawn background tasks
    spawner.spawn(usb_task(usb)).unwrap();
    spawner.spawn(usb_reader_task(rx)).unwrap();
    spawner.spawn(usb_writer_task(tx)).unwrap();
    spawner.spawn(dio1_task(dio1)).unwrap();
    spawner.spawn(indicator_task(led)).unwrap();
    spawner.spawn(node_task(router, battery, node_config)).unwrap();

    info!("Tasks spawned");
}

/// Node id from the MCU unique id
fn node_id() -> u32 {
    embassy_stm32::uid::uid()
        .chunks_exact(4)
        .map(|word| u32::from_le_bytes([word[0], word[1], word[2], word[3]]))
        .fold(0, |acc, word| acc ^ word)
}

fn now_ms() -> u64 {
    Instant::now().as_millis()
}

/// Node task - owns the router, feeds it lines, radio polls and heartbeats
#[embassy_executor::task]
async fn node_task(mut router: Router, mut battery: BatterySense<'static>, config: NodeConfig) {
    let mut delay = Delay;
    let mut monitor = BatteryMonitor::default();
    let mut radio_tick = Ticker::every(Duration::from_millis(config.radio_poll_ms));
    let mut heartbeat = Ticker::every(Duration::from_millis(config.heartbeat_ms));

    loop {
        match select3(SERIAL_LINES.receive(), radio_tick.next(), heartbeat.next()).await {
            Either3::First(line) => {
                router.handle_serial_line(&line, &mut delay, now_ms()).await;
            }
            Either3::Second(()) => {
                router.poll_radio(now_ms()).await;
            }
            Either3::Third(()) => {
                let level = monitor.update(battery.read());
                router.heartbeat(level, now_ms()).await;
            }
        }
    }
}

/// DIO1 task - raises the completion signal on every TX/RX done edge
#[embassy_executor::task]
async fn dio1_task(mut dio1: ExtiInput<'static>) {
    loop {
        dio1.wait_for_rising_edge().await;
        RADIO_COMPLETION.signal();
    }
}

/// Indicator task - blinks LED to show the system is running
#[embassy_executor::task]
async fn indicator_task(mut led: StatusLed<'static>) {
    let mut ticker = Ticker::every(Duration::from_millis(intervals::INDICATOR_MS));
    loop {
        led.toggle();
        ticker.next().await;
    }
}

#[embassy_executor::task]
async fn usb_task(mut usb: UsbDevice<'static, UsbDriver>) {
    usb.run().await;
}

#[embassy_executor::task]
async fn usb_reader_task(mut rx: Receiver<'static, UsbDriver>) {
    cdc::run_reader(&mut rx).await;
}

#[embassy_executor::task]
async fn usb_writer_task(mut tx: Sender<'static, UsbDriver>) {
    cdc::run_writer(&mut tx).await;
}
