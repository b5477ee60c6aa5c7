//! USB CDC ACM (Serial) Implementation
//!
//! The operator's serial line. A reader task assembles incoming packets
//! into lines and queues them on [`SERIAL_LINES`]; the router writes through
//! [`UsbSerial`] into [`SERIAL_OUT`], which a writer task drains into
//! packets. While a host is connected the router waits for room in the
//! pipe; without one, output that does not fit is dropped so the router
//! never stalls on an unplugged cable.

use core::sync::atomic::{AtomicBool, Ordering};

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use embassy_sync::pipe::Pipe;
use embassy_usb::class::cdc_acm::{Receiver, Sender};
use embassy_usb::driver::{Driver, EndpointError};
use heapless::String;

use crate::config::{MAX_LINE_LEN, USB_CDC_PACKET_SIZE};
use crate::serial::{LineBuffer, SerialPort};

/// Lines queued between the reader task and the node task
pub const LINE_QUEUE_DEPTH: usize = 4;

/// Bytes buffered between the router and the writer task
pub const OUT_BUFFER_SIZE: usize = 512;

/// Complete operator lines waiting for the router
pub static SERIAL_LINES: Channel<CriticalSectionRawMutex, String<MAX_LINE_LEN>, LINE_QUEUE_DEPTH> =
    Channel::new();

/// Outgoing serial bytes waiting for the host
pub static SERIAL_OUT: Pipe<CriticalSectionRawMutex, OUT_BUFFER_SIZE> = Pipe::new();

/// Set while a host has the CDC port open
static HOST_CONNECTED: AtomicBool = AtomicBool::new(false);

/// Whether a host currently has the serial port open
pub fn host_connected() -> bool {
    HOST_CONNECTED.load(Ordering::Acquire)
}

fn set_host_connected(connected: bool) {
    HOST_CONNECTED.store(connected, Ordering::Release);
    if !connected {
        // Wakes a router blocked on a full pipe
        SERIAL_OUT.clear();
    }
}

/// Router-side handle of the USB serial port
#[derive(Clone, Copy, Debug, Default)]
pub struct UsbSerial;

impl SerialPort for UsbSerial {
    async fn write_str(&mut self, text: &str) -> bool {
        let mut rest = text.as_bytes();
        while !rest.is_empty() {
            if host_connected() {
                let n = SERIAL_OUT.write(rest).await;
                rest = &rest[n..];
                continue;
            }
            match SERIAL_OUT.try_write(rest) {
                Ok(n) => rest = &rest[n..],
                Err(_) => {
                    debug!("No host, dropping {} bytes of serial output", rest.len());
                    return false;
                }
            }
        }
        true
    }
}

/// Read packets from the host and queue complete lines, forever
pub async fn run_reader<'d, D: Driver<'d>>(rx: &mut Receiver<'d, D>) -> ! {
    let mut lines = LineBuffer::new();
    let mut packet = [0u8; USB_CDC_PACKET_SIZE as usize];

    loop {
        rx.wait_connection().await;
        info!("USB serial connected");
        set_host_connected(true);
        lines.clear();

        loop {
            let n = match rx.read_packet(&mut packet).await {
                Ok(n) => n,
                Err(EndpointError::Disabled) => break,
                Err(EndpointError::BufferOverflow) => {
                    warn!("USB packet overflow");
                    continue;
                }
            };

            let mut pending = &packet[..n];
            loop {
                let accepted = lines.push(pending);
                pending = &pending[accepted..];
                while let Some(line) = lines.read_line() {
                    SERIAL_LINES.send(line).await;
                }
                if pending.is_empty() {
                    break;
                }
            }
        }

        info!("USB serial disconnected");
        set_host_connected(false);
    }
}

/// Drain [`SERIAL_OUT`] into packets for the host, forever
pub async fn run_writer<'d, D: Driver<'d>>(tx: &mut Sender<'d, D>) -> ! {
    let mut packet = [0u8; USB_CDC_PACKET_SIZE as usize];

    loop {
        tx.wait_connection().await;
        SERIAL_OUT.clear();
        set_host_connected(true);

        loop {
            let n = SERIAL_OUT.read(&mut packet).await;
            if tx.write_packet(&packet[..n]).await.is_err() {
                break;
            }
            // Terminate a full-size packet so the host does not wait for more
            if n == packet.len() && SERIAL_OUT.is_empty() && tx.write_packet(&[]).await.is_err() {
                break;
            }
        }

        set_host_connected(false);
    }
}

/// USB device descriptor strings
pub struct UsbStrings {
    /// Manufacturer name
    pub manufacturer: &'static str,
    /// Product name
    pub product: &'static str,
    /// Serial number
    pub serial: &'static str,
}

impl Default for UsbStrings {
    fn default() -> Self {
        Self {
            manufacturer: "LoRa Node Project",
            product: "LoRa Node",
            serial: "0001",
        }
    }
}

/// USB device info for descriptor
#[derive(Clone, Copy, Debug)]
pub struct UsbDeviceInfo {
    /// Vendor ID
    pub vid: u16,
    /// Product ID
    pub pid: u16,
    /// Device release number
    pub device_release: u16,
}

impl Default for UsbDeviceInfo {
    fn default() -> Self {
        Self {
            vid: crate::config::USB_VID,
            pid: crate::config::USB_PID,
            device_release: 0x0100,
        }
    }
}

impl UsbDeviceInfo {
    /// Build the embassy-usb configuration
    #[must_use]
    pub fn to_config(self, strings: &UsbStrings) -> embassy_usb::Config<'static> {
        let mut config = embassy_usb::Config::new(self.vid, self.pid);
        config.device_release = self.device_release;
        config.manufacturer = Some(strings.manufacturer);
        config.product = Some(strings.product);
        config.serial_number = Some(strings.serial);
        config.max_power = 100;
        config.max_packet_size_0 = 64;
        config
    }
}

impl defmt::Format for UsbDeviceInfo {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "USB({:04X}:{:04X})", self.vid, self.pid);
    }
}
