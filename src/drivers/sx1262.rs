//! SX1262 LoRa Transceiver Driver
//!
//! Command-level driver over an `embedded-hal` SPI device. Every command
//! waits for BUSY to drop first. Transmit and receive are started and left
//! running; their end is reported on DIO1, which the caller watches.
//!
//! The chip is used in LoRa mode only, with the high-power PA (up to
//! +22 dBm) and DIO2 driving the RF switch.

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{InputPin, OutputPin};
use embedded_hal::spi::{Operation, SpiDevice};

use crate::radio::hardware::{
    bandwidth_code, codes, HwError, RadioHardware, HW_FREQUENCY_RANGE_MHZ,
};
use crate::types::{OutputPower, RadioParams, SpreadingFactor};

/// SX126x command opcodes
mod opcode {
    pub const CLEAR_IRQ_STATUS: u8 = 0x02;
    pub const SET_DIO_IRQ_PARAMS: u8 = 0x08;
    pub const WRITE_REGISTER: u8 = 0x0D;
    pub const WRITE_BUFFER: u8 = 0x0E;
    pub const GET_IRQ_STATUS: u8 = 0x12;
    pub const GET_RX_BUFFER_STATUS: u8 = 0x13;
    pub const GET_PACKET_STATUS: u8 = 0x14;
    pub const READ_BUFFER: u8 = 0x1E;
    pub const SET_STANDBY: u8 = 0x80;
    pub const SET_RX: u8 = 0x82;
    pub const SET_TX: u8 = 0x83;
    pub const SET_RF_FREQUENCY: u8 = 0x86;
    pub const SET_PACKET_TYPE: u8 = 0x8A;
    pub const SET_MODULATION_PARAMS: u8 = 0x8B;
    pub const SET_PACKET_PARAMS: u8 = 0x8C;
    pub const SET_TX_PARAMS: u8 = 0x8E;
    pub const SET_BUFFER_BASE_ADDRESS: u8 = 0x8F;
    pub const SET_PA_CONFIG: u8 = 0x95;
    pub const SET_REGULATOR_MODE: u8 = 0x96;
    pub const CALIBRATE_IMAGE: u8 = 0x98;
    pub const SET_DIO2_AS_RF_SWITCH: u8 = 0x9D;
    pub const GET_STATUS: u8 = 0xC0;
}

/// Register addresses
mod reg {
    pub const LORA_SYNC_WORD_MSB: u16 = 0x0740;
}

/// IRQ flags
mod irq {
    pub const TX_DONE: u16 = 0x0001;
    pub const RX_DONE: u16 = 0x0002;
    pub const CRC_ERR: u16 = 0x0040;
    pub const TIMEOUT: u16 = 0x0200;
    pub const ALL: u16 = 0xFFFF;
}

const STANDBY_RC: u8 = 0x00;
const PACKET_TYPE_LORA: u8 = 0x01;
const REGULATOR_DC_DC: u8 = 0x01;
const RAMP_200U: u8 = 0x04;
const HEADER_EXPLICIT: u8 = 0x00;
const CRC_ON: u8 = 0x01;
const IQ_STANDARD: u8 = 0x00;
const RX_CONTINUOUS: [u8; 3] = [0xFF, 0xFF, 0xFF];
const TX_NO_TIMEOUT: [u8; 3] = [0x00, 0x00, 0x00];

/// Chip mode field of the status byte while in STDBY_RC
const CHIP_MODE_STBY_RC: u8 = 0x2;

/// How long BUSY may stay high before a command is abandoned
const BUSY_TIMEOUT_US: u32 = 10_000;
const BUSY_POLL_US: u32 = 10;

/// Low data rate optimisation is required above this symbol time
const LDRO_SYMBOL_MS: f32 = 16.0;

/// SX1262 driver
pub struct Sx1262<SPI, RST, BUSY, D> {
    spi: SPI,
    reset: RST,
    busy: BUSY,
    delay: D,
    params: RadioParams,
    last_rssi: i16,
    listening: bool,
}

impl<SPI, RST, BUSY, D> Sx1262<SPI, RST, BUSY, D>
where
    SPI: SpiDevice,
    RST: OutputPin,
    BUSY: InputPin,
    D: DelayNs,
{
    /// Create a driver; the chip is not touched until `begin`
    pub fn new(spi: SPI, reset: RST, busy: BUSY, delay: D) -> Self {
        Self {
            spi,
            reset,
            busy,
            delay,
            params: RadioParams::default(),
            last_rssi: 0,
            listening: false,
        }
    }

    /// Pulse NRESET and wait for the chip to come up
    fn hard_reset(&mut self) -> Result<(), HwError> {
        self.reset.set_low().map_err(|_| HwError(codes::SPI_ERROR))?;
        self.delay.delay_ms(1);
        self.reset.set_high().map_err(|_| HwError(codes::SPI_ERROR))?;
        self.delay.delay_ms(5);
        self.wait_busy()
    }

    fn wait_busy(&mut self) -> Result<(), HwError> {
        let mut waited = 0;
        while self.busy.is_high().map_err(|_| HwError(codes::SPI_ERROR))? {
            if waited >= BUSY_TIMEOUT_US {
                return Err(HwError(codes::SPI_CMD_TIMEOUT));
            }
            self.delay.delay_us(BUSY_POLL_US);
            waited += BUSY_POLL_US;
        }
        Ok(())
    }

    fn command(&mut self, op: u8, params: &[u8]) -> Result<(), HwError> {
        self.wait_busy()?;
        self.spi
            .transaction(&mut [Operation::Write(&[op]), Operation::Write(params)])
            .map_err(|_| HwError(codes::SPI_ERROR))
    }

    /// Opcode, one NOP for the status byte, then `out.len()` bytes of response
    fn read_command(&mut self, op: u8, out: &mut [u8]) -> Result<(), HwError> {
        self.wait_busy()?;
        self.spi
            .transaction(&mut [Operation::Write(&[op, 0x00]), Operation::Read(out)])
            .map_err(|_| HwError(codes::SPI_ERROR))
    }

    fn write_register(&mut self, addr: u16, data: &[u8]) -> Result<(), HwError> {
        let [hi, lo] = addr.to_be_bytes();
        self.wait_busy()?;
        self.spi
            .transaction(&mut [
                Operation::Write(&[opcode::WRITE_REGISTER, hi, lo]),
                Operation::Write(data),
            ])
            .map_err(|_| HwError(codes::SPI_ERROR))
    }

    fn status(&mut self) -> Result<u8, HwError> {
        let mut frame = [opcode::GET_STATUS, 0x00];
        self.wait_busy()?;
        self.spi
            .transaction(&mut [Operation::TransferInPlace(&mut frame)])
            .map_err(|_| HwError(codes::SPI_ERROR))?;
        Ok(frame[1])
    }

    fn irq_status(&mut self) -> Result<u16, HwError> {
        let mut flags = [0u8; 2];
        self.read_command(opcode::GET_IRQ_STATUS, &mut flags)?;
        Ok(u16::from_be_bytes(flags))
    }

    fn clear_irq(&mut self, mask: u16) -> Result<(), HwError> {
        self.command(opcode::CLEAR_IRQ_STATUS, &mask.to_be_bytes())
    }

    fn standby(&mut self) -> Result<(), HwError> {
        self.listening = false;
        self.command(opcode::SET_STANDBY, &[STANDBY_RC])
    }

    /// Run `apply` in standby, resuming receive afterwards if it was running
    fn reconfigure(
        &mut self,
        apply: impl FnOnce(&mut Self) -> Result<(), HwError>,
    ) -> Result<(), HwError> {
        let resume = self.listening;
        if resume {
            self.standby()?;
        }
        let result = apply(self);
        if resume {
            self.start_receive()?;
        }
        result
    }

    fn calibrate_image(&mut self, mhz: f32) -> Result<(), HwError> {
        let band = if mhz > 900.0 {
            [0xE1, 0xE9]
        } else if mhz > 850.0 {
            [0xD7, 0xDB]
        } else if mhz > 770.0 {
            [0xC1, 0xC5]
        } else if mhz > 460.0 {
            [0x75, 0x81]
        } else {
            [0x6B, 0x6F]
        };
        self.command(opcode::CALIBRATE_IMAGE, &band)
    }

    fn apply_modulation(&mut self) -> Result<(), HwError> {
        let bw = bandwidth_code(self.params.bandwidth_khz).ok_or(HwError(codes::INVALID_BANDWIDTH))?;
        let symbol_ms = f32::from(1u16 << self.params.spreading_factor) / self.params.bandwidth_khz;
        let ldro = u8::from(symbol_ms >= LDRO_SYMBOL_MS);
        let cr = self.params.coding_rate.saturating_sub(4).clamp(1, 4);
        self.command(
            opcode::SET_MODULATION_PARAMS,
            &[self.params.spreading_factor, bw, cr, ldro],
        )
    }

    fn apply_packet_params(&mut self, payload_len: u8) -> Result<(), HwError> {
        let [pre_hi, pre_lo] = self.params.preamble_len.to_be_bytes();
        self.command(
            opcode::SET_PACKET_PARAMS,
            &[pre_hi, pre_lo, HEADER_EXPLICIT, payload_len, CRC_ON, IQ_STANDARD],
        )
    }

    fn apply_sync_word(&mut self) -> Result<(), HwError> {
        let sw = self.params.sync_word;
        self.write_register(
            reg::LORA_SYNC_WORD_MSB,
            &[(sw & 0xF0) | 0x04, ((sw & 0x0F) << 4) | 0x04],
        )
    }

    fn write_frequency(&mut self, mhz: f32) -> Result<(), HwError> {
        // Fxtal / 2^25 = 32 MHz / 33554432, so 1 MHz is 2^20 steps
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let frf = (f64::from(mhz) * 1_048_576.0) as u32;
        self.command(opcode::SET_RF_FREQUENCY, &frf.to_be_bytes())
    }

    fn write_tx_params(&mut self, dbm: i8) -> Result<(), HwError> {
        let [power] = dbm.to_be_bytes();
        self.command(opcode::SET_TX_PARAMS, &[power, RAMP_200U])
    }
}

impl<SPI, RST, BUSY, D> RadioHardware for Sx1262<SPI, RST, BUSY, D>
where
    SPI: SpiDevice,
    RST: OutputPin,
    BUSY: InputPin,
    D: DelayNs,
{
    fn begin(&mut self, params: &RadioParams) -> Result<(), HwError> {
        self.hard_reset()?;
        self.standby()?;

        let mode = (self.status()? >> 4) & 0x07;
        if mode != CHIP_MODE_STBY_RC {
            return Err(HwError(codes::CHIP_NOT_FOUND));
        }

        self.command(opcode::SET_REGULATOR_MODE, &[REGULATOR_DC_DC])?;
        self.command(opcode::SET_DIO2_AS_RF_SWITCH, &[0x01])?;
        self.command(opcode::SET_PACKET_TYPE, &[PACKET_TYPE_LORA])?;

        self.set_frequency(params.frequency_mhz)?;
        // High-power PA: duty cycle, hpMax, device sel (SX1262), paLut
        self.command(opcode::SET_PA_CONFIG, &[0x04, 0x07, 0x00, 0x01])?;
        self.set_output_power(params.power_dbm)?;

        SpreadingFactor::new(params.spreading_factor)
            .ok_or(HwError(codes::INVALID_SPREADING_FACTOR))?;
        self.params = *params;
        self.apply_modulation()?;
        self.apply_packet_params(u8::MAX)?;
        self.apply_sync_word()?;
        self.command(opcode::SET_BUFFER_BASE_ADDRESS, &[0x00, 0x00])?;

        let mask = irq::TX_DONE | irq::RX_DONE | irq::CRC_ERR | irq::TIMEOUT;
        let [m_hi, m_lo] = mask.to_be_bytes();
        self.command(
            opcode::SET_DIO_IRQ_PARAMS,
            &[m_hi, m_lo, m_hi, m_lo, 0x00, 0x00, 0x00, 0x00],
        )?;
        self.clear_irq(irq::ALL)
    }

    fn start_transmit(&mut self, payload: &[u8]) -> Result<(), HwError> {
        let len = u8::try_from(payload.len()).map_err(|_| HwError(codes::PACKET_TOO_LONG))?;
        self.standby()?;
        self.apply_packet_params(len)?;

        self.wait_busy()?;
        self.spi
            .transaction(&mut [
                Operation::Write(&[opcode::WRITE_BUFFER, 0x00]),
                Operation::Write(payload),
            ])
            .map_err(|_| HwError(codes::SPI_ERROR))?;

        self.clear_irq(irq::ALL)?;
        self.command(opcode::SET_TX, &TX_NO_TIMEOUT)
    }

    fn finish_transmit(&mut self) -> Result<(), HwError> {
        self.clear_irq(irq::ALL)?;
        self.standby()
    }

    fn start_receive(&mut self) -> Result<(), HwError> {
        self.apply_packet_params(u8::MAX)?;
        self.clear_irq(irq::ALL)?;
        self.command(opcode::SET_RX, &RX_CONTINUOUS)?;
        self.listening = true;
        Ok(())
    }

    fn read_data(&mut self, buf: &mut [u8]) -> Result<usize, HwError> {
        let flags = self.irq_status()?;
        self.clear_irq(irq::ALL)?;
        if flags & irq::CRC_ERR != 0 {
            return Err(HwError(codes::CRC_MISMATCH));
        }
        if flags & irq::RX_DONE == 0 {
            return Err(HwError(codes::NO_PACKET));
        }

        let mut rx_status = [0u8; 2];
        self.read_command(opcode::GET_RX_BUFFER_STATUS, &mut rx_status)?;
        let [len, start] = rx_status;
        let dest = buf
            .get_mut(..usize::from(len))
            .ok_or(HwError(codes::PACKET_TOO_LONG))?;

        self.wait_busy()?;
        self.spi
            .transaction(&mut [
                Operation::Write(&[opcode::READ_BUFFER, start, 0x00]),
                Operation::Read(dest),
            ])
            .map_err(|_| HwError(codes::SPI_ERROR))?;

        let mut pkt_status = [0u8; 3];
        self.read_command(opcode::GET_PACKET_STATUS, &mut pkt_status)?;
        self.last_rssi = -i16::from(pkt_status[0]) / 2;

        Ok(usize::from(len))
    }

    fn rssi(&mut self) -> i16 {
        self.last_rssi
    }

    fn set_output_power(&mut self, dbm: i8) -> Result<(), HwError> {
        OutputPower::from_dbm(dbm).ok_or(HwError(codes::INVALID_OUTPUT_POWER))?;
        self.reconfigure(|chip| chip.write_tx_params(dbm))?;
        self.params.power_dbm = dbm;
        Ok(())
    }

    fn set_frequency(&mut self, mhz: f32) -> Result<(), HwError> {
        let (low, high) = HW_FREQUENCY_RANGE_MHZ;
        if !(low..=high).contains(&mhz) {
            return Err(HwError(codes::INVALID_FREQUENCY));
        }
        self.reconfigure(|chip| {
            chip.calibrate_image(mhz)?;
            chip.write_frequency(mhz)
        })?;
        self.params.frequency_mhz = mhz;
        Ok(())
    }

    fn set_spreading_factor(&mut self, sf: u8) -> Result<(), HwError> {
        SpreadingFactor::new(sf).ok_or(HwError(codes::INVALID_SPREADING_FACTOR))?;
        let previous = self.params.spreading_factor;
        self.params.spreading_factor = sf;
        self.reconfigure(Self::apply_modulation).inspect_err(|_| {
            self.params.spreading_factor = previous;
        })
    }

    fn set_bandwidth(&mut self, khz: f32) -> Result<(), HwError> {
        bandwidth_code(khz).ok_or(HwError(codes::INVALID_BANDWIDTH))?;
        let previous = self.params.bandwidth_khz;
        self.params.bandwidth_khz = khz;
        self.reconfigure(Self::apply_modulation).inspect_err(|_| {
            self.params.bandwidth_khz = previous;
        })
    }
}
