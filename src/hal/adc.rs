//! ADC Driver
//!
//! Battery sense input on ADC1. Readings are taken on demand by the
//! heartbeat and converted through the divider in [`crate::power`].

use embassy_stm32::adc::{Adc, AdcChannel, AnyAdcChannel, SampleTime};
use embassy_stm32::peripherals::ADC1;

use crate::power::BatteryVoltage;

/// ADC reading result
#[derive(Clone, Copy, Debug)]
pub struct AdcReading {
    /// Raw 12-bit ADC value (0-4095)
    raw: u16,
}

impl AdcReading {
    /// Create a new ADC reading from raw value
    #[must_use]
    pub const fn from_raw(raw: u16) -> Self {
        Self { raw }
    }

    /// Get the raw 12-bit value
    #[must_use]
    pub const fn raw(self) -> u16 {
        self.raw
    }
}

impl defmt::Format for AdcReading {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "ADC({})", self.raw);
    }
}

/// Battery sense ADC
pub struct BatterySense<'d> {
    adc: Adc<'d, ADC1>,
    channel: AnyAdcChannel<ADC1>,
}

impl<'d> BatterySense<'d> {
    /// Create the battery sense driver on `pin`
    #[must_use]
    pub fn new(adc: ADC1, pin: impl AdcChannel<ADC1>) -> Self {
        let mut adc = Adc::new(adc);
        // Divider source impedance is high, sample slowly
        adc.set_sample_time(SampleTime::CYCLES247_5);
        Self {
            adc,
            channel: pin.degrade_adc(),
        }
    }

    /// Read the raw divider voltage
    pub fn read_raw(&mut self) -> AdcReading {
        AdcReading::from_raw(self.adc.blocking_read(&mut self.channel))
    }

    /// Read the battery voltage
    pub fn read(&mut self) -> BatteryVoltage {
        BatteryVoltage::from_sense(self.read_raw().raw())
    }
}
