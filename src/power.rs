//! Battery monitoring
//!
//! The battery is sensed through a resistor divider on an ADC input. The
//! heartbeat reports a smoothed charge level in percent.

use crate::config::battery;

/// Full-scale count of the 12-bit ADC
const ADC_FULL_SCALE: f32 = 4095.0;

/// Per-cell voltage treated as empty
const CELL_EMPTY_V: f32 = 3.0;

/// Per-cell voltage treated as full
const CELL_FULL_V: f32 = 4.2;

/// Per-cell voltage below which the battery is low
const CELL_LOW_V: f32 = 3.3;

/// Battery voltage reading
#[derive(Clone, Copy, Debug)]
pub struct BatteryVoltage {
    /// Raw ADC reading (12-bit)
    raw: u16,
    /// Voltage divider ratio
    divider_ratio: f32,
    /// Reference voltage
    vref: f32,
}

impl BatteryVoltage {
    /// Create from ADC reading
    #[must_use]
    pub const fn from_adc(raw: u16, divider_ratio: f32, vref: f32) -> Self {
        Self {
            raw,
            divider_ratio,
            vref,
        }
    }

    /// Create from a reading of the board's battery sense input
    #[must_use]
    pub const fn from_sense(raw: u16) -> Self {
        Self::from_adc(raw, battery::DIVIDER_RATIO, battery::VREF)
    }

    /// Get voltage in volts
    #[must_use]
    pub fn voltage(&self) -> f32 {
        (f32::from(self.raw) / ADC_FULL_SCALE) * self.vref * self.divider_ratio
    }

    /// Charge level in percent (`LiPo` 3.0-4.2V per cell, linear)
    #[must_use]
    pub fn level(&self, cells: u8) -> f32 {
        let v_per_cell = self.voltage() / f32::from(cells.max(1));
        let fraction = (v_per_cell - CELL_EMPTY_V) / (CELL_FULL_V - CELL_EMPTY_V);
        fraction.clamp(0.0, 1.0) * 100.0
    }

    /// Check if battery is low
    #[must_use]
    pub fn is_low(&self, cells: u8) -> bool {
        self.voltage() / f32::from(cells.max(1)) < CELL_LOW_V
    }
}

#[cfg(feature = "embedded")]
impl defmt::Format for BatteryVoltage {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "{}V", self.voltage());
    }
}

/// Smoothed battery level fed by periodic ADC samples
#[derive(Clone, Copy, Debug)]
pub struct BatteryMonitor {
    cells: u8,
    alpha: f32,
    level: Option<f32>,
    low: bool,
}

impl BatteryMonitor {
    /// Weight of a new sample in the moving average
    pub const DEFAULT_ALPHA: f32 = 0.25;

    /// Monitor for a pack of `cells` cells in series
    #[must_use]
    pub const fn new(cells: u8) -> Self {
        Self {
            cells,
            alpha: Self::DEFAULT_ALPHA,
            level: None,
            low: false,
        }
    }

    /// Feed one reading, returns the smoothed level in percent
    ///
    /// The first reading is taken as-is.
    pub fn update(&mut self, reading: BatteryVoltage) -> f32 {
        let sample = reading.level(self.cells);
        let level = match self.level {
            Some(previous) => previous + self.alpha * (sample - previous),
            None => sample,
        };
        self.level = Some(level);

        let low = reading.is_low(self.cells);
        if low && !self.low {
            warn!("Battery low: {} V", reading.voltage());
        }
        self.low = low;
        level
    }

    /// Last smoothed level, 0 before the first reading
    #[must_use]
    pub fn level(&self) -> f32 {
        self.level.unwrap_or(0.0)
    }

    /// Whether the last reading was below the low threshold
    #[must_use]
    pub const fn is_low(&self) -> bool {
        self.low
    }
}

impl Default for BatteryMonitor {
    fn default() -> Self {
        Self::new(battery::CELLS)
    }
}
