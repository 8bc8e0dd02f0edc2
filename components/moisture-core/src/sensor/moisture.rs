use embassy_time::Duration;
use embedded_hal::digital::OutputPin;
use embedded_hal_async::delay::DelayNs;

use crate::config;
use crate::sensor::AnalogInput;

/// Two-point calibration of a resistive moisture sensor.
///
/// A wetter soil conducts better and therefore reads lower, so `dry_raw` is
/// always greater than `wet_raw`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Calibration {
    wet_raw: u16,
    dry_raw: u16,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CalibrationError {
    InvalidOrder,
}

impl Calibration {
    /// 10 bit ADC, sensor straight in water reads ~300, in air 1023.
    pub const ARDUINO_10BIT: Self = Self { wet_raw: 300, dry_raw: 1023 };

    /// 16 bit scaled Pico ADC, 17900 is a slightly overwatered pot.
    pub const PICO_16BIT: Self = Self {
        wet_raw: 17900,
        dry_raw: 65535,
    };

    pub const fn new(wet_raw: u16, dry_raw: u16) -> Result<Self, CalibrationError> {
        if dry_raw <= wet_raw {
            return Err(CalibrationError::InvalidOrder);
        }
        Ok(Self { wet_raw, dry_raw })
    }

    pub const fn wet_raw(&self) -> u16 {
        self.wet_raw
    }

    pub const fn dry_raw(&self) -> u16 {
        self.dry_raw
    }

    pub const fn span(&self) -> u16 {
        self.dry_raw - self.wet_raw
    }

    /// Converts a raw sample into a moisture percentage.
    ///
    /// `wet_raw` maps to 100 and `dry_raw` to 0, rounded half away from zero.
    /// Samples outside the calibrated range are not clamped and yield values
    /// above 100 or below 0.
    pub const fn percent(&self, raw: u16) -> i32 {
        let span = self.span() as i32;
        let numerator = (self.dry_raw as i32 - raw as i32) * 100;
        if numerator >= 0 {
            (2 * numerator + span) / (2 * span)
        } else {
            -((-2 * numerator + span) / (2 * span))
        }
    }
}

impl Default for Calibration {
    fn default() -> Self {
        // build.rs rejects dry <= wet
        Self {
            wet_raw: config::WET_RAW,
            dry_raw: config::DRY_RAW,
        }
    }
}

/// How much water the plant wants, selects the too dry threshold.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Wetness {
    Dry,
    #[default]
    Normal,
    Wet,
}

impl Wetness {
    /// Two pull-down selector switches, the wet switch wins when both are on.
    pub const fn from_switches(dry: bool, wet: bool) -> Self {
        match (dry, wet) {
            (_, true) => Wetness::Wet,
            (true, false) => Wetness::Dry,
            (false, false) => Wetness::Normal,
        }
    }

    pub const fn threshold(&self) -> i32 {
        match self {
            Wetness::Dry => 40,
            Wetness::Normal => 55,
            Wetness::Wet => 70,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Reading {
    pub raw: u16,
    pub percent: i32,
}

impl Reading {
    pub fn is_too_dry(&self, wetness: Wetness) -> bool {
        self.percent < wetness.threshold()
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum MoistureError {
    Power,
    Adc,
}

#[cfg(feature = "defmt")]
impl defmt::Format for MoistureError {
    fn format(&self, f: defmt::Formatter) {
        match self {
            MoistureError::Power => defmt::write!(f, "Power pin error"),
            MoistureError::Adc => defmt::write!(f, "ADC read error"),
        }
    }
}

/// Millisecond count for `DelayNs`, saturating at `u32::MAX`.
pub(crate) fn delay_ms(duration: Duration) -> u32 {
    u32::try_from(duration.as_millis()).unwrap_or(u32::MAX)
}

/// Resistive moisture probe that is only powered while sampling, which slows
/// down electrode corrosion.
pub struct MoistureSensor<Adc: AnalogInput, Power: OutputPin, Delay: DelayNs> {
    adc: Adc,
    power: Power,
    delay: Delay,
    calibration: Calibration,
    settle_time: Duration,
}

impl<Adc: AnalogInput, Power: OutputPin, Delay: DelayNs> MoistureSensor<Adc, Power, Delay> {
    pub fn new(adc: Adc, mut power: Power, delay: Delay, calibration: Calibration, settle_time: Duration) -> Result<Self, MoistureError> {
        power.set_low().map_err(|_| MoistureError::Power)?;
        Ok(Self {
            adc,
            power,
            delay,
            calibration,
            settle_time,
        })
    }

    pub fn calibration(&self) -> Calibration {
        self.calibration
    }

    /// Powers the probe, waits for the output to settle, samples it and
    /// powers it down again. The power is switched off even if the sample fails.
    pub async fn acquire_raw_reading(&mut self) -> Result<u16, MoistureError> {
        self.power.set_high().map_err(|_| MoistureError::Power)?;
        self.delay.delay_ms(delay_ms(self.settle_time)).await;
        let sample = self.adc.read_raw().await;
        let powered_off = self.power.set_low();
        let raw = sample.map_err(|_| {
            error!("Moisture.Adc> read failed");
            MoistureError::Adc
        })?;
        powered_off.map_err(|_| MoistureError::Power)?;
        trace!("Moisture.Raw> {}", raw);
        Ok(raw)
    }

    pub async fn read(&mut self) -> Result<Reading, MoistureError> {
        let raw = self.acquire_raw_reading().await?;
        let percent = self.calibration.percent(raw);
        debug!("Moisture.Reading> raw {} => {}%", raw, percent);
        Ok(Reading { raw, percent })
    }

    pub async fn read_percent(&mut self) -> Result<i32, MoistureError> {
        Ok(self.read().await?.percent)
    }
}
