use crate::config::{CalibrationFactors, DeviceConfig, LineFrequency, UpdateRate};
use crate::protocol;
use crate::register::{Register, MODE_AC_FREQ_SEL, MODE_RMS_UPDATE_SEL};
use embedded_hal::delay::DelayNs;
use embedded_hal::spi::{Operation, SpiDevice};

const POWER_UP_DELAY_MS: u32 = 100;
const BUS_SETTLE_DELAY_MS: u32 = 200;
const RESET_SETTLE_DELAY_MS: u32 = 500;

// Fixed conversion divisors from the BL0940 datasheet formulas.
const VRMS_DIVISOR: f64 = 79931.0;
const IRMS_DIVISOR: f64 = 324_004.0;
const WATT_DIVISOR: f64 = 4046.0;
const CF_PULSE_SCALE: f64 = 1638.4 * 256.0;
const JOULES_PER_KWH: f64 = 3_600_000.0;

#[derive(Copy, Clone, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Bl0940Error<SPI> {
    /// The liveness probe during initialization failed.
    Connect,
    /// The underlying bus transfer failed.
    Spi(SPI),
    /// A register read kept failing checksum verification after all retries.
    Checksum,
    /// A configuration with a non-positive resistance or voltage reference
    /// was rejected.
    InvalidConfig,
}

/// Driver for the BL0940 single-phase energy metering IC.
///
/// The device must be wired for SPI mode (SEL line high) and the `SpiDevice`
/// configured for MODE 0, MSB first, at no more than 400 kHz. Each register
/// exchange runs as one exclusive bus transaction, so sharing the bus with
/// other devices between transactions is fine.
pub struct Bl0940Driver<SPI, Delay> {
    spi: SPI,
    delay: Delay,
    config: DeviceConfig,
    calibration: CalibrationFactors,
    line_frequency: LineFrequency,
    update_rate: UpdateRate,
}

impl<SPI, Delay> Bl0940Driver<SPI, Delay>
where
    SPI: SpiDevice,
    Delay: DelayNs,
{
    /// Creates a driver with the default analog front-end configuration and
    /// unity calibration. The device is not touched until [`Self::init`].
    ///
    /// # Arguments
    ///
    /// * `spi`: The spi device.
    /// * `delay`: The delay provider used for settle and retry timing.
    pub fn new(spi: SPI, delay: Delay) -> Self {
        Self {
            spi,
            delay,
            config: DeviceConfig::default(),
            calibration: CalibrationFactors::default(),
            line_frequency: LineFrequency::F60Hz,
            update_rate: UpdateRate::Fast,
        }
    }

    /// Waits for the device to come up, soft-resets it and probes the RMS
    /// voltage register to confirm it responds.
    pub fn init(&mut self) -> Result<(), Bl0940Error<SPI::Error>> {
        self.delay.delay_ms(POWER_UP_DELAY_MS);
        self.delay.delay_ms(BUS_SETTLE_DELAY_MS);

        self.reset()?;

        self.read_register(Register::VRms)
            .map_err(|err| match err {
                Bl0940Error::Checksum => Bl0940Error::Connect,
                other => other,
            })?;

        Ok(())
    }

    /// Soft-resets the device and waits out its recovery time. The protocol
    /// carries no acknowledgement for this, so success only means the frame
    /// was sent.
    pub fn reset(&mut self) -> Result<(), Bl0940Error<SPI::Error>> {
        self.write_register(Register::SoftReset, protocol::SOFT_RESET_MAGIC)?;
        self.delay.delay_ms(RESET_SETTLE_DELAY_MS);
        Ok(())
    }

    /// RMS voltage in volts.
    pub fn get_voltage(&mut self) -> Result<f32, Bl0940Error<SPI::Error>> {
        let raw = self.read_register(Register::VRms)? as f64;
        let c = &self.config;
        let volts =
            raw * c.vref as f64 * c.divider_sum() / (VRMS_DIVISOR * c.sense_divider as f64);
        Ok(volts as f32)
    }

    /// RMS current in amperes, scaled by the current calibration factor.
    pub fn get_current(&mut self) -> Result<f32, Bl0940Error<SPI::Error>> {
        let raw = self.read_register(Register::IRms)? as f64;
        let c = &self.config;
        let amps = raw * c.vref as f64 * c.sense_total as f64
            / (IRMS_DIVISOR * c.shunt as f64 * 1000.0);
        Ok(amps as f32 * self.calibration.current)
    }

    /// Active power in watts, scaled by the power calibration factor.
    ///
    /// The register is signed; the sign only encodes power flow direction, so
    /// the magnitude is reported.
    pub fn get_active_power(&mut self) -> Result<f32, Bl0940Error<SPI::Error>> {
        let raw = magnitude_24(self.read_register(Register::Watt)?) as f64;
        let c = &self.config;
        let vref = c.vref as f64;
        let watts = raw * vref * vref * c.divider_sum()
            / (WATT_DIVISOR * (c.shunt as f64 * 1000.0 / c.sense_total as f64)
                * c.sense_divider as f64);
        Ok(watts as f32 * self.calibration.power)
    }

    /// Accumulated active energy in kWh, from the energy pulse counter.
    /// Magnitude only, like [`Self::get_active_power`].
    pub fn get_active_energy(&mut self) -> Result<f32, Bl0940Error<SPI::Error>> {
        let raw = magnitude_24(self.read_register(Register::CfCnt)?) as f64;
        let c = &self.config;
        let vref = c.vref as f64;
        let kwh = raw * CF_PULSE_SCALE * vref * vref * c.divider_sum()
            / (JOULES_PER_KWH
                * WATT_DIVISOR
                * (c.shunt as f64 * 1000.0 / c.sense_total as f64)
                * c.sense_divider as f64);
        Ok(kwh as f32)
    }

    /// Power factor as a percentage in `[0, 100]`, derived from the measured
    /// voltage/current phase angle and the configured line frequency.
    pub fn get_power_factor(&mut self) -> Result<f32, Bl0940Error<SPI::Error>> {
        let raw = self.read_register(Register::Corner)? as f64;
        let angle =
            2.0 * core::f64::consts::PI * raw * self.line_frequency.hertz() / 1_000_000.0;
        Ok((libm::fabs(libm::cos(angle)) * 100.0) as f32)
    }

    /// Die temperature in degrees Celsius, from the internal sensor.
    pub fn get_temperature(&mut self) -> Result<f32, Bl0940Error<SPI::Error>> {
        let raw = self.read_register(Register::Tps1)?;
        // The sensor value is a signed field in the low bits of the register.
        let t = ((raw << 6) as u16 as i16) / 64;
        let celsius = (170.0 / 448.0) * (t as f64 / 2.0 - 32.0) - 45.0;
        Ok(celsius as f32)
    }

    /// Selects the AC mains frequency via a read-modify-write of the MODE
    /// register and caches it for the power-factor conversion.
    pub fn set_line_frequency(
        &mut self,
        frequency: LineFrequency,
    ) -> Result<(), Bl0940Error<SPI::Error>> {
        let mode = self.read_register(Register::Mode)?;
        let mode = match frequency {
            LineFrequency::F50Hz => mode & !MODE_AC_FREQ_SEL,
            LineFrequency::F60Hz => mode | MODE_AC_FREQ_SEL,
        };
        self.write_register(Register::Mode, mode)?;
        self.line_frequency = frequency;
        Ok(())
    }

    /// Selects the RMS register refresh interval via a read-modify-write of
    /// the MODE register. Does not affect any conversion.
    pub fn set_update_rate(&mut self, rate: UpdateRate) -> Result<(), Bl0940Error<SPI::Error>> {
        let mode = self.read_register(Register::Mode)?;
        let mode = match rate {
            UpdateRate::Fast => mode & !MODE_RMS_UPDATE_SEL,
            UpdateRate::Slow => mode | MODE_RMS_UPDATE_SEL,
        };
        self.write_register(Register::Mode, mode)?;
        self.update_rate = rate;
        Ok(())
    }

    /// Replaces the analog front-end constants. May be called before or after
    /// [`Self::init`]; later conversions use the new values.
    pub fn set_config(&mut self, config: DeviceConfig) -> Result<(), Bl0940Error<SPI::Error>> {
        if !config.is_valid() {
            return Err(Bl0940Error::InvalidConfig);
        }
        self.config = config;
        Ok(())
    }

    /// The analog front-end constants currently in effect.
    pub fn config(&self) -> DeviceConfig {
        self.config
    }

    /// The calibration factors currently in effect.
    pub fn calibration(&self) -> CalibrationFactors {
        self.calibration
    }

    /// The cached line frequency, as last applied via
    /// [`Self::set_line_frequency`].
    pub fn line_frequency(&self) -> LineFrequency {
        self.line_frequency
    }

    /// The cached RMS refresh interval, as last applied via
    /// [`Self::set_update_rate`].
    pub fn update_rate(&self) -> UpdateRate {
        self.update_rate
    }

    /// Sets the multiplier applied to RMS current readings.
    pub fn set_current_calibration(&mut self, factor: f32) {
        self.calibration.current = factor;
    }

    /// Sets the multiplier applied to active power readings.
    pub fn set_power_calibration(&mut self, factor: f32) {
        self.calibration.power = factor;
    }

    /// Writes a 24-bit value to a register. The protocol has no write
    /// acknowledgement; an `Ok` only means the frame went out on the bus.
    pub fn write_register(
        &mut self,
        register: Register,
        value: u32,
    ) -> Result<(), Bl0940Error<SPI::Error>> {
        let frame = protocol::write_frame(register as u8, value);
        self.spi.write(&frame).map_err(Bl0940Error::Spi)
    }

    /// Reads a 24-bit register value, retrying on checksum mismatch. Each
    /// attempt is its own bus transaction: command and address out, a settle
    /// pause while the half-duplex link turns around, then the three data
    /// bytes and the checksum clocked out with filler bytes.
    pub fn read_register(&mut self, register: Register) -> Result<u32, Bl0940Error<SPI::Error>> {
        let address = register as u8;

        for attempt in 0..protocol::READ_ATTEMPTS {
            if attempt > 0 {
                self.delay.delay_us(protocol::RETRY_BACKOFF_US);
            }

            let mut response = [0u8; 4];
            self.spi
                .transaction(&mut [
                    Operation::Write(&[protocol::READ_COMMAND, address]),
                    Operation::DelayNs(protocol::READ_SETTLE_US * 1_000),
                    Operation::Transfer(&mut response, &protocol::READ_FILLER),
                ])
                .map_err(Bl0940Error::Spi)?;

            if let Some(value) = protocol::decode_read(address, &response) {
                return Ok(value);
            }
        }

        Err(Bl0940Error::Checksum)
    }
}

/// Sign-extends a 24-bit two's-complement register value and takes its
/// magnitude.
fn magnitude_24(raw: u32) -> u32 {
    (((raw << 8) as i32) >> 8).unsigned_abs()
}

#[cfg(feature = "std")]
impl<SPI> std::fmt::Display for Bl0940Error<SPI>
where
    SPI: std::fmt::Debug,
{
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Bl0940Error::Spi(spi) => write!(f, "SPI Error: {spi:?}"),
            Bl0940Error::Checksum => write!(f, "Checksum mismatch after all read attempts"),
            Bl0940Error::Connect => write!(f, "Unable to connect to BL0940"),
            Bl0940Error::InvalidConfig => write!(f, "Invalid device configuration"),
        }
    }
}

#[cfg(feature = "std")]
impl<SPI> std::error::Error for Bl0940Error<SPI>
where
    SPI: std::fmt::Debug,
{
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        None
    }
}
