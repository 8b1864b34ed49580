//! PCA9685 16-channel PWM driver
//!
//! Drives the steering servo and the ESC (or continuous-rotation servo) from
//! one board. Outputs are plain servo pulses: a pulse every `1/f` seconds
//! whose width encodes the position.
//!
//! # Pulse Mapping
//!
//! | Output   | Input range | Pulse (defaults)  |
//! |----------|-------------|-------------------|
//! | Steering | 0..180°     | 750..2250 µs      |
//! | Throttle | -1.0..1.0   | 750..2250 µs      |
//!
//! At 50 Hz one period is 20 ms split into 4096 ticks, so 1500 µs is 307 ticks.

pub mod bus;

use crate::config::ActuatorConfig;
use crate::core::actuator::ActuatorSink;
use crate::core::types::ActuatorSignal;
use crate::error::{Error, Result};
use bus::RegisterBus;
use log::{debug, info, warn};
use std::thread;
use std::time::Duration;

// Registers
const REG_MODE1: u8 = 0x00;
const REG_MODE2: u8 = 0x01;
const REG_LED0_ON_L: u8 = 0x06;
const REG_PRESCALE: u8 = 0xFE;

// MODE1 bits
const MODE1_RESTART: u8 = 0x80;
const MODE1_AUTO_INCREMENT: u8 = 0x20;
const MODE1_SLEEP: u8 = 0x10;

// MODE2 bits
const MODE2_OUTDRV: u8 = 0x04;

/// Internal oscillator frequency
const OSCILLATOR_HZ: f64 = 25_000_000.0;

/// Counter resolution per PWM period
const TICKS_PER_PERIOD: f64 = 4096.0;

/// Oscillator settling time after wake
const WAKE_DELAY: Duration = Duration::from_micros(500);

/// Number of PWM channels
pub const CHANNELS: u8 = 16;

/// Prescale register value for the requested PWM frequency.
///
/// The hardware accepts 3..=255, which is roughly 24 Hz to 1526 Hz.
pub fn prescale_for(frequency_hz: f64) -> Result<u8> {
    if frequency_hz.is_nan() || frequency_hz <= 0.0 {
        return Err(Error::InvalidParameter(format!(
            "PWM frequency must be positive, got {}",
            frequency_hz
        )));
    }
    let prescale = (OSCILLATOR_HZ / (TICKS_PER_PERIOD * frequency_hz)).round() - 1.0;
    if !(3.0..=255.0).contains(&prescale) {
        return Err(Error::InvalidParameter(format!(
            "PWM frequency {} Hz is outside the PCA9685 range",
            frequency_hz
        )));
    }
    Ok(prescale as u8)
}

/// Convert a pulse width to counter ticks at `frequency_hz`
pub fn pulse_to_ticks(pulse_us: f64, frequency_hz: f64) -> u16 {
    let ticks = (pulse_us * frequency_hz * TICKS_PER_PERIOD / 1_000_000.0).round();
    ticks.clamp(0.0, TICKS_PER_PERIOD - 1.0) as u16
}

/// Linear pulse range for one output
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PulseRange {
    pub min_us: f64,
    pub max_us: f64,
}

impl PulseRange {
    pub fn new(min_us: u32, max_us: u32) -> Self {
        Self {
            min_us: f64::from(min_us),
            max_us: f64::from(max_us),
        }
    }

    /// Pulse width for `fraction` of the range (0.0 = min, 1.0 = max)
    pub fn at(&self, fraction: f64) -> f64 {
        self.min_us + fraction.clamp(0.0, 1.0) * (self.max_us - self.min_us)
    }
}

/// The chip itself: prescale setup and per-channel pulse writes
pub struct Pca9685<B: RegisterBus> {
    bus: B,
    frequency_hz: f64,
}

impl<B: RegisterBus> Pca9685<B> {
    /// Initialize the chip for `frequency_hz` output.
    ///
    /// The prescaler can only be written while the oscillator sleeps, so the
    /// sequence is sleep, prescale, wake, then restart with auto-increment.
    pub fn new(mut bus: B, frequency_hz: f64) -> Result<Self> {
        let prescale = prescale_for(frequency_hz)?;
        let init = |bus: &mut B| -> Result<()> {
            bus.write_register(REG_MODE2, MODE2_OUTDRV)?;
            bus.write_register(REG_MODE1, MODE1_SLEEP | MODE1_AUTO_INCREMENT)?;
            bus.write_register(REG_PRESCALE, prescale)?;
            bus.write_register(REG_MODE1, MODE1_AUTO_INCREMENT)?;
            thread::sleep(WAKE_DELAY);
            bus.write_register(REG_MODE1, MODE1_RESTART | MODE1_AUTO_INCREMENT)
        };
        init(&mut bus).map_err(|e| Error::HardwareInit(format!("PCA9685 init: {}", e)))?;

        debug!(
            "PCA9685 initialized: {} Hz (prescale {})",
            frequency_hz, prescale
        );
        Ok(Self { bus, frequency_hz })
    }

    /// Set `channel` to emit pulses of `pulse_us` microseconds
    pub fn set_pulse_us(&mut self, channel: u8, pulse_us: f64) -> Result<()> {
        if channel >= CHANNELS {
            return Err(Error::InvalidParameter(format!(
                "PWM channel {} out of range",
                channel
            )));
        }
        let off = pulse_to_ticks(pulse_us, self.frequency_hz);
        let [off_l, off_h] = off.to_le_bytes();
        self.bus
            .write_block(REG_LED0_ON_L + 4 * channel, &[0, 0, off_l, off_h])
    }

    /// Configured output frequency
    pub fn frequency_hz(&self) -> f64 {
        self.frequency_hz
    }
}

/// Steering servo and throttle on one PCA9685
pub struct Pca9685Actuator<B: RegisterBus> {
    chip: Pca9685<B>,
    steering_channel: u8,
    throttle_channel: u8,
    steering_range: PulseRange,
    throttle_range: PulseRange,
    /// Out-of-travel steering already reported
    range_warned: bool,
}

impl Pca9685Actuator<Box<dyn RegisterBus>> {
    /// Open the configured I2C bus and initialize the board
    pub fn open(config: &ActuatorConfig) -> Result<Self> {
        let bus = bus::open(config.i2c_bus, config.i2c_address)?;
        let actuator = Self::with_bus(bus, config)?;
        info!(
            "PCA9685 ready on i2c-{} at {:#04x} (steering ch {}, throttle ch {})",
            config.i2c_bus, config.i2c_address, config.steering_channel, config.throttle_channel
        );
        Ok(actuator)
    }
}

impl<B: RegisterBus> Pca9685Actuator<B> {
    /// Initialize the board over an already opened bus
    pub fn with_bus(bus: B, config: &ActuatorConfig) -> Result<Self> {
        let chip = Pca9685::new(bus, config.pwm_frequency_hz)?;
        let mut actuator = Self {
            chip,
            steering_channel: config.steering_channel,
            throttle_channel: config.throttle_channel,
            steering_range: PulseRange::new(
                config.steering_min_pulse_us,
                config.steering_max_pulse_us,
            ),
            throttle_range: PulseRange::new(
                config.throttle_min_pulse_us,
                config.throttle_max_pulse_us,
            ),
            range_warned: false,
        };
        actuator.apply(ActuatorSignal::NEUTRAL);
        Ok(actuator)
    }

    /// Pulse width for a steering angle; angles beyond the servo's travel are clamped
    pub fn steering_pulse_us(&self, angle_degrees: f64) -> f64 {
        self.steering_range.at(angle_degrees / 180.0)
    }

    /// Pulse width for a throttle value in -1.0..1.0
    pub fn throttle_pulse_us(&self, value: f64) -> f64 {
        self.throttle_range.at((value + 1.0) / 2.0)
    }

    fn write(&mut self, channel: u8, pulse_us: f64, what: &str) {
        if let Err(e) = self.chip.set_pulse_us(channel, pulse_us) {
            warn!("Failed to set {} (ch {}): {}", what, channel, e);
        }
    }
}

impl<B: RegisterBus> ActuatorSink for Pca9685Actuator<B> {
    fn set_steering(&mut self, angle_degrees: f64) {
        if !(0.0..=180.0).contains(&angle_degrees) && !self.range_warned {
            warn!(
                "Steering angle {:.1}° beyond servo travel, clamping to 0..180",
                angle_degrees
            );
            self.range_warned = true;
        }
        let pulse = self.steering_pulse_us(angle_degrees);
        self.write(self.steering_channel, pulse, "steering");
    }

    fn set_throttle(&mut self, value: f64) {
        let pulse = self.throttle_pulse_us(value);
        self.write(self.throttle_channel, pulse, "throttle");
    }

    fn name(&self) -> &'static str {
        "pca9685"
    }
}

impl<B: RegisterBus> Drop for Pca9685Actuator<B> {
    fn drop(&mut self) {
        debug!("PCA9685: returning outputs to neutral");
        self.apply(ActuatorSignal::NEUTRAL);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use parking_lot::Mutex;
    use std::sync::Arc;

    /// Records every register write as (register, bytes)
    #[derive(Clone, Default)]
    struct RecordingBus {
        writes: Arc<Mutex<Vec<(u8, Vec<u8>)>>>,
    }

    impl RegisterBus for RecordingBus {
        fn write_register(&mut self, register: u8, value: u8) -> Result<()> {
            self.writes.lock().push((register, vec![value]));
            Ok(())
        }

        fn write_block(&mut self, register: u8, data: &[u8]) -> Result<()> {
            self.writes.lock().push((register, data.to_vec()));
            Ok(())
        }
    }

    struct FailingBus;

    impl RegisterBus for FailingBus {
        fn write_register(&mut self, _register: u8, _value: u8) -> Result<()> {
            Err(Error::Other("NACK".to_string()))
        }

        fn write_block(&mut self, _register: u8, _data: &[u8]) -> Result<()> {
            Err(Error::Other("NACK".to_string()))
        }
    }

    fn off_ticks(data: &[u8]) -> u16 {
        u16::from_le_bytes([data[2], data[3]])
    }

    #[test]
    fn test_prescale_at_50hz() {
        assert_eq!(prescale_for(50.0).unwrap(), 121);
        assert!(prescale_for(0.0).is_err());
        assert!(prescale_for(5000.0).is_err());
    }

    #[test]
    fn test_pulse_to_ticks() {
        assert_eq!(pulse_to_ticks(1500.0, 50.0), 307);
        assert_eq!(pulse_to_ticks(0.0, 50.0), 0);
        assert_eq!(pulse_to_ticks(50_000.0, 50.0), 4095);
    }

    #[test]
    fn test_init_sequence() {
        let bus = RecordingBus::default();
        let writes = Arc::clone(&bus.writes);
        Pca9685::new(bus, 50.0).unwrap();

        let log = writes.lock();
        let regs: Vec<u8> = log.iter().map(|(r, _)| *r).collect();
        assert_eq!(
            regs,
            vec![REG_MODE2, REG_MODE1, REG_PRESCALE, REG_MODE1, REG_MODE1]
        );
        assert_eq!(log[1].1, vec![MODE1_SLEEP | MODE1_AUTO_INCREMENT]);
        assert_eq!(log[2].1, vec![121]);
        assert_eq!(log[4].1, vec![MODE1_RESTART | MODE1_AUTO_INCREMENT]);
    }

    #[test]
    fn test_pulse_mapping() {
        let actuator = Pca9685Actuator::with_bus(RecordingBus::default(), &ActuatorConfig::default())
            .unwrap();
        assert_relative_eq!(actuator.steering_pulse_us(0.0), 750.0);
        assert_relative_eq!(actuator.steering_pulse_us(90.0), 1500.0);
        assert_relative_eq!(actuator.steering_pulse_us(180.0), 2250.0);
        assert_relative_eq!(actuator.steering_pulse_us(-270.0), 750.0);
        assert_relative_eq!(actuator.throttle_pulse_us(-1.0), 750.0);
        assert_relative_eq!(actuator.throttle_pulse_us(0.0), 1500.0);
        assert_relative_eq!(actuator.throttle_pulse_us(1.0), 2250.0);
    }

    #[test]
    fn test_channels_and_neutral() {
        let bus = RecordingBus::default();
        let writes = Arc::clone(&bus.writes);
        let config = ActuatorConfig::default();
        let mut actuator = Pca9685Actuator::with_bus(bus, &config).unwrap();

        writes.lock().clear();
        actuator.set_steering(90.0);
        actuator.set_throttle(1.0);
        {
            let log = writes.lock();
            assert_eq!(log[0].0, REG_LED0_ON_L);
            assert_eq!(off_ticks(&log[0].1), 307);
            assert_eq!(log[1].0, REG_LED0_ON_L + 4);
            assert_eq!(off_ticks(&log[1].1), pulse_to_ticks(2250.0, 50.0));
        }

        writes.lock().clear();
        drop(actuator);
        let log = writes.lock();
        assert_eq!(log.len(), 2);
        assert!(log.iter().all(|(_, data)| off_ticks(data) == 307));
    }

    #[test]
    fn test_init_failure_is_hardware_init() {
        let err = Pca9685::new(FailingBus, 50.0).err().unwrap();
        assert!(matches!(err, Error::HardwareInit(_)));
    }

    #[test]
    fn test_invalid_channel() {
        let mut chip = Pca9685::new(RecordingBus::default(), 50.0).unwrap();
        assert!(chip.set_pulse_us(CHANNELS, 1500.0).is_err());
    }
}
