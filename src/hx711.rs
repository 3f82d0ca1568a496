use core::sync::atomic::{AtomicBool, Ordering};

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{InputPin, OutputPin};
use log::{debug, trace, warn};

use crate::error::Error;
use crate::RawSource;

pub mod dual;

pub const HX711_MINIMUM: i32 = -(1 << 23);
pub const HX711_MAXIMUM: i32 = (1 << 23) - 1;

const HX711_DATA_BITS: u32 = 24;
// 1 extra pulse selects channel A, gain 128 for the next conversion
const HX711_GAIN_PULSES: u32 = 1;
const HX711_SIGN_BIT: u32 = 0x80_0000;
const HX711_DATA_MASK: u32 = 0xFF_FFFF;

/// Timing of the clock/data handshake.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Config {
    /// Half period of a clock pulse.
    pub pulse_delay_us: u32,
    /// Hold time after power sequencing.
    pub settle_us: u32,
    /// Sleep between two polls of the data line while the chip is busy.
    pub poll_interval_us: u32,
    /// Give up waiting for the chip after this long. `None` waits forever.
    pub ready_timeout_us: Option<u32>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            pulse_delay_us: 1,
            settle_us: 1_000,
            poll_interval_us: 100,
            ready_timeout_us: Some(1_000_000),
        }
    }
}

impl Config {
    /// Wait for the chip without any bound, like the chip's own datasheet loop.
    pub const fn blocking() -> Self {
        Self {
            pulse_delay_us: 1,
            settle_us: 1_000,
            poll_interval_us: 100,
            ready_timeout_us: None,
        }
    }

    pub const fn with_timeout(mut self, timeout_us: u32) -> Self {
        self.ready_timeout_us = Some(timeout_us);
        self
    }
}

/// Convert a 24 bit word as clocked out of the chip into a signed sample.
///
/// Bit 23 is inverted, then the result is sign extended from bit 23.
/// Bits above 23 are ignored.
pub fn decode(wire: u32) -> i32 {
    let value = (wire & HX711_DATA_MASK) ^ HX711_SIGN_BIT;
    ((value << 8) as i32) >> 8
}

/// Inverse of [`decode`]. Only the low 24 bits of `sample` are kept.
pub fn encode(sample: i32) -> u32 {
    (sample as u32 & HX711_DATA_MASK) ^ HX711_SIGN_BIT
}

/// One hx711 chip on a dedicated clock (PD_SCK) and data (DOUT) line.
pub struct Hx711<SCK, DT, D> {
    sck_pin: SCK,
    dt_pin: DT,
    delay: D,
    config: Config,
    last_reading: i32,
}

impl<SCK, DT, D, E> Hx711<SCK, DT, D>
where
    SCK: OutputPin<Error = E>,
    DT: InputPin<Error = E>,
    D: DelayNs,
{
    /// The lines must already be configured as output (clock) and input (data).
    pub fn new(sck_pin: SCK, dt_pin: DT, delay: D, config: Config) -> Self {
        Self {
            sck_pin,
            dt_pin,
            delay,
            config,
            last_reading: 0,
        }
    }

    /// Give the lines and the delay back.
    pub fn release(self) -> (SCK, DT, D) {
        (self.sck_pin, self.dt_pin, self.delay)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn is_ready(&mut self) -> Result<bool, Error<E>> {
        // if the dt pin is low, device is ready for read
        self.dt_pin.is_low().map_err(Error::Pin)
    }

    /// Wait for the chip and clock out one sample.
    pub fn read(&mut self) -> Result<i32, Error<E>> {
        self.wait_ready(None)?;
        self.shift_in()
    }

    /// Like [`Hx711::read`], but gives up with [`Error::Cancelled`] once `cancel`
    /// is set. The flag is checked before every poll of the data line.
    pub fn read_cancellable(&mut self, cancel: &AtomicBool) -> Result<i32, Error<E>> {
        self.wait_ready(Some(cancel))?;
        self.shift_in()
    }

    pub fn last_raw(&self) -> i32 {
        self.last_reading
    }

    /// Put the chip to sleep. The clock must stay high for it to stay asleep.
    pub fn power_down(&mut self) -> Result<(), Error<E>> {
        self.sck_pin.set_low().map_err(Error::Pin)?;
        self.sck_pin.set_high().map_err(Error::Pin)?;
        self.delay.delay_us(self.config.settle_us);
        debug!("hx711 powered down");
        Ok(())
    }

    pub fn power_up(&mut self) -> Result<(), Error<E>> {
        self.sck_pin.set_low().map_err(Error::Pin)?;
        self.delay.delay_us(self.config.settle_us);
        debug!("hx711 powered up");
        Ok(())
    }

    /// Power cycle the chip. The gain falls back to channel A, 128.
    pub fn reset(&mut self) -> Result<(), Error<E>> {
        self.power_down()?;
        self.power_up()
    }

    fn wait_ready(&mut self, cancel: Option<&AtomicBool>) -> Result<(), Error<E>> {
        let mut waited_us: u32 = 0;
        while self.dt_pin.is_high().map_err(Error::Pin)? {
            if cancel.is_some_and(|flag| flag.load(Ordering::Relaxed)) {
                return Err(Error::Cancelled);
            }
            if let Some(limit) = self.config.ready_timeout_us {
                if waited_us >= limit {
                    warn!("hx711 not ready after {} us", waited_us);
                    return Err(Error::HardwareTimeout { waited_us });
                }
            }
            self.delay.delay_us(self.config.poll_interval_us);
            // a poll never counts as less than a microsecond, so the bound is reached
            waited_us = waited_us.saturating_add(self.config.poll_interval_us.max(1));
        }
        Ok(())
    }

    fn shift_in(&mut self) -> Result<i32, Error<E>> {
        // keep the clock high phases short, the chip sleeps after 60 us of high clock
        let wire = critical_section::with(|_| -> Result<u32, E> {
            let mut value: u32 = 0;
            for _ in 0..HX711_DATA_BITS {
                self.toggle_sck_bit()?;
                // bits arrive MSB first, valid after the falling edge
                value = (value << 1) | u32::from(self.dt_pin.is_high()?);
            }
            for _ in 0..HX711_GAIN_PULSES {
                self.toggle_sck_bit()?;
            }
            Ok(value)
        })
        .map_err(Error::Pin)?;

        let signed = decode(wire);
        trace!("hx711 wire = {:#08x} raw = {}", wire, signed);
        self.last_reading = signed;
        Ok(signed)
    }

    fn toggle_sck_bit(&mut self) -> Result<(), E> {
        self.sck_pin.set_high()?;
        self.delay.delay_us(self.config.pulse_delay_us);
        self.sck_pin.set_low()?;
        self.delay.delay_us(self.config.pulse_delay_us);
        Ok(())
    }
}

impl<SCK, DT, D, E> RawSource for Hx711<SCK, DT, D>
where
    SCK: OutputPin<Error = E>,
    DT: InputPin<Error = E>,
    D: DelayNs,
{
    type Error = Error<E>;

    fn read_raw(&mut self) -> Result<i32, Self::Error> {
        self.read()
    }

    fn reset(&mut self) -> Result<(), Self::Error> {
        Hx711::reset(self)
    }
}
