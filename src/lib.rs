#![cfg_attr(not(test), no_std)]

//! A no-std driver for the hx711 load cell amplifier.
//!
//! Raw 24 bit samples are bit-banged out of the chip by [`hx711::Hx711`],
//! optionally summed across two chips by [`hx711::dual::Combined`], smoothed by
//! a [`conditioner::Conditioner`] and finally mapped to grams by a
//! [`calibration::CalibrationModel`]. [`scale::Scale`] wires the last two
//! together behind the [`LoadCell`] trait.

pub mod calibration;
pub mod conditioner;
pub mod error;
pub mod hx711;
pub mod scale;

#[cfg(test)]
pub(crate) mod testing;

pub use calibration::{
    round_to, CalibrationMode, CalibrationModel, CalibrationPoint, CalibrationRecord,
    CalibrationTable,
};
pub use conditioner::{Conditioner, LPF_KERNEL, MAX_SPIKE_SAMPLES};
pub use error::{CalibrationError, Error};
pub use hx711::dual::Combined;
pub use hx711::{Config, Hx711};
pub use scale::{Filter, Scale, ScaleConfig};

/// Anything that yields raw, uncalibrated samples.
///
/// Implemented by a single [`Hx711`] and by a [`Combined`] pair of them.
pub trait RawSource {
    type Error;

    /// Block until one raw sample is available and return it.
    fn read_raw(&mut self) -> Result<i32, Self::Error>;

    /// Power cycle the chip(s) behind this source.
    fn reset(&mut self) -> Result<(), Self::Error>;
}

pub trait LoadCell {
    type Error;

    /// Read the conditioned value from the load cell, before calibration.
    fn read(&mut self) -> Result<f64, Self::Error>;

    /// Read the value after applying offset and scaling.
    fn read_scaled(&mut self) -> Result<f64, Self::Error>;

    /// Zero the load cell offset by averaging `num_samples` readings
    fn tare(&mut self, num_samples: usize) -> Result<(), Self::Error>;

    /// Get the load cell offset.
    fn get_offset(&self) -> f64;

    /// Set the scale (AKA calibrate the scale).
    /// This switches the load cell to a single fixed ratio.
    fn set_scale(&mut self, scale: f64);

    /// Get the scale.
    fn get_scale(&self) -> f64;
}
