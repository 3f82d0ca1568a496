//! A weigh scale: one raw source, its filters and its calibration.

use log::debug;

use crate::calibration::{round_to, CalibrationMode, CalibrationModel};
use crate::conditioner::Conditioner;
use crate::error::Error;
use crate::{LoadCell, RawSource};

/// Which filter [`Scale::read_filtered`] runs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Filter {
    /// Plain mean of that many raw reads.
    Average(usize),
    /// Spike trimmed mean of that many running average values.
    NoSpikes(usize),
    /// Low-pass kernel over the running average.
    LowPass,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScaleConfig {
    pub filter: Filter,
    /// Samples taken by [`Scale::zero`].
    pub tare_samples: usize,
    /// Display resolution for [`Scale::read_rounded`], 0 rounds to whole grams.
    pub resolution: f64,
}

impl Default for ScaleConfig {
    fn default() -> Self {
        Self {
            filter: Filter::LowPass,
            tare_samples: 16,
            resolution: 0.0,
        }
    }
}

pub struct Scale<S> {
    conditioner: Conditioner<S>,
    calibration: CalibrationModel,
    config: ScaleConfig,
}

impl<S> Scale<S> {
    pub fn new(source: S, config: ScaleConfig) -> Self {
        Self::with_calibration(source, config, CalibrationModel::default())
    }

    pub fn with_calibration(source: S, config: ScaleConfig, calibration: CalibrationModel) -> Self {
        Self {
            conditioner: Conditioner::new(source),
            calibration,
            config,
        }
    }

    pub fn config(&self) -> &ScaleConfig {
        &self.config
    }

    pub fn set_filter(&mut self, filter: Filter) {
        self.config.filter = filter;
    }

    pub fn calibration(&self) -> &CalibrationModel {
        &self.calibration
    }

    pub fn calibration_mut(&mut self) -> &mut CalibrationModel {
        &mut self.calibration
    }

    pub fn conditioner(&self) -> &Conditioner<S> {
        &self.conditioner
    }

    pub fn conditioner_mut(&mut self) -> &mut Conditioner<S> {
        &mut self.conditioner
    }

    pub fn release(self) -> S {
        self.conditioner.release()
    }
}

impl<S, E> Scale<S>
where
    S: RawSource<Error = Error<E>>,
{
    /// Power cycle the source and seed the running average, as when the
    /// scale is first switched on.
    pub fn start(&mut self) -> Result<(), Error<E>> {
        self.conditioner.reset()?;
        let seed = self.conditioner.prime()?;
        debug!("scale started, running average = {}", seed);
        Ok(())
    }

    /// Conditioned raw value, according to the configured [`Filter`].
    pub fn read_filtered(&mut self) -> Result<f64, Error<E>> {
        match self.config.filter {
            Filter::Average(n) => self.conditioner.average(n),
            Filter::NoSpikes(n) => self.conditioner.average_no_spikes(n),
            Filter::LowPass => self.conditioner.average_lpf(),
        }
    }

    /// Zero the scale on `n` spike trimmed samples and return the new offset.
    pub fn tare(&mut self, n: usize) -> Result<f64, Error<E>> {
        self.calibration.tare(&mut self.conditioner, n)
    }

    /// [`Scale::tare`] with the configured number of samples.
    pub fn zero(&mut self) -> Result<f64, Error<E>> {
        self.tare(self.config.tare_samples)
    }

    pub fn read_grams(&mut self) -> Result<f64, Error<E>> {
        let value = self.read_filtered()?;
        Ok(self.calibration.to_physical_units(value))
    }

    /// [`Scale::read_grams`] quantized to the configured resolution.
    pub fn read_rounded(&mut self) -> Result<f64, Error<E>> {
        let grams = self.read_grams()?;
        Ok(round_to(grams, self.config.resolution))
    }

    pub fn reset(&mut self) -> Result<(), Error<E>> {
        self.conditioner.reset()
    }
}

impl<S, E> LoadCell for Scale<S>
where
    S: RawSource<Error = Error<E>>,
{
    type Error = Error<E>;

    fn read(&mut self) -> Result<f64, Self::Error> {
        self.read_filtered()
    }

    fn read_scaled(&mut self) -> Result<f64, Self::Error> {
        self.read_grams()
    }

    fn tare(&mut self, num_samples: usize) -> Result<(), Self::Error> {
        Scale::tare(self, num_samples).map(|_| ())
    }

    fn get_offset(&self) -> f64 {
        self.calibration.offset()
    }

    fn set_scale(&mut self, scale: f64) {
        self.calibration.set_ratio(scale);
        self.calibration.set_mode(CalibrationMode::FixedRatio);
    }

    fn get_scale(&self) -> f64 {
        self.calibration.ratio()
    }
}
