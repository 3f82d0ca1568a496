//! Noise reduction on top of a [`RawSource`].
//!
//! Every filter except [`Conditioner::average`] works on the running average,
//! an exponential average with decay ½ that is updated once per raw sample:
//!
//! ```text
//! running = (running + latest) / 2
//! ```
//!
//! The accumulator lives as long as the conditioner. It is only seeded by
//! [`Conditioner::prime`], [`Conditioner::set_running_average`] or a tare.
//! A filter that fails part way leaves the accumulator as it was before the call.

use heapless::Vec;
use log::debug;

use crate::error::Error;
use crate::RawSource;

/// Default 9 tap low-pass kernel, a smooth symmetric window.
pub const LPF_KERNEL: [u32; 9] = [1, 2, 4, 8, 16, 8, 4, 2, 1];

const LPF_NORM: u32 = match kernel_norm(&LPF_KERNEL) {
    Some(norm) => norm,
    None => panic!("default kernel has no weight"),
};

/// Largest sample count [`Conditioner::average_no_spikes`] can buffer.
pub const MAX_SPIKE_SAMPLES: usize = 64;

// a fifth of the samples is cut from each end
const SPIKE_FRACTION: usize = 5;

/// Number of samples dropped from each end of a sorted run of `n`.
pub const fn trim_count(n: usize) -> usize {
    n / SPIKE_FRACTION
}

/// Sum of the kernel weights, `None` if it is 0 or does not fit a `u32`.
pub const fn kernel_norm(kernel: &[u32]) -> Option<u32> {
    let mut norm: u32 = 0;
    let mut i = 0;
    while i < kernel.len() {
        norm = match norm.checked_add(kernel[i]) {
            Some(norm) => norm,
            None => return None,
        };
        i += 1;
    }
    if norm == 0 {
        None
    } else {
        Some(norm)
    }
}

/// Mean of `values` after sorting them and dropping [`trim_count`] values
/// from each end. `None` if nothing is left.
pub fn trimmed_mean(values: &mut [f64]) -> Option<f64> {
    let cut = trim_count(values.len());
    values.sort_unstable_by(f64::total_cmp);
    let kept = &values[cut..values.len() - cut];
    if kept.is_empty() {
        return None;
    }
    Some(kept.iter().sum::<f64>() / kept.len() as f64)
}

pub struct Conditioner<S> {
    source: S,
    running: f64,
    kernel: &'static [u32],
    norm: u32,
}

impl<S> Conditioner<S> {
    /// The running average starts at 0.
    pub fn new(source: S) -> Self {
        Self {
            source,
            running: 0.0,
            kernel: &LPF_KERNEL,
            norm: LPF_NORM,
        }
    }

    pub fn running_average(&self) -> f64 {
        self.running
    }

    pub fn set_running_average(&mut self, value: f64) {
        self.running = value;
    }

    pub fn kernel(&self) -> &'static [u32] {
        self.kernel
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }

    pub fn release(self) -> S {
        self.source
    }
}

impl<S, E> Conditioner<S>
where
    S: RawSource<Error = Error<E>>,
{
    /// Use another low-pass kernel. One sample is read per weight.
    pub fn set_kernel(&mut self, kernel: &'static [u32]) -> Result<(), Error<E>> {
        self.norm = kernel_norm(kernel).ok_or(Error::InvalidKernel)?;
        self.kernel = kernel;
        Ok(())
    }

    /// Seed the running average with a single raw read.
    pub fn prime(&mut self) -> Result<f64, Error<E>> {
        self.running = f64::from(self.source.read_raw()?);
        Ok(self.running)
    }

    /// Read one raw sample and fold it into the running average.
    pub fn read_running_average(&mut self) -> Result<f64, Error<E>> {
        let latest = self.source.read_raw()?;
        self.running = (self.running + f64::from(latest)) / 2.0;
        Ok(self.running)
    }

    /// Plain mean of `n` raw reads. The running average is left untouched.
    pub fn average(&mut self, n: usize) -> Result<f64, Error<E>> {
        if n == 0 {
            return Err(Error::InsufficientSamples {
                requested: n,
                required: 1,
            });
        }
        let mut sum = 0.0;
        for _ in 0..n {
            sum += f64::from(self.source.read_raw()?);
        }
        Ok(sum / n as f64)
    }

    /// Mean of `n` running average values with the lowest and highest fifth
    /// discarded. Below 5 samples nothing is discarded.
    pub fn average_no_spikes(&mut self, n: usize) -> Result<f64, Error<E>> {
        if n > MAX_SPIKE_SAMPLES {
            return Err(Error::TooManySamples {
                requested: n,
                capacity: MAX_SPIKE_SAMPLES,
            });
        }
        self.keep_running_on_error(|this| {
            let mut values: Vec<f64, MAX_SPIKE_SAMPLES> = Vec::new();
            for _ in 0..n {
                let value = this.read_running_average()?;
                values.push(value).map_err(|_| Error::TooManySamples {
                    requested: n,
                    capacity: MAX_SPIKE_SAMPLES,
                })?;
            }
            trimmed_mean(&mut values).ok_or(Error::InsufficientSamples {
                requested: n,
                required: 1,
            })
        })
    }

    /// Weighted mean of one running average value per kernel tap.
    pub fn average_lpf(&mut self) -> Result<f64, Error<E>> {
        self.keep_running_on_error(|this| {
            let mut acc = 0.0;
            for &weight in this.kernel {
                acc += f64::from(weight) * this.read_running_average()?;
            }
            Ok(acc / f64::from(this.norm))
        })
    }

    /// Power cycle the source. The running average is kept.
    pub fn reset(&mut self) -> Result<(), Error<E>> {
        debug!("resetting source, running average = {}", self.running);
        self.source.reset()
    }

    fn keep_running_on_error<T>(
        &mut self,
        filter: impl FnOnce(&mut Self) -> Result<T, Error<E>>,
    ) -> Result<T, Error<E>> {
        let saved = self.running;
        let result = filter(self);
        if result.is_err() {
            self.running = saved;
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedSource;

    fn primed(value: i32) -> Conditioner<ScriptedSource> {
        let mut conditioner = Conditioner::new(ScriptedSource::constant(value));
        conditioner.prime().unwrap();
        conditioner
    }

    #[test]
    fn running_average_halves() {
        let mut conditioner = Conditioner::new(ScriptedSource::new(&[100, 100, -50]));
        assert_eq!(conditioner.read_running_average(), Ok(50.0));
        assert_eq!(conditioner.read_running_average(), Ok(75.0));
        assert_eq!(conditioner.read_running_average(), Ok(12.5));
        assert_eq!(conditioner.running_average(), 12.5);
    }

    #[test]
    fn average_of_identical_values() {
        let mut conditioner = Conditioner::new(ScriptedSource::constant(-8_000_123));
        assert_eq!(conditioner.average(16), Ok(-8_000_123.0));
        // a plain average does not touch the accumulator
        assert_eq!(conditioner.running_average(), 0.0);
    }

    #[test]
    fn average_does_not_truncate() {
        let mut conditioner = Conditioner::new(ScriptedSource::new(&[1, 2]));
        assert_eq!(conditioner.average(2), Ok(1.5));
    }

    #[test]
    fn average_needs_a_sample() {
        let mut conditioner = Conditioner::new(ScriptedSource::constant(1));
        assert_eq!(
            conditioner.average(0),
            Err(Error::InsufficientSamples {
                requested: 0,
                required: 1
            })
        );
        assert_eq!(conditioner.source().reads, 0);
    }

    #[test]
    fn no_spikes_trims_the_running_average() {
        // running: 0, 200, 100, 50, 25
        let mut conditioner = Conditioner::new(ScriptedSource::new(&[0, 400, 0, 0, 0]));
        let result = conditioner.average_no_spikes(5).unwrap();
        // the raw sequence trimmed would give 0
        assert_eq!(result, (25.0 + 50.0 + 100.0) / 3.0);
    }

    #[test]
    fn no_spikes_drops_a_fifth_from_each_end() {
        let mut conditioner = primed(1000);
        assert_eq!(conditioner.average_no_spikes(25), Ok(1000.0));
        assert_eq!(conditioner.source().reads, 26);
        assert_eq!(trim_count(25), 5);
        assert_eq!(trim_count(9), 1);
        assert_eq!(trim_count(4), 0);
    }

    #[test]
    fn no_spikes_without_trimming() {
        let mut conditioner = Conditioner::new(ScriptedSource::new(&[10, 10]));
        // running: 5, 7.5
        assert_eq!(conditioner.average_no_spikes(2), Ok(6.25));
    }

    #[test]
    fn no_spikes_limits() {
        let mut conditioner = primed(3);
        assert_eq!(
            conditioner.average_no_spikes(0),
            Err(Error::InsufficientSamples {
                requested: 0,
                required: 1
            })
        );
        assert_eq!(
            conditioner.average_no_spikes(MAX_SPIKE_SAMPLES + 1),
            Err(Error::TooManySamples {
                requested: MAX_SPIKE_SAMPLES + 1,
                capacity: MAX_SPIKE_SAMPLES
            })
        );
        assert_eq!(conditioner.average_no_spikes(MAX_SPIKE_SAMPLES), Ok(3.0));
    }

    #[test]
    fn trimmed_mean_ignores_order() {
        let expected = trimmed_mean(&mut [
            1.0, 2.0, 3.0, 4.0, 100.0, -50.0, 7.0, 8.0, 9.0, 10.0,
        ]);
        for mut values in [
            [100.0, -50.0, 1.0, 2.0, 3.0, 4.0, 7.0, 8.0, 9.0, 10.0],
            [10.0, 9.0, 8.0, 7.0, 4.0, 3.0, 2.0, 1.0, -50.0, 100.0],
            [4.0, 100.0, 8.0, 1.0, 10.0, -50.0, 2.0, 9.0, 3.0, 7.0],
        ] {
            assert_eq!(trimmed_mean(&mut values), expected);
        }
        // -50, 1 and 10, 100 are cut
        assert_eq!(expected, Some(5.5));
        assert_eq!(trimmed_mean(&mut []), None);
    }

    #[test]
    fn lpf_of_constant_signal() {
        let mut conditioner = primed(123_456);
        assert_eq!(conditioner.average_lpf(), Ok(123_456.0));
        assert_eq!(conditioner.source().reads, 1 + LPF_KERNEL.len());
    }

    #[test]
    fn lpf_weights_the_middle_tap() {
        let mut conditioner = Conditioner::new(ScriptedSource::new(&[0; 9]));
        conditioner.set_running_average(512.0);
        // running: 256, 128, 64, 32, 16, 8, 4, 2, 1
        let weighted = 256.0 + 2.0 * 128.0 + 4.0 * 64.0 + 8.0 * 32.0 + 16.0 * 16.0;
        let weighted = weighted + 8.0 * 8.0 + 4.0 * 4.0 + 2.0 * 2.0 + 1.0;
        assert_eq!(conditioner.average_lpf(), Ok(weighted / 46.0));
    }

    #[test]
    fn lpf_norm_is_the_kernel_sum() {
        assert_eq!(LPF_KERNEL.iter().sum::<u32>(), 46);
        assert_eq!(kernel_norm(&LPF_KERNEL), Some(46));
    }

    #[test]
    fn custom_kernel() {
        static FLAT: [u32; 3] = [1, 1, 1];
        let mut conditioner = primed(9);
        conditioner.set_kernel(&FLAT).unwrap();
        assert_eq!(conditioner.average_lpf(), Ok(9.0));
        assert_eq!(conditioner.source().reads, 4);

        assert_eq!(conditioner.set_kernel(&[]), Err(Error::InvalidKernel));
        assert_eq!(conditioner.set_kernel(&[0, 0]), Err(Error::InvalidKernel));
        assert_eq!(conditioner.kernel(), &FLAT);
    }

    #[test]
    fn overflowing_kernel_is_rejected() {
        let mut conditioner = primed(9);
        assert_eq!(
            conditioner.set_kernel(&[u32::MAX, 2]),
            Err(Error::InvalidKernel)
        );
        assert_eq!(kernel_norm(&[u32::MAX, 0]), Some(u32::MAX));
        // the default kernel and its norm stay in place
        assert_eq!(conditioner.kernel(), &LPF_KERNEL);
        assert_eq!(conditioner.average_lpf(), Ok(9.0));
    }

    #[test]
    fn read_errors_propagate() {
        let mut conditioner = Conditioner::new(ScriptedSource::new(&[1, 2]));
        assert_eq!(conditioner.average_lpf(), Err(Error::Pin(())));
    }

    #[test]
    fn failed_filters_keep_running_average() {
        let mut conditioner = Conditioner::new(ScriptedSource::new(&[100, 200, 300]));
        conditioner.set_running_average(10.0);
        assert_eq!(conditioner.average_no_spikes(9), Err(Error::Pin(())));
        assert_eq!(conditioner.running_average(), 10.0);
        assert_eq!(conditioner.source().reads, 4);

        let mut conditioner = Conditioner::new(ScriptedSource::new(&[100, 200]));
        conditioner.set_running_average(10.0);
        assert_eq!(conditioner.average_lpf(), Err(Error::Pin(())));
        assert_eq!(conditioner.running_average(), 10.0);
    }

    #[test]
    fn reset_keeps_running_average() {
        let mut conditioner = primed(40);
        conditioner.reset().unwrap();
        assert_eq!(conditioner.source().resets, 1);
        assert_eq!(conditioner.running_average(), 40.0);
    }
}
