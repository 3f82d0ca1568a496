//! Conversion of conditioned raw values to grams.
//!
//! ```text
//! grams = (value - offset) / ratio
//! ```
//!
//! The ratio is either one fixed number or interpolated from a table of four
//! calibration points, whichever [`CalibrationMode`] is selected.

use core::fmt;
use core::str::FromStr;

use log::debug;

use crate::conditioner::Conditioner;
use crate::error::{CalibrationError, Error};
use crate::RawSource;

pub const CALIBRATION_POINTS: usize = 4;

/// Round half away from zero to a multiple of `resolution`, or to a whole
/// number when `resolution` is 0.
pub fn round_to(value: f64, resolution: f64) -> f64 {
    if resolution == 0.0 {
        return libm::round(value);
    }
    resolution * libm::round(value / resolution)
}

/// Raw value measured with a reference weight on the cell, and the ratio
/// that weight produced.
#[derive(Clone, Copy, Debug, PartialEq, Default)]
pub struct CalibrationPoint {
    pub measured: f64,
    pub ratio: f64,
}

impl CalibrationPoint {
    pub const fn new(measured: f64, ratio: f64) -> Self {
        Self { measured, ratio }
    }

    /// `ratio = (measured - offset) / reference_weight`, kept to 3 decimals.
    pub fn from_reference(
        reference_weight: f64,
        measured: f64,
        offset: f64,
    ) -> Result<Self, CalibrationError> {
        if reference_weight == 0.0 {
            return Err(CalibrationError::DivisionByReferenceZero);
        }
        let ratio = libm::round((measured - offset) / reference_weight * 1000.0) / 1000.0;
        Ok(Self { measured, ratio })
    }
}

/// One line of a calibration file: `reference, measured, ratio`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CalibrationRecord {
    pub reference_weight: f64,
    pub measured: f64,
    pub ratio: f64,
}

impl CalibrationRecord {
    /// The record written for the empty scale, before any reference weight.
    pub const fn tare(offset: f64) -> Self {
        Self {
            reference_weight: 0.0,
            measured: offset,
            ratio: 1.0,
        }
    }

    pub fn from_reference(
        reference_weight: f64,
        measured: f64,
        offset: f64,
    ) -> Result<Self, CalibrationError> {
        let point = CalibrationPoint::from_reference(reference_weight, measured, offset)?;
        Ok(Self {
            reference_weight,
            measured,
            ratio: point.ratio,
        })
    }

    pub fn point(&self) -> CalibrationPoint {
        CalibrationPoint::new(self.measured, self.ratio)
    }
}

impl FromStr for CalibrationRecord {
    type Err = CalibrationError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut fields = line.split(',').map(|field| field.trim().parse::<f64>());
        let mut next = || match fields.next() {
            Some(Ok(value)) => Ok(value),
            _ => Err(CalibrationError::MalformedRecord),
        };
        let record = Self {
            reference_weight: next()?,
            measured: next()?,
            ratio: next()?,
        };
        if fields.next().is_some() {
            return Err(CalibrationError::MalformedRecord);
        }
        Ok(record)
    }
}

impl fmt::Display for CalibrationRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}, {}, {}",
            self.reference_weight, self.measured, self.ratio
        )
    }
}

/// Four calibration points, ordered by measured value.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CalibrationTable {
    points: [CalibrationPoint; CALIBRATION_POINTS],
}

impl Default for CalibrationTable {
    /// Every point has ratio 1.
    fn default() -> Self {
        Self::new_unchecked([CalibrationPoint::new(0.0, 1.0); CALIBRATION_POINTS])
    }
}

impl CalibrationTable {
    /// Fails unless the measured values strictly increase.
    pub fn new(points: [CalibrationPoint; CALIBRATION_POINTS]) -> Result<Self, CalibrationError> {
        if points.windows(2).any(|pair| pair[0].measured >= pair[1].measured) {
            return Err(CalibrationError::InvalidCalibrationTable);
        }
        Ok(Self { points })
    }

    /// Keep the points in the given order, sorted or not.
    pub const fn new_unchecked(points: [CalibrationPoint; CALIBRATION_POINTS]) -> Self {
        Self { points }
    }

    pub fn from_slice(points: &[CalibrationPoint]) -> Result<Self, CalibrationError> {
        let points: [CalibrationPoint; CALIBRATION_POINTS] = points
            .try_into()
            .map_err(|_| CalibrationError::InvalidCalibrationTable)?;
        Self::new(points)
    }

    /// Build a table from the lines of a calibration file, skipping the
    /// zero weight tare record.
    pub fn from_records(records: &[CalibrationRecord]) -> Result<Self, CalibrationError> {
        let mut points: heapless::Vec<CalibrationPoint, CALIBRATION_POINTS> = heapless::Vec::new();
        for record in records.iter().filter(|r| r.reference_weight != 0.0) {
            points
                .push(record.point())
                .map_err(|_| CalibrationError::InvalidCalibrationTable)?;
        }
        Self::from_slice(&points)
    }

    pub fn points(&self) -> &[CalibrationPoint; CALIBRATION_POINTS] {
        &self.points
    }

    /// Ratio at `measured`, linear between neighbouring points and clamped
    /// to the first and last ratio outside the table.
    ///
    /// A value equal to a breakpoint gets that breakpoint's ratio.
    pub fn interpolate(&self, measured: f64) -> f64 {
        let [first, .., last] = &self.points;
        if measured <= first.measured {
            return first.ratio;
        }
        if measured >= last.measured {
            return last.ratio;
        }
        for pair in self.points.windows(2) {
            let (lo, hi) = (&pair[0], &pair[1]);
            if measured == lo.measured {
                return lo.ratio;
            }
            if lo.measured < measured && measured < hi.measured {
                let k = (measured - lo.measured) / (hi.measured - lo.measured);
                return lo.ratio + k * (hi.ratio - lo.ratio);
            }
        }
        // only reachable with an unsorted table
        last.ratio
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum CalibrationMode {
    /// Divide by [`CalibrationModel::ratio`].
    #[default]
    FixedRatio,
    /// Divide by the ratio interpolated from [`CalibrationModel::table`].
    InterpolatedTable,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CalibrationModel {
    offset: f64,
    ratio: f64,
    table: CalibrationTable,
    mode: CalibrationMode,
}

impl Default for CalibrationModel {
    fn default() -> Self {
        Self {
            offset: 0.0,
            ratio: 1.0,
            table: CalibrationTable::default(),
            mode: CalibrationMode::FixedRatio,
        }
    }
}

impl CalibrationModel {
    pub fn fixed(offset: f64, ratio: f64) -> Self {
        Self {
            offset,
            ratio,
            ..Default::default()
        }
    }

    pub fn interpolated(offset: f64, table: CalibrationTable) -> Self {
        Self {
            offset,
            table,
            mode: CalibrationMode::InterpolatedTable,
            ..Default::default()
        }
    }

    pub fn offset(&self) -> f64 {
        self.offset
    }

    pub fn set_offset(&mut self, offset: f64) {
        self.offset = offset;
    }

    pub fn ratio(&self) -> f64 {
        self.ratio
    }

    /// Only used while the mode is [`CalibrationMode::FixedRatio`].
    pub fn set_ratio(&mut self, ratio: f64) {
        self.ratio = ratio;
    }

    pub fn table(&self) -> &CalibrationTable {
        &self.table
    }

    /// Store four points as given. They must be sorted by measured value,
    /// which is not checked here; use [`CalibrationTable::new`] and
    /// [`CalibrationModel::set_table`] for that.
    pub fn set_ratios(
        &mut self,
        p1: CalibrationPoint,
        p2: CalibrationPoint,
        p3: CalibrationPoint,
        p4: CalibrationPoint,
    ) {
        self.set_table(CalibrationTable::new_unchecked([p1, p2, p3, p4]));
    }

    pub fn set_table(&mut self, table: CalibrationTable) {
        debug!("calibration table = {:?}", table.points());
        self.table = table;
    }

    pub fn mode(&self) -> CalibrationMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: CalibrationMode) {
        self.mode = mode;
    }

    pub fn get_interpolated_ratio(&self, measured: f64) -> f64 {
        self.table.interpolate(measured)
    }

    /// Ratio the active mode applies to `value`.
    pub fn ratio_for(&self, value: f64) -> f64 {
        match self.mode {
            CalibrationMode::FixedRatio => self.ratio,
            CalibrationMode::InterpolatedTable => self.get_interpolated_ratio(value),
        }
    }

    pub fn to_physical_units(&self, value: f64) -> f64 {
        (value - self.offset) / self.ratio_for(value)
    }

    /// Capture the current spike free reading as the new zero point.
    ///
    /// The running average of `conditioner` restarts from the same value.
    pub fn tare<S, E>(
        &mut self,
        conditioner: &mut Conditioner<S>,
        n: usize,
    ) -> Result<f64, Error<E>>
    where
        S: RawSource<Error = Error<E>>,
    {
        let zero = conditioner.average_no_spikes(n)?;
        conditioner.set_running_average(zero);
        self.offset = zero;
        debug!("tare over {} samples, offset = {}", n, zero);
        Ok(zero)
    }
}
