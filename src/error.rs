use thiserror::Error;

/// Errors raised while reading or conditioning samples.
///
/// `E` is the error type of the clock and data lines.
#[derive(Error, Debug, PartialEq, Eq, Clone, Copy)]
pub enum Error<E> {
    #[error("digital line error: {0:?}")]
    Pin(E),
    #[error("hx711 did not signal ready within {waited_us} us")]
    HardwareTimeout { waited_us: u32 },
    #[error("hx711 read cancelled while waiting for the chip")]
    Cancelled,
    #[error("{requested} samples leave nothing to average (need at least {required})")]
    InsufficientSamples { requested: usize, required: usize },
    #[error("{requested} samples exceed the buffer of {capacity}")]
    TooManySamples { requested: usize, capacity: usize },
    #[error("filter kernel weights sum to zero or overflow")]
    InvalidKernel,
    #[error("{0}")]
    Calibration(#[from] CalibrationError),
}

/// Errors raised while building calibration data.
#[derive(Error, Debug, PartialEq, Eq, Clone, Copy)]
pub enum CalibrationError {
    #[error("calibration table needs exactly 4 points with increasing measured values")]
    InvalidCalibrationTable,
    #[error("reference weight of a calibration point cannot be 0")]
    DivisionByReferenceZero,
    #[error("calibration record is not a `reference, measured, ratio` triple")]
    MalformedRecord,
}
