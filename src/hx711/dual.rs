//! Two hx711 chips read as one logical channel.
//!
//! Used when a scale rests on two load cells, each with its own amplifier.
//! The raw samples are summed before any conditioning.

use crate::RawSource;

/// A primary source plus an optional secondary source.
pub struct Combined<P, S> {
    primary: P,
    secondary: Option<S>,
}

impl<P, S> Combined<P, S> {
    pub fn new(primary: P, secondary: Option<S>) -> Self {
        Self { primary, secondary }
    }

    /// Only the primary channel is wired.
    pub fn single(primary: P) -> Self {
        Self::new(primary, None)
    }

    pub fn has_secondary(&self) -> bool {
        self.secondary.is_some()
    }

    pub fn release(self) -> (P, Option<S>) {
        (self.primary, self.secondary)
    }
}

impl<P, S, E> RawSource for Combined<P, S>
where
    P: RawSource<Error = E>,
    S: RawSource<Error = E>,
{
    type Error = E;

    /// Sum of one read per configured channel, primary first.
    fn read_raw(&mut self) -> Result<i32, E> {
        let mut value = self.primary.read_raw()?;
        if let Some(secondary) = self.secondary.as_mut() {
            // two 24 bit samples always fit
            value += secondary.read_raw()?;
        }
        Ok(value)
    }

    /// Each configured channel is power cycled on its own.
    fn reset(&mut self) -> Result<(), E> {
        self.primary.reset()?;
        if let Some(secondary) = self.secondary.as_mut() {
            secondary.reset()?;
        }
        Ok(())
    }
}
