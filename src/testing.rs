//! Test doubles shared by the unit tests.

use std::collections::VecDeque;

pub use embedded_hal_mock::eh1::digital::{
    Mock as Pin, State as PinState, Transaction as PinTransaction,
};

use crate::error::Error;
use crate::hx711::encode;
use crate::RawSource;

/// A pin that expects no calls at all.
pub fn idle_pin() -> Pin {
    Pin::new(&[] as &[PinTransaction])
}

/// Clock and data line transactions for one `read` of `sample`, after the
/// data line reported busy `busy_polls` times.
pub fn sample_transactions(
    sample: i32,
    busy_polls: usize,
) -> (Vec<PinTransaction>, Vec<PinTransaction>) {
    let wire = encode(sample);

    let mut dt = vec![PinTransaction::get(PinState::High); busy_polls];
    dt.push(PinTransaction::get(PinState::Low));
    dt.extend((0..24).rev().map(|bit| {
        let level = if wire & (1 << bit) != 0 {
            PinState::High
        } else {
            PinState::Low
        };
        PinTransaction::get(level)
    }));

    let sck = (0..25)
        .flat_map(|_| {
            [
                PinTransaction::set(PinState::High),
                PinTransaction::set(PinState::Low),
            ]
        })
        .collect();

    (sck, dt)
}

/// Replays a fixed list of raw samples, then repeats `fallback` if one is set.
#[derive(Debug, Default)]
pub struct ScriptedSource {
    samples: VecDeque<i32>,
    fallback: Option<i32>,
    pub reads: usize,
    pub resets: usize,
}

impl ScriptedSource {
    pub fn new(samples: &[i32]) -> Self {
        Self {
            samples: samples.iter().copied().collect(),
            ..Default::default()
        }
    }

    pub fn constant(value: i32) -> Self {
        Self {
            fallback: Some(value),
            ..Default::default()
        }
    }
}

impl RawSource for ScriptedSource {
    type Error = Error<()>;

    fn read_raw(&mut self) -> Result<i32, Self::Error> {
        self.reads += 1;
        self.samples
            .pop_front()
            .or(self.fallback)
            .ok_or(Error::Pin(()))
    }

    fn reset(&mut self) -> Result<(), Self::Error> {
        self.resets += 1;
        Ok(())
    }
}
