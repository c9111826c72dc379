//! Synthetic pulse-echo waveforms
//!
//! Used when no probe data is streamed in: each reflector produces a damped,
//! rectified ringing burst starting at its arrival time. The model is a plausible
//! test pattern, not a physical simulation.
use num_traits::Float;
use rand_core::{RngCore, SeedableRng};
use rand_xorshift::XorShiftRng;

use crate::{Error, Signal, TimeSpan};

/// Reflector arrival times of the built-in phantom in microseconds.
pub const PHANTOM: [f32; 7] = [0.0, 1.3, 3.2, 3.8, 5.0, 6.0, 7.0];

/// Number of points of a generated waveform.
pub const RESOLUTION: usize = 200;

/// Duration of a generated waveform in microseconds.
pub const WINDOW: f32 = 8.0;

// Carrier angular frequency in rad/µs
const CARRIER: f32 = 40.0;
const RING_WIDTH: f32 = 0.115;
const RING_DELAY: f32 = 0.5;
const DECAY_RATE: f32 = 3.0;
// Floor added to both envelopes
const FLOOR: f32 = 0.2;
const AMPLITUDE_MIN: f32 = 0.2;
const AMPLITUDE_SPAN: f32 = 0.4;

/// Weight of the reflector at `rank` within an echo set.
pub fn attenuation(rank: usize) -> f32 {
    1.0 / (rank as f32 + 3.0)
}

/// Single rectified echo with a given amplitude factor.
///
/// Samples before the arrival index `arrival * len / window` are silent.
pub fn echo<const N: usize>(
    timespan: &TimeSpan<N>,
    arrival: f32,
    amplitude: f32,
) -> Signal<N> {
    let start = (arrival * timespan.len() as f32 / timespan.last()) as usize;

    timespan
        .iter()
        .enumerate()
        .map(|(i, &t)| {
            if i < start {
                return 0.0;
            }

            let carrier = (CARRIER * t).sin();

            // sin(x / w) / x, continuous through x = 0
            let x = t - arrival - RING_DELAY;
            let sinc = if x.abs() < f32::EPSILON {
                1.0 / RING_WIDTH
            } else {
                (x / RING_WIDTH).sin() / x
            };
            let ringing = amplitude * sinc + FLOOR;
            let decay = (DECAY_RATE * (amplitude - t + arrival)).exp() + FLOOR;

            (carrier * ringing * decay).abs()
        })
        .collect()
}

/// Noisy pulse-echo generator over a fixed time axis.
///
/// Each echo draws its amplitude factor from `[0.2, 0.6)` using a seeded
/// xorshift generator, so a given seed always yields the same sequence.
#[derive(Clone, Debug)]
pub struct EchoGenerator<const N: usize> {
    timespan: TimeSpan<N>,
    rng: XorShiftRng,
}

impl EchoGenerator<RESOLUTION> {
    /// Generator over the default 8 µs window.
    pub fn phantom(seed: u64) -> Result<Self, Error> {
        Ok(Self::new(TimeSpan::new(0.0, WINDOW, RESOLUTION)?, seed))
    }
}

impl<const N: usize> EchoGenerator<N> {
    pub fn new(timespan: TimeSpan<N>, seed: u64) -> Self {
        Self {
            timespan,
            rng: XorShiftRng::seed_from_u64(seed),
        }
    }

    pub fn timespan(&self) -> &TimeSpan<N> {
        &self.timespan
    }

    fn amplitude(&mut self) -> f32 {
        // 24 random bits are exact in an f32 mantissa
        let unit = (self.rng.next_u32() >> 8) as f32 / (1u32 << 24) as f32;
        AMPLITUDE_MIN + AMPLITUDE_SPAN * unit
    }

    /// Generate the echo of a single reflector.
    ///
    /// # Args
    /// * `arrival` - Echo arrival time in microseconds.
    pub fn generate_echo(&mut self, arrival: f32) -> Signal<N> {
        let amplitude = self.amplitude();
        echo(&self.timespan, arrival, amplitude)
    }

    /// Sum the echoes of all reflectors, each weighted by [attenuation] of its
    /// position in `arrivals`.
    pub fn generate_composite(&mut self, arrivals: &[f32]) -> Signal<N> {
        let mut composite: Signal<N> =
            core::iter::repeat(0.0).take(self.timespan.len()).collect();

        for (rank, &arrival) in arrivals.iter().enumerate() {
            let weight = attenuation(rank);
            for (sum, sample) in
                composite.iter_mut().zip(self.generate_echo(arrival))
            {
                *sum += sample * weight;
            }
        }

        composite
    }
}
