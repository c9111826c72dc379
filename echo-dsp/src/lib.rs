//! Pulse-echo signal synthesis and envelope demodulation
//!
//! # Design
//! An A-scan arrives as a [Signal] of amplitude samples over a [TimeSpan]. The
//! [Demodulator] turns it into one 8-bit grayscale [Column] of a B-mode image:
//! clamping, natural peak extraction, resampling to the display height and
//! normalization against a running maximum shared by all columns of a session.
//!
//! Every sequence lives in a fixed-capacity buffer so the crate runs without an
//! allocator.
#![cfg_attr(not(test), no_std)]

mod timespan;
pub use timespan::*;
pub mod generator;
pub use generator::EchoGenerator;
mod demodulator;
pub use demodulator::*;

#[cfg(test)]
pub mod testing;

/// Fixed-capacity sequence of amplitude samples.
pub type Signal<const N: usize> = heapless::Vec<f32, N>;

/// One vertical line of a grayscale image, top row first.
pub type Column<const R: usize> = [u8; R];

/// Errors raised while building axes or demodulating signals.
#[derive(Copy, Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// A time axis or resampling target needs at least two points.
    #[error("At least two points required")]
    TooShort,
    /// The requested length exceeds the fixed buffer capacity.
    #[error("Buffer capacity exceeded")]
    Capacity,
    /// The signal has more samples than its time axis.
    #[error("Signal longer than its time axis")]
    Length,
    /// There are no samples to demodulate.
    #[error("Empty signal")]
    EmptySignal,
}
