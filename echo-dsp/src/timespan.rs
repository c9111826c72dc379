use core::ops::Deref;
use heapless::Vec;

use crate::Error;

/// Evenly spaced sample times in microseconds.
///
/// The last entry is exactly the requested maximum rather than the sum of
/// accumulated steps.
#[derive(Clone, Debug, PartialEq)]
pub struct TimeSpan<const N: usize> {
    times: Vec<f32, N>,
}

impl<const N: usize> TimeSpan<N> {
    /// Build a time axis of `n` points over `[min, max]`.
    ///
    /// # Args
    /// * `min` - First sample time.
    /// * `max` - Last sample time.
    /// * `n` - Number of points. Must be at least 2 and at most `N`.
    pub fn new(min: f32, max: f32, n: usize) -> Result<Self, Error> {
        if n < 2 {
            return Err(Error::TooShort);
        }
        if n > N {
            return Err(Error::Capacity);
        }

        let step = (max - min) / (n - 1) as f32;
        let times = (0..n - 1)
            .map(|i| min + i as f32 * step)
            .chain(core::iter::once(max))
            .collect();

        Ok(Self { times })
    }

    pub fn first(&self) -> f32 {
        self.times[0]
    }

    pub fn last(&self) -> f32 {
        self.times[self.times.len() - 1]
    }

    /// Duration covered by the axis.
    pub fn window(&self) -> f32 {
        self.last() - self.first()
    }
}

impl<const N: usize> Deref for TimeSpan<N> {
    type Target = [f32];

    fn deref(&self) -> &[f32] {
        &self.times
    }
}
