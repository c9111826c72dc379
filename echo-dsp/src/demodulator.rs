use heapless::Vec;
use num_traits::Float;

use crate::{Column, Error, TimeSpan};

/// Limit samples to `[0, 255 - gain]`.
///
/// The ceiling emulates the saturation of the receiver gain stage.
pub fn clamp(signal: &mut [f32], gain: u8) {
    let ceiling = (u8::MAX - gain) as f32;
    for sample in signal.iter_mut() {
        if *sample < 0.0 {
            *sample = 0.0;
        } else if *sample > ceiling {
            *sample = ceiling;
        }
    }
}

/// Find local maxima by a sign change of the discrete derivative.
///
/// The index before every transition from a non-negative to a negative slope is
/// recorded. The last index is always appended to close the envelope at the
/// window edge, so the result is never empty and strictly increasing.
pub fn find_peaks<const N: usize>(
    signal: &[f32],
) -> Result<Vec<usize, N>, Error> {
    if signal.is_empty() {
        return Err(Error::EmptySignal);
    }
    if signal.len() > N {
        return Err(Error::Capacity);
    }

    let mut peaks = Vec::new();
    let mut slope = 0.0;
    for (x, pair) in signal.windows(2).enumerate() {
        let next = pair[1] - pair[0];
        if slope >= 0.0 && next < 0.0 {
            peaks.push(x).map_err(|_| Error::Capacity)?;
        }
        slope = next;
    }
    peaks
        .push(signal.len() - 1)
        .map_err(|_| Error::Capacity)?;

    Ok(peaks)
}

/// Linearly resample `source` onto `target.len()` points.
///
/// Output `i` blends the two source samples around `i * (m - 1) / (n - 1)`,
/// weighted by the remainder of that integer division. The last output is the
/// last source sample.
pub fn downsample(source: &[f32], target: &mut [f32]) -> Result<(), Error> {
    let Some(&last) = source.last() else {
        return Err(Error::EmptySignal);
    };
    if target.len() < 2 {
        return Err(Error::TooShort);
    }

    let old = source.len() - 1;
    let new = target.len() - 1;
    for (i, y) in target[..new].iter_mut().enumerate() {
        let idx = i * old / new;
        let p = i * old % new;
        *y = if p == 0 {
            source[idx]
        } else {
            (p as f32 * source[idx + 1] + (new - p) as f32 * source[idx])
                / new as f32
        };
    }
    target[new] = last;

    Ok(())
}

/// Piecewise linear interpolation of `(x, y)` at ascending `targets`.
///
/// `x` must be non-decreasing. Targets outside `x` take the nearest boundary
/// value.
pub fn interpolate(x: &[f32], y: &[f32], targets: &[f32], output: &mut [f32]) {
    debug_assert_eq!(x.len(), y.len());
    let (Some(&x_first), Some(&x_last)) = (x.first(), x.last()) else {
        return;
    };
    let last = x.len() - 1;

    let mut i = 0;
    for (&target, out) in targets.iter().zip(output.iter_mut()) {
        *out = if target <= x_first {
            y[0]
        } else if target >= x_last {
            y[last]
        } else {
            if target < x[i] {
                i = 0;
            }
            while target >= x[i + 1] {
                i += 1;
            }
            let t = (target - x[i]) / (x[i + 1] - x[i]);
            y[i] * (1.0 - t) + y[i + 1] * t
        };
    }
}

/// Normalization denominator accumulated over a whole scanning session.
///
/// It only grows until [EnvelopeMax::reset], so columns rendered before a
/// brighter echo was seen are never rescaled.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct EnvelopeMax(f32);

impl EnvelopeMax {
    pub fn value(&self) -> f32 {
        self.0
    }

    /// Fold a newly observed maximum into the running maximum.
    pub fn observe(&mut self, peak: f32) -> f32 {
        if peak > self.0 {
            self.0 = peak;
        }
        self.0
    }

    pub fn reset(&mut self) {
        self.0 = 0.0;
    }

    /// Grayscale shade of an amplitude. Black while nothing has been observed.
    pub fn shade(&self, amplitude: f32) -> u8 {
        if self.0 > 0.0 {
            (amplitude * 255.0 / self.0).round() as u8
        } else {
            0
        }
    }
}

/// Envelope demodulator holding the brightness calibration of a scanning session.
#[derive(Clone, Debug, Default)]
pub struct Demodulator {
    envelope_max: EnvelopeMax,
}

impl Demodulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn envelope_max(&self) -> f32 {
        self.envelope_max.value()
    }

    /// Forget the brightness calibration of the current session.
    pub fn reset(&mut self) {
        self.envelope_max.reset();
    }

    /// Demodulate one A-scan into a grayscale column.
    ///
    /// # Args
    /// * `signal` - Raw samples, clamped in place.
    /// * `timespan` - Sample times. Must cover at least `signal.len()` samples.
    /// * `gain` - Receiver gain, lowering the amplitude ceiling.
    ///
    /// # Returns
    /// The column, its rows evenly spaced over the window of `timespan`.
    pub fn demodulate<const N: usize, const R: usize>(
        &mut self,
        signal: &mut [f32],
        timespan: &TimeSpan<N>,
        gain: u8,
    ) -> Result<Column<R>, Error> {
        if signal.len() > timespan.len() {
            return Err(Error::Length);
        }

        clamp(signal, gain);

        let peaks: Vec<usize, N> = find_peaks(signal)?;
        let (times, amplitudes): (Vec<f32, N>, Vec<f32, N>) =
            peaks.iter().map(|&i| (timespan[i], signal[i])).unzip();

        // Peak times are not evenly spaced: resample both series to the
        // display height, then interpolate onto a uniform grid.
        let mut peak_times = [0.0; R];
        let mut peak_amplitudes = [0.0; R];
        downsample(&times, &mut peak_times)?;
        downsample(&amplitudes, &mut peak_amplitudes)?;

        let grid = TimeSpan::<R>::new(timespan.first(), timespan.last(), R)?;
        let mut envelope = [0.0; R];
        interpolate(&peak_times, &peak_amplitudes, &grid, &mut envelope);

        let peak = envelope.iter().copied().fold(0.0, f32::max);
        let max = self.envelope_max.observe(peak);
        log::trace!(
            "Demodulated {} samples, {} peaks, max {peak} of {max}",
            signal.len(),
            peaks.len()
        );

        let mut column = [0; R];
        for (shade, amplitude) in column.iter_mut().zip(envelope) {
            *shade = self.envelope_max.shade(amplitude);
        }
        Ok(column)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::allclose;

    #[test]
    fn clamp_bounds() {
        let mut signal = [-3.0, 0.0, 12.5, 244.0, 246.0, 1e6];
        clamp(&mut signal, 10);
        assert_eq!(signal, [0.0, 0.0, 12.5, 244.0, 245.0, 245.0]);
    }

    #[test]
    fn peaks_at_sign_change() {
        let peaks = find_peaks::<8>(&[0.0, 1.0, 0.0, 2.0, 0.0]).unwrap();
        assert_eq!(&peaks[..], &[1, 3, 4]);
    }

    #[test]
    fn peaks_plateau() {
        let peaks = find_peaks::<8>(&[0.0, 1.0, 1.0, 0.0, 0.0]).unwrap();
        assert_eq!(&peaks[..], &[2, 4]);
    }

    #[test]
    fn peaks_closing_only() {
        let ramp: [f32; 6] = core::array::from_fn(|i| i as f32);
        assert_eq!(&find_peaks::<8>(&ramp).unwrap()[..], &[5]);
        assert_eq!(&find_peaks::<8>(&[4.0]).unwrap()[..], &[0]);
        assert_eq!(find_peaks::<8>(&[]), Err(Error::EmptySignal));
        assert_eq!(find_peaks::<2>(&[0.0; 3]), Err(Error::Capacity));
    }

    #[test]
    fn peaks_increasing() {
        let signal: [f32; 64] =
            core::array::from_fn(|i| ((i * 37 % 11) as f32).sin());
        let peaks = find_peaks::<64>(&signal).unwrap();
        assert!(peaks.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(*peaks.last().unwrap(), 63);
    }

    #[test]
    fn downsample_blends() {
        let mut target = [0.0; 3];
        downsample(&[0.0, 10.0, 20.0, 30.0, 40.0], &mut target).unwrap();
        assert_eq!(target, [0.0, 20.0, 40.0]);

        downsample(&[0.0, 10.0, 20.0, 30.0], &mut target).unwrap();
        assert!(allclose(&target, &[0.0, 15.0, 30.0], 1e-6, 0.0));
    }

    #[test]
    fn downsample_single_source() {
        let mut target = [0.0; 4];
        downsample(&[7.0], &mut target).unwrap();
        assert_eq!(target, [7.0; 4]);
    }

    #[test]
    fn interpolate_flat_outside() {
        let mut out = [0.0; 5];
        interpolate(
            &[1.0, 2.0, 3.0],
            &[10.0, 20.0, 40.0],
            &[0.0, 1.5, 2.5, 3.0, 9.0],
            &mut out,
        );
        assert_eq!(out, [10.0, 15.0, 30.0, 40.0, 40.0]);
    }

    #[test]
    fn ramp_identity() {
        let times = TimeSpan::<250>::new(0.0, 8.0, 250).unwrap();
        let ramp = TimeSpan::<250>::new(0.0, 1.0, 250).unwrap();

        let mut t = [0.0; 112];
        let mut y = [0.0; 112];
        downsample(&times, &mut t).unwrap();
        downsample(&ramp, &mut y).unwrap();

        let grid = TimeSpan::<112>::new(0.0, 8.0, 112).unwrap();
        let mut out = [0.0; 112];
        interpolate(&t, &y, &grid, &mut out);

        let expected = TimeSpan::<112>::new(0.0, 1.0, 112).unwrap();
        assert!(allclose(&out, &expected, 1e-4, 1e-5));
    }

    #[test]
    fn shade_rounds() {
        let mut max = EnvelopeMax::default();
        assert_eq!(max.shade(3.0), 0);
        max.observe(2.0);
        assert_eq!(max.shade(2.0), 255);
        assert_eq!(max.shade(1.0), 128);
        assert_eq!(max.shade(0.0), 0);
        assert_eq!(max.observe(1.0), 2.0);
        max.reset();
        assert_eq!(max.value(), 0.0);
    }

    #[test]
    fn zero_signal_black() {
        let mut demodulator = Demodulator::new();
        let timespan = TimeSpan::<32>::new(0.0, 1.0, 32).unwrap();
        let mut signal = [0.0; 32];
        let column: Column<8> =
            demodulator.demodulate(&mut signal, &timespan, 10).unwrap();
        assert_eq!(column, [0; 8]);
        assert_eq!(demodulator.envelope_max(), 0.0);
    }

    #[test]
    fn single_burst() {
        let mut demodulator = Demodulator::new();
        let timespan = TimeSpan::<11>::new(0.0, 10.0, 11).unwrap();
        let mut signal = [0.0, 0.0, 0.0, 0.0, 0.0, 50.0, 0.0, 0.0, 0.0, 0.0, 0.0];
        let column: Column<11> =
            demodulator.demodulate(&mut signal, &timespan, 0).unwrap();
        // Flat extrapolation before the first peak, linear decay to the end
        assert_eq!(&column[..6], &[255; 6]);
        assert_eq!(column[10], 0);
        assert!(column[6..].windows(2).all(|w| w[0] > w[1]));
        assert_eq!(demodulator.envelope_max(), 50.0);
    }

    #[test]
    fn running_max_not_rescaled() {
        let mut demodulator = Demodulator::new();
        let timespan = TimeSpan::<5>::new(0.0, 4.0, 5).unwrap();

        let mut bright = [0.0, 0.0, 100.0, 0.0, 0.0];
        let first: Column<5> =
            demodulator.demodulate(&mut bright, &timespan, 0).unwrap();
        assert_eq!(first[2], 255);

        let mut dim = [0.0, 0.0, 50.0, 0.0, 0.0];
        let second: Column<5> =
            demodulator.demodulate(&mut dim, &timespan, 0).unwrap();
        assert_eq!(second[2], 128);
        assert_eq!(demodulator.envelope_max(), 100.0);

        demodulator.reset();
        let mut dim = [0.0, 0.0, 50.0, 0.0, 0.0];
        let third: Column<5> =
            demodulator.demodulate(&mut dim, &timespan, 0).unwrap();
        assert_eq!(third[2], 255);
    }

    #[test]
    fn rejects_long_signal() {
        let mut demodulator = Demodulator::new();
        let timespan = TimeSpan::<8>::new(0.0, 1.0, 4).unwrap();
        let mut signal = [1.0; 6];
        assert_eq!(
            demodulator.demodulate::<8, 4>(&mut signal, &timespan, 0),
            Err(Error::Length)
        );
    }
}
