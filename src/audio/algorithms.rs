//! Analysis helpers for produced audio.

use std::f32::consts::PI;

use num_complex::Complex;

/// Implements the [Goertzel algorithm](https://en.wikipedia.org/wiki/Goertzel_algorithm) to find the magnitude of a frequency in a slice of samples.
/// The result is normalized by the number of samples, so a full scale sine at `freq` gives roughly 0.5.
pub fn goertzel_mag(freq: f32, samples: &[f32], sample_rate: u32) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }

    let k = (0.5 + (samples.len() as f32 * freq) / sample_rate as f32).floor();
    let omega = (2.0 * PI * k) / samples.len() as f32;
    let sin = omega.sin();
    let cos = omega.cos();
    let coeff = cos * 2.0;

    let mut s1 = 0.0;
    let mut s2 = 0.0;

    for i in samples {
        let s = coeff * s1 - s2 + i;
        s2 = s1;
        s1 = s;
    }

    let real = s1 - s2 * cos;
    let imag = s2 * sin;

    Complex::new(real, imag).norm() / samples.len() as f32
}

/// Converts 16-bit samples to floats in `[-1, 1]`.
pub fn to_float(samples: impl IntoIterator<Item = i16>) -> Vec<f32> {
    samples
        .into_iter()
        .map(|x| x as f32 / i16::MAX as f32)
        .collect()
}

/// Root mean square of the samples, normalized to `[0, 1]`.
pub fn rms(samples: &[i16]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }

    let sum = samples
        .iter()
        .map(|&x| {
            let x = x as f64 / i16::MAX as f64;
            x * x
        })
        .sum::<f64>();
    (sum / samples.len() as f64).sqrt() as f32
}

/// Largest absolute sample, normalized to `[0, 1]`.
pub fn peak(samples: &[i16]) -> f32 {
    let max = samples.iter().map(|x| x.unsigned_abs()).max().unwrap_or(0);
    (max as f32 / i16::MAX as f32).min(1.0)
}
