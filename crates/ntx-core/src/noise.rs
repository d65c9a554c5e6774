//! # Wideband Noise Source
//!
//! Generates uniform white noise shaped for a 12-bit transmit DAC: each I and
//! Q component is drawn independently and uniformly from the full-scale range
//! `[-2047, 2047]`, then backed off by a fixed headroom factor so the analog
//! chain never sits exactly at full scale. Output buffers are interleaved
//! I,Q,I,Q,… ready for SC16 Q11 streaming.
//!
//! ## Example
//!
//! ```rust
//! use ntx_core::noise::{NoiseSource, MAX_SAMPLE};
//!
//! let mut src = NoiseSource::with_seed(42);
//! let buf = src.generate(1024);
//! assert_eq!(buf.len(), 2048);
//! assert!(buf.iter().all(|&v| v.abs() <= MAX_SAMPLE));
//! ```

use rand::distributions::{Distribution, Uniform};
use rand::rngs::SmallRng;
use rand::SeedableRng;

use crate::types::{Sample, SampleBuffer};

/// Full-scale DAC magnitude (12-bit signed, symmetric).
pub const DAC_FULL_SCALE: i16 = 2047;

/// Headroom backoff applied to every raw sample.
pub const HEADROOM: f64 = 0.95;

/// Largest magnitude the source can emit: `floor(2047 * 0.95)`.
pub const MAX_SAMPLE: i16 = 1944;

/// Uniform noise generator producing interleaved I,Q sample buffers.
///
/// Reproducibility is not part of the contract; consumers must tolerate
/// non-deterministic sample values. The seeded constructor exists so tests
/// can pin the stream.
#[derive(Debug, Clone)]
pub struct NoiseSource {
    rng: SmallRng,
    full_scale: Uniform<i16>,
}

impl NoiseSource {
    /// Create an entropy-seeded source.
    pub fn new() -> Self {
        Self::from_rng(SmallRng::from_entropy())
    }

    /// Create a source with a fixed seed.
    pub fn with_seed(seed: u64) -> Self {
        Self::from_rng(SmallRng::seed_from_u64(seed))
    }

    fn from_rng(rng: SmallRng) -> Self {
        Self {
            rng,
            full_scale: Uniform::new_inclusive(-DAC_FULL_SCALE, DAC_FULL_SCALE),
        }
    }

    /// Fill `buf` with fresh noise. Every element (I and Q alike) is an
    /// independent uniform draw, scaled by [`HEADROOM`] and truncated
    /// toward zero.
    pub fn fill(&mut self, buf: &mut [Sample]) {
        for v in buf.iter_mut() {
            let raw = self.full_scale.sample(&mut self.rng);
            *v = (f64::from(raw) * HEADROOM) as i16;
        }
    }

    /// Generate an interleaved I,Q buffer holding `num_samples` complex
    /// samples (`2 * num_samples` i16 values).
    pub fn generate(&mut self, num_samples: usize) -> SampleBuffer {
        let mut buf = vec![0i16; 2 * num_samples];
        self.fill(&mut buf);
        buf
    }
}

impl Default for NoiseSource {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_length() {
        let mut src = NoiseSource::with_seed(1);
        for n in [0, 1, 8, 8192] {
            assert_eq!(src.generate(n).len(), 2 * n);
        }
    }

    #[test]
    fn test_samples_within_headroom_bound() {
        let mut src = NoiseSource::with_seed(2);
        let buf = src.generate(16384);
        for &v in &buf {
            assert!((-MAX_SAMPLE..=MAX_SAMPLE).contains(&v), "sample {} out of range", v);
        }
    }

    #[test]
    fn test_headroom_bound_matches_scale() {
        assert_eq!((f64::from(DAC_FULL_SCALE) * HEADROOM) as i16, MAX_SAMPLE);
    }

    #[test]
    fn test_noise_is_not_degenerate() {
        let mut src = NoiseSource::with_seed(3);
        let buf = src.generate(4096);
        assert!(buf.iter().any(|&v| v > 0));
        assert!(buf.iter().any(|&v| v < 0));
        // A uniform source over ~3900 values must produce many distinct ones.
        let mut seen = buf.to_vec();
        seen.sort_unstable();
        seen.dedup();
        assert!(seen.len() > 1000, "only {} distinct values", seen.len());
    }

    #[test]
    fn test_fill_refreshes_in_place() {
        let mut src = NoiseSource::with_seed(4);
        let mut buf = src.generate(256);
        let before = buf.clone();
        src.fill(&mut buf);
        assert_ne!(before, buf);
    }
}
