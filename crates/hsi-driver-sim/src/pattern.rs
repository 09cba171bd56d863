//! Synthetic spectral content for the simulated camera.
//!
//! The baseline spectrum is a mercury-argon lamp: a handful of narrow
//! emission lines on a weak continuum, the usual bench source for spectral
//! calibration. Noise comes from a small deterministic PRNG so a seeded
//! camera replays the exact same frames.

/// Prominent Hg/Ar emission lines in nanometers, strongest first.
pub const HG_AR_LINES_NM: &[f64] = &[
    253.7, 436.0, 546.0, 764.0, 405.0, 365.0, 578.0, 750.0, 738.0, 697.0, 811.0, 912.0, 842.0,
];

/// Peak amplitude of the strongest line; each subsequent line drops by
/// [`LINE_STRENGTH_STEP`].
pub const LINE_PEAK: f64 = 255.0;
pub const LINE_STRENGTH_STEP: f64 = 5.0;

/// Deterministic linear congruential generator (Knuth's MMIX constants).
/// Not statistically strong, but replayable and dependency-free.
#[derive(Debug, Clone)]
pub struct Lcg {
    state: u64,
}

impl Lcg {
    pub fn new(seed: u64) -> Self {
        Self {
            state: seed.wrapping_add(0x9E37_79B9_7F4A_7C15),
        }
    }

    pub fn next_u64(&mut self) -> u64 {
        self.state = self
            .state
            .wrapping_mul(6_364_136_223_846_793_005)
            .wrapping_add(1_442_695_040_888_963_407);
        self.state
    }

    /// Uniform in `[0, 1)`.
    pub fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }
}

/// Render the lamp spectrum onto `cols` columns spanning
/// `[start_nm, end_nm]`, as fractions of full scale in `[0, 1]`.
///
/// Lines are triangular with a fixed 3-column half width; a 2% continuum
/// keeps dark columns nonzero.
pub fn emission_spectrum(cols: usize, start_nm: f64, end_nm: f64) -> Vec<f64> {
    let nm_per_col = (end_nm - start_nm) / cols as f64;
    let half_width = 3.0;
    let mut spectrum = vec![0.02; cols];
    for (rank, &line_nm) in HG_AR_LINES_NM.iter().enumerate() {
        if line_nm < start_nm || line_nm > end_nm {
            continue;
        }
        let center = (line_nm - start_nm) / nm_per_col;
        let strength = (LINE_PEAK - rank as f64 * LINE_STRENGTH_STEP) / LINE_PEAK;
        for (j, value) in spectrum.iter_mut().enumerate() {
            let dist = (j as f64 - center).abs();
            if dist < half_width {
                *value += strength * (1.0 - dist / half_width);
            }
        }
    }
    for value in &mut spectrum {
        *value = value.min(1.0);
    }
    spectrum
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lcg_is_deterministic() {
        let mut a = Lcg::new(42);
        let mut b = Lcg::new(42);
        for _ in 0..100 {
            assert_eq!(a.next_u64(), b.next_u64());
        }
        let mut c = Lcg::new(43);
        assert_ne!(a.next_u64(), c.next_u64());
    }

    #[test]
    fn lcg_floats_stay_in_unit_interval() {
        let mut rng = Lcg::new(7);
        for _ in 0..1000 {
            let v = rng.next_f64();
            assert!((0.0..1.0).contains(&v));
        }
    }

    #[test]
    fn spectrum_peaks_at_emission_lines() {
        let cols = 512;
        let spectrum = emission_spectrum(cols, 250.0, 950.0);
        assert_eq!(spectrum.len(), cols);
        let nm_per_col = 700.0 / cols as f64;
        // The 546 nm line should be a local maximum over its neighborhood.
        let center = ((546.0 - 250.0) / nm_per_col).round() as usize;
        let peak = spectrum[center];
        assert!(peak > 0.5, "peak {peak} too weak");
        assert!(peak >= spectrum[center - 5]);
        assert!(peak >= spectrum[center + 5]);
    }

    #[test]
    fn out_of_range_lines_are_skipped() {
        // A window above 400 nm excludes the 253.7 and 365 nm lines.
        let spectrum = emission_spectrum(256, 400.0, 900.0);
        assert!(spectrum.iter().all(|v| (0.0..=1.0).contains(v)));
    }
}
