//! Frequency-domain HRV features.
//!
//! An RR sequence is an irregularly sampled time series: each value arrives
//! at the end of the previous interval. To estimate spectral power the
//! sequence is resampled onto a uniform grid with a cubic spline and a
//! segmented, windowed periodogram (Welch's method) is integrated over the
//! LF and HF bands.
//!
//! The VLF band is deliberately not computed: 60-second windows are too short
//! for stable very-low-frequency estimation.

use crate::config::Config;
use rustfft::{num_complex::Complex, FftPlanner};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Frequency-domain HRV features.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrequencyDomainFeatures {
    /// Low frequency power (0.04-0.15 Hz) in ms^2
    pub lf_power: f64,
    /// High frequency power (0.15-0.40 Hz) in ms^2
    pub hf_power: f64,
    /// LF/HF ratio (NaN when HF power is zero)
    pub lf_hf_ratio: f64,
    /// Total power (LF + HF) in ms^2
    pub total_power: f64,
    /// LF in normalized units (0-100, NaN when total power is zero)
    pub lf_nu: f64,
    /// HF in normalized units (0-100, NaN when total power is zero)
    pub hf_nu: f64,
    pub num_intervals: usize,
    pub is_valid: bool,
}

impl FrequencyDomainFeatures {
    pub const NAMES: [&'static str; 6] = [
        "lf_power",
        "hf_power",
        "lf_hf_ratio",
        "total_power",
        "lf_nu",
        "hf_nu",
    ];

    pub fn to_array(&self) -> [f64; 6] {
        [
            self.lf_power,
            self.hf_power,
            self.lf_hf_ratio,
            self.total_power,
            self.lf_nu,
            self.hf_nu,
        ]
    }

    fn invalid(num_intervals: usize) -> Self {
        Self {
            lf_power: f64::NAN,
            hf_power: f64::NAN,
            lf_hf_ratio: f64::NAN,
            total_power: f64::NAN,
            lf_nu: f64::NAN,
            hf_nu: f64::NAN,
            num_intervals,
            is_valid: false,
        }
    }

    /// Only the band powers gate validity. A NaN ratio with a zero HF band is
    /// a defined outcome the caller must handle, not a broken estimate.
    fn passes_gate(&self) -> bool {
        self.lf_power.is_finite()
            && self.hf_power.is_finite()
            && self.lf_power >= 0.0
            && self.hf_power >= 0.0
    }
}

/// Extracts the six spectral descriptors.
#[derive(Debug, Clone)]
pub struct FrequencyDomainExtractor {
    min_intervals: usize,
    resample_rate: f64,
    lf_band: (f64, f64),
    hf_band: (f64, f64),
}

impl FrequencyDomainExtractor {
    pub fn new(config: &Config) -> Self {
        Self {
            min_intervals: config.fd_min_intervals,
            resample_rate: config.fd_resample_rate,
            lf_band: config.lf_band,
            hf_band: config.hf_band,
        }
    }

    pub fn extract(&self, rr_ms: &[f64]) -> FrequencyDomainFeatures {
        let n = rr_ms.len();

        if n < self.min_intervals || n < 4 {
            return FrequencyDomainFeatures::invalid(n);
        }

        // Each RR value is anchored to the *start* of its interval: t[0] = 0,
        // t[i] = sum of rr[0..i] in seconds. Spectral phase is sensitive to
        // this alignment, so it must not be shifted to interval ends.
        let mut time_s = Vec::with_capacity(n);
        let mut acc = 0.0;
        for &rr in rr_ms {
            time_s.push(acc);
            acc += rr / 1000.0;
        }

        let duration = time_s[n - 1];
        let n_samples = (duration * self.resample_rate) as usize;
        if n_samples < 10 {
            return FrequencyDomainFeatures::invalid(n);
        }

        // Uniform grid over [0, duration], endpoint included.
        let step = duration / (n_samples - 1) as f64;
        let grid: Vec<f64> = (0..n_samples).map(|i| i as f64 * step).collect();

        let spline = match CubicSpline::fit(&time_s, rr_ms) {
            Some(s) => s,
            None => return FrequencyDomainFeatures::invalid(n),
        };
        let uniform: Vec<f64> = grid.iter().map(|&t| spline.eval(t)).collect();

        let (freqs, psd) = welch_psd(&uniform, self.resample_rate);

        let lf_power = band_power(&freqs, &psd, self.lf_band);
        let hf_power = band_power(&freqs, &psd, self.hf_band);

        let total_power = lf_power + hf_power;
        let lf_hf_ratio = if hf_power > 0.0 {
            lf_power / hf_power
        } else {
            f64::NAN
        };
        let (lf_nu, hf_nu) = if total_power > 0.0 {
            (
                lf_power / total_power * 100.0,
                hf_power / total_power * 100.0,
            )
        } else {
            (f64::NAN, f64::NAN)
        };

        let mut features = FrequencyDomainFeatures {
            lf_power,
            hf_power,
            lf_hf_ratio,
            total_power,
            lf_nu,
            hf_nu,
            num_intervals: n,
            is_valid: true,
        };

        if !features.passes_gate() {
            features.is_valid = false;
        }

        features
    }
}

/// Welch power spectral density estimate.
///
/// Segment length max(16, n/2) clamped to n, 50% overlap, per-segment linear
/// detrend, periodic Hann window, one-sided density scaling so integrating
/// over frequency yields power in the signal's squared units.
fn welch_psd(x: &[f64], fs: f64) -> (Vec<f64>, Vec<f64>) {
    let n = x.len();
    let nperseg = std::cmp::max(16, n / 2).min(n);
    let noverlap = nperseg / 2;
    let step = nperseg - noverlap;

    let window: Vec<f64> = (0..nperseg)
        .map(|k| 0.5 * (1.0 - (2.0 * PI * k as f64 / nperseg as f64).cos()))
        .collect();
    let win_energy: f64 = window.iter().map(|w| w * w).sum();
    let scale = 1.0 / (fs * win_energy);

    let n_freqs = nperseg / 2 + 1;
    let nyquist_bin = if nperseg % 2 == 0 {
        Some(n_freqs - 1)
    } else {
        None
    };

    let mut planner = FftPlanner::new();
    let fft = planner.plan_fft_forward(nperseg);

    let mut psd = vec![0.0; n_freqs];
    let mut n_segments = 0usize;
    let mut start = 0usize;

    while start + nperseg <= n {
        let mut segment = x[start..start + nperseg].to_vec();
        detrend_linear(&mut segment);

        let mut buffer: Vec<Complex<f64>> = segment
            .iter()
            .zip(window.iter())
            .map(|(&s, &w)| Complex::new(s * w, 0.0))
            .collect();
        fft.process(&mut buffer);

        for (k, bin) in psd.iter_mut().enumerate() {
            let mut power = buffer[k].norm_sqr() * scale;
            // One-sided spectrum: fold negative frequencies into positive,
            // except at DC and (for even lengths) the Nyquist bin.
            if k != 0 && Some(k) != nyquist_bin {
                power *= 2.0;
            }
            *bin += power;
        }

        n_segments += 1;
        start += step;
    }

    if n_segments > 0 {
        for bin in psd.iter_mut() {
            *bin /= n_segments as f64;
        }
    }

    let freqs: Vec<f64> = (0..n_freqs)
        .map(|k| k as f64 * fs / nperseg as f64)
        .collect();

    (freqs, psd)
}

/// Remove the least-squares line from a segment in place.
fn detrend_linear(segment: &mut [f64]) {
    let n = segment.len() as f64;
    if segment.len() < 2 {
        return;
    }

    let t_mean = (n - 1.0) / 2.0;
    let x_mean = segment.iter().sum::<f64>() / n;

    let mut num = 0.0;
    let mut den = 0.0;
    for (i, &v) in segment.iter().enumerate() {
        let dt = i as f64 - t_mean;
        num += dt * (v - x_mean);
        den += dt * dt;
    }
    let slope = if den > 0.0 { num / den } else { 0.0 };

    for (i, v) in segment.iter_mut().enumerate() {
        *v -= x_mean + slope * (i as f64 - t_mean);
    }
}

/// Trapezoidal integral of the PSD over `[band.0, band.1]` (inclusive bin
/// selection). A band with no frequency bins integrates to zero.
fn band_power(freqs: &[f64], psd: &[f64], band: (f64, f64)) -> f64 {
    let lo = freqs.partition_point(|&f| f < band.0);
    let hi = freqs.partition_point(|&f| f <= band.1);
    if hi <= lo + 1 {
        // Zero or one bin in the band: nothing to integrate over.
        return 0.0;
    }

    let mut power = 0.0;
    for i in lo..hi - 1 {
        power += 0.5 * (psd[i] + psd[i + 1]) * (freqs[i + 1] - freqs[i]);
    }
    power
}

/// Cubic spline with not-a-knot boundary conditions.
///
/// Queries outside the knot range are evaluated on the boundary polynomial,
/// which is how the resampling grid is allowed to extrapolate.
struct CubicSpline {
    xs: Vec<f64>,
    ys: Vec<f64>,
    /// Second derivatives at the knots
    m: Vec<f64>,
}

impl CubicSpline {
    /// Fit to strictly increasing `xs`. Requires at least 4 knots; returns
    /// None for degenerate input.
    fn fit(xs: &[f64], ys: &[f64]) -> Option<Self> {
        let n = xs.len();
        if n < 4 || ys.len() != n {
            return None;
        }
        let h: Vec<f64> = xs.windows(2).map(|w| w[1] - w[0]).collect();
        if h.iter().any(|&d| d <= 0.0) {
            return None;
        }

        // Solve for interior second derivatives M_1..M_{n-2}. The not-a-knot
        // conditions express M_0 and M_{n-1} in terms of their neighbours:
        //   M_0     = ((h0+h1) M_1 - h0 M_2) / h1
        //   M_{n-1} = ((h_{n-2}+h_{n-3}) M_{n-2} - h_{n-2} M_{n-3}) / h_{n-3}
        // Substituting into the first and last interior continuity equations
        // keeps the system tridiagonal.
        let k = n - 2;
        let mut sub = vec![0.0; k];
        let mut diag = vec![0.0; k];
        let mut sup = vec![0.0; k];
        let mut rhs = vec![0.0; k];

        for i in 1..=k {
            rhs[i - 1] = 6.0 * ((ys[i + 1] - ys[i]) / h[i] - (ys[i] - ys[i - 1]) / h[i - 1]);
        }

        for i in 1..=k {
            let row = i - 1;
            sub[row] = h[i - 1];
            diag[row] = 2.0 * (h[i - 1] + h[i]);
            sup[row] = h[i];
        }

        // Fold the boundary expressions into the first and last rows.
        diag[0] += h[0] * (h[0] + h[1]) / h[1];
        sup[0] -= h[0] * h[0] / h[1];
        diag[k - 1] += h[n - 2] * (h[n - 2] + h[n - 3]) / h[n - 3];
        sub[k - 1] -= h[n - 2] * h[n - 2] / h[n - 3];

        let interior = solve_tridiagonal(&sub, &mut diag, &sup, &mut rhs)?;

        let mut m = vec![0.0; n];
        m[1..=k].copy_from_slice(&interior);
        m[0] = ((h[0] + h[1]) * m[1] - h[0] * m[2]) / h[1];
        m[n - 1] = ((h[n - 2] + h[n - 3]) * m[n - 2] - h[n - 2] * m[n - 3]) / h[n - 3];

        Some(Self {
            xs: xs.to_vec(),
            ys: ys.to_vec(),
            m,
        })
    }

    fn eval(&self, t: f64) -> f64 {
        let n = self.xs.len();
        // Clamp to a boundary segment for extrapolation.
        let i = self
            .xs
            .partition_point(|&x| x <= t)
            .saturating_sub(1)
            .min(n - 2);

        let h = self.xs[i + 1] - self.xs[i];
        let s = t - self.xs[i];
        let (y0, y1) = (self.ys[i], self.ys[i + 1]);
        let (m0, m1) = (self.m[i], self.m[i + 1]);

        let b = (y1 - y0) / h - h * (2.0 * m0 + m1) / 6.0;
        let c = m0 / 2.0;
        let d = (m1 - m0) / (6.0 * h);

        y0 + s * (b + s * (c + s * d))
    }
}

/// Thomas algorithm. `sub[0]` and `sup[k-1]` are ignored. Mutates its scratch
/// arguments; returns None on a vanishing pivot.
fn solve_tridiagonal(
    sub: &[f64],
    diag: &mut [f64],
    sup: &[f64],
    rhs: &mut [f64],
) -> Option<Vec<f64>> {
    let k = diag.len();
    for i in 1..k {
        if diag[i - 1] == 0.0 {
            return None;
        }
        let w = sub[i] / diag[i - 1];
        diag[i] -= w * sup[i - 1];
        rhs[i] -= w * rhs[i - 1];
    }
    if diag[k - 1] == 0.0 {
        return None;
    }

    let mut x = vec![0.0; k];
    x[k - 1] = rhs[k - 1] / diag[k - 1];
    for i in (0..k - 1).rev() {
        x[i] = (rhs[i] - sup[i] * x[i + 1]) / diag[i];
    }
    Some(x)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extractor() -> FrequencyDomainExtractor {
        FrequencyDomainExtractor::new(&Config::default())
    }

    /// RR sequence whose interval lengths oscillate at `freq_hz`, producing a
    /// spectral peak there after resampling.
    fn modulated_rr(n: usize, base_ms: f64, depth_ms: f64, freq_hz: f64) -> Vec<f64> {
        let mut rr = Vec::with_capacity(n);
        let mut t = 0.0;
        for _ in 0..n {
            let v = base_ms + depth_ms * (2.0 * PI * freq_hz * t).sin();
            rr.push(v);
            t += v / 1000.0;
        }
        rr
    }

    #[test]
    fn test_short_sequence_is_invalid_with_nan_fields() {
        let rr = vec![800.0; 19];
        let f = extractor().extract(&rr);
        assert!(!f.is_valid);
        assert!(f.to_array().iter().all(|v| v.is_nan()));
        assert_eq!(f.num_intervals, 19);
    }

    #[test]
    fn test_hf_modulation_lands_in_hf_band() {
        // 0.25 Hz modulation sits in the middle of the HF band.
        let rr = modulated_rr(100, 800.0, 50.0, 0.25);
        let f = extractor().extract(&rr);
        assert!(f.is_valid);
        assert!(f.hf_power > f.lf_power);
        assert!(f.lf_hf_ratio < 1.0);
        assert!((f.lf_nu + f.hf_nu - 100.0).abs() < 1e-6);
    }

    #[test]
    fn test_lf_modulation_lands_in_lf_band() {
        let rr = modulated_rr(100, 800.0, 50.0, 0.1);
        let f = extractor().extract(&rr);
        assert!(f.is_valid);
        assert!(f.lf_power > f.hf_power);
        assert!(f.lf_hf_ratio > 1.0);
    }

    #[test]
    fn test_constant_sequence_is_valid_with_zero_power() {
        // Detrending removes a constant exactly; zero band power is a defined
        // outcome with a NaN ratio, not an invalid domain.
        let rr = vec![800.0; 75];
        let f = extractor().extract(&rr);
        assert!(f.is_valid);
        assert_eq!(f.lf_power, 0.0);
        assert_eq!(f.hf_power, 0.0);
        assert!(f.lf_hf_ratio.is_nan());
        assert!(f.lf_nu.is_nan());
    }

    #[test]
    fn test_total_power_is_band_sum() {
        let rr = modulated_rr(120, 850.0, 40.0, 0.2);
        let f = extractor().extract(&rr);
        assert!(f.is_valid);
        assert!((f.total_power - (f.lf_power + f.hf_power)).abs() < 1e-9);
    }

    #[test]
    fn test_spline_interpolates_knots() {
        let xs = [0.0, 1.0, 2.0, 3.0, 4.0, 5.0];
        let ys = [1.0, 3.0, 2.0, 5.0, 4.0, 6.0];
        let s = CubicSpline::fit(&xs, &ys).unwrap();
        for (&x, &y) in xs.iter().zip(ys.iter()) {
            assert!((s.eval(x) - y).abs() < 1e-9, "knot ({x}, {y})");
        }
    }

    #[test]
    fn test_spline_reproduces_cubic_polynomial() {
        // Not-a-knot splines are exact on cubics, including extrapolation.
        let poly = |x: f64| 0.5 * x * x * x - 2.0 * x * x + x + 3.0;
        let xs: Vec<f64> = (0..8).map(|i| i as f64).collect();
        let ys: Vec<f64> = xs.iter().map(|&x| poly(x)).collect();
        let s = CubicSpline::fit(&xs, &ys).unwrap();
        for &x in &[0.5, 2.7, 6.9, -0.5, 7.5] {
            assert!((s.eval(x) - poly(x)).abs() < 1e-6, "at x={x}");
        }
    }

    #[test]
    fn test_welch_locates_sinusoid() {
        let fs = 4.0;
        let freq = 0.25;
        let x: Vec<f64> = (0..256)
            .map(|i| (2.0 * PI * freq * i as f64 / fs).sin())
            .collect();
        let (freqs, psd) = welch_psd(&x, fs);

        let peak = psd
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap())
            .map(|(i, _)| freqs[i])
            .unwrap();
        assert!((peak - freq).abs() < 0.05, "peak at {peak} Hz");
    }

    #[test]
    fn test_welch_density_integrates_to_signal_power() {
        // For a sinusoid of amplitude A, total power is A^2 / 2.
        let fs = 4.0;
        let amp = 3.0;
        let x: Vec<f64> = (0..512)
            .map(|i| amp * (2.0 * PI * 0.2 * i as f64 / fs).sin())
            .collect();
        let (freqs, psd) = welch_psd(&x, fs);
        let total = band_power(&freqs, &psd, (0.0, fs / 2.0));
        assert!(
            (total - amp * amp / 2.0).abs() / (amp * amp / 2.0) < 0.15,
            "integrated power {total}"
        );
    }

    #[test]
    fn test_empty_band_integrates_to_zero() {
        let freqs = [0.0, 0.5, 1.0, 1.5, 2.0];
        let psd = [1.0, 1.0, 1.0, 1.0, 1.0];
        assert_eq!(band_power(&freqs, &psd, (0.6, 0.9)), 0.0);
        assert_eq!(band_power(&freqs, &psd, (3.0, 4.0)), 0.0);
    }

    #[test]
    fn test_detrend_removes_line() {
        let mut x: Vec<f64> = (0..32).map(|i| 2.0 + 0.5 * i as f64).collect();
        detrend_linear(&mut x);
        assert!(x.iter().all(|v| v.abs() < 1e-9));
    }
}
