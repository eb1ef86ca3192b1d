//! Noise power spectrum of a single ROI.

use ndarray::Array2;
use num_complex::Complex;
use rustfft::FftPlanner;
use serde::Serialize;

use crate::config::DetrendMode;
use crate::detrend::detrend;
use crate::radial::radial_profile;

/// Radially averaged noise power spectrum of one ROI.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NpsProfile {
    /// Radial mean of the normalized power spectrum. `values[0]` is the
    /// zero-frequency cell itself, `values[1]` the mean of the innermost ring.
    pub values: Vec<f64>,
    /// Spatial frequency of each sample in line pairs per cm.
    pub frequencies: Vec<f64>,
    /// Sum of `values`, skipping undefined rings.
    pub auc: f64,
    /// Sum of every entry of the 2D power spectrum.
    pub integral_2d: f64,
}

/// Full 2D power spectrum, zero frequency at `(rows / 2, cols / 2)`.
///
/// Normalized by `(rows * cols)^2` so that the sum of all entries equals the
/// mean squared value of the input.
pub fn power_spectrum(data: &Array2<f64>) -> Array2<f64> {
    let (rows, cols) = data.dim();
    if rows == 0 || cols == 0 {
        return Array2::zeros((rows, cols));
    }
    let mut planner = FftPlanner::new();
    let fft_rows = planner.plan_fft_forward(cols);
    let fft_cols = planner.plan_fft_forward(rows);

    // rustfft transforms every `cols`-long chunk of a row-major buffer.
    let mut buffer: Vec<Complex<f64>> = data.iter().map(|&v| Complex::new(v, 0.0)).collect();
    fft_rows.process(&mut buffer);

    // Columns, after reordering into a contiguous column-major buffer.
    let mut columns: Vec<Complex<f64>> = (0..rows * cols)
        .map(|k| buffer[(k % rows) * cols + k / rows])
        .collect();
    fft_cols.process(&mut columns);

    let n_elements = (rows * cols) as f64;
    let mut power = Array2::from_shape_fn((rows, cols), |(r, c)| {
        columns[c * rows + r].norm_sqr() / n_elements.powi(2)
    });
    fftshift_2d(&mut power);
    power
}

/// Spatial frequencies matching a radial profile of an ROI whose largest
/// dimension is `max_dim` pixels.
///
/// Ring `r` sits at `r / (max_dim * spacing)`. The leading zero pairs with the
/// duplicated centre sample of [`radial_profile`], giving
/// `max_dim / 2 + 2` frequencies.
pub fn radial_frequencies(max_dim: usize, spacing_cm: f64) -> Vec<f64> {
    if max_dim == 0 {
        return Vec::new();
    }
    let extent = max_dim as f64 * spacing_cm;
    std::iter::once(0.0)
        .chain((0..=max_dim / 2).map(|r| r as f64 / extent))
        .collect()
}

/// Detrends a copy of `roi`, transforms it and reduces the spectrum radially.
///
/// `pixel_spacing` is `(row, column)` in mm. Only the row spacing sets the
/// frequency axis.
pub fn compute_nps(roi: &Array2<f64>, pixel_spacing: (f64, f64), mode: DetrendMode) -> NpsProfile {
    let mut detrended = roi.clone();
    detrend(&mut detrended, mode);

    let power = power_spectrum(&detrended);
    let values = radial_profile(&power);

    let (rows, cols) = roi.dim();
    let spacing_cm = pixel_spacing.0 / 10.0;
    let frequencies = radial_frequencies(rows.max(cols), spacing_cm);

    let auc = values.iter().filter(|v| !v.is_nan()).sum();
    let integral_2d = power.sum();

    NpsProfile {
        values,
        frequencies,
        auc,
        integral_2d,
    }
}

/// Shifts the zero-frequency component to the center of a 2D array.
pub fn fftshift_2d<T: Clone>(array: &mut Array2<T>) {
    let (rows, cols) = array.dim();
    let (rows2, cols2) = (rows.div_ceil(2), cols.div_ceil(2));
    let source = array.clone();
    for ((r, c), value) in array.indexed_iter_mut() {
        // Output (r, c) receives input ((r + ceil(rows/2)) % rows, ...).
        *value = source[[(r + rows2) % rows, (c + cols2) % cols]].clone();
    }
}
