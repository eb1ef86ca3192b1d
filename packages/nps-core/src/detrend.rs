//! Background removal applied to ROI pixels before the Fourier transform.

use nalgebra::{DMatrix, DVector};
use ndarray::Array2;

use crate::config::{DetrendMode, FitOrder};
use crate::error::{NpsError, NpsResult};

/// Subtracts the scalar mean from every cell.
pub fn remove_mean(data: &mut Array2<f64>) {
    if data.is_empty() {
        return;
    }
    let mean = data.sum() / data.len() as f64;
    data.mapv_inplace(|v| v - mean);
}

/// Maps a pixel index onto `[-1, 1]`. A single-sample axis maps to 0.
fn normalized_coordinate(index: usize, len: usize) -> f64 {
    if len <= 1 {
        0.0
    } else {
        2.0 * index as f64 / (len - 1) as f64 - 1.0
    }
}

/// Values of all monomials `x^i * y^j` with `0 <= i, j <= degree`, in
/// `(i, j)` lexicographic order.
fn monomials(x: f64, y: f64, degree: usize, out: &mut [f64]) {
    let mut k = 0;
    for i in 0..=degree {
        for j in 0..=degree {
            out[k] = x.powi(i as i32) * y.powi(j as i32);
            k += 1;
        }
    }
}

/// Least-squares coefficients of a 2D polynomial surface over the whole array.
///
/// Every cell contributes one equation with its own `(x, y)` coordinate, so
/// non-square ROIs need no special treatment.
pub fn calculate_surface_coeffs(data: &Array2<f64>, order: FitOrder) -> NpsResult<DVector<f64>> {
    let (rows, cols) = data.dim();
    let degree = order.degree();
    let n_coeffs = (degree + 1) * (degree + 1);
    if rows * cols < n_coeffs {
        return Err(NpsError::Fit(format!(
            "{}x{} samples cannot determine {} coefficients",
            rows, cols, n_coeffs
        )));
    }

    let mut a = DMatrix::<f64>::zeros(rows * cols, n_coeffs);
    let mut z = DVector::<f64>::zeros(rows * cols);
    let mut basis = vec![0.0; n_coeffs];
    for ((r, c), &value) in data.indexed_iter() {
        let i = r * cols + c;
        monomials(
            normalized_coordinate(c, cols),
            normalized_coordinate(r, rows),
            degree,
            &mut basis,
        );
        for (k, &b) in basis.iter().enumerate() {
            a[(i, k)] = b;
        }
        z[i] = value;
    }

    let at = a.transpose();
    let ata = &at * &a;
    let atz = &at * &z;

    if let Some(cholesky) = ata.clone().cholesky() {
        return Ok(cholesky.solve(&atz));
    }
    ata.lu()
        .solve(&atz)
        .ok_or_else(|| NpsError::Fit("normal equations are singular".to_string()))
}

/// Evaluates the fitted surface at every cell and subtracts it.
pub fn remove_surface(data: &mut Array2<f64>, coeffs: &DVector<f64>, order: FitOrder) {
    let (rows, cols) = data.dim();
    let degree = order.degree();
    let mut basis = vec![0.0; coeffs.len()];
    for ((r, c), value) in data.indexed_iter_mut() {
        monomials(
            normalized_coordinate(c, cols),
            normalized_coordinate(r, rows),
            degree,
            &mut basis,
        );
        let trend: f64 = basis.iter().zip(coeffs.iter()).map(|(b, k)| b * k).sum();
        *value -= trend;
    }
}

/// Fits and removes a polynomial background, returning the coefficients.
pub fn remove_polynomial(data: &mut Array2<f64>, order: FitOrder) -> NpsResult<DVector<f64>> {
    let coeffs = calculate_surface_coeffs(data, order)?;
    remove_surface(data, &coeffs, order);
    Ok(coeffs)
}

/// Applies the configured background removal in place.
///
/// A polynomial fit that cannot be solved (ROI smaller than the number of
/// coefficients) falls back to mean removal.
pub fn detrend(data: &mut Array2<f64>, mode: DetrendMode) {
    match mode {
        DetrendMode::Flat => remove_mean(data),
        DetrendMode::Polynomial(order) => {
            if let Err(e) = remove_polynomial(data, order) {
                log::warn!("{}; using mean removal instead", e);
                remove_mean(data);
            }
        }
    }
}
