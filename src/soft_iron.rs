//! Soft-iron magnetometer calibration by implicit ellipsoid fitting
//!
//! Centered raw samples are expanded into the ten quadric monomials
//! {x2, y2, z2, xy, xz, yz, x, y, z, 1} and accumulated into a 10x10
//! scatter matrix. At session end the dominant eigenvector of the
//! normalized scatter yields the quadric coefficients [A..J]; the 3x3
//! quadratic form is inverted in closed form to recover the ellipsoid
//! center and shape, and the scaled inverse, row-normalized to a unit
//! diagonal, becomes the committed soft-iron correction matrix.
//!
//! All accumulation and eigen-solving run in f64; only the committed
//! matrix is narrowed to the f32 working type of the correction step.

use nalgebra::{Matrix3, SMatrix, SVector, Vector3};

use crate::numeric::{invert_3x3, normalize_rows_by_diagonal, power_iteration};

/// Guard for the ellipsoid scale denominator.
const SCALE_EPSILON: f64 = 1e-6;

#[derive(Debug, Clone)]
pub struct SoftIronCalibrator {
    scatter: SMatrix<f64, 10, 10>,
    sample_count: u32,
    matrix: Matrix3<f32>,
    center: Vector3<f64>,
    fitted: bool,
}

impl SoftIronCalibrator {
    pub fn new() -> Self {
        Self {
            scatter: SMatrix::zeros(),
            sample_count: 0,
            matrix: Matrix3::identity(),
            center: Vector3::zeros(),
            fitted: false,
        }
    }

    /// Clears the scatter accumulator for a new session. The committed
    /// matrix is left in place until a new fit succeeds.
    pub fn reset(&mut self) {
        self.scatter = SMatrix::zeros();
        self.sample_count = 0;
        self.fitted = false;
    }

    pub fn sample_count(&self) -> u32 {
        self.sample_count
    }

    /// The committed correction matrix (identity until a fit succeeds).
    pub fn matrix(&self) -> &Matrix3<f32> {
        &self.matrix
    }

    /// Fitted ellipsoid center in raw counts, relative to the hard-iron
    /// offset the samples were centered with. Diagnostic only.
    pub fn center(&self) -> Vector3<f64> {
        self.center
    }

    pub fn has_fit(&self) -> bool {
        self.fitted
    }

    /// Accumulates one raw magnetometer sample centered by the current
    /// hard-iron offset.
    pub fn accumulate(&mut self, mag: [i16; 3], hard_iron: [i32; 3]) {
        let x = (mag[0] as i32 - hard_iron[0]) as f64;
        let y = (mag[1] as i32 - hard_iron[1]) as f64;
        let z = (mag[2] as i32 - hard_iron[2]) as f64;

        let m = SVector::<f64, 10>::from_column_slice(&[
            x * x,
            y * y,
            z * z,
            x * y,
            x * z,
            y * z,
            x,
            y,
            z,
            1.0,
        ]);
        self.scatter += m * m.transpose();
        self.sample_count += 1;
    }

    /// Runs the ellipsoid fit over the accumulated scatter and commits the
    /// soft-iron matrix on success.
    ///
    /// Every failure path (no samples, non-converged eigenvector, singular
    /// quadratic form) returns false and leaves the previously committed
    /// matrix untouched.
    pub fn compute_matrix(&mut self) -> bool {
        if self.sample_count == 0 {
            return false;
        }

        let normalized = self.scatter / self.sample_count as f64;
        let (quadric, converged) = power_iteration(&normalized);
        if !converged {
            return false;
        }

        // Quadric Ax2 + By2 + Cz2 + Dxy + Exz + Fyz + Gx + Hy + Iz + J = 0
        let (a, b, c) = (quadric[0], quadric[1], quadric[2]);
        let (d, e, f) = (quadric[3], quadric[4], quadric[5]);
        let (g, h, i) = (quadric[6], quadric[7], quadric[8]);
        let j = quadric[9];

        let q = Matrix3::new(a, d / 2.0, e / 2.0, d / 2.0, b, f / 2.0, e / 2.0, f / 2.0, c);
        let v = Vector3::new(g / 2.0, h / 2.0, i / 2.0);

        let q_inv = match invert_3x3(&q) {
            Some(inv) => inv,
            None => return false,
        };

        self.center = -(q_inv * v);

        let denominator = (v.transpose() * q_inv * v)[(0, 0)] - j;
        let scale = if denominator.abs() < SCALE_EPSILON {
            1.0
        } else {
            1.0 / denominator
        };

        let mut corrected = q_inv * scale;
        // Per-row diagonal normalization; rows with a zero diagonal stay
        // unscaled, and the result is generally not symmetric.
        normalize_rows_by_diagonal(&mut corrected);

        self.matrix = corrected.map(|x| x as f32);
        self.fitted = true;
        true
    }
}

impl Default for SoftIronCalibrator {
    fn default() -> Self {
        Self::new()
    }
}
