//! Double-precision numerical kernels for the soft-iron ellipsoid fit

use nalgebra::{Matrix3, SMatrix, SVector};

/// Iteration cap for the power method.
pub const POWER_ITERATION_MAX: usize = 100;
/// Convergence tolerance on the successive-iterate difference.
pub const POWER_ITERATION_TOL: f64 = 1e-6;
/// Determinant magnitude below which a 3x3 matrix is treated as singular.
pub const DET_EPSILON: f64 = 1e-6;

/// Extracts the dominant eigenvector of a symmetric 10x10 matrix by power
/// iteration, starting from the first basis vector.
///
/// Returns the last iterate and whether the successive-iterate difference
/// dropped below tolerance within the iteration cap.
pub fn power_iteration(a: &SMatrix<f64, 10, 10>) -> (SVector<f64, 10>, bool) {
    let mut b = SVector::<f64, 10>::zeros();
    b[0] = 1.0;

    for _ in 0..POWER_ITERATION_MAX {
        let mut next = a * b;
        normalize_in_place(&mut next);

        if (next - b).norm() < POWER_ITERATION_TOL {
            return (next, true);
        }
        b = next;
    }

    (b, false)
}

/// Normalizes a vector in place, leaving zero vectors untouched.
fn normalize_in_place(v: &mut SVector<f64, 10>) {
    let norm = v.norm();
    if norm != 0.0 {
        *v /= norm;
    }
}

/// Closed-form cofactor inverse of a 3x3 matrix.
///
/// Returns `None` when the determinant magnitude is below [`DET_EPSILON`].
pub fn invert_3x3(m: &Matrix3<f64>) -> Option<Matrix3<f64>> {
    let det = m[(0, 0)] * (m[(1, 1)] * m[(2, 2)] - m[(1, 2)] * m[(2, 1)])
        - m[(0, 1)] * (m[(1, 0)] * m[(2, 2)] - m[(1, 2)] * m[(2, 0)])
        + m[(0, 2)] * (m[(1, 0)] * m[(2, 1)] - m[(1, 1)] * m[(2, 0)]);

    if det.abs() < DET_EPSILON {
        return None;
    }
    let inv_det = 1.0 / det;

    Some(Matrix3::new(
        (m[(1, 1)] * m[(2, 2)] - m[(1, 2)] * m[(2, 1)]) * inv_det,
        -(m[(0, 1)] * m[(2, 2)] - m[(0, 2)] * m[(2, 1)]) * inv_det,
        (m[(0, 1)] * m[(1, 2)] - m[(0, 2)] * m[(1, 1)]) * inv_det,
        -(m[(1, 0)] * m[(2, 2)] - m[(1, 2)] * m[(2, 0)]) * inv_det,
        (m[(0, 0)] * m[(2, 2)] - m[(0, 2)] * m[(2, 0)]) * inv_det,
        -(m[(0, 0)] * m[(1, 2)] - m[(0, 2)] * m[(1, 0)]) * inv_det,
        (m[(1, 0)] * m[(2, 1)] - m[(1, 1)] * m[(2, 0)]) * inv_det,
        -(m[(0, 0)] * m[(2, 1)] - m[(0, 1)] * m[(2, 0)]) * inv_det,
        (m[(0, 0)] * m[(1, 1)] - m[(0, 1)] * m[(1, 0)]) * inv_det,
    ))
}

/// Scales each row of the matrix so its diagonal entry becomes 1, in place.
///
/// A row whose diagonal entry is exactly 0 is left unscaled and the function
/// reports failure for the matrix as a whole. Note the rows are normalized
/// independently, so a symmetric input generally comes out non-symmetric.
pub fn normalize_rows_by_diagonal(m: &mut Matrix3<f64>) -> bool {
    let mut success = true;
    for i in 0..3 {
        let diag = m[(i, i)];
        if diag == 0.0 {
            success = false;
            continue;
        }
        let scale = 1.0 / diag;
        for j in 0..3 {
            m[(i, j)] *= scale;
        }
    }
    success
}
