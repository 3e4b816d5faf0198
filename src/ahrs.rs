//! Gradient-descent orientation filter (Madgwick)
//!
//! Implementation of Sebastian Madgwick's "...efficient orientation filter
//! for... inertial/magnetic sensor arrays", fusing rotation rate,
//! acceleration and magnetic moments into a quaternion estimate of the
//! absolute device orientation. The closed-form gradient step matches the
//! corrected reference derivation term for term; a degenerate 6-axis path
//! handles invalid magnetometer data.
//!
//! There is a tradeoff in the beta parameter between accuracy and response
//! speed: it is the rate of convergence of the filter. Higher values give a
//! noisy but fast output; beta = 0 integrates the gyroscope only.

use nalgebra::Vector3;

use crate::math::{DEG_TO_RAD, accurate_inverse_sqrt};
use crate::types::BETA_DEFAULT;

/// Quaternion attitude filter state.
///
/// The quaternion maps the sensor frame to the reference frame and is
/// re-normalized after every update; it starts at identity.
#[derive(Debug, Clone)]
pub struct AttitudeFilter {
    pub q0: f32,
    pub q1: f32,
    pub q2: f32,
    pub q3: f32,
    beta: f32,
    delta_t: f32,
    flux_x: f32,
    flux_z: f32,
}

impl AttitudeFilter {
    pub fn new() -> Self {
        Self {
            q0: 1.0,
            q1: 0.0,
            q2: 0.0,
            q3: 0.0,
            beta: BETA_DEFAULT,
            delta_t: 0.005,
            flux_x: 1.0,
            flux_z: 0.0,
        }
    }

    /// Resets the quaternion to identity without touching the tuning.
    pub fn reset(&mut self) {
        self.q0 = 1.0;
        self.q1 = 0.0;
        self.q2 = 0.0;
        self.q3 = 0.0;
        self.flux_x = 1.0;
        self.flux_z = 0.0;
    }

    pub fn beta(&self) -> f32 {
        self.beta
    }

    pub fn set_beta(&mut self, beta: f32) {
        self.beta = beta;
    }

    pub fn delta_t(&self) -> f32 {
        self.delta_t
    }

    /// Sets the integration interval in seconds.
    pub fn set_delta_t(&mut self, delta_t: f32) {
        self.delta_t = delta_t;
    }

    pub fn quaternion(&self) -> (f32, f32, f32, f32) {
        (self.q0, self.q1, self.q2, self.q3)
    }

    /// Earth-frame field reference from the last magnetic update: the
    /// horizontal and vertical components of the normalized measurement
    /// rotated into the reference frame. Holds its last value across 6-axis
    /// ticks, (1, 0) until the first magnetic update.
    pub fn flux(&self) -> (f32, f32) {
        (self.flux_x, self.flux_z)
    }

    /// Full 9-axis update. Accel in g, gyro in deg/s, mag in any consistent
    /// unit. Falls back to the 6-axis path when the magnetometer reading is
    /// exactly zero, which would otherwise NaN during normalization.
    pub fn update(&mut self, accel: Vector3<f32>, gyro: Vector3<f32>, mag: Vector3<f32>) {
        let (mut ax, mut ay, mut az) = (accel.x, accel.y, accel.z);
        let (mut mx, mut my, mut mz) = (mag.x, mag.y, mag.z);

        if mx == 0.0 && my == 0.0 && mz == 0.0 {
            self.update_imu(accel, gyro);
            return;
        }

        let gx = gyro.x * DEG_TO_RAD;
        let gy = gyro.y * DEG_TO_RAD;
        let gz = gyro.z * DEG_TO_RAD;

        let (q0, q1, q2, q3) = (self.q0, self.q1, self.q2, self.q3);

        // Rate of change of quaternion from gyroscope
        let mut q_dot1 = 0.5 * (-q1 * gx - q2 * gy - q3 * gz);
        let mut q_dot2 = 0.5 * (q0 * gx + q2 * gz - q3 * gy);
        let mut q_dot3 = 0.5 * (q0 * gy - q1 * gz + q3 * gx);
        let mut q_dot4 = 0.5 * (q0 * gz + q1 * gy - q2 * gx);

        // Feedback only with a valid accelerometer measurement
        if !(ax == 0.0 && ay == 0.0 && az == 0.0) {
            let mut recip_norm = accurate_inverse_sqrt(ax * ax + ay * ay + az * az);
            ax *= recip_norm;
            ay *= recip_norm;
            az *= recip_norm;

            recip_norm = accurate_inverse_sqrt(mx * mx + my * my + mz * mz);
            mx *= recip_norm;
            my *= recip_norm;
            mz *= recip_norm;

            // Auxiliary variables to avoid repeated arithmetic
            let _2q0mx = 2.0 * q0 * mx;
            let _2q0my = 2.0 * q0 * my;
            let _2q0mz = 2.0 * q0 * mz;
            let _2q1mx = 2.0 * q1 * mx;
            let _2q0 = 2.0 * q0;
            let _2q1 = 2.0 * q1;
            let _2q2 = 2.0 * q2;
            let _2q3 = 2.0 * q3;
            let _2q0q2 = 2.0 * q0 * q2;
            let _2q2q3 = 2.0 * q2 * q3;
            let q0q0 = q0 * q0;
            let q0q1 = q0 * q1;
            let q0q2 = q0 * q2;
            let q0q3 = q0 * q3;
            let q1q1 = q1 * q1;
            let q1q2 = q1 * q2;
            let q1q3 = q1 * q3;
            let q2q2 = q2 * q2;
            let q2q3 = q2 * q3;
            let q3q3 = q3 * q3;

            // Reference direction of Earth's magnetic field
            let hx = mx * q0q0 - _2q0my * q3 + _2q0mz * q2 + mx * q1q1 + _2q1 * my * q2
                + _2q1 * mz * q3
                - mx * q2q2
                - mx * q3q3;
            let hy = _2q0mx * q3 + my * q0q0 - _2q0mz * q1 + _2q1mx * q2 - my * q1q1
                + my * q2q2
                + _2q2 * mz * q3
                - my * q3q3;
            let _2bx = (hx * hx + hy * hy).sqrt();
            let _2bz = -_2q0mx * q2 + _2q0my * q1 + mz * q0q0 + _2q1mx * q3 - mz * q1q1
                + _2q2 * my * q3
                - mz * q2q2
                + mz * q3q3;
            self.flux_x = _2bx;
            self.flux_z = _2bz;
            let _4bx = 2.0 * _2bx;
            let _4bz = 2.0 * _2bz;
            let _8bx = 2.0 * _4bx;
            let _8bz = 2.0 * _4bz;

            // Gradient descent corrective step
            let mut s0 = -_2q2 * (2.0 * q1q3 - _2q0q2 - ax) + _2q1 * (2.0 * q0q1 + _2q2q3 - ay)
                - _4bz * q2 * (_4bx * (0.5 - q2q2 - q3q3) + _4bz * (q1q3 - q0q2) - mx)
                + (-_4bx * q3 + _4bz * q1)
                    * (_4bx * (q1q2 - q0q3) + _4bz * (q0q1 + q2q3) - my)
                + _4bx * q2 * (_4bx * (q0q2 + q1q3) + _4bz * (0.5 - q1q1 - q2q2) - mz);
            let mut s1 = _2q3 * (2.0 * q1q3 - _2q0q2 - ax) + _2q0 * (2.0 * q0q1 + _2q2q3 - ay)
                - 4.0 * q1 * (1.0 - 2.0 * q1q1 - 2.0 * q2q2 - az)
                + _4bz * q3 * (_4bx * (0.5 - q2q2 - q3q3) + _4bz * (q1q3 - q0q2) - mx)
                + (_4bx * q2 + _4bz * q0)
                    * (_4bx * (q1q2 - q0q3) + _4bz * (q0q1 + q2q3) - my)
                + (_4bx * q3 - _8bz * q1)
                    * (_4bx * (q0q2 + q1q3) + _4bz * (0.5 - q1q1 - q2q2) - mz);
            let mut s2 = -_2q0 * (2.0 * q1q3 - _2q0q2 - ax) + _2q3 * (2.0 * q0q1 + _2q2q3 - ay)
                - 4.0 * q2 * (1.0 - 2.0 * q1q1 - 2.0 * q2q2 - az)
                + (-_8bx * q2 - _4bz * q0)
                    * (_4bx * (0.5 - q2q2 - q3q3) + _4bz * (q1q3 - q0q2) - mx)
                + (_4bx * q1 + _4bz * q3)
                    * (_4bx * (q1q2 - q0q3) + _4bz * (q0q1 + q2q3) - my)
                + (_4bx * q0 - _8bz * q2)
                    * (_4bx * (q0q2 + q1q3) + _4bz * (0.5 - q1q1 - q2q2) - mz);
            let mut s3 = _2q1 * (2.0 * q1q3 - _2q0q2 - ax) + _2q2 * (2.0 * q0q1 + _2q2q3 - ay)
                + (-_8bx * q3 + _4bz * q1)
                    * (_4bx * (0.5 - q2q2 - q3q3) + _4bz * (q1q3 - q0q2) - mx)
                + (-_4bx * q0 + _4bz * q2)
                    * (_4bx * (q1q2 - q0q3) + _4bz * (q0q1 + q2q3) - my)
                + _4bx * q1 * (_4bx * (q0q2 + q1q3) + _4bz * (0.5 - q1q1 - q2q2) - mz);

            // Normalize step magnitude
            recip_norm = accurate_inverse_sqrt(s0 * s0 + s1 * s1 + s2 * s2 + s3 * s3);
            s0 *= recip_norm;
            s1 *= recip_norm;
            s2 *= recip_norm;
            s3 *= recip_norm;

            // Apply feedback step
            q_dot1 -= self.beta * s0;
            q_dot2 -= self.beta * s1;
            q_dot3 -= self.beta * s2;
            q_dot4 -= self.beta * s3;
        }

        self.integrate(q_dot1, q_dot2, q_dot3, q_dot4);
    }

    /// 6-axis update used when no magnetometer data is available; the
    /// gradient step corrects against gravity alone.
    pub fn update_imu(&mut self, accel: Vector3<f32>, gyro: Vector3<f32>) {
        let (mut ax, mut ay, mut az) = (accel.x, accel.y, accel.z);

        let gx = gyro.x * DEG_TO_RAD;
        let gy = gyro.y * DEG_TO_RAD;
        let gz = gyro.z * DEG_TO_RAD;

        let (q0, q1, q2, q3) = (self.q0, self.q1, self.q2, self.q3);

        let mut q_dot1 = 0.5 * (-q1 * gx - q2 * gy - q3 * gz);
        let mut q_dot2 = 0.5 * (q0 * gx + q2 * gz - q3 * gy);
        let mut q_dot3 = 0.5 * (q0 * gy - q1 * gz + q3 * gx);
        let mut q_dot4 = 0.5 * (q0 * gz + q1 * gy - q2 * gx);

        if !(ax == 0.0 && ay == 0.0 && az == 0.0) {
            let mut recip_norm = accurate_inverse_sqrt(ax * ax + ay * ay + az * az);
            ax *= recip_norm;
            ay *= recip_norm;
            az *= recip_norm;

            let _2q0 = 2.0 * q0;
            let _2q1 = 2.0 * q1;
            let _2q2 = 2.0 * q2;
            let _2q3 = 2.0 * q3;
            let _4q0 = 4.0 * q0;
            let _4q1 = 4.0 * q1;
            let _4q2 = 4.0 * q2;
            let _8q1 = 8.0 * q1;
            let _8q2 = 8.0 * q2;
            let q0q0 = q0 * q0;
            let q1q1 = q1 * q1;
            let q2q2 = q2 * q2;
            let q3q3 = q3 * q3;

            let mut s0 = _4q0 * q2q2 + _2q2 * ax + _4q0 * q1q1 - _2q1 * ay;
            let mut s1 = _4q1 * q3q3 - _2q3 * ax + 4.0 * q0q0 * q1 - _2q0 * ay - _4q1
                + _8q1 * q1q1
                + _8q1 * q2q2
                + _4q1 * az;
            let mut s2 = 4.0 * q0q0 * q2 + _2q0 * ax + _4q2 * q3q3 - _2q3 * ay - _4q2
                + _8q2 * q1q1
                + _8q2 * q2q2
                + _4q2 * az;
            let mut s3 = 4.0 * q1q1 * q3 - _2q1 * ax + 4.0 * q2q2 * q3 - _2q2 * ay;

            recip_norm = accurate_inverse_sqrt(s0 * s0 + s1 * s1 + s2 * s2 + s3 * s3);
            s0 *= recip_norm;
            s1 *= recip_norm;
            s2 *= recip_norm;
            s3 *= recip_norm;

            q_dot1 -= self.beta * s0;
            q_dot2 -= self.beta * s1;
            q_dot3 -= self.beta * s2;
            q_dot4 -= self.beta * s3;
        }

        self.integrate(q_dot1, q_dot2, q_dot3, q_dot4);
    }

    /// Integrates the quaternion derivative and re-normalizes.
    fn integrate(&mut self, q_dot1: f32, q_dot2: f32, q_dot3: f32, q_dot4: f32) {
        self.q0 += q_dot1 * self.delta_t;
        self.q1 += q_dot2 * self.delta_t;
        self.q2 += q_dot3 * self.delta_t;
        self.q3 += q_dot4 * self.delta_t;

        let recip_norm = accurate_inverse_sqrt(
            self.q0 * self.q0 + self.q1 * self.q1 + self.q2 * self.q2 + self.q3 * self.q3,
        );
        self.q0 *= recip_norm;
        self.q1 *= recip_norm;
        self.q2 *= recip_norm;
        self.q3 *= recip_norm;
    }
}

impl Default for AttitudeFilter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn norm(filter: &AttitudeFilter) -> f32 {
        (filter.q0 * filter.q0
            + filter.q1 * filter.q1
            + filter.q2 * filter.q2
            + filter.q3 * filter.q3)
            .sqrt()
    }

    #[test]
    fn test_unit_norm_invariant() {
        let mut filter = AttitudeFilter::new();
        let accel = Vector3::new(0.1, -0.05, 0.98);
        let gyro = Vector3::new(12.0, -30.0, 5.5);
        let mag = Vector3::new(0.2, -0.1, 0.4);
        for _ in 0..2000 {
            filter.update(accel, gyro, mag);
            assert!((norm(&filter) - 1.0).abs() < 1e-3);
        }
    }

    #[test]
    fn test_zero_mag_falls_back_to_imu() {
        let accel = Vector3::new(0.02, 0.01, 1.0);
        let gyro = Vector3::new(3.0, -2.0, 1.0);

        let mut nine_axis = AttitudeFilter::new();
        let mut six_axis = AttitudeFilter::new();
        for _ in 0..500 {
            nine_axis.update(accel, gyro, Vector3::zeros());
            six_axis.update_imu(accel, gyro);
        }
        assert_eq!(nine_axis.quaternion(), six_axis.quaternion());
    }

    #[test]
    fn test_zero_beta_zero_gyro_holds_identity() {
        let mut filter = AttitudeFilter::new();
        filter.set_beta(0.0);
        let accel = Vector3::new(0.0, 0.0, 1.0);
        let mag = Vector3::new(1.0, 0.0, 0.0);
        filter.update(accel, Vector3::zeros(), mag);
        // Renormalization uses the approximate inverse sqrt, so the scalar
        // part lands near 1 rather than exactly on it.
        let (q0, q1, q2, q3) = filter.quaternion();
        assert!((q0 - 1.0).abs() < 1e-3);
        assert!(q1.abs() < 1e-6);
        assert!(q2.abs() < 1e-6);
        assert!(q3.abs() < 1e-6);
    }

    #[test]
    fn test_zero_accel_integrates_gyro_only() {
        // With an invalid accelerometer the feedback branch is skipped in
        // both paths, so beta has no effect.
        let gyro = Vector3::new(0.0, 0.0, 90.0);
        let mut filter = AttitudeFilter::new();
        let mut reference = AttitudeFilter::new();
        reference.set_beta(0.0);
        for _ in 0..100 {
            filter.update_imu(Vector3::zeros(), gyro);
            reference.update_imu(Vector3::zeros(), gyro);
        }
        assert_eq!(filter.quaternion(), reference.quaternion());
    }

    #[test]
    fn test_gyro_rotation_angle() {
        // 90 deg/s about Z for one second rotates the quaternion by ~45
        // degrees of half-angle.
        let mut filter = AttitudeFilter::new();
        filter.set_beta(0.0);
        filter.set_delta_t(0.005);
        let gyro = Vector3::new(0.0, 0.0, 90.0);
        for _ in 0..200 {
            filter.update_imu(Vector3::zeros(), gyro);
        }
        let (q0, _, _, q3) = filter.quaternion();
        let angle = 2.0 * q3.atan2(q0).to_degrees();
        assert!((angle - 90.0).abs() < 1.0, "rotated {angle} degrees");
    }

    #[test]
    fn test_flux_tracks_magnetic_updates_only() {
        let mut filter = AttitudeFilter::new();
        assert_eq!(filter.flux(), (1.0, 0.0));

        let accel = Vector3::new(0.0, 0.0, 1.0);
        let mag = Vector3::new(0.0, -0.3, -0.22);
        for _ in 0..50 {
            filter.update(accel, Vector3::zeros(), mag);
        }
        let (bx, bz) = filter.flux();
        // The reference is built from the normalized measurement, so its
        // norm is 1 and the horizontal component is non-negative.
        assert!(((bx * bx + bz * bz).sqrt() - 1.0).abs() < 1e-3);
        assert!(bx >= 0.0);
        assert!(bz < 0.0, "downward field component, bz = {bz}");

        // 6-axis ticks leave the reference untouched.
        filter.update_imu(accel, Vector3::new(10.0, 0.0, 0.0));
        assert_eq!(filter.flux(), (bx, bz));

        filter.reset();
        assert_eq!(filter.flux(), (1.0, 0.0));
    }

    #[test]
    fn test_converges_to_gravity() {
        // Device tilted 90 degrees: accel along X. The filter must leave
        // identity and converge so that the gravity estimate matches.
        let mut filter = AttitudeFilter::new();
        filter.set_beta(2.0);
        let accel = Vector3::new(1.0, 0.0, 0.0);
        let gyro = Vector3::zeros();
        for _ in 0..2000 {
            filter.update_imu(accel, gyro);
        }
        let (q0, q1, q2, q3) = filter.quaternion();
        // Sensor-frame gravity from the quaternion.
        let gx = 2.0 * (q1 * q3 - q0 * q2);
        let gz = q0 * q0 - q1 * q1 - q2 * q2 + q3 * q3;
        assert!((gx - 1.0).abs() < 0.05, "gravity x = {gx}");
        assert!(gz.abs() < 0.05, "gravity z = {gz}");
    }
}
