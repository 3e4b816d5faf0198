//! Orientation export: Euler angles, gravity, tilt-compensated heading
//!
//! The fusion filter runs in a north-east-down frame whose north axis is
//! the sensor's Y axis; everything here derives user-facing quantities from
//! that quaternion. Two Euler conventions are supported, selected once at
//! configuration time depending on whether the host carries an auxiliary
//! absolute-orientation sensor.

use nalgebra::Vector3;

use crate::math::{RAD_TO_DEG, to_360_degrees};

/// Euler decomposition order of the exported angles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EulerConvention {
    /// Yaw-pitch-roll (ZYX), the plain-IMU default.
    #[default]
    YawPitchRoll,
    /// Yaw-roll-pitch (YXZ), used alongside an auxiliary absolute sensor.
    YawRollPitch,
}

/// One exported orientation frame, all angles in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Orientation {
    pub yaw: f32,
    pub pitch: f32,
    pub roll: f32,
    /// Tilt-compensated compass heading in [0, 360).
    pub heading: f32,
    /// Gravity direction in the filter frame, unit length when converged.
    pub gravity: Vector3<f32>,
}

impl Default for Orientation {
    fn default() -> Self {
        Self {
            yaw: 0.0,
            pitch: 0.0,
            roll: 0.0,
            heading: 0.0,
            gravity: Vector3::new(0.0, 0.0, 1.0),
        }
    }
}

/// Derives exported quantities from the filter quaternion.
#[derive(Debug, Clone, Copy, Default)]
pub struct OrientationExporter {
    convention: EulerConvention,
    declination_deg: f32,
}

impl OrientationExporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn convention(&self) -> EulerConvention {
        self.convention
    }

    pub fn set_convention(&mut self, convention: EulerConvention) {
        self.convention = convention;
    }

    pub fn declination(&self) -> f32 {
        self.declination_deg
    }

    /// Magnetic declination in degrees, subtracted from the exported yaw.
    pub fn set_declination(&mut self, declination_deg: f32) {
        self.declination_deg = declination_deg;
    }

    /// Euler angles in degrees for the configured convention. The magnetic
    /// declination is subtracted from yaw.
    pub fn euler_angles(&self, q: (f32, f32, f32, f32)) -> (f32, f32, f32) {
        let (q0, q1, q2, q3) = q;

        let yaw = -(2.0 * (q1 * q2 + q0 * q3))
            .atan2(q0 * q0 + q1 * q1 - q2 * q2 - q3 * q3)
            * RAD_TO_DEG
            - self.declination_deg;

        let (pitch, roll) = match self.convention {
            EulerConvention::YawPitchRoll => {
                let pitch = asin_clamped(2.0 * (q1 * q3 - q0 * q2)) * RAD_TO_DEG;
                let roll = (2.0 * (q0 * q1 + q2 * q3))
                    .atan2(q0 * q0 - q1 * q1 - q2 * q2 + q3 * q3)
                    * RAD_TO_DEG;
                (pitch, roll)
            }
            EulerConvention::YawRollPitch => {
                let pitch = -(2.0 * (q0 * q2 + q1 * q3))
                    .atan2(1.0 - 2.0 * (q1 * q1 + q2 * q2))
                    * RAD_TO_DEG;
                let roll = asin_clamped(2.0 * (q0 * q1 + q2 * q3)) * RAD_TO_DEG;
                (pitch, roll)
            }
        };

        (yaw, pitch, roll)
    }

    /// Gravity direction in the filter frame.
    pub fn gravity(&self, q: (f32, f32, f32, f32)) -> Vector3<f32> {
        let (q0, q1, q2, q3) = q;
        Vector3::new(
            2.0 * (q1 * q3 - q0 * q2),
            2.0 * (q0 * q1 + q2 * q3),
            q0 * q0 - q1 * q1 - q2 * q2 + q3 * q3,
        )
    }

    /// Magnetic field direction reconstructed from the quaternion.
    ///
    /// `flux` is the earth-frame field reference `(bx, bz)` kept by the
    /// fusion filter; the earth vector `(bx, 0, bz)` is rotated back into
    /// the filter frame. When the filter has converged this matches the
    /// measured field direction, so it serves the convergence diagnostic
    /// and stays available across magnetometer dropouts.
    pub fn magnetic(&self, q: (f32, f32, f32, f32), flux: (f32, f32)) -> Vector3<f32> {
        let (q0, q1, q2, q3) = q;
        let (bx, bz) = flux;
        Vector3::new(
            bx * (q0 * q0 + q1 * q1 - q2 * q2 - q3 * q3) + 2.0 * bz * (q1 * q3 - q0 * q2),
            2.0 * bx * (q1 * q2 - q0 * q3) + 2.0 * bz * (q0 * q1 + q2 * q3),
            2.0 * bx * (q0 * q2 + q1 * q3) + bz * (q0 * q0 - q1 * q1 - q2 * q2 + q3 * q3),
        )
    }

    /// Tilt-compensated compass heading in degrees, [0, 360).
    ///
    /// `mag` is the calibrated magnetic vector in the sensor frame. It is
    /// permuted to the filter's Y-north convention, converted NWU to NED,
    /// de-rotated by roll then pitch (AN4248), and the horizontal components
    /// give the heading.
    pub fn heading(&self, q: (f32, f32, f32, f32), mag: Vector3<f32>) -> f32 {
        let (q0, q1, q2, q3) = q;

        let roll = (2.0 * (q0 * q1 + q2 * q3))
            .atan2(q0 * q0 - q1 * q1 - q2 * q2 + q3 * q3);
        let pitch = asin_clamped(2.0 * (q1 * q3 - q0 * q2));

        // Y-north permutation (y, -x, z), then NED (negate y and z).
        let bx = mag.y;
        let by = mag.x;
        let bz = -mag.z;

        let (sin_roll, cos_roll) = (roll.sin(), roll.cos());
        let (sin_pitch, cos_pitch) = (pitch.sin(), pitch.cos());

        let bfy = by * cos_roll - bz * sin_roll;
        let bfz = by * sin_roll + bz * cos_roll;
        let bfx = bx * cos_pitch + bfz * sin_pitch;

        to_360_degrees((-bfy).atan2(bfx) * RAD_TO_DEG)
    }
}

/// Squared norm of the cross product of the two directions, i.e. the
/// squared sine of the angle between the gravity and reconstructed
/// magnetic vectors. A converged filter holds this at the constant set by
/// the local field's dip angle; jumps indicate divergence.
pub fn convergence_metric(gravity: Vector3<f32>, mag: Vector3<f32>) -> f32 {
    let g2 = gravity.norm_squared();
    let m2 = mag.norm_squared();
    if g2 == 0.0 || m2 == 0.0 {
        return 0.0;
    }
    gravity.cross(&mag).norm_squared() / (g2 * m2)
}

fn asin_clamped(x: f32) -> f32 {
    if x >= 1.0 {
        core::f32::consts::FRAC_PI_2
    } else if x <= -1.0 {
        -core::f32::consts::FRAC_PI_2
    } else {
        x.asin()
    }
}
