//! Bias storage shared by the calibrators and the correction step
//!
//! Raw biases live in sensor counts; their physical-unit equivalents are
//! kept in lockstep so the hot correction path never multiplies by the
//! resolution itself. Whenever a raw bias or a resolution changes, the
//! float side is recomputed.

use nalgebra::{Matrix3, Vector3};

use crate::types::{Axis, Resolutions};

/// Current bias estimates plus the committed soft-iron correction matrix.
#[derive(Debug, Clone)]
pub struct BiasStore {
    gyro_raw: [i32; 3],
    accel_raw: [i32; 3],
    mag_raw: [i32; 3],
    gyro: Vector3<f32>,
    accel: Vector3<f32>,
    mag: Vector3<f32>,
    soft_iron: Matrix3<f32>,
    resolutions: Resolutions,
}

impl BiasStore {
    pub fn new(resolutions: Resolutions) -> Self {
        Self {
            gyro_raw: [0; 3],
            accel_raw: [0; 3],
            mag_raw: [0; 3],
            gyro: Vector3::zeros(),
            accel: Vector3::zeros(),
            mag: Vector3::zeros(),
            soft_iron: Matrix3::identity(),
            resolutions,
        }
    }

    pub fn resolutions(&self) -> Resolutions {
        self.resolutions
    }

    /// Changes the sensor resolutions and recomputes every float bias.
    pub fn set_resolutions(&mut self, resolutions: Resolutions) {
        self.resolutions = resolutions;
        self.recompute();
    }

    fn recompute(&mut self) {
        for i in 0..3 {
            self.gyro[i] = self.gyro_raw[i] as f32 * self.resolutions.gyro;
            self.accel[i] = self.accel_raw[i] as f32 * self.resolutions.accel;
            self.mag[i] = self.mag_raw[i] as f32 * self.resolutions.mag;
        }
    }

    pub fn set_gyro_raw(&mut self, axis: Axis, bias: i32) {
        self.gyro_raw[axis.index()] = bias;
        self.gyro[axis.index()] = bias as f32 * self.resolutions.gyro;
    }

    pub fn set_accel_raw(&mut self, axis: Axis, bias: i32) {
        self.accel_raw[axis.index()] = bias;
        self.accel[axis.index()] = bias as f32 * self.resolutions.accel;
    }

    pub fn set_mag_raw(&mut self, axis: Axis, bias: i32) {
        self.mag_raw[axis.index()] = bias;
        self.mag[axis.index()] = bias as f32 * self.resolutions.mag;
    }

    pub fn gyro_raw(&self, axis: Axis) -> i32 {
        self.gyro_raw[axis.index()]
    }

    pub fn accel_raw(&self, axis: Axis) -> i32 {
        self.accel_raw[axis.index()]
    }

    pub fn mag_raw(&self, axis: Axis) -> i32 {
        self.mag_raw[axis.index()]
    }

    pub fn mag_raw_vector(&self) -> [i32; 3] {
        self.mag_raw
    }

    pub fn gyro(&self) -> Vector3<f32> {
        self.gyro
    }

    pub fn accel(&self) -> Vector3<f32> {
        self.accel
    }

    pub fn mag(&self) -> Vector3<f32> {
        self.mag
    }

    pub fn soft_iron(&self) -> &Matrix3<f32> {
        &self.soft_iron
    }

    /// Replaces the whole soft-iron matrix at once. The calibration path
    /// only calls this after a fully successful fit, so readers never see a
    /// half-updated matrix.
    pub fn set_soft_iron(&mut self, matrix: Matrix3<f32>) {
        self.soft_iron = matrix;
    }

    /// Sets one row of the soft-iron matrix (persistence restore path).
    pub fn set_soft_iron_row(&mut self, axis: Axis, row: Vector3<f32>) {
        for j in 0..3 {
            self.soft_iron[(axis.index(), j)] = row[j];
        }
    }

    pub fn soft_iron_row(&self, axis: Axis) -> Vector3<f32> {
        Vector3::new(
            self.soft_iron[(axis.index(), 0)],
            self.soft_iron[(axis.index(), 1)],
            self.soft_iron[(axis.index(), 2)],
        )
    }

    pub fn reset_gyro(&mut self) {
        self.gyro_raw = [0; 3];
        self.gyro = Vector3::zeros();
    }

    pub fn reset_accel(&mut self) {
        self.accel_raw = [0; 3];
        self.accel = Vector3::zeros();
    }

    /// Clears the mag bias but deliberately keeps the soft-iron matrix; a
    /// new hard-iron pass does not invalidate the previous ellipsoid fit.
    pub fn reset_mag(&mut self) {
        self.mag_raw = [0; 3];
        self.mag = Vector3::zeros();
    }

    pub fn reset_soft_iron(&mut self) {
        self.soft_iron = Matrix3::identity();
    }
}
