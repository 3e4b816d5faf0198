//! Motion engine orchestrator
//!
//! `MotionCore` owns the fusion filter, the bias store and the three
//! calibrators, and drives them from a single `process` call per sensor
//! tick. The caller supplies raw samples and a monotonic millisecond clock;
//! nothing here talks to hardware.
//!
//! Calibration runs as an exclusive session: a motion (accel/gyro) session
//! completes on its own once the device has been still long enough, a
//! magnetometer session advances from hard-iron extrema tracking to
//! soft-iron scatter accumulation and can be stepped or cancelled from the
//! outside between ticks.

use nalgebra::Vector3;

use crate::ahrs::AttitudeFilter;
use crate::axes::{BoardOrientation, apply_orientation};
use crate::bias::BiasStore;
use crate::hard_iron::HardIronCalibrator;
use crate::math::{BetaRamp, clamp_f32};
use crate::output::{EulerConvention, Orientation, OrientationExporter, convergence_metric};
use crate::soft_iron::SoftIronCalibrator;
use crate::stillness::StillnessCalibrator;
use crate::types::{
    Axis, BETA_CONVERGENCE_TIME_MS, BETA_DEFAULT, BETA_MAX, BETA_START,
    CalibrationStatus, DEFAULT_SAMPLE_PERIOD_MS, MAG_CAL_MAX_DURATION_MS,
    MAX_SAMPLE_PERIOD_MS, MIN_SAMPLE_PERIOD_MS, RawSample, Resolutions,
    TEMP_BIAS_CELSIUS, TEMP_SCALE,
};

/// Active calibration session, exclusive by construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CalibrationSession {
    #[default]
    Idle,
    /// Stillness-gated accel/gyro offset run.
    Motion,
    /// Magnetometer stage 1: hard-iron extrema tracking.
    MagHardIron,
    /// Magnetometer stage 2: soft-iron scatter accumulation.
    MagSoftIron,
}

#[derive(Debug)]
pub struct MotionCore {
    filter: AttitudeFilter,
    bias: BiasStore,
    stillness: StillnessCalibrator,
    hard_iron: HardIronCalibrator,
    soft_iron: SoftIronCalibrator,
    exporter: OrientationExporter,
    beta_ramp: BetaRamp,

    orientation_code: BoardOrientation,
    steady_beta: f32,
    sample_period_ms: u32,
    /// Rotation-rate gate in deg/s; 0 disables output freezing.
    gyro_gate_dps: f32,
    mag_session_max_ms: u32,

    session: CalibrationSession,
    session_started_ms: u32,
    next_step: bool,
    cancel: bool,

    orientation: Orientation,
    magnetic: Vector3<f32>,
    convergence: f32,
    temperature_celsius: f32,
}

impl MotionCore {
    pub fn new() -> Self {
        let mut filter = AttitudeFilter::new();
        filter.set_delta_t(DEFAULT_SAMPLE_PERIOD_MS as f32 / 1000.0);

        let mut beta_ramp = BetaRamp::new();
        beta_ramp.begin(BETA_START, BETA_DEFAULT);
        beta_ramp.set_duration(BETA_CONVERGENCE_TIME_MS);

        Self {
            filter,
            bias: BiasStore::new(Resolutions::default()),
            stillness: StillnessCalibrator::new(),
            hard_iron: HardIronCalibrator::new(),
            soft_iron: SoftIronCalibrator::new(),
            exporter: OrientationExporter::new(),
            beta_ramp,
            orientation_code: BoardOrientation::default(),
            steady_beta: BETA_DEFAULT,
            sample_period_ms: DEFAULT_SAMPLE_PERIOD_MS,
            gyro_gate_dps: 0.0,
            mag_session_max_ms: MAG_CAL_MAX_DURATION_MS,
            session: CalibrationSession::Idle,
            session_started_ms: 0,
            next_step: false,
            cancel: false,
            orientation: Orientation::default(),
            magnetic: Vector3::new(1.0, 0.0, 0.0),
            convergence: 0.0,
            temperature_celsius: TEMP_BIAS_CELSIUS,
        }
    }

    /// Resets the attitude estimate and starts the fast-convergence beta
    /// ramp at the given monotonic time.
    pub fn restart(&mut self, now_ms: u32) {
        self.filter.reset();
        self.begin_convergence(now_ms);
    }

    fn begin_convergence(&mut self, now_ms: u32) {
        self.beta_ramp.begin(BETA_START, self.steady_beta);
        self.beta_ramp.set_duration(BETA_CONVERGENCE_TIME_MS);
        self.beta_ramp.start(now_ms);
    }

    /// Runs one full pipeline tick: remap, calibration session, bias
    /// correction, fusion, export. Returns the exported orientation, which
    /// holds its previous value when the rotation-rate gate is active.
    pub fn process(&mut self, sample: &RawSample, now_ms: u32) -> Orientation {
        let mut s = sample.clone();
        apply_orientation(&mut s, self.orientation_code);

        self.temperature_celsius = s.temperature as f32 / TEMP_SCALE + TEMP_BIAS_CELSIUS;

        self.run_session(&s, now_ms);

        let res = self.bias.resolutions();
        let accel = Vector3::new(
            s.accel[0] as f32 * res.accel,
            s.accel[1] as f32 * res.accel,
            s.accel[2] as f32 * res.accel,
        ) - self.bias.accel();
        let gyro = Vector3::new(
            s.gyro[0] as f32 * res.gyro,
            s.gyro[1] as f32 * res.gyro,
            s.gyro[2] as f32 * res.gyro,
        ) - self.bias.gyro();
        // An all-zero raw reading means no magnetometer data; keep it zero
        // so the filter takes its 6-axis path instead of fusing the biases.
        let mag = if s.mag == [0, 0, 0] {
            Vector3::zeros()
        } else {
            self.bias.soft_iron()
                * (Vector3::new(
                    s.mag[0] as f32 * res.mag,
                    s.mag[1] as f32 * res.mag,
                    s.mag[2] as f32 * res.mag,
                ) - self.bias.mag())
        };

        if self.beta_ramp.is_active() {
            let beta = self.beta_ramp.value(now_ms);
            self.filter.set_beta(beta);
        }

        // North axis swap into the filter's Y-north NED convention.
        self.filter.update(
            Vector3::new(accel.y, -accel.x, accel.z),
            Vector3::new(gyro.y, -gyro.x, gyro.z),
            Vector3::new(mag.y, -mag.x, mag.z),
        );

        let gate = self.gyro_gate_dps;
        if gate > 0.0 && gyro.norm_squared() < gate * gate {
            // Below the gate the quaternion keeps integrating but the
            // exported values hold still.
            return self.orientation;
        }

        let q = self.filter.quaternion();
        let (yaw, pitch, roll) = self.exporter.euler_angles(q);
        let gravity = self.exporter.gravity(q);
        self.orientation = Orientation {
            yaw,
            pitch,
            roll,
            heading: self.exporter.heading(q, mag),
            gravity,
        };
        self.magnetic = self.exporter.magnetic(q, self.filter.flux());
        self.convergence = convergence_metric(gravity, self.magnetic);
        self.orientation
    }

    fn run_session(&mut self, s: &RawSample, now_ms: u32) {
        if self.cancel && self.session != CalibrationSession::Idle {
            self.cancel = false;
            self.next_step = false;
            self.stillness.cancel();
            self.hard_iron.cancel();
            self.soft_iron.reset();
            self.session = CalibrationSession::Idle;
            return;
        }
        self.cancel = false;

        match self.session {
            CalibrationSession::Idle => {}
            CalibrationSession::Motion => {
                if self
                    .stillness
                    .update(s.gyro, s.accel, self.bias.resolutions().accel)
                {
                    self.commit_motion_offsets();
                    self.session = CalibrationSession::Idle;
                    self.begin_convergence(now_ms);
                }
            }
            CalibrationSession::MagHardIron => {
                if self.take_next_step() || self.session_expired(now_ms) {
                    self.hard_iron.finish();
                }
                self.hard_iron.update(s.mag, now_ms);
                if self.hard_iron.is_done() {
                    self.commit_mag_offsets();
                    if self.session_expired(now_ms) {
                        self.session = CalibrationSession::Idle;
                        self.begin_convergence(now_ms);
                    } else {
                        self.soft_iron.reset();
                        self.session = CalibrationSession::MagSoftIron;
                    }
                }
            }
            CalibrationSession::MagSoftIron => {
                if self.take_next_step() || self.session_expired(now_ms) {
                    if self.soft_iron.compute_matrix() {
                        self.bias.set_soft_iron(*self.soft_iron.matrix());
                    }
                    self.session = CalibrationSession::Idle;
                    self.begin_convergence(now_ms);
                } else {
                    self.soft_iron.accumulate(s.mag, self.bias.mag_raw_vector());
                }
            }
        }
    }

    fn session_expired(&self, now_ms: u32) -> bool {
        now_ms.wrapping_sub(self.session_started_ms) >= self.mag_session_max_ms
    }

    fn take_next_step(&mut self) -> bool {
        let step = self.next_step;
        self.next_step = false;
        step
    }

    fn commit_motion_offsets(&mut self) {
        let gyro = self.stillness.gyro_offsets();
        let accel = self.stillness.accel_offsets();
        for axis in Axis::ALL {
            self.bias.set_gyro_raw(axis, gyro[axis.index()]);
            self.bias.set_accel_raw(axis, accel[axis.index()]);
        }
    }

    fn commit_mag_offsets(&mut self) {
        let offsets = self.hard_iron.offsets();
        for axis in Axis::ALL {
            self.bias.set_mag_raw(axis, offsets[axis.index()]);
        }
    }

    // --- calibration session control ---

    /// Starts the stillness-gated accel/gyro offset session. The committed
    /// offsets are cleared so the session samples raw sensor zero points.
    pub fn run_auto_cal_motion(&mut self) {
        self.bias.reset_gyro();
        self.bias.reset_accel();
        self.stillness.start(self.sample_period_ms);
        self.session = CalibrationSession::Motion;
    }

    /// Starts the two-stage magnetometer session at the given monotonic
    /// time. The hard-iron offset is cleared; the committed soft-iron
    /// matrix stays in effect until a new fit succeeds.
    pub fn run_auto_cal_mag(&mut self, now_ms: u32) {
        self.bias.reset_mag();
        self.hard_iron.start();
        self.soft_iron.reset();
        self.session = CalibrationSession::MagHardIron;
        self.session_started_ms = now_ms;
        self.next_step = false;
    }

    /// Ends the current magnetometer stage early on the next tick.
    pub fn next_step(&mut self, step: bool) {
        self.next_step = step;
    }

    pub fn is_next_step(&self) -> bool {
        self.next_step
    }

    /// Aborts any running session on the next tick without committing.
    pub fn cancel(&mut self, cancel: bool) {
        self.cancel = cancel;
    }

    pub fn is_cancel(&self) -> bool {
        self.cancel
    }

    pub fn session(&self) -> CalibrationSession {
        self.session
    }

    /// Feeds one sample to a standalone accel/gyro calibration, outside the
    /// session machinery. Starts the run on the first call and returns true
    /// on the completing sample.
    pub fn calibrate_acc_gyro(&mut self, sample: &RawSample) -> bool {
        if !self.stillness.is_running() {
            self.bias.reset_gyro();
            self.bias.reset_accel();
            self.stillness.start(self.sample_period_ms);
        }
        let mut s = sample.clone();
        apply_orientation(&mut s, self.orientation_code);
        let done = self
            .stillness
            .update(s.gyro, s.accel, self.bias.resolutions().accel);
        if done {
            self.commit_motion_offsets();
        }
        done
    }

    /// Feeds one sample to a standalone hard-iron calibration. Passing
    /// `end = true` finishes the run with the extrema seen so far. Returns
    /// true once the offsets were committed.
    pub fn calibrate_mag(&mut self, sample: &RawSample, now_ms: u32, end: bool) -> bool {
        if self.hard_iron.status() == CalibrationStatus::Idle {
            self.bias.reset_mag();
            self.hard_iron.start();
        }
        let mut s = sample.clone();
        apply_orientation(&mut s, self.orientation_code);
        self.hard_iron.update(s.mag, now_ms);
        if end {
            self.hard_iron.finish();
        }
        if self.hard_iron.is_done() {
            self.commit_mag_offsets();
            return true;
        }
        false
    }

    /// Clears the committed accel/gyro offsets and any running stillness
    /// session.
    pub fn reset_motion_calibration(&mut self) {
        self.bias.reset_gyro();
        self.bias.reset_accel();
        self.stillness.cancel();
        if self.session == CalibrationSession::Motion {
            self.session = CalibrationSession::Idle;
        }
    }

    /// Clears the committed hard-iron offset and magnetometer trackers. The
    /// soft-iron matrix is reset separately.
    pub fn reset_mag_calibration(&mut self) {
        self.bias.reset_mag();
        self.hard_iron.cancel();
        self.soft_iron.reset();
        if matches!(
            self.session,
            CalibrationSession::MagHardIron | CalibrationSession::MagSoftIron
        ) {
            self.session = CalibrationSession::Idle;
        }
    }

    pub fn reset_soft_iron(&mut self) {
        self.bias.reset_soft_iron();
    }

    // --- configuration ---

    pub fn set_board_orientation(&mut self, orientation: BoardOrientation) {
        self.orientation_code = orientation;
    }

    pub fn board_orientation(&self) -> BoardOrientation {
        self.orientation_code
    }

    /// Steady-state filter gain, clamped to [0, BETA_MAX]. Takes effect
    /// immediately unless a convergence ramp is running, in which case it
    /// becomes the ramp's end value.
    pub fn set_beta(&mut self, beta: f32) {
        self.steady_beta = clamp_f32(beta, 0.0, BETA_MAX);
        self.beta_ramp.begin(BETA_START, self.steady_beta);
        if !self.beta_ramp.is_active() {
            self.filter.set_beta(self.steady_beta);
        }
    }

    pub fn beta(&self) -> f32 {
        self.steady_beta
    }

    /// Sampling period in milliseconds, clamped to the supported range;
    /// also derives the filter integration interval.
    pub fn set_sample_period_ms(&mut self, period_ms: u32) {
        self.sample_period_ms = period_ms.clamp(MIN_SAMPLE_PERIOD_MS, MAX_SAMPLE_PERIOD_MS);
        self.filter.set_delta_t(self.sample_period_ms as f32 / 1000.0);
    }

    pub fn sample_period_ms(&self) -> u32 {
        self.sample_period_ms
    }

    pub fn set_declination(&mut self, declination_deg: f32) {
        self.exporter.set_declination(declination_deg);
    }

    pub fn declination(&self) -> f32 {
        self.exporter.declination()
    }

    pub fn set_euler_convention(&mut self, convention: EulerConvention) {
        self.exporter.set_convention(convention);
    }

    pub fn euler_convention(&self) -> EulerConvention {
        self.exporter.convention()
    }

    /// Rotation-rate output gate in deg/s; values <= 0 disable it.
    pub fn set_gyro_output_gate(&mut self, gate_dps: f32) {
        self.gyro_gate_dps = if gate_dps > 0.0 { gate_dps } else { 0.0 };
    }

    pub fn gyro_output_gate(&self) -> f32 {
        self.gyro_gate_dps
    }

    pub fn set_mag_session_max_ms(&mut self, max_ms: u32) {
        self.mag_session_max_ms = max_ms.max(1);
    }

    pub fn set_resolutions(&mut self, resolutions: Resolutions) {
        self.bias.set_resolutions(resolutions);
    }

    pub fn resolutions(&self) -> Resolutions {
        self.bias.resolutions()
    }

    // --- persistence accessors ---

    pub fn set_gyro_bias_raw(&mut self, axis: Axis, bias: i32) {
        self.bias.set_gyro_raw(axis, bias);
    }

    pub fn gyro_bias_raw(&self, axis: Axis) -> i32 {
        self.bias.gyro_raw(axis)
    }

    pub fn set_accel_bias_raw(&mut self, axis: Axis, bias: i32) {
        self.bias.set_accel_raw(axis, bias);
    }

    pub fn accel_bias_raw(&self, axis: Axis) -> i32 {
        self.bias.accel_raw(axis)
    }

    pub fn set_mag_bias_raw(&mut self, axis: Axis, bias: i32) {
        self.bias.set_mag_raw(axis, bias);
    }

    pub fn mag_bias_raw(&self, axis: Axis) -> i32 {
        self.bias.mag_raw(axis)
    }

    pub fn set_soft_iron_row(&mut self, axis: Axis, row: Vector3<f32>) {
        self.bias.set_soft_iron_row(axis, row);
    }

    pub fn soft_iron_row(&self, axis: Axis) -> Vector3<f32> {
        self.bias.soft_iron_row(axis)
    }

    // --- outputs and diagnostics ---

    /// The last exported orientation frame.
    pub fn orientation(&self) -> &Orientation {
        &self.orientation
    }

    pub fn quaternion(&self) -> (f32, f32, f32, f32) {
        self.filter.quaternion()
    }

    /// Board temperature in Celsius from the last processed sample.
    pub fn temperature_celsius(&self) -> f32 {
        self.temperature_celsius
    }

    /// Magnetic field direction reconstructed from the quaternion and the
    /// filter's field reference. Tracks the corrected measurement once the
    /// filter has converged and stays valid across magnetometer dropouts.
    pub fn magnetic(&self) -> Vector3<f32> {
        self.magnetic
    }

    /// Divergence metric between the gravity and reconstructed magnetic
    /// vectors from the last tick.
    pub fn convergence(&self) -> f32 {
        self.convergence
    }

    /// Diagnostic EMA of the raw magnetometer mean during a mag session.
    pub fn mag_ema_mean(&self) -> [f32; 3] {
        self.hard_iron.ema_mean()
    }

    /// Fitted soft-iron ellipsoid center, diagnostic only.
    pub fn soft_iron_center(&self) -> Vector3<f64> {
        self.soft_iron.center()
    }
}

impl Default for MotionCore {
    fn default() -> Self {
        Self::new()
    }
}
