//! Stillness-gated accelerometer/gyroscope offset calibration
//!
//! Tracks the raw gyro excursion while the operator holds the device still.
//! If the excursion norm ever exceeds the threshold the session restarts
//! from scratch; a device that never holds still never finishes. Once a
//! full calibration window of still samples has accumulated, the recursive
//! running averages become the new zero-rate and zero-g offsets.

use crate::types::{
    ACC_GYRO_CAL_TIME_MS, CalibrationStatus, GYRO_STILLNESS_THRESHOLD, TRACKER_SENTINEL,
};

#[derive(Debug, Clone)]
pub struct StillnessCalibrator {
    status: CalibrationStatus,
    gyro_min: [i32; 3],
    gyro_max: [i32; 3],
    gyro_sum: [i32; 3],
    accel_sum: [i32; 3],
    sample_count: u32,
    required_samples: u32,
    threshold: i32,
    gyro_offsets: [i32; 3],
    accel_offsets: [i32; 3],
}

impl StillnessCalibrator {
    pub fn new() -> Self {
        Self {
            status: CalibrationStatus::Idle,
            gyro_min: [TRACKER_SENTINEL; 3],
            gyro_max: [-TRACKER_SENTINEL; 3],
            gyro_sum: [0; 3],
            accel_sum: [0; 3],
            sample_count: 0,
            required_samples: 0,
            threshold: GYRO_STILLNESS_THRESHOLD,
            gyro_offsets: [0; 3],
            accel_offsets: [0; 3],
        }
    }

    pub fn status(&self) -> CalibrationStatus {
        self.status
    }

    pub fn is_running(&self) -> bool {
        self.status == CalibrationStatus::Running
    }

    /// Raw gyro offsets found by the last completed run.
    pub fn gyro_offsets(&self) -> [i32; 3] {
        self.gyro_offsets
    }

    /// Raw accel offsets found by the last completed run.
    pub fn accel_offsets(&self) -> [i32; 3] {
        self.accel_offsets
    }

    /// Starts a fresh session. The required still-sample count derives from
    /// the calibration window over the sampling period.
    pub fn start(&mut self, sample_period_ms: u32) {
        self.required_samples = (ACC_GYRO_CAL_TIME_MS / sample_period_ms.max(1)).max(1);
        self.reset_accumulators();
        self.status = CalibrationStatus::Running;
    }

    pub fn cancel(&mut self) {
        self.reset_accumulators();
        self.status = CalibrationStatus::Idle;
    }

    fn reset_accumulators(&mut self) {
        self.gyro_min = [TRACKER_SENTINEL; 3];
        self.gyro_max = [-TRACKER_SENTINEL; 3];
        self.gyro_sum = [0; 3];
        self.accel_sum = [0; 3];
        self.sample_count = 0;
    }

    /// Feeds one remapped raw sample. Returns true on the sample that
    /// completes the calibration.
    ///
    /// `accel_resolution` is needed to remove the nominal 1 g count from
    /// the vertical axis of the at-rest accelerometer.
    pub fn update(&mut self, gyro: [i16; 3], accel: [i16; 3], accel_resolution: f32) -> bool {
        if self.status != CalibrationStatus::Running {
            return false;
        }

        for i in 0..3 {
            let g = gyro[i] as i32;
            self.gyro_max[i] = self.gyro_max[i].max(g);
            self.gyro_min[i] = self.gyro_min[i].min(g);
            // Recursive halving average, not an arithmetic mean: recent
            // samples carry exponentially more weight.
            self.gyro_sum[i] = (self.gyro_sum[i] + g) / 2;
        }

        let one_g = (1.0 / accel_resolution) as i32;
        self.accel_sum[0] = (self.accel_sum[0] + accel[0] as i32) / 2;
        self.accel_sum[1] = (self.accel_sum[1] + accel[1] as i32) / 2;
        self.accel_sum[2] = (self.accel_sum[2] + (accel[2] as i32 - one_g)) / 2;

        self.sample_count += 1;

        if self.spread_norm_squared() > (self.threshold as i64) * (self.threshold as i64) {
            // Movement detected: restart the window, seeding the trackers
            // with the offending sample as the initial extremum.
            self.reset_accumulators();
            for i in 0..3 {
                self.gyro_min[i] = gyro[i] as i32;
                self.gyro_max[i] = gyro[i] as i32;
            }
            return false;
        }

        if self.sample_count >= self.required_samples {
            self.gyro_offsets = self.gyro_sum;
            self.accel_offsets = self.accel_sum;
            self.status = CalibrationStatus::Done;
            return true;
        }
        false
    }

    /// Squared Euclidean norm of the per-axis (max - min) gyro spread.
    fn spread_norm_squared(&self) -> i64 {
        let mut sum = 0i64;
        for i in 0..3 {
            let spread = (self.gyro_max[i] - self.gyro_min[i]) as i64;
            sum += spread * spread;
        }
        sum
    }
}

impl Default for StillnessCalibrator {
    fn default() -> Self {
        Self::new()
    }
}
