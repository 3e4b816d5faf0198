//! Core types and tuning constants for the motion engine

/// Steady-state filter gain. Higher values converge faster but are noisier;
/// beta = 0 uses the gyroscope only.
pub const BETA_DEFAULT: f32 = 0.4;
/// Gain used right after a (re)start for quick convergence.
pub const BETA_START: f32 = 10.0;
/// Upper bound accepted by the beta setter.
pub const BETA_MAX: f32 = 10.0;
/// Duration of the beta ramp from [`BETA_START`] down to the steady gain.
pub const BETA_CONVERGENCE_TIME_MS: f32 = 1000.0;

/// Raw gyro excursion (LSB) below which the device counts as still, about
/// 3 degrees per second at the default range.
pub const GYRO_STILLNESS_THRESHOLD: i32 = 50;
/// Time of uninterrupted stillness required to commit accel/gyro offsets.
pub const ACC_GYRO_CAL_TIME_MS: u32 = 500;

/// Unchanged-extrema time after which the hard-iron stage completes.
pub const HARD_IRON_STABLE_TIME_MS: u32 = 5000;
/// Default cap on a whole magnetometer calibration session.
pub const MAG_CAL_MAX_DURATION_MS: u32 = 30_000;
/// Smoothing coefficient of the diagnostic EMA magnetometer mean.
pub const MAG_EMA_COEFFICIENT: f32 = 0.01;

/// Sampling period clamp, in milliseconds.
pub const MIN_SAMPLE_PERIOD_MS: u32 = 3;
pub const MAX_SAMPLE_PERIOD_MS: u32 = 1000;
pub const DEFAULT_SAMPLE_PERIOD_MS: u32 = 5;

/// Default full-scale ranges of the supported sensors.
pub const GYRO_SCALE: f32 = 2000.0; // +- 2000 deg/s
pub const ACC_SCALE: f32 = 8.0; // +- 8 g
pub const MAG_SCALE: f32 = 4.0; // +- 4 gauss

/// Sentinel used to prime raw min/max trackers, outside the i16 range.
pub const TRACKER_SENTINEL: i32 = 40_000;

/// LSM6-family temperature conversion: raw / scale + bias gives Celsius.
pub const TEMP_SCALE: f32 = 256.0;
pub const TEMP_BIAS_CELSIUS: f32 = 25.0;

/// Sensor axis selector used by the per-axis bias accessors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    X = 0,
    Y = 1,
    Z = 2,
}

impl Axis {
    pub const ALL: [Axis; 3] = [Axis::X, Axis::Y, Axis::Z];

    pub fn index(self) -> usize {
        self as usize
    }
}

/// One raw sensor sample: signed 16-bit ADC counts straight from the
/// drivers, immutable for the duration of a pipeline pass.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RawSample {
    pub accel: [i16; 3],
    pub gyro: [i16; 3],
    pub mag: [i16; 3],
    pub temperature: i16,
}

/// Per-sensor resolution: full-scale range divided by 32768, converting raw
/// counts to physical units (deg/s, g, gauss).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Resolutions {
    pub gyro: f32,
    pub accel: f32,
    pub mag: f32,
}

impl Default for Resolutions {
    fn default() -> Self {
        Self {
            gyro: GYRO_SCALE / 32768.0,
            accel: ACC_SCALE / 32768.0,
            mag: MAG_SCALE / 32768.0,
        }
    }
}

/// Lifecycle of one calibration run. Each calibrator owns exactly one of
/// these as its single source of truth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CalibrationStatus {
    #[default]
    Idle,
    Running,
    /// Extrema unchanged, waiting out the stability timeout (mag only).
    StablePending,
    Done,
}
