#![no_std]

//! Motion AHRS - orientation fusion and self-calibration for wearable IMUs
//!
//! This library fuses raw gyroscope, accelerometer, and magnetometer samples
//! into an absolute orientation estimate using a Madgwick-style gradient
//! descent filter, and keeps the sensors calibrated while the device is in
//! use: gyro and accelerometer zero offsets are learned whenever the device
//! is held still, and the magnetometer gets a two-stage hard-iron/soft-iron
//! calibration driven by an operator rotating the device.
//!
//! # Features
//!
//! - 9-axis quaternion fusion with an automatic 6-axis fallback when no
//!   magnetometer data is available
//! - Board orientation remapping for the four supported sensor mountings
//! - Stillness-gated gyro/accelerometer offset calibration
//! - Two-stage magnetometer calibration: hard-iron min/max tracking followed
//!   by a soft-iron ellipsoid fit
//! - Euler angles in two conventions, gravity vector, and a tilt-compensated
//!   compass heading with magnetic declination
//! - Quaternion-derived magnetic field reconstruction with a convergence
//!   diagnostic
//! - `#![no_std]` compatible for embedded systems
//!
//! # Quick Start
//!
//! ```rust
//! use motion_ahrs::{MotionCore, RawSample};
//!
//! let mut core = MotionCore::new();
//! core.set_sample_period_ms(5);
//! core.restart(0);
//!
//! // One raw sample straight from the sensor drivers, plus a monotonic
//! // millisecond timestamp.
//! let sample = RawSample {
//!     accel: [0, 0, 4096],
//!     gyro: [0, 0, 0],
//!     mag: [300, 0, -150],
//!     temperature: 0,
//! };
//! let orientation = core.process(&sample, 5);
//!
//! let _ = (orientation.yaw, orientation.pitch, orientation.roll);
//! let _ = orientation.heading;
//! ```

mod ahrs;
mod axes;
pub mod bias;
mod core;
pub mod hard_iron;
mod math;
mod numeric;
mod output;
pub mod soft_iron;
pub mod stillness;
pub mod types;

// Re-export all public types and functions
pub use crate::core::{CalibrationSession, MotionCore};
pub use ahrs::AttitudeFilter;
pub use axes::{BoardOrientation, apply_orientation};
pub use bias::BiasStore;
pub use hard_iron::HardIronCalibrator;
pub use math::{
    BetaRamp, DEG_TO_RAD, RAD_TO_DEG, accurate_inverse_sqrt, fast_inverse_sqrt, to_360_degrees,
};
pub use output::{EulerConvention, Orientation, OrientationExporter, convergence_metric};
pub use soft_iron::SoftIronCalibrator;
pub use stillness::StillnessCalibrator;
pub use types::*;
