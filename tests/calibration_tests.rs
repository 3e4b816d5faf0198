use motion_ahrs::types::{Axis, CalibrationStatus, RawSample, Resolutions};
use motion_ahrs::{
    BiasStore, BoardOrientation, CalibrationSession, HardIronCalibrator, MotionCore,
    SoftIronCalibrator, StillnessCalibrator,
};
use nalgebra::{Matrix3, Vector3};
use rand::prelude::*;
use rand_pcg::Pcg64;

const ONE_G: i16 = 4096;
const ACCEL_RES: f32 = 8.0 / 32768.0;

/// Two calibrators fed the same noisy still sequence commit identical
/// offsets.
#[test]
fn test_stillness_calibration_is_deterministic() {
    let mut first = StillnessCalibrator::new();
    let mut second = StillnessCalibrator::new();
    first.start(5);
    second.start(5);

    let mut rng = Pcg64::seed_from_u64(42);
    let mut done = (false, false);
    for _ in 0..300 {
        let gyro = [
            18 + rng.random_range(-3..=3),
            -9 + rng.random_range(-3..=3),
            4 + rng.random_range(-3..=3),
        ];
        let accel = [
            rng.random_range(-10..=10),
            rng.random_range(-10..=10),
            ONE_G + rng.random_range(-10..=10),
        ];
        done.0 |= first.update(gyro, accel, ACCEL_RES);
        done.1 |= second.update(gyro, accel, ACCEL_RES);
    }
    assert!(done.0 && done.1);
    assert_eq!(first.gyro_offsets(), second.gyro_offsets());
    assert_eq!(first.accel_offsets(), second.accel_offsets());

    // The committed offsets sit near the sequence mean.
    let gyro = first.gyro_offsets();
    assert!((gyro[0] - 18).abs() <= 4, "gyro x offset {}", gyro[0]);
    assert!((gyro[1] + 9).abs() <= 4);
    assert!((gyro[2] - 4).abs() <= 4);
}

/// Raw biases and their physical-unit counterparts stay in lockstep.
#[test]
fn test_bias_lockstep() {
    let mut store = BiasStore::new(Resolutions::default());
    store.set_gyro_raw(Axis::X, 18);
    store.set_accel_raw(Axis::Y, -34);
    store.set_mag_raw(Axis::Z, 210);

    let res = store.resolutions();
    assert_eq!(store.gyro().x, 18.0 * res.gyro);
    assert_eq!(store.accel().y, -34.0 * res.accel);
    assert_eq!(store.mag().z, 210.0 * res.mag);

    let halved = Resolutions {
        gyro: res.gyro / 2.0,
        accel: res.accel / 2.0,
        mag: res.mag / 2.0,
    };
    store.set_resolutions(halved);
    assert_eq!(store.gyro().x, 18.0 * halved.gyro);
    assert_eq!(store.mag().z, 210.0 * halved.mag);
}

/// A full motion calibration session through the orchestrator learns the
/// simulated sensor offsets despite sub-gate noise.
#[test]
fn test_motion_session_learns_offsets() {
    let mut core = MotionCore::new();
    core.set_board_orientation(BoardOrientation::TopNwuWidth);
    core.run_auto_cal_motion();

    let mut rng = Pcg64::seed_from_u64(7);
    let mut now = 0;
    while core.session() == CalibrationSession::Motion {
        now += 5;
        let sample = RawSample {
            accel: [
                55 + rng.random_range(-5..=5),
                -23 + rng.random_range(-5..=5),
                ONE_G + 30 + rng.random_range(-5..=5),
            ],
            gyro: [
                20 + rng.random_range(-3..=3),
                -10 + rng.random_range(-3..=3),
                5 + rng.random_range(-3..=3),
            ],
            mag: [0, 0, 0],
            temperature: 0,
        };
        core.process(&sample, now);
        assert!(now < 10_000, "session never completed");
    }

    assert!((core.gyro_bias_raw(Axis::X) - 20).abs() <= 4);
    assert!((core.gyro_bias_raw(Axis::Y) + 10).abs() <= 4);
    assert!((core.accel_bias_raw(Axis::X) - 55).abs() <= 6);
    assert!((core.accel_bias_raw(Axis::Z) - 30).abs() <= 6);
}

/// Hard-iron extrema tracking recovers a synthetic offset from a jittered
/// sphere sweep.
#[test]
fn test_hard_iron_recovers_offset() {
    let mut cal = HardIronCalibrator::new();
    cal.start();

    let center = [350i32, -120, 80];
    let radius = 900.0_f32;
    let mut rng = Pcg64::seed_from_u64(11);
    let mut now = 0;
    for a in 0..36 {
        for b in 0..=18 {
            now += 5;
            let theta = a as f32 * 10.0_f32.to_radians();
            let phi = b as f32 * 10.0_f32.to_radians();
            let mag = [
                center[0] as i16
                    + (radius * phi.sin() * theta.cos()) as i16
                    + rng.random_range(-20..=20),
                center[1] as i16
                    + (radius * phi.sin() * theta.sin()) as i16
                    + rng.random_range(-20..=20),
                center[2] as i16 + (radius * phi.cos()) as i16 + rng.random_range(-20..=20),
            ];
            cal.update(mag, now);
        }
    }
    cal.finish();

    let offsets = cal.offsets();
    for i in 0..3 {
        assert!(
            (offsets[i] - center[i]).abs() <= 25,
            "axis {i}: {} vs {}",
            offsets[i],
            center[i]
        );
    }
}

/// Planar magnetometer data cannot define an ellipsoid; the fit reports
/// failure and the committed matrix stays untouched.
#[test]
fn test_soft_iron_planar_data_fails() {
    let mut cal = SoftIronCalibrator::new();
    for deg in 0..360 {
        let theta = (deg as f32).to_radians();
        let mag = [
            (1000.0 * theta.cos()) as i16,
            (1000.0 * theta.sin()) as i16,
            0,
        ];
        cal.accumulate(mag, [0, 0, 0]);
    }
    assert!(!cal.compute_matrix());
    assert!(!cal.has_fit());
    assert_eq!(*cal.matrix(), Matrix3::identity());
}

/// Round trip through the ellipsoid fit with a rotated, non-spherical
/// ellipsoid. The committed matrix picks up the cross-axis coupling with
/// the two off-diagonal slots scaled differently: the per-row diagonal
/// normalization pins the diagonal at 1 and makes the result
/// non-symmetric, so per-axis scale differences pass through uncorrected
/// and the correction reduces, rather than eliminates, the eccentricity.
#[test]
fn test_soft_iron_rotated_ellipsoid_round_trip() {
    let mut cal = SoftIronCalibrator::new();
    let (sin_t, cos_t) = 30.0_f64.to_radians().sin_cos();
    let mut points = Vec::new();
    for a in 0..24 {
        for b in 1..12 {
            let theta = a as f64 * std::f64::consts::PI / 12.0;
            let phi = b as f64 * std::f64::consts::PI / 12.0;
            let e = [
                1500.0 * phi.sin() * theta.cos(),
                1000.0 * phi.sin() * theta.sin(),
                700.0 * phi.cos(),
            ];
            let p = [
                (cos_t * e[0] - sin_t * e[1]) as i16,
                (sin_t * e[0] + cos_t * e[1]) as i16,
                e[2] as i16,
            ];
            cal.accumulate(p, [0, 0, 0]);
            points.push(p);
        }
    }
    assert!(cal.compute_matrix());
    assert!(cal.center().norm() < 1.0, "center {:?}", cal.center());

    let m = cal.matrix();
    for i in 0..3 {
        assert!((m[(i, i)] - 1.0).abs() < 1e-6, "diagonal {i} = {}", m[(i, i)]);
    }
    // Z stays decoupled from an in-plane rotation.
    assert!(m[(0, 2)].abs() < 1e-3 && m[(2, 0)].abs() < 1e-3);
    assert!(m[(1, 2)].abs() < 1e-3 && m[(2, 1)].abs() < 1e-3);
    // Both xy slots carry the coupling, at visibly different magnitudes.
    assert!((-0.5f32..=-0.3).contains(&m[(0, 1)]), "m01 = {}", m[(0, 1)]);
    assert!((-0.25f32..=-0.12).contains(&m[(1, 0)]), "m10 = {}", m[(1, 0)]);
    assert!(m[(0, 1)].abs() > 1.5 * m[(1, 0)].abs(), "matrix came out symmetric");

    // Achievable residual: the corrected cloud is rounder than the raw one
    // but still far from a sphere.
    let correction = m.map(|x| x as f64);
    let mut raw = (f64::MAX, f64::MIN);
    let mut corrected = (f64::MAX, f64::MIN);
    for p in &points {
        let v = Vector3::new(p[0] as f64, p[1] as f64, p[2] as f64);
        let r = v.norm();
        raw = (raw.0.min(r), raw.1.max(r));
        let c = (correction * v).norm();
        corrected = (corrected.0.min(c), corrected.1.max(c));
    }
    let raw_ratio = raw.1 / raw.0;
    let corrected_ratio = corrected.1 / corrected.0;
    assert!(raw_ratio > 2.0, "raw extent ratio {raw_ratio}");
    assert!(corrected_ratio < 1.95, "corrected extent ratio {corrected_ratio}");
    assert!(corrected_ratio < raw_ratio);
}

/// A magnetometer session past its maximum duration force-ends and commits
/// the extrema midpoint collected so far.
#[test]
fn test_mag_session_expiry_commits() {
    let mut core = MotionCore::new();
    core.set_board_orientation(BoardOrientation::TopNwuWidth);
    core.set_mag_session_max_ms(300);
    core.run_auto_cal_mag(0);

    let mut now = 0;
    let extrema = [[900i16, 200, 450], [-500, -600, -250]];
    for mag in extrema {
        now += 5;
        let sample = RawSample {
            mag,
            accel: [0, 0, ONE_G],
            ..RawSample::default()
        };
        core.process(&sample, now);
    }
    while core.session() != CalibrationSession::Idle {
        now += 5;
        let sample = RawSample {
            mag: [100, -100, 100],
            accel: [0, 0, ONE_G],
            ..RawSample::default()
        };
        core.process(&sample, now);
        assert!(now < 1000, "session never expired");
    }

    assert_eq!(core.mag_bias_raw(Axis::X), 200);
    assert_eq!(core.mag_bias_raw(Axis::Y), -200);
    assert_eq!(core.mag_bias_raw(Axis::Z), 100);
}

/// Cancelling a magnetometer session commits nothing.
#[test]
fn test_cancelled_mag_session_commits_nothing() {
    let mut core = MotionCore::new();
    core.set_board_orientation(BoardOrientation::TopNwuWidth);
    core.run_auto_cal_mag(0);

    for i in 1u32..20 {
        let sample = RawSample {
            mag: [(i * 40) as i16, -(i as i16) * 25, 60],
            accel: [0, 0, ONE_G],
            ..RawSample::default()
        };
        core.process(&sample, i * 5);
    }
    core.cancel(true);
    let sample = RawSample {
        accel: [0, 0, ONE_G],
        ..RawSample::default()
    };
    core.process(&sample, 200);

    assert_eq!(core.session(), CalibrationSession::Idle);
    for axis in Axis::ALL {
        assert_eq!(core.mag_bias_raw(axis), 0);
        assert_eq!(
            core.soft_iron_row(axis)[axis.index()],
            1.0,
            "soft iron row changed"
        );
    }
}

/// Persisted calibration restores through the per-axis setters.
#[test]
fn test_persistence_round_trip() {
    let mut source = MotionCore::new();
    source.set_mag_bias_raw(Axis::X, 123);
    source.set_gyro_bias_raw(Axis::Y, -45);
    source.set_accel_bias_raw(Axis::Z, 67);
    source.set_soft_iron_row(Axis::Y, Vector3::new(-0.03, 1.0, 0.08));

    let mut restored = MotionCore::new();
    for axis in Axis::ALL {
        restored.set_mag_bias_raw(axis, source.mag_bias_raw(axis));
        restored.set_gyro_bias_raw(axis, source.gyro_bias_raw(axis));
        restored.set_accel_bias_raw(axis, source.accel_bias_raw(axis));
        restored.set_soft_iron_row(axis, source.soft_iron_row(axis));
    }

    assert_eq!(restored.mag_bias_raw(Axis::X), 123);
    assert_eq!(restored.gyro_bias_raw(Axis::Y), -45);
    assert_eq!(restored.accel_bias_raw(Axis::Z), 67);
    assert_eq!(
        restored.soft_iron_row(Axis::Y),
        Vector3::new(-0.03, 1.0, 0.08)
    );
}

/// A standalone calibrator that never sees stillness stays running.
#[test]
fn test_motion_calibration_requires_stillness() {
    let mut cal = StillnessCalibrator::new();
    cal.start(5);
    let mut rng = Pcg64::seed_from_u64(3);
    for _ in 0..500 {
        // Rotation rates well above the stillness gate.
        let gyro = [
            rng.random_range(-400..=400),
            rng.random_range(-400..=400),
            rng.random_range(-400..=400),
        ];
        assert!(!cal.update(gyro, [0, 0, ONE_G], ACCEL_RES));
    }
    assert_eq!(cal.status(), CalibrationStatus::Running);
}
