//! Hard-iron magnetometer offset calibration
//!
//! While the operator rotates the device through all orientations, per-axis
//! raw extrema are tracked; the hard-iron offset is always the midpoint
//! `(max + min) / 2`. Once the extrema have stopped moving for the
//! stability timeout the offset is frozen and the soft-iron stage can take
//! over. An EMA of the raw mean is maintained alongside purely as a
//! diagnostic to compare against the min/max estimate; it never feeds the
//! committed bias.

use crate::types::{
    CalibrationStatus, HARD_IRON_STABLE_TIME_MS, MAG_EMA_COEFFICIENT, TRACKER_SENTINEL,
};

#[derive(Debug, Clone)]
pub struct HardIronCalibrator {
    status: CalibrationStatus,
    min: [i32; 3],
    max: [i32; 3],
    ema: [f32; 3],
    ema_primed: bool,
    stable: bool,
    stable_since_ms: u32,
    stable_time_ms: u32,
}

impl HardIronCalibrator {
    pub fn new() -> Self {
        Self {
            status: CalibrationStatus::Idle,
            min: [TRACKER_SENTINEL; 3],
            max: [-TRACKER_SENTINEL; 3],
            ema: [0.0; 3],
            ema_primed: false,
            stable: false,
            stable_since_ms: 0,
            stable_time_ms: HARD_IRON_STABLE_TIME_MS,
        }
    }

    pub fn status(&self) -> CalibrationStatus {
        self.status
    }

    pub fn is_done(&self) -> bool {
        self.status == CalibrationStatus::Done
    }

    pub fn start(&mut self) {
        self.min = [TRACKER_SENTINEL; 3];
        self.max = [-TRACKER_SENTINEL; 3];
        self.ema = [0.0; 3];
        self.ema_primed = false;
        self.stable = false;
        self.stable_since_ms = 0;
        self.status = CalibrationStatus::Running;
    }

    pub fn cancel(&mut self) {
        self.start();
        self.status = CalibrationStatus::Idle;
    }

    /// Current hard-iron offset estimate, the midpoint of the tracked
    /// extrema. Only meaningful once at least one sample was seen.
    pub fn offsets(&self) -> [i32; 3] {
        let mut out = [0; 3];
        for i in 0..3 {
            out[i] = (self.max[i] + self.min[i]) / 2;
        }
        out
    }

    /// Diagnostic EMA of the raw magnetometer mean.
    pub fn ema_mean(&self) -> [f32; 3] {
        self.ema
    }

    /// Feeds one remapped raw magnetometer sample. Returns whether the
    /// extrema were stable (unchanged) on this sample.
    pub fn update(&mut self, mag: [i16; 3], now_ms: u32) -> bool {
        if self.status == CalibrationStatus::Idle || self.status == CalibrationStatus::Done {
            return false;
        }

        let mut changed = false;
        for i in 0..3 {
            let m = mag[i] as i32;
            if m > self.max[i] {
                self.max[i] = m;
                changed = true;
            }
            if m < self.min[i] {
                self.min[i] = m;
                changed = true;
            }
        }

        if self.ema_primed {
            for i in 0..3 {
                self.ema[i] += MAG_EMA_COEFFICIENT * (mag[i] as f32 - self.ema[i]);
            }
        } else {
            for i in 0..3 {
                self.ema[i] = mag[i] as f32;
            }
            self.ema_primed = true;
        }

        let stable = !changed;
        if stable != self.stable {
            // Transition in either direction restarts the stability clock.
            self.stable_since_ms = now_ms;
            self.stable = stable;
        }

        if stable {
            self.status = CalibrationStatus::StablePending;
            if now_ms.wrapping_sub(self.stable_since_ms) >= self.stable_time_ms {
                self.status = CalibrationStatus::Done;
            }
        } else {
            self.status = CalibrationStatus::Running;
        }

        stable
    }

    /// Force-completes the stage with whatever extrema were accumulated.
    pub fn finish(&mut self) {
        self.status = CalibrationStatus::Done;
    }
}

impl Default for HardIronCalibrator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offset_is_extrema_midpoint() {
        let mut cal = HardIronCalibrator::new();
        cal.start();
        cal.update([100, -50, 10], 0);
        cal.update([-300, 150, 30], 5);
        cal.update([200, 0, -10], 10);
        assert_eq!(cal.offsets(), [-50, 50, 10]);
    }

    #[test]
    fn test_stability_timeout_completes() {
        let mut cal = HardIronCalibrator::new();
        cal.start();
        let mut now = 0;
        // Expanding extrema keep the tracker unstable.
        cal.update([100, 100, 100], now);
        assert_eq!(cal.status(), CalibrationStatus::Running);

        // Repeating samples inside the extrema are stable.
        loop {
            now += 5;
            let stable = cal.update([50, 50, 50], now);
            assert!(stable);
            if cal.is_done() {
                break;
            }
            assert_eq!(cal.status(), CalibrationStatus::StablePending);
            assert!(now < 2 * HARD_IRON_STABLE_TIME_MS, "never completed");
        }
    }

    #[test]
    fn test_extremum_change_restarts_stability_clock() {
        let mut cal = HardIronCalibrator::new();
        cal.start();
        let mut now = 0;
        cal.update([100, 100, 100], now);

        // Almost stable long enough, then a new extremum.
        while now < HARD_IRON_STABLE_TIME_MS - 10 {
            now += 5;
            cal.update([0, 0, 0], now);
        }
        assert!(!cal.is_done());
        now += 5;
        assert!(!cal.update([500, 0, 0], now), "new extremum is not stable");
        assert_eq!(cal.status(), CalibrationStatus::Running);

        // The full timeout must elapse again.
        let restart = now;
        while !cal.is_done() {
            now += 5;
            cal.update([0, 0, 0], now);
        }
        assert!(now - restart >= HARD_IRON_STABLE_TIME_MS);
    }

    #[test]
    fn test_ema_tracks_mean() {
        let mut cal = HardIronCalibrator::new();
        cal.start();
        for i in 0..2000 {
            cal.update([100, -200, 0], i * 5);
        }
        let ema = cal.ema_mean();
        assert!((ema[0] - 100.0).abs() < 1.0);
        assert!((ema[1] + 200.0).abs() < 1.0);
    }

    #[test]
    fn test_done_ignores_further_samples() {
        let mut cal = HardIronCalibrator::new();
        cal.start();
        cal.update([10, 10, 10], 0);
        cal.finish();
        cal.update([5000, 5000, 5000], 100);
        assert_eq!(cal.offsets(), [10, 10, 10]);
    }
}
