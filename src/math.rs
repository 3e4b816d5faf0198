//! Scalar math utilities shared by the fusion filter and the calibrators

/// Mathematical constants
pub const DEG_TO_RAD: f32 = core::f32::consts::PI / 180.0;
pub const RAD_TO_DEG: f32 = 180.0 / core::f32::consts::PI;

/// Fast inverse square root, classic Quake variant with two Newton-Raphson
/// iterations.
pub fn fast_inverse_sqrt(x: f32) -> f32 {
    if x <= 0.0 {
        return 0.0;
    }

    let half_x = 0.5 * x;
    let i = 0x5f3759df_u32 - (x.to_bits() >> 1);
    let mut y = f32::from_bits(i);

    y = y * (1.5 - (half_x * y * y));
    y = y * (1.5 - (half_x * y * y));

    y
}

/// Inverse square root variant with roughly a third of the error of the
/// classic bit hack, using a tuned magic constant and a single polynomial
/// step. This is the one used inside the fusion filter.
///
/// <https://pizer.wordpress.com/2008/10/12/fast-inverse-square-root/>
pub fn accurate_inverse_sqrt(x: f32) -> f32 {
    let i = 0x5F1F1412_u32.wrapping_sub(x.to_bits() >> 1);
    let tmp = f32::from_bits(i);
    tmp * (1.69000231 - 0.714158168 * x * tmp * tmp)
}

/// Wraps an angle in degrees from {-180;+180} to {0;360}.
pub fn to_360_degrees(theta: f32) -> f32 {
    let wrapped = theta % 360.0;
    if wrapped < 0.0 { wrapped + 360.0 } else { wrapped }
}

/// Clamps `x` to the inclusive range [a, b].
pub fn clamp_f32(x: f32, a: f32, b: f32) -> f32 {
    if x < a {
        a
    } else if x > b {
        b
    } else {
        x
    }
}

/// Linear interpolator driving the filter gain from a fast-convergence
/// value down to its steady-state value after a (re)start.
///
/// Time is supplied by the caller as monotonic milliseconds; the ramp holds
/// its end value once the duration has elapsed and reports itself inactive.
#[derive(Debug, Clone, Copy)]
pub struct BetaRamp {
    start_value: f32,
    end_value: f32,
    duration_ms: f32,
    start_time_ms: u32,
    active: bool,
}

impl BetaRamp {
    pub fn new() -> Self {
        Self {
            start_value: 0.0,
            end_value: 0.0,
            duration_ms: 1.0,
            start_time_ms: 0,
            active: false,
        }
    }

    /// Sets the start and end values of the ramp.
    pub fn begin(&mut self, start: f32, end: f32) {
        self.start_value = start;
        self.end_value = end;
    }

    /// Sets the ramp duration in milliseconds (values <= 0 fall back to 1).
    pub fn set_duration(&mut self, duration_ms: f32) {
        self.duration_ms = if duration_ms > 0.0 { duration_ms } else { 1.0 };
    }

    /// Starts the ramp at the given monotonic time.
    pub fn start(&mut self, now_ms: u32) {
        self.start_time_ms = now_ms;
        self.active = true;
    }

    /// Interpolated value at the given monotonic time.
    pub fn value(&mut self, now_ms: u32) -> f32 {
        let t = now_ms.wrapping_sub(self.start_time_ms) as f32;
        if t > self.duration_ms {
            self.active = false;
            self.end_value
        } else {
            let t = clamp_f32(t / self.duration_ms, 0.0, 1.0);
            self.start_value + t * (self.end_value - self.start_value)
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }
}

impl Default for BetaRamp {
    fn default() -> Self {
        Self::new()
    }
}
