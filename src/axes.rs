//! Board orientation remapping
//!
//! The sensor die can sit on either face of the board and along either of
//! its two main axes. Each mounting gets a fixed axis/sign permutation that
//! is applied identically to the raw accelerometer, gyroscope and
//! magnetometer triples, so that all downstream math runs in one canonical
//! right-handed NWU frame.

use crate::types::RawSample;

/// Board mounting orientation selecting the raw axis/sign permutation.
///
/// The permutations keep the remapped frame right-handed; the first two
/// variants leave the sensor face up (NWU), the last two flip it over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BoardOrientation {
    /// Sensor up, X across the board width (identity mapping).
    TopNwuWidth = 0,
    /// Sensor up, X along the board length: (x, y, z) -> (y, -x, z).
    #[default]
    TopNwuLength = 1,
    /// Sensor down, X across the width: (x, y, z) -> (-x, y, -z).
    BottomNwuWidth = 2,
    /// Sensor down, X along the length: (x, y, z) -> (y, x, -z).
    BottomNwuLength = 3,
}

impl BoardOrientation {
    /// Decodes a persisted orientation code, falling back to the default
    /// for out-of-range values.
    pub fn from_code(code: u8) -> Self {
        match code {
            0 => BoardOrientation::TopNwuWidth,
            1 => BoardOrientation::TopNwuLength,
            2 => BoardOrientation::BottomNwuWidth,
            3 => BoardOrientation::BottomNwuLength,
            _ => BoardOrientation::default(),
        }
    }

    pub fn code(self) -> u8 {
        self as u8
    }
}

/// Applies the orientation permutation to one raw triple.
#[inline]
fn remap_triple(t: [i16; 3], orientation: BoardOrientation) -> [i16; 3] {
    let [x, y, z] = t;
    match orientation {
        BoardOrientation::TopNwuWidth => [x, y, z],
        BoardOrientation::TopNwuLength => [y, -x, z],
        BoardOrientation::BottomNwuWidth => [-x, y, -z],
        BoardOrientation::BottomNwuLength => [y, x, -z],
    }
}

/// Remaps a full raw sample in place. Idempotence is per call: the same
/// input always produces the same output, and the identity orientation
/// leaves the sample untouched.
pub fn apply_orientation(sample: &mut RawSample, orientation: BoardOrientation) {
    sample.accel = remap_triple(sample.accel, orientation);
    sample.gyro = remap_triple(sample.gyro, orientation);
    sample.mag = remap_triple(sample.mag, orientation);
}
