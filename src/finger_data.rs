//! The data model for a set of sensorized fingers.
//!
//! Every finger carries a 4x7 static tactile array, a dynamic tactile
//! channel, an accelerometer, a gyroscope, a magnetometer and a temperature
//! sensor. A [`Fingers`] value holds the most recent reading of every one of
//! those fields for every finger, along with the time it was completed.

/// Number of fingers attached to one sensor board.
pub const FINGER_COUNT: usize = 2;

/// Rows of taxels in the static tactile array.
pub const STATIC_TACTILE_ROWS: usize = 4;

/// Columns of taxels in the static tactile array.
pub const STATIC_TACTILE_COLS: usize = 7;

/// Number of values in one static tactile record.
pub const STATIC_TACTILE_COUNT: usize = STATIC_TACTILE_ROWS * STATIC_TACTILE_COLS;

/// Number of values in one dynamic tactile record.
pub const DYNAMIC_TACTILE_COUNT: usize = 1;

/// Number of axes reported by each inertial sensor.
pub const IMU_AXES: usize = 3;

/// The latest readings of a single finger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FingerData {
    /// Raw taxel values, row-major.
    pub static_tactile: [u16; STATIC_TACTILE_COUNT],
    /// Raw dynamic (vibration) tactile value.
    pub dynamic_tactile: [i16; DYNAMIC_TACTILE_COUNT],
    /// Raw accelerometer vector, x y z.
    pub accelerometer: [i16; IMU_AXES],
    /// Raw gyroscope vector, x y z.
    pub gyroscope: [i16; IMU_AXES],
    /// Raw magnetometer vector, x y z.
    pub magnetometer: [i16; IMU_AXES],
    /// Raw temperature reading.
    pub temperature: i16,
}

impl FingerData {
    /// Returns the taxel at `row`, `col`, or `None` outside the 4x7 grid.
    pub fn static_tactile_at(&self, row: usize, col: usize) -> Option<u16> {
        if row >= STATIC_TACTILE_ROWS || col >= STATIC_TACTILE_COLS {
            return None;
        }
        Some(self.static_tactile[row * STATIC_TACTILE_COLS + col])
    }

    /// Iterates over the static tactile array one row at a time.
    pub fn static_tactile_rows(&self) -> impl Iterator<Item = &[u16]> {
        self.static_tactile.chunks(STATIC_TACTILE_COLS)
    }
}

/// A timestamped snapshot of every finger.
///
/// Fields are updated sparsely: a snapshot reflects the latest value seen
/// for each field, which was not necessarily refreshed by the same packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Fingers {
    /// Milliseconds since the acquisition started.
    pub timestamp: i64,
    /// One entry per finger.
    pub finger: [FingerData; FINGER_COUNT],
}
