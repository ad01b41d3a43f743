// THEORY:
// The proxy speed is a scalar read off the width of the blob that crossed the
// line. It is not a calibrated velocity: width stands in for how long the vehicle
// occupies the frame, scaled so the numbers land in a km/h-like range.
//
//     speed = (width / reference_width) * scale        (defaults: 100 px, 3.6)
//
// The value is reported rounded to two decimal places.

use serde::Deserialize;

pub mod speed_estimator {
    use super::*;

    /// Width-to-speed conversion constants.
    #[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
    #[serde(default)]
    pub struct SpeedEstimator {
        /// Blob width, in pixels, that maps to one unit before scaling.
        pub reference_width: f64,
        pub scale: f64,
    }

    impl Default for SpeedEstimator {
        fn default() -> Self {
            Self {
                reference_width: 100.0,
                scale: 3.6,
            }
        }
    }

    impl SpeedEstimator {
        /// Unrounded proxy speed for a blob of the given width.
        pub fn raw_speed(&self, width: u32) -> f64 {
            (width as f64 / self.reference_width) * self.scale
        }

        /// Proxy speed rounded to two decimals, as reported in crossing events.
        pub fn estimate(&self, width: u32) -> f64 {
            round_to_hundredths(self.raw_speed(width))
        }
    }

    pub fn round_to_hundredths(value: f64) -> f64 {
        (value * 100.0).round() / 100.0
    }
}
