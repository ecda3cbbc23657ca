use serde::Serialize;

use crate::config::DetectionConfig;
use crate::zone::ZoneRect;

use super::contours::BoundingBox;

/// A region that passed every filter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Detection {
    pub bbox: BoundingBox,
    pub area: f64,
    /// Pixels per second at working resolution.
    pub speed: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    TooSmall,
    TooLarge,
    OutsideZone,
    NoElapsedTime,
    TooSlow,
    Static,
}

impl Rejection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Rejection::TooSmall => "too small",
            Rejection::TooLarge => "too large",
            Rejection::OutsideZone => "outside zone",
            Rejection::NoElapsedTime => "no elapsed time",
            Rejection::TooSlow => "too slow",
            Rejection::Static => "static",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FilterSettings {
    pub min_area: f64,
    pub max_area: f64,
    pub speed_threshold: f64,
    pub static_threshold: i32,
}

impl From<&DetectionConfig> for FilterSettings {
    fn from(config: &DetectionConfig) -> Self {
        Self {
            min_area: config.min_area,
            max_area: config.max_area,
            speed_threshold: config.speed_threshold,
            static_threshold: config.static_threshold,
        }
    }
}

/// Size, zone, speed and static-position filtering, applied in that order.
///
/// Only one position is remembered process-wide: the top-left corner of the
/// most recently accepted detection. It is overwritten on every accept and
/// never expires.
pub struct EventFilter {
    settings: FilterSettings,
    last_accepted: Option<(i32, i32)>,
}

impl EventFilter {
    pub fn new(settings: FilterSettings) -> Self {
        Self {
            settings,
            last_accepted: None,
        }
    }

    pub fn last_accepted(&self) -> Option<(i32, i32)> {
        self.last_accepted
    }

    /// `elapsed_secs` is the time since the previous frame, shared by every
    /// region of the current frame.
    pub fn evaluate(
        &mut self,
        bbox: BoundingBox,
        area: f64,
        zone: &ZoneRect,
        elapsed_secs: f64,
    ) -> Result<Detection, Rejection> {
        let s = &self.settings;

        if area < s.min_area {
            return Err(Rejection::TooSmall);
        }
        if area > s.max_area {
            return Err(Rejection::TooLarge);
        }

        if !zone.contains(bbox.x, bbox.y) {
            return Err(Rejection::OutsideZone);
        }

        if !elapsed_secs.is_finite() || elapsed_secs <= 0.0 {
            return Err(Rejection::NoElapsedTime);
        }
        let speed = bbox.width as f64 / elapsed_secs;
        if speed < s.speed_threshold {
            return Err(Rejection::TooSlow);
        }

        if let Some((last_x, last_y)) = self.last_accepted {
            if (bbox.x - last_x).abs() < s.static_threshold
                && (bbox.y - last_y).abs() < s.static_threshold
            {
                return Err(Rejection::Static);
            }
        }

        self.last_accepted = Some((bbox.x, bbox.y));
        Ok(Detection { bbox, area, speed })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ZONE: ZoneRect = ZoneRect {
        x: 100,
        y: 100,
        width: 420,
        height: 310,
    };

    fn filter() -> EventFilter {
        EventFilter::new(FilterSettings::from(&DetectionConfig::default()))
    }

    fn bbox(x: i32, y: i32, width: i32) -> BoundingBox {
        BoundingBox {
            x,
            y,
            width,
            height: 20,
        }
    }

    #[test]
    fn test_accepts_fast_object_in_zone() {
        let mut f = filter();
        let det = f.evaluate(bbox(150, 120, 150), 3000.0, &ZONE, 0.02).unwrap();
        assert_eq!(det.speed, 7500.0);
        assert_eq!(f.last_accepted(), Some((150, 120)));
    }

    #[test]
    fn test_size_bounds_are_inclusive() {
        let mut f = filter();
        assert_eq!(
            f.evaluate(bbox(150, 120, 150), 1999.0, &ZONE, 0.02),
            Err(Rejection::TooSmall)
        );
        assert_eq!(
            f.evaluate(bbox(150, 120, 150), 5001.0, &ZONE, 0.02),
            Err(Rejection::TooLarge)
        );
        assert!(f.evaluate(bbox(150, 120, 150), 2000.0, &ZONE, 0.02).is_ok());
        assert!(f.evaluate(bbox(500, 400, 150), 5000.0, &ZONE, 0.02).is_ok());
    }

    #[test]
    fn test_only_top_left_corner_must_be_in_zone() {
        let mut f = filter();
        assert_eq!(
            f.evaluate(bbox(50, 120, 150), 3000.0, &ZONE, 0.02),
            Err(Rejection::OutsideZone)
        );
        // extends well past the right edge but starts inside
        assert!(f.evaluate(bbox(520, 410, 300), 3000.0, &ZONE, 0.02).is_ok());
    }

    #[test]
    fn test_speed_threshold() {
        let mut f = filter();
        // 1000 px over 0.25 s = 4000 px/s
        assert_eq!(
            f.evaluate(bbox(150, 120, 1000), 3000.0, &ZONE, 0.25),
            Err(Rejection::TooSlow)
        );
        // exactly at the threshold passes
        assert!(f.evaluate(bbox(150, 120, 1075), 3000.0, &ZONE, 0.25).is_ok());
    }

    #[test]
    fn test_zero_or_invalid_elapsed_time_is_rejected() {
        let mut f = filter();
        for elapsed in [0.0, -0.01, f64::NAN, f64::INFINITY] {
            assert_eq!(
                f.evaluate(bbox(150, 120, 150), 3000.0, &ZONE, elapsed),
                Err(Rejection::NoElapsedTime)
            );
        }
        assert_eq!(f.last_accepted(), None);
    }

    #[test]
    fn test_static_suppression_sequence() {
        let mut f = filter();

        assert!(f.evaluate(bbox(150, 100, 150), 3000.0, &ZONE, 0.02).is_ok());
        assert_eq!(
            f.evaluate(bbox(160, 105, 150), 3000.0, &ZONE, 0.02),
            Err(Rejection::Static)
        );
        // compared against the last accepted position, not the suppressed one
        assert_eq!(f.last_accepted(), Some((150, 100)));
        assert!(f.evaluate(bbox(450, 100, 150), 3000.0, &ZONE, 0.02).is_ok());
        assert_eq!(f.last_accepted(), Some((450, 100)));
    }

    #[test]
    fn test_static_suppression_needs_both_axes_close() {
        let mut f = filter();
        assert!(f.evaluate(bbox(150, 100, 150), 3000.0, &ZONE, 0.02).is_ok());
        // dx < 300 but dy == 300
        assert!(f.evaluate(bbox(160, 400, 150), 3000.0, &ZONE, 0.02).is_ok());
    }

    #[test]
    fn test_filters_short_circuit_in_order() {
        let mut f = filter();
        // too small and outside the zone and too slow: size wins
        assert_eq!(
            f.evaluate(bbox(0, 0, 1), 10.0, &ZONE, 0.0),
            Err(Rejection::TooSmall)
        );
        // outside the zone with zero elapsed time: zone wins
        assert_eq!(
            f.evaluate(bbox(0, 0, 150), 3000.0, &ZONE, 0.0),
            Err(Rejection::OutsideZone)
        );
    }
}
