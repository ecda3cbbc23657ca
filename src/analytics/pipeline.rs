use std::time::{Duration, Instant};

use image::{GrayImage, RgbImage};

use crate::config::DetectionConfig;
use crate::zone::ZoneRect;

use super::color::{self, ColorRange};
use super::contours;
use super::filter::{Detection, EventFilter, FilterSettings};
use super::motion::MotionDetector;

/// Outcome of one working-resolution frame.
pub struct FrameAnalysis {
    pub detections: Vec<Detection>,
    /// Thresholded change mask; all zero while the differencer is priming.
    pub mask: GrayImage,
    pub regions: usize,
    pub elapsed: Duration,
}

/// Colour isolation, differencing, region extraction and filtering for one
/// frame at a time. Holds the previous isolated frame, the previous frame
/// time and the last accepted position.
pub struct DetectionPipeline {
    range: ColorRange,
    motion: MotionDetector,
    filter: EventFilter,
    last_frame_at: Option<Instant>,
}

impl DetectionPipeline {
    pub fn new(config: &DetectionConfig) -> Self {
        Self {
            range: ColorRange::new(config.lower_hsv, config.upper_hsv),
            motion: MotionDetector::new(config.change_threshold),
            filter: EventFilter::new(FilterSettings::from(config)),
            last_frame_at: None,
        }
    }

    pub fn is_primed(&self) -> bool {
        self.motion.is_primed()
    }

    pub fn last_accepted(&self) -> Option<(i32, i32)> {
        self.filter.last_accepted()
    }

    pub fn prime(&mut self, frame: &RgbImage, at: Instant) {
        self.motion.prime(color::isolate(frame, &self.range));
        self.last_frame_at = Some(at);
    }

    /// `at` is the wall-clock time the frame was read.
    pub fn process(&mut self, frame: &RgbImage, zone: &ZoneRect, at: Instant) -> FrameAnalysis {
        let elapsed = self
            .last_frame_at
            .map(|prev| at.saturating_duration_since(prev))
            .unwrap_or_default();
        self.last_frame_at = Some(at);

        let gray = color::isolate(frame, &self.range);
        let Some(mask) = self.motion.process_frame(gray) else {
            return FrameAnalysis {
                detections: Vec::new(),
                mask: GrayImage::new(frame.width(), frame.height()),
                regions: 0,
                elapsed,
            };
        };

        let regions = contours::find_regions(&mask);
        let elapsed_secs = elapsed.as_secs_f64();
        let mut detections = Vec::new();

        for region in &regions {
            match self.filter.evaluate(region.bbox, region.area, zone, elapsed_secs) {
                Ok(detection) => detections.push(detection),
                Err(reason) => {
                    tracing::debug!(
                        x = region.bbox.x,
                        y = region.bbox.y,
                        width = region.bbox.width,
                        area = region.area,
                        reason = reason.as_str(),
                        "candidate rejected"
                    );
                }
            }
        }

        tracing::trace!(
            regions = regions.len(),
            accepted = detections.len(),
            elapsed_ms = elapsed.as_millis() as u64,
            "frame analysed"
        );

        FrameAnalysis {
            detections,
            mask,
            regions: regions.len(),
            elapsed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    // hue 113, saturation 109, value 140: inside the default range
    const OBJECT: Rgb<u8> = Rgb([80, 95, 140]);
    const ZONE: ZoneRect = ZoneRect {
        x: 100,
        y: 100,
        width: 420,
        height: 310,
    };

    fn blank() -> RgbImage {
        RgbImage::new(640, 360)
    }

    fn with_object(x: u32, y: u32, w: u32, h: u32) -> RgbImage {
        with_objects(&[(x, y)], w, h)
    }

    fn with_objects(origins: &[(u32, u32)], w: u32, h: u32) -> RgbImage {
        let mut frame = blank();
        for &(x, y) in origins {
            for yy in y..y + h {
                for xx in x..x + w {
                    frame.put_pixel(xx, yy, OBJECT);
                }
            }
        }
        frame
    }

    fn pipeline() -> DetectionPipeline {
        DetectionPipeline::new(&DetectionConfig::default())
    }

    #[test]
    fn test_single_frame_yields_nothing() {
        let mut p = pipeline();
        let t0 = Instant::now();

        let analysis = p.process(&with_object(150, 120, 150, 20), &ZONE, t0);

        assert!(analysis.detections.is_empty());
        assert_eq!(analysis.regions, 0);
        assert!(p.is_primed());
    }

    #[test]
    fn test_object_appearing_inside_zone_is_accepted() {
        let mut p = pipeline();
        let t0 = Instant::now();
        p.prime(&blank(), t0);

        let analysis = p.process(
            &with_object(150, 120, 150, 20),
            &ZONE,
            t0 + Duration::from_millis(20),
        );

        assert_eq!(analysis.detections.len(), 1);
        let det = analysis.detections[0];
        assert_eq!((det.bbox.x, det.bbox.y), (150, 120));
        assert_eq!(det.bbox.width, 150);
        assert_eq!(det.area, 149.0 * 19.0);
        assert!((det.speed - 7500.0).abs() < 1e-6);
        assert_eq!(p.last_accepted(), Some((150, 120)));
    }

    #[test]
    fn test_object_outside_zone_is_ignored() {
        let mut p = pipeline();
        let t0 = Instant::now();
        p.prime(&blank(), t0);

        let analysis = p.process(
            &with_object(50, 120, 150, 20),
            &ZONE,
            t0 + Duration::from_millis(20),
        );

        assert_eq!(analysis.regions, 1);
        assert!(analysis.detections.is_empty());
        assert_eq!(p.last_accepted(), None);
    }

    #[test]
    fn test_identical_timestamps_do_not_accept() {
        let mut p = pipeline();
        let t0 = Instant::now();
        p.prime(&blank(), t0);

        let analysis = p.process(&with_object(150, 120, 150, 20), &ZONE, t0);

        assert_eq!(analysis.regions, 1);
        assert!(analysis.detections.is_empty());
        assert_eq!(analysis.elapsed, Duration::ZERO);
    }

    #[test]
    fn test_wrong_colour_is_not_a_candidate() {
        let mut p = pipeline();
        let t0 = Instant::now();
        p.prime(&blank(), t0);

        let mut frame = blank();
        for y in 120..140 {
            for x in 150..300 {
                frame.put_pixel(x, y, Rgb([220, 40, 40]));
            }
        }
        let analysis = p.process(&frame, &ZONE, t0 + Duration::from_millis(20));

        assert_eq!(analysis.regions, 0);
        assert!(analysis.mask.pixels().all(|px| px.0[0] == 0));
    }

    #[test]
    fn test_stationary_object_does_not_realert() {
        let mut p = pipeline();
        let t0 = Instant::now();
        p.prime(&blank(), t0);

        let ms = Duration::from_millis(20);
        let first = p.process(&with_object(150, 120, 150, 20), &ZONE, t0 + ms);
        assert_eq!(first.detections.len(), 1);

        // object leaves: the vanishing blob sits at the accepted position
        let second = p.process(&blank(), &ZONE, t0 + ms * 2);
        assert_eq!(second.regions, 1);
        assert!(second.detections.is_empty());

        // a new object far from the remembered position
        let third = p.process(&with_object(460, 300, 150, 20), &ZONE, t0 + ms * 3);
        assert_eq!(third.detections.len(), 1);
        assert_eq!(p.last_accepted(), Some((460, 300)));
    }

    #[test]
    fn test_distant_objects_in_one_frame_both_alert() {
        let mut p = pipeline();
        let t0 = Instant::now();
        p.prime(&blank(), t0);

        let frame = with_objects(&[(420, 300), (110, 120)], 150, 20);
        let analysis = p.process(&frame, &ZONE, t0 + Duration::from_millis(20));

        assert_eq!(analysis.regions, 2);
        let origins: Vec<(i32, i32)> = analysis
            .detections
            .iter()
            .map(|d| (d.bbox.x, d.bbox.y))
            .collect();
        assert_eq!(origins, vec![(110, 120), (420, 300)]);
        assert!(analysis.detections.iter().all(|d| (d.speed - 7500.0).abs() < 1e-6));
        // raster order: the lower object is evaluated last
        assert_eq!(p.last_accepted(), Some((420, 300)));
    }

    #[test]
    fn test_nearby_object_in_same_frame_is_suppressed() {
        let mut p = pipeline();
        let t0 = Instant::now();
        p.prime(&blank(), t0);

        let frame = with_objects(&[(150, 120), (300, 200)], 150, 20);
        let analysis = p.process(&frame, &ZONE, t0 + Duration::from_millis(20));

        assert_eq!(analysis.regions, 2);
        assert_eq!(analysis.detections.len(), 1);
        assert_eq!(
            (analysis.detections[0].bbox.x, analysis.detections[0].bbox.y),
            (150, 120)
        );
        assert_eq!(p.last_accepted(), Some((150, 120)));
    }
}
