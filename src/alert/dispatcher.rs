use std::time::{SystemTime, UNIX_EPOCH};

use crate::analytics::Detection;
use crate::display::AnnotatedFrame;

use super::{AlertEvent, AlertSink};

/// Annotates the outgoing frame and signals every sink once per detection.
pub struct AlertDispatcher {
    sinks: Vec<Box<dyn AlertSink>>,
    next_id: u64,
}

impl AlertDispatcher {
    pub fn new(sinks: Vec<Box<dyn AlertSink>>) -> Self {
        Self { sinks, next_id: 1 }
    }

    pub fn dispatch(
        &mut self,
        frame_index: u64,
        detections: &[Detection],
        annotated: &mut AnnotatedFrame,
    ) -> usize {
        for detection in detections {
            annotated.annotate(detection.bbox, speed_label(detection));

            let event = self.event(frame_index, detection);
            for sink in &mut self.sinks {
                sink.trigger(&event);
            }
        }
        detections.len()
    }

    fn event(&mut self, frame_index: u64, detection: &Detection) -> AlertEvent {
        let id = self.next_id;
        self.next_id += 1;

        AlertEvent {
            id,
            frame: frame_index,
            timestamp_ms: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_millis() as u64)
                .unwrap_or(0),
            x: detection.bbox.x,
            y: detection.bbox.y,
            width: detection.bbox.width,
            height: detection.bbox.height,
            area: detection.area,
            speed: detection.speed,
        }
    }
}

pub fn speed_label(detection: &Detection) -> String {
    format!("Speed: {:.2} px/s", detection.speed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::AlertHistory;
    use crate::analytics::BoundingBox;
    use crate::zone::ZoneRect;
    use image::RgbImage;

    fn detection(x: i32) -> Detection {
        Detection {
            bbox: BoundingBox {
                x,
                y: 120,
                width: 150,
                height: 20,
            },
            area: 2831.0,
            speed: 7500.0,
        }
    }

    #[test]
    fn test_each_detection_annotates_and_alerts() {
        let history = AlertHistory::new(10);
        let mut dispatcher = AlertDispatcher::new(vec![Box::new(history.clone())]);
        let mut frame = AnnotatedFrame::new(RgbImage::new(8, 8), ZoneRect::new(0, 0, 4, 4));

        let count = dispatcher.dispatch(9, &[detection(150), detection(460)], &mut frame);

        assert_eq!(count, 2);
        assert_eq!(frame.annotations.len(), 2);
        assert_eq!(frame.annotations[0].label, "Speed: 7500.00 px/s");

        let events = history.recent(10);
        assert_eq!(events.len(), 2);
        assert_eq!((events[0].id, events[1].id), (1, 2));
        assert_eq!(events[1].x, 460);
        assert_eq!(events[0].frame, 9);
    }

    #[test]
    fn test_no_detections_no_alerts() {
        let history = AlertHistory::new(10);
        let mut dispatcher = AlertDispatcher::new(vec![Box::new(history.clone())]);
        let mut frame = AnnotatedFrame::new(RgbImage::new(8, 8), ZoneRect::new(0, 0, 4, 4));

        assert_eq!(dispatcher.dispatch(1, &[], &mut frame), 0);
        assert_eq!(history.total(), 0);
        assert!(frame.annotations.is_empty());
    }
}
