use image::{GrayImage, Luma};
use imageproc::contrast::{threshold, ThresholdType};
use imageproc::map::map_colors2;

/// Frame-to-frame differencer over isolated grayscale images.
pub struct MotionDetector {
    previous: Option<GrayImage>,
    change_threshold: u8,
}

impl MotionDetector {
    pub fn new(change_threshold: u8) -> Self {
        Self {
            previous: None,
            change_threshold,
        }
    }

    pub fn is_primed(&self) -> bool {
        self.previous.is_some()
    }

    /// Stores the baseline without producing a diff.
    pub fn prime(&mut self, gray: GrayImage) {
        self.previous = Some(gray);
    }

    /// Binary mask of pixels whose absolute change exceeds the threshold,
    /// then `current` becomes the new baseline. Returns `None` when unprimed
    /// or when the baseline has other dimensions; both cases re-prime.
    pub fn process_frame(&mut self, current: GrayImage) -> Option<GrayImage> {
        let mask = match &self.previous {
            Some(prev) if prev.dimensions() == current.dimensions() => {
                let diff = map_colors2(prev, &current, |a: Luma<u8>, b: Luma<u8>| {
                    Luma([a.0[0].abs_diff(b.0[0])])
                });
                Some(threshold(&diff, self.change_threshold, ThresholdType::Binary))
            }
            Some(_) => {
                tracing::warn!("baseline size mismatch, re-priming motion detector");
                None
            }
            None => None,
        };

        self.previous = Some(current);
        mask
    }
}
