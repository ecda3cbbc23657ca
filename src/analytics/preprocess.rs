use image::imageops::{self, FilterType};
use image::RgbImage;

/// Scales incoming frames down to the fixed working resolution.
///
/// The working resolution is either configured explicitly or derived from the
/// first frame (`width / downscale`, `height / downscale`) and never changes
/// afterwards, so every threshold stays in one coordinate space.
pub struct Preprocessor {
    downscale: u32,
    working: Option<(u32, u32)>,
}

impl Preprocessor {
    pub fn new(downscale: u32, working: Option<(u32, u32)>) -> Self {
        Self {
            downscale: downscale.max(1),
            working,
        }
    }

    pub fn working_size(&self) -> Option<(u32, u32)> {
        self.working
    }

    pub fn prepare(&mut self, frame: RgbImage) -> RgbImage {
        let downscale = self.downscale;
        let (width, height) = *self.working.get_or_insert_with(|| {
            let size = ((frame.width() / downscale).max(1), (frame.height() / downscale).max(1));
            tracing::info!(
                source_width = frame.width(),
                source_height = frame.height(),
                width = size.0,
                height = size.1,
                "working resolution fixed"
            );
            size
        });

        if frame.dimensions() == (width, height) {
            return frame;
        }

        imageops::resize(&frame, width, height, FilterType::Triangle)
    }
}
