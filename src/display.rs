use std::io::Cursor;
use std::sync::{Arc, OnceLock, RwLock};
use std::time::{Duration, Instant};

use ab_glyph::FontRef;
use image::codecs::jpeg::JpegEncoder;
use image::{GrayImage, Rgb, RgbImage};
use imageproc::drawing::{draw_hollow_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;
use serde::Serialize;
use thiserror::Error;

use crate::analytics::BoundingBox;
use crate::zone::ZoneRect;

const ZONE_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
const DETECTION_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
const LABEL_COLOR: Rgb<u8> = Rgb([255, 255, 0]);
const LINE_THICKNESS: i32 = 2;
const LABEL_SCALE: f32 = 18.0;
// baseline of the label sits this far above the box
const LABEL_OFFSET: i32 = 10;

static FONT_DATA: &[u8] = include_bytes!("fonts/DejaVuSans.ttf");

fn label_font() -> Option<&'static FontRef<'static>> {
    static FONT: OnceLock<Option<FontRef<'static>>> = OnceLock::new();
    FONT.get_or_init(|| match FontRef::try_from_slice(FONT_DATA) {
        Ok(font) => Some(font),
        Err(e) => {
            tracing::warn!(error = %e, "label font unusable, speed labels disabled");
            None
        }
    })
    .as_ref()
}

#[derive(Debug, Error)]
pub enum DisplayError {
    #[error("jpeg encoding failed: {0}")]
    Encode(#[from] image::ImageError),
}

#[derive(Debug, Clone, Serialize)]
pub struct Annotation {
    pub bbox: BoundingBox,
    pub label: String,
}

/// Working-resolution frame plus everything drawn on top of it.
pub struct AnnotatedFrame {
    pub image: RgbImage,
    pub zone: ZoneRect,
    pub annotations: Vec<Annotation>,
}

impl AnnotatedFrame {
    pub fn new(image: RgbImage, zone: ZoneRect) -> Self {
        Self {
            image,
            zone,
            annotations: Vec::new(),
        }
    }

    pub fn annotate(&mut self, bbox: BoundingBox, label: String) {
        self.annotations.push(Annotation { bbox, label });
    }

    /// Copy of the frame with the zone, detection boxes and speed labels drawn in.
    pub fn render(&self) -> RgbImage {
        let mut out = self.image.clone();
        draw_rect(
            &mut out,
            self.zone.x,
            self.zone.y,
            self.zone.width,
            self.zone.height,
            ZONE_COLOR,
        );

        let font = label_font();
        for a in &self.annotations {
            draw_rect(
                &mut out,
                a.bbox.x,
                a.bbox.y,
                a.bbox.width,
                a.bbox.height,
                DETECTION_COLOR,
            );
            if let Some(font) = font {
                let (_, text_height) = text_size(LABEL_SCALE, font, &a.label);
                let top = a.bbox.y - LABEL_OFFSET - text_height as i32;
                draw_text_mut(&mut out, LABEL_COLOR, a.bbox.x, top, LABEL_SCALE, font, &a.label);
            }
        }
        out
    }
}

/// Outline from `(x, y)` to `(x + w, y + h)` inclusive, growing inward,
/// clipped to the image.
fn draw_rect(img: &mut RgbImage, x: i32, y: i32, w: i32, h: i32, color: Rgb<u8>) {
    let (iw, ih) = (img.width() as i64, img.height() as i64);
    for t in 0..LINE_THICKNESS as i64 {
        let (left, top) = (x as i64 + t, y as i64 + t);
        let (right, bottom) = (x as i64 + w as i64 - t, y as i64 + h as i64 - t);
        if right < left || bottom < top {
            break;
        }
        // edges beyond the image stay one pixel outside it
        let (left, right) = (left.clamp(-1, iw), right.clamp(-1, iw));
        let (top, bottom) = (top.clamp(-1, ih), bottom.clamp(-1, ih));
        let rect = Rect::at(left as i32, top as i32)
            .of_size((right - left + 1) as u32, (bottom - top + 1) as u32);
        draw_hollow_rect_mut(img, rect, color);
    }
}

/// Consumer of one annotated frame and threshold mask per iteration.
pub trait Display: Send {
    fn render(&mut self, frame: &AnnotatedFrame, mask: &GrayImage);
}

#[derive(Default)]
struct Snapshot {
    frame_jpeg: Option<Vec<u8>>,
    mask_jpeg: Option<Vec<u8>>,
    annotations: Vec<Annotation>,
}

/// Latest rendered frame and mask, shared with the HTTP viewer.
#[derive(Clone, Default)]
pub struct FrameStore {
    inner: Arc<RwLock<Snapshot>>,
}

impl FrameStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frame_jpeg(&self) -> Option<Vec<u8>> {
        self.inner.read().ok()?.frame_jpeg.clone()
    }

    pub fn mask_jpeg(&self) -> Option<Vec<u8>> {
        self.inner.read().ok()?.mask_jpeg.clone()
    }

    pub fn annotations(&self) -> Vec<Annotation> {
        self.inner
            .read()
            .map(|s| s.annotations.clone())
            .unwrap_or_default()
    }

    fn store(&self, frame_jpeg: Vec<u8>, mask_jpeg: Vec<u8>, annotations: Vec<Annotation>) {
        let mut snapshot = match self.inner.write() {
            Ok(s) => s,
            Err(poisoned) => poisoned.into_inner(),
        };
        snapshot.frame_jpeg = Some(frame_jpeg);
        snapshot.mask_jpeg = Some(mask_jpeg);
        snapshot.annotations = annotations;
    }
}

/// Encodes frames into a [`FrameStore`], at most once per `min_interval`.
pub struct JpegDisplay {
    store: FrameStore,
    min_interval: Duration,
    quality: u8,
    last_render: Option<Instant>,
}

impl JpegDisplay {
    pub fn new(store: FrameStore, min_interval: Duration, quality: u8) -> Self {
        Self {
            store,
            min_interval,
            quality: quality.clamp(1, 100),
            last_render: None,
        }
    }

    fn encode(&self, frame: &AnnotatedFrame, mask: &GrayImage) -> Result<(), DisplayError> {
        let frame_jpeg = encode_jpeg(&frame.render(), self.quality)?;
        let mask_jpeg = encode_jpeg(mask, self.quality)?;
        self.store
            .store(frame_jpeg, mask_jpeg, frame.annotations.clone());
        Ok(())
    }
}

impl Display for JpegDisplay {
    fn render(&mut self, frame: &AnnotatedFrame, mask: &GrayImage) {
        let now = Instant::now();
        if let Some(last) = self.last_render {
            // always show frames that carry a detection
            if now.duration_since(last) < self.min_interval && frame.annotations.is_empty() {
                return;
            }
        }
        self.last_render = Some(now);

        if let Err(e) = self.encode(frame, mask) {
            tracing::warn!(error = %e, "failed to render frame");
        }
    }
}

fn encode_jpeg<I>(img: &I, quality: u8) -> Result<Vec<u8>, DisplayError>
where
    I: image::GenericImageView,
    I::Pixel: image::PixelWithColorType,
{
    let mut buf = Cursor::new(Vec::new());
    JpegEncoder::new_with_quality(&mut buf, quality).encode_image(img)?;
    Ok(buf.into_inner())
}
