//! External region extraction from a binary mask.
//!
//! Only outer borders with no enclosing hole are reported, so blobs sitting
//! inside the hole of another blob are ignored. Area is the polygon area of
//! the traced border, so a filled `w x h` block measures `(w - 1) * (h - 1)`.

use image::{imageops, GrayImage};
use imageproc::contours::{find_contours, BorderType, Contour};
use imageproc::geometry::contour_area;
use imageproc::point::Point;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BoundingBox {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl BoundingBox {
    /// Smallest pixel-inclusive box around `points`.
    pub fn enclosing(points: &[Point<i32>]) -> Option<Self> {
        let first = points.first()?;
        let (mut min_x, mut min_y, mut max_x, mut max_y) = (first.x, first.y, first.x, first.y);
        for p in &points[1..] {
            min_x = min_x.min(p.x);
            min_y = min_y.min(p.y);
            max_x = max_x.max(p.x);
            max_y = max_y.max(p.y);
        }
        Some(Self {
            x: min_x,
            y: min_y,
            width: max_x - min_x + 1,
            height: max_y - min_y + 1,
        })
    }
}

#[derive(Debug, Clone)]
pub struct Region {
    pub bbox: BoundingBox,
    pub area: f64,
}

/// Regions in raster order of their top-left-most border pixel.
pub fn find_regions(mask: &GrayImage) -> Vec<Region> {
    // border following never opens an outer border in column 0, so give
    // every region a background margin and shift back afterwards
    let mut padded = GrayImage::new(mask.width() + 2, mask.height() + 2);
    imageops::replace(&mut padded, mask, 1, 1);

    find_contours::<i32>(&padded)
        .into_iter()
        .filter(is_external)
        .filter_map(|contour| {
            let outline: Vec<Point<i32>> = contour
                .points
                .into_iter()
                .map(|p| Point::new(p.x - 1, p.y - 1))
                .collect();
            let bbox = BoundingBox::enclosing(&outline)?;
            Some(Region {
                bbox,
                area: contour_area(&outline),
            })
        })
        .collect()
}

fn is_external(contour: &Contour<i32>) -> bool {
    contour.border_type == BorderType::Outer && contour.parent.is_none()
}
