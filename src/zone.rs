use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};

/// Rectangle of interest in working-resolution pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZoneRect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl ZoneRect {
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Rectangle spanned by two corners, in any order. Spans wider than
    /// `i32::MAX` are clamped.
    pub fn from_corners(ax: i32, ay: i32, bx: i32, by: i32) -> Self {
        Self {
            x: ax.min(bx),
            y: ay.min(by),
            width: span(ax, bx),
            height: span(ay, by),
        }
    }

    /// Far corner, saturating at the `i32` range.
    pub fn far_corner(&self) -> (i32, i32) {
        (
            self.x.saturating_add(self.width),
            self.y.saturating_add(self.height),
        )
    }

    /// Inclusive on all four edges.
    pub fn contains(&self, x: i32, y: i32) -> bool {
        let within = |p: i32, origin: i32, len: i32| {
            let origin = origin as i64;
            (origin..=origin + len as i64).contains(&(p as i64))
        };
        within(x, self.x, self.width) && within(y, self.y, self.height)
    }
}

/// Owns the current zone and the state of an in-progress pointer drag.
#[derive(Debug, Clone)]
pub struct ZoneEditor {
    zone: ZoneRect,
    anchor: Option<(i32, i32)>,
}

pub type SharedZone = Arc<RwLock<ZoneEditor>>;

fn span(a: i32, b: i32) -> i32 {
    i32::try_from(a.abs_diff(b)).unwrap_or(i32::MAX)
}

impl ZoneEditor {
    pub fn new(zone: ZoneRect) -> Self {
        Self { zone, anchor: None }
    }

    pub fn shared(zone: ZoneRect) -> SharedZone {
        Arc::new(RwLock::new(Self::new(zone)))
    }

    pub fn current(&self) -> ZoneRect {
        self.zone
    }

    pub fn is_dragging(&self) -> bool {
        self.anchor.is_some()
    }

    pub fn set(&mut self, zone: ZoneRect) {
        self.anchor = None;
        let (far_x, far_y) = zone.far_corner();
        self.zone = ZoneRect::from_corners(zone.x, zone.y, far_x, far_y);
    }

    /// Pointer pressed; the zone is unchanged until the pointer moves.
    pub fn begin_drag(&mut self, x: i32, y: i32) {
        self.anchor = Some((x, y));
    }

    pub fn update_drag(&mut self, x: i32, y: i32) {
        if let Some((ax, ay)) = self.anchor {
            self.zone = ZoneRect::from_corners(ax, ay, x, y);
        }
    }

    pub fn end_drag(&mut self, x: i32, y: i32) {
        if let Some((ax, ay)) = self.anchor.take() {
            self.zone = ZoneRect::from_corners(ax, ay, x, y);
            tracing::info!(
                x = self.zone.x,
                y = self.zone.y,
                width = self.zone.width,
                height = self.zone.height,
                "zone updated"
            );
        }
    }
}

/// Copies the whole rectangle under a single read lock.
pub fn snapshot(zone: &SharedZone) -> ZoneRect {
    match zone.read() {
        Ok(editor) => editor.current(),
        Err(poisoned) => poisoned.into_inner().current(),
    }
}
