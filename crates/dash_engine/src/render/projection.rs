//! Per-viewport mapping from full-frame camera pixels to display pixels

use crate::foundation::math::{CameraIntrinsics, Rect, Vec2};
use crate::vision::Viewport;

use super::vertex::FrameVertex;

/// Maps camera frame pixels into the visualization rectangle.
///
/// The frame is scaled to the rectangle width times `zoom`, centered on the
/// principal point. The driver camera view is mirrored horizontally.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameTransform {
    principal: Vec2,
    center: Vec2,
    scale: f32,
    mirrored: bool,
    frame_size: Vec2,
}

impl FrameTransform {
    /// Build the transform of `viewport` into `viz`
    pub fn for_viewport(viewport: Viewport, intrinsics: &CameraIntrinsics, viz: Rect, zoom: f32) -> Self {
        let frame_width = intrinsics.frame_width.max(1.0);
        Self {
            principal: intrinsics.principal_point(),
            center: Vec2::new(viz.x as f32 + viz.w as f32 / 2.0, viz.y as f32 + viz.h as f32 / 2.0),
            scale: zoom * viz.w as f32 / frame_width,
            mirrored: viewport == Viewport::Front,
            frame_size: Vec2::new(intrinsics.frame_width, intrinsics.frame_height),
        }
    }

    /// Map a frame pixel to display pixels
    pub fn apply(&self, p: Vec2) -> Vec2 {
        let mut d = (p - self.principal) * self.scale;
        if self.mirrored {
            d.x = -d.x;
        }
        self.center + d
    }

    /// Pixels per frame pixel
    pub fn scale(&self) -> f32 {
        self.scale
    }

    /// The textured quad covering the whole frame, clockwise from top-left
    pub fn frame_quad(&self) -> [FrameVertex; 4] {
        let (w, h) = (self.frame_size.x, self.frame_size.y);
        let corners = [(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 1.0)];
        corners.map(|(u, v)| {
            let p = self.apply(Vec2::new(u * w, v * h));
            FrameVertex { position: [p.x, p.y], uv: [u, v] }
        })
    }
}
