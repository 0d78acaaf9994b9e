//! Vertex types for overlay and camera frame rendering

use bytemuck::{Pod, Zeroable};

use crate::foundation::math::Vec2;

/// Position-only vertex for filled overlay polygons and markers
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default, Pod, Zeroable)]
pub struct OverlayVertex {
    /// Position in display pixels
    pub position: [f32; 2],
}

impl OverlayVertex {
    /// Vertex at `p`
    pub fn at(p: Vec2) -> Self {
        Self { position: [p.x, p.y] }
    }

    /// Position as a vector
    pub fn point(&self) -> Vec2 {
        Vec2::new(self.position[0], self.position[1])
    }
}

/// Vertex of the textured camera frame quad
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default, Pod, Zeroable)]
pub struct FrameVertex {
    /// Position in display pixels
    pub position: [f32; 2],
    /// Texture coordinates
    pub uv: [f32; 2],
}
