//! Renderer boundary
//!
//! The dashboard produces one [`RenderFrame`] between ticks; an external
//! renderer paints it. Everything in it is borrowed read-only.

use crate::scene::Scene;
use crate::status::UiStatus;
use crate::vision::Viewport;

use super::geometry::ViewportGeometry;
use super::texture::TextureRef;

/// Everything needed to paint one frame
#[derive(Debug, Clone, Copy)]
pub struct RenderFrame<'a> {
    /// Logical tick the frame belongs to
    pub frame: u64,
    /// Viewport to show
    pub viewport: Viewport,
    /// Scene snapshot
    pub scene: &'a Scene,
    /// Display status
    pub status: UiStatus,
    /// Whether alert text is shown this tick
    pub alert_visible: bool,
    /// Camera frame texture, `TextureRef::NONE` when there is no frame
    pub texture: TextureRef,
    /// Overlay geometry of the viewport
    pub geometry: &'a ViewportGeometry,
    /// Display backlight level, zero when asleep
    pub brightness: u8,
}

/// Paints frames produced by the dashboard
pub trait SceneRenderer {
    /// Paint `frame`. Must not hold on to any borrowed data.
    fn render(&mut self, frame: &RenderFrame<'_>) -> Result<(), Box<dyn std::error::Error>>;
}
