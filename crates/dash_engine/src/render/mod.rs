//! # Render
//!
//! Everything the dashboard hands to a renderer: frame textures imported
//! without copies, per-viewport overlay geometry and the frame snapshot.
//! Drawing itself happens outside this crate, behind [`SceneRenderer`].

pub mod frame;
pub mod geometry;
pub mod projection;
pub mod texture;
pub mod vertex;

#[cfg(all(feature = "vulkan", target_os = "linux"))]
pub mod vulkan;

pub use frame::{RenderFrame, SceneRenderer};
pub use geometry::{
    GeometryBuffers, Markers, Polygon, ViewportGeometry, MAX_MARKERS_PER_SIDE, MAX_POLYGON_VERTICES,
    MAX_TRACK_MARKERS,
};
pub use projection::FrameTransform;
pub use texture::{HeadlessImporter, ImageImporter, ImportError, TextureRef};
pub use vertex::{FrameVertex, OverlayVertex};
