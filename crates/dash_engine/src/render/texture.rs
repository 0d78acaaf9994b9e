//! Frame texture handles and the zero-copy import boundary

use std::collections::HashSet;

use crate::vision::ExternalBuffer;

/// Opaque reference to an imported frame texture.
///
/// Renderers receive only this value; the platform handle behind it stays
/// owned by the importer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct TextureRef(u64);

impl TextureRef {
    /// No frame available
    pub const NONE: TextureRef = TextureRef(0);

    /// Wrap a raw non-zero id
    pub const fn from_raw(id: u64) -> Self {
        Self(id)
    }

    /// Raw id
    pub const fn raw(self) -> u64 {
        self.0
    }

    /// Whether this is the "no frame" sentinel
    pub const fn is_none(self) -> bool {
        self.0 == 0
    }
}

/// A buffer could not be imported
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ImportError {
    /// Buffer description is unusable
    #[error("invalid buffer: {0}")]
    InvalidBuffer(String),
    /// The graphics API refused the import
    #[error("GPU import failed: {0}")]
    Gpu(String),
}

/// Turns external camera buffers into GPU-sampleable images without copying pixels
pub trait ImageImporter {
    /// Import `buffer`, returning a new handle
    fn import(&mut self, buffer: &ExternalBuffer) -> Result<TextureRef, ImportError>;

    /// Destroy a handle from [`ImageImporter::import`]. Unknown or `NONE` handles are ignored.
    fn release(&mut self, texture: TextureRef);

    /// Handles currently alive
    fn live_handles(&self) -> usize;
}

/// Importer that validates buffers and hands out ids without touching a GPU
#[derive(Debug, Default)]
pub struct HeadlessImporter {
    next_id: u64,
    live: HashSet<TextureRef>,
}

impl HeadlessImporter {
    /// Create an importer with no live handles
    pub fn new() -> Self {
        Self::default()
    }
}

impl ImageImporter for HeadlessImporter {
    fn import(&mut self, buffer: &ExternalBuffer) -> Result<TextureRef, ImportError> {
        buffer.validate()?;
        self.next_id += 1;
        let texture = TextureRef::from_raw(self.next_id);
        self.live.insert(texture);
        Ok(texture)
    }

    fn release(&mut self, texture: TextureRef) {
        self.live.remove(&texture);
    }

    fn live_handles(&self) -> usize {
        self.live.len()
    }
}
