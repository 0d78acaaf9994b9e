//! # Vision
//!
//! Camera stream boundary and the frame slot ring that binds camera buffers
//! to GPU textures without copying pixels.

pub mod manager;

pub use manager::{FramePoll, FrameSlot, VisionFrameManager};

use crate::render::ImportError;

/// Which camera a viewport shows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Viewport {
    /// Road-facing camera
    #[default]
    Rear,
    /// Driver-facing camera
    Front,
}

impl Viewport {
    /// Both viewports
    pub const ALL: [Viewport; 2] = [Viewport::Rear, Viewport::Front];

    /// Dense index
    pub const fn index(self) -> usize {
        match self {
            Viewport::Rear => 0,
            Viewport::Front => 1,
        }
    }
}

/// Which stream to open on the camera subsystem
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamDescriptor {
    /// Viewport the stream feeds
    pub viewport: Viewport,
    /// Stream name understood by the camera subsystem
    pub name: &'static str,
}

impl StreamDescriptor {
    /// Descriptor of the RGB stream feeding `viewport`
    pub const fn for_viewport(viewport: Viewport) -> Self {
        let name = match viewport {
            Viewport::Rear => "rgb_back",
            Viewport::Front => "rgb_front",
        };
        Self { viewport, name }
    }
}

/// An externally owned frame buffer, shared by file descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExternalBuffer {
    /// Identity of the underlying memory; changes when the camera reallocates
    pub id: u64,
    /// DMA-BUF file descriptor, still owned by the camera subsystem
    pub fd: i32,
    /// Size of the buffer in bytes
    pub size: u64,
    /// Offset of the first pixel
    pub offset: u64,
    /// Row pitch in bytes
    pub stride: u32,
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
}

impl ExternalBuffer {
    /// Check that the description can back an image
    pub fn validate(&self) -> Result<(), ImportError> {
        if self.fd < 0 {
            return Err(ImportError::InvalidBuffer(format!("buffer {} has no file descriptor", self.id)));
        }
        if self.width == 0 || self.height == 0 || self.stride < self.width {
            return Err(ImportError::InvalidBuffer(format!(
                "buffer {} has bad geometry {}x{} stride {}",
                self.id, self.width, self.height, self.stride
            )));
        }
        let needed = u64::from(self.stride)
            .checked_mul(u64::from(self.height))
            .and_then(|frame| frame.checked_add(self.offset))
            .ok_or_else(|| {
                ImportError::InvalidBuffer(format!("buffer {} offset {} is out of range", self.id, self.offset))
            })?;
        if self.size < needed {
            return Err(ImportError::InvalidBuffer(format!(
                "buffer {} holds {} bytes, frame needs {}",
                self.id, self.size, needed
            )));
        }
        Ok(())
    }
}

/// What the camera subsystem reports on connect
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamInfo {
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
    /// Row pitch in bytes
    pub stride: u32,
    /// Buffers the stream cycles through, indexed by slot
    pub buffers: Vec<ExternalBuffer>,
}

/// A filled buffer handed over by the camera subsystem
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameBuffer {
    /// Ring slot the buffer belongs to
    pub index: usize,
    /// The buffer holding the frame
    pub buffer: ExternalBuffer,
    /// Camera frame counter
    pub frame_id: u64,
}

/// Camera subsystem boundary
pub trait CameraStream {
    /// Open a stream. Fails with [`VisionError::Unavailable`] when the camera is not publishing.
    fn connect(&mut self, descriptor: &StreamDescriptor) -> Result<StreamInfo, VisionError>;

    /// Take the next filled buffer without blocking
    fn poll_next_frame(&mut self) -> Result<Option<FrameBuffer>, VisionError>;

    /// Close the stream. Calling it while closed does nothing.
    fn disconnect(&mut self);
}

/// Vision errors
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum VisionError {
    /// The camera subsystem is not connected or not publishing
    #[error("vision unavailable: {0}")]
    Unavailable(String),
    /// A buffer could not be imported into its slot
    #[error("failed to bind buffer {buffer_id} into slot {slot}: {reason}")]
    BindFailure {
        /// Ring slot
        slot: usize,
        /// Buffer identity
        buffer_id: u64,
        /// Importer error
        reason: ImportError,
    },
    /// The stream went away after connecting
    #[error("vision stream lost: {0}")]
    StreamLost(String),
    /// The camera used a slot outside the ring
    #[error("slot {slot} outside ring of {capacity}")]
    InvalidSlot {
        /// Slot reported by the camera
        slot: usize,
        /// Ring size
        capacity: usize,
    },
}
