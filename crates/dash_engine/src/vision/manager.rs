//! Vision frame manager
//!
//! Owns the camera stream, the image importer and a fixed ring of frame
//! slots. Each slot holds at most one imported handle. A handle is replaced
//! in place when the camera hands a different buffer to its slot and released
//! on disconnect, so the number of live handles never exceeds the ring size.

use crate::core::MAX_FRAME_SLOTS;
use crate::foundation::collections::BoundedVec;
use crate::render::{ImageImporter, TextureRef};

use super::{CameraStream, ExternalBuffer, StreamDescriptor, Viewport, VisionError};

/// One ring entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameSlot {
    buffer_id: Option<u64>,
    texture: TextureRef,
    valid: bool,
}

impl FrameSlot {
    /// Buffer the slot was last asked to show
    pub fn buffer_id(&self) -> Option<u64> {
        self.buffer_id
    }

    /// Imported handle, `NONE` if nothing was ever bound
    pub fn texture(&self) -> TextureRef {
        self.texture
    }

    /// Whether the handle matches `buffer_id`. A failed rebind leaves the
    /// slot invalid while it keeps its previous handle.
    pub fn is_valid(&self) -> bool {
        self.valid
    }
}

/// Result of a non-blocking frame poll
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FramePoll {
    /// A new frame is bound and current
    NewFrame {
        /// Slot holding the frame
        slot: usize,
        /// Texture to present
        texture: TextureRef,
        /// Camera frame counter
        frame_id: u64,
    },
    /// Nothing new; keep presenting the current texture
    NoFrame,
}

/// Ring of frame slots bound to a camera stream
pub struct VisionFrameManager {
    stream: Box<dyn CameraStream>,
    importer: Box<dyn ImageImporter>,
    capacity: usize,
    slots: BoundedVec<FrameSlot, MAX_FRAME_SLOTS>,
    current: Option<usize>,
    connected: Option<Viewport>,
    bind_failures: u64,
}

impl VisionFrameManager {
    /// Create a disconnected manager with a ring of `capacity` slots (clamped to `1..=MAX_FRAME_SLOTS`)
    pub fn new(stream: Box<dyn CameraStream>, importer: Box<dyn ImageImporter>, capacity: usize) -> Self {
        Self {
            stream,
            importer,
            capacity: capacity.clamp(1, MAX_FRAME_SLOTS),
            slots: BoundedVec::new(),
            current: None,
            connected: None,
            bind_failures: 0,
        }
    }

    /// Open the stream and import every advertised buffer into its slot.
    ///
    /// Per-buffer import failures leave that slot invalid and do not fail the
    /// connect. An existing connection is closed first.
    pub fn connect(&mut self, descriptor: &StreamDescriptor) -> Result<(), VisionError> {
        self.disconnect();

        let info = self.stream.connect(descriptor)?;
        if info.buffers.len() > self.capacity {
            self.stream.disconnect();
            return Err(VisionError::InvalidSlot { slot: info.buffers.len() - 1, capacity: self.capacity });
        }

        for _ in 0..self.capacity {
            // capacity <= MAX_FRAME_SLOTS, never full
            let _ = self.slots.push(FrameSlot::default());
        }
        self.connected = Some(descriptor.viewport);

        let mut bound = 0;
        for (index, buffer) in info.buffers.iter().enumerate() {
            match self.bind(index, buffer) {
                Ok(_) => bound += 1,
                Err(err) => log::warn!("{}", err),
            }
        }

        log::info!(
            "Connected {} stream {}x{}, {} of {} slots bound",
            descriptor.name,
            info.width,
            info.height,
            bound,
            self.capacity
        );
        Ok(())
    }

    /// Take the next frame from the stream, if any, and make it current.
    ///
    /// On a bind failure the slot is marked invalid, the current frame stays
    /// unchanged and the error is returned. `StreamLost` is passed through so
    /// the caller can disconnect.
    pub fn poll_next_frame(&mut self) -> Result<FramePoll, VisionError> {
        if self.connected.is_none() {
            return Ok(FramePoll::NoFrame);
        }
        let Some(frame) = self.stream.poll_next_frame()? else {
            return Ok(FramePoll::NoFrame);
        };

        let slot = *self
            .slots
            .get(frame.index)
            .ok_or(VisionError::InvalidSlot { slot: frame.index, capacity: self.capacity })?;

        let texture = if slot.valid && slot.buffer_id == Some(frame.buffer.id) {
            slot.texture
        } else {
            self.bind(frame.index, &frame.buffer)?
        };

        self.current = Some(frame.index);
        Ok(FramePoll::NewFrame { slot: frame.index, texture, frame_id: frame.frame_id })
    }

    /// Release every handle and close the stream. Safe to call repeatedly.
    pub fn disconnect(&mut self) {
        while let Some(slot) = self.slots.pop() {
            if !slot.texture.is_none() {
                self.importer.release(slot.texture);
            }
        }
        self.current = None;

        let leaked = self.importer.live_handles();
        if leaked > 0 {
            log::warn!("Importer still holds {} handles after releasing every slot", leaked);
        }

        if let Some(viewport) = self.connected.take() {
            self.stream.disconnect();
            log::info!("Disconnected {:?} vision stream", viewport);
        }
    }

    /// Texture of the current frame, [`TextureRef::NONE`] before the first frame
    pub fn current_texture(&self) -> TextureRef {
        self.current
            .and_then(|index| self.slots.get(index))
            .map_or(TextureRef::NONE, |slot| slot.texture)
    }

    /// Whether a stream is open
    pub fn is_connected(&self) -> bool {
        self.connected.is_some()
    }

    /// Viewport of the open stream
    pub fn connected_viewport(&self) -> Option<Viewport> {
        self.connected
    }

    /// The slot ring, empty while disconnected
    pub fn slots(&self) -> &[FrameSlot] {
        &self.slots
    }

    /// Handles the importer is keeping alive for this ring
    pub fn live_handles(&self) -> usize {
        self.importer.live_handles()
    }

    /// Number of failed binds since creation
    pub fn bind_failures(&self) -> u64 {
        self.bind_failures
    }

    /// Import `buffer` into slot `index`, replacing the old handle on success.
    ///
    /// The new handle is created before the old one is released, so a failed
    /// import keeps the previous handle alive for display.
    fn bind(&mut self, index: usize, buffer: &ExternalBuffer) -> Result<TextureRef, VisionError> {
        let capacity = self.capacity;
        let slot = self.slots.get_mut(index).ok_or(VisionError::InvalidSlot { slot: index, capacity })?;
        slot.buffer_id = Some(buffer.id);

        match self.importer.import(buffer) {
            Ok(texture) => {
                let old = std::mem::replace(&mut slot.texture, texture);
                slot.valid = true;
                if !old.is_none() {
                    self.importer.release(old);
                }
                Ok(texture)
            }
            Err(reason) => {
                slot.valid = false;
                self.bind_failures += 1;
                Err(VisionError::BindFailure { slot: index, buffer_id: buffer.id, reason })
            }
        }
    }
}

impl Drop for VisionFrameManager {
    fn drop(&mut self) {
        self.disconnect();
    }
}
