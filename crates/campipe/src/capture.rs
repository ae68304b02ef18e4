// SPDX-License-Identifier: Apache-2.0

//! Capture stream lifecycle and buffer-slot bookkeeping.
//!
//! [`CaptureStream`] wraps a [`CaptureDevice`] with a small state machine
//! (configure, reserve, submit, start, retrieve, stop) and a per-slot
//! ownership ledger. The ledger catches double-submits and retrieval of
//! slots the hardware does not hold, which on the raw device interface
//! would silently corrupt frames instead of failing.

use crate::format::PixelFormat;
use crate::geometry::MAX_PLANES;
use crate::memory::HardwareBuffer;
use crate::Error;

/// Highest number of buffer slots a stream may reserve.
pub const MAX_BUFFER_COUNT: usize = 4;

/// Which sensor output feeds the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathKind {
    /// Cropping output, full sensor rate
    Clipper,
    /// Downscaling output, cannot upscale
    Decimator,
}

/// Axis-aligned crop rectangle in sensor coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Raw capture device seam.
///
/// Implementations talk to the video subsystem; the stream wrapper above
/// them owns ordering and slot-state rules. `submit` hands one buffer slot
/// to the hardware, `retrieve` blocks until a filled slot comes back and
/// returns its index.
pub trait CaptureDevice {
    /// Negotiate the capture format, handing the driver the per-plane
    /// strides and sizes of the buffers it will be fed.
    fn set_format(
        &mut self,
        width: u32,
        height: u32,
        format: PixelFormat,
        strides: &[u32; MAX_PLANES],
        sizes: &[u32; MAX_PLANES],
    ) -> Result<(), Error>;
    fn set_crop(&mut self, rect: Rect) -> Result<(), Error>;
    /// Negotiate a downscaled output size on paths that support it.
    fn set_selection(&mut self, width: u32, height: u32) -> Result<(), Error>;
    fn reserve_slots(&mut self, count: usize) -> Result<(), Error>;
    fn submit(
        &mut self,
        slot: usize,
        descriptors: usize,
        fds: &[i32; MAX_PLANES],
        sizes: &[u32; MAX_PLANES],
    ) -> Result<(), Error>;
    fn retrieve(&mut self) -> Result<usize, Error>;
    fn start(&mut self) -> Result<(), Error>;
    fn stop(&mut self) -> Result<(), Error>;
    fn interlaced(&self) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SlotOwner {
    Application,
    Hardware,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StreamState {
    Opened,
    Configured,
    BuffersReserved,
    Streaming,
    Stopped,
}

/// A configured capture stream with owned buffer slots.
pub struct CaptureStream {
    device: Box<dyn CaptureDevice>,
    state: StreamState,
    slots: Vec<SlotOwner>,
}

impl CaptureStream {
    pub fn new(device: Box<dyn CaptureDevice>) -> Self {
        Self {
            device,
            state: StreamState::Opened,
            slots: Vec::new(),
        }
    }

    pub fn interlaced(&self) -> bool {
        self.device.interlaced()
    }

    /// Set the capture format, an optional crop rectangle and an optional
    /// downscale selection. `ring` is one buffer of the pool the stream
    /// will be fed from; the driver is negotiated at its strides and
    /// sizes, so the pool must be allocated first.
    pub fn configure(
        &mut self,
        width: u32,
        height: u32,
        format: PixelFormat,
        ring: &HardwareBuffer,
        crop: Option<Rect>,
        selection: Option<(u32, u32)>,
    ) -> Result<(), Error> {
        if self.state != StreamState::Opened {
            return Err(Error::Busy("stream already configured"));
        }
        self.device
            .set_format(width, height, format, &ring.strides(), &ring.sizes())?;
        if let Some(rect) = crop {
            self.device.set_crop(rect)?;
        }
        if let Some((sel_width, sel_height)) = selection {
            self.device.set_selection(sel_width, sel_height)?;
        }
        self.state = StreamState::Configured;
        Ok(())
    }

    /// Reserve `count` buffer slots with the device.
    ///
    /// A count of zero releases all reservations and is legal in any state
    /// except while streaming, so teardown can call it unconditionally.
    pub fn reserve(&mut self, count: usize) -> Result<(), Error> {
        if self.state == StreamState::Streaming {
            return Err(Error::Busy("cannot change reservations while streaming"));
        }
        if count == 0 {
            self.device.reserve_slots(0)?;
            self.slots.clear();
            if self.state != StreamState::Opened {
                self.state = StreamState::Configured;
            }
            return Ok(());
        }
        if self.state != StreamState::Configured {
            return Err(Error::Busy("stream not ready for slot reservation"));
        }
        if count > MAX_BUFFER_COUNT {
            return Err(Error::InvalidFormat(format!(
                "buffer count {} out of range 1..={}",
                count, MAX_BUFFER_COUNT
            )));
        }
        self.device.reserve_slots(count)?;
        self.slots = vec![SlotOwner::Application; count];
        self.state = StreamState::BuffersReserved;
        Ok(())
    }

    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// Hand one slot's buffer to the hardware for filling.
    pub fn submit(&mut self, slot: usize, buffer: &HardwareBuffer) -> Result<(), Error> {
        if self.state != StreamState::BuffersReserved && self.state != StreamState::Streaming {
            return Err(Error::Busy("stream has no reserved slots"));
        }
        match self.slots.get(slot) {
            Some(SlotOwner::Application) => {}
            Some(SlotOwner::Hardware) => {
                return Err(Error::Busy("slot is already queued to the hardware"))
            }
            None => {
                return Err(Error::InvalidFormat(format!(
                    "slot {} out of range 0..{}",
                    slot,
                    self.slots.len()
                )))
            }
        }
        let (descriptors, sizes) = buffer.queue_shape();
        let fds = buffer.dma_fds();
        self.device.submit(slot, descriptors, &fds, &sizes)?;
        self.slots[slot] = SlotOwner::Hardware;
        Ok(())
    }

    /// Start streaming. Every reserved slot must be queued first.
    pub fn start(&mut self) -> Result<(), Error> {
        if self.state != StreamState::BuffersReserved {
            return Err(Error::Busy("stream not ready to start"));
        }
        if self.slots.iter().any(|s| *s == SlotOwner::Application) {
            return Err(Error::Busy("not all slots are queued"));
        }
        self.device.start()?;
        self.state = StreamState::Streaming;
        Ok(())
    }

    /// Block until the hardware returns a filled slot.
    pub fn retrieve(&mut self) -> Result<usize, Error> {
        if self.state != StreamState::Streaming {
            return Err(Error::Busy("stream is not running"));
        }
        let slot = self.device.retrieve()?;
        match self.slots.get(slot) {
            Some(SlotOwner::Hardware) => {
                self.slots[slot] = SlotOwner::Application;
                Ok(slot)
            }
            _ => Err(Error::InvalidFormat(format!(
                "device returned slot {} it does not hold",
                slot
            ))),
        }
    }

    /// Stop streaming. Slots the hardware still holds revert to the
    /// application without their contents being defined.
    pub fn stop(&mut self) -> Result<(), Error> {
        if self.state != StreamState::Streaming {
            return Err(Error::Busy("stream is not running"));
        }
        self.device.stop()?;
        for slot in &mut self.slots {
            *slot = SlotOwner::Application;
        }
        self.state = StreamState::Stopped;
        Ok(())
    }
}

impl std::fmt::Debug for CaptureStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureStream")
            .field("state", &self.state)
            .field("slots", &self.slots)
            .finish()
    }
}
