// SPDX-License-Identifier: Apache-2.0

//! Display stage: overlay plane selection and framebuffer management.
//!
//! The compositor exposes a set of hardware planes. Video frames go onto
//! an overlay-type plane without the alpha blending property, which on
//! this display controller marks the YUV-capable planes as opposed to the
//! RGB ones. [`select_overlay_plane`] picks the n-th such plane and
//! raises its video priority so it composites above co-located RGB
//! content.
//!
//! Framebuffer registrations are guarded: a [`Framebuffer`] removes its
//! registration on drop, which must happen before the buffer backing it
//! is freed.

use std::os::fd::RawFd;
use std::sync::Arc;

use crate::capture::Rect;
use crate::format::{FourCC, PixelFormat};
use crate::geometry::MAX_PLANES;
use crate::memory::HardwareBuffer;
use crate::Error;

/// Plane type property values as reported by the compositor.
pub const PLANE_TYPE_OVERLAY: u64 = campipe_sys::DRM_PLANE_TYPE_OVERLAY as u64;

/// Property present only on the RGB planes; its absence marks a plane as
/// a video plane.
pub const ALPHABLEND_PROP: &str = "alphablend";

/// Property controlling how a video plane stacks against RGB planes.
pub const VIDEO_PRIORITY_PROP: &str = "video-priority";

/// One hardware plane and the pixel formats it accepts.
#[derive(Debug, Clone)]
pub struct PlaneInfo {
    pub id: u32,
    pub formats: Vec<FourCC>,
}

/// Everything the compositor needs to import one buffer for scanout.
#[derive(Debug, Clone, Copy)]
pub struct FramebufferDesc {
    pub fourcc: FourCC,
    pub width: u32,
    pub height: u32,
    pub interlaced: bool,
    pub plane_count: usize,
    pub fds: [RawFd; MAX_PLANES],
    pub pitches: [u32; MAX_PLANES],
    pub offsets: [u32; MAX_PLANES],
}

/// Display compositor seam.
pub trait Compositor {
    fn planes(&self) -> Result<Vec<PlaneInfo>, Error>;
    /// Read a named plane property; `None` when the plane lacks it.
    fn plane_property(&self, plane: u32, name: &str) -> Result<Option<u64>, Error>;
    fn set_plane_property(&self, plane: u32, name: &str, value: u64) -> Result<(), Error>;
    fn add_framebuffer(&self, desc: &FramebufferDesc) -> Result<u32, Error>;
    fn remove_framebuffer(&self, fb: u32);
    fn update_plane(&self, plane: u32, fb: u32, dst: Rect, src: Rect) -> Result<(), Error>;
}

/// Pick the `port`-th overlay-type video plane that accepts `format`.
///
/// Raises the selected plane's video priority as a side effect so the
/// frame is not hidden behind an RGB plane at the same position.
pub fn select_overlay_plane(
    compositor: &dyn Compositor,
    format: PixelFormat,
    port: usize,
) -> Result<u32, Error> {
    let fourcc = format
        .drm_fourcc()
        .ok_or(Error::UnsupportedFormat(format.fourcc()))?;

    let mut video_index = 0;
    for plane in compositor.planes()? {
        let plane_type = compositor.plane_property(plane.id, "type")?;
        if plane_type != Some(PLANE_TYPE_OVERLAY) {
            continue;
        }
        if compositor
            .plane_property(plane.id, ALPHABLEND_PROP)?
            .is_some()
        {
            // RGB overlay, not a video plane.
            continue;
        }
        if video_index != port {
            video_index += 1;
            continue;
        }
        if !plane.formats.contains(&fourcc) {
            log::warn!("video plane {} does not accept {}", plane.id, fourcc);
            return Err(Error::NoMatchingPlane);
        }
        if let Err(err) = compositor.set_plane_property(plane.id, VIDEO_PRIORITY_PROP, 1) {
            log::warn!("raising priority of plane {} failed: {}", plane.id, err);
        }
        log::debug!("selected video plane {} for {}", plane.id, fourcc);
        return Ok(plane.id);
    }
    Err(Error::NoMatchingPlane)
}

/// A registered framebuffer, removed from the compositor on drop.
pub struct Framebuffer {
    compositor: Arc<dyn Compositor>,
    id: u32,
}

impl Framebuffer {
    pub fn id(&self) -> u32 {
        self.id
    }
}

impl Drop for Framebuffer {
    fn drop(&mut self) {
        self.compositor.remove_framebuffer(self.id);
    }
}

impl std::fmt::Debug for Framebuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Framebuffer").field("id", &self.id).finish()
    }
}

/// Register `buffer` with the compositor for scanout.
pub fn register_framebuffer(
    compositor: &Arc<dyn Compositor>,
    buffer: &HardwareBuffer,
    interlaced: bool,
) -> Result<Framebuffer, Error> {
    let fourcc = buffer
        .format()
        .drm_fourcc()
        .ok_or(Error::UnsupportedFormat(buffer.format().fourcc()))?;

    let mut pitches = [0; MAX_PLANES];
    let mut offsets = [0; MAX_PLANES];
    for (i, plane) in buffer.planes().iter().enumerate() {
        pitches[i] = plane.stride;
        offsets[i] = plane.offset;
    }

    let desc = FramebufferDesc {
        fourcc,
        width: buffer.width(),
        height: buffer.height(),
        interlaced,
        plane_count: buffer.plane_count(),
        fds: buffer.dma_fds(),
        pitches,
        offsets,
    };
    let id = compositor.add_framebuffer(&desc)?;
    Ok(Framebuffer {
        compositor: Arc::clone(compositor),
        id,
    })
}
