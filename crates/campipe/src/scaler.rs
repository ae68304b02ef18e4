// SPDX-License-Identifier: Apache-2.0

//! Hardware scale stage.
//!
//! The scaler engine works on media-bus sample codes rather than memory
//! formats, and only a few format families map onto one. [`scale`] checks
//! that mapping for both sides before touching the device, so an
//! unsupported conversion fails fast instead of mid-transfer.

use crate::capture::Rect;
use crate::geometry::MAX_PLANES;
use crate::memory::HardwareBuffer;
use crate::Error;

/// One side of a scale operation, flattened to what the engine consumes.
#[derive(Debug, Clone, Copy)]
pub struct ScaleSide {
    pub width: u32,
    pub height: u32,
    pub code: u32,
    pub plane_count: usize,
    pub fds: [i32; MAX_PLANES],
    pub strides: [u32; MAX_PLANES],
}

/// A fully described scale operation: crop from the source, fill the
/// destination.
#[derive(Debug, Clone, Copy)]
pub struct ScaleJob {
    pub crop: Rect,
    pub src: ScaleSide,
    pub dst: ScaleSide,
}

/// Scale engine seam. `run` performs one synchronous transform.
pub trait Scaler {
    fn run(&mut self, job: &ScaleJob) -> Result<(), Error>;
}

fn side(buffer: &HardwareBuffer) -> Result<ScaleSide, Error> {
    let code = buffer
        .format()
        .scaler_code()
        .ok_or(Error::UnsupportedConversion(buffer.format().fourcc()))?;
    Ok(ScaleSide {
        width: buffer.width(),
        height: buffer.height(),
        code,
        plane_count: buffer.plane_count(),
        fds: buffer.dma_fds(),
        strides: buffer.strides(),
    })
}

/// Crop `crop` out of `src` and scale it to fill `dst`.
pub fn scale(
    scaler: &mut dyn Scaler,
    src: &HardwareBuffer,
    dst: &HardwareBuffer,
    crop: Rect,
) -> Result<(), Error> {
    let job = ScaleJob {
        crop,
        src: side(src)?,
        dst: side(dst)?,
    };
    log::trace!(
        "scale {}x{} +{},{} {}x{} -> {}x{}",
        crop.width,
        crop.height,
        crop.x,
        crop.y,
        src.width(),
        src.height(),
        dst.width(),
        dst.height()
    );
    scaler.run(&job)
}
