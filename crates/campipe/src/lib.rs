// SPDX-License-Identifier: Apache-2.0

//! Capture-to-display pipeline exerciser for embedded SoCs.
//!
//! campipe drives a video capture device through a fixed ring of multi-plane
//! DMA buffers, optionally rescales each frame with the hardware scaler,
//! optionally composites it onto a display overlay plane, and optionally
//! persists one frame to storage - while measuring throughput.
//!
//! The hard part, and the focus of this crate, is the buffer lifecycle:
//! several independently-owned buffer pools (capture source, scaled
//! destination, display framebuffers) are reconciled against the capture
//! device's fixed-size slot ring under strict format, stride and alignment
//! rules, without ever stalling the device queue or leaking a hardware
//! handle.
//!
//! # Quick Start
//!
//! ```no_run
//! use campipe::hw::HwBackend;
//! use campipe::format::PixelFormat;
//! use campipe::pipeline::{PathKind, PipelineConfig, run_paths};
//!
//! let config = PipelineConfig::new(PathKind::Clipper, 1920, 1080, PixelFormat::Yuv420)
//!     .with_count(30)
//!     .with_fps(true);
//! for result in run_paths(std::sync::Arc::new(HwBackend), vec![config]) {
//!     if let Some(report) = result? {
//!         println!("{}: {:.2} fps", report.path, report.fps);
//!     }
//! }
//! # Ok::<(), campipe::Error>(())
//! ```
//!
//! Hardware collaborators (capture device, DMA allocator, scaler, display
//! compositor) sit behind traits; [`hw`] provides the implementations backed
//! by the vendor libraries, and the test suite substitutes mocks.

use std::{error, fmt, io};

use crate::format::FourCC;

/// Error type for campipe operations.
///
/// Allocation and configuration errors abort the affected capture path;
/// per-frame display errors are logged by the pipeline driver and never
/// propagate (see [`pipeline`]).
#[derive(Debug)]
#[non_exhaustive]
pub enum Error {
    /// Pixel format outside the geometry/display/scale format tables
    UnsupportedFormat(FourCC),

    /// Capture, scaler or display device node absent or busy
    NoDevice(String),

    /// Device rejected the negotiated geometry or format
    InvalidFormat(String),

    /// Operation invalid in the current device or slot state
    Busy(&'static str),

    /// Hardware memory exhaustion while building a buffer pool
    AllocationFailure,

    /// No display plane matches the overlay/video/port criteria
    NoMatchingPlane,

    /// Source or destination format has no hardware scaler mapping
    UnsupportedConversion(FourCC),

    /// I/O error from an underlying device call (errno-based)
    Io(io::Error),

    /// A vendor library could not be loaded at runtime
    LibraryNotLoaded(campipe_sys::libloading::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::UnsupportedFormat(fourcc) => {
                write!(f, "unsupported pixel format: {}", fourcc)
            }
            Error::NoDevice(what) => write!(f, "no device: {}", what),
            Error::InvalidFormat(what) => write!(f, "device rejected format: {}", what),
            Error::Busy(what) => write!(f, "invalid in current state: {}", what),
            Error::AllocationFailure => write!(f, "hardware memory allocation failed"),
            Error::NoMatchingPlane => write!(f, "no matching video overlay plane"),
            Error::UnsupportedConversion(fourcc) => {
                write!(f, "format {} has no scaler mapping", fourcc)
            }
            Error::Io(err) => write!(f, "I/O error: {}", err),
            Error::LibraryNotLoaded(err) => {
                write!(f, "vendor library could not be loaded: {}", err)
            }
        }
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Error::Io(err) => Some(err),
            Error::LibraryNotLoaded(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<campipe_sys::libloading::Error> for Error {
    fn from(err: campipe_sys::libloading::Error) -> Self {
        Error::LibraryNotLoaded(err)
    }
}

/// Map a negative errno-convention return value to an [`Error::Io`].
pub(crate) fn errno_result(ret: std::ffi::c_int) -> Result<std::ffi::c_int, Error> {
    if ret < 0 {
        Err(Error::Io(io::Error::from_raw_os_error(-ret)))
    } else {
        Ok(ret)
    }
}

/// The format module provides pixel format identities and the fixed
/// format-keyed property tables (plane count, layout class, subsampling).
pub mod format;

/// The geometry module computes per-plane stride and size layouts.
pub mod geometry;

/// The memory module manages multi-plane DMA buffer pools.
pub mod memory;

/// The capture module wraps a capture device's slot ring and state machine.
pub mod capture;

/// The scaler module builds and runs synchronous scale operations.
pub mod scaler;

/// The display module selects overlay planes and registers framebuffers.
pub mod display;

/// The dump module writes raw frames to storage, stride padding excluded.
pub mod dump;

/// The pipeline module orchestrates the per-path capture loop.
pub mod pipeline;

/// Hardware-backed implementations of the device trait seams.
pub mod hw;

#[cfg(test)]
pub(crate) mod testutil;
