// SPDX-License-Identifier: Apache-2.0

//! Hardware-backed implementations of the device seams, built on the
//! runtime-loaded vendor libraries in `campipe-sys`. Everything here is
//! only reachable on a target with the SoC libraries installed; the rest
//! of the crate is exercised against mocks.

pub mod allocator;
pub mod backend;
pub mod drm;
pub mod scaler;
pub mod v4l2;

pub use allocator::GemAllocator;
pub use backend::HwBackend;
pub use drm::{DrmCompositor, DrmDevice};
pub use scaler::HwScaler;
pub use v4l2::V4l2Capture;
