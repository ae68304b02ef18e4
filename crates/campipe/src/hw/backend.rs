// SPDX-License-Identifier: Apache-2.0

//! Opens the vendor device set for one capture path.

use std::sync::Arc;

use crate::display::Compositor;
use crate::hw::{DrmCompositor, DrmDevice, GemAllocator, HwScaler, V4l2Capture};
use crate::memory::Allocator;
use crate::pipeline::{Backend, PathDevices, PipelineConfig};
use crate::scaler::Scaler;
use crate::Error;

/// Backend over the real SoC libraries. Each path gets its own capture
/// descriptor and display connection; the scaler and compositor are only
/// opened when the path's configuration needs them.
pub struct HwBackend;

impl Backend for HwBackend {
    fn open_path(&self, config: &PipelineConfig) -> Result<PathDevices, Error> {
        let capture = V4l2Capture::open(config.path, config.module)?;
        let device = Arc::new(DrmDevice::open()?);

        let allocator =
            Arc::new(GemAllocator::new(Arc::clone(&device))?) as Arc<dyn Allocator>;
        let scaler = match config.scale {
            Some(_) => Some(Box::new(HwScaler::open()?) as Box<dyn Scaler>),
            None => None,
        };
        let compositor = match config.display {
            Some(_) => {
                Some(Arc::new(DrmCompositor::new(Arc::clone(&device))?) as Arc<dyn Compositor>)
            }
            None => None,
        };

        Ok(PathDevices {
            capture: Box::new(capture),
            allocator,
            scaler,
            compositor,
        })
    }
}
