// SPDX-License-Identifier: Apache-2.0

//! GEM-backed DMA memory allocator.

use std::ffi::{c_int, c_void};
use std::os::fd::{FromRawFd, OwnedFd};
use std::ptr::{self, NonNull};
use std::sync::Arc;

use campipe_sys::AllocatorLibrary;

use crate::hw::drm::DrmDevice;
use crate::memory::{Allocator, Region};
use crate::Error;

/// Allocates hardware memory regions through the display device's GEM
/// interface, exporting each as a DMA descriptor and mapping it for the
/// CPU. A region that fails partway through setup is freed before the
/// error is returned.
pub struct GemAllocator {
    lib: &'static AllocatorLibrary,
    device: Arc<DrmDevice>,
}

impl GemAllocator {
    pub fn new(device: Arc<DrmDevice>) -> Result<Self, Error> {
        Ok(Self {
            lib: campipe_sys::allocator()?,
            device,
        })
    }
}

impl Allocator for GemAllocator {
    fn alloc(&self, size: u32) -> Result<Region, Error> {
        let fd = self.device.fd();
        let handle = unsafe { (self.lib.alloc_gem)(fd, size as c_int, 0) };
        if handle < 0 {
            return Err(Error::AllocationFailure);
        }

        let dma_fd = unsafe { (self.lib.gem_to_dmafd)(fd, handle) };
        if dma_fd < 0 {
            unsafe { (self.lib.free_gem)(fd, handle) };
            return Err(Error::AllocationFailure);
        }

        let mut vaddr: *mut c_void = ptr::null_mut();
        let ret = unsafe { (self.lib.get_vaddr)(fd, handle, size as c_int, &mut vaddr) };
        if ret != 0 {
            drop(unsafe { OwnedFd::from_raw_fd(dma_fd) });
            unsafe { (self.lib.free_gem)(fd, handle) };
            return Err(Error::AllocationFailure);
        }

        Ok(Region {
            handle: handle as u32,
            dma_fd,
            vaddr: NonNull::new(vaddr as *mut u8),
            size,
        })
    }

    fn release(&self, region: &Region) {
        // The exported descriptor keeps the buffer alive independently of
        // the gem handle; close it first.
        drop(unsafe { OwnedFd::from_raw_fd(region.dma_fd) });
        let ret = unsafe { (self.lib.free_gem)(self.device.fd(), region.handle as c_int) };
        if ret != 0 {
            log::warn!("freeing gem handle {} failed: {}", region.handle, ret);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    // Requires the GEM allocator library; run on target hardware.
    #[test]
    #[ignore]
    #[serial]
    fn allocates_and_frees_one_region() {
        let device = Arc::new(DrmDevice::open().unwrap());
        let allocator = GemAllocator::new(device).unwrap();
        let region = allocator.alloc(4096).unwrap();
        assert!(region.dma_fd >= 0);
        allocator.release(&region);
    }
}
