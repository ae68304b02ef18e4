// SPDX-License-Identifier: Apache-2.0

//! Multi-plane DMA buffer allocation.
//!
//! A [`HardwareBuffer`] owns one or more hardware memory regions and
//! exposes the planes of a video frame as derived, non-owning views into
//! them (offset plus length). Contiguous-layout formats back all planes
//! with a single region; separate-layout formats allocate one region per
//! plane. Regions are released exactly once, in reverse allocation order,
//! when the buffer drops - including on the partial-allocation failure
//! path, which must never leak a handle.

use std::fmt;
use std::os::fd::RawFd;
use std::ptr::NonNull;
use std::sync::Arc;

use crate::format::{PixelFormat, PlaneLayoutClass};
use crate::geometry::{self, PlaneLayout, MAX_PLANES};
use crate::Error;

/// One hardware memory region: an allocator handle, its exported DMA
/// descriptor, and an optional CPU mapping.
#[derive(Debug, Clone, Copy)]
pub struct Region {
    /// Allocator-scoped handle (GEM-style)
    pub handle: u32,
    /// Exported DMA descriptor, shareable with other hardware blocks
    pub dma_fd: RawFd,
    /// CPU mapping, if the allocator provides one
    pub vaddr: Option<NonNull<u8>>,
    /// Region size in bytes
    pub size: u32,
}

/// Hardware memory allocator seam.
///
/// `alloc` performs the whole region setup (allocate, export, map) and is
/// expected to unwind its own partial work on failure; `release` tears one
/// region down. The real implementation wraps the GEM allocator library,
/// the test suite substitutes a counting mock.
pub trait Allocator {
    fn alloc(&self, size: u32) -> Result<Region, Error>;
    fn release(&self, region: &Region);
}

/// One plane of a [`HardwareBuffer`]: a view into a region.
#[derive(Debug, Clone, Copy)]
pub struct Plane {
    pub stride: u32,
    pub rows: u32,
    pub size: u32,
    /// Index of the backing region
    pub region: usize,
    /// Byte offset of this plane within the backing region
    pub offset: u32,
}

/// A multi-plane video buffer backed by hardware memory.
pub struct HardwareBuffer {
    width: u32,
    height: u32,
    format: PixelFormat,
    planes: Vec<Plane>,
    regions: Vec<Region>,
    allocator: Arc<dyn Allocator>,
}

/// Allocate one buffer of `format` at `width` x `height`.
///
/// Every sub-allocation must succeed or the whole buffer fails; on partial
/// failure the regions created so far are released in reverse order before
/// the error is returned.
pub fn alloc_buffer(
    allocator: &Arc<dyn Allocator>,
    width: u32,
    height: u32,
    format: PixelFormat,
    interlaced: bool,
) -> Result<HardwareBuffer, Error> {
    let layouts = geometry::compute_layout(format, width, height, interlaced);

    let (regions, planes) = match format.layout_class() {
        PlaneLayoutClass::Contiguous => {
            let region = allocator.alloc(geometry::total_size(&layouts))?;
            let planes = contiguous_planes(format, &layouts);
            (vec![region], planes)
        }
        PlaneLayoutClass::Separate => {
            let mut regions: Vec<Region> = Vec::with_capacity(layouts.len());
            for layout in &layouts {
                match allocator.alloc(layout.size) {
                    Ok(region) => regions.push(region),
                    Err(err) => {
                        for region in regions.iter().rev() {
                            allocator.release(region);
                        }
                        return Err(err);
                    }
                }
            }
            let planes = layouts
                .iter()
                .enumerate()
                .map(|(i, layout)| Plane {
                    stride: layout.stride,
                    rows: layout.rows,
                    size: layout.size,
                    region: i,
                    offset: 0,
                })
                .collect();
            (regions, planes)
        }
    };

    log::debug!(
        "allocated {} {}x{} buffer: {} plane(s), {} region(s)",
        format,
        width,
        height,
        planes.len(),
        regions.len()
    );

    Ok(HardwareBuffer {
        width,
        height,
        format,
        planes,
        regions,
        allocator: Arc::clone(allocator),
    })
}

/// Derive plane views into a single contiguous region.
fn contiguous_planes(format: PixelFormat, layouts: &[PlaneLayout]) -> Vec<Plane> {
    let mut offsets = [0u32; MAX_PLANES];
    if format.swapped_chroma_offsets() && layouts.len() == 3 {
        // This 4:2:0 variant stores V before U in the allocation.
        offsets[2] = layouts[0].size;
        offsets[1] = layouts[0].size + layouts[2].size;
    } else {
        let mut offset = 0;
        for (i, layout) in layouts.iter().enumerate() {
            offsets[i] = offset;
            offset += layout.size;
        }
    }

    layouts
        .iter()
        .enumerate()
        .map(|(i, layout)| Plane {
            stride: layout.stride,
            rows: layout.rows,
            size: layout.size,
            region: 0,
            offset: offsets[i],
        })
        .collect()
}

impl HardwareBuffer {
    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn plane_count(&self) -> usize {
        self.planes.len()
    }

    pub fn planes(&self) -> &[Plane] {
        &self.planes
    }

    /// Per-plane strides, zero-padded to [`MAX_PLANES`] entries.
    pub fn strides(&self) -> [u32; MAX_PLANES] {
        let mut out = [0; MAX_PLANES];
        for (i, plane) in self.planes.iter().enumerate() {
            out[i] = plane.stride;
        }
        out
    }

    /// Per-plane sizes, zero-padded to [`MAX_PLANES`] entries.
    pub fn sizes(&self) -> [u32; MAX_PLANES] {
        let mut out = [0; MAX_PLANES];
        for (i, plane) in self.planes.iter().enumerate() {
            out[i] = plane.size;
        }
        out
    }

    /// Per-plane DMA descriptors, padded to [`MAX_PLANES`] entries.
    ///
    /// For contiguous layouts every entry aliases the single region's
    /// descriptor, which is what the capture and scale engines expect.
    pub fn dma_fds(&self) -> [RawFd; MAX_PLANES] {
        let mut out = [0; MAX_PLANES];
        let last = self.planes.last().map(|p| p.region).unwrap_or(0);
        for i in 0..MAX_PLANES {
            let region = self.planes.get(i).map(|p| p.region).unwrap_or(last);
            out[i] = self.regions[region].dma_fd;
        }
        out
    }

    /// Total bytes across all planes.
    pub fn total_size(&self) -> u32 {
        self.planes.iter().map(|p| p.size).sum()
    }

    /// Descriptor count and per-slot sizes as submitted to the capture
    /// device: contiguous layouts hand over one combined descriptor, while
    /// separate layouts submit every plane.
    pub fn queue_shape(&self) -> (usize, [u32; MAX_PLANES]) {
        match self.format.layout_class() {
            PlaneLayoutClass::Contiguous => {
                let mut sizes = [0; MAX_PLANES];
                sizes[0] = self.total_size();
                (1, sizes)
            }
            PlaneLayoutClass::Separate => (self.planes.len(), self.sizes()),
        }
    }

    /// Mapped bytes of one plane, if the backing region has a CPU mapping.
    pub fn plane_bytes(&self, index: usize) -> Option<&[u8]> {
        let plane = self.planes.get(index)?;
        let region = &self.regions[plane.region];
        let vaddr = region.vaddr?;
        // The view stays within the mapped region by construction.
        debug_assert!(plane.offset + plane.size <= region.size);
        unsafe {
            Some(std::slice::from_raw_parts(
                vaddr.as_ptr().add(plane.offset as usize),
                plane.size as usize,
            ))
        }
    }

}

impl Drop for HardwareBuffer {
    fn drop(&mut self) {
        for region in self.regions.iter().rev() {
            self.allocator.release(region);
        }
    }
}

impl fmt::Debug for HardwareBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HardwareBuffer")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("format", &self.format)
            .field("planes", &self.planes.len())
            .field("regions", &self.regions.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::MockAllocator;

    fn arc(mock: &Arc<MockAllocator>) -> Arc<dyn Allocator> {
        Arc::clone(mock) as Arc<dyn Allocator>
    }

    #[test]
    fn contiguous_format_uses_one_region() {
        let mock = MockAllocator::new();
        let alloc = arc(&mock);
        let buffer = alloc_buffer(&alloc, 1920, 1080, PixelFormat::Yuv420, false).unwrap();

        assert_eq!(buffer.plane_count(), 3);
        assert_eq!(mock.outstanding(), 1);
        assert_eq!(buffer.total_size(), 1920 * 1088 + 2 * (960 * 544));

        // All planes alias the single region's descriptor.
        let fds = buffer.dma_fds();
        assert_eq!(fds[0], fds[1]);
        assert_eq!(fds[1], fds[2]);

        // Plane views tile the allocation without overlap.
        assert_eq!(buffer.planes()[0].offset, 0);
        assert_eq!(buffer.planes()[1].offset, 1920 * 1088);
        assert_eq!(buffer.planes()[2].offset, 1920 * 1088 + 960 * 544);
    }

    #[test]
    fn separate_format_uses_one_region_per_plane() {
        let mock = MockAllocator::new();
        let alloc = arc(&mock);
        let buffer = alloc_buffer(&alloc, 1920, 1080, PixelFormat::Yuv420M, false).unwrap();

        assert_eq!(mock.outstanding(), 3);
        let fds = buffer.dma_fds();
        assert_ne!(fds[0], fds[1]);
        assert_ne!(fds[1], fds[2]);
        assert!(buffer.planes().iter().all(|p| p.offset == 0));
    }

    #[test]
    fn swapped_chroma_variant_places_v_before_u() {
        let mock = MockAllocator::new();
        let alloc = arc(&mock);
        let buffer = alloc_buffer(&alloc, 1920, 1080, PixelFormat::Yvu420, false).unwrap();

        let luma = 1920 * 1088;
        let chroma = 960 * 544;
        assert_eq!(buffer.planes()[2].offset, luma);
        assert_eq!(buffer.planes()[1].offset, luma + chroma);
    }

    #[test]
    fn alloc_then_drop_leaves_no_outstanding_regions() {
        let mock = MockAllocator::new();
        let alloc = arc(&mock);
        for format in [
            PixelFormat::Yuv420,
            PixelFormat::Yuv420M,
            PixelFormat::Yuyv,
            PixelFormat::Nv16M,
        ] {
            let buffer = alloc_buffer(&alloc, 1280, 720, format, false).unwrap();
            drop(buffer);
        }
        assert_eq!(mock.outstanding(), 0);
    }

    #[test]
    fn partial_failure_rolls_back_in_reverse_order() {
        let mock = MockAllocator::new();
        mock.fail_after(1); // second alloc call fails
        let alloc = arc(&mock);

        let err = alloc_buffer(&alloc, 1920, 1080, PixelFormat::Yuv420M, false).unwrap_err();
        assert!(matches!(err, Error::AllocationFailure));

        // The first plane was released, the third never attempted.
        assert_eq!(mock.outstanding(), 0);
        assert_eq!(mock.alloc_calls(), 2);
    }

    #[test]
    fn queue_shape_collapses_contiguous_layouts() {
        let mock = MockAllocator::new();
        let alloc = arc(&mock);

        let buffer = alloc_buffer(&alloc, 1920, 1080, PixelFormat::Yuv420, false).unwrap();
        let (descriptors, sizes) = buffer.queue_shape();
        assert_eq!(descriptors, 1);
        assert_eq!(sizes[0], buffer.total_size());
        assert_eq!(sizes[1], 0);

        let buffer = alloc_buffer(&alloc, 1920, 1080, PixelFormat::Yuv422M, false).unwrap();
        let (descriptors, sizes) = buffer.queue_shape();
        assert_eq!(descriptors, 3);
        assert_eq!(sizes, buffer.sizes());
    }

    #[test]
    fn plane_bytes_respects_offsets() {
        let mock = MockAllocator::new();
        let alloc = arc(&mock);
        let buffer = alloc_buffer(&alloc, 64, 32, PixelFormat::Yuv420, false).unwrap();

        let luma = buffer.plane_bytes(0).unwrap();
        assert_eq!(luma.len(), 64 * 32);
        let chroma = buffer.plane_bytes(1).unwrap();
        assert_eq!(chroma.len(), 32 * 16);
    }
}
