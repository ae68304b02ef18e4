// SPDX-License-Identifier: Apache-2.0

//! Raw frame persistence.
//!
//! Frames are written plane-major, row-major within each plane, using the
//! nominal image dimensions rather than the padded hardware strides. The
//! trailing alignment padding of each row never reaches the file, so the
//! output is a plain planar image at the configured size.

use std::io::{self, Write};

use crate::format::PixelFormat;
use crate::memory::HardwareBuffer;
use crate::Error;

/// Bytes-per-row and row count to emit for each plane of `format` at the
/// nominal `width` x `height`.
fn emit_shape(format: PixelFormat, width: u32, height: u32) -> Vec<(u32, u32)> {
    use PixelFormat::*;
    match format {
        Yuyv => vec![(width * 2, height)],
        Grey => vec![(width, height)],
        Yuv420 | Yvu420 | Yuv420M | Yvu420M => {
            vec![(width, height), (width / 2, height / 2), (width / 2, height / 2)]
        }
        Nv12M | Nv21M => vec![(width, height), (width, height / 2)],
        Yuv422P | Yuv422M => {
            vec![(width, height), (width / 2, height), (width / 2, height)]
        }
        Nv16M | Nv61M => vec![(width, height), (width, height)],
        Yuv444 | Yuv444M => vec![(width, height); 3],
    }
}

/// Append one frame's planes to `out`.
pub fn write_planes<W: Write>(out: &mut W, buffer: &HardwareBuffer) -> Result<(), Error> {
    let shapes = emit_shape(buffer.format(), buffer.width(), buffer.height());
    debug_assert_eq!(shapes.len(), buffer.plane_count());

    for (index, (row_bytes, rows)) in shapes.into_iter().enumerate() {
        let bytes = buffer.plane_bytes(index).ok_or_else(|| {
            Error::Io(io::Error::new(
                io::ErrorKind::Other,
                "plane has no CPU mapping",
            ))
        })?;
        let stride = buffer.planes()[index].stride as usize;
        for row in 0..rows as usize {
            let start = row * stride;
            out.write_all(&bytes[start..start + row_bytes as usize])?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{alloc_buffer, Allocator};
    use crate::testutil::MockAllocator;
    use std::sync::Arc;

    #[test]
    fn planar_420_dump_is_exactly_one_and_a_half_bytes_per_pixel() {
        let alloc = MockAllocator::new() as Arc<dyn Allocator>;
        let buffer = alloc_buffer(&alloc, 1920, 1080, PixelFormat::Yuv420, false).unwrap();

        let mut out = Vec::new();
        write_planes(&mut out, &buffer).unwrap();
        assert_eq!(out.len(), 1920 * 1080 * 3 / 2);
    }

    #[test]
    fn stride_padding_is_stripped() {
        // 100 is not 32-aligned, so the luma stride pads to 128.
        let alloc = MockAllocator::new() as Arc<dyn Allocator>;
        let buffer = alloc_buffer(&alloc, 100, 64, PixelFormat::Grey, false).unwrap();
        assert_eq!(buffer.planes()[0].stride, 128);

        let mut out = Vec::new();
        write_planes(&mut out, &buffer).unwrap();
        assert_eq!(out.len(), 100 * 64);
    }

    #[test]
    fn packed_422_dump_is_two_bytes_per_pixel() {
        let alloc = MockAllocator::new() as Arc<dyn Allocator>;
        let buffer = alloc_buffer(&alloc, 640, 480, PixelFormat::Yuyv, false).unwrap();

        let mut out = Vec::new();
        write_planes(&mut out, &buffer).unwrap();
        assert_eq!(out.len(), 640 * 480 * 2);
    }

    #[test]
    fn two_plane_420_dump_matches_planar_size() {
        let alloc = MockAllocator::new() as Arc<dyn Allocator>;
        let buffer = alloc_buffer(&alloc, 640, 480, PixelFormat::Nv12M, false).unwrap();

        let mut out = Vec::new();
        write_planes(&mut out, &buffer).unwrap();
        assert_eq!(out.len(), 640 * 480 * 3 / 2);
    }
}
