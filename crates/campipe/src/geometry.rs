// SPDX-License-Identifier: Apache-2.0

//! Per-plane stride and size calculation.
//!
//! The rules are a fixed table keyed by [`PixelFormat`]: the luma stride is
//! rounded up to 32 bytes (128 for interlaced sensors, which deliver
//! field-paired lines), plane heights to 16 rows, and the chroma planes
//! follow the format's subsampling rule. The capture, scale and display
//! engines all assume exactly this padding, so the table is not
//! configurable.

use crate::format::{ChromaRule, PixelFormat};

/// Maximum number of planes in any supported format.
pub const MAX_PLANES: usize = 3;

/// Luma stride alignment for progressive capture.
pub const STRIDE_ALIGN: u32 = 32;

/// Luma stride alignment for interlaced capture.
pub const STRIDE_ALIGN_INTERLACED: u32 = 128;

/// Row-count alignment for every plane.
pub const ROW_ALIGN: u32 = 16;

/// Derived geometry of one plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaneLayout {
    /// Bytes per row, alignment padding included
    pub stride: u32,
    /// Row count, alignment padding included
    pub rows: u32,
    /// Total plane size in bytes
    pub size: u32,
}

const fn align(value: u32, to: u32) -> u32 {
    (value + to - 1) & !(to - 1)
}

/// Compute the plane layouts for a buffer of `format` at `width` x `height`.
///
/// Returns one entry per plane, luma first. Dimensions that are not already
/// aligned are padded up, never truncated, so strides and row counts are
/// always at least the requested values.
pub fn compute_layout(
    format: PixelFormat,
    width: u32,
    height: u32,
    interlaced: bool,
) -> Vec<PlaneLayout> {
    let y_align = if interlaced {
        STRIDE_ALIGN_INTERLACED
    } else {
        STRIDE_ALIGN
    };
    let mut lu_stride = align(width, y_align);
    let lu_rows = align(height, ROW_ALIGN);

    let (c_stride, c_rows) = match format.chroma_rule() {
        ChromaRule::Quarter => (lu_stride / 2, align(height / 2, ROW_ALIGN)),
        ChromaRule::HalfWidth => (lu_stride / 2, lu_rows),
        ChromaRule::Full => (lu_stride, lu_rows),
        ChromaRule::PackedDouble => {
            lu_stride *= 2;
            (0, 0)
        }
        ChromaRule::None => (0, 0),
    };

    match format.plane_count() {
        1 => vec![PlaneLayout {
            stride: lu_stride,
            rows: lu_rows,
            size: lu_stride * lu_rows + c_stride * c_rows * 2,
        }],
        2 => vec![
            PlaneLayout {
                stride: lu_stride,
                rows: lu_rows,
                size: lu_stride * lu_rows,
            },
            // Interleaved chroma: both components share one plane
            PlaneLayout {
                stride: c_stride * 2,
                rows: c_rows,
                size: c_stride * c_rows * 2,
            },
        ],
        _ => {
            let chroma = PlaneLayout {
                stride: c_stride,
                rows: c_rows,
                size: c_stride * c_rows,
            };
            vec![
                PlaneLayout {
                    stride: lu_stride,
                    rows: lu_rows,
                    size: lu_stride * lu_rows,
                },
                chroma,
                chroma,
            ]
        }
    }
}

/// Sum of all plane sizes; the allocation size for contiguous-layout formats.
pub fn total_size(layouts: &[PlaneLayout]) -> u32 {
    layouts.iter().map(|l| l.size).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    #[test]
    fn full_hd_planar_420() {
        // 1920 is already 32-aligned; 1080 pads to 1088, 540 to 544.
        let layouts = compute_layout(PixelFormat::Yuv420, 1920, 1080, false);
        assert_eq!(layouts.len(), 3);
        assert_eq!(layouts[0].stride, 1920);
        assert_eq!(layouts[0].rows, 1088);
        assert_eq!(layouts[1].stride, 960);
        assert_eq!(layouts[1].rows, 544);
        assert_eq!(layouts[2], layouts[1]);
        assert_eq!(total_size(&layouts), 1920 * 1088 + 2 * (960 * 544));
    }

    #[test]
    fn packed_422_doubles_the_stride() {
        let layouts = compute_layout(PixelFormat::Yuyv, 1920, 1080, false);
        assert_eq!(layouts.len(), 1);
        assert_eq!(layouts[0].stride, 3840);
        assert_eq!(layouts[0].size, 3840 * 1088);
    }

    #[test]
    fn planar_422_keeps_full_chroma_height() {
        let layouts = compute_layout(PixelFormat::Yuv422P, 1280, 720, false);
        assert_eq!(layouts[1].stride, 640);
        assert_eq!(layouts[1].rows, layouts[0].rows);
    }

    #[test]
    fn planar_444_keeps_full_chroma() {
        let layouts = compute_layout(PixelFormat::Yuv444, 1280, 720, false);
        assert_eq!(layouts[1], layouts[0]);
        assert_eq!(layouts[2], layouts[0]);
    }

    #[test]
    fn semi_planar_chroma_is_interleaved() {
        let layouts = compute_layout(PixelFormat::Nv12M, 1920, 1080, false);
        assert_eq!(layouts.len(), 2);
        assert_eq!(layouts[1].stride, 1920);
        assert_eq!(layouts[1].size, 960 * 544 * 2);
    }

    #[test]
    fn greyscale_is_one_plane() {
        let layouts = compute_layout(PixelFormat::Grey, 640, 480, false);
        assert_eq!(layouts.len(), 1);
        assert_eq!(layouts[0].size, 640 * 480);
    }

    #[test]
    fn interlaced_uses_wider_alignment() {
        let layouts = compute_layout(PixelFormat::Yuv420, 1920, 1080, true);
        assert_eq!(layouts[0].stride, align(1920, 128));

        let layouts = compute_layout(PixelFormat::Yuv420, 1000, 1080, true);
        assert_eq!(layouts[0].stride, 1024);
    }

    #[test]
    fn unaligned_dimensions_are_padded_never_truncated() {
        let layouts = compute_layout(PixelFormat::Yuv420, 1001, 733, false);
        assert!(layouts[0].stride >= 1001);
        assert!(layouts[0].rows >= 733);
        assert_eq!(layouts[0].stride % STRIDE_ALIGN, 0);
        assert_eq!(layouts[0].rows % ROW_ALIGN, 0);
    }

    #[test]
    fn plane_sizes_are_stride_times_rows() {
        let mut rng = rand::rng();
        let formats = [
            PixelFormat::Yuv420,
            PixelFormat::Yvu420,
            PixelFormat::Yuv420M,
            PixelFormat::Nv12M,
            PixelFormat::Yuyv,
            PixelFormat::Yuv422P,
            PixelFormat::Nv16M,
            PixelFormat::Yuv444,
            PixelFormat::Grey,
        ];
        for _ in 0..64 {
            let width = rng.random_range(1..=2048u32) * 2;
            let height = rng.random_range(1..=1080u32) * 2;
            for format in formats {
                let layouts = compute_layout(format, width, height, false);
                assert_eq!(layouts.len(), format.plane_count());
                let mut sum = 0;
                for layout in &layouts {
                    assert_eq!(layout.size, layout.stride * layout.rows);
                    sum += layout.size;
                }
                assert_eq!(total_size(&layouts), sum);
            }
        }
    }
}
