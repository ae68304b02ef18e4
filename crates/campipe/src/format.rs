// SPDX-License-Identifier: Apache-2.0

//! Pixel format identities and their fixed, format-keyed properties.
//!
//! Every stage of the pipeline keys off [`PixelFormat`]: the geometry
//! calculator reads the chroma subsampling rule, the buffer pool reads the
//! plane count and layout class, the scaler and display stages read their
//! respective hardware format mappings. All of these are closed tables -
//! none of them is configurable.

use core::fmt;

/// Four-character code as exchanged with V4L2 and DRM.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct FourCC(pub [u8; 4]);

impl FourCC {
    pub const fn to_u32(self) -> u32 {
        u32::from_le_bytes(self.0)
    }

    pub const fn from_u32(val: u32) -> Self {
        FourCC(val.to_le_bytes())
    }
}

impl From<u32> for FourCC {
    fn from(val: u32) -> FourCC {
        FourCC::from_u32(val)
    }
}

impl From<FourCC> for u32 {
    fn from(val: FourCC) -> u32 {
        val.to_u32()
    }
}

impl fmt::Display for FourCC {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match core::str::from_utf8(&self.0) {
            Ok(s) => f.write_str(s),
            Err(_) => {
                let b = &self.0;
                f.write_fmt(format_args!(
                    "{}{}{}{}",
                    core::ascii::escape_default(b[0]),
                    core::ascii::escape_default(b[1]),
                    core::ascii::escape_default(b[2]),
                    core::ascii::escape_default(b[3])
                ))
            }
        }
    }
}

impl fmt::Debug for FourCC {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FourCC({})", self)
    }
}

/// How the planes of one buffer are backed by hardware allocations.
///
/// This is a fixed property of the pixel format, decided once here and
/// consumed by the buffer pool and the display stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaneLayoutClass {
    /// All planes are sub-regions of a single allocation
    Contiguous,
    /// One independent allocation per plane
    Separate,
}

/// Chroma subsampling rule relative to the luma plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ChromaRule {
    /// 4:2:0 - half horizontal, half vertical
    Quarter,
    /// 4:2:2 planar - half horizontal, full vertical
    HalfWidth,
    /// 4:4:4 planar - full resolution chroma
    Full,
    /// Packed 4:2:2 - no chroma plane, luma stride doubled
    PackedDouble,
    /// No chroma at all
    None,
}

/// The closed set of pixel formats the pipeline understands.
///
/// `M`-suffixed variants are the multi-allocation spellings of the same
/// sampling; the non-`M` variants keep all planes in one contiguous
/// allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    /// Planar 4:2:0, contiguous, U then V
    Yuv420,
    /// Planar 4:2:0, contiguous, V then U
    Yvu420,
    /// Planar 4:2:0, separate allocations
    Yuv420M,
    /// Planar 4:2:0, separate allocations, V then U
    Yvu420M,
    /// Semi-planar 4:2:0, contiguous, interleaved UV
    Nv12M,
    /// Semi-planar 4:2:0, contiguous, interleaved VU
    Nv21M,
    /// Packed 4:2:2, single plane
    Yuyv,
    /// Planar 4:2:2, contiguous
    Yuv422P,
    /// Planar 4:2:2, separate allocations
    Yuv422M,
    /// Semi-planar 4:2:2, separate allocations
    Nv16M,
    /// Semi-planar 4:2:2, separate allocations, VU
    Nv61M,
    /// Planar 4:4:4, contiguous
    Yuv444,
    /// Planar 4:4:4, separate allocations
    Yuv444M,
    /// Greyscale, single plane
    Grey,
}

impl PixelFormat {
    /// The V4L2 fourcc for this format.
    pub const fn fourcc(self) -> FourCC {
        FourCC(match self {
            PixelFormat::Yuv420 => *b"YU12",
            PixelFormat::Yvu420 => *b"YV12",
            PixelFormat::Yuv420M => *b"YM12",
            PixelFormat::Yvu420M => *b"YM21",
            PixelFormat::Nv12M => *b"NM12",
            PixelFormat::Nv21M => *b"NM21",
            PixelFormat::Yuyv => *b"YUYV",
            PixelFormat::Yuv422P => *b"422P",
            PixelFormat::Yuv422M => *b"YM16",
            PixelFormat::Nv16M => *b"NM16",
            PixelFormat::Nv61M => *b"NM61",
            PixelFormat::Yuv444 => *b"Y444",
            PixelFormat::Yuv444M => *b"YM24",
            PixelFormat::Grey => *b"GREY",
        })
    }

    /// Look a format up by its V4L2 fourcc.
    ///
    /// This is the single fallible entry point into the format table;
    /// everything downstream works on the closed enum.
    pub fn from_fourcc(fourcc: FourCC) -> Result<Self, crate::Error> {
        const ALL: [PixelFormat; 14] = [
            PixelFormat::Yuv420,
            PixelFormat::Yvu420,
            PixelFormat::Yuv420M,
            PixelFormat::Yvu420M,
            PixelFormat::Nv12M,
            PixelFormat::Nv21M,
            PixelFormat::Yuyv,
            PixelFormat::Yuv422P,
            PixelFormat::Yuv422M,
            PixelFormat::Nv16M,
            PixelFormat::Nv61M,
            PixelFormat::Yuv444,
            PixelFormat::Yuv444M,
            PixelFormat::Grey,
        ];
        ALL.into_iter()
            .find(|f| f.fourcc() == fourcc)
            .ok_or(crate::Error::UnsupportedFormat(fourcc))
    }

    /// Number of planes in a buffer of this format (1-3).
    pub const fn plane_count(self) -> usize {
        match self {
            PixelFormat::Yuyv | PixelFormat::Grey => 1,
            PixelFormat::Nv12M | PixelFormat::Nv21M | PixelFormat::Nv16M | PixelFormat::Nv61M => 2,
            _ => 3,
        }
    }

    /// Whether the planes share one allocation or use one each.
    pub const fn layout_class(self) -> PlaneLayoutClass {
        match self {
            PixelFormat::Yuv420M
            | PixelFormat::Yvu420M
            | PixelFormat::Yuv422M
            | PixelFormat::Nv16M
            | PixelFormat::Nv61M
            | PixelFormat::Yuv444M => PlaneLayoutClass::Separate,
            _ => PlaneLayoutClass::Contiguous,
        }
    }

    pub(crate) const fn chroma_rule(self) -> ChromaRule {
        match self {
            PixelFormat::Yuv420
            | PixelFormat::Yvu420
            | PixelFormat::Yuv420M
            | PixelFormat::Yvu420M
            | PixelFormat::Nv12M
            | PixelFormat::Nv21M => ChromaRule::Quarter,
            PixelFormat::Yuyv => ChromaRule::PackedDouble,
            PixelFormat::Yuv422P
            | PixelFormat::Yuv422M
            | PixelFormat::Nv16M
            | PixelFormat::Nv61M => ChromaRule::HalfWidth,
            PixelFormat::Yuv444 | PixelFormat::Yuv444M => ChromaRule::Full,
            PixelFormat::Grey => ChromaRule::None,
        }
    }

    /// Contiguous 4:2:0 variant whose chroma planes sit V-before-U in the
    /// allocation. The on-wire plane order of this one format is swapped;
    /// it is not a general property of V-first formats.
    pub(crate) const fn swapped_chroma_offsets(self) -> bool {
        matches!(self, PixelFormat::Yvu420)
    }

    /// DRM fourcc used when composing this format onto a display plane.
    ///
    /// Only the display-capable subset maps; everything else returns `None`.
    pub const fn drm_fourcc(self) -> Option<FourCC> {
        match self {
            PixelFormat::Yuv420 => Some(FourCC(*b"YU12")),
            PixelFormat::Yuv422P => Some(FourCC(*b"YU16")),
            PixelFormat::Yuv444 => Some(FourCC(*b"YU24")),
            PixelFormat::Yuyv => Some(FourCC(*b"YUYV")),
            _ => None,
        }
    }

    /// Media-bus code handed to the hardware scaler.
    ///
    /// Only the three contiguous planar formats are scalable.
    pub const fn scaler_code(self) -> Option<u32> {
        // MEDIA_BUS_FMT_* values
        match self {
            PixelFormat::Yuv420 => Some(0x2008),  // YUYV8_2X8
            PixelFormat::Yuv422P => Some(0x2011), // YUYV8_1X16
            PixelFormat::Yuv444 => Some(0x0100),  // AYUV8_1X32
            _ => None,
        }
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.fourcc())
    }
}
