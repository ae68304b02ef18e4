// SPDX-License-Identifier: Apache-2.0

//! Runtime bindings for the SoC video libraries used by campipe.
//!
//! Four vendor libraries are loaded dynamically at runtime, so the crate
//! builds (and the mock-backed tests run) on hosts where none of them are
//! installed:
//!
//! - `libnx_v4l2.so` - capture device frontend (clipper/decimator paths)
//! - `libnx_drm_allocator.so` - GEM-style DMA memory allocator
//! - `libnx_scaler.so` - synchronous hardware scaler
//! - `libdrm.so.2` - display compositor (KMS planes and framebuffers)
//!
//! Each library is loaded once and cached for the process lifetime. The
//! `CAMPIPE_V4L2_LIBRARY`, `CAMPIPE_ALLOCATOR_LIBRARY`,
//! `CAMPIPE_SCALER_LIBRARY` and `CAMPIPE_DRM_LIBRARY` environment variables
//! override the default library names.
//!
//! The bindings are hand-maintained against the vendor call surface; the
//! vendor headers are not distributed, so there is no bindgen step.

#![allow(non_camel_case_types)]
#![allow(non_snake_case)]
#![allow(clippy::missing_safety_doc)]
#![allow(clippy::too_many_arguments)]

use std::ffi::{c_char, c_int, c_void};
use std::sync::{Mutex, OnceLock};

use libloading::Library;

// Re-export libloading for error handling
pub use libloading;

/// Capture path selector for `nx_v4l2_open_device`.
pub const NX_CLIPPER_VIDEO: c_int = 0;
pub const NX_DECIMATOR_VIDEO: c_int = 1;

pub const DRM_CLIENT_CAP_UNIVERSAL_PLANES: u64 = 2;
pub const DRM_MODE_OBJECT_PLANE: u32 = 0xeeee_eeee;
pub const DRM_PLANE_TYPE_OVERLAY: u64 = 0;
pub const DRM_PLANE_TYPE_PRIMARY: u64 = 1;
pub const DRM_PLANE_TYPE_CURSOR: u64 = 2;
pub const DRM_MODE_FB_INTERLACED: u32 = 1;
pub const DRM_PROP_NAME_LEN: usize = 32;

/// Crop/selection rectangle passed to the scaler.
#[repr(C)]
#[derive(Debug, Default, Clone, Copy)]
pub struct nx_scaler_rect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

/// One synchronous scale operation, fully specified up front.
///
/// Unused trailing fd/stride entries are zero; for single-allocation
/// buffers all three fds alias the same descriptor.
#[repr(C)]
#[derive(Debug, Default, Clone, Copy)]
pub struct nx_scaler_context {
    pub crop: nx_scaler_rect,
    pub src_plane_num: u32,
    pub src_width: u32,
    pub src_height: u32,
    pub src_code: u32,
    pub src_fds: [c_int; 3],
    pub src_stride: [u32; 3],
    pub dst_plane_num: u32,
    pub dst_width: u32,
    pub dst_height: u32,
    pub dst_code: u32,
    pub dst_fds: [c_int; 3],
    pub dst_stride: [u32; 3],
}

#[repr(C)]
#[derive(Debug)]
pub struct drmModeRes {
    pub count_fbs: c_int,
    pub fbs: *mut u32,
    pub count_crtcs: c_int,
    pub crtcs: *mut u32,
    pub count_connectors: c_int,
    pub connectors: *mut u32,
    pub count_encoders: c_int,
    pub encoders: *mut u32,
    pub min_width: u32,
    pub max_width: u32,
    pub min_height: u32,
    pub max_height: u32,
}

#[repr(C)]
#[derive(Debug)]
pub struct drmModePlaneRes {
    pub count_planes: u32,
    pub planes: *mut u32,
}

#[repr(C)]
#[derive(Debug)]
pub struct drmModePlane {
    pub count_formats: u32,
    pub formats: *mut u32,
    pub plane_id: u32,
    pub crtc_id: u32,
    pub fb_id: u32,
    pub crtc_x: u32,
    pub crtc_y: u32,
    pub x: u32,
    pub y: u32,
    pub possible_crtcs: u32,
    pub gamma_size: u32,
}

#[repr(C)]
#[derive(Debug)]
pub struct drmModeObjectProperties {
    pub count_props: u32,
    pub props: *mut u32,
    pub prop_values: *mut u64,
}

#[repr(C)]
#[derive(Debug)]
pub struct drmModePropertyRes {
    pub prop_id: u32,
    pub flags: u32,
    pub name: [c_char; DRM_PROP_NAME_LEN],
    pub count_values: c_int,
    pub values: *mut u64,
    pub count_enums: c_int,
    pub enums: *mut c_void,
    pub count_blobs: c_int,
    pub blob_ids: *mut u32,
}

/// Resolve one symbol and copy the function pointer out of it.
unsafe fn sym<T: Copy>(lib: &Library, name: &[u8]) -> Result<T, libloading::Error> {
    let symbol = unsafe { lib.get::<T>(name) }?;
    Ok(*symbol)
}

/// Capture device frontend (`libnx_v4l2.so`).
pub struct V4l2Library {
    _lib: Library,
    pub nx_v4l2_open_device: unsafe extern "C" fn(c_int, c_int) -> c_int,
    pub nx_v4l2_get_video_path: unsafe extern "C" fn(c_int, c_int) -> *const c_char,
    pub nx_v4l2_is_interlaced_camera: unsafe extern "C" fn(c_int) -> c_int,
    pub nx_v4l2_set_fmt:
        unsafe extern "C" fn(c_int, u32, u32, u32, u32, *const u32, *const u32) -> c_int,
    pub nx_v4l2_set_crop: unsafe extern "C" fn(c_int, c_int, u32, u32, u32, u32) -> c_int,
    pub nx_v4l2_set_selection: unsafe extern "C" fn(c_int, c_int, u32, u32) -> c_int,
    pub nx_v4l2_reqbuf: unsafe extern "C" fn(c_int, c_int, c_int) -> c_int,
    pub nx_v4l2_qbuf:
        unsafe extern "C" fn(c_int, c_int, c_int, c_int, *const c_int, *const c_int) -> c_int,
    pub nx_v4l2_dqbuf: unsafe extern "C" fn(c_int, c_int, c_int, *mut c_int) -> c_int,
    pub nx_v4l2_streamon: unsafe extern "C" fn(c_int, c_int) -> c_int,
    pub nx_v4l2_streamoff: unsafe extern "C" fn(c_int, c_int) -> c_int,
}

impl V4l2Library {
    pub unsafe fn new(path: &str) -> Result<Self, libloading::Error> {
        let lib = unsafe { Library::new(path) }?;
        Ok(Self {
            nx_v4l2_open_device: unsafe { sym(&lib, b"nx_v4l2_open_device\0") }?,
            nx_v4l2_get_video_path: unsafe { sym(&lib, b"nx_v4l2_get_video_path\0") }?,
            nx_v4l2_is_interlaced_camera: unsafe {
                sym(&lib, b"nx_v4l2_is_interlaced_camera\0")
            }?,
            nx_v4l2_set_fmt: unsafe { sym(&lib, b"nx_v4l2_set_fmt\0") }?,
            nx_v4l2_set_crop: unsafe { sym(&lib, b"nx_v4l2_set_crop\0") }?,
            nx_v4l2_set_selection: unsafe { sym(&lib, b"nx_v4l2_set_selection\0") }?,
            nx_v4l2_reqbuf: unsafe { sym(&lib, b"nx_v4l2_reqbuf\0") }?,
            nx_v4l2_qbuf: unsafe { sym(&lib, b"nx_v4l2_qbuf\0") }?,
            nx_v4l2_dqbuf: unsafe { sym(&lib, b"nx_v4l2_dqbuf\0") }?,
            nx_v4l2_streamon: unsafe { sym(&lib, b"nx_v4l2_streamon\0") }?,
            nx_v4l2_streamoff: unsafe { sym(&lib, b"nx_v4l2_streamoff\0") }?,
            _lib: lib,
        })
    }
}

/// GEM-style DMA allocator (`libnx_drm_allocator.so`).
pub struct AllocatorLibrary {
    _lib: Library,
    pub alloc_gem: unsafe extern "C" fn(c_int, c_int, c_int) -> c_int,
    pub gem_to_dmafd: unsafe extern "C" fn(c_int, c_int) -> c_int,
    pub get_vaddr: unsafe extern "C" fn(c_int, c_int, c_int, *mut *mut c_void) -> c_int,
    pub free_gem: unsafe extern "C" fn(c_int, c_int) -> c_int,
}

impl AllocatorLibrary {
    pub unsafe fn new(path: &str) -> Result<Self, libloading::Error> {
        let lib = unsafe { Library::new(path) }?;
        Ok(Self {
            alloc_gem: unsafe { sym(&lib, b"alloc_gem\0") }?,
            gem_to_dmafd: unsafe { sym(&lib, b"gem_to_dmafd\0") }?,
            get_vaddr: unsafe { sym(&lib, b"get_vaddr\0") }?,
            free_gem: unsafe { sym(&lib, b"free_gem\0") }?,
            _lib: lib,
        })
    }
}

/// Synchronous hardware scaler (`libnx_scaler.so`).
pub struct ScalerLibrary {
    _lib: Library,
    pub scaler_open: unsafe extern "C" fn() -> c_int,
    pub nx_scaler_run: unsafe extern "C" fn(c_int, *mut nx_scaler_context) -> c_int,
    pub nx_scaler_close: unsafe extern "C" fn(c_int),
}

impl ScalerLibrary {
    pub unsafe fn new(path: &str) -> Result<Self, libloading::Error> {
        let lib = unsafe { Library::new(path) }?;
        Ok(Self {
            scaler_open: unsafe { sym(&lib, b"scaler_open\0") }?,
            nx_scaler_run: unsafe { sym(&lib, b"nx_scaler_run\0") }?,
            nx_scaler_close: unsafe { sym(&lib, b"nx_scaler_close\0") }?,
            _lib: lib,
        })
    }
}

/// KMS display compositor (`libdrm.so.2`).
pub struct DrmLibrary {
    _lib: Library,
    pub drmOpen: unsafe extern "C" fn(*const c_char, *const c_char) -> c_int,
    pub drmClose: unsafe extern "C" fn(c_int) -> c_int,
    pub drmSetClientCap: unsafe extern "C" fn(c_int, u64, u64) -> c_int,
    pub drmModeGetResources: unsafe extern "C" fn(c_int) -> *mut drmModeRes,
    pub drmModeFreeResources: unsafe extern "C" fn(*mut drmModeRes),
    pub drmModeGetPlaneResources: unsafe extern "C" fn(c_int) -> *mut drmModePlaneRes,
    pub drmModeFreePlaneResources: unsafe extern "C" fn(*mut drmModePlaneRes),
    pub drmModeGetPlane: unsafe extern "C" fn(c_int, u32) -> *mut drmModePlane,
    pub drmModeFreePlane: unsafe extern "C" fn(*mut drmModePlane),
    pub drmModeObjectGetProperties:
        unsafe extern "C" fn(c_int, u32, u32) -> *mut drmModeObjectProperties,
    pub drmModeFreeObjectProperties: unsafe extern "C" fn(*mut drmModeObjectProperties),
    pub drmModeGetProperty: unsafe extern "C" fn(c_int, u32) -> *mut drmModePropertyRes,
    pub drmModeFreeProperty: unsafe extern "C" fn(*mut drmModePropertyRes),
    pub drmModeObjectSetProperty: unsafe extern "C" fn(c_int, u32, u32, u32, u64) -> c_int,
    pub drmModeAddFB2: unsafe extern "C" fn(
        c_int,
        u32,
        u32,
        u32,
        *const u32,
        *const u32,
        *const u32,
        *mut u32,
        u32,
    ) -> c_int,
    pub drmModeRmFB: unsafe extern "C" fn(c_int, u32) -> c_int,
    pub drmModeSetPlane: unsafe extern "C" fn(
        c_int,
        u32,
        u32,
        u32,
        u32,
        i32,
        i32,
        u32,
        u32,
        u32,
        u32,
        u32,
        u32,
    ) -> c_int,
    pub drmPrimeFDToHandle: unsafe extern "C" fn(c_int, c_int, *mut u32) -> c_int,
}

impl DrmLibrary {
    pub unsafe fn new(path: &str) -> Result<Self, libloading::Error> {
        let lib = unsafe { Library::new(path) }?;
        Ok(Self {
            drmOpen: unsafe { sym(&lib, b"drmOpen\0") }?,
            drmClose: unsafe { sym(&lib, b"drmClose\0") }?,
            drmSetClientCap: unsafe { sym(&lib, b"drmSetClientCap\0") }?,
            drmModeGetResources: unsafe { sym(&lib, b"drmModeGetResources\0") }?,
            drmModeFreeResources: unsafe { sym(&lib, b"drmModeFreeResources\0") }?,
            drmModeGetPlaneResources: unsafe { sym(&lib, b"drmModeGetPlaneResources\0") }?,
            drmModeFreePlaneResources: unsafe { sym(&lib, b"drmModeFreePlaneResources\0") }?,
            drmModeGetPlane: unsafe { sym(&lib, b"drmModeGetPlane\0") }?,
            drmModeFreePlane: unsafe { sym(&lib, b"drmModeFreePlane\0") }?,
            drmModeObjectGetProperties: unsafe { sym(&lib, b"drmModeObjectGetProperties\0") }?,
            drmModeFreeObjectProperties: unsafe { sym(&lib, b"drmModeFreeObjectProperties\0") }?,
            drmModeGetProperty: unsafe { sym(&lib, b"drmModeGetProperty\0") }?,
            drmModeFreeProperty: unsafe { sym(&lib, b"drmModeFreeProperty\0") }?,
            drmModeObjectSetProperty: unsafe { sym(&lib, b"drmModeObjectSetProperty\0") }?,
            drmModeAddFB2: unsafe { sym(&lib, b"drmModeAddFB2\0") }?,
            drmModeRmFB: unsafe { sym(&lib, b"drmModeRmFB\0") }?,
            drmModeSetPlane: unsafe { sym(&lib, b"drmModeSetPlane\0") }?,
            drmPrimeFDToHandle: unsafe { sym(&lib, b"drmPrimeFDToHandle\0") }?,
            _lib: lib,
        })
    }
}

static INIT_LOCK: Mutex<()> = Mutex::new(());

macro_rules! library_accessor {
    ($(#[$doc:meta])* $fn_name:ident, $ty:ident, $cell:ident, $env:literal, $default:literal) => {
        static $cell: OnceLock<$ty> = OnceLock::new();

        $(#[$doc])*
        pub fn $fn_name() -> Result<&'static $ty, libloading::Error> {
            if let Some(lib) = $cell.get() {
                return Ok(lib);
            }

            let _guard = INIT_LOCK.lock().unwrap();

            // Double-check after acquiring lock
            if let Some(lib) = $cell.get() {
                return Ok(lib);
            }

            let path = std::env::var($env)
                .ok()
                .unwrap_or_else(|| $default.to_string());
            let lib = unsafe { $ty::new(path.as_str())? };
            let _ = $cell.set(lib);
            Ok($cell.get().unwrap())
        }
    };
}

library_accessor!(
    /// Load (or return the cached) capture device library.
    v4l2,
    V4l2Library,
    V4L2_LIBRARY,
    "CAMPIPE_V4L2_LIBRARY",
    "libnx_v4l2.so"
);

library_accessor!(
    /// Load (or return the cached) DMA allocator library.
    allocator,
    AllocatorLibrary,
    ALLOCATOR_LIBRARY,
    "CAMPIPE_ALLOCATOR_LIBRARY",
    "libnx_drm_allocator.so"
);

library_accessor!(
    /// Load (or return the cached) hardware scaler library.
    scaler,
    ScalerLibrary,
    SCALER_LIBRARY,
    "CAMPIPE_SCALER_LIBRARY",
    "libnx_scaler.so"
);

library_accessor!(
    /// Load (or return the cached) DRM/KMS library.
    drm,
    DrmLibrary,
    DRM_LIBRARY,
    "CAMPIPE_DRM_LIBRARY",
    "libdrm.so.2"
);
