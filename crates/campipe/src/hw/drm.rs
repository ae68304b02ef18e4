// SPDX-License-Identifier: Apache-2.0

//! Display compositor over the KMS library.
//!
//! One [`DrmDevice`] connection per capture path serves double duty: the
//! GEM allocator allocates against it and the compositor composites
//! through it. Plane property access goes through the object-properties
//! interface with name lookup, since property ids are not stable across
//! kernels.

use std::ffi::{c_int, CStr, CString};
use std::ptr;
use std::sync::Arc;

use campipe_sys::{
    DrmLibrary, DRM_CLIENT_CAP_UNIVERSAL_PLANES, DRM_MODE_FB_INTERLACED, DRM_MODE_OBJECT_PLANE,
};

use crate::capture::Rect;
use crate::display::{Compositor, FramebufferDesc, PlaneInfo};
use crate::errno_result;
use crate::format::FourCC;
use crate::Error;

/// Driver name passed to the device open call. Opening by name avoids a
/// first-update glitch seen when opening the card node directly.
const DRIVER_NAME: &str = "nexell";

/// An open connection to the display controller.
pub struct DrmDevice {
    lib: &'static DrmLibrary,
    fd: c_int,
}

impl DrmDevice {
    pub fn open() -> Result<Self, Error> {
        let lib = campipe_sys::drm()?;
        let name = CString::new(DRIVER_NAME).map_err(|_| Error::NoDevice(DRIVER_NAME.into()))?;
        let fd = unsafe { (lib.drmOpen)(name.as_ptr(), ptr::null()) };
        if fd < 0 {
            return Err(Error::NoDevice(format!("drm device '{}'", DRIVER_NAME)));
        }
        Ok(Self { lib, fd })
    }

    pub fn fd(&self) -> c_int {
        self.fd
    }
}

impl Drop for DrmDevice {
    fn drop(&mut self) {
        unsafe { (self.lib.drmClose)(self.fd) };
    }
}

/// KMS-backed [`Compositor`] bound to the device's first CRTC.
pub struct DrmCompositor {
    lib: &'static DrmLibrary,
    device: Arc<DrmDevice>,
    crtc_id: u32,
}

impl DrmCompositor {
    pub fn new(device: Arc<DrmDevice>) -> Result<Self, Error> {
        let lib = campipe_sys::drm()?;
        let fd = device.fd();
        errno_result(unsafe {
            (lib.drmSetClientCap)(fd, DRM_CLIENT_CAP_UNIVERSAL_PLANES, 1)
        })?;

        let resources = unsafe { (lib.drmModeGetResources)(fd) };
        if resources.is_null() {
            return Err(Error::NoDevice("drm mode resources".into()));
        }
        let crtc_id = unsafe {
            let res = &*resources;
            if res.count_crtcs < 1 {
                (lib.drmModeFreeResources)(resources);
                return Err(Error::NoDevice("display controller has no crtc".into()));
            }
            *res.crtcs
        };
        unsafe { (lib.drmModeFreeResources)(resources) };

        Ok(Self {
            lib,
            device,
            crtc_id,
        })
    }

    /// Find a named property on `object` and return its id and value.
    fn find_property(&self, object: u32, name: &str) -> Result<Option<(u32, u64)>, Error> {
        let fd = self.device.fd();
        let props =
            unsafe { (self.lib.drmModeObjectGetProperties)(fd, object, DRM_MODE_OBJECT_PLANE) };
        if props.is_null() {
            return Err(Error::NoMatchingPlane);
        }

        let mut found = None;
        unsafe {
            let count = (*props).count_props as usize;
            for i in 0..count {
                let prop_id = *(*props).props.add(i);
                let value = *(*props).prop_values.add(i);
                let prop = (self.lib.drmModeGetProperty)(fd, prop_id);
                if prop.is_null() {
                    continue;
                }
                let matches = CStr::from_ptr((*prop).name.as_ptr())
                    .to_str()
                    .map(|n| n == name)
                    .unwrap_or(false);
                (self.lib.drmModeFreeProperty)(prop);
                if matches {
                    found = Some((prop_id, value));
                    break;
                }
            }
            (self.lib.drmModeFreeObjectProperties)(props);
        }
        Ok(found)
    }
}

impl Compositor for DrmCompositor {
    fn planes(&self) -> Result<Vec<PlaneInfo>, Error> {
        let fd = self.device.fd();
        let resources = unsafe { (self.lib.drmModeGetPlaneResources)(fd) };
        if resources.is_null() {
            return Err(Error::NoMatchingPlane);
        }

        let mut planes = Vec::new();
        unsafe {
            let count = (*resources).count_planes as usize;
            for i in 0..count {
                let plane_id = *(*resources).planes.add(i);
                let plane = (self.lib.drmModeGetPlane)(fd, plane_id);
                if plane.is_null() {
                    continue;
                }
                let formats = (0..(*plane).count_formats as usize)
                    .map(|j| FourCC::from_u32(*(*plane).formats.add(j)))
                    .collect();
                (self.lib.drmModeFreePlane)(plane);
                planes.push(PlaneInfo {
                    id: plane_id,
                    formats,
                });
            }
            (self.lib.drmModeFreePlaneResources)(resources);
        }
        Ok(planes)
    }

    fn plane_property(&self, plane: u32, name: &str) -> Result<Option<u64>, Error> {
        Ok(self.find_property(plane, name)?.map(|(_, value)| value))
    }

    fn set_plane_property(&self, plane: u32, name: &str, value: u64) -> Result<(), Error> {
        let (prop_id, _) = self
            .find_property(plane, name)?
            .ok_or(Error::NoMatchingPlane)?;
        errno_result(unsafe {
            (self.lib.drmModeObjectSetProperty)(
                self.device.fd(),
                plane,
                DRM_MODE_OBJECT_PLANE,
                prop_id,
                value,
            )
        })
        .map(drop)
    }

    fn add_framebuffer(&self, desc: &FramebufferDesc) -> Result<u32, Error> {
        let fd = self.device.fd();

        // The framebuffer interface takes four plane entries.
        let mut handles = [0u32; 4];
        let mut pitches = [0u32; 4];
        let mut offsets = [0u32; 4];
        for i in 0..desc.plane_count {
            let mut handle = 0u32;
            errno_result(unsafe {
                (self.lib.drmPrimeFDToHandle)(fd, desc.fds[i], &mut handle)
            })?;
            handles[i] = handle;
            pitches[i] = desc.pitches[i];
            offsets[i] = desc.offsets[i];
        }

        let flags = if desc.interlaced {
            DRM_MODE_FB_INTERLACED
        } else {
            0
        };
        let mut fb_id = 0u32;
        errno_result(unsafe {
            (self.lib.drmModeAddFB2)(
                fd,
                desc.width,
                desc.height,
                desc.fourcc.to_u32(),
                handles.as_ptr(),
                pitches.as_ptr(),
                offsets.as_ptr(),
                &mut fb_id,
                flags,
            )
        })?;
        Ok(fb_id)
    }

    fn remove_framebuffer(&self, fb: u32) {
        let ret = unsafe { (self.lib.drmModeRmFB)(self.device.fd(), fb) };
        if ret < 0 {
            log::warn!("removing framebuffer {} failed: {}", fb, ret);
        }
    }

    fn update_plane(&self, plane: u32, fb: u32, dst: Rect, src: Rect) -> Result<(), Error> {
        // Source coordinates are 16.16 fixed point.
        errno_result(unsafe {
            (self.lib.drmModeSetPlane)(
                self.device.fd(),
                plane,
                self.crtc_id,
                fb,
                0,
                dst.x as i32,
                dst.y as i32,
                dst.width,
                dst.height,
                src.x << 16,
                src.y << 16,
                src.width << 16,
                src.height << 16,
            )
        })
        .map(drop)
    }
}
