// SPDX-License-Identifier: Apache-2.0

//! Capture device frontend over `libnx_v4l2.so`.

use std::ffi::{c_int, CStr};
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};

use campipe_sys::{V4l2Library, NX_CLIPPER_VIDEO, NX_DECIMATOR_VIDEO};

use crate::capture::{CaptureDevice, PathKind, Rect};
use crate::errno_result;
use crate::format::PixelFormat;
use crate::geometry::MAX_PLANES;
use crate::Error;

fn path_selector(kind: PathKind) -> c_int {
    match kind {
        PathKind::Clipper => NX_CLIPPER_VIDEO,
        PathKind::Decimator => NX_DECIMATOR_VIDEO,
    }
}

/// One open capture path on one sensor module.
pub struct V4l2Capture {
    lib: &'static V4l2Library,
    fd: OwnedFd,
    selector: c_int,
    interlaced: bool,
}

impl V4l2Capture {
    /// Open the given path of sensor `module`.
    pub fn open(kind: PathKind, module: u32) -> Result<Self, Error> {
        let lib = campipe_sys::v4l2()?;
        let selector = path_selector(kind);
        let fd = unsafe { (lib.nx_v4l2_open_device)(selector, module as c_int) };
        if fd < 0 {
            let path = unsafe { (lib.nx_v4l2_get_video_path)(selector, module as c_int) };
            let name = if path.is_null() {
                String::from("unknown video node")
            } else {
                unsafe { CStr::from_ptr(path) }.to_string_lossy().into_owned()
            };
            return Err(Error::NoDevice(name));
        }
        let interlaced = unsafe { (lib.nx_v4l2_is_interlaced_camera)(module as c_int) } != 0;
        Ok(Self {
            lib,
            // SAFETY: the library returned a freshly opened descriptor we
            // now own.
            fd: unsafe { OwnedFd::from_raw_fd(fd) },
            selector,
            interlaced,
        })
    }

    fn fd(&self) -> c_int {
        self.fd.as_raw_fd()
    }
}

impl CaptureDevice for V4l2Capture {
    fn set_format(
        &mut self,
        width: u32,
        height: u32,
        format: PixelFormat,
        strides: &[u32; MAX_PLANES],
        sizes: &[u32; MAX_PLANES],
    ) -> Result<(), Error> {
        let ret = unsafe {
            (self.lib.nx_v4l2_set_fmt)(
                self.fd(),
                format.fourcc().to_u32(),
                width,
                height,
                format.plane_count() as u32,
                strides.as_ptr(),
                sizes.as_ptr(),
            )
        };
        errno_result(ret).map(drop)
    }

    fn set_crop(&mut self, rect: Rect) -> Result<(), Error> {
        let ret = unsafe {
            (self.lib.nx_v4l2_set_crop)(
                self.fd(),
                self.selector,
                rect.x,
                rect.y,
                rect.width,
                rect.height,
            )
        };
        errno_result(ret).map(drop)
    }

    fn set_selection(&mut self, width: u32, height: u32) -> Result<(), Error> {
        let ret =
            unsafe { (self.lib.nx_v4l2_set_selection)(self.fd(), self.selector, width, height) };
        errno_result(ret).map(drop)
    }

    fn reserve_slots(&mut self, count: usize) -> Result<(), Error> {
        let ret = unsafe { (self.lib.nx_v4l2_reqbuf)(self.fd(), self.selector, count as c_int) };
        errno_result(ret).map(drop)
    }

    fn submit(
        &mut self,
        slot: usize,
        descriptors: usize,
        fds: &[i32; MAX_PLANES],
        sizes: &[u32; MAX_PLANES],
    ) -> Result<(), Error> {
        let sizes: [c_int; MAX_PLANES] = [
            sizes[0] as c_int,
            sizes[1] as c_int,
            sizes[2] as c_int,
        ];
        let ret = unsafe {
            (self.lib.nx_v4l2_qbuf)(
                self.fd(),
                self.selector,
                descriptors as c_int,
                slot as c_int,
                fds.as_ptr(),
                sizes.as_ptr(),
            )
        };
        errno_result(ret).map(drop)
    }

    fn retrieve(&mut self) -> Result<usize, Error> {
        let mut index: c_int = 0;
        let ret = unsafe { (self.lib.nx_v4l2_dqbuf)(self.fd(), self.selector, 1, &mut index) };
        errno_result(ret)?;
        Ok(index as usize)
    }

    fn start(&mut self) -> Result<(), Error> {
        let ret = unsafe { (self.lib.nx_v4l2_streamon)(self.fd(), self.selector) };
        errno_result(ret).map(drop)
    }

    fn stop(&mut self) -> Result<(), Error> {
        let ret = unsafe { (self.lib.nx_v4l2_streamoff)(self.fd(), self.selector) };
        errno_result(ret).map(drop)
    }

    fn interlaced(&self) -> bool {
        self.interlaced
    }
}
