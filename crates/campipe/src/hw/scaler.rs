// SPDX-License-Identifier: Apache-2.0

//! Synchronous hardware scaler over `libnx_scaler.so`.

use std::ffi::c_int;

use campipe_sys::{nx_scaler_context, nx_scaler_rect, ScalerLibrary};

use crate::errno_result;
use crate::scaler::{ScaleJob, Scaler};
use crate::Error;

pub struct HwScaler {
    lib: &'static ScalerLibrary,
    fd: c_int,
}

impl HwScaler {
    pub fn open() -> Result<Self, Error> {
        let lib = campipe_sys::scaler()?;
        let fd = unsafe { (lib.scaler_open)() };
        if fd < 0 {
            return Err(Error::NoDevice("scaler device".into()));
        }
        Ok(Self { lib, fd })
    }
}

impl Scaler for HwScaler {
    fn run(&mut self, job: &ScaleJob) -> Result<(), Error> {
        let mut ctx = nx_scaler_context {
            crop: nx_scaler_rect {
                x: job.crop.x as i32,
                y: job.crop.y as i32,
                width: job.crop.width as i32,
                height: job.crop.height as i32,
            },
            src_plane_num: job.src.plane_count as u32,
            src_width: job.src.width,
            src_height: job.src.height,
            src_code: job.src.code,
            src_fds: job.src.fds,
            src_stride: job.src.strides,
            dst_plane_num: job.dst.plane_count as u32,
            dst_width: job.dst.width,
            dst_height: job.dst.height,
            dst_code: job.dst.code,
            dst_fds: job.dst.fds,
            dst_stride: job.dst.strides,
        };
        errno_result(unsafe { (self.lib.nx_scaler_run)(self.fd, &mut ctx) }).map(drop)
    }
}

impl Drop for HwScaler {
    fn drop(&mut self) {
        unsafe { (self.lib.nx_scaler_close)(self.fd) };
    }
}
