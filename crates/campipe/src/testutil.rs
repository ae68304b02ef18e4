// SPDX-License-Identifier: Apache-2.0

//! Mock hardware for the unit tests. Nothing here touches a device; the
//! mocks account for every handle and ownership transition so leaks and
//! double-queues fail tests instead of corrupting state.

use std::collections::HashMap;
use std::ptr::NonNull;
use std::sync::{Arc, Mutex};

use crate::capture::{CaptureDevice, Rect};
use crate::display::{
    Compositor, FramebufferDesc, PlaneInfo, ALPHABLEND_PROP, PLANE_TYPE_OVERLAY,
    VIDEO_PRIORITY_PROP,
};
use crate::format::{FourCC, PixelFormat};
use crate::geometry::MAX_PLANES;
use crate::memory::{Allocator, Region};
use crate::pipeline::{Backend, PathDevices, PipelineConfig};
use crate::scaler::{ScaleJob, Scaler};
use crate::Error;

/// Counting allocator backed by plain heap memory.
///
/// Every region gets a unique fake descriptor and a zeroed CPU mapping,
/// and `outstanding()` reports how many regions are currently live.
pub(crate) struct MockAllocator {
    state: Mutex<MockAllocatorState>,
}

struct MockAllocatorState {
    next_handle: u32,
    alloc_calls: usize,
    fail_after: Option<usize>,
    regions: HashMap<u32, Box<[u8]>>,
}

impl MockAllocator {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(MockAllocatorState {
                next_handle: 1,
                alloc_calls: 0,
                fail_after: None,
                regions: HashMap::new(),
            }),
        })
    }

    /// Make every alloc call after the first `n` fail.
    pub fn fail_after(&self, n: usize) {
        self.state.lock().unwrap().fail_after = Some(n);
    }

    pub fn outstanding(&self) -> usize {
        self.state.lock().unwrap().regions.len()
    }

    pub fn alloc_calls(&self) -> usize {
        self.state.lock().unwrap().alloc_calls
    }
}

impl Allocator for MockAllocator {
    fn alloc(&self, size: u32) -> Result<Region, Error> {
        let mut state = self.state.lock().unwrap();
        state.alloc_calls += 1;
        if let Some(limit) = state.fail_after {
            if state.alloc_calls > limit {
                return Err(Error::AllocationFailure);
            }
        }
        let handle = state.next_handle;
        state.next_handle += 1;

        let mut memory = vec![0u8; size as usize].into_boxed_slice();
        let vaddr = NonNull::new(memory.as_mut_ptr());
        state.regions.insert(handle, memory);

        Ok(Region {
            handle,
            // Fake descriptor, unique per region, never a real fd.
            dma_fd: 1_000 + handle as i32,
            vaddr,
            size,
        })
    }

    fn release(&self, region: &Region) {
        let mut state = self.state.lock().unwrap();
        let removed = state.regions.remove(&region.handle);
        assert!(removed.is_some(), "double release of handle {}", region.handle);
    }
}

/// Call counters shared between a capture device mock and the test that
/// inspects it after the stream wrapper has consumed the device.
#[derive(Debug, Default)]
pub(crate) struct CaptureCounters {
    pub submits: usize,
    pub streaming_submits: usize,
    pub retrieves: usize,
    pub format_dims: (u32, u32),
    pub format_strides: [u32; MAX_PLANES],
    pub format_sizes: [u32; MAX_PLANES],
}

/// Capture device returning a scripted sequence of slot indices.
///
/// The mock keeps its own per-slot ledger and asserts that every queue
/// and dequeue is a legal ownership handover, independently of the
/// bookkeeping in the stream wrapper under test.
pub(crate) struct MockCaptureDevice {
    slot_order: Vec<usize>,
    next: usize,
    queued: Vec<bool>,
    checked: bool,
    started: bool,
    counters: Arc<Mutex<CaptureCounters>>,
}

impl MockCaptureDevice {
    pub fn new(slot_order: Vec<usize>) -> Self {
        Self::with_counters(slot_order, Arc::new(Mutex::new(CaptureCounters::default())))
    }

    /// A mock with the per-slot ownership assertions disabled, for tests
    /// that deliberately script an illegal slot sequence.
    pub fn unchecked(slot_order: Vec<usize>) -> Self {
        let mut device = Self::new(slot_order);
        device.checked = false;
        device
    }

    pub fn with_counters(
        slot_order: Vec<usize>,
        counters: Arc<Mutex<CaptureCounters>>,
    ) -> Self {
        Self {
            slot_order,
            next: 0,
            queued: Vec::new(),
            checked: true,
            started: false,
            counters,
        }
    }
}

impl CaptureDevice for MockCaptureDevice {
    fn set_format(
        &mut self,
        width: u32,
        height: u32,
        _format: PixelFormat,
        strides: &[u32; MAX_PLANES],
        sizes: &[u32; MAX_PLANES],
    ) -> Result<(), Error> {
        let mut counters = self.counters.lock().unwrap();
        counters.format_dims = (width, height);
        counters.format_strides = *strides;
        counters.format_sizes = *sizes;
        Ok(())
    }

    fn set_crop(&mut self, _rect: Rect) -> Result<(), Error> {
        Ok(())
    }

    fn set_selection(&mut self, _width: u32, _height: u32) -> Result<(), Error> {
        Ok(())
    }

    fn reserve_slots(&mut self, count: usize) -> Result<(), Error> {
        self.queued = vec![false; count];
        Ok(())
    }

    fn submit(
        &mut self,
        slot: usize,
        descriptors: usize,
        _fds: &[i32; MAX_PLANES],
        sizes: &[u32; MAX_PLANES],
    ) -> Result<(), Error> {
        assert!(slot < self.queued.len(), "submit to unreserved slot {}", slot);
        assert!(descriptors >= 1 && descriptors <= MAX_PLANES);
        assert!(sizes[0] > 0);
        if self.checked {
            assert!(!self.queued[slot], "slot {} already queued", slot);
        }
        self.queued[slot] = true;
        let mut counters = self.counters.lock().unwrap();
        counters.submits += 1;
        if self.started {
            counters.streaming_submits += 1;
        }
        Ok(())
    }

    fn retrieve(&mut self) -> Result<usize, Error> {
        let slot = self
            .slot_order
            .get(self.next)
            .copied()
            .ok_or_else(|| Error::Io(std::io::Error::from(std::io::ErrorKind::TimedOut)))?;
        self.next += 1;
        if self.checked {
            assert!(
                self.queued.get(slot).copied().unwrap_or(false),
                "device does not hold slot {}",
                slot
            );
        }
        if let Some(held) = self.queued.get_mut(slot) {
            *held = false;
        }
        self.counters.lock().unwrap().retrieves += 1;
        Ok(slot)
    }

    fn start(&mut self) -> Result<(), Error> {
        self.started = true;
        Ok(())
    }

    fn stop(&mut self) -> Result<(), Error> {
        self.started = false;
        Ok(())
    }

    fn interlaced(&self) -> bool {
        false
    }
}

/// Scale engine recording every job into shared state, so a test can
/// still inspect the jobs after handing the scaler to a pipeline.
#[derive(Clone)]
pub(crate) struct MockScaler {
    jobs: Arc<Mutex<Vec<ScaleJob>>>,
    fail: bool,
}

impl MockScaler {
    pub fn new() -> Self {
        Self {
            jobs: Arc::new(Mutex::new(Vec::new())),
            fail: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            jobs: Arc::new(Mutex::new(Vec::new())),
            fail: true,
        }
    }

    pub fn jobs(&self) -> Vec<ScaleJob> {
        self.jobs.lock().unwrap().clone()
    }
}

impl Scaler for MockScaler {
    fn run(&mut self, job: &ScaleJob) -> Result<(), Error> {
        if self.fail {
            return Err(Error::Io(std::io::Error::from(
                std::io::ErrorKind::BrokenPipe,
            )));
        }
        self.jobs.lock().unwrap().push(*job);
        Ok(())
    }
}

/// A scripted compositor plane.
#[derive(Debug, Clone)]
pub(crate) struct MockPlane {
    id: u32,
    plane_type: u64,
    video: bool,
    formats: Vec<FourCC>,
}

impl MockPlane {
    pub fn primary(id: u32) -> Self {
        Self {
            id,
            plane_type: campipe_sys::DRM_PLANE_TYPE_PRIMARY as u64,
            video: false,
            formats: Vec::new(),
        }
    }

    pub fn rgb_overlay(id: u32) -> Self {
        Self {
            id,
            plane_type: PLANE_TYPE_OVERLAY,
            video: false,
            formats: Vec::new(),
        }
    }

    pub fn video_overlay(id: u32, formats: &[PixelFormat]) -> Self {
        Self {
            id,
            plane_type: PLANE_TYPE_OVERLAY,
            video: true,
            formats: formats.iter().filter_map(|f| f.drm_fourcc()).collect(),
        }
    }
}

/// Compositor mock with a shared interior so clones observe each other.
#[derive(Clone)]
pub(crate) struct MockCompositor {
    state: Arc<Mutex<MockCompositorState>>,
}

struct MockCompositorState {
    planes: Vec<MockPlane>,
    properties: HashMap<(u32, String), u64>,
    next_fb: u32,
    framebuffers: HashMap<u32, FramebufferDesc>,
    last_desc: Option<FramebufferDesc>,
    updates: Vec<(u32, u32)>,
    fail_updates: bool,
}

impl MockCompositor {
    pub fn new(planes: Vec<MockPlane>) -> Self {
        Self {
            state: Arc::new(Mutex::new(MockCompositorState {
                planes,
                properties: HashMap::new(),
                next_fb: 1,
                framebuffers: HashMap::new(),
                last_desc: None,
                updates: Vec::new(),
                fail_updates: false,
            })),
        }
    }

    pub fn fail_updates(&self) {
        self.state.lock().unwrap().fail_updates = true;
    }

    pub fn property(&self, plane: u32, name: &str) -> Option<u64> {
        self.state
            .lock()
            .unwrap()
            .properties
            .get(&(plane, name.to_string()))
            .copied()
    }

    pub fn framebuffer_count(&self) -> usize {
        self.state.lock().unwrap().framebuffers.len()
    }

    pub fn last_desc(&self) -> Option<FramebufferDesc> {
        self.state.lock().unwrap().last_desc
    }

    pub fn update_count(&self) -> usize {
        self.state.lock().unwrap().updates.len()
    }
}

impl Compositor for MockCompositor {
    fn planes(&self) -> Result<Vec<PlaneInfo>, Error> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .planes
            .iter()
            .map(|p| PlaneInfo {
                id: p.id,
                formats: p.formats.clone(),
            })
            .collect())
    }

    fn plane_property(&self, plane: u32, name: &str) -> Result<Option<u64>, Error> {
        let state = self.state.lock().unwrap();
        let info = state.planes.iter().find(|p| p.id == plane);
        match (info, name) {
            (Some(p), "type") => Ok(Some(p.plane_type)),
            // Only the RGB planes blend; its presence is what the
            // selection logic keys on.
            (Some(p), ALPHABLEND_PROP) if !p.video => Ok(Some(1)),
            (Some(p), VIDEO_PRIORITY_PROP) if p.video => Ok(Some(
                state
                    .properties
                    .get(&(plane, name.to_string()))
                    .copied()
                    .unwrap_or(0),
            )),
            (Some(_), _) => Ok(None),
            (None, _) => Err(Error::NoMatchingPlane),
        }
    }

    fn set_plane_property(&self, plane: u32, name: &str, value: u64) -> Result<(), Error> {
        self.state
            .lock()
            .unwrap()
            .properties
            .insert((plane, name.to_string()), value);
        Ok(())
    }

    fn add_framebuffer(&self, desc: &FramebufferDesc) -> Result<u32, Error> {
        let mut state = self.state.lock().unwrap();
        let id = state.next_fb;
        state.next_fb += 1;
        state.framebuffers.insert(id, *desc);
        state.last_desc = Some(*desc);
        Ok(id)
    }

    fn remove_framebuffer(&self, fb: u32) {
        let removed = self.state.lock().unwrap().framebuffers.remove(&fb);
        assert!(removed.is_some(), "double removal of framebuffer {}", fb);
    }

    fn update_plane(&self, plane: u32, fb: u32, _dst: Rect, _src: Rect) -> Result<(), Error> {
        let mut state = self.state.lock().unwrap();
        if state.fail_updates {
            return Err(Error::Io(std::io::Error::from(
                std::io::ErrorKind::WouldBlock,
            )));
        }
        assert!(
            state.framebuffers.contains_key(&fb),
            "update with unregistered framebuffer {}",
            fb
        );
        state.updates.push((plane, fb));
        Ok(())
    }
}

/// Backend wiring all the mocks together for full pipeline runs, keeping
/// shared handles so tests can inspect what each stage saw afterwards.
pub(crate) struct MockBackend {
    slot_order: Vec<usize>,
    pub allocator: Arc<MockAllocator>,
    pub compositor: MockCompositor,
    pub scaler: MockScaler,
    pub counters: Arc<Mutex<CaptureCounters>>,
    with_compositor: bool,
    with_scaler: bool,
}

impl MockBackend {
    pub fn new(slot_order: Vec<usize>) -> Self {
        Self {
            slot_order,
            allocator: MockAllocator::new(),
            compositor: MockCompositor::new(vec![MockPlane::video_overlay(
                12,
                &[PixelFormat::Yuv420, PixelFormat::Yuyv],
            )]),
            scaler: MockScaler::new(),
            counters: Arc::new(Mutex::new(CaptureCounters::default())),
            with_compositor: false,
            with_scaler: false,
        }
    }

    pub fn with_compositor(mut self) -> Self {
        self.with_compositor = true;
        self
    }

    pub fn with_scaler(mut self) -> Self {
        self.with_scaler = true;
        self
    }
}

impl Backend for MockBackend {
    fn open_path(&self, _config: &PipelineConfig) -> Result<PathDevices, Error> {
        Ok(PathDevices {
            capture: Box::new(MockCaptureDevice::with_counters(
                self.slot_order.clone(),
                Arc::clone(&self.counters),
            )),
            allocator: Arc::clone(&self.allocator) as Arc<dyn Allocator>,
            scaler: self
                .with_scaler
                .then(|| Box::new(self.scaler.clone()) as Box<dyn Scaler>),
            compositor: self
                .with_compositor
                .then(|| Arc::new(self.compositor.clone()) as Arc<dyn Compositor>),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[should_panic(expected = "already queued")]
    fn capture_mock_rejects_double_queue() {
        let mut device = MockCaptureDevice::new(vec![]);
        device.reserve_slots(2).unwrap();
        device.submit(0, 1, &[0; MAX_PLANES], &[1; MAX_PLANES]).unwrap();
        device.submit(0, 1, &[0; MAX_PLANES], &[1; MAX_PLANES]).unwrap();
    }

    #[test]
    #[should_panic(expected = "does not hold")]
    fn capture_mock_rejects_dequeue_of_unqueued_slot() {
        let mut device = MockCaptureDevice::new(vec![1]);
        device.reserve_slots(2).unwrap();
        device.submit(0, 1, &[0; MAX_PLANES], &[1; MAX_PLANES]).unwrap();
        device.retrieve().unwrap();
    }
}
