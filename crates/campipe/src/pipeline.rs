// SPDX-License-Identifier: Apache-2.0

//! Per-path capture pipeline driver.
//!
//! One [`PipelineConfig`] describes everything a single capture path does:
//! which sensor output it reads, the frame geometry, and the optional
//! scale, display and save stages. [`run_path`] executes one path to
//! completion; [`run_paths`] runs several on independent threads and joins
//! them, which is the whole concurrency model. Paths share no mutable
//! state, so no locks are needed.
//!
//! Error policy on the frame loop: capture, scale and the initial setup
//! are fatal to the path; display updates and the frame save are logged
//! and skipped, since a dropped output frame must not stall capture.

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use serde::Serialize;

use crate::capture::{CaptureDevice, CaptureStream, MAX_BUFFER_COUNT};
pub use crate::capture::{PathKind, Rect};
use crate::display::{self, Compositor, Framebuffer};
use crate::dump;
use crate::format::PixelFormat;
use crate::memory::{self, Allocator, HardwareBuffer};
use crate::scaler::{self, Scaler};
use crate::Error;

/// Display destination: a rectangle on screen and which of the video
/// overlay planes to use.
#[derive(Debug, Clone, Copy)]
pub struct DisplayTarget {
    pub rect: Rect,
    pub port: usize,
}

/// Scale destination geometry plus the source crop feeding it.
#[derive(Debug, Clone, Copy)]
pub struct ScaleTarget {
    pub width: u32,
    pub height: u32,
    pub crop: Rect,
}

/// Save one frame's raw planes to a file: the 1-based frame index that
/// triggers the write, and where it goes.
#[derive(Debug, Clone)]
pub struct SavePoint {
    pub frame: u32,
    pub path: PathBuf,
}

/// Full description of one capture path.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub module: u32,
    pub path: PathKind,
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub crop: Option<Rect>,
    /// Downscaled output size negotiated in the capture device itself,
    /// for paths with a built-in decimation stage.
    pub selection: Option<(u32, u32)>,
    pub display: Option<DisplayTarget>,
    pub scale: Option<ScaleTarget>,
    pub save: Option<SavePoint>,
    pub count: u32,
    pub fps: bool,
}

impl PipelineConfig {
    pub fn new(path: PathKind, width: u32, height: u32, format: PixelFormat) -> Self {
        Self {
            module: 0,
            path,
            width,
            height,
            format,
            crop: None,
            selection: None,
            display: None,
            scale: None,
            save: None,
            count: 1,
            fps: false,
        }
    }

    pub fn with_module(mut self, module: u32) -> Self {
        self.module = module;
        self
    }

    pub fn with_crop(mut self, crop: Rect) -> Self {
        self.crop = Some(crop);
        self
    }

    pub fn with_selection(mut self, width: u32, height: u32) -> Self {
        self.selection = Some((width, height));
        self
    }

    pub fn with_display(mut self, display: DisplayTarget) -> Self {
        self.display = Some(display);
        self
    }

    pub fn with_scale(mut self, scale: ScaleTarget) -> Self {
        self.scale = Some(scale);
        self
    }

    pub fn with_save(mut self, save: SavePoint) -> Self {
        self.save = Some(save);
        self
    }

    pub fn with_count(mut self, count: u32) -> Self {
        self.count = count;
        self
    }

    pub fn with_fps(mut self, fps: bool) -> Self {
        self.fps = fps;
        self
    }

    /// Short name identifying the path in logs and reports.
    pub fn label(&self) -> &'static str {
        match self.path {
            PathKind::Clipper => "clipper",
            PathKind::Decimator => "decimator",
        }
    }
}

/// Frame-rate summary for one completed path.
#[derive(Debug, Clone, Serialize)]
pub struct FpsReport {
    pub path: &'static str,
    pub frames: u64,
    pub elapsed_ms: f64,
    pub fps: f64,
}

/// The device set one path runs on, opened as a unit by a [`Backend`].
pub struct PathDevices {
    pub capture: Box<dyn CaptureDevice>,
    pub allocator: Arc<dyn Allocator>,
    pub scaler: Option<Box<dyn Scaler>>,
    pub compositor: Option<Arc<dyn Compositor>>,
}

/// Opens the devices a path needs. Implementations are shared across the
/// path threads; the devices themselves never cross a thread boundary.
pub trait Backend: Send + Sync {
    fn open_path(&self, config: &PipelineConfig) -> Result<PathDevices, Error>;
}

pub type PathResult = Result<Option<FpsReport>, Error>;

struct DisplayState {
    compositor: Arc<dyn Compositor>,
    plane: u32,
    framebuffers: Vec<Framebuffer>,
    dst: Rect,
    src: Rect,
}

/// Run one capture path to completion.
pub fn run_path(backend: &dyn Backend, config: &PipelineConfig) -> PathResult {
    let label = config.label();
    let devices = backend.open_path(config)?;

    let mut stream = CaptureStream::new(devices.capture);
    let interlaced = stream.interlaced();

    // The capture ring is sized to what the device actually emits: the
    // crop rectangle when cropping, the negotiated selection when the
    // path downscales internally, the nominal size otherwise.
    let (ring_width, ring_height) = match (config.selection, config.crop) {
        (Some((width, height)), _) => (width, height),
        (None, Some(crop)) => (crop.width, crop.height),
        (None, None) => (config.width, config.height),
    };

    // Source ring, and a second ring at the target geometry when scaling.
    // Declared before the display state so framebuffer registrations drop
    // before the buffers backing them. The source ring exists before the
    // format negotiation, which hands the driver its strides and sizes.
    let mut sources = alloc_ring(
        &devices.allocator,
        ring_width,
        ring_height,
        config.format,
        interlaced,
    )?;
    let mut targets = match &config.scale {
        Some(target) => alloc_ring(
            &devices.allocator,
            target.width,
            target.height,
            config.format,
            interlaced,
        )?,
        None => Vec::new(),
    };
    let mut scaler = devices.scaler;
    if config.scale.is_some() && scaler.is_none() {
        return Err(Error::NoDevice("no scale engine available".into()));
    }

    stream.configure(
        config.width,
        config.height,
        config.format,
        &sources[0],
        config.crop,
        config.selection,
    )?;
    stream.reserve(MAX_BUFFER_COUNT)?;
    for (slot, buffer) in sources.iter().enumerate() {
        stream.submit(slot, buffer)?;
    }

    // The displayed ring is the scale target when scaling, the capture
    // ring otherwise.
    let active: &[HardwareBuffer] = if targets.is_empty() { &sources } else { &targets };
    let display = match (&config.display, &devices.compositor) {
        (Some(target), Some(compositor)) => Some(setup_display(
            compositor, active, config.format, target, interlaced,
        )?),
        (Some(_), None) => return Err(Error::NoDevice("no display device available".into())),
        (None, _) => None,
    };

    stream.start()?;
    log::info!(
        "{}: streaming {}x{} {} for {} frame(s)",
        label,
        config.width,
        config.height,
        config.format,
        config.count
    );

    let outcome = stream_frames(
        config,
        &mut stream,
        &sources,
        &targets,
        scaler.as_deref_mut(),
        display.as_ref(),
    );

    // Draining: stop, release reservations, then free everything in
    // reverse acquisition order regardless of how the loop ended.
    if let Err(err) = stream.stop() {
        log::warn!("{}: stream stop failed: {}", label, err);
    }
    if let Err(err) = stream.reserve(0) {
        log::warn!("{}: releasing slot reservations failed: {}", label, err);
    }
    drop(display);
    while targets.pop().is_some() {}
    while sources.pop().is_some() {}

    match &outcome {
        Ok(_) => log::info!("{}: done", label),
        Err(err) => log::error!("{}: path failed: {}", label, err),
    }
    outcome
}

fn alloc_ring(
    allocator: &Arc<dyn Allocator>,
    width: u32,
    height: u32,
    format: PixelFormat,
    interlaced: bool,
) -> Result<Vec<HardwareBuffer>, Error> {
    let mut ring = Vec::with_capacity(MAX_BUFFER_COUNT);
    for _ in 0..MAX_BUFFER_COUNT {
        match memory::alloc_buffer(allocator, width, height, format, interlaced) {
            Ok(buffer) => ring.push(buffer),
            Err(err) => {
                // Drop order inside the vec unwinds the earlier buffers.
                while ring.pop().is_some() {}
                return Err(err);
            }
        }
    }
    Ok(ring)
}

fn setup_display(
    compositor: &Arc<dyn Compositor>,
    buffers: &[HardwareBuffer],
    format: PixelFormat,
    target: &DisplayTarget,
    interlaced: bool,
) -> Result<DisplayState, Error> {
    let plane = display::select_overlay_plane(compositor.as_ref(), format, target.port)?;
    let mut framebuffers = Vec::with_capacity(buffers.len());
    for buffer in buffers {
        framebuffers.push(display::register_framebuffer(compositor, buffer, interlaced)?);
    }
    let src = Rect {
        x: 0,
        y: 0,
        width: buffers[0].width(),
        height: buffers[0].height(),
    };
    Ok(DisplayState {
        compositor: Arc::clone(compositor),
        plane,
        framebuffers,
        dst: target.rect,
        src,
    })
}

fn stream_frames(
    config: &PipelineConfig,
    stream: &mut CaptureStream,
    sources: &[HardwareBuffer],
    targets: &[HardwareBuffer],
    mut scaler: Option<&mut (dyn Scaler + '_)>,
    display: Option<&DisplayState>,
) -> PathResult {
    let label = config.label();
    let mut first_frame: Option<Instant> = None;
    let mut last_frame: Option<Instant> = None;
    let mut frames: u64 = 0;

    for frame in 1..=config.count {
        let slot = stream.retrieve()?;
        frames += 1;
        let now = Instant::now();
        first_frame.get_or_insert(now);
        last_frame = Some(now);

        if let (Some(target), Some(engine)) = (&config.scale, scaler.as_deref_mut()) {
            scaler::scale(engine, &sources[slot], &targets[slot], target.crop)?;
        }

        if let Some(state) = display {
            let fb = state.framebuffers[slot].id();
            if let Err(err) = state
                .compositor
                .update_plane(state.plane, fb, state.dst, state.src)
            {
                log::warn!("{}: display update dropped on frame {}: {}", label, frame, err);
            }
        }

        if let Some(save) = &config.save {
            if save.frame == frame {
                let active = if targets.is_empty() { sources } else { targets };
                if let Err(err) = save_frame(&save.path, &active[slot]) {
                    log::warn!("{}: frame save failed: {}", label, err);
                } else {
                    log::info!("{}: saved frame {} to {}", label, frame, save.path.display());
                }
            }
        }

        if frame == config.count {
            // The final frame is consumed, not recycled.
            break;
        }
        stream.submit(slot, &sources[slot])?;
    }

    if !config.fps {
        return Ok(None);
    }
    let elapsed_ms = match (first_frame, last_frame) {
        (Some(first), Some(last)) => last.duration_since(first).as_secs_f64() * 1e3,
        _ => 0.0,
    };
    let fps = if elapsed_ms > 0.0 && frames > 1 {
        (frames - 1) as f64 * 1e3 / elapsed_ms
    } else {
        0.0
    };
    Ok(Some(FpsReport {
        path: label,
        frames,
        elapsed_ms,
        fps,
    }))
}

fn save_frame(path: &Path, buffer: &HardwareBuffer) -> Result<(), Error> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    dump::write_planes(&mut writer, buffer)
}

/// Run every configured path on its own thread and wait for all of them.
pub fn run_paths(backend: Arc<dyn Backend>, configs: Vec<PipelineConfig>) -> Vec<PathResult> {
    let handles: Vec<_> = configs
        .into_iter()
        .map(|config| {
            let backend = Arc::clone(&backend);
            thread::Builder::new()
                .name(config.label().to_string())
                .spawn(move || run_path(backend.as_ref(), &config))
        })
        .collect();

    handles
        .into_iter()
        .map(|handle| match handle {
            Ok(joined) => joined
                .join()
                .unwrap_or_else(|_| Err(Error::Busy("path thread panicked"))),
            Err(err) => Err(Error::Io(err)),
        })
        .collect()
}
