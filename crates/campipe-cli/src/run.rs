// SPDX-License-Identifier: Apache-2.0

use std::path::PathBuf;
use std::sync::Arc;

use clap::Args as ClapArgs;

use campipe::format::PixelFormat;
use campipe::hw::HwBackend;
use campipe::pipeline::{
    run_paths, DisplayTarget, FpsReport, PathKind, PipelineConfig, Rect, SavePoint, ScaleTarget,
};

use crate::error::CliError;
use crate::utils;

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum FormatArg {
    Yuv420,
    Yvu420,
    Yuv422,
    Yuv444,
    Yuyv,
}

impl FormatArg {
    fn pixel_format(self) -> PixelFormat {
        match self {
            FormatArg::Yuv420 => PixelFormat::Yuv420,
            FormatArg::Yvu420 => PixelFormat::Yvu420,
            FormatArg::Yuv422 => PixelFormat::Yuv422P,
            FormatArg::Yuv444 => PixelFormat::Yuv444,
            FormatArg::Yuyv => PixelFormat::Yuyv,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum DisplayArg {
    Clipper,
    Decimator,
}

#[derive(ClapArgs, Debug)]
pub struct Args {
    /// Sensor module index
    #[arg(short, long, default_value = "0")]
    module: u32,

    /// Enable the clipper (cropping) capture path
    #[arg(long)]
    clipper: bool,

    /// Enable the decimator (downscaling) capture path
    #[arg(long)]
    decimator: bool,

    /// Input pixel format
    #[arg(short, long, value_enum, default_value = "yuv420")]
    format: FormatArg,

    /// Input size in WxH format
    #[arg(short, long)]
    input: String,

    /// Capture crop as left,top,width,height
    #[arg(short, long)]
    crop: Option<String>,

    /// Composite frames of the given path onto a display overlay
    #[arg(short, long, value_enum)]
    display: Option<DisplayArg>,

    /// Video overlay port used for display
    #[arg(long, default_value = "0")]
    port: usize,

    /// Scale output size in WxH format (with --scale-crop uses the
    /// hardware scaler; alone on the decimator path shrinks the capture)
    #[arg(short, long)]
    scale: Option<String>,

    /// Scaler source crop as left,top,width,height
    #[arg(short = 'C', long)]
    scale_crop: Option<String>,

    /// Number of frames to capture per path
    #[arg(short = 'r', long, default_value = "1")]
    count: u32,

    /// Save the N-th captured frame to <path>.yuv (1-based)
    #[arg(short = 'S', long)]
    save: Option<u32>,

    /// Measure and report the capture frame rate
    #[arg(short = 'F', long)]
    fps: bool,
}

/// Everything derived from the raw arguments after validation.
struct Plan {
    module: u32,
    clipper: bool,
    decimator: bool,
    format: PixelFormat,
    width: u32,
    height: u32,
    crop: Option<Rect>,
    display: Option<DisplayArg>,
    port: usize,
    scale: Option<ScaleTarget>,
    selection: Option<(u32, u32)>,
    count: u32,
    save: Option<u32>,
    fps: bool,
}

fn validate(args: &Args) -> Result<Plan, CliError> {
    let (width, height) = utils::parse_size(&args.input)?;

    let mut clipper = args.clipper;
    let decimator = args.decimator;
    if !clipper && !decimator {
        clipper = true;
    }

    let crop = match &args.crop {
        Some(spec) => {
            let rect = utils::parse_rect(spec)?;
            utils::check_crop_bounds(width, height, &rect)?;
            Some(rect)
        }
        None => None,
    };

    // The scaler source is the cropped image when cropping.
    let (base_width, base_height) = match crop {
        Some(rect) => (rect.width, rect.height),
        None => (width, height),
    };

    let scale_size = args.scale.as_deref().map(utils::parse_size).transpose()?;
    let scale_crop = args.scale_crop.as_deref().map(utils::parse_rect).transpose()?;

    let mut scale = None;
    let mut selection = None;
    match (scale_size, scale_crop) {
        (Some((dst_width, dst_height)), Some(rect)) => {
            utils::check_crop_bounds(base_width, base_height, &rect)?;
            scale = Some(ScaleTarget {
                width: dst_width,
                height: dst_height,
                crop: rect,
            });
        }
        (Some((dst_width, dst_height)), None) => {
            if decimator {
                if dst_width > base_width || dst_height > base_height {
                    return Err(CliError::InvalidArgs(format!(
                        "decimator cannot upscale {}x{} to {}x{}",
                        base_width, base_height, dst_width, dst_height
                    )));
                }
                selection = Some((dst_width, dst_height));
            } else {
                log::warn!("--scale without --scale-crop only applies to the decimator path");
            }
        }
        (None, Some(_)) => {
            log::warn!("--scale-crop has no effect without --scale");
        }
        (None, None) => {}
    }

    let format = args.format.pixel_format();
    match args.format {
        FormatArg::Yvu420 => {
            if args.display.is_some() {
                return Err(CliError::InvalidArgs(
                    "display does not support the YVU420 format".to_string(),
                ));
            }
            if scale.is_some() {
                return Err(CliError::InvalidArgs(
                    "scaler does not support the YVU420 format".to_string(),
                ));
            }
        }
        FormatArg::Yuv422 | FormatArg::Yuv444 => {
            if scale.is_some() {
                return Err(CliError::InvalidArgs(format!(
                    "scaler does not support the {:?} format",
                    args.format
                )));
            }
        }
        FormatArg::Yuyv => {
            if decimator {
                return Err(CliError::InvalidArgs(
                    "decimator does not support the YUYV format".to_string(),
                ));
            }
            if scale.is_some() {
                return Err(CliError::InvalidArgs(
                    "scaler does not support the YUYV format".to_string(),
                ));
            }
        }
        FormatArg::Yuv420 => {}
    }

    match args.display {
        Some(DisplayArg::Clipper) if !clipper => {
            return Err(CliError::InvalidArgs(
                "clipper display requested but the clipper path is not enabled".to_string(),
            ));
        }
        Some(DisplayArg::Decimator) if !decimator => {
            return Err(CliError::InvalidArgs(
                "decimator display requested but the decimator path is not enabled".to_string(),
            ));
        }
        _ => {}
    }

    let save = match args.save {
        Some(0) => {
            return Err(CliError::InvalidArgs(
                "save frame index is 1-based".to_string(),
            ));
        }
        Some(frame) if frame > args.count => {
            log::warn!(
                "save frame {} is beyond the repeat count, saving frame {} instead",
                frame,
                args.count
            );
            Some(args.count)
        }
        other => other,
    };

    Ok(Plan {
        module: args.module,
        clipper,
        decimator,
        format,
        width,
        height,
        crop,
        display: args.display,
        port: args.port,
        scale,
        selection,
        count: args.count,
        save,
        fps: args.fps,
    })
}

fn path_config(plan: &Plan, kind: PathKind) -> PipelineConfig {
    let mut config = PipelineConfig::new(kind, plan.width, plan.height, plan.format)
        .with_module(plan.module)
        .with_count(plan.count)
        .with_fps(plan.fps);

    if let Some(rect) = plan.crop {
        config = config.with_crop(rect);
    }
    if let Some(target) = plan.scale {
        config = config.with_scale(target);
    }
    // Without the scaler the decimator shrinks frames in the device.
    if kind == PathKind::Decimator && plan.scale.is_none() {
        if let Some((width, height)) = plan.selection {
            config = config.with_selection(width, height);
        }
    }

    let displayed = matches!(
        (plan.display, kind),
        (Some(DisplayArg::Clipper), PathKind::Clipper)
            | (Some(DisplayArg::Decimator), PathKind::Decimator)
    );
    if displayed {
        // Composited at the origin, at the size the path emits.
        let (width, height) = output_size(plan, kind);
        config = config.with_display(DisplayTarget {
            rect: Rect {
                x: 0,
                y: 0,
                width,
                height,
            },
            port: plan.port,
        });
    }

    if let Some(frame) = plan.save {
        let path = PathBuf::from(format!("{}.yuv", config.label()));
        config = config.with_save(SavePoint { frame, path });
    }

    config
}

/// The frame size a path emits after crop, selection and scaling.
fn output_size(plan: &Plan, kind: PathKind) -> (u32, u32) {
    if let Some(target) = plan.scale {
        return (target.width, target.height);
    }
    if kind == PathKind::Decimator {
        if let Some(selection) = plan.selection {
            return selection;
        }
    }
    match plan.crop {
        Some(rect) => (rect.width, rect.height),
        None => (plan.width, plan.height),
    }
}

fn print_reports(reports: &[FpsReport], json: bool) -> Result<(), CliError> {
    if reports.is_empty() {
        return Ok(());
    }
    if json {
        let out = serde_json::to_string_pretty(reports)
            .map_err(|e| CliError::General(format!("failed to serialize report: {}", e)))?;
        println!("{}", out);
    } else {
        for report in reports {
            println!(
                "{}: {} frames in {:.1} ms, {:.2} fps",
                report.path, report.frames, report.elapsed_ms, report.fps
            );
        }
    }
    Ok(())
}

pub fn execute(args: Args, json: bool) -> Result<(), CliError> {
    log::debug!("run parameters: {:?}", args);
    let plan = validate(&args)?;

    let mut configs = Vec::new();
    if plan.clipper {
        configs.push(path_config(&plan, PathKind::Clipper));
    }
    if plan.decimator {
        configs.push(path_config(&plan, PathKind::Decimator));
    }

    let results = run_paths(Arc::new(HwBackend), configs);

    let mut reports = Vec::new();
    let mut first_error = None;
    for result in results {
        match result {
            Ok(Some(report)) => reports.push(report),
            Ok(None) => {}
            Err(err) => {
                // Every failed path already logged its own diagnostic.
                first_error.get_or_insert(err);
            }
        }
    }
    print_reports(&reports, json)?;

    match first_error {
        Some(err) => Err(err.into()),
        None => Ok(()),
    }
}
