// SPDX-License-Identifier: Apache-2.0

use campipe::pipeline::Rect;

use crate::error::CliError;

/// Parse a size string in "WxH" or "W,H" format
pub fn parse_size(s: &str) -> Result<(u32, u32), CliError> {
    let (width_str, height_str) = s
        .split_once('x')
        .or_else(|| s.split_once(','))
        .ok_or_else(|| {
            CliError::InvalidArgs(format!("invalid size (expected WxH or W,H): {}", s))
        })?;

    let width = width_str
        .trim()
        .parse::<u32>()
        .map_err(|_| CliError::InvalidArgs(format!("invalid width in size: {}", s)))?;
    let height = height_str
        .trim()
        .parse::<u32>()
        .map_err(|_| CliError::InvalidArgs(format!("invalid height in size: {}", s)))?;

    if width == 0 || height == 0 {
        return Err(CliError::InvalidArgs(format!(
            "size dimensions must be positive: {}",
            s
        )));
    }
    Ok((width, height))
}

/// Parse a crop rectangle in "left,top,width,height" format
pub fn parse_rect(s: &str) -> Result<Rect, CliError> {
    let parts: Vec<&str> = s.split(',').collect();
    if parts.len() != 4 {
        return Err(CliError::InvalidArgs(format!(
            "invalid rectangle (expected left,top,width,height): {}",
            s
        )));
    }
    let mut values = [0u32; 4];
    for (value, part) in values.iter_mut().zip(&parts) {
        *value = part
            .trim()
            .parse::<u32>()
            .map_err(|_| CliError::InvalidArgs(format!("invalid rectangle value: {}", s)))?;
    }
    if values[2] == 0 || values[3] == 0 {
        return Err(CliError::InvalidArgs(format!(
            "rectangle width and height must be positive: {}",
            s
        )));
    }
    Ok(Rect {
        x: values[0],
        y: values[1],
        width: values[2],
        height: values[3],
    })
}

/// Check that `crop` lies within a `width` x `height` image
pub fn check_crop_bounds(width: u32, height: u32, crop: &Rect) -> Result<(), CliError> {
    if crop.x + crop.width > width || crop.y + crop.height > height {
        return Err(CliError::InvalidArgs(format!(
            "crop {},{},{},{} exceeds {}x{} bounds",
            crop.x, crop.y, crop.width, crop.height, width, height
        )));
    }
    Ok(())
}
