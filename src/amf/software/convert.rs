//! Host-memory scaling and colorspace conversion for the software converter
//!
//! A surface that keeps its layout and size is copied plane by plane, which
//! is lossless. Everything else goes through FFmpeg swscale, or through the
//! built-in converter when the crate is built without the `ffmpeg` feature.

use crate::amf::{Rect, SurfaceFormat, SurfacePlane};

#[cfg(not(feature = "ffmpeg"))]
use super::builtin as backend;
#[cfg(feature = "ffmpeg")]
use super::sws as backend;

/// Resampling filter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Filter {
    #[default]
    Bilinear,
    Bicubic,
}

/// YUV matrix coefficients
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Matrix {
    Bt601,
    #[default]
    Bt709,
    Bt2020,
}

/// Conversion settings derived from the converter properties
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ConvertParams {
    pub filter: Filter,
    pub matrix: Matrix,
    /// YUV side uses full range
    pub full_range: bool,
}

/// Per-plane sample layout
#[derive(Debug, Clone, Copy)]
pub(super) struct PlaneDesc {
    pub channels: usize,
    pub sample_bytes: usize,
    pub shift_x: u32,
    pub shift_y: u32,
}

const fn desc(channels: usize, sample_bytes: usize, shift_x: u32, shift_y: u32) -> PlaneDesc {
    PlaneDesc {
        channels,
        sample_bytes,
        shift_x,
        shift_y,
    }
}

fn plane_dim(len: u32, shift: u32) -> usize {
    ((len + (1 << shift) - 1) >> shift) as usize
}

impl PlaneDesc {
    pub fn width(&self, width: u32) -> usize {
        plane_dim(width, self.shift_x)
    }

    pub fn height(&self, height: u32) -> usize {
        plane_dim(height, self.shift_y)
    }

    pub fn row_bytes(&self, width: u32) -> usize {
        self.width(width) * self.channels * self.sample_bytes
    }

    /// (row, byte column) of the crop origin inside this plane
    pub fn origin(&self, crop: Rect) -> (usize, usize) {
        let x = (crop.x.max(0) as u32 >> self.shift_x) as usize;
        let y = (crop.y.max(0) as u32 >> self.shift_y) as usize;
        (y, x * self.channels * self.sample_bytes)
    }
}

/// Plane layouts. YUY2 is a single plane of byte pairs carrying Y and
/// alternating U/V: it copies as-is but cannot be resampled plane by plane.
pub(super) fn plane_descs(format: SurfaceFormat) -> Option<Vec<PlaneDesc>> {
    match format {
        SurfaceFormat::Nv12 => Some(vec![desc(1, 1, 0, 0), desc(2, 1, 1, 1)]),
        SurfaceFormat::P010 => Some(vec![desc(1, 2, 0, 0), desc(2, 2, 1, 1)]),
        SurfaceFormat::Yuv420p | SurfaceFormat::Yv12 => Some(vec![
            desc(1, 1, 0, 0),
            desc(1, 1, 1, 1),
            desc(1, 1, 1, 1),
        ]),
        SurfaceFormat::Gray8 => Some(vec![desc(1, 1, 0, 0)]),
        SurfaceFormat::Yuy2 => Some(vec![desc(2, 1, 0, 0)]),
        SurfaceFormat::Bgra | SurfaceFormat::Argb | SurfaceFormat::Rgba => {
            Some(vec![desc(4, 1, 0, 0)])
        }
        SurfaceFormat::Unknown => None,
    }
}

/// Formats the software converter reads and writes
pub fn is_supported(format: SurfaceFormat) -> bool {
    !matches!(format, SurfaceFormat::Unknown)
}

pub(super) fn is_rgb(format: SurfaceFormat) -> bool {
    matches!(
        format,
        SurfaceFormat::Bgra | SurfaceFormat::Argb | SurfaceFormat::Rgba
    )
}

/// Scale and convert `src` (restricted to `crop`) into `dst`.
///
/// `dst` must already be allocated for `dst_format` at `dst_w` x `dst_h`.
#[allow(clippy::too_many_arguments)]
pub fn convert(
    src: &[SurfacePlane],
    src_format: SurfaceFormat,
    crop: Rect,
    dst: &mut [SurfacePlane],
    dst_format: SurfaceFormat,
    dst_w: u32,
    dst_h: u32,
    params: &ConvertParams,
) -> Result<(), String> {
    if crop.width <= 0 || crop.height <= 0 {
        return Err(format!("Invalid source region {}x{}", crop.width, crop.height));
    }

    let same_size = crop.width as u32 == dst_w && crop.height as u32 == dst_h;
    if src_format == dst_format && same_size {
        if let Some(descs) = plane_descs(src_format) {
            return copy_planes(src, &descs, crop, dst, dst_w, dst_h);
        }
    }

    backend::convert(src, src_format, crop, dst, dst_format, dst_w, dst_h, params)
}

/// Same layout and size: copy the cropped window of every plane
fn copy_planes(
    src: &[SurfacePlane],
    descs: &[PlaneDesc],
    crop: Rect,
    dst: &mut [SurfacePlane],
    width: u32,
    height: u32,
) -> Result<(), String> {
    if src.len() < descs.len() || dst.len() < descs.len() {
        return Err("Plane count mismatch".into());
    }

    for (i, d) in descs.iter().enumerate() {
        let (rows, len) = (d.height(height), d.row_bytes(width));
        let (oy, ox) = d.origin(crop);
        if oy + rows > src[i].rows || ox + len > src[i].row_bytes {
            return Err(format!("Source plane {} too small", i));
        }
        if rows > dst[i].rows || len > dst[i].row_bytes {
            return Err(format!("Destination plane {} too small", i));
        }
        for y in 0..rows {
            dst[i].row_mut(y)[..len].copy_from_slice(&src[i].row(oy + y)[ox..ox + len]);
        }
    }
    Ok(())
}
