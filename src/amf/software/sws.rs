//! Scaling and colorspace conversion through FFmpeg swscale

use super::convert::{is_rgb, plane_descs, ConvertParams, Filter, Matrix};
use crate::amf::{Rect, SurfaceFormat, SurfacePlane};

use ffmpeg_next as ffmpeg;
use ffmpeg_next::format::Pixel;
use ffmpeg_next::software::scaling::{Context as SwsContext, Flags as SwsFlags};
use std::os::raw::c_int;

// SWS_CS_* from libswscale/swscale.h
const SWS_CS_ITU709: c_int = 1;
const SWS_CS_ITU601: c_int = 5;
const SWS_CS_BT2020: c_int = 9;

fn surface_to_pixel(format: SurfaceFormat) -> Option<Pixel> {
    match format {
        SurfaceFormat::Nv12 => Some(Pixel::NV12),
        SurfaceFormat::P010 => Some(Pixel::P010LE),
        SurfaceFormat::Yuv420p | SurfaceFormat::Yv12 => Some(Pixel::YUV420P),
        SurfaceFormat::Gray8 => Some(Pixel::GRAY8),
        SurfaceFormat::Yuy2 => Some(Pixel::YUYV422),
        SurfaceFormat::Bgra => Some(Pixel::BGRA),
        SurfaceFormat::Rgba => Some(Pixel::RGBA),
        SurfaceFormat::Argb => Some(Pixel::ARGB),
        SurfaceFormat::Unknown => None,
    }
}

/// Plane order swap between YV12 and swscale's YUV420P
fn plane_index(format: SurfaceFormat, i: usize) -> usize {
    match (format, i) {
        (SurfaceFormat::Yv12, 1) => 2,
        (SurfaceFormat::Yv12, 2) => 1,
        _ => i,
    }
}

/// Apply the YUV matrix and range to a YUV <-> RGB context
fn set_colorspace(
    scaler: &mut SwsContext,
    params: &ConvertParams,
    src_rgb: bool,
    dst_rgb: bool,
) -> Result<(), String> {
    let colorspace = match params.matrix {
        Matrix::Bt601 => SWS_CS_ITU601,
        Matrix::Bt709 => SWS_CS_ITU709,
        Matrix::Bt2020 => SWS_CS_BT2020,
    };
    // RGB is always full range
    let range = |rgb: bool| c_int::from(rgb || params.full_range);

    // SAFETY: the context pointer stays valid while `scaler` is borrowed and
    // the coefficient table is static libswscale data.
    let ret = unsafe {
        let table = ffmpeg::sys::sws_getCoefficients(colorspace);
        ffmpeg::sys::sws_setColorspaceDetails(
            scaler.as_mut_ptr(),
            table,
            range(src_rgb),
            table,
            range(dst_rgb),
            0,
            1 << 16,
            1 << 16,
        )
    };
    if ret < 0 {
        return Err(format!("sws_setColorspaceDetails failed with {}", ret));
    }
    Ok(())
}

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
    ffmpeg::init().map_err(|e| format!("FFmpeg init failed: {}", e))?;

    let src_pixel = surface_to_pixel(src_format)
        .ok_or_else(|| format!("Unsupported source format: {:?}", src_format))?;
    let dst_pixel = surface_to_pixel(dst_format)
        .ok_or_else(|| format!("Unsupported destination format: {:?}", dst_format))?;
    let src_descs = plane_descs(src_format).unwrap_or_default();
    let dst_descs = plane_descs(dst_format).unwrap_or_default();
    if src.len() < src_descs.len() || dst.len() < dst_descs.len() {
        return Err("Plane count mismatch".into());
    }
    let (src_w, src_h) = (crop.width as u32, crop.height as u32);

    let flags = match params.filter {
        Filter::Bilinear => SwsFlags::BILINEAR,
        Filter::Bicubic => SwsFlags::BICUBIC,
    };

    let mut scaler = SwsContext::get(src_pixel, src_w, src_h, dst_pixel, dst_w, dst_h, flags)
        .map_err(|e| format!("Failed to create scaler: {}", e))?;
    let (src_rgb, dst_rgb) = (is_rgb(src_format), is_rgb(dst_format));
    if src_rgb != dst_rgb {
        set_colorspace(&mut scaler, params, src_rgb, dst_rgb)?;
    }

    // Surfaces may be padded past the crop; copy only the window both sides hold
    let mut src_frame = ffmpeg::frame::Video::new(src_pixel, src_w, src_h);
    for (i, d) in src_descs.iter().enumerate() {
        let index = plane_index(src_format, i);
        let stride = src_frame.stride(index);
        let plane = &src[i];
        let (oy, ox) = d.origin(crop);
        let rows = d.height(src_h).min(plane.rows.saturating_sub(oy));
        let len = d
            .row_bytes(src_w)
            .min(stride)
            .min(plane.row_bytes.saturating_sub(ox));
        let data = src_frame.data_mut(index);
        for y in 0..rows {
            let start = y * stride;
            data[start..start + len].copy_from_slice(&plane.row(oy + y)[ox..ox + len]);
        }
    }

    let mut dst_frame = ffmpeg::frame::Video::new(dst_pixel, dst_w, dst_h);
    scaler
        .run(&src_frame, &mut dst_frame)
        .map_err(|e| format!("Conversion failed: {}", e))?;

    for (i, d) in dst_descs.iter().enumerate() {
        let index = plane_index(dst_format, i);
        let stride = dst_frame.stride(index);
        let plane = &mut dst[i];
        let rows = d.height(dst_h).min(plane.rows);
        let len = d.row_bytes(dst_w).min(stride).min(plane.row_bytes);
        let data = dst_frame.data(index);
        for y in 0..rows {
            let start = y * stride;
            plane.row_mut(y)[..len].copy_from_slice(&data[start..start + len]);
        }
    }

    Ok(())
}
