//! Frame <-> accelerator surface bridge
//!
//! Every surface this module creates ends up with exactly one owner: the
//! scaler (inputs), a [`FrameBuffer`] (hardware outputs) or nobody once the
//! planes have been downloaded (host outputs).

use crate::amf::{
    MemoryType, NativeTexture, Surface, SurfaceFormat, AMF_TEXTURE_ARRAY_INDEX_GUID,
};
use crate::error::{Error, Result};
use crate::frame::{Frame, FrameBuffer, HwPayload, Plane};
use crate::hwcontext::{DeviceContext, FramePoolRef};
use crate::types::PixelFormat;

use tracing::trace;

/// Wrap or upload `frame` as an accelerator surface
pub fn to_surface(context: &DeviceContext, frame: &Frame) -> Result<Surface> {
    let native = context.context();

    let surface = match &frame.hw {
        Some(HwPayload::D3d11 { texture, index }) => {
            let slice = i32::try_from(*index).map_err(|_| {
                Error::Internal(format!("Texture array index {} out of range", index))
            })?;
            // Tell the runtime which array slice to read
            texture.set_private_data(&AMF_TEXTURE_ARRAY_INDEX_GUID, &slice.to_le_bytes());
            let surface = native.create_surface_from_dx11_native(texture).map_err(|status| {
                Error::ResourceExhausted(format!(
                    "CreateSurfaceFromDX11Native() failed with error {}",
                    status
                ))
            })?;
            surface.set_crop(0, 0, frame.width as i32, frame.height as i32);
            surface
        }
        Some(HwPayload::Amf(buffer)) => {
            let surface = buffer.surface().ok_or_else(|| {
                Error::Internal("Input frame buffer was already released".into())
            })?;
            surface.set_crop(0, 0, frame.width as i32, frame.height as i32);
            surface
        }
        Some(HwPayload::Dxva2(dx9)) => {
            let surface = native.create_surface_from_dx9_native(dx9).map_err(|status| {
                Error::ResourceExhausted(format!(
                    "CreateSurfaceFromDX9Native() failed with error {}",
                    status
                ))
            })?;
            surface.set_crop(0, 0, frame.width as i32, frame.height as i32);
            surface
        }
        None => upload(context, frame)?,
    };

    surface.set_pts(frame.pts);
    Ok(surface)
}

/// Allocate a host surface and copy the frame planes into it
fn upload(context: &DeviceContext, frame: &Frame) -> Result<Surface> {
    let format = SurfaceFormat::from_pixel_format(frame.format);
    if format == SurfaceFormat::Unknown {
        return Err(Error::UnsupportedFormat(format!(
            "Pixel format {} has no accelerator surface format",
            frame.format
        )));
    }

    let surface = context
        .context()
        .alloc_surface(MemoryType::Host, format, frame.width, frame.height)
        .map_err(|status| {
            Error::ResourceExhausted(format!("AllocSurface() failed with error {}", status))
        })?;

    let geometry = frame.format.plane_geometry(frame.width, frame.height);
    if frame.planes.len() < geometry.len() {
        return Err(Error::UnsupportedFormat(format!(
            "Frame has {} planes, {} needs {}",
            frame.planes.len(),
            frame.format,
            geometry.len()
        )));
    }

    let store = surface.planes();
    let mut dst = store.lock();
    for (i, (row_bytes, rows)) in geometry.into_iter().enumerate() {
        let src = &frame.planes[i];
        let needed = src.linesize * rows.saturating_sub(1) + row_bytes;
        if src.linesize < row_bytes || src.data.len() < needed {
            return Err(Error::UnsupportedFormat(format!(
                "Plane {} of {} frame is too small",
                i, frame.format
            )));
        }
        let plane = &mut dst[i];
        let len = row_bytes.min(plane.row_bytes);
        for y in 0..rows.min(plane.rows) {
            plane.row_mut(y)[..len].copy_from_slice(src.row(y, len));
        }
    }
    drop(dst);

    Ok(surface)
}

/// Turn a scaler output surface into a frame of the output pool
pub fn to_frame(pool: &FramePoolRef, surface: Surface) -> Result<Frame> {
    match pool.format() {
        PixelFormat::Amf => {
            let mut frame = pool.get_buffer();
            frame.hw = Some(HwPayload::Amf(FrameBuffer::with_release(surface, |s| {
                trace!("Released output surface pts={}", s.pts());
            })));
            Ok(frame)
        }
        PixelFormat::D3d11 | PixelFormat::Dxva2Vld => {
            let payload = match (surface.memory_type(), surface.native()) {
                (MemoryType::Dx11, Some(NativeTexture::D3d11(texture))) => HwPayload::D3d11 {
                    texture: texture.clone(),
                    index: 0,
                },
                (MemoryType::Dx9, Some(NativeTexture::Dx9(dx9))) => HwPayload::Dxva2(dx9.clone()),
                (memory, _) => {
                    return Err(Error::UnsupportedFormat(format!(
                        "Unsupported memory type {:?} for {} output",
                        memory,
                        pool.format()
                    )))
                }
            };
            let mut frame = pool.get_buffer();
            frame.hw = Some(payload);
            frame.backing = Some(FrameBuffer::with_release(surface, |s| {
                trace!("Released output texture surface pts={}", s.pts());
            }));
            Ok(frame)
        }
        format if !format.is_hardware() => download(pool, surface),
        format => Err(Error::UnsupportedFormat(format!(
            "Unsupported output pool format {}",
            format
        ))),
    }
}

/// Copy the surface planes into a host frame; the surface is released here
fn download(pool: &FramePoolRef, surface: Surface) -> Result<Frame> {
    let format = pool.format();
    if SurfaceFormat::from_pixel_format(format) != surface.format() {
        return Err(Error::UnsupportedFormat(format!(
            "Surface format {:?} does not match output format {}",
            surface.format(),
            format
        )));
    }

    let (width, height) = (surface.width(), surface.height());
    let mut frame = Frame::empty(format, width, height);
    let store = surface.planes();
    let src = store.lock();
    for (i, (row_bytes, rows)) in format.plane_geometry(width, height).into_iter().enumerate() {
        let plane = src.get(i).ok_or_else(|| {
            Error::UnsupportedFormat(format!("Surface is missing plane {}", i))
        })?;
        let mut data = vec![0u8; row_bytes * rows];
        let len = row_bytes.min(plane.row_bytes);
        for y in 0..rows.min(plane.rows) {
            data[y * row_bytes..y * row_bytes + len].copy_from_slice(&plane.row(y)[..len]);
        }
        frame.planes.push(Plane::new(data, row_bytes));
    }
    frame.hw_frames = Some(pool.clone());
    Ok(frame)
}
