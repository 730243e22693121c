//! Pure-Rust scaler used when the crate is built without swscale
//!
//! Same layout in and out: every plane is resampled on its own. Different
//! layouts: unpack to a full-resolution 4-channel picture, resample, convert
//! between YUV and RGB, pack into the output layout.

use super::convert::{is_rgb, plane_descs, ConvertParams, Filter, Matrix, PlaneDesc};
use crate::amf::{Rect, SurfaceFormat, SurfacePlane};

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
    if src_format == dst_format && src_format != SurfaceFormat::Yuy2 {
        if let Some(descs) = plane_descs(src_format) {
            return resample_planes(src, &descs, crop, dst, dst_w, dst_h, params.filter);
        }
    }

    let picture = unpack(src, src_format, crop)?;
    let picture = picture.resample(dst_w as usize, dst_h as usize, params.filter);
    let picture = picture.to_family(is_rgb(dst_format), params);
    pack(&picture, dst, dst_format)
}

/// (Kr, Kb)
fn coefficients(matrix: Matrix) -> (f32, f32) {
    match matrix {
        Matrix::Bt601 => (0.299, 0.114),
        Matrix::Bt709 => (0.2126, 0.0722),
        Matrix::Bt2020 => (0.2627, 0.0593),
    }
}

fn resample_planes(
    src: &[SurfacePlane],
    descs: &[PlaneDesc],
    crop: Rect,
    dst: &mut [SurfacePlane],
    dst_w: u32,
    dst_h: u32,
    filter: Filter,
) -> Result<(), String> {
    if src.len() < descs.len() || dst.len() < descs.len() {
        return Err("Plane count mismatch".into());
    }
    let (src_w, src_h) = (crop.width as u32, crop.height as u32);

    for (i, d) in descs.iter().enumerate() {
        let (sw, sh) = (d.width(src_w), d.height(src_h));
        let (dw, dh) = (d.width(dst_w), d.height(dst_h));
        let origin = d.origin(crop);

        if origin.0 + sh > src[i].rows || origin.1 + d.row_bytes(src_w) > src[i].row_bytes {
            return Err(format!("Source plane {} too small", i));
        }
        if dh > dst[i].rows || d.row_bytes(dst_w) > dst[i].row_bytes {
            return Err(format!("Destination plane {} too small", i));
        }

        let samples = read_samples(&src[i], origin, sw, sh, d);
        let scaled = resample(&samples, sw, sh, d.channels, dw, dh, filter);
        write_samples(&mut dst[i], &scaled, dw, dh, d);
    }
    Ok(())
}

fn read_samples(
    plane: &SurfacePlane,
    (oy, ox): (usize, usize),
    w: usize,
    h: usize,
    d: &PlaneDesc,
) -> Vec<f32> {
    let mut out = Vec::with_capacity(w * h * d.channels);
    for y in 0..h {
        let row = &plane.row(oy + y)[ox..];
        for s in 0..w * d.channels {
            out.push(match d.sample_bytes {
                2 => u16::from_le_bytes([row[s * 2], row[s * 2 + 1]]) as f32,
                _ => row[s] as f32,
            });
        }
    }
    out
}

fn write_samples(plane: &mut SurfacePlane, samples: &[f32], w: usize, h: usize, d: &PlaneDesc) {
    for y in 0..h {
        let row = plane.row_mut(y);
        for s in 0..w * d.channels {
            let v = samples[y * w * d.channels + s];
            match d.sample_bytes {
                2 => {
                    let bytes = (v.round().clamp(0.0, 65535.0) as u16).to_le_bytes();
                    row[s * 2] = bytes[0];
                    row[s * 2 + 1] = bytes[1];
                }
                _ => row[s] = v.round().clamp(0.0, 255.0) as u8,
            }
        }
    }
}

/// Filter taps for one output coordinate
struct Taps {
    start: isize,
    weights: Vec<f32>,
}

fn cubic(x: f32) -> f32 {
    // Catmull-Rom (a = -0.5)
    let a = -0.5;
    let x = x.abs();
    if x < 1.0 {
        (a + 2.0) * x * x * x - (a + 3.0) * x * x + 1.0
    } else if x < 2.0 {
        a * x * x * x - 5.0 * a * x * x + 8.0 * a * x - 4.0 * a
    } else {
        0.0
    }
}

fn taps(src_len: usize, dst_len: usize, filter: Filter) -> Vec<Taps> {
    let scale = src_len as f32 / dst_len as f32;
    (0..dst_len)
        .map(|i| {
            let center = (i as f32 + 0.5) * scale - 0.5;
            let base = center.floor();
            let t = center - base;
            match filter {
                Filter::Bilinear => Taps {
                    start: base as isize,
                    weights: vec![1.0 - t, t],
                },
                Filter::Bicubic => Taps {
                    start: base as isize - 1,
                    weights: vec![cubic(1.0 + t), cubic(t), cubic(1.0 - t), cubic(2.0 - t)],
                },
            }
        })
        .collect()
}

/// Separable resample of interleaved samples
fn resample(
    src: &[f32],
    sw: usize,
    sh: usize,
    channels: usize,
    dw: usize,
    dh: usize,
    filter: Filter,
) -> Vec<f32> {
    let clamp = |v: isize, len: usize| v.clamp(0, len as isize - 1) as usize;

    let htaps = taps(sw, dw, filter);
    let mut horizontal = vec![0.0f32; dw * sh * channels];
    for y in 0..sh {
        for (x, tap) in htaps.iter().enumerate() {
            for c in 0..channels {
                let mut acc = 0.0;
                for (k, w) in tap.weights.iter().enumerate() {
                    let sx = clamp(tap.start + k as isize, sw);
                    acc += w * src[(y * sw + sx) * channels + c];
                }
                horizontal[(y * dw + x) * channels + c] = acc;
            }
        }
    }

    let vtaps = taps(sh, dh, filter);
    let mut out = vec![0.0f32; dw * dh * channels];
    for (y, tap) in vtaps.iter().enumerate() {
        for x in 0..dw {
            for c in 0..channels {
                let mut acc = 0.0;
                for (k, w) in tap.weights.iter().enumerate() {
                    let sy = clamp(tap.start + k as isize, sh);
                    acc += w * horizontal[(sy * dw + x) * channels + c];
                }
                out[(y * dw + x) * channels + c] = acc;
            }
        }
    }
    out
}

/// Full-resolution picture, 8-bit scale, channels YUVA or RGBA
struct Picture {
    width: usize,
    height: usize,
    rgb: bool,
    px: Vec<[f32; 4]>,
}

impl Picture {
    fn resample(self, width: usize, height: usize, filter: Filter) -> Picture {
        if width == self.width && height == self.height {
            return self;
        }
        let flat: Vec<f32> = self.px.iter().flat_map(|p| p.iter().copied()).collect();
        let scaled = resample(&flat, self.width, self.height, 4, width, height, filter);
        Picture {
            width,
            height,
            rgb: self.rgb,
            px: scaled
                .chunks_exact(4)
                .map(|c| [c[0], c[1], c[2], c[3]])
                .collect(),
        }
    }

    fn to_family(mut self, rgb: bool, params: &ConvertParams) -> Picture {
        if self.rgb == rgb {
            return self;
        }
        for p in self.px.iter_mut() {
            let (a, b, c) = if rgb {
                yuv_to_rgb(p[0], p[1], p[2], params.matrix, params.full_range)
            } else {
                rgb_to_yuv(p[0], p[1], p[2], params.matrix, params.full_range)
            };
            p[0] = a;
            p[1] = b;
            p[2] = c;
        }
        self.rgb = rgb;
        self
    }
}

fn yuv_to_rgb(y: f32, u: f32, v: f32, matrix: Matrix, full: bool) -> (f32, f32, f32) {
    let (kr, kb) = coefficients(matrix);
    let kg = 1.0 - kr - kb;
    let (yn, un, vn) = if full {
        (y / 255.0, (u - 128.0) / 255.0, (v - 128.0) / 255.0)
    } else {
        ((y - 16.0) / 219.0, (u - 128.0) / 224.0, (v - 128.0) / 224.0)
    };
    let r = yn + 2.0 * (1.0 - kr) * vn;
    let b = yn + 2.0 * (1.0 - kb) * un;
    let g = (yn - kr * r - kb * b) / kg;
    (r * 255.0, g * 255.0, b * 255.0)
}

fn rgb_to_yuv(r: f32, g: f32, b: f32, matrix: Matrix, full: bool) -> (f32, f32, f32) {
    let (kr, kb) = coefficients(matrix);
    let kg = 1.0 - kr - kb;
    let (r, g, b) = (r / 255.0, g / 255.0, b / 255.0);
    let yn = kr * r + kg * g + kb * b;
    let un = (b - yn) / (2.0 * (1.0 - kb));
    let vn = (r - yn) / (2.0 * (1.0 - kr));
    if full {
        (yn * 255.0, un * 255.0 + 128.0, vn * 255.0 + 128.0)
    } else {
        (16.0 + 219.0 * yn, 128.0 + 224.0 * un, 128.0 + 224.0 * vn)
    }
}

fn unpack(src: &[SurfacePlane], format: SurfaceFormat, crop: Rect) -> Result<Picture, String> {
    let width = crop.width as usize;
    let height = crop.height as usize;
    let (ox, oy) = (crop.x.max(0) as usize, crop.y.max(0) as usize);
    let needed = format.plane_geometry(1, 1).len();
    if needed == 0 || src.len() < needed {
        return Err(format!("Cannot read {:?} surface", format));
    }
    if oy + height > src[0].rows {
        return Err("Source region exceeds the surface".into());
    }

    let p10 = |plane: &SurfacePlane, x: usize, y: usize| {
        let row = plane.row(y);
        u16::from_le_bytes([row[x * 2], row[x * 2 + 1]]) as f32 / 256.0
    };

    let mut px = Vec::with_capacity(width * height);
    for y in 0..height {
        let sy = y + oy;
        for x in 0..width {
            let sx = x + ox;
            let value = match format {
                SurfaceFormat::Nv12 => {
                    let uv = src[1].row(sy / 2);
                    [
                        src[0].row(sy)[sx] as f32,
                        uv[(sx / 2) * 2] as f32,
                        uv[(sx / 2) * 2 + 1] as f32,
                        255.0,
                    ]
                }
                SurfaceFormat::P010 => [
                    p10(&src[0], sx, sy),
                    p10(&src[1], (sx / 2) * 2, sy / 2),
                    p10(&src[1], (sx / 2) * 2 + 1, sy / 2),
                    255.0,
                ],
                SurfaceFormat::Yuv420p | SurfaceFormat::Yv12 => {
                    let (u, v) = if format == SurfaceFormat::Yv12 { (2, 1) } else { (1, 2) };
                    [
                        src[0].row(sy)[sx] as f32,
                        src[u].row(sy / 2)[sx / 2] as f32,
                        src[v].row(sy / 2)[sx / 2] as f32,
                        255.0,
                    ]
                }
                SurfaceFormat::Gray8 => [src[0].row(sy)[sx] as f32, 128.0, 128.0, 255.0],
                SurfaceFormat::Yuy2 => {
                    let row = src[0].row(sy);
                    let pair = (sx / 2) * 4;
                    [
                        row[pair + (sx % 2) * 2] as f32,
                        row[pair + 1] as f32,
                        row[pair + 3] as f32,
                        255.0,
                    ]
                }
                SurfaceFormat::Bgra => {
                    let p = &src[0].row(sy)[sx * 4..sx * 4 + 4];
                    [p[2] as f32, p[1] as f32, p[0] as f32, p[3] as f32]
                }
                SurfaceFormat::Rgba => {
                    let p = &src[0].row(sy)[sx * 4..sx * 4 + 4];
                    [p[0] as f32, p[1] as f32, p[2] as f32, p[3] as f32]
                }
                SurfaceFormat::Argb => {
                    let p = &src[0].row(sy)[sx * 4..sx * 4 + 4];
                    [p[1] as f32, p[2] as f32, p[3] as f32, p[0] as f32]
                }
                SurfaceFormat::Unknown => return Err("Cannot read unknown surface format".into()),
            };
            px.push(value);
        }
    }

    Ok(Picture {
        width,
        height,
        rgb: is_rgb(format),
        px,
    })
}

fn pack(picture: &Picture, dst: &mut [SurfacePlane], format: SurfaceFormat) -> Result<(), String> {
    let (w, h) = (picture.width, picture.height);
    let geometry = format.plane_geometry(w as u32, h as u32);
    if geometry.is_empty() || dst.len() < geometry.len() {
        return Err(format!("Cannot write {:?} surface", format));
    }
    for (i, (row_bytes, rows)) in geometry.iter().enumerate() {
        if dst[i].rows < *rows || dst[i].row_bytes < *row_bytes {
            return Err(format!("Destination plane {} too small", i));
        }
    }

    let at = |x: usize, y: usize| &picture.px[y.min(h - 1) * w + x.min(w - 1)];
    let u8c = |v: f32| v.round().clamp(0.0, 255.0) as u8;
    let u10 = |v: f32| (((v * 4.0).round().clamp(0.0, 1023.0) as u16) << 6).to_le_bytes();
    // 2x2 chroma average
    let chroma = |cx: usize, cy: usize, c: usize| {
        let (x, y) = (cx * 2, cy * 2);
        (at(x, y)[c] + at(x + 1, y)[c] + at(x, y + 1)[c] + at(x + 1, y + 1)[c]) / 4.0
    };
    let (cw, ch) = ((w + 1) / 2, (h + 1) / 2);

    match format {
        SurfaceFormat::Nv12 | SurfaceFormat::P010 => {
            let wide = format == SurfaceFormat::P010;
            for y in 0..h {
                let row = dst[0].row_mut(y);
                for x in 0..w {
                    if wide {
                        row[x * 2..x * 2 + 2].copy_from_slice(&u10(at(x, y)[0]));
                    } else {
                        row[x] = u8c(at(x, y)[0]);
                    }
                }
            }
            for cy in 0..ch {
                let row = dst[1].row_mut(cy);
                for cx in 0..cw {
                    let (u, v) = (chroma(cx, cy, 1), chroma(cx, cy, 2));
                    if wide {
                        row[cx * 4..cx * 4 + 2].copy_from_slice(&u10(u));
                        row[cx * 4 + 2..cx * 4 + 4].copy_from_slice(&u10(v));
                    } else {
                        row[cx * 2] = u8c(u);
                        row[cx * 2 + 1] = u8c(v);
                    }
                }
            }
        }
        SurfaceFormat::Yuv420p | SurfaceFormat::Yv12 => {
            let (u, v) = if format == SurfaceFormat::Yv12 { (2, 1) } else { (1, 2) };
            for y in 0..h {
                let row = dst[0].row_mut(y);
                for x in 0..w {
                    row[x] = u8c(at(x, y)[0]);
                }
            }
            for cy in 0..ch {
                for cx in 0..cw {
                    dst[u].row_mut(cy)[cx] = u8c(chroma(cx, cy, 1));
                    dst[v].row_mut(cy)[cx] = u8c(chroma(cx, cy, 2));
                }
            }
        }
        SurfaceFormat::Gray8 => {
            for y in 0..h {
                let row = dst[0].row_mut(y);
                for x in 0..w {
                    row[x] = u8c(at(x, y)[0]);
                }
            }
        }
        SurfaceFormat::Yuy2 => {
            for y in 0..h {
                let row = dst[0].row_mut(y);
                for cx in 0..cw {
                    let (a, b) = (at(cx * 2, y), at(cx * 2 + 1, y));
                    row[cx * 4] = u8c(a[0]);
                    row[cx * 4 + 1] = u8c((a[1] + b[1]) / 2.0);
                    row[cx * 4 + 2] = u8c(b[0]);
                    row[cx * 4 + 3] = u8c((a[2] + b[2]) / 2.0);
                }
            }
        }
        SurfaceFormat::Bgra | SurfaceFormat::Rgba | SurfaceFormat::Argb => {
            let order: [usize; 4] = match format {
                SurfaceFormat::Bgra => [2, 1, 0, 3],
                SurfaceFormat::Rgba => [0, 1, 2, 3],
                _ => [3, 0, 1, 2],
            };
            for y in 0..h {
                let row = dst[0].row_mut(y);
                for x in 0..w {
                    let p = at(x, y);
                    for (k, &c) in order.iter().enumerate() {
                        row[x * 4 + k] = u8c(p[c]);
                    }
                }
            }
        }
        SurfaceFormat::Unknown => return Err("Cannot write unknown surface format".into()),
    }
    Ok(())
}
