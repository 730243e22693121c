//! Pipeline video frames
//!
//! A [`Frame`] is either host memory (planes) or a hardware reference
//! ([`HwPayload`]). Hardware frames also carry the frame pool they belong to.

use crate::amf::{D3d11Texture, Dx9Surface, Surface};
use crate::hwcontext::FramePoolRef;
use crate::types::{
    ColorPrimaries, ColorRange, ColorSpace, PixelFormat, Rational, TransferCharacteristic,
};

use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// One plane of host pixel data
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plane {
    pub data: Vec<u8>,
    /// Bytes per row including padding
    pub linesize: usize,
}

impl Plane {
    pub fn new(data: Vec<u8>, linesize: usize) -> Self {
        Self { data, linesize }
    }

    pub fn row(&self, y: usize, len: usize) -> &[u8] {
        let start = y * self.linesize;
        &self.data[start..start + len]
    }
}

type ReleaseFn = Box<dyn Fn(&Surface) + Send + Sync>;

struct BufferInner {
    surface: Mutex<Option<Surface>>,
    owns_native: AtomicBool,
    on_release: Option<ReleaseFn>,
}

impl BufferInner {
    fn release(&self) {
        if self.owns_native.swap(false, Ordering::AcqRel) {
            let surface = self.surface.lock().take();
            if let (Some(surface), Some(hook)) = (surface, &self.on_release) {
                hook(&surface);
            }
        }
    }
}

impl Drop for BufferInner {
    fn drop(&mut self) {
        self.release();
    }
}

/// Reference-counted buffer holding one accelerator surface reference.
///
/// The reference is dropped exactly once, either on an explicit
/// [`FrameBuffer::release`] or when the last clone goes away. The optional
/// callback runs at that point.
#[derive(Clone)]
pub struct FrameBuffer {
    inner: Arc<BufferInner>,
}

impl FrameBuffer {
    pub fn new(surface: Surface) -> Self {
        Self::build(surface, None)
    }

    /// Buffer whose release also notifies `on_release`
    pub fn with_release<F>(surface: Surface, on_release: F) -> Self
    where
        F: Fn(&Surface) + Send + Sync + 'static,
    {
        Self::build(surface, Some(Box::new(on_release)))
    }

    fn build(surface: Surface, on_release: Option<ReleaseFn>) -> Self {
        Self {
            inner: Arc::new(BufferInner {
                surface: Mutex::new(Some(surface)),
                owns_native: AtomicBool::new(true),
                on_release,
            }),
        }
    }

    /// New reference to the held surface, `None` once released
    pub fn surface(&self) -> Option<Surface> {
        self.inner.surface.lock().clone()
    }

    /// Whether the surface reference has not been released yet
    pub fn is_live(&self) -> bool {
        self.inner.owns_native.load(Ordering::Acquire)
    }

    /// Drop the surface reference now. Later calls and the final drop are no-ops.
    pub fn release(&self) {
        self.inner.release();
    }

    pub fn ref_count(&self) -> usize {
        Arc::strong_count(&self.inner)
    }
}

impl std::fmt::Debug for FrameBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameBuffer")
            .field("surface", &*self.inner.surface.lock())
            .field("live", &self.is_live())
            .finish()
    }
}

/// Hardware reference carried by a frame
#[derive(Debug, Clone)]
pub enum HwPayload {
    /// Accelerator surface (`amf` frames)
    Amf(FrameBuffer),
    /// D3D11 texture array plus slice index
    D3d11 { texture: D3d11Texture, index: usize },
    /// DXVA2 surface
    Dxva2(Dx9Surface),
}

/// Video frame
#[derive(Debug, Clone)]
pub struct Frame {
    pub format: PixelFormat,
    pub width: u32,
    pub height: u32,
    pub pts: i64,
    pub sample_aspect_ratio: Rational,
    pub color_range: ColorRange,
    pub colorspace: ColorSpace,
    pub color_primaries: ColorPrimaries,
    pub color_trc: TransferCharacteristic,
    pub metadata: BTreeMap<String, String>,
    /// Host planes; empty for hardware frames
    pub planes: Vec<Plane>,
    pub hw: Option<HwPayload>,
    /// Keeps the accelerator surface behind a native payload alive
    pub backing: Option<FrameBuffer>,
    /// Pool the hardware payload belongs to
    pub hw_frames: Option<FramePoolRef>,
}

impl Frame {
    /// Frame without any pixel storage
    pub fn empty(format: PixelFormat, width: u32, height: u32) -> Self {
        Self {
            format,
            width,
            height,
            pts: 0,
            sample_aspect_ratio: Rational::UNSET,
            color_range: ColorRange::default(),
            colorspace: ColorSpace::default(),
            color_primaries: ColorPrimaries::default(),
            color_trc: TransferCharacteristic::default(),
            metadata: BTreeMap::new(),
            planes: Vec::new(),
            hw: None,
            backing: None,
            hw_frames: None,
        }
    }

    /// Zeroed host frame with tightly packed planes
    pub fn new_host(format: PixelFormat, width: u32, height: u32) -> Self {
        let mut frame = Self::empty(format, width, height);
        frame.planes = format
            .plane_geometry(width, height)
            .into_iter()
            .map(|(row_bytes, rows)| Plane::new(vec![0u8; row_bytes * rows], row_bytes))
            .collect();
        frame
    }

    /// Host frame from tightly packed bytes, planes back to back
    pub fn from_packed(format: PixelFormat, width: u32, height: u32, data: &[u8]) -> Option<Self> {
        let geometry = format.plane_geometry(width, height);
        let total: usize = geometry.iter().map(|(b, r)| b * r).sum();
        if geometry.is_empty() || data.len() < total {
            return None;
        }
        let mut frame = Self::empty(format, width, height);
        let mut offset = 0;
        for (row_bytes, rows) in geometry {
            let len = row_bytes * rows;
            frame.planes.push(Plane::new(data[offset..offset + len].to_vec(), row_bytes));
            offset += len;
        }
        Some(frame)
    }

    /// Host planes as tightly packed bytes
    pub fn to_packed(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for (plane, (row_bytes, rows)) in self
            .planes
            .iter()
            .zip(self.format.plane_geometry(self.width, self.height))
        {
            for y in 0..rows {
                out.extend_from_slice(plane.row(y, row_bytes));
            }
        }
        out
    }

    pub fn is_hardware(&self) -> bool {
        self.hw.is_some()
    }

    /// Copy timing, aspect, color and metadata fields from `src`
    pub fn copy_props(&mut self, src: &Frame) {
        self.pts = src.pts;
        self.sample_aspect_ratio = src.sample_aspect_ratio;
        self.color_range = src.color_range;
        self.colorspace = src.colorspace;
        self.color_primaries = src.color_primaries;
        self.color_trc = src.color_trc;
        self.metadata = src.metadata.clone();
    }
}
