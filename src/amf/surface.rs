//! Vendor-refcounted surfaces and native texture handles
//!
//! A [`Surface`] clone is an `Acquire`, dropping a clone is a `Release`.
//! The back-end that created a surface may install a release hook that runs
//! exactly once, when the last reference goes away.

use super::{AmfResult, MemoryType, Status, SurfaceFormat};

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

/// Row pitch alignment used for host surface allocations
const PITCH_ALIGN: usize = 64;

/// One plane of pixel data
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SurfacePlane {
    pub data: Vec<u8>,
    /// Bytes between the start of two rows (`GetHPitch`)
    pub pitch: usize,
    /// Meaningful bytes per row
    pub row_bytes: usize,
    pub rows: usize,
}

impl SurfacePlane {
    /// Allocate a zeroed plane with an aligned pitch
    pub fn alloc(row_bytes: usize, rows: usize) -> Self {
        let pitch = row_bytes.div_ceil(PITCH_ALIGN).max(1) * PITCH_ALIGN;
        Self {
            data: vec![0u8; pitch * rows],
            pitch,
            row_bytes,
            rows,
        }
    }

    /// Wrap tightly packed rows
    pub fn packed(data: Vec<u8>, row_bytes: usize, rows: usize) -> Self {
        Self {
            data,
            pitch: row_bytes,
            row_bytes,
            rows,
        }
    }

    pub fn row(&self, y: usize) -> &[u8] {
        let start = y * self.pitch;
        &self.data[start..start + self.row_bytes]
    }

    pub fn row_mut(&mut self, y: usize) -> &mut [u8] {
        let start = y * self.pitch;
        &mut self.data[start..start + self.row_bytes]
    }
}

/// Allocate all planes for a surface of the given layout
pub fn alloc_planes(format: SurfaceFormat, width: u32, height: u32) -> AmfResult<Vec<SurfacePlane>> {
    if width == 0 || height == 0 {
        return Err(Status::INVALID_RESOLUTION);
    }
    let geometry = format.plane_geometry(width, height);
    if geometry.is_empty() {
        return Err(Status::SURFACE_FORMAT_NOT_SUPPORTED);
    }
    Ok(geometry
        .into_iter()
        .map(|(row_bytes, rows)| SurfacePlane::alloc(row_bytes, rows))
        .collect())
}

/// Shared plane storage; texture-backed surfaces alias the texture's store
pub type PlaneStore = Arc<Mutex<Vec<SurfacePlane>>>;

/// Crop rectangle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

/// COM-style GUID used for texture private data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Guid {
    pub data1: u32,
    pub data2: u16,
    pub data3: u16,
    pub data4: [u8; 8],
}

/// Private-data tag telling the runtime which texture array slice to read
pub const AMF_TEXTURE_ARRAY_INDEX_GUID: Guid = Guid {
    data1: 0x2811_5527,
    data2: 0xe7c3,
    data3: 0x4b66,
    data4: [0x99, 0xd3, 0x4f, 0x2a, 0xe6, 0xb4, 0x7f, 0xaf],
};

struct TextureInner {
    handle: u64,
    format: SurfaceFormat,
    width: u32,
    height: u32,
    slices: Vec<PlaneStore>,
    private_data: Mutex<HashMap<Guid, Vec<u8>>>,
}

/// D3D11 texture array owned by an upstream stage
#[derive(Clone)]
pub struct D3d11Texture {
    inner: Arc<TextureInner>,
}

impl D3d11Texture {
    pub fn new(
        handle: u64,
        format: SurfaceFormat,
        width: u32,
        height: u32,
        slices: Vec<Vec<SurfacePlane>>,
    ) -> Self {
        Self {
            inner: Arc::new(TextureInner {
                handle,
                format,
                width,
                height,
                slices: slices.into_iter().map(|p| Arc::new(Mutex::new(p))).collect(),
                private_data: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn handle(&self) -> u64 {
        self.inner.handle
    }

    pub fn format(&self) -> SurfaceFormat {
        self.inner.format
    }

    pub fn width(&self) -> u32 {
        self.inner.width
    }

    pub fn height(&self) -> u32 {
        self.inner.height
    }

    pub fn array_size(&self) -> usize {
        self.inner.slices.len()
    }

    pub fn slice(&self, index: usize) -> Option<PlaneStore> {
        self.inner.slices.get(index).cloned()
    }

    /// `ID3D11Resource::SetPrivateData`
    pub fn set_private_data(&self, guid: &Guid, data: &[u8]) {
        self.inner.private_data.lock().insert(*guid, data.to_vec());
    }

    pub fn private_data(&self, guid: &Guid) -> Option<Vec<u8>> {
        self.inner.private_data.lock().get(guid).cloned()
    }

    /// Array slice recorded under [`AMF_TEXTURE_ARRAY_INDEX_GUID`], 0 if unset
    pub fn tagged_array_index(&self) -> usize {
        self.private_data(&AMF_TEXTURE_ARRAY_INDEX_GUID)
            .and_then(|bytes| bytes.get(..4).map(|b| [b[0], b[1], b[2], b[3]]))
            .map(|b| i32::from_le_bytes(b).max(0) as usize)
            .unwrap_or(0)
    }
}

impl std::fmt::Debug for D3d11Texture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("D3d11Texture")
            .field("handle", &self.inner.handle)
            .field("format", &self.inner.format)
            .field("size", &(self.inner.width, self.inner.height))
            .field("array_size", &self.inner.slices.len())
            .finish()
    }
}

struct Dx9Inner {
    handle: u64,
    format: SurfaceFormat,
    width: u32,
    height: u32,
    planes: PlaneStore,
}

/// `IDirect3DSurface9` owned by an upstream stage
#[derive(Clone)]
pub struct Dx9Surface {
    inner: Arc<Dx9Inner>,
}

impl Dx9Surface {
    pub fn new(
        handle: u64,
        format: SurfaceFormat,
        width: u32,
        height: u32,
        planes: Vec<SurfacePlane>,
    ) -> Self {
        Self {
            inner: Arc::new(Dx9Inner {
                handle,
                format,
                width,
                height,
                planes: Arc::new(Mutex::new(planes)),
            }),
        }
    }

    pub fn handle(&self) -> u64 {
        self.inner.handle
    }

    pub fn format(&self) -> SurfaceFormat {
        self.inner.format
    }

    pub fn width(&self) -> u32 {
        self.inner.width
    }

    pub fn height(&self) -> u32 {
        self.inner.height
    }

    pub fn planes(&self) -> PlaneStore {
        self.inner.planes.clone()
    }
}

impl std::fmt::Debug for Dx9Surface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dx9Surface")
            .field("handle", &self.inner.handle)
            .field("format", &self.inner.format)
            .field("size", &(self.inner.width, self.inner.height))
            .finish()
    }
}

/// Native object a surface wraps without copying
#[derive(Debug, Clone)]
pub enum NativeTexture {
    D3d11(D3d11Texture),
    Dx9(Dx9Surface),
}

impl NativeTexture {
    pub fn handle(&self) -> u64 {
        match self {
            NativeTexture::D3d11(t) => t.handle(),
            NativeTexture::Dx9(s) => s.handle(),
        }
    }
}

/// Hook run when the last reference to a surface is released
pub type ReleaseHook = Box<dyn Fn() + Send + Sync>;

/// Everything a back-end needs to build a surface
pub struct SurfaceParts {
    pub memory: MemoryType,
    pub format: SurfaceFormat,
    pub width: u32,
    pub height: u32,
    pub planes: PlaneStore,
    pub native: Option<NativeTexture>,
}

struct SurfaceInner {
    memory: MemoryType,
    format: SurfaceFormat,
    width: u32,
    height: u32,
    planes: PlaneStore,
    native: Option<NativeTexture>,
    crop: Mutex<Rect>,
    pts: AtomicI64,
    on_release: Option<ReleaseHook>,
}

impl Drop for SurfaceInner {
    fn drop(&mut self) {
        if let Some(hook) = self.on_release.take() {
            hook();
        }
    }
}

/// Accelerator surface
#[derive(Clone)]
pub struct Surface {
    inner: Arc<SurfaceInner>,
}

impl Surface {
    pub fn from_parts(parts: SurfaceParts, on_release: Option<ReleaseHook>) -> Self {
        let crop = Rect {
            x: 0,
            y: 0,
            width: parts.width as i32,
            height: parts.height as i32,
        };
        Self {
            inner: Arc::new(SurfaceInner {
                memory: parts.memory,
                format: parts.format,
                width: parts.width,
                height: parts.height,
                planes: parts.planes,
                native: parts.native,
                crop: Mutex::new(crop),
                pts: AtomicI64::new(0),
                on_release,
            }),
        }
    }

    pub fn memory_type(&self) -> MemoryType {
        self.inner.memory
    }

    pub fn format(&self) -> SurfaceFormat {
        self.inner.format
    }

    pub fn width(&self) -> u32 {
        self.inner.width
    }

    pub fn height(&self) -> u32 {
        self.inner.height
    }

    pub fn planes_count(&self) -> usize {
        self.inner.planes.lock().len()
    }

    /// Plane storage (`GetPlaneAt` for every plane)
    pub fn planes(&self) -> PlaneStore {
        self.inner.planes.clone()
    }

    pub fn native(&self) -> Option<&NativeTexture> {
        self.inner.native.as_ref()
    }

    /// `GetNative` of plane 0 for texture-backed surfaces
    pub fn native_handle(&self) -> Option<u64> {
        self.inner.native.as_ref().map(NativeTexture::handle)
    }

    pub fn set_crop(&self, x: i32, y: i32, width: i32, height: i32) {
        *self.inner.crop.lock() = Rect {
            x,
            y,
            width,
            height,
        };
    }

    pub fn crop(&self) -> Rect {
        *self.inner.crop.lock()
    }

    pub fn set_pts(&self, pts: i64) {
        self.inner.pts.store(pts, Ordering::Relaxed);
    }

    pub fn pts(&self) -> i64 {
        self.inner.pts.load(Ordering::Relaxed)
    }

    /// Number of outstanding references
    pub fn ref_count(&self) -> usize {
        Arc::strong_count(&self.inner)
    }

    pub fn ptr_eq(a: &Surface, b: &Surface) -> bool {
        Arc::ptr_eq(&a.inner, &b.inner)
    }
}

impl std::fmt::Debug for Surface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Surface")
            .field("memory", &self.inner.memory)
            .field("format", &self.inner.format)
            .field("size", &(self.inner.width, self.inner.height))
            .field("refs", &self.ref_count())
            .finish()
    }
}

#[derive(Debug)]
enum Payload {
    Surface(Surface),
    Buffer(Vec<u8>),
}

/// Generic data object exchanged with components
#[derive(Debug)]
pub struct Data {
    payload: Payload,
}

impl Data {
    pub fn buffer(bytes: Vec<u8>) -> Self {
        Self {
            payload: Payload::Buffer(bytes),
        }
    }

    /// `QueryInterface(IID_AMFSurface)`: acquires a new surface reference
    pub fn query_surface(&self) -> AmfResult<Surface> {
        match &self.payload {
            Payload::Surface(surface) => Ok(surface.clone()),
            Payload::Buffer(_) => Err(Status::NO_INTERFACE),
        }
    }
}

impl From<Surface> for Data {
    fn from(surface: Surface) -> Self {
        Self {
            payload: Payload::Surface(surface),
        }
    }
}
