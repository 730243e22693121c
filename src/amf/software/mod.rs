//! Host-memory accelerator runtime
//!
//! Implements [`Factory`], [`Context`] and [`Component`] on the CPU so the
//! scale filter can run, and be tested, without a GPU. Contexts derived from
//! a D3D11 or DX9 device report that memory type and wrap native textures
//! without copying; standalone contexts use host memory.

#[cfg(not(feature = "ffmpeg"))]
mod builtin;
mod convert;
mod converter;
#[cfg(feature = "ffmpeg")]
mod sws;

pub use convert::{ConvertParams, Filter, Matrix};
pub use converter::VideoConverter;

use super::{
    alloc_planes, AmfResult, Component, Context, D3d11Texture, Dx9Surface, Factory, MemoryType,
    NativeApi, NativeDevice, NativeTexture, Status, Surface, SurfaceFormat, SurfaceParts,
    VIDEO_CONVERTER,
};

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Surface lifetime counters, shared by every context of a factory
#[derive(Debug, Default)]
pub struct SurfaceStats {
    created: AtomicU64,
    released: AtomicU64,
}

impl SurfaceStats {
    pub fn created(&self) -> u64 {
        self.created.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> u64 {
        self.released.load(Ordering::SeqCst)
    }

    /// Surfaces still referenced somewhere
    pub fn live(&self) -> u64 {
        self.created().saturating_sub(self.released())
    }
}

/// CPU implementation of the accelerator factory
#[derive(Debug, Default)]
pub struct SoftwareFactory {
    stats: Arc<SurfaceStats>,
}

impl SoftwareFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> Arc<SurfaceStats> {
        self.stats.clone()
    }

    fn context(&self, memory: MemoryType) -> Arc<dyn Context> {
        Arc::new(SoftwareContext {
            memory,
            stats: self.stats.clone(),
        })
    }
}

impl Factory for SoftwareFactory {
    fn name(&self) -> &str {
        "software"
    }

    fn create_context(&self) -> AmfResult<Arc<dyn Context>> {
        Ok(self.context(MemoryType::Host))
    }

    fn derive_context(&self, device: &NativeDevice) -> AmfResult<Arc<dyn Context>> {
        let memory = match device.api {
            NativeApi::D3d11 => MemoryType::Dx11,
            NativeApi::Dx9 => MemoryType::Dx9,
            NativeApi::Vulkan => return Err(Status::NOT_SUPPORTED),
        };
        debug!("Derived {:?} context from device {:#x}", memory, device.handle);
        Ok(self.context(memory))
    }

    fn create_component(
        &self,
        context: &Arc<dyn Context>,
        id: &str,
    ) -> AmfResult<Box<dyn Component>> {
        if id != VIDEO_CONVERTER {
            return Err(Status::NOT_FOUND);
        }
        Ok(Box::new(VideoConverter::new(context.clone())))
    }
}

/// CPU context. Surfaces it hands out are counted in [`SurfaceStats`].
pub struct SoftwareContext {
    memory: MemoryType,
    stats: Arc<SurfaceStats>,
}

impl SoftwareContext {
    fn surface(&self, parts: SurfaceParts) -> Surface {
        self.stats.created.fetch_add(1, Ordering::SeqCst);
        let stats = self.stats.clone();
        Surface::from_parts(
            parts,
            Some(Box::new(move || {
                stats.released.fetch_add(1, Ordering::SeqCst);
            })),
        )
    }
}

impl Context for SoftwareContext {
    fn memory_type(&self) -> MemoryType {
        self.memory
    }

    fn alloc_surface(
        &self,
        memory: MemoryType,
        format: SurfaceFormat,
        width: u32,
        height: u32,
    ) -> AmfResult<Surface> {
        if memory != MemoryType::Host && memory != self.memory {
            return Err(Status::NOT_SUPPORTED);
        }
        let planes = alloc_planes(format, width, height)?;

        // Device-memory surfaces are backed by a fresh native object
        let (planes, native) = match memory {
            MemoryType::Dx11 => {
                let texture = D3d11Texture::new(0, format, width, height, vec![planes]);
                let store = texture.slice(0).ok_or(Status::UNEXPECTED)?;
                (store, Some(NativeTexture::D3d11(texture)))
            }
            MemoryType::Dx9 => {
                let surface = Dx9Surface::new(0, format, width, height, planes);
                (surface.planes(), Some(NativeTexture::Dx9(surface)))
            }
            _ => (Arc::new(Mutex::new(planes)), None),
        };

        Ok(self.surface(SurfaceParts {
            memory,
            format,
            width,
            height,
            planes,
            native,
        }))
    }

    fn create_surface_from_dx11_native(&self, texture: &D3d11Texture) -> AmfResult<Surface> {
        if self.memory != MemoryType::Dx11 {
            return Err(Status::WRONG_STATE);
        }
        let index = texture.tagged_array_index();
        let planes = texture.slice(index).ok_or(Status::INVALID_ARG)?;
        Ok(self.surface(SurfaceParts {
            memory: MemoryType::Dx11,
            format: texture.format(),
            width: texture.width(),
            height: texture.height(),
            planes,
            native: Some(NativeTexture::D3d11(texture.clone())),
        }))
    }

    fn create_surface_from_dx9_native(&self, surface: &Dx9Surface) -> AmfResult<Surface> {
        if self.memory != MemoryType::Dx9 {
            return Err(Status::WRONG_STATE);
        }
        Ok(self.surface(SurfaceParts {
            memory: MemoryType::Dx9,
            format: surface.format(),
            width: surface.width(),
            height: surface.height(),
            planes: surface.planes(),
            native: Some(NativeTexture::Dx9(surface.clone())),
        }))
    }
}
