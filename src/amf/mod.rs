//! Accelerator capability interface
//!
//! The scaler talks to the vendor runtime through three small traits that
//! mirror the AMF object model:
//!
//! - [`Factory`]: creates or derives contexts, creates components
//! - [`Context`]: allocates surfaces and wraps native textures
//! - [`Component`]: `SetProperty` / `Init` / `SubmitInput` / `QueryOutput` / `Terminate`
//!
//! Releasing a component or a surface is dropping it. Any back-end that
//! implements these traits can drive the scale filter; [`software`] is the
//! built-in host-memory implementation.

pub mod software;
mod surface;

pub use surface::{
    alloc_planes, D3d11Texture, Data, Dx9Surface, Guid, NativeTexture, PlaneStore, Rect,
    ReleaseHook, Surface, SurfaceParts, SurfacePlane, AMF_TEXTURE_ARRAY_INDEX_GUID,
};

use crate::types::PixelFormat;
use std::sync::Arc;

/// Result of a vendor call: a value or a native status code
pub type AmfResult<T> = std::result::Result<T, Status>;

/// Native status code returned by the accelerator runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Status(pub i32);

impl Status {
    pub const OK: Status = Status(0);
    pub const FAIL: Status = Status(1);
    pub const UNEXPECTED: Status = Status(2);
    pub const INVALID_ARG: Status = Status(4);
    pub const OUT_OF_MEMORY: Status = Status(6);
    pub const NO_INTERFACE: Status = Status(8);
    pub const NOT_IMPLEMENTED: Status = Status(9);
    pub const NOT_SUPPORTED: Status = Status(10);
    pub const NOT_FOUND: Status = Status(11);
    pub const ALREADY_INITIALIZED: Status = Status(12);
    pub const NOT_INITIALIZED: Status = Status(13);
    pub const INVALID_FORMAT: Status = Status(14);
    pub const WRONG_STATE: Status = Status(15);
    pub const NO_DEVICE: Status = Status(17);
    pub const EOF: Status = Status(23);
    pub const REPEAT: Status = Status(24);
    pub const INPUT_FULL: Status = Status(25);
    pub const INVALID_RESOLUTION: Status = Status(29);
    pub const SURFACE_FORMAT_NOT_SUPPORTED: Status = Status(31);

    pub fn is_ok(&self) -> bool {
        *self == Status::OK
    }

    pub fn name(&self) -> &'static str {
        match self.0 {
            0 => "AMF_OK",
            1 => "AMF_FAIL",
            2 => "AMF_UNEXPECTED",
            4 => "AMF_INVALID_ARG",
            6 => "AMF_OUT_OF_MEMORY",
            8 => "AMF_NO_INTERFACE",
            9 => "AMF_NOT_IMPLEMENTED",
            10 => "AMF_NOT_SUPPORTED",
            11 => "AMF_NOT_FOUND",
            12 => "AMF_ALREADY_INITIALIZED",
            13 => "AMF_NOT_INITIALIZED",
            14 => "AMF_INVALID_FORMAT",
            15 => "AMF_WRONG_STATE",
            17 => "AMF_NO_DEVICE",
            23 => "AMF_EOF",
            24 => "AMF_REPEAT",
            25 => "AMF_INPUT_FULL",
            29 => "AMF_INVALID_RESOLUTION",
            31 => "AMF_SURFACE_FORMAT_NOT_SUPPORTED",
            _ => "AMF_UNKNOWN",
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.0, self.name())
    }
}

/// Component identifier of the scaler / color converter
pub const VIDEO_CONVERTER: &str = "AMFVideoConverter";

// AMFVideoConverter property names
pub const OUTPUT_FORMAT: &str = "OutputFormat";
pub const OUTPUT_SIZE: &str = "OutputSize";
pub const SCALE: &str = "ScaleType";
pub const COLOR_PROFILE: &str = "ColorProfile";
pub const OUTPUT_COLOR_RANGE: &str = "OutputColorRange";
pub const OUTPUT_COLOR_PRIMARIES: &str = "OutputColorPrimaries";
pub const OUTPUT_TRANSFER_CHARACTERISTIC: &str = "OutputTransferCharacteristic";

// Scale type values
pub const SCALE_BILINEAR: i64 = 0;
pub const SCALE_BICUBIC: i64 = 1;

// Converter color profile values
pub const COLOR_PROFILE_UNKNOWN: i64 = -1;
pub const COLOR_PROFILE_601: i64 = 0;
pub const COLOR_PROFILE_709: i64 = 1;
pub const COLOR_PROFILE_2020: i64 = 2;
pub const COLOR_PROFILE_FULL_601: i64 = 3;
pub const COLOR_PROFILE_FULL_709: i64 = 4;
pub const COLOR_PROFILE_FULL_2020: i64 = 5;
/// JPEG is full-range BT.601
pub const COLOR_PROFILE_JPEG: i64 = COLOR_PROFILE_FULL_601;

// Color range values
pub const COLOR_RANGE_UNDEFINED: i64 = 0;
pub const COLOR_RANGE_STUDIO: i64 = 1;
pub const COLOR_RANGE_FULL: i64 = 2;

/// Property value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Variant {
    Bool(bool),
    Int64(i64),
    Size { width: i32, height: i32 },
}

impl Variant {
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Variant::Int64(v) => Some(*v),
            Variant::Bool(b) => Some(*b as i64),
            Variant::Size { .. } => None,
        }
    }

    pub fn as_size(&self) -> Option<(i32, i32)> {
        match self {
            Variant::Size { width, height } => Some((*width, *height)),
            _ => None,
        }
    }
}

/// Memory domain of a surface or context
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemoryType {
    Unknown,
    Host,
    Dx9,
    Dx11,
    OpenCl,
    OpenGl,
    Vulkan,
    Dx12,
}

impl MemoryType {
    pub fn code(&self) -> i32 {
        match self {
            MemoryType::Unknown => 0,
            MemoryType::Host => 1,
            MemoryType::Dx9 => 2,
            MemoryType::Dx11 => 3,
            MemoryType::OpenCl => 4,
            MemoryType::OpenGl => 5,
            MemoryType::Vulkan => 10,
            MemoryType::Dx12 => 11,
        }
    }
}

/// Accelerator surface pixel layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SurfaceFormat {
    Unknown,
    Nv12,
    Yv12,
    Bgra,
    Argb,
    Rgba,
    Gray8,
    Yuv420p,
    Yuy2,
    P010,
}

impl SurfaceFormat {
    pub fn code(&self) -> i64 {
        match self {
            SurfaceFormat::Unknown => 0,
            SurfaceFormat::Nv12 => 1,
            SurfaceFormat::Yv12 => 2,
            SurfaceFormat::Bgra => 3,
            SurfaceFormat::Argb => 4,
            SurfaceFormat::Rgba => 5,
            SurfaceFormat::Gray8 => 6,
            SurfaceFormat::Yuv420p => 7,
            SurfaceFormat::Yuy2 => 9,
            SurfaceFormat::P010 => 10,
        }
    }

    pub fn from_code(code: i64) -> SurfaceFormat {
        match code {
            1 => SurfaceFormat::Nv12,
            2 => SurfaceFormat::Yv12,
            3 => SurfaceFormat::Bgra,
            4 => SurfaceFormat::Argb,
            5 => SurfaceFormat::Rgba,
            6 => SurfaceFormat::Gray8,
            7 => SurfaceFormat::Yuv420p,
            9 => SurfaceFormat::Yuy2,
            10 => SurfaceFormat::P010,
            _ => SurfaceFormat::Unknown,
        }
    }

    /// Map a pipeline pixel format to the accelerator layout
    pub fn from_pixel_format(format: PixelFormat) -> SurfaceFormat {
        match format {
            PixelFormat::Nv12 => SurfaceFormat::Nv12,
            PixelFormat::Bgr0 | PixelFormat::Bgra => SurfaceFormat::Bgra,
            PixelFormat::Rgb0 | PixelFormat::Rgba => SurfaceFormat::Rgba,
            PixelFormat::Zrgb | PixelFormat::Argb => SurfaceFormat::Argb,
            PixelFormat::Gray8 => SurfaceFormat::Gray8,
            PixelFormat::Yuv420p => SurfaceFormat::Yuv420p,
            PixelFormat::Yuyv422 => SurfaceFormat::Yuy2,
            PixelFormat::P010 => SurfaceFormat::P010,
            _ => SurfaceFormat::Unknown,
        }
    }

    /// Map back to the canonical pipeline pixel format
    pub fn to_pixel_format(&self) -> Option<PixelFormat> {
        match self {
            SurfaceFormat::Nv12 => Some(PixelFormat::Nv12),
            SurfaceFormat::Bgra => Some(PixelFormat::Bgra),
            SurfaceFormat::Rgba => Some(PixelFormat::Rgba),
            SurfaceFormat::Argb => Some(PixelFormat::Argb),
            SurfaceFormat::Gray8 => Some(PixelFormat::Gray8),
            SurfaceFormat::Yuv420p => Some(PixelFormat::Yuv420p),
            SurfaceFormat::Yuy2 => Some(PixelFormat::Yuyv422),
            SurfaceFormat::P010 => Some(PixelFormat::P010),
            SurfaceFormat::Yv12 | SurfaceFormat::Unknown => None,
        }
    }

    /// Row length in bytes and row count of every plane
    pub fn plane_geometry(&self, width: u32, height: u32) -> Vec<(usize, usize)> {
        let w = width as usize;
        let h = height as usize;
        let cw = (w + 1) / 2;
        let ch = (h + 1) / 2;
        match self {
            SurfaceFormat::Nv12 => vec![(w, h), (cw * 2, ch)],
            SurfaceFormat::P010 => vec![(w * 2, h), (cw * 4, ch)],
            SurfaceFormat::Yv12 | SurfaceFormat::Yuv420p => vec![(w, h), (cw, ch), (cw, ch)],
            SurfaceFormat::Bgra | SurfaceFormat::Argb | SurfaceFormat::Rgba => vec![(w * 4, h)],
            SurfaceFormat::Gray8 => vec![(w, h)],
            SurfaceFormat::Yuy2 => vec![(cw * 4, h)],
            SurfaceFormat::Unknown => Vec::new(),
        }
    }
}

/// Native graphics API of an upstream device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NativeApi {
    D3d11,
    Dx9,
    Vulkan,
}

/// Upstream native device an accelerator context can be derived from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NativeDevice {
    pub api: NativeApi,
    pub handle: u64,
}

/// Entry point of an accelerator runtime
pub trait Factory: Send + Sync {
    /// Runtime name for logging
    fn name(&self) -> &str;

    /// Create a standalone context
    fn create_context(&self) -> AmfResult<Arc<dyn Context>>;

    /// Create a context bound to an existing native device
    fn derive_context(&self, device: &NativeDevice) -> AmfResult<Arc<dyn Context>>;

    /// Create a processing component on a context
    fn create_component(
        &self,
        context: &Arc<dyn Context>,
        id: &str,
    ) -> AmfResult<Box<dyn Component>>;
}

/// Accelerator context: owns device memory and wraps native textures
pub trait Context: Send + Sync {
    /// Native memory domain of surfaces produced on this context
    fn memory_type(&self) -> MemoryType;

    fn alloc_surface(
        &self,
        memory: MemoryType,
        format: SurfaceFormat,
        width: u32,
        height: u32,
    ) -> AmfResult<Surface>;

    fn create_surface_from_dx11_native(&self, texture: &D3d11Texture) -> AmfResult<Surface>;

    fn create_surface_from_dx9_native(&self, surface: &Dx9Surface) -> AmfResult<Surface>;
}

/// Processing component (submit/poll protocol). Dropping it releases it.
pub trait Component: Send {
    fn set_property(&mut self, name: &'static str, value: Variant) -> AmfResult<()>;

    fn get_property(&self, name: &str) -> Option<Variant>;

    /// Initialize with the *input* format and size
    fn init(&mut self, format: SurfaceFormat, width: i32, height: i32) -> AmfResult<()>;

    fn submit_input(&mut self, data: Data) -> AmfResult<()>;

    /// Fetch the next output. `Err(Status::REPEAT)` means "not ready yet".
    fn query_output(&mut self) -> AmfResult<Data>;

    fn terminate(&mut self) -> AmfResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_surface_format_mapping() {
        assert_eq!(SurfaceFormat::from_pixel_format(PixelFormat::Bgr0), SurfaceFormat::Bgra);
        assert_eq!(SurfaceFormat::from_pixel_format(PixelFormat::Zrgb), SurfaceFormat::Argb);
        assert_eq!(
            SurfaceFormat::from_pixel_format(PixelFormat::Yuv420p10),
            SurfaceFormat::Unknown
        );
        assert_eq!(SurfaceFormat::from_pixel_format(PixelFormat::Amf), SurfaceFormat::Unknown);
        for fmt in PixelFormat::ALL {
            let sf = SurfaceFormat::from_pixel_format(fmt);
            if sf != SurfaceFormat::Unknown {
                assert_eq!(SurfaceFormat::from_code(sf.code()), sf);
                assert!(sf.to_pixel_format().is_some());
            }
        }
    }

    #[test]
    fn test_status_display() {
        assert_eq!(Status::REPEAT.to_string(), "24 (AMF_REPEAT)");
        assert!(Status::OK.is_ok());
        assert!(!Status::FAIL.is_ok());
    }
}
