//! GhostScale — AMF GPU Video Scaler
//!
//! Hardware resize and color-conversion stage for video pipelines.
//!
//! # Features
//!
//! - **Scale**: width/height expressions, aspect-ratio policies, divisibility
//! - **Convert**: pixel layout, color profile, range, primaries and transfer
//! - **Interop**: host frames, D3D11 texture arrays, DXVA2 and AMF surfaces
//! - **Backends**: any [`amf::Factory`]; [`amf::software`] runs on the CPU
//!
//! # Example
//!
//! ```rust,no_run
//! use ghostscale::{Frame, InputLink, PixelFormat, ScaleConfig, ScaleFilter, SoftwareFactory};
//! use std::sync::Arc;
//!
//! fn main() -> ghostscale::Result<()> {
//!     let config = ScaleConfig::default().with_size("iw/2", "-2");
//!     let mut filter = ScaleFilter::init(config, Arc::new(SoftwareFactory::new()))?;
//!
//!     let link = InputLink::host(PixelFormat::Nv12, 1920, 1080);
//!     let out_format = filter.preferred_output_format(&link)?;
//!     let output = filter.config_output(&link, out_format)?;
//!     println!("{}x{} {}", output.width, output.height, output.format);
//!
//!     let frame = Frame::new_host(PixelFormat::Nv12, 1920, 1080);
//!     let scaled = filter.filter_frame(frame)?;
//!     assert_eq!(scaled.width, 960);
//!     Ok(())
//! }
//! ```

pub mod amf;
pub mod config;
pub mod error;
pub mod filter;
pub mod frame;
pub mod hwcontext;
pub mod pipeline;
pub mod types;

// Re-exports for convenience
pub use amf::software::SoftwareFactory;
pub use config::{AspectRatioPolicy, ColorProfile, RangeOverride, ScaleAlgorithm, ScaleConfig};
pub use error::{Error, Result};
pub use filter::{InputLink, OutputLink, ScaleFilter};
pub use frame::{Frame, FrameBuffer, HwPayload, Plane};
pub use hwcontext::{DeviceContext, FramePool, HwDevice, HwDeviceType};
pub use pipeline::{StageHandle, StageStats};
pub use types::{PixelFormat, Rational, Resolution};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Whether software conversion goes through FFmpeg swscale
pub fn has_swscale() -> bool {
    cfg!(feature = "ffmpeg")
}
