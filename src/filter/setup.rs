//! Accelerator context selection and output pool configuration

use super::InputLink;
use crate::amf::{Factory, SurfaceFormat};
use crate::error::{Error, Result};
use crate::hwcontext::{DeviceContext, FramePool, FramePoolDesc, FramePoolRef, HwDevice, HwDeviceRef};
use crate::types::{PixelFormat, Resolution};

use std::sync::Arc;
use tracing::info;

/// Where the accelerator context came from, with the output pool built on it.
///
/// Chosen once per output configuration.
#[derive(Debug, Clone)]
pub enum ContextSource {
    /// Derived from the device of the upstream hardware frame pool
    InputPool {
        context: DeviceContext,
        input_pool: FramePoolRef,
        output_pool: FramePoolRef,
    },
    /// Derived from the device bound to the pipeline
    BoundDevice {
        context: DeviceContext,
        device: HwDeviceRef,
        output_pool: FramePoolRef,
    },
    /// Standalone context
    Standalone {
        context: DeviceContext,
        output_pool: FramePoolRef,
    },
}

impl ContextSource {
    pub fn context(&self) -> &DeviceContext {
        match self {
            ContextSource::InputPool { context, .. }
            | ContextSource::BoundDevice { context, .. }
            | ContextSource::Standalone { context, .. } => context,
        }
    }

    pub fn output_pool(&self) -> &FramePoolRef {
        match self {
            ContextSource::InputPool { output_pool, .. }
            | ContextSource::BoundDevice { output_pool, .. }
            | ContextSource::Standalone { output_pool, .. } => output_pool,
        }
    }

    pub fn input_pool(&self) -> Option<&FramePoolRef> {
        match self {
            ContextSource::InputPool { input_pool, .. } => Some(input_pool),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ContextSource::InputPool { .. } => "input-pool",
            ContextSource::BoundDevice { .. } => "bound-device",
            ContextSource::Standalone { .. } => "standalone",
        }
    }
}

/// Result of context setup
#[derive(Debug, Clone)]
pub struct Setup {
    pub source: ContextSource,
    /// Pixel layout the scaler is initialized with
    pub in_format: PixelFormat,
}

/// Apply the configured output layout to a pool description.
///
/// Host pools hold frames of their own format, so their sub-format is the
/// format itself and a conflicting configured layout is an error.
fn pool_desc(mut desc: FramePoolDesc, user_format: Option<PixelFormat>) -> Result<FramePoolDesc> {
    if let Some(format) = user_format {
        desc.sw_format = format;
    }
    if !desc.format.is_hardware() {
        if desc.sw_format != desc.format && user_format.is_some() {
            return Err(Error::Config(format!(
                "Output format {} conflicts with negotiated host format {}",
                desc.sw_format, desc.format
            )));
        }
        desc.sw_format = desc.format;
    }
    Ok(desc)
}

/// Select the context source and create the output pool.
///
/// `out_format` is the negotiated output link format; `user_format` the
/// configured output layout, which overrides the pool sub-format.
pub fn configure(
    factory: &Arc<dyn Factory>,
    link: &InputLink,
    device: Option<&HwDeviceRef>,
    out_format: PixelFormat,
    out_size: Resolution,
    user_format: Option<PixelFormat>,
) -> Result<Setup> {
    if link.format.is_hardware() && link.hw_frames.is_none() {
        return Err(Error::Config(format!(
            "Input format {} requires a hardware frame pool",
            link.format
        )));
    }

    let source = if let Some(input_pool) = &link.hw_frames {
        let sw_format = input_pool.sw_format();
        if SurfaceFormat::from_pixel_format(sw_format) == SurfaceFormat::Unknown {
            return Err(Error::Config(format!(
                "Format of input frames context ({}) is not supported by the accelerator",
                sw_format
            )));
        }
        let context = DeviceContext::derive(factory.clone(), input_pool.device())?;
        let desc = pool_desc(
            FramePoolDesc {
                format: out_format,
                sw_format,
                width: out_size.width,
                height: out_size.height,
            },
            user_format,
        )?;
        let output_pool = FramePool::init(input_pool.device().clone(), desc)?;
        ContextSource::InputPool {
            context,
            input_pool: input_pool.clone(),
            output_pool,
        }
    } else if let Some(device) = device {
        let context = DeviceContext::derive(factory.clone(), device)?;
        // A native output format cannot be a sub-format; keep the input layout
        let sw_format = if out_format.is_hardware() {
            link.format
        } else {
            out_format
        };
        let desc = pool_desc(
            FramePoolDesc {
                format: PixelFormat::Amf,
                sw_format,
                width: out_size.width,
                height: out_size.height,
            },
            user_format,
        )?;
        let output_pool = FramePool::init(device.clone(), desc)?;
        ContextSource::BoundDevice {
            context,
            device: device.clone(),
            output_pool,
        }
    } else {
        let context = DeviceContext::create(factory.clone())?;
        let desc = pool_desc(
            FramePoolDesc {
                format: out_format,
                sw_format: link.format,
                width: out_size.width,
                height: out_size.height,
            },
            user_format,
        )?;
        let output_pool = FramePool::init(HwDevice::accelerator(context.clone()), desc)?;
        ContextSource::Standalone {
            context,
            output_pool,
        }
    };

    let in_format = match (&link.hw_frames, link.format.is_hardware()) {
        (Some(pool), true) => pool.sw_format(),
        _ => link.format,
    };

    let desc = source.output_pool().desc();
    info!(
        "Context source {}: output pool {} / {} {}x{}, scaler input {}",
        source.name(),
        desc.format,
        desc.sw_format,
        desc.width,
        desc.height,
        in_format
    );

    Ok(Setup { source, in_format })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::amf::software::SoftwareFactory;
    use crate::hwcontext::HwDeviceType;
    use crate::types::Rational;

    fn factory() -> Arc<dyn Factory> {
        Arc::new(SoftwareFactory::new())
    }

    fn host_link(format: PixelFormat) -> InputLink {
        InputLink {
            format,
            width: 32,
            height: 16,
            sample_aspect_ratio: Rational::UNSET,
            hw_frames: None,
        }
    }

    #[test]
    fn test_hardware_link_needs_pool() {
        let link = host_link(PixelFormat::D3d11);
        let result = configure(
            &factory(),
            &link,
            None,
            PixelFormat::D3d11,
            Resolution::new(16, 8),
            None,
        );
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_standalone_host_pool() {
        let setup = configure(
            &factory(),
            &host_link(PixelFormat::Nv12),
            None,
            PixelFormat::Bgra,
            Resolution::new(16, 8),
            Some(PixelFormat::Bgra),
        )
        .unwrap();
        assert_eq!(setup.source.name(), "standalone");
        assert_eq!(setup.in_format, PixelFormat::Nv12);
        let desc = *setup.source.output_pool().desc();
        assert_eq!(desc.format, PixelFormat::Bgra);
        assert_eq!(desc.sw_format, PixelFormat::Bgra);
        assert_eq!((desc.width, desc.height), (16, 8));
    }

    #[test]
    fn test_conflicting_host_format() {
        let result = configure(
            &factory(),
            &host_link(PixelFormat::Nv12),
            None,
            PixelFormat::Nv12,
            Resolution::new(16, 8),
            Some(PixelFormat::Bgra),
        );
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_input_pool_keeps_device_and_layout() {
        let device = HwDevice::native(HwDeviceType::D3d11va, 3);
        let input_pool = FramePool::init(
            device.clone(),
            FramePoolDesc {
                format: PixelFormat::D3d11,
                sw_format: PixelFormat::P010,
                width: 32,
                height: 16,
            },
        )
        .unwrap();
        let mut link = host_link(PixelFormat::D3d11);
        link.hw_frames = Some(input_pool);

        let setup = configure(
            &factory(),
            &link,
            None,
            PixelFormat::D3d11,
            Resolution::new(16, 8),
            None,
        )
        .unwrap();
        assert!(setup.source.input_pool().is_some());
        assert_eq!(setup.in_format, PixelFormat::P010);
        let pool = setup.source.output_pool();
        assert!(Arc::ptr_eq(pool.device(), &device));
        assert_eq!(pool.format(), PixelFormat::D3d11);
        assert_eq!(pool.sw_format(), PixelFormat::P010);
    }

    #[test]
    fn test_unsupported_input_layout() {
        let device = HwDevice::native(HwDeviceType::D3d11va, 3);
        let input_pool = FramePool::init(
            device,
            FramePoolDesc {
                format: PixelFormat::D3d11,
                sw_format: PixelFormat::Yuv420p10,
                width: 32,
                height: 16,
            },
        )
        .unwrap();
        let mut link = host_link(PixelFormat::D3d11);
        link.hw_frames = Some(input_pool);
        let result = configure(
            &factory(),
            &link,
            None,
            PixelFormat::D3d11,
            Resolution::new(16, 8),
            None,
        );
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
