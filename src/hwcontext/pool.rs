//! Frame pools

use super::HwDeviceRef;
use crate::error::{Error, Result};
use crate::frame::Frame;
use crate::types::PixelFormat;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Parameters of a frame pool
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FramePoolDesc {
    /// Memory domain (`amf`, `d3d11`, ...) or a host format
    pub format: PixelFormat,
    /// Actual pixel layout of the frames
    pub sw_format: PixelFormat,
    pub width: u32,
    pub height: u32,
}

/// Initialized frame pool bound to a device
#[derive(Debug)]
pub struct FramePool {
    desc: FramePoolDesc,
    device: HwDeviceRef,
    allocated: AtomicU64,
}

/// Shared pool reference carried by frames and links
pub type FramePoolRef = Arc<FramePool>;

impl FramePool {
    /// Validate `desc` and create the pool
    pub fn init(device: HwDeviceRef, desc: FramePoolDesc) -> Result<FramePoolRef> {
        if desc.width == 0 || desc.height == 0 {
            return Err(Error::Config(format!(
                "Invalid frame pool size {}x{}",
                desc.width, desc.height
            )));
        }
        if desc.sw_format.is_hardware() {
            return Err(Error::Config(format!(
                "Frame pool sub-format {} is not a pixel layout",
                desc.sw_format
            )));
        }
        Ok(Arc::new(Self {
            desc,
            device,
            allocated: AtomicU64::new(0),
        }))
    }

    pub fn desc(&self) -> &FramePoolDesc {
        &self.desc
    }

    pub fn format(&self) -> PixelFormat {
        self.desc.format
    }

    pub fn sw_format(&self) -> PixelFormat {
        self.desc.sw_format
    }

    pub fn width(&self) -> u32 {
        self.desc.width
    }

    pub fn height(&self) -> u32 {
        self.desc.height
    }

    pub fn device(&self) -> &HwDeviceRef {
        &self.device
    }

    /// Frames handed out so far
    pub fn allocated(&self) -> u64 {
        self.allocated.load(Ordering::Relaxed)
    }

    /// Allocate an empty frame in this pool. The caller attaches the payload.
    pub fn get_buffer(self: &Arc<Self>) -> Frame {
        self.allocated.fetch_add(1, Ordering::Relaxed);
        let mut frame = Frame::empty(self.desc.format, self.desc.width, self.desc.height);
        frame.hw_frames = Some(self.clone());
        frame
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hwcontext::{HwDevice, HwDeviceType};

    #[test]
    fn test_pool_validation() {
        let device = HwDevice::native(HwDeviceType::D3d11va, 1);
        let desc = FramePoolDesc {
            format: PixelFormat::D3d11,
            sw_format: PixelFormat::Nv12,
            width: 0,
            height: 720,
        };
        assert!(FramePool::init(device.clone(), desc).is_err());

        let desc = FramePoolDesc {
            sw_format: PixelFormat::Amf,
            width: 1280,
            ..desc
        };
        assert!(FramePool::init(device, desc).is_err());
    }

    #[test]
    fn test_get_buffer_references_pool() {
        let device = HwDevice::native(HwDeviceType::D3d11va, 1);
        let pool = FramePool::init(
            device,
            FramePoolDesc {
                format: PixelFormat::Amf,
                sw_format: PixelFormat::Nv12,
                width: 640,
                height: 360,
            },
        )
        .unwrap();
        let frame = pool.get_buffer();
        assert_eq!(frame.format, PixelFormat::Amf);
        assert_eq!((frame.width, frame.height), (640, 360));
        assert!(Arc::ptr_eq(frame.hw_frames.as_ref().unwrap(), &pool));
        assert_eq!(pool.allocated(), 1);
    }
}
