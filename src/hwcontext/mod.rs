//! Hardware devices, accelerator contexts and frame pools
//!
//! An [`HwDevice`] is what the pipeline binds to a stage: either a native
//! graphics device (D3D11, DXVA2, ...) or an accelerator device that already
//! owns a [`DeviceContext`]. A [`FramePool`] describes one memory domain on
//! a device.

pub mod pool;

pub use pool::{FramePool, FramePoolDesc, FramePoolRef};

use crate::amf::{Component, Context, Factory, NativeApi, NativeDevice};
use crate::error::{Error, Result};

use std::sync::Arc;
use tracing::{debug, info};

/// Hardware device families a pipeline may bind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HwDeviceType {
    /// Accelerator runtime device
    Amf,
    D3d11va,
    Dxva2,
    Vulkan,
    Vaapi,
    Cuda,
    Qsv,
}

impl HwDeviceType {
    pub fn name(&self) -> &'static str {
        match self {
            HwDeviceType::Amf => "amf",
            HwDeviceType::D3d11va => "d3d11va",
            HwDeviceType::Dxva2 => "dxva2",
            HwDeviceType::Vulkan => "vulkan",
            HwDeviceType::Vaapi => "vaapi",
            HwDeviceType::Cuda => "cuda",
            HwDeviceType::Qsv => "qsv",
        }
    }

    /// Native API an accelerator context can be derived from
    fn native_api(&self) -> Option<NativeApi> {
        match self {
            HwDeviceType::D3d11va => Some(NativeApi::D3d11),
            HwDeviceType::Dxva2 => Some(NativeApi::Dx9),
            HwDeviceType::Vulkan => Some(NativeApi::Vulkan),
            _ => None,
        }
    }
}

impl std::fmt::Display for HwDeviceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Accelerator context plus the factory that creates components on it.
///
/// Clones share the same native context.
#[derive(Clone)]
pub struct DeviceContext {
    factory: Arc<dyn Factory>,
    context: Arc<dyn Context>,
}

impl DeviceContext {
    /// Create a standalone context
    pub fn create(factory: Arc<dyn Factory>) -> Result<Self> {
        let context = factory.create_context().map_err(|status| {
            Error::ResourceExhausted(format!("Failed to create accelerator context: {}", status))
        })?;
        info!("Created standalone {} context", factory.name());
        Ok(Self { factory, context })
    }

    /// Derive a context from a bound device.
    ///
    /// Accelerator devices share their existing context; native devices get
    /// a new context bound to the native handle.
    pub fn derive(factory: Arc<dyn Factory>, device: &HwDevice) -> Result<Self> {
        if let Some(shared) = device.context() {
            debug!("Sharing context of bound {} device", device.device_type());
            return Ok(shared.clone());
        }

        let api = device.device_type().native_api().ok_or_else(|| {
            Error::UnsupportedDevice(format!(
                "Cannot derive an accelerator context from a {} device",
                device.device_type()
            ))
        })?;
        let native = NativeDevice {
            api,
            handle: device.handle(),
        };
        let context = factory.derive_context(&native).map_err(|status| {
            Error::ResourceExhausted(format!(
                "Failed to derive context from {} device: {}",
                device.device_type(),
                status
            ))
        })?;
        info!("Derived {} context from {} device", factory.name(), device.device_type());
        Ok(Self { factory, context })
    }

    pub fn factory(&self) -> &Arc<dyn Factory> {
        &self.factory
    }

    pub fn context(&self) -> &Arc<dyn Context> {
        &self.context
    }

    /// Create a processing component on this context
    pub fn create_component(&self, id: &str) -> Result<Box<dyn Component>> {
        self.factory
            .create_component(&self.context, id)
            .map_err(|status| Error::op("CreateComponent", status))
    }
}

impl std::fmt::Debug for DeviceContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceContext")
            .field("factory", &self.factory.name())
            .field("memory", &self.context.memory_type())
            .finish()
    }
}

/// Device bound to a pipeline or a frame pool
#[derive(Debug)]
pub struct HwDevice {
    device_type: HwDeviceType,
    handle: u64,
    context: Option<DeviceContext>,
}

/// Shared device reference
pub type HwDeviceRef = Arc<HwDevice>;

impl HwDevice {
    /// Native device identified by an opaque handle
    pub fn native(device_type: HwDeviceType, handle: u64) -> HwDeviceRef {
        Arc::new(Self {
            device_type,
            handle,
            context: None,
        })
    }

    /// Accelerator device owning `context`
    pub fn accelerator(context: DeviceContext) -> HwDeviceRef {
        Arc::new(Self {
            device_type: HwDeviceType::Amf,
            handle: 0,
            context: Some(context),
        })
    }

    pub fn device_type(&self) -> HwDeviceType {
        self.device_type
    }

    pub fn handle(&self) -> u64 {
        self.handle
    }

    pub fn context(&self) -> Option<&DeviceContext> {
        self.context.as_ref()
    }
}
