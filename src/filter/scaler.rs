//! Scaler component driver

use super::color;
use crate::amf::{self, Component, Data, Status, Surface, SurfaceFormat, Variant};
use crate::config::{ScaleAlgorithm, ScaleConfig};
use crate::error::{Error, Result};
use crate::hwcontext::DeviceContext;
use crate::types::{PixelFormat, Resolution};

use tracing::{debug, error, info, warn};

/// Lifecycle of the converter component
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalerState {
    Uninitialized,
    Configured,
    Running,
    Terminated,
}

/// One converter component and its state
pub struct Scaler {
    component: Option<Box<dyn Component>>,
    state: ScalerState,
    frames: u64,
}

impl Scaler {
    pub fn new() -> Self {
        Self {
            component: None,
            state: ScalerState::Uninitialized,
            frames: 0,
        }
    }

    pub fn state(&self) -> ScalerState {
        self.state
    }

    /// Frames converted so far
    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Create, configure and initialize the component.
    ///
    /// The component is initialized with the input layout and size; output
    /// size and format are properties.
    pub fn configure(
        &mut self,
        context: &DeviceContext,
        out_format: PixelFormat,
        out_size: Resolution,
        config: &ScaleConfig,
        in_format: PixelFormat,
        in_size: Resolution,
    ) -> Result<()> {
        if self.state != ScalerState::Uninitialized {
            return Err(Error::Internal(format!(
                "Scaler cannot be configured in state {:?}",
                self.state
            )));
        }

        let out_surface = SurfaceFormat::from_pixel_format(out_format);
        if out_surface == SurfaceFormat::Unknown {
            return Err(Error::Config(format!(
                "Output format {} is not supported by the converter",
                out_format
            )));
        }
        let in_surface = SurfaceFormat::from_pixel_format(in_format);
        if in_surface == SurfaceFormat::Unknown {
            return Err(Error::Config(format!(
                "Input format {} is not supported by the converter",
                in_format
            )));
        }

        let mut component = context.create_component(amf::VIDEO_CONVERTER)?;

        set(&mut *component, amf::OUTPUT_FORMAT, Variant::Int64(out_surface.code()))?;
        set(
            &mut *component,
            amf::OUTPUT_SIZE,
            Variant::Size {
                width: out_size.width as i32,
                height: out_size.height as i32,
            },
        )?;
        let scale = match config.scale_type {
            ScaleAlgorithm::Bilinear => amf::SCALE_BILINEAR,
            ScaleAlgorithm::Bicubic => amf::SCALE_BICUBIC,
        };
        set(&mut *component, amf::SCALE, Variant::Int64(scale))?;

        if let Some(profile) = color::profile_property(config.color_profile, config.color_range) {
            set(&mut *component, amf::COLOR_PROFILE, Variant::Int64(profile))?;
        }
        if let Some(range) = config.color_range {
            set(
                &mut *component,
                amf::OUTPUT_COLOR_RANGE,
                Variant::Int64(color::range_property(range)),
            )?;
        }
        if let Some(primaries) = config.primaries_override() {
            set(
                &mut *component,
                amf::OUTPUT_COLOR_PRIMARIES,
                Variant::Int64(primaries.code()),
            )?;
        }
        if let Some(trc) = config.trc_override() {
            set(
                &mut *component,
                amf::OUTPUT_TRANSFER_CHARACTERISTIC,
                Variant::Int64(trc.code()),
            )?;
        }

        component
            .init(in_surface, in_size.width as i32, in_size.height as i32)
            .map_err(|status| {
                error!("Converter init failed with error {}", status);
                Error::op("Init", status)
            })?;

        info!(
            "Scaler configured: {} {} -> {} {}",
            in_format, in_size, out_format, out_size
        );

        self.component = Some(component);
        self.state = ScalerState::Configured;
        Ok(())
    }

    /// Convert one surface. Blocks until the component has produced output.
    pub fn process(&mut self, input: Surface) -> Result<Surface> {
        let component = match (self.state, self.component.as_mut()) {
            (ScalerState::Configured | ScalerState::Running, Some(component)) => component,
            _ => return Err(Error::NotConfigured),
        };
        self.state = ScalerState::Running;

        let pts = input.pts();
        component.submit_input(Data::from(input)).map_err(|status| {
            error!("SubmitInput() failed with error {}", status);
            Error::op("SubmitInput", status)
        })?;

        let data = loop {
            match component.query_output() {
                Ok(data) => break data,
                Err(Status::REPEAT) => std::thread::yield_now(),
                Err(status) => {
                    error!("QueryOutput() failed with error {}", status);
                    return Err(Error::op("QueryOutput", status));
                }
            }
        };

        // The data object is dropped once the surface is extracted
        let surface = data.query_surface().map_err(|status| {
            error!("QueryInterface(Surface) failed with error {}", status);
            Error::op("QueryOutput", status)
        })?;
        drop(data);

        self.frames += 1;
        debug!(
            "Converted frame pts={} -> {}x{}",
            pts,
            surface.width(),
            surface.height()
        );
        Ok(surface)
    }

    /// Terminate and release the component. Safe to call more than once.
    pub fn terminate(&mut self) {
        if let Some(mut component) = self.component.take() {
            if let Err(status) = component.terminate() {
                warn!("Terminate() failed with error {}", status);
            }
            debug!("Scaler terminated after {} frames", self.frames);
        }
        if self.state != ScalerState::Uninitialized {
            self.state = ScalerState::Terminated;
        }
    }
}

impl Default for Scaler {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Scaler {
    fn drop(&mut self) {
        self.terminate();
    }
}

fn set(component: &mut dyn Component, name: &'static str, value: Variant) -> Result<()> {
    component.set_property(name, value).map_err(|status| {
        error!("SetProperty({}) failed with error {}", name, status);
        Error::op("SetProperty", status)
    })
}
