//! Scale filter stage
//!
//! [`ScaleFilter`] resizes and color-converts frames on an accelerator
//! through the [`crate::amf`] capability traits. Its lifecycle follows the
//! pipeline: `init` → `query_formats` → `config_output` → `filter_frame`* →
//! `uninit`.

pub mod color;
pub mod dims;
pub mod expr;
pub mod formats;
pub mod interop;
pub mod scaler;
pub mod setup;

pub use formats::FormatLists;
pub use scaler::{Scaler, ScalerState};
pub use setup::{ContextSource, Setup};

use crate::amf::Factory;
use crate::config::ScaleConfig;
use crate::error::{Error, Result};
use crate::frame::Frame;
use crate::hwcontext::{FramePoolRef, HwDeviceRef};
use crate::types::{PixelFormat, Rational, Resolution};

use std::sync::Arc;
use tracing::{debug, info, warn};

/// Properties of the upstream link
#[derive(Debug, Clone)]
pub struct InputLink {
    pub format: PixelFormat,
    pub width: u32,
    pub height: u32,
    pub sample_aspect_ratio: Rational,
    /// Upstream hardware frame pool, required for hardware formats
    pub hw_frames: Option<FramePoolRef>,
}

impl InputLink {
    /// Host-memory link
    pub fn host(format: PixelFormat, width: u32, height: u32) -> Self {
        Self {
            format,
            width,
            height,
            sample_aspect_ratio: Rational::UNSET,
            hw_frames: None,
        }
    }

    /// Link carrying frames of `pool`
    pub fn from_pool(pool: FramePoolRef) -> Self {
        Self {
            format: pool.format(),
            width: pool.width(),
            height: pool.height(),
            sample_aspect_ratio: Rational::UNSET,
            hw_frames: Some(pool),
        }
    }

    pub fn with_sample_aspect_ratio(mut self, sar: Rational) -> Self {
        self.sample_aspect_ratio = sar;
        self
    }
}

/// Properties of the downstream link, fixed by [`ScaleFilter::config_output`]
#[derive(Debug, Clone)]
pub struct OutputLink {
    pub format: PixelFormat,
    pub width: u32,
    pub height: u32,
    pub sample_aspect_ratio: Rational,
    pub hw_frames: FramePoolRef,
}

/// Scale `sar` so the display aspect survives an `in_size` -> `out_size` resize.
/// An unset ratio stays unset.
fn scale_sar(sar: Rational, in_size: Resolution, out_size: Resolution) -> Rational {
    if !sar.is_set() {
        return sar;
    }
    let factor = Rational::reduce(
        out_size.height as i64 * in_size.width as i64,
        out_size.width as i64 * in_size.height as i64,
    );
    sar.mul(factor)
}

struct Configured {
    setup: Setup,
    output: OutputLink,
    input_size: Resolution,
}

/// Accelerated scale and color-conversion filter.
pub struct ScaleFilter {
    // Dropped before the context and pools it uses
    scaler: Scaler,
    configured: Option<Configured>,
    config: ScaleConfig,
    device: Option<HwDeviceRef>,
    factory: Arc<dyn Factory>,
}

impl ScaleFilter {
    /// Validate `config` and create the filter around `factory`
    pub fn init(config: ScaleConfig, factory: Arc<dyn Factory>) -> Result<Self> {
        config.validate()?;
        info!(
            "Scale filter init: w={} h={} format={} backend={}",
            config.width,
            config.height,
            config
                .format
                .map(|f| f.name())
                .unwrap_or("same"),
            factory.name()
        );
        Ok(Self {
            scaler: Scaler::new(),
            configured: None,
            config,
            device: None,
            factory,
        })
    }

    /// Bind the pipeline's hardware device
    pub fn with_device(mut self, device: HwDeviceRef) -> Self {
        self.device = Some(device);
        self
    }

    pub fn config(&self) -> &ScaleConfig {
        &self.config
    }

    pub fn device(&self) -> Option<&HwDeviceRef> {
        self.device.as_ref()
    }

    /// Candidate input and output formats
    pub fn query_formats(&self) -> Result<FormatLists> {
        formats::negotiate(self.device.as_deref())
    }

    /// Output format to pick for `link` when the caller has no preference.
    ///
    /// A bound device dictates its native format; hardware inputs stay in
    /// their domain; host inputs keep the configured layout when it is a
    /// host output format and otherwise leave as accelerator surfaces.
    pub fn preferred_output_format(&self, link: &InputLink) -> Result<PixelFormat> {
        let lists = self.query_formats()?;
        if self.device.is_some() {
            return Ok(lists.output[0]);
        }
        if link.format.is_hardware() {
            return Ok(link.format);
        }
        let wanted = self.config.format.unwrap_or(link.format);
        if lists.output.contains(&wanted) {
            Ok(wanted)
        } else {
            Ok(PixelFormat::Amf)
        }
    }

    /// Fix the output link: resolve the size, select the context source,
    /// build the output pool and initialize the converter.
    pub fn config_output(&mut self, link: &InputLink, out_format: PixelFormat) -> Result<OutputLink> {
        let lists = self.query_formats()?;
        if !lists.input.contains(&link.format) {
            return Err(Error::Config(format!(
                "Input format {} is not accepted",
                link.format
            )));
        }
        if !lists.output.contains(&out_format) {
            return Err(Error::Config(format!(
                "Output format {} is not offered",
                out_format
            )));
        }

        if self.configured.is_some() {
            warn!("Reconfiguring scale filter output");
            self.uninit();
        }

        let dims_format = match (&link.hw_frames, link.format.is_hardware()) {
            (Some(pool), true) => pool.sw_format(),
            _ => link.format,
        };
        let input_size = Resolution::new(link.width, link.height);
        let out_size = dims::resolve(
            &self.config,
            &dims::DimsInput {
                width: link.width,
                height: link.height,
                sample_aspect_ratio: link.sample_aspect_ratio,
                in_format: dims_format,
                out_format: self.config.format.unwrap_or(dims_format),
            },
        )?;

        let setup = setup::configure(
            &self.factory,
            link,
            self.device.as_ref(),
            out_format,
            out_size,
            self.config.format,
        )?;

        let pool = setup.source.output_pool().clone();
        self.scaler = Scaler::new();
        self.scaler.configure(
            setup.source.context(),
            pool.sw_format(),
            out_size,
            &self.config,
            setup.in_format,
            input_size,
        )?;

        let output = OutputLink {
            format: pool.format(),
            width: out_size.width,
            height: out_size.height,
            sample_aspect_ratio: scale_sar(link.sample_aspect_ratio, input_size, out_size),
            hw_frames: pool,
        };

        info!(
            "Scale filter: {} {} -> {} ({}) {} via {}",
            link.format,
            input_size,
            output.format,
            output.hw_frames.sw_format(),
            out_size,
            setup.source.name()
        );

        self.configured = Some(Configured {
            setup,
            output: output.clone(),
            input_size,
        });
        Ok(output)
    }

    pub fn output(&self) -> Option<&OutputLink> {
        self.configured.as_ref().map(|c| &c.output)
    }

    pub fn context_source(&self) -> Option<&ContextSource> {
        self.configured.as_ref().map(|c| &c.setup.source)
    }

    /// Scale one frame. The input frame is consumed on every path.
    pub fn filter_frame(&mut self, input: Frame) -> Result<Frame> {
        let result = self.convert(&input);
        drop(input);
        result
    }

    fn convert(&mut self, input: &Frame) -> Result<Frame> {
        let configured = self.configured.as_ref().ok_or(Error::NotConfigured)?;
        let context = configured.setup.source.context();
        let output = &configured.output;

        let surface = interop::to_surface(context, input)?;
        let result = self.scaler.process(surface)?;
        let mut frame = interop::to_frame(&output.hw_frames, result)?;

        frame.copy_props(input);
        color::apply_overrides(&mut frame, &self.config);

        frame.format = output.format;
        frame.width = output.width;
        frame.height = output.height;
        frame.hw_frames = Some(output.hw_frames.clone());
        frame.sample_aspect_ratio = scale_sar(
            input.sample_aspect_ratio,
            Resolution::new(input.width, input.height),
            Resolution::new(output.width, output.height),
        );

        debug!(
            "Scaled frame pts={} {}x{} -> {}x{}",
            frame.pts, configured.input_size.width, configured.input_size.height,
            frame.width, frame.height
        );
        Ok(frame)
    }

    /// Process `frames` until the iterator ends, handing each output to `sink`.
    /// Returns the number of frames forwarded.
    pub fn run<I, F>(&mut self, frames: I, mut sink: F) -> Result<u64>
    where
        I: IntoIterator<Item = Frame>,
        F: FnMut(Frame) -> Result<()>,
    {
        let mut forwarded = 0;
        for frame in frames {
            let out = self.filter_frame(frame)?;
            sink(out)?;
            forwarded += 1;
        }
        debug!("Scale filter reached end of stream after {} frames", forwarded);
        Ok(forwarded)
    }

    /// Terminate the converter, then drop the context and pools
    pub fn uninit(&mut self) {
        self.scaler.terminate();
        if let Some(configured) = self.configured.take() {
            debug!(
                "Released {} context and output pool",
                configured.setup.source.name()
            );
        }
    }
}

impl Drop for ScaleFilter {
    fn drop(&mut self) {
        self.uninit();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::amf::software::SoftwareFactory;
    use crate::hwcontext::{HwDevice, HwDeviceType};

    fn filter(config: ScaleConfig) -> ScaleFilter {
        ScaleFilter::init(config, Arc::new(SoftwareFactory::new())).unwrap()
    }

    #[test]
    fn test_scale_sar() {
        let sar = scale_sar(
            Rational::new(1, 1),
            Resolution::new(1920, 1080),
            Resolution::new(1280, 1080),
        );
        assert_eq!(sar, Rational::new(3, 2));
        assert_eq!(
            scale_sar(Rational::UNSET, Resolution::new(4, 4), Resolution::new(2, 8)),
            Rational::UNSET
        );
    }

    #[test]
    fn test_not_configured() {
        let mut f = filter(ScaleConfig::default());
        let frame = Frame::new_host(PixelFormat::Nv12, 4, 4);
        assert!(matches!(f.filter_frame(frame), Err(Error::NotConfigured)));
    }

    #[test]
    fn test_host_to_host() {
        let mut f = filter(ScaleConfig::default().with_size("iw/2", "ih/2"));
        let link = InputLink::host(PixelFormat::Nv12, 16, 8);
        let out_format = f.preferred_output_format(&link).unwrap();
        assert_eq!(out_format, PixelFormat::Nv12);

        let output = f.config_output(&link, out_format).unwrap();
        assert_eq!((output.width, output.height), (8, 4));
        assert_eq!(output.format, PixelFormat::Nv12);
        assert!(matches!(f.context_source(), Some(ContextSource::Standalone { .. })));

        let mut frame = Frame::new_host(PixelFormat::Nv12, 16, 8);
        frame.pts = 7;
        let out = f.filter_frame(frame).unwrap();
        assert_eq!(out.pts, 7);
        assert_eq!(out.planes.len(), 2);
        assert_eq!(out.planes[0].data.len(), 8 * 4);
        assert!(out.hw_frames.is_some());
    }

    #[test]
    fn test_rejects_format_outside_lists() {
        let mut f = filter(ScaleConfig::default());
        let link = InputLink::host(PixelFormat::Argb, 4, 4);
        assert!(matches!(
            f.config_output(&link, PixelFormat::Nv12),
            Err(Error::Config(_))
        ));
        let link = InputLink::host(PixelFormat::Nv12, 4, 4);
        assert!(matches!(
            f.config_output(&link, PixelFormat::Gray8),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_bound_device_output() {
        let device = HwDevice::native(HwDeviceType::D3d11va, 5);
        let mut f = filter(ScaleConfig::default()).with_device(device);
        let link = InputLink::host(PixelFormat::Nv12, 8, 8);
        let out_format = f.preferred_output_format(&link).unwrap();
        assert_eq!(out_format, PixelFormat::D3d11);

        let output = f.config_output(&link, out_format).unwrap();
        assert_eq!(output.format, PixelFormat::Amf);
        assert_eq!(output.hw_frames.sw_format(), PixelFormat::Nv12);
        assert!(matches!(f.context_source(), Some(ContextSource::BoundDevice { .. })));
    }

    #[test]
    fn test_uninit_terminates_scaler() {
        let mut f = filter(ScaleConfig::default());
        let link = InputLink::host(PixelFormat::Bgra, 4, 4);
        f.config_output(&link, PixelFormat::Bgra).unwrap();
        f.uninit();
        assert_eq!(f.scaler.state(), ScalerState::Terminated);
        assert!(f.output().is_none());
    }
}
