//! Software `AMFVideoConverter`

use super::convert::{self, ConvertParams, Filter, Matrix};
use crate::amf::{
    self, AmfResult, Component, Context, Data, Status, Surface, SurfaceFormat, Variant,
};

use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, trace};

struct Input {
    format: SurfaceFormat,
    width: i32,
    height: i32,
}

/// Scaler / color converter running on the CPU.
///
/// Accepts one surface at a time: a second submit before the output is
/// queried fails with `AMF_INPUT_FULL`.
pub struct VideoConverter {
    context: Arc<dyn Context>,
    properties: HashMap<&'static str, Variant>,
    input: Option<Input>,
    pending: Option<Surface>,
    terminated: bool,
}

impl VideoConverter {
    pub fn new(context: Arc<dyn Context>) -> Self {
        Self {
            context,
            properties: HashMap::new(),
            input: None,
            pending: None,
            terminated: false,
        }
    }

    fn int_property(&self, name: &str) -> Option<i64> {
        self.properties.get(name).and_then(Variant::as_i64)
    }

    fn output_format(&self, input: &Input) -> SurfaceFormat {
        self.int_property(amf::OUTPUT_FORMAT)
            .map(SurfaceFormat::from_code)
            .filter(|f| *f != SurfaceFormat::Unknown)
            .unwrap_or(input.format)
    }

    fn output_size(&self, input: &Input) -> (i32, i32) {
        self.properties
            .get(amf::OUTPUT_SIZE)
            .and_then(Variant::as_size)
            .unwrap_or((input.width, input.height))
    }

    fn params(&self) -> ConvertParams {
        let filter = match self.int_property(amf::SCALE) {
            Some(amf::SCALE_BICUBIC) => Filter::Bicubic,
            _ => Filter::Bilinear,
        };
        let profile = self.int_property(amf::COLOR_PROFILE);
        let matrix = match profile {
            Some(amf::COLOR_PROFILE_601) | Some(amf::COLOR_PROFILE_FULL_601) => Matrix::Bt601,
            Some(amf::COLOR_PROFILE_2020) | Some(amf::COLOR_PROFILE_FULL_2020) => Matrix::Bt2020,
            _ => Matrix::Bt709,
        };
        let full_range = match self.int_property(amf::OUTPUT_COLOR_RANGE) {
            Some(amf::COLOR_RANGE_FULL) => true,
            Some(amf::COLOR_RANGE_STUDIO) => false,
            _ => matches!(
                profile,
                Some(amf::COLOR_PROFILE_FULL_601)
                    | Some(amf::COLOR_PROFILE_FULL_709)
                    | Some(amf::COLOR_PROFILE_FULL_2020)
            ),
        };
        ConvertParams {
            filter,
            matrix,
            full_range,
        }
    }
}

impl Component for VideoConverter {
    fn set_property(&mut self, name: &'static str, value: Variant) -> AmfResult<()> {
        if name == amf::OUTPUT_SIZE {
            match value.as_size() {
                Some((w, h)) if w > 0 && h > 0 => {}
                _ => return Err(Status::INVALID_ARG),
            }
        }
        self.properties.insert(name, value);
        Ok(())
    }

    fn get_property(&self, name: &str) -> Option<Variant> {
        self.properties.get(name).copied()
    }

    fn init(&mut self, format: SurfaceFormat, width: i32, height: i32) -> AmfResult<()> {
        if self.input.is_some() {
            return Err(Status::ALREADY_INITIALIZED);
        }
        if !convert::is_supported(format) {
            return Err(Status::SURFACE_FORMAT_NOT_SUPPORTED);
        }
        if width <= 0 || height <= 0 {
            return Err(Status::INVALID_RESOLUTION);
        }
        let input = Input {
            format,
            width,
            height,
        };
        let out_format = self.output_format(&input);
        if !convert::is_supported(out_format) {
            return Err(Status::SURFACE_FORMAT_NOT_SUPPORTED);
        }
        let (ow, oh) = self.output_size(&input);
        debug!(
            "Converter init: {:?} {}x{} -> {:?} {}x{}",
            format, width, height, out_format, ow, oh
        );
        self.input = Some(input);
        self.terminated = false;
        Ok(())
    }

    fn submit_input(&mut self, data: Data) -> AmfResult<()> {
        let input = self.input.as_ref().ok_or(Status::NOT_INITIALIZED)?;
        if self.pending.is_some() {
            return Err(Status::INPUT_FULL);
        }
        let surface = data.query_surface()?;
        if surface.format() != input.format {
            return Err(Status::INVALID_FORMAT);
        }

        let out_format = self.output_format(input);
        let (ow, oh) = self.output_size(input);
        let params = self.params();

        let output = self.context.alloc_surface(
            self.context.memory_type(),
            out_format,
            ow as u32,
            oh as u32,
        )?;
        {
            let src = surface.planes();
            let src = src.lock();
            let dst = output.planes();
            let mut dst = dst.lock();
            convert::convert(
                &src,
                surface.format(),
                surface.crop(),
                &mut dst,
                out_format,
                ow as u32,
                oh as u32,
                &params,
            )
            .map_err(|e| {
                debug!("Conversion failed: {}", e);
                Status::FAIL
            })?;
        }
        output.set_pts(surface.pts());
        trace!("Converted surface pts={}", surface.pts());

        self.pending = Some(output);
        Ok(())
    }

    fn query_output(&mut self) -> AmfResult<Data> {
        match self.pending.take() {
            Some(surface) => Ok(Data::from(surface)),
            None if self.terminated => Err(Status::EOF),
            None => Err(Status::REPEAT),
        }
    }

    fn terminate(&mut self) -> AmfResult<()> {
        self.pending = None;
        self.input = None;
        self.terminated = true;
        Ok(())
    }
}
