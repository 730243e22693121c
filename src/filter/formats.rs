//! Pixel format negotiation

use crate::error::{Error, Result};
use crate::hwcontext::{HwDevice, HwDeviceType};
use crate::types::PixelFormat;

/// Formats the scaler accepts from upstream, besides its output formats
pub const INPUT_FORMATS: [PixelFormat; 12] = [
    PixelFormat::Nv12,
    PixelFormat::P010,
    PixelFormat::Zrgb,
    PixelFormat::Bgr0,
    PixelFormat::Bgra,
    PixelFormat::Rgb0,
    PixelFormat::Rgba,
    PixelFormat::Gray8,
    PixelFormat::Yuv420p,
    PixelFormat::Yuv420p10,
    PixelFormat::Yuyv422,
    PixelFormat::Amf,
];

/// Output formats offered when no device is bound
pub const OUTPUT_FORMATS: [PixelFormat; 6] = [
    PixelFormat::Amf,
    PixelFormat::D3d11,
    PixelFormat::Dxva2Vld,
    PixelFormat::Nv12,
    PixelFormat::Bgra,
    PixelFormat::Yuv420p,
];

/// Negotiated candidate lists
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatLists {
    pub input: Vec<PixelFormat>,
    pub output: Vec<PixelFormat>,
}

/// Native output format for a bound device
pub fn device_output_format(device_type: HwDeviceType) -> Result<PixelFormat> {
    match device_type {
        HwDeviceType::D3d11va => Ok(PixelFormat::D3d11),
        HwDeviceType::Dxva2 => Ok(PixelFormat::Dxva2Vld),
        HwDeviceType::Amf => Ok(PixelFormat::Amf),
        other => Err(Error::UnsupportedDevice(format!(
            "Unsupported device type {} for format negotiation",
            other
        ))),
    }
}

/// Build the input and output candidate lists.
///
/// A bound device restricts the output to its native format. The input list
/// is the output list followed by [`INPUT_FORMATS`], first occurrence wins.
pub fn negotiate(device: Option<&HwDevice>) -> Result<FormatLists> {
    let output = match device {
        Some(device) => vec![device_output_format(device.device_type())?],
        None => OUTPUT_FORMATS.to_vec(),
    };

    let mut input: Vec<PixelFormat> = Vec::with_capacity(output.len() + INPUT_FORMATS.len());
    for format in output.iter().chain(INPUT_FORMATS.iter()) {
        if !input.contains(format) {
            input.push(*format);
        }
    }

    Ok(FormatLists { input, output })
}
