//! Color metadata mapping between the scale options, converter properties
//! and output frames

use crate::amf;
use crate::config::{ColorProfile, RangeOverride, ScaleConfig};
use crate::frame::Frame;
use crate::types::{ColorRange, ColorSpace};

/// Converter color profile for the requested profile and range.
/// `None` leaves the converter default in place.
pub fn profile_property(profile: Option<ColorProfile>, range: Option<RangeOverride>) -> Option<i64> {
    let full = range == Some(RangeOverride::Full);
    let value = match profile? {
        ColorProfile::Bt601 if full => amf::COLOR_PROFILE_FULL_601,
        ColorProfile::Bt601 => amf::COLOR_PROFILE_601,
        ColorProfile::Bt709 if full => amf::COLOR_PROFILE_FULL_709,
        ColorProfile::Bt709 => amf::COLOR_PROFILE_709,
        ColorProfile::Bt2020 if full => amf::COLOR_PROFILE_FULL_2020,
        ColorProfile::Bt2020 => amf::COLOR_PROFILE_2020,
        ColorProfile::Jpeg => amf::COLOR_PROFILE_JPEG,
    };
    Some(value)
}

pub fn range_property(range: RangeOverride) -> i64 {
    match range {
        RangeOverride::Studio => amf::COLOR_RANGE_STUDIO,
        RangeOverride::Full => amf::COLOR_RANGE_FULL,
    }
}

/// Colorspace signalled on output frames for a profile
pub fn profile_colorspace(profile: ColorProfile) -> ColorSpace {
    match profile {
        ColorProfile::Bt601 => ColorSpace::Smpte170m,
        ColorProfile::Bt709 => ColorSpace::Bt709,
        ColorProfile::Bt2020 => ColorSpace::Bt2020Ncl,
        ColorProfile::Jpeg => ColorSpace::Rgb,
    }
}

pub fn range_color_range(range: RangeOverride) -> ColorRange {
    match range {
        RangeOverride::Studio => ColorRange::Limited,
        RangeOverride::Full => ColorRange::Full,
    }
}

/// Overwrite the color fields the configuration sets explicitly.
/// Unset options leave whatever the property copy produced.
pub fn apply_overrides(frame: &mut Frame, config: &ScaleConfig) {
    if let Some(profile) = config.color_profile {
        frame.colorspace = profile_colorspace(profile);
    }
    if let Some(range) = config.color_range {
        frame.color_range = range_color_range(range);
    }
    if let Some(primaries) = config.primaries_override() {
        frame.color_primaries = primaries;
    }
    if let Some(trc) = config.trc_override() {
        frame.color_trc = trc;
    }
}
