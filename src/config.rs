//! Configuration types for GhostScale

use crate::error::{Error, Result};
use crate::filter::expr::Expr;
use crate::types::{ColorPrimaries, PixelFormat, TransferCharacteristic};

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;

/// Scale stage configuration. Immutable once the stage is created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ScaleConfig {
    /// Output width expression
    #[serde(alias = "w")]
    pub width: String,
    /// Output height expression
    #[serde(alias = "h")]
    pub height: String,
    /// Output pixel format (None = same as input)
    #[serde(with = "output_format")]
    pub format: Option<PixelFormat>,
    /// Scaling algorithm
    pub scale_type: ScaleAlgorithm,
    /// Conversion color profile
    pub color_profile: Option<ColorProfile>,
    /// Output color range
    pub color_range: Option<RangeOverride>,
    /// Output color primaries
    pub primaries: Option<ColorPrimaries>,
    /// Output transfer characteristic
    pub trc: Option<TransferCharacteristic>,
    /// Keep the input aspect ratio
    pub force_original_aspect_ratio: AspectRatioPolicy,
    /// Output dimensions are rounded to a multiple of this
    pub force_divisible_by: u32,
}

impl Default for ScaleConfig {
    fn default() -> Self {
        Self {
            width: "iw".into(),
            height: "ih".into(),
            format: None,
            scale_type: ScaleAlgorithm::Bilinear,
            color_profile: None,
            color_range: None,
            primaries: None,
            trc: None,
            force_original_aspect_ratio: AspectRatioPolicy::Disable,
            force_divisible_by: 1,
        }
    }
}

impl ScaleConfig {
    pub fn with_size(mut self, width: impl Into<String>, height: impl Into<String>) -> Self {
        self.width = width.into();
        self.height = height.into();
        self
    }

    pub fn with_format(mut self, format: PixelFormat) -> Self {
        self.format = Some(format);
        self
    }

    pub fn with_scale_type(mut self, scale_type: ScaleAlgorithm) -> Self {
        self.scale_type = scale_type;
        self
    }

    pub fn with_color_profile(mut self, profile: ColorProfile) -> Self {
        self.color_profile = Some(profile);
        self
    }

    pub fn with_color_range(mut self, range: RangeOverride) -> Self {
        self.color_range = Some(range);
        self
    }

    pub fn with_primaries(mut self, primaries: ColorPrimaries) -> Self {
        self.primaries = Some(primaries);
        self
    }

    pub fn with_trc(mut self, trc: TransferCharacteristic) -> Self {
        self.trc = Some(trc);
        self
    }

    pub fn with_aspect_ratio(mut self, policy: AspectRatioPolicy, divisible_by: u32) -> Self {
        self.force_original_aspect_ratio = policy;
        self.force_divisible_by = divisible_by;
        self
    }

    /// Primaries override, treating `unspecified` as unset
    pub fn primaries_override(&self) -> Option<ColorPrimaries> {
        self.primaries.filter(|p| *p != ColorPrimaries::Unspecified)
    }

    /// Transfer override, treating `unspecified` as unset
    pub fn trc_override(&self) -> Option<TransferCharacteristic> {
        self.trc.filter(|t| *t != TransferCharacteristic::Unspecified)
    }

    /// Check everything that can be checked before the stream starts
    pub fn validate(&self) -> Result<()> {
        Expr::parse(&self.width)?;
        Expr::parse(&self.height)?;

        if !(1..=256).contains(&self.force_divisible_by) {
            return Err(Error::Config(format!(
                "force_divisible_by must be in 1..=256, got {}",
                self.force_divisible_by
            )));
        }

        if let Some(format) = self.format {
            if format.is_hardware() {
                return Err(Error::Config(format!(
                    "Output format must be a pixel layout, got {}",
                    format
                )));
            }
        }

        if self.force_divisible_by > 1
            && self.force_original_aspect_ratio == AspectRatioPolicy::Disable
        {
            tracing::warn!(
                "force_divisible_by={} has no effect without force_original_aspect_ratio",
                self.force_divisible_by
            );
        }

        Ok(())
    }

    /// Parse and validate a TOML document
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: ScaleConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML config file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }
}

/// Scaling algorithm
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ScaleAlgorithm {
    #[default]
    Bilinear,
    Bicubic,
}

impl FromStr for ScaleAlgorithm {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "bilinear" => Ok(ScaleAlgorithm::Bilinear),
            "bicubic" => Ok(ScaleAlgorithm::Bicubic),
            other => Err(Error::Config(format!("Unknown scale type: {}", other))),
        }
    }
}

/// Conversion color profile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ColorProfile {
    Bt601,
    Bt709,
    Bt2020,
    /// Full-range BT.601 with RGB signalling
    Jpeg,
}

impl FromStr for ColorProfile {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "bt601" => Ok(ColorProfile::Bt601),
            "bt709" => Ok(ColorProfile::Bt709),
            "bt2020" => Ok(ColorProfile::Bt2020),
            "jpeg" => Ok(ColorProfile::Jpeg),
            other => Err(Error::Config(format!("Unknown color profile: {}", other))),
        }
    }
}

/// Output range override
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RangeOverride {
    /// Limited (16-235)
    Studio,
    Full,
}

impl FromStr for RangeOverride {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "studio" | "limited" | "tv" => Ok(RangeOverride::Studio),
            "full" | "pc" => Ok(RangeOverride::Full),
            other => Err(Error::Config(format!("Unknown color range: {}", other))),
        }
    }
}

/// What to do when the requested size does not match the input aspect ratio
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum AspectRatioPolicy {
    #[default]
    Disable,
    /// Shrink one dimension to fit
    Decrease,
    /// Grow one dimension to cover
    Increase,
}

impl FromStr for AspectRatioPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "disable" | "0" => Ok(AspectRatioPolicy::Disable),
            "decrease" | "1" => Ok(AspectRatioPolicy::Decrease),
            "increase" | "2" => Ok(AspectRatioPolicy::Increase),
            other => Err(Error::Config(format!(
                "Unknown aspect ratio policy: {}",
                other
            ))),
        }
    }
}

/// Parse an output format name; `same` means keep the input format
pub fn parse_output_format(s: &str) -> Result<Option<PixelFormat>> {
    if s.trim().eq_ignore_ascii_case("same") {
        return Ok(None);
    }
    s.parse().map(Some)
}

mod output_format {
    use crate::types::PixelFormat;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(format: &Option<PixelFormat>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(format.map(|f| f.name()).unwrap_or("same"))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<PixelFormat>, D::Error> {
        let name = String::deserialize(d)?;
        super::parse_output_format(&name).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = ScaleConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.width, "iw");
        assert_eq!(config.format, None);
    }

    #[test]
    fn test_divisible_by_range() {
        let config = ScaleConfig::default().with_aspect_ratio(AspectRatioPolicy::Decrease, 0);
        assert!(config.validate().unwrap_err().is_configuration_error());
        let config = ScaleConfig::default().with_aspect_ratio(AspectRatioPolicy::Decrease, 257);
        assert!(config.validate().is_err());
        let config = ScaleConfig::default().with_aspect_ratio(AspectRatioPolicy::Decrease, 256);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_hardware_output_format() {
        let config = ScaleConfig::default().with_format(PixelFormat::D3d11);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_bad_expression() {
        let config = ScaleConfig::default().with_size("iw/", "ih");
        assert!(matches!(
            config.validate(),
            Err(Error::InvalidExpression { .. })
        ));
    }

    #[test]
    fn test_toml() {
        let config = ScaleConfig::from_toml_str(
            r#"
            w = "iw/2"
            height = "-2"
            format = "nv12"
            scale-type = "bicubic"
            color-profile = "bt709"
            color-range = "full"
            primaries = "bt2020"
            trc = "smpte2084"
            force-original-aspect-ratio = "decrease"
            force-divisible-by = 2
            "#,
        )
        .unwrap();
        assert_eq!(config.width, "iw/2");
        assert_eq!(config.format, Some(PixelFormat::Nv12));
        assert_eq!(config.scale_type, ScaleAlgorithm::Bicubic);
        assert_eq!(config.color_range, Some(RangeOverride::Full));
        assert_eq!(config.trc, Some(TransferCharacteristic::Smpte2084));
        assert_eq!(config.force_divisible_by, 2);

        let same = ScaleConfig::from_toml_str("format = \"same\"").unwrap();
        assert_eq!(same.format, None);
        assert!(ScaleConfig::from_toml_str("format = \"bogus\"").is_err());
    }

    #[test]
    fn test_option_names() {
        assert_eq!("bicubic".parse::<ScaleAlgorithm>().unwrap(), ScaleAlgorithm::Bicubic);
        assert_eq!("jpeg".parse::<ColorProfile>().unwrap(), ColorProfile::Jpeg);
        assert_eq!("studio".parse::<RangeOverride>().unwrap(), RangeOverride::Studio);
        assert!("sideways".parse::<AspectRatioPolicy>().is_err());
        assert_eq!(parse_output_format("same").unwrap(), None);
    }

    #[test]
    fn test_unspecified_is_unset() {
        let config = ScaleConfig::default().with_primaries(ColorPrimaries::Unspecified);
        assert_eq!(config.primaries_override(), None);
    }
}
