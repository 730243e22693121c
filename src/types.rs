//! Common types used throughout GhostScale

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::Error;

/// Video resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub const HD_720P: Self = Self::new(1280, 720);
    pub const FHD_1080P: Self = Self::new(1920, 1080);
    pub const UHD_4K: Self = Self::new(3840, 2160);

    /// Calculate total pixels
    pub fn pixels(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    /// Calculate aspect ratio
    pub fn aspect_ratio(&self) -> f64 {
        self.width as f64 / self.height as f64
    }
}

impl Default for Resolution {
    fn default() -> Self {
        Self::FHD_1080P
    }
}

impl std::fmt::Display for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl FromStr for Resolution {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (w, h) = s
            .split_once('x')
            .ok_or_else(|| Error::Config(format!("Invalid resolution '{}', expected WxH", s)))?;
        let width = w
            .trim()
            .parse()
            .map_err(|_| Error::Config(format!("Invalid width in '{}'", s)))?;
        let height = h
            .trim()
            .parse()
            .map_err(|_| Error::Config(format!("Invalid height in '{}'", s)))?;
        Ok(Self::new(width, height))
    }
}

/// Rational number (sample aspect ratio, time base)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rational {
    pub num: i32,
    pub den: i32,
}

impl Rational {
    pub const fn new(num: i32, den: i32) -> Self {
        Self { num, den }
    }

    /// 0/1, the "not set" sample aspect ratio
    pub const UNSET: Self = Self::new(0, 1);

    /// A zero numerator marks an unknown value
    pub fn is_set(&self) -> bool {
        self.num != 0
    }

    /// Multiply and reduce, saturating to i32 like the rest of the pipeline
    pub fn mul(self, other: Rational) -> Rational {
        let num = self.num as i64 * other.num as i64;
        let den = self.den as i64 * other.den as i64;
        Self::reduce(num, den)
    }

    /// Reduce num/den to lowest terms
    pub fn reduce(num: i64, den: i64) -> Rational {
        if den == 0 {
            return Rational::new(if num == 0 { 0 } else { 1 }, 0);
        }
        let g = gcd(num.unsigned_abs(), den.unsigned_abs()).max(1) as i64;
        let (mut num, mut den) = (num / g, den / g);
        if den < 0 {
            num = -num;
            den = -den;
        }
        while num.abs() > i32::MAX as i64 || den > i32::MAX as i64 {
            num /= 2;
            den /= 2;
        }
        Rational::new(num as i32, den.max(1) as i32)
    }

    pub fn as_f64(&self) -> f64 {
        if self.den == 0 {
            0.0
        } else {
            self.num as f64 / self.den as f64
        }
    }
}

impl Default for Rational {
    fn default() -> Self {
        Self::UNSET
    }
}

impl std::fmt::Display for Rational {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.num, self.den)
    }
}

fn gcd(mut a: u64, mut b: u64) -> u64 {
    while b != 0 {
        let t = a % b;
        a = b;
        b = t;
    }
    a
}

/// Pipeline pixel format
///
/// Software formats describe host-memory layouts. `Amf`, `D3d11` and
/// `Dxva2Vld` are opaque hardware formats whose pixels live behind a handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PixelFormat {
    #[serde(rename = "nv12")]
    Nv12,
    #[serde(rename = "p010")]
    P010,
    #[serde(rename = "0rgb")]
    Zrgb,
    #[serde(rename = "bgr0")]
    Bgr0,
    #[serde(rename = "bgra")]
    Bgra,
    #[serde(rename = "rgb0")]
    Rgb0,
    #[serde(rename = "rgba")]
    Rgba,
    #[serde(rename = "argb")]
    Argb,
    #[serde(rename = "gray8")]
    Gray8,
    #[serde(rename = "yuv420p")]
    Yuv420p,
    #[serde(rename = "yuv420p10")]
    Yuv420p10,
    #[serde(rename = "yuyv422")]
    Yuyv422,
    #[serde(rename = "amf")]
    Amf,
    #[serde(rename = "d3d11")]
    D3d11,
    #[serde(rename = "dxva2_vld")]
    Dxva2Vld,
}

impl PixelFormat {
    pub const ALL: [PixelFormat; 15] = [
        PixelFormat::Nv12,
        PixelFormat::P010,
        PixelFormat::Zrgb,
        PixelFormat::Bgr0,
        PixelFormat::Bgra,
        PixelFormat::Rgb0,
        PixelFormat::Rgba,
        PixelFormat::Argb,
        PixelFormat::Gray8,
        PixelFormat::Yuv420p,
        PixelFormat::Yuv420p10,
        PixelFormat::Yuyv422,
        PixelFormat::Amf,
        PixelFormat::D3d11,
        PixelFormat::Dxva2Vld,
    ];

    /// Canonical format name
    pub fn name(&self) -> &'static str {
        match self {
            PixelFormat::Nv12 => "nv12",
            PixelFormat::P010 => "p010",
            PixelFormat::Zrgb => "0rgb",
            PixelFormat::Bgr0 => "bgr0",
            PixelFormat::Bgra => "bgra",
            PixelFormat::Rgb0 => "rgb0",
            PixelFormat::Rgba => "rgba",
            PixelFormat::Argb => "argb",
            PixelFormat::Gray8 => "gray8",
            PixelFormat::Yuv420p => "yuv420p",
            PixelFormat::Yuv420p10 => "yuv420p10",
            PixelFormat::Yuyv422 => "yuyv422",
            PixelFormat::Amf => "amf",
            PixelFormat::D3d11 => "d3d11",
            PixelFormat::Dxva2Vld => "dxva2_vld",
        }
    }

    /// Look up a format by name (case-insensitive, a few common aliases)
    pub fn from_name(name: &str) -> Option<Self> {
        let lower = name.trim().to_ascii_lowercase();
        let alias = match lower.as_str() {
            "p010le" => "p010",
            "yuv420p10le" => "yuv420p10",
            "yuy2" => "yuyv422",
            "gray" => "gray8",
            "dxva2" => "dxva2_vld",
            other => other,
        };
        Self::ALL.iter().copied().find(|f| f.name() == alias)
    }

    /// Opaque hardware format (pixels are not host-addressable)
    pub fn is_hardware(&self) -> bool {
        matches!(
            self,
            PixelFormat::Amf | PixelFormat::D3d11 | PixelFormat::Dxva2Vld
        )
    }

    pub fn is_rgb(&self) -> bool {
        matches!(
            self,
            PixelFormat::Zrgb
                | PixelFormat::Bgr0
                | PixelFormat::Bgra
                | PixelFormat::Rgb0
                | PixelFormat::Rgba
                | PixelFormat::Argb
        )
    }

    /// log2 of the horizontal and vertical chroma subsampling
    pub fn chroma_shift(&self) -> (u32, u32) {
        match self {
            PixelFormat::Nv12
            | PixelFormat::P010
            | PixelFormat::Yuv420p
            | PixelFormat::Yuv420p10 => (1, 1),
            PixelFormat::Yuyv422 => (1, 0),
            _ => (0, 0),
        }
    }

    /// Row length in bytes and row count of every plane for a frame of the
    /// given size. Hardware formats have no host planes.
    pub fn plane_geometry(&self, width: u32, height: u32) -> Vec<(usize, usize)> {
        let w = width as usize;
        let h = height as usize;
        let cw = (w + 1) / 2;
        let ch = (h + 1) / 2;
        match self {
            PixelFormat::Nv12 => vec![(w, h), (cw * 2, ch)],
            PixelFormat::P010 => vec![(w * 2, h), (cw * 4, ch)],
            PixelFormat::Zrgb
            | PixelFormat::Bgr0
            | PixelFormat::Bgra
            | PixelFormat::Rgb0
            | PixelFormat::Rgba
            | PixelFormat::Argb => vec![(w * 4, h)],
            PixelFormat::Gray8 => vec![(w, h)],
            PixelFormat::Yuv420p => vec![(w, h), (cw, ch), (cw, ch)],
            PixelFormat::Yuv420p10 => vec![(w * 2, h), (cw * 2, ch), (cw * 2, ch)],
            PixelFormat::Yuyv422 => vec![(cw * 4, h)],
            PixelFormat::Amf | PixelFormat::D3d11 | PixelFormat::Dxva2Vld => Vec::new(),
        }
    }
}

impl std::fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for PixelFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_name(s).ok_or_else(|| Error::Config(format!("Unrecognized pixel format: {}", s)))
    }
}

/// Nominal signal range of a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ColorRange {
    #[default]
    Unspecified,
    /// Limited / studio / "MPEG" range
    Limited,
    /// Full / "JPEG" range
    Full,
}

/// YUV matrix coefficients carried on a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ColorSpace {
    Rgb,
    Bt709,
    #[default]
    Unspecified,
    Fcc,
    Bt470bg,
    /// BT.601 (525 line)
    Smpte170m,
    Smpte240m,
    Ycgco,
    Bt2020Ncl,
    Bt2020Cl,
}

macro_rules! coded_enum {
    (
        $(#[$meta:meta])*
        $name:ident { $( $(#[$vmeta:meta])* $variant:ident = $code:literal, $opt:literal; )+ }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $( $(#[$vmeta])* #[serde(rename = $opt)] $variant, )+
        }

        impl $name {
            /// Numeric code (ISO/IEC 23091-4, shared by the pipeline and the accelerator)
            pub fn code(&self) -> i64 {
                match self {
                    $( $name::$variant => $code, )+
                }
            }

            /// Option name
            pub fn name(&self) -> &'static str {
                match self {
                    $( $name::$variant => $opt, )+
                }
            }

            pub fn from_code(code: i64) -> Option<Self> {
                match code {
                    $( $code => Some($name::$variant), )+
                    _ => None,
                }
            }
        }

        impl FromStr for $name {
            type Err = Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim().to_ascii_lowercase().as_str() {
                    $( $opt => Ok($name::$variant), )+
                    other => Err(Error::Config(format!(
                        "Unknown {} value: {}",
                        stringify!($name),
                        other
                    ))),
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.name())
            }
        }
    };
}

coded_enum! {
    /// Color primaries
    ColorPrimaries {
        Bt709 = 1, "bt709";
        Unspecified = 2, "unspecified";
        Bt470m = 4, "bt470m";
        Bt470bg = 5, "bt470bg";
        Smpte170m = 6, "smpte170m";
        Smpte240m = 7, "smpte240m";
        Film = 8, "film";
        Bt2020 = 9, "bt2020";
        Smpte428 = 10, "smpte428";
        Smpte431 = 11, "smpte431";
        Smpte432 = 12, "smpte432";
        JedecP22 = 22, "jedec-p22";
    }
}

coded_enum! {
    /// Transfer characteristic
    TransferCharacteristic {
        Bt709 = 1, "bt709";
        Unspecified = 2, "unspecified";
        Gamma22 = 4, "gamma22";
        Gamma28 = 5, "gamma28";
        Smpte170m = 6, "smpte170m";
        Smpte240m = 7, "smpte240m";
        Linear = 8, "linear";
        Log = 9, "log";
        LogSqrt = 10, "log-sqrt";
        Iec61966_2_4 = 11, "iec61966-2-4";
        Bt1361Ecg = 12, "bt1361-ecg";
        Iec61966_2_1 = 13, "iec61966-2-1";
        Bt2020_10 = 14, "bt2020-10";
        Bt2020_12 = 15, "bt2020-12";
        Smpte2084 = 16, "smpte2084";
        Smpte428 = 17, "smpte428";
        AribStdB67 = 18, "arib-std-b67";
    }
}

impl Default for ColorPrimaries {
    fn default() -> Self {
        ColorPrimaries::Unspecified
    }
}

impl Default for TransferCharacteristic {
    fn default() -> Self {
        TransferCharacteristic::Unspecified
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pixel_format_names() {
        for fmt in PixelFormat::ALL {
            assert_eq!(PixelFormat::from_name(fmt.name()), Some(fmt));
        }
        assert_eq!(PixelFormat::from_name("P010LE"), Some(PixelFormat::P010));
        assert!("nonsense".parse::<PixelFormat>().is_err());
    }

    #[test]
    fn test_plane_geometry() {
        assert_eq!(
            PixelFormat::Nv12.plane_geometry(1920, 1080),
            vec![(1920, 1080), (1920, 540)]
        );
        assert_eq!(
            PixelFormat::Yuv420p.plane_geometry(5, 3),
            vec![(5, 3), (3, 2), (3, 2)]
        );
        assert!(PixelFormat::Amf.plane_geometry(64, 64).is_empty());
    }

    #[test]
    fn test_rational_mul_reduces() {
        let sar = Rational::new(4, 3).mul(Rational::new(540 * 1920, 960 * 1080));
        assert_eq!(sar, Rational::new(4, 3));
        assert_eq!(Rational::reduce(10, -4), Rational::new(-5, 2));
        assert!(!Rational::UNSET.is_set());
    }

    #[test]
    fn test_color_codes() {
        assert_eq!(ColorPrimaries::JedecP22.code(), 22);
        assert_eq!(
            "arib-std-b67".parse::<TransferCharacteristic>().unwrap(),
            TransferCharacteristic::AribStdB67
        );
        assert_eq!(TransferCharacteristic::from_code(16), Some(TransferCharacteristic::Smpte2084));
    }

    #[test]
    fn test_resolution_parse() {
        let res: Resolution = "1280x720".parse().unwrap();
        assert_eq!(res, Resolution::HD_720P);
        assert!("1280".parse::<Resolution>().is_err());
    }
}
