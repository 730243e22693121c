//! Output dimension resolution

use super::expr::{Expr, Vars};
use crate::config::{AspectRatioPolicy, ScaleConfig};
use crate::error::{Error, Result};
use crate::types::{PixelFormat, Rational, Resolution};

/// What the resolver knows about the input link
#[derive(Debug, Clone, Copy)]
pub struct DimsInput {
    pub width: u32,
    pub height: u32,
    pub sample_aspect_ratio: Rational,
    pub in_format: PixelFormat,
    pub out_format: PixelFormat,
}

/// `a * b / c` rounded to nearest, ties away from zero
fn rescale(a: i64, b: i64, c: i64) -> i64 {
    if c == 0 {
        return 0;
    }
    let num = a as i128 * b as i128;
    let den = c as i128;
    let negative = (num < 0) != (den < 0);
    let (num, den) = (num.abs(), den.abs());
    let q = (num + den / 2) / den;
    (if negative { -q } else { q }) as i64
}

fn to_int(expr: &Expr, value: f64) -> Result<i64> {
    if !value.is_finite() || value.abs() > i32::MAX as f64 {
        return Err(Error::InvalidExpression {
            expr: expr.source().to_string(),
            reason: format!("evaluates to {}", value),
        });
    }
    Ok(value.trunc() as i64)
}

/// Evaluate the width/height expressions.
///
/// Width is evaluated, then height (which may use `ow`), then width again
/// (which may use `oh`). Zero selects the input size; negative values
/// derive the dimension from the other one keeping the input aspect ratio,
/// `-n` additionally rounding it to a multiple of `n`.
pub fn eval_dimensions(w_expr: &str, h_expr: &str, input: &DimsInput) -> Result<(i64, i64)> {
    let w_parsed = Expr::parse(w_expr)?;
    let h_parsed = Expr::parse(h_expr)?;

    let in_w = input.width as f64;
    let in_h = input.height as f64;
    let sar = if input.sample_aspect_ratio.is_set() {
        input.sample_aspect_ratio.as_f64()
    } else {
        1.0
    };
    let (hsub, vsub) = input.in_format.chroma_shift();
    let (ohsub, ovsub) = input.out_format.chroma_shift();
    let a = in_w / in_h;

    let mut vars = Vars {
        in_w,
        in_h,
        out_w: f64::NAN,
        out_h: f64::NAN,
        a,
        sar,
        dar: a * sar,
        hsub: (1u32 << hsub) as f64,
        vsub: (1u32 << vsub) as f64,
        ohsub: (1u32 << ohsub) as f64,
        ovsub: (1u32 << ovsub) as f64,
    };

    vars.out_w = w_parsed.eval(&vars);
    vars.out_h = h_parsed.eval(&vars);
    let h_value = vars.out_h;
    vars.out_w = w_parsed.eval(&vars);
    let w_value = vars.out_w;

    let w = to_int(&w_parsed, w_value)?;
    let h = to_int(&h_parsed, h_value)?;

    let in_w = input.width as i64;
    let in_h = input.height as i64;
    let mut w = if w == 0 { in_w } else { w };
    let mut h = if h == 0 { in_h } else { h };

    let factor_w = if w < -1 { -w } else { 1 };
    let factor_h = if h < -1 { -h } else { 1 };

    if w < 0 && h < 0 {
        w = in_w;
        h = in_h;
    }
    if w < 0 {
        w = rescale(h, in_w, in_h * factor_w) * factor_w;
    }
    if h < 0 {
        h = rescale(w, in_h, in_w * factor_h) * factor_h;
    }

    Ok((w, h))
}

/// Apply the aspect-ratio policy and divisibility constraint
pub fn adjust_dimensions(
    in_w: u32,
    in_h: u32,
    w: i64,
    h: i64,
    policy: AspectRatioPolicy,
    divisible_by: u32,
) -> (i64, i64) {
    let (in_w, in_h) = (in_w as i64, in_h as i64);
    let div = divisible_by.max(1) as i64;

    match policy {
        AspectRatioPolicy::Disable => (w, h),
        AspectRatioPolicy::Decrease => {
            let tmp_w = rescale(h, in_w, in_h);
            let tmp_h = rescale(w, in_h, in_w);
            let w = tmp_w.min(w);
            let h = tmp_h.min(h);
            (w / div * div, h / div * div)
        }
        AspectRatioPolicy::Increase => {
            let tmp_w = rescale(h, in_w, in_h);
            let tmp_h = rescale(w, in_h, in_w);
            let w = tmp_w.max(w);
            let h = tmp_h.max(h);
            ((w + div - 1) / div * div, (h + div - 1) / div * div)
        }
    }
}

/// Resolve the final output size for `config`
pub fn resolve(config: &ScaleConfig, input: &DimsInput) -> Result<Resolution> {
    let (w, h) = eval_dimensions(&config.width, &config.height, input)?;
    let (w, h) = adjust_dimensions(
        input.width,
        input.height,
        w,
        h,
        config.force_original_aspect_ratio,
        config.force_divisible_by,
    );

    if w <= 0 || h <= 0 || w > i32::MAX as i64 || h > i32::MAX as i64 {
        return Err(Error::Config(format!(
            "Resolved output size {}x{} is invalid",
            w, h
        )));
    }
    Ok(Resolution::new(w as u32, h as u32))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(width: u32, height: u32) -> DimsInput {
        DimsInput {
            width,
            height,
            sample_aspect_ratio: Rational::UNSET,
            in_format: PixelFormat::Nv12,
            out_format: PixelFormat::Nv12,
        }
    }

    fn resolve_str(w: &str, h: &str, width: u32, height: u32) -> Result<Resolution> {
        resolve(&ScaleConfig::default().with_size(w, h), &input(width, height))
    }

    #[test]
    fn test_half_size() {
        assert_eq!(
            resolve_str("iw/2", "ih/2", 1920, 1080).unwrap(),
            Resolution::new(960, 540)
        );
    }

    #[test]
    fn test_zero_means_input() {
        assert_eq!(resolve_str("0", "0", 640, 480).unwrap(), Resolution::new(640, 480));
    }

    #[test]
    fn test_keep_aspect() {
        assert_eq!(
            resolve_str("1280", "-1", 1920, 1080).unwrap(),
            Resolution::new(1280, 720)
        );
        // 853.33 rounded, then made even
        assert_eq!(
            resolve_str("-2", "480", 1920, 1080).unwrap(),
            Resolution::new(854, 480)
        );
        assert_eq!(
            resolve_str("-1", "-1", 320, 240).unwrap(),
            Resolution::new(320, 240)
        );
    }

    #[test]
    fn test_height_then_width_order() {
        assert_eq!(
            resolve_str("oh*2", "360", 1920, 1080).unwrap(),
            Resolution::new(720, 360)
        );
        assert_eq!(
            resolve_str("640", "ow/2", 1920, 1080).unwrap(),
            Resolution::new(640, 320)
        );
    }

    #[test]
    fn test_subsampling_vars() {
        assert_eq!(
            resolve_str("iw/hsub", "ih/vsub", 64, 32).unwrap(),
            Resolution::new(32, 16)
        );
    }

    #[test]
    fn test_decrease_and_increase() {
        let config = ScaleConfig::default()
            .with_size("1280", "1280")
            .with_aspect_ratio(AspectRatioPolicy::Decrease, 16);
        let res = resolve(&config, &input(1920, 1080)).unwrap();
        assert_eq!(res, Resolution::new(1280, 720));

        let config = ScaleConfig::default()
            .with_size("1280", "1280")
            .with_aspect_ratio(AspectRatioPolicy::Increase, 16);
        let res = resolve(&config, &input(1920, 1080)).unwrap();
        assert_eq!(res, Resolution::new(2288, 1280));
    }

    #[test]
    fn test_policy_bounds_and_divisibility() {
        for (iw, ih) in [(1920u32, 1080u32), (1000, 999), (333, 777), (64, 48), (7, 5000)] {
            for (w, h) in [(640i64, 640i64), (1000, 300), (97, 1001)] {
                for div in [1u32, 2, 4, 16] {
                    let (dw, dh) =
                        adjust_dimensions(iw, ih, w, h, AspectRatioPolicy::Decrease, div);
                    assert!(dw <= w && dh <= h);
                    assert_eq!(dw % div as i64, 0);
                    assert_eq!(dh % div as i64, 0);

                    let (uw, uh) =
                        adjust_dimensions(iw, ih, w, h, AspectRatioPolicy::Increase, div);
                    assert!(uw >= w && uh >= h);
                    assert!(uw > 0 && uh > 0);
                    assert_eq!(uw % div as i64, 0);
                    assert_eq!(uh % div as i64, 0);
                }
            }
        }
    }

    #[test]
    fn test_invalid_results() {
        assert!(resolve_str("iw*100000000", "ih", 1920, 1080).is_err());
        assert!(matches!(
            resolve_str("iw/0", "ih", 1920, 1080),
            Err(Error::InvalidExpression { .. })
        ));
        assert!(resolve_str("iw*", "ih", 1920, 1080).is_err());

        // decrease can round a tiny dimension down to zero
        let config = ScaleConfig::default()
            .with_size("4", "4")
            .with_aspect_ratio(AspectRatioPolicy::Decrease, 8);
        assert!(resolve(&config, &input(1920, 1080)).is_err());
    }

    #[test]
    fn test_rescale_rounding() {
        assert_eq!(rescale(480, 1920, 1080), 853);
        assert_eq!(rescale(1, 3, 2), 2);
        assert_eq!(rescale(-1, 3, 2), -2);
        assert_eq!(rescale(5, 5, 0), 0);
    }
}
