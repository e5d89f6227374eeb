//! Compositing of premultiplied RGBA pixels.

use crate::image::ImageRgba8;
use crate::style::CompOp;

type Rgba = [f64; 4];

fn to_f64(p: [u8; 4]) -> Rgba {
    [
        p[0] as f64 / 255.0,
        p[1] as f64 / 255.0,
        p[2] as f64 / 255.0,
        p[3] as f64 / 255.0,
    ]
}

fn to_u8(p: Rgba) -> [u8; 4] {
    let a = p[3].clamp(0.0, 1.0);
    let c = |v: f64| (v.clamp(0.0, a) * 255.0).round() as u8;
    [c(p[0]), c(p[1]), c(p[2]), (a * 255.0).round() as u8]
}

/// Blends the premultiplied source pixel into the premultiplied destination pixel.
///
/// `coverage` works as a mask: the result is interpolated between the destination and the full
/// operation result.
pub fn blend_pixel(op: CompOp, dst: &mut [u8; 4], src: [u8; 4], coverage: u8) {
    if coverage == 0 || op == CompOp::Dst {
        return;
    }

    if op == CompOp::SrcOver && coverage == 255 {
        if src[3] == 255 {
            *dst = src;
            return;
        }
        if src[3] == 0 {
            return;
        }
    }

    let d = to_f64(*dst);
    let s = to_f64(src);
    let result = composite(op, s, d);
    let c = coverage as f64 / 255.0;
    let mixed = [
        d[0] + (result[0] - d[0]) * c,
        d[1] + (result[1] - d[1]) * c,
        d[2] + (result[2] - d[2]) * c,
        d[3] + (result[3] - d[3]) * c,
    ];

    *dst = to_u8(mixed);
}

/// Blends the whole source image into the destination of the same size.
///
/// The source is multiplied by `opacity` first. Both images are expected to be premultiplied.
pub fn blend_image(dst: &mut ImageRgba8, src: &ImageRgba8, op: CompOp, opacity: f64) {
    let opacity = opacity.clamp(0.0, 1.0);
    let scale = |p: [u8; 4]| {
        if opacity >= 1.0 {
            p
        } else {
            p.map(|c| (c as f64 * opacity).round() as u8)
        }
    };

    for (d, s) in dst.data_mut().iter_mut().zip(src.data()) {
        blend_pixel(op, d, scale(*s), 255);
    }
}

fn union_alpha(sa: f64, da: f64) -> f64 {
    sa + da - sa * da
}

/// Applies a separable operation given by the premultiplied channel formula `f(sc, dc, sa, da)`.
fn separable(s: Rgba, d: Rgba, f: impl Fn(f64, f64, f64, f64) -> f64) -> Rgba {
    let (sa, da) = (s[3], d[3]);
    [
        f(s[0], d[0], sa, da),
        f(s[1], d[1], sa, da),
        f(s[2], d[2], sa, da),
        union_alpha(sa, da),
    ]
}

/// Applies a blend function of straight (not premultiplied) colors `B(backdrop, source)`.
fn blend_mode(s: Rgba, d: Rgba, b: impl Fn(f64, f64) -> f64) -> Rgba {
    separable(s, d, |sc, dc, sa, da| {
        let cs = if sa > 0.0 { sc / sa } else { 0.0 };
        let cb = if da > 0.0 { dc / da } else { 0.0 };
        (1.0 - da) * sc + (1.0 - sa) * dc + sa * da * b(cb, cs)
    })
}

fn composite(op: CompOp, s: Rgba, d: Rgba) -> Rgba {
    let (sa, da) = (s[3], d[3]);
    let per_channel = |f: &dyn Fn(f64, f64) -> f64| {
        [f(s[0], d[0]), f(s[1], d[1]), f(s[2], d[2]), f(s[3], d[3])]
    };

    match op {
        CompOp::Clear => [0.0; 4],
        CompOp::Src => s,
        CompOp::Dst => d,
        CompOp::SrcOver => per_channel(&|sc, dc| sc + dc * (1.0 - sa)),
        CompOp::DstOver => per_channel(&|sc, dc| dc + sc * (1.0 - da)),
        CompOp::SrcIn => per_channel(&|sc, _| sc * da),
        CompOp::DstIn => per_channel(&|_, dc| dc * sa),
        CompOp::SrcOut => per_channel(&|sc, _| sc * (1.0 - da)),
        CompOp::DstOut => per_channel(&|_, dc| dc * (1.0 - sa)),
        CompOp::SrcAtop => {
            let mut r = per_channel(&|sc, dc| sc * da + dc * (1.0 - sa));
            r[3] = da;
            r
        }
        CompOp::DstAtop => {
            let mut r = per_channel(&|sc, dc| dc * sa + sc * (1.0 - da));
            r[3] = sa;
            r
        }
        CompOp::Xor => per_channel(&|sc, dc| sc * (1.0 - da) + dc * (1.0 - sa)),
        CompOp::Plus => per_channel(&|sc, dc| (sc + dc).min(1.0)),
        CompOp::Minus => separable(s, d, |sc, dc, _, _| (dc - sc).max(0.0)),
        CompOp::Multiply => separable(s, d, |sc, dc, sa, da| {
            sc * dc + sc * (1.0 - da) + dc * (1.0 - sa)
        }),
        CompOp::Screen => separable(s, d, |sc, dc, _, _| sc + dc - sc * dc),
        CompOp::Overlay => separable(s, d, |sc, dc, sa, da| {
            let rest = sc * (1.0 - da) + dc * (1.0 - sa);
            if 2.0 * dc <= da {
                2.0 * sc * dc + rest
            } else {
                sa * da - 2.0 * (da - dc) * (sa - sc) + rest
            }
        }),
        CompOp::Darken => separable(s, d, |sc, dc, sa, da| {
            (sc * da).min(dc * sa) + sc * (1.0 - da) + dc * (1.0 - sa)
        }),
        CompOp::Lighten => separable(s, d, |sc, dc, sa, da| {
            (sc * da).max(dc * sa) + sc * (1.0 - da) + dc * (1.0 - sa)
        }),
        CompOp::ColorDodge => separable(s, d, |sc, dc, sa, da| {
            let rest = sc * (1.0 - da) + dc * (1.0 - sa);
            if sc * da + dc * sa >= sa * da || sa <= 0.0 || sc >= sa {
                sa * da + rest
            } else {
                dc * sa / (1.0 - sc / sa) + rest
            }
        }),
        CompOp::ColorBurn => separable(s, d, |sc, dc, sa, da| {
            let rest = sc * (1.0 - da) + dc * (1.0 - sa);
            if sc * da + dc * sa <= sa * da || sc <= 0.0 {
                rest
            } else {
                sa * (sc * da + dc * sa - sa * da) / sc + rest
            }
        }),
        CompOp::HardLight => separable(s, d, |sc, dc, sa, da| {
            let rest = sc * (1.0 - da) + dc * (1.0 - sa);
            if 2.0 * sc < sa {
                2.0 * sc * dc + rest
            } else {
                sa * da - 2.0 * (da - dc) * (sa - sc) + rest
            }
        }),
        CompOp::SoftLight => separable(s, d, |sc, dc, sa, da| {
            let rest = sc * (1.0 - da) + dc * (1.0 - sa);
            let ratio = if da > 0.0 { dc / da } else { 0.0 };
            if 2.0 * sc < sa {
                dc * (sa + (1.0 - ratio) * (2.0 * sc - sa)) + rest
            } else if 8.0 * dc <= da {
                dc * (sa + (1.0 - ratio) * (2.0 * sc - sa) * (3.0 - 8.0 * ratio)) + rest
            } else {
                dc * sa + (ratio.sqrt() * da - dc) * (2.0 * sc - sa) + rest
            }
        }),
        CompOp::Difference => separable(s, d, |sc, dc, sa, da| {
            sc + dc - 2.0 * (sc * da).min(dc * sa)
        }),
        CompOp::Exclusion => separable(s, d, |sc, dc, sa, da| {
            sc * da + dc * sa - 2.0 * sc * dc + sc * (1.0 - da) + dc * (1.0 - sa)
        }),
        CompOp::Contrast => separable(s, d, |sc, dc, sa, da| {
            (dc - da / 2.0) * (2.0 * sc - sa + 1.0) + da / 2.0
        }),
        CompOp::Invert => separable(s, d, |_, dc, sa, da| (da - dc) * sa + dc * (1.0 - sa)),
        CompOp::InvertRgb => separable(s, d, |sc, dc, sa, da| (da - dc) * sc + dc * (1.0 - sa)),
        CompOp::GrainMerge => blend_mode(s, d, |cb, cs| (cb + cs - 0.5).clamp(0.0, 1.0)),
        CompOp::GrainExtract => blend_mode(s, d, |cb, cs| (cb - cs + 0.5).clamp(0.0, 1.0)),
        CompOp::LinearDodge => blend_mode(s, d, |cb, cs| (cb + cs).min(1.0)),
        CompOp::LinearBurn => blend_mode(s, d, |cb, cs| (cb + cs - 1.0).max(0.0)),
        CompOp::Divide => blend_mode(s, d, |cb, cs| {
            if cs <= 0.0 {
                if cb > 0.0 {
                    1.0
                } else {
                    0.0
                }
            } else {
                (cb / cs).min(1.0)
            }
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn apply(op: CompOp, dst: [u8; 4], src: [u8; 4]) -> [u8; 4] {
        let mut d = dst;
        blend_pixel(op, &mut d, src, 255);
        d
    }

    const RED: [u8; 4] = [255, 0, 0, 255];
    const BLUE: [u8; 4] = [0, 0, 255, 255];
    const HALF_GREEN: [u8; 4] = [0, 128, 0, 128];
    const EMPTY: [u8; 4] = [0, 0, 0, 0];

    #[test]
    fn porter_duff() {
        assert_eq!(apply(CompOp::SrcOver, BLUE, RED), RED);
        assert_eq!(apply(CompOp::SrcOver, BLUE, HALF_GREEN), [0, 128, 127, 255]);
        assert_eq!(apply(CompOp::DstOver, BLUE, RED), BLUE);
        assert_eq!(apply(CompOp::DstOver, EMPTY, HALF_GREEN), HALF_GREEN);
        assert_eq!(apply(CompOp::Clear, BLUE, RED), EMPTY);
        assert_eq!(apply(CompOp::Src, BLUE, HALF_GREEN), HALF_GREEN);
        assert_eq!(apply(CompOp::Dst, BLUE, RED), BLUE);
        assert_eq!(apply(CompOp::SrcIn, EMPTY, RED), EMPTY);
        assert_eq!(apply(CompOp::SrcIn, BLUE, RED), RED);
        assert_eq!(apply(CompOp::DstOut, BLUE, RED), EMPTY);
        assert_eq!(apply(CompOp::SrcOut, EMPTY, RED), RED);
        assert_eq!(apply(CompOp::SrcAtop, EMPTY, RED), EMPTY);
        assert_eq!(apply(CompOp::Xor, BLUE, RED), EMPTY);
    }

    #[test]
    fn blend_modes() {
        let gray = [128, 128, 128, 255];
        assert_eq!(apply(CompOp::Multiply, gray, RED), [128, 0, 0, 255]);
        assert_eq!(apply(CompOp::Screen, gray, RED), [255, 128, 128, 255]);
        assert_eq!(apply(CompOp::Plus, RED, BLUE), [255, 0, 255, 255]);
        assert_eq!(apply(CompOp::Minus, [255, 255, 255, 255], RED), [0, 255, 255, 255]);
        assert_eq!(apply(CompOp::Darken, gray, RED), [128, 0, 0, 255]);
        assert_eq!(apply(CompOp::Lighten, gray, RED), [255, 128, 128, 255]);
        assert_eq!(apply(CompOp::Difference, gray, RED), [127, 128, 128, 255]);
        assert_eq!(apply(CompOp::Invert, RED, BLUE), [0, 255, 255, 255]);
        assert_eq!(apply(CompOp::LinearDodge, gray, RED), [255, 128, 128, 255]);
        assert_eq!(apply(CompOp::LinearBurn, gray, RED), [128, 0, 0, 255]);
    }

    #[test]
    fn all_operations_stay_premultiplied() {
        let pixels = [RED, BLUE, HALF_GREEN, EMPTY, [40, 30, 20, 60], [200, 100, 50, 255]];
        for op in CompOp::ALL {
            for dst in pixels {
                for src in pixels {
                    for coverage in [0, 100, 255] {
                        let mut d = dst;
                        blend_pixel(*op, &mut d, src, coverage);
                        assert!(
                            d[0] <= d[3] && d[1] <= d[3] && d[2] <= d[3],
                            "{op} {dst:?} {src:?} -> {d:?}"
                        );
                    }
                }
            }
        }
    }

    #[test]
    fn partial_coverage() {
        let mut d = BLUE;
        blend_pixel(CompOp::SrcOver, &mut d, RED, 128);
        assert_eq!(d, [128, 0, 127, 255]);

        let mut d = BLUE;
        blend_pixel(CompOp::Clear, &mut d, RED, 0);
        assert_eq!(d, BLUE);
    }

    #[test]
    fn image_with_opacity() {
        let mut dst = ImageRgba8::filled(2, 1, crate::Color::WHITE);
        let src = ImageRgba8::filled(2, 1, crate::Color::BLACK);
        blend_image(&mut dst, &src, CompOp::SrcOver, 0.5);
        assert_eq!(dst.pixel(0, 0), Some([127, 127, 127, 255]));
    }
}
