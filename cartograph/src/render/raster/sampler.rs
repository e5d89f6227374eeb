use cartograph_types::{Box2d, Point2d};
use nalgebra::Matrix3;

use super::blend::blend_pixel;
use crate::image::ImageRgba8;
use crate::style::{CompOp, Scaling};

/// Draws the premultiplied `src` image into `dst`.
///
/// `transform` maps source pixel coordinates into destination pixel coordinates. Every destination
/// pixel inside the transformed source is sampled at its center. Returns true if anything was
/// drawn.
pub fn draw_image(
    dst: &mut ImageRgba8,
    src: &ImageRgba8,
    transform: &Matrix3<f64>,
    scaling: Scaling,
    opacity: f64,
    op: CompOp,
) -> bool {
    let opacity = opacity.clamp(0.0, 1.0);
    if src.is_empty() || opacity <= 0.0 {
        return false;
    }
    let Some(inverse) = transform.try_inverse() else {
        log::debug!("Image transform is not invertible");
        return false;
    };

    let bbox = Box2d::new(0.0, 0.0, src.width() as f64, src.height() as f64)
        .transform(transform)
        .intersect(&Box2d::new(0.0, 0.0, dst.width() as f64, dst.height() as f64));
    if !bbox.is_valid() {
        return false;
    }

    let x0 = bbox.min_x().floor().max(0.0) as u32;
    let x1 = (bbox.max_x().ceil() as u32).min(dst.width());
    let y0 = bbox.min_y().floor().max(0.0) as u32;
    let y1 = (bbox.max_y().ceil() as u32).min(dst.height());

    let mut painted = false;
    for y in y0..y1 {
        let row = dst.row_mut(y);
        for x in x0..x1 {
            let p = inverse.transform_point(&Point2d::new(x as f64 + 0.5, y as f64 + 0.5));
            let Some(pixel) = sample(src, p.x, p.y, scaling) else {
                continue;
            };

            let pixel = if opacity < 1.0 {
                pixel.map(|c| (c as f64 * opacity).round() as u8)
            } else {
                pixel
            };
            if pixel[3] == 0 && op == CompOp::SrcOver {
                continue;
            }

            blend_pixel(op, &mut row[x as usize], pixel, 255);
            painted = true;
        }
    }

    if painted {
        dst.set_painted(true);
    }
    painted
}

/// Pixel of the image at the point, `None` outside of the image.
fn sample(src: &ImageRgba8, x: f64, y: f64, scaling: Scaling) -> Option<[u8; 4]> {
    let (w, h) = (src.width() as f64, src.height() as f64);
    if !(0.0..w).contains(&x) || !(0.0..h).contains(&y) {
        return None;
    }

    match scaling {
        Scaling::Near => src.pixel(x as u32, y as u32),
        Scaling::Bilinear => {
            let fx = (x - 0.5).clamp(0.0, w - 1.0);
            let fy = (y - 0.5).clamp(0.0, h - 1.0);
            let (ix, iy) = (fx.floor() as u32, fy.floor() as u32);
            let (tx, ty) = (fx - ix as f64, fy - iy as f64);
            let nx = (ix + 1).min(src.width() - 1);
            let ny = (iy + 1).min(src.height() - 1);

            let p00 = src.pixel(ix, iy)?;
            let p10 = src.pixel(nx, iy)?;
            let p01 = src.pixel(ix, ny)?;
            let p11 = src.pixel(nx, ny)?;

            let mut result = [0u8; 4];
            for (c, value) in result.iter_mut().enumerate() {
                let top = p00[c] as f64 * (1.0 - tx) + p10[c] as f64 * tx;
                let bottom = p01[c] as f64 * (1.0 - tx) + p11[c] as f64 * tx;
                *value = (top * (1.0 - ty) + bottom * ty).round() as u8;
            }
            Some(result)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Color;

    fn target() -> ImageRgba8 {
        let mut image = ImageRgba8::new(4, 4);
        image.set_premultiplied(true);
        image
    }

    fn checker() -> ImageRgba8 {
        let mut image = ImageRgba8::new(2, 1);
        image.set_premultiplied(true);
        image.set_pixel(0, 0, Color::RED.to_premultiplied());
        image.set_pixel(1, 0, Color::BLUE.to_premultiplied());
        image
    }

    #[test]
    fn translated_copy() {
        let mut dst = target();
        let transform = Matrix3::new_translation(&nalgebra::Vector2::new(1.0, 2.0));
        assert!(draw_image(&mut dst, &checker(), &transform, Scaling::Near, 1.0, CompOp::SrcOver));

        assert_eq!(dst.pixel(1, 2), Some([255, 0, 0, 255]));
        assert_eq!(dst.pixel(2, 2), Some([0, 0, 255, 255]));
        assert_eq!(dst.pixel(0, 2), Some([0, 0, 0, 0]));
        assert_eq!(dst.pixel(1, 1), Some([0, 0, 0, 0]));
        assert!(dst.painted());
    }

    #[test]
    fn scaled_nearest() {
        let mut dst = target();
        let transform = Matrix3::new_nonuniform_scaling(&nalgebra::Vector2::new(2.0, 4.0));
        draw_image(&mut dst, &checker(), &transform, Scaling::Near, 1.0, CompOp::SrcOver);

        for y in 0..4 {
            assert_eq!(dst.pixel(1, y), Some([255, 0, 0, 255]));
            assert_eq!(dst.pixel(2, y), Some([0, 0, 255, 255]));
        }
    }

    #[test]
    fn bilinear_blends_neighbours() {
        let mut dst = ImageRgba8::new(3, 1);
        dst.set_premultiplied(true);
        let transform = Matrix3::new_nonuniform_scaling(&nalgebra::Vector2::new(1.5, 1.0));
        draw_image(&mut dst, &checker(), &transform, Scaling::Bilinear, 1.0, CompOp::Src);

        assert_eq!(dst.pixel(0, 0), Some([255, 0, 0, 255]));
        assert_eq!(dst.pixel(1, 0), Some([128, 0, 128, 255]));
        assert_eq!(dst.pixel(2, 0), Some([0, 0, 255, 255]));
    }

    #[test]
    fn opacity_and_outside() {
        let mut dst = target();
        let transform = Matrix3::new_translation(&nalgebra::Vector2::new(10.0, 0.0));
        assert!(!draw_image(&mut dst, &checker(), &transform, Scaling::Near, 1.0, CompOp::SrcOver));
        assert!(!dst.painted());

        draw_image(&mut dst, &checker(), &Matrix3::identity(), Scaling::Near, 0.5, CompOp::SrcOver);
        assert_eq!(dst.pixel(0, 0), Some([128, 0, 0, 128]));
    }
}
