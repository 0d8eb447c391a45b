//! Image placement.
//!
//! An image occupies the unit square of user space and is mapped to the
//! device by the CTM. Placement walks the device pixels covered by that
//! square and samples the source through the inverse transform, so
//! rotation, shear, and flips all come out right without special cases.

use crate::geom::Rect;
use crate::images::DecodedImage;
use crate::raster::pixmap::Pixmap;
use crate::raster::state::GraphicsState;

/// Draw a decoded image under the current transform, clip, and alpha.
/// Stencil masks paint the fill color through their coverage bits.
pub fn draw_image(pixmap: &mut Pixmap, gs: &GraphicsState, image: &DecodedImage) {
    let Some(inverse) = gs.ctm.invert() else {
        // Degenerate CTM maps the image to nothing.
        return;
    };
    if gs.fill_alpha <= 0.0 {
        return;
    }

    let mut bounds = Rect::new(0.0, 0.0, 1.0, 1.0).transformed(&gs.ctm);
    if let Some(clip) = gs.clip {
        bounds = bounds.intersect(&clip);
    }
    bounds = bounds.intersect(&Rect::new(
        0.0,
        0.0,
        pixmap.width() as f32,
        pixmap.height() as f32,
    ));
    if bounds.is_empty() {
        return;
    }

    let x_start = bounds.x0.floor().max(0.0) as u32;
    let x_end = (bounds.x1.ceil() as u32).min(pixmap.width());
    let y_start = bounds.y0.floor().max(0.0) as u32;
    let y_end = (bounds.y1.ceil() as u32).min(pixmap.height());

    let stencil_rgb = gs.fill_color.to_rgb8();

    for y in y_start..y_end {
        for x in x_start..x_end {
            let cx = x as f32 + 0.5;
            let cy = y as f32 + 0.5;
            if let Some(clip) = gs.clip {
                if cx < clip.x0 || cx >= clip.x1 || cy < clip.y0 || cy >= clip.y1 {
                    continue;
                }
            }
            let (u, v) = inverse.transform_point(cx, cy);
            if !(0.0..1.0).contains(&u) || !(0.0..1.0).contains(&v) {
                continue;
            }
            match image {
                DecodedImage::Pixels {
                    width,
                    height,
                    rgb,
                    alpha,
                } => {
                    let (color, a) =
                        sample_bilinear(rgb, alpha.as_deref(), *width, *height, u, v);
                    let a = a * gs.fill_alpha;
                    if a > 0.0 {
                        pixmap.blend_pixel(x, y, color, a);
                    }
                }
                DecodedImage::Stencil {
                    width,
                    height,
                    coverage,
                } => {
                    if sample_coverage(coverage, *width, *height, u, v) {
                        pixmap.blend_pixel(x, y, stencil_rgb, gs.fill_alpha);
                    }
                }
            }
        }
    }
}

/// Bilinear RGB + alpha lookup. `v` runs bottom-to-top per the unit
/// square; sample row 0 sits at the top.
fn sample_bilinear(
    rgb: &[u8],
    alpha: Option<&[u8]>,
    width: u32,
    height: u32,
    u: f32,
    v: f32,
) -> ([u8; 3], f32) {
    let fx = u * width as f32 - 0.5;
    let fy = (1.0 - v) * height as f32 - 0.5;
    let x0 = fx.floor();
    let y0 = fy.floor();
    let tx = fx - x0;
    let ty = fy - y0;

    let max_x = width as i64 - 1;
    let max_y = height as i64 - 1;
    let cx0 = (x0 as i64).clamp(0, max_x) as usize;
    let cx1 = (x0 as i64 + 1).clamp(0, max_x) as usize;
    let cy0 = (y0 as i64).clamp(0, max_y) as usize;
    let cy1 = (y0 as i64 + 1).clamp(0, max_y) as usize;
    let w = width as usize;

    let mut out = [0u8; 3];
    for c in 0..3 {
        let p00 = rgb[(cy0 * w + cx0) * 3 + c] as f32;
        let p10 = rgb[(cy0 * w + cx1) * 3 + c] as f32;
        let p01 = rgb[(cy1 * w + cx0) * 3 + c] as f32;
        let p11 = rgb[(cy1 * w + cx1) * 3 + c] as f32;
        let top = p00 + (p10 - p00) * tx;
        let bottom = p01 + (p11 - p01) * tx;
        out[c] = (top + (bottom - top) * ty).round().clamp(0.0, 255.0) as u8;
    }

    let a = match alpha {
        Some(plane) => {
            let p00 = plane[cy0 * w + cx0] as f32;
            let p10 = plane[cy0 * w + cx1] as f32;
            let p01 = plane[cy1 * w + cx0] as f32;
            let p11 = plane[cy1 * w + cx1] as f32;
            let top = p00 + (p10 - p00) * tx;
            let bottom = p01 + (p11 - p01) * tx;
            (top + (bottom - top) * ty) / 255.0
        }
        None => 1.0,
    };
    (out, a)
}

/// Nearest-neighbor stencil lookup; interpolating bits makes no sense.
fn sample_coverage(coverage: &[bool], width: u32, height: u32, u: f32, v: f32) -> bool {
    let x = ((u * width as f32) as u32).min(width - 1) as usize;
    let y = (((1.0 - v) * height as f32) as u32).min(height - 1) as usize;
    coverage.get(y * width as usize + x).copied().unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geom::Matrix;
    use crate::raster::pixmap::PixelFormat;
    use crate::raster::state::Color;

    fn two_by_two() -> DecodedImage {
        // Row 0: black, white. Row 1: red, blue.
        DecodedImage::Pixels {
            width: 2,
            height: 2,
            rgb: vec![0, 0, 0, 255, 255, 255, 255, 0, 0, 0, 0, 255],
            alpha: None,
        }
    }

    #[test]
    fn test_unit_square_orientation() {
        let mut pm = Pixmap::new(4, 4, PixelFormat::Rgb8);
        let gs = GraphicsState::new(Matrix::new(4.0, 0.0, 0.0, 4.0, 0.0, 0.0));
        draw_image(&mut pm, &gs, &two_by_two());
        // Device y grows downward here, so sample row 1 lands on row 0.
        assert_eq!(pm.get_pixel(0, 0), [255, 0, 0]);
        assert_eq!(pm.get_pixel(3, 3), [255, 255, 255]);
    }

    #[test]
    fn test_flipped_ctm_puts_top_row_up() {
        let mut pm = Pixmap::new(4, 4, PixelFormat::Rgb8);
        // The usual page transform: y up in user space, down in device.
        let gs = GraphicsState::new(Matrix::new(4.0, 0.0, 0.0, -4.0, 0.0, 4.0));
        draw_image(&mut pm, &gs, &two_by_two());
        assert_eq!(pm.get_pixel(0, 0), [0, 0, 0]);
        assert_eq!(pm.get_pixel(3, 3), [0, 0, 255]);
    }

    #[test]
    fn test_alpha_plane_blends() {
        let mut pm = Pixmap::new(2, 2, PixelFormat::Rgb8);
        let image = DecodedImage::Pixels {
            width: 1,
            height: 1,
            rgb: vec![0, 0, 0],
            alpha: Some(vec![0]),
        };
        let gs = GraphicsState::new(Matrix::new(2.0, 0.0, 0.0, 2.0, 0.0, 0.0));
        draw_image(&mut pm, &gs, &image);
        // Fully transparent image leaves the page white.
        assert_eq!(pm.get_pixel(0, 0), [255, 255, 255]);
    }

    #[test]
    fn test_stencil_paints_fill_color() {
        let mut pm = Pixmap::new(4, 2, PixelFormat::Rgb8);
        let image = DecodedImage::Stencil {
            width: 2,
            height: 1,
            coverage: vec![true, false],
        };
        let mut gs = GraphicsState::new(Matrix::new(4.0, 0.0, 0.0, 2.0, 0.0, 0.0));
        gs.fill_color = Color::rgb(0.0, 1.0, 0.0);
        draw_image(&mut pm, &gs, &image);
        assert_eq!(pm.get_pixel(0, 0), [0, 255, 0]);
        assert_eq!(pm.get_pixel(3, 0), [255, 255, 255]);
    }

    #[test]
    fn test_degenerate_ctm_is_a_no_op() {
        let mut pm = Pixmap::new(2, 2, PixelFormat::Rgb8);
        let gs = GraphicsState::new(Matrix::new(0.0, 0.0, 0.0, 0.0, 1.0, 1.0));
        draw_image(&mut pm, &gs, &two_by_two());
        assert_eq!(pm.get_pixel(1, 1), [255, 255, 255]);
    }

    #[test]
    fn test_clip_restricts_placement() {
        let mut pm = Pixmap::new(4, 4, PixelFormat::Rgb8);
        let mut gs = GraphicsState::new(Matrix::new(4.0, 0.0, 0.0, 4.0, 0.0, 0.0));
        gs.clip = Some(Rect::new(0.0, 0.0, 2.0, 4.0));
        draw_image(&mut pm, &gs, &two_by_two());
        assert_ne!(pm.get_pixel(1, 1), [255, 255, 255]);
        assert_eq!(pm.get_pixel(3, 1), [255, 255, 255]);
    }
}
