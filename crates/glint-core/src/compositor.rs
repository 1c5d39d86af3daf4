//! Software compositing of overlay images onto RGBA frames.
//!
//! Overlays are drawn by inverse mapping: every canvas pixel inside the
//! destination quad is mapped back into overlay space, sampled with
//! bilinear interpolation, and blended source-over.

use crate::placement::OverlayTransform;
use crate::types::Point;
use image::{Rgba, RgbaImage};

/// Metallic gold used for the earring fallback dots (#D4AF37).
pub const GOLD: Rgba<u8> = Rgba([0xD4, 0xAF, 0x37, 0xFF]);

/// Glow width around fallback dots, in pixels.
pub const DOT_GLOW_PX: f32 = 15.0;

/// Peak opacity of the glow halo just outside the dot edge.
const GLOW_PEAK_ALPHA: f32 = 0.6;

/// Inclusive-exclusive pixel bounds of the quad, clipped to the canvas.
fn clip_bounds(points: &[Point], width: u32, height: u32) -> Option<(u32, u32, u32, u32)> {
    let (mut x0, mut y0) = (f32::INFINITY, f32::INFINITY);
    let (mut x1, mut y1) = (f32::NEG_INFINITY, f32::NEG_INFINITY);
    for p in points {
        x0 = x0.min(p.x);
        y0 = y0.min(p.y);
        x1 = x1.max(p.x);
        y1 = y1.max(p.y);
    }
    if !(x0.is_finite() && y0.is_finite() && x1.is_finite() && y1.is_finite()) {
        return None;
    }

    let left = x0.floor().max(0.0) as u32;
    let top = y0.floor().max(0.0) as u32;
    let right = (x1.ceil().max(0.0) as u32).min(width);
    let bottom = (y1.ceil().max(0.0) as u32).min(height);
    if left >= right || top >= bottom {
        return None;
    }
    Some((left, top, right, bottom))
}

/// Bilinear sample at continuous overlay coordinates, premultiplied by alpha.
///
/// Returns [r*a, g*a, b*a, a] with a in [0, 1]. Edge pixels are clamped.
fn sample_premultiplied(img: &RgbaImage, sx: f32, sy: f32) -> [f32; 4] {
    let (w, h) = (img.width() as i32, img.height() as i32);
    let x0 = sx.floor() as i32;
    let y0 = sy.floor() as i32;
    let fx = sx - x0 as f32;
    let fy = sy - y0 as f32;

    let texel = |x: i32, y: i32| -> [f32; 4] {
        let px = img.get_pixel(x.clamp(0, w - 1) as u32, y.clamp(0, h - 1) as u32);
        let a = px[3] as f32 / 255.0;
        [px[0] as f32 * a, px[1] as f32 * a, px[2] as f32 * a, a]
    };

    let tl = texel(x0, y0);
    let tr = texel(x0 + 1, y0);
    let bl = texel(x0, y0 + 1);
    let br = texel(x0 + 1, y0 + 1);

    let mut out = [0.0f32; 4];
    for c in 0..4 {
        out[c] = tl[c] * (1.0 - fx) * (1.0 - fy)
            + tr[c] * fx * (1.0 - fy)
            + bl[c] * (1.0 - fx) * fy
            + br[c] * fx * fy;
    }
    out
}

/// Source-over blend of a premultiplied color onto one canvas pixel.
fn blend_premultiplied(dst: &mut Rgba<u8>, src: [f32; 4]) {
    let sa = src[3];
    if sa <= 0.0 {
        return;
    }
    let da = dst[3] as f32 / 255.0;
    let out_a = sa + da * (1.0 - sa);
    if out_a <= 0.0 {
        return;
    }
    for c in 0..3 {
        let d = dst[c] as f32 * da;
        let v = (src[c] + d * (1.0 - sa)) / out_a;
        dst[c] = v.round().clamp(0.0, 255.0) as u8;
    }
    dst[3] = (out_a * 255.0).round().clamp(0.0, 255.0) as u8;
}

/// Draw `overlay` onto `canvas` at transform `t`.
pub fn draw_overlay(canvas: &mut RgbaImage, overlay: &RgbaImage, t: &OverlayTransform) {
    if overlay.width() == 0 || overlay.height() == 0 || t.width <= 0.0 || t.height <= 0.0 {
        return;
    }
    let Some((left, top, right, bottom)) = clip_bounds(&t.corners(), canvas.width(), canvas.height())
    else {
        return;
    };

    let ow = overlay.width() as f32;
    let oh = overlay.height() as f32;
    let half_w = t.width / 2.0;

    for y in top..bottom {
        for x in left..right {
            let local = t.to_local(Point::new(x as f32 + 0.5, y as f32 + 0.5));
            if local.x < -half_w || local.x >= half_w || local.y < 0.0 || local.y >= t.height {
                continue;
            }

            let mut u = (local.x + half_w) / t.width * ow;
            if t.mirrored {
                u = ow - u;
            }
            let v = local.y / t.height * oh;

            let src = sample_premultiplied(overlay, u - 0.5, v - 0.5);
            blend_premultiplied(canvas.get_pixel_mut(x, y), src);
        }
    }
}

/// Draw a solid dot with a soft glow halo `glow` pixels wide.
pub fn draw_glow_dot(canvas: &mut RgbaImage, center: Point, radius: f32, color: Rgba<u8>, glow: f32) {
    if !(radius > 0.0) {
        return;
    }
    let glow = glow.max(0.0);
    let reach = radius + glow;
    let quad = [
        Point::new(center.x - reach, center.y - reach),
        Point::new(center.x + reach, center.y + reach),
    ];
    let Some((left, top, right, bottom)) = clip_bounds(&quad, canvas.width(), canvas.height()) else {
        return;
    };

    let color_a = color[3] as f32 / 255.0;
    for y in top..bottom {
        for x in left..right {
            let d = Point::new(x as f32 + 0.5, y as f32 + 0.5).distance(&center);
            let coverage = if d <= radius {
                1.0
            } else if glow > 0.0 && d < reach {
                let falloff = 1.0 - (d - radius) / glow;
                GLOW_PEAK_ALPHA * falloff * falloff
            } else {
                continue;
            };

            let a = coverage * color_a;
            let src = [color[0] as f32 * a, color[1] as f32 * a, color[2] as f32 * a, a];
            blend_premultiplied(canvas.get_pixel_mut(x, y), src);
        }
    }
}
