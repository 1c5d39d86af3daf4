//! Per-frame try-on rendering: camera frame first, jewelry on top.

use crate::adjust::Adjustments;
use crate::compositor::{draw_glow_dot, draw_overlay, DOT_GLOW_PX, GOLD};
use crate::placement::{place_chain, place_earrings, EarringPlacement, FaceGeometry};
use crate::types::{FaceLandmarks, JewelryKind};
use image::{DynamicImage, RgbImage, RgbaImage};

/// Holds the loaded overlays and current adjustments, and draws them.
#[derive(Default)]
pub struct Renderer {
    chain: Option<RgbaImage>,
    earring: Option<RgbaImage>,
    adjustments: Adjustments,
}

impl Renderer {
    pub fn new(adjustments: Adjustments) -> Self {
        Self {
            chain: None,
            earring: None,
            adjustments,
        }
    }

    /// Replace (or clear) the overlay image for `kind`.
    pub fn set_overlay(&mut self, kind: JewelryKind, image: Option<RgbaImage>) {
        let slot = match kind {
            JewelryKind::Chain => &mut self.chain,
            JewelryKind::Earring => &mut self.earring,
        };
        *slot = image.filter(|img| img.width() > 0 && img.height() > 0);
    }

    /// Dimensions of the loaded overlay for `kind`, if any.
    pub fn overlay_size(&self, kind: JewelryKind) -> Option<(u32, u32)> {
        match kind {
            JewelryKind::Chain => self.chain.as_ref(),
            JewelryKind::Earring => self.earring.as_ref(),
        }
        .map(|img| img.dimensions())
    }

    pub fn adjustments(&self) -> &Adjustments {
        &self.adjustments
    }

    pub fn set_adjustments(&mut self, adjustments: Adjustments) {
        self.adjustments = adjustments;
    }

    /// Composite one output frame.
    ///
    /// With no landmarks the camera frame passes through unchanged. The chain
    /// is drawn whenever one is loaded; earrings only in earring mode, as
    /// dots when no earring image is loaded.
    pub fn render(&self, frame: &RgbImage, landmarks: Option<&FaceLandmarks>) -> RgbaImage {
        let mut canvas = DynamicImage::ImageRgb8(frame.clone()).into_rgba8();

        let Some(landmarks) = landmarks else {
            return canvas;
        };

        let face = match FaceGeometry::from_landmarks(landmarks, frame.width(), frame.height()) {
            Ok(face) => face,
            Err(e) => {
                tracing::warn!(error = %e, "landmark set unusable; drawing frame without overlays");
                return canvas;
            }
        };

        if let Some(chain) = &self.chain {
            match place_chain(&face, chain.width(), chain.height(), &self.adjustments.chain_params()) {
                Some(t) => draw_overlay(&mut canvas, chain, &t),
                None => tracing::trace!("degenerate face geometry; chain skipped"),
            }
        }

        if self.adjustments.show_earrings {
            let size = self.earring.as_ref().map(|img| img.dimensions());
            match place_earrings(&face, size, &self.adjustments.earring_params()) {
                EarringPlacement::Images { left, right } => {
                    if let Some(earring) = &self.earring {
                        draw_overlay(&mut canvas, earring, &left);
                        draw_overlay(&mut canvas, earring, &right);
                    }
                }
                EarringPlacement::Dots { left, right, radius } => {
                    draw_glow_dot(&mut canvas, left, radius, GOLD, DOT_GLOW_PX);
                    draw_glow_dot(&mut canvas, right, radius, GOLD, DOT_GLOW_PX);
                }
            }
        }

        canvas
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::placement::tests::frontal_face;
    use image::{Rgb, Rgba};

    const GREY: Rgb<u8> = Rgb([40, 40, 40]);
    const RED: Rgba<u8> = Rgba([255, 0, 0, 255]);

    fn frame() -> RgbImage {
        RgbImage::from_pixel(200, 200, GREY)
    }

    #[test]
    fn test_passthrough_without_face() {
        let mut r = Renderer::default();
        r.set_overlay(JewelryKind::Chain, Some(RgbaImage::from_pixel(10, 10, RED)));
        let out = r.render(&frame(), None);
        assert_eq!(out.dimensions(), (200, 200));
        assert!(out.pixels().all(|p| *p == Rgba([40, 40, 40, 255])));
    }

    #[test]
    fn test_chain_drawn_below_chin() {
        let mut r = Renderer::default();
        r.set_overlay(JewelryKind::Chain, Some(RgbaImage::from_pixel(10, 10, RED)));
        let face = frontal_face();
        let out = r.render(&frame(), Some(&face));

        // 200px frame: jaw 80..120 at y=100, chin y=140, face length 40.
        // drop = 12 + 0.2*40*0.8 = 18.4; user = -0.2*40*3 = -24; shift 6 → anchor y = 140.4
        assert_eq!(*out.get_pixel(100, 150), RED);
        assert_eq!(*out.get_pixel(100, 120), Rgba([40, 40, 40, 255]));
    }

    #[test]
    fn test_earrings_only_when_enabled() {
        let mut r = Renderer::default();
        let face = frontal_face();
        let off = r.render(&frame(), Some(&face));
        assert_eq!(*off.get_pixel(80, 100), Rgba([40, 40, 40, 255]));

        let mut adj = *r.adjustments();
        adj.show_earrings = true;
        r.set_adjustments(adj);
        let on = r.render(&frame(), Some(&face));
        // No earring image: gold dot fallback at the ear landmark
        let px = on.get_pixel(80, 100);
        assert!(px[0] > 40 && px[2] < px[0], "expected gold tint, got {px:?}");
    }

    #[test]
    fn test_short_landmark_set_passes_frame() {
        let mut r = Renderer::default();
        r.set_overlay(JewelryKind::Chain, Some(RgbaImage::from_pixel(10, 10, RED)));
        let face = FaceLandmarks::new(vec![Default::default(); 5]);
        let out = r.render(&frame(), Some(&face));
        assert!(out.pixels().all(|p| *p == Rgba([40, 40, 40, 255])));
    }

    #[test]
    fn test_empty_overlay_is_ignored() {
        let mut r = Renderer::default();
        r.set_overlay(JewelryKind::Earring, Some(RgbaImage::new(0, 0)));
        assert_eq!(r.overlay_size(JewelryKind::Earring), None);
        r.set_overlay(JewelryKind::Earring, Some(RgbaImage::new(3, 5)));
        assert_eq!(r.overlay_size(JewelryKind::Earring), Some((3, 5)));
    }
}
