//! Jewelry placement from face-mesh landmarks.
//!
//! Converts landmark positions plus the user's scale/offset adjustments into
//! draw transforms. Everything here is pure geometry in frame pixels; the
//! compositor turns the transforms into pixels.

use crate::types::{FaceLandmarks, LandmarkError, Point};

/// Face-mesh index of the left jaw edge (image left).
pub const JAW_LEFT: usize = 234;
/// Face-mesh index of the right jaw edge (image right).
pub const JAW_RIGHT: usize = 454;
pub const CHIN: usize = 152;
pub const NOSE_TIP: usize = 4;
/// Ear attachment points coincide with the jaw edges in the face-mesh topology.
pub const LEFT_EAR: usize = JAW_LEFT;
pub const RIGHT_EAR: usize = JAW_RIGHT;

const CHAIN_BASE_DROP: f32 = 0.3;
const CHAIN_WIDTH_DROP: f32 = 0.8;
const CHAIN_MAX_WIDTH_FACTOR: f32 = 0.3;
const CHAIN_USER_OFFSET_GAIN: f32 = 3.0;
const CHAIN_NECK_SHIFT: f32 = 0.15;
const CHAIN_BASE_WIDTH: f32 = 1.4;
const CHAIN_WIDTH_GAIN: f32 = 0.8;

const EARRING_WIDTH_RATIO: f32 = 0.15;
const EARRING_DOT_RATIO: f32 = 0.02;

/// Chain knobs from the control surface.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChainParams {
    pub scale: f32,
    /// Vertical shift in units of 3× face length; positive moves down the chest.
    pub vertical_offset: f32,
}

/// Earring knobs from the control surface.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EarringParams {
    pub scale: f32,
    /// Outward shift of both earrings, in units of jaw width.
    pub horizontal_offset: f32,
    /// Downward shift of both earrings, in units of jaw width.
    pub vertical_offset: f32,
}

/// Landmark-derived measurements for one face in one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FaceGeometry {
    pub jaw_left: Point,
    pub jaw_right: Point,
    pub chin: Point,
    pub nose: Point,
    pub left_ear: Point,
    pub right_ear: Point,
    /// Nose tip to chin distance.
    pub face_length: f32,
    /// Jaw edge to jaw edge distance.
    pub jaw_width: f32,
    /// Head roll: angle of the jaw line in radians.
    pub roll: f32,
    pub frame_width: u32,
}

impl FaceGeometry {
    pub fn from_landmarks(
        landmarks: &FaceLandmarks,
        width: u32,
        height: u32,
    ) -> Result<Self, LandmarkError> {
        let jaw_left = landmarks.pixel(JAW_LEFT, width, height)?;
        let jaw_right = landmarks.pixel(JAW_RIGHT, width, height)?;
        let chin = landmarks.pixel(CHIN, width, height)?;
        let nose = landmarks.pixel(NOSE_TIP, width, height)?;
        let left_ear = landmarks.pixel(LEFT_EAR, width, height)?;
        let right_ear = landmarks.pixel(RIGHT_EAR, width, height)?;

        Ok(Self {
            jaw_left,
            jaw_right,
            chin,
            nose,
            left_ear,
            right_ear,
            face_length: nose.distance(&chin),
            jaw_width: jaw_left.distance(&jaw_right),
            roll: (jaw_right.y - jaw_left.y).atan2(jaw_right.x - jaw_left.x),
            frame_width: width,
        })
    }

    fn is_degenerate(&self) -> bool {
        !(self.face_length > 0.0 && self.jaw_width > 0.0 && self.frame_width > 0)
    }
}

/// Where and how to draw one overlay image.
///
/// The overlay's top-center edge sits on `anchor`; the image extends
/// downward in its own frame, which is rotated by `rotation` radians about
/// the anchor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OverlayTransform {
    pub anchor: Point,
    pub rotation: f32,
    pub width: f32,
    pub height: f32,
    /// Flip the image horizontally about its vertical center line.
    pub mirrored: bool,
}

impl OverlayTransform {
    /// Map a frame point into the overlay's local frame: x in [-w/2, w/2], y in [0, h].
    pub fn to_local(&self, p: Point) -> Point {
        let (sin, cos) = self.rotation.sin_cos();
        let dx = p.x - self.anchor.x;
        let dy = p.y - self.anchor.y;
        Point::new(dx * cos + dy * sin, -dx * sin + dy * cos)
    }

    /// Map a local-frame point back into frame pixels.
    pub fn to_frame(&self, p: Point) -> Point {
        let (sin, cos) = self.rotation.sin_cos();
        Point::new(
            self.anchor.x + p.x * cos - p.y * sin,
            self.anchor.y + p.x * sin + p.y * cos,
        )
    }

    /// The four corners in frame pixels: top-left, top-right, bottom-right, bottom-left.
    pub fn corners(&self) -> [Point; 4] {
        let hw = self.width / 2.0;
        [
            self.to_frame(Point::new(-hw, 0.0)),
            self.to_frame(Point::new(hw, 0.0)),
            self.to_frame(Point::new(hw, self.height)),
            self.to_frame(Point::new(-hw, self.height)),
        ]
    }
}

/// Earring drawing plan: images when one is loaded, glowing dots otherwise.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EarringPlacement {
    Images {
        left: OverlayTransform,
        right: OverlayTransform,
    },
    Dots {
        left: Point,
        right: Point,
        radius: f32,
    },
}

/// Place a chain image of `overlay_width`×`overlay_height` below the chin.
///
/// Returns `None` for an empty overlay or a degenerate face (zero jaw width
/// or face length), where no sensible placement exists.
pub fn place_chain(
    face: &FaceGeometry,
    overlay_width: u32,
    overlay_height: u32,
    params: &ChainParams,
) -> Option<OverlayTransform> {
    if overlay_width == 0 || overlay_height == 0 || face.is_degenerate() {
        return None;
    }

    let frame_w = face.frame_width as f32;
    let fl = face.face_length;
    let jw = face.jaw_width;

    let width_factor = (jw / frame_w).min(CHAIN_MAX_WIDTH_FACTOR);
    let drop = fl * CHAIN_BASE_DROP + width_factor * fl * CHAIN_WIDTH_DROP;
    let user_drop = params.vertical_offset * fl * CHAIN_USER_OFFSET_GAIN;

    let neck_x = face.jaw_left.midpoint(&face.jaw_right).x;
    let neck_y = face.chin.y + drop + user_drop;

    let target_w = jw * (CHAIN_BASE_WIDTH + (jw / frame_w) * CHAIN_WIDTH_GAIN);
    let target_h = overlay_height as f32 * target_w / overlay_width as f32;

    Some(OverlayTransform {
        anchor: Point::new(neck_x, neck_y + fl * CHAIN_NECK_SHIFT),
        rotation: face.roll,
        width: target_w * params.scale,
        height: target_h * params.scale,
        mirrored: false,
    })
}

/// Place both earrings at the ear landmarks.
///
/// `overlay_size` is the loaded earring image's size, or `None` to fall
/// back to dots. The right-ear image is mirrored.
pub fn place_earrings(
    face: &FaceGeometry,
    overlay_size: Option<(u32, u32)>,
    params: &EarringParams,
) -> EarringPlacement {
    let jw = face.jaw_width;
    let mid_x = face.jaw_left.midpoint(&face.jaw_right).x;

    let shift = |ear: Point| -> Point {
        let outward = if ear.x < mid_x { -1.0 } else { 1.0 };
        Point::new(
            ear.x + outward * params.horizontal_offset * jw,
            ear.y + params.vertical_offset * jw,
        )
    };
    let left = shift(face.left_ear);
    let right = shift(face.right_ear);

    match overlay_size {
        Some((w, h)) if w > 0 && h > 0 => {
            let width = jw * EARRING_WIDTH_RATIO * params.scale;
            let height = h as f32 * width / w as f32;
            let at = |anchor: Point, mirrored: bool| OverlayTransform {
                anchor,
                rotation: 0.0,
                width,
                height,
                mirrored,
            };
            EarringPlacement::Images {
                left: at(left, false),
                right: at(right, true),
            }
        }
        _ => EarringPlacement::Dots {
            left,
            right,
            radius: jw * EARRING_DOT_RATIO * params.scale,
        },
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::types::NormalizedLandmark;

    /// A frontal face: jaw 0.4..0.6 at y=0.5, nose at center, chin at y=0.7.
    pub(crate) fn frontal_face() -> FaceLandmarks {
        let mut points = vec![NormalizedLandmark::default(); 468];
        points[JAW_LEFT] = NormalizedLandmark { x: 0.4, y: 0.5, z: 0.0 };
        points[JAW_RIGHT] = NormalizedLandmark { x: 0.6, y: 0.5, z: 0.0 };
        points[CHIN] = NormalizedLandmark { x: 0.5, y: 0.7, z: 0.0 };
        points[NOSE_TIP] = NormalizedLandmark { x: 0.5, y: 0.5, z: 0.0 };
        FaceLandmarks::new(points)
    }

    fn close(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-3
    }

    #[test]
    fn test_geometry_measurements() {
        let g = FaceGeometry::from_landmarks(&frontal_face(), 1000, 1000).unwrap();
        assert!(close(g.jaw_width, 200.0));
        assert!(close(g.face_length, 200.0));
        assert!(close(g.roll, 0.0));
    }

    #[test]
    fn test_chain_placement_frontal() {
        let g = FaceGeometry::from_landmarks(&frontal_face(), 1000, 1000).unwrap();
        let params = ChainParams { scale: 1.0, vertical_offset: -0.2 };
        let t = place_chain(&g, 100, 50, &params).unwrap();

        // drop = 0.3*200 + 0.2*200*0.8 = 92; user = -0.2*200*3 = -120; shift = 30
        assert!(close(t.anchor.x, 500.0), "x = {}", t.anchor.x);
        assert!(close(t.anchor.y, 700.0 + 92.0 - 120.0 + 30.0), "y = {}", t.anchor.y);
        // width = 200 * (1.4 + 0.2*0.8) = 312, height keeps 2:1 aspect
        assert!(close(t.width, 312.0), "w = {}", t.width);
        assert!(close(t.height, 156.0), "h = {}", t.height);
        assert!(close(t.rotation, 0.0));
        assert!(!t.mirrored);
    }

    #[test]
    fn test_chain_scale_applies_to_both_axes() {
        let g = FaceGeometry::from_landmarks(&frontal_face(), 1000, 1000).unwrap();
        let base = place_chain(&g, 100, 50, &ChainParams { scale: 1.0, vertical_offset: 0.0 }).unwrap();
        let big = place_chain(&g, 100, 50, &ChainParams { scale: 2.0, vertical_offset: 0.0 }).unwrap();
        assert!(close(big.width, base.width * 2.0));
        assert!(close(big.height, base.height * 2.0));
        assert_eq!(big.anchor, base.anchor);
    }

    #[test]
    fn test_chain_width_factor_is_capped() {
        // Jaw spans 80% of the frame: the drop term caps at 0.3, the width term does not.
        let mut face = frontal_face();
        face.points[JAW_LEFT].x = 0.1;
        face.points[JAW_RIGHT].x = 0.9;
        let g = FaceGeometry::from_landmarks(&face, 1000, 1000).unwrap();
        let t = place_chain(&g, 100, 100, &ChainParams { scale: 1.0, vertical_offset: 0.0 }).unwrap();

        let expected_drop = 0.3 * 200.0 + 0.3 * 200.0 * 0.8;
        assert!(close(t.anchor.y, 700.0 + expected_drop + 30.0), "y = {}", t.anchor.y);
        assert!(close(t.width, 800.0 * (1.4 + 0.8 * 0.8)), "w = {}", t.width);
    }

    #[test]
    fn test_chain_follows_head_roll() {
        let mut face = frontal_face();
        face.points[JAW_RIGHT] = NormalizedLandmark { x: 0.6, y: 0.7, z: 0.0 };
        let g = FaceGeometry::from_landmarks(&face, 1000, 1000).unwrap();
        let t = place_chain(&g, 10, 10, &ChainParams { scale: 1.0, vertical_offset: 0.0 }).unwrap();
        assert!(close(t.rotation, std::f32::consts::FRAC_PI_4));
    }

    #[test]
    fn test_chain_degenerate_face() {
        let face = FaceLandmarks::new(vec![NormalizedLandmark::default(); 468]);
        let g = FaceGeometry::from_landmarks(&face, 640, 480).unwrap();
        assert!(place_chain(&g, 100, 50, &ChainParams { scale: 1.0, vertical_offset: 0.0 }).is_none());
    }

    #[test]
    fn test_chain_empty_overlay() {
        let g = FaceGeometry::from_landmarks(&frontal_face(), 1000, 1000).unwrap();
        assert!(place_chain(&g, 0, 50, &ChainParams { scale: 1.0, vertical_offset: 0.0 }).is_none());
    }

    #[test]
    fn test_earring_images() {
        let g = FaceGeometry::from_landmarks(&frontal_face(), 1000, 1000).unwrap();
        let params = EarringParams { scale: 1.0, horizontal_offset: 0.0, vertical_offset: 0.0 };
        match place_earrings(&g, Some((20, 40)), &params) {
            EarringPlacement::Images { left, right } => {
                assert_eq!(left.anchor, Point::new(400.0, 500.0));
                assert_eq!(right.anchor, Point::new(600.0, 500.0));
                assert!(close(left.width, 30.0));
                assert!(close(left.height, 60.0));
                assert!(!left.mirrored);
                assert!(right.mirrored);
            }
            other => panic!("expected images, got {other:?}"),
        }
    }

    #[test]
    fn test_earring_dots_fallback() {
        let g = FaceGeometry::from_landmarks(&frontal_face(), 1000, 1000).unwrap();
        let params = EarringParams { scale: 2.0, horizontal_offset: 0.0, vertical_offset: 0.0 };
        match place_earrings(&g, None, &params) {
            EarringPlacement::Dots { left, right, radius } => {
                assert_eq!(left, Point::new(400.0, 500.0));
                assert_eq!(right, Point::new(600.0, 500.0));
                assert!(close(radius, 8.0));
            }
            other => panic!("expected dots, got {other:?}"),
        }
    }

    #[test]
    fn test_earring_offsets_move_outward_and_down() {
        let g = FaceGeometry::from_landmarks(&frontal_face(), 1000, 1000).unwrap();
        let params = EarringParams { scale: 1.0, horizontal_offset: 0.1, vertical_offset: 0.05 };
        let EarringPlacement::Dots { left, right, .. } = place_earrings(&g, None, &params) else {
            panic!("expected dots");
        };
        assert!(close(left.x, 380.0));
        assert!(close(right.x, 620.0));
        assert!(close(left.y, 510.0));
    }

    #[test]
    fn test_transform_local_roundtrip() {
        let t = OverlayTransform {
            anchor: Point::new(100.0, 50.0),
            rotation: 0.3,
            width: 40.0,
            height: 20.0,
            mirrored: false,
        };
        let p = Point::new(117.0, 61.0);
        let back = t.to_frame(t.to_local(p));
        assert!(close(back.x, p.x) && close(back.y, p.y));

        let corners = t.corners();
        let local = t.to_local(corners[2]);
        assert!(close(local.x, 20.0) && close(local.y, 20.0));
    }
}
