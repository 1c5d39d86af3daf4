//! Face-mesh landmark provider via ONNX Runtime.
//!
//! Runs a 192×192 face-landmark model (468 points, 478 with refined irises)
//! on a square region of interest. The first frame, and any frame after
//! tracking is lost, uses the whole frame letterboxed into the ROI; after
//! that the ROI follows the previous frame's landmarks.

use crate::types::{FaceLandmarks, NormalizedLandmark};
use image::RgbImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

const MESH_INPUT_SIZE: usize = 192;
/// Input pixels are scaled to [0, 1].
const MESH_PIXEL_SCALE: f32 = 1.0 / 255.0;
const MESH_BASE_LANDMARKS: usize = 468;
/// ROI side relative to the previous landmarks' bounding box.
const MESH_ROI_EXPANSION: f32 = 1.5;

pub const DEFAULT_MIN_DETECTION_CONFIDENCE: f32 = 0.5;
pub const DEFAULT_MIN_TRACKING_CONFIDENCE: f32 = 0.5;

#[derive(Error, Debug)]
pub enum MeshError {
    #[error("model file not found: {0}; place the face landmark ONNX model in the model directory")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// Anything that turns a camera frame into (at most one) face's landmarks.
pub trait LandmarkProvider: Send {
    fn detect(&mut self, frame: &RgbImage) -> Result<Option<FaceLandmarks>, MeshError>;
}

/// Always reports the same landmarks. Used for offline rendering and tests.
#[derive(Debug, Clone)]
pub struct StaticLandmarks(pub Option<FaceLandmarks>);

impl LandmarkProvider for StaticLandmarks {
    fn detect(&mut self, _frame: &RgbImage) -> Result<Option<FaceLandmarks>, MeshError> {
        Ok(self.0.clone())
    }
}

/// Confidence thresholds, mirroring the face-mesh solution options.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeshOptions {
    pub min_detection_confidence: f32,
    pub min_tracking_confidence: f32,
}

impl Default for MeshOptions {
    fn default() -> Self {
        Self {
            min_detection_confidence: DEFAULT_MIN_DETECTION_CONFIDENCE,
            min_tracking_confidence: DEFAULT_MIN_TRACKING_CONFIDENCE,
        }
    }
}

/// Square region of interest in frame pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Roi {
    center_x: f32,
    center_y: f32,
    size: f32,
}

impl Roi {
    /// Whole frame, centered, padded to a square.
    fn full_frame(width: u32, height: u32) -> Self {
        Self {
            center_x: width as f32 / 2.0,
            center_y: height as f32 / 2.0,
            size: width.max(height) as f32,
        }
    }

    /// Square around the landmarks' bounding box, expanded for head motion.
    fn around(landmarks: &FaceLandmarks, width: u32, height: u32) -> Option<Self> {
        let (x0, y0, x1, y1) = landmarks.bounds()?;
        let (w, h) = (width as f32, height as f32);
        let size = ((x1 - x0) * w).max((y1 - y0) * h) * MESH_ROI_EXPANSION;
        if !(size > 1.0) {
            return None;
        }
        Some(Self {
            center_x: (x0 + x1) / 2.0 * w,
            center_y: (y0 + y1) / 2.0 * h,
            size,
        })
    }

    fn left(&self) -> f32 {
        self.center_x - self.size / 2.0
    }

    fn top(&self) -> f32 {
        self.center_y - self.size / 2.0
    }
}

/// Model input memory layout, discovered from the input shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InputLayout {
    Nchw,
    Nhwc,
}

/// Face-mesh landmark model.
pub struct FaceMesh {
    session: Session,
    layout: InputLayout,
    /// Index of the landmark tensor among the outputs.
    landmark_output: usize,
    /// Index of the face-presence score tensor, if the model has one.
    score_output: Option<usize>,
    options: MeshOptions,
    /// ROI carried over from the previous frame while tracking.
    tracked: Option<Roi>,
}

impl FaceMesh {
    /// Load the face landmark ONNX model from the given path.
    pub fn load(model_path: &str, options: MeshOptions) -> Result<Self, MeshError> {
        if !Path::new(model_path).exists() {
            return Err(MeshError::ModelNotFound(model_path.to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        let layout = match session.inputs().first().map(|i| i.dtype()) {
            Some(ort::value::ValueType::Tensor { shape, .. }) if shape.get(3) == Some(&3) => {
                InputLayout::Nhwc
            }
            _ => InputLayout::Nchw,
        };

        let output_names: Vec<String> = session.outputs().iter().map(|o| o.name().to_string()).collect();
        let (landmark_output, score_output) = discover_outputs(&output_names);

        tracing::info!(
            path = model_path,
            inputs = ?session.inputs().iter().map(|i| (i.name(), i.dtype())).collect::<Vec<_>>(),
            outputs = ?output_names,
            ?layout,
            landmark_output,
            ?score_output,
            "loaded face mesh model"
        );

        Ok(Self {
            session,
            layout,
            landmark_output,
            score_output,
            options,
            tracked: None,
        })
    }

    /// Run the model once on `roi`, returning landmarks and presence score.
    fn infer(&mut self, frame: &RgbImage, roi: Roi) -> Result<(FaceLandmarks, f32), MeshError> {
        let input = preprocess(frame, roi, self.layout);
        let outputs = self.session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let (_, raw) = outputs[self.landmark_output]
            .try_extract_tensor::<f32>()
            .map_err(|e| MeshError::InferenceFailed(format!("landmarks: {e}")))?;
        if raw.len() < MESH_BASE_LANDMARKS * 3 {
            return Err(MeshError::InferenceFailed(format!(
                "expected at least {} landmark values, got {}",
                MESH_BASE_LANDMARKS * 3,
                raw.len()
            )));
        }
        let landmarks = decode_landmarks(raw, roi, frame.width(), frame.height());

        let score = match self.score_output {
            Some(idx) => {
                let (_, logit) = outputs[idx]
                    .try_extract_tensor::<f32>()
                    .map_err(|e| MeshError::InferenceFailed(format!("face score: {e}")))?;
                logit.first().copied().map(sigmoid).unwrap_or(0.0)
            }
            None => 1.0,
        };

        Ok((landmarks, score))
    }
}

impl LandmarkProvider for FaceMesh {
    fn detect(&mut self, frame: &RgbImage) -> Result<Option<FaceLandmarks>, MeshError> {
        if frame.width() == 0 || frame.height() == 0 {
            return Ok(None);
        }

        if let Some(roi) = self.tracked.take() {
            let (landmarks, score) = self.infer(frame, roi)?;
            if score >= self.options.min_tracking_confidence {
                self.tracked = Roi::around(&landmarks, frame.width(), frame.height());
                return Ok(Some(landmarks));
            }
            tracing::debug!(score, "face tracking lost; searching full frame");
        }

        let roi = Roi::full_frame(frame.width(), frame.height());
        let (landmarks, score) = self.infer(frame, roi)?;
        if score < self.options.min_detection_confidence {
            tracing::trace!(score, "no face");
            return Ok(None);
        }
        self.tracked = Roi::around(&landmarks, frame.width(), frame.height());
        Ok(Some(landmarks))
    }
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

/// Pick the landmark and score tensors by name, falling back to position.
///
/// Converted face-mesh exports name their outputs inconsistently
/// ("conv2d_21", "Identity", "landmarks", "output_faceflag", ...). Names
/// containing "flag" or "score" are taken as the presence score;
/// otherwise output 0 is the landmarks and output 1 the score.
fn discover_outputs(names: &[String]) -> (usize, Option<usize>) {
    let score = names.iter().position(|n| {
        let n = n.to_ascii_lowercase();
        n.contains("flag") || n.contains("score") || n.contains("presence")
    });
    match score {
        Some(s) => {
            let landmarks = (0..names.len()).find(|&i| i != s).unwrap_or(0);
            (landmarks, Some(s))
        }
        None if names.len() >= 2 => (0, Some(1)),
        None => (0, None),
    }
}

/// Crop `roi` out of the frame, resize to the model input with bilinear
/// sampling, and scale to [0, 1]. Pixels outside the frame are black.
fn preprocess(frame: &RgbImage, roi: Roi, layout: InputLayout) -> Array4<f32> {
    let size = MESH_INPUT_SIZE;
    let (w, h) = (frame.width() as i32, frame.height() as i32);
    let step = roi.size / size as f32;
    let (left, top) = (roi.left(), roi.top());

    let mut tensor = match layout {
        InputLayout::Nchw => Array4::<f32>::zeros((1, 3, size, size)),
        InputLayout::Nhwc => Array4::<f32>::zeros((1, size, size, 3)),
    };

    let texel = |x: i32, y: i32, c: usize| -> f32 {
        if x >= 0 && x < w && y >= 0 && y < h {
            frame.get_pixel(x as u32, y as u32)[c] as f32
        } else {
            0.0
        }
    };

    for oy in 0..size {
        let sy = top + (oy as f32 + 0.5) * step - 0.5;
        let y0 = sy.floor() as i32;
        let fy = sy - y0 as f32;
        for ox in 0..size {
            let sx = left + (ox as f32 + 0.5) * step - 0.5;
            let x0 = sx.floor() as i32;
            let fx = sx - x0 as f32;

            for c in 0..3 {
                let val = texel(x0, y0, c) * (1.0 - fx) * (1.0 - fy)
                    + texel(x0 + 1, y0, c) * fx * (1.0 - fy)
                    + texel(x0, y0 + 1, c) * (1.0 - fx) * fy
                    + texel(x0 + 1, y0 + 1, c) * fx * fy;
                let normalized = val * MESH_PIXEL_SCALE;
                match layout {
                    InputLayout::Nchw => tensor[[0, c, oy, ox]] = normalized,
                    InputLayout::Nhwc => tensor[[0, oy, ox, c]] = normalized,
                }
            }
        }
    }

    tensor
}

/// Map raw model output (x, y, z in input pixels) back to frame-normalized landmarks.
fn decode_landmarks(raw: &[f32], roi: Roi, width: u32, height: u32) -> FaceLandmarks {
    let scale = roi.size / MESH_INPUT_SIZE as f32;
    let (w, h) = (width as f32, height as f32);
    let points = raw
        .chunks_exact(3)
        .map(|p| NormalizedLandmark {
            x: (roi.left() + p[0] * scale) / w,
            y: (roi.top() + p[1] * scale) / h,
            z: p[2] * scale / w,
        })
        .collect();
    FaceLandmarks::new(points)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn test_full_frame_roi_is_square() {
        let roi = Roi::full_frame(1280, 720);
        assert_eq!(roi.size, 1280.0);
        assert_eq!(roi.left(), 0.0);
        assert_eq!(roi.top(), -280.0);
    }

    #[test]
    fn test_roi_around_landmarks() {
        let face = FaceLandmarks::new(vec![
            NormalizedLandmark { x: 0.4, y: 0.3, z: 0.0 },
            NormalizedLandmark { x: 0.6, y: 0.7, z: 0.0 },
        ]);
        let roi = Roi::around(&face, 1000, 500).unwrap();
        // box is 200×200 px, expanded 1.5×
        assert!((roi.size - 300.0).abs() < 1e-3);
        assert!((roi.center_x - 500.0).abs() < 1e-3);
        assert!((roi.center_y - 250.0).abs() < 1e-3);

        let collapsed = FaceLandmarks::new(vec![NormalizedLandmark::default(); 3]);
        assert!(Roi::around(&collapsed, 1000, 500).is_none());
    }

    #[test]
    fn test_preprocess_shape_and_range() {
        let frame = RgbImage::from_pixel(64, 48, Rgb([255, 128, 0]));
        let roi = Roi::full_frame(64, 48);

        let nchw = preprocess(&frame, roi, InputLayout::Nchw);
        assert_eq!(nchw.shape(), &[1, 3, MESH_INPUT_SIZE, MESH_INPUT_SIZE]);
        // Center pixel: inside the frame
        let mid = MESH_INPUT_SIZE / 2;
        assert!((nchw[[0, 0, mid, mid]] - 1.0).abs() < 1e-4);
        assert!((nchw[[0, 1, mid, mid]] - 128.0 / 255.0).abs() < 1e-4);
        assert_eq!(nchw[[0, 2, mid, mid]], 0.0);
        // Top row: letterbox padding
        assert_eq!(nchw[[0, 0, 0, mid]], 0.0);

        let nhwc = preprocess(&frame, roi, InputLayout::Nhwc);
        assert_eq!(nhwc.shape(), &[1, MESH_INPUT_SIZE, MESH_INPUT_SIZE, 3]);
        assert_eq!(nhwc[[0, mid, mid, 0]], nchw[[0, 0, mid, mid]]);
    }

    #[test]
    fn test_decode_landmarks_maps_roi_to_frame() {
        let roi = Roi { center_x: 300.0, center_y: 200.0, size: 192.0 };
        // Input-space center → ROI center
        let raw = [96.0, 96.0, 0.0, 0.0, 0.0, 19.2];
        let face = decode_landmarks(&raw, roi, 600, 400);
        assert_eq!(face.len(), 2);
        assert!((face.points[0].x - 0.5).abs() < 1e-5);
        assert!((face.points[0].y - 0.5).abs() < 1e-5);
        assert!((face.points[1].x - 204.0 / 600.0).abs() < 1e-5);
        assert!((face.points[1].z - 19.2 / 600.0).abs() < 1e-5);
    }

    #[test]
    fn test_discover_outputs() {
        let names: Vec<String> = ["output_faceflag", "conv2d_21"].iter().map(|s| s.to_string()).collect();
        assert_eq!(discover_outputs(&names), (1, Some(0)));

        let generic: Vec<String> = ["a", "b"].iter().map(|s| s.to_string()).collect();
        assert_eq!(discover_outputs(&generic), (0, Some(1)));

        let single = vec!["landmarks".to_string()];
        assert_eq!(discover_outputs(&single), (0, None));
    }

    #[test]
    fn test_sigmoid() {
        assert!((sigmoid(0.0) - 0.5).abs() < 1e-6);
        assert!(sigmoid(10.0) > 0.99);
        assert!(sigmoid(-10.0) < 0.01);
    }

    #[test]
    fn test_static_provider() {
        let mut provider = StaticLandmarks(None);
        let frame = RgbImage::new(4, 4);
        assert!(provider.detect(&frame).unwrap().is_none());
    }
}
